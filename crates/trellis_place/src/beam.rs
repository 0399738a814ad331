//! The beam-search placer.
//!
//! Maintains a bounded set of candidate placements (the "trellis"). Starting
//! from one cluster per node, each search step merges the next
//! density-ordered node pair inside every candidate: the first cluster is
//! tried in each allowed orientation, displaced toward the second by the
//! force accumulator, and legalized by the plow resolver — every feasible
//! outcome becomes its own child. Only the `trellis_width` best children
//! survive across all parents, ordered by quality with the weighted merge
//! rank breaking ties. After the search, remaining disjoint clusters are
//! attached to the largest one, and a compaction loop relocates boundary
//! nodes into free rectangles.
//!
//! Candidates share structure: cloning one is cheap via [`SharedVec`], so a
//! child only pays for the clusters it actually touches.

use crate::cluster::Clustering;
use crate::force::ForceAccumulator;
use crate::freerect::free_rectangles;
use crate::plow::plow;
use crate::proxy::{build_proxies, Cluster, ProxyNode};
use crate::snapshot::SharedVec;
use crate::spatial::SpatialIndex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use trellis_common::{Orientation, Point, ProxyId, Rect, TrellisResult};
use trellis_config::PlacerConfig;
use trellis_netlist::{net_pairings, Netlist};

/// Search steps without a best-quality improvement before the beam gives up.
pub const STAGNATION_LIMIT: usize = 64;

/// Slack, in percentage points, granted to the wire-length term when a
/// compaction pass is judged: the pass is accepted only while
/// `areaImprovement% <= hpwlImprovement% + COMPACTION_THRESHOLD`.
pub const COMPACTION_THRESHOLD: f64 = 7.0;

/// One point-to-point connection derived from a net's Steiner pairing.
struct Connection {
    from: usize,
    from_dx: f64,
    from_dy: f64,
    to: usize,
    to_dx: f64,
    to_dy: f64,
    is_supply: bool,
}

/// Immutable inputs shared by every candidate.
struct SearchContext {
    connections: Vec<Connection>,
    /// Per net with two or more ports: (proxy index, port offset).
    nets: Vec<Vec<(usize, f64, f64)>>,
    /// Density-ordered node pairs eligible for merging (same cluster group).
    merge_pairs: Vec<(usize, usize)>,
    /// Per node: whether its placement is fixed and must not move.
    fixed: Vec<bool>,
}

impl SearchContext {
    fn build(netlist: &Netlist, clustering: &Clustering) -> Self {
        let mut group = vec![usize::MAX; netlist.node_count()];
        for (g, members) in clustering.clusters.iter().enumerate() {
            for m in members {
                group[m.index()] = g;
            }
        }
        let merge_pairs = clustering
            .pair_order
            .iter()
            .filter(|(a, b)| group[a.index()] == group[b.index()])
            .map(|(a, b)| (a.index(), b.index()))
            .collect();

        let mut connections = Vec::new();
        for net in &netlist.nets {
            for (pa, pb) in net_pairings(netlist, net.id) {
                let from = netlist.port(pa);
                let to = netlist.port(pb);
                if from.node == to.node {
                    continue;
                }
                connections.push(Connection {
                    from: from.node.index(),
                    from_dx: from.dx,
                    from_dy: from.dy,
                    to: to.node.index(),
                    to_dx: to.dx,
                    to_dy: to.dy,
                    is_supply: net.is_supply,
                });
            }
        }

        let nets = netlist
            .nets
            .iter()
            .filter(|net| net.ports.len() >= 2)
            .map(|net| {
                net.ports
                    .iter()
                    .map(|&p| {
                        let port = netlist.port(p);
                        (port.node.index(), port.dx, port.dy)
                    })
                    .collect()
            })
            .collect();

        Self {
            connections,
            nets,
            merge_pairs,
            fixed: netlist.nodes.iter().map(|n| n.is_fixed).collect(),
        }
    }
}

/// One placement candidate in the beam.
#[derive(Clone)]
struct Candidate {
    proxies: SharedVec<ProxyNode>,
    /// Cluster slots; a merged-away slot holds `None`.
    clusters: SharedVec<Option<Cluster>>,
    /// Cluster slot per proxy index.
    cluster_of: SharedVec<u32>,
    /// HPWL times the product of per-cluster aspect penalties; lower wins.
    quality: f64,
    /// Weighted rank of the merge that produced this candidate, relative to
    /// its siblings. Breaks quality ties when the beam is pruned.
    merge_rank: f64,
    next_pair: usize,
}

impl Candidate {
    fn seed(proxies: Vec<ProxyNode>, ctx: &SearchContext) -> Self {
        let clusters: Vec<Option<Cluster>> = proxies
            .iter()
            .enumerate()
            .map(|(i, p)| Some(Cluster::singleton(ProxyId::from_raw(i as u32), p.bounds())))
            .collect();
        let cluster_of: Vec<u32> = (0..proxies.len() as u32).collect();
        let mut candidate = Self {
            proxies: SharedVec::from_vec(proxies),
            clusters: SharedVec::from_vec(clusters),
            cluster_of: SharedVec::from_vec(cluster_of),
            quality: 0.0,
            merge_rank: 0.0,
            next_pair: 0,
        };
        candidate.quality = candidate_quality(&candidate, ctx);
        candidate
    }

    /// A child identical to this candidate with the current pair consumed.
    fn skip_pair(&self) -> Self {
        let mut child = self.clone();
        child.next_pair += 1;
        child
    }

    /// Consumes pairs whose nodes already share a cluster.
    fn skip_resolved(&mut self, ctx: &SearchContext) {
        while self.next_pair < ctx.merge_pairs.len() {
            let (a, b) = ctx.merge_pairs[self.next_pair];
            if self.cluster_of.get(a) != self.cluster_of.get(b) {
                break;
            }
            self.next_pair += 1;
        }
    }

    fn is_finished(&self, ctx: &SearchContext) -> bool {
        self.next_pair >= ctx.merge_pairs.len()
    }
}

/// Places the netlist's nodes by clustered beam search and returns the final
/// proxy per node, in node order.
pub fn beam_place(
    netlist: &Netlist,
    clustering: &Clustering,
    config: &PlacerConfig,
) -> TrellisResult<Vec<ProxyNode>> {
    let proxies = build_proxies(netlist);
    if proxies.is_empty() {
        return Ok(Vec::new());
    }
    let ctx = SearchContext::build(netlist, clustering);
    let deadline = (config.runtime_secs > 0)
        .then(|| Instant::now() + Duration::from_secs(config.runtime_secs));

    let mut beam = vec![Candidate::seed(proxies, &ctx)];
    let mut best_quality = beam[0].quality;
    let mut stagnant = 0usize;

    loop {
        let mut any_open = false;
        for candidate in &mut beam {
            candidate.skip_resolved(&ctx);
            any_open |= !candidate.is_finished(&ctx);
        }
        if !any_open {
            break;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }

        let mut children: Vec<Candidate> = Vec::new();
        for candidate in &beam {
            if candidate.is_finished(&ctx) {
                children.push(candidate.clone());
            } else {
                children.extend(expand(candidate, &ctx, config)?);
            }
        }
        children.sort_by(|a, b| {
            a.quality
                .total_cmp(&b.quality)
                .then(a.merge_rank.total_cmp(&b.merge_rank))
        });
        children.truncate(config.trellis_width.max(1));

        if children[0].quality < best_quality {
            best_quality = children[0].quality;
            stagnant = 0;
        } else {
            stagnant += 1;
        }
        beam = children;
        if stagnant >= STAGNATION_LIMIT {
            break;
        }
    }

    let mut best = match beam
        .into_iter()
        .min_by(|a, b| a.quality.total_cmp(&b.quality))
    {
        Some(candidate) => candidate,
        None => return Ok(Vec::new()),
    };

    settle_and_combine(&mut best, &ctx)?;
    let mut result: Vec<ProxyNode> = best.proxies.iter().cloned().collect();
    compact(&mut result, &ctx);
    Ok(result)
}

/// Produces the children of one candidate: the next pair merged under each
/// allowed orientation, one child per feasible outcome. A merge that fails
/// in every orientation yields a single child with the pair skipped.
fn expand(
    candidate: &Candidate,
    ctx: &SearchContext,
    config: &PlacerConfig,
) -> TrellisResult<Vec<Candidate>> {
    let (a, b) = ctx.merge_pairs[candidate.next_pair];
    let sa = *candidate.cluster_of.get(a) as usize;
    let sb = *candidate.cluster_of.get(b) as usize;

    // A fixed cluster can only serve as the anchor.
    let (ca, cb) = if slot_fixed(candidate, sa, ctx) {
        (sb, sa)
    } else {
        (sa, sb)
    };
    if slot_fixed(candidate, ca, ctx) {
        return Ok(vec![candidate.skip_pair()]);
    }

    let mut orientations: Vec<Orientation> = Orientation::UPRIGHT.to_vec();
    if config.allow_rotation {
        orientations.extend(Orientation::ROTATED);
    }

    let base = pair_metrics(candidate, ca, cb, (0.0, 0.0), ctx);
    let mut children = Vec::new();
    for o in orientations {
        let mut trial = candidate.clone();
        reorient_cluster(&mut trial, ca, o);
        let (dx, dy) = abutment_force(&trial, ca, cb, ctx).resolve();
        let (conn, area, penalty) = pair_metrics(&trial, ca, cb, (dx, dy), ctx);
        let rank = rel(conn, base.0)
            + config.bound_weight * rel(area, base.1)
            + config.aspect_ratio_weight * rel(penalty, base.2);
        if !plow_clusters(&mut trial, ca, dx, dy, None, ctx)? {
            continue;
        }
        absorb(&mut trial, ca, cb);
        trial.next_pair = candidate.next_pair + 1;
        trial.quality = candidate_quality(&trial, ctx);
        trial.merge_rank = rank;
        children.push(trial);
    }

    if children.is_empty() {
        // Infeasible merge in every orientation: the pair is skipped.
        return Ok(vec![candidate.skip_pair()]);
    }
    Ok(children)
}

/// Sums the pulls between the two clusters into an abutment displacement for
/// cluster `ca`.
fn abutment_force(
    candidate: &Candidate,
    ca: usize,
    cb: usize,
    ctx: &SearchContext,
) -> ForceAccumulator {
    let mut acc = ForceAccumulator::new();
    for conn in &ctx.connections {
        let ga = *candidate.cluster_of.get(conn.from) as usize;
        let gb = *candidate.cluster_of.get(conn.to) as usize;
        let (src, sdx, sdy, dst, ddx, ddy) = if ga == ca && gb == cb {
            (conn.from, conn.from_dx, conn.from_dy, conn.to, conn.to_dx, conn.to_dy)
        } else if ga == cb && gb == ca {
            (conn.to, conn.to_dx, conn.to_dy, conn.from, conn.from_dx, conn.from_dy)
        } else {
            continue;
        };
        let from = candidate.proxies.get(src).port_position(sdx, sdy);
        let to = candidate.proxies.get(dst).port_position(ddx, ddy);
        acc.add(
            from,
            to,
            candidate.proxies.get(src).bounds(),
            candidate.proxies.get(dst).bounds(),
            conn.is_supply,
        );
    }
    acc
}

/// Connection length, combined bounding area, and aspect penalty for the
/// pair with cluster `ca` displaced by `d`.
fn pair_metrics(
    candidate: &Candidate,
    ca: usize,
    cb: usize,
    d: (f64, f64),
    ctx: &SearchContext,
) -> (f64, f64, f64) {
    let mut conn_len = 0.0;
    for conn in &ctx.connections {
        let ga = *candidate.cluster_of.get(conn.from) as usize;
        let gb = *candidate.cluster_of.get(conn.to) as usize;
        if !((ga == ca && gb == cb) || (ga == cb && gb == ca)) {
            continue;
        }
        let mut from = candidate
            .proxies
            .get(conn.from)
            .port_position(conn.from_dx, conn.from_dy);
        let mut to = candidate
            .proxies
            .get(conn.to)
            .port_position(conn.to_dx, conn.to_dy);
        if ga == ca {
            from = from.translated(d.0, d.1);
        } else {
            to = to.translated(d.0, d.1);
        }
        conn_len += (from.x - to.x).abs() + (from.y - to.y).abs();
    }
    let union = raw_cluster_bounds(candidate, ca)
        .translated(d.0, d.1)
        .union(&raw_cluster_bounds(candidate, cb));
    (conn_len, union.area(), 1.0 / union.aspect_ratio())
}

/// Relative change of `x` against `y`, normalized by the larger magnitude.
fn rel(x: f64, y: f64) -> f64 {
    let denom = x.max(y);
    if denom > 0.0 {
        (x - y) / denom
    } else {
        0.0
    }
}

fn candidate_quality(candidate: &Candidate, ctx: &SearchContext) -> f64 {
    let mut penalty = 1.0;
    for slot in live_slots(candidate) {
        let bounds = raw_cluster_bounds(candidate, slot);
        if bounds.area() > 0.0 {
            penalty *= 1.0 / bounds.aspect_ratio();
        }
    }
    candidate_hpwl(candidate, ctx) * penalty
}

fn candidate_hpwl(candidate: &Candidate, ctx: &SearchContext) -> f64 {
    ctx.nets
        .iter()
        .map(|ports| {
            let mut min = Point::new(f64::MAX, f64::MAX);
            let mut max = Point::new(f64::MIN, f64::MIN);
            for &(node, dx, dy) in ports {
                let p = candidate.proxies.get(node).port_position(dx, dy);
                min.x = min.x.min(p.x);
                min.y = min.y.min(p.y);
                max.x = max.x.max(p.x);
                max.y = max.y.max(p.y);
            }
            (max.x - min.x) + (max.y - min.y)
        })
        .sum()
}

fn live_slots(candidate: &Candidate) -> Vec<usize> {
    (0..candidate.clusters.len())
        .filter(|&i| candidate.clusters.get(i).is_some())
        .collect()
}

/// A cluster holding any fixed node must not be displaced.
fn slot_fixed(candidate: &Candidate, slot: usize, ctx: &SearchContext) -> bool {
    candidate
        .clusters
        .get(slot)
        .as_ref()
        .is_some_and(|cluster| cluster.members.iter().any(|m| ctx.fixed[m.index()]))
}

/// The exact (unsnapped) union of a cluster's member bounds. Plowing and
/// attachment geometry use this; the cached cluster bounds stay grid-snapped.
fn raw_cluster_bounds(candidate: &Candidate, slot: usize) -> Rect {
    let Some(cluster) = candidate.clusters.get(slot).as_ref() else {
        return Rect::zero();
    };
    let mut iter = cluster.members.iter();
    let Some(&first) = iter.next() else {
        return Rect::zero();
    };
    let mut union = candidate.proxies.get(first.index()).bounds();
    for &m in iter {
        union = union.union(&candidate.proxies.get(m.index()).bounds());
    }
    union
}

fn refresh_cluster(candidate: &mut Candidate, slot: usize) {
    let bounds = raw_cluster_bounds(candidate, slot).snapped_even();
    if let Some(cluster) = candidate.clusters.get_mut(slot).as_mut() {
        cluster.bounds = bounds;
    }
}

fn translate_cluster(candidate: &mut Candidate, slot: usize, dx: f64, dy: f64) {
    let members = match candidate.clusters.get(slot).as_ref() {
        Some(cluster) => cluster.members.clone(),
        None => return,
    };
    for m in members {
        let proxy = candidate.proxies.get_mut(m.index());
        proxy.propose_move(dx, dy);
        proxy.commit();
    }
    refresh_cluster(candidate, slot);
}

/// Rotates/mirrors a cluster rigidly about its bounding-box center.
fn reorient_cluster(candidate: &mut Candidate, slot: usize, o: Orientation) {
    if o == Orientation::R0 {
        return;
    }
    let members = match candidate.clusters.get(slot).as_ref() {
        Some(cluster) => cluster.members.clone(),
        None => return,
    };
    let center = raw_cluster_bounds(candidate, slot).center();
    for m in members {
        let proxy = candidate.proxies.get_mut(m.index());
        let (cx, cy) = (proxy.effective().x, proxy.effective().y);
        let (rx, ry) = o.apply(cx - center.x, cy - center.y);
        proxy.propose_move(center.x + rx - cx, center.y + ry - cy);
        proxy.propose_orientation(o);
        proxy.commit();
    }
    refresh_cluster(candidate, slot);
}

/// Moves a cluster by `(dx, dy)` in an ephemeral spatial index of all live
/// clusters, plowing blockers aside, and applies the resulting displacements
/// to the member proxies. `protect` shields one extra cluster from being
/// displaced. `Ok(false)` means the move is infeasible; `Err` means the plow
/// itself broke an invariant.
fn plow_clusters(
    candidate: &mut Candidate,
    target: usize,
    dx: f64,
    dy: f64,
    protect: Option<usize>,
    ctx: &SearchContext,
) -> TrellisResult<bool> {
    let mut index: SpatialIndex<u32> = SpatialIndex::new();
    let mut before: HashMap<u32, Rect> = HashMap::new();
    let mut immovable: HashMap<u32, bool> = HashMap::new();
    for slot in live_slots(candidate) {
        let rect = raw_cluster_bounds(candidate, slot);
        index.insert(rect, slot as u32);
        before.insert(slot as u32, rect);
        immovable.insert(slot as u32, slot_fixed(candidate, slot, ctx));
    }
    let protect = protect.map(|p| p as u32);
    let is_fixed = |p: u32| Some(p) == protect || immovable.get(&p).copied().unwrap_or(false);
    let Some(moved) = plow(&mut index, is_fixed, target as u32, dx, dy)? else {
        return Ok(false);
    };
    for (slot, after) in moved {
        let old = before[&slot];
        let (mdx, mdy) = (after.min_x - old.min_x, after.min_y - old.min_y);
        if mdx != 0.0 || mdy != 0.0 {
            translate_cluster(candidate, slot as usize, mdx, mdy);
        }
    }
    Ok(true)
}

/// Merges cluster `from` into cluster `into`, leaving `from`'s slot empty.
fn absorb(candidate: &mut Candidate, from: usize, into: usize) {
    let members = candidate
        .clusters
        .get_mut(from)
        .take()
        .map(|cluster| cluster.members)
        .unwrap_or_default();
    for m in &members {
        *candidate.cluster_of.get_mut(m.index()) = into as u32;
    }
    if let Some(cluster) = candidate.clusters.get_mut(into).as_mut() {
        cluster.members.extend(members);
    }
    refresh_cluster(candidate, into);
}

/// Clears residual overlaps, then attaches every remaining cluster to the
/// largest one at the side offset minimizing the combined bounding area.
fn settle_and_combine(candidate: &mut Candidate, ctx: &SearchContext) -> TrellisResult<()> {
    for slot in live_slots(candidate) {
        if !slot_fixed(candidate, slot, ctx) {
            plow_clusters(candidate, slot, 0.0, 0.0, None, ctx)?;
        }
    }

    loop {
        let mut live = live_slots(candidate);
        if live.len() <= 1 {
            break;
        }
        live.sort_by(|&x, &y| {
            raw_cluster_bounds(candidate, y)
                .area()
                .total_cmp(&raw_cluster_bounds(candidate, x).area())
        });
        let main = live[0];
        let Some(&next) = live[1..]
            .iter()
            .find(|&&slot| !slot_fixed(candidate, slot, ctx))
        else {
            break;
        };
        let mb = raw_cluster_bounds(candidate, main);
        let nb = raw_cluster_bounds(candidate, next);

        let members = candidate
            .clusters
            .get(main)
            .as_ref()
            .map(|cluster| cluster.members.clone())
            .unwrap_or_default();
        let mut ys: Vec<f64> = members
            .iter()
            .map(|m| candidate.proxies.get(m.index()).bounds().min_y)
            .collect();
        ys.push(mb.min_y);
        ys.sort_by(f64::total_cmp);
        ys.dedup_by(|a, b| (*a - *b).abs() < 1e-9);
        let mut xs: Vec<f64> = members
            .iter()
            .map(|m| candidate.proxies.get(m.index()).bounds().min_x)
            .collect();
        xs.push(mb.min_x);
        xs.sort_by(f64::total_cmp);
        xs.dedup_by(|a, b| (*a - *b).abs() < 1e-9);

        // Push from the left/right at the main cluster's occupied Y
        // coordinates, and from below/above at its occupied X coordinates.
        let mut placements: Vec<(f64, f64)> = Vec::new();
        for &y in &ys {
            for dx in [mb.min_x - nb.max_x, mb.max_x - nb.min_x] {
                placements.push((dx, y - nb.min_y));
            }
        }
        for &x in &xs {
            for dy in [mb.min_y - nb.max_y, mb.max_y - nb.min_y] {
                placements.push((x - nb.min_x, dy));
            }
        }
        placements.sort_by(|a, b| {
            let area_a = nb.translated(a.0, a.1).union(&mb).area();
            let area_b = nb.translated(b.0, b.1).union(&mb).area();
            area_a.total_cmp(&area_b)
        });

        let mut attached = false;
        for &(dx, dy) in &placements {
            if plow_clusters(candidate, next, dx, dy, Some(main), ctx)? {
                attached = true;
                break;
            }
        }
        if !attached {
            // Cramped layout: take the best offset and let the plow move
            // whatever it must, the main cluster included.
            let (dx, dy) = placements.first().copied().unwrap_or((0.0, 0.0));
            translate_cluster(candidate, next, dx, dy);
            plow_clusters(candidate, next, 0.0, 0.0, None, ctx)?;
        }
        absorb(candidate, next, main);
    }
    Ok(())
}

fn union_bounds(proxies: &[ProxyNode]) -> Rect {
    let mut iter = proxies.iter();
    let Some(first) = iter.next() else {
        return Rect::zero();
    };
    iter.fold(first.bounds(), |acc, p| acc.union(&p.bounds()))
}

fn slice_hpwl(proxies: &[ProxyNode], ctx: &SearchContext) -> f64 {
    ctx.nets
        .iter()
        .map(|ports| {
            let mut min = Point::new(f64::MAX, f64::MAX);
            let mut max = Point::new(f64::MIN, f64::MIN);
            for &(node, dx, dy) in ports {
                let p = proxies[node].port_position(dx, dy);
                min.x = min.x.min(p.x);
                min.y = min.y.min(p.y);
                max.x = max.x.max(p.x);
                max.y = max.y.max(p.y);
            }
            (max.x - min.x) + (max.y - min.y)
        })
        .sum()
}

fn improvement_pct(old: f64, new: f64) -> f64 {
    if old > 0.0 {
        (old - new) / old * 100.0
    } else {
        0.0
    }
}

/// Iterative boundary compaction: relocate the nodes on the bounding box
/// edge whose removal shrinks the bound most into free rectangles, keeping
/// the result only while the acceptance rule holds.
fn compact(proxies: &mut Vec<ProxyNode>, ctx: &SearchContext) {
    let n = proxies.len();
    if n < 2 {
        return;
    }
    const EDGE_EPS: f64 = 1e-9;

    for _pass in 0..n {
        let bounds = union_bounds(proxies);
        let mut groups: [Vec<usize>; 4] = [Vec::new(), Vec::new(), Vec::new(), Vec::new()];
        for (i, proxy) in proxies.iter().enumerate() {
            let b = proxy.bounds();
            if (b.min_x - bounds.min_x).abs() < EDGE_EPS {
                groups[0].push(i);
            }
            if (b.max_x - bounds.max_x).abs() < EDGE_EPS {
                groups[1].push(i);
            }
            if (b.min_y - bounds.min_y).abs() < EDGE_EPS {
                groups[2].push(i);
            }
            if (b.max_y - bounds.max_y).abs() < EDGE_EPS {
                groups[3].push(i);
            }
        }

        let shrink_of = |group: &[usize]| -> f64 {
            if group.is_empty() || group.len() == n {
                return f64::MIN;
            }
            let rest: Vec<Rect> = proxies
                .iter()
                .enumerate()
                .filter(|(i, _)| !group.contains(i))
                .map(|(_, p)| p.bounds())
                .collect();
            let mut iter = rest.iter();
            let Some(&first) = iter.next() else {
                return f64::MIN;
            };
            let inner = iter.fold(first, |acc, r| acc.union(r));
            bounds.area() - inner.area()
        };
        let mut order: Vec<usize> = (0..4).collect();
        order.sort_by(|&x, &y| shrink_of(&groups[y]).total_cmp(&shrink_of(&groups[x])));

        let mut accepted = false;
        for &edge in &order {
            let group = groups[edge].clone();
            if group.is_empty() || group.len() == n {
                continue;
            }
            if group.iter().any(|&i| ctx.fixed[i]) {
                continue;
            }
            let old_area = bounds.area();
            let old_hpwl = slice_hpwl(proxies, ctx);
            let saved = proxies.clone();
            let inner: Option<Rect> = proxies
                .iter()
                .enumerate()
                .filter(|(i, _)| !group.contains(i))
                .map(|(_, p)| p.bounds())
                .reduce(|acc, r| acc.union(&r));
            let Some(inner) = inner else {
                continue;
            };

            let mut relocated_all = true;
            for &i in &group {
                if !relocate_into_free(proxies, i, inner, ctx) {
                    relocated_all = false;
                    break;
                }
            }
            if relocated_all {
                let new_area = union_bounds(proxies).area();
                let new_hpwl = slice_hpwl(proxies, ctx);
                let area_imp = improvement_pct(old_area, new_area);
                let hpwl_imp = improvement_pct(old_hpwl, new_hpwl);
                if area_imp <= hpwl_imp + COMPACTION_THRESHOLD
                    && (new_area < old_area || new_hpwl < old_hpwl)
                {
                    accepted = true;
                    break;
                }
            }
            *proxies = saved;
        }
        if !accepted {
            break;
        }
    }
}

/// Moves proxy `i` into the free rectangle position minimizing HPWL inside
/// `boundary`. Returns `false` when no free rectangle fits the node.
fn relocate_into_free(
    proxies: &mut [ProxyNode],
    i: usize,
    boundary: Rect,
    ctx: &SearchContext,
) -> bool {
    let (w, h) = {
        let f = &proxies[i].current;
        (f.width, f.height)
    };
    let occupied: Vec<Rect> = proxies
        .iter()
        .enumerate()
        .filter(|&(j, _)| j != i)
        .map(|(_, p)| p.bounds())
        .collect();
    let free = free_rectangles(boundary, &occupied);

    let mut best: Option<(f64, Point)> = None;
    for rect in free {
        if rect.width() < w || rect.height() < h {
            continue;
        }
        let corners = [
            Point::new(rect.min_x + w / 2.0, rect.min_y + h / 2.0),
            Point::new(rect.max_x - w / 2.0, rect.min_y + h / 2.0),
            Point::new(rect.min_x + w / 2.0, rect.max_y - h / 2.0),
            Point::new(rect.max_x - w / 2.0, rect.max_y - h / 2.0),
        ];
        for center in corners {
            let (cx, cy) = (proxies[i].current.x, proxies[i].current.y);
            proxies[i].propose_move(center.x - cx, center.y - cy);
            let hpwl = slice_hpwl(proxies, ctx);
            proxies[i].revert();
            if best.is_none_or(|(q, _)| hpwl < q) {
                best = Some((hpwl, center));
            }
        }
    }
    let Some((_, center)) = best else {
        return false;
    };
    let (cx, cy) = (proxies[i].current.x, proxies[i].current.y);
    proxies[i].propose_move(center.x - cx, center.y - cy);
    proxies[i].commit();
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::cluster_nodes;
    use trellis_common::{NetId, NodeId, PortId};
    use trellis_netlist::{Net, Node, Placement, Port};

    fn add_node(nl: &mut Netlist, name: &str, size: f64, x: f64, y: f64) -> NodeId {
        nl.add_node(Node {
            id: NodeId::from_raw(0),
            name: name.to_string(),
            width: size,
            height: size,
            ports: Vec::new(),
            placement: Some(Placement::at(x, y)),
            is_fixed: false,
        })
    }

    fn center_port(nl: &mut Netlist, node: NodeId) -> PortId {
        nl.add_port(Port {
            id: PortId::from_raw(0),
            name: "P".to_string(),
            node,
            dx: 0.0,
            dy: 0.0,
            net: None,
        })
    }

    fn connect(nl: &mut Netlist, name: &str, ports: Vec<PortId>) {
        nl.add_net(Net {
            id: NetId::from_raw(0),
            name: name.to_string(),
            ports,
            is_supply: false,
        });
    }

    fn run(nl: &Netlist) -> Vec<ProxyNode> {
        let clustering = cluster_nodes(nl);
        beam_place(nl, &clustering, &PlacerConfig::default()).unwrap()
    }

    fn assert_no_overlaps(proxies: &[ProxyNode]) {
        for (i, a) in proxies.iter().enumerate() {
            for b in &proxies[i + 1..] {
                assert!(
                    !a.bounds().overlaps(&b.bounds()),
                    "{:?} overlaps {:?}",
                    a.bounds(),
                    b.bounds()
                );
            }
        }
    }

    #[test]
    fn empty_netlist_places_nothing() {
        assert!(run(&Netlist::new()).is_empty());
    }

    #[test]
    fn single_node_keeps_position() {
        let mut nl = Netlist::new();
        add_node(&mut nl, "only", 10.0, 3.0, 4.0);
        let placed = run(&nl);
        assert_eq!(placed.len(), 1);
        assert_eq!((placed[0].current.x, placed[0].current.y), (3.0, 4.0));
    }

    #[test]
    fn coincident_connected_pair_abuts() {
        // Both nodes start at the origin; the merge must separate them into
        // abutment, leaving the net's HPWL at exactly the cell size.
        let mut nl = Netlist::new();
        let a = add_node(&mut nl, "a", 10.0, 0.0, 0.0);
        let b = add_node(&mut nl, "b", 10.0, 0.0, 0.0);
        let pa = center_port(&mut nl, a);
        let pb = center_port(&mut nl, b);
        connect(&mut nl, "n", vec![pa, pb]);

        let placed = run(&nl);
        assert_no_overlaps(&placed);
        let (ax, ay) = (placed[0].current.x, placed[0].current.y);
        let (bx, by) = (placed[1].current.x, placed[1].current.y);
        let hpwl = (ax - bx).abs() + (ay - by).abs();
        assert!(
            (hpwl - 10.0).abs() < 1e-9,
            "expected abutting centers, hpwl = {hpwl}"
        );
        assert!((ax - bx).abs() >= 10.0 || (ay - by).abs() >= 10.0);
    }

    #[test]
    fn chain_pulls_nodes_together() {
        let mut nl = Netlist::new();
        let a = add_node(&mut nl, "a", 10.0, 0.0, 0.0);
        let b = add_node(&mut nl, "b", 10.0, 40.0, 0.0);
        let c = add_node(&mut nl, "c", 10.0, 80.0, 0.0);
        let pa = center_port(&mut nl, a);
        let pb0 = center_port(&mut nl, b);
        connect(&mut nl, "ab", vec![pa, pb0]);
        let pb1 = center_port(&mut nl, b);
        let pc = center_port(&mut nl, c);
        connect(&mut nl, "bc", vec![pb1, pc]);

        let clustering = cluster_nodes(&nl);
        let ctx = SearchContext::build(&nl, &clustering);
        let initial = slice_hpwl(&build_proxies(&nl), &ctx);

        let placed = run(&nl);
        assert_eq!(placed.len(), 3);
        assert_no_overlaps(&placed);
        assert!(slice_hpwl(&placed, &ctx) < initial);
    }

    #[test]
    fn disconnected_nodes_are_combined() {
        // No nets at all: the combination phase alone must gather the four
        // scattered cells into one compact non-overlapping block.
        let mut nl = Netlist::new();
        add_node(&mut nl, "a", 10.0, 0.0, 0.0);
        add_node(&mut nl, "b", 10.0, 200.0, 0.0);
        add_node(&mut nl, "c", 10.0, 0.0, 200.0);
        add_node(&mut nl, "d", 10.0, 200.0, 200.0);

        let placed = run(&nl);
        assert_eq!(placed.len(), 4);
        assert_no_overlaps(&placed);
        assert!(union_bounds(&placed).area() <= 900.0);
    }

    #[test]
    fn every_node_receives_a_proxy() {
        let mut nl = Netlist::new();
        let mut ports = Vec::new();
        for i in 0..6 {
            let node = add_node(&mut nl, &format!("n{i}"), 6.0, i as f64 * 30.0, 0.0);
            ports.push(center_port(&mut nl, node));
        }
        connect(&mut nl, "bus", ports);

        let placed = run(&nl);
        assert_eq!(placed.len(), 6);
        let ids: Vec<u32> = placed.iter().map(|p| p.node.as_raw()).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4, 5]);
        assert_no_overlaps(&placed);
    }

    #[test]
    fn fixed_node_never_moves() {
        let mut nl = Netlist::new();
        let a = add_node(&mut nl, "a", 10.0, 0.0, 0.0);
        let anchor = nl.add_node(Node {
            id: NodeId::from_raw(0),
            name: "anchor".to_string(),
            width: 10.0,
            height: 10.0,
            ports: Vec::new(),
            placement: Some(Placement::at(40.0, 0.0)),
            is_fixed: true,
        });
        let pa = center_port(&mut nl, a);
        let pb = center_port(&mut nl, anchor);
        connect(&mut nl, "n", vec![pa, pb]);

        let placed = run(&nl);
        assert_no_overlaps(&placed);
        assert_eq!(
            (placed[1].current.x, placed[1].current.y),
            (40.0, 0.0),
            "fixed anchor was displaced"
        );
    }

    /// Two cells whose connecting port sits off-center on `a`, so mirrored
    /// orientations land at measurably different wire lengths.
    fn offset_port_pair(nl: &mut Netlist) {
        let a = add_node(nl, "a", 10.0, 0.0, 0.0);
        let b = add_node(nl, "b", 10.0, 40.0, 0.0);
        let pa = nl.add_port(Port {
            id: PortId::from_raw(0),
            name: "P".to_string(),
            node: a,
            dx: 3.0,
            dy: 0.0,
            net: None,
        });
        let pb = center_port(nl, b);
        connect(nl, "n", vec![pa, pb]);
    }

    #[test]
    fn merge_trials_branch_into_ranked_children() {
        let mut nl = Netlist::new();
        offset_port_pair(&mut nl);

        let clustering = cluster_nodes(&nl);
        let ctx = SearchContext::build(&nl, &clustering);
        let seed = Candidate::seed(build_proxies(&nl), &ctx);
        let children = expand(&seed, &ctx, &PlacerConfig::default()).unwrap();

        assert!(children.len() >= 2, "expansion collapsed to one child");
        assert!(children.iter().all(|c| c.next_pair == 1));
        let min = children.iter().map(|c| c.quality).fold(f64::MAX, f64::min);
        let max = children.iter().map(|c| c.quality).fold(f64::MIN, f64::max);
        assert!(max > min, "every trial ended at quality {min}");
    }

    #[test]
    fn beam_keeps_the_best_orientation_outcome() {
        // The upright merge ends with the off-center port 7 units from its
        // partner; the mirrored one ends at 13. The beam must keep the 7.
        let mut nl = Netlist::new();
        offset_port_pair(&mut nl);

        let clustering = cluster_nodes(&nl);
        let ctx = SearchContext::build(&nl, &clustering);
        let placed = beam_place(&nl, &clustering, &PlacerConfig::default()).unwrap();
        assert_no_overlaps(&placed);
        let hpwl = slice_hpwl(&placed, &ctx);
        assert!((hpwl - 7.0).abs() < 1e-9, "kept a worse trial, hpwl = {hpwl}");
    }

    #[test]
    fn compaction_relocates_a_protruding_node() {
        // Three cells form an L around a free corner; a fourth hangs far off
        // to the right. Compaction must fold it into the corner.
        let mut nl = Netlist::new();
        let a = add_node(&mut nl, "a", 10.0, 0.0, 0.0);
        add_node(&mut nl, "b", 10.0, 10.0, 0.0);
        add_node(&mut nl, "c", 10.0, 0.0, 10.0);
        let d = add_node(&mut nl, "d", 10.0, 60.0, 0.0);
        let pa = center_port(&mut nl, a);
        let pd = center_port(&mut nl, d);
        connect(&mut nl, "n", vec![pa, pd]);

        let clustering = cluster_nodes(&nl);
        let ctx = SearchContext::build(&nl, &clustering);
        let mut proxies = build_proxies(&nl);
        let old_hpwl = slice_hpwl(&proxies, &ctx);
        compact(&mut proxies, &ctx);

        assert_no_overlaps(&proxies);
        assert_eq!((proxies[3].current.x, proxies[3].current.y), (10.0, 10.0));
        assert!((union_bounds(&proxies).area() - 400.0).abs() < 1e-9);
        assert!(slice_hpwl(&proxies, &ctx) < old_hpwl);
    }

    #[test]
    fn compaction_leaves_tight_layouts_alone() {
        // A fully packed pair offers no free rectangle, so every candidate
        // pass must be rejected and the positions restored untouched.
        let mut nl = Netlist::new();
        let a = add_node(&mut nl, "a", 10.0, 0.0, 0.0);
        let b = add_node(&mut nl, "b", 10.0, 10.0, 0.0);
        let pa = center_port(&mut nl, a);
        let pb = center_port(&mut nl, b);
        connect(&mut nl, "n", vec![pa, pb]);

        let clustering = cluster_nodes(&nl);
        let ctx = SearchContext::build(&nl, &clustering);
        let mut proxies = build_proxies(&nl);
        let before: Vec<(f64, f64)> = proxies.iter().map(|p| (p.current.x, p.current.y)).collect();
        compact(&mut proxies, &ctx);
        let after: Vec<(f64, f64)> = proxies.iter().map(|p| (p.current.x, p.current.y)).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn relative_change_is_normalized() {
        assert_eq!(rel(10.0, 10.0), 0.0);
        assert_eq!(rel(5.0, 10.0), -0.5);
        assert_eq!(rel(10.0, 5.0), 0.5);
        assert_eq!(rel(0.0, 0.0), 0.0);
    }

    #[test]
    fn improvement_is_a_percentage() {
        assert_eq!(improvement_pct(100.0, 80.0), 20.0);
        assert_eq!(improvement_pct(100.0, 110.0), -10.0);
        assert_eq!(improvement_pct(0.0, 10.0), 0.0);
    }
}

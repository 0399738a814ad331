//! Row/column placement for uniform-girth cells.
//!
//! When every cell shares the same girth, placement reduces to ordering the
//! cells within vertical stacks of that width. The initial layout partitions
//! cells into stacks of near-equal cumulative length; refinement is either a
//! deterministic force-directed local search (single-threaded) or simulated
//! annealing across worker threads, each stack protected by its own
//! non-blocking busy flag.

use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use trellis_common::{Orientation, Point};
use trellis_config::PlacerConfig;
use trellis_netlist::{net_pairings, Netlist, Placement};

/// Starting annealing temperature.
pub const INITIAL_TEMPERATURE: f64 = 1000.0;

/// Annealing stops once the temperature drops below this.
pub const MIN_TEMPERATURE: f64 = 1.0;

/// Geometric cooling factor applied once per batch.
pub const COOLING_RATE: f64 = 0.99;

/// Linear cooling term applied alongside the geometric factor.
pub const COOLING_OFFSET: f64 = 0.1;

/// Annealing steps between cooling updates.
pub const MOVES_PER_BATCH: usize = 64;

/// Attempts to acquire a stack's busy flag before giving up on the move.
pub const LOCK_RETRIES: usize = 16;

/// Girth tolerance when judging whether the netlist is stackable.
const GIRTH_EPSILON: f64 = 1e-9;

/// Returns the common girth when every node shares one, `None` otherwise.
pub fn uniform_girth(netlist: &Netlist) -> Option<f64> {
    let mut iter = netlist.nodes.iter();
    let first = iter.next()?.girth();
    iter.all(|n| (n.girth() - first).abs() < GIRTH_EPSILON)
        .then_some(first)
}

/// Places uniform-girth nodes into stacks and returns one placement per
/// node, in node order.
pub fn stack_place(netlist: &Netlist, config: &PlacerConfig) -> Vec<Placement> {
    let n = netlist.node_count();
    if n == 0 {
        return Vec::new();
    }
    let girth = uniform_girth(netlist).unwrap_or_else(|| {
        netlist
            .nodes
            .iter()
            .map(|node| node.girth())
            .fold(1.0, f64::max)
    });

    let mut state = StackState::partition(netlist, girth, config.flip_alternate_stacks);
    let deadline = (config.runtime_secs > 0)
        .then(|| Instant::now() + Duration::from_secs(config.runtime_secs));

    if config.num_threads < 2 || state.stacks.len() < 2 {
        let connections = build_connections(netlist);
        if config.force_even_stacks {
            refine_forces(&mut state, netlist, &connections, true, deadline);
        }
        refine_forces(&mut state, netlist, &connections, false, deadline);
    } else {
        refine_anneal(&mut state, netlist, config);
    }
    state.positions()
}

/// One point-to-point pull derived from a net pairing.
struct Connection {
    from: usize,
    from_dx: f64,
    from_dy: f64,
    to: usize,
    to_dx: f64,
    to_dy: f64,
}

fn build_connections(netlist: &Netlist) -> Vec<Connection> {
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
            });
        }
    }
    connections
}

/// The mutable stack arrangement: which nodes sit in which column, bottom-up.
struct StackState {
    girth: f64,
    /// Per node: extent along the stack (the longer footprint side).
    lengths: Vec<f64>,
    /// Per node: whether the footprint must rotate to put the girth across.
    rotated: Vec<bool>,
    stacks: Vec<Vec<usize>>,
    flip_alternate: bool,
}

impl StackState {
    /// Greedy near-equal partition: longest cells first, each onto the
    /// currently shortest stack.
    fn partition(netlist: &Netlist, girth: f64, flip_alternate: bool) -> Self {
        let n = netlist.node_count();
        let lengths: Vec<f64> = netlist
            .nodes
            .iter()
            .map(|node| node.width.max(node.height))
            .collect();
        let rotated: Vec<bool> = netlist
            .nodes
            .iter()
            .map(|node| node.width > node.height)
            .collect();
        let total_area: f64 = netlist.nodes.iter().map(|node| node.width * node.height).sum();
        let max_girth = netlist
            .nodes
            .iter()
            .map(|node| node.girth())
            .fold(girth, f64::max);
        let num_stacks = ((total_area / max_girth).sqrt().round() as usize)
            .clamp(1, n.max(1));

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| lengths[b].total_cmp(&lengths[a]).then(a.cmp(&b)));

        let mut stacks: Vec<Vec<usize>> = vec![Vec::new(); num_stacks];
        let mut used = vec![0.0f64; num_stacks];
        for node in order {
            let target = (0..num_stacks)
                .min_by(|&a, &b| used[a].total_cmp(&used[b]))
                .unwrap_or(0);
            stacks[target].push(node);
            used[target] += lengths[node];
        }

        Self {
            girth,
            lengths,
            rotated,
            stacks,
            flip_alternate,
        }
    }

    fn stack_x(&self, stack: usize) -> f64 {
        stack as f64 * self.girth + self.girth / 2.0
    }

    fn stack_length(&self, stack: usize) -> f64 {
        self.stacks[stack].iter().map(|&m| self.lengths[m]).sum()
    }

    fn orientation_for(&self, node: usize, stack: usize) -> Orientation {
        let base = if self.rotated[node] {
            Orientation::R90
        } else {
            Orientation::R0
        };
        if self.flip_alternate && stack % 2 == 1 {
            base.then(Orientation::MirrorY)
        } else {
            base
        }
    }

    /// Derives one placement per node from the stack ordering.
    fn positions(&self) -> Vec<Placement> {
        let mut placements = vec![Placement::at(0.0, 0.0); self.lengths.len()];
        for (s, stack) in self.stacks.iter().enumerate() {
            let x = self.stack_x(s);
            let mut cursor = 0.0;
            for &node in stack {
                let y = cursor + self.lengths[node] / 2.0;
                cursor += self.lengths[node];
                placements[node] = Placement {
                    x,
                    y,
                    orientation: self.orientation_for(node, s),
                };
            }
        }
        placements
    }

    fn stack_of(&self, node: usize) -> usize {
        self.stacks
            .iter()
            .position(|stack| stack.contains(&node))
            .unwrap_or(0)
    }

    /// Index in `stack` where a cell centered at `y` would sit.
    fn insertion_index(&self, stack: usize, y: f64) -> usize {
        let mut cursor = 0.0;
        for (i, &m) in self.stacks[stack].iter().enumerate() {
            let mid = cursor + self.lengths[m] / 2.0;
            if y < mid {
                return i;
            }
            cursor += self.lengths[m];
        }
        self.stacks[stack].len()
    }
}

fn port_pos(placement: Placement, dx: f64, dy: f64) -> Point {
    let (ox, oy) = placement.orientation.apply(dx, dy);
    Point::new(placement.x + ox, placement.y + oy)
}

fn hpwl_with(netlist: &Netlist, placements: &[Placement]) -> f64 {
    netlist
        .nets
        .iter()
        .filter(|net| net.ports.len() >= 2)
        .map(|net| {
            let mut min = Point::new(f64::MAX, f64::MAX);
            let mut max = Point::new(f64::MIN, f64::MIN);
            for &p in &net.ports {
                let port = netlist.port(p);
                let pos = port_pos(placements[port.node.index()], port.dx, port.dy);
                min.x = min.x.min(pos.x);
                min.y = min.y.min(pos.y);
                max.x = max.x.max(pos.x);
                max.y = max.y.max(pos.y);
            }
            (max.x - min.x) + (max.y - min.y)
        })
        .sum()
}

/// Force-directed refinement: repeatedly move the node with the strongest
/// pull to its force-implied stack and position, committing only strict HPWL
/// improvements. With `equalize` set, pulls out of longer stacks into
/// shorter ones are amplified so stack lengths stay balanced.
fn refine_forces(
    state: &mut StackState,
    netlist: &Netlist,
    connections: &[Connection],
    equalize: bool,
    deadline: Option<Instant>,
) {
    let n = state.lengths.len();
    let num_stacks = state.stacks.len();
    let total_length: f64 = state.lengths.iter().sum();
    let mut failed = vec![false; n];
    let mut current = hpwl_with(netlist, &state.positions());

    loop {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        let placements = state.positions();

        let mut pulls = vec![(0.0f64, 0.0f64, 0usize); n];
        for c in connections {
            let from = port_pos(placements[c.from], c.from_dx, c.from_dy);
            let to = port_pos(placements[c.to], c.to_dx, c.to_dy);
            pulls[c.from].0 += to.x - from.x;
            pulls[c.from].1 += to.y - from.y;
            pulls[c.from].2 += 1;
            pulls[c.to].0 += from.x - to.x;
            pulls[c.to].1 += from.y - to.y;
            pulls[c.to].2 += 1;
        }

        // Strongest weighted pull among nodes that have not failed yet.
        let mut best: Option<(usize, usize, f64, f64)> = None;
        for (node, &(sx, sy, count)) in pulls.iter().enumerate() {
            if failed[node] || count == 0 {
                continue;
            }
            let (fx, fy) = (sx / count as f64, sy / count as f64);
            let source = state.stack_of(node);
            let tx = placements[node].x + fx;
            let target = (((tx - state.girth / 2.0) / state.girth).round() as i64)
                .clamp(0, num_stacks as i64 - 1) as usize;
            let mut magnitude = fx.abs() + fy.abs();
            if equalize && total_length > 0.0 {
                let imbalance = state.stack_length(source) - state.stack_length(target);
                if imbalance > 0.0 {
                    magnitude *= 1.0 + imbalance / total_length;
                }
            }
            let ty = placements[node].y + fy;
            if best.is_none_or(|(_, _, _, m)| magnitude > m) {
                best = Some((node, target, ty, magnitude));
            }
        }
        let Some((node, target, ty, _)) = best else {
            break;
        };

        let source = state.stack_of(node);
        let Some(source_index) = state.stacks[source].iter().position(|&m| m == node) else {
            break;
        };
        state.stacks[source].remove(source_index);
        let insert_at = state.insertion_index(target, ty);
        state.stacks[target].insert(insert_at, node);

        let trial = hpwl_with(netlist, &state.positions());
        if trial < current {
            current = trial;
            failed.fill(false);
        } else {
            state.stacks[target].remove(insert_at);
            state.stacks[source].insert(source_index, node);
            failed[node] = true;
        }
    }
}

/// Shared annealing state: stacks behind busy flags plus atomically
/// published per-node coordinates, re-derived under the lock after each
/// accepted move.
struct AnnealShared<'a> {
    netlist: &'a Netlist,
    girth: f64,
    lengths: &'a [f64],
    rotated: &'a [bool],
    flip_alternate: bool,
    stacks: Vec<Mutex<Vec<usize>>>,
    stack_of: Vec<AtomicUsize>,
    stack_len: Vec<AtomicU64>,
    ys: Vec<AtomicU64>,
    /// Per node: indices of the nets touching it.
    incident: Vec<Vec<usize>>,
}

impl AnnealShared<'_> {
    fn orientation_for(&self, node: usize, stack: usize) -> Orientation {
        let base = if self.rotated[node] {
            Orientation::R90
        } else {
            Orientation::R0
        };
        if self.flip_alternate && stack % 2 == 1 {
            base.then(Orientation::MirrorY)
        } else {
            base
        }
    }

    fn stack_x(&self, stack: usize) -> f64 {
        stack as f64 * self.girth + self.girth / 2.0
    }

    /// Published placement of a node; members of locked stacks should be
    /// read through an override map instead.
    fn published(&self, node: usize) -> Placement {
        let stack = self.stack_of[node].load(Ordering::Acquire);
        Placement {
            x: self.stack_x(stack),
            y: f64::from_bits(self.ys[node].load(Ordering::Acquire)),
            orientation: self.orientation_for(node, stack),
        }
    }

    fn length_of_stack(&self, stack: usize) -> f64 {
        f64::from_bits(self.stack_len[stack].load(Ordering::Acquire))
    }

    /// (stack, y) per member derived from a stack's authoritative order.
    fn derive(&self, stack: usize, members: &[usize], into: &mut HashMap<usize, (usize, f64)>) {
        let mut cursor = 0.0;
        for &m in members {
            into.insert(m, (stack, cursor + self.lengths[m] / 2.0));
            cursor += self.lengths[m];
        }
    }

    /// HPWL of the nets incident on `node`, with locked-stack members taken
    /// from `overrides`.
    fn local_cost(&self, node: usize, overrides: &HashMap<usize, (usize, f64)>) -> f64 {
        let mut total = 0.0;
        for &net_idx in &self.incident[node] {
            let net = &self.netlist.nets[net_idx];
            if net.ports.len() < 2 {
                continue;
            }
            let mut min = Point::new(f64::MAX, f64::MAX);
            let mut max = Point::new(f64::MIN, f64::MIN);
            for &p in &net.ports {
                let port = self.netlist.port(p);
                let m = port.node.index();
                let placement = match overrides.get(&m) {
                    Some(&(stack, y)) => Placement {
                        x: self.stack_x(stack),
                        y,
                        orientation: self.orientation_for(m, stack),
                    },
                    None => self.published(m),
                };
                let pos = port_pos(placement, port.dx, port.dy);
                min.x = min.x.min(pos.x);
                min.y = min.y.min(pos.y);
                max.x = max.x.max(pos.x);
                max.y = max.y.max(pos.y);
            }
            total += (max.x - min.x) + (max.y - min.y);
        }
        total
    }
}

/// Temperature after a fractional number of cooling batches: the closed form
/// of the recurrence `T <- T * COOLING_RATE - COOLING_OFFSET`.
fn temperature_after(batches: f64) -> f64 {
    let pivot = -COOLING_OFFSET / (1.0 - COOLING_RATE);
    COOLING_RATE.powf(batches) * (INITIAL_TEMPERATURE - pivot) + pivot
}

/// Batches the cooling schedule spans before reaching `MIN_TEMPERATURE`.
fn schedule_batches() -> f64 {
    let pivot = -COOLING_OFFSET / (1.0 - COOLING_RATE);
    ((MIN_TEMPERATURE - pivot) / (INITIAL_TEMPERATURE - pivot)).ln() / COOLING_RATE.ln()
}

fn try_acquire<'a>(flag: &'a Mutex<Vec<usize>>) -> Option<MutexGuard<'a, Vec<usize>>> {
    for _ in 0..LOCK_RETRIES {
        if let Ok(guard) = flag.try_lock() {
            return Some(guard);
        }
        std::hint::spin_loop();
    }
    None
}

fn refine_anneal(state: &mut StackState, netlist: &Netlist, config: &PlacerConfig) {
    let num_stacks = state.stacks.len();
    let placements = state.positions();
    let incident: Vec<Vec<usize>> = {
        let mut incident = vec![Vec::new(); state.lengths.len()];
        for (i, net) in netlist.nets.iter().enumerate() {
            for node in netlist.net_nodes(net.id) {
                incident[node.index()].push(i);
            }
        }
        incident
    };
    let stack_of: Vec<AtomicUsize> = (0..state.lengths.len())
        .map(|node| AtomicUsize::new(state.stack_of(node)))
        .collect();
    let stack_len: Vec<AtomicU64> = (0..num_stacks)
        .map(|s| AtomicU64::new(state.stack_length(s).to_bits()))
        .collect();
    let ys: Vec<AtomicU64> = placements
        .iter()
        .map(|p| AtomicU64::new(p.y.to_bits()))
        .collect();

    let shared = AnnealShared {
        netlist,
        girth: state.girth,
        lengths: &state.lengths,
        rotated: &state.rotated,
        flip_alternate: state.flip_alternate,
        stacks: state.stacks.drain(..).map(Mutex::new).collect(),
        stack_of,
        stack_len,
        ys,
        incident,
    };

    let budget = (config.runtime_secs > 0).then(|| Duration::from_secs(config.runtime_secs));
    let span = schedule_batches();
    let start = Instant::now();

    std::thread::scope(|scope| {
        for _ in 0..config.num_threads {
            scope.spawn(|| {
                let mut rng = rand::thread_rng();
                match budget {
                    // Pace the schedule by elapsed wall clock, so cooling
                    // reaches MIN_TEMPERATURE exactly at the runtime budget
                    // no matter how fast batches run.
                    Some(total) => loop {
                        let fraction = start.elapsed().as_secs_f64() / total.as_secs_f64();
                        if fraction >= 1.0 {
                            break;
                        }
                        let temperature = temperature_after(fraction * span);
                        for _ in 0..MOVES_PER_BATCH {
                            anneal_step(&shared, &mut rng, temperature, num_stacks);
                        }
                    },
                    None => {
                        let mut temperature = INITIAL_TEMPERATURE;
                        while temperature >= MIN_TEMPERATURE {
                            for _ in 0..MOVES_PER_BATCH {
                                anneal_step(&shared, &mut rng, temperature, num_stacks);
                            }
                            temperature = temperature * COOLING_RATE - COOLING_OFFSET;
                        }
                    }
                }
            });
        }
    });

    state.stacks = shared
        .stacks
        .into_iter()
        .map(|m| m.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner()))
        .collect();
}

/// One annealing move: pick a node from a longer stack, propose a random
/// insertion point in a shorter stack, accept on HPWL gain or by the
/// Metropolis rule. Both touched stacks stay locked from proposal through
/// commit, so no partial move is ever visible.
fn anneal_step(shared: &AnnealShared<'_>, rng: &mut impl Rng, temperature: f64, num_stacks: usize) {
    // Selection bias: sources lean long, destinations lean short.
    let (s1, s2) = (rng.gen_range(0..num_stacks), rng.gen_range(0..num_stacks));
    let source = if shared.length_of_stack(s1) >= shared.length_of_stack(s2) {
        s1
    } else {
        s2
    };
    let (t1, t2) = (rng.gen_range(0..num_stacks), rng.gen_range(0..num_stacks));
    let target = if shared.length_of_stack(t1) <= shared.length_of_stack(t2) {
        t1
    } else {
        t2
    };

    let Some(mut source_guard) = try_acquire(&shared.stacks[source]) else {
        return;
    };
    if source_guard.is_empty() {
        return;
    }
    let mut target_guard = if target != source {
        // Second acquisition failing releases both; the caller retries with
        // fresh stacks.
        match try_acquire(&shared.stacks[target]) {
            Some(guard) => Some(guard),
            None => return,
        }
    } else {
        None
    };

    let source_index = rng.gen_range(0..source_guard.len());
    let node = source_guard[source_index];

    // Authoritative positions for both locked stacks, before the move.
    let mut before = HashMap::new();
    shared.derive(source, &source_guard, &mut before);
    if let Some(guard) = &target_guard {
        shared.derive(target, guard, &mut before);
    }
    let old_cost = shared.local_cost(node, &before);

    // Propose: remove from the source, insert at a random point.
    let mut new_source: Vec<usize> = source_guard.clone();
    new_source.remove(source_index);
    let mut new_target: Vec<usize> = match &target_guard {
        Some(guard) => (*guard).clone(),
        None => new_source.clone(),
    };
    if target == source {
        new_source = Vec::new();
    }
    let insert_at = rng.gen_range(0..=new_target.len());
    new_target.insert(insert_at, node);

    let mut after = HashMap::new();
    if target != source {
        shared.derive(source, &new_source, &mut after);
    }
    shared.derive(target, &new_target, &mut after);
    let new_cost = shared.local_cost(node, &after);

    let gain = old_cost - new_cost;
    let accept = gain > 0.0 || rng.gen::<f64>() < (gain / temperature).exp();
    if !accept {
        return;
    }

    // Commit under both locks, then publish the derived coordinates.
    match &mut target_guard {
        Some(guard) => {
            **guard = new_target;
            *source_guard = new_source;
        }
        None => *source_guard = new_target,
    }
    shared.stack_of[node].store(target, Ordering::Release);
    for (&m, &(stack, y)) in &after {
        shared.stack_of[m].store(stack, Ordering::Release);
        shared.ys[m].store(y.to_bits(), Ordering::Release);
    }
    let source_len: f64 = source_guard.iter().map(|&m| shared.lengths[m]).sum();
    shared.stack_len[source].store(source_len.to_bits(), Ordering::Release);
    if let Some(guard) = &target_guard {
        let target_len: f64 = guard.iter().map(|&m| shared.lengths[m]).sum();
        shared.stack_len[target].store(target_len.to_bits(), Ordering::Release);
    }
}

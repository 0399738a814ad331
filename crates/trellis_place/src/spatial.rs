//! Incremental spatial index over mutable axis-aligned rectangles.
//!
//! A dynamic bounding-box tree: every payload lives in a leaf, internal nodes
//! carry the union of their children's bounds. Moving an entry unlinks its
//! leaf and relinks it at the new position; the tree is never rebuilt.
//! Queries must return every entry whose bounds intersect the window — a
//! false negative is a correctness bug, so leaf bounds are tested exactly.

use std::collections::HashMap;
use std::hash::Hash;
use trellis_common::Rect;

const NIL: usize = usize::MAX;

#[derive(Debug, Clone)]
struct TreeNode<P> {
    rect: Rect,
    parent: usize,
    left: usize,
    right: usize,
    /// `Some` for leaves, `None` for internal nodes.
    payload: Option<P>,
}

/// An incremental bounding-box tree mapping payloads to rectangles.
///
/// Payloads are caller-chosen handles (cluster or proxy IDs); each payload
/// may appear at most once.
#[derive(Debug, Clone)]
pub struct SpatialIndex<P: Copy + Eq + Hash> {
    nodes: Vec<TreeNode<P>>,
    free: Vec<usize>,
    root: usize,
    leaves: HashMap<P, usize>,
}

impl<P: Copy + Eq + Hash> SpatialIndex<P> {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            root: NIL,
            leaves: HashMap::new(),
        }
    }

    /// Number of entries in the index.
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    /// Returns `true` if the index holds no entries.
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Returns `true` if the payload is present.
    pub fn contains(&self, payload: P) -> bool {
        self.leaves.contains_key(&payload)
    }

    /// The bounds currently stored for a payload.
    pub fn rect_of(&self, payload: P) -> Option<Rect> {
        self.leaves.get(&payload).map(|&leaf| self.nodes[leaf].rect)
    }

    /// Inserts a payload with the given bounds.
    ///
    /// Replaces the existing entry if the payload is already present.
    pub fn insert(&mut self, rect: Rect, payload: P) {
        if self.leaves.contains_key(&payload) {
            self.remove(payload);
        }
        let leaf = self.alloc(TreeNode {
            rect,
            parent: NIL,
            left: NIL,
            right: NIL,
            payload: Some(payload),
        });
        self.leaves.insert(payload, leaf);
        self.link_leaf(leaf);
    }

    /// Removes a payload from the index. Returns `true` if it was present.
    pub fn remove(&mut self, payload: P) -> bool {
        let Some(leaf) = self.leaves.remove(&payload) else {
            return false;
        };
        self.unlink_leaf(leaf);
        self.release(leaf);
        true
    }

    /// Moves an entry to new bounds by unlinking and relinking its leaf.
    ///
    /// Returns `false` if the payload is not present.
    pub fn relocate(&mut self, payload: P, rect: Rect) -> bool {
        let Some(&leaf) = self.leaves.get(&payload) else {
            return false;
        };
        self.unlink_leaf(leaf);
        self.nodes[leaf].rect = rect;
        self.link_leaf(leaf);
        true
    }

    /// Returns every payload whose bounds intersect the window (touching counts).
    pub fn query(&self, window: &Rect) -> Vec<P> {
        self.collect(window, Rect::intersects)
    }

    /// Returns every payload whose bounds share positive area with the window.
    pub fn query_overlapping(&self, window: &Rect) -> Vec<P> {
        self.collect(window, Rect::overlaps)
    }

    fn collect(&self, window: &Rect, test: fn(&Rect, &Rect) -> bool) -> Vec<P> {
        let mut out = Vec::new();
        if self.root == NIL {
            return out;
        }
        let mut stack = vec![self.root];
        while let Some(i) = stack.pop() {
            let node = &self.nodes[i];
            if !node.rect.intersects(window) {
                continue;
            }
            match node.payload {
                Some(p) => {
                    if test(&node.rect, window) {
                        out.push(p);
                    }
                }
                None => {
                    stack.push(node.left);
                    stack.push(node.right);
                }
            }
        }
        out
    }

    fn alloc(&mut self, node: TreeNode<P>) -> usize {
        if let Some(i) = self.free.pop() {
            self.nodes[i] = node;
            i
        } else {
            self.nodes.push(node);
            self.nodes.len() - 1
        }
    }

    fn release(&mut self, i: usize) {
        self.nodes[i].payload = None;
        self.free.push(i);
    }

    /// Attaches a detached leaf into the tree, descending toward the sibling
    /// whose union with the new rect grows the least.
    fn link_leaf(&mut self, leaf: usize) {
        let rect = self.nodes[leaf].rect;
        if self.root == NIL {
            self.root = leaf;
            self.nodes[leaf].parent = NIL;
            return;
        }

        let mut cursor = self.root;
        while self.nodes[cursor].payload.is_none() {
            let left = self.nodes[cursor].left;
            let right = self.nodes[cursor].right;
            let grow_left =
                self.nodes[left].rect.union(&rect).area() - self.nodes[left].rect.area();
            let grow_right =
                self.nodes[right].rect.union(&rect).area() - self.nodes[right].rect.area();
            cursor = if grow_left <= grow_right { left } else { right };
        }

        // Split: replace the sibling with a new internal node over both.
        let old_parent = self.nodes[cursor].parent;
        let joint = self.alloc(TreeNode {
            rect: self.nodes[cursor].rect.union(&rect),
            parent: old_parent,
            left: cursor,
            right: leaf,
            payload: None,
        });
        self.nodes[cursor].parent = joint;
        self.nodes[leaf].parent = joint;
        if old_parent == NIL {
            self.root = joint;
        } else if self.nodes[old_parent].left == cursor {
            self.nodes[old_parent].left = joint;
        } else {
            self.nodes[old_parent].right = joint;
        }
        self.refit_upward(old_parent);
    }

    /// Detaches a leaf, collapsing its parent into the sibling.
    fn unlink_leaf(&mut self, leaf: usize) {
        let parent = self.nodes[leaf].parent;
        if parent == NIL {
            self.root = NIL;
            return;
        }
        let sibling = if self.nodes[parent].left == leaf {
            self.nodes[parent].right
        } else {
            self.nodes[parent].left
        };
        let grandparent = self.nodes[parent].parent;
        self.nodes[sibling].parent = grandparent;
        if grandparent == NIL {
            self.root = sibling;
        } else if self.nodes[grandparent].left == parent {
            self.nodes[grandparent].left = sibling;
        } else {
            self.nodes[grandparent].right = sibling;
        }
        self.release(parent);
        self.nodes[leaf].parent = NIL;
        self.refit_upward(grandparent);
    }

    fn refit_upward(&mut self, mut i: usize) {
        while i != NIL {
            let left = self.nodes[i].left;
            let right = self.nodes[i].right;
            self.nodes[i].rect = self.nodes[left].rect.union(&self.nodes[right].rect);
            i = self.nodes[i].parent;
        }
    }
}

impl<P: Copy + Eq + Hash> Default for SpatialIndex<P> {
    fn default() -> Self {
        Self::new()
    }
}

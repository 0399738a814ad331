//! Structural-sharing storage for placement candidates.
//!
//! The beam search copies its full proxy/cluster graph at every step. To keep
//! that cheap, records live in a [`SharedVec`]: a chunked vector whose chunks
//! are reference-counted. Cloning a `SharedVec` clones only the chunk pointer
//! table; the first write to a shared chunk copies that one chunk. Cloning a
//! candidate is therefore O(changed records), not O(all records).

use std::sync::Arc;

/// Records per chunk. Small enough that a copy-on-write is cheap, large
/// enough that the pointer table stays short.
const CHUNK: usize = 32;

/// A chunked copy-on-write vector.
#[derive(Debug, Clone)]
pub struct SharedVec<T: Clone> {
    chunks: Vec<Arc<Vec<T>>>,
    len: usize,
}

impl<T: Clone> SharedVec<T> {
    /// Creates an empty vector.
    pub fn new() -> Self {
        Self {
            chunks: Vec::new(),
            len: 0,
        }
    }

    /// Builds a shared vector from an owned one.
    pub fn from_vec(items: Vec<T>) -> Self {
        let len = items.len();
        let mut chunks = Vec::with_capacity(len.div_ceil(CHUNK));
        let mut items = items.into_iter();
        loop {
            let chunk: Vec<T> = items.by_ref().take(CHUNK).collect();
            if chunk.is_empty() {
                break;
            }
            chunks.push(Arc::new(chunk));
        }
        Self { chunks, len }
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if there are no records.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns a reference to the record at `index`.
    pub fn get(&self, index: usize) -> &T {
        &self.chunks[index / CHUNK][index % CHUNK]
    }

    /// Returns a mutable reference to the record at `index`, copying the
    /// containing chunk first if it is shared with another candidate.
    pub fn get_mut(&mut self, index: usize) -> &mut T {
        let chunk = Arc::make_mut(&mut self.chunks[index / CHUNK]);
        &mut chunk[index % CHUNK]
    }

    /// Appends a record.
    pub fn push(&mut self, value: T) {
        if self.len % CHUNK == 0 {
            self.chunks.push(Arc::new(Vec::with_capacity(CHUNK)));
        }
        let last = self.chunks.len() - 1;
        Arc::make_mut(&mut self.chunks[last]).push(value);
        self.len += 1;
    }

    /// Iterates over all records.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.chunks.iter().flat_map(|c| c.iter())
    }
}

impl<T: Clone> Default for SharedVec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> FromIterator<T> for SharedVec<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

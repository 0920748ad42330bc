use std::cmp::Ordering;

use crate::key::Key;

/// One merge candidate: the raw line to emit, its parsed ordering key and
/// the index of the reader it came from. Ordering delegates to the key,
/// so a `BinaryHeap<Reverse<HeapNode>>` pops the smallest record first.
#[derive(Debug)]
pub(crate) struct HeapNode {
    source: usize,
    line: String,
    key: Key,
}

impl HeapNode {
    pub(crate) fn new(source: usize, line: String, key: Key) -> HeapNode {
        HeapNode { source, line, key }
    }

    pub(crate) fn source(&self) -> usize {
        self.source
    }

    pub(crate) fn line(&self) -> &str {
        &self.line
    }
}

impl Eq for HeapNode {}

impl PartialEq<Self> for HeapNode {
    fn eq(&self, other: &Self) -> bool {
        self.key.eq(&other.key)
    }
}

impl PartialOrd<Self> for HeapNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapNode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

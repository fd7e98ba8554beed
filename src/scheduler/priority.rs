use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;

/// A queued value with its key and the sequence number it was pushed with.
#[derive(Debug)]
struct Entry<K, T> {
    key: K,
    seq: u64,
    value: T,
}

impl<K: Ord, T> PartialEq for Entry<K, T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl<K: Ord, T> Eq for Entry<K, T> {}

impl<K: Ord, T> PartialOrd for Entry<K, T> {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl<K: Ord, T> Ord for Entry<K, T> {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Larger key first, then older entry first.
        self.key
            .cmp(&other.key)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Max-priority queue with FIFO tie-breaking.
///
/// Every push gets a fresh sequence number, so no two entries ever compare
/// equal and the pop order is a strict total order. Not synchronized: the
/// executor keeps it behind its own lock.
#[derive(Debug)]
pub struct PriorityQueue<K, T> {
    heap: BinaryHeap<Entry<K, T>>,
    next_seq: u64,
}

impl<K: Ord, T> PriorityQueue<K, T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(capacity),
            next_seq: 0,
        }
    }

    pub fn push(&mut self, key: K, value: T) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry { key, seq, value });
    }

    pub fn pop(&mut self) -> Option<T> {
        self.heap.pop().map(|entry| entry.value)
    }

    pub fn peek_key(&self) -> Option<&K> {
        self.heap.peek().map(|entry| &entry.key)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl<K: Ord, T> Default for PriorityQueue<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

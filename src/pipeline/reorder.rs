//! Restores page order behind a concurrent worker pool.

use std::collections::BTreeMap;

/// Holds out-of-order items until every predecessor has arrived.
#[derive(Debug)]
pub struct ReorderBuffer<T> {
    next: usize,
    pending: BTreeMap<usize, T>,
}

impl<T> ReorderBuffer<T> {
    /// `first` is the index expected first (1 for pages).
    pub fn new(first: usize) -> Self {
        Self {
            next: first,
            pending: BTreeMap::new(),
        }
    }

    /// Accept `item` at `index` and return every item now releasable, in order.
    pub fn push(&mut self, index: usize, item: T) -> Vec<T> {
        self.pending.insert(index, item);
        let mut ready = Vec::new();
        while let Some(item) = self.pending.remove(&self.next) {
            ready.push(item);
            self.next += 1;
        }
        ready
    }

    /// Items waiting on a predecessor.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn releases_only_contiguous_prefix() {
        let mut buf = ReorderBuffer::new(1);
        assert!(buf.push(3, "c").is_empty());
        assert!(buf.push(2, "b").is_empty());
        assert_eq!(buf.pending(), 2);
        assert_eq!(buf.push(1, "a"), vec!["a", "b", "c"]);
        assert_eq!(buf.push(4, "d"), vec!["d"]);
        assert_eq!(buf.pending(), 0);
    }
}

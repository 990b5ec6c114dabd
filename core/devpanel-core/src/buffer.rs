//! Fixed-capacity, insertion-ordered history.
//!
//! Entries are kept oldest-first. Pushing past capacity evicts from the front,
//! so the buffer always holds the most recent `capacity` items in the order
//! they arrived. Every category uses this one policy.

use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq)]
pub struct BoundedBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedBuffer<T> {
    /// A zero capacity is bumped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Builds a buffer from oldest-first items, keeping only the newest `capacity`.
    pub fn from_items(capacity: usize, items: impl IntoIterator<Item = T>) -> Self {
        let mut buffer = Self::new(capacity);
        for item in items {
            buffer.push(item);
        }
        buffer
    }

    /// Appends an item, returning the evicted oldest item if the buffer was full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() == self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Oldest-first iteration.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }

    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn find(&self, predicate: impl Fn(&T) -> bool) -> Option<&T> {
        self.items.iter().find(|item| predicate(*item))
    }
}

impl<T: Clone> BoundedBuffer<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ten_inserts_into_capacity_five_keep_six_to_ten() {
        let mut buffer = BoundedBuffer::new(5);
        for i in 1..=10 {
            buffer.push(i);
        }
        assert_eq!(buffer.to_vec(), vec![6, 7, 8, 9, 10]);
    }

    #[test]
    fn length_is_min_of_inserts_and_capacity() {
        for capacity in [1usize, 3, 8] {
            let mut buffer = BoundedBuffer::new(capacity);
            for inserted in 1..=20usize {
                buffer.push(inserted);
                assert_eq!(buffer.len(), inserted.min(capacity));
                let expected: Vec<usize> =
                    (inserted.saturating_sub(capacity) + 1..=inserted).collect();
                assert_eq!(buffer.to_vec(), expected);
            }
        }
    }

    #[test]
    fn push_reports_evicted_item() {
        let mut buffer = BoundedBuffer::new(2);
        assert_eq!(buffer.push("a"), None);
        assert_eq!(buffer.push("b"), None);
        assert_eq!(buffer.push("c"), Some("a"));
        assert_eq!(buffer.latest(), Some(&"c"));
    }

    #[test]
    fn from_items_trims_to_newest() {
        let buffer = BoundedBuffer::from_items(3, 1..=7);
        assert_eq!(buffer.to_vec(), vec![5, 6, 7]);
    }

    #[test]
    fn zero_capacity_holds_one() {
        let mut buffer = BoundedBuffer::new(0);
        buffer.push(1);
        buffer.push(2);
        assert_eq!(buffer.capacity(), 1);
        assert_eq!(buffer.to_vec(), vec![2]);
    }
}

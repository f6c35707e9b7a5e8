//! Bounded, newest-first sample sequences.
//!
//! A [`Series`] grows at the head as live samples arrive and evicts at the
//! tail once its capacity is exceeded. Eviction is the only backpressure in
//! the engine: memory stays bounded and historical depth is what gives.

pub mod store;

use std::collections::VecDeque;

use crate::aggregate::BarSource;
use crate::models::{Bar, Tick};

pub use store::SeriesStore;

/// Anything stamped with an instant.
pub trait Timed {
    fn time(&self) -> i64;
}

impl Timed for Bar {
    fn time(&self) -> i64 {
        self.time
    }
}

impl Timed for Tick {
    fn time(&self) -> i64 {
        self.time
    }
}

/// Newest-first ring of samples with a fixed maximum length.
#[derive(Debug, Clone)]
pub struct Series<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T: Timed> Series<T> {
    /// Creates an empty series retaining at most `capacity` items.
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::new(),
            capacity,
        }
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

    /// True once the series holds as many items as it may retain.
    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn head(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn head_mut(&mut self) -> Option<&mut T> {
        self.items.front_mut()
    }

    /// The oldest retained item.
    pub fn tail(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    /// Iterates newest to oldest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// Pushes a new newest item, returning the evicted oldest one if any.
    pub fn push_head(&mut self, item: T) -> Option<T> {
        self.items.push_front(item);
        if self.items.len() > self.capacity {
            self.items.pop_back()
        } else {
            None
        }
    }

    /// Appends an item older than the current tail.
    ///
    /// Returns `false` when the series is already full or the item is not
    /// strictly older than the tail.
    pub fn push_tail(&mut self, item: T) -> bool {
        if self.is_full() {
            return false;
        }
        if let Some(tail) = self.items.back() {
            if item.time() >= tail.time() {
                return false;
            }
        }
        self.items.push_back(item);
        true
    }

    /// Inserts `item` at its time position, replacing an item with the same
    /// time. An insert past the tail of a full series is dropped.
    pub fn upsert(&mut self, item: T) {
        let time = item.time();
        let index = self.items.partition_point(|x| x.time() > time);
        match self.items.get_mut(index) {
            Some(existing) if existing.time() == time => *existing = item,
            _ => {
                self.items.insert(index, item);
                if self.items.len() > self.capacity {
                    self.items.pop_back();
                }
            }
        }
    }

    /// Whether an item stamped exactly `time` is held.
    pub fn contains_time(&self, time: i64) -> bool {
        let index = self.items.partition_point(|x| x.time() > time);
        self.items.get(index).is_some_and(|x| x.time() == time)
    }

    /// Replaces the whole series with newest-first `items`, keeping only the
    /// newest `capacity` of them.
    pub fn replace(&mut self, items: Vec<T>) {
        self.items = items.into_iter().take(self.capacity).collect();
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl BarSource for Series<Bar> {
    fn len(&self) -> usize {
        self.items.len()
    }

    fn bar(&self, index: usize) -> &Bar {
        &self.items[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bar(time: i64) -> Bar {
        Bar::flat(time, dec!(1))
    }

    fn times(series: &Series<Bar>) -> Vec<i64> {
        series.iter().map(|b| b.time).collect()
    }

    #[test]
    fn push_head_evicts_oldest_past_capacity() {
        let mut series = Series::new(3);
        for t in 1..=3 {
            assert!(series.push_head(bar(t)).is_none());
        }
        assert!(series.is_full());
        let evicted = series.push_head(bar(4));
        assert_eq!(evicted.map(|b| b.time), Some(1));
        assert_eq!(times(&series), vec![4, 3, 2]);
    }

    #[test]
    fn push_tail_only_accepts_older_items() {
        let mut series = Series::new(3);
        series.push_head(bar(10));
        assert!(!series.push_tail(bar(10)));
        assert!(series.push_tail(bar(5)));
        assert!(series.push_tail(bar(1)));
        assert!(!series.push_tail(bar(0)));
        assert_eq!(times(&series), vec![10, 5, 1]);
    }

    #[test]
    fn upsert_inserts_in_order_and_replaces_same_time() {
        let mut series = Series::new(4);
        series.replace(vec![bar(30), bar(10)]);
        series.upsert(bar(20));
        series.upsert(Bar::flat(10, dec!(9)));
        assert_eq!(times(&series), vec![30, 20, 10]);
        assert_eq!(series.tail().map(|b| b.close), Some(dec!(9)));
        assert!(series.contains_time(20));
        assert!(!series.contains_time(25));
    }

    #[test]
    fn replace_truncates_to_capacity() {
        let mut series = Series::new(2);
        series.replace(vec![bar(3), bar(2), bar(1)]);
        assert_eq!(times(&series), vec![3, 2]);
    }
}

//! Fixed-capacity ring buffers for location history and the alert log.
//!
//! The only removal path is capacity-driven eviction. Iteration order is the
//! buffer's discipline: oldest-first for `Fifo`, newest-first for `NewestFirst`.

use std::collections::VecDeque;

use crate::types::{DetectionAlert, LocationSample};

/// Default location history capacity.
pub const LOCATION_CAPACITY: usize = 100;

/// Default alert log capacity.
pub const ALERT_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discipline {
    /// Append at the tail, evict from the head.
    Fifo,
    /// Insert at the head, evict from the tail.
    NewestFirst,
}

#[derive(Debug, Clone)]
pub struct HistoryBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
    discipline: Discipline,
}

/// Location samples, oldest first.
pub type LocationHistory = HistoryBuffer<LocationSample>;

/// Detection alerts, newest first.
pub type AlertLog = HistoryBuffer<DetectionAlert>;

impl<T> HistoryBuffer<T> {
    /// A capacity of zero is bumped to one so the buffer always holds the
    /// latest item.
    pub fn new(capacity: usize, discipline: Discipline) -> Self {
        let capacity = capacity.max(1);
        HistoryBuffer {
            items: VecDeque::with_capacity(capacity),
            capacity,
            discipline,
        }
    }

    pub fn fifo(capacity: usize) -> Self {
        Self::new(capacity, Discipline::Fifo)
    }

    pub fn newest_first(capacity: usize) -> Self {
        Self::new(capacity, Discipline::NewestFirst)
    }

    /// Add an item, evicting the oldest once over capacity.
    /// Returns the evicted item, if any.
    pub fn append(&mut self, item: T) -> Option<T> {
        match self.discipline {
            Discipline::Fifo => {
                self.items.push_back(item);
                if self.items.len() > self.capacity {
                    self.items.pop_front()
                } else {
                    None
                }
            }
            Discipline::NewestFirst => {
                self.items.push_front(item);
                if self.items.len() > self.capacity {
                    self.items.pop_back()
                } else {
                    None
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn discipline(&self) -> Discipline {
        self.discipline
    }

    /// Iterate in the buffer's order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator + '_ {
        self.items.iter()
    }

    /// The most recently appended item.
    pub fn newest(&self) -> Option<&T> {
        match self.discipline {
            Discipline::Fifo => self.items.back(),
            Discipline::NewestFirst => self.items.front(),
        }
    }

    /// The `n` most recent items, still in the buffer's order.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &T> + '_ {
        let n = n.min(self.items.len());
        let skip = match self.discipline {
            Discipline::Fifo => self.items.len() - n,
            Discipline::NewestFirst => 0,
        };
        self.items.iter().skip(skip).take(n)
    }

    /// The `n` most recent items in chronological (oldest-first) order,
    /// regardless of discipline.
    pub fn recent_chronological(&self, n: usize) -> Vec<&T> {
        let mut out: Vec<&T> = self.recent(n).collect();
        if self.discipline == Discipline::NewestFirst {
            out.reverse();
        }
        out
    }
}

impl<T: Clone> HistoryBuffer<T> {
    /// Copy of the `n` most recent items in buffer order.
    pub fn recent_cloned(&self, n: usize) -> Vec<T> {
        self.recent(n).cloned().collect()
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

impl<'a, T> IntoIterator for &'a HistoryBuffer<T> {
    type Item = &'a T;
    type IntoIter = std::collections::vec_deque::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

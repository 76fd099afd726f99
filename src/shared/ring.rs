// This is free and unencumbered software released into the public domain.

use std::collections::VecDeque;

/// What a full [`RingBuffer`] does with a new item.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Evict the oldest item to make room.
    #[default]
    OverwriteOldest,
    /// Keep the buffer as is and hand the new item back.
    Reject,
}

/// FIFO with a fixed capacity chosen at construction.
#[derive(Debug)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
    policy: OverflowPolicy,
}

impl<T> RingBuffer<T> {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
            policy,
        }
    }

    /// Appends `item`, returning whichever item did not fit: the evicted
    /// oldest one under [`OverflowPolicy::OverwriteOldest`], or `item` itself
    /// under [`OverflowPolicy::Reject`].
    pub fn push(&mut self, item: T) -> Option<T> {
        if self.items.len() < self.capacity {
            self.items.push_back(item);
            return None;
        }
        match self.policy {
            OverflowPolicy::OverwriteOldest => {
                let evicted = self.items.pop_front();
                self.items.push_back(item);
                evicted
            },
            OverflowPolicy::Reject => Some(item),
        }
    }

    pub fn pop(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

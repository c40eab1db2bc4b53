//! Fixed-capacity FIFO ring buffer.
//!
//! Backs the write serializer's pending-job list. Capacity is fixed at
//! construction and never grows, so an overloaded producer gets
//! [`QueueError::Full`] instead of unbounded memory use.
//!
//! ```text
//!   slots: [ None | Some(b) | Some(c) | None ]
//!                   ▲front            ▲rear (next write)
//!   len = 2, capacity = 4
//! ```
//!
//! Both indices advance modulo capacity, giving O(1) enqueue, dequeue and
//! peek.

use thiserror::Error;

/// Errors returned by [`BoundedFifoQueue`] operations
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue is full (capacity {capacity})")]
    Full { capacity: usize },

    #[error("queue is empty")]
    Empty,

    #[error("queue capacity must be greater than zero")]
    ZeroCapacity,
}

/// Bounded first-in first-out queue over a circular buffer
pub struct BoundedFifoQueue<T> {
    slots: Box<[Option<T>]>,
    front: usize,
    rear: usize,
    len: usize,
}

impl<T> BoundedFifoQueue<T> {
    /// Create an empty queue holding at most `capacity` items
    pub fn new(capacity: usize) -> Result<Self, QueueError> {
        if capacity == 0 {
            return Err(QueueError::ZeroCapacity);
        }

        let slots = std::iter::repeat_with(|| None).take(capacity).collect();
        Ok(Self {
            slots,
            front: 0,
            rear: 0,
            len: 0,
        })
    }

    /// Append `item` at the back of the queue
    pub fn enqueue(&mut self, item: T) -> Result<(), QueueError> {
        if self.is_full() {
            return Err(QueueError::Full {
                capacity: self.capacity(),
            });
        }

        self.slots[self.rear] = Some(item);
        self.rear = (self.rear + 1) % self.capacity();
        self.len += 1;
        Ok(())
    }

    /// Remove and return the oldest item
    pub fn dequeue(&mut self) -> Result<T, QueueError> {
        if self.is_empty() {
            return Err(QueueError::Empty);
        }

        let item = self.slots[self.front].take().ok_or(QueueError::Empty)?;
        self.front = (self.front + 1) % self.capacity();
        self.len -= 1;
        Ok(item)
    }

    /// Borrow the oldest item without removing it
    pub fn peek(&self) -> Result<&T, QueueError> {
        if self.is_empty() {
            return Err(QueueError::Empty);
        }

        self.slots[self.front].as_ref().ok_or(QueueError::Empty)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

impl<T> std::fmt::Debug for BoundedFifoQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedFifoQueue")
            .field("len", &self.len)
            .field("capacity", &self.capacity())
            .field("front", &self.front)
            .field("rear", &self.rear)
            .finish()
    }
}

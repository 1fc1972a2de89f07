//! Bounded single-producer/single-consumer ring of pre-allocated packet slots.
//!
//! ```text
//!   tail (consumer)          head (producer)
//!        v                        v
//!   [ ][x][x][x][x][x][x][x][x][ ][ ][ ]
//! ```
//!
//! The buffer is full when `(head + 1) % capacity == tail` and empty when
//! `head == tail`, so one slot always stays unused. The producer is the only
//! writer of `head` and the consumer the only writer of `tail`; both halves
//! are move-only handles, which keeps that contract in the type system.
//!
//! Waiting on full/empty is flow control, not an error: the blocking
//! [`Producer::push`] and [`Consumer::pop_with`] park on a condition variable
//! in short slices so they notice a [`StopSignal`] promptly.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::cancel::StopSignal;

/// Upper bound on one blocking wait before the stop flag is re-checked.
const WAIT_SLICE: Duration = Duration::from_millis(20);

/// Why a non-blocking push did not store the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    /// Every usable slot holds an unread payload.
    Full,
    /// The payload is larger than one slot.
    Oversized,
}

struct Slot {
    data: Box<[u8]>,
    len: usize,
}

struct Shared {
    slots: Box<[Mutex<Slot>]>,
    slot_size: usize,
    head: AtomicUsize,
    tail: AtomicUsize,
    gate: Mutex<()>,
    changed: Condvar,
}

impl Shared {
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn is_full(&self) -> bool {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        (head + 1) % self.capacity() == tail
    }

    fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire) == self.tail.load(Ordering::Acquire)
    }

    fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        (head + self.capacity() - tail) % self.capacity()
    }

    fn notify(&self) {
        let _gate = self.gate.lock();
        self.changed.notify_all();
    }

    /// Park for at most one slice while `blocked` holds. The condition is
    /// re-checked under the gate so a notify cannot slip in between.
    fn wait_while(&self, blocked: impl Fn(&Shared) -> bool) {
        let mut gate = self.gate.lock();
        if blocked(self) {
            self.changed.wait_for(&mut gate, WAIT_SLICE);
        }
    }
}

/// Create a ring with `capacity` slots of `slot_size` bytes each, all
/// allocated up front. Capacities below 2 are raised to 2.
pub fn ring_buffer(capacity: usize, slot_size: usize) -> (Producer, Consumer) {
    let capacity = capacity.max(2);
    let slots = (0..capacity)
        .map(|_| {
            Mutex::new(Slot {
                data: vec![0u8; slot_size].into_boxed_slice(),
                len: 0,
            })
        })
        .collect();

    let shared = Arc::new(Shared {
        slots,
        slot_size,
        head: AtomicUsize::new(0),
        tail: AtomicUsize::new(0),
        gate: Mutex::new(()),
        changed: Condvar::new(),
    });

    tracing::debug!(capacity, slot_size, "RTP ring buffer allocated");

    (
        Producer {
            shared: shared.clone(),
        },
        Consumer { shared },
    )
}

/// Writing half, owned by the RTP receive thread.
pub struct Producer {
    shared: Arc<Shared>,
}

impl Producer {
    /// Copy `payload` into the next free slot without blocking.
    ///
    /// A full ring is left untouched: the unread slot at `tail` is never
    /// overwritten.
    pub fn try_push(&mut self, payload: &[u8]) -> Result<(), PushError> {
        if payload.len() > self.shared.slot_size {
            return Err(PushError::Oversized);
        }

        let head = self.shared.head.load(Ordering::Relaxed);
        let next = (head + 1) % self.shared.capacity();
        if next == self.shared.tail.load(Ordering::Acquire) {
            return Err(PushError::Full);
        }

        {
            let mut slot = self.shared.slots[head].lock();
            slot.data[..payload.len()].copy_from_slice(payload);
            slot.len = payload.len();
        }

        self.shared.head.store(next, Ordering::Release);
        self.shared.notify();
        Ok(())
    }

    /// Copy `payload` into the ring, waiting while it is full.
    ///
    /// Returns `Ok(false)` without storing anything once `stop` is raised.
    pub fn push(&mut self, payload: &[u8], stop: &StopSignal) -> Result<bool, PushError> {
        loop {
            if stop.is_stopped() {
                return Ok(false);
            }
            match self.try_push(payload) {
                Ok(()) => return Ok(true),
                Err(PushError::Full) => self.shared.wait_while(Shared::is_full),
                Err(e) => return Err(e),
            }
        }
    }

    pub fn is_full(&self) -> bool {
        self.shared.is_full()
    }

    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }
}

/// Reading half, owned by the HTTP send thread.
pub struct Consumer {
    shared: Arc<Shared>,
}

impl Consumer {
    /// Hand the oldest payload to `f` without blocking, then release its slot.
    pub fn try_pop_with<R>(&mut self, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        let tail = self.shared.tail.load(Ordering::Relaxed);
        if tail == self.shared.head.load(Ordering::Acquire) {
            return None;
        }

        let result = {
            let slot = self.shared.slots[tail].lock();
            f(&slot.data[..slot.len])
        };

        self.shared
            .tail
            .store((tail + 1) % self.shared.capacity(), Ordering::Release);
        self.shared.notify();
        Some(result)
    }

    /// Hand the oldest payload to `f`, waiting while the ring is empty.
    ///
    /// Returns `None` once `stop` is raised.
    pub fn pop_with<R>(&mut self, stop: &StopSignal, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        let mut f = Some(f);
        loop {
            if stop.is_stopped() {
                return None;
            }
            if !self.shared.is_empty() {
                let f = f.take()?;
                return self.try_pop_with(f);
            }
            self.shared.wait_while(Shared::is_empty);
        }
    }

    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.is_empty()
    }
}

//! Bounded single-producer/single-consumer ring buffer.
//!
//! One slot is always kept free: `head == tail` means empty and
//! `next(tail) == head` means full, so a queue built with capacity `C` holds
//! at most `C - 1` elements.
//!
//! ```text
//! producer: write slot[tail]      -> tail.store(next, Release)
//! consumer: tail.load(Acquire)    -> read slot[head] -> head.store(next, Release)
//! producer: head.load(Acquire)    -> slot[head - 1] is free to overwrite
//! ```
//!
//! The producer/consumer roles are carried by types: [`SpscQueue::split`]
//! hands out exactly one [`Producer`] and one [`Consumer`], neither of which
//! can be cloned.

use core::fmt;
use core::mem::MaybeUninit;
use std::time::{Duration, Instant};

use crossbeam_utils::CachePadded;

use crate::backoff::Backoff;
use crate::error::{PopError, PushError, QueueError};
use crate::sync::{Arc, AtomicUsize, Ordering, UnsafeCell};

type Slot<T> = UnsafeCell<MaybeUninit<T>>;

struct Ring<T> {
    buffer: Box<[Slot<T>]>,
    /// Next slot to read. Written by the consumer only.
    head: CachePadded<AtomicUsize>,
    /// Next slot to write. Written by the producer only.
    tail: CachePadded<AtomicUsize>,
}

// SAFETY: elements move between threads by value, so `T: Send` is enough.
// Slot access is partitioned between the single producer and single consumer
// by the head/tail protocol.
unsafe impl<T: Send> Send for Ring<T> {}
// SAFETY: see above; shared access only reaches the atomics and, through the
// role-holding handle, disjoint slots.
unsafe impl<T: Send> Sync for Ring<T> {}

impl<T> Ring<T> {
    fn with_capacity(capacity: usize) -> Self {
        let buffer = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect();
        Ring {
            buffer,
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    #[inline(always)]
    fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// `(index + 1) % capacity` without the division.
    #[inline(always)]
    fn next(&self, index: usize) -> usize {
        let next = index + 1;
        if next == self.capacity() {
            0
        } else {
            next
        }
    }

    /// # Safety
    ///
    /// Only one thread may act as the producer at any time.
    #[inline]
    unsafe fn try_push(&self, value: T) -> Result<(), PushError<T>> {
        let tail = self.tail.load(Ordering::Relaxed);
        let next = self.next(tail);
        if next == self.head.load(Ordering::Acquire) {
            return Err(PushError(value));
        }
        // SAFETY: `tail` is outside the live range `[head, tail)`, and the
        // acquire load of `head` ordered the consumer's last read of this slot
        // before our write. No one else writes it: we are the only producer.
        self.buffer[tail].with_mut(|slot| unsafe { (*slot).write(value) });
        self.tail.store(next, Ordering::Release);
        Ok(())
    }

    /// # Safety
    ///
    /// Only one thread may act as the consumer at any time.
    #[inline]
    unsafe fn try_pop(&self) -> Option<T> {
        let head = self.head.load(Ordering::Relaxed);
        if head == self.tail.load(Ordering::Acquire) {
            return None;
        }
        // SAFETY: `head != tail`, so the slot holds an initialised value whose
        // write happened-before the release store of `tail` we just acquired.
        // After `head` moves on, the slot is treated as uninitialised again.
        let value = self.buffer[head].with(|slot| unsafe { (*slot).assume_init_read() });
        self.head.store(self.next(head), Ordering::Release);
        Some(value)
    }

    /// # Safety
    ///
    /// Caller must be the consumer and must not pop while the borrow lives.
    #[inline]
    unsafe fn peek(&self) -> Option<&T> {
        let head = self.head.load(Ordering::Relaxed);
        if head == self.tail.load(Ordering::Acquire) {
            return None;
        }
        // SAFETY: as in `try_pop`; the producer cannot overwrite this slot
        // until `head` advances, which needs the consumer's exclusive borrow.
        Some(self.buffer[head].with(|slot| unsafe { (*slot).assume_init_ref() }))
    }

    fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        if tail >= head {
            tail - head
        } else {
            self.capacity() - head + tail
        }
    }

    fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire) == self.tail.load(Ordering::Acquire)
    }

    fn is_full(&self) -> bool {
        let tail = self.tail.load(Ordering::Acquire);
        self.next(tail) == self.head.load(Ordering::Acquire)
    }
}

impl<T> Drop for Ring<T> {
    fn drop(&mut self) {
        let mut pos = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);
        if pos != tail {
            tracing::trace!(remaining = self.len(), "dropping undrained spsc queue");
        }
        while pos != tail {
            // SAFETY: `&mut self` rules out both roles; `[head, tail)` are the
            // initialised slots, each dropped once.
            self.buffer[pos].with_mut(|slot| unsafe { (*slot).assume_init_drop() });
            pos = self.next(pos);
        }
    }
}

fn validate_capacity(capacity: usize) -> Result<(), QueueError> {
    if capacity < 2 {
        return Err(QueueError::CapacityTooSmall { capacity });
    }
    Ok(())
}

/// Bounded lock-free SPSC queue.
///
/// Owned directly, the queue is usable from one thread through `&mut self`.
/// To hand the two ends to different threads, call [`split`](Self::split).
///
/// The size queries are snapshots: under concurrent use they were true at the
/// instant of the loads and may be stale by the time the caller acts on them.
pub struct SpscQueue<T> {
    ring: Ring<T>,
}

impl<T> SpscQueue<T> {
    /// Creates a queue with `capacity` slots, `capacity - 1` of them usable.
    ///
    /// # Panics
    ///
    /// Panics if `capacity < 2`. Use [`try_new`](Self::try_new) to get an
    /// error instead.
    pub fn new(capacity: usize) -> Self {
        match Self::try_new(capacity) {
            Ok(queue) => queue,
            Err(err) => panic!("{err}"),
        }
    }

    /// Creates a queue with `capacity` slots, rejecting capacities below 2.
    pub fn try_new(capacity: usize) -> Result<Self, QueueError> {
        if let Err(err) = validate_capacity(capacity) {
            tracing::warn!(capacity, "rejecting spsc queue capacity");
            return Err(err);
        }
        tracing::debug!(capacity, "created spsc queue");
        Ok(SpscQueue {
            ring: Ring::with_capacity(capacity),
        })
    }

    /// Non-blocking push. A full queue hands the value back untouched.
    pub fn try_push(&mut self, value: T) -> Result<(), PushError<T>> {
        // SAFETY: `&mut self` makes this the only producer.
        unsafe { self.ring.try_push(value) }
    }

    /// Non-blocking pop. `None` when the queue is empty.
    pub fn try_pop(&mut self) -> Option<T> {
        // SAFETY: `&mut self` makes this the only consumer.
        unsafe { self.ring.try_pop() }
    }

    /// The oldest element, without removing it.
    pub fn peek(&mut self) -> Option<&T> {
        // SAFETY: `&mut self` makes this the only consumer, and the returned
        // borrow blocks any pop.
        unsafe { self.ring.peek() }
    }

    /// Number of slots, including the one that always stays empty.
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Number of stored elements.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Alias of [`len`](Self::len).
    pub fn size(&self) -> usize {
        self.ring.len()
    }

    /// `true` when no element is stored.
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// `true` when `capacity() - 1` elements are stored.
    pub fn is_full(&self) -> bool {
        self.ring.is_full()
    }

    /// Splits the queue into its producing and consuming ends.
    ///
    /// Elements already in the queue stay there and are seen by the consumer.
    pub fn split(self) -> (Producer<T>, Consumer<T>) {
        let ring = Arc::new(self.ring);
        (
            Producer { ring: ring.clone() },
            Consumer { ring },
        )
    }
}

impl<T> fmt::Debug for SpscQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpscQueue")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish()
    }
}

/// Creates a queue of `capacity` slots and splits it in one step.
///
/// # Panics
///
/// Panics if `capacity < 2`.
pub fn channel<T>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    SpscQueue::new(capacity).split()
}

/// The writing end of a split [`SpscQueue`].
pub struct Producer<T> {
    ring: Arc<Ring<T>>,
}

impl<T> Producer<T> {
    /// Non-blocking push. A full queue hands the value back untouched.
    #[inline]
    pub fn try_push(&mut self, value: T) -> Result<(), PushError<T>> {
        // SAFETY: `Producer` is unique per queue and not `Clone`; `&mut self`
        // keeps it on one thread at a time.
        unsafe { self.ring.try_push(value) }
    }

    /// Pushes, spinning until a slot frees up.
    ///
    /// Never returns if the consumer stops draining a full queue. Use
    /// [`push_until`](Self::push_until) or [`push_while`](Self::push_while)
    /// to bound the wait.
    pub fn push(&mut self, mut value: T) {
        let mut backoff = Backoff::new();
        loop {
            match self.try_push(value) {
                Ok(()) => return,
                Err(PushError(rejected)) => value = rejected,
            }
            backoff.snooze();
        }
    }

    /// Pushes, spinning while `keep_going` returns `true`.
    ///
    /// `keep_going` runs between attempts only, so a push into a queue with
    /// room succeeds even if it would return `false`.
    pub fn push_while(
        &mut self,
        mut value: T,
        mut keep_going: impl FnMut() -> bool,
    ) -> Result<(), PushError<T>> {
        let mut backoff = Backoff::new();
        loop {
            match self.try_push(value) {
                Ok(()) => return Ok(()),
                Err(PushError(rejected)) => value = rejected,
            }
            if !keep_going() {
                return Err(PushError(value));
            }
            backoff.snooze();
        }
    }

    /// Pushes, giving up once `deadline` has passed.
    pub fn push_until(&mut self, value: T, deadline: Instant) -> Result<(), PushError<T>> {
        let pushed = self.push_while(value, || Instant::now() < deadline);
        if pushed.is_err() {
            tracing::trace!(capacity = self.capacity(), "spsc push timed out");
        }
        pushed
    }

    /// Pushes, giving up after `timeout`.
    pub fn push_timeout(&mut self, value: T, timeout: Duration) -> Result<(), PushError<T>> {
        self.push_until(value, Instant::now() + timeout)
    }

    /// Number of slots, including the one that always stays empty.
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Snapshot of the number of stored elements.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Alias of [`len`](Self::len).
    pub fn size(&self) -> usize {
        self.ring.len()
    }

    /// Snapshot emptiness check.
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Snapshot fullness check.
    pub fn is_full(&self) -> bool {
        self.ring.is_full()
    }

    /// `true` once the [`Consumer`] has been dropped.
    pub fn is_abandoned(&self) -> bool {
        Arc::strong_count(&self.ring) < 2
    }
}

impl<T> fmt::Debug for Producer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish()
    }
}

/// The reading end of a split [`SpscQueue`].
pub struct Consumer<T> {
    ring: Arc<Ring<T>>,
}

impl<T> Consumer<T> {
    /// Non-blocking pop. `None` when the queue is empty.
    #[inline]
    pub fn try_pop(&mut self) -> Option<T> {
        // SAFETY: `Consumer` is unique per queue and not `Clone`; `&mut self`
        // keeps it on one thread at a time.
        unsafe { self.ring.try_pop() }
    }

    /// Pops, spinning until an element arrives.
    ///
    /// Never returns if the producer stops filling an empty queue. Use
    /// [`pop_until`](Self::pop_until) or [`pop_while`](Self::pop_while) to
    /// bound the wait.
    pub fn pop(&mut self) -> T {
        let mut backoff = Backoff::new();
        loop {
            if let Some(value) = self.try_pop() {
                return value;
            }
            backoff.snooze();
        }
    }

    /// Pops, spinning while `keep_going` returns `true`.
    pub fn pop_while(&mut self, mut keep_going: impl FnMut() -> bool) -> Result<T, PopError> {
        let mut backoff = Backoff::new();
        loop {
            if let Some(value) = self.try_pop() {
                return Ok(value);
            }
            if !keep_going() {
                return Err(PopError::Cancelled);
            }
            backoff.snooze();
        }
    }

    /// Pops, giving up once `deadline` has passed.
    pub fn pop_until(&mut self, deadline: Instant) -> Result<T, PopError> {
        self.pop_while(|| Instant::now() < deadline).map_err(|_| {
            tracing::trace!(capacity = self.ring.capacity(), "spsc pop timed out");
            PopError::Timeout
        })
    }

    /// Pops, giving up after `timeout`.
    pub fn pop_timeout(&mut self, timeout: Duration) -> Result<T, PopError> {
        self.pop_until(Instant::now() + timeout)
    }

    /// The oldest element, without removing it.
    pub fn peek(&mut self) -> Option<&T> {
        // SAFETY: sole consumer; the borrow of `self` blocks any pop.
        unsafe { self.ring.peek() }
    }

    /// Number of slots, including the one that always stays empty.
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Snapshot of the number of stored elements.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Alias of [`len`](Self::len).
    pub fn size(&self) -> usize {
        self.ring.len()
    }

    /// Snapshot emptiness check.
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Snapshot fullness check.
    pub fn is_full(&self) -> bool {
        self.ring.is_full()
    }

    /// `true` once the [`Producer`] has been dropped.
    ///
    /// Elements pushed before the drop can still be popped.
    pub fn is_abandoned(&self) -> bool {
        Arc::strong_count(&self.ring) < 2
    }
}

impl<T> fmt::Debug for Consumer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish()
    }
}

//! Fixed-capacity circular buffer with per-slot locks and spin-wait
//! backpressure.
//!
//! The buffer holds `capacity` pre-constructed slots, each behind its own
//! mutex. A writer cursor and a reader cursor walk the slots independently;
//! each is advanced only by its own role and read by the other role to decide
//! full/empty:
//!
//! - **empty** when `reader == writer`
//! - **full** when `(writer + 1) % capacity == reader`
//!
//! One slot is always left unused so that the two conditions stay distinct
//! without a separate counter, giving `capacity - 1` usable slots.
//!
//! A full buffer makes the writer sleep-poll ([`WRITE_POLL_INTERVAL`]) until
//! the reader frees a slot; an empty buffer makes the reader sleep-poll
//! ([`READ_POLL_INTERVAL`]). There is no overflow error at runtime. Readers
//! that must stay responsive to shutdown use [`RingReader::try_read`].
//!
//! The cursor protocol assumes one writer thread and one reader thread.
//! [`RingBuffer::split`] turns the buffer into a unique [`RingWriter`] and
//! [`RingReader`] pair so that assumption is enforced by the type system.

use std::{
    fmt,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use crossbeam_utils::CachePadded;

use crate::error::FeedError;

/// Smallest accepted capacity (one usable slot).
pub const MIN_CAPACITY: usize = 2;

/// Largest accepted capacity.
pub const MAX_CAPACITY: usize = 32;

/// Sleep between polls while the writer waits for space.
pub const WRITE_POLL_INTERVAL: Duration = Duration::from_micros(500);

/// Sleep between polls while the reader waits for data.
pub const READ_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Bounded single-writer / single-reader ring of lockable slots.
pub struct RingBuffer<T> {
    slots: Box<[Mutex<T>]>,
    writer: CachePadded<AtomicUsize>,
    reader: CachePadded<AtomicUsize>,
    write_poll: Duration,
    read_poll: Duration,
}

impl<T: Default> RingBuffer<T> {
    /// Create a buffer with `capacity` slots and the default poll intervals.
    ///
    /// Fails with [`FeedError::CapacityOutOfRange`] unless
    /// `MIN_CAPACITY <= capacity <= MAX_CAPACITY`.
    pub fn new(capacity: usize) -> Result<Self, FeedError> {
        Self::with_poll_intervals(capacity, WRITE_POLL_INTERVAL, READ_POLL_INTERVAL)
    }

    /// Create a buffer with custom spin-wait sleep intervals.
    pub fn with_poll_intervals(
        capacity: usize,
        write_poll: Duration,
        read_poll: Duration,
    ) -> Result<Self, FeedError> {
        check_capacity(capacity)?;
        let slots = (0..capacity).map(|_| Mutex::new(T::default())).collect();
        Ok(Self {
            slots,
            writer: CachePadded::new(AtomicUsize::new(0)),
            reader: CachePadded::new(AtomicUsize::new(0)),
            write_poll,
            read_poll,
        })
    }
}

/// Validate a requested ring capacity.
pub fn check_capacity(capacity: usize) -> Result<(), FeedError> {
    if (MIN_CAPACITY..=MAX_CAPACITY).contains(&capacity) {
        Ok(())
    } else {
        Err(FeedError::CapacityOutOfRange {
            capacity,
            min: MIN_CAPACITY,
            max: MAX_CAPACITY,
        })
    }
}

impl<T> RingBuffer<T> {
    /// Store `value` in the next slot, waiting while the buffer is full.
    ///
    /// The `&self` forms assume one writer and one reader; outside this crate
    /// they are reached through [`RingWriter`] and [`RingReader`].
    pub(crate) fn write(&self, value: T) {
        self.write_with(|slot| *slot = value);
    }

    /// Fill the next slot in place, waiting while the buffer is full.
    ///
    /// `fill` runs under the slot lock with the slot's previous contents.
    pub(crate) fn write_with<F>(&self, fill: F)
    where
        F: FnOnce(&mut T),
    {
        let current = self.writer.load(Ordering::Relaxed);
        let next = self.successor(current);

        while next == self.reader.load(Ordering::Acquire) {
            thread::sleep(self.write_poll);
        }

        let mut slot = self.lock_slot(current);
        fill(&mut slot);
        self.writer.store(next, Ordering::Release);
    }

    /// Observe the oldest unread slot in place, waiting while the buffer is
    /// empty. Returns whatever `observe` returns.
    pub(crate) fn read_with<F, R>(&self, observe: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        let current = self.reader.load(Ordering::Relaxed);

        while current == self.writer.load(Ordering::Acquire) {
            thread::sleep(self.read_poll);
        }

        self.consume(current, observe)
    }

    /// Non-blocking [`read_with`](Self::read_with): `None` if nothing is
    /// unread right now.
    pub(crate) fn try_read_with<F, R>(&self, observe: F) -> Option<R>
    where
        F: FnOnce(&T) -> R,
    {
        // Only the reader moves `reader`, so a non-empty check stays valid.
        let current = self.reader.load(Ordering::Relaxed);
        if current == self.writer.load(Ordering::Acquire) {
            return None;
        }
        Some(self.consume(current, observe))
    }

    fn consume<F, R>(&self, current: usize, observe: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        let slot = self.lock_slot(current);
        let out = observe(&slot);
        self.reader.store(self.successor(current), Ordering::Release);
        out
    }

    /// Total number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Maximum number of unread values the buffer can hold (`capacity - 1`).
    pub fn usable_capacity(&self) -> usize {
        self.slots.len() - 1
    }

    /// Number of unread values at the time of the call.
    pub fn len(&self) -> usize {
        let w = self.writer.load(Ordering::Acquire);
        let r = self.reader.load(Ordering::Acquire);
        (w + self.slots.len() - r) % self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reader.load(Ordering::Acquire) == self.writer.load(Ordering::Acquire)
    }

    pub fn is_full(&self) -> bool {
        self.successor(self.writer.load(Ordering::Acquire)) == self.reader.load(Ordering::Acquire)
    }

    /// Split into unique writer and reader handles.
    pub fn split(self) -> (RingWriter<T>, RingReader<T>) {
        let ring = Arc::new(self);
        (
            RingWriter {
                ring: Arc::clone(&ring),
            },
            RingReader { ring },
        )
    }

    #[inline]
    fn successor(&self, idx: usize) -> usize {
        (idx + 1) % self.slots.len()
    }

    /// Slots hold plain data, so a panic in another holder's closure leaves
    /// nothing half-updated that matters to us; recover the guard.
    #[inline]
    fn lock_slot(&self, idx: usize) -> MutexGuard<'_, T> {
        self.slots[idx].lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Copy out the oldest unread value, waiting while the buffer is empty.
    pub(crate) fn read(&self) -> T {
        self.read_with(T::clone)
    }

    pub(crate) fn try_read(&self) -> Option<T> {
        self.try_read_with(T::clone)
    }
}

impl<T> fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity())
            .field("writer", &self.writer.load(Ordering::Relaxed))
            .field("reader", &self.reader.load(Ordering::Relaxed))
            .finish()
    }
}

/// The single producer handle of a split [`RingBuffer`].
#[derive(Debug)]
pub struct RingWriter<T> {
    ring: Arc<RingBuffer<T>>,
}

impl<T> RingWriter<T> {
    pub fn write(&mut self, value: T) {
        self.ring.write(value);
    }

    pub fn write_with<F>(&mut self, fill: F)
    where
        F: FnOnce(&mut T),
    {
        self.ring.write_with(fill);
    }

    pub fn ring(&self) -> &RingBuffer<T> {
        &self.ring
    }
}

/// The single consumer handle of a split [`RingBuffer`].
#[derive(Debug)]
pub struct RingReader<T> {
    ring: Arc<RingBuffer<T>>,
}

impl<T> RingReader<T> {
    pub fn read_with<F, R>(&mut self, observe: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        self.ring.read_with(observe)
    }

    /// Like [`read_with`](Self::read_with) but returns `None` instead of
    /// waiting on an empty buffer.
    pub fn try_read_with<F, R>(&mut self, observe: F) -> Option<R>
    where
        F: FnOnce(&T) -> R,
    {
        self.ring.try_read_with(observe)
    }

    pub fn ring(&self) -> &RingBuffer<T> {
        &self.ring
    }
}

impl<T: Clone> RingReader<T> {
    pub fn read(&mut self) -> T {
        self.ring.read()
    }

    pub fn try_read(&mut self) -> Option<T> {
        self.ring.try_read()
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, sync::atomic::AtomicUsize, time::Instant};

    use proptest::prelude::*;

    use super::*;

    fn fast_ring<T: Default>(capacity: usize) -> RingBuffer<T> {
        let poll = Duration::from_micros(10);
        RingBuffer::with_poll_intervals(capacity, poll, poll).unwrap()
    }

    #[test]
    fn capacity_validation() {
        for bad in [0usize, 1, 33] {
            let err = RingBuffer::<u8>::new(bad).unwrap_err();
            assert_eq!(
                err,
                FeedError::CapacityOutOfRange {
                    capacity: bad,
                    min: 2,
                    max: 32
                }
            );
        }
        assert!(RingBuffer::<u8>::new(2).is_ok());
        assert!(RingBuffer::<u8>::new(32).is_ok());
    }

    #[test]
    fn one_slot_is_sacrificed() {
        let rb = fast_ring::<u32>(4);
        assert_eq!(rb.capacity(), 4);
        assert_eq!(rb.usable_capacity(), 3);
        assert!(rb.is_empty());

        for i in 0..3 {
            rb.write(i);
        }
        assert!(rb.is_full());
        assert_eq!(rb.len(), 3);

        assert_eq!(rb.read(), 0);
        assert!(!rb.is_full());
        assert_eq!(rb.len(), 2);
    }

    #[test]
    fn in_place_forms() {
        let rb = fast_ring::<Vec<u8>>(2);
        rb.write_with(|slot| {
            slot.clear();
            slot.extend_from_slice(b"hello");
        });
        let len = rb.read_with(|slot| slot.len());
        assert_eq!(len, 5);
        assert!(rb.is_empty());
    }

    #[test]
    fn hello_world_across_threads() {
        let (mut w, mut r) = fast_ring::<char>(16).split();
        let message: Vec<char> = "hello world".chars().collect();
        let expected = message.clone();

        let writer = thread::spawn(move || {
            for c in message {
                w.write_with(|slot| *slot = c);
            }
        });
        let reader = thread::spawn(move || {
            let mut out = Vec::new();
            for _ in 0..11 {
                r.read_with(|c| out.push(*c));
            }
            out
        });

        writer.join().unwrap();
        assert_eq!(reader.join().unwrap(), expected);
    }

    #[test]
    fn wraparound_round_trip() {
        const CAP: usize = 5;
        let n = 2 * CAP + 3;
        let (mut w, mut r) = fast_ring::<usize>(CAP).split();

        let writer = thread::spawn(move || {
            for i in 0..n {
                w.write(i);
            }
        });
        let got: Vec<usize> = (0..n).map(|_| r.read()).collect();
        writer.join().unwrap();

        assert_eq!(got, (0..n).collect::<Vec<_>>());
    }

    #[test]
    fn full_buffer_blocks_writer() {
        const CAP: usize = 4;
        let (mut w, mut r) = fast_ring::<usize>(CAP).split();
        let written = Arc::new(AtomicUsize::new(0));

        let writer = {
            let written = Arc::clone(&written);
            thread::spawn(move || {
                for i in 0..CAP {
                    w.write(i);
                    written.fetch_add(1, Ordering::SeqCst);
                }
            })
        };

        let deadline = Instant::now() + Duration::from_secs(5);
        while written.load(Ordering::SeqCst) < CAP - 1 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        thread::sleep(Duration::from_millis(50));

        // The last write cannot proceed: it would overwrite unread data.
        assert_eq!(written.load(Ordering::SeqCst), CAP - 1);
        assert_eq!(r.ring().len(), CAP - 1);

        assert_eq!(r.read(), 0);
        writer.join().unwrap();
        assert_eq!(written.load(Ordering::SeqCst), CAP);
        let rest: Vec<usize> = (1..CAP).map(|_| r.read()).collect();
        assert_eq!(rest, vec![1, 2, 3]);
    }

    #[test]
    fn empty_buffer_blocks_reader() {
        let (mut w, mut r) = fast_ring::<u64>(2).split();
        let reader = thread::spawn(move || r.read());

        thread::sleep(Duration::from_millis(20));
        assert!(!reader.is_finished());

        w.write(99);
        assert_eq!(reader.join().unwrap(), 99);
    }

    #[test]
    fn try_read_does_not_wait() {
        let (mut w, mut r) = fast_ring::<u32>(4).split();
        assert_eq!(r.try_read(), None);

        w.write(7);
        w.write(8);
        assert_eq!(r.try_read_with(|v| v * 10), Some(70));
        assert_eq!(r.try_read(), Some(8));
        assert_eq!(r.try_read(), None);
        assert!(r.ring().is_empty());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Write(u16),
        Read,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![any::<u16>().prop_map(Op::Write), Just(Op::Read)]
    }

    proptest! {
        #[test]
        fn matches_bounded_fifo_model(
            capacity in MIN_CAPACITY..=MAX_CAPACITY,
            ops in proptest::collection::vec(op(), 0..200),
        ) {
            let rb = fast_ring::<u16>(capacity);
            let mut model = VecDeque::new();

            for op in ops {
                match op {
                    Op::Write(v) if model.len() < capacity - 1 => {
                        prop_assert!(!rb.is_full());
                        rb.write(v);
                        model.push_back(v);
                    }
                    Op::Write(_) => prop_assert!(rb.is_full()),
                    Op::Read if !model.is_empty() => {
                        prop_assert_eq!(Some(rb.read()), model.pop_front());
                    }
                    Op::Read => prop_assert!(rb.is_empty()),
                }
                prop_assert_eq!(rb.len(), model.len());
            }
        }
    }
}

//! Unbounded lock-free MPMC queue (Michael–Scott, sentinel-headed).
//!
//! Any number of threads may call [`LockFreeQueue::enqueue`] and
//! [`LockFreeQueue::try_dequeue`] concurrently. Neither operation ever blocks:
//! contention is resolved with compare-and-swap retry loops, and a thread that
//! observes a lagging `tail` helps advance it before retrying.
//!
//! # Memory reclamation
//!
//! Nodes are **not** freed while the queue is alive. A successful dequeue only
//! moves `head` forward; the old head node stays allocated and keeps its
//! `next` link. This sidesteps use-after-free and ABA without hazard pointers
//! or epochs, at the cost of memory that grows with the total number of values
//! ever enqueued. Everything is released in `Drop`, walking from the very first
//! sentinel through the last linked node.
//!
//! ```text
//!  origin          head                      tail
//!    │               │                         │
//!    ▼               ▼                         ▼
//! [retired] ─► [sentinel] ─► [v0] ─► [v1] ─► [v2] ─► null
//! ```

use std::{
    cell::UnsafeCell,
    fmt,
    marker::PhantomData,
    mem::MaybeUninit,
    ptr,
    sync::atomic::{AtomicPtr, Ordering},
};

use crossbeam_utils::CachePadded;

struct Node<T> {
    /// Initialized for every node except the original sentinel. Once a node
    /// becomes the head its value has been moved out and must not be read.
    value: UnsafeCell<MaybeUninit<T>>,
    next: AtomicPtr<Node<T>>,
}

impl<T> Node<T> {
    fn sentinel() -> *mut Self {
        Box::into_raw(Box::new(Self {
            value: UnsafeCell::new(MaybeUninit::uninit()),
            next: AtomicPtr::new(ptr::null_mut()),
        }))
    }

    fn with_value(value: T) -> *mut Self {
        Box::into_raw(Box::new(Self {
            value: UnsafeCell::new(MaybeUninit::new(value)),
            next: AtomicPtr::new(ptr::null_mut()),
        }))
    }
}

/// Unbounded multi-producer multi-consumer FIFO queue.
///
/// `enqueue` allocates one node per value and always succeeds. `try_dequeue`
/// returns `None` immediately when no value is available; callers that need to
/// wait must poll.
pub struct LockFreeQueue<T> {
    head: CachePadded<AtomicPtr<Node<T>>>,
    tail: CachePadded<AtomicPtr<Node<T>>>,
    /// First sentinel ever allocated. Retired nodes stay reachable from here.
    origin: *mut Node<T>,
    _marker: PhantomData<T>,
}

// SAFETY: values are moved between threads (requires `T: Send`) but never
// shared by reference. Nodes are only freed in `Drop`, which has exclusive
// access.
unsafe impl<T: Send> Send for LockFreeQueue<T> {}
unsafe impl<T: Send> Sync for LockFreeQueue<T> {}

impl<T> LockFreeQueue<T> {
    /// Create an empty queue holding only the sentinel node.
    pub fn new() -> Self {
        let sentinel = Node::sentinel();
        Self {
            head: CachePadded::new(AtomicPtr::new(sentinel)),
            tail: CachePadded::new(AtomicPtr::new(sentinel)),
            origin: sentinel,
            _marker: PhantomData,
        }
    }

    /// Append `value` at the tail.
    pub fn enqueue(&self, value: T) {
        let node = Node::with_value(value);

        loop {
            let tail = self.tail.load(Ordering::Acquire);
            // SAFETY: nodes are never freed while `self` is alive.
            let next = unsafe { (*tail).next.load(Ordering::Acquire) };

            if tail != self.tail.load(Ordering::Acquire) {
                continue;
            }

            if next.is_null() {
                // Tail is accurate: try to link after it.
                let linked = unsafe { &(*tail).next }
                    .compare_exchange_weak(
                        ptr::null_mut(),
                        node,
                        Ordering::Release,
                        Ordering::Relaxed,
                    )
                    .is_ok();
                if linked {
                    // Best effort; a lagging tail is repaired by the next observer.
                    let _ = self.tail.compare_exchange(
                        tail,
                        node,
                        Ordering::Release,
                        Ordering::Relaxed,
                    );
                    return;
                }
            } else {
                // Tail is stale: help swing it forward, then retry.
                let _ = self.tail.compare_exchange_weak(
                    tail,
                    next,
                    Ordering::Release,
                    Ordering::Relaxed,
                );
            }
        }
    }

    /// Remove and return the value at the head, or `None` if the queue is
    /// currently empty.
    pub fn try_dequeue(&self) -> Option<T> {
        loop {
            let head = self.head.load(Ordering::Acquire);
            let tail = self.tail.load(Ordering::Acquire);
            // SAFETY: nodes are never freed while `self` is alive.
            let next = unsafe { (*head).next.load(Ordering::Acquire) };

            if head != self.head.load(Ordering::Acquire) {
                continue;
            }

            if head == tail {
                if next.is_null() {
                    return None;
                }
                let _ = self.tail.compare_exchange_weak(
                    tail,
                    next,
                    Ordering::Release,
                    Ordering::Relaxed,
                );
                continue;
            }

            if next.is_null() {
                continue;
            }

            // Copy the bits out before claiming the node. Only the thread whose
            // CAS succeeds takes ownership; losers discard their copy without
            // running `T`'s destructor (`MaybeUninit` never drops).
            // SAFETY: `next` was published with Release after its value was
            // written, and linked values are never written again.
            let value = unsafe { ptr::read((*next).value.get()) };

            if self
                .head
                .compare_exchange_weak(head, next, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                // The old head is retired, not freed. See module docs.
                // SAFETY: `next` held an initialized value and we won the race to
                // move it out.
                return Some(unsafe { value.assume_init() });
            }
        }
    }

    /// Snapshot check: `true` if no value was linked after the head at the
    /// time of the call. Advisory only under concurrent use.
    pub fn is_empty(&self) -> bool {
        let head = self.head.load(Ordering::Acquire);
        // SAFETY: nodes are never freed while `self` is alive.
        unsafe { (*head).next.load(Ordering::Acquire).is_null() }
    }
}

impl<T> Default for LockFreeQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for LockFreeQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockFreeQueue")
            .field("is_empty", &self.is_empty())
            .finish()
    }
}

impl<T> Drop for LockFreeQueue<T> {
    fn drop(&mut self) {
        let head = *self.head.get_mut();
        // Nodes up to and including `head` hold no value.
        let mut holds_value = false;
        let mut node = self.origin;

        while !node.is_null() {
            // SAFETY: every node came from `Box::into_raw`, is reachable exactly
            // once from `origin`, and we have exclusive access.
            let mut boxed = unsafe { Box::from_raw(node) };
            if holds_value {
                unsafe { boxed.value.get_mut().assume_init_drop() };
            }
            if node == head {
                holds_value = true;
            }
            node = *boxed.next.get_mut();
        }
    }
}

//! Teardown accounting for `LockFreeQueue`: every node allocation is released
//! exactly once when the queue is dropped.
//!
//! A counting global allocator records allocations and deallocations made by
//! the current thread while tracking is switched on. Counters are
//! thread-local, so tests running in parallel do not disturb each other.

use std::{
    alloc::{GlobalAlloc, Layout, System},
    cell::Cell,
};

use feed_core::{LockFreeQueue, TradeEvent};

struct CountingAlloc;

thread_local! {
    static TRACKING: Cell<bool> = const { Cell::new(false) };
    static ALLOCS: Cell<usize> = const { Cell::new(0) };
    static DEALLOCS: Cell<usize> = const { Cell::new(0) };
}

fn bump(counter: &'static std::thread::LocalKey<Cell<usize>>) {
    if TRACKING.try_with(Cell::get).unwrap_or(false) {
        let _ = counter.try_with(|c| c.set(c.get() + 1));
    }
}

unsafe impl GlobalAlloc for CountingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        bump(&ALLOCS);
        unsafe { System.alloc(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        bump(&DEALLOCS);
        unsafe { System.dealloc(ptr, layout) }
    }
}

#[global_allocator]
static GLOBAL: CountingAlloc = CountingAlloc;

/// Run `f` with tracking on and return `(allocs, deallocs)` it performed.
fn counted<F: FnOnce()>(f: F) -> (usize, usize) {
    ALLOCS.with(|c| c.set(0));
    DEALLOCS.with(|c| c.set(0));
    TRACKING.with(|t| t.set(true));
    f();
    TRACKING.with(|t| t.set(false));
    (ALLOCS.with(Cell::get), DEALLOCS.with(Cell::get))
}

#[test]
fn empty_queue_releases_only_sentinel() {
    let q: LockFreeQueue<u64> = LockFreeQueue::new();
    let (allocs, deallocs) = counted(|| drop(q));
    assert_eq!(allocs, 0);
    assert_eq!(deallocs, 1);
}

#[test]
fn teardown_releases_k_plus_one() {
    const K: usize = 37;
    let q: LockFreeQueue<u64> = LockFreeQueue::new();

    let (allocs, _) = counted(|| {
        for i in 0..K as u64 {
            q.enqueue(i);
        }
    });
    assert_eq!(allocs, K, "one node per enqueue");

    let (_, deallocs) = counted(|| drop(q));
    assert_eq!(deallocs, K + 1, "K live nodes plus the sentinel");
}

#[test]
fn retired_nodes_are_released_at_teardown() {
    const K: usize = 12;
    const D: usize = 5;
    let q: LockFreeQueue<u64> = LockFreeQueue::new();
    for i in 0..(K + D) as u64 {
        q.enqueue(i);
    }

    // Dequeue never frees: retired nodes wait for teardown.
    let (_, deallocs) = counted(|| {
        for _ in 0..D {
            assert!(q.try_dequeue().is_some());
        }
    });
    assert_eq!(deallocs, 0);

    let (_, deallocs) = counted(|| drop(q));
    assert_eq!(deallocs, K + D + 1);
}

#[test]
fn teardown_frees_owned_payloads() {
    const K: usize = 4;
    let q = LockFreeQueue::new();
    for id in 0..K as u32 {
        q.enqueue(TradeEvent::new(0, "BTCUSDT", id, "16500.50", "0.001", false));
    }

    // Each node owns three heap strings (symbol, price, quantity).
    let (_, deallocs) = counted(|| drop(q));
    assert_eq!(deallocs, (K + 1) + 3 * K);
}

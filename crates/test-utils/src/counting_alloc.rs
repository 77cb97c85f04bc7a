//! Allocation accounting for leak and out-of-memory tests.
//!
//! Install [`CountingAllocator`] as the global allocator of a test binary:
//!
//! ```ignore
//! use test_utils::CountingAllocator;
//!
//! #[global_allocator]
//! static ALLOC: CountingAllocator = CountingAllocator;
//! ```
//!
//! Counters are kept per thread, so tests running in parallel on the harness
//! threads do not disturb each other. Memory freed on a different thread
//! than the one that allocated it is attributed to the freeing thread.

use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;
use std::ptr;

thread_local! {
    static LIVE_BYTES: Cell<isize> = const { Cell::new(0) };
    static LIVE_BLOCKS: Cell<isize> = const { Cell::new(0) };
    static CALLS: Cell<usize> = const { Cell::new(0) };
    // 0 disables injection; otherwise the allocation that brings it to 0 fails.
    static FAIL_COUNTDOWN: Cell<usize> = const { Cell::new(0) };
}

/// Live heap usage of the current thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocationSnapshot {
    pub bytes: isize,
    pub blocks: isize,
}

impl AllocationSnapshot {
    /// Growth since `baseline`. Zero on both counts means nothing leaked.
    pub fn since(&self, baseline: &AllocationSnapshot) -> AllocationSnapshot {
        AllocationSnapshot {
            bytes: self.bytes - baseline.bytes,
            blocks: self.blocks - baseline.blocks,
        }
    }
}

/// Current live bytes and blocks for this thread.
pub fn snapshot() -> AllocationSnapshot {
    AllocationSnapshot {
        bytes: LIVE_BYTES.try_with(Cell::get).unwrap_or(0),
        blocks: LIVE_BLOCKS.try_with(Cell::get).unwrap_or(0),
    }
}

/// Allocation requests (including reallocations) made by this thread so far,
/// whether or not they succeeded.
pub fn allocation_calls() -> usize {
    CALLS.try_with(Cell::get).unwrap_or(0)
}

/// Make the `n`th allocation (1-based) from now on this thread return null.
///
/// One-shot: after the failure fires, allocation behaves normally again.
/// Only fallible paths (`try_reserve`, raw `alloc`) survive a null return;
/// infallible collections abort the process.
pub fn fail_nth_allocation(n: usize) {
    let _ = FAIL_COUNTDOWN.try_with(|c| c.set(n));
}

/// Disarm a pending injected failure.
pub fn clear_allocation_failure() {
    let _ = FAIL_COUNTDOWN.try_with(|c| c.set(0));
}

/// Whether an armed failure has not fired yet.
pub fn allocation_failure_pending() -> bool {
    FAIL_COUNTDOWN.try_with(|c| c.get() != 0).unwrap_or(false)
}

fn should_fail() -> bool {
    let _ = CALLS.try_with(|c| c.set(c.get() + 1));
    FAIL_COUNTDOWN
        .try_with(|c| match c.get() {
            0 => false,
            1 => {
                c.set(0);
                true
            }
            n => {
                c.set(n - 1);
                false
            }
        })
        .unwrap_or(false)
}

fn record(bytes: isize, blocks: isize) {
    let _ = LIVE_BYTES.try_with(|c| c.set(c.get() + bytes));
    let _ = LIVE_BLOCKS.try_with(|c| c.set(c.get() + blocks));
}

/// System allocator wrapper with per-thread live counters and failure injection.
pub struct CountingAllocator;

unsafe impl GlobalAlloc for CountingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if should_fail() {
            return ptr::null_mut();
        }
        let ptr = unsafe { System.alloc(layout) };
        if !ptr.is_null() {
            record(layout.size() as isize, 1);
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        if should_fail() {
            return ptr::null_mut();
        }
        let ptr = unsafe { System.alloc_zeroed(layout) };
        if !ptr.is_null() {
            record(layout.size() as isize, 1);
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) };
        record(-(layout.size() as isize), -1);
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if should_fail() {
            return ptr::null_mut();
        }
        let new_ptr = unsafe { System.realloc(ptr, layout, new_size) };
        if !new_ptr.is_null() {
            record(new_size as isize - layout.size() as isize, 0);
        }
        new_ptr
    }
}

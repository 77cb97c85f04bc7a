//! Host-style process/release cycles leave nothing behind.
//!
//! Kept in its own binary with a single test: the live-handle set is shared
//! by all threads, so its nodes may be freed on a different thread than the
//! one that allocated them.

use grib2_bridge::boundary::{live_handle_count, process_field, release_result, RELEASE_OK};
use test_utils::{snapshot, AllocationSnapshot, CountingAllocator, Grib2Builder};

#[global_allocator]
static ALLOC: CountingAllocator = CountingAllocator;

#[test]
fn test_repeated_cycles_return_to_baseline() {
    let message = Grib2Builder::new_gfs().with_gradient(260.0, 300.0).build();
    let truncated = &message[..message.len() / 3];

    let cycle = || unsafe {
        let handle = process_field(message.as_ptr(), message.len(), 1);
        assert!(!handle.is_null());
        assert_eq!(release_result(handle), RELEASE_OK);
        assert!(process_field(truncated.as_ptr(), truncated.len(), 1).is_null());
        assert!(process_field(message.as_ptr(), message.len(), 5).is_null());
    };

    cycle();
    let baseline = snapshot();
    for _ in 0..100 {
        cycle();
    }
    assert_eq!(snapshot().since(&baseline), AllocationSnapshot::default());
    assert_eq!(live_handle_count(), 0);
}

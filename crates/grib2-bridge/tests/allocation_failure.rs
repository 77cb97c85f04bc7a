//! Out-of-memory while building a bundle.
//!
//! `build` makes exactly two allocations, the metadata text and the bundle
//! cell, and both are fallible. Each is failed in turn and the test checks
//! that everything already owned was freed.

use grib2_bridge::{build, extract, process, BuildError, FieldIndex, ProcessError};
use grib2_parser::Grib2Decoder;
use test_utils::{
    allocation_calls, allocation_failure_pending, clear_allocation_failure, fail_nth_allocation,
    snapshot, AllocationSnapshot, CountingAllocator, Grib2Builder,
};

#[global_allocator]
static ALLOC: CountingAllocator = CountingAllocator;

const NO_GROWTH: AllocationSnapshot = AllocationSnapshot { bytes: 0, blocks: 0 };

fn message() -> Vec<u8> {
    Grib2Builder::new_gfs().with_gradient(250.0, 300.0).build()
}

/// Run the whole pipeline once so one-time setup is out of the way.
fn warm_up(message: &[u8]) {
    drop(process(&Grib2Decoder, message, FieldIndex::FIRST));
}

#[test]
fn test_metadata_allocation_failure() {
    let message = message();
    warm_up(&message);
    let baseline = snapshot();
    let record = extract(&Grib2Decoder, &message, FieldIndex::FIRST).unwrap();

    fail_nth_allocation(1);
    let result = build(record);
    clear_allocation_failure();

    assert!(matches!(result, Err(BuildError::AllocationFailed)));
    assert_eq!(snapshot().since(&baseline), NO_GROWTH);
}

#[test]
fn test_cell_allocation_failure() {
    let message = message();
    warm_up(&message);
    let baseline = snapshot();
    let record = extract(&Grib2Decoder, &message, FieldIndex::FIRST).unwrap();

    fail_nth_allocation(2);
    let result = build(record);
    let fired = !allocation_failure_pending();
    clear_allocation_failure();

    assert!(fired);
    assert!(matches!(result, Err(BuildError::AllocationFailed)));
    assert_eq!(snapshot().since(&baseline), NO_GROWTH);
}

#[test]
fn test_build_allocates_twice() {
    let message = message();
    warm_up(&message);
    let record = extract(&Grib2Decoder, &message, FieldIndex::FIRST).unwrap();
    let before = allocation_calls();
    let bundle = build(record).unwrap();
    assert_eq!(allocation_calls() - before, 2);
    drop(bundle);
}

#[test]
fn test_process_fails_cleanly_at_each_build_allocation() {
    let message = message();
    warm_up(&message);

    let before = allocation_calls();
    drop(process(&Grib2Decoder, &message, FieldIndex::FIRST).unwrap());
    let total = allocation_calls() - before;

    for nth in [total - 1, total] {
        let baseline = snapshot();
        fail_nth_allocation(nth);
        let result = process(&Grib2Decoder, &message, FieldIndex::FIRST);
        clear_allocation_failure();

        assert!(
            matches!(result, Err(ProcessError::Build(BuildError::AllocationFailed))),
            "allocation {nth} of {total}: {result:?}"
        );
        assert_eq!(snapshot().since(&baseline), NO_GROWTH);
    }
}

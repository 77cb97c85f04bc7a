//! C ABI exported to the host.
//!
//! # Protocol
//!
//! 1. Copy the encoded message into module memory obtained from
//!    [`field_buffer_alloc`].
//! 2. Call [`process_field`]. A null return means no result; otherwise the
//!    returned address points at a [`FieldView`] with five readable values.
//! 3. Read the metadata text and the payload through the view without
//!    copying.
//! 4. Call [`release_result`] with the same address exactly once, and free
//!    the input with [`field_buffer_free`].
//!
//! Handles are tracked in a process-wide set. Releasing a handle that is not
//! in the set (already released, or never issued) returns `-1` and frees
//! nothing. A stale handle whose address has since been reused by a newer
//! bundle cannot be told apart from that newer bundle.

use std::alloc::{self, Layout};
use std::collections::BTreeSet;
use std::ptr;
use std::slice;
use std::sync::{Mutex, MutexGuard, PoisonError};

use grib2_parser::Grib2Decoder;
use tracing::{debug, warn};

use crate::adapter::FieldIndex;
use crate::bundle::{release, FieldView, ResultBundle};
use crate::process;

/// `release_result` succeeded.
pub const RELEASE_OK: i32 = 0;
/// `release_result` was given null or a handle that is not live.
pub const RELEASE_INVALID_HANDLE: i32 = -1;

static LIVE_HANDLES: Mutex<BTreeSet<usize>> = Mutex::new(BTreeSet::new());

fn live_handles() -> MutexGuard<'static, BTreeSet<usize>> {
    LIVE_HANDLES.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Decode field `field_num` (1-based) of the `size` bytes at `data`.
///
/// # Returns
/// * The address of the result's [`FieldView`]
/// * NULL on any failure: null or empty input, field number below 1,
///   decoder rejection, or allocation failure
///
/// # Safety
/// * `data` must be NULL or valid for reads of `size` bytes for the duration
///   of the call
#[no_mangle]
pub unsafe extern "C" fn process_field(data: *const u8, size: usize, field_num: i32) -> *const FieldView {
    if data.is_null() || size == 0 {
        warn!(size, field_num, "process_field called without input");
        return ptr::null();
    }
    let index = match FieldIndex::new(i64::from(field_num)) {
        Ok(index) => index,
        Err(err) => {
            warn!(field_num, %err, "process_field rejected field number");
            return ptr::null();
        }
    };

    // SAFETY: the caller guarantees `data` is readable for `size` bytes.
    let buffer = unsafe { slice::from_raw_parts(data, size) };
    match process(&Grib2Decoder, buffer, index) {
        Ok(bundle) => {
            let handle = bundle.into_raw();
            live_handles().insert(handle as usize);
            debug!(handle = handle as usize, field_num, "Issued result handle");
            handle
        }
        Err(err) => {
            warn!(size, field_num, %err, "process_field failed");
            ptr::null()
        }
    }
}

/// Free a result returned by [`process_field`].
///
/// # Returns
/// * [`RELEASE_OK`] (0) when the result was freed
/// * [`RELEASE_INVALID_HANDLE`] (-1) for NULL or a handle that is not live
///
/// # Safety
/// * `handle` must be NULL or an address returned by [`process_field`]
/// * The handle must not be read after this call
#[no_mangle]
pub unsafe extern "C" fn release_result(handle: *const FieldView) -> i32 {
    if handle.is_null() {
        warn!("release_result called with a null handle");
        return RELEASE_INVALID_HANDLE;
    }
    if !live_handles().remove(&(handle as usize)) {
        warn!(handle = handle as usize, "release_result called with a handle that is not live");
        return RELEASE_INVALID_HANDLE;
    }

    // SAFETY: the handle was issued by `process_field` and was still live,
    // so it is reclaimed here for the first and only time.
    release(unsafe { ResultBundle::from_raw(handle) });
    RELEASE_OK
}

/// Allocate `size` bytes of module memory for the host to copy input into.
///
/// Returns NULL when `size` is 0 or memory is exhausted.
#[no_mangle]
pub extern "C" fn field_buffer_alloc(size: usize) -> *mut u8 {
    match Layout::array::<u8>(size) {
        Ok(layout) if layout.size() > 0 => {
            // SAFETY: the layout has non-zero size.
            unsafe { alloc::alloc(layout) }
        }
        _ => ptr::null_mut(),
    }
}

/// Free memory from [`field_buffer_alloc`].
///
/// # Safety
/// * `ptr` must be NULL or a pointer from `field_buffer_alloc(size)` that
///   has not been freed yet
#[no_mangle]
pub unsafe extern "C" fn field_buffer_free(ptr: *mut u8, size: usize) {
    if ptr.is_null() || size == 0 {
        return;
    }
    if let Ok(layout) = Layout::array::<u8>(size) {
        // SAFETY: same layout as the matching `field_buffer_alloc`.
        unsafe { alloc::dealloc(ptr, layout) };
    }
}

/// Number of handles issued and not yet released.
pub fn live_handle_count() -> usize {
    live_handles().len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_input_yields_null() {
        let handle = unsafe { process_field(ptr::null(), 10, 1) };
        assert!(handle.is_null());
    }

    #[test]
    fn test_non_positive_field_number_yields_null() {
        let data = b"GRIB";
        for field_num in [0, -1, i32::MIN] {
            let handle = unsafe { process_field(data.as_ptr(), data.len(), field_num) };
            assert!(handle.is_null());
        }
    }

    #[test]
    fn test_release_null_is_rejected() {
        assert_eq!(unsafe { release_result(ptr::null()) }, RELEASE_INVALID_HANDLE);
    }

    #[test]
    fn test_release_foreign_handle_is_rejected() {
        let view = FieldView {
            metadata_ptr: ptr::null(),
            metadata_len: 0,
            data_ptr: ptr::null(),
            data_size: 0,
            num_points: 0,
        };
        assert_eq!(unsafe { release_result(&view) }, RELEASE_INVALID_HANDLE);
    }

    #[test]
    fn test_buffer_alloc_and_free() {
        let p = field_buffer_alloc(64);
        assert!(!p.is_null());
        unsafe {
            p.write_bytes(0xAB, 64);
            assert_eq!(*p.add(63), 0xAB);
            field_buffer_free(p, 64);
        }
        assert!(field_buffer_alloc(0).is_null());
        unsafe { field_buffer_free(ptr::null_mut(), 8) };
    }
}

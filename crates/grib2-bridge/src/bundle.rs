//! Result bundle: the one object whose address crosses the boundary.
//!
//! A bundle lives in a single heap cell laid out as
//! `[FieldView | metadata Vec | payload Box]`. Because the view is the first
//! member of a `#[repr(C)]` cell, the cell address doubles as the address of
//! the host-visible view.

use std::alloc::{self, Layout};
use std::mem;

use tracing::debug;

use crate::adapter::{DecodeRecord, Payload};
use crate::error::BuildError;
use crate::metadata::FieldMetadata;

/// The five values a host reads out of a bundle.
///
/// All lengths are `usize`, so on wasm32 this is five 32-bit words.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldView {
    /// UTF-8 metadata text, also NUL-terminated.
    pub metadata_ptr: *const u8,
    /// Text length in bytes, excluding the NUL.
    pub metadata_len: usize,
    pub data_ptr: *const f32,
    /// `num_points * size_of::<f32>()`.
    pub data_size: usize,
    pub num_points: usize,
}

#[repr(C)]
struct BundleCell {
    view: FieldView,
    metadata: Vec<u8>,
    payload: Payload,
}

/// Exclusive owner of one extraction result.
///
/// Only [`build`] creates one and only [`release`] (or dropping it) destroys
/// it. Reading is always through shared borrows.
#[derive(Debug)]
pub struct ResultBundle {
    cell: Box<BundleCell>,
}

// A bundle may be built on one thread and released on another. The raw
// pointers in the view only point into the blobs the cell owns, which move
// with it.
unsafe impl Send for ResultBundle {}

impl std::fmt::Debug for BundleCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleCell")
            .field("view", &self.view)
            .field("metadata_capacity", &self.metadata.capacity())
            .finish()
    }
}

impl ResultBundle {
    pub fn view(&self) -> &FieldView {
        &self.cell.view
    }

    /// Metadata text without the trailing NUL.
    pub fn metadata_text(&self) -> &str {
        let text = &self.cell.metadata[..self.cell.view.metadata_len];
        // serde_json only emits UTF-8
        std::str::from_utf8(text).unwrap_or_default()
    }

    pub fn metadata(&self) -> Result<FieldMetadata, serde_json::Error> {
        FieldMetadata::from_text(self.metadata_text())
    }

    pub fn payload(&self) -> &[f32] {
        &self.cell.payload
    }

    pub fn num_points(&self) -> usize {
        self.cell.view.num_points
    }

    /// Hand ownership to a foreign caller. The pointer must come back through
    /// [`ResultBundle::from_raw`] exactly once.
    pub fn into_raw(self) -> *const FieldView {
        Box::into_raw(self.cell) as *const FieldView
    }

    /// Reclaim a bundle previously passed out with [`ResultBundle::into_raw`].
    ///
    /// # Safety
    /// `view` must come from `into_raw` and must not have been reclaimed
    /// already.
    pub unsafe fn from_raw(view: *const FieldView) -> Self {
        Self {
            cell: unsafe { Box::from_raw(view as *mut BundleCell) },
        }
    }
}

/// Assemble a bundle from a decoded record.
///
/// The record's scaffolding is dropped first. After that exactly two
/// allocations are made: the metadata text and the bundle cell. On every
/// error path the payload and any metadata buffer are dropped before
/// returning.
pub fn build(record: DecodeRecord) -> Result<ResultBundle, BuildError> {
    let metadata = FieldMetadata::from_record(&record);
    let DecodeRecord {
        num_points,
        grid_template,
        payload,
        ..
    } = record;
    drop(grid_template);

    let num_points = usize::try_from(num_points)
        .ok()
        .filter(|&n| n == payload.len())
        .ok_or(BuildError::PayloadMismatch {
            declared: num_points,
            actual: payload.len(),
        })?;

    let (text, metadata_len) = metadata.to_text()?;
    let view = FieldView {
        metadata_ptr: text.as_ptr(),
        metadata_len,
        data_ptr: payload.as_ptr(),
        data_size: num_points * mem::size_of::<f32>(),
        num_points,
    };
    let cell = try_box(BundleCell {
        view,
        metadata: text,
        payload,
    })
    .ok_or(BuildError::AllocationFailed)?;

    debug!(
        points = view.num_points,
        data_size = view.data_size,
        metadata_len = view.metadata_len,
        "Built result bundle"
    );
    Ok(ResultBundle { cell })
}

/// Free everything a bundle owns: the metadata text, the payload and the
/// cell itself.
pub fn release(bundle: ResultBundle) {
    let BundleCell {
        view,
        metadata,
        payload,
    } = *bundle.cell;
    drop(metadata);
    drop(payload);
    debug!(
        points = view.num_points,
        data_size = view.data_size,
        "Released result bundle"
    );
}

/// `Box::new` that reports allocation failure instead of aborting.
/// On failure `value` is dropped.
fn try_box<T>(value: T) -> Option<Box<T>> {
    let layout = Layout::new::<T>();
    if layout.size() == 0 {
        return Some(Box::new(value));
    }
    // SAFETY: the layout has non-zero size.
    let ptr = unsafe { alloc::alloc(layout) }.cast::<T>();
    if ptr.is_null() {
        return None;
    }
    // SAFETY: `ptr` is a fresh allocation with the layout of `T`, which is
    // what `Box` expects from the global allocator.
    unsafe {
        ptr.write(value);
        Some(Box::from_raw(ptr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(points: usize) -> DecodeRecord {
        DecodeRecord {
            discipline: 0,
            product_template_number: 0,
            parameter_category: 0,
            parameter_number: 0,
            grid_template_number: 0,
            num_points: points as i64,
            grid_template: vec![6, 0, 0, 0, 0, 0, 0, 2, 2],
            packing_type: 0,
            payload: (0..points).map(|i| i as f32).collect(),
        }
    }

    #[test]
    fn test_view_points_into_owned_blobs() {
        let bundle = build(record(4)).unwrap();
        let view = *bundle.view();

        assert_eq!(view.num_points, 4);
        assert_eq!(view.data_size, 16);
        assert_eq!(view.data_ptr, bundle.payload().as_ptr());
        assert_eq!(view.metadata_len, bundle.metadata_text().len());
        assert!(bundle.metadata_text().starts_with(r#"{"discipline":0, "#));
        release(bundle);
    }

    #[test]
    fn test_payload_is_moved_not_copied() {
        let rec = record(3);
        let original = rec.payload.as_ptr();
        let bundle = build(rec).unwrap();
        assert_eq!(bundle.payload().as_ptr(), original);
        assert_eq!(bundle.payload(), &[0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_mismatched_point_count() {
        let mut rec = record(4);
        rec.num_points = 5;
        match build(rec) {
            Err(BuildError::PayloadMismatch { declared, actual }) => {
                assert_eq!((declared, actual), (5, 4));
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_negative_point_count() {
        let mut rec = record(0);
        rec.num_points = -1;
        assert!(matches!(build(rec), Err(BuildError::PayloadMismatch { .. })));
    }

    #[test]
    fn test_empty_payload() {
        let bundle = build(record(0)).unwrap();
        assert_eq!(bundle.view().data_size, 0);
        assert!(bundle.payload().is_empty());
    }

    #[test]
    fn test_raw_roundtrip_keeps_address() {
        let bundle = build(record(2)).unwrap();
        let view_addr = bundle.view() as *const FieldView;
        let raw = bundle.into_raw();
        assert_eq!(raw, view_addr);

        // SAFETY: `raw` came from `into_raw` above and is reclaimed once.
        let bundle = unsafe { ResultBundle::from_raw(raw) };
        assert_eq!(bundle.num_points(), 2);
        release(bundle);
    }

    #[test]
    fn test_view_is_first_in_cell() {
        assert_eq!(mem::offset_of!(BundleCell, view), 0);
        assert_eq!(mem::size_of::<FieldView>(), 5 * mem::size_of::<usize>());
    }

    #[test]
    fn test_bundle_moves_across_threads() {
        let bundle = build(record(3)).unwrap();
        let points = std::thread::spawn(move || {
            let points = bundle.num_points();
            release(bundle);
            points
        })
        .join()
        .unwrap();
        assert_eq!(points, 3);
    }

    #[test]
    fn test_try_box() {
        let boxed = try_box(vec![1u8, 2, 3]).unwrap();
        assert_eq!(*boxed, vec![1, 2, 3]);
        assert!(try_box(()).is_some());
    }
}

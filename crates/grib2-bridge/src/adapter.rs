//! Decoder adapter.
//!
//! Runs a [`FieldDecoder`] on a caller buffer and turns its slot-based
//! contract into a plain `Result`. The decoder's slot is released exactly
//! once on every path; on success the payload is taken out of the slot
//! first so the release never touches it.

use std::num::NonZeroU32;

use grib2_parser::{DecodeStatus, FieldDecoder, FieldSlot, GribField, UnpackFlags};
use tracing::{debug, warn};

use crate::error::DecodeError;

/// Decoded grid values, exactly `num_points` long.
pub type Payload = Box<[f32]>;

/// 1-based position of a field within a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldIndex(NonZeroU32);

impl FieldIndex {
    pub const FIRST: FieldIndex = FieldIndex(NonZeroU32::MIN);

    /// Rejects indices below 1 and above `u32::MAX`.
    pub fn new(index: i64) -> Result<Self, DecodeError> {
        u32::try_from(index)
            .ok()
            .and_then(NonZeroU32::new)
            .map(FieldIndex)
            .ok_or(DecodeError::InvalidFieldIndex(index))
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl Default for FieldIndex {
    fn default() -> Self {
        Self::FIRST
    }
}

impl std::fmt::Display for FieldIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// What the core keeps from a decoded field.
///
/// `grid_template` is scaffolding and may be dropped at any time; `payload`
/// is owned here until [`build`](crate::build) moves it into a bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeRecord {
    pub discipline: i64,
    pub product_template_number: i64,
    pub parameter_category: i64,
    pub parameter_number: i64,
    pub grid_template_number: i64,
    /// Declared number of values in `payload`.
    pub num_points: i64,
    pub grid_template: Vec<i64>,
    pub packing_type: i64,
    pub payload: Payload,
}

/// Decode field `index` of `buffer`, fully unpacked and expanded.
pub fn extract<D>(decoder: &D, buffer: &[u8], index: FieldIndex) -> Result<DecodeRecord, DecodeError>
where
    D: FieldDecoder + ?Sized,
{
    if buffer.is_empty() {
        return Err(DecodeError::EmptyBuffer);
    }

    let mut slot: FieldSlot = None;
    let outcome = match decoder.decode_field(buffer, index.get(), UnpackFlags::FULL, &mut slot) {
        Ok(()) => slot
            .as_mut()
            .ok_or(DecodeError::MissingPayload)
            .and_then(take_record),
        Err(status) => Err(DecodeError::DecoderRejected(status)),
    };
    decoder.release_field(&mut slot);

    match &outcome {
        Ok(record) => debug!(
            field = index.get(),
            discipline = record.discipline,
            points = record.num_points,
            "Extracted field"
        ),
        Err(err) => warn!(field = index.get(), bytes = buffer.len(), %err, "Field extraction failed"),
    }
    outcome
}

/// Move the payload and the metadata sources out of a decoded field.
fn take_record(field: &mut GribField) -> Result<DecodeRecord, DecodeError> {
    let (category, number) = match field.product_template.as_slice() {
        [category, number, ..] => (*category, *number),
        _ => return Err(DecodeError::DecoderRejected(DecodeStatus::SectionUnpack(4))),
    };
    let payload = field.take_values().ok_or(DecodeError::MissingPayload)?;

    Ok(DecodeRecord {
        discipline: i64::from(field.discipline),
        product_template_number: i64::from(field.product_template_number),
        parameter_category: category,
        parameter_number: number,
        grid_template_number: i64::from(field.grid_template_number),
        num_points: field.data_point_count,
        grid_template: std::mem::take(&mut field.grid_template),
        packing_type: i64::from(field.data_template_number),
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    /// Scripted decoder that counts releases.
    struct Scripted {
        outcome: Result<Option<GribField>, DecodeStatus>,
        releases: Cell<u32>,
        seen_flags: Cell<Option<UnpackFlags>>,
    }

    impl Scripted {
        fn new(outcome: Result<Option<GribField>, DecodeStatus>) -> Self {
            Self {
                outcome,
                releases: Cell::new(0),
                seen_flags: Cell::new(None),
            }
        }
    }

    impl FieldDecoder for Scripted {
        fn decode_field(
            &self,
            _message: &[u8],
            _field_number: u32,
            flags: UnpackFlags,
            slot: &mut FieldSlot,
        ) -> Result<(), DecodeStatus> {
            self.seen_flags.set(Some(flags));
            match &self.outcome {
                Ok(field) => {
                    *slot = field.clone();
                    Ok(())
                }
                Err(status) => {
                    // Partially populated scaffolding left behind
                    *slot = Some(GribField {
                        discipline: 10,
                        grid_template: vec![1, 2, 3],
                        ..GribField::default()
                    });
                    Err(*status)
                }
            }
        }

        fn release_field(&self, slot: &mut FieldSlot) {
            self.releases.set(self.releases.get() + 1);
            slot.take();
        }
    }

    fn latlon_field() -> GribField {
        GribField {
            discipline: 0,
            product_template_number: 0,
            product_template: vec![2, 3, 2],
            grid_template_number: 0,
            grid_template: vec![6, 0, 0, 0, 0, 0, 0, 2, 2],
            data_point_count: 4,
            data_template_number: 0,
            values: Some(vec![1.0, 2.0, 3.0, 4.0].into_boxed_slice()),
            ..GribField::default()
        }
    }

    #[test]
    fn test_field_index_bounds() {
        assert_eq!(FieldIndex::new(1).unwrap().get(), 1);
        assert_eq!(FieldIndex::new(0), Err(DecodeError::InvalidFieldIndex(0)));
        assert_eq!(FieldIndex::new(-5), Err(DecodeError::InvalidFieldIndex(-5)));
        assert_eq!(
            FieldIndex::new(i64::from(u32::MAX) + 1),
            Err(DecodeError::InvalidFieldIndex(i64::from(u32::MAX) + 1))
        );
        assert_eq!(FieldIndex::default(), FieldIndex::FIRST);
    }

    #[test]
    fn test_success_moves_payload_and_releases_once() {
        let decoder = Scripted::new(Ok(Some(latlon_field())));
        let record = extract(&decoder, b"GRIB", FieldIndex::FIRST).unwrap();

        assert_eq!(decoder.releases.get(), 1);
        assert_eq!(decoder.seen_flags.get(), Some(UnpackFlags::FULL));
        assert_eq!(record.parameter_category, 2);
        assert_eq!(record.parameter_number, 3);
        assert_eq!(record.num_points, 4);
        assert_eq!(record.grid_template[7], 2);
        assert_eq!(&*record.payload, &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_failure_releases_partial_scaffolding_once() {
        let decoder = Scripted::new(Err(DecodeStatus::FieldNotFound));
        let err = extract(&decoder, b"GRIB", FieldIndex::new(9).unwrap()).unwrap_err();

        assert_eq!(err, DecodeError::DecoderRejected(DecodeStatus::FieldNotFound));
        assert_eq!(err.code(), Some(6));
        assert_eq!(decoder.releases.get(), 1);
    }

    #[test]
    fn test_success_without_values_is_missing_payload() {
        let mut field = latlon_field();
        field.values = None;
        let decoder = Scripted::new(Ok(Some(field)));
        assert_eq!(
            extract(&decoder, b"GRIB", FieldIndex::FIRST).unwrap_err(),
            DecodeError::MissingPayload
        );
        assert_eq!(decoder.releases.get(), 1);
    }

    #[test]
    fn test_success_with_empty_slot_is_missing_payload() {
        let decoder = Scripted::new(Ok(None));
        assert_eq!(
            extract(&decoder, b"GRIB", FieldIndex::FIRST).unwrap_err(),
            DecodeError::MissingPayload
        );
        assert_eq!(decoder.releases.get(), 1);
    }

    #[test]
    fn test_short_product_template_is_rejected() {
        let mut field = latlon_field();
        field.product_template = vec![2];
        let decoder = Scripted::new(Ok(Some(field)));
        assert_eq!(
            extract(&decoder, b"GRIB", FieldIndex::FIRST).unwrap_err().code(),
            Some(11)
        );
    }

    #[test]
    fn test_empty_buffer_never_reaches_decoder() {
        let decoder = Scripted::new(Ok(Some(latlon_field())));
        assert_eq!(
            extract(&decoder, &[], FieldIndex::FIRST).unwrap_err(),
            DecodeError::EmptyBuffer
        );
        assert_eq!(decoder.seen_flags.get(), None);
        assert_eq!(decoder.releases.get(), 0);
    }

    #[test]
    fn test_works_through_trait_object() {
        let decoder = Scripted::new(Ok(Some(latlon_field())));
        let dyn_decoder: &dyn FieldDecoder = &decoder;
        assert!(extract(dyn_decoder, b"GRIB", FieldIndex::FIRST).is_ok());
    }
}

//! Single-field decoder with a g2clib-style contract.
//!
//! [`FieldDecoder::decode_field`] fills a caller-provided [`FieldSlot`] section
//! by section. When it fails part way, the slot may still hold whatever had
//! been populated so far; [`FieldDecoder::release_field`] clears the slot in
//! every state.

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use crate::sections::{self, BitmapSection, END_MARKER, INDICATOR_LEN};
use crate::unpacking::{self, SimplePacking};
use crate::DecodeStatus;

/// One decoded field, mirroring g2clib's `gribfield`.
#[derive(Debug, Clone, Default)]
pub struct GribField {
    pub edition: u8,
    pub discipline: u8,
    /// Section 1 values: center, sub-center, tables, reference time, status, type.
    pub identification: Vec<i64>,
    /// Length of the Section 2 local use data in effect for this field.
    pub local_use_len: usize,
    /// 1-based field number within the message.
    pub field_number: u32,
    pub grid_source: i64,
    pub grid_point_count: i64,
    pub grid_template_number: u16,
    pub grid_template: Vec<i64>,
    pub optional_list: Vec<i64>,
    pub product_template_number: u16,
    pub product_template: Vec<i64>,
    pub coordinates: Vec<f32>,
    /// Number of values in `values` (grid point count once expanded).
    pub data_point_count: i64,
    pub data_template_number: u16,
    pub data_template: Vec<i64>,
    /// Section 6 indicator: 0 bitmap present, 254 previous bitmap, 255 none.
    pub bitmap_indicator: u8,
    pub bitmap: Option<Vec<u8>>,
    pub unpacked: bool,
    pub expanded: bool,
    /// Decoded grid values.
    pub values: Option<Box<[f32]>>,
}

impl GribField {
    /// Take ownership of the decoded values, leaving `None` behind.
    pub fn take_values(&mut self) -> Option<Box<[f32]>> {
        self.values.take()
    }

    /// Reference time from Section 1, if it is a valid date.
    pub fn reference_time(&self) -> Option<DateTime<Utc>> {
        sections::reference_time(&self.identification)
    }
}

/// Storage the decoder populates. May be partially filled after a failure.
pub type FieldSlot = Option<GribField>;

/// How far the decoder should go with the data section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnpackFlags {
    /// Decode Section 7 into values.
    pub unpack: bool,
    /// Spread bitmapped values over the full grid.
    pub expand: bool,
}

impl UnpackFlags {
    /// Fully unpacked and expanded.
    pub const FULL: Self = Self {
        unpack: true,
        expand: true,
    };
}

impl Default for UnpackFlags {
    fn default() -> Self {
        Self::FULL
    }
}

/// A decoder for one field of one GRIB2 message.
pub trait FieldDecoder {
    /// Decode field `field_number` (1-based) of `message` into `slot`.
    fn decode_field(
        &self,
        message: &[u8],
        field_number: u32,
        flags: UnpackFlags,
        slot: &mut FieldSlot,
    ) -> Result<(), DecodeStatus>;

    /// Drop whatever `slot` holds. Safe on empty and partially filled slots.
    fn release_field(&self, slot: &mut FieldSlot) {
        slot.take();
    }
}

/// The in-tree GRIB2 decoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct Grib2Decoder;

impl FieldDecoder for Grib2Decoder {
    fn decode_field(
        &self,
        message: &[u8],
        field_number: u32,
        flags: UnpackFlags,
        slot: &mut FieldSlot,
    ) -> Result<(), DecodeStatus> {
        let field = slot.insert(GribField::default());
        if field_number == 0 {
            return Err(DecodeStatus::FieldNumberNotPositive);
        }

        let indicator = sections::parse_indicator(message)?;
        field.edition = indicator.edition;
        field.discipline = indicator.discipline;

        let total = usize::try_from(indicator.message_length)
            .map_err(|_| DecodeStatus::EndMarkerMissing)?;
        if total > message.len() || total < INDICATOR_LEN + END_MARKER.len() {
            return Err(DecodeStatus::EndMarkerMissing);
        }
        let message = &message[..total];
        if &message[total - END_MARKER.len()..] != END_MARKER {
            return Err(DecodeStatus::EndMarkerMissing);
        }

        let mut walker = FieldWalker::default();
        let mut offset = INDICATOR_LEN;
        loop {
            if message[offset..].starts_with(END_MARKER) {
                if offset + END_MARKER.len() == total {
                    debug!(
                        requested = field_number,
                        found = walker.fields_seen,
                        "Field not present in message"
                    );
                    return Err(DecodeStatus::FieldNotFound);
                }
                return Err(DecodeStatus::EndMarkerMisplaced);
            }

            let header = sections::read_section_header(message, offset)
                .ok_or(DecodeStatus::EndMarkerMissing)?;
            let section = &message[offset..offset + header.length];
            trace!(offset, number = header.number, length = header.length, "Section");

            let done = walker.visit(header.number, section, field_number, flags, field)?;
            if done {
                debug!(
                    field_number,
                    points = field.data_point_count,
                    grid_template = field.grid_template_number,
                    "Decoded field"
                );
                return Ok(());
            }
            offset += header.length;
        }
    }
}

/// Walk state across the sections of one message.
#[derive(Default)]
struct FieldWalker {
    fields_seen: u32,
    in_target: bool,
    seen_identification: bool,
    local_use_len: usize,
    grid: Option<sections::GridDefinition>,
    previous_bitmap: Option<Vec<u8>>,
    packing: Option<SimplePacking>,
}

impl FieldWalker {
    /// Process one section. Returns `true` once the target field is complete.
    fn visit(
        &mut self,
        number: u8,
        section: &[u8],
        target: u32,
        flags: UnpackFlags,
        field: &mut GribField,
    ) -> Result<bool, DecodeStatus> {
        match number {
            1 => {
                field.identification = sections::parse_identification(section)?;
                self.seen_identification = true;
            }
            2 => {
                // Local use data belongs to an identified message
                if !self.seen_identification {
                    return Err(DecodeStatus::SectionUnpack(2));
                }
                self.local_use_len = section.len() - 5;
            }
            3 => self.grid = Some(sections::parse_grid_definition(section)?),
            4 => {
                self.fields_seen += 1;
                if self.fields_seen != target {
                    return Ok(false);
                }
                if !self.seen_identification {
                    return Err(DecodeStatus::SectionUnpack(1));
                }
                let grid = self.grid.as_ref().ok_or(DecodeStatus::SectionUnpack(3))?;
                self.in_target = true;
                field.field_number = target;
                field.local_use_len = self.local_use_len;
                field.grid_source = grid.source;
                field.grid_point_count = grid.num_points;
                field.grid_template_number = grid.template_number;
                field.grid_template = grid.template.clone();
                field.optional_list = grid.optional_list.clone();

                let product = sections::parse_product_definition(section)?;
                field.product_template_number = product.template_number;
                field.product_template = product.template;
                field.coordinates = product.coordinates;
            }
            5 if self.in_target => {
                let repr = sections::parse_data_representation(section)?;
                self.packing = Some(SimplePacking::from_template(&repr.template)?);
                field.data_point_count = repr.num_points;
                field.data_template_number = repr.template_number;
                field.data_template = repr.template;
            }
            6 => {
                let BitmapSection { indicator, bits } = sections::parse_bitmap(section)?;
                if self.in_target {
                    field.bitmap_indicator = indicator;
                    field.bitmap = match indicator {
                        0 => bits.clone(),
                        254 => Some(
                            self.previous_bitmap
                                .clone()
                                .ok_or(DecodeStatus::PreviousBitmapMissing)?,
                        ),
                        _ => None,
                    };
                }
                if let Some(bits) = bits {
                    self.previous_bitmap = Some(bits);
                }
            }
            7 if self.in_target => {
                unpack_data(section, flags, self.packing.as_ref(), field)?;
                return Ok(true);
            }
            5 | 7 => {}
            other => return Err(DecodeStatus::UnrecognizedSection(other)),
        }
        Ok(false)
    }
}

fn unpack_data(
    section: &[u8],
    flags: UnpackFlags,
    packing: Option<&SimplePacking>,
    field: &mut GribField,
) -> Result<(), DecodeStatus> {
    if !flags.unpack {
        return Ok(());
    }
    let packing = packing.ok_or(DecodeStatus::SectionUnpack(5))?;
    let packed = &section[5..];
    let data_points =
        usize::try_from(field.data_point_count).map_err(|_| DecodeStatus::SectionUnpack(5))?;
    let grid_points =
        usize::try_from(field.grid_point_count).map_err(|_| DecodeStatus::SectionUnpack(3))?;

    match field.bitmap.as_deref() {
        Some(bitmap) => {
            if bitmap.len().saturating_mul(8) < grid_points {
                return Err(DecodeStatus::SectionUnpack(6));
            }
            if unpacking::count_present(bitmap, grid_points) != data_points {
                return Err(DecodeStatus::SectionUnpack(6));
            }
            let values = unpacking::unpack_simple(packed, data_points, packing)?;
            if flags.expand {
                field.values = Some(unpacking::expand_bitmap(&values, bitmap, grid_points)?);
                field.data_point_count = field.grid_point_count;
                field.expanded = true;
            } else {
                field.values = Some(values);
            }
        }
        None => {
            // Without a bitmap every grid point carries a value
            if data_points != grid_points {
                return Err(DecodeStatus::SectionUnpack(5));
            }
            field.values = Some(unpacking::unpack_simple(packed, data_points, packing)?);
            field.expanded = true;
        }
    }
    field.unpacked = true;
    Ok(())
}

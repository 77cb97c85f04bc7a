//! GRIB2 data unpacking algorithms.
//!
//! Only simple packing (Data Representation Template 5.0) is implemented.

use crate::DecodeStatus;

/// Parameters of Data Representation Template 5.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimplePacking {
    pub reference_value: f32,
    pub binary_scale_factor: i32,
    pub decimal_scale_factor: i32,
    pub bits_per_value: u8,
}

impl SimplePacking {
    /// Build from the five unpacked template 5.0 values.
    ///
    /// The reference value is stored as the raw bits of an IEEE 754 single.
    pub fn from_template(template: &[i64]) -> Result<Self, DecodeStatus> {
        match template {
            [reference, binary, decimal, bits, ..] => Ok(Self {
                reference_value: f32::from_bits(*reference as u32),
                binary_scale_factor: *binary as i32,
                decimal_scale_factor: *decimal as i32,
                bits_per_value: u8::try_from(*bits).map_err(|_| DecodeStatus::SectionUnpack(5))?,
            }),
            _ => Err(DecodeStatus::SectionUnpack(5)),
        }
    }
}

/// Unpack simple packed GRIB2 data
///
/// Simple packing formula: value = (reference_value + (packed_value * 2^binary_scale)) * 10^(-decimal_scale)
///
/// The returned slice holds exactly `num_points` values. The packed data is
/// checked to hold `num_points` values before anything is allocated, and the
/// allocation itself is fallible.
pub fn unpack_simple(
    packed_data: &[u8],
    num_points: usize,
    packing: &SimplePacking,
) -> Result<Box<[f32]>, DecodeStatus> {
    let decimal_scale = 10.0_f32.powi(-packing.decimal_scale_factor);

    if packing.bits_per_value == 0 {
        // All values are the reference value
        let mut values = try_with_capacity(num_points, DecodeStatus::SectionUnpack(7))?;
        values.resize(num_points, packing.reference_value * decimal_scale);
        return Ok(values.into_boxed_slice());
    }

    let bits_per_value = packing.bits_per_value as usize;
    let needed_bits = num_points
        .checked_mul(bits_per_value)
        .ok_or(DecodeStatus::SectionUnpack(7))?;
    if packed_data.len().saturating_mul(8) < needed_bits {
        return Err(DecodeStatus::SectionUnpack(7));
    }

    let mut values = try_with_capacity(num_points, DecodeStatus::SectionUnpack(7))?;
    let binary_scale = 2.0_f32.powi(packing.binary_scale_factor);
    let mut bit_position = 0;
    for _ in 0..num_points {
        let packed_value = extract_bits(packed_data, bit_position, bits_per_value)
            .ok_or(DecodeStatus::SectionUnpack(7))?;
        bit_position += bits_per_value;
        values.push((packing.reference_value + packed_value as f32 * binary_scale) * decimal_scale);
    }

    Ok(values.into_boxed_slice())
}

/// Spread `values` over a grid of `grid_points` using a section 6 bitmap.
///
/// Points whose bit is clear become `0.0`. Fails if the bitmap is too short
/// for the grid or sets more bits than there are values.
pub fn expand_bitmap(
    values: &[f32],
    bitmap: &[u8],
    grid_points: usize,
) -> Result<Box<[f32]>, DecodeStatus> {
    if bitmap.len().saturating_mul(8) < grid_points {
        return Err(DecodeStatus::SectionUnpack(6));
    }

    let mut expanded = try_with_capacity(grid_points, DecodeStatus::SectionUnpack(7))?;
    let mut source = values.iter();
    for i in 0..grid_points {
        // Bitmap: 1 bit per grid point, MSB first, 1 = value present
        let present = (bitmap[i / 8] >> (7 - (i % 8))) & 1 == 1;
        if present {
            expanded.push(*source.next().ok_or(DecodeStatus::SectionUnpack(7))?);
        } else {
            expanded.push(0.0);
        }
    }
    Ok(expanded.into_boxed_slice())
}

/// Number of set bits among the first `grid_points` bitmap entries.
///
/// Entries past the end of the bitmap count as clear.
pub fn count_present(bitmap: &[u8], grid_points: usize) -> usize {
    let points = grid_points.min(bitmap.len().saturating_mul(8));
    let whole = points / 8;
    let full: usize = bitmap[..whole].iter().map(|b| b.count_ones() as usize).sum();
    let rest = points % 8;
    let partial = match (rest, bitmap.get(whole)) {
        (0, _) | (_, None) => 0,
        (rest, Some(byte)) => (byte >> (8 - rest)).count_ones() as usize,
    };
    full + partial
}

/// `Vec::with_capacity` that reports failure as `status` instead of aborting.
fn try_with_capacity<T>(capacity: usize, status: DecodeStatus) -> Result<Vec<T>, DecodeStatus> {
    let mut values = Vec::new();
    values.try_reserve_exact(capacity).map_err(|_| status)?;
    Ok(values)
}

/// Extract `num_bits` bits starting at `start_bit`, MSB first.
fn extract_bits(data: &[u8], start_bit: usize, num_bits: usize) -> Option<u32> {
    if num_bits > 32 || num_bits == 0 {
        return None;
    }

    let mut result = 0u32;
    for i in 0..num_bits {
        let absolute_bit = start_bit + i;
        let byte = *data.get(absolute_bit / 8)?;
        let bit = (byte >> (7 - (absolute_bit % 8))) & 1;
        result = (result << 1) | u32::from(bit);
    }
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packing(reference_value: f32, e: i32, d: i32, bits: u8) -> SimplePacking {
        SimplePacking {
            reference_value,
            binary_scale_factor: e,
            decimal_scale_factor: d,
            bits_per_value: bits,
        }
    }

    #[test]
    fn test_extract_bits() {
        let data = vec![0b10110101];
        assert_eq!(extract_bits(&data, 0, 2), Some(0b10));
        assert_eq!(extract_bits(&data, 2, 2), Some(0b11));
        assert_eq!(extract_bits(&data, 0, 8), Some(0b10110101));
        assert_eq!(extract_bits(&data, 4, 8), None);
    }

    #[test]
    fn test_simple_unpacking() {
        let packed = vec![100, 200];
        let values = unpack_simple(&packed, 2, &packing(0.0, 0, 0, 8)).unwrap();
        assert_eq!(values.len(), 2);
        assert!((values[0] - 100.0).abs() < 0.1);
        assert!((values[1] - 200.0).abs() < 0.1);
    }

    #[test]
    fn test_scaled_unpacking() {
        // (10 + 3 * 2^1) * 10^-1 = 1.6
        let values = unpack_simple(&[3], 1, &packing(10.0, 1, 1, 8)).unwrap();
        assert!((values[0] - 1.6).abs() < 1e-5);
    }

    #[test]
    fn test_constant_field() {
        let values = unpack_simple(&[], 4, &packing(288.15, 0, 0, 0)).unwrap();
        assert_eq!(values.len(), 4);
        assert!(values.iter().all(|v| (*v - 288.15).abs() < 1e-4));
    }

    #[test]
    fn test_short_data_is_rejected() {
        let err = unpack_simple(&[1, 2], 3, &packing(0.0, 0, 0, 8)).unwrap_err();
        assert_eq!(err.code(), 14);
    }

    #[test]
    fn test_template_reference_bits() {
        let template = [i64::from(1.5f32.to_bits()), -2, 1, 12, 0];
        let p = SimplePacking::from_template(&template).unwrap();
        assert_eq!(p.reference_value, 1.5);
        assert_eq!(p.binary_scale_factor, -2);
        assert_eq!(p.decimal_scale_factor, 1);
        assert_eq!(p.bits_per_value, 12);
    }

    #[test]
    fn test_expand_bitmap() {
        let expanded = expand_bitmap(&[1.0, 2.0], &[0b0110_0000], 4).unwrap();
        assert_eq!(&*expanded, &[0.0, 1.0, 2.0, 0.0]);
        assert_eq!(count_present(&[0b0110_0000], 4), 2);
    }

    #[test]
    fn test_count_present_is_bounded_by_bitmap() {
        assert_eq!(count_present(&[0xFF, 0b1010_0001], 11), 10);
        assert_eq!(count_present(&[0xFF], usize::MAX), 8);
        assert_eq!(count_present(&[], 1 << 40), 0);
    }

    #[test]
    fn test_huge_count_without_data_is_rejected() {
        let err = unpack_simple(&[0; 16], u32::MAX as usize, &packing(0.0, 0, 0, 16)).unwrap_err();
        assert_eq!(err, DecodeStatus::SectionUnpack(7));
    }

    #[test]
    fn test_expand_bitmap_too_few_values() {
        let err = expand_bitmap(&[1.0], &[0b1100_0000], 2).unwrap_err();
        assert_eq!(err.code(), 14);
    }
}

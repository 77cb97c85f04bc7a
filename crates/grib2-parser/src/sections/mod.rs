//! GRIB2 section parsing.
//!
//! Each function takes the full bytes of one section (header included) and
//! returns the values the decoder keeps, or the section-specific
//! [`DecodeStatus`] when the section cannot be unpacked.

use chrono::{DateTime, NaiveDate, Utc};

use crate::templates::{self, unpack_template};
use crate::DecodeStatus;

/// Length of Section 0 in octets.
pub const INDICATOR_LEN: usize = 16;

/// Section 8 terminator.
pub const END_MARKER: &[u8; 4] = b"7777";

/// Section 1 octet map (center .. type of data).
const IDENTIFICATION_MAP: &[i8] = &[2, 2, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1, 1];

/// Section 0: Indicator Section (16 bytes)
#[derive(Debug, Clone)]
pub struct Indicator {
    pub discipline: u8,
    pub edition: u8,
    pub message_length: u64,
}

/// Length and number read from the first five octets of a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionHeader {
    pub length: usize,
    pub number: u8,
}

/// Section 3: Grid Definition Section
#[derive(Debug, Clone, Default)]
pub struct GridDefinition {
    pub source: i64,
    pub num_points: i64,
    pub optional_list_octets: i64,
    pub optional_list_interpretation: i64,
    pub template_number: u16,
    pub template: Vec<i64>,
    pub optional_list: Vec<i64>,
}

/// Section 4: Product Definition Section
#[derive(Debug, Clone, Default)]
pub struct ProductDefinition {
    pub template_number: u16,
    pub template: Vec<i64>,
    pub coordinates: Vec<f32>,
}

/// Section 5: Data Representation Section
#[derive(Debug, Clone, Default)]
pub struct DataRepresentation {
    pub num_points: i64,
    pub template_number: u16,
    pub template: Vec<i64>,
}

/// Section 6: Bitmap Section
#[derive(Debug, Clone)]
pub struct BitmapSection {
    pub indicator: u8,
    /// Raw bitmap octets when `indicator == 0`.
    pub bits: Option<Vec<u8>>,
}

// ===== Parsing Functions =====

/// Parse Section 0 (Indicator) from start of message
pub fn parse_indicator(data: &[u8]) -> Result<Indicator, DecodeStatus> {
    if data.len() < 4 || &data[0..4] != b"GRIB" {
        return Err(DecodeStatus::MagicNotFound);
    }
    if data.len() < INDICATOR_LEN {
        return Err(DecodeStatus::EndMarkerMissing);
    }

    // Octets 1-4: "GRIB"
    // Octets 5-6: Reserved
    // Octet 7: Discipline
    // Octet 8: GRIB Edition Number
    // Octets 9-16: Total length of GRIB message
    let discipline = data[6];
    let edition = data[7];
    if edition != 2 {
        return Err(DecodeStatus::UnsupportedEdition(edition));
    }

    let mut length = [0u8; 8];
    length.copy_from_slice(&data[8..16]);

    Ok(Indicator {
        discipline,
        edition,
        message_length: u64::from_be_bytes(length),
    })
}

/// Read the header of the section starting at `offset`.
///
/// Returns `None` if the header is truncated or the declared length does not
/// fit inside `data`.
pub fn read_section_header(data: &[u8], offset: usize) -> Option<SectionHeader> {
    let header = data.get(offset..offset.checked_add(5)?)?;
    let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    if length < 5 || offset.checked_add(length)? > data.len() {
        return None;
    }
    Some(SectionHeader {
        length,
        number: header[4],
    })
}

/// Parse Section 1 (Identification) into its thirteen values.
pub fn parse_identification(section: &[u8]) -> Result<Vec<i64>, DecodeStatus> {
    section
        .get(5..)
        .and_then(|body| unpack_template(body, IDENTIFICATION_MAP))
        .ok_or(DecodeStatus::SectionUnpack(1))
}

/// Reference time from the values returned by [`parse_identification`].
///
/// Returns `None` when the date or time of day is not valid.
pub fn reference_time(identification: &[i64]) -> Option<DateTime<Utc>> {
    let [year, month, day, hour, minute, second] = identification.get(5..11)? else {
        return None;
    };
    let part = |v: i64| u32::try_from(v).ok();
    let time = NaiveDate::from_ymd_opt(i32::try_from(*year).ok()?, part(*month)?, part(*day)?)?
        .and_hms_opt(part(*hour)?, part(*minute)?, part(*second)?)?;
    Some(DateTime::<Utc>::from_naive_utc_and_offset(time, Utc))
}

/// Parse Section 3 (Grid Definition)
pub fn parse_grid_definition(section: &[u8]) -> Result<GridDefinition, DecodeStatus> {
    const ERR: DecodeStatus = DecodeStatus::SectionUnpack(3);

    // Octet 6: Source of grid definition
    // Octets 7-10: Number of data points
    // Octet 11: Number of octets for optional list
    // Octet 12: Interpretation of optional list
    // Octets 13-14: Grid definition template number
    // Octets 15+: Template values, then the optional list
    if section.len() < 14 {
        return Err(ERR);
    }
    let source = i64::from(section[5]);
    let num_points = i64::from(u32::from_be_bytes([
        section[6], section[7], section[8], section[9],
    ]));
    let optional_list_octets = i64::from(section[10]);
    let optional_list_interpretation = i64::from(section[11]);
    let template_number = u16::from_be_bytes([section[12], section[13]]);

    let map = templates::grid_template_map(template_number).ok_or(ERR)?;
    let body = &section[14..];
    let template = unpack_template(body, map).ok_or(ERR)?;

    let mut optional_list = Vec::new();
    if optional_list_octets > 0 {
        let width = optional_list_octets as usize;
        let list = &body[templates::map_width(map)..];
        optional_list = list
            .chunks_exact(width)
            .map(|chunk| chunk.iter().fold(0i64, |acc, &b| (acc << 8) | i64::from(b)))
            .collect();
    }

    Ok(GridDefinition {
        source,
        num_points,
        optional_list_octets,
        optional_list_interpretation,
        template_number,
        template,
        optional_list,
    })
}

/// Parse Section 4 (Product Definition)
pub fn parse_product_definition(section: &[u8]) -> Result<ProductDefinition, DecodeStatus> {
    const ERR: DecodeStatus = DecodeStatus::SectionUnpack(4);

    // Octets 6-7: Number of coordinate values after the template
    // Octets 8-9: Product definition template number
    if section.len() < 9 {
        return Err(ERR);
    }
    let num_coordinates = u16::from_be_bytes([section[5], section[6]]) as usize;
    let template_number = u16::from_be_bytes([section[7], section[8]]);
    let body = &section[9..];

    let template = templates::unpack_product_template(template_number, body).ok_or(ERR)?;

    let mut coordinates = Vec::new();
    if num_coordinates > 0 {
        let needed = num_coordinates * 4;
        let tail = body.len().checked_sub(needed).ok_or(ERR)?;
        coordinates = body[tail..]
            .chunks_exact(4)
            .map(|c| f32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
    }

    Ok(ProductDefinition {
        template_number,
        template,
        coordinates,
    })
}

/// Parse Section 5 (Data Representation)
pub fn parse_data_representation(section: &[u8]) -> Result<DataRepresentation, DecodeStatus> {
    // Octets 6-9: Number of data points
    // Octets 10-11: Data representation template number
    if section.len() < 11 {
        return Err(DecodeStatus::SectionUnpack(5));
    }
    let num_points = i64::from(u32::from_be_bytes([
        section[5], section[6], section[7], section[8],
    ]));
    let template_number = u16::from_be_bytes([section[9], section[10]]);

    let map = templates::data_template_map(template_number)
        .ok_or(DecodeStatus::DataTemplateNotImplemented(template_number))?;
    let template = unpack_template(&section[11..], map).ok_or(DecodeStatus::SectionUnpack(5))?;

    Ok(DataRepresentation {
        num_points,
        template_number,
        template,
    })
}

/// Parse Section 6 (Bitmap)
pub fn parse_bitmap(section: &[u8]) -> Result<BitmapSection, DecodeStatus> {
    if section.len() < 6 {
        return Err(DecodeStatus::SectionUnpack(6));
    }
    let indicator = section[5];
    let bits = (indicator == 0).then(|| section[6..].to_vec());
    Ok(BitmapSection { indicator, bits })
}

/// Decode a GRIB2 sign-magnitude integer.
///
/// The most significant bit carries the sign, the remaining bits the
/// magnitude. Slices longer than eight octets decode to zero.
pub fn decode_grib2_signed(bytes: &[u8]) -> i64 {
    if bytes.is_empty() || bytes.len() > 8 {
        return 0;
    }
    let negative = bytes[0] & 0x80 != 0;
    let magnitude = bytes
        .iter()
        .enumerate()
        .fold(0i64, |acc, (i, &b)| {
            let b = if i == 0 { b & 0x7F } else { b };
            (acc << 8) | i64::from(b)
        });
    if negative {
        -magnitude
    } else {
        magnitude
    }
}

/// Encode a value as a GRIB2 sign-magnitude integer of `width` octets.
pub fn encode_grib2_signed(value: i64, width: usize) -> Vec<u8> {
    let magnitude = value.unsigned_abs();
    let mut bytes: Vec<u8> = (0..width)
        .rev()
        .map(|i| (magnitude >> (8 * i)) as u8)
        .collect();
    if value < 0 {
        if let Some(first) = bytes.first_mut() {
            *first |= 0x80;
        }
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(number: u8, body: &[u8]) -> Vec<u8> {
        let mut s = ((body.len() + 5) as u32).to_be_bytes().to_vec();
        s.push(number);
        s.extend_from_slice(body);
        s
    }

    #[test]
    fn test_indicator_rejects_bad_magic() {
        let err = parse_indicator(b"GRIX\0\0\0\x02").unwrap_err();
        assert_eq!(err, DecodeStatus::MagicNotFound);
    }

    #[test]
    fn test_indicator_rejects_edition_1() {
        let mut data = b"GRIB".to_vec();
        data.extend_from_slice(&[0, 0, 0, 1]);
        data.extend_from_slice(&16u64.to_be_bytes());
        assert_eq!(
            parse_indicator(&data).unwrap_err(),
            DecodeStatus::UnsupportedEdition(1)
        );
    }

    #[test]
    fn test_indicator_full_length() {
        let mut data = b"GRIB".to_vec();
        data.extend_from_slice(&[0, 0, 10, 2]);
        data.extend_from_slice(&(1u64 << 33).to_be_bytes());
        let ind = parse_indicator(&data).unwrap();
        assert_eq!(ind.discipline, 10);
        assert_eq!(ind.message_length, 1u64 << 33);
    }

    #[test]
    fn test_section_header_bounds() {
        let s = section(4, &[0; 10]);
        assert_eq!(
            read_section_header(&s, 0),
            Some(SectionHeader { length: 15, number: 4 })
        );
        assert_eq!(read_section_header(&s[..14], 0), None);
        assert_eq!(read_section_header(&s, 12), None);
    }

    #[test]
    fn test_reference_time() {
        let mut body = vec![0, 7, 0, 0, 2, 1, 1];
        body.extend_from_slice(&2025u16.to_be_bytes());
        body.extend_from_slice(&[12, 10, 18, 30, 15, 0, 1]);
        let values = parse_identification(&section(1, &body)).unwrap();
        let time = reference_time(&values).unwrap();
        assert_eq!(time.to_rfc3339(), "2025-12-10T18:30:15+00:00");
    }

    #[test]
    fn test_invalid_reference_time() {
        assert_eq!(reference_time(&[7, 0, 2, 1, 1, 2025, 13, 1, 0, 0, 0, 0, 1]), None);
        assert_eq!(reference_time(&[7, 0, 2]), None);
    }

    #[test]
    fn test_unsupported_grid_template() {
        // Source, point count, optional list octets and interpretation
        let mut body = vec![0u8; 7];
        body.extend_from_slice(&90u16.to_be_bytes());
        body.extend_from_slice(&[0; 80]);
        let err = parse_grid_definition(&section(3, &body)).unwrap_err();
        assert_eq!(err.code(), 10);
    }

    #[test]
    fn test_unsupported_data_template() {
        let mut body = 4u32.to_be_bytes().to_vec();
        body.extend_from_slice(&3u16.to_be_bytes());
        body.extend_from_slice(&[0; 30]);
        let err = parse_data_representation(&section(5, &body)).unwrap_err();
        assert_eq!(err, DecodeStatus::DataTemplateNotImplemented(3));
        assert_eq!(err.code(), 9);
    }

    #[test]
    fn test_bitmap_indicator() {
        let present = parse_bitmap(&section(6, &[0, 0b1010_0000])).unwrap();
        assert_eq!(present.bits, Some(vec![0b1010_0000]));

        let absent = parse_bitmap(&section(6, &[255])).unwrap();
        assert_eq!(absent.indicator, 255);
        assert!(absent.bits.is_none());
    }

    #[test]
    fn test_signed_round_trip_sign() {
        assert_eq!(encode_grib2_signed(-3, 2), vec![0x80, 0x03]);
        assert_eq!(decode_grib2_signed(&encode_grib2_signed(-3, 2)), -3);
        assert_eq!(decode_grib2_signed(&[0x80, 0x00]), 0);
    }
}

//! Template octet maps.
//!
//! Each entry is the width in octets of one template value. A negative width
//! marks a GRIB2 sign-magnitude integer.

use crate::sections::decode_grib2_signed;

/// Grid definition template number for a regular latitude/longitude grid.
pub const GRID_LATLON: u16 = 0;

const GRID_3_0: &[i8] = &[1, 1, 4, 1, 4, 1, 4, 4, 4, 4, 4, -4, 4, 1, -4, 4, 4, 4, 1];
const GRID_3_10: &[i8] = &[1, 1, 4, 1, 4, 1, 4, 4, 4, -4, -4, 1, -4, -4, -4, 1, 4, 4, 4];
const GRID_3_20: &[i8] = &[1, 1, 4, 1, 4, 1, 4, 4, 4, -4, 4, 1, -4, 4, 4, 4, 1, 1];
const GRID_3_30: &[i8] = &[
    1, 1, 4, 1, 4, 1, 4, 4, 4, -4, 4, 1, -4, -4, 4, 4, 1, 1, -4, -4, -4, 4,
];
const GRID_3_40: &[i8] = &[1, 1, 4, 1, 4, 1, 4, 4, 4, 4, 4, -4, 4, 1, -4, 4, 4, 4, 1];

const PRODUCT_4_0: &[i8] = &[1, 1, 1, 1, 1, 2, 1, 1, 4, 1, -1, -4, 1, -1, -4];
const PRODUCT_4_1: &[i8] = &[1, 1, 1, 1, 1, 2, 1, 1, 4, 1, -1, -4, 1, -1, -4, 1, 1, 1];
const PRODUCT_4_8: &[i8] = &[
    1, 1, 1, 1, 1, 2, 1, 1, 4, 1, -1, -4, 1, -1, -4, 2, 1, 1, 1, 1, 1, 1, 4, 1, 1, 1, 4, 1, 4,
];
/// Repeated once per additional time range in template 4.8.
const PRODUCT_4_8_RANGE: &[i8] = &[1, 1, 1, 4, 1, 4];
/// Index of "number of time range specifications" in template 4.8.
const PRODUCT_4_8_RANGE_COUNT: usize = 21;

const DATA_5_0: &[i8] = &[4, -2, -2, 1, 1];

/// Octet map for a grid definition template, if supported.
pub fn grid_template_map(number: u16) -> Option<&'static [i8]> {
    match number {
        0 => Some(GRID_3_0),
        10 => Some(GRID_3_10),
        20 => Some(GRID_3_20),
        30 => Some(GRID_3_30),
        40 => Some(GRID_3_40),
        _ => None,
    }
}

/// Octet map for a data representation template, if supported.
pub fn data_template_map(number: u16) -> Option<&'static [i8]> {
    match number {
        0 => Some(DATA_5_0),
        _ => None,
    }
}

/// Unpack a product definition template.
///
/// Template 4.8 has a variable tail: the base map is followed by one
/// six-value block for every time range beyond the first.
pub fn unpack_product_template(number: u16, data: &[u8]) -> Option<Vec<i64>> {
    let base = match number {
        0 => PRODUCT_4_0,
        1 => PRODUCT_4_1,
        8 => PRODUCT_4_8,
        _ => return None,
    };
    let mut values = unpack_template(data, base)?;
    if number == 8 {
        let ranges = values[PRODUCT_4_8_RANGE_COUNT];
        if ranges > 1 {
            let consumed = map_width(base);
            let extra: Vec<i8> = PRODUCT_4_8_RANGE
                .iter()
                .copied()
                .cycle()
                .take(PRODUCT_4_8_RANGE.len() * (ranges as usize - 1))
                .collect();
            values.extend(unpack_template(data.get(consumed..)?, &extra)?);
        }
    }
    Some(values)
}

/// Total number of octets covered by a map.
pub fn map_width(map: &[i8]) -> usize {
    map.iter().map(|w| w.unsigned_abs() as usize).sum()
}

/// Unpack template values according to an octet map.
///
/// Returns `None` when `data` is shorter than the map requires.
pub fn unpack_template(data: &[u8], map: &[i8]) -> Option<Vec<i64>> {
    if data.len() < map_width(map) {
        return None;
    }

    let mut values = Vec::with_capacity(map.len());
    let mut pos = 0;
    for &width in map {
        let len = width.unsigned_abs() as usize;
        let raw = &data[pos..pos + len];
        let value = if width < 0 {
            decode_grib2_signed(raw)
        } else {
            raw.iter().fold(0i64, |acc, &b| (acc << 8) | i64::from(b))
        };
        values.push(value);
        pos += len;
    }
    Some(values)
}

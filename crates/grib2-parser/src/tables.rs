//! GRIB2 parameter lookup tables.
//!
//! Translates `(discipline, category, number)` codes into a short name, a
//! long name and a unit. A small built-in table covers the common
//! meteorological parameters; more can be merged in from a JSON document
//! shaped like
//! `{"0": {"categories": {"0": {"parameters": {"0": {"shortName": "TMP", ...}}}}}}`.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Lookup key for parameter: (discipline, category, number)
pub type ParamKey = (u8, u8, u8);

#[derive(Debug, Error)]
pub enum TablesError {
    #[error("Failed to read tables file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse tables JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid code '{0}' in tables")]
    InvalidCode(String),
}

/// Human-readable description of one parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterInfo {
    pub short_name: String,
    pub name: String,
    pub unit: String,
}

impl ParameterInfo {
    fn new(short_name: &str, name: &str, unit: &str) -> Self {
        Self {
            short_name: short_name.to_string(),
            name: name.to_string(),
            unit: unit.to_string(),
        }
    }

    /// Returned for codes that are not in the table.
    pub fn unknown() -> Self {
        Self::new("N/A", "Unknown Parameter", "")
    }
}

#[derive(Deserialize)]
struct DisciplineEntry {
    #[serde(default)]
    categories: BTreeMap<String, CategoryEntry>,
}

#[derive(Deserialize)]
struct CategoryEntry {
    #[serde(default)]
    parameters: BTreeMap<String, ParameterEntry>,
}

#[derive(Deserialize)]
struct ParameterEntry {
    #[serde(rename = "shortName", default)]
    short_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    unit: Option<String>,
}

/// GRIB2 parameter lookup tables.
#[derive(Debug, Clone, Default)]
pub struct Grib2Tables {
    parameters: HashMap<ParamKey, ParameterInfo>,
}

impl Grib2Tables {
    /// Create empty tables
    pub fn new() -> Self {
        Self::default()
    }

    /// Tables pre-filled with common WMO and NCEP parameters.
    pub fn builtin() -> Self {
        let mut tables = Self::new();
        for &(d, c, n, short, name, unit) in BUILTIN {
            tables.add_parameter(d, c, n, ParameterInfo::new(short, name, unit));
        }
        tables
    }

    /// Add a parameter mapping, replacing any existing entry.
    pub fn add_parameter(&mut self, discipline: u8, category: u8, number: u8, info: ParameterInfo) {
        self.parameters.insert((discipline, category, number), info);
    }

    /// Merge parameters from a JSON document. Missing fields fall back to
    /// the values of [`ParameterInfo::unknown`].
    pub fn merge_json(&mut self, json: &str) -> Result<usize, TablesError> {
        let doc: BTreeMap<String, DisciplineEntry> = serde_json::from_str(json)?;
        let mut added = 0;
        for (discipline, entry) in doc {
            let d = parse_code(&discipline)?;
            for (category, cat) in entry.categories {
                let c = parse_code(&category)?;
                for (number, param) in cat.parameters {
                    let n = parse_code(&number)?;
                    let fallback = ParameterInfo::unknown();
                    self.add_parameter(
                        d,
                        c,
                        n,
                        ParameterInfo {
                            short_name: param.short_name.unwrap_or(fallback.short_name),
                            name: param.name.unwrap_or(fallback.name),
                            unit: param.unit.unwrap_or(fallback.unit),
                        },
                    );
                    added += 1;
                }
            }
        }
        Ok(added)
    }

    /// Built-in tables extended with the contents of a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TablesError> {
        let json = std::fs::read_to_string(path)?;
        let mut tables = Self::builtin();
        tables.merge_json(&json)?;
        Ok(tables)
    }

    /// Look up a parameter; unknown codes map to [`ParameterInfo::unknown`].
    pub fn get_parameter(&self, discipline: u8, category: u8, number: u8) -> ParameterInfo {
        self.parameters
            .get(&(discipline, category, number))
            .cloned()
            .unwrap_or_else(ParameterInfo::unknown)
    }

    /// Get the number of parameters in the table
    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}

fn parse_code(code: &str) -> Result<u8, TablesError> {
    code.trim()
        .parse()
        .map_err(|_| TablesError::InvalidCode(code.to_string()))
}

const BUILTIN: &[(u8, u8, u8, &str, &str, &str)] = &[
    // Discipline 0: Meteorological products
    (0, 0, 0, "TMP", "Temperature", "K"),
    (0, 0, 2, "POT", "Potential temperature", "K"),
    (0, 0, 6, "DPT", "Dew point temperature", "K"),
    (0, 1, 0, "SPFH", "Specific humidity", "kg/kg"),
    (0, 1, 1, "RH", "Relative humidity", "%"),
    (0, 1, 3, "PWAT", "Precipitable water", "kg/m^2"),
    (0, 1, 7, "PRATE", "Precipitation rate", "kg/m^2/s"),
    (0, 1, 8, "APCP", "Total precipitation", "kg/m^2"),
    (0, 2, 0, "WDIR", "Wind direction", "deg"),
    (0, 2, 1, "WIND", "Wind speed", "m/s"),
    (0, 2, 2, "UGRD", "U-component of wind", "m/s"),
    (0, 2, 3, "VGRD", "V-component of wind", "m/s"),
    (0, 2, 8, "VVEL", "Vertical velocity (pressure)", "Pa/s"),
    (0, 2, 10, "ABSV", "Absolute vorticity", "1/s"),
    (0, 2, 22, "GUST", "Wind speed (gust)", "m/s"),
    (0, 3, 0, "PRES", "Pressure", "Pa"),
    (0, 3, 1, "PRMSL", "Pressure reduced to MSL", "Pa"),
    (0, 3, 5, "HGT", "Geopotential height", "gpm"),
    (0, 6, 1, "TCDC", "Total cloud cover", "%"),
    (0, 7, 6, "CAPE", "Convective available potential energy", "J/kg"),
    (0, 7, 7, "CIN", "Convective inhibition", "J/kg"),
    (0, 16, 196, "REFC", "Composite reflectivity", "dB"),
    (0, 19, 0, "VIS", "Visibility", "m"),
    // Discipline 2: Land surface products
    (2, 0, 0, "LAND", "Land cover", "proportion"),
    // Discipline 10: Oceanographic products
    (10, 0, 3, "HTSGW", "Significant height of combined wind waves and swell", "m"),
    // Discipline 209: MRMS (local use)
    (209, 0, 16, "REFL", "Merged reflectivity QC", "dBZ"),
    (209, 1, 1, "QPE", "Quantitative precipitation estimate", "mm"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup() {
        let tables = Grib2Tables::builtin();
        assert_eq!(tables.get_parameter(0, 0, 0).short_name, "TMP");
        assert_eq!(tables.get_parameter(0, 2, 2).unit, "m/s");
        assert_eq!(tables.get_parameter(209, 0, 16).short_name, "REFL");
    }

    #[test]
    fn test_parameter_not_found() {
        let tables = Grib2Tables::builtin();
        assert_eq!(tables.get_parameter(99, 99, 99), ParameterInfo::unknown());
    }

    #[test]
    fn test_merge_json() {
        let mut tables = Grib2Tables::new();
        let added = tables
            .merge_json(
                r#"{"0": {"categories": {"1": {"parameters": {
                    "8": {"shortName": "APCP", "name": "Total Precipitation", "unit": "kg m-2"},
                    "9": {"shortName": "NCPCP"}
                }}}}}"#,
            )
            .unwrap();
        assert_eq!(added, 2);
        assert_eq!(tables.get_parameter(0, 1, 8).name, "Total Precipitation");

        let partial = tables.get_parameter(0, 1, 9);
        assert_eq!(partial.short_name, "NCPCP");
        assert_eq!(partial.name, "Unknown Parameter");
    }

    #[test]
    fn test_merge_rejects_bad_code() {
        let mut tables = Grib2Tables::new();
        let err = tables
            .merge_json(r#"{"x": {"categories": {}}}"#)
            .unwrap_err();
        assert!(matches!(err, TablesError::InvalidCode(code) if code == "x"));
    }

    #[test]
    fn test_empty_tables() {
        let tables = Grib2Tables::new();
        assert!(tables.is_empty());
        assert_eq!(tables.parameter_count(), 0);
        assert_eq!(tables.get_parameter(0, 0, 0).short_name, "N/A");
    }
}

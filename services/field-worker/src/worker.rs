//! Per-message extraction loop.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use chrono::SecondsFormat;
use grib2_bridge::{process, release, FieldIndex, FieldMetadata};
use grib2_parser::{message_reference_time, Grib2Decoder, Grib2Reader, Grib2Tables, ParameterInfo};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;

/// One extracted field as printed by the worker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSummary {
    #[serde(rename = "messageNumber")]
    pub message_number: usize,
    /// Section 1 reference time as an ISO 8601 UTC timestamp.
    #[serde(rename = "refTime", skip_serializing_if = "Option::is_none")]
    pub ref_time: Option<String>,
    #[serde(flatten)]
    pub metadata: FieldMetadata,
    #[serde(rename = "shortName")]
    pub short_name: String,
    pub name: String,
    pub unit: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<f32>>,
}

pub struct Worker {
    decoder: Grib2Decoder,
    tables: Grib2Tables,
    field: FieldIndex,
    message: Option<usize>,
    values: usize,
}

impl Worker {
    pub fn new(tables: Grib2Tables, field: FieldIndex) -> Self {
        Self {
            decoder: Grib2Decoder,
            tables,
            field,
            message: None,
            values: 0,
        }
    }

    pub fn from_config(config: &WorkerConfig) -> Result<Self> {
        let field = FieldIndex::new(config.field)?;
        let tables = match &config.tables {
            Some(path) => Grib2Tables::from_file(path)
                .with_context(|| format!("loading parameter tables from {}", path.display()))?,
            None => Grib2Tables::builtin(),
        };
        info!(parameters = tables.parameter_count(), "Loaded parameter tables");

        Ok(Self::new(tables, field)
            .with_message(config.message)
            .with_values(config.values))
    }

    pub fn with_message(mut self, message: Option<usize>) -> Self {
        self.message = message;
        self
    }

    pub fn with_values(mut self, values: usize) -> Self {
        self.values = values;
        self
    }

    pub fn run_file(&self, path: &Path) -> Result<Vec<FieldSummary>> {
        let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        info!(file = %path.display(), bytes = data.len(), "Read GRIB2 file");
        self.run(Bytes::from(data))
    }

    /// Extract the configured field from every selected message.
    ///
    /// Messages that fail to decode are logged and skipped.
    pub fn run(&self, data: Bytes) -> Result<Vec<FieldSummary>> {
        let mut results = Vec::new();
        let mut seen = 0;

        for (number, (span, message)) in (1..).zip(Grib2Reader::new(data)) {
            seen = number;
            if self.message.is_some_and(|wanted| wanted != number) {
                continue;
            }
            match self.summarize(number, &message) {
                Ok(summary) => results.push(summary),
                Err(err) => {
                    warn!(message = number, offset = span.offset, error = %err, "Skipping message");
                }
            }
        }

        if let Some(wanted) = self.message {
            if wanted == 0 || wanted > seen {
                bail!("message {wanted} not found ({seen} messages in file)");
            }
        }
        Ok(results)
    }

    fn summarize(&self, message_number: usize, message: &[u8]) -> Result<FieldSummary> {
        let bundle = process(&self.decoder, message, self.field)?;
        let metadata = bundle.metadata();
        let values = (self.values > 0)
            .then(|| bundle.payload().iter().take(self.values).copied().collect());
        release(bundle);
        let metadata = metadata?;

        let ref_time = message_reference_time(message)
            .map(|time| time.to_rfc3339_opts(SecondsFormat::Millis, true));
        let info = self.lookup(&metadata);
        debug!(
            message = message_number,
            parameter = %info.short_name,
            points = metadata.num_points,
            "Extracted field"
        );

        Ok(FieldSummary {
            message_number,
            ref_time,
            metadata,
            short_name: info.short_name,
            name: info.name,
            unit: info.unit,
            values,
        })
    }

    fn lookup(&self, metadata: &FieldMetadata) -> ParameterInfo {
        let code = |value: i64| u8::try_from(value).ok();
        match (
            code(metadata.discipline),
            code(metadata.parameter_category),
            code(metadata.parameter_number),
        ) {
            (Some(discipline), Some(category), Some(number)) => {
                self.tables.get_parameter(discipline, category, number)
            }
            _ => ParameterInfo::unknown(),
        }
    }
}

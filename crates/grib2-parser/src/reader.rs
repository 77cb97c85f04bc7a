//! Locating GRIB2 messages inside a larger buffer.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::sections::{self, INDICATOR_LEN};

/// Where one message sits inside a file buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageSpan {
    pub offset: usize,
    pub length: usize,
}

/// Find every GRIB message in `data`.
///
/// Searches for the "GRIB" magic, reads the total length from Section 0 and
/// jumps past the message. Bytes between messages are skipped. Scanning
/// stops at the first message whose header or body is truncated.
pub fn scan_messages(data: &[u8]) -> Vec<MessageSpan> {
    let mut spans = Vec::new();
    let mut offset = 0;

    while offset + 4 <= data.len() {
        if &data[offset..offset + 4] != b"GRIB" {
            offset += 1;
            continue;
        }
        if offset + INDICATOR_LEN > data.len() {
            debug!(offset, "Found GRIB magic without a complete header");
            break;
        }

        let mut length = [0u8; 8];
        length.copy_from_slice(&data[offset + 8..offset + 16]);
        let length = match usize::try_from(u64::from_be_bytes(length)) {
            Ok(len) if len >= INDICATOR_LEN => len,
            _ => {
                offset += 1;
                continue;
            }
        };
        if offset + length > data.len() {
            debug!(offset, length, available = data.len() - offset, "Truncated GRIB message");
            break;
        }

        spans.push(MessageSpan { offset, length });
        offset += length;
    }

    debug!(count = spans.len(), "Scanned for GRIB messages");
    spans
}

/// Reference time of a message, read from the Section 1 that follows the
/// indicator.
pub fn message_reference_time(message: &[u8]) -> Option<DateTime<Utc>> {
    let header = sections::read_section_header(message, INDICATOR_LEN)?;
    if header.number != 1 {
        return None;
    }
    let section = &message[INDICATOR_LEN..INDICATOR_LEN + header.length];
    let identification = sections::parse_identification(section).ok()?;
    sections::reference_time(&identification)
}

/// Iterates over the messages of a buffer as zero-copy [`Bytes`] slices.
pub struct Grib2Reader {
    data: Bytes,
    spans: std::vec::IntoIter<MessageSpan>,
}

impl Grib2Reader {
    pub fn new(data: Bytes) -> Self {
        let spans = scan_messages(&data).into_iter();
        Self { data, spans }
    }
}

impl Iterator for Grib2Reader {
    type Item = (MessageSpan, Bytes);

    fn next(&mut self) -> Option<Self::Item> {
        let span = self.spans.next()?;
        Some((span, self.data.slice(span.offset..span.offset + span.length)))
    }
}

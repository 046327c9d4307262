//! Binary-object materialization and format sniffing.

use crate::error::Result;
use crate::rpt::RptFile;
use bytes::Bytes;
use tracing::debug;

/// Detected format of the embedded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    Pdf,
    Afp,
    /// Magic bytes matched neither format; only the BIN route accepts this.
    Unknown,
}

impl PayloadFormat {
    /// Preferred file extension for routed output.
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Afp => "afp",
            Self::Unknown => "bin",
        }
    }

    /// Human-readable name for the success report.
    pub const fn describe(&self) -> &'static str {
        match self {
            Self::Pdf => "PDF document",
            Self::Afp => "AFP document",
            Self::Unknown => "binary data",
        }
    }
}

/// The embedded document, decompressed and concatenated.
pub struct BinaryPayload {
    pub data: Bytes,
    pub format: PayloadFormat,
}

impl BinaryPayload {
    /// Decompress and concatenate the file's binary-object table.
    ///
    /// Returns `None` when the file carries no binary objects, which is the
    /// benign text-only case rather than an error.
    pub fn materialize(rpt: &RptFile) -> Result<Option<Self>> {
        if rpt.binary_objects.is_empty() {
            return Ok(None);
        }

        let total: usize = rpt
            .binary_objects
            .iter()
            .map(|d| d.uncompressed_size as usize)
            .sum();
        let mut data = Vec::with_capacity(total);
        for desc in &rpt.binary_objects {
            data.extend_from_slice(&rpt.decompress(desc)?);
        }

        let format = sniff(&data);
        debug!(bytes = data.len(), ?format, "materialized binary payload");
        Ok(Some(Self {
            data: Bytes::from(data),
            format,
        }))
    }
}

/// Classify payload bytes by their magic.
///
/// AFP detection requires the 0x5A carriage-control byte and a structured
/// field length that stays within the buffer.
fn sniff(data: &[u8]) -> PayloadFormat {
    if data.starts_with(b"%PDF") {
        return PayloadFormat::Pdf;
    }
    if data.len() >= 9 && data[0] == 0x5A {
        let length = u16::from_be_bytes([data[1], data[2]]) as usize;
        if length >= 8 && 1 + length <= data.len() {
            return PayloadFormat::Afp;
        }
    }
    PayloadFormat::Unknown
}

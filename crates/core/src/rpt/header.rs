//! RPT fixed-layout header decoding.

use super::layout::{
    BINARY_COUNT_OFFSET, FILE_MAGIC, FIXED_HEADER_SIZE, PAGE_COUNT_OFFSET, SECTION_COUNT_OFFSET,
    TEXT_HEADER_LIMIT,
};
use super::reader::ByteReader;
use crate::error::{Result, RptError};

/// Decoded RPT file header.
///
/// The identity fields come from the tab-separated text header and are
/// advisory; the counts come from fixed offsets and are load-bearing.
#[derive(Debug, Clone, Default)]
pub struct RptHeader {
    pub domain_id: u32,
    pub species_id: u32,
    pub timestamp: String,
    pub page_count: u32,
    pub section_count: u32,
    pub binary_object_count: u32,
}

impl RptHeader {
    /// Parse the header region of an RPT file.
    pub fn parse(reader: &ByteReader) -> Result<Self> {
        if reader.len() < FILE_MAGIC.len() || !reader.as_slice().starts_with(FILE_MAGIC) {
            return Err(RptError::InvalidRpt("missing RPTFILEHDR magic".into()));
        }

        let mut header = Self::default();
        Self::parse_text_fields(reader.as_slice(), &mut header);

        header.page_count = reader.u32_at(PAGE_COUNT_OFFSET).map_err(|_| {
            RptError::InvalidRpt("file too small to hold the page count".into())
        })?;
        header.section_count = reader.u32_at(SECTION_COUNT_OFFSET).map_err(|_| {
            RptError::InvalidRpt("file too small to hold the section count".into())
        })?;
        // The binary-object count field only exists in full-size headers.
        header.binary_object_count = if reader.len() >= FIXED_HEADER_SIZE {
            reader.u32_at(BINARY_COUNT_OFFSET)?
        } else {
            0
        };

        Ok(header)
    }

    /// Extract the advisory identity fields from the text header.
    ///
    /// The text header is tab-separated and terminated by 0x1A or 0x00
    /// within the first [`TEXT_HEADER_LIMIT`] bytes. Field 2 carries
    /// `domain_id:species_id`, field 3 an ISO-like timestamp. Malformed
    /// fields are left at their defaults.
    fn parse_text_fields(data: &[u8], header: &mut RptHeader) {
        let window = &data[..data.len().min(TEXT_HEADER_LIMIT)];
        let end = window
            .iter()
            .position(|&b| b == 0x1A || b == 0x00)
            .unwrap_or(window.len());
        let Ok(text) = std::str::from_utf8(&window[..end]) else {
            return;
        };

        let fields: Vec<&str> = text.split('\t').collect();
        if let Some(ids) = fields.get(2)
            && let Some((domain, species)) = ids.split_once(':')
        {
            header.domain_id = domain.trim().parse().unwrap_or(0);
            header.species_id = species.trim().parse().unwrap_or(0);
        }
        if let Some(ts) = fields.get(3) {
            header.timestamp = ts.trim().to_string();
        }
    }
}

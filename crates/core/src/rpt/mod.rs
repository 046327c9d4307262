//! Papyrus RPT spool-file container.
//!
//! - `layout`: on-disk offsets and markers (the format documentation)
//! - `reader`: bounds-checked little-endian byte access
//! - `header`: fixed-layout header decode
//! - `tables`: page / section / binary-object record tables

pub mod header;
pub mod layout;
pub mod reader;
pub mod tables;

pub use header::RptHeader;
pub use reader::ByteReader;
pub use tables::{PageDescriptor, Section};

use crate::codec;
use crate::error::{Result, RptError};
use bytes::Bytes;
use tracing::debug;

/// A parsed RPT file: header, record tables and the raw byte buffer.
///
/// Descriptors are views into the buffer; decompressed page data is
/// allocated on demand and dropped by the caller.
#[derive(Debug)]
pub struct RptFile {
    reader: ByteReader,
    pub header: RptHeader,
    pub sections: Vec<Section>,
    pub pages: Vec<PageDescriptor>,
    pub binary_objects: Vec<PageDescriptor>,
}

impl RptFile {
    /// Parse an RPT file from its raw bytes.
    pub fn parse(data: Bytes) -> Result<Self> {
        let reader = ByteReader::new(data);
        let header = RptHeader::parse(&reader)?;
        debug!(
            pages = header.page_count,
            sections = header.section_count,
            binary_objects = header.binary_object_count,
            "parsed RPT header"
        );

        let sections = tables::decode_sections(&reader, header.section_count)?;
        Self::check_section_invariants(&header, &sections)?;
        let pages = tables::decode_pages(&reader, header.page_count, &sections)?;
        let binary_objects = tables::decode_binary_objects(&reader, header.binary_object_count)?;

        Ok(Self {
            reader,
            header,
            sections,
            pages,
            binary_objects,
        })
    }

    /// Start pages must be strictly increasing, sections contiguous, and
    /// their page counts must sum to the header's page count.
    fn check_section_invariants(header: &RptHeader, sections: &[Section]) -> Result<()> {
        let mut expected_start = 1u32;
        for section in sections {
            if section.start_page != expected_start {
                return Err(RptError::InvalidRpt(format!(
                    "section {} starts at page {}, expected {}",
                    section.section_id, section.start_page, expected_start
                )));
            }
            expected_start += section.page_count;
        }
        let total: u32 = sections.iter().map(|s| s.page_count).sum();
        if !sections.is_empty() && total != header.page_count {
            return Err(RptError::InvalidRpt(format!(
                "section page counts sum to {total}, header declares {}",
                header.page_count
            )));
        }
        Ok(())
    }

    pub fn page_count(&self) -> u32 {
        self.header.page_count
    }

    /// Decompress one text page (0-based index).
    pub fn page_data(&self, index: usize) -> Result<Vec<u8>> {
        let desc = self
            .pages
            .get(index)
            .ok_or_else(|| RptError::InvalidRpt(format!("page index {index} out of range")))?;
        self.decompress(desc)
    }

    /// Decompress any descriptor against this file's buffer.
    pub fn decompress(&self, desc: &PageDescriptor) -> Result<Vec<u8>> {
        let compressed = self
            .reader
            .slice(desc.absolute_offset(), desc.compressed_size as usize)?;
        codec::inflate_exact(compressed, desc.uncompressed_size as usize)
    }

    /// Concatenate the selected pages' text with form-feed separators.
    ///
    /// `pages` holds 1-based indices, already validated by the selection
    /// evaluator.
    pub fn render_text(&self, pages: &[u32]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for (i, &page) in pages.iter().enumerate() {
            if i > 0 {
                out.push(0x0C);
            }
            out.extend_from_slice(&self.page_data(page as usize - 1)?);
        }
        Ok(out)
    }
}

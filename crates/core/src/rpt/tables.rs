//! RPT record-table decoding: pages, sections, binary objects.

use super::layout::{
    BINARY_TABLE_MARKER, BINARY_TABLE_SKIP, FIXED_HEADER_SIZE, PAGE_RECORD_SIZE, RPTINSTHDR_OFFSET,
    SECTION_RECORD_SIZE, SECTION_TABLE_MARKER,
};
use super::reader::ByteReader;
use crate::error::{Result, RptError};
use byteorder::{ByteOrder, LittleEndian};

/// Location of one compressed page (or binary object) within the file.
///
/// `page_offset` is relative to [`RPTINSTHDR_OFFSET`]; [`Self::absolute_offset`]
/// yields the file position of the compressed bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageDescriptor {
    pub page_offset: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    /// Index into the section table, for text pages.
    pub section_index: usize,
}

impl PageDescriptor {
    pub const fn absolute_offset(&self) -> usize {
        self.page_offset as usize + RPTINSTHDR_OFFSET
    }
}

/// One contiguous run of pages, identified by a numeric section id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section {
    pub section_id: u32,
    /// 1-based first page of the section.
    pub start_page: u32,
    pub page_count: u32,
}

impl Section {
    /// Whether the 1-based page number falls inside this section.
    pub const fn contains(&self, page: u32) -> bool {
        page >= self.start_page && page < self.start_page + self.page_count
    }
}

fn read_record(reader: &ByteReader, offset: usize) -> Result<(u32, u32, u32)> {
    let rec = reader.slice(offset, PAGE_RECORD_SIZE)?;
    let page_offset = LittleEndian::read_u32(&rec[0..4]);
    // rec[4..8] is reserved
    let uncompressed = LittleEndian::read_u32(&rec[8..12]);
    let compressed = LittleEndian::read_u32(&rec[12..16]);
    Ok((page_offset, uncompressed, compressed))
}

fn check_bounds(reader: &ByteReader, desc: &PageDescriptor, what: &str, index: usize) -> Result<()> {
    let end = desc.absolute_offset() as u64 + u64::from(desc.compressed_size);
    if end > reader.len() as u64 {
        return Err(RptError::InvalidRpt(format!(
            "{what} {index} points past end of file ({end} > {})",
            reader.len()
        )));
    }
    Ok(())
}

/// Decode the section table located by its `SECTIONHDR` marker.
///
/// Start pages are converted from the container's 0-based form to the
/// 1-based numbering used everywhere else.
pub fn decode_sections(reader: &ByteReader, count: u32) -> Result<Vec<Section>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    let marker = reader
        .find_marker(SECTION_TABLE_MARKER)
        .ok_or_else(|| RptError::InvalidRpt("section table marker not found".into()))?;
    let base = marker + SECTION_TABLE_MARKER.len();

    let mut sections = Vec::with_capacity(count as usize);
    for i in 0..count as usize {
        let rec = reader.slice(base + i * SECTION_RECORD_SIZE, SECTION_RECORD_SIZE)?;
        let section_id = LittleEndian::read_u32(&rec[0..4]);
        let start_page = LittleEndian::read_u32(&rec[4..8]) + 1;
        let page_count = LittleEndian::read_u32(&rec[8..12]);
        // rec[12..36] is metadata we do not interpret
        sections.push(Section {
            section_id,
            start_page,
            page_count,
        });
    }
    Ok(sections)
}

/// Decode the page table and attach each page to its section.
pub fn decode_pages(
    reader: &ByteReader,
    count: u32,
    sections: &[Section],
) -> Result<Vec<PageDescriptor>> {
    let mut pages = Vec::with_capacity(count as usize);
    for i in 0..count as usize {
        let offset = FIXED_HEADER_SIZE + i * PAGE_RECORD_SIZE;
        let (page_offset, uncompressed, compressed) =
            read_record(reader, offset).map_err(|_| {
                RptError::InvalidRpt(format!("page table truncated at record {i}"))
            })?;

        let page_number = i as u32 + 1;
        let section_index = sections
            .iter()
            .position(|s| s.contains(page_number))
            .ok_or_else(|| {
                RptError::InvalidRpt(format!("page {page_number} belongs to no section"))
            })?;

        let desc = PageDescriptor {
            page_offset,
            compressed_size: compressed,
            uncompressed_size: uncompressed,
            section_index,
        };
        check_bounds(reader, &desc, "page", i)?;
        pages.push(desc);
    }
    Ok(pages)
}

/// Decode the binary-object table located by its `BPAGETBLHDR` marker.
pub fn decode_binary_objects(reader: &ByteReader, count: u32) -> Result<Vec<PageDescriptor>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    let marker = reader
        .find_marker(BINARY_TABLE_MARKER)
        .ok_or_else(|| RptError::InvalidRpt("binary object table marker not found".into()))?;
    let base = marker + BINARY_TABLE_SKIP;

    let mut objects = Vec::with_capacity(count as usize);
    for i in 0..count as usize {
        let (page_offset, uncompressed, compressed) = read_record(reader, base + i * PAGE_RECORD_SIZE)
            .map_err(|_| RptError::InvalidRpt(format!("binary object table truncated at record {i}")))?;
        let desc = PageDescriptor {
            page_offset,
            compressed_size: compressed,
            uncompressed_size: uncompressed,
            section_index: 0,
        };
        check_bounds(reader, &desc, "binary object", i)?;
        objects.push(desc);
    }
    Ok(objects)
}

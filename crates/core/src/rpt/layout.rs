//! On-disk layout of the Papyrus RPT spool container.
//!
//! An RPT file is a fixed header followed by record tables and compressed
//! data. All integers are little-endian u32 unless noted.
//!
//! ```text
//! 0x000  "RPTFILEHDR" magic, then a tab-separated text header
//!        terminated by 0x1A or 0x00 (domain:species id, timestamp)
//! 0x1D4  page count
//! 0x1E4  section count
//! 0x1F4  binary object count (only present when the file is >= 0x200 bytes)
//! 0x200  page table: 16-byte records
//!        { u32 page_offset, u32 reserved, u32 uncompressed, u32 compressed }
//! ....   "SECTIONHDR" marker, then 36-byte section records
//!        { u32 section_id, u32 start_page (0-based), u32 page_count, 24B meta }
//! ....   "BPAGETBLHDR" marker; binary object records (page-table layout)
//!        begin 13 bytes past the marker
//! ```
//!
//! Data offsets in page and binary-object records are relative to
//! [`RPTINSTHDR_OFFSET`].

/// Magic string at the start of every RPT file.
pub const FILE_MAGIC: &[u8] = b"RPTFILEHDR";

/// Marker preceding the section table.
pub const SECTION_TABLE_MARKER: &[u8] = b"SECTIONHDR";

/// Marker preceding the binary-object table.
pub const BINARY_TABLE_MARKER: &[u8] = b"BPAGETBLHDR";

/// Binary-object records start this many bytes past the table marker.
pub const BINARY_TABLE_SKIP: usize = 13;

/// Base added to every record's page_offset to obtain an absolute file offset.
pub const RPTINSTHDR_OFFSET: usize = 0xF0;

/// Region of the text header; the terminator must appear within it.
pub const TEXT_HEADER_LIMIT: usize = 0xC0;

/// Fixed offsets of the header count fields.
pub const PAGE_COUNT_OFFSET: usize = 0x1D4;
pub const SECTION_COUNT_OFFSET: usize = 0x1E4;
pub const BINARY_COUNT_OFFSET: usize = 0x1F4;

/// Size of the fixed header block; record tables begin here.
pub const FIXED_HEADER_SIZE: usize = 0x200;

/// Width of one page-table or binary-object-table record.
pub const PAGE_RECORD_SIZE: usize = 16;

/// Width of one section-table record.
pub const SECTION_RECORD_SIZE: usize = 36;

/// Marker searches are confined to this prefix of the file so a data page
/// cannot produce a false match.
pub const MARKER_SEARCH_LIMIT: usize = 64 * 1024;

/// Ceiling on a single object's declared uncompressed size.
pub const MAX_OBJECT_SIZE: usize = 256 * 1024 * 1024;

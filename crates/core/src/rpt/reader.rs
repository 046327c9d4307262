//! Random-access byte reader for the RPT container.

use super::layout::MARKER_SEARCH_LIMIT;
use crate::error::{Result, RptError};
use byteorder::{ByteOrder, LittleEndian};
use bytes::Bytes;

/// Bounds-checked view over the raw RPT bytes.
///
/// All reads are positional; the reader itself carries no cursor. Records
/// and markers never straddle the end of the buffer.
#[derive(Debug, Clone)]
pub struct ByteReader {
    data: Bytes,
}

impl ByteReader {
    pub fn new(data: Bytes) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Borrow `len` bytes starting at `offset`.
    pub fn slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let end = offset
            .checked_add(len)
            .ok_or_else(|| RptError::InvalidRpt(format!("offset overflow at {offset:#x}")))?;
        if end > self.data.len() {
            return Err(RptError::InvalidRpt(format!(
                "record at {offset:#x}+{len} exceeds file size {}",
                self.data.len()
            )));
        }
        Ok(&self.data[offset..end])
    }

    /// Little-endian u32 at a fixed offset.
    pub fn u32_at(&self, offset: usize) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.slice(offset, 4)?))
    }

    /// Find `marker` within the first [`MARKER_SEARCH_LIMIT`] bytes.
    ///
    /// Returns the offset of the first match. The search window keeps data
    /// pages from aliasing a header marker.
    pub fn find_marker(&self, marker: &[u8]) -> Option<usize> {
        let window = self.data.len().min(MARKER_SEARCH_LIMIT);
        let hay = &self.data[..window];
        if hay.len() < marker.len() {
            return None;
        }
        hay.windows(marker.len()).position(|w| w == marker)
    }
}

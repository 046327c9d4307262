//! AFP structured-field streams: scanning and page slicing.
//!
//! An AFP document is a flat sequence of structured fields. Each field is
//! a 0x5A carriage-control byte, a big-endian u16 length covering the
//! length, identifier and data (but not the 0x5A itself), a 3-byte field
//! identifier, a flag byte and two reserved bytes:
//!
//! ```text
//! 0x5A | len (u16 BE) | id (3B) | flag | reserved (2B) | data (len-8)
//! ```
//!
//! Pages are delimited by BPG..EPG pairs, the document by BDT..EDT.
//! Page slicing is pure byte-range surgery: field data is never rewritten
//! because AFP page indexes are structural, not textual.

use crate::error::{Result, RptError};
use byteorder::{BigEndian, ByteOrder};
use tracing::warn;

/// Begin Page
pub const BPG: [u8; 3] = [0xD3, 0xA8, 0xAF];
/// End Page
pub const EPG: [u8; 3] = [0xD3, 0xA9, 0xAF];
/// Begin Document
pub const BDT: [u8; 3] = [0xD3, 0xA8, 0xA8];
/// End Document
pub const EDT: [u8; 3] = [0xD3, 0xA9, 0xA8];

const CARRIAGE_CONTROL: u8 = 0x5A;

/// Fields shorter than length+id+flag+reserved cannot exist.
const MIN_FIELD_LEN: usize = 8;

/// One structured field's position within the stream.
#[derive(Debug, Clone, Copy)]
pub struct StructuredField {
    /// Offset of the 0x5A byte.
    pub offset: usize,
    /// Total on-stream size including the 0x5A prefix.
    pub size: usize,
    pub id: [u8; 3],
}

impl StructuredField {
    /// Offset one past the field's last byte.
    pub const fn end(&self) -> usize {
        self.offset + self.size
    }
}

/// Byte range of one page: `[BPG offset, end of EPG field)`.
#[derive(Debug, Clone, Copy)]
struct PageSpan {
    start: usize,
    end: usize,
}

/// An indexed AFP stream ready for slicing.
#[derive(Debug)]
pub struct AfpDocument<'a> {
    data: &'a [u8],
    pages: Vec<PageSpan>,
    /// Everything before the first BPG: BDT and leading resources.
    prologue_end: usize,
    /// The EDT field onward; for streams without EDT, after the last EPG.
    epilogue_start: usize,
}

impl<'a> AfpDocument<'a> {
    /// Scan the stream, validate field framing and index page boundaries.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let fields = scan_fields(data)?;

        let mut pages = Vec::new();
        let mut open_page: Option<usize> = None;
        let mut first_bpg = None;
        let mut edt_offset = None;
        let mut last_epg_end = None;

        for field in &fields {
            match field.id {
                BPG => {
                    if open_page.is_some() {
                        return Err(RptError::InvalidRpt(format!(
                            "nested BPG at offset {}",
                            field.offset
                        )));
                    }
                    open_page = Some(field.offset);
                    first_bpg.get_or_insert(field.offset);
                }
                EPG => {
                    let start = open_page.take().ok_or_else(|| {
                        RptError::InvalidRpt(format!("EPG without BPG at offset {}", field.offset))
                    })?;
                    pages.push(PageSpan {
                        start,
                        end: field.end(),
                    });
                    last_epg_end = Some(field.end());
                }
                EDT => {
                    edt_offset.get_or_insert(field.offset);
                }
                _ => {}
            }
        }
        if open_page.is_some() {
            return Err(RptError::InvalidRpt("BPG without matching EPG".into()));
        }

        let prologue_end = first_bpg.unwrap_or(data.len());
        let epilogue_start = edt_offset
            .or(last_epg_end)
            .unwrap_or(data.len());

        Ok(Self {
            data,
            pages,
            prologue_end,
            epilogue_start,
        })
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Emit prologue + the selected pages' byte ranges + epilogue.
    ///
    /// `selection` holds 1-based indices in output order. Indices beyond
    /// the stream's own page count are skipped with a warning (the RPT's
    /// declared count is advisory).
    pub fn slice(&self, selection: &[u32]) -> Result<Vec<u8>> {
        let mut spans = Vec::with_capacity(selection.len());
        for &index in selection {
            match self.pages.get(index as usize - 1) {
                Some(span) => spans.push(*span),
                None => warn!(page = index, "selected page beyond AFP stream; skipped"),
            }
        }
        if spans.is_empty() {
            return Err(RptError::NoPagesSelected);
        }

        let mut out = Vec::new();
        out.extend_from_slice(&self.data[..self.prologue_end]);
        for span in spans {
            out.extend_from_slice(&self.data[span.start..span.end]);
        }
        out.extend_from_slice(&self.data[self.epilogue_start..]);
        Ok(out)
    }
}

/// Walk the stream field by field, validating the framing.
fn scan_fields(data: &[u8]) -> Result<Vec<StructuredField>> {
    let mut fields = Vec::new();
    let mut pos = 0usize;
    while pos < data.len() {
        if data[pos] != CARRIAGE_CONTROL {
            return Err(RptError::InvalidRpt(format!(
                "expected 0x5A at offset {pos}, found {:#04x}",
                data[pos]
            )));
        }
        if pos + 3 > data.len() {
            return Err(RptError::InvalidRpt("truncated AFP field header".into()));
        }
        let length = BigEndian::read_u16(&data[pos + 1..pos + 3]) as usize;
        if length < MIN_FIELD_LEN {
            return Err(RptError::InvalidRpt(format!(
                "AFP field at offset {pos} declares impossible length {length}"
            )));
        }
        let size = 1 + length;
        if pos + size > data.len() {
            return Err(RptError::InvalidRpt(format!(
                "AFP field at offset {pos} runs past end of stream"
            )));
        }
        let id = [data[pos + 3], data[pos + 4], data[pos + 5]];
        fields.push(StructuredField {
            offset: pos,
            size,
            id,
        });
        pos += size;
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(id: [u8; 3], data: &[u8]) -> Vec<u8> {
        let length = (8 + data.len()) as u16;
        let mut out = vec![CARRIAGE_CONTROL];
        out.extend_from_slice(&length.to_be_bytes());
        out.extend_from_slice(&id);
        out.extend_from_slice(&[0, 0, 0]);
        out.extend_from_slice(data);
        out
    }

    #[test]
    fn scan_counts_pages() {
        let mut stream = field(BDT, b"doc");
        for _ in 0..3 {
            stream.extend(field(BPG, b""));
            stream.extend(field([0xD3, 0xEE, 0xEE], b"text"));
            stream.extend(field(EPG, b""));
        }
        stream.extend(field(EDT, b""));

        let doc = AfpDocument::parse(&stream).unwrap();
        assert_eq!(doc.page_count(), 3);
    }

    #[test]
    fn unpaired_epg_rejected() {
        let mut stream = field(BDT, b"");
        stream.extend(field(EPG, b""));
        assert!(AfpDocument::parse(&stream).is_err());
    }

    #[test]
    fn garbage_framing_rejected() {
        assert!(AfpDocument::parse(b"not an afp stream").is_err());
    }
}

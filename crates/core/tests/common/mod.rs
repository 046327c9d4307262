//! Shared fixture builders for the integration tests: synthetic RPT
//! containers, AFP streams and small PDF documents.

#![allow(dead_code)]

use rptx_core::codec;

pub const RPTINSTHDR_OFFSET: usize = 0xF0;
const FIXED_HEADER_SIZE: usize = 0x200;
const PAGE_COUNT_OFFSET: usize = 0x1D4;
const SECTION_COUNT_OFFSET: usize = 0x1E4;
const BINARY_COUNT_OFFSET: usize = 0x1F4;

/// Builder for synthetic RPT files matching the production layout.
pub struct RptFixture {
    pages: Vec<Vec<u8>>,
    /// (section_id, page_count) in order.
    sections: Vec<(u32, u32)>,
    binary: Option<(Vec<u8>, usize)>,
    species: (u32, u32),
}

impl Default for RptFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl RptFixture {
    pub fn new() -> Self {
        Self {
            pages: Vec::new(),
            sections: Vec::new(),
            binary: None,
            species: (100, 14259),
        }
    }

    pub fn page(mut self, text: &[u8]) -> Self {
        self.pages.push(text.to_vec());
        self
    }

    pub fn section(mut self, id: u32, page_count: u32) -> Self {
        self.sections.push((id, page_count));
        self
    }

    /// Embed `payload` split into `chunks` binary objects.
    pub fn binary(mut self, payload: &[u8], chunks: usize) -> Self {
        self.binary = Some((payload.to_vec(), chunks.max(1)));
        self
    }

    pub fn species(mut self, domain: u32, species: u32) -> Self {
        self.species = (domain, species);
        self
    }

    pub fn build(mut self) -> Vec<u8> {
        // Every page must belong to a section.
        if self.sections.is_empty() && !self.pages.is_empty() {
            self.sections.push((1, self.pages.len() as u32));
        }

        let compressed_pages: Vec<Vec<u8>> =
            self.pages.iter().map(|p| codec::deflate(p)).collect();
        let binary_chunks: Vec<(Vec<u8>, usize)> = match &self.binary {
            None => Vec::new(),
            Some((payload, chunks)) => split_chunks(payload, *chunks)
                .into_iter()
                .map(|chunk| {
                    let raw_len = chunk.len();
                    (codec::deflate(&chunk), raw_len)
                })
                .collect(),
        };

        let mut out = Vec::new();
        let header_text = format!(
            "RPTFILEHDR\t1\t{}:{}\t2024-05-01T12:00:00\x1a",
            self.species.0, self.species.1
        );
        out.extend_from_slice(header_text.as_bytes());
        out.resize(PAGE_COUNT_OFFSET, 0);
        out.extend_from_slice(&(self.pages.len() as u32).to_le_bytes());
        out.resize(SECTION_COUNT_OFFSET, 0);
        out.extend_from_slice(&(self.sections.len() as u32).to_le_bytes());
        out.resize(BINARY_COUNT_OFFSET, 0);
        out.extend_from_slice(&(binary_chunks.len() as u32).to_le_bytes());
        out.resize(FIXED_HEADER_SIZE, 0);

        // Sizes of the record tables, so data offsets are known up front.
        let page_table_len = compressed_pages.len() * 16;
        let section_table_len = if self.sections.is_empty() {
            0
        } else {
            b"SECTIONHDR".len() + self.sections.len() * 36
        };
        let binary_table_len = if binary_chunks.is_empty() {
            0
        } else {
            13 + binary_chunks.len() * 16
        };
        let mut data_cursor =
            FIXED_HEADER_SIZE + page_table_len + section_table_len + binary_table_len;

        // Page table.
        let mut data_region = Vec::new();
        for (compressed, raw) in compressed_pages.iter().zip(&self.pages) {
            push_record(&mut out, data_cursor, raw.len(), compressed.len());
            data_region.extend_from_slice(compressed);
            data_cursor += compressed.len();
        }

        // Section table.
        if !self.sections.is_empty() {
            out.extend_from_slice(b"SECTIONHDR");
            let mut start0 = 0u32;
            for (id, count) in &self.sections {
                out.extend_from_slice(&id.to_le_bytes());
                out.extend_from_slice(&start0.to_le_bytes());
                out.extend_from_slice(&count.to_le_bytes());
                out.extend_from_slice(&[0u8; 24]);
                start0 += count;
            }
        }

        // Binary-object table: records begin 13 bytes past the marker.
        if !binary_chunks.is_empty() {
            out.extend_from_slice(b"BPAGETBLHDR");
            out.extend_from_slice(&[0u8; 2]);
            for (compressed, raw_len) in &binary_chunks {
                push_record(&mut out, data_cursor, *raw_len, compressed.len());
                data_region.extend_from_slice(compressed);
                data_cursor += compressed.len();
            }
        }

        out.extend_from_slice(&data_region);
        out
    }
}

fn push_record(out: &mut Vec<u8>, abs_offset: usize, uncompressed: usize, compressed: usize) {
    let rel = (abs_offset - RPTINSTHDR_OFFSET) as u32;
    out.extend_from_slice(&rel.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&(uncompressed as u32).to_le_bytes());
    out.extend_from_slice(&(compressed as u32).to_le_bytes());
}

fn split_chunks(payload: &[u8], chunks: usize) -> Vec<Vec<u8>> {
    if payload.is_empty() {
        return vec![Vec::new()];
    }
    let size = payload.len().div_ceil(chunks);
    payload.chunks(size).map(<[u8]>::to_vec).collect()
}

// === AFP fixtures ===

pub const BPG: [u8; 3] = [0xD3, 0xA8, 0xAF];
pub const EPG: [u8; 3] = [0xD3, 0xA9, 0xAF];
pub const BDT: [u8; 3] = [0xD3, 0xA8, 0xA8];
pub const EDT: [u8; 3] = [0xD3, 0xA9, 0xA8];
/// An arbitrary presentation-text field id for page bodies.
pub const PTX: [u8; 3] = [0xD3, 0xEE, 0x9B];

pub fn afp_field(id: [u8; 3], data: &[u8]) -> Vec<u8> {
    let length = (8 + data.len()) as u16;
    let mut out = vec![0x5A];
    out.extend_from_slice(&length.to_be_bytes());
    out.extend_from_slice(&id);
    out.extend_from_slice(&[0, 0, 0]);
    out.extend_from_slice(data);
    out
}

/// A document with `pages` BPG..EPG pairs wrapped in BDT..EDT.
pub fn afp_document(pages: usize) -> Vec<u8> {
    let mut out = afp_field(BDT, b"REPORT");
    for i in 0..pages {
        out.extend(afp_field(BPG, &[i as u8]));
        out.extend(afp_field(PTX, format!("page {}", i + 1).as_bytes()));
        out.extend(afp_field(EPG, &[i as u8]));
    }
    out.extend(afp_field(EDT, b""));
    out
}

pub fn count_fields(data: &[u8], id: [u8; 3]) -> usize {
    let mut count = 0;
    let mut pos = 0;
    while pos + 6 <= data.len() {
        assert_eq!(data[pos], 0x5A, "broken framing at {pos}");
        let length = u16::from_be_bytes([data[pos + 1], data[pos + 2]]) as usize;
        if data[pos + 3..pos + 6] == id {
            count += 1;
        }
        pos += 1 + length;
    }
    count
}

// === PDF fixtures ===

use rptx_core::pdf::{Dict, ObjRef, PdfBuilder, PdfObject, PdfStream};
use std::path::Path;

/// A flat `pages`-page PDF produced by the crate's own writer.
pub fn sample_pdf(pages: usize) -> Vec<u8> {
    let mut builder = PdfBuilder::new();
    let pages_id = builder.reserve();

    let mut font = Dict::new();
    font.insert("Type".into(), PdfObject::Name("Font".into()));
    font.insert("Subtype".into(), PdfObject::Name("Type1".into()));
    font.insert("BaseFont".into(), PdfObject::Name("Helvetica".into()));
    let font_id = builder.add(PdfObject::Dict(font));

    let mut kids = Vec::new();
    for i in 0..pages {
        let content = format!("BT /F1 24 Tf 72 700 Td (Page {}) Tj ET", i + 1);
        let content_id = builder.add(PdfObject::Stream(Box::new(PdfStream::new(
            Dict::new(),
            content.into_bytes(),
        ))));

        let mut fonts = Dict::new();
        fonts.insert("F1".into(), PdfObject::Ref(ObjRef::new(font_id, 0)));
        let mut resources = Dict::new();
        resources.insert("Font".into(), PdfObject::Dict(fonts));

        let mut page = Dict::new();
        page.insert("Type".into(), PdfObject::Name("Page".into()));
        page.insert("Parent".into(), PdfObject::Ref(ObjRef::new(pages_id, 0)));
        page.insert(
            "MediaBox".into(),
            PdfObject::Array(vec![
                PdfObject::Int(0),
                PdfObject::Int(0),
                PdfObject::Int(612),
                PdfObject::Int(792),
            ]),
        );
        page.insert("Resources".into(), PdfObject::Dict(resources));
        page.insert("Contents".into(), PdfObject::Ref(ObjRef::new(content_id, 0)));
        let page_id = builder.add(PdfObject::Dict(page));
        builder.page_ids.push(page_id);
        kids.push(PdfObject::Ref(ObjRef::new(page_id, 0)));
    }

    let mut pages_dict = Dict::new();
    pages_dict.insert("Type".into(), PdfObject::Name("Pages".into()));
    pages_dict.insert("Count".into(), PdfObject::Int(pages as i64));
    pages_dict.insert("Kids".into(), PdfObject::Array(kids));
    builder.set(pages_id, PdfObject::Dict(pages_dict));

    let mut catalog = Dict::new();
    catalog.insert("Type".into(), PdfObject::Name("Catalog".into()));
    catalog.insert("Pages".into(), PdfObject::Ref(ObjRef::new(pages_id, 0)));
    builder.catalog_id = builder.add(PdfObject::Dict(catalog));

    let mut out = Vec::new();
    builder
        .write_to(&mut out, Path::new("fixture.pdf"))
        .expect("serialize fixture");
    out
}

/// Hand-rolled PDF emitter for structures the crate's writer never
/// produces (inheritance, encryption), with a correct xref.
pub struct RawPdf {
    buf: Vec<u8>,
    offsets: Vec<(u32, usize)>,
    trailer_extra: String,
}

impl Default for RawPdf {
    fn default() -> Self {
        Self::new()
    }
}

impl RawPdf {
    pub fn new() -> Self {
        Self {
            buf: b"%PDF-1.4\n".to_vec(),
            offsets: Vec::new(),
            trailer_extra: String::new(),
        }
    }

    pub fn object(&mut self, id: u32, body: &str) -> &mut Self {
        self.offsets.push((id, self.buf.len()));
        self.buf
            .extend_from_slice(format!("{id} 0 obj\n{body}\nendobj\n").as_bytes());
        self
    }

    pub fn trailer_entry(&mut self, entry: &str) -> &mut Self {
        self.trailer_extra.push_str(entry);
        self
    }

    pub fn finish(&mut self, root_id: u32) -> Vec<u8> {
        let xref_pos = self.buf.len();
        self.offsets.sort_unstable_by_key(|&(id, _)| id);
        let size = self.offsets.last().map_or(1, |&(id, _)| id + 1);
        let mut xref = format!("xref\n0 {size}\n0000000000 65535 f \n");
        let mut expected = 1;
        for &(id, offset) in &self.offsets {
            while expected < id {
                xref.push_str("0000000000 65535 f \n");
                expected += 1;
            }
            xref.push_str(&format!("{offset:010} 00000 n \n"));
            expected = id + 1;
        }
        self.buf.extend_from_slice(xref.as_bytes());
        self.buf.extend_from_slice(
            format!(
                "trailer\n<< /Size {size} /Root {root_id} 0 R {}>>\nstartxref\n{xref_pos}\n%%EOF\n",
                self.trailer_extra
            )
            .as_bytes(),
        );
        std::mem::take(&mut self.buf)
    }
}

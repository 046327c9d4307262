//! Structured PDF serializer.
//!
//! Objects are registered in a builder and written out with a byte-counting
//! writer; the cross-reference table and trailer are computed from the
//! recorded offsets, so no emitted offset can drift from the bytes.

use super::object::{Dict, ObjRef, PdfObject, PdfStream};
use crate::error::{Result, RptError};
use indexmap::IndexMap;
use std::io::{self, Write};
use std::path::Path;

/// Byte-counting writer wrapper.
struct Counter<W> {
    inner: W,
    count: u64,
}

impl<W: Write> Counter<W> {
    fn new(inner: W) -> Self {
        Self { inner, count: 0 }
    }

    const fn pos(&self) -> u64 {
        self.count
    }
}

impl<W: Write> Write for Counter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// An in-memory PDF under construction: the slicer fills it, the watermark
/// stage may amend it, then it is serialized once.
pub struct PdfBuilder {
    objects: IndexMap<u32, PdfObject>,
    next_id: u32,
    pub catalog_id: u32,
    pub info_id: Option<u32>,
    /// Object ids of the emitted pages, in output order.
    pub page_ids: Vec<u32>,
}

impl Default for PdfBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfBuilder {
    pub fn new() -> Self {
        Self {
            objects: IndexMap::new(),
            next_id: 1,
            catalog_id: 0,
            info_id: None,
            page_ids: Vec::new(),
        }
    }

    /// Reserve an object id without content (filled in later).
    pub fn reserve(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.objects.insert(id, PdfObject::Null);
        id
    }

    /// Register an object under a fresh id.
    pub fn add(&mut self, object: PdfObject) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.objects.insert(id, object);
        id
    }

    /// Replace the object stored under `id`.
    pub fn set(&mut self, id: u32, object: PdfObject) {
        self.objects.insert(id, object);
    }

    pub fn get(&self, id: u32) -> Option<&PdfObject> {
        self.objects.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut PdfObject> {
        self.objects.get_mut(&id)
    }

    /// Serialize the document to a writer.
    pub fn write_to<W: Write>(&self, writer: W, path: &Path) -> Result<()> {
        let map_err = |source: io::Error| RptError::Write {
            path: path.to_path_buf(),
            source,
        };
        self.emit(writer).map_err(map_err)
    }

    fn emit<W: Write>(&self, writer: W) -> io::Result<()> {
        let mut out = Counter::new(writer);
        out.write_all(b"%PDF-1.4\n")?;
        // Binary-detection comment, as the spec recommends for files
        // carrying compressed streams.
        out.write_all(b"%\xE2\xE3\xCF\xD3\n")?;

        let mut offsets: Vec<(u32, u64)> = Vec::with_capacity(self.objects.len());
        for (&id, object) in &self.objects {
            offsets.push((id, out.pos()));
            write!(out, "{id} 0 obj\n")?;
            write_object(&mut out, object)?;
            out.write_all(b"\nendobj\n")?;
        }

        let xref_pos = out.pos();
        offsets.sort_unstable_by_key(|&(id, _)| id);
        let size = offsets.last().map_or(1, |&(id, _)| id + 1);
        write!(out, "xref\n0 {size}\n")?;
        write!(out, "0000000000 65535 f \n")?;
        let mut next_expected = 1u32;
        for &(id, offset) in &offsets {
            // Holes in the id space are emitted as free entries so the
            // table stays a single section.
            while next_expected < id {
                write!(out, "0000000000 65535 f \n")?;
                next_expected += 1;
            }
            write!(out, "{offset:010} 00000 n \n")?;
            next_expected = id + 1;
        }

        write!(out, "trailer\n")?;
        let mut trailer = Dict::new();
        trailer.insert("Size".into(), PdfObject::Int(i64::from(size)));
        trailer.insert("Root".into(), PdfObject::Ref(ObjRef::new(self.catalog_id, 0)));
        if let Some(info_id) = self.info_id {
            trailer.insert("Info".into(), PdfObject::Ref(ObjRef::new(info_id, 0)));
        }
        write_object(&mut out, &PdfObject::Dict(trailer))?;
        write!(out, "\nstartxref\n{xref_pos}\n%%EOF\n")?;
        out.flush()
    }
}

/// Serialize one object body.
///
/// Dictionary keys are written in sorted order so repeated runs produce
/// identical bytes for identical logical content.
pub fn write_object<W: Write>(out: &mut W, object: &PdfObject) -> io::Result<()> {
    match object {
        PdfObject::Null => out.write_all(b"null"),
        PdfObject::Bool(true) => out.write_all(b"true"),
        PdfObject::Bool(false) => out.write_all(b"false"),
        PdfObject::Int(n) => write!(out, "{n}"),
        PdfObject::Real(x) => write_real(out, *x),
        PdfObject::Name(name) => write_name(out, name),
        PdfObject::String(bytes) => write_string(out, bytes),
        PdfObject::Array(items) => {
            out.write_all(b"[")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.write_all(b" ")?;
                }
                write_object(out, item)?;
            }
            out.write_all(b"]")
        }
        PdfObject::Dict(dict) => write_dict(out, dict),
        PdfObject::Stream(stream) => write_stream(out, stream),
        PdfObject::Ref(r) => write!(out, "{} {} R", r.objid, r.genno),
    }
}

fn write_dict<W: Write>(out: &mut W, dict: &Dict) -> io::Result<()> {
    let mut keys: Vec<&String> = dict.keys().collect();
    keys.sort_unstable();
    out.write_all(b"<<")?;
    for key in keys {
        out.write_all(b" ")?;
        write_name(out, key)?;
        out.write_all(b" ")?;
        write_object(out, &dict[key])?;
    }
    out.write_all(b" >>")
}

fn write_stream<W: Write>(out: &mut W, stream: &PdfStream) -> io::Result<()> {
    // /Length always reflects the actual payload.
    let mut attrs = stream.attrs.clone();
    attrs.insert("Length".into(), PdfObject::Int(stream.rawdata.len() as i64));
    write_dict(out, &attrs)?;
    out.write_all(b"\nstream\n")?;
    out.write_all(&stream.rawdata)?;
    out.write_all(b"\nendstream")
}

fn write_name<W: Write>(out: &mut W, name: &str) -> io::Result<()> {
    out.write_all(b"/")?;
    for &b in name.as_bytes() {
        let printable = (0x21..=0x7E).contains(&b)
            && !matches!(b, b'#' | b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%');
        if printable {
            out.write_all(&[b])?;
        } else {
            write!(out, "#{b:02X}")?;
        }
    }
    Ok(())
}

fn write_string<W: Write>(out: &mut W, bytes: &[u8]) -> io::Result<()> {
    out.write_all(b"(")?;
    for &b in bytes {
        match b {
            b'(' | b')' | b'\\' => {
                out.write_all(&[b'\\', b])?;
            }
            0x20..=0x7E => out.write_all(&[b])?,
            b'\n' => out.write_all(b"\\n")?,
            b'\r' => out.write_all(b"\\r")?,
            _ => write!(out, "\\{b:03o}")?,
        }
    }
    out.write_all(b")")
}

fn write_real<W: Write>(out: &mut W, x: f64) -> io::Result<()> {
    if x == x.trunc() && x.abs() < 1e15 {
        write!(out, "{}", x as i64)
    } else {
        // Six decimals is beyond device resolution; trim trailing zeros.
        let mut s = format!("{x:.6}");
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
        out.write_all(s.as_bytes())
    }
}

//! PDF document access: xref loading, object resolution, page tree.
//!
//! Handles:
//! - traditional xref tables and xref streams (with the PNG predictor)
//! - object streams (compressed objects)
//! - object-scan fallback for files with a damaged xref
//! - page-tree flattening with attribute inheritance
//!
//! Encrypted documents are rejected up front; the slicer cannot re-emit
//! content it cannot read.

use super::object::{Dict, ObjRef, PdfObject};
use super::parser::ObjectParser;
use crate::error::{Result, RptError};
use bytes::Bytes;
use rustc_hash::{FxHashMap, FxHashSet};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, warn};

/// Location of one object in the file.
#[derive(Debug, Clone, Copy)]
enum XrefEntry {
    /// Byte offset of `N G obj`.
    Offset(usize),
    /// Held by an object stream: (stream object id, index within it).
    InStream(u32, usize),
}

/// Attributes a Pages node passes down to its kids.
const INHERITABLE: [&str; 4] = ["Resources", "MediaBox", "CropBox", "Rotate"];

/// One leaf of the flattened page tree.
#[derive(Debug, Clone)]
pub struct PageNode {
    pub objref: ObjRef,
    /// Page dictionary with inherited attributes folded in.
    pub attrs: Dict,
}

/// Read-only view of a parsed PDF file.
#[derive(Debug)]
pub struct PdfDocument {
    data: Bytes,
    xref: FxHashMap<u32, XrefEntry>,
    trailer: Dict,
    cache: RefCell<FxHashMap<u32, Rc<PdfObject>>>,
}

impl PdfDocument {
    pub fn parse(data: Bytes) -> Result<Self> {
        let mut doc = Self {
            data,
            xref: FxHashMap::default(),
            trailer: Dict::new(),
            cache: RefCell::new(FxHashMap::default()),
        };

        let loaded = match doc.find_startxref() {
            Ok(pos) => doc.load_xref_chain(pos).is_ok() && !doc.xref.is_empty(),
            Err(_) => false,
        };
        if !loaded {
            warn!("no usable xref; falling back to object scan");
            doc.scan_objects()?;
        }

        if doc.trailer.contains_key("Encrypt") {
            return Err(RptError::InvalidRpt(
                "embedded PDF is encrypted; cannot slice".into(),
            ));
        }
        Ok(doc)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn trailer(&self) -> &Dict {
        &self.trailer
    }

    /// Resolved /Info dictionary, if the document has one.
    pub fn info(&self) -> Option<Dict> {
        let info = self.trailer.get("Info")?;
        self.resolve(info).ok()?.as_dict().ok().cloned()
    }

    /// Resolved document catalog.
    pub fn catalog(&self) -> Result<Dict> {
        let root = self
            .trailer
            .get("Root")
            .ok_or_else(|| RptError::InvalidRpt("PDF trailer has no /Root".into()))?;
        Ok(self.resolve(root)?.as_dict()?.clone())
    }

    /// Find the startxref pointer near the end of the file.
    fn find_startxref(&self) -> Result<usize> {
        let needle = b"startxref";
        let tail_start = self.data.len().saturating_sub(1024);
        let tail = &self.data[tail_start..];
        let found = tail
            .windows(needle.len())
            .rposition(|w| w == needle)
            .ok_or_else(|| RptError::InvalidRpt("startxref not found".into()))?;

        let rest = &tail[found + needle.len()..];
        let digits: Vec<u8> = rest
            .iter()
            .copied()
            .skip_while(|b| b.is_ascii_whitespace())
            .take_while(u8::is_ascii_digit)
            .collect();
        std::str::from_utf8(&digits)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| RptError::InvalidRpt("bad startxref offset".into()))
    }

    /// Follow the xref chain (/Prev, /XRefStm) from the newest table.
    ///
    /// Newest entries win, so insertion only fills vacant slots as the walk
    /// moves toward older revisions.
    fn load_xref_chain(&mut self, start: usize) -> Result<()> {
        let mut visited = FxHashSet::default();
        let mut pos = Some(start);

        while let Some(p) = pos {
            if !visited.insert(p) {
                break;
            }
            let trailer = if self.data[p.min(self.data.len())..].starts_with(b"xref") {
                self.load_xref_table(p)?
            } else {
                self.load_xref_stream(p)?
            };

            if let Some(stm) = trailer.get("XRefStm").and_then(|o| o.as_int().ok())
                && visited.insert(stm as usize)
            {
                let _ = self.load_xref_stream(stm as usize)?;
            }

            pos = trailer
                .get("Prev")
                .and_then(|o| o.as_int().ok())
                .map(|n| n as usize);

            for (key, value) in trailer {
                self.trailer.entry(key).or_insert(value);
            }
        }
        Ok(())
    }

    /// Parse a traditional `xref` section and its trailer dictionary.
    fn load_xref_table(&mut self, pos: usize) -> Result<Dict> {
        let data = &self.data;
        let mut cursor = pos + 4;

        let read_uint = |cursor: &mut usize| -> Result<u64> {
            while *cursor < data.len() && data[*cursor].is_ascii_whitespace() {
                *cursor += 1;
            }
            let start = *cursor;
            while *cursor < data.len() && data[*cursor].is_ascii_digit() {
                *cursor += 1;
            }
            if start == *cursor {
                return Err(RptError::InvalidRpt(format!(
                    "xref: expected number at {start}"
                )));
            }
            std::str::from_utf8(&data[start..*cursor])
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| RptError::InvalidRpt("xref: bad number".into()))
        };

        loop {
            while cursor < data.len() && data[cursor].is_ascii_whitespace() {
                cursor += 1;
            }
            if data[cursor..].starts_with(b"trailer") {
                cursor += b"trailer".len();
                break;
            }
            if cursor >= data.len() {
                return Err(RptError::InvalidRpt("xref without trailer".into()));
            }

            let start_id = read_uint(&mut cursor)?;
            let count = read_uint(&mut cursor)?;
            for i in 0..count {
                let offset = read_uint(&mut cursor)?;
                let _genno = read_uint(&mut cursor)?;
                while cursor < data.len() && data[cursor] == b' ' {
                    cursor += 1;
                }
                let kind = *data
                    .get(cursor)
                    .ok_or_else(|| RptError::InvalidRpt("truncated xref entry".into()))?;
                cursor += 1;
                if kind == b'n' {
                    let objid = (start_id + i) as u32;
                    self.xref
                        .entry(objid)
                        .or_insert(XrefEntry::Offset(offset as usize));
                }
            }
        }

        let mut parser = ObjectParser::new(data, cursor);
        Ok(parser.parse_object()?.as_dict()?.clone())
    }

    /// Parse an xref stream (`/Type /XRef`) at `pos`.
    fn load_xref_stream(&mut self, pos: usize) -> Result<Dict> {
        let mut parser = ObjectParser::new(&self.data, pos);
        let (_, object) = parser.parse_indirect()?;
        let stream = object.as_stream()?;
        let payload = self.decode_stream_data(stream)?;

        let widths: Vec<usize> = stream
            .get("W")
            .ok_or_else(|| RptError::InvalidRpt("xref stream missing /W".into()))?
            .as_array()?
            .iter()
            .map(|w| w.as_int().map(|n| n as usize))
            .collect::<Result<_>>()?;
        if widths.len() != 3 {
            return Err(RptError::InvalidRpt("xref stream /W must have 3 fields".into()));
        }
        let row = widths.iter().sum::<usize>();
        if row == 0 {
            return Err(RptError::InvalidRpt("xref stream with empty rows".into()));
        }

        let size = stream
            .get("Size")
            .ok_or_else(|| RptError::InvalidRpt("xref stream missing /Size".into()))?
            .as_int()?;
        let index: Vec<i64> = match stream.get("Index") {
            Some(obj) => obj
                .as_array()?
                .iter()
                .map(PdfObject::as_int)
                .collect::<Result<_>>()?,
            None => vec![0, size],
        };

        let mut offset = 0usize;
        for span in index.chunks(2) {
            let [start, count] = span else {
                return Err(RptError::InvalidRpt("odd xref stream /Index".into()));
            };
            for i in 0..*count {
                if offset + row > payload.len() {
                    return Err(RptError::InvalidRpt("xref stream data truncated".into()));
                }
                let fields = &payload[offset..offset + row];
                offset += row;

                let kind = if widths[0] == 0 {
                    1
                } else {
                    be_uint(&fields[..widths[0]])
                };
                let f2 = be_uint(&fields[widths[0]..widths[0] + widths[1]]);
                let f3 = be_uint(&fields[widths[0] + widths[1]..]);
                let objid = (start + i) as u32;

                match kind {
                    1 => {
                        self.xref
                            .entry(objid)
                            .or_insert(XrefEntry::Offset(f2 as usize));
                    }
                    2 => {
                        self.xref
                            .entry(objid)
                            .or_insert(XrefEntry::InStream(f2 as u32, f3 as usize));
                    }
                    _ => {} // free entry
                }
            }
        }

        let mut trailer = Dict::new();
        for key in ["Root", "Info", "Size", "Prev", "Encrypt", "ID"] {
            if let Some(value) = stream.get(key) {
                trailer.insert(key.to_string(), value.clone());
            }
        }
        Ok(trailer)
    }

    /// Last-resort xref: scan the file for `N G obj` headers.
    ///
    /// Later definitions shadow earlier ones, matching incremental-update
    /// semantics.
    fn scan_objects(&mut self) -> Result<()> {
        let data = &self.data;
        let needle = b"obj";
        let mut found = 0usize;

        for i in 0..data.len().saturating_sub(needle.len()) {
            if &data[i..i + needle.len()] != needle {
                continue;
            }
            // Word boundary after, then walk back over "N G ".
            if let Some(&after) = data.get(i + needle.len())
                && !after.is_ascii_whitespace()
                && !matches!(after, b'<' | b'[' | b'(' | b'/' | b'%')
            {
                continue;
            }
            let Some(start) = scan_back_header(data, i) else {
                continue;
            };
            let mut parser = ObjectParser::new(data, start);
            if let Ok((objref, _)) = parser.parse_indirect() {
                self.xref.insert(objref.objid, XrefEntry::Offset(start));
                found += 1;
            }
        }
        debug!(found, "object scan complete");

        // The trailer may still be intact even when the xref is not.
        let mut trailer = Dict::new();
        let mut search = 0usize;
        while let Some(rel) = find_from(data, b"trailer", search) {
            search = rel + 7;
            let mut parser = ObjectParser::new(data, search);
            if let Ok(PdfObject::Dict(d)) = parser.parse_object() {
                trailer = d;
            }
        }
        if trailer.is_empty() {
            // Xref streams carry the root instead.
            for (&objid, _) in self.xref.clone().iter() {
                if let Ok(obj) = self.getobj(objid)
                    && let Ok(stream) = obj.as_stream()
                    && stream.get("Type").and_then(|t| t.as_name().ok()) == Some("XRef")
                {
                    for key in ["Root", "Info", "Size", "Encrypt"] {
                        if let Some(value) = stream.get(key) {
                            trailer.insert(key.to_string(), value.clone());
                        }
                    }
                }
            }
        }
        if trailer.is_empty() {
            return Err(RptError::InvalidRpt("PDF has no recoverable trailer".into()));
        }
        self.trailer = trailer;
        Ok(())
    }

    /// Fetch an indirect object by id, caching the parse.
    pub fn getobj(&self, objid: u32) -> Result<Rc<PdfObject>> {
        if let Some(hit) = self.cache.borrow().get(&objid) {
            return Ok(Rc::clone(hit));
        }
        let entry = *self
            .xref
            .get(&objid)
            .ok_or_else(|| RptError::InvalidRpt(format!("PDF object {objid} not found")))?;

        let object = match entry {
            XrefEntry::Offset(pos) => {
                if pos >= self.data.len() {
                    return Err(RptError::InvalidRpt(format!(
                        "object {objid} offset {pos} past end of file"
                    )));
                }
                let mut parser = ObjectParser::new(&self.data, pos);
                let (objref, object) = parser.parse_indirect()?;
                if objref.objid != objid {
                    return Err(RptError::InvalidRpt(format!(
                        "xref says object {objid} at {pos}, found {}",
                        objref.objid
                    )));
                }
                object
            }
            XrefEntry::InStream(stream_id, index) => self.load_from_objstm(stream_id, index)?,
        };

        let object = Rc::new(object);
        self.cache.borrow_mut().insert(objid, Rc::clone(&object));
        Ok(object)
    }

    /// Extract one object from an object stream (`/Type /ObjStm`).
    fn load_from_objstm(&self, stream_id: u32, index: usize) -> Result<PdfObject> {
        let container = self.getobj(stream_id)?;
        let stream = container.as_stream()?;
        let n = stream
            .get("N")
            .ok_or_else(|| RptError::InvalidRpt("object stream missing /N".into()))?
            .as_int()? as usize;
        let first = stream
            .get("First")
            .ok_or_else(|| RptError::InvalidRpt("object stream missing /First".into()))?
            .as_int()? as usize;
        if index >= n {
            return Err(RptError::InvalidRpt(format!(
                "object index {index} outside object stream of {n}"
            )));
        }

        let payload = self.decode_stream_data(stream)?;
        let mut header = ObjectParser::new(&payload, 0);
        let mut offset = None;
        for i in 0..n {
            let _objid = header.parse_object()?.as_int()?;
            let rel = header.parse_object()?.as_int()? as usize;
            if i == index {
                offset = Some(rel);
                break;
            }
        }
        let rel = offset.ok_or_else(|| {
            RptError::InvalidRpt("object stream header shorter than /N".into())
        })?;

        let mut parser = ObjectParser::new(&payload, first + rel);
        parser.parse_object()
    }

    /// Follow reference chains until a direct object is reached.
    pub fn resolve(&self, object: &PdfObject) -> Result<Rc<PdfObject>> {
        let mut current = match object {
            PdfObject::Ref(r) => self.getobj(r.objid)?,
            other => return Ok(Rc::new(other.clone())),
        };
        for _ in 0..32 {
            let next = match current.as_ref() {
                PdfObject::Ref(r) => self.getobj(r.objid)?,
                _ => return Ok(current),
            };
            current = next;
        }
        Err(RptError::InvalidRpt("reference chain too deep".into()))
    }

    /// Dictionary lookup with reference resolution.
    pub fn dict_get(&self, dict: &Dict, key: &str) -> Option<Rc<PdfObject>> {
        dict.get(key).and_then(|obj| self.resolve(obj).ok())
    }

    /// Decode a stream's payload: FlateDecode plus optional PNG predictor.
    ///
    /// Streams with no filter pass through untouched; filters other than
    /// FlateDecode are structural-metadata territory this tool never needs
    /// to read and are rejected.
    pub fn decode_stream_data(&self, stream: &super::object::PdfStream) -> Result<Vec<u8>> {
        let filter = match stream.get("Filter") {
            None => return Ok(stream.rawdata.clone()),
            Some(f) => self.resolve(f)?,
        };
        let filter_name = match filter.as_ref() {
            PdfObject::Name(name) => name.clone(),
            PdfObject::Array(arr) if arr.len() == 1 => arr[0].as_name()?.to_string(),
            PdfObject::Array(arr) if arr.is_empty() => return Ok(stream.rawdata.clone()),
            other => {
                return Err(RptError::InvalidRpt(format!(
                    "unsupported /Filter shape: {other:?}"
                )));
            }
        };
        if filter_name != "FlateDecode" {
            return Err(RptError::InvalidRpt(format!(
                "unsupported stream filter {filter_name}"
            )));
        }

        use std::io::Read;
        let mut decoder = flate2::read::ZlibDecoder::new(stream.rawdata.as_slice());
        let mut output = Vec::new();
        decoder
            .read_to_end(&mut output)
            .map_err(|e| RptError::InvalidRpt(format!("bad FlateDecode stream: {e}")))?;

        if let Some(parms) = stream.get("DecodeParms") {
            let parms = self.resolve(parms)?;
            let parms_dict = match parms.as_ref() {
                PdfObject::Dict(d) => Some(d.clone()),
                PdfObject::Array(arr) if !arr.is_empty() => {
                    self.resolve(&arr[0])?.as_dict().ok().cloned()
                }
                _ => None,
            };
            if let Some(parms) = parms_dict {
                let predictor = parms.get("Predictor").and_then(|p| p.as_int().ok()).unwrap_or(1);
                if predictor >= 10 {
                    let columns =
                        parms.get("Columns").and_then(|c| c.as_int().ok()).unwrap_or(1) as usize;
                    let colors =
                        parms.get("Colors").and_then(|c| c.as_int().ok()).unwrap_or(1) as usize;
                    let bits = parms
                        .get("BitsPerComponent")
                        .and_then(|b| b.as_int().ok())
                        .unwrap_or(8) as usize;
                    output = png_predictor(&output, columns, colors, bits)?;
                }
            }
        }
        Ok(output)
    }

    /// Flatten the page tree into reading order.
    pub fn pages(&self) -> Result<Vec<PageNode>> {
        let catalog = self.catalog()?;
        let pages_ref = catalog
            .get("Pages")
            .ok_or_else(|| RptError::InvalidRpt("catalog has no /Pages".into()))?;

        let mut out = Vec::new();
        let mut visited = FxHashSet::default();
        self.walk_pages(pages_ref, &Dict::new(), &mut visited, &mut out)?;
        Ok(out)
    }

    fn walk_pages(
        &self,
        node_ref: &PdfObject,
        inherited: &Dict,
        visited: &mut FxHashSet<u32>,
        out: &mut Vec<PageNode>,
    ) -> Result<()> {
        let objref = node_ref.as_objref().map_err(|_| {
            RptError::InvalidRpt("page tree nodes must be indirect references".into())
        })?;
        if !visited.insert(objref.objid) {
            return Err(RptError::InvalidRpt("cycle in page tree".into()));
        }
        let node = self.getobj(objref.objid)?;
        let dict = node.as_dict()?;

        let node_type = dict
            .get("Type")
            .and_then(|t| t.as_name().ok())
            .unwrap_or(if dict.contains_key("Kids") { "Pages" } else { "Page" });

        if node_type == "Pages" {
            let mut passed = inherited.clone();
            for key in INHERITABLE {
                if let Some(value) = dict.get(key) {
                    passed.insert(key.to_string(), value.clone());
                }
            }
            let kids = self
                .dict_get(dict, "Kids")
                .ok_or_else(|| RptError::InvalidRpt("Pages node without /Kids".into()))?;
            for kid in kids.as_array()? {
                self.walk_pages(kid, &passed, visited, out)?;
            }
        } else {
            // Leaf: fold the inherited attributes under the page's own.
            let mut attrs = dict.clone();
            for (key, value) in inherited {
                attrs.entry(key.clone()).or_insert_with(|| value.clone());
            }
            out.push(PageNode { objref, attrs });
        }
        Ok(())
    }
}

/// Big-endian integer of 1..=8 bytes (xref stream fields).
fn be_uint(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| acc << 8 | u64::from(b))
}

fn find_from(data: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= data.len() {
        return None;
    }
    data[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| from + i)
}

/// Walk backwards from the `obj` keyword over `N G ` to the header start.
fn scan_back_header(data: &[u8], obj_pos: usize) -> Option<usize> {
    let mut i = obj_pos;
    let step_back_ws = |i: &mut usize| {
        let mut moved = false;
        while *i > 0 && data[*i - 1].is_ascii_whitespace() {
            *i -= 1;
            moved = true;
        }
        moved
    };
    let step_back_digits = |i: &mut usize| {
        let mut moved = false;
        while *i > 0 && data[*i - 1].is_ascii_digit() {
            *i -= 1;
            moved = true;
        }
        moved
    };

    if !step_back_ws(&mut i) || !step_back_digits(&mut i) {
        return None;
    }
    if !step_back_ws(&mut i) || !step_back_digits(&mut i) {
        return None;
    }
    Some(i)
}

/// Undo the PNG row predictor used by xref and object streams.
fn png_predictor(data: &[u8], columns: usize, colors: usize, bits: usize) -> Result<Vec<u8>> {
    let bpp = (colors * bits).div_ceil(8).max(1);
    let row_len = (columns * colors * bits).div_ceil(8);
    let stride = row_len + 1;
    if row_len == 0 || !data.len().is_multiple_of(stride) {
        return Err(RptError::InvalidRpt("bad PNG predictor geometry".into()));
    }

    let mut out = Vec::with_capacity(data.len() / stride * row_len);
    let mut prev = vec![0u8; row_len];
    for chunk in data.chunks(stride) {
        let (tag, row) = (chunk[0], &chunk[1..]);
        let mut line = row.to_vec();
        match tag {
            0 => {}
            1 => {
                for i in bpp..row_len {
                    line[i] = line[i].wrapping_add(line[i - bpp]);
                }
            }
            2 => {
                for i in 0..row_len {
                    line[i] = line[i].wrapping_add(prev[i]);
                }
            }
            3 => {
                for i in 0..row_len {
                    let left = if i >= bpp { line[i - bpp] } else { 0 };
                    let avg = ((u16::from(left) + u16::from(prev[i])) / 2) as u8;
                    line[i] = line[i].wrapping_add(avg);
                }
            }
            4 => {
                for i in 0..row_len {
                    let a = if i >= bpp { line[i - bpp] } else { 0 };
                    let b = prev[i];
                    let c = if i >= bpp { prev[i - bpp] } else { 0 };
                    line[i] = line[i].wrapping_add(paeth(a, b, c));
                }
            }
            _ => {
                return Err(RptError::InvalidRpt(format!(
                    "unknown PNG predictor tag {tag}"
                )));
            }
        }
        out.extend_from_slice(&line);
        prev = line;
    }
    Ok(out)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let (a, b, c) = (i16::from(a), i16::from(b), i16::from(c));
    let p = a + b - c;
    let (pa, pb, pc) = ((p - a).abs(), (p - b).abs(), (p - c).abs());
    if pa <= pb && pa <= pc {
        a as u8
    } else if pb <= pc {
        b as u8
    } else {
        c as u8
    }
}

//! PDF page slicing: re-emit a document containing only selected pages.
//!
//! The slicer flattens the source page tree, deep-copies the objects
//! transitively reachable from each selected page into a fresh builder,
//! and rebuilds the catalog, page tree and document information. Content
//! streams are copied byte-for-byte; they are never re-encoded.

use super::document::{PageNode, PdfDocument};
use super::object::{Dict, ObjRef, PdfObject, PdfStream};
use super::writer::PdfBuilder;
use crate::error::{Result, RptError};
use rustc_hash::FxHashMap;
use tracing::warn;

/// Page attributes carried into the emitted document. Everything else on
/// the page dictionary is either rebuilt (`Parent`) or tied to document
/// structure that does not survive slicing (outlines, article beads,
/// structure-tree parents).
const PAGE_KEYS: [&str; 10] = [
    "Type", "MediaBox", "CropBox", "BleedBox", "TrimBox", "ArtBox", "Rotate", "Resources",
    "Contents", "Group",
];

/// Produced by [`slice_pages`]; a complete single-revision PDF in memory.
pub fn slice_pages(
    doc: &PdfDocument,
    selection: &[u32],
    declared_page_count: Option<u32>,
) -> Result<PdfBuilder> {
    let pages = doc.pages()?;
    if pages.is_empty() {
        return Err(RptError::InvalidRpt("embedded PDF has no pages".into()));
    }
    if let Some(declared) = declared_page_count
        && declared as usize != pages.len()
    {
        warn!(
            declared,
            actual = pages.len(),
            "RPT page count disagrees with embedded PDF; using the PDF's own count"
        );
    }

    let mut builder = PdfBuilder::new();
    let mut copier = Copier {
        doc,
        map: FxHashMap::default(),
    };

    let pages_id = builder.reserve();

    let mut kid_refs = Vec::new();
    for &index in selection {
        let Some(node) = pages.get(index as usize - 1) else {
            warn!(page = index, "selected page beyond embedded PDF; skipped");
            continue;
        };
        let page_id = copy_page(node, pages_id, &mut copier, &mut builder)?;
        kid_refs.push(PdfObject::Ref(ObjRef::new(page_id, 0)));
        builder.page_ids.push(page_id);
    }
    if kid_refs.is_empty() {
        return Err(RptError::NoPagesSelected);
    }

    let mut pages_dict = Dict::new();
    pages_dict.insert("Type".into(), PdfObject::Name("Pages".into()));
    pages_dict.insert("Count".into(), PdfObject::Int(kid_refs.len() as i64));
    pages_dict.insert("Kids".into(), PdfObject::Array(kid_refs));
    builder.set(pages_id, PdfObject::Dict(pages_dict));

    let mut catalog = Dict::new();
    catalog.insert("Type".into(), PdfObject::Name("Catalog".into()));
    catalog.insert("Pages".into(), PdfObject::Ref(ObjRef::new(pages_id, 0)));
    builder.catalog_id = builder.add(PdfObject::Dict(catalog));

    builder.info_id = Some(builder.add(PdfObject::Dict(stamped_info(doc))));

    Ok(builder)
}

/// Copy one page dictionary, keeping the whitelisted attributes.
///
/// Inheritance was already flattened by the page-tree walk, so each copied
/// page is self-contained.
fn copy_page(
    node: &PageNode,
    pages_id: u32,
    copier: &mut Copier<'_>,
    builder: &mut PdfBuilder,
) -> Result<u32> {
    let mut attrs = Dict::new();
    attrs.insert("Type".into(), PdfObject::Name("Page".into()));
    attrs.insert("Parent".into(), PdfObject::Ref(ObjRef::new(pages_id, 0)));
    for key in PAGE_KEYS {
        if key == "Type" {
            continue;
        }
        if let Some(value) = node.attrs.get(key) {
            attrs.insert(key.to_string(), copier.copy(value, builder)?);
        }
    }
    Ok(builder.add(PdfObject::Dict(attrs)))
}

/// Recursive object copier with an old-id to new-id translation map.
struct Copier<'a> {
    doc: &'a PdfDocument,
    map: FxHashMap<u32, u32>,
}

impl Copier<'_> {
    /// Deep-copy `object` into the builder, translating every reference.
    ///
    /// The map doubles as the visited set: shared objects are copied once
    /// and cycles (e.g. via /Parent chains inside resources) terminate.
    fn copy(&mut self, object: &PdfObject, builder: &mut PdfBuilder) -> Result<PdfObject> {
        Ok(match object {
            PdfObject::Ref(old) => {
                if let Some(&new_id) = self.map.get(&old.objid) {
                    return Ok(PdfObject::Ref(ObjRef::new(new_id, 0)));
                }
                let new_id = builder.reserve();
                self.map.insert(old.objid, new_id);
                let fetched = self.doc.getobj(old.objid)?;
                let copied = self.copy(fetched.as_ref(), builder)?;
                builder.set(new_id, copied);
                PdfObject::Ref(ObjRef::new(new_id, 0))
            }
            PdfObject::Array(items) => PdfObject::Array(
                items
                    .iter()
                    .map(|item| self.copy(item, builder))
                    .collect::<Result<_>>()?,
            ),
            PdfObject::Dict(dict) => PdfObject::Dict(self.copy_dict(dict, builder)?),
            PdfObject::Stream(stream) => PdfObject::Stream(Box::new(PdfStream::new(
                self.copy_dict(&stream.attrs, builder)?,
                stream.rawdata.clone(),
            ))),
            direct => direct.clone(),
        })
    }

    fn copy_dict(&mut self, dict: &Dict, builder: &mut PdfBuilder) -> Result<Dict> {
        let mut out = Dict::new();
        for (key, value) in dict {
            out.insert(key.clone(), self.copy(value, builder)?);
        }
        Ok(out)
    }
}

/// Document information for the emitted file: the source's Info entries
/// with the governance stamp applied.
fn stamped_info(doc: &PdfDocument) -> Dict {
    let mut info = Dict::new();
    if let Some(source) = doc.info() {
        for (key, value) in source {
            // Info values are strings or names; anything indirect is
            // resolved to its direct form and structural values dropped.
            let resolved = match doc.resolve(&value) {
                Ok(obj) => obj.as_ref().clone(),
                Err(_) => continue,
            };
            match resolved {
                PdfObject::String(_) | PdfObject::Name(_) | PdfObject::Int(_)
                | PdfObject::Real(_) | PdfObject::Bool(_) => {
                    info.insert(key, resolved);
                }
                _ => {}
            }
        }
    }
    info.insert(
        "Creator".into(),
        PdfObject::String(b"Papyrus Content Governance".to_vec()),
    );
    info.insert(
        "Producer".into(),
        PdfObject::String(b"ISIS Papyrus".to_vec()),
    );
    info
}

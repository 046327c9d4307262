//! Overlay construction and per-page merge.
//!
//! The prepared mark becomes a DeviceRGB image XObject with a DeviceGray
//! SMask, wrapped in a form XObject whose bounding box matches the page.
//! Each page then gains an appended `q /WmN Do Q` content stream and the
//! form under a fresh resource name.

use super::raster::{self, PreparedMark};
use super::{WatermarkPosition, WatermarkSpec};
use crate::codec;
use crate::error::{Result, RptError};
use crate::pdf::{Dict, ObjRef, PdfBuilder, PdfObject, PdfStream};
use std::collections::HashMap;
use std::fmt::Write as _;
use tracing::debug;

/// Composite the watermark onto every page of a sliced document.
pub fn apply_watermark(builder: &mut PdfBuilder, spec: &WatermarkSpec) -> Result<()> {
    spec.validate()?;
    let page_ids = builder.page_ids.clone();

    // Forms are built per page geometry; identical pages share one.
    let mut forms: HashMap<(u64, u64), u32> = HashMap::new();

    for page_id in page_ids {
        let media = page_media_box(builder, page_id)?;
        let (page_w, page_h) = (media[2] - media[0], media[3] - media[1]);
        let key = (page_w.to_bits(), page_h.to_bits());

        let form_id = match forms.get(&key) {
            Some(&id) => id,
            None => {
                let mark = raster::prepare(spec, page_w, page_h)?;
                let id = build_form(builder, &mark, spec.position, page_w, page_h);
                forms.insert(key, id);
                id
            }
        };

        merge_into_page(builder, page_id, form_id)?;
    }
    debug!(forms = forms.len(), "watermark applied");
    Ok(())
}

/// Resolve a value that may be stored behind a builder-local reference.
fn builder_resolve<'a>(builder: &'a PdfBuilder, value: &'a PdfObject) -> Result<&'a PdfObject> {
    match value {
        PdfObject::Ref(r) => builder
            .get(r.objid)
            .ok_or_else(|| RptError::InvalidRpt(format!("dangling object {} in output", r.objid))),
        direct => Ok(direct),
    }
}

fn page_media_box(builder: &PdfBuilder, page_id: u32) -> Result<[f64; 4]> {
    let page = builder
        .get(page_id)
        .ok_or_else(|| RptError::InvalidRpt("page object missing from output".into()))?;
    let media = page
        .as_dict()?
        .get("MediaBox")
        .ok_or_else(|| RptError::InvalidRpt("emitted page has no MediaBox".into()))?;
    let media = builder_resolve(builder, media)?;
    let arr = media.as_array()?;
    if arr.len() != 4 {
        return Err(RptError::InvalidRpt("MediaBox must have 4 numbers".into()));
    }
    Ok([
        arr[0].as_num()?,
        arr[1].as_num()?,
        arr[2].as_num()?,
        arr[3].as_num()?,
    ])
}

/// Register the image pair and the form XObject for one page geometry.
fn build_form(
    builder: &mut PdfBuilder,
    mark: &PreparedMark,
    position: WatermarkPosition,
    page_w: f64,
    page_h: f64,
) -> u32 {
    let smask_id = {
        let mut attrs = Dict::new();
        attrs.insert("Type".into(), PdfObject::Name("XObject".into()));
        attrs.insert("Subtype".into(), PdfObject::Name("Image".into()));
        attrs.insert("Width".into(), PdfObject::Int(i64::from(mark.width)));
        attrs.insert("Height".into(), PdfObject::Int(i64::from(mark.height)));
        attrs.insert("ColorSpace".into(), PdfObject::Name("DeviceGray".into()));
        attrs.insert("BitsPerComponent".into(), PdfObject::Int(8));
        attrs.insert("Filter".into(), PdfObject::Name("FlateDecode".into()));
        builder.add(PdfObject::Stream(Box::new(PdfStream::new(
            attrs,
            codec::deflate(&mark.alpha),
        ))))
    };

    let image_id = {
        let mut attrs = Dict::new();
        attrs.insert("Type".into(), PdfObject::Name("XObject".into()));
        attrs.insert("Subtype".into(), PdfObject::Name("Image".into()));
        attrs.insert("Width".into(), PdfObject::Int(i64::from(mark.width)));
        attrs.insert("Height".into(), PdfObject::Int(i64::from(mark.height)));
        attrs.insert("ColorSpace".into(), PdfObject::Name("DeviceRGB".into()));
        attrs.insert("BitsPerComponent".into(), PdfObject::Int(8));
        attrs.insert("Filter".into(), PdfObject::Name("FlateDecode".into()));
        attrs.insert("SMask".into(), PdfObject::Ref(ObjRef::new(smask_id, 0)));
        builder.add(PdfObject::Stream(Box::new(PdfStream::new(
            attrs,
            codec::deflate(&mark.rgb),
        ))))
    };

    let content = placement_content(mark, position, page_w, page_h);

    let mut xobjects = Dict::new();
    xobjects.insert("Im1".into(), PdfObject::Ref(ObjRef::new(image_id, 0)));
    let mut resources = Dict::new();
    resources.insert("XObject".into(), PdfObject::Dict(xobjects));

    let mut attrs = Dict::new();
    attrs.insert("Type".into(), PdfObject::Name("XObject".into()));
    attrs.insert("Subtype".into(), PdfObject::Name("Form".into()));
    attrs.insert(
        "BBox".into(),
        PdfObject::Array(vec![
            PdfObject::Real(0.0),
            PdfObject::Real(0.0),
            PdfObject::Real(page_w),
            PdfObject::Real(page_h),
        ]),
    );
    attrs.insert("Resources".into(), PdfObject::Dict(resources));
    builder.add(PdfObject::Stream(Box::new(PdfStream::new(
        attrs,
        content.into_bytes(),
    ))))
}

/// Content stream placing the mark at its anchor(s).
fn placement_content(
    mark: &PreparedMark,
    position: WatermarkPosition,
    page_w: f64,
    page_h: f64,
) -> String {
    let w = f64::from(mark.width);
    let h = f64::from(mark.height);
    let mut ops = String::new();
    let mut place = |x: f64, y: f64| {
        let _ = writeln!(ops, "q\n{w:.2} 0 0 {h:.2} {x:.2} {y:.2} cm\n/Im1 Do\nQ");
    };

    let centered = ((page_w - w) / 2.0, (page_h - h) / 2.0);
    match position {
        WatermarkPosition::Center | WatermarkPosition::Repeat => place(centered.0, centered.1),
        WatermarkPosition::TopLeft => place(0.0, page_h - h),
        WatermarkPosition::TopCenter => place(centered.0, page_h - h),
        WatermarkPosition::TopRight => place(page_w - w, page_h - h),
        WatermarkPosition::MiddleLeft => place(0.0, centered.1),
        WatermarkPosition::MiddleRight => place(page_w - w, centered.1),
        WatermarkPosition::BottomLeft => place(0.0, 0.0),
        WatermarkPosition::BottomCenter => place(centered.0, 0.0),
        WatermarkPosition::BottomRight => place(page_w - w, 0.0),
        WatermarkPosition::Tiling => {
            let (step_x, step_y) = (w * 1.25, h * 1.25);
            let mut y = 0.0;
            while y < page_h {
                let mut x = 0.0;
                while x < page_w {
                    place(x, y);
                    x += step_x;
                }
                y += step_y;
            }
        }
    }
    ops
}

/// Append the overlay draw to one page and register the form resource.
fn merge_into_page(builder: &mut PdfBuilder, page_id: u32, form_id: u32) -> Result<()> {
    let page = builder
        .get(page_id)
        .ok_or_else(|| RptError::InvalidRpt("page object missing from output".into()))?;
    let page_dict = page.as_dict()?.clone();

    // Fresh resource name that cannot collide with existing XObject keys.
    let existing = resolved_xobject_keys(builder, &page_dict)?;
    let mut n = 0usize;
    let name = loop {
        let candidate = format!("Wm{n}");
        if !existing.contains(&candidate) {
            break candidate;
        }
        n += 1;
    };

    let draw = format!("q\n/{name} Do\nQ");
    let overlay_id = builder.add(PdfObject::Stream(Box::new(PdfStream::new(
        Dict::new(),
        draw.into_bytes(),
    ))));

    let mut page_dict = page_dict;
    append_contents(builder, &mut page_dict, overlay_id)?;
    insert_xobject(builder, &mut page_dict, &name, form_id)?;
    builder.set(page_id, PdfObject::Dict(page_dict));
    Ok(())
}

fn resolved_xobject_keys(builder: &PdfBuilder, page_dict: &Dict) -> Result<Vec<String>> {
    let Some(resources) = page_dict.get("Resources") else {
        return Ok(Vec::new());
    };
    let resources = builder_resolve(builder, resources)?;
    let Ok(resources) = resources.as_dict() else {
        return Ok(Vec::new());
    };
    let Some(xobjects) = resources.get("XObject") else {
        return Ok(Vec::new());
    };
    let xobjects = builder_resolve(builder, xobjects)?;
    Ok(xobjects
        .as_dict()
        .map(|d| d.keys().cloned().collect())
        .unwrap_or_default())
}

/// Rewrite /Contents as an array ending with the overlay stream.
///
/// A single-stream page becomes a two-element array; an array page keeps
/// its shape. The original array object is left untouched in case another
/// page shares it.
fn append_contents(builder: &PdfBuilder, page_dict: &mut Dict, overlay_id: u32) -> Result<()> {
    let overlay_ref = PdfObject::Ref(ObjRef::new(overlay_id, 0));
    let new_value = match page_dict.get("Contents") {
        None => PdfObject::Array(vec![overlay_ref]),
        Some(value) => {
            let resolved = builder_resolve(builder, value)?;
            match resolved {
                PdfObject::Array(items) => {
                    let mut items = items.clone();
                    items.push(overlay_ref);
                    PdfObject::Array(items)
                }
                _ => PdfObject::Array(vec![value.clone(), overlay_ref]),
            }
        }
    };
    page_dict.insert("Contents".into(), new_value);
    Ok(())
}

/// Add the form under `name` in the page's XObject resources, cloning any
/// shared dictionaries into page-local ones.
fn insert_xobject(
    builder: &PdfBuilder,
    page_dict: &mut Dict,
    name: &str,
    form_id: u32,
) -> Result<()> {
    let mut resources = match page_dict.get("Resources") {
        Some(value) => builder_resolve(builder, value)?.as_dict()?.clone(),
        None => Dict::new(),
    };
    let mut xobjects = match resources.get("XObject") {
        Some(value) => builder_resolve(builder, value)?.as_dict()?.clone(),
        None => Dict::new(),
    };
    xobjects.insert(name.to_string(), PdfObject::Ref(ObjRef::new(form_id, 0)));
    resources.insert("XObject".into(), PdfObject::Dict(xobjects));
    page_dict.insert("Resources".into(), PdfObject::Dict(resources));
    Ok(())
}

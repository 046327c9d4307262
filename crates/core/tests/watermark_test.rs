//! Tests for the watermark compositor.

mod common;

use bytes::Bytes;
use common::sample_pdf;
use image::{Rgba, RgbaImage};
use rptx_core::pdf::{self, PdfDocument, PdfObject};
use rptx_core::watermark::{self, WatermarkPosition, WatermarkSpec};
use std::path::{Path, PathBuf};

fn write_mark_image(dir: &Path) -> PathBuf {
    let path = dir.join("mark.png");
    let img = RgbaImage::from_pixel(8, 4, Rgba([200, 30, 30, 255]));
    img.save(&path).unwrap();
    path
}

fn watermarked(pages: usize, spec: &WatermarkSpec) -> PdfDocument {
    let source = PdfDocument::parse(Bytes::from(sample_pdf(pages))).unwrap();
    let all: Vec<u32> = (1..=pages as u32).collect();
    let mut builder = pdf::slice_pages(&source, &all, None).unwrap();
    watermark::apply_watermark(&mut builder, spec).unwrap();
    let mut out = Vec::new();
    builder.write_to(&mut out, Path::new("wm.pdf")).unwrap();
    PdfDocument::parse(Bytes::from(out)).unwrap()
}

#[test]
fn every_page_gains_the_overlay() {
    let dir = tempfile::tempdir().unwrap();
    let spec = WatermarkSpec::new(write_mark_image(dir.path()));
    let doc = watermarked(3, &spec);

    let pages = doc.pages().unwrap();
    assert_eq!(pages.len(), 3);
    for page in &pages {
        let resources = doc.dict_get(&page.attrs, "Resources").unwrap();
        let xobjects = doc
            .dict_get(resources.as_dict().unwrap(), "XObject")
            .unwrap();
        assert!(xobjects.as_dict().unwrap().contains_key("Wm0"));

        // The overlay draw is appended after the original content.
        let contents = doc.dict_get(&page.attrs, "Contents").unwrap();
        let items = contents.as_array().unwrap().clone();
        assert_eq!(items.len(), 2);
        let overlay = doc.resolve(items.last().unwrap()).unwrap();
        let data = doc
            .decode_stream_data(overlay.as_stream().unwrap())
            .unwrap();
        let text = String::from_utf8_lossy(&data).into_owned();
        assert!(text.contains("/Wm0 Do"));
        assert!(text.starts_with("q"));
        assert!(text.trim_end().ends_with('Q'));
    }
}

#[test]
fn form_carries_image_and_smask() {
    let dir = tempfile::tempdir().unwrap();
    let mut spec = WatermarkSpec::new(write_mark_image(dir.path()));
    spec.opacity = 50.0;
    let doc = watermarked(1, &spec);

    let pages = doc.pages().unwrap();
    let resources = doc.dict_get(&pages[0].attrs, "Resources").unwrap();
    let xobjects = doc
        .dict_get(resources.as_dict().unwrap(), "XObject")
        .unwrap();
    let form = doc
        .resolve(xobjects.as_dict().unwrap().get("Wm0").unwrap())
        .unwrap();
    let form = form.as_stream().unwrap();
    assert_eq!(
        form.get("Subtype").unwrap(),
        &PdfObject::Name("Form".into())
    );

    let form_res = form.get("Resources").unwrap().as_dict().unwrap();
    let im = doc
        .resolve(
            form_res
                .get("XObject")
                .unwrap()
                .as_dict()
                .unwrap()
                .get("Im1")
                .unwrap(),
        )
        .unwrap();
    let im = im.as_stream().unwrap();
    assert_eq!(
        im.get("ColorSpace").unwrap(),
        &PdfObject::Name("DeviceRGB".into())
    );

    let smask = doc.resolve(im.get("SMask").unwrap()).unwrap();
    let smask = smask.as_stream().unwrap();
    assert_eq!(
        smask.get("ColorSpace").unwrap(),
        &PdfObject::Name("DeviceGray".into())
    );

    // Opacity 50 halves the fully opaque source alpha.
    let alpha = doc.decode_stream_data(smask).unwrap();
    assert!(alpha.iter().all(|&a| (126..=129).contains(&a)));
}

#[test]
fn bottom_right_anchor_lands_in_the_bottom_right_quadrant() {
    let dir = tempfile::tempdir().unwrap();
    let mut spec = WatermarkSpec::new(write_mark_image(dir.path()));
    spec.position = WatermarkPosition::BottomRight;
    spec.scale = 0.5;
    let doc = watermarked(1, &spec);

    let pages = doc.pages().unwrap();
    let resources = doc.dict_get(&pages[0].attrs, "Resources").unwrap();
    let xobjects = doc
        .dict_get(resources.as_dict().unwrap(), "XObject")
        .unwrap();
    let form = doc
        .resolve(xobjects.as_dict().unwrap().get("Wm0").unwrap())
        .unwrap();
    let content = doc
        .decode_stream_data(form.as_stream().unwrap())
        .unwrap();
    let text = String::from_utf8_lossy(&content).into_owned();

    // One placement: "w 0 0 h x y cm" with x past midpage and y at 0.
    let cm_line = text
        .lines()
        .find(|l| l.trim_end().ends_with("cm"))
        .unwrap();
    let nums: Vec<f64> = cm_line
        .split_whitespace()
        .take(6)
        .map(|n| n.parse().unwrap())
        .collect();
    let (x, y) = (nums[4], nums[5]);
    assert!(x > 306.0, "x={x} not in right half of a 612-wide page");
    assert_eq!(y, 0.0);
}

#[test]
fn tiling_places_a_grid() {
    let dir = tempfile::tempdir().unwrap();
    let mut spec = WatermarkSpec::new(write_mark_image(dir.path()));
    spec.position = WatermarkPosition::Tiling;
    let doc = watermarked(1, &spec);

    let pages = doc.pages().unwrap();
    let resources = doc.dict_get(&pages[0].attrs, "Resources").unwrap();
    let xobjects = doc
        .dict_get(resources.as_dict().unwrap(), "XObject")
        .unwrap();
    let form = doc
        .resolve(xobjects.as_dict().unwrap().get("Wm0").unwrap())
        .unwrap();
    let content = doc
        .decode_stream_data(form.as_stream().unwrap())
        .unwrap();
    let text = String::from_utf8_lossy(&content).into_owned();
    let marks = text.matches("/Im1 Do").count();
    assert!(marks > 4, "expected a grid of marks, got {marks}");
}

#[test]
fn out_of_range_opacity_rejected() {
    let mut spec = WatermarkSpec::new(PathBuf::from("wm.png"));
    spec.opacity = 150.0;
    assert!(spec.validate().is_err());
    spec.opacity = 30.0;
    spec.scale = 9.0;
    assert!(spec.validate().is_err());
}

//! Tests for PDF parsing, slicing and serialization.

mod common;

use bytes::Bytes;
use common::{RawPdf, sample_pdf};
use rptx_core::pdf::{self, PdfDocument, PdfObject};
use std::path::Path;

fn parse(data: Vec<u8>) -> PdfDocument {
    PdfDocument::parse(Bytes::from(data)).unwrap()
}

fn page_text_marker(doc: &PdfDocument, page_index: usize) -> String {
    let pages = doc.pages().unwrap();
    let attrs = &pages[page_index].attrs;
    let contents = doc.dict_get(attrs, "Contents").unwrap();
    let data = match contents.as_ref() {
        PdfObject::Stream(s) => doc.decode_stream_data(s).unwrap(),
        PdfObject::Array(items) => {
            let first = doc.resolve(&items[0]).unwrap();
            doc.decode_stream_data(first.as_stream().unwrap()).unwrap()
        }
        other => panic!("unexpected contents: {other:?}"),
    };
    String::from_utf8_lossy(&data).into_owned()
}

#[test]
fn writer_output_parses_back() {
    let doc = parse(sample_pdf(3));
    let pages = doc.pages().unwrap();
    assert_eq!(pages.len(), 3);
    assert!(page_text_marker(&doc, 0).contains("Page 1"));
    assert!(page_text_marker(&doc, 2).contains("Page 3"));
}

#[test]
fn slice_keeps_selected_pages_in_order() {
    let source = parse(sample_pdf(5));
    let builder = pdf::slice_pages(&source, &[2, 4], Some(5)).unwrap();

    let mut out = Vec::new();
    builder.write_to(&mut out, Path::new("out.pdf")).unwrap();
    let sliced = parse(out);

    let pages = sliced.pages().unwrap();
    assert_eq!(pages.len(), 2);
    assert!(page_text_marker(&sliced, 0).contains("Page 2"));
    assert!(page_text_marker(&sliced, 1).contains("Page 4"));
}

#[test]
fn slice_all_preserves_page_count() {
    let source = parse(sample_pdf(4));
    let builder = pdf::slice_pages(&source, &[1, 2, 3, 4], Some(4)).unwrap();
    let mut out = Vec::new();
    builder.write_to(&mut out, Path::new("out.pdf")).unwrap();
    assert_eq!(parse(out).pages().unwrap().len(), 4);
}

#[test]
fn slice_stamps_document_information() {
    let source = parse(sample_pdf(1));
    let builder = pdf::slice_pages(&source, &[1], None).unwrap();
    let mut out = Vec::new();
    builder.write_to(&mut out, Path::new("out.pdf")).unwrap();

    let sliced = parse(out);
    let info = sliced.info().unwrap();
    assert_eq!(
        info.get("Creator").unwrap(),
        &PdfObject::String(b"Papyrus Content Governance".to_vec())
    );
    assert_eq!(
        info.get("Producer").unwrap(),
        &PdfObject::String(b"ISIS Papyrus".to_vec())
    );
}

#[test]
fn rpt_page_count_is_advisory() {
    // Declared count disagrees; the PDF's own count governs.
    let source = parse(sample_pdf(3));
    let builder = pdf::slice_pages(&source, &[1, 3], Some(7)).unwrap();
    let mut out = Vec::new();
    builder.write_to(&mut out, Path::new("out.pdf")).unwrap();
    assert_eq!(parse(out).pages().unwrap().len(), 2);
}

/// MediaBox and Resources on the Pages node must be flattened into each
/// emitted page.
#[test]
fn inherited_attributes_are_flattened() {
    let mut raw = RawPdf::new();
    raw.object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(
            2,
            "<< /Type /Pages /Kids [3 0 R 4 0 R] /Count 2 \
             /MediaBox [0 0 400 500] /Resources << /Font << /F9 5 0 R >> >> >>",
        )
        .object(3, "<< /Type /Page /Parent 2 0 R /Contents 6 0 R >>")
        .object(4, "<< /Type /Page /Parent 2 0 R /Contents 7 0 R >>")
        .object(5, "<< /Type /Font /Subtype /Type1 /BaseFont /Courier >>")
        .object(6, "<< /Length 9 >>\nstream\nBT ET q Q\nendstream")
        .object(7, "<< /Length 9 >>\nstream\nBT ET n f\nendstream");
    let source = parse(raw.finish(1));

    let builder = pdf::slice_pages(&source, &[2], Some(2)).unwrap();
    let mut out = Vec::new();
    builder.write_to(&mut out, Path::new("out.pdf")).unwrap();
    let sliced = parse(out);

    let pages = sliced.pages().unwrap();
    assert_eq!(pages.len(), 1);
    let attrs = &pages[0].attrs;
    let media = sliced.dict_get(attrs, "MediaBox").unwrap();
    assert_eq!(media.as_array().unwrap().len(), 4);
    assert_eq!(media.as_array().unwrap()[2].as_num().unwrap(), 400.0);
    let resources = sliced.dict_get(attrs, "Resources").unwrap();
    assert!(resources.as_dict().unwrap().contains_key("Font"));
}

/// Pages whose content is an array of streams keep the array shape.
#[test]
fn contents_array_shape_preserved() {
    let mut raw = RawPdf::new();
    raw.object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(
            2,
            "<< /Type /Pages /Kids [3 0 R] /Count 1 /MediaBox [0 0 100 100] >>",
        )
        .object(3, "<< /Type /Page /Parent 2 0 R /Contents [4 0 R 5 0 R] >>")
        .object(4, "<< /Length 5 >>\nstream\nq 1 w\nendstream")
        .object(5, "<< /Length 1 >>\nstream\nQ\nendstream");
    let source = parse(raw.finish(1));

    let builder = pdf::slice_pages(&source, &[1], None).unwrap();
    let mut out = Vec::new();
    builder.write_to(&mut out, Path::new("out.pdf")).unwrap();
    let sliced = parse(out);

    let pages = sliced.pages().unwrap();
    let contents = sliced.dict_get(&pages[0].attrs, "Contents").unwrap();
    assert_eq!(contents.as_array().unwrap().len(), 2);
}

#[test]
fn encrypted_pdf_rejected() {
    let mut raw = RawPdf::new();
    raw.object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(
            2,
            "<< /Type /Pages /Kids [3 0 R] /Count 1 /MediaBox [0 0 100 100] >>",
        )
        .object(3, "<< /Type /Page /Parent 2 0 R >>")
        .object(4, "<< /Filter /Standard /V 1 /R 2 >>")
        .trailer_entry("/Encrypt 4 0 R ");
    let err = PdfDocument::parse(Bytes::from(raw.finish(1))).unwrap_err();
    assert_eq!(err.exit_code(), 3);
}

#[test]
fn damaged_xref_recovers_by_scanning() {
    let mut data = sample_pdf(2);
    // Corrupt the startxref offset digits.
    let pos = data
        .windows(9)
        .rposition(|w| w == b"startxref")
        .unwrap();
    for b in &mut data[pos + 10..pos + 12] {
        *b = b'9';
    }
    let doc = parse(data);
    assert_eq!(doc.pages().unwrap().len(), 2);
}

#[test]
fn selected_pages_beyond_pdf_are_skipped() {
    let source = parse(sample_pdf(2));
    // RPT declared 5 pages; the PDF only has 2.
    let builder = pdf::slice_pages(&source, &[1, 4, 5], Some(5)).unwrap();
    assert_eq!(builder.page_ids.len(), 1);
}

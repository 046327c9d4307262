//! Tests for the AFP structured-field slicer.

mod common;

use common::{BDT, BPG, EDT, EPG, afp_document, afp_field, count_fields};
use rptx_core::afp::AfpDocument;

#[test]
fn indexes_pages() {
    let stream = afp_document(5);
    let doc = AfpDocument::parse(&stream).unwrap();
    assert_eq!(doc.page_count(), 5);
}

#[test]
fn slice_emits_selected_pages_with_prologue_and_epilogue() {
    let stream = afp_document(5);
    let doc = AfpDocument::parse(&stream).unwrap();
    let sliced = doc.slice(&[2, 3]).unwrap();

    assert_eq!(count_fields(&sliced, BPG), 2);
    assert_eq!(count_fields(&sliced, EPG), 2);
    assert_eq!(count_fields(&sliced, BDT), 1);
    assert_eq!(count_fields(&sliced, EDT), 1);
    // Prologue first, EDT last.
    assert_eq!(sliced[3..6], BDT);
    let last = sliced.len() - 9;
    assert_eq!(sliced[last + 3..last + 6], EDT);
    // Selected page bodies survive; others do not.
    let text = String::from_utf8_lossy(&sliced).into_owned();
    assert!(text.contains("page 2"));
    assert!(text.contains("page 3"));
    assert!(!text.contains("page 4"));
}

#[test]
fn slice_all_reproduces_the_stream() {
    let stream = afp_document(3);
    let doc = AfpDocument::parse(&stream).unwrap();
    let sliced = doc.slice(&[1, 2, 3]).unwrap();
    assert_eq!(sliced, stream);
}

#[test]
fn disjoint_slices_concatenate_to_the_union() {
    let stream = afp_document(4);
    let doc = AfpDocument::parse(&stream).unwrap();
    let first = doc.slice(&[1, 2]).unwrap();
    let second = doc.slice(&[3, 4]).unwrap();
    let union = doc.slice(&[1, 2, 3, 4]).unwrap();
    assert_eq!(
        count_fields(&first, BPG) + count_fields(&second, BPG),
        count_fields(&union, BPG)
    );
}

#[test]
fn pages_keep_selection_order() {
    let stream = afp_document(4);
    let doc = AfpDocument::parse(&stream).unwrap();
    let sliced = doc.slice(&[1, 4]).unwrap();
    let text = String::from_utf8_lossy(&sliced).into_owned();
    let p1 = text.find("page 1").unwrap();
    let p4 = text.find("page 4").unwrap();
    assert!(p1 < p4);
    assert!(!text.contains("page 2"));
}

#[test]
fn stream_without_document_wrapper() {
    let mut stream = Vec::new();
    for i in 0..2 {
        stream.extend(afp_field(BPG, &[i]));
        stream.extend(afp_field(EPG, &[i]));
    }
    let doc = AfpDocument::parse(&stream).unwrap();
    assert_eq!(doc.page_count(), 2);
    let sliced = doc.slice(&[1]).unwrap();
    assert_eq!(count_fields(&sliced, BPG), 1);
}

#[test]
fn truncated_field_rejected() {
    let mut stream = afp_document(1);
    stream.truncate(stream.len() - 3);
    let err = AfpDocument::parse(&stream).unwrap_err();
    assert_eq!(err.exit_code(), 3);
}

#[test]
fn nested_bpg_rejected() {
    let mut stream = afp_field(BPG, b"");
    stream.extend(afp_field(BPG, b""));
    stream.extend(afp_field(EPG, b""));
    assert!(AfpDocument::parse(&stream).is_err());
}

#[test]
fn selection_beyond_stream_is_skipped() {
    let stream = afp_document(2);
    let doc = AfpDocument::parse(&stream).unwrap();
    let sliced = doc.slice(&[1, 7]).unwrap();
    assert_eq!(count_fields(&sliced, BPG), 1);
}

//! PDF parsing, page slicing and serialization.
//!
//! - `object`: the PDF value model
//! - `lexer` / `parser`: document-structure tokenizer and object parser
//! - `document`: xref loading, object resolution, page-tree flattening
//! - `slicer`: re-emit a page subset as a standalone document
//! - `writer`: offset-tracking serializer with automatic xref

pub mod document;
pub mod lexer;
pub mod object;
pub mod parser;
pub mod slicer;
pub mod writer;

pub use document::{PageNode, PdfDocument};
pub use object::{Dict, ObjRef, PdfObject, PdfStream};
pub use slicer::slice_pages;
pub use writer::PdfBuilder;

//! rptx - extraction of Papyrus RPT spool files.
//!
//! An RPT file packages printable report output: compressed text pages
//! grouped into sections, plus an optional embedded PDF or AFP document.
//! This crate decodes the container, evaluates page/section selections,
//! slices the embedded document down to the selected pages, and optionally
//! composites a watermark onto PDF output.

pub mod afp;
pub mod batch;
pub mod codec;
pub mod error;
pub mod export;
pub mod payload;
pub mod pdf;
pub mod rpt;
pub mod selection;
pub mod watermark;

pub use error::{Result, RptError};
pub use export::{Invocation, parse_invocation};
pub use payload::{BinaryPayload, PayloadFormat};
pub use rpt::RptFile;
pub use selection::Selection;

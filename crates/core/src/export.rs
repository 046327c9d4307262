//! Output routing and the single-file extraction pipeline.
//!
//! The command tail after the input path is a small keyword DSL:
//! format keywords (`TXT`, `PDF`, `AFP`, `BIN`, `CSV`) each optionally
//! followed by an explicit path, `OUTPUTFOLDER <path>`, watermark options,
//! and the legacy positional form `<txt> <binary>`. `Export` selects all
//! pages with a default artifact set.

use crate::afp::AfpDocument;
use crate::error::{Result, RptError};
use crate::payload::{BinaryPayload, PayloadFormat};
use crate::pdf::{self, PdfDocument};
use crate::rpt::RptFile;
use crate::selection::Selection;
use crate::watermark::{self, WatermarkPosition, WatermarkSpec};
use bytes::Bytes;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Requested location for one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSpec {
    /// `<outputfolder>/<rpt_stem>.<ext>`
    Default,
    Explicit(PathBuf),
}

/// Which artifacts to emit and where.
#[derive(Debug, Clone, Default)]
pub struct OutputPlan {
    pub txt: Option<PathSpec>,
    pub pdf: Option<PathSpec>,
    pub afp: Option<PathSpec>,
    pub bin: Option<PathSpec>,
    pub csv: Option<PathSpec>,
    /// Export mode: write the binary artifact in whichever format the
    /// payload turns out to carry.
    pub auto_binary: bool,
    pub output_folder: Option<PathBuf>,
}

impl OutputPlan {
    fn wants_binary(&self) -> bool {
        self.auto_binary || self.pdf.is_some() || self.afp.is_some() || self.bin.is_some()
    }
}

/// One parsed invocation: selection plus routed outputs.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub selection: String,
    pub plan: OutputPlan,
    pub watermark: Option<WatermarkSpec>,
}

const FORMAT_KEYWORDS: [&str; 5] = ["txt", "pdf", "afp", "bin", "csv"];
const OPTION_KEYWORDS: [&str; 7] = [
    "outputfolder",
    "export",
    "watermarkimage",
    "watermarkposition",
    "watermarkrotation",
    "watermarkopacity",
    "watermarkscale",
];

fn keyword_of(token: &str) -> Option<String> {
    let bare = token.strip_prefix("--").unwrap_or(token);
    let lower = bare.to_ascii_lowercase();
    (FORMAT_KEYWORDS.contains(&lower.as_str()) || OPTION_KEYWORDS.contains(&lower.as_str()))
        .then_some(lower)
}

type ArgIter<'a> = std::iter::Peekable<std::slice::Iter<'a, String>>;

/// A format keyword may be followed by an explicit path; anything that is
/// itself a keyword starts the next clause instead.
fn take_path(iter: &mut ArgIter<'_>) -> Option<PathSpec> {
    match iter.peek() {
        Some(next) if keyword_of(next).is_none() => {
            Some(PathSpec::Explicit(PathBuf::from(iter.next().expect("peeked"))))
        }
        _ => Some(PathSpec::Default),
    }
}

fn require_value(iter: &mut ArgIter<'_>, what: &str) -> Result<String> {
    iter.next()
        .cloned()
        .ok_or_else(|| RptError::InvalidArguments(format!("{what} requires a value")))
}

/// Parse everything after the input path.
pub fn parse_invocation(args: &[String]) -> Result<Invocation> {
    let Some((selection_token, rest)) = args.split_first() else {
        return Err(RptError::InvalidArguments(
            "missing selection argument".into(),
        ));
    };

    let mut plan = OutputPlan::default();
    let mut watermark: Option<WatermarkSpec> = None;
    let export_mode = selection_token.eq_ignore_ascii_case("export");
    let selection = if export_mode {
        "all".to_string()
    } else {
        selection_token.clone()
    };

    let mut positional: Vec<PathBuf> = Vec::new();
    let mut iter = rest.iter().peekable();
    while let Some(token) = iter.next() {
        let Some(keyword) = keyword_of(token) else {
            positional.push(PathBuf::from(token));
            continue;
        };

        match keyword.as_str() {
            "txt" => plan.txt = take_path(&mut iter),
            "pdf" => plan.pdf = take_path(&mut iter),
            "afp" => plan.afp = take_path(&mut iter),
            "bin" => plan.bin = take_path(&mut iter),
            "csv" => plan.csv = take_path(&mut iter),
            "outputfolder" => {
                plan.output_folder =
                    Some(PathBuf::from(require_value(&mut iter, "OUTPUTFOLDER")?));
            }
            "export" => {
                return Err(RptError::InvalidArguments(
                    "Export must be the selection argument".into(),
                ));
            }
            "watermarkimage" => {
                let path = require_value(&mut iter, "WatermarkImage")?;
                let spec = watermark.get_or_insert_with(|| WatermarkSpec::new(PathBuf::new()));
                spec.image = PathBuf::from(path);
            }
            "watermarkposition" => {
                let name = require_value(&mut iter, "WatermarkPosition")?;
                let position = WatermarkPosition::parse(&name)?;
                watermark
                    .get_or_insert_with(|| WatermarkSpec::new(PathBuf::new()))
                    .position = position;
            }
            "watermarkrotation" => {
                let value = require_value(&mut iter, "WatermarkRotation")?;
                watermark
                    .get_or_insert_with(|| WatermarkSpec::new(PathBuf::new()))
                    .rotation = parse_number(&value, "WatermarkRotation")?;
            }
            "watermarkopacity" => {
                let value = require_value(&mut iter, "WatermarkOpacity")?;
                watermark
                    .get_or_insert_with(|| WatermarkSpec::new(PathBuf::new()))
                    .opacity = parse_number(&value, "WatermarkOpacity")?;
            }
            "watermarkscale" => {
                let value = require_value(&mut iter, "WatermarkScale")?;
                watermark
                    .get_or_insert_with(|| WatermarkSpec::new(PathBuf::new()))
                    .scale = parse_number(&value, "WatermarkScale")?;
            }
            _ => unreachable!("keyword_of admits only known keywords"),
        }
    }

    // Legacy positional form: exactly <out_txt> <out_binary>.
    if !positional.is_empty() {
        let keywords_used = plan.txt.is_some()
            || plan.pdf.is_some()
            || plan.afp.is_some()
            || plan.bin.is_some()
            || plan.csv.is_some();
        if keywords_used || positional.len() != 2 {
            return Err(RptError::InvalidArguments(format!(
                "unexpected argument {:?}",
                positional[0]
            )));
        }
        let binary = positional.pop().expect("len checked");
        let txt = positional.pop().expect("len checked");
        plan.txt = Some(PathSpec::Explicit(txt));
        plan.bin = Some(PathSpec::Explicit(binary));
    }

    if export_mode
        && plan.txt.is_none()
        && plan.pdf.is_none()
        && plan.afp.is_none()
        && plan.bin.is_none()
        && plan.csv.is_none()
    {
        plan.txt = Some(PathSpec::Default);
        plan.csv = Some(PathSpec::Default);
        plan.auto_binary = true;
    }

    if let Some(spec) = &watermark {
        if spec.image.as_os_str().is_empty() {
            return Err(RptError::InvalidArguments(
                "watermark options given without WatermarkImage".into(),
            ));
        }
        spec.validate()?;
    }

    if plan.txt.is_none()
        && plan.pdf.is_none()
        && plan.afp.is_none()
        && plan.bin.is_none()
        && plan.csv.is_none()
        && !plan.auto_binary
    {
        return Err(RptError::InvalidArguments("no outputs requested".into()));
    }

    Ok(Invocation {
        selection,
        plan,
        watermark,
    })
}

fn parse_number(text: &str, what: &str) -> Result<f64> {
    text.parse()
        .map_err(|_| RptError::InvalidArguments(format!("{what}: not a number: {text:?}")))
}

/// One written artifact: its path and a format description.
#[derive(Debug)]
pub struct Artifact {
    pub path: PathBuf,
    pub format: &'static str,
}

/// Outcome of one file's extraction.
#[derive(Debug)]
pub struct ExportSummary {
    pub pages: usize,
    pub artifacts: Vec<Artifact>,
    pub notes: Vec<String>,
}

impl ExportSummary {
    /// Print the user-visible report for a successful run.
    pub fn report(&self) {
        for note in &self.notes {
            println!("NOTE: {note}");
        }
        println!("SUCCESS: Extracted {} pages", self.pages);
        for artifact in &self.artifacts {
            println!("  {} ({})", artifact.path.display(), artifact.format);
        }
    }
}

/// Run the whole pipeline for one RPT file, reading it from disk.
pub fn export_file(input: &Path, invocation: &Invocation) -> Result<ExportSummary> {
    if !input.exists() {
        return Err(RptError::FileNotFound(input.to_path_buf()));
    }
    let data = fs::read(input).map_err(RptError::Read)?;
    export_bytes(input, Bytes::from(data), invocation)
}

/// Run the pipeline against bytes already in memory (or memory-mapped).
///
/// `input` only contributes the output stem and default folder.
pub fn export_bytes(input: &Path, data: Bytes, invocation: &Invocation) -> Result<ExportSummary> {
    let rpt = RptFile::parse(data)?;
    let selection = Selection::evaluate(&invocation.selection, rpt.page_count(), &rpt.sections)?;
    info!(
        input = %input.display(),
        pages = selection.len(),
        "selection evaluated"
    );

    let folder = invocation
        .plan
        .output_folder
        .clone()
        .unwrap_or_else(|| input.parent().unwrap_or(Path::new(".")).join("EXPORT"));
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let resolve = |spec: &PathSpec, ext: &str| -> PathBuf {
        match spec {
            PathSpec::Explicit(path) => path.clone(),
            PathSpec::Default => folder.join(format!("{stem}.{ext}")),
        }
    };

    let mut summary = ExportSummary {
        pages: selection.len(),
        artifacts: Vec::new(),
        notes: Vec::new(),
    };

    if let Some(spec) = &invocation.plan.txt {
        let path = resolve(spec, "txt");
        let text = rpt.render_text(selection.pages())?;
        write_artifact(&path, &text)?;
        summary.artifacts.push(Artifact {
            path,
            format: "plain text",
        });
    }

    if let Some(spec) = &invocation.plan.csv {
        let path = resolve(spec, "csv");
        write_artifact(&path, section_csv(&rpt).as_bytes())?;
        summary.artifacts.push(Artifact {
            path,
            format: "section CSV",
        });
    }

    if invocation.plan.wants_binary() {
        match BinaryPayload::materialize(&rpt)? {
            None => summary
                .notes
                .push("no binary objects in file; binary output skipped".into()),
            Some(payload) => {
                export_binary(&rpt, &payload, &selection, invocation, &resolve, &mut summary)?;
            }
        }
    }

    Ok(summary)
}

/// Route the materialized payload to the matching requested artifact.
fn export_binary(
    rpt: &RptFile,
    payload: &BinaryPayload,
    selection: &Selection,
    invocation: &Invocation,
    resolve: &impl Fn(&PathSpec, &str) -> PathBuf,
    summary: &mut ExportSummary,
) -> Result<()> {
    let plan = &invocation.plan;
    let ext = payload.format.extension();

    // Format precedence: the keyword matching the detected payload wins;
    // BIN accepts anything; a mismatched keyword alone writes nothing.
    let auto = plan.auto_binary.then_some(PathSpec::Default);
    let target = match payload.format {
        PayloadFormat::Pdf => plan.pdf.clone().or_else(|| plan.bin.clone()).or(auto),
        PayloadFormat::Afp => plan.afp.clone().or_else(|| plan.bin.clone()).or(auto),
        PayloadFormat::Unknown => plan.bin.clone(),
    };
    let Some(spec) = target else {
        summary.notes.push(format!(
            "payload is {} but no matching output was requested",
            payload.format.describe()
        ));
        return Ok(());
    };
    let path = resolve(&spec, ext);

    match payload.format {
        PayloadFormat::Pdf => {
            let doc = PdfDocument::parse(payload.data.clone())?;
            let mut builder =
                pdf::slice_pages(&doc, selection.pages(), Some(rpt.page_count()))?;
            if let Some(spec) = &invocation.watermark {
                watermark::apply_watermark(&mut builder, spec)?;
            }
            create_parents(&path)?;
            let file = fs::File::create(&path).map_err(|source| RptError::Write {
                path: path.clone(),
                source,
            })?;
            builder.write_to(std::io::BufWriter::new(file), &path)?;
        }
        PayloadFormat::Afp => {
            let doc = AfpDocument::parse(&payload.data)?;
            if doc.page_count() != rpt.page_count() as usize {
                debug!(
                    declared = rpt.page_count(),
                    actual = doc.page_count(),
                    "RPT page count disagrees with AFP stream"
                );
            }
            if invocation.watermark.is_some() {
                summary
                    .notes
                    .push("watermarking is not applied to AFP output".into());
            }
            let sliced = doc.slice(selection.pages())?;
            write_artifact(&path, &sliced)?;
        }
        PayloadFormat::Unknown => {
            summary
                .notes
                .push("payload format not recognized; writing raw bytes".into());
            write_artifact(&path, &payload.data)?;
        }
    }

    summary.artifacts.push(Artifact {
        path,
        format: payload.format.describe(),
    });
    Ok(())
}

/// CSV of the source file's section table (not filtered by selection).
fn section_csv(rpt: &RptFile) -> String {
    let mut out = String::from("SPECIES_ID,SECTION_ID,START_PAGE,PAGES\n");
    for section in &rpt.sections {
        out.push_str(&format!(
            "{},{},{},{}\n",
            rpt.header.species_id, section.section_id, section.start_page, section.page_count
        ));
    }
    out
}

fn create_parents(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| RptError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

fn write_artifact(path: &Path, data: &[u8]) -> Result<()> {
    create_parents(path)?;
    let mut file = fs::File::create(path).map_err(|source| RptError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    file.write_all(data).map_err(|source| RptError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn legacy_positional_form() {
        let inv = parse_invocation(&args(&["1-3", "out.txt", "out.pdf"])).unwrap();
        assert_eq!(inv.selection, "1-3");
        assert_eq!(
            inv.plan.txt,
            Some(PathSpec::Explicit(PathBuf::from("out.txt")))
        );
        assert_eq!(
            inv.plan.bin,
            Some(PathSpec::Explicit(PathBuf::from("out.pdf")))
        );
    }

    #[test]
    fn export_defaults() {
        let inv = parse_invocation(&args(&["Export"])).unwrap();
        assert_eq!(inv.selection, "all");
        assert_eq!(inv.plan.txt, Some(PathSpec::Default));
        assert_eq!(inv.plan.csv, Some(PathSpec::Default));
        assert!(inv.plan.auto_binary);
    }

    #[test]
    fn export_with_explicit_keywords_overrides_defaults() {
        let inv = parse_invocation(&args(&["Export", "PDF", "only.pdf"])).unwrap();
        assert_eq!(inv.selection, "all");
        assert!(!inv.plan.auto_binary);
        assert!(inv.plan.txt.is_none());
        assert_eq!(
            inv.plan.pdf,
            Some(PathSpec::Explicit(PathBuf::from("only.pdf")))
        );
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let inv = parse_invocation(&args(&["all", "txt", "Pdf", "OUTPUTFOLDER", "/tmp/out"])).unwrap();
        assert_eq!(inv.plan.txt, Some(PathSpec::Default));
        assert_eq!(inv.plan.pdf, Some(PathSpec::Default));
        assert_eq!(inv.plan.output_folder, Some(PathBuf::from("/tmp/out")));
    }

    #[test]
    fn watermark_options_with_optional_dashes() {
        let inv = parse_invocation(&args(&[
            "all",
            "PDF",
            "--WatermarkImage",
            "wm.png",
            "WatermarkOpacity",
            "50",
            "WatermarkScale",
            "0.5",
        ]))
        .unwrap();
        let wm = inv.watermark.unwrap();
        assert_eq!(wm.image, PathBuf::from("wm.png"));
        assert_eq!(wm.opacity, 50.0);
        assert_eq!(wm.scale, 0.5);
    }

    #[test]
    fn watermark_without_image_rejected() {
        let err = parse_invocation(&args(&["all", "PDF", "WatermarkOpacity", "50"])).unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn mixed_legacy_and_keywords_rejected() {
        assert!(parse_invocation(&args(&["all", "TXT", "stray.txt", "extra.bin"])).is_err());
    }
}

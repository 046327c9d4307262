//! rptx - extract text, embedded documents and section metadata from
//! Papyrus RPT spool files.
//!
//! Single file:
//!   rptx report.RPT all out.txt out.pdf
//!   rptx report.RPT pages:2-5 TXT PDF OUTPUTFOLDER /tmp/out
//!   rptx report.RPT Export WatermarkImage wm.png WatermarkPosition BottomRight
//!
//! Batch over a directory:
//!   rptx /spool/reports Export

use clap::{ArgAction, Parser};
use memmap2::Mmap;
use rptx_core::error::{Result, RptError};
use rptx_core::{batch, export};
use std::fs::File;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Extract pages from Papyrus RPT spool files.
#[derive(Parser, Debug)]
#[command(name = "rptx")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// RPT file, or a directory of RPT files for batch export
    input: PathBuf,

    /// Use debug logging level
    #[arg(short = 'd', long, action = ArgAction::SetTrue)]
    debug: bool,

    /// Selection followed by output keywords:
    /// <selection|Export> [TXT|PDF|AFP|BIN|CSV [path]]... [OUTPUTFOLDER p]
    /// [WatermarkImage p] [WatermarkPosition name] [WatermarkRotation deg]
    /// [WatermarkOpacity pct] [WatermarkScale f]
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    rest: Vec<String>,
}

fn main() {
    let args = Args::parse();
    init_logging(args.debug);

    match run(&args) {
        Ok(()) => {}
        Err(error) => {
            eprintln!("ERROR: {error}");
            std::process::exit(error.exit_code());
        }
    }
}

fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: &Args) -> Result<()> {
    let invocation = export::parse_invocation(&args.rest)?;

    if args.input.is_dir() {
        if !args.rest[0].eq_ignore_ascii_case("export") {
            return Err(RptError::InvalidArguments(
                "directory input requires the Export keyword".into(),
            ));
        }
        let summary = batch::run_batch(&args.input, &invocation)?;
        summary.report();
        return Ok(());
    }

    if !args.input.exists() {
        return Err(RptError::FileNotFound(args.input.clone()));
    }

    // Map the file instead of reading it; spool files can be large and the
    // descriptors only touch the ranges they need.
    let file = File::open(&args.input).map_err(RptError::Read)?;
    let mmap = unsafe { Mmap::map(&file) }.map_err(RptError::Read)?;
    let data = bytes::Bytes::from_owner(mmap);

    let summary = export::export_bytes(&args.input, data, &invocation)?;
    summary.report();
    Ok(())
}

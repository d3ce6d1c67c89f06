//! Batch processing command for multiple receipt files.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::Args;
use console::style;
use futures_util::stream::{self, StreamExt};
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, warn};

use rcpt_core::{BackendPolicy, Document, OcrResult, ProcessingOptions, ReceiptPipeline};

use super::process::{csv_row, format_result, OutputFormat};
use crate::settings::{build_pipeline, load_config, resolve_model_dir};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Input files or glob pattern
    #[arg(required = true)]
    input: String,

    /// Output directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output format for each file
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Recognition backend policy: local, remote or auto
    #[arg(short, long)]
    policy: Option<BackendPolicy>,

    /// Skip structured extraction
    #[arg(long)]
    no_structure: bool,

    /// Also generate a summary CSV
    #[arg(long)]
    summary: bool,

    /// Number of files processed concurrently
    #[arg(short = 'j', long, default_value = "4")]
    jobs: usize,

    /// Continue on error
    #[arg(long)]
    continue_on_error: bool,

    /// Model directory
    #[arg(short, long)]
    model_dir: Option<PathBuf>,
}

/// Result of processing a single file.
struct FileOutcome {
    path: PathBuf,
    result: Result<OcrResult, String>,
    elapsed_ms: u64,
}

const SUPPORTED_EXTENSIONS: [&str; 8] = ["pdf", "png", "jpg", "jpeg", "tif", "tiff", "bmp", "gif"];

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut config = load_config(config_path)?;
    resolve_model_dir(&mut config, args.model_dir.clone());

    let mut options = ProcessingOptions::from(&config.pipeline);
    if let Some(policy) = args.policy {
        options.policy = policy;
    }
    if args.no_structure {
        options.extract_structured = false;
    }

    let files: Vec<PathBuf> = glob(&args.input)?
        .filter_map(|r| r.ok())
        .filter(|p| is_supported(p))
        .collect();

    if files.is_empty() {
        anyhow::bail!("No matching files found for pattern: {}", args.input);
    }

    println!(
        "{} Found {} files to process",
        style("ℹ").blue(),
        files.len()
    );

    if let Some(ref output_dir) = args.output_dir {
        fs::create_dir_all(output_dir)?;
    }

    let pipeline = Arc::new(build_pipeline(&config)?);

    let overall_pb = ProgressBar::new(files.len() as u64);
    overall_pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files",
        )?
        .progress_chars("=>-"),
    );

    let mut pending = stream::iter(files)
        .map(|path| process_file(Arc::clone(&pipeline), path, options))
        .buffer_unordered(args.jobs.max(1));

    let mut outcomes = Vec::new();
    while let Some(outcome) = pending.next().await {
        overall_pb.inc(1);

        match &outcome.result {
            Ok(result) => {
                if let Some(output_dir) = &args.output_dir {
                    write_output(output_dir, &outcome.path, result, args.format)?;
                }
            }
            Err(e) if args.continue_on_error => {
                warn!("Failed to process {}: {}", outcome.path.display(), e);
            }
            Err(e) => {
                overall_pb.abandon();
                error!("Failed to process {}: {}", outcome.path.display(), e);
                anyhow::bail!("Processing failed for {}: {}", outcome.path.display(), e);
            }
        }

        outcomes.push(outcome);
    }

    overall_pb.finish_and_clear();

    // Completion order is arbitrary; report in input order
    outcomes.sort_by(|a, b| a.path.cmp(&b.path));

    if args.summary {
        let summary_path = args
            .output_dir
            .as_ref()
            .map(|d| d.join("summary.csv"))
            .unwrap_or_else(|| PathBuf::from("summary.csv"));

        write_summary(&summary_path, &outcomes)?;
        println!(
            "{} Summary written to {}",
            style("✓").green(),
            summary_path.display()
        );
    }

    let failed: Vec<&FileOutcome> = outcomes.iter().filter(|o| o.result.is_err()).collect();

    println!();
    println!(
        "{} Processed {} files in {:?}",
        style("✓").green(),
        outcomes.len(),
        start.elapsed()
    );
    println!(
        "   {} successful, {} failed",
        style(outcomes.len() - failed.len()).green(),
        style(failed.len()).red()
    );

    if !failed.is_empty() {
        println!();
        println!("{}", style("Failed files:").red());
        for outcome in &failed {
            if let Err(e) = &outcome.result {
                println!("  - {}: {}", outcome.path.display(), e);
            }
        }
    }

    Ok(())
}

async fn process_file(
    pipeline: Arc<ReceiptPipeline>,
    path: PathBuf,
    options: ProcessingOptions,
) -> FileOutcome {
    let start = Instant::now();
    let document = Document::from_path(path.clone());

    let result = pipeline
        .process(&document, options)
        .await
        .map_err(|e| e.to_string());

    FileOutcome {
        path,
        result,
        elapsed_ms: start.elapsed().as_millis() as u64,
    }
}

fn is_supported(path: &Path) -> bool {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    SUPPORTED_EXTENSIONS.contains(&ext.as_str())
}

fn write_output(
    output_dir: &Path,
    input: &Path,
    result: &OcrResult,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let output_name = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("receipt");

    let output_path = output_dir.join(format!("{}.{}", output_name, format.extension()));
    fs::write(&output_path, format_result(result, format)?)?;

    debug!("Wrote output to {}", output_path.display());
    Ok(())
}

fn write_summary(path: &Path, outcomes: &[FileOutcome]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "filename",
        "status",
        "backend",
        "confidence",
        "processing_time_ms",
        "vendor_name",
        "invoice_number",
        "date",
        "total_amount",
        "tax_amount",
        "subtotal",
        "currency",
        "item_count",
        "text",
        "elapsed_ms",
        "error",
    ])?;

    for outcome in outcomes {
        let filename = outcome
            .path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_string();

        let mut record = vec![filename];
        match &outcome.result {
            Ok(result) => {
                record.push("success".to_string());
                record.extend(csv_row(result));
                record.push(outcome.elapsed_ms.to_string());
                record.push(String::new());
            }
            Err(e) => {
                record.push("error".to_string());
                record.extend(std::iter::repeat_n(String::new(), 12));
                record.push(outcome.elapsed_ms.to_string());
                record.push(e.clone());
            }
        }
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}

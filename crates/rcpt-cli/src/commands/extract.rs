//! Extract-text command - recognition only.

use std::fs;
use std::path::PathBuf;

use clap::Args;
use console::style;
use tracing::info;

use rcpt_core::{normalize, BackendPolicy, Document};

use crate::settings::{build_pipeline, load_config, resolve_model_dir};

/// Arguments for the extract-text command.
#[derive(Args)]
pub struct ExtractArgs {
    /// Input file (PDF or image)
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Recognition backend policy: local, remote or auto
    #[arg(short, long)]
    policy: Option<BackendPolicy>,

    /// Print the cleaned text instead of the raw text
    #[arg(long)]
    clean: bool,

    /// Print the full recognition outcome as JSON
    #[arg(long)]
    json: bool,

    /// Model directory
    #[arg(short, long)]
    model_dir: Option<PathBuf>,
}

pub async fn run(args: ExtractArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    resolve_model_dir(&mut config, args.model_dir.clone());

    let policy = args.policy.unwrap_or(config.pipeline.policy);
    let pipeline = build_pipeline(&config)?;
    let document = Document::from_path(args.input.clone());

    info!("Extracting text from {} ({} policy)", args.input.display(), policy);

    let pb = super::spinner(format!("Recognizing {}...", document.file_name()))?;
    let outcome = pipeline.extract_text(&document, policy).await;
    pb.finish_and_clear();
    let outcome = outcome?;

    let processed = args.clean.then(|| normalize(&outcome.raw_text));

    let output = if args.json {
        serde_json::to_string_pretty(&serde_json::json!({
            "rawText": outcome.raw_text,
            "processedText": processed,
            "confidence": outcome.confidence,
            "processingTimeMs": outcome.elapsed_ms,
            "backend": outcome.backend,
        }))?
    } else {
        processed.unwrap_or(outcome.raw_text)
    };

    match &args.output {
        Some(output_path) => {
            fs::write(output_path, &output)?;
            println!(
                "{} Output written to {}",
                style("✓").green(),
                output_path.display()
            );
        }
        None => println!("{}", output),
    }

    Ok(())
}

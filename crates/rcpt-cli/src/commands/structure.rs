//! Structure command - extract receipt fields from recognized text.

use std::fs;
use std::io::Read;
use std::path::PathBuf;

use clap::Args;
use console::style;

use rcpt_core::normalize;

use super::process::format_receipt;
use crate::settings::{build_pipeline, load_config};

/// Arguments for the structure command.
#[derive(Args)]
pub struct StructureArgs {
    /// Text file to read (default: stdin)
    input: Option<PathBuf>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Send the text as is instead of cleaning it first
    #[arg(long)]
    raw: bool,

    /// Print a plain text summary instead of JSON
    #[arg(long)]
    text: bool,
}

pub async fn run(args: StructureArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    let input = match &args.input {
        Some(path) if path.as_os_str() != "-" => fs::read_to_string(path)?,
        _ => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    let text = if args.raw { input } else { normalize(&input) };
    if text.trim().is_empty() {
        anyhow::bail!("No text to structure");
    }

    let pipeline = build_pipeline(&config)?;
    let pb = super::spinner("Extracting fields...")?;
    let receipt = pipeline.extract_structured(&text).await;
    pb.finish_and_clear();
    let receipt = receipt?;

    let output = if args.text {
        format_receipt(&receipt)
    } else {
        serde_json::to_string_pretty(&receipt)?
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

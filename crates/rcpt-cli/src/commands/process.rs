//! Process command - recognize, clean and structure a single receipt.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use clap::Args;
use console::style;
use tracing::{debug, info};

use rcpt_core::{BackendPolicy, Document, OcrResult, ProcessingOptions, StructuredReceipt};

use crate::settings::{build_pipeline, load_config, resolve_model_dir};

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Input file (PDF or image)
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Recognition backend policy: local, remote or auto
    #[arg(short, long)]
    policy: Option<BackendPolicy>,

    /// Skip structured extraction
    #[arg(long)]
    no_structure: bool,

    /// Keep the recognized text as is (no cleaning)
    #[arg(long)]
    raw: bool,

    /// Model directory
    #[arg(short, long)]
    model_dir: Option<PathBuf>,

    /// Show recognition confidence and timing
    #[arg(long)]
    show_confidence: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// CSV output
    Csv,
    /// Plain text summary
    Text,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Text => "txt",
        }
    }
}

pub async fn run(args: ProcessArgs, config_path: Option<&str>) -> anyhow::Result<()> {
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
    if args.raw {
        options.clean_text = false;
    }

    let pipeline = build_pipeline(&config)?;
    let document = Document::from_path(args.input.clone());

    info!("Processing file: {}", args.input.display());

    let pb = super::spinner(format!("Recognizing {}...", document.file_name()))?;
    let result = pipeline.process(&document, options).await;
    pb.finish_and_clear();
    let result = result?;

    let output = format_result(&result, args.format)?;

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        println!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    if args.show_confidence {
        eprintln!();
        match result.confidence {
            Some(confidence) => eprintln!(
                "{} Recognition confidence: {:.1}%",
                style("ℹ").blue(),
                confidence
            ),
            None => eprintln!(
                "{} Recognition confidence: not reported by {} backend",
                style("ℹ").blue(),
                result.backend
            ),
        }
        eprintln!(
            "{} Recognition time: {}ms ({} backend)",
            style("ℹ").blue(),
            result.processing_time_ms,
            result.backend
        );
    }

    debug!("Total processing time: {:?}", start.elapsed());

    Ok(())
}

pub fn format_result(result: &OcrResult, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(result)?),
        OutputFormat::Csv => format_csv(result),
        OutputFormat::Text => Ok(format_text(result)),
    }
}

const CSV_HEADER: [&str; 12] = [
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
];

fn format_csv(result: &OcrResult) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(CSV_HEADER)?;
    wtr.write_record(csv_row(result))?;

    let data = String::from_utf8(wtr.into_inner()?)?;
    Ok(data)
}

/// One CSV row matching [`CSV_HEADER`].
pub fn csv_row(result: &OcrResult) -> Vec<String> {
    let receipt = result.extracted_data.clone().unwrap_or_default();
    let opt = |v: Option<String>| v.unwrap_or_default();

    vec![
        result.backend.to_string(),
        result
            .confidence
            .map(|c| format!("{:.1}", c))
            .unwrap_or_default(),
        result.processing_time_ms.to_string(),
        opt(receipt.vendor_name),
        opt(receipt.invoice_number),
        opt(receipt.date.map(|d| d.to_string())),
        opt(receipt.total_amount.map(|d| d.to_string())),
        opt(receipt.tax_amount.map(|d| d.to_string())),
        opt(receipt.subtotal.map(|d| d.to_string())),
        opt(receipt.currency),
        receipt.items.map(|i| i.len()).unwrap_or(0).to_string(),
        result.text().to_string(),
    ]
}

fn format_text(result: &OcrResult) -> String {
    let mut output = String::new();

    output.push_str(result.text());
    output.push('\n');

    if let Some(receipt) = &result.extracted_data {
        output.push('\n');
        output.push_str(&format_receipt(receipt));
    }

    output
}

pub fn format_receipt(receipt: &StructuredReceipt) -> String {
    let mut output = String::new();
    let currency = receipt.currency.as_deref().unwrap_or("");

    if let Some(vendor) = &receipt.vendor_name {
        output.push_str(&format!("Vendor:  {}\n", vendor));
    }
    if let Some(number) = &receipt.invoice_number {
        output.push_str(&format!("Invoice: {}\n", number));
    }
    if let Some(date) = receipt.date {
        output.push_str(&format!("Date:    {}\n", date));
    }

    if !receipt.line_items().is_empty() {
        output.push_str("\nItems:\n");
        for item in receipt.line_items() {
            let quantity = item.quantity.map(|q| format!("{} x ", q)).unwrap_or_default();
            let price = item.price.map(|p| p.to_string()).unwrap_or_default();
            output.push_str(&format!("  {:<30} {}{}\n", item.name, quantity, price));
        }
        output.push('\n');
    }

    if let Some(subtotal) = receipt.subtotal {
        output.push_str(&format!("Subtotal: {} {}\n", subtotal, currency));
    }
    if let Some(tax) = receipt.tax_amount {
        output.push_str(&format!("Tax:      {} {}\n", tax, currency));
    }
    if let Some(total) = receipt.total_amount {
        output.push_str(&format!("Total:    {} {}\n", total, currency));
    }

    output
}

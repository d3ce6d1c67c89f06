//! Models command - fetch and select the on-device recognition models.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Args, Subcommand, ValueEnum};
use console::style;
use futures_util::StreamExt;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use rcpt_core::models::config::ModelConfig;

/// Arguments for the models command.
#[derive(Args)]
pub struct ModelsArgs {
    #[command(subcommand)]
    command: ModelsCommand,
}

#[derive(Subcommand)]
enum ModelsCommand {
    /// List model variants and their files
    List,

    /// Download a model variant
    Download {
        #[arg(short, long, value_enum, default_value = "mobile")]
        variant: ModelVariant,

        /// Download into this directory instead of the data directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Fetch files again even if they look complete
        #[arg(long)]
        force: bool,
    },

    /// Show which variants are present on disk
    Status {
        #[arg(short, long, value_enum)]
        variant: Option<ModelVariant>,
    },

    /// Delete downloaded model files
    Clean {
        #[arg(short, long, value_enum)]
        variant: Option<ModelVariant>,

        /// Delete every variant
        #[arg(long)]
        all: bool,
    },

    /// Make a downloaded variant the default model directory
    Use {
        #[arg(value_enum)]
        variant: ModelVariant,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModelVariant {
    /// Small detection model (~12MB total)
    Mobile,
    /// Larger detection model, better on dense receipts (~92MB total)
    Server,
}

const VARIANTS: [ModelVariant; 2] = [ModelVariant::Mobile, ModelVariant::Server];

const MODEL_BASE_URL: &str = "https://github.com/jakubmatias/incr/raw/main/models";

impl std::fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelVariant::Mobile => write!(f, "mobile"),
            ModelVariant::Server => write!(f, "server"),
        }
    }
}

impl ModelVariant {
    /// Model configuration pointing at this variant's download directory.
    fn config(self) -> ModelConfig {
        ModelConfig {
            model_dir: get_variant_dir(self),
            ..ModelConfig::default()
        }
    }

    /// Files of this variant with their approximate sizes.
    fn files(self) -> [VariantFile; 3] {
        let models = ModelConfig::default();
        let detection_bytes = match self {
            ModelVariant::Mobile => 4_500_000,
            ModelVariant::Server => 84_000_000,
        };

        [
            VariantFile::new(models.detection_model, detection_bytes, "text detection"),
            VariantFile::new(models.recognition_model, 7_500_000, "Latin recognition (English, Vietnamese)"),
            VariantFile::new(models.dictionary, 2_000, "Latin character dictionary"),
        ]
    }

    fn download_url(self, file: &VariantFile) -> String {
        format!("{}/{}/{}", MODEL_BASE_URL, self, file.name)
    }
}

/// One file of a model variant.
struct VariantFile {
    name: String,
    expected_bytes: u64,
    description: &'static str,
}

impl VariantFile {
    fn new(name: String, expected_bytes: u64, description: &'static str) -> Self {
        Self {
            name,
            expected_bytes,
            description,
        }
    }

    /// Size on disk if the file exists and is at least half the expected size.
    fn present_size(&self, dir: &Path) -> Option<u64> {
        let size = fs::metadata(dir.join(&self.name)).ok()?.len();
        (size > self.expected_bytes / 2).then_some(size)
    }
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rcpt")
}

/// Download directory of a variant: `<data dir>/rcpt/models/<variant>`.
pub fn get_variant_dir(variant: ModelVariant) -> PathBuf {
    data_dir().join("models").join(variant.to_string())
}

/// Variant selected with `rcpt models use`, mobile by default.
pub fn get_active_variant() -> ModelVariant {
    match fs::read_to_string(data_dir().join("active_variant")) {
        Ok(content) if content.trim() == "server" => ModelVariant::Server,
        _ => ModelVariant::Mobile,
    }
}

pub async fn run(args: ModelsArgs) -> anyhow::Result<()> {
    match args.command {
        ModelsCommand::List => {
            list_variants();
            Ok(())
        }
        ModelsCommand::Download {
            variant,
            output,
            force,
        } => download(variant, output, force).await,
        ModelsCommand::Status { variant } => {
            let variants = variant.map(|v| vec![v]).unwrap_or_else(|| VARIANTS.to_vec());
            print_status(&variants);
            Ok(())
        }
        ModelsCommand::Clean { variant, all } => clean(variant, all),
        ModelsCommand::Use { variant } => use_variant(variant),
    }
}

fn list_variants() {
    let active = get_active_variant();

    for variant in VARIANTS {
        let files = variant.files();
        let total: u64 = files.iter().map(|f| f.expected_bytes).sum();
        let marker = if variant == active { " (active)" } else { "" };

        println!(
            "{} {}{}",
            style(format!("▸ {}", variant)).bold().cyan(),
            format_size(total),
            style(marker).green()
        );
        for file in &files {
            println!(
                "    {:<20} {:>10}  {}",
                file.name,
                format_size(file.expected_bytes),
                file.description
            );
        }
        println!();
    }
}

fn use_variant(variant: ModelVariant) -> anyhow::Result<()> {
    if !variant.config().is_complete() {
        anyhow::bail!(
            "{} models are not downloaded; run 'rcpt models download -v {}'",
            variant,
            variant
        );
    }

    fs::create_dir_all(data_dir())?;
    fs::write(data_dir().join("active_variant"), variant.to_string())?;
    println!("{} Using {} models", style("✓").green(), style(variant).cyan().bold());
    Ok(())
}

async fn download(variant: ModelVariant, output: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let dir = output.unwrap_or_else(|| get_variant_dir(variant));
    fs::create_dir_all(&dir)?;

    let client = reqwest::Client::builder()
        .user_agent(concat!("rcpt-cli/", env!("CARGO_PKG_VERSION")))
        .timeout(std::time::Duration::from_secs(300))
        .build()?;

    let pending: Vec<VariantFile> = variant
        .files()
        .into_iter()
        .filter(|file| force || file.present_size(&dir).is_none())
        .collect();

    if pending.is_empty() {
        println!("{} {} models already present in {}", style("✓").green(), variant, dir.display());
        return Ok(());
    }

    println!(
        "{} Fetching {} {} file(s) into {}",
        style("ℹ").blue(),
        pending.len(),
        variant,
        dir.display()
    );

    let bars = MultiProgress::new();
    let bar_style = ProgressStyle::with_template("  {msg:<20} [{bar:25.cyan/blue}] {bytes}/{total_bytes}")?
        .progress_chars("=>-");

    let mut failures = Vec::new();
    for file in &pending {
        let bar = bars.add(ProgressBar::new(file.expected_bytes));
        bar.set_style(bar_style.clone());
        bar.set_message(file.name.clone());

        let target = dir.join(&file.name);
        match fetch(&client, &variant.download_url(file), &target, &bar).await {
            Ok(()) => bar.finish(),
            Err(e) => {
                bar.abandon();
                failures.push(format!("{}: {}", file.name, e));
            }
        }
    }

    if !failures.is_empty() {
        anyhow::bail!(
            "{} of {} downloads failed ({}); retry with --force",
            failures.len(),
            pending.len(),
            failures.join("; ")
        );
    }

    println!("{} {} models ready", style("✓").green().bold(), variant);
    if get_active_variant() != variant {
        println!("   Switch to them with: rcpt models use {}", variant);
    }
    Ok(())
}

/// Stream `url` into `target`, renaming from a `.tmp` file once complete.
async fn fetch(client: &reqwest::Client, url: &str, target: &Path, bar: &ProgressBar) -> anyhow::Result<()> {
    let response = client.get(url).send().await?.error_for_status()?;
    if let Some(length) = response.content_length() {
        bar.set_length(length);
    }

    let partial = target.with_extension("tmp");
    let mut out = fs::File::create(&partial)?;
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        out.write_all(&chunk)?;
        bar.inc(chunk.len() as u64);
    }
    out.flush()?;
    drop(out);

    fs::rename(&partial, target)?;
    Ok(())
}

fn print_status(variants: &[ModelVariant]) {
    let active = get_active_variant();

    for &variant in variants {
        let models = variant.config();
        let marker = if variant == active { " ◀ active" } else { "" };
        println!(
            "{} {}{}",
            style(format!("▸ {}", variant)).bold(),
            models.model_dir.display(),
            style(marker).green()
        );

        for file in variant.files() {
            let state = match file.present_size(&models.model_dir) {
                Some(size) => style(format_size(size)).green(),
                None if models.model_dir.join(&file.name).exists() => style("incomplete".to_string()).yellow(),
                None => style("missing".to_string()).red(),
            };
            println!("    {:<20} {}", file.name, state);
        }

        if models.is_complete() {
            println!("    {}", style("ready").green());
        } else {
            println!("    run 'rcpt models download -v {}'", variant);
        }
        println!();
    }
}

fn clean(variant: Option<ModelVariant>, all: bool) -> anyhow::Result<()> {
    let variants = match (variant, all) {
        (_, true) => VARIANTS.to_vec(),
        (Some(v), false) => vec![v],
        (None, false) => anyhow::bail!("Pass --all or -v <variant>"),
    };

    let mut freed = 0u64;
    let mut removed = 0usize;
    for variant in variants {
        let dir = get_variant_dir(variant);
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };

        let known: Vec<String> = variant.files().into_iter().map(|f| f.name).collect();
        for entry in entries.flatten() {
            let path = entry.path();
            let is_model = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| known.iter().any(|k| k == n));
            let is_partial = path.extension().is_some_and(|e| e == "tmp");

            if is_model || is_partial {
                freed += entry.metadata().map(|m| m.len()).unwrap_or(0);
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
    }

    println!(
        "{} Removed {} file(s), freed {}",
        style("✓").green(),
        removed,
        format_size(freed)
    );
    Ok(())
}

fn format_size(bytes: u64) -> String {
    match bytes {
        b if b >= 1_000_000_000 => format!("{:.1}GB", b as f64 / 1e9),
        b if b >= 1_000_000 => format!("{:.1}MB", b as f64 / 1e6),
        b if b >= 1_000 => format!("{:.1}KB", b as f64 / 1e3),
        b => format!("{}B", b),
    }
}

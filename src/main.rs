//! tradeextract CLI
//! ----------------
//! `extract`: broker chat message files -> `{timestamp, llm_structured}` files via an
//! OpenAI-compatible chat-completions endpoint, in positional batches.
//! `dedupe`: pool extractor output files and keep one record per trade fingerprint.
//!
//! Console logging follows `RUST_LOG` (default `info`).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tradeextract::service::DEFAULT_BASE_URL;
use tradeextract::{dedupe_dir, extract_dir, extract_file, ExtractConfig, Extractor, OpenAiService};

// ================================
// CLI
// ================================

#[derive(Debug, Parser)]
#[command(name = "tradeextract", version, about = "Structured trade extraction and dedupe for broker chat transcripts")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run batched LLM extraction over message files
    Extract(ExtractArgs),
    /// Pool `*_llm.json` files and drop duplicate trades
    Dedupe(DedupeArgs),
}

#[derive(Debug, Args)]
struct ExtractArgs {
    /// Single message file (JSON)
    #[arg(long, value_name = "FILE", requires = "output", conflicts_with = "input_dir")]
    input: Option<PathBuf>,

    /// Output file for --input
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Directory of message files (every *.json)
    #[arg(long, value_name = "DIR", required_unless_present = "input")]
    input_dir: Option<PathBuf>,

    /// Output directory for --input-dir
    #[arg(long, value_name = "DIR", default_value = "./llm_parsed")]
    output_dir: PathBuf,

    /// Messages per model call
    #[arg(long, default_value_t = 50)]
    batch_size: usize,

    /// Send raw_text even when clean_text is present
    #[arg(long, default_value_t = false)]
    raw_text: bool,

    /// Model identifier
    #[arg(long, default_value = "gpt-3.5-turbo")]
    model: String,

    #[arg(long, default_value_t = 0.0)]
    temperature: f32,

    /// Reply token budget per batch
    #[arg(long, default_value_t = 2048)]
    max_output_tokens: u32,

    /// Max batches in flight (1 = sequential)
    #[arg(long, default_value_t = 1)]
    concurrency: usize,

    /// Extra attempts per batch on retryable service errors
    #[arg(long, default_value_t = 0)]
    max_retries: usize,

    /// Per-request HTTP timeout in seconds
    #[arg(long, default_value_t = 120)]
    timeout_seconds: u64,

    /// Overall deadline per file in seconds; unfinished batches become null
    #[arg(long)]
    deadline_seconds: Option<u64>,

    /// Chat-completions base URL
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// API key (falls back to OPENAI_API_KEY, .env is loaded first)
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Write <base>_llm.report.json with per-batch diagnostics (directory mode)
    #[arg(long, default_value_t = false)]
    write_reports: bool,
}

#[derive(Debug, Args)]
struct DedupeArgs {
    /// Directory holding *_llm.json files
    #[arg(long, value_name = "DIR", default_value = "./llm_parsed")]
    input_dir: PathBuf,

    /// Where <date>_deduped.json is written
    #[arg(long, value_name = "DIR", default_value = "./deduped_trades")]
    output_dir: PathBuf,

    /// Date label for the output file, e.g. 20250729
    #[arg(long)]
    date: String,
}

impl ExtractArgs {
    fn config(&self) -> ExtractConfig {
        ExtractConfig {
            batch_size: self.batch_size,
            use_clean_text: !self.raw_text,
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
            model: self.model.clone(),
            concurrency: self.concurrency,
            max_retries: self.max_retries,
            deadline: self.deadline_seconds.map(Duration::from_secs),
        }
    }
}

// ================================
// Main
// ================================

#[tokio::main]
async fn main() -> Result<()> {
    // ---- Logging setup ----
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    // loads variables from .env if present, before clap reads env fallbacks
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Extract(args) => run_extract(args).await,
        Command::Dedupe(args) => {
            dedupe_dir(&args.input_dir, &args.output_dir, &args.date)?;
            Ok(())
        }
    }
}

async fn run_extract(args: ExtractArgs) -> Result<()> {
    let api_key = match args.api_key.as_deref() {
        Some(key) if !key.trim().is_empty() => key.to_string(),
        _ => bail!("Missing OPENAI_API_KEY env var (or --api-key). Set it before running."),
    };

    let cfg = args.config();
    info!("🧠 Model: {}", cfg.model);
    info!(
        "⚙️  BatchSize={}, Concurrency={}, Retries={}, CleanText={}",
        cfg.batch_size, cfg.concurrency, cfg.max_retries, cfg.use_clean_text
    );

    let service = OpenAiService::new(api_key, args.base_url.as_str(), Duration::from_secs(args.timeout_seconds))?;

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template("{spinner} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .context("Invalid progress template")?
            .progress_chars("=>-"),
    );
    pb.set_message("batches");
    let extractor = Extractor::new(service, cfg)?.with_progress(pb.clone());

    let reports = match (&args.input, &args.output, &args.input_dir) {
        (Some(input), Some(output), _) => vec![extract_file(&extractor, input, output).await?],
        (None, _, Some(input_dir)) => extract_dir(&extractor, input_dir, &args.output_dir, args.write_reports).await?,
        _ => bail!("Pass either --input/--output or --input-dir"),
    };
    pb.finish_with_message("done");

    let failed: usize = reports.iter().map(|r| r.failed_batches.len()).sum();
    let batches: usize = reports.iter().map(|r| r.batches).sum();
    if failed > 0 {
        warn!("⚠️ {} of {} batches fell back to null results", failed, batches);
    }
    info!("✅ All done: {} files, {} batches", reports.len(), batches);
    Ok(())
}

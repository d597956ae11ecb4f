//! File and directory drivers around the extractor and the dedupe engine.

use std::fs::{self, create_dir_all};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::dedupe::{dedupe, load_trades_from_dir, LLM_SUFFIX};
use crate::extract::{Extractor, RunReport};
use crate::message::load_messages;
use crate::service::CompletionService;

/// Input suffixes written by the ingestion and tagging stages.
const INPUT_SUFFIXES: [&str; 2] = ["_preproc.json", "_structured.json"];

/// `foo_preproc.json` / `foo_structured.json` / `foo.json` -> `foo_llm.json`.
pub fn llm_output_name(input_name: &str) -> String {
    let base = INPUT_SUFFIXES
        .iter()
        .find_map(|suffix| input_name.strip_suffix(suffix))
        .or_else(|| input_name.strip_suffix(".json"))
        .unwrap_or(input_name);
    format!("{base}{LLM_SUFFIX}")
}

fn write_json<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))
}

/// Extract one message file into one output file. Structural input problems
/// are returned as errors; batch failures only show up in the report.
pub async fn extract_file<S: CompletionService>(
    extractor: &Extractor<S>,
    input: &Path,
    output: &Path,
) -> Result<RunReport> {
    let messages = load_messages(input)?;
    info!("📄 {}: {} messages", input.display(), messages.len());

    let run = extractor.extract(&messages).await;
    write_json(&run.results, output)?;
    info!("✅ Parsed: {} => {} ({} messages)", input.display(), output.display(), run.results.len());
    Ok(run.report)
}

/// Extract every `*.json` file in `input_dir`, in file-name order, into
/// `output_dir`. With `write_reports`, each run's report lands next to its
/// output as `<base>_llm.report.json`.
pub async fn extract_dir<S: CompletionService>(
    extractor: &Extractor<S>,
    input_dir: &Path,
    output_dir: &Path,
    write_reports: bool,
) -> Result<Vec<RunReport>> {
    create_dir_all(output_dir).context("Failed to create output dir")?;

    let mut inputs: Vec<PathBuf> = fs::read_dir(input_dir)
        .with_context(|| format!("Failed to list {}", input_dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<_>>()
        .with_context(|| format!("Failed to list {}", input_dir.display()))?;
    // skip our own output in case both dirs are the same
    inputs.retain(|p| {
        let name = p.file_name().and_then(|n| n.to_str()).unwrap_or("");
        p.is_file() && name.ends_with(".json") && !name.ends_with(LLM_SUFFIX) && !name.ends_with(".report.json")
    });
    inputs.sort();
    info!("Found {} input files in {}", inputs.len(), input_dir.display());

    let mut reports = Vec::with_capacity(inputs.len());
    for input in &inputs {
        let name = input
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("Non UTF-8 file name: {}", input.display()))?;
        let out_name = llm_output_name(name);
        let output = output_dir.join(&out_name);

        let report = extract_file(extractor, input, &output).await?;
        if write_reports {
            write_json(&report, &output_dir.join(report_name(&out_name)))?;
        }
        reports.push(report);
    }
    Ok(reports)
}

/// `foo_llm.json` -> `foo_llm.report.json`; only the trailing suffix is rewritten.
fn report_name(llm_name: &str) -> String {
    let base = llm_name.strip_suffix(LLM_SUFFIX).unwrap_or(llm_name);
    format!("{base}_llm.report.json")
}

/// Pool all extractor output in `in_dir`, dedupe, and write
/// `<out_dir>/<date>_deduped.json`. Returns the written path.
pub fn dedupe_dir(in_dir: &Path, out_dir: &Path, date: &str) -> Result<PathBuf> {
    create_dir_all(out_dir).context("Failed to create output dir")?;

    let trades = load_trades_from_dir(in_dir)?;
    let pooled = trades.len();
    let deduped = dedupe(trades);
    info!("Deduped {} trades to {} unique trades", pooled, deduped.len());

    let out_path = out_dir.join(format!("{date}_deduped.json"));
    write_json(&deduped, &out_path)?;
    info!("✅ Written deduped list to {}", out_path.display());
    Ok(out_path)
}

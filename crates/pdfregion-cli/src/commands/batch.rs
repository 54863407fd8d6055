//! Batch processing command for multiple PDF files.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing::{error, warn};

use pdfregion_core::extract::CancelFlag;

use super::config::load_config;
use super::extract::{Destination, Pipeline, RunArgs, cancel_on_ctrl_c};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Glob pattern matching the input PDFs
    #[arg(required = true)]
    input: String,

    /// Output directory (default: next to each input)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Also generate a summary CSV
    #[arg(long)]
    summary: bool,

    /// Continue on error
    #[arg(long)]
    continue_on_error: bool,

    #[command(flatten)]
    run: RunArgs,
}

/// Result of processing a single file.
struct FileResult {
    path: PathBuf,
    output: Option<PathBuf>,
    rows: usize,
    error: Option<String>,
    processing_time_ms: u64,
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut config = load_config(config_path)?;
    args.run.apply(&mut config)?;

    let mut files: Vec<PathBuf> = glob(&args.input)?
        .filter_map(|r| r.ok())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
        })
        .collect();
    files.sort();

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

    let cancel = CancelFlag::new();
    cancel_on_ctrl_c(cancel.clone());
    let pipeline = Pipeline::new(&config, args.run.format, cancel.clone())?;

    let multi_progress = MultiProgress::new();
    let overall_pb = multi_progress.add(ProgressBar::new(files.len() as u64));
    overall_pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")?
            .progress_chars("=>-"),
    );
    let page_pb = multi_progress.add(ProgressBar::new(0));
    page_pb.set_style(
        ProgressStyle::default_bar()
            .template("  {bar:40.green/white} {pos}/{len} pages {msg}")?
            .progress_chars("##-"),
    );

    let mut results = Vec::with_capacity(files.len());

    for path in files {
        if cancel.is_cancelled() {
            anyhow::bail!("Cancelled");
        }

        let file_start = Instant::now();
        let destination = Destination::resolve(None, &path, args.output_dir.as_deref(), args.run.format);
        page_pb.reset();
        page_pb.set_message(display_name(&path));

        let task_pipeline = pipeline.clone();
        let task_path = path.clone();
        let task_destination = destination.clone();
        let task_pb = page_pb.clone();
        let result = tokio::task::spawn_blocking(move || {
            task_pipeline.run(&task_path, &task_destination, &task_pb)
        })
        .await?;

        let processing_time_ms = file_start.elapsed().as_millis() as u64;
        let output = match destination {
            Destination::File(p) => Some(p),
            Destination::Stdout => None,
        };

        match result {
            Ok(rows) => results.push(FileResult {
                path,
                output,
                rows,
                error: None,
                processing_time_ms,
            }),
            Err(e) => {
                let error_msg = format!("{:#}", e);
                if !args.continue_on_error {
                    error!("Failed to process {}: {}", path.display(), error_msg);
                    anyhow::bail!("Processing {} failed: {}", path.display(), error_msg);
                }
                warn!("Failed to process {}: {}", path.display(), error_msg);
                results.push(FileResult {
                    path,
                    output: None,
                    rows: 0,
                    error: Some(error_msg),
                    processing_time_ms,
                });
            }
        }

        overall_pb.inc(1);
    }

    page_pb.finish_and_clear();
    overall_pb.finish_with_message("Complete");

    if args.summary {
        let summary_path = args
            .output_dir
            .as_ref()
            .map(|d| d.join("summary.csv"))
            .unwrap_or_else(|| PathBuf::from("summary.csv"));

        write_summary(&summary_path, &results)?;
        println!(
            "{} Summary written to {}",
            style("✓").green(),
            summary_path.display()
        );
    }

    let failed: Vec<_> = results.iter().filter(|r| r.error.is_some()).collect();

    println!();
    println!(
        "{} Processed {} files in {:?}",
        style("✓").green(),
        results.len(),
        start.elapsed()
    );
    println!(
        "   {} successful, {} failed",
        style(results.len() - failed.len()).green(),
        style(failed.len()).red()
    );

    if !failed.is_empty() {
        println!();
        println!("{}", style("Failed files:").red());
        for result in &failed {
            println!(
                "  - {}: {}",
                result.path.display(),
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn write_summary(path: &Path, results: &[FileResult]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record(["filename", "status", "rows", "output", "processing_time_ms", "error"])?;

    for result in results {
        let status = if result.error.is_some() { "failed" } else { "success" };
        let output = result
            .output
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();

        wtr.write_record([
            display_name(&result.path).as_str(),
            status,
            &result.rows.to_string(),
            &output,
            &result.processing_time_ms.to_string(),
            result.error.as_deref().unwrap_or(""),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

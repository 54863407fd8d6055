//! Extract command - pull region values from every page of one PDF.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use pdfregion_core::extract::{CancelFlag, OutputRow, PageRecordBuilder, RegionExtractor};
use pdfregion_core::models::config::{ImageSelection, PdfRegionConfig};
use pdfregion_core::ocr::OcrService;
use pdfregion_core::output::{self, TabularWriter};
use pdfregion_core::pdf::{DocumentSource, PdfDocument};
use pdfregion_core::region::RegionSpec;

use super::config::load_config;

/// Arguments for the extract command.
#[derive(Args)]
pub struct ExtractArgs {
    /// Input PDF file
    #[arg(required = true)]
    input: PathBuf,

    /// Output file ("-" for stdout; default: <input stem>.csv next to the input)
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(flatten)]
    run: RunArgs,
}

/// Options shared by the extract and batch commands.
#[derive(Args, Clone)]
pub struct RunArgs {
    /// Region as label=x0,y0,x1,y1[@text|@ocr]; repeat for more columns
    #[arg(short, long = "region", value_name = "SPEC")]
    regions: Vec<RegionSpec>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "csv")]
    pub format: OutputFormat,

    /// Model directory
    #[arg(short, long)]
    model_dir: Option<PathBuf>,

    /// Number of pages processed in parallel
    #[arg(short = 'j', long)]
    jobs: Option<usize>,

    /// OCR time budget per region in milliseconds
    #[arg(long, value_name = "MS")]
    ocr_timeout: Option<u64>,

    /// Abort when OCR times out instead of leaving the value empty
    #[arg(long)]
    timeout_fatal: bool,

    /// Run OCR on every embedded image of a page, not just the first
    #[arg(long)]
    all_images: bool,

    /// Save each image sent to OCR as page_<n>_img.png in this directory
    #[arg(long, value_name = "DIR")]
    save_images: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Comma-separated values
    Csv,
    /// JSON array of rows
    Json,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        }
    }
}

impl RunArgs {
    /// Fold command-line overrides into the loaded configuration.
    pub fn apply(&self, config: &mut PdfRegionConfig) -> anyhow::Result<()> {
        if !self.regions.is_empty() {
            config.regions = self.regions.clone();
        }
        if let Some(dir) = &self.model_dir {
            config.models.model_dir = dir.clone();
        }
        if let Some(jobs) = self.jobs {
            config.extraction.workers = jobs;
        }
        if let Some(ms) = self.ocr_timeout {
            config.extraction.ocr_timeout_ms = Some(ms);
        }
        if self.timeout_fatal {
            config.extraction.timeout_is_fatal = true;
        }
        if self.all_images {
            config.extraction.image_selection = ImageSelection::All;
        }
        if let Some(dir) = &self.save_images {
            config.extraction.image_dump_dir = Some(dir.clone());
        }

        if config.regions.is_empty() {
            anyhow::bail!("No regions given. Use --region label=x0,y0,x1,y1 or add regions to the config file.");
        }
        config.validate()?;
        Ok(())
    }
}

/// Everything needed to process documents with one configuration.
///
/// The OCR service is shared by every document of the run and loads its
/// models the first time an OCR region is processed.
#[derive(Clone)]
pub struct Pipeline {
    builder: PageRecordBuilder,
    format: OutputFormat,
}

impl Pipeline {
    pub fn new(config: &PdfRegionConfig, format: OutputFormat, cancel: CancelFlag) -> anyhow::Result<Self> {
        let ocr = Arc::new(OcrService::from_config(config));
        let extractor = RegionExtractor::from_config(ocr, &config.extraction);
        let builder = PageRecordBuilder::new(config.regions.clone(), extractor)?
            .with_timeout_fatal(config.extraction.timeout_is_fatal)
            .with_workers(config.extraction.workers)
            .with_cancel_flag(cancel);

        Ok(Self { builder, format })
    }

    pub fn labels(&self) -> Vec<String> {
        self.builder.labels()
    }

    /// Extract `input` and write it to `destination`; returns the row count.
    ///
    /// Nothing is written unless every page succeeded.
    pub fn run(&self, input: &Path, destination: &Destination, progress: &ProgressBar) -> anyhow::Result<usize> {
        let doc = PdfDocument::open(input)?;
        let page_count = doc.page_count();
        progress.set_length(page_count as u64);
        info!("Processing {} ({} pages)", input.display(), page_count);

        let columns = self.labels();
        if let (Destination::File(path), OutputFormat::Csv, 1) = (destination, self.format, self.builder.workers()) {
            let stream = self.builder.build(doc)?.inspect(|_| progress.inc(1));
            return Ok(output::write_atomic(path, &columns, stream)?);
        }

        let rows = self.builder.collect_parallel(doc)?;
        progress.set_position(page_count as u64);
        self.emit(&rows, &columns, destination)?;
        Ok(rows.len())
    }

    fn emit(&self, rows: &[OutputRow], columns: &[String], destination: &Destination) -> anyhow::Result<()> {
        match (destination, self.format) {
            (Destination::File(path), OutputFormat::Csv) => {
                output::write_atomic(path, columns, rows.iter().cloned().map(Ok))?;
            }
            (Destination::File(path), OutputFormat::Json) => {
                output::write_json_atomic(path, rows)?;
            }
            (Destination::Stdout, OutputFormat::Csv) => {
                let mut writer = TabularWriter::new(std::io::stdout().lock(), columns.to_vec());
                writer.write(rows)?;
                writer.into_inner()?;
            }
            (Destination::Stdout, OutputFormat::Json) => {
                println!("{}", serde_json::to_string_pretty(rows)?);
            }
        }
        Ok(())
    }
}

/// Where the rows of one document go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Stdout,
    File(PathBuf),
}

impl Destination {
    /// `-` means stdout; no path means `<stem>.<ext>` in `default_dir`, or
    /// next to the input when `default_dir` is `None`.
    pub fn resolve(output: Option<&Path>, input: &Path, default_dir: Option<&Path>, format: OutputFormat) -> Self {
        match output {
            Some(path) if path == Path::new("-") => Destination::Stdout,
            Some(path) => Destination::File(path.to_path_buf()),
            None => {
                let stem = input
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "output".to_string());
                let name = format!("{}.{}", stem, format.extension());
                let dir = default_dir
                    .map(Path::to_path_buf)
                    .or_else(|| input.parent().map(Path::to_path_buf))
                    .unwrap_or_default();
                Destination::File(dir.join(name))
            }
        }
    }
}

/// Set `cancel` when the user presses Ctrl-C.
pub fn cancel_on_ctrl_c(cancel: CancelFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{} Cancelling after the current page...", style("!").yellow());
            cancel.cancel();
        }
    });
}

pub async fn run(args: ExtractArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut config = load_config(config_path)?;
    args.run.apply(&mut config)?;

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let destination = Destination::resolve(args.output.as_deref(), &args.input, None, args.run.format);
    let cancel = CancelFlag::new();
    cancel_on_ctrl_c(cancel.clone());
    let pipeline = Pipeline::new(&config, args.run.format, cancel)?;

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} pages")?
            .progress_chars("##-"),
    );
    if destination == Destination::Stdout {
        pb.set_draw_target(indicatif::ProgressDrawTarget::hidden());
    }

    let input = args.input.clone();
    let task_destination = destination.clone();
    let task_pb = pb.clone();
    let rows = tokio::task::spawn_blocking(move || pipeline.run(&input, &task_destination, &task_pb)).await??;

    pb.finish_and_clear();

    if let Destination::File(path) = &destination {
        println!(
            "{} Wrote {} rows to {}",
            style("✓").green(),
            rows,
            path.display()
        );
    }

    debug!("Total processing time: {:?}", start.elapsed());

    Ok(())
}

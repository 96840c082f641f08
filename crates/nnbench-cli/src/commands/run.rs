//! Run command - time every sample of a dataset through a model.

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

use nnbench_core::config::BenchConfig;
use nnbench_core::{load_model, Benchmark, DatasetKind, Engine};

/// Arguments for the run command.
///
/// Every flag overrides the matching value from the config file.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the compiled model
    #[arg(short, long, alias = "mindir-path")]
    model_path: Option<PathBuf>,

    /// Dataset name: `cifar10` for tensor blobs, anything else for per-class images
    #[arg(short, long)]
    dataset_name: Option<DatasetKind>,

    /// Input directory
    #[arg(short, long, alias = "input0-path")]
    input_path: Option<PathBuf>,

    /// Accelerator ordinal
    #[arg(long)]
    device_id: Option<u32>,

    /// Device type (CPU or GPU)
    #[arg(long)]
    device_type: Option<String>,

    /// Execution engine (ort or tract)
    #[arg(short, long)]
    engine: Option<Engine>,

    /// Concrete input shape for the tract engine, e.g. 1,3,224,224
    #[arg(long, value_delimiter = ',')]
    input_shape: Option<Vec<usize>>,

    /// Input element type for the tract engine
    #[arg(long)]
    input_dtype: Option<String>,

    /// Number of intra-op CPU threads
    #[arg(short = 'j', long)]
    threads: Option<usize>,

    /// Directory for per-sample result files
    #[arg(long)]
    results_dir: Option<PathBuf>,

    /// Path of the latency summary file
    #[arg(long)]
    summary_path: Option<PathBuf>,

    /// Also write per-sample latencies as CSV
    #[arg(long)]
    latency_csv: Option<PathBuf>,

    /// Untimed warm-up passes on the first sample
    #[arg(long)]
    warmup: Option<usize>,
}

impl RunArgs {
    fn apply(self, config: &mut BenchConfig) {
        if let Some(path) = self.model_path {
            config.model.path = path;
        }
        if let Some(kind) = self.dataset_name {
            config.dataset.kind = kind;
        }
        if let Some(dir) = self.input_path {
            config.dataset.input_dir = dir;
        }
        if let Some(id) = self.device_id {
            config.model.device_id = id;
        }
        if let Some(device_type) = self.device_type {
            config.model.device_type = device_type;
        }
        if let Some(engine) = self.engine {
            config.model.engine = engine;
        }
        if self.input_shape.is_some() {
            config.model.input_shape = self.input_shape;
        }
        if self.input_dtype.is_some() {
            config.model.input_dtype = self.input_dtype;
        }
        if let Some(threads) = self.threads {
            config.model.intra_threads = threads;
        }
        if let Some(dir) = self.results_dir {
            config.output.results_dir = dir;
        }
        if let Some(path) = self.summary_path {
            config.output.summary_path = path;
        }
        if self.latency_csv.is_some() {
            config.output.latency_csv = self.latency_csv;
        }
        if let Some(warmup) = self.warmup {
            config.run.warmup = warmup;
        }
    }
}

pub fn run(args: RunArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    // Load configuration
    let mut config = if let Some(path) = config_path {
        BenchConfig::from_file(Path::new(path))?
    } else {
        BenchConfig::default()
    };
    args.apply(&mut config);
    debug!("Effective configuration: {:?}", config);

    let bench = Benchmark::prepare(config)?;

    println!(
        "{} Found {} files to process",
        style("ℹ").blue(),
        bench.samples().len()
    );

    let model = load_model(&bench.config().model)?;

    let progress = ProgressBar::new(bench.samples().len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} samples")?
            .progress_chars("=>-"),
    );

    let result = bench.execute(model.as_ref(), |_| progress.inc(1));
    progress.finish_and_clear();
    let report = result?;

    let output = &bench.config().output;
    println!("{}", report.summary.report_line());
    println!(
        "{} Wrote {} result files to {}",
        style("✓").green(),
        report.written_files.len(),
        output.results_dir.display()
    );
    println!(
        "{} Summary written to {}",
        style("✓").green(),
        output.summary_path.display()
    );
    if let Some(csv_path) = &output.latency_csv {
        println!(
            "{} Latencies written to {}",
            style("✓").green(),
            csv_path.display()
        );
    }
    println!(
        "{} Processed {} samples in {:?}",
        style("✓").green(),
        report.summary.count,
        start.elapsed()
    );

    Ok(())
}

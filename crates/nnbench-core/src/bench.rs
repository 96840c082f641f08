//! Top-level benchmark flow.

use tracing::{error, info};

use nnbench_inference::InferenceBackend;

use crate::binder::binder_for;
use crate::config::BenchConfig;
use crate::dataset::{discover_samples, Sample};
use crate::error::Result;
use crate::model::resolve_model_path;
use crate::runner::{RunReport, Runner};
use crate::writer::ResultWriter;

/// A validated run: model path resolved and samples discovered.
///
/// Any error from [`Benchmark::execute`] aborts the run as a whole. The
/// CSV and then the summary are only written after every sample
/// succeeded; the summary goes last so a failed run never leaves one.
#[derive(Debug)]
pub struct Benchmark {
    config: BenchConfig,
    samples: Vec<Sample>,
}

impl Benchmark {
    /// Check the model path, then list the samples.
    pub fn prepare(config: BenchConfig) -> Result<Self> {
        resolve_model_path(&config.model.path)?;
        let samples = discover_samples(config.dataset.kind, &config.dataset.input_dir)?;
        info!(
            "Found {} {} samples in {}",
            samples.len(),
            config.dataset.kind,
            config.dataset.input_dir.display()
        );
        Ok(Self { config, samples })
    }

    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Run every sample through `model` and persist the reports.
    pub fn execute<F>(&self, model: &dyn InferenceBackend, on_done: F) -> Result<RunReport>
    where
        F: FnMut(&Sample),
    {
        let writer = ResultWriter::create(&self.config.output.results_dir)?;
        let mut runner = Runner::new(model, binder_for(self.config.dataset.kind), writer)?
            .with_warmup(self.config.run.warmup);

        let report = runner
            .run_with_progress(&self.samples, on_done)
            .inspect_err(|e| error!("Run aborted: {}", e))?;

        if let Some(csv_path) = &self.config.output.latency_csv {
            report.records.write_csv(csv_path)?;
        }
        report.summary.persist(&self.config.output.summary_path)?;

        Ok(report)
    }
}

//! The timed inference loop.
//!
//! Samples are processed strictly one at a time, in discovery order. Each
//! sample moves through `Discovered -> Bound -> Predicted -> Written ->
//! Done`; the first failure at any stage ends the whole run.

use std::path::PathBuf;

use tracing::{debug, info, trace};

use nnbench_inference::{InferenceBackend, InferenceError, InputTensor, OutputTensor};

use crate::binder::{BindError, InputBinder};
use crate::dataset::Sample;
use crate::error::{BenchError, Result};
use crate::timing::{LatencySummary, RunClock, TimingAggregator};
use crate::writer::ResultWriter;

/// Per-sample lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleState {
    Discovered,
    Bound,
    Predicted,
    Written,
    Done,
}

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub records: TimingAggregator,
    pub summary: LatencySummary,
    pub written_files: Vec<PathBuf>,
}

/// Drives samples through a loaded model.
pub struct Runner<'m> {
    model: &'m dyn InferenceBackend,
    binder: Box<dyn InputBinder>,
    writer: ResultWriter,
    slots: Vec<InputTensor>,
    warmup: usize,
}

impl<'m> Runner<'m> {
    /// Prepare one zero-filled input slot per declared model input.
    pub fn new(
        model: &'m dyn InferenceBackend,
        binder: Box<dyn InputBinder>,
        writer: ResultWriter,
    ) -> Result<Self> {
        let slots: Vec<InputTensor> = model
            .input_specs()
            .iter()
            .cloned()
            .map(InputTensor::zeros)
            .collect();
        if slots.is_empty() {
            return Err(BenchError::ModelLoadFailure(
                "model declares no inputs".to_string(),
            ));
        }
        Ok(Self {
            model,
            binder,
            writer,
            slots,
            warmup: 0,
        })
    }

    /// Untimed forward passes on the first sample before measuring.
    pub fn with_warmup(mut self, iterations: usize) -> Self {
        self.warmup = iterations;
        self
    }

    pub fn run(&mut self, samples: &[Sample]) -> Result<RunReport> {
        self.run_with_progress(samples, |_| {})
    }

    /// Run every sample, calling `on_done` after each one is written.
    pub fn run_with_progress<F>(&mut self, samples: &[Sample], mut on_done: F) -> Result<RunReport>
    where
        F: FnMut(&Sample),
    {
        if let Some(first) = samples.first() {
            self.warm_up(first)?;
        }

        let clock = RunClock::start();
        let mut records = TimingAggregator::new();
        let mut written_files = Vec::with_capacity(samples.len());

        for sample in samples {
            written_files.extend(self.process_sample(sample, &clock, &mut records)?);
            on_done(sample);
        }

        let summary = records.summarize()?;
        Ok(RunReport {
            records,
            summary,
            written_files,
        })
    }

    fn process_sample(
        &mut self,
        sample: &Sample,
        clock: &RunClock,
        timings: &mut TimingAggregator,
    ) -> Result<Vec<PathBuf>> {
        info!("Start predict input files: {}", sample.path().display());
        trace!("{} {:?}", sample.path().display(), SampleState::Discovered);

        self.bind(sample)?;
        trace!("{} {:?}", sample.path().display(), SampleState::Bound);

        let predict_failure = |source: InferenceError| BenchError::PredictFailure {
            path: sample.path().to_path_buf(),
            source,
        };
        let prepared = self.model.prepare(&self.slots).map_err(predict_failure)?;

        let start_ms = clock.now_ms();
        let result = self.model.run_prepared(prepared);
        let end_ms = clock.now_ms();

        let outputs = result.map_err(predict_failure)?;
        timings.record(sample.path(), start_ms, end_ms);
        trace!("{} {:?}", sample.path().display(), SampleState::Predicted);
        log_top1(sample, &outputs);

        let written = self.writer.write(sample, &outputs)?;
        trace!("{} {:?}", sample.path().display(), SampleState::Written);

        debug!(
            "{} done in {:.3} ms",
            sample.path().display(),
            end_ms - start_ms
        );
        trace!("{} {:?}", sample.path().display(), SampleState::Done);
        Ok(written)
    }

    fn bind(&mut self, sample: &Sample) -> Result<()> {
        let raw = sample.read()?;
        let bound = self
            .binder
            .bind(&raw, self.slots[0].spec())
            .map_err(|e| match e {
                BindError::SizeMismatch { expected, actual } => BenchError::SizeMismatch {
                    path: sample.path().to_path_buf(),
                    expected,
                    actual,
                },
                BindError::Decode(source) => BenchError::DecodeFailure {
                    path: sample.path().to_path_buf(),
                    source,
                },
            })?;
        self.slots[0] = bound;
        Ok(())
    }

    fn warm_up(&mut self, sample: &Sample) -> Result<()> {
        if self.warmup == 0 {
            return Ok(());
        }
        debug!("Warming up with {} passes on {}", self.warmup, sample.path().display());

        self.bind(sample)?;
        for _ in 0..self.warmup {
            self.model
                .run(&self.slots)
                .map_err(|source| BenchError::PredictFailure {
                    path: sample.path().to_path_buf(),
                    source,
                })?;
        }
        Ok(())
    }
}

fn log_top1(sample: &Sample, outputs: &[OutputTensor]) {
    let Some(scores) = outputs.first().and_then(OutputTensor::to_f32_array) else {
        return;
    };
    let top1 = scores
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1));
    if let Some((class, score)) = top1 {
        debug!(
            "{} top-1 class {} (score {:.4}, label dir {:?})",
            sample.path().display(),
            class,
            score,
            sample.class()
        );
    }
}

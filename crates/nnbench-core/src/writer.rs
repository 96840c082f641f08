//! Per-sample result files.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use nnbench_inference::OutputTensor;

use crate::dataset::Sample;
use crate::error::{BenchError, Result};

/// Writes each output tensor of a sample to its own file.
///
/// Image samples land in a sub-directory named after their class, so two
/// classes holding the same file name never share a result file. Names
/// depend only on the sample path and the output index, so repeated runs
/// over the same inputs produce the same set of files.
#[derive(Debug, Clone)]
pub struct ResultWriter {
    dir: PathBuf,
}

impl ResultWriter {
    /// Create the results directory if needed.
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        create_dir(&dir)?;
        Ok(Self { dir })
    }

    /// `<dir>[/<class>]/<stem>_<index>.bin`, where `<stem>` is the sample
    /// file name without its last extension.
    pub fn output_path(&self, sample: &Sample, index: usize) -> PathBuf {
        let stem = sample
            .path()
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dir = match sample.class() {
            Some(class) => self.dir.join(class),
            None => self.dir.clone(),
        };
        dir.join(format!("{}_{}.bin", stem, index))
    }

    /// Persist every output tensor's raw bytes, truncating existing files.
    pub fn write(&self, sample: &Sample, outputs: &[OutputTensor]) -> Result<Vec<PathBuf>> {
        if let Some(class) = sample.class() {
            create_dir(&self.dir.join(class))?;
        }

        let mut written = Vec::with_capacity(outputs.len());

        for (index, tensor) in outputs.iter().enumerate() {
            let path = self.output_path(sample, index);
            write_all(&path, tensor.as_bytes()).map_err(|source| BenchError::WriteFailure {
                path: path.clone(),
                source,
            })?;
            debug!(
                "Wrote output '{}' {:?} to {}",
                tensor.name(),
                tensor.shape(),
                path.display()
            );
            written.push(path);
        }

        Ok(written)
    }
}

fn create_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|source| BenchError::WriteFailure {
        path: dir.to_path_buf(),
        source,
    })
}

fn write_all(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.flush()
}

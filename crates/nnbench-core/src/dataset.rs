//! Sample discovery.

use std::convert::Infallible;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use glob::{glob_with, MatchOptions, Pattern};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BenchError, Result};

/// How samples are laid out on disk and bound to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DatasetKind {
    /// Pre-packaged binary tensors, one file per sample, flat directory.
    DirectTensor,
    /// Encoded images grouped in one sub-directory per class.
    ImageClassification,
}

impl FromStr for DatasetKind {
    type Err = Infallible;

    /// `cifar10` selects the tensor-blob layout; every other name is an
    /// image-classification dataset.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("cifar10") {
            Ok(DatasetKind::DirectTensor)
        } else {
            Ok(DatasetKind::ImageClassification)
        }
    }
}

impl From<String> for DatasetKind {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(kind) => kind,
            Err(never) => match never {},
        }
    }
}

impl From<DatasetKind> for String {
    fn from(kind: DatasetKind) -> Self {
        kind.to_string()
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetKind::DirectTensor => f.write_str("cifar10"),
            DatasetKind::ImageClassification => f.write_str("imagenet2012"),
        }
    }
}

/// A single input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    path: PathBuf,
    class: Option<String>,
}

impl Sample {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            class: None,
        }
    }

    /// A sample inside a class directory; the class is the parent's name.
    pub fn in_class(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let class = path
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned());
        Self { path, class }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Class directory name, for image datasets.
    pub fn class(&self) -> Option<&str> {
        self.class.as_deref()
    }

    /// Read the whole sample into memory.
    pub fn read(&self) -> Result<Vec<u8>> {
        std::fs::read(&self.path).map_err(|source| BenchError::ReadFailure {
            path: self.path.clone(),
            source,
        })
    }
}

/// List the samples of a dataset in a stable order.
///
/// Tensor datasets are the regular files directly under `dir`; image
/// datasets are the regular files one level down, in class directories.
/// Hidden entries are skipped and paths are sorted lexicographically.
pub fn discover_samples(kind: DatasetKind, dir: &Path) -> Result<Vec<Sample>> {
    if !dir.is_dir() {
        return Err(BenchError::Discovery(format!(
            "{} is not a directory",
            dir.display()
        )));
    }

    let root = Pattern::escape(&dir.to_string_lossy());
    let samples: Vec<Sample> = match kind {
        DatasetKind::DirectTensor => list_files(&format!("{}/*", root))?
            .into_iter()
            .map(Sample::new)
            .collect(),
        DatasetKind::ImageClassification => list_files(&format!("{}/*/*", root))?
            .into_iter()
            .map(Sample::in_class)
            .collect(),
    };

    debug!("Found {} {} samples in {}", samples.len(), kind, dir.display());

    if samples.is_empty() {
        return Err(BenchError::EmptyInputSet(dir.to_path_buf()));
    }
    Ok(samples)
}

fn list_files(pattern: &str) -> Result<Vec<PathBuf>> {
    let options = MatchOptions {
        require_literal_leading_dot: true,
        ..MatchOptions::new()
    };

    let mut paths = Vec::new();
    for entry in glob_with(pattern, options).map_err(|e| BenchError::Discovery(e.to_string()))? {
        let path = entry.map_err(|e| BenchError::Discovery(e.to_string()))?;
        if path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

//! Transformation steps and ordered chains of them.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::BuildError;

/// A file in flight through a transform chain.
#[derive(Debug, Clone)]
pub struct Asset {
    /// Source file the asset was read from
    pub source: PathBuf,

    /// Output path relative to the task's output directory
    pub relative: PathBuf,

    /// Current contents
    pub contents: Vec<u8>,

    /// Set by a capturing wrapper; steps that can emit a source map do so
    /// only when this is true
    pub capture_map: bool,

    /// Source map JSON produced by the last capturing step
    pub source_map: Option<String>,
}

impl Asset {
    /// Create an asset from a freshly read source file.
    pub fn new(source: impl Into<PathBuf>, relative: impl Into<PathBuf>, contents: Vec<u8>) -> Self {
        Self {
            source: source.into(),
            relative: relative.into(),
            contents,
            capture_map: false,
            source_map: None,
        }
    }

    /// Contents as UTF-8 text.
    pub fn text(&self) -> Result<&str, StepError> {
        std::str::from_utf8(&self.contents)
            .map_err(|e| StepError::new(&self.source, format!("not valid UTF-8: {}", e)))
    }
}

/// A step rejected one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepError {
    /// Source file that failed
    pub path: PathBuf,

    /// What went wrong
    pub message: String,
}

impl StepError {
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)
    }
}

/// One transformation in a chain.
///
/// A step receives every in-flight asset of the run and returns the
/// transformed set. Steps are synchronous; the task runs the whole chain on a
/// blocking worker.
pub trait Step: Send + Sync {
    /// Step name used in error reports.
    fn name(&self) -> &str;

    /// Transform the in-flight assets.
    fn apply(&self, assets: Vec<Asset>) -> Result<Vec<Asset>, StepError>;

    /// Output path this step gives an asset that arrives at `relative`.
    fn rename(&self, relative: &Path) -> PathBuf {
        relative.to_path_buf()
    }
}

/// Apply a per-file function to every asset, stopping at the first failure.
pub fn map_each<F>(assets: Vec<Asset>, f: F) -> Result<Vec<Asset>, StepError>
where
    F: FnMut(Asset) -> Result<Asset, StepError>,
{
    assets.into_iter().map(f).collect()
}

/// An ordered sequence of steps; each consumes the previous step's output.
#[derive(Default)]
pub struct Chain {
    steps: Vec<Box<dyn Step>>,
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.step_names()).finish()
    }
}

impl Chain {
    /// An empty chain copies files unchanged.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step.
    pub fn then(mut self, step: impl Step + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Names of the steps, in order.
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Whether the chain has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step in order. The first rejection aborts the chain.
    pub fn apply(&self, task: &str, mut assets: Vec<Asset>) -> Result<Vec<Asset>, BuildError> {
        for step in &self.steps {
            assets = step.apply(assets).map_err(|e| BuildError::Transform {
                task: task.to_string(),
                step: step.name().to_string(),
                path: e.path,
                message: e.message,
            })?;
        }
        Ok(assets)
    }

    /// Output path of a file after every step's rename.
    pub fn output_path(&self, relative: &Path) -> PathBuf {
        self.steps
            .iter()
            .fold(relative.to_path_buf(), |path, step| step.rename(&path))
    }
}

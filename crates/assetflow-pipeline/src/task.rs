//! Transform tasks.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::error::BuildError;
use crate::paths::{normalize, ProjectPaths};
use crate::sources::{SourceFile, SourceSet};
use crate::step::{Asset, Chain};

/// Which chain a task runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    /// Unminified output with debug maps
    Dev,
    /// Minified output, no debug maps
    Release,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Dev => f.write_str("dev"),
            Variant::Release => f.write_str("release"),
        }
    }
}

/// Result of one task run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    /// Task name
    pub task: String,

    /// Number of files written
    pub files: usize,

    /// Run time in milliseconds
    pub duration_ms: u64,
}

/// A unit of work the task graph can schedule.
#[async_trait]
pub trait Task: Send + Sync {
    /// Unique task name.
    fn name(&self) -> &str;

    /// Where the task writes, relative to the dist root. Checked against the
    /// dist root when the graph is built.
    fn output(&self) -> Option<&Path> {
        None
    }

    /// Output files this task would write, relative to the dist root.
    async fn plan(&self, paths: &ProjectPaths, variant: Variant) -> Result<Vec<PathBuf>, BuildError>;

    /// Run the task.
    async fn run(&self, paths: &ProjectPaths, variant: Variant) -> Result<TaskReport, BuildError>;
}

/// Declaration of a transform task. Built once at configuration time.
#[derive(Debug)]
pub struct TaskSpec {
    /// Task name
    pub name: String,

    /// Input glob, relative to the source root
    pub input: String,

    /// Globs removed from the input set, applied after `input`
    pub exclude: Vec<String>,

    /// Output directory, relative to the dist root
    pub output: PathBuf,

    /// Chain used by development runs
    pub dev: Chain,

    /// Chain used by release runs
    pub release: Chain,
}

impl TaskSpec {
    /// A task whose dev and release chains are both empty (plain copy).
    pub fn new(name: impl Into<String>, input: impl Into<String>, output: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            input: input.into(),
            exclude: Vec::new(),
            output: output.into(),
            dev: Chain::new(),
            release: Chain::new(),
        }
    }

    pub fn exclude(mut self, patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.exclude.extend(patterns.into_iter().map(Into::into));
        self
    }

    pub fn dev(mut self, chain: Chain) -> Self {
        self.dev = chain;
        self
    }

    pub fn release(mut self, chain: Chain) -> Self {
        self.release = chain;
        self
    }

    /// Chain for a variant.
    pub fn chain(&self, variant: Variant) -> &Chain {
        match variant {
            Variant::Dev => &self.dev,
            Variant::Release => &self.release,
        }
    }

    /// Compiled input set.
    pub fn sources(&self) -> Result<SourceSet, BuildError> {
        SourceSet::new(&self.input, &self.exclude)
    }
}

/// Runs a [`TaskSpec`]: enumerate inputs, apply the chain, write outputs.
///
/// Output is staged only after every step has accepted every file, so a
/// rejected run leaves no partial files behind. Staged files sit next to their
/// targets and are renamed into place once all of them are written; a failed
/// write removes whatever was staged.
#[derive(Debug, Clone)]
pub struct TransformTask {
    spec: Arc<TaskSpec>,
}

impl TransformTask {
    pub fn new(spec: TaskSpec) -> Self {
        Self {
            spec: Arc::new(spec),
        }
    }

    pub fn spec(&self) -> &TaskSpec {
        &self.spec
    }

    async fn discover(&self, paths: &ProjectPaths) -> Result<Vec<SourceFile>, BuildError> {
        let sources = self.spec.sources()?;
        let source_root = paths.source_root.clone();

        let walk_root = source_root.join(sources.base());

        tokio::task::spawn_blocking(move || sources.collect(&source_root))
            .await
            .map_err(|e| BuildError::Join {
                task: self.spec.name.clone(),
                message: e.to_string(),
            })?
            .map_err(|e| BuildError::SourceRead {
                task: self.spec.name.clone(),
                path: e.path().map(Path::to_path_buf).unwrap_or(walk_root),
                source: e.into(),
            })
    }

    async fn read(&self, files: Vec<SourceFile>) -> Result<Vec<Asset>, BuildError> {
        let mut assets = Vec::with_capacity(files.len());

        for file in files {
            let contents = tokio::fs::read(&file.path)
                .await
                .map_err(|e| BuildError::SourceRead {
                    task: self.spec.name.clone(),
                    path: file.path.clone(),
                    source: e,
                })?;
            assets.push(Asset::new(file.path, file.relative, contents));
        }

        Ok(assets)
    }

    async fn write(&self, paths: &ProjectPaths, assets: &[Asset]) -> Result<(), BuildError> {
        let output_dir = paths.dist_within(&self.spec.output)?;

        let mut staged = Vec::with_capacity(assets.len());
        if let Err(e) = self.stage(&output_dir, assets, &mut staged).await {
            for (temp, _) in &staged {
                let _ = tokio::fs::remove_file(temp).await;
            }
            return Err(e);
        }

        for (temp, target) in staged {
            tokio::fs::rename(&temp, &target)
                .await
                .map_err(|e| self.write_error(&target, e))?;
        }

        Ok(())
    }

    async fn stage(
        &self,
        output_dir: &Path,
        assets: &[Asset],
        staged: &mut Vec<(PathBuf, PathBuf)>,
    ) -> Result<(), BuildError> {
        for asset in assets {
            let target = normalize(&output_dir.join(&asset.relative));
            if !target.starts_with(output_dir) {
                return Err(BuildError::OutsideRoot {
                    path: target,
                    root: output_dir.to_path_buf(),
                });
            }

            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| self.write_error(&target, e))?;
            }

            let temp = staging_path(&target);
            tokio::fs::write(&temp, &asset.contents)
                .await
                .map_err(|e| self.write_error(&target, e))?;
            staged.push((temp, target));
        }

        Ok(())
    }

    fn write_error(&self, path: &Path, source: std::io::Error) -> BuildError {
        BuildError::Write {
            task: self.spec.name.clone(),
            path: path.to_path_buf(),
            source,
        }
    }
}

fn staging_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{}.assetflow-tmp", name))
}

#[async_trait]
impl Task for TransformTask {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn output(&self) -> Option<&Path> {
        Some(&self.spec.output)
    }

    async fn plan(&self, paths: &ProjectPaths, variant: Variant) -> Result<Vec<PathBuf>, BuildError> {
        let chain = self.spec.chain(variant);
        let files = self.discover(paths).await?;

        Ok(files
            .iter()
            .map(|f| self.spec.output.join(chain.output_path(&f.relative)))
            .collect())
    }

    async fn run(&self, paths: &ProjectPaths, variant: Variant) -> Result<TaskReport, BuildError> {
        let start = Instant::now();
        tracing::debug!("[{}] starting {} run", self.spec.name, variant);

        let files = self.discover(paths).await?;
        let assets = self.read(files).await?;

        let spec = Arc::clone(&self.spec);
        let assets = tokio::task::spawn_blocking(move || spec.chain(variant).apply(&spec.name, assets))
            .await
            .map_err(|e| BuildError::Join {
                task: self.spec.name.clone(),
                message: e.to_string(),
            })??;

        self.write(paths, &assets).await?;

        let report = TaskReport {
            task: self.spec.name.clone(),
            files: assets.len(),
            duration_ms: start.elapsed().as_millis() as u64,
        };

        tracing::info!(
            "[{}] wrote {} file(s) in {}ms",
            report.task,
            report.files,
            report.duration_ms
        );

        Ok(report)
    }
}

//! External module bundler.
//!
//! The bundler is not a transform chain: it takes one entry script and
//! produces one artifact by running a configured command.

use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::BundleSettings;
use crate::error::BuildError;
use crate::paths::ProjectPaths;
use crate::task::{Task, TaskReport, Variant};

/// Runs an external bundler command for a single entry point.
#[derive(Debug, Clone)]
pub struct BundleTask {
    name: String,
    settings: BundleSettings,
}

impl BundleTask {
    pub fn new(name: impl Into<String>, settings: BundleSettings) -> Self {
        Self {
            name: name.into(),
            settings,
        }
    }

    /// Command line with placeholders substituted.
    pub fn command_line(&self, paths: &ProjectPaths, variant: Variant) -> Vec<String> {
        let entry = paths.source(&self.settings.entry);
        let output = paths.dist(&self.settings.output);
        let entry = entry.to_string_lossy();
        let output = output.to_string_lossy();

        let mut args: Vec<String> = self
            .settings
            .command
            .iter()
            .map(|arg| arg.replace("{entry}", &entry).replace("{output}", &output))
            .collect();

        if variant == Variant::Release {
            args.extend(self.settings.release_args.iter().cloned());
        }

        args
    }

    fn failure(&self, paths: &ProjectPaths, message: String) -> BuildError {
        BuildError::Transform {
            task: self.name.clone(),
            step: "bundle".to_string(),
            path: paths.source(&self.settings.entry),
            message,
        }
    }
}

#[async_trait]
impl Task for BundleTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn output(&self) -> Option<&Path> {
        Some(Path::new(&self.settings.output))
    }

    async fn plan(&self, _paths: &ProjectPaths, _variant: Variant) -> Result<Vec<PathBuf>, BuildError> {
        Ok(vec![PathBuf::from(&self.settings.output)])
    }

    async fn run(&self, paths: &ProjectPaths, variant: Variant) -> Result<TaskReport, BuildError> {
        let start = Instant::now();
        let entry = paths.source(&self.settings.entry);

        if !entry.is_file() {
            return Err(BuildError::SourceRead {
                task: self.name.clone(),
                path: entry,
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "entry script not found"),
            });
        }

        let output = paths.dist_within(&self.settings.output)?;

        let args = self.command_line(paths, variant);
        let Some((program, rest)) = args.split_first() else {
            return Err(self.failure(paths, "bundle command is empty".to_string()));
        };

        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BuildError::Write {
                    task: self.name.clone(),
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }

        tracing::debug!("[{}] running {}", self.name, args.join(" "));

        let result = Command::new(program)
            .args(rest)
            .current_dir(&paths.root)
            .output()
            .await
            .map_err(|e| self.failure(paths, format!("failed to start {}: {}", program, e)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(self.failure(
                paths,
                format!("{} exited with {}: {}", program, result.status, stderr.trim()),
            ));
        }

        let report = TaskReport {
            task: self.name.clone(),
            files: 1,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        tracing::info!("[{}] bundled {} in {}ms", self.name, self.settings.output, report.duration_ms);

        Ok(report)
    }
}

//! Build errors.

use std::fmt;
use std::path::PathBuf;

use crate::task::TaskReport;

/// Errors that can occur while running a task or the clean step.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("[{task}] failed to read {path}: {source}")]
    SourceRead {
        task: String,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("[{task}] step '{step}' rejected {path}: {message}")]
    Transform {
        task: String,
        step: String,
        path: PathBuf,
        message: String,
    },

    #[error("[{task}] failed to write {path}: {source}")]
    Write {
        task: String,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to clean {path}: {source}")]
    Clean {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("refusing to touch {path}: not inside {root}")]
    OutsideRoot { path: PathBuf, root: PathBuf },

    #[error("invalid glob pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },

    #[error("tasks '{first}' and '{second}' both write {path}")]
    Overlap {
        path: PathBuf,
        first: String,
        second: String,
    },

    #[error("unknown task or workflow: {0}")]
    UnknownTask(String),

    #[error("task '{0}' is registered twice")]
    DuplicateTask(String),

    #[error("[{task}] worker stopped unexpectedly: {message}")]
    Join { task: String, message: String },
}

impl BuildError {
    /// Name of the task this error belongs to, if any.
    pub fn task(&self) -> Option<&str> {
        match self {
            BuildError::SourceRead { task, .. }
            | BuildError::Transform { task, .. }
            | BuildError::Write { task, .. }
            | BuildError::Join { task, .. } => Some(task),
            _ => None,
        }
    }
}

/// A workflow run in which at least one node failed.
///
/// Carries every failure from the failing group plus the reports of the
/// tasks that completed, whose output stays in place.
#[derive(Debug)]
pub struct WorkflowError {
    /// Workflow name
    pub workflow: String,

    /// All failures, in declaration order
    pub failures: Vec<BuildError>,

    /// Tasks that finished successfully before or alongside the failures
    pub completed: Vec<TaskReport>,
}

impl fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "workflow '{}' failed with {} error(s)",
            self.workflow,
            self.failures.len()
        )?;
        for failure in &self.failures {
            write!(f, "\n  - {}", failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for WorkflowError {}

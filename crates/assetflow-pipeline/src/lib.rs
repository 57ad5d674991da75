//! Build task orchestration for assetflow.
//!
//! Declares the transform tasks that turn `src/` into `dist/`, composes them
//! into the `default` and `release` workflows, and runs them.

pub mod bundle;
pub mod clean;
pub mod config;
pub mod error;
pub mod graph;
pub mod html;
pub mod images;
pub mod paths;
pub mod sources;
pub mod sourcemaps;
pub mod step;
pub mod styles;
pub mod task;
pub mod templates;

pub use clean::clean;
pub use config::PipelineConfig;
pub use error::{BuildError, WorkflowError};
pub use graph::{Node, TaskGraph, WatchBinding, Workflow, WorkflowReport};
pub use paths::ProjectPaths;
pub use step::{Asset, Chain, Step, StepError};
pub use task::{Task, TaskReport, TaskSpec, TransformTask, Variant};

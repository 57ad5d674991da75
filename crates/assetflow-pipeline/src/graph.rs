//! Task graph: registered tasks composed into named workflows.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use futures::future::{join_all, BoxFuture, FutureExt};

use crate::bundle::BundleTask;
use crate::clean::clean;
use crate::config::PipelineConfig;
use crate::error::{BuildError, WorkflowError};
use crate::html::MinifyHtml;
use crate::images::OptimizeImages;
use crate::paths::{normalize, ProjectPaths};
use crate::sourcemaps::SourceMaps;
use crate::step::Chain;
use crate::styles::{CompileStyles, MinifyCss};
use crate::task::{Task, TaskReport, TaskSpec, TransformTask, Variant};
use crate::templates::RenderTemplates;

/// A node in a workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Run a registered task by name
    Task(String),
    /// Empty the dist root
    Clean,
    /// Run children one after another; stop at the first failing child
    Series(Vec<Node>),
    /// Start all children, wait for all of them
    Parallel(Vec<Node>),
}

impl Node {
    /// Parallel group of tasks.
    pub fn parallel<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Node::Parallel(names.into_iter().map(|n| Node::Task(n.into())).collect())
    }

    /// Every task name referenced by this node, in declaration order.
    pub fn task_names(&self) -> Vec<&str> {
        match self {
            Node::Task(name) => vec![name.as_str()],
            Node::Clean => Vec::new(),
            Node::Series(nodes) | Node::Parallel(nodes) => {
                nodes.iter().flat_map(|n| n.task_names()).collect()
            }
        }
    }
}

/// A named build mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workflow {
    pub name: String,
    pub variant: Variant,
    pub root: Node,
}

/// A source glob whose changes re-run a task. Several bindings may name the
/// same task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchBinding {
    /// Glob relative to the source root
    pub glob: String,
    /// Task to re-run
    pub task: String,
}

/// Result of a successful workflow run.
#[derive(Debug, Clone)]
pub struct WorkflowReport {
    pub workflow: String,
    pub variant: Variant,
    pub tasks: Vec<TaskReport>,
    pub duration_ms: u64,
}

#[derive(Default)]
struct Outcome {
    reports: Vec<TaskReport>,
    failures: Vec<BuildError>,
}

impl Outcome {
    fn failed(error: BuildError) -> Self {
        Self {
            reports: Vec::new(),
            failures: vec![error],
        }
    }

    fn merge(&mut self, other: Outcome) {
        self.reports.extend(other.reports);
        self.failures.extend(other.failures);
    }
}

/// Registered tasks, workflows and watch bindings. Built once at startup.
pub struct TaskGraph {
    paths: Arc<ProjectPaths>,
    tasks: BTreeMap<String, Arc<dyn Task>>,
    workflows: BTreeMap<String, Workflow>,
    bindings: Vec<WatchBinding>,
}

impl std::fmt::Debug for TaskGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGraph")
            .field("paths", &self.paths)
            .field("tasks", &self.tasks.keys().collect::<Vec<_>>())
            .field("workflows", &self.workflows)
            .field("bindings", &self.bindings)
            .finish()
    }
}

impl TaskGraph {
    /// Start building a graph.
    pub fn builder(paths: ProjectPaths) -> TaskGraphBuilder {
        TaskGraphBuilder {
            paths,
            tasks: Vec::new(),
            workflows: Vec::new(),
            bindings: Vec::new(),
        }
    }

    /// The canonical graph: `html`, `templates`, `styles`, `images`, plus
    /// `scripts` when a bundler is configured.
    ///
    /// `default` runs the transform tasks in parallel with dev chains;
    /// `release` cleans first, then runs them with release chains. The
    /// bundler stays standalone.
    pub fn from_config(paths: ProjectPaths, config: &PipelineConfig) -> Result<Self, BuildError> {
        let html = &config.html;
        let html_task = TaskSpec::new("html", &html.input, &html.output).exclude(html.exclude.clone());

        let tpl = &config.templates;
        let templates_dir = paths.source(&tpl.dir);
        let data_file = tpl.data.as_ref().map(|d| paths.source(d));
        let templates_task = TaskSpec::new("templates", &tpl.input, &tpl.output)
            .exclude(tpl.exclude.clone())
            .dev(Chain::new().then(RenderTemplates::new(&templates_dir, data_file.clone())))
            .release(
                Chain::new()
                    .then(RenderTemplates::new(&templates_dir, data_file))
                    .then(MinifyHtml),
            );

        let styles = &config.styles;
        let styles_task = TaskSpec::new("styles", &styles.input, &styles.output)
            .exclude(styles.exclude.clone())
            .dev(Chain::new().then(SourceMaps::wrap(CompileStyles::new(
                styles.targets,
                &paths.source_root,
            ))))
            .release(
                Chain::new()
                    .then(CompileStyles::new(styles.targets, &paths.source_root))
                    .then(MinifyCss::new(styles.targets)),
            );

        let images = &config.images;
        let optimize = OptimizeImages::new(images.jpeg_quality, images.png_compression)
            .with_png_quality(images.png_quality);
        let images_task = TaskSpec::new("images", &images.input, &images.output)
            .exclude(images.exclude.clone())
            .dev(Chain::new().then(optimize.clone()))
            .release(Chain::new().then(optimize));

        let transforms = ["html", "templates", "styles", "images"];

        let mut builder = Self::builder(paths)
            .task(TransformTask::new(html_task))
            .task(TransformTask::new(templates_task))
            .task(TransformTask::new(styles_task))
            .task(TransformTask::new(images_task))
            .workflow(Workflow {
                name: "default".to_string(),
                variant: Variant::Dev,
                root: Node::parallel(transforms),
            })
            .workflow(Workflow {
                name: "release".to_string(),
                variant: Variant::Release,
                root: Node::Series(vec![Node::Clean, Node::parallel(transforms)]),
            })
            .bind(&html.watch, "html")
            .bind(&tpl.watch, "templates")
            .bind(&styles.watch, "styles")
            .bind(&images.watch, "images");

        if let Some(data) = &tpl.data {
            builder = builder.bind(data, "templates");
        }

        if let Some(bundle) = &config.bundle {
            builder = builder
                .bind(&bundle.watch, "scripts")
                .task(BundleTask::new("scripts", bundle.clone()));
        }

        builder.build()
    }

    pub fn paths(&self) -> &ProjectPaths {
        &self.paths
    }

    /// Registered task names, sorted.
    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.keys().map(String::as_str).collect()
    }

    pub fn task(&self, name: &str) -> Option<Arc<dyn Task>> {
        self.tasks.get(name).cloned()
    }

    pub fn workflow(&self, name: &str) -> Option<&Workflow> {
        self.workflows.get(name)
    }

    pub fn bindings(&self) -> &[WatchBinding] {
        &self.bindings
    }

    /// Run one task on its own.
    ///
    /// Every registered task is planned first, so a standalone run cannot
    /// overwrite a file another task owns.
    pub async fn run_task(&self, name: &str, variant: Variant) -> Result<TaskReport, BuildError> {
        let task = self
            .task(name)
            .ok_or_else(|| BuildError::UnknownTask(name.to_string()))?;
        self.check_all_disjoint(variant).await?;
        task.run(&self.paths, variant).await
    }

    /// [`TaskGraph::check_disjoint`] over every registered task.
    pub async fn check_all_disjoint(&self, variant: Variant) -> Result<(), BuildError> {
        self.check_disjoint(&Node::parallel(self.task_names()), variant)
            .await
    }

    /// Run a named workflow.
    ///
    /// Outputs are checked for overlap before anything runs. Failures from a
    /// parallel group are all collected; completed tasks keep their output.
    pub async fn run_workflow(&self, name: &str) -> Result<WorkflowReport, WorkflowError> {
        let fail = |failures| WorkflowError {
            workflow: name.to_string(),
            failures,
            completed: Vec::new(),
        };

        let workflow = self
            .workflows
            .get(name)
            .ok_or_else(|| fail(vec![BuildError::UnknownTask(name.to_string())]))?;

        let start = Instant::now();
        tracing::info!("Running '{}' ({} variant)", workflow.name, workflow.variant);

        self.check_disjoint(&workflow.root, workflow.variant)
            .await
            .map_err(|e| fail(vec![e]))?;

        let outcome = self.execute(&workflow.root, workflow.variant).await;

        if !outcome.failures.is_empty() {
            return Err(WorkflowError {
                workflow: workflow.name.clone(),
                failures: outcome.failures,
                completed: outcome.reports,
            });
        }

        Ok(WorkflowReport {
            workflow: workflow.name.clone(),
            variant: workflow.variant,
            tasks: outcome.reports,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Fail if two tasks under `node` would write the same file.
    pub async fn check_disjoint(&self, node: &Node, variant: Variant) -> Result<(), BuildError> {
        let names = node.task_names();

        let plans = join_all(names.iter().map(|name| async move {
            let task = self
                .task(name)
                .ok_or_else(|| BuildError::UnknownTask(name.to_string()))?;
            task.plan(&self.paths, variant).await
        }))
        .await;

        let mut owners: HashMap<PathBuf, &str> = HashMap::new();
        for (name, plan) in names.iter().zip(plans) {
            for path in plan? {
                let path = normalize(&path);
                match owners.get(&path) {
                    Some(owner) if owner != name => {
                        return Err(BuildError::Overlap {
                            path,
                            first: owner.to_string(),
                            second: name.to_string(),
                        });
                    }
                    Some(_) => {}
                    None => {
                        owners.insert(path, *name);
                    }
                }
            }
        }

        Ok(())
    }

    async fn run_unchecked(&self, name: &str, variant: Variant) -> Result<TaskReport, BuildError> {
        let task = self
            .task(name)
            .ok_or_else(|| BuildError::UnknownTask(name.to_string()))?;
        task.run(&self.paths, variant).await
    }

    fn execute<'a>(&'a self, node: &'a Node, variant: Variant) -> BoxFuture<'a, Outcome> {
        async move {
            match node {
                Node::Clean => match clean(&self.paths).await {
                    Ok(_) => Outcome::default(),
                    Err(e) => Outcome::failed(e),
                },
                Node::Task(name) => match self.run_unchecked(name, variant).await {
                    Ok(report) => Outcome {
                        reports: vec![report],
                        failures: Vec::new(),
                    },
                    Err(e) => Outcome::failed(e),
                },
                Node::Series(nodes) => {
                    let mut outcome = Outcome::default();
                    for child in nodes {
                        outcome.merge(self.execute(child, variant).await);
                        if !outcome.failures.is_empty() {
                            break;
                        }
                    }
                    outcome
                }
                Node::Parallel(nodes) => {
                    let results = join_all(nodes.iter().map(|n| self.execute(n, variant))).await;
                    let mut outcome = Outcome::default();
                    for result in results {
                        outcome.merge(result);
                    }
                    outcome
                }
            }
        }
        .boxed()
    }
}

/// Collects tasks, workflows and bindings, then validates them.
pub struct TaskGraphBuilder {
    paths: ProjectPaths,
    tasks: Vec<Arc<dyn Task>>,
    workflows: Vec<Workflow>,
    bindings: Vec<WatchBinding>,
}

impl TaskGraphBuilder {
    pub fn task(mut self, task: impl Task + 'static) -> Self {
        self.tasks.push(Arc::new(task));
        self
    }

    pub fn workflow(mut self, workflow: Workflow) -> Self {
        self.workflows.push(workflow);
        self
    }

    pub fn bind(mut self, glob: impl Into<String>, task: impl Into<String>) -> Self {
        self.bindings.push(WatchBinding {
            glob: glob.into(),
            task: task.into(),
        });
        self
    }

    /// Reject duplicate task names, references to unknown tasks and outputs
    /// outside the dist root.
    pub fn build(self) -> Result<TaskGraph, BuildError> {
        let mut tasks = BTreeMap::new();
        for task in self.tasks {
            if let Some(output) = task.output() {
                self.paths.dist_within(output)?;
            }
            let name = task.name().to_string();
            if tasks.insert(name.clone(), task).is_some() {
                return Err(BuildError::DuplicateTask(name));
            }
        }

        let referenced = self
            .workflows
            .iter()
            .flat_map(|w| w.root.task_names())
            .chain(self.bindings.iter().map(|b| b.task.as_str()));
        for name in referenced {
            if !tasks.contains_key(name) {
                return Err(BuildError::UnknownTask(name.to_string()));
            }
        }

        for binding in &self.bindings {
            crate::sources::compile(&binding.glob)?;
        }

        let workflows = self
            .workflows
            .into_iter()
            .map(|w| (w.name.clone(), w))
            .collect();

        Ok(TaskGraph {
            paths: Arc::new(self.paths),
            tasks,
            workflows,
            bindings: self.bindings,
        })
    }
}

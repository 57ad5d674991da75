//! The watch/reload loop.
//!
//! Builds once, serves the dist root, then re-runs bound tasks when their
//! sources change and reloads browsers when the dist tree changes.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assetflow_pipeline::{ProjectPaths, TaskGraph, Variant, WatchBinding};
use globset::{GlobBuilder, GlobMatcher};
use tokio::sync::{oneshot, watch, Mutex};

use crate::debounce::Debouncer;
use crate::server::{DevServer, DevServerConfig, ServerError};
use crate::watcher::FileWatcher;
use crate::websocket::ReloadHub;

/// Observable lifecycle of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Starting,
    Serving,
    Rebuilding,
    Stopped,
}

/// Timing knobs.
#[derive(Debug, Clone, Copy)]
pub struct WatchOptions {
    /// Quiet period before a bound task re-runs
    pub debounce: Duration,

    /// Quiet period before browsers are told to reload
    pub reload_debounce: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(200),
            reload_debounce: Duration::from_millis(100),
        }
    }
}

/// Where a changed path should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Source change; re-run these tasks
    Tasks(Vec<String>),
    /// Output change; reload browsers
    Dist,
    /// Neither
    Ignored,
}

/// Compiled watch bindings plus the two roots they are matched against.
#[derive(Debug)]
pub struct BindingSet {
    source_roots: Vec<PathBuf>,
    dist_roots: Vec<PathBuf>,
    bindings: Vec<(GlobMatcher, String)>,
}

impl BindingSet {
    pub fn new(paths: &ProjectPaths, bindings: &[WatchBinding]) -> Result<Self, ServerError> {
        let compiled = bindings
            .iter()
            .map(|binding| {
                GlobBuilder::new(&binding.glob)
                    .literal_separator(true)
                    .build()
                    .map(|glob| (glob.compile_matcher(), binding.task.clone()))
                    .map_err(|e| ServerError::Pattern {
                        pattern: binding.glob.clone(),
                        message: e.to_string(),
                    })
            })
            .collect::<Result<_, _>>()?;

        Ok(Self {
            source_roots: with_canonical(&paths.source_root),
            dist_roots: with_canonical(&paths.dist_root),
            bindings: compiled,
        })
    }

    /// Classify a path reported by the watcher.
    pub fn route(&self, path: &Path) -> Route {
        if self.dist_roots.iter().any(|root| path.starts_with(root)) {
            return Route::Dist;
        }

        let Some(relative) = self
            .source_roots
            .iter()
            .find_map(|root| path.strip_prefix(root).ok())
        else {
            return Route::Ignored;
        };

        let mut tasks: Vec<String> = Vec::new();
        for (matcher, task) in &self.bindings {
            if matcher.is_match(relative) && !tasks.contains(task) {
                tasks.push(task.clone());
            }
        }

        if tasks.is_empty() {
            Route::Ignored
        } else {
            Route::Tasks(tasks)
        }
    }

    /// Distinct bound task names.
    pub fn tasks(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.bindings.iter().map(|(_, t)| t.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

/// Notify may report canonical paths (e.g. through a symlinked temp dir), so
/// match against both spellings.
fn with_canonical(path: &Path) -> Vec<PathBuf> {
    let mut roots = vec![path.to_path_buf()];
    if let Ok(canonical) = path.canonicalize() {
        if canonical != path {
            roots.push(canonical);
        }
    }
    roots
}

/// Tracks in-flight rebuilds and publishes the matching state.
struct Activity {
    state: watch::Sender<WatchState>,
    running: AtomicUsize,
}

impl Activity {
    fn set(&self, next: WatchState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::debug!("Watch state: {:?} -> {:?}", previous, next);
        }
    }

    fn begin(&self) {
        if self.running.fetch_add(1, Ordering::SeqCst) == 0 {
            self.state.send_if_modified(|state| {
                let serving = *state == WatchState::Serving;
                if serving {
                    *state = WatchState::Rebuilding;
                }
                serving
            });
        }
    }

    fn end(&self) {
        if self.running.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.state.send_if_modified(|state| {
                let rebuilding = *state == WatchState::Rebuilding;
                if rebuilding {
                    *state = WatchState::Serving;
                }
                rebuilding
            });
        }
    }
}

/// Long-running dev loop: initial build, server, watchers.
pub struct WatchLoop {
    graph: Arc<TaskGraph>,
    server: DevServerConfig,
    options: WatchOptions,
    hub: ReloadHub,
    activity: Arc<Activity>,
}

impl WatchLoop {
    pub fn new(graph: Arc<TaskGraph>, server: DevServerConfig, options: WatchOptions) -> Self {
        let (state, _) = watch::channel(WatchState::Starting);

        Self {
            graph,
            server,
            options,
            hub: ReloadHub::new(),
            activity: Arc::new(Activity {
                state,
                running: AtomicUsize::new(0),
            }),
        }
    }

    /// Subscribe to state changes.
    pub fn state(&self) -> watch::Receiver<WatchState> {
        self.activity.state.subscribe()
    }

    pub fn hub(&self) -> ReloadHub {
        self.hub.clone()
    }

    /// Run until `shutdown` resolves.
    ///
    /// Build failures are logged and never end the loop; only a failure to
    /// bind the server or set up the watchers is returned.
    pub async fn run<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let paths = self.graph.paths().clone();
        let routes = BindingSet::new(&paths, self.graph.bindings())?;

        if let Err(e) = self.graph.run_workflow("default").await {
            tracing::error!("{}", e);
        }
        // The server and both watchers need their directories even if nothing
        // was built.
        for dir in [&paths.source_root, &paths.dist_root] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| ServerError::Watch(format!("{}: {}", dir.display(), e)))?;
        }

        let server = DevServer::bind(self.server.clone(), self.hub.clone()).await?;
        let (stop_server, server_stopped) = oneshot::channel::<()>();
        let server_task = tokio::spawn(server.serve(async {
            let _ = server_stopped.await;
        }));

        let (watcher, mut changes) =
            FileWatcher::new(&[paths.source_root.clone(), paths.dist_root.clone()])?;

        let reload = {
            let hub = self.hub.clone();
            Debouncer::spawn(self.options.reload_debounce, move || {
                hub.reload();
                async {}
            })
        };

        let bound = routes.tasks();
        let locks = output_locks(bound.iter().map(|task| {
            let output = self
                .graph
                .task(task)
                .and_then(|t| t.output().and_then(|o| paths.dist_within(o).ok()));
            (task.to_string(), output)
        }));
        let dispatchers: BTreeMap<String, Debouncer> = bound
            .into_iter()
            .map(|task| {
                let lock = locks.get(task).cloned().unwrap_or_default();
                (task.to_string(), self.rebuild_dispatcher(task, lock))
            })
            .collect();

        self.activity.set(WatchState::Serving);
        tracing::info!("Watching {} for changes", paths.source_root.display());

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                change = changes.recv() => {
                    let Some(path) = change else { break };
                    match routes.route(&path) {
                        Route::Tasks(tasks) => {
                            for task in tasks {
                                tracing::debug!("{} changed, scheduling {}", path.display(), task);
                                if let Some(dispatcher) = dispatchers.get(&task) {
                                    dispatcher.trigger();
                                }
                            }
                        }
                        Route::Dist => reload.trigger(),
                        Route::Ignored => {}
                    }
                }
            }
        }

        drop(watcher);
        drop(dispatchers);
        drop(reload);
        let _ = stop_server.send(());

        let result = match server_task.await {
            Ok(result) => result,
            Err(e) => Err(ServerError::Serve(std::io::Error::other(e))),
        };

        self.activity.set(WatchState::Stopped);
        tracing::info!("Stopped watching");
        result
    }

    /// Rebuilds run under `lock`, shared by every task whose output tree
    /// nests with this one. Overlapping outputs are refused by
    /// [`TaskGraph::run_task`]; the error is logged and the run skipped.
    fn rebuild_dispatcher(&self, task: &str, lock: Arc<Mutex<()>>) -> Debouncer {
        let graph = Arc::clone(&self.graph);
        let activity = Arc::clone(&self.activity);
        let task = task.to_string();

        Debouncer::spawn(self.options.debounce, move || {
            let graph = Arc::clone(&graph);
            let activity = Arc::clone(&activity);
            let lock = Arc::clone(&lock);
            let task = task.clone();

            async move {
                let _guard = lock.lock().await;
                activity.begin();
                match graph.run_task(&task, Variant::Dev).await {
                    Ok(report) => tracing::debug!("Rebuilt {} ({} files)", task, report.files),
                    Err(e) => tracing::error!("{}", e),
                }
                activity.end();
            }
        })
    }
}

/// One lock per group of tasks whose output directories nest. Tasks without
/// a known output get a lock of their own.
fn output_locks(
    outputs: impl IntoIterator<Item = (String, Option<PathBuf>)>,
) -> BTreeMap<String, Arc<Mutex<()>>> {
    let mut groups: Vec<(PathBuf, Arc<Mutex<()>>)> = Vec::new();
    let mut locks = BTreeMap::new();

    for (task, output) in outputs {
        let lock = match output {
            Some(output) => {
                let shared = groups
                    .iter()
                    .find(|(dir, _)| dir.starts_with(&output) || output.starts_with(dir))
                    .map(|(_, lock)| Arc::clone(lock));
                shared.unwrap_or_else(|| {
                    let lock = Arc::new(Mutex::new(()));
                    groups.push((output, Arc::clone(&lock)));
                    lock
                })
            }
            None => Arc::new(Mutex::new(())),
        };
        locks.insert(task, lock);
    }

    locks
}

#[cfg(test)]
mod tests {
    use super::*;
    use assetflow_pipeline::PipelineConfig;
    use std::fs;
    use tempfile::tempdir;
    use tokio::time::timeout;

    fn routes(root: &Path) -> BindingSet {
        let paths = ProjectPaths::new(root);
        BindingSet::new(
            &paths,
            &[
                WatchBinding {
                    glob: "styles/**/*.css".to_string(),
                    task: "styles".to_string(),
                },
                WatchBinding {
                    glob: "templates/**/*.jinja".to_string(),
                    task: "templates".to_string(),
                },
                WatchBinding {
                    glob: "data/site.json".to_string(),
                    task: "templates".to_string(),
                },
            ],
        )
        .unwrap()
    }

    #[test]
    fn routes_sources_to_bound_tasks() {
        let routes = routes(Path::new("/p"));

        assert_eq!(
            routes.route(Path::new("/p/src/styles/_vars.css")),
            Route::Tasks(vec!["styles".to_string()])
        );
        assert_eq!(
            routes.route(Path::new("/p/src/data/site.json")),
            Route::Tasks(vec!["templates".to_string()])
        );
        assert_eq!(routes.route(Path::new("/p/dist/css/site.css")), Route::Dist);
        assert_eq!(routes.route(Path::new("/p/src/notes.txt")), Route::Ignored);
        assert_eq!(routes.route(Path::new("/elsewhere/a.css")), Route::Ignored);
    }

    #[test]
    fn star_does_not_cross_directories() {
        let paths = ProjectPaths::new("/p");
        let routes = BindingSet::new(
            &paths,
            &[WatchBinding {
                glob: "*.html".to_string(),
                task: "html".to_string(),
            }],
        )
        .unwrap();

        assert!(matches!(routes.route(Path::new("/p/src/a.html")), Route::Tasks(_)));
        assert_eq!(routes.route(Path::new("/p/src/sub/a.html")), Route::Ignored);
    }

    #[test]
    fn lists_each_bound_task_once() {
        assert_eq!(routes(Path::new("/p")).tasks(), vec!["styles", "templates"]);
    }

    #[test]
    fn invalid_glob_is_rejected() {
        let paths = ProjectPaths::new("/p");
        let err = BindingSet::new(
            &paths,
            &[WatchBinding {
                glob: "styles/[".to_string(),
                task: "styles".to_string(),
            }],
        )
        .unwrap_err();

        assert!(matches!(err, ServerError::Pattern { .. }));
    }

    #[test]
    fn nested_outputs_share_a_rebuild_lock() {
        let locks = output_locks([
            ("html".to_string(), Some(PathBuf::from("/p/dist"))),
            ("styles".to_string(), Some(PathBuf::from("/p/dist/css"))),
            ("scripts".to_string(), None),
        ]);
        assert!(Arc::ptr_eq(&locks["html"], &locks["styles"]));
        assert!(!Arc::ptr_eq(&locks["html"], &locks["scripts"]));

        let locks = output_locks([
            ("styles".to_string(), Some(PathBuf::from("/p/dist/css"))),
            ("images".to_string(), Some(PathBuf::from("/p/dist/images"))),
        ]);
        assert!(!Arc::ptr_eq(&locks["styles"], &locks["images"]));
    }

    #[tokio::test]
    async fn creates_missing_source_root_before_watching() {
        let temp = tempdir().unwrap();
        let paths = ProjectPaths::new(temp.path());
        let graph = TaskGraph::from_config(paths.clone(), &PipelineConfig::default()).unwrap();
        let watch_loop = WatchLoop::new(
            Arc::new(graph),
            DevServerConfig {
                dist_root: paths.dist_root.clone(),
                port: 0,
                host: "127.0.0.1".to_string(),
                open: false,
            },
            WatchOptions {
                debounce: Duration::from_millis(50),
                reload_debounce: Duration::from_millis(50),
            },
        );
        let mut state = watch_loop.state();

        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(watch_loop.run(async {
            let _ = stopped.await;
        }));

        wait_for(&mut state, WatchState::Serving).await;
        assert!(paths.source_root.is_dir());
        assert!(paths.dist_root.is_dir());

        stop.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    async fn wait_for(rx: &mut watch::Receiver<WatchState>, want: WatchState) {
        timeout(Duration::from_secs(10), rx.wait_for(|s| *s == want))
            .await
            .expect("timed out waiting for state")
            .unwrap();
    }

    #[tokio::test]
    async fn rebuilds_changed_sources_and_reloads() {
        let temp = tempdir().unwrap();
        let paths = ProjectPaths::new(temp.path());
        fs::create_dir_all(paths.source("styles")).unwrap();
        fs::write(paths.source("styles/site.css"), "body { margin: 0; }").unwrap();

        let graph = TaskGraph::from_config(paths.clone(), &PipelineConfig::default()).unwrap();
        let watch_loop = WatchLoop::new(
            Arc::new(graph),
            DevServerConfig {
                dist_root: paths.dist_root.clone(),
                port: 0,
                host: "127.0.0.1".to_string(),
                open: false,
            },
            WatchOptions {
                debounce: Duration::from_millis(50),
                reload_debounce: Duration::from_millis(50),
            },
        );
        let mut state = watch_loop.state();
        let mut reloads = watch_loop.hub().subscribe();

        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(watch_loop.run(async {
            let _ = stopped.await;
        }));

        wait_for(&mut state, WatchState::Serving).await;
        assert!(paths.dist("css/site.css").exists());

        // Give the watcher time to register
        tokio::time::sleep(Duration::from_millis(200)).await;
        fs::write(paths.source("styles/site.css"), ".changed { color: red; }").unwrap();

        let rebuilt = timeout(Duration::from_secs(10), async {
            loop {
                let css = fs::read_to_string(paths.dist("css/site.css")).unwrap_or_default();
                if css.contains(".changed") {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await;
        assert!(rebuilt.is_ok(), "stylesheet was not rebuilt");

        let reload = timeout(Duration::from_secs(10), reloads.recv()).await;
        assert!(reload.is_ok(), "no reload after dist changed");

        stop.send(()).unwrap();
        handle.await.unwrap().unwrap();
        assert_eq!(*state.borrow(), WatchState::Stopped);
    }
}

//! Development server with live reload for assetflow.
//!
//! Serves the dist tree, watches sources for changes, re-runs the bound
//! build tasks and tells connected browsers to reload.

pub mod debounce;
pub mod server;
pub mod watch_loop;
pub mod watcher;
pub mod websocket;

pub use debounce::Debouncer;
pub use server::{DevServer, DevServerConfig, ServerError};
pub use watch_loop::{BindingSet, Route, WatchLoop, WatchOptions, WatchState};
pub use watcher::FileWatcher;
pub use websocket::{ReloadHub, ReloadMessage};

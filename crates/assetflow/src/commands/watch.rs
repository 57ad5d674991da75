//! Watch command: build, serve and rebuild on change.

use std::sync::Arc;

use anyhow::Result;
use assetflow_server::WatchLoop;

use crate::commands::shutdown_signal;
use crate::config::Project;

pub async fn run(project: &Project, port: Option<u16>, open: bool) -> Result<()> {
    let graph = Arc::new(project.graph()?);
    let watch_loop = WatchLoop::new(graph, project.server(port, open), project.watch_options());

    watch_loop.run(shutdown_signal()).await?;

    Ok(())
}

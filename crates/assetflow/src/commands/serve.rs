//! Serve command: dist/ with live reload, no watchers.

use anyhow::Result;
use assetflow_server::{DevServer, ReloadHub};

use crate::commands::shutdown_signal;
use crate::config::Project;

pub async fn run(project: &Project, port: Option<u16>, open: bool) -> Result<()> {
    let dist = &project.paths.dist_root;
    if !dist.exists() {
        anyhow::bail!(
            "Directory not found: {}. Run 'assetflow' first.",
            dist.display()
        );
    }

    let server = DevServer::bind(project.server(port, open), ReloadHub::new()).await?;
    server.serve(shutdown_signal()).await?;

    Ok(())
}

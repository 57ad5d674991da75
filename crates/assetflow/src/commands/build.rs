//! Batch build commands: workflows, single tasks and clean.

use anyhow::Result;
use assetflow_pipeline::Variant;

use crate::config::Project;

/// Run a named workflow.
pub async fn workflow(project: &Project, name: &str) -> Result<()> {
    let graph = project.graph()?;
    let report = graph.run_workflow(name).await?;

    let files: usize = report.tasks.iter().map(|t| t.files).sum();
    tracing::info!(
        "Built '{}' ({}): {} task(s), {} file(s) in {}ms",
        report.workflow,
        report.variant,
        report.tasks.len(),
        files,
        report.duration_ms
    );
    tracing::info!("Output: {}", project.paths.dist_root.display());

    Ok(())
}

/// Run one task standalone.
pub async fn task(project: &Project, name: &str, release: bool) -> Result<()> {
    let graph = project.graph()?;
    let variant = if release { Variant::Release } else { Variant::Dev };

    if graph.task(name).is_none() {
        anyhow::bail!(
            "Unknown task '{}'. Available: {}",
            name,
            graph.task_names().join(", ")
        );
    }

    graph.run_task(name, variant).await?;
    Ok(())
}

/// Empty the dist directory.
pub async fn clean(project: &Project) -> Result<()> {
    assetflow_pipeline::clean(&project.paths).await?;
    Ok(())
}

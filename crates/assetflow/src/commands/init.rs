//! Scaffold a new project.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::config::CONFIG_FILE;

const FILES: &[(&str, &str)] = &[
    (CONFIG_FILE, DEFAULT_CONFIG),
    ("src/data/site.json", DEFAULT_DATA),
    ("src/templates/_partials/header.jinja", DEFAULT_HEADER),
    ("src/templates/index.jinja", DEFAULT_INDEX),
    ("src/styles/_variables.css", DEFAULT_VARIABLES),
    ("src/styles/main.css", DEFAULT_STYLES),
];

/// Run the init command.
pub async fn run(root: &Path, yes: bool) -> Result<()> {
    tracing::info!("Initializing assetflow in {}", root.display());

    for (relative, contents) in FILES {
        let path = root.join(relative);
        if path.exists() && !yes {
            tracing::warn!("{} already exists. Use --yes to overwrite.", relative);
            continue;
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("Failed to write {}", relative))?;
        tracing::info!("Created {}", relative);
    }

    let images = root.join("src/images");
    fs::create_dir_all(&images).context("Failed to create src/images")?;

    tracing::info!("Initialization complete!");
    tracing::info!("Run 'assetflow watch' to start the development server.");

    Ok(())
}

const DEFAULT_CONFIG: &str = r#"# assetflow configuration
# Globs are relative to src/, outputs relative to dist/.

[server]
host = "127.0.0.1"
port = 3000
open = true

[watch]
# Quiet period before a changed task is rebuilt
debounce_ms = 200

[templates]
# Shared render context, re-read on every build
data = "data/site.json"

[styles.targets]
chrome = 90
firefox = 88
safari = 14

[images]
jpeg_quality = 90
png_compression = "best"
# Lossy PNG output, 1-100; omit for lossless
# png_quality = 70

# Optional external bundler for js/main.js
# [bundle]
# command = ["esbuild", "{entry}", "--bundle", "--outfile={output}"]
# release_args = ["--minify"]
"#;

const DEFAULT_DATA: &str = r#"{
  "title": "My Site"
}
"#;

const DEFAULT_HEADER: &str = r#"<header>
  <h1>{{ title }}</h1>
</header>
"#;

const DEFAULT_INDEX: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>{{ title }}</title>
  <link rel="stylesheet" href="/css/main.css">
</head>
<body>
  {% include "_partials/header.jinja" %}
  <main>
    <p>Edit <code>src/templates/index.jinja</code> to get started.</p>
  </main>
</body>
</html>
"#;

const DEFAULT_VARIABLES: &str = r#":root {
  --accent: #3b82f6;
}
"#;

const DEFAULT_STYLES: &str = r#"@import "_variables.css";

body {
  font-family: system-ui, sans-serif;
  max-width: 800px;
  margin: 2rem auto;
  padding: 0 1rem;
}

h1 {
  color: var(--accent);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Project;
    use tempfile::tempdir;

    #[tokio::test]
    async fn scaffolds_a_buildable_project() {
        let temp = tempdir().unwrap();

        run(temp.path(), false).await.unwrap();

        assert!(temp.path().join(CONFIG_FILE).exists());
        assert!(temp.path().join("src/images").is_dir());

        let project = Project::load(temp.path(), None).unwrap();
        crate::commands::build::workflow(&project, "default").await.unwrap();

        let html = fs::read_to_string(project.paths.dist("index.html")).unwrap();
        assert!(html.contains("<h1>My Site</h1>"));
        assert!(project.paths.dist("css/main.css").exists());
        assert!(!project.paths.dist("css/_variables.css").exists());
    }

    #[tokio::test]
    async fn keeps_existing_files_without_yes() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join(CONFIG_FILE), "# mine").unwrap();

        run(temp.path(), false).await.unwrap();
        assert_eq!(fs::read_to_string(temp.path().join(CONFIG_FILE)).unwrap(), "# mine");

        run(temp.path(), true).await.unwrap();
        assert_ne!(fs::read_to_string(temp.path().join(CONFIG_FILE)).unwrap(), "# mine");
    }
}

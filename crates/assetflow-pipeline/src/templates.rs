//! Template rendering with minijinja.

use std::fs;
use std::path::{Path, PathBuf};

use minijinja::Environment;
use serde_json::Value;

use crate::step::{map_each, Asset, Step, StepError};

/// Renders `.jinja` sources to `.html`.
///
/// Includes and `extends` resolve against `templates_dir`, so partials that
/// are excluded from the task's input can still be pulled in.
pub struct RenderTemplates {
    env: Environment<'static>,
    templates_dir: PathBuf,
    data_file: Option<PathBuf>,
}

impl RenderTemplates {
    /// Create a renderer rooted at `templates_dir`.
    ///
    /// When `data_file` is set its contents (JSON, or YAML for `.yml`/`.yaml`)
    /// become the render context. The file is read on every run so edits are
    /// picked up by the watch loop.
    pub fn new(templates_dir: impl Into<PathBuf>, data_file: Option<PathBuf>) -> Self {
        let templates_dir = templates_dir.into();

        let mut env = Environment::new();
        env.set_loader(minijinja::path_loader(&templates_dir));

        Self {
            env,
            templates_dir,
            data_file,
        }
    }

    fn load_data(&self) -> Result<Value, StepError> {
        let Some(path) = &self.data_file else {
            return Ok(Value::Object(Default::default()));
        };

        let content = fs::read_to_string(path)
            .map_err(|e| StepError::new(path, format!("failed to read template data: {}", e)))?;

        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yml") | Some("yaml")
        );

        if is_yaml {
            serde_yaml::from_str(&content)
                .map_err(|e| StepError::new(path, format!("invalid YAML: {}", e)))
        } else {
            serde_json::from_str(&content)
                .map_err(|e| StepError::new(path, format!("invalid JSON: {}", e)))
        }
    }

    fn template_name(&self, source: &Path) -> String {
        source
            .strip_prefix(&self.templates_dir)
            .unwrap_or(source)
            .to_string_lossy()
            .replace('\\', "/")
    }
}

impl Step for RenderTemplates {
    fn name(&self) -> &str {
        "render-templates"
    }

    fn apply(&self, assets: Vec<Asset>) -> Result<Vec<Asset>, StepError> {
        let data = self.load_data()?;

        map_each(assets, |mut asset| {
            let name = self.template_name(&asset.source);
            let html = self
                .env
                .render_named_str(&name, asset.text()?, &data)
                .map_err(|e| StepError::new(&asset.source, describe(&e)))?;

            asset.contents = html.into_bytes();
            asset.relative = self.rename(&asset.relative);
            Ok(asset)
        })
    }

    fn rename(&self, relative: &Path) -> PathBuf {
        relative.with_extension("html")
    }
}

/// Flatten a minijinja error and its causes into one line.
fn describe(err: &minijinja::Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn asset(dir: &Path, name: &str, body: &str) -> Asset {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        Asset::new(path, name, body.as_bytes().to_vec())
    }

    #[test]
    fn renders_with_partials_and_renames() {
        let temp = tempdir().unwrap();
        let dir = temp.path();
        fs::create_dir_all(dir.join("_partials")).unwrap();
        fs::write(dir.join("_partials/header.jinja"), "<header>Site</header>").unwrap();

        let step = RenderTemplates::new(dir, None);
        let out = step
            .apply(vec![asset(
                dir,
                "index.jinja",
                "{% include \"_partials/header.jinja\" %}<p>{{ 1 + 1 }}</p>",
            )])
            .unwrap();

        assert_eq!(out[0].relative, PathBuf::from("index.html"));
        assert_eq!(
            String::from_utf8(out[0].contents.clone()).unwrap(),
            "<header>Site</header><p>2</p>"
        );
    }

    #[test]
    fn injects_shared_data() {
        let temp = tempdir().unwrap();
        let dir = temp.path();
        let data = dir.join("site.yaml");
        fs::write(&data, "title: Hello\nitems: [a, b]\n").unwrap();

        let step = RenderTemplates::new(dir, Some(data));
        let out = step
            .apply(vec![asset(
                dir,
                "page.jinja",
                "{{ title }}{% for i in items %}-{{ i }}{% endfor %}",
            )])
            .unwrap();

        assert_eq!(String::from_utf8(out[0].contents.clone()).unwrap(), "Hello-a-b");
    }

    #[test]
    fn reports_malformed_template() {
        let temp = tempdir().unwrap();
        let dir = temp.path();

        let step = RenderTemplates::new(dir, None);
        let err = step
            .apply(vec![
                asset(dir, "ok.jinja", "fine"),
                asset(dir, "broken.jinja", "{% if %}"),
            ])
            .unwrap_err();

        assert_eq!(err.path, dir.join("broken.jinja"));
    }

    #[test]
    fn missing_data_file_is_an_error() {
        let temp = tempdir().unwrap();
        let dir = temp.path();

        let step = RenderTemplates::new(dir, Some(dir.join("nope.json")));
        let err = step.apply(vec![asset(dir, "a.jinja", "x")]).unwrap_err();

        assert!(err.message.contains("template data"));
    }
}

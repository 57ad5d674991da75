//! Pipeline configuration.
//!
//! Every task gets its own settings struct; there is no shared mutable
//! settings object. All globs are relative to the source root and all
//! outputs relative to the dist root.

use serde::Deserialize;

use crate::images::PngCompression;
use crate::styles::BrowserTargets;

/// Settings for every task in the canonical graph.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub html: HtmlSettings,
    #[serde(default)]
    pub templates: TemplateSettings,
    #[serde(default)]
    pub styles: StyleSettings,
    #[serde(default)]
    pub images: ImageSettings,
    /// External module bundler; disabled when absent
    #[serde(default)]
    pub bundle: Option<BundleSettings>,
}

/// Plain HTML copied as-is.
#[derive(Debug, Clone, Deserialize)]
pub struct HtmlSettings {
    #[serde(default = "default_html_input")]
    pub input: String,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub output: String,
    #[serde(default = "default_html_input")]
    pub watch: String,
}

impl Default for HtmlSettings {
    fn default() -> Self {
        Self {
            input: default_html_input(),
            exclude: Vec::new(),
            output: String::new(),
            watch: default_html_input(),
        }
    }
}

/// minijinja templates rendered to HTML.
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateSettings {
    #[serde(default = "default_templates_input")]
    pub input: String,
    #[serde(default = "default_templates_exclude")]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub output: String,
    /// Directory that includes and `extends` resolve against
    #[serde(default = "default_templates_dir")]
    pub dir: String,
    /// Watched glob; covers partials so editing one re-renders pages
    #[serde(default = "default_templates_input")]
    pub watch: String,
    /// Shared render context file (JSON or YAML)
    #[serde(default)]
    pub data: Option<String>,
}

impl Default for TemplateSettings {
    fn default() -> Self {
        Self {
            input: default_templates_input(),
            exclude: default_templates_exclude(),
            output: String::new(),
            dir: default_templates_dir(),
            watch: default_templates_input(),
            data: None,
        }
    }
}

/// Stylesheets compiled with lightningcss.
#[derive(Debug, Clone, Deserialize)]
pub struct StyleSettings {
    #[serde(default = "default_styles_input")]
    pub input: String,
    #[serde(default = "default_styles_exclude")]
    pub exclude: Vec<String>,
    #[serde(default = "default_styles_output")]
    pub output: String,
    #[serde(default = "default_styles_input")]
    pub watch: String,
    #[serde(default)]
    pub targets: BrowserTargets,
}

impl Default for StyleSettings {
    fn default() -> Self {
        Self {
            input: default_styles_input(),
            exclude: default_styles_exclude(),
            output: default_styles_output(),
            watch: default_styles_input(),
            targets: BrowserTargets::default(),
        }
    }
}

/// Images re-encoded for size.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageSettings {
    #[serde(default = "default_images_input")]
    pub input: String,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default = "default_images_output")]
    pub output: String,
    #[serde(default = "default_images_input")]
    pub watch: String,
    /// JPEG quality, 1-100
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    #[serde(default)]
    pub png_compression: PngCompression,
    /// Lossy PNG quality, 1-100; lossless when unset
    #[serde(default)]
    pub png_quality: Option<u8>,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            input: default_images_input(),
            exclude: Vec::new(),
            output: default_images_output(),
            watch: default_images_input(),
            jpeg_quality: default_jpeg_quality(),
            png_compression: PngCompression::default(),
            png_quality: None,
        }
    }
}

/// External bundler invocation.
///
/// `{entry}` and `{output}` in `command` are replaced by absolute paths.
#[derive(Debug, Clone, Deserialize)]
pub struct BundleSettings {
    #[serde(default = "default_bundle_entry")]
    pub entry: String,
    #[serde(default = "default_bundle_output")]
    pub output: String,
    pub command: Vec<String>,
    /// Extra arguments appended for release runs
    #[serde(default)]
    pub release_args: Vec<String>,
    #[serde(default = "default_bundle_watch")]
    pub watch: String,
}

fn default_html_input() -> String {
    "**/*.html".to_string()
}
fn default_templates_input() -> String {
    "templates/**/*.jinja".to_string()
}
fn default_templates_exclude() -> Vec<String> {
    vec![
        "templates/_partials/**".to_string(),
        "templates/**/_*.jinja".to_string(),
    ]
}
fn default_templates_dir() -> String {
    "templates".to_string()
}
fn default_styles_input() -> String {
    "styles/**/*.css".to_string()
}
fn default_styles_exclude() -> Vec<String> {
    vec!["styles/**/_*.css".to_string()]
}
fn default_styles_output() -> String {
    "css".to_string()
}
fn default_images_input() -> String {
    "images/**/*".to_string()
}
fn default_images_output() -> String {
    "images".to_string()
}
fn default_jpeg_quality() -> u8 {
    90
}
fn default_bundle_entry() -> String {
    "js/main.js".to_string()
}
fn default_bundle_output() -> String {
    "js/bundle.js".to_string()
}
fn default_bundle_watch() -> String {
    "js/**/*.js".to_string()
}

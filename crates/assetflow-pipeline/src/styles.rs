//! Stylesheet compilation with lightningcss.

use std::path::PathBuf;

use lightningcss::bundler::{Bundler, FileProvider};
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use parcel_sourcemap::SourceMap;

use crate::step::{map_each, Asset, Step, StepError};

/// Browser versions to compile for, as major versions.
///
/// Vendor prefixes and syntax lowering are derived from these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
pub struct BrowserTargets {
    pub chrome: Option<u32>,
    pub edge: Option<u32>,
    pub firefox: Option<u32>,
    pub safari: Option<u32>,
    pub ios_saf: Option<u32>,
    pub samsung: Option<u32>,
}

impl Default for BrowserTargets {
    fn default() -> Self {
        Self {
            chrome: Some(90),
            edge: Some(90),
            firefox: Some(88),
            safari: Some(14),
            ios_saf: Some(14),
            samsung: None,
        }
    }
}

impl BrowserTargets {
    /// Convert to lightningcss targets (`major << 16`).
    pub fn to_targets(self) -> Targets {
        let version = |v: Option<u32>| v.map(|major| major << 16);

        Targets::from(Browsers {
            chrome: version(self.chrome),
            edge: version(self.edge),
            firefox: version(self.firefox),
            safari: version(self.safari),
            ios_saf: version(self.ios_saf),
            samsung: version(self.samsung),
            ..Browsers::default()
        })
    }
}

/// Bundles a stylesheet's `@import`s, applies target-driven prefixing and
/// prints expanded CSS.
///
/// The entry is read from the asset's source path so imports resolve
/// relative to it; this step must be first in a chain. When the asset is
/// flagged for capture, a source map is recorded on it.
pub struct CompileStyles {
    targets: Targets,
    project_root: PathBuf,
}

impl CompileStyles {
    pub fn new(targets: BrowserTargets, project_root: impl Into<PathBuf>) -> Self {
        Self {
            targets: targets.to_targets(),
            project_root: project_root.into(),
        }
    }

    fn compile(&self, asset: &mut Asset) -> Result<(), StepError> {
        let fs = FileProvider::new();
        let mut source_map = asset
            .capture_map
            .then(|| SourceMap::new(&self.project_root.to_string_lossy()));

        let mut stylesheet = {
            let mut bundler = Bundler::new(&fs, source_map.as_mut(), ParserOptions::default());
            bundler
                .bundle(&asset.source)
                .map_err(|e| StepError::new(&asset.source, e.to_string()))?
        };

        stylesheet
            .minify(MinifyOptions {
                targets: self.targets,
                ..Default::default()
            })
            .map_err(|e| StepError::new(&asset.source, e.to_string()))?;

        let printed = stylesheet
            .to_css(PrinterOptions {
                minify: false,
                source_map: source_map.as_mut(),
                targets: self.targets,
                ..Default::default()
            })
            .map_err(|e| StepError::new(&asset.source, e.to_string()))?;

        asset.contents = printed.code.into_bytes();

        if let Some(mut map) = source_map {
            let json = map
                .to_json(None)
                .map_err(|e| StepError::new(&asset.source, format!("source map: {}", e)))?;
            asset.source_map = Some(json);
        }

        Ok(())
    }
}

impl Step for CompileStyles {
    fn name(&self) -> &str {
        "compile-styles"
    }

    fn apply(&self, assets: Vec<Asset>) -> Result<Vec<Asset>, StepError> {
        map_each(assets, |mut asset| {
            self.compile(&mut asset)?;
            Ok(asset)
        })
    }
}

/// Minify compiled CSS.
pub struct MinifyCss {
    targets: Targets,
}

impl MinifyCss {
    pub fn new(targets: BrowserTargets) -> Self {
        Self {
            targets: targets.to_targets(),
        }
    }

    /// Minify a stylesheet string.
    pub fn minify(&self, filename: &str, css: &str) -> Result<String, String> {
        let stylesheet = StyleSheet::parse(
            css,
            ParserOptions {
                filename: filename.to_string(),
                ..Default::default()
            },
        )
        .map_err(|e| format!("CSS parse error: {}", e))?;

        let minified = stylesheet
            .to_css(PrinterOptions {
                minify: true,
                targets: self.targets,
                ..Default::default()
            })
            .map_err(|e| format!("CSS minify error: {}", e))?;

        Ok(minified.code)
    }
}

impl Step for MinifyCss {
    fn name(&self) -> &str {
        "minify-css"
    }

    fn apply(&self, assets: Vec<Asset>) -> Result<Vec<Asset>, StepError> {
        map_each(assets, |mut asset| {
            let filename = asset.source.to_string_lossy().to_string();
            let minified = self
                .minify(&filename, asset.text()?)
                .map_err(|e| StepError::new(&asset.source, e))?;
            asset.contents = minified.into_bytes();
            Ok(asset)
        })
    }
}

//! Inline source map capture.

use std::path::{Path, PathBuf};

use base64::Engine;

use crate::step::{Asset, Step, StepError};

/// Wraps a core transform so it records a source map, then appends the map
/// to each output as an inline `sourceMappingURL` comment.
pub struct SourceMaps<S> {
    inner: S,
    name: String,
}

impl<S: Step> SourceMaps<S> {
    pub fn wrap(inner: S) -> Self {
        let name = format!("sourcemaps({})", inner.name());
        Self { inner, name }
    }
}

impl<S: Step> Step for SourceMaps<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, mut assets: Vec<Asset>) -> Result<Vec<Asset>, StepError> {
        for asset in &mut assets {
            asset.capture_map = true;
            asset.source_map = None;
        }

        let mut assets = self.inner.apply(assets)?;

        for asset in &mut assets {
            asset.capture_map = false;
            if let Some(map) = asset.source_map.take() {
                let encoded = base64::engine::general_purpose::STANDARD.encode(map);
                let comment = format!(
                    "\n/*# sourceMappingURL=data:application/json;charset=utf-8;base64,{} */\n",
                    encoded
                );
                asset.contents.extend_from_slice(comment.as_bytes());
            }
        }

        Ok(assets)
    }

    fn rename(&self, relative: &Path) -> PathBuf {
        self.inner.rename(relative)
    }
}

//! Project path resolution.

use std::path::{Component, Path, PathBuf};

use crate::error::BuildError;

/// Root directories of a project.
///
/// Computed once at startup and shared by every task, the clean step and the
/// watch loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    /// Project root
    pub root: PathBuf,

    /// Source tree (`<root>/src`)
    pub source_root: PathBuf,

    /// Output tree (`<root>/dist`)
    pub dist_root: PathBuf,
}

impl ProjectPaths {
    /// Derive the source and output roots from a project root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            source_root: root.join("src"),
            dist_root: root.join("dist"),
            root,
        }
    }

    /// Path inside the source tree.
    pub fn source(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.source_root.join(relative)
    }

    /// Path inside the output tree.
    pub fn dist(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.dist_root.join(relative)
    }

    /// Path inside the output tree, normalized. Fails with
    /// [`BuildError::OutsideRoot`] when `relative` climbs out of the dist root.
    pub fn dist_within(&self, relative: impl AsRef<Path>) -> Result<PathBuf, BuildError> {
        let root = normalize(&self.dist_root);
        let path = normalize(&root.join(relative));

        if !path.starts_with(&root) {
            return Err(BuildError::OutsideRoot { path, root });
        }
        Ok(path)
    }
}

/// Lexically normalize a path, resolving `.` and `..` without touching the
/// filesystem.
///
/// A `..` that would climb above the first component is kept, so the result
/// never silently loses a parent reference.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out: Vec<Component> = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }

    out.iter().map(|c| c.as_os_str()).collect()
}

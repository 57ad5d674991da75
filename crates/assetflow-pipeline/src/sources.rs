//! Source file discovery from glob patterns.

use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::error::BuildError;

/// A file selected by a [`SourceSet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Absolute path of the file
    pub path: PathBuf,

    /// Path relative to the glob's match root, preserved in the output tree
    pub relative: PathBuf,
}

/// An input glob minus an ordered list of exclude globs.
///
/// Patterns are relative to the source root. `*` never crosses a path
/// separator; use `**` for that.
#[derive(Debug, Clone)]
pub struct SourceSet {
    pattern: String,
    base: PathBuf,
    include: GlobMatcher,
    exclude: GlobSet,
}

impl SourceSet {
    /// Compile an input glob and its excludes.
    pub fn new(pattern: &str, exclude: &[String]) -> Result<Self, BuildError> {
        let include = compile(pattern)?.compile_matcher();

        let mut builder = GlobSetBuilder::new();
        for pattern in exclude {
            builder.add(compile(pattern)?);
        }
        let exclude = builder.build().map_err(|e| BuildError::Pattern {
            pattern: exclude.join(", "),
            message: e.to_string(),
        })?;

        Ok(Self {
            pattern: pattern.to_string(),
            base: glob_base(pattern),
            include,
            exclude,
        })
    }

    /// The input pattern this set was built from.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Literal directory prefix of the input pattern.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Whether a path relative to the source root is selected.
    pub fn matches(&self, relative: &Path) -> bool {
        self.include.is_match(relative) && !self.exclude.is_match(relative)
    }

    /// Enumerate matching files under `source_root`, sorted by path.
    ///
    /// A missing match root yields an empty set. Any entry the walk cannot
    /// read, such as a dangling symlink or an unreadable directory, is an
    /// error rather than a skipped file.
    pub fn collect(&self, source_root: &Path) -> Result<Vec<SourceFile>, walkdir::Error> {
        let walk_root = source_root.join(&self.base);
        if !walk_root.exists() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&walk_root).follow_links(true) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let Ok(from_source) = path.strip_prefix(source_root) else {
                continue;
            };
            if !self.matches(from_source) {
                continue;
            }

            let relative = from_source
                .strip_prefix(&self.base)
                .unwrap_or(from_source)
                .to_path_buf();
            files.push(SourceFile {
                path: path.to_path_buf(),
                relative,
            });
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }
}

/// Compile a single glob pattern.
pub fn compile(pattern: &str) -> Result<globset::Glob, BuildError> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|e| BuildError::Pattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })
}

/// Literal directory prefix of a glob: every leading component that holds no
/// glob metacharacter, excluding the final (file) component.
///
/// `styles/**/*.css` has base `styles`, `**/*.html` has an empty base.
pub fn glob_base(pattern: &str) -> PathBuf {
    let components: Vec<&str> = pattern.split('/').collect();
    let mut base = PathBuf::new();

    for (index, component) in components.iter().enumerate() {
        if index + 1 == components.len() || is_glob(component) {
            break;
        }
        if !component.is_empty() && *component != "." {
            base.push(component);
        }
    }

    base
}

fn is_glob(component: &str) -> bool {
    component.contains(['*', '?', '[', '{'])
}

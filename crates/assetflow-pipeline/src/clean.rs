//! Emptying the output tree.

use std::path::Path;

use crate::error::BuildError;
use crate::paths::{normalize, ProjectPaths};

/// Delete everything under the dist root, keeping the directory itself.
///
/// The dist root is created when missing. It must normalize to a directory
/// strictly inside the project root, otherwise nothing is touched. Symlinks
/// are removed, never followed.
pub async fn clean(paths: &ProjectPaths) -> Result<usize, BuildError> {
    let root = normalize(&paths.root);
    let dist = normalize(&paths.dist_root);

    if dist == root || !dist.starts_with(&root) {
        return Err(BuildError::OutsideRoot { path: dist, root });
    }

    tokio::fs::create_dir_all(&dist)
        .await
        .map_err(clean_error(&dist))?;

    let mut entries = tokio::fs::read_dir(&dist)
        .await
        .map_err(clean_error(&dist))?;

    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await.map_err(clean_error(&dist))? {
        let path = entry.path();
        if !normalize(&path).starts_with(&dist) {
            return Err(BuildError::OutsideRoot { path, root: dist });
        }

        let file_type = entry.file_type().await.map_err(clean_error(&path))?;
        if file_type.is_dir() {
            tokio::fs::remove_dir_all(&path)
                .await
                .map_err(clean_error(&path))?;
        } else {
            tokio::fs::remove_file(&path)
                .await
                .map_err(clean_error(&path))?;
        }
        removed += 1;
    }

    tracing::info!("Cleaned {} ({} entries)", dist.display(), removed);
    Ok(removed)
}

fn clean_error(path: &Path) -> impl FnOnce(std::io::Error) -> BuildError {
    let path = path.to_path_buf();
    move |source| BuildError::Clean { path, source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn empties_dist_but_keeps_it() {
        let temp = tempdir().unwrap();
        let paths = ProjectPaths::new(temp.path());
        fs::create_dir_all(paths.dist("css/deep")).unwrap();
        fs::write(paths.dist("index.html"), "x").unwrap();
        fs::write(paths.dist("css/deep/a.css"), "x").unwrap();

        let removed = clean(&paths).await.unwrap();

        assert_eq!(removed, 2);
        assert!(paths.dist_root.is_dir());
        assert_eq!(fs::read_dir(&paths.dist_root).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn missing_dist_is_created() {
        let temp = tempdir().unwrap();
        let paths = ProjectPaths::new(temp.path());

        assert_eq!(clean(&paths).await.unwrap(), 0);
        assert!(paths.dist_root.is_dir());
    }

    #[tokio::test]
    async fn second_clean_is_a_no_op() {
        let temp = tempdir().unwrap();
        let paths = ProjectPaths::new(temp.path());
        fs::create_dir_all(&paths.dist_root).unwrap();
        fs::write(paths.dist("a.txt"), "x").unwrap();

        clean(&paths).await.unwrap();
        assert_eq!(clean(&paths).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn refuses_dist_outside_root() {
        let temp = tempdir().unwrap();
        let project = temp.path().join("project");
        let outside = temp.path().join("outside");
        fs::create_dir_all(&project).unwrap();
        fs::create_dir_all(&outside).unwrap();
        fs::write(outside.join("keep.txt"), "x").unwrap();

        let mut paths = ProjectPaths::new(&project);
        paths.dist_root = project.join("../outside");

        let err = clean(&paths).await.unwrap_err();

        assert!(matches!(err, BuildError::OutsideRoot { .. }));
        assert!(outside.join("keep.txt").exists());
    }

    #[tokio::test]
    async fn refuses_project_root_itself() {
        let temp = tempdir().unwrap();
        let mut paths = ProjectPaths::new(temp.path());
        paths.dist_root = temp.path().join("dist/..");
        fs::write(temp.path().join("keep.txt"), "x").unwrap();

        assert!(clean(&paths).await.is_err());
        assert!(temp.path().join("keep.txt").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn removes_symlinks_without_following() {
        let temp = tempdir().unwrap();
        let paths = ProjectPaths::new(temp.path().join("project"));
        let target = temp.path().join("elsewhere");
        fs::create_dir_all(&paths.dist_root).unwrap();
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("keep.txt"), "x").unwrap();
        std::os::unix::fs::symlink(&target, paths.dist("link")).unwrap();

        clean(&paths).await.unwrap();

        assert!(!paths.dist("link").exists());
        assert!(target.join("keep.txt").exists());
    }
}

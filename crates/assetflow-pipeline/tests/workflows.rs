//! End-to-end workflow runs against a scratch project.

use std::fs;
use std::path::{Path, PathBuf};

use assetflow_pipeline::{BuildError, Node, PipelineConfig, ProjectPaths, TaskGraph, Variant};
use image::codecs::png::PngEncoder;
use image::{ImageEncoder, Rgba, RgbaImage};
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use walkdir::WalkDir;

fn png() -> Vec<u8> {
    let img = RgbaImage::from_fn(16, 16, |x, y| Rgba([(x * 16) as u8, (y * 16) as u8, 0, 255]));
    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(img.as_raw(), 16, 16, image::ColorType::Rgba8)
        .unwrap();
    out
}

fn write(root: &Path, relative: &str, contents: impl AsRef<[u8]>) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn project() -> (TempDir, ProjectPaths) {
    let temp = tempfile::tempdir().unwrap();
    let paths = ProjectPaths::new(temp.path());
    let src = &paths.source_root;

    write(
        src,
        "templates/_partials/nav.jinja",
        "<nav>\n  <a href=\"/\">Home</a>\n</nav>",
    );
    write(
        src,
        "templates/index.jinja",
        "<html>\n  <body>\n    {% include \"_partials/nav.jinja\" %}\n    <p>{{ 40 + 2 }}</p>\n  </body>\n</html>\n",
    );
    write(src, "styles/_colors.css", ".accent {\n  color: #ff0000;\n}\n");
    write(
        src,
        "styles/main.css",
        "@import \"_colors.css\";\n\nbody {\n  margin: 0;\n  padding: 0;\n}\n",
    );
    write(src, "images/logo.png", png());

    (temp, paths)
}

fn graph(paths: &ProjectPaths) -> TaskGraph {
    TaskGraph::from_config(paths.clone(), &PipelineConfig::default()).unwrap()
}

fn dist_files(paths: &ProjectPaths) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(&paths.dist_root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().strip_prefix(&paths.dist_root).unwrap().to_path_buf())
        .collect();
    files.sort();
    files
}

fn snapshot(paths: &ProjectPaths) -> Vec<(PathBuf, Vec<u8>)> {
    dist_files(paths)
        .into_iter()
        .map(|f| {
            let bytes = fs::read(paths.dist(&f)).unwrap();
            (f, bytes)
        })
        .collect()
}

#[tokio::test]
async fn default_build_produces_one_output_per_source() {
    let (_temp, paths) = project();

    let report = graph(&paths).run_workflow("default").await.unwrap();

    assert_eq!(report.tasks.len(), 4);
    assert_eq!(
        dist_files(&paths),
        vec![
            PathBuf::from("css/main.css"),
            PathBuf::from("images/logo.png"),
            PathBuf::from("index.html"),
        ]
    );

    let html = fs::read_to_string(paths.dist("index.html")).unwrap();
    assert!(html.contains("<a href=\"/\">Home</a>"));
    assert!(html.contains("<p>42</p>"));

    let css = fs::read_to_string(paths.dist("css/main.css")).unwrap();
    assert!(css.contains(".accent"));
    assert!(css.contains("sourceMappingURL=data:application/json"));
}

#[tokio::test]
async fn release_build_is_minified_without_maps() {
    let (_temp, paths) = project();
    fs::create_dir_all(&paths.dist_root).unwrap();
    fs::write(paths.dist("leftover.txt"), "stale").unwrap();

    graph(&paths).run_workflow("release").await.unwrap();

    assert!(!paths.dist("leftover.txt").exists());

    let css = fs::read_to_string(paths.dist("css/main.css")).unwrap();
    assert!(!css.contains("sourceMappingURL"));
    assert!(!css.contains('\n'));
    assert!(css.contains("body{"));

    let html = fs::read_to_string(paths.dist("index.html")).unwrap();
    assert!(!html.contains('\n'));
    assert!(html.starts_with("<html><body><nav>"));
}

#[tokio::test]
async fn release_is_idempotent() {
    let (_temp, paths) = project();
    let graph = graph(&paths);

    graph.run_workflow("release").await.unwrap();
    let first = snapshot(&paths);
    graph.run_workflow("release").await.unwrap();
    let second = snapshot(&paths);

    assert_eq!(first, second);
}

#[tokio::test]
async fn failing_task_leaves_sibling_output() {
    let (_temp, paths) = project();
    write(
        &paths.source_root,
        "templates/broken.jinja",
        "{% if %}never closed",
    );

    let err = graph(&paths).run_workflow("default").await.unwrap_err();

    assert_eq!(err.failures.len(), 1);
    assert!(matches!(
        &err.failures[0],
        BuildError::Transform { task, .. } if task == "templates"
    ));
    assert!(!paths.dist("index.html").exists());
    assert!(!paths.dist("broken.html").exists());
    assert!(paths.dist("css/main.css").exists());
    assert!(paths.dist("images/logo.png").exists());
}

#[tokio::test]
async fn canonical_tasks_write_disjoint_files() {
    let (_temp, paths) = project();
    write(&paths.source_root, "about.html", "<p>about</p>");

    graph(&paths).run_workflow("default").await.unwrap();
    assert!(paths.dist("about.html").exists());

    // A plain page with the same output as a rendered template.
    write(&paths.source_root, "index.html", "<p>plain</p>");

    let err = graph(&paths).run_workflow("default").await.unwrap_err();

    match &err.failures[0] {
        BuildError::Overlap { path, first, second } => {
            assert_eq!(path, &PathBuf::from("index.html"));
            assert_eq!((first.as_str(), second.as_str()), ("html", "templates"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn missing_source_dirs_build_nothing() {
    let temp = tempfile::tempdir().unwrap();
    let paths = ProjectPaths::new(temp.path());

    let report = graph(&paths).run_workflow("default").await.unwrap();

    assert!(report.tasks.iter().all(|t| t.files == 0));
}

#[tokio::test]
async fn every_registered_task_owns_distinct_files() {
    let (_temp, paths) = project();
    write(&paths.source_root, "about.html", "<p>about</p>");
    write(&paths.source_root, "js/main.js", "console.log(1)");

    let config: PipelineConfig = toml::from_str(
        r#"
[bundle]
command = ["cp", "{entry}", "{output}"]
"#,
    )
    .unwrap();
    let graph = TaskGraph::from_config(paths.clone(), &config).unwrap();
    let everything = Node::parallel(graph.task_names());

    for variant in [Variant::Dev, Variant::Release] {
        graph.check_disjoint(&everything, variant).await.unwrap();
    }
}

#[tokio::test]
async fn standalone_run_refuses_to_overwrite_another_tasks_file() {
    let (_temp, paths) = project();
    let graph = graph(&paths);
    graph.run_workflow("default").await.unwrap();
    let rendered = fs::read_to_string(paths.dist("index.html")).unwrap();

    write(&paths.source_root, "index.html", "<p>plain</p>");

    let err = graph.run_task("html", Variant::Dev).await.unwrap_err();

    assert!(matches!(err, BuildError::Overlap { ref path, .. } if path == &PathBuf::from("index.html")));
    assert_eq!(fs::read_to_string(paths.dist("index.html")).unwrap(), rendered);
}

#[cfg(unix)]
#[tokio::test]
async fn dangling_style_link_fails_the_styles_task() {
    let (_temp, paths) = project();
    std::os::unix::fs::symlink(
        paths.source("styles/gone.css"),
        paths.source("styles/broken.css"),
    )
    .unwrap();

    let err = graph(&paths).run_workflow("default").await.unwrap_err();

    assert!(err
        .failures
        .iter()
        .any(|f| matches!(f, BuildError::SourceRead { task, .. } if task == "styles")));
    // Planning walks the sources too, so nothing runs.
    assert!(!paths.dist_root.exists());
}

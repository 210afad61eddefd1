//! Path conventions of Bazel build outputs.

use ignore::WalkBuilder;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static BAZEL_BIN_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"bazel-out/[^/]+/bin/").expect("valid regex"));

/// Jars fetched from outside the workspace live under `external/`.
pub fn is_external_jar(jar_path: &str) -> bool {
    jar_path.contains("external/")
}

/// Derives the source jar that sits next to a compiled jar.
///
/// ABI jars swap `.abi.jar` for `-sources.jar`. External jars additionally
/// drop the `header_` prefix and map a plain `.jar` to `-sources.jar`.
pub fn source_jar_path(jar_path: &str) -> String {
    if let Some(stem) = jar_path.strip_suffix(".abi.jar") {
        let stem = if is_external_jar(jar_path) {
            stem.replace("header_", "")
        } else {
            stem.to_string()
        };
        return format!("{stem}-sources.jar");
    }
    if is_external_jar(jar_path)
        && let Some(stem) = jar_path.strip_suffix(".jar")
        && !stem.ends_with("-sources")
    {
        return format!("{}-sources.jar", stem.replace("header_", ""));
    }
    jar_path.to_string()
}

/// Finds the workspace file backing a class of an internal jar by walking
/// the package directory the jar was built from.
pub fn local_source_path(jar_path: &str, class_name: &str) -> Option<PathBuf> {
    let parent = match jar_path.rfind('/') {
        Some(idx) => &jar_path[..idx],
        None => jar_path,
    };
    let base_dir = BAZEL_BIN_SEGMENT.replace_all(parent, "");
    let base_dir = Path::new(base_dir.as_ref());
    let base_dir = match base_dir.canonicalize() {
        Ok(p) => p,
        Err(e) => {
            tracing::debug!(dir = %base_dir.display(), error = %e, "no local source directory");
            return None;
        }
    };

    let wanted = format!("{}.kt", class_name.replace('.', "/"));
    let mut candidates: Vec<PathBuf> = WalkBuilder::new(&base_dir)
        .hidden(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .follow_links(true)
        .build()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
        .map(|entry| entry.into_path())
        .filter(|path| path.ends_with(&wanted))
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}

//! Discovery of compiled jars, source jars and jar metadata in `bazel-out`.
//!
//! The build writes three kinds of side files next to its outputs:
//!
//! - `*klsp-sources.txt`: newline separated source jar paths
//! - `*klsp-compile.txt`: newline separated compiled jar paths
//! - `*klsp-metadata.json`: one metadata document per directory
//!
//! Paths inside manifests are relative to the workspace root.

use ignore::WalkBuilder;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use crate::classpath::{BuildVersion, ClassPathEntry};

pub const BAZEL_OUT: &str = "bazel-out";
pub const VOLATILE_STATUS: &str = "bazel-out/volatile-status.txt";

const SOURCES_MANIFEST_SUFFIX: &str = "klsp-sources.txt";
const COMPILE_MANIFEST_SUFFIX: &str = "klsp-compile.txt";
const METADATA_SUFFIX: &str = "klsp-metadata.json";

/// Files classified by a single walk of the build output tree.
#[derive(Debug, Default)]
pub struct BuildOutputScan {
    pub source_manifests: BTreeSet<PathBuf>,
    pub compile_manifests: BTreeSet<PathBuf>,
    /// Metadata file keyed by the directory containing it.
    pub metadata_files: BTreeMap<PathBuf, PathBuf>,
}

#[derive(Debug, Clone)]
pub struct BazelDiscoverer {
    workspace_root: PathBuf,
}

impl BazelDiscoverer {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        let workspace_root = workspace_root.into();
        let workspace_root = std::path::absolute(&workspace_root).unwrap_or(workspace_root);
        Self { workspace_root }
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn discover(&self) -> BTreeSet<ClassPathEntry> {
        let bazel_out = self.workspace_root.join(BAZEL_OUT);
        if !bazel_out.exists() {
            tracing::info!(dir = %bazel_out.display(), "no build output directory");
            return BTreeSet::new();
        }

        let scan = scan_build_output(&bazel_out);
        let source_jars: BTreeSet<String> = read_manifests(&scan.source_manifests)
            .into_iter()
            .filter(|line| line.ends_with("sources.jar") || line.ends_with("src.jar"))
            .collect();
        let compile_jars: BTreeSet<String> = read_manifests(&scan.compile_manifests)
            .into_iter()
            .collect();
        let candidates = source_jar_candidates(&source_jars);

        let entries: BTreeSet<ClassPathEntry> = compile_jars
            .iter()
            .map(|compile_jar| {
                let compiled_jar = self.resolve(compile_jar);
                let source_jar = pair_source_jar(compile_jar, &candidates).map(|s| self.resolve(s));
                let metadata_json = compiled_jar
                    .parent()
                    .and_then(|dir| scan.metadata_files.get(dir))
                    .cloned();
                ClassPathEntry {
                    compiled_jar,
                    source_jar,
                    metadata_json,
                }
            })
            .collect();

        for metadata in entries.iter().filter_map(|e| e.metadata_json.as_ref()) {
            tracing::info!(path = %metadata.display(), "found jar metadata");
        }
        tracing::info!(
            entries = entries.len(),
            source_jars = source_jars.len(),
            "resolved bazel classpath"
        );
        entries
    }

    /// Reads the build version from the volatile status file. A missing or
    /// unreadable file yields version 0, which forces callers to recompute.
    pub fn build_version(&self) -> BuildVersion {
        let path = self.workspace_root.join(VOLATILE_STATUS);
        if !path.exists() {
            return BuildVersion::default();
        }
        match std::fs::read_to_string(&path) {
            Ok(text) => parse_build_version(&text).unwrap_or_else(|| {
                tracing::warn!(path = %path.display(), "unparsable build status");
                BuildVersion::default()
            }),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot read build status");
                BuildVersion::default()
            }
        }
    }

    fn resolve(&self, manifest_path: &str) -> PathBuf {
        let joined = self.workspace_root.join(manifest_path);
        std::path::absolute(&joined).unwrap_or(joined)
    }
}

/// Walks the tree once, following symlinks, and buckets every regular file
/// by its suffix.
pub fn scan_build_output(root: &Path) -> BuildOutputScan {
    let (tx, rx) = mpsc::channel();

    let walker = WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .ignore(false)
        .parents(false)
        .follow_links(true)
        .build_parallel();

    walker.run(|| {
        let tx = tx.clone();
        Box::new(move |entry| {
            if let Ok(entry) = entry
                && entry.file_type().is_some_and(|t| t.is_file())
            {
                let wanted = {
                    let name = entry.file_name().to_string_lossy();
                    name.ends_with(SOURCES_MANIFEST_SUFFIX)
                        || name.ends_with(COMPILE_MANIFEST_SUFFIX)
                        || name.ends_with(METADATA_SUFFIX)
                };
                if wanted {
                    let _ = tx.send(entry.into_path());
                }
            }
            ignore::WalkState::Continue
        })
    });

    drop(tx);
    let mut found: Vec<PathBuf> = rx.iter().collect();
    found.sort();

    let mut scan = BuildOutputScan::default();
    for path in found {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if name.ends_with(SOURCES_MANIFEST_SUFFIX) {
            scan.source_manifests.insert(path);
        } else if name.ends_with(COMPILE_MANIFEST_SUFFIX) {
            scan.compile_manifests.insert(path);
        } else if let Some(dir) = path.parent() {
            let dir = dir.to_path_buf();
            if let Some(existing) = scan.metadata_files.get(&dir) {
                tracing::debug!(
                    kept = %existing.display(),
                    ignored = %path.display(),
                    "more than one metadata file in directory"
                );
                continue;
            }
            scan.metadata_files.insert(dir, path);
        }
    }
    scan
}

fn read_manifests(manifests: &BTreeSet<PathBuf>) -> Vec<String> {
    let mut lines = Vec::new();
    for manifest in manifests {
        match std::fs::read_to_string(manifest) {
            Ok(text) => lines.extend(
                text.lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_string),
            ),
            Err(e) => {
                tracing::warn!(manifest = %manifest.display(), error = %e, "cannot read manifest")
            }
        }
    }
    lines
}

/// Maps each source jar to its pairing key: the path with `-sources.jar`
/// or `-src.jar` removed.
pub fn source_jar_candidates(source_jars: &BTreeSet<String>) -> BTreeMap<String, String> {
    let mut candidates = BTreeMap::new();
    for jar in source_jars {
        let key = jar.strip_suffix("-sources.jar").unwrap_or(jar);
        let key = key.strip_suffix("-src.jar").unwrap_or(key);
        if key.is_empty() {
            continue;
        }
        candidates
            .entry(key.to_string())
            .or_insert_with(|| jar.clone());
    }
    candidates
}

/// First candidate whose key occurs inside the compiled jar path (minus its
/// `.jar` extension). Candidates are tried in key order.
pub fn pair_source_jar<'a>(
    compiled_jar: &str,
    candidates: &'a BTreeMap<String, String>,
) -> Option<&'a str> {
    let normalized = match compiled_jar.rfind(".jar") {
        Some(idx) => &compiled_jar[..idx],
        None => compiled_jar,
    };
    candidates
        .iter()
        .find(|(key, _)| normalized.contains(key.as_str()))
        .map(|(_, jar)| jar.as_str())
}

/// Last whitespace separated token of the first line, as an integer.
pub fn parse_build_version(status: &str) -> Option<BuildVersion> {
    let first = status.lines().next()?;
    let token = first.split_whitespace().next_back()?;
    token.parse::<i64>().ok().map(BuildVersion)
}

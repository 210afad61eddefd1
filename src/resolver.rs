//! Classpath resolution strategies and their composition.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};

use crate::classpath::{BuildVersion, ClassPathEntry};
use crate::discover::BazelDiscoverer;

const WORKSPACE_MARKERS: [&str; 3] = ["WORKSPACE", "WORKSPACE.bazel", "MODULE.bazel"];

pub trait ClassPathResolver: Send + Sync {
    fn resolver_type(&self) -> String;

    fn classpath(&self) -> BTreeSet<ClassPathEntry>;

    fn current_build_version(&self) -> BuildVersion {
        BuildVersion::default()
    }

    /// Uses `other` only when `self` resolves nothing. `other` is not
    /// consulted at all otherwise.
    fn or<R>(self, other: R) -> FallbackResolver<Self, R>
    where
        Self: Sized,
        R: ClassPathResolver,
    {
        FallbackResolver {
            primary: self,
            fallback: other,
        }
    }
}

impl<T: ClassPathResolver + ?Sized> ClassPathResolver for Box<T> {
    fn resolver_type(&self) -> String {
        (**self).resolver_type()
    }

    fn classpath(&self) -> BTreeSet<ClassPathEntry> {
        (**self).classpath()
    }

    fn current_build_version(&self) -> BuildVersion {
        (**self).current_build_version()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyResolver;

impl ClassPathResolver for EmptyResolver {
    fn resolver_type(&self) -> String {
        "[]".to_string()
    }

    fn classpath(&self) -> BTreeSet<ClassPathEntry> {
        BTreeSet::new()
    }
}

pub struct FallbackResolver<A, B> {
    primary: A,
    fallback: B,
}

impl<A: ClassPathResolver, B: ClassPathResolver> ClassPathResolver for FallbackResolver<A, B> {
    fn resolver_type(&self) -> String {
        format!(
            "{} + {}",
            self.primary.resolver_type(),
            self.fallback.resolver_type()
        )
    }

    fn classpath(&self) -> BTreeSet<ClassPathEntry> {
        let primary = self.primary.classpath();
        if !primary.is_empty() {
            return primary;
        }
        tracing::debug!(
            primary = %self.primary.resolver_type(),
            fallback = %self.fallback.resolver_type(),
            "primary resolver found nothing"
        );
        self.fallback.classpath()
    }

    fn current_build_version(&self) -> BuildVersion {
        let primary = self.primary.current_build_version();
        let fallback = self.fallback.current_build_version();
        BuildVersion(primary.0.max(fallback.0))
    }
}

struct CachedClassPath {
    version: BuildVersion,
    entries: BTreeSet<ClassPathEntry>,
}

/// Memoizes a resolver's classpath for as long as its build version is
/// unchanged. A cached classpath is never served across a version change.
pub struct CachedResolver<R> {
    inner: R,
    cache: RwLock<Option<CachedClassPath>>,
    recompute: Mutex<()>,
}

impl<R: ClassPathResolver> CachedResolver<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            cache: RwLock::new(None),
            recompute: Mutex::new(()),
        }
    }

    /// Drops the cached classpath so the next query walks the build output
    /// again, regardless of the build version.
    pub fn refresh(&self) {
        let _recompute = self.recompute.lock().unwrap_or_else(PoisonError::into_inner);
        *self.cache.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn cached(&self, version: BuildVersion) -> Option<BTreeSet<ClassPathEntry>> {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        cache
            .as_ref()
            .filter(|c| c.version == version)
            .map(|c| c.entries.clone())
    }
}

impl<R: ClassPathResolver> ClassPathResolver for CachedResolver<R> {
    fn resolver_type(&self) -> String {
        format!("Cached + {}", self.inner.resolver_type())
    }

    fn classpath(&self) -> BTreeSet<ClassPathEntry> {
        let version = self.inner.current_build_version();
        if let Some(entries) = self.cached(version) {
            return entries;
        }

        let _recompute = self.recompute.lock().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have finished the same recompute while we waited.
        let version = self.inner.current_build_version();
        if let Some(entries) = self.cached(version) {
            return entries;
        }

        tracing::info!(
            resolver = %self.inner.resolver_type(),
            %version,
            "build version changed, resolving classpath"
        );
        let entries = self.inner.classpath();
        *self.cache.write().unwrap_or_else(PoisonError::into_inner) = Some(CachedClassPath {
            version,
            entries: entries.clone(),
        });
        entries
    }

    fn current_build_version(&self) -> BuildVersion {
        self.inner.current_build_version()
    }
}

pub struct BazelResolver {
    discoverer: BazelDiscoverer,
}

impl BazelResolver {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        let discoverer = BazelDiscoverer::new(workspace_root);
        tracing::info!(root = %discoverer.workspace_root().display(), "initializing bazel resolver");
        Self { discoverer }
    }
}

impl ClassPathResolver for BazelResolver {
    fn resolver_type(&self) -> String {
        "Bazel".to_string()
    }

    fn classpath(&self) -> BTreeSet<ClassPathEntry> {
        self.discoverer.discover()
    }

    fn current_build_version(&self) -> BuildVersion {
        self.discoverer.build_version()
    }
}

pub fn is_bazel_workspace(root: &Path) -> bool {
    WORKSPACE_MARKERS.iter().any(|m| root.join(m).exists())
}

/// The Bazel resolver for `workspace_root`, or the empty resolver when the
/// directory is not a Bazel workspace.
pub fn bazel_resolver(workspace_root: Option<&Path>) -> Box<dyn ClassPathResolver> {
    match workspace_root {
        Some(root) if is_bazel_workspace(root) => Box::new(BazelResolver::new(root)),
        Some(root) => {
            tracing::info!(root = %root.display(), "not a bazel workspace");
            Box::new(EmptyResolver)
        }
        None => Box::new(EmptyResolver),
    }
}

pub fn default_resolver(workspace_roots: &[PathBuf]) -> CachedResolver<Box<dyn ClassPathResolver>> {
    let root = workspace_roots.first().map(PathBuf::as_path);
    let inner: Box<dyn ClassPathResolver> = Box::new(bazel_resolver(root).or(EmptyResolver));
    CachedResolver::new(inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

    #[derive(Clone, Default)]
    struct Counting {
        calls: Arc<AtomicUsize>,
        version: Arc<AtomicI64>,
        jars: Vec<&'static str>,
    }

    impl Counting {
        fn with(jars: &[&'static str]) -> Self {
            Self {
                jars: jars.to_vec(),
                ..Self::default()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ClassPathResolver for Counting {
        fn resolver_type(&self) -> String {
            "Counting".to_string()
        }

        fn classpath(&self) -> BTreeSet<ClassPathEntry> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let version = self.version.load(Ordering::SeqCst);
            self.jars
                .iter()
                .map(|j| ClassPathEntry::compiled(format!("{j}-v{version}.jar")))
                .collect()
        }

        fn current_build_version(&self) -> BuildVersion {
            BuildVersion(self.version.load(Ordering::SeqCst))
        }
    }

    #[test]
    fn or_falls_back_when_primary_is_empty() {
        let primary = Counting::with(&[]);
        let fallback = Counting::with(&["b"]);
        let resolver = primary.clone().or(fallback.clone());

        let entries = resolver.classpath();
        assert_eq!(entries.len(), 1);
        assert!(entries.iter().all(|e| e.compiled_jar.ends_with("b-v0.jar")));
        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 1);
    }

    #[test]
    fn or_never_invokes_fallback_when_primary_resolves() {
        let primary = Counting::with(&["a"]);
        let fallback = Counting::with(&["b"]);
        let resolver = primary.clone().or(fallback.clone());

        for _ in 0..3 {
            let entries = resolver.classpath();
            assert!(entries.iter().all(|e| e.compiled_jar.ends_with("a-v0.jar")));
        }
        assert_eq!(primary.calls(), 3);
        assert_eq!(fallback.calls(), 0);
        assert_eq!(resolver.resolver_type(), "Counting + Counting");
    }

    #[test]
    fn cache_recomputes_only_on_version_change() {
        let inner = Counting::with(&["a"]);
        inner.version.store(1, Ordering::SeqCst);
        let cached = CachedResolver::new(inner.clone());

        let s1 = cached.classpath();
        let again = cached.classpath();
        assert_eq!(s1, again);
        assert_eq!(inner.calls(), 1);

        inner.version.store(2, Ordering::SeqCst);
        let s2 = cached.classpath();
        assert_eq!(inner.calls(), 2);
        assert_ne!(s1, s2);

        let _ = cached.classpath();
        assert_eq!(inner.calls(), 2);

        cached.refresh();
        let _ = cached.classpath();
        assert_eq!(inner.calls(), 3);
    }

    #[test]
    fn cache_runs_one_recompute_under_concurrent_callers() {
        let inner = Counting::with(&["a"]);
        inner.version.store(7, Ordering::SeqCst);
        let cached = Arc::new(CachedResolver::new(inner.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cached = Arc::clone(&cached);
                std::thread::spawn(move || cached.classpath())
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap().len(), 1);
        }
        assert_eq!(inner.calls(), 1);
    }

    #[test]
    fn bazel_resolver_requires_workspace_marker() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(bazel_resolver(Some(dir.path())).resolver_type(), "[]");
        assert_eq!(bazel_resolver(None).resolver_type(), "[]");

        std::fs::write(dir.path().join("WORKSPACE.bazel"), "").unwrap();
        let resolver = bazel_resolver(Some(dir.path()));
        assert_eq!(resolver.resolver_type(), "Bazel");
        assert!(resolver.classpath().is_empty());
        assert_eq!(resolver.current_build_version(), BuildVersion(0));

        let default = default_resolver(&[dir.path().to_path_buf()]);
        assert_eq!(default.resolver_type(), "Cached + Bazel + []");
    }
}

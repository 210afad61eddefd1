use rayon::prelude::*;
use std::path::{Path, PathBuf};

use crate::archive::Jar;
use crate::classfile::parse_class;
use crate::error::Result;
use crate::metadata::{ClassRecord, MetadataRegistry};

const CLASS_SUFFIX: &str = ".class";

/// Builds one registry from compiled jars. Jars are scanned in parallel and
/// the partial registries are folded in input order, so the first jar that
/// defines a class supplies its structural fields.
pub fn build_registry(jars: &[PathBuf]) -> MetadataRegistry {
    let partials: Vec<MetadataRegistry> = jars
        .par_iter()
        .map(|jar| match analyze_jar(jar) {
            Ok(registry) => registry,
            Err(e) => {
                tracing::warn!(jar = %jar.display(), error = %e, "skipping jar");
                MetadataRegistry::new()
            }
        })
        .collect();

    partials
        .into_iter()
        .fold(MetadataRegistry::new(), MetadataRegistry::merge)
}

/// Registry for a single jar. Entries that fail to parse are logged and
/// skipped; only failing to open the jar or to list it is an error.
pub fn analyze_jar(jar_path: &Path) -> Result<MetadataRegistry> {
    let mut jar = Jar::open(jar_path)?;
    let jar_key = jar_path.to_string_lossy().to_string();
    let names = jar.entry_names()?;

    let mut registry = MetadataRegistry::new();
    let mut skipped = 0usize;
    for name in names.iter().filter(|n| n.ends_with(CLASS_SUFFIX)) {
        let bytes = match jar.read_bytes(name) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!(jar = %jar_key, entry = %name, error = %e, "cannot read entry");
                skipped += 1;
                continue;
            }
        };
        match parse_class(&bytes) {
            Ok(header) => registry.insert(ClassRecord::from_header(&header, &jar_key)),
            Err(e) => {
                tracing::warn!(jar = %jar_key, entry = %name, error = %e, "cannot analyze class");
                skipped += 1;
            }
        }
    }

    tracing::debug!(
        jar = %jar_key,
        classes = registry.len(),
        skipped,
        "analyzed jar"
    );
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::fixture::write_jar;
    use crate::classfile::fixture::class_bytes;
    use crate::metadata::MethodRecord;

    fn widget(methods: &[&str]) -> Vec<u8> {
        class_bytes(
            "com.acme.Widget",
            Some("java.lang.Object"),
            &["java.io.Serializable"],
            methods,
        )
    }

    #[test]
    fn build_registry_indexes_classes_and_skips_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("widgets.jar");
        let gadget = class_bytes("com.acme.Gadget", Some("com.acme.Widget"), &[], &["<init>"]);
        write_jar(
            &jar,
            &[
                ("com/acme/Widget.class", &widget(&["<init>", "render"])),
                ("com/acme/Gadget.class", &gadget),
                ("com/acme/Broken.class", b"dummy"),
                ("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\n"),
            ],
        );

        let registry = build_registry(&[jar.clone()]);
        assert_eq!(registry.len(), 2);

        let w = registry.get("com.acme.Widget").unwrap();
        assert_eq!(w.name, "Widget");
        assert_eq!(w.package_name, "com.acme");
        assert_eq!(w.interfaces, vec!["java.io.Serializable"]);
        assert_eq!(
            w.methods,
            vec![
                MethodRecord { name: "<init>".into() },
                MethodRecord { name: "render".into() }
            ]
        );
        assert_eq!(w.source_jars, vec![jar.to_string_lossy().to_string()]);

        let g = registry.get("com.acme.Gadget").unwrap();
        assert_eq!(g.super_class.as_deref(), Some("com.acme.Widget"));
    }

    #[test]
    fn build_registry_survives_unreadable_jars() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.jar");
        let bad = dir.path().join("bad.jar");
        write_jar(&good, &[("com/acme/Widget.class", &widget(&["<init>"]))]);
        std::fs::write(&bad, b"not a zip").unwrap();

        let registry = build_registry(&[bad, dir.path().join("missing.jar"), good]);
        assert_eq!(registry.len(), 1);
        assert!(registry.get("com.acme.Widget").is_some());
    }

    #[test]
    fn build_registry_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.jar");
        let b = dir.path().join("b.jar");
        write_jar(&a, &[("com/acme/Widget.class", &widget(&["<init>"]))]);
        write_jar(
            &b,
            &[
                ("com/acme/Widget.class", &widget(&["<init>"])),
                (
                    "com/acme/Other.class",
                    &class_bytes("com.acme.Other", Some("java.lang.Object"), &[], &[]),
                ),
            ],
        );

        let jars = vec![a, b];
        assert_eq!(build_registry(&jars), build_registry(&jars));
    }

    #[test]
    fn provenance_merge_is_order_independent_for_identical_classes() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.jar");
        let b = dir.path().join("b.jar");
        write_jar(&a, &[("com/acme/Widget.class", &widget(&["<init>", "render"]))]);
        write_jar(&b, &[("com/acme/Widget.class", &widget(&["<init>", "render"]))]);

        let ab = build_registry(&[a.clone(), b.clone()]);
        let ba = build_registry(&[b.clone(), a.clone()]);

        let mut ab_jars = ab.get("com.acme.Widget").unwrap().source_jars.clone();
        let mut ba_jars = ba.get("com.acme.Widget").unwrap().source_jars.clone();
        ab_jars.sort();
        ba_jars.sort();
        assert_eq!(ab_jars, ba_jars);
        assert_eq!(ab_jars.len(), 2);

        let (x, y) = (ab.get("com.acme.Widget").unwrap(), ba.get("com.acme.Widget").unwrap());
        assert_eq!(x.methods, y.methods);
        assert_eq!(x.super_class, y.super_class);
        assert_eq!(x.interfaces, y.interfaces);
    }

    #[test]
    fn first_jar_wins_when_definitions_differ() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.jar");
        let b = dir.path().join("b.jar");
        write_jar(&a, &[("com/acme/Widget.class", &widget(&["fromA"]))]);
        write_jar(&b, &[("com/acme/Widget.class", &widget(&["fromB"]))]);

        let registry = build_registry(&[a, b]);
        let w = registry.get("com.acme.Widget").unwrap();
        assert_eq!(w.methods, vec![MethodRecord { name: "fromA".into() }]);
    }
}

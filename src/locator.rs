use serde::Serialize;
use std::path::Path;

use crate::archive::Jar;
use crate::bazel::is_external_jar;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFileInfo {
    pub contents: String,
    pub path_in_jar: String,
    /// The Kotlin file was missing and a Java file was used instead.
    pub is_java: bool,
}

/// `com/acme/Widget.kt` for package `com.acme`, class `Widget`.
pub fn source_file_path(package_name: &str, class_name: &str, extension: &str) -> String {
    if package_name.is_empty() {
        format!("{class_name}.{extension}")
    } else {
        format!("{}/{class_name}.{extension}", package_name.replace('.', "/"))
    }
}

/// Entry paths to try, most specific first. Internal source jars are not
/// rooted at the package directory: main sources sit under `main/kotlin/`,
/// test sources under `kotlin/`.
fn kotlin_probes(jar: &str, canonical: &str) -> Vec<String> {
    let mut probes = Vec::with_capacity(2);
    if !is_external_jar(jar) {
        if jar.contains("test/") {
            probes.push(format!("kotlin/{canonical}"));
        } else {
            probes.push(format!("main/kotlin/{canonical}"));
        }
    }
    probes.push(canonical.to_string());
    probes
}

fn find_by_suffix<'a>(names: &'a [String], canonical: &str) -> Option<&'a String> {
    names.iter().find(|name| {
        name.as_str() == canonical
            || name
                .strip_suffix(canonical)
                .is_some_and(|prefix| prefix.ends_with('/'))
    })
}

/// Locates the source of `package_name.class_name` inside a source jar.
///
/// Kotlin is tried first, by exact path and then by scanning every entry
/// for a matching path suffix; Java the same way after that. `Ok(None)`
/// means the jar holds no such source.
pub fn find_source_file_info(
    source_jar: &Path,
    package_name: &str,
    class_name: &str,
) -> Result<Option<SourceFileInfo>> {
    let mut jar = Jar::open(source_jar)?;
    let jar_key = source_jar.to_string_lossy();

    let kt_path = source_file_path(package_name, class_name, "kt");
    let java_path = source_file_path(package_name, class_name, "java");
    let mut names: Option<Vec<String>> = None;

    for (canonical, probes, is_java) in [
        (&kt_path, kotlin_probes(&jar_key, &kt_path), false),
        (&java_path, vec![java_path.clone()], true),
    ] {
        let exact = probes.into_iter().find(|p| jar.contains(p));
        let matched = match exact {
            Some(path) => Some(path),
            None => {
                if names.is_none() {
                    names = Some(jar.entry_names()?);
                }
                names
                    .as_deref()
                    .and_then(|n| find_by_suffix(n, canonical))
                    .cloned()
            }
        };

        if let Some(path_in_jar) = matched
            && let Some(contents) = jar.read_text(&path_in_jar)?
        {
            tracing::debug!(
                jar = %jar.path().display(),
                entry = %path_in_jar,
                is_java,
                "located source entry"
            );
            return Ok(Some(SourceFileInfo {
                contents,
                path_in_jar,
                is_java,
            }));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::fixture::write_jar;

    #[test]
    fn finds_kotlin_entry_at_canonical_path() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("external/maven/acme-sources.jar");
        write_jar(&jar, &[("com/acme/Widget.kt", b"class Widget")]);

        let info = find_source_file_info(&jar, "com.acme", "Widget")
            .unwrap()
            .unwrap();
        assert_eq!(info.contents, "class Widget");
        assert_eq!(info.path_in_jar, "com/acme/Widget.kt");
        assert!(!info.is_java);
    }

    #[test]
    fn falls_back_to_java_entry() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("external/maven/acme-sources.jar");
        write_jar(
            &jar,
            &[
                ("com/acme/Widget.java", b"public class Widget {}"),
                ("com/acme/Other.kt", b"class Other"),
            ],
        );

        let info = find_source_file_info(&jar, "com.acme", "Widget")
            .unwrap()
            .unwrap();
        assert_eq!(info.contents, "public class Widget {}");
        assert_eq!(info.path_in_jar, "com/acme/Widget.java");
        assert!(info.is_java);
    }

    #[test]
    fn internal_jars_use_source_root_prefixes() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("bazel-out/bin/app/app-sources.jar");
        write_jar(&main, &[("main/kotlin/com/acme/Widget.kt", b"main")]);
        let test = dir.path().join("bazel-out/bin/app/test/app-test-sources.jar");
        write_jar(&test, &[("kotlin/com/acme/WidgetTest.kt", b"test")]);

        let info = find_source_file_info(&main, "com.acme", "Widget").unwrap().unwrap();
        assert_eq!(info.path_in_jar, "main/kotlin/com/acme/Widget.kt");

        let info = find_source_file_info(&test, "com.acme", "WidgetTest")
            .unwrap()
            .unwrap();
        assert_eq!(info.path_in_jar, "kotlin/com/acme/WidgetTest.kt");
        assert_eq!(info.contents, "test");
    }

    #[test]
    fn scans_for_unexpected_root_prefixes() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("bazel-out/bin/lib/lib-sources.jar");
        write_jar(
            &jar,
            &[
                ("src/com/acme/XWidget.kt", b"wrong"),
                ("weird/root/com/acme/Widget.kt", b"right"),
            ],
        );

        let info = find_source_file_info(&jar, "com.acme", "Widget").unwrap().unwrap();
        assert_eq!(info.path_in_jar, "weird/root/com/acme/Widget.kt");
        assert_eq!(info.contents, "right");
    }

    #[test]
    fn default_package_does_not_match_partial_file_names() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("external/x-sources.jar");
        write_jar(&jar, &[("MyWidget.kt", b"class MyWidget")]);

        assert!(find_source_file_info(&jar, "", "Widget").unwrap().is_none());
        assert_eq!(source_file_path("", "Widget", "kt"), "Widget.kt");
    }

    #[test]
    fn missing_source_is_none_and_bad_jar_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("external/empty-sources.jar");
        write_jar(&jar, &[("com/acme/Other.kt", b"class Other")]);
        assert!(find_source_file_info(&jar, "com.acme", "Widget").unwrap().is_none());

        assert!(find_source_file_info(&dir.path().join("nope.jar"), "a", "B").is_err());
    }
}

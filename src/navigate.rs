//! Go-to-definition and documentation lookups backed by source jars.
//!
//! The host language server already knows which class and member the cursor
//! refers to; this module only turns that into source text. Every step can
//! come up empty, in which case the caller falls back to its own strategy.

use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use url::Url;

use crate::bazel::{is_external_jar, local_source_path, source_jar_path};
use crate::classpath::ClassPathEntry;
use crate::declaration::{TextRange, find_declaration_comment, find_declaration_range};
use crate::error::Result;
use crate::locator::{SourceFileInfo, find_source_file_info};
use crate::metadata::{ClassRecord, MetadataRegistry};
use crate::tempfiles::TempFileCache;

const COMPANION_SUFFIX: &str = ".Companion";

/// The symbol a navigation request is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclarationTarget {
    pub package_name: String,
    /// Top level class whose file holds the declaration.
    pub class_name: String,
    /// Fully qualified name of the innermost containing class.
    pub class_fq_name: String,
    pub symbol_name: String,
}

impl DeclarationTarget {
    /// `member` of the class `class_fq_name` in `package_name`.
    pub fn member(package_name: &str, class_fq_name: &str, member: &str) -> Self {
        let class_fq_name = class_fq_name
            .strip_suffix(COMPANION_SUFFIX)
            .unwrap_or(class_fq_name)
            .to_string();
        let relative = if package_name.is_empty() {
            class_fq_name.as_str()
        } else {
            class_fq_name
                .strip_prefix(package_name)
                .and_then(|rest| rest.strip_prefix('.'))
                .unwrap_or(class_fq_name.as_str())
        };
        let class_name = relative
            .split(['.', '$'])
            .next()
            .unwrap_or(relative)
            .to_string();
        let symbol_name = if member == "Companion" {
            class_name.clone()
        } else {
            member.to_string()
        };
        Self {
            package_name: package_name.to_string(),
            class_name,
            class_fq_name,
            symbol_name,
        }
    }

    /// The class itself, e.g. for a constructor call.
    pub fn class(package_name: &str, class_fq_name: &str) -> Self {
        let mut target = Self::member(package_name, class_fq_name, "");
        target.symbol_name = target
            .class_fq_name
            .rsplit(['.', '$'])
            .next()
            .unwrap_or_default()
            .to_string();
        target
    }

    /// Splits `com.acme.Widget` style names, assuming lower case packages.
    pub fn from_fq_name(class_fq_name: &str, member: Option<&str>) -> Self {
        let package_name = class_fq_name
            .split('.')
            .take_while(|seg| seg.chars().next().is_some_and(|c| c.is_lowercase()))
            .collect::<Vec<_>>()
            .join(".");
        match member {
            Some(m) => Self::member(&package_name, class_fq_name, m),
            None => Self::class(&package_name, class_fq_name),
        }
    }

    /// Registry keys that may hold this class: the source style name, the
    /// binary name of a nested class, and the top level class.
    fn registry_keys(&self) -> Vec<String> {
        let mut keys = vec![self.class_fq_name.clone()];
        let prefix = if self.package_name.is_empty() {
            String::new()
        } else {
            format!("{}.", self.package_name)
        };
        if let Some(rest) = self.class_fq_name.strip_prefix(&prefix)
            && rest.contains('.')
        {
            keys.push(format!("{prefix}{}", rest.replace('.', "$")));
        }
        keys.push(format!("{prefix}{}", self.class_name));
        keys.dedup();
        keys
    }

    fn lookup<'a>(&self, registry: &'a MetadataRegistry) -> Option<&'a ClassRecord> {
        self.registry_keys().iter().find_map(|k| registry.get(k))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceLocation {
    pub uri: String,
    pub range: TextRange,
}

#[derive(Debug, Clone, Serialize)]
pub struct LocatedSource {
    /// Jar recorded in the metadata for the class.
    pub recorded_jar: String,
    pub source_jar: PathBuf,
    pub info: SourceFileInfo,
}

pub struct SourceNavigator {
    temp_files: TempFileCache,
}

impl SourceNavigator {
    pub fn new(temp_files: TempFileCache) -> Self {
        Self { temp_files }
    }

    pub fn temp_files(&self) -> &TempFileCache {
        &self.temp_files
    }

    /// Source text of the class holding `target`, from the first classpath
    /// entry whose metadata knows the class.
    pub fn locate_source(
        &self,
        entries: &BTreeSet<ClassPathEntry>,
        target: &DeclarationTarget,
    ) -> Option<LocatedSource> {
        let metadata: Vec<&Path> = entries
            .iter()
            .filter_map(|e| e.metadata_json.as_deref())
            .collect();
        if metadata.is_empty() {
            return None;
        }
        metadata
            .into_iter()
            .find_map(|path| locate_with_metadata(path, target))
    }

    pub fn find_definition(
        &self,
        entries: &BTreeSet<ClassPathEntry>,
        target: &DeclarationTarget,
    ) -> Option<SourceLocation> {
        let located = self.locate_source(entries, target)?;
        let range = find_declaration_range(&located.info.contents, &target.symbol_name)
            .unwrap_or_default();

        if !is_external_jar(&located.recorded_jar)
            && let Some(local) = local_source_path(&located.recorded_jar, &target.class_name)
        {
            return Some(SourceLocation {
                uri: file_uri(&local)?,
                range,
            });
        }

        match self.materialize(&located) {
            Ok(path) => Some(SourceLocation {
                uri: file_uri(&path)?,
                range,
            }),
            Err(e) => {
                tracing::warn!(error = %e, "cannot materialize source file");
                None
            }
        }
    }

    /// Doc comment of `target` as written in its source jar.
    pub fn find_documentation(
        &self,
        entries: &BTreeSet<ClassPathEntry>,
        target: &DeclarationTarget,
    ) -> Option<String> {
        let located = self.locate_source(entries, target)?;
        find_declaration_comment(&located.info.contents, &target.symbol_name)
    }

    pub fn shutdown(self) -> Result<()> {
        self.temp_files.shutdown()
    }

    fn materialize(&self, located: &LocatedSource) -> Result<PathBuf> {
        let key = format!(
            "{}!/{}",
            located.source_jar.display(),
            located.info.path_in_jar
        );
        let extension = if located.info.is_java { "java" } else { "kt" };
        self.temp_files
            .materialize(&key, &located.info.contents, extension)
    }
}

fn locate_with_metadata(metadata: &Path, target: &DeclarationTarget) -> Option<LocatedSource> {
    let registry = MetadataRegistry::load_optional(metadata)?;
    let record = target.lookup(&registry)?;
    let recorded_jar = record.source_jars.first()?.clone();
    let source_jar = PathBuf::from(source_jar_path(&recorded_jar));

    match find_source_file_info(&source_jar, &target.package_name, &target.class_name) {
        Ok(Some(info)) => Some(LocatedSource {
            recorded_jar,
            source_jar,
            info,
        }),
        Ok(None) => {
            tracing::debug!(
                jar = %source_jar.display(),
                class = %target.class_fq_name,
                "no source entry for class"
            );
            None
        }
        Err(e) => {
            tracing::warn!(jar = %source_jar.display(), error = %e, "cannot read source jar");
            None
        }
    }
}

fn file_uri(path: &Path) -> Option<String> {
    let absolute = std::path::absolute(path).ok()?;
    Url::from_file_path(absolute).ok().map(String::from)
}

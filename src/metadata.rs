//! Class metadata registry and its JSON document form.
//!
//! The document is produced at build time by `extract` and read back by the
//! navigation side, possibly from a different build:
//!
//! ```json
//! {"classes": {"com.acme.Widget": {"name": "Widget", "packageName": "com.acme",
//!   "methods": [{"name": "<init>"}], "superClass": "java.lang.Object",
//!   "interfaces": [], "sourceJars": ["foo/bar-sources.jar"]}}}
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::classfile::ClassHeader;
use crate::error::{FinderError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodRecord {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRecord {
    pub name: String,
    pub package_name: String,
    #[serde(default)]
    pub methods: Vec<MethodRecord>,
    #[serde(default)]
    pub super_class: Option<String>,
    #[serde(default)]
    pub interfaces: Vec<String>,
    /// Jars that contained this class, in discovery order, without repeats.
    #[serde(default)]
    pub source_jars: Vec<String>,
}

impl ClassRecord {
    pub fn from_header(header: &ClassHeader, jar: &str) -> Self {
        Self {
            name: header.simple_name().to_string(),
            package_name: header.package_name().to_string(),
            methods: header
                .methods
                .iter()
                .map(|name| MethodRecord { name: name.clone() })
                .collect(),
            super_class: header.super_class.clone(),
            interfaces: header.interfaces.clone(),
            source_jars: vec![jar.to_string()],
        }
    }

    pub fn fq_name(&self) -> String {
        if self.package_name.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.package_name, self.name)
        }
    }

    fn absorb_provenance(&mut self, other: ClassRecord) {
        for jar in other.source_jars {
            if !self.source_jars.contains(&jar) {
                self.source_jars.push(jar);
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRegistry {
    classes: BTreeMap<String, ClassRecord>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, fq_name: &str) -> Option<&ClassRecord> {
        self.classes.get(fq_name)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ClassRecord)> {
        self.classes.iter()
    }

    /// Adds one record. The first definition of a class keeps its structural
    /// fields; later ones only contribute their jars.
    pub(crate) fn insert(&mut self, record: ClassRecord) {
        let key = record.fq_name();
        match self.classes.get_mut(&key) {
            Some(existing) => existing.absorb_provenance(record),
            None => {
                self.classes.insert(key, record);
            }
        }
    }

    /// Left fold step: `self` was built from earlier jars than `later`.
    /// When duplicate definitions differ structurally the result depends on
    /// fold order.
    pub fn merge(mut self, later: MetadataRegistry) -> Self {
        for (_, record) in later.classes {
            self.insert(record);
        }
        self
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| FinderError::InvalidMetadataFormat {
            path: None,
            reason: e.to_string(),
        })
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| FinderError::InvalidMetadataFormat {
            path: None,
            reason: e.to_string(),
        })
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| FinderError::io(parent, e))?;
        }
        std::fs::write(path, json).map_err(|e| FinderError::io(path, e))
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| FinderError::io(path, e))?;
        Self::from_json(&text).map_err(|e| match e {
            FinderError::InvalidMetadataFormat { reason, .. } => {
                FinderError::InvalidMetadataFormat {
                    path: Some(path.to_path_buf()),
                    reason,
                }
            }
            other => other,
        })
    }

    /// Loads a metadata document, treating blank, unreadable or malformed
    /// files as "no metadata".
    pub fn load_optional(path: &Path) -> Option<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) if text.trim().is_empty() => None,
            Ok(text) => match Self::from_json(&text) {
                Ok(registry) => Some(registry),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "ignoring jar metadata");
                    None
                }
            },
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot read jar metadata");
                None
            }
        }
    }
}

impl FromIterator<ClassRecord> for MetadataRegistry {
    fn from_iter<I: IntoIterator<Item = ClassRecord>>(iter: I) -> Self {
        let mut registry = Self::new();
        for record in iter {
            registry.insert(record);
        }
        registry
    }
}

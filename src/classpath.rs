use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// One build output unit: a compiled jar plus whatever could be paired
/// with it. Entries are recomputed on every resolution pass.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassPathEntry {
    pub compiled_jar: PathBuf,
    pub source_jar: Option<PathBuf>,
    pub metadata_json: Option<PathBuf>,
}

impl ClassPathEntry {
    pub fn compiled(compiled_jar: impl Into<PathBuf>) -> Self {
        Self {
            compiled_jar: compiled_jar.into(),
            source_jar: None,
            metadata_json: None,
        }
    }
}

/// Opaque build freshness marker. Only equality is meaningful.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct BuildVersion(pub i64);

impl fmt::Display for BuildVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

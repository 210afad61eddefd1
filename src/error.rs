use std::path::PathBuf;
use thiserror::Error;

use crate::classfile::ClassFormatError;

pub type Result<T> = std::result::Result<T, FinderError>;

/// Failures local to a single artifact. Callers log and skip them; none of
/// these aborts a pass over sibling artifacts.
#[derive(Debug, Error)]
pub enum FinderError {
    #[error("malformed class data: {reason}")]
    MalformedClassData {
        #[from]
        reason: ClassFormatError,
    },

    #[error("archive I/O failed for {}: {source}", path.display())]
    ArchiveIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid metadata format{}: {reason}", path.as_ref().map(|p| format!(" in {}", p.display())).unwrap_or_default())]
    InvalidMetadataFormat {
        path: Option<PathBuf>,
        reason: String,
    },

    #[error("I/O failed for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FinderError {
    pub(crate) fn archive(path: impl Into<PathBuf>, source: impl Into<std::io::Error>) -> Self {
        Self::ArchiveIo {
            path: path.into(),
            source: source.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

use memmap2::Mmap;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use zip::ZipArchive;
use zip::result::ZipError;

use crate::error::{FinderError, Result};

/// Upper bound on the buffer reserved up front from an entry's declared size.
const MAX_SIZE_HINT: u64 = 1 << 20;

/// A read-only jar backed by a memory mapping. The mapping and the file
/// handle are released when the `Jar` is dropped.
pub struct Jar {
    path: PathBuf,
    archive: ZipArchive<Cursor<Mmap>>,
}

impl Jar {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| FinderError::archive(path, e))?;
        // SAFETY: The file is opened read-only and the mapping is owned by the
        // archive reader, so it outlives every slice handed out from it.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| FinderError::archive(path, e))?;
        let archive =
            ZipArchive::new(Cursor::new(mmap)).map_err(|e| FinderError::archive(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            archive,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entry names in central directory order, directories excluded.
    pub fn entry_names(&mut self) -> Result<Vec<String>> {
        let mut names = Vec::with_capacity(self.archive.len());
        for i in 0..self.archive.len() {
            let entry = self
                .archive
                .by_index(i)
                .map_err(|e| FinderError::archive(&self.path, e))?;
            if entry.is_dir() {
                continue;
            }
            names.push(entry.name().to_string());
        }
        Ok(names)
    }

    pub fn contains(&mut self, name: &str) -> bool {
        self.archive.by_name(name).is_ok()
    }

    pub fn read_bytes(&mut self, name: &str) -> Result<Option<Vec<u8>>> {
        let mut entry = match self.archive.by_name(name) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(FinderError::archive(&self.path, e)),
        };
        let mut buf = Vec::with_capacity(entry.size().min(MAX_SIZE_HINT) as usize);
        entry
            .read_to_end(&mut buf)
            .map_err(|e| FinderError::archive(&self.path, e))?;
        Ok(Some(buf))
    }

    /// Reads an entry as text. Invalid UTF-8 sequences are replaced rather
    /// than rejected; source jars occasionally carry Latin-1 files.
    pub fn read_text(&mut self, name: &str) -> Result<Option<String>> {
        Ok(self
            .read_bytes(name)?
            .map(|bytes| match String::from_utf8(bytes) {
                Ok(s) => s,
                Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
            }))
    }
}

//! High-level [`Archive`] API over a file-backed [`SolidReader`].
//!
//! ```no_run
//! use solidarc::archive::Archive;
//! use solidarc::config::ReaderOptions;
//!
//! let mut ar = Archive::open("bundle.slda")?;
//! for info in ar.list() {
//!     println!("{} {}", info.size, info.name);
//! }
//! let readme = ar.read_file("docs/readme.txt")?;
//!
//! let mut locked = Archive::open_with("secret.slda", ReaderOptions::default().with_password("pw"))?;
//! let report = locked.extract_all("out/")?;
//! for skipped in &report.skipped {
//!     eprintln!("skipped {}: {}", skipped.name, skipped.reason);
//! }
//! # Ok::<(), solidarc::Error>(())
//! ```

use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ReaderOptions;
use crate::error::{Error, Result};
use crate::index::{Entry, EntryTable};
use crate::io_stream::{NavigatorStats, SolidReader};
use crate::store::FileStore;

// ── EntryInfo ────────────────────────────────────────────────────────────────

/// Descriptor returned by [`Archive::list`] and [`Archive::stat`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryInfo {
    pub index:        usize,
    pub name:         String,
    pub is_directory: bool,
    pub size:         u64,
    pub folder:       Option<usize>,
    pub coders:       Vec<String>,
    /// RFC 3339.
    pub modified:     Option<String>,
    pub crc:          Option<u32>,
}

impl EntryInfo {
    pub fn new(entry: &Entry, table: &EntryTable) -> Self {
        let coders = entry
            .folder()
            .and_then(|id| table.folder(id))
            .map(|f| f.coder_names())
            .unwrap_or_default();
        EntryInfo {
            index:        entry.index(),
            name:         entry.name().to_string(),
            is_directory: entry.is_directory(),
            size:         entry.size(),
            folder:       entry.folder().map(|id| id.0),
            coders,
            modified:     entry.modified().map(|t| t.to_rfc3339()),
            crc:          entry.crc(),
        }
    }
}

// ── ExtractReport ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped {
    pub name:   String,
    pub reason: String,
}

/// Outcome of [`Archive::extract_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractReport {
    pub files:       Vec<String>,
    pub directories: usize,
    pub skipped:     Vec<Skipped>,
}

// ── Archive ──────────────────────────────────────────────────────────────────

pub struct Archive {
    path:   PathBuf,
    reader: SolidReader<FileStore>,
}

impl Archive {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, ReaderOptions::default())
    }

    pub fn open_with<P: AsRef<Path>>(path: P, options: ReaderOptions) -> Result<Self> {
        let path = path.as_ref().to_owned();
        let store = FileStore::open(&path)?;
        let reader = SolidReader::open(store, options)?;
        Ok(Self { path, reader })
    }

    pub fn path(&self) -> &Path { &self.path }
    pub fn uuid(&self) -> Uuid { self.reader.superblock().archive_uuid }
    pub fn stats(&self) -> NavigatorStats { self.reader.stats() }

    /// Direct access to the navigator for streaming reads.
    pub fn reader(&mut self) -> &mut SolidReader<FileStore> {
        &mut self.reader
    }

    pub fn list(&self) -> Vec<EntryInfo> {
        let table = self.reader.table();
        table.entries().iter().map(|e| EntryInfo::new(e, table)).collect()
    }

    pub fn stat(&self, name: &str) -> Option<EntryInfo> {
        let table = self.reader.table();
        table.find(name).map(|e| EntryInfo::new(e, table))
    }

    /// Whole contents of the named entry.
    pub fn read_file(&mut self, name: &str) -> Result<Vec<u8>> {
        let index = self
            .reader
            .find(name)
            .map(Entry::index)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        self.read_entry(index)
    }

    /// Whole contents of the entry at `index`.  Fails with
    /// [`Error::Unreadable`] if the entry's folder could not be decoded.
    pub fn read_entry(&mut self, index: usize) -> Result<Vec<u8>> {
        self.reader.jump_to(index)?;
        let data = self.reader.read_to_end()?;
        let entry = self.reader.entry(index).ok_or(Error::NoCurrentEntry)?;

        if let Some(reason) = self.reader.current_fault() {
            return Err(Error::Unreadable { name: entry.name().to_string(), reason: reason.to_string() });
        }
        if self.reader.options().verify_crc {
            if let Some(expected) = entry.crc() {
                let actual = crc32fast::hash(&data);
                if actual != expected {
                    return Err(Error::CrcMismatch { name: entry.name().to_string(), expected, actual });
                }
            }
        }
        Ok(data)
    }

    /// Write every entry under `dest` in archive order.  Entries that cannot
    /// be decoded, or whose names would escape `dest`, are skipped and
    /// reported.  Storage faults abort the extraction.
    pub fn extract_all<P: AsRef<Path>>(&mut self, dest: P) -> Result<ExtractReport> {
        let dest = dest.as_ref();
        fs::create_dir_all(dest)?;
        let mut report = ExtractReport::default();

        for index in 0..self.reader.entries().len() {
            let (name, is_dir) = match self.reader.entry(index) {
                Some(e) => (e.name().to_string(), e.is_directory()),
                None => break,
            };
            let Some(rel) = safe_relative_path(&name) else {
                warn!(entry = %name, "refusing to extract outside the destination");
                report.skipped.push(Skipped { name, reason: "unsafe path".to_string() });
                continue;
            };
            let target = dest.join(rel);

            if is_dir {
                fs::create_dir_all(&target)?;
                report.directories += 1;
                continue;
            }
            match self.read_entry(index) {
                Ok(data) => {
                    if let Some(parent) = target.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    fs::write(&target, data)?;
                    report.files.push(name);
                }
                Err(e) if e.is_storage_fault() => return Err(e),
                Err(e) => {
                    warn!(entry = %name, error = %e, "skipping entry");
                    report.skipped.push(Skipped { name, reason: e.to_string() });
                }
            }
        }

        info!(
            files = report.files.len(),
            directories = report.directories,
            skipped = report.skipped.len(),
            dest = %dest.display(),
            "extraction finished"
        );
        Ok(report)
    }

    pub fn close(mut self) -> Result<()> {
        self.reader.close()
    }
}

/// `name` as a relative path that stays inside its base, or `None`.
fn safe_relative_path(name: &str) -> Option<PathBuf> {
    let trimmed = name.trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    let path = Path::new(trimmed);
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if out.as_os_str().is_empty() { None } else { Some(out) }
}

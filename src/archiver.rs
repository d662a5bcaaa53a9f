//! Directory walker that feeds an [`ArchiveSink`].
//!
//! [`create`] visits `directory` depth first.  Children of each directory are
//! visited in file-name order.  Every visited path produces one entry named
//! relative to `directory`, with `/` as separator and a trailing `/` on
//! directories.  After the walk the sink's `finish` runs exactly once.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use tracing::trace;

/// Receiver of entries produced by [`create`].
pub trait ArchiveSink {
    type Entry;

    /// Describe the entry for `source`, named `name` inside the archive.
    fn create_entry(&mut self, source: &Path, name: &str) -> io::Result<Self::Entry>;

    /// Store the entry.  For regular files the body is read from `source`.
    fn write_entry_body(&mut self, source: &Path, entry: Self::Entry) -> io::Result<()>;

    fn finish(&mut self) -> io::Result<()>;
}

/// Walk `directory` and hand every file and subdirectory to `sink`.
pub fn create<S: ArchiveSink + ?Sized>(directory: &Path, sink: &mut S) -> io::Result<()> {
    if !directory.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not a directory", directory.display()),
        ));
    }
    walk(directory, "", sink)?;
    sink.finish()
}

fn walk<S: ArchiveSink + ?Sized>(dir: &Path, prefix: &str, sink: &mut S) -> io::Result<()> {
    let mut children = fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    children.sort_by_key(|c| c.file_name());

    for child in children {
        let path = child.path();
        let file_name = child.file_name();
        let is_dir = child.file_type()?.is_dir();
        let mut name = format!("{prefix}{}", file_name.to_string_lossy());
        if is_dir {
            name.push('/');
        }
        trace!(entry = %name, "archiving");

        let entry = sink.create_entry(&path, &name)?;
        sink.write_entry_body(&path, entry)?;
        if is_dir {
            walk(&path, &name, sink)?;
        }
    }
    Ok(())
}

// ── ManifestSink ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub name:   String,
    pub is_dir: bool,
}

/// Writes one `name<TAB>size` line per entry and a summary line at the end.
/// Directory lines carry size `-`.
pub struct ManifestSink<W: Write> {
    out:     W,
    entries: u64,
    bytes:   u64,
}

impl<W: Write> ManifestSink<W> {
    pub fn new(out: W) -> Self {
        Self { out, entries: 0, bytes: 0 }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ArchiveSink for ManifestSink<W> {
    type Entry = ManifestEntry;

    fn create_entry(&mut self, source: &Path, name: &str) -> io::Result<ManifestEntry> {
        Ok(ManifestEntry { name: name.to_string(), is_dir: source.is_dir() })
    }

    fn write_entry_body(&mut self, source: &Path, entry: ManifestEntry) -> io::Result<()> {
        self.entries += 1;
        if entry.is_dir {
            return writeln!(self.out, "{}\t-", entry.name);
        }
        let size = io::copy(&mut File::open(source)?, &mut io::sink())?;
        self.bytes += size;
        writeln!(self.out, "{}\t{}", entry.name, size)
    }

    fn finish(&mut self) -> io::Result<()> {
        writeln!(self.out, "# {} entries, {} bytes", self.entries, self.bytes)?;
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        created:  Vec<String>,
        written:  Vec<String>,
        finished: usize,
    }

    impl ArchiveSink for Recorder {
        type Entry = String;
        fn create_entry(&mut self, _source: &Path, name: &str) -> io::Result<String> {
            self.created.push(name.to_string());
            Ok(name.to_string())
        }
        fn write_entry_body(&mut self, _source: &Path, entry: String) -> io::Result<()> {
            self.written.push(entry);
            Ok(())
        }
        fn finish(&mut self) -> io::Result<()> {
            self.finished += 1;
            Ok(())
        }
    }

    fn sample_tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("b.txt"), b"bee").unwrap();
        fs::create_dir(root.join("a")).unwrap();
        fs::write(root.join("a").join("inner.txt"), b"12345").unwrap();
        fs::create_dir(root.join("a").join("empty")).unwrap();
        dir
    }

    #[test]
    fn depth_first_in_name_order() {
        let dir = sample_tree();
        let mut sink = Recorder::default();
        create(dir.path(), &mut sink).unwrap();
        let expected = ["a/", "a/empty/", "a/inner.txt", "b.txt"];
        assert_eq!(sink.created, expected);
        assert_eq!(sink.written, expected);
        assert_eq!(sink.finished, 1);
    }

    #[test]
    fn empty_directory_only_finishes() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = Recorder::default();
        create(dir.path(), &mut sink).unwrap();
        assert!(sink.created.is_empty());
        assert_eq!(sink.finished, 1);
    }

    #[test]
    fn file_root_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        fs::write(&file, b"x").unwrap();
        let err = create(&file, &mut Recorder::default()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn manifest_lines() {
        let dir = sample_tree();
        let mut sink = ManifestSink::new(Vec::new());
        create(dir.path(), &mut sink).unwrap();
        let text = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(
            text,
            "a/\t-\na/empty/\t-\na/inner.txt\t5\nb.txt\t3\n# 4 entries, 8 bytes\n"
        );
    }
}

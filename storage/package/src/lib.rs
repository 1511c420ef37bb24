//! Append-only package file format (§4.3): a flat log of
//! `{magic(8) | name_len(2) LE | name | data_len(4) LE | data}` records,
//! indexed externally by the KV mapping `hash(name) -> offset`. The package
//! itself only knows how to append, read back, and truncate; it carries no
//! index.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Arbitrary but fixed 8-byte sentinel prefixing every record, so a reader
/// landing mid-record (e.g. from a stale offset) fails fast instead of
/// silently misparsing garbage as a length.
pub const RECORD_MAGIC: [u8; 8] = *b"ARCHPKG1";

const MAX_NAME_LEN: u16 = u16::MAX;
const MAX_DATA_LEN: u32 = u32::MAX;

#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad magic at offset {offset}: record framing is corrupt")]
    BadMagic { offset: u64 },

    #[error("record at offset {offset} extends past end of file (need {need} bytes, have {have})")]
    Truncated { offset: u64, need: u64, have: u64 },

    #[error("record name at offset {offset} is not valid UTF-8")]
    InvalidName { offset: u64 },
}

pub type PackageResult<T> = Result<T, PackageError>;

/// One append-only package file. Not safe for concurrent writers; §4.4
/// designates a single-writer task per archive slice for exactly this
/// reason.
pub struct PackageFile {
    path: PathBuf,
    file: File,
    len: u64,
}

impl PackageFile {
    /// Creates a new, empty package file. Fails if one already exists at
    /// `path`.
    pub fn create(path: impl Into<PathBuf>) -> PackageResult<Self> {
        let path = path.into();
        let file = OpenOptions::new().read(true).write(true).create_new(true).open(&path)?;
        Ok(PackageFile { path, file, len: 0 })
    }

    /// Opens an existing package file at its on-disk length. Callers that
    /// know the KV-recorded authoritative length should call
    /// [`Self::truncate`] immediately after, per the crash-recovery
    /// invariant in §4.3.
    pub fn open(path: impl Into<PathBuf>) -> PackageResult<Self> {
        let path = path.into();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let len = file.metadata()?.len();
        Ok(PackageFile { path, file, len })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current length of the file, authoritative only once reconciled
    /// against the KV "status" value by the caller (§4.3 invariant).
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Appends one record and returns its start offset.
    pub fn append(&mut self, name: &str, data: &[u8]) -> PackageResult<u64> {
        assert!(name.len() as u64 <= MAX_NAME_LEN as u64, "package record name too long");
        assert!(data.len() as u64 <= MAX_DATA_LEN as u64, "package record data too long");

        let offset = self.len;
        self.file.seek(SeekFrom::Start(offset))?;

        let mut buf = Vec::with_capacity(8 + 2 + name.len() + 4 + data.len());
        buf.extend_from_slice(&RECORD_MAGIC);
        buf.extend_from_slice(&(name.len() as u16).to_le_bytes());
        buf.extend_from_slice(name.as_bytes());
        buf.extend_from_slice(&(data.len() as u32).to_le_bytes());
        buf.extend_from_slice(data);

        self.file.write_all(&buf)?;
        self.file.flush()?;
        self.len += buf.len() as u64;
        Ok(offset)
    }

    /// Reads up to `limit` raw bytes starting at `offset`, with no record
    /// framing assumed — used for streaming whole package files to a peer
    /// catching up (lite-server `getArchiveSlice`), not for looking up a
    /// single record. Silently clamps to the file's current length instead
    /// of erroring, so a caller walking off the end just gets a short read.
    pub fn read_raw(&mut self, offset: u64, limit: u32) -> PackageResult<Vec<u8>> {
        if offset >= self.len {
            return Ok(Vec::new());
        }
        let want = (limit as u64).min(self.len - offset);
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; want as usize];
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Reads back the record starting at `offset`, validating the magic.
    pub fn read(&mut self, offset: u64) -> PackageResult<(String, Vec<u8>)> {
        self.need(offset, 8)?;
        self.file.seek(SeekFrom::Start(offset))?;

        let mut magic = [0u8; 8];
        self.file.read_exact(&mut magic)?;
        if magic != RECORD_MAGIC {
            return Err(PackageError::BadMagic { offset });
        }

        self.need(offset + 8, 2)?;
        let mut name_len_bytes = [0u8; 2];
        self.file.read_exact(&mut name_len_bytes)?;
        let name_len = u16::from_le_bytes(name_len_bytes) as u64;

        self.need(offset + 10, name_len)?;
        let mut name_bytes = vec![0u8; name_len as usize];
        self.file.read_exact(&mut name_bytes)?;
        let name = String::from_utf8(name_bytes).map_err(|_| PackageError::InvalidName { offset })?;

        let data_len_at = offset + 10 + name_len;
        self.need(data_len_at, 4)?;
        let mut data_len_bytes = [0u8; 4];
        self.file.read_exact(&mut data_len_bytes)?;
        let data_len = u32::from_le_bytes(data_len_bytes) as u64;

        self.need(data_len_at + 4, data_len)?;
        let mut data = vec![0u8; data_len as usize];
        self.file.read_exact(&mut data)?;

        Ok((name, data))
    }

    /// Shortens the file to `new_len`, used on crash recovery (truncate to
    /// the KV-recorded authoritative length) and when rebuilding a
    /// sub-slice (§4.4 `truncate`).
    pub fn truncate(&mut self, new_len: u64) -> PackageResult<()> {
        assert!(new_len <= self.len, "package truncate must not grow the file");
        if new_len < self.len {
            tracing::info!(target: "archive_package", path = %self.path.display(), from = self.len, to = new_len, "truncating package file");
        }
        self.file.set_len(new_len)?;
        self.len = new_len;
        Ok(())
    }

    fn need(&self, offset: u64, want: u64) -> PackageResult<()> {
        if offset + want > self.len {
            return Err(PackageError::Truncated { offset, need: want, have: self.len.saturating_sub(offset) });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_read_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let mut pkg = PackageFile::create(dir.path().join("arch.pack")).unwrap();
        let off1 = pkg.append("block-1", b"hello").unwrap();
        let off2 = pkg.append("block-2", b"world!").unwrap();
        assert_eq!(off1, 0);

        let (name, data) = pkg.read(off1).unwrap();
        assert_eq!(name, "block-1");
        assert_eq!(data, b"hello");

        let (name, data) = pkg.read(off2).unwrap();
        assert_eq!(name, "block-2");
        assert_eq!(data, b"world!");
    }

    #[test]
    fn reopen_preserves_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arch.pack");
        let off = {
            let mut pkg = PackageFile::create(&path).unwrap();
            pkg.append("a", b"x").unwrap();
            pkg.append("b", b"y").unwrap()
        };
        let mut reopened = PackageFile::open(&path).unwrap();
        let (name, data) = reopened.read(off).unwrap();
        assert_eq!(name, "b");
        assert_eq!(data, b"y");
    }

    #[test]
    fn truncate_to_recorded_length_discards_a_torn_tail_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arch.pack");
        let good_len = {
            let mut pkg = PackageFile::create(&path).unwrap();
            pkg.append("a", b"x").unwrap();
            pkg.len()
        };
        // Simulate a crash mid-append: extra bytes appended after the last
        // complete record, with no corresponding KV entry.
        {
            let mut pkg = PackageFile::open(&path).unwrap();
            pkg.file.seek(SeekFrom::End(0)).unwrap();
            pkg.file.write_all(&RECORD_MAGIC[..4]).unwrap();
        }

        let mut pkg = PackageFile::open(&path).unwrap();
        assert!(pkg.len() > good_len);
        pkg.truncate(good_len).unwrap();
        assert_eq!(pkg.len(), good_len);

        let (name, data) = pkg.read(0).unwrap();
        assert_eq!(name, "a");
        assert_eq!(data, b"x");
    }

    #[test]
    fn read_past_end_of_file_is_truncated_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut pkg = PackageFile::create(dir.path().join("arch.pack")).unwrap();
        pkg.append("a", b"x").unwrap();
        assert!(matches!(pkg.read(1000), Err(PackageError::Truncated { .. })));
    }

    #[test]
    fn read_raw_clamps_to_the_file_length() {
        let dir = tempfile::tempdir().unwrap();
        let mut pkg = PackageFile::create(dir.path().join("arch.pack")).unwrap();
        pkg.append("a", b"hello").unwrap();
        let all = pkg.read_raw(0, 1000).unwrap();
        assert_eq!(all.len(), pkg.len() as usize);
        let tail = pkg.read_raw(pkg.len(), 10).unwrap();
        assert!(tail.is_empty());
    }

    #[test]
    fn bad_magic_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arch.pack");
        {
            let mut pkg = PackageFile::create(&path).unwrap();
            pkg.append("a", b"x").unwrap();
        }
        let mut pkg = PackageFile::open(&path).unwrap();
        assert!(matches!(pkg.read(1), Err(PackageError::BadMagic { .. })));
    }
}

//! Sharded filesystem blob store.
//!
//! Blobs live under a root directory in two-level shard directories
//! derived from the owning entry id, which bounds directory fan-out. Two
//! parallel trees mirror the shard layout: `_versions` holds rotated
//! backups with a numeric suffix and bounded retention, `_trashcan` holds
//! soft-deleted blobs under a unique name.
//!
//! Writes are crash-safe: the source streams into a `_temp_` file in the
//! shard directory, the temp file is flushed and synced, then renamed over
//! the final path, and on Unix the shard directory is fsynced afterwards.
//! A failure mid-stream removes the temp file and leaves the previous blob
//! untouched. The metadata row is the caller's business and must only be
//! written after the rename succeeded.

use crate::config::ReplacePolicy;
use crate::error::PoolResult;
use pooldb_driver::StorageError;
use pooldb_schema::SqlValue;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;
use uuid::Uuid;

/// Backup tree for blobs displaced by a replace.
const VERSIONS_DIR: &str = "_versions";
/// Soft-delete tree.
const TRASHCAN_DIR: &str = "_trashcan";
/// Prefix of in-flight temp files inside a shard directory.
const TEMP_PREFIX: &str = "_temp_";

/// Column order of the file metadata table, matching [`FileRecord`]
/// construction.
pub(crate) const FILE_COLUMNS: [&str; 8] = [
    "id",
    "fileid",
    "filekey",
    "path",
    "filename",
    "size",
    "extension",
    "version",
];

/// One row of the file metadata table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Owning entry id.
    pub id: i64,
    /// Unique file row id.
    pub fileid: i64,
    /// Tag within the owning entry; one current file per (id, filekey).
    pub filekey: String,
    /// Repository-relative blob path with `/` separators.
    pub path: String,
    /// Original upload filename.
    pub filename: String,
    /// Blob size in bytes.
    pub size: i64,
    /// Filename extension without the dot, at most five characters.
    pub extension: String,
    /// Storage version marker.
    pub version: String,
}

impl FileRecord {
    /// Builds a record from a row selected in [`FILE_COLUMNS`] order.
    pub(crate) fn from_row(row: &[SqlValue]) -> Option<Self> {
        if row.len() < FILE_COLUMNS.len() {
            return None;
        }
        Some(Self {
            id: int_at(row, 0),
            fileid: int_at(row, 1),
            filekey: text_at(row, 2),
            path: text_at(row, 3),
            filename: text_at(row, 4),
            size: int_at(row, 5),
            extension: text_at(row, 6),
            version: text_at(row, 7),
        })
    }
}

/// An upload staged on an entry, consumed when the entry commits.
pub(crate) struct StagedFile {
    pub(crate) filename: String,
    pub(crate) source: Box<dyn Read + Send>,
}

/// A committed blob opened for reading.
///
/// Carries the metadata row alongside the open file and implements
/// [`Read`] and [`Seek`] for partial access to large blobs.
#[derive(Debug)]
pub struct FileHandle {
    record: FileRecord,
    file: File,
}

impl FileHandle {
    /// Returns the metadata row of the open blob.
    #[must_use]
    pub fn record(&self) -> &FileRecord {
        &self.record
    }

    /// Consumes the handle, returning the metadata row.
    #[must_use]
    pub fn into_record(self) -> FileRecord {
        self.record
    }
}

impl Read for FileHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Seek for FileHandle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

/// Location and size of a freshly written blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    /// Repository-relative path of the blob.
    pub path: String,
    /// Bytes written.
    pub size: i64,
}

/// The blob repository under one root directory.
///
/// Pure filesystem component: it never touches the database, and the
/// caller keeps metadata rows consistent with the blobs it moves. At most
/// one writer per (entry id, file key) slot at a time; concurrent writers
/// to the same slot must be serialized by the caller.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    policy: ReplacePolicy,
}

impl FileStore {
    /// Opens the repository, creating the root directory if needed.
    ///
    /// # Errors
    ///
    /// Fails when the root cannot be created.
    pub fn open(root: impl Into<PathBuf>, policy: ReplacePolicy) -> PoolResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root, policy })
    }

    /// Returns the repository root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the two-level shard directory for an entry id, relative to
    /// the root.
    ///
    /// The id is zero-padded to six digits; the two digits before the
    /// last two pick the first segment (suffixed `00`), the last two the
    /// second. Id 123 shards to `0100/23`, id 1234567 to `4500/67`.
    #[must_use]
    pub fn shard(id: i64) -> String {
        let digits = format!("{id:06}");
        let len = digits.len();
        format!("{}00/{}", &digits[len - 4..len - 2], &digits[len - 2..])
    }

    /// Returns the blob filename for a slot: `{id:06}_{key}_{filename}`.
    #[must_use]
    pub fn blob_name(id: i64, key: &str, filename: &str) -> String {
        format!("{id:06}_{key}_{filename}")
    }

    /// Returns the repository-relative path for a slot.
    #[must_use]
    pub fn relative_path(id: i64, key: &str, filename: &str) -> String {
        format!("{}/{}", Self::shard(id), Self::blob_name(id, key, filename))
    }

    /// Resolves a repository-relative path against the root.
    #[must_use]
    pub fn absolute(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// Streams a source into the slot, displacing any previous blob per
    /// the replace policy.
    ///
    /// # Errors
    ///
    /// Fails when the stream or any filesystem step fails. On failure the
    /// previous blob (if any) remains the current one and no temp file is
    /// left behind.
    pub fn write(
        &self,
        id: i64,
        key: &str,
        filename: &str,
        source: &mut dyn Read,
    ) -> PoolResult<StoredBlob> {
        let name = Self::blob_name(id, key, filename);
        let dir = self.root.join(Self::shard(id));
        let target = dir.join(&name);
        fs::create_dir_all(&dir)?;

        let temp = dir.join(format!("{TEMP_PREFIX}{}", Uuid::new_v4()));
        let size = match stream_into(&temp, source) {
            Ok(size) => size,
            Err(err) => {
                let _ = fs::remove_file(&temp);
                return Err(err);
            }
        };

        // Displace only after the new content is fully on disk.
        let displaced = if target.exists() {
            match self.displace(id, &name, &target) {
                Ok(moved) => moved,
                Err(err) => {
                    let _ = fs::remove_file(&temp);
                    return Err(err);
                }
            }
        } else {
            None
        };

        if let Err(err) = fs::rename(&temp, &target) {
            let _ = fs::remove_file(&temp);
            if let Some(old) = displaced {
                if let Err(back) = fs::rename(&old, &target) {
                    warn!(
                        "could not restore displaced blob {}: {}",
                        target.display(),
                        back
                    );
                }
            }
            return Err(err.into());
        }
        sync_dir(&dir)?;

        Ok(StoredBlob {
            path: format!("{}/{}", Self::shard(id), name),
            size,
        })
    }

    /// Opens a committed blob for reading.
    ///
    /// # Errors
    ///
    /// Fails when the blob named by the record is missing or unreadable.
    pub fn read(&self, record: FileRecord) -> PoolResult<FileHandle> {
        let file = File::open(self.absolute(&record.path))?;
        Ok(FileHandle { record, file })
    }

    /// Moves a blob out of the current tree per the replace policy.
    ///
    /// A missing blob is not an error; the metadata row may outlive a
    /// manually removed file and its removal must still proceed.
    ///
    /// # Errors
    ///
    /// Fails when the policy move itself fails.
    pub fn retire(&self, id: i64, relative: &str) -> PoolResult<()> {
        let target = self.absolute(relative);
        if !target.exists() {
            return Ok(());
        }
        let name = match relative.rsplit('/').next() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                return Err(StorageError::inconsistent(format!(
                    "blob path '{relative}' has no filename"
                ))
                .into())
            }
        };
        self.displace(id, &name, &target)?;
        Ok(())
    }

    /// Applies the replace policy to an existing blob. Returns where it
    /// went, `None` when it was removed.
    fn displace(&self, id: i64, name: &str, target: &Path) -> PoolResult<Option<PathBuf>> {
        match self.policy {
            ReplacePolicy::Remove => {
                fs::remove_file(target)?;
                Ok(None)
            }
            ReplacePolicy::Trashcan => {
                let dir = self.root.join(TRASHCAN_DIR).join(Self::shard(id));
                fs::create_dir_all(&dir)?;
                let dest = unique_in(&dir, name);
                fs::rename(target, &dest)?;
                Ok(Some(dest))
            }
            ReplacePolicy::Versions(keep) => {
                let dir = self.root.join(VERSIONS_DIR).join(Self::shard(id));
                fs::create_dir_all(&dir)?;
                let mut backups = numbered_backups(&dir, name)?;
                let next = backups.last().map_or(1, |(n, _)| n + 1);
                let dest = dir.join(format!("{name}.{next}"));
                fs::rename(target, &dest)?;
                backups.push((next, dest.clone()));
                // Oldest backups go first.
                while backups.len() > keep as usize {
                    let (_, oldest) = backups.remove(0);
                    fs::remove_file(&oldest)?;
                }
                if backups.iter().any(|(n, _)| *n == next) {
                    Ok(Some(dest))
                } else {
                    Ok(None)
                }
            }
        }
    }
}

/// The filename extension without the dot, truncated to five characters.
pub(crate) fn extension_of(filename: &str) -> String {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
            ext.chars().take(5).collect()
        }
        _ => String::new(),
    }
}

/// Writes the source to a new file, synced to disk.
fn stream_into(path: &Path, source: &mut dyn Read) -> PoolResult<i64> {
    let mut file = File::create(path)?;
    let size = io::copy(source, &mut file)?;
    file.flush()?;
    file.sync_all()?;
    Ok(size as i64)
}

/// Picks a free path in `dir` by suffixing `name` with `.1`, `.2`, ...
fn unique_in(dir: &Path, name: &str) -> PathBuf {
    let plain = dir.join(name);
    if !plain.exists() {
        return plain;
    }
    let mut n = 1u32;
    loop {
        let candidate = dir.join(format!("{name}.{n}"));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Lists numbered backups of `name` in `dir`, sorted by number.
fn numbered_backups(dir: &Path, name: &str) -> PoolResult<Vec<(u32, PathBuf)>> {
    let prefix = format!("{name}.");
    let mut backups = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        let Some(suffix) = file_name.strip_prefix(&prefix) else {
            continue;
        };
        if let Ok(number) = suffix.parse::<u32>() {
            backups.push((number, entry.path()));
        }
    }
    backups.sort_by_key(|(n, _)| *n);
    Ok(backups)
}

#[cfg(unix)]
fn sync_dir(path: &Path) -> io::Result<()> {
    // Fsync on a directory syncs its entries, making the rename durable.
    File::open(path)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}

fn int_at(row: &[SqlValue], index: usize) -> i64 {
    match row.get(index) {
        Some(value) => value.as_int().unwrap_or(0),
        None => 0,
    }
}

fn text_at(row: &[SqlValue], index: usize) -> String {
    match row.get(index) {
        Some(SqlValue::Text(s)) => s.clone(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::tempdir;

    fn store(policy: ReplacePolicy) -> (tempfile::TempDir, FileStore) {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path().join("files"), policy).unwrap();
        (dir, store)
    }

    fn read_blob(store: &FileStore, relative: &str) -> Vec<u8> {
        fs::read(store.absolute(relative)).unwrap()
    }

    #[test]
    fn shard_layout() {
        assert_eq!(FileStore::shard(1), "0000/01");
        assert_eq!(FileStore::shard(123), "0100/23");
        assert_eq!(FileStore::shard(9999), "9900/99");
        assert_eq!(FileStore::shard(1_234_567), "4500/67");
        assert_eq!(
            FileStore::blob_name(123, "image", "photo.jpg"),
            "000123_image_photo.jpg"
        );
        assert_eq!(
            FileStore::relative_path(123, "image", "photo.jpg"),
            "0100/23/000123_image_photo.jpg"
        );
    }

    #[test]
    fn extension_rules() {
        assert_eq!(extension_of("photo.jpg"), "jpg");
        assert_eq!(extension_of("archive.tar.gz"), "gz");
        assert_eq!(extension_of("README"), "");
        assert_eq!(extension_of(".hidden"), "");
        assert_eq!(extension_of("longext.markdown"), "markd");
    }

    #[test]
    fn write_and_read_back() {
        let (_dir, store) = store(ReplacePolicy::Trashcan);
        let blob = store
            .write(123, "image", "photo.jpg", &mut Cursor::new(b"hello blob"))
            .unwrap();
        assert_eq!(blob.path, "0100/23/000123_image_photo.jpg");
        assert_eq!(blob.size, 10);

        let record = FileRecord {
            id: 123,
            fileid: 1,
            filekey: "image".into(),
            path: blob.path.clone(),
            filename: "photo.jpg".into(),
            size: blob.size,
            extension: "jpg".into(),
            version: String::new(),
        };
        let mut handle = store.read(record).unwrap();
        let mut content = String::new();
        handle.read_to_string(&mut content).unwrap();
        assert_eq!(content, "hello blob");

        // Partial reads for large blobs.
        handle.seek(SeekFrom::Start(6)).unwrap();
        let mut tail = String::new();
        handle.read_to_string(&mut tail).unwrap();
        assert_eq!(tail, "blob");
        assert_eq!(handle.record().filekey, "image");
    }

    #[test]
    fn zero_byte_blob_is_valid() {
        let (_dir, store) = store(ReplacePolicy::Trashcan);
        let blob = store
            .write(7, "empty", "void.txt", &mut Cursor::new(b""))
            .unwrap();
        assert_eq!(blob.size, 0);
        assert!(store.absolute(&blob.path).exists());
    }

    #[test]
    fn replace_rotates_to_versions_with_retention() {
        let (_dir, store) = store(ReplacePolicy::Versions(2));
        for content in [&b"one"[..], b"two", b"three", b"four"] {
            store
                .write(123, "doc", "a.txt", &mut Cursor::new(content))
                .unwrap();
        }

        let current = read_blob(&store, "0100/23/000123_doc_a.txt");
        assert_eq!(current, b"four");

        let versions = store.root().join("_versions/0100/23");
        assert!(!versions.join("000123_doc_a.txt.1").exists());
        assert_eq!(fs::read(versions.join("000123_doc_a.txt.2")).unwrap(), b"two");
        assert_eq!(
            fs::read(versions.join("000123_doc_a.txt.3")).unwrap(),
            b"three"
        );
    }

    #[test]
    fn replace_moves_to_trashcan_under_unique_name() {
        let (_dir, store) = store(ReplacePolicy::Trashcan);
        for content in [&b"first"[..], b"second", b"third"] {
            store
                .write(55, "doc", "a.txt", &mut Cursor::new(content))
                .unwrap();
        }

        assert_eq!(read_blob(&store, "0000/55/000055_doc_a.txt"), b"third");
        let trash = store.root().join("_trashcan/0000/55");
        assert_eq!(fs::read(trash.join("000055_doc_a.txt")).unwrap(), b"first");
        assert_eq!(
            fs::read(trash.join("000055_doc_a.txt.1")).unwrap(),
            b"second"
        );
    }

    #[test]
    fn replace_removes_when_rotation_disabled() {
        let (_dir, store) = store(ReplacePolicy::Remove);
        store
            .write(9, "doc", "a.txt", &mut Cursor::new(b"old"))
            .unwrap();
        store
            .write(9, "doc", "a.txt", &mut Cursor::new(b"new"))
            .unwrap();

        assert_eq!(read_blob(&store, "0000/09/000009_doc_a.txt"), b"new");
        assert!(!store.root().join("_trashcan").exists());
        assert!(!store.root().join("_versions").exists());
    }

    struct BrokenStream {
        remaining: usize,
    }

    impl Read for BrokenStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.remaining == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::ConnectionAborted,
                    "stream interrupted",
                ));
            }
            let n = buf.len().min(self.remaining);
            for slot in &mut buf[..n] {
                *slot = b'x';
            }
            self.remaining -= n;
            Ok(n)
        }
    }

    #[test]
    fn failed_stream_leaves_previous_blob_and_no_temp() {
        let (_dir, store) = store(ReplacePolicy::Trashcan);
        store
            .write(123, "doc", "a.txt", &mut Cursor::new(b"stable"))
            .unwrap();

        let err = store.write(123, "doc", "a.txt", &mut BrokenStream { remaining: 64 });
        assert!(err.is_err());

        assert_eq!(read_blob(&store, "0100/23/000123_doc_a.txt"), b"stable");
        let shard = store.root().join("0100/23");
        let leftovers: Vec<_> = fs::read_dir(&shard)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(TEMP_PREFIX))
            .collect();
        assert!(leftovers.is_empty());
        // Nothing was displaced either.
        assert!(!store.root().join("_trashcan").exists());
    }

    #[test]
    fn retire_applies_policy_and_tolerates_missing_blob() {
        let (_dir, store) = store(ReplacePolicy::Trashcan);
        let blob = store
            .write(31, "doc", "a.txt", &mut Cursor::new(b"gone soon"))
            .unwrap();
        store.retire(31, &blob.path).unwrap();
        assert!(!store.absolute(&blob.path).exists());
        assert_eq!(
            fs::read(store.root().join("_trashcan/0000/31/000031_doc_a.txt")).unwrap(),
            b"gone soon"
        );

        // Already gone: not an error.
        store.retire(31, &blob.path).unwrap();
    }

    #[test]
    fn file_record_from_row() {
        let row = vec![
            SqlValue::Int(123),
            SqlValue::Int(4),
            SqlValue::Text("image".into()),
            SqlValue::Text("0100/23/000123_image_photo.jpg".into()),
            SqlValue::Text("photo.jpg".into()),
            SqlValue::Int(10),
            SqlValue::Text("jpg".into()),
            SqlValue::Null,
        ];
        let record = FileRecord::from_row(&row).unwrap();
        assert_eq!(record.id, 123);
        assert_eq!(record.fileid, 4);
        assert_eq!(record.filekey, "image");
        assert_eq!(record.version, "");
        assert!(FileRecord::from_row(&row[..5]).is_none());
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_shard_shape_is_stable(id in 0i64..1_000_000_000) {
                let shard = FileStore::shard(id);
                prop_assert_eq!(shard.len(), 7);
                prop_assert_eq!(&shard[2..5], "00/");
                let digits = format!("{id:06}");
                prop_assert_eq!(&shard[..2], &digits[digits.len() - 4..digits.len() - 2]);
                prop_assert_eq!(&shard[5..], &digits[digits.len() - 2..]);
                prop_assert_eq!(FileStore::shard(id), shard);
            }
        }
    }
}

//! Integration tests for the record store: the commit protocol across
//! independent handles, the blob lifecycle under the replace policies,
//! and a full article scenario from draft to deletion.

use std::fs;
use std::io::{self, Cursor, Read};

use chrono::NaiveDate;
use pooldb_core::{
    FileStore, Migrator, Pool, PoolConfig, PoolError, Preload, ReplacePolicy, SelectSpec,
};
use pooldb_driver::{Connector, SqliteConnector, StorageError};
use pooldb_schema::{Datatype, FieldDef, PoolStructure, SqlValue, Value};
use serde_json::json;
use tempfile::TempDir;

fn article_structure() -> PoolStructure {
    let mut structure = PoolStructure::new();
    structure
        .define(
            "article",
            vec![
                FieldDef::new("header", Datatype::String).with_size(120),
                FieldDef::new("body", Datatype::Text),
                FieldDef::new("rating", Datatype::Number),
                FieldDef::new("published", Datatype::Date),
                FieldDef::new("labels", Datatype::Json),
            ],
        )
        .unwrap();
    structure
}

/// A migrated, file-backed pool in the given tempdir.
fn open_pool(dir: &TempDir, policy: ReplacePolicy) -> Pool {
    let structure = article_structure();
    let connector = SqliteConnector::file(dir.path().join("pool.db"));
    let setup = connector.connect().unwrap();
    Migrator::new(&structure).apply(setup.as_ref()).unwrap();
    drop(setup);

    let config = PoolConfig::new()
        .file_root(dir.path().join("files"))
        .replace_policy(policy);
    Pool::open(structure, connector, config).unwrap()
}

/// A source that dies before producing a single byte.
struct FailingStream;

impl Read for FailingStream {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "upload interrupted",
        ))
    }
}

#[test]
fn handles_are_isolated_until_commit() {
    let dir = TempDir::new().unwrap();
    let pool = open_pool(&dir, ReplacePolicy::Trashcan);

    let writer = pool.create_entry("article", "ada").unwrap();
    writer.set_data("header", Value::from("draft")).unwrap();
    writer.commit("ada").unwrap();
    let id = writer.id();

    let reader = pool.get_entry(id, Preload::All).unwrap();
    let editor = pool.get_entry(id, Preload::Skip).unwrap();
    editor.set_data("header", Value::from("edited")).unwrap();

    // Pending writes live in the staging handle only.
    assert_eq!(editor.get_data("header").unwrap(), Value::from("edited"));
    assert_eq!(reader.get_data("header").unwrap(), Value::from("draft"));

    editor.commit("grace").unwrap();

    // The reader's cache is untouched until it is dropped explicitly.
    assert_eq!(reader.get_data("header").unwrap(), Value::from("draft"));
    reader.clear_cache();
    assert_eq!(reader.get_data("header").unwrap(), Value::from("edited"));
    assert_eq!(
        reader.get_meta("pool_changedby").unwrap(),
        Value::from("grace")
    );
}

#[test]
fn commits_write_only_their_own_dirty_fields() {
    let dir = TempDir::new().unwrap();
    let pool = open_pool(&dir, ReplacePolicy::Trashcan);

    let entry = pool.create_entry("article", "ada").unwrap();
    entry.commit("ada").unwrap();
    let id = entry.id();

    let first = pool.get_entry(id, Preload::All).unwrap();
    let second = pool.get_entry(id, Preload::All).unwrap();
    first.set_data("header", Value::from("first words")).unwrap();
    second
        .set_data("header", Value::from("second words"))
        .unwrap();
    second.set_data("rating", Value::Int(9)).unwrap();
    first.commit("ada").unwrap();
    second.commit("grace").unwrap();

    // The conflicting field belongs to the later commit; the disjoint
    // field survives because commits update dirty columns only.
    let check = pool.get_entry(id, Preload::All).unwrap();
    assert_eq!(check.get_data("header").unwrap(), Value::from("second words"));
    assert_eq!(check.get_data("rating").unwrap(), Value::Int(9));
}

#[test]
fn undo_discards_staged_writes_and_uploads() {
    let dir = TempDir::new().unwrap();
    let pool = open_pool(&dir, ReplacePolicy::Trashcan);

    let entry = pool.create_entry("article", "ada").unwrap();
    entry.set_data("header", Value::from("keep me")).unwrap();
    entry.commit("ada").unwrap();

    entry.set_data("header", Value::from("discard me")).unwrap();
    entry.set_meta("title", Value::from("discard too")).unwrap();
    entry.set_file("cover", "cover.png", Cursor::new(b"bytes".to_vec()));
    assert!(entry.is_dirty());

    entry.undo();
    assert!(!entry.is_dirty());
    assert_eq!(entry.get_data("header").unwrap(), Value::from("keep me"));
    assert_eq!(entry.get_meta("title").unwrap(), Value::from(""));

    // The discarded upload never reaches storage.
    entry.commit("ada").unwrap();
    assert!(entry.files().unwrap().is_empty());
}

#[test]
fn failed_upload_stream_aborts_the_whole_commit() {
    let dir = TempDir::new().unwrap();
    let pool = open_pool(&dir, ReplacePolicy::Trashcan);

    let entry = pool.create_entry("article", "ada").unwrap();
    entry.set_data("header", Value::from("stable")).unwrap();
    entry.set_file("doc", "doc.txt", Cursor::new(b"stable blob".to_vec()));
    entry.commit("ada").unwrap();
    let id = entry.id();

    entry.set_data("header", Value::from("never lands")).unwrap();
    entry.set_file("doc", "doc.txt", FailingStream);
    assert!(entry.commit("ada").is_err());
    assert_eq!(pool.stats().transactions_aborted, 1);

    // The field update rolled back with the transaction.
    let check = pool.get_entry(id, Preload::All).unwrap();
    assert_eq!(check.get_data("header").unwrap(), Value::from("stable"));

    // The previous blob and its row are intact, with no temp leftovers.
    let records = pool.files_for(id).unwrap();
    assert_eq!(records.len(), 1);
    let mut content = String::new();
    check
        .file("doc")
        .unwrap()
        .unwrap()
        .read_to_string(&mut content)
        .unwrap();
    assert_eq!(content, "stable blob");
    let shard_dir = dir.path().join("files").join(FileStore::shard(id));
    assert_eq!(fs::read_dir(shard_dir).unwrap().count(), 1);

    // The failing handle dropped its pending state.
    assert!(!entry.is_dirty());
    assert_eq!(entry.get_data("header").unwrap(), Value::from("stable"));
}

#[test]
fn replacing_an_upload_rotates_versions_with_retention() {
    let dir = TempDir::new().unwrap();
    let pool = open_pool(&dir, ReplacePolicy::Versions(2));

    let entry = pool.create_entry("article", "ada").unwrap();
    for content in ["v1", "v2", "v3", "v4"] {
        entry.set_file("manual", "manual.pdf", Cursor::new(content.as_bytes().to_vec()));
        entry.commit("ada").unwrap();
    }

    // One row per slot, upserted in place.
    let records = entry.files().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].size, 2);

    let mut current = String::new();
    entry
        .file("manual")
        .unwrap()
        .unwrap()
        .read_to_string(&mut current)
        .unwrap();
    assert_eq!(current, "v4");

    // Two backups kept, the oldest pruned.
    let id = entry.id();
    let name = FileStore::blob_name(id, "manual", "manual.pdf");
    let versions = dir
        .path()
        .join("files/_versions")
        .join(FileStore::shard(id));
    assert!(!versions.join(format!("{name}.1")).exists());
    assert_eq!(fs::read(versions.join(format!("{name}.2"))).unwrap(), b"v2");
    assert_eq!(fs::read(versions.join(format!("{name}.3"))).unwrap(), b"v3");
}

#[test]
fn article_lifecycle_end_to_end() {
    let dir = TempDir::new().unwrap();
    let pool = open_pool(&dir, ReplacePolicy::Trashcan);

    // An author drafts an article with a cover image.
    let entry = pool.create_entry("article", "ada").unwrap();
    entry
        .set_meta("title", Value::from("Sharded blob trees"))
        .unwrap();
    entry
        .set_data("header", Value::from("Sharded blob trees"))
        .unwrap();
    entry
        .set_data("body", Value::from("How the file repository lays out its shards."))
        .unwrap();
    entry
        .set_data(
            "published",
            Value::from(NaiveDate::from_ymd_opt(2024, 5, 11).unwrap()),
        )
        .unwrap();
    entry
        .set_data(
            "labels",
            Value::from(json!({"tags": ["storage", "files"], "draft": false})),
        )
        .unwrap();
    entry.set_file("cover", "cover.jpg", Cursor::new(b"jpeg data".to_vec()));
    entry.commit("ada").unwrap();
    entry
        .write_fulltext("sharded blob trees file repository layout")
        .unwrap();
    let id = entry.id();

    // Typed fields come back structured.
    let loaded = pool.get_entry(id, Preload::All).unwrap();
    assert_eq!(
        loaded.get_data("published").unwrap(),
        Value::Date(NaiveDate::from_ymd_opt(2024, 5, 11).unwrap())
    );
    assert_eq!(
        loaded.get_data("labels").unwrap(),
        Value::Json(json!({"tags": ["storage", "files"], "draft": false}))
    );

    // Findable by phrase and by filename.
    let hits = pool
        .fulltext_search("repository", &["id", "title"], &[], &SelectSpec::new(), None)
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0][0], SqlValue::Int(id));
    let found = pool.search_filename("cover").unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].extension, "jpg");

    // A rename changes the stored name but leaves the blob alone.
    assert!(loaded.rename_file("cover", "issue-cover.jpg").unwrap());
    let records = loaded.files().unwrap();
    assert_eq!(records[0].filename, "issue-cover.jpg");
    let mut bytes = Vec::new();
    loaded
        .file("cover")
        .unwrap()
        .unwrap()
        .read_to_end(&mut bytes)
        .unwrap();
    assert_eq!(bytes, b"jpeg data");
    assert_eq!(loaded.file_keys().unwrap(), vec!["cover".to_string()]);

    // Deleting the file retires the blob and stamps the change.
    assert!(loaded.delete_file("cover", "grace").unwrap());
    assert!(loaded.file("cover").unwrap().is_none());
    assert!(loaded.files().unwrap().is_empty());
    let trashed = dir
        .path()
        .join("files/_trashcan")
        .join(FileStore::shard(id))
        .join(FileStore::blob_name(id, "cover", "cover.jpg"));
    assert_eq!(fs::read(trashed).unwrap(), b"jpeg data");
    assert_eq!(
        loaded.get_meta("pool_changedby").unwrap(),
        Value::from("grace")
    );
}

#[test]
fn fixed_id_collision_is_a_constraint_error() {
    let dir = TempDir::new().unwrap();
    let pool = open_pool(&dir, ReplacePolicy::Trashcan);

    let entry = pool.create_entry_with_id(77, "article", "ada").unwrap();
    entry.commit("ada").unwrap();

    let err = pool.create_entry_with_id(77, "article", "ada").unwrap_err();
    assert!(matches!(
        err,
        PoolError::Storage(StorageError::Constraint { .. })
    ));
    assert_eq!(pool.count_entries(None).unwrap(), 1);
}

#[test]
fn uploads_need_a_configured_file_root() {
    let dir = TempDir::new().unwrap();
    let structure = article_structure();
    let connector = SqliteConnector::file(dir.path().join("pool.db"));
    let setup = connector.connect().unwrap();
    Migrator::new(&structure).apply(setup.as_ref()).unwrap();
    drop(setup);
    let pool = Pool::open(structure, connector, PoolConfig::new()).unwrap();

    let entry = pool.create_entry("article", "ada").unwrap();
    entry.set_data("header", Value::from("no files here")).unwrap();
    entry.set_file("cover", "cover.png", Cursor::new(b"bytes".to_vec()));
    let err = entry.commit("ada").unwrap_err();
    assert!(matches!(err, PoolError::FilesDisabled));
    assert!(matches!(
        entry.file("cover").unwrap_err(),
        PoolError::FilesDisabled
    ));

    // Metadata-only commits still work on a fileless pool.
    entry.set_data("header", Value::from("no files here")).unwrap();
    entry.commit("ada").unwrap();
    assert_eq!(
        entry.get_data("header").unwrap(),
        Value::from("no files here")
    );
}

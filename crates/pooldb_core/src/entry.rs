//! Typed entries with buffered writes.
//!
//! An [`Entry`] is one logical record: a row in the shared meta table plus
//! a row in its type's data table, and any number of attached files. Field
//! access goes through two per-instance caches (meta and data), each a
//! small state machine:
//!
//! ```text
//! Unloaded ── read ──> Loaded ── write ──> Dirty ── commit ──> Loaded
//!                                            │
//!                                          undo ──> Loaded
//! ```
//!
//! Reads consult pending writes first, then committed values, lazily
//! loading the layer's row on first access. Writes validate through the
//! schema registry immediately and stage into the pending map; nothing
//! reaches storage before [`Entry::commit`]. Caches are instance-scoped:
//! two `Entry` handles for the same id do not see each other's pending
//! writes, and the last commit wins.

use crate::error::{PoolError, PoolResult};
use crate::files::{extension_of, FileHandle, FileRecord, StagedFile, FILE_COLUMNS};
use crate::pool::{decode_row, PoolShared};
use crate::sql::{ParamFilter, SelectSpec, SortField, SqlBuilder};
use chrono::Local;
use parking_lot::Mutex;
use pooldb_driver::DbConnection;
use pooldb_schema::{
    deserialize_value, serialize_value, Datatype, PoolStructure, SchemaError, SqlValue, Value,
    FILE_TABLE, IDENTITY_FIELDS, META_TABLE,
};
use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;

/// A validated pending write: the normalized value for cache reads and
/// the storage form for the commit statement.
#[derive(Debug, Clone)]
struct Staged {
    value: Value,
    stored: SqlValue,
}

/// Per-layer field cache with separate committed and pending maps.
///
/// `committed == None` is the Unloaded state; a non-empty `pending` map is
/// the Dirty state.
#[derive(Debug, Default)]
struct FieldCache {
    committed: Option<BTreeMap<String, Value>>,
    pending: BTreeMap<String, Staged>,
}

impl FieldCache {
    fn is_loaded(&self) -> bool {
        self.committed.is_some()
    }

    fn is_dirty(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Validates and stages one write. Identity fields are silently
    /// ignored; bad values fail fast and stage nothing.
    fn stage(
        &mut self,
        structure: &PoolStructure,
        table: &str,
        field: &str,
        value: Value,
    ) -> PoolResult<()> {
        if IDENTITY_FIELDS.contains(&field) {
            return Ok(());
        }
        let datatype = structure.field_type(table, field)?;
        let stored = serialize_value(datatype, field, &value)?;
        // Cache the normalized form so reads match a fresh load.
        let value = deserialize_value(datatype, stored.clone());
        self.pending.insert(field.to_string(), Staged { value, stored });
        Ok(())
    }

    /// Pending value first, then committed.
    fn cached(&self, field: &str) -> Option<Value> {
        if let Some(staged) = self.pending.get(field) {
            return Some(staged.value.clone());
        }
        self.committed.as_ref()?.get(field).cloned()
    }

    /// Committed values overlaid with pending writes.
    fn snapshot(&self) -> BTreeMap<String, Value> {
        let mut map = self.committed.clone().unwrap_or_default();
        for (field, staged) in &self.pending {
            map.insert(field.clone(), staged.value.clone());
        }
        map
    }

    fn pending_stored(&self) -> BTreeMap<String, SqlValue> {
        self.pending
            .iter()
            .map(|(field, staged)| (field.clone(), staged.stored.clone()))
            .collect()
    }

    fn prime(&mut self, map: BTreeMap<String, Value>) {
        self.committed = Some(map);
    }

    /// Moves pending writes into the committed map. A still-Unloaded
    /// cache stays Unloaded; the next read fetches the fresh row.
    fn merge_pending(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        if let Some(committed) = self.committed.as_mut() {
            for (field, staged) in pending {
                committed.insert(field, staged.value);
            }
        }
    }

    fn discard_pending(&mut self) {
        self.pending.clear();
    }

    /// Drops the committed map, forcing a reload on the next read.
    fn invalidate(&mut self) {
        self.committed = None;
    }
}

/// One logical record with buffered writes and attached files.
///
/// Entries are `Send` and internally locked; they hold shared pool state
/// and check out a connection per operation. The engine does not serialize
/// concurrent writers of the same record across handles; callers that need
/// that guarantee hold their own per-record lock.
pub struct Entry {
    shared: Arc<PoolShared>,
    id: i64,
    data_table: String,
    data_ref: i64,
    meta: Mutex<FieldCache>,
    data: Mutex<FieldCache>,
    staged_files: Mutex<BTreeMap<String, StagedFile>>,
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("id", &self.id)
            .field("data_table", &self.data_table)
            .field("data_ref", &self.data_ref)
            .finish_non_exhaustive()
    }
}

impl Entry {
    pub(crate) fn new(
        shared: Arc<PoolShared>,
        id: i64,
        data_table: String,
        data_ref: i64,
    ) -> Self {
        Self {
            shared,
            id,
            data_table,
            data_ref,
            meta: Mutex::new(FieldCache::default()),
            data: Mutex::new(FieldCache::default()),
            staged_files: Mutex::new(BTreeMap::new()),
        }
    }

    /// Seeds the meta cache from an already-fetched row.
    pub(crate) fn prime_meta(&self, map: BTreeMap<String, Value>) {
        self.meta.lock().prime(map);
    }

    /// Seeds the data cache from an already-fetched row.
    pub(crate) fn prime_data(&self, map: BTreeMap<String, Value>) {
        self.data.lock().prime(map);
    }

    /// The entry id.
    #[must_use]
    pub fn id(&self) -> i64 {
        self.id
    }

    /// The type's data table name.
    #[must_use]
    pub fn data_table(&self) -> &str {
        &self.data_table
    }

    /// The id of the data row in [`Self::data_table`].
    #[must_use]
    pub fn data_ref(&self) -> i64 {
        self.data_ref
    }

    // Field access ----------------------------------------------------

    /// Reads one meta field, loading the meta row on first access.
    ///
    /// The identity fields (`id`, `pool_datatbl`, `pool_dataref`) are
    /// served from the handle without touching storage.
    ///
    /// # Errors
    ///
    /// Fails when the field is not a meta column, the row is gone, or the
    /// load fails.
    pub fn get_meta(&self, field: &str) -> PoolResult<Value> {
        match field {
            "id" => return Ok(Value::Int(self.id)),
            "pool_datatbl" => return Ok(Value::Text(self.data_table.clone())),
            "pool_dataref" => return Ok(Value::Int(self.data_ref)),
            _ => {}
        }
        self.shared.structure.field(META_TABLE, field)?;
        let mut cache = self.meta.lock();
        if let Some(value) = cache.cached(field) {
            return Ok(value);
        }
        self.load_meta(&mut cache)?;
        Ok(cache.cached(field).unwrap_or(Value::Null))
    }

    /// Reads one data field, loading the data row on first access.
    ///
    /// # Errors
    ///
    /// Fails when the field is not declared for the type, the row is
    /// gone, or the load fails.
    pub fn get_data(&self, field: &str) -> PoolResult<Value> {
        if field == "id" {
            return Ok(Value::Int(self.data_ref));
        }
        self.shared.structure.field(&self.data_table, field)?;
        let mut cache = self.data.lock();
        if let Some(value) = cache.cached(field) {
            return Ok(value);
        }
        self.load_data(&mut cache)?;
        Ok(cache.cached(field).unwrap_or(Value::Null))
    }

    /// Stages one meta write. Identity fields are silently ignored.
    ///
    /// # Errors
    ///
    /// Fails when the field is unknown or the value does not fit its
    /// datatype; nothing is staged on error.
    pub fn set_meta(&self, field: &str, value: Value) -> PoolResult<()> {
        self.meta
            .lock()
            .stage(&self.shared.structure, META_TABLE, field, value)
    }

    /// Stages one data write. The `id` key field is silently ignored.
    ///
    /// # Errors
    ///
    /// As [`Self::set_meta`], against the type's declared fields.
    pub fn set_data(&self, field: &str, value: Value) -> PoolResult<()> {
        self.data
            .lock()
            .stage(&self.shared.structure, &self.data_table, field, value)
    }

    /// Stages several meta writes; fails on the first bad one.
    ///
    /// # Errors
    ///
    /// As [`Self::set_meta`]. Writes staged before the failure stay
    /// staged.
    pub fn update_meta(&self, values: BTreeMap<String, Value>) -> PoolResult<()> {
        let mut cache = self.meta.lock();
        for (field, value) in values {
            cache.stage(&self.shared.structure, META_TABLE, &field, value)?;
        }
        Ok(())
    }

    /// Stages several data writes; fails on the first bad one.
    ///
    /// # Errors
    ///
    /// As [`Self::set_data`].
    pub fn update_data(&self, values: BTreeMap<String, Value>) -> PoolResult<()> {
        let mut cache = self.data.lock();
        for (field, value) in values {
            cache.stage(&self.shared.structure, &self.data_table, &field, value)?;
        }
        Ok(())
    }

    /// The full meta layer: committed values overlaid with pending
    /// writes, identity fields included.
    ///
    /// # Errors
    ///
    /// Fails when the row is gone or the load fails.
    pub fn meta_snapshot(&self) -> PoolResult<BTreeMap<String, Value>> {
        let mut cache = self.meta.lock();
        self.load_meta(&mut cache)?;
        let mut map = cache.snapshot();
        map.insert("id".to_string(), Value::Int(self.id));
        map.insert(
            "pool_datatbl".to_string(),
            Value::Text(self.data_table.clone()),
        );
        map.insert("pool_dataref".to_string(), Value::Int(self.data_ref));
        Ok(map)
    }

    /// The full data layer: committed values overlaid with pending
    /// writes.
    ///
    /// # Errors
    ///
    /// Fails when the row is gone or the load fails.
    pub fn data_snapshot(&self) -> PoolResult<BTreeMap<String, Value>> {
        let mut cache = self.data.lock();
        self.load_data(&mut cache)?;
        let mut map = cache.snapshot();
        map.insert("id".to_string(), Value::Int(self.data_ref));
        Ok(map)
    }

    // Commit protocol --------------------------------------------------

    /// Stages the change stamp: `pool_change` now, `pool_changedby` the
    /// given user. Committed with the next [`Self::commit`].
    ///
    /// # Errors
    ///
    /// Fails only when the meta table lacks the stamp columns, which
    /// cannot happen with the seeded registry.
    pub fn touch(&self, user: &str) -> PoolResult<()> {
        let mut cache = self.meta.lock();
        self.stage_stamps(&mut cache, user)
    }

    /// Writes all pending changes in one transaction.
    ///
    /// Stamps the change columns, then issues at most one UPDATE per
    /// dirty layer, then commits staged file uploads (blob first, then
    /// its metadata row). On success pending merges into committed; on
    /// any failure the transaction rolls back, all pending state is
    /// discarded and the caches are invalidated so the next read sees
    /// storage.
    ///
    /// # Errors
    ///
    /// Fails when validation, a statement, or a blob write fails. Blobs
    /// already replaced before the failing step stay replaced; their
    /// previous content remains recoverable per the replace policy.
    pub fn commit(&self, user: &str) -> PoolResult<()> {
        let mut meta = self.meta.lock();
        let mut data = self.data.lock();
        let mut staged = self.staged_files.lock();

        self.stage_stamps(&mut meta, user)?;
        let meta_update = meta.pending_stored();
        let data_update = data.pending_stored();

        let result = self.run_commit(&meta_update, &data_update, &mut staged);
        match result {
            Ok(()) => {
                meta.merge_pending();
                data.merge_pending();
                staged.clear();
                Ok(())
            }
            Err(err) => {
                meta.discard_pending();
                meta.invalidate();
                data.discard_pending();
                data.invalidate();
                staged.clear();
                Err(err)
            }
        }
    }

    /// Discards all pending writes and staged uploads. Storage is not
    /// touched; committed values stay cached.
    pub fn undo(&self) {
        self.meta.lock().discard_pending();
        self.data.lock().discard_pending();
        self.staged_files.lock().clear();
    }

    /// Whether any layer has pending writes or staged uploads.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.meta.lock().is_dirty()
            || self.data.lock().is_dirty()
            || !self.staged_files.lock().is_empty()
    }

    /// Drops both field caches, forcing reloads on the next read.
    /// Pending writes are kept.
    pub fn clear_cache(&self) {
        self.meta.lock().invalidate();
        self.data.lock().invalidate();
    }

    // Files ------------------------------------------------------------

    /// Stages a file upload for the slot `key`; the blob and its
    /// metadata row are written by the next [`Self::commit`].
    pub fn set_file(
        &self,
        key: impl Into<String>,
        filename: impl Into<String>,
        source: impl Read + Send + 'static,
    ) {
        self.staged_files.lock().insert(
            key.into(),
            StagedFile {
                filename: filename.into(),
                source: Box::new(source),
            },
        );
    }

    /// Opens the committed file in the slot `key`, or `None` when the
    /// slot is empty.
    ///
    /// # Errors
    ///
    /// Fails when the file store is disabled, the lookup fails, or the
    /// blob named by the metadata row is missing.
    pub fn file(&self, key: &str) -> PoolResult<Option<FileHandle>> {
        let store = self.shared.file_store()?;
        let Some(record) = self.file_record(key)? else {
            return Ok(None);
        };
        Ok(Some(store.read(record)?))
    }

    /// All committed file rows of this entry, ordered by file id.
    ///
    /// # Errors
    ///
    /// Fails when the lookup fails.
    pub fn files(&self) -> PoolResult<Vec<FileRecord>> {
        let builder = SqlBuilder::new(&self.shared.structure);
        let query = builder.build_table_select(
            FILE_TABLE,
            &FILE_COLUMNS,
            &[ParamFilter::eq("id", Value::Int(self.id))],
            &SelectSpec::new().sort(vec![SortField::asc("fileid")]),
        )?;
        let rows = self.shared.query(&query)?;
        Ok(rows.iter().filter_map(|r| FileRecord::from_row(r)).collect())
    }

    /// The distinct committed file keys of this entry.
    ///
    /// # Errors
    ///
    /// Fails when the lookup fails.
    pub fn file_keys(&self) -> PoolResult<Vec<String>> {
        let builder = SqlBuilder::new(&self.shared.structure);
        let query = builder.build_table_select(
            FILE_TABLE,
            &["filekey"],
            &[ParamFilter::eq("id", Value::Int(self.id))],
            &SelectSpec::new().group_by("filekey"),
        )?;
        let rows = self.shared.query(&query)?;
        Ok(rows
            .iter()
            .filter_map(|row| match row.first() {
                Some(SqlValue::Text(key)) => Some(key.clone()),
                _ => None,
            })
            .collect())
    }

    /// Removes the file in the slot `key` immediately: the blob moves per
    /// the replace policy, the row is deleted, and the change stamp is
    /// written. Returns `false` when the slot is empty.
    ///
    /// # Errors
    ///
    /// Fails when the file store is disabled or a step fails.
    pub fn delete_file(&self, key: &str, user: &str) -> PoolResult<bool> {
        let store = self.shared.file_store()?;
        let Some(record) = self.file_record(key)? else {
            return Ok(false);
        };
        if !record.path.is_empty() {
            store.retire(self.id, &record.path)?;
        }
        let builder = SqlBuilder::new(&self.shared.structure);
        let delete = builder.build_delete(FILE_TABLE, "fileid", SqlValue::Int(record.fileid))?;
        self.shared.execute(&delete)?;
        self.write_stamps(user)?;
        Ok(true)
    }

    /// Changes the stored filename of the slot `key` without touching the
    /// blob. Returns `false` when the slot is empty.
    ///
    /// # Errors
    ///
    /// Fails when the lookup or the update fails.
    pub fn rename_file(&self, key: &str, filename: &str) -> PoolResult<bool> {
        let Some(record) = self.file_record(key)? else {
            return Ok(false);
        };
        let mut values = BTreeMap::new();
        values.insert(
            "filename".to_string(),
            SqlValue::Text(filename.to_string()),
        );
        let builder = SqlBuilder::new(&self.shared.structure);
        let update =
            builder.build_update(FILE_TABLE, &values, "fileid", SqlValue::Int(record.fileid))?;
        self.shared.execute(&update)?;
        Ok(true)
    }

    // Fulltext ---------------------------------------------------------

    /// Creates or replaces the fulltext body of this entry.
    ///
    /// # Errors
    ///
    /// Fails when a statement fails.
    pub fn write_fulltext(&self, text: &str) -> PoolResult<()> {
        crate::pool::upsert_fulltext(&self.shared, self.id, text)
    }

    /// Reads the fulltext body, or `None` when the entry has none.
    ///
    /// # Errors
    ///
    /// Fails when the lookup fails.
    pub fn read_fulltext(&self) -> PoolResult<Option<String>> {
        crate::pool::fetch_fulltext(&self.shared, self.id)
    }

    // Internal ---------------------------------------------------------

    fn load_meta(&self, cache: &mut FieldCache) -> PoolResult<()> {
        if cache.is_loaded() {
            return Ok(());
        }
        let fields: Vec<&str> = self
            .shared
            .structure
            .table(META_TABLE)?
            .field_ids()
            .collect();
        let builder = SqlBuilder::new(&self.shared.structure);
        let query = builder.build_table_select(
            META_TABLE,
            &fields,
            &[ParamFilter::eq("id", Value::Int(self.id))],
            &SelectSpec::new(),
        )?;
        let rows = self.shared.query(&query)?;
        let Some(row) = rows.into_iter().next() else {
            return Err(PoolError::not_found(self.id));
        };
        cache.prime(decode_row(&self.shared.structure, META_TABLE, &fields, &row));
        Ok(())
    }

    fn load_data(&self, cache: &mut FieldCache) -> PoolResult<()> {
        if cache.is_loaded() {
            return Ok(());
        }
        let fields: Vec<&str> = self
            .shared
            .structure
            .table(&self.data_table)?
            .field_ids()
            .collect();
        let builder = SqlBuilder::new(&self.shared.structure);
        let query = builder.build_table_select(
            &self.data_table,
            &fields,
            &[ParamFilter::eq("id", Value::Int(self.data_ref))],
            &SelectSpec::new(),
        )?;
        let rows = self.shared.query(&query)?;
        let Some(row) = rows.into_iter().next() else {
            return Err(PoolError::not_found(self.id));
        };
        cache.prime(decode_row(
            &self.shared.structure,
            &self.data_table,
            &fields,
            &row,
        ));
        Ok(())
    }

    fn stage_stamps(&self, cache: &mut FieldCache, user: &str) -> PoolResult<()> {
        cache.stage(
            &self.shared.structure,
            META_TABLE,
            "pool_change",
            Value::DateTime(Local::now().naive_local()),
        )?;
        cache.stage(
            &self.shared.structure,
            META_TABLE,
            "pool_changedby",
            Value::Text(user.to_string()),
        )
    }

    /// Writes the change stamp immediately and invalidates the meta
    /// cache.
    fn write_stamps(&self, user: &str) -> PoolResult<()> {
        let mut values = BTreeMap::new();
        values.insert(
            "pool_change".to_string(),
            serialize_value(
                Datatype::Datetime,
                "pool_change",
                &Value::DateTime(Local::now().naive_local()),
            )?,
        );
        values.insert(
            "pool_changedby".to_string(),
            SqlValue::Text(user.to_string()),
        );
        let builder = SqlBuilder::new(&self.shared.structure);
        let update = builder.build_update(META_TABLE, &values, "id", SqlValue::Int(self.id))?;
        self.shared.execute(&update)?;
        self.meta.lock().invalidate();
        Ok(())
    }

    fn run_commit(
        &self,
        meta_update: &BTreeMap<String, SqlValue>,
        data_update: &BTreeMap<String, SqlValue>,
        staged: &mut BTreeMap<String, StagedFile>,
    ) -> PoolResult<()> {
        // Uploads need a configured file store; fail before the
        // transaction opens.
        if !staged.is_empty() {
            self.shared.file_store()?;
        }
        self.shared.with_transaction(|conn| {
            let builder = SqlBuilder::new(&self.shared.structure);
            if !meta_update.is_empty() {
                let update =
                    builder.build_update(META_TABLE, meta_update, "id", SqlValue::Int(self.id))?;
                conn.execute(&update.text, &update.args)?;
                self.shared.stats.record_execute();
            }
            if !data_update.is_empty() {
                let update = builder.build_update(
                    &self.data_table,
                    data_update,
                    "id",
                    SqlValue::Int(self.data_ref),
                )?;
                conn.execute(&update.text, &update.args)?;
                self.shared.stats.record_execute();
            }
            for (key, upload) in staged.iter_mut() {
                self.commit_file(conn, key, upload)?;
            }
            Ok(())
        })
    }

    /// Writes one staged upload: blob first, then its metadata row in the
    /// surrounding transaction.
    fn commit_file(
        &self,
        conn: &dyn DbConnection,
        key: &str,
        upload: &mut StagedFile,
    ) -> PoolResult<()> {
        if key.is_empty() {
            return Err(SchemaError::invalid_identifier("", "file key is empty").into());
        }
        let store = self.shared.file_store()?;
        let builder = SqlBuilder::new(&self.shared.structure);

        let lookup = builder.build_table_select(
            FILE_TABLE,
            &FILE_COLUMNS,
            &[
                ParamFilter::eq("id", Value::Int(self.id)),
                ParamFilter::eq("filekey", Value::Text(key.to_string())),
            ],
            &SelectSpec::new().sort(vec![SortField::asc("fileid")]),
        )?;
        let rows = conn.query(&lookup.text, &lookup.args)?;
        self.shared.stats.record_query();
        let existing = rows.first().and_then(|row| FileRecord::from_row(row));

        let blob = store.write(self.id, key, &upload.filename, upload.source.as_mut())?;
        self.shared.stats.record_file_written();

        // A replaced slot with a different filename leaves its old blob
        // at the old path; move it per policy.
        if let Some(existing) = &existing {
            if !existing.path.is_empty() && existing.path != blob.path {
                store.retire(self.id, &existing.path)?;
            }
        }

        let mut values = BTreeMap::new();
        values.insert("filekey".to_string(), SqlValue::Text(key.to_string()));
        values.insert(
            "filename".to_string(),
            SqlValue::Text(upload.filename.clone()),
        );
        values.insert("path".to_string(), SqlValue::Text(blob.path.clone()));
        values.insert("size".to_string(), SqlValue::Int(blob.size));
        values.insert(
            "extension".to_string(),
            SqlValue::Text(extension_of(&upload.filename)),
        );
        let statement = match existing {
            Some(existing) => {
                builder.build_update(FILE_TABLE, &values, "fileid", SqlValue::Int(existing.fileid))?
            }
            None => {
                values.insert("id".to_string(), SqlValue::Int(self.id));
                builder.build_insert(FILE_TABLE, &values)?
            }
        };
        conn.execute(&statement.text, &statement.args)?;
        self.shared.stats.record_execute();
        Ok(())
    }

    fn file_record(&self, key: &str) -> PoolResult<Option<FileRecord>> {
        let builder = SqlBuilder::new(&self.shared.structure);
        let query = builder.build_table_select(
            FILE_TABLE,
            &FILE_COLUMNS,
            &[
                ParamFilter::eq("id", Value::Int(self.id)),
                ParamFilter::eq("filekey", Value::Text(key.to_string())),
            ],
            &SelectSpec::new().sort(vec![SortField::asc("fileid")]),
        )?;
        let rows = self.shared.query(&query)?;
        Ok(rows.first().and_then(|row| FileRecord::from_row(row)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pooldb_schema::{Datatype, FieldDef, SchemaError, ValidationError};

    fn structure() -> PoolStructure {
        let mut s = PoolStructure::new();
        s.define(
            "articles",
            vec![
                FieldDef::new("header", Datatype::String).with_size(120),
                FieldDef::new("rating", Datatype::Number),
            ],
        )
        .unwrap();
        s
    }

    #[test]
    fn stage_normalizes_and_reads_back() {
        let s = structure();
        let mut cache = FieldCache::default();
        cache
            .stage(&s, "articles", "rating", Value::Text("42".into()))
            .unwrap();
        assert!(cache.is_dirty());
        assert_eq!(cache.cached("rating"), Some(Value::Int(42)));
        assert_eq!(
            cache.pending_stored().get("rating"),
            Some(&SqlValue::Int(42))
        );
    }

    #[test]
    fn stage_rejects_bad_value_and_stages_nothing() {
        let s = structure();
        let mut cache = FieldCache::default();
        let err = cache
            .stage(&s, "articles", "rating", Value::Text("no number".into()))
            .unwrap_err();
        assert!(matches!(
            err,
            PoolError::Validation(ValidationError::BadNumber { .. })
        ));
        assert!(!cache.is_dirty());
    }

    #[test]
    fn stage_rejects_unknown_field() {
        let s = structure();
        let mut cache = FieldCache::default();
        let err = cache
            .stage(&s, "articles", "missing", Value::Int(1))
            .unwrap_err();
        assert!(matches!(
            err,
            PoolError::Schema(SchemaError::UnknownField { .. })
        ));
    }

    #[test]
    fn identity_fields_are_silently_ignored() {
        let s = structure();
        let mut cache = FieldCache::default();
        cache.stage(&s, META_TABLE, "id", Value::Int(99)).unwrap();
        cache
            .stage(&s, META_TABLE, "pool_datatbl", Value::Text("other".into()))
            .unwrap();
        cache
            .stage(&s, META_TABLE, "pool_dataref", Value::Int(7))
            .unwrap();
        assert!(!cache.is_dirty());
    }

    #[test]
    fn pending_shadows_committed_until_merge() {
        let s = structure();
        let mut cache = FieldCache::default();
        let mut committed = BTreeMap::new();
        committed.insert("header".to_string(), Value::Text("old".into()));
        cache.prime(committed);

        cache
            .stage(&s, "articles", "header", Value::Text("new".into()))
            .unwrap();
        assert_eq!(cache.cached("header"), Some(Value::Text("new".into())));

        let snapshot = cache.snapshot();
        assert_eq!(snapshot.get("header"), Some(&Value::Text("new".into())));

        cache.merge_pending();
        assert!(!cache.is_dirty());
        assert_eq!(cache.cached("header"), Some(Value::Text("new".into())));
    }

    #[test]
    fn discard_restores_committed_view() {
        let s = structure();
        let mut cache = FieldCache::default();
        let mut committed = BTreeMap::new();
        committed.insert("header".to_string(), Value::Text("old".into()));
        cache.prime(committed);

        cache
            .stage(&s, "articles", "header", Value::Text("new".into()))
            .unwrap();
        cache.discard_pending();
        assert_eq!(cache.cached("header"), Some(Value::Text("old".into())));
    }

    #[test]
    fn merge_on_unloaded_cache_keeps_it_unloaded() {
        let s = structure();
        let mut cache = FieldCache::default();
        cache
            .stage(&s, "articles", "header", Value::Text("x".into()))
            .unwrap();
        cache.merge_pending();
        assert!(!cache.is_loaded());
        assert_eq!(cache.cached("header"), None);
    }
}

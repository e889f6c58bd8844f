//! The record store facade.
//!
//! A [`Pool`] owns the schema registry, the connection pool, the optional
//! file store and the counters, and hands out [`Entry`] handles. All
//! multi-statement operations run inside one transaction through the
//! connection pool; blob moves that must not abort a committed
//! transaction happen after it and degrade to warnings.

use crate::config::PoolConfig;
use crate::entry::Entry;
use crate::error::{PoolError, PoolResult};
use crate::files::{FileRecord, FileStore, FILE_COLUMNS};
use crate::sql::{ParamFilter, SelectSpec, SortField, SqlBuilder, SqlQuery};
use crate::stats::{PoolStats, StatsSnapshot};
use chrono::Local;
use pooldb_driver::{ConnectionPool, Connector, DbConnection, Dialect, StorageError};
use pooldb_schema::{
    deserialize_value, PoolStructure, SchemaError, SqlValue, Value, FILE_TABLE, FULLTEXT_TABLE,
    META_TABLE, SYS_TABLE,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{info, warn};

/// How much of an entry [`Pool::get_entry`] fetches eagerly.
///
/// Purely a performance hint: once a field is actually read, its value is
/// identical whichever variant fetched it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preload {
    /// Verify existence and resolve the type link only.
    Skip,
    /// Load the meta row.
    Meta,
    /// Load the meta row and the data row.
    All,
}

/// State shared by a pool and all entries it hands out.
pub(crate) struct PoolShared {
    pub(crate) structure: Arc<PoolStructure>,
    pub(crate) db: ConnectionPool,
    pub(crate) files: Option<FileStore>,
    pub(crate) config: PoolConfig,
    pub(crate) stats: PoolStats,
}

impl PoolShared {
    /// Runs a read on a checked-out connection.
    pub(crate) fn query(&self, query: &SqlQuery) -> PoolResult<Vec<Vec<SqlValue>>> {
        let conn = self.db.checkout()?;
        self.stats.record_query();
        Ok(conn.query(&query.text, &query.args)?)
    }

    /// Runs a write on a checked-out connection (autocommit).
    pub(crate) fn execute(&self, query: &SqlQuery) -> PoolResult<usize> {
        let conn = self.db.checkout()?;
        self.stats.record_execute();
        Ok(conn.execute(&query.text, &query.args)?)
    }

    /// Runs the closure inside one transaction, counting the outcome.
    pub(crate) fn with_transaction<T, F>(&self, f: F) -> PoolResult<T>
    where
        F: FnOnce(&dyn DbConnection) -> PoolResult<T>,
    {
        self.stats.record_transaction_start();
        match self.db.with_transaction(f) {
            Ok(value) => {
                self.stats.record_transaction_commit();
                Ok(value)
            }
            Err(err) => {
                self.stats.record_transaction_abort();
                Err(err)
            }
        }
    }

    /// The file store, or [`PoolError::FilesDisabled`] when the pool was
    /// opened without a file root.
    pub(crate) fn file_store(&self) -> PoolResult<&FileStore> {
        self.files.as_ref().ok_or(PoolError::FilesDisabled)
    }
}

/// Decodes one result row into field values using the registry.
///
/// Fields without a declared datatype (raw select expressions) are
/// skipped; callers read those from the raw row.
pub(crate) fn decode_row(
    structure: &PoolStructure,
    table: &str,
    fields: &[&str],
    row: &[SqlValue],
) -> BTreeMap<String, Value> {
    let mut map = BTreeMap::new();
    for (index, field) in fields.iter().enumerate() {
        let Some(value) = row.get(index) else {
            break;
        };
        let Ok(datatype) = structure.field_type(table, field) else {
            continue;
        };
        map.insert(
            (*field).to_string(),
            deserialize_value(datatype, value.clone()),
        );
    }
    map
}

/// Creates or replaces the fulltext row of an entry.
pub(crate) fn upsert_fulltext(shared: &PoolShared, id: i64, text: &str) -> PoolResult<()> {
    let builder = SqlBuilder::new(&shared.structure);
    let lookup = builder.build_table_select(
        FULLTEXT_TABLE,
        &["id"],
        &[ParamFilter::eq("id", Value::Int(id))],
        &SelectSpec::new(),
    )?;
    let exists = !shared.query(&lookup)?.is_empty();

    let mut values = BTreeMap::new();
    values.insert("text".to_string(), SqlValue::Text(text.to_string()));
    let statement = if exists {
        builder.build_update(FULLTEXT_TABLE, &values, "id", SqlValue::Int(id))?
    } else {
        values.insert("id".to_string(), SqlValue::Int(id));
        builder.build_insert(FULLTEXT_TABLE, &values)?
    };
    shared.execute(&statement)?;
    Ok(())
}

/// Reads the fulltext row of an entry.
pub(crate) fn fetch_fulltext(shared: &PoolShared, id: i64) -> PoolResult<Option<String>> {
    let builder = SqlBuilder::new(&shared.structure);
    let query = builder.build_table_select(
        FULLTEXT_TABLE,
        &["text"],
        &[ParamFilter::eq("id", Value::Int(id))],
        &SelectSpec::new(),
    )?;
    let rows = shared.query(&query)?;
    Ok(rows.into_iter().next().and_then(|row| {
        row.into_iter().next().and_then(|value| match value {
            SqlValue::Text(text) => Some(text),
            _ => None,
        })
    }))
}

/// The polymorphic record store.
///
/// Cheap to clone; clones share the registry, connections, file store and
/// counters. Every operation checks out its own connection, so handles
/// can be used from multiple threads without coordination beyond what the
/// entry cache contract requires.
#[derive(Clone)]
pub struct Pool {
    shared: Arc<PoolShared>,
}

impl Pool {
    /// Opens a pool over a connector.
    ///
    /// Verifies connectivity with one eager checkout and opens the file
    /// store when a file root is configured. The registry is fixed from
    /// here on; schema changes mean building a new structure and opening
    /// a new pool.
    ///
    /// # Errors
    ///
    /// Fails when the first connection or the file root cannot be opened.
    pub fn open(
        structure: PoolStructure,
        connector: impl Connector + 'static,
        config: PoolConfig,
    ) -> PoolResult<Self> {
        let files = match &config.file_root {
            Some(root) => Some(FileStore::open(root.clone(), config.replace_policy)?),
            None => None,
        };
        let db = ConnectionPool::new(Arc::new(connector), config.connections.clone());
        drop(db.checkout()?);
        info!(
            "pool opened: dialect={}, type tables={}, files={}",
            db.dialect().name(),
            structure.type_tables().count(),
            files.is_some()
        );
        Ok(Self {
            shared: Arc::new(PoolShared {
                structure: Arc::new(structure),
                db,
                files,
                config,
                stats: PoolStats::new(),
            }),
        })
    }

    /// The schema registry.
    #[must_use]
    pub fn structure(&self) -> &PoolStructure {
        &self.shared.structure
    }

    /// The SQL dialect of the backing store.
    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.shared.db.dialect()
    }

    /// A snapshot of the operation counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    // Entry lifecycle --------------------------------------------------

    /// Creates a new entry of the given type: one transaction inserting
    /// the data row first, then the meta row linking to it. The creation
    /// stamp and an empty title are staged on the returned handle and
    /// persist with its first commit.
    ///
    /// # Errors
    ///
    /// Fails with a schema error for unregistered types and rolls back on
    /// any write failure; a partial entry is never observable.
    pub fn create_entry(&self, type_tag: &str, user: &str) -> PoolResult<Entry> {
        self.create_inner(type_tag, user, None)
    }

    /// Creates an entry under a caller-chosen id (imports, replication).
    ///
    /// # Errors
    ///
    /// As [`Self::create_entry`]; an already-used id surfaces as the
    /// backend's constraint error.
    pub fn create_entry_with_id(&self, id: i64, type_tag: &str, user: &str) -> PoolResult<Entry> {
        self.create_inner(type_tag, user, Some(id))
    }

    fn create_inner(&self, type_tag: &str, user: &str, fixed_id: Option<i64>) -> PoolResult<Entry> {
        if !self.shared.structure.is_type_table(type_tag) {
            return Err(if self.shared.structure.has_table(type_tag) {
                SchemaError::reserved_table(type_tag)
            } else {
                SchemaError::unknown_table(type_tag)
            }
            .into());
        }
        let dialect = self.shared.db.dialect();
        let (id, data_ref) = self.shared.with_transaction(|conn| {
            let builder = SqlBuilder::new(&self.shared.structure);
            let data_ref = match fixed_id {
                Some(fixed) => {
                    let mut values = BTreeMap::new();
                    values.insert("id".to_string(), SqlValue::Int(fixed));
                    let insert = builder.build_insert(type_tag, &values)?;
                    conn.execute(&insert.text, &insert.args)?;
                    fixed
                }
                None => {
                    conn.execute(&dialect.empty_insert_sql(type_tag), &[])?;
                    conn.insert_id()?
                }
            };
            self.shared.stats.record_execute();

            let mut meta = BTreeMap::new();
            if let Some(fixed) = fixed_id {
                meta.insert("id".to_string(), SqlValue::Int(fixed));
            }
            meta.insert("pool_type".to_string(), SqlValue::Text(type_tag.to_string()));
            meta.insert(
                "pool_datatbl".to_string(),
                SqlValue::Text(type_tag.to_string()),
            );
            meta.insert("pool_dataref".to_string(), SqlValue::Int(data_ref));
            let insert = builder.build_insert(META_TABLE, &meta)?;
            conn.execute(&insert.text, &insert.args)?;
            self.shared.stats.record_execute();

            let id = match fixed_id {
                Some(fixed) => fixed,
                None => conn.insert_id()?,
            };
            Ok((id, data_ref))
        })?;
        self.shared.stats.record_entry_created();

        let entry = Entry::new(Arc::clone(&self.shared), id, type_tag.to_string(), data_ref);
        entry.set_meta(
            "pool_create",
            Value::DateTime(Local::now().naive_local()),
        )?;
        entry.set_meta("pool_createdby", Value::Text(user.to_string()))?;
        entry.set_meta("title", Value::Text(String::new()))?;
        Ok(entry)
    }

    /// Fetches an entry by id.
    ///
    /// # Errors
    ///
    /// [`PoolError::NotFound`] when no entry has the id; a storage error
    /// when the meta row exists but its data row is gone.
    pub fn get_entry(&self, id: i64, preload: Preload) -> PoolResult<Entry> {
        let (data_table, data_ref) = self.resolve_identity(id)?;
        let entry = Entry::new(Arc::clone(&self.shared), id, data_table, data_ref);
        match preload {
            Preload::Skip => {}
            Preload::Meta => {
                entry.prime_meta(self.fetch_layer(META_TABLE, id)?);
            }
            Preload::All => {
                entry.prime_meta(self.fetch_layer(META_TABLE, id)?);
                let data = self
                    .fetch_layer_opt(entry.data_table(), entry.data_ref())?
                    .ok_or_else(|| {
                        StorageError::inconsistent(format!(
                            "entry {id} has no data row in '{}'",
                            entry.data_table()
                        ))
                    })?;
                entry.prime_data(data);
            }
        }
        Ok(entry)
    }

    /// Fetches many entries with a bounded number of statements: one meta
    /// query plus, for [`Preload::All`], one data query per distinct type
    /// among the hits. Results follow the input id order; absent ids are
    /// omitted.
    ///
    /// # Errors
    ///
    /// Fails when a query fails.
    pub fn get_batch(&self, ids: &[i64], preload: Preload) -> PoolResult<Vec<Entry>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut unique = Vec::new();
        let mut seen = BTreeSet::new();
        for id in ids {
            if seen.insert(*id) {
                unique.push(Value::Int(*id));
            }
        }

        let meta_fields: Vec<&str> = self
            .shared
            .structure
            .table(META_TABLE)?
            .field_ids()
            .collect();
        let builder = SqlBuilder::new(&self.shared.structure);
        let query = builder.build_table_select(
            META_TABLE,
            &meta_fields,
            &[ParamFilter::any_of("id", unique)],
            &SelectSpec::new(),
        )?;
        let rows = self.shared.query(&query)?;

        // id -> (meta map, data table, data ref)
        let mut found = BTreeMap::new();
        for row in &rows {
            let meta = decode_row(&self.shared.structure, META_TABLE, &meta_fields, row);
            let Some(Value::Int(id)) = meta.get("id").cloned() else {
                continue;
            };
            let data_table = match meta.get("pool_datatbl") {
                Some(Value::Text(table)) => table.clone(),
                _ => continue,
            };
            let data_ref = match meta.get("pool_dataref") {
                Some(Value::Int(data_ref)) => *data_ref,
                _ => 0,
            };
            found.insert(id, (meta, data_table, data_ref));
        }

        // One data query per distinct type among the hits.
        let mut data_maps: BTreeMap<String, BTreeMap<i64, BTreeMap<String, Value>>> =
            BTreeMap::new();
        if matches!(preload, Preload::All) {
            let mut by_table: BTreeMap<String, Vec<i64>> = BTreeMap::new();
            for (_, (_, table, data_ref)) in &found {
                by_table.entry(table.clone()).or_default().push(*data_ref);
            }
            for (table, refs) in by_table {
                if !self.shared.structure.is_type_table(&table) {
                    warn!("skipping unregistered data table '{}' in batch load", table);
                    continue;
                }
                let data_fields: Vec<&str> =
                    self.shared.structure.table(&table)?.field_ids().collect();
                let values = refs.iter().map(|r| Value::Int(*r)).collect();
                let query = builder.build_table_select(
                    &table,
                    &data_fields,
                    &[ParamFilter::any_of("id", values)],
                    &SelectSpec::new(),
                )?;
                let rows = self.shared.query(&query)?;
                let mut decoded = BTreeMap::new();
                for row in &rows {
                    let map = decode_row(&self.shared.structure, &table, &data_fields, row);
                    if let Some(Value::Int(data_ref)) = map.get("id") {
                        decoded.insert(*data_ref, map);
                    }
                }
                data_maps.insert(table, decoded);
            }
        }

        let mut entries = Vec::new();
        for id in ids {
            let Some((meta, data_table, data_ref)) = found.get(id) else {
                continue;
            };
            let entry = Entry::new(
                Arc::clone(&self.shared),
                *id,
                data_table.clone(),
                *data_ref,
            );
            if !matches!(preload, Preload::Skip) {
                entry.prime_meta(meta.clone());
            }
            if matches!(preload, Preload::All) {
                if let Some(data) = data_maps
                    .get(data_table)
                    .and_then(|decoded| decoded.get(data_ref))
                {
                    entry.prime_data(data.clone());
                }
            }
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Deletes an entry: fulltext row, file rows, data row and meta row
    /// in one transaction. Blob files move per the replace policy after
    /// the transaction committed; a failed move logs a warning and does
    /// not undo the deletion.
    ///
    /// # Errors
    ///
    /// [`PoolError::NotFound`] when no entry has the id (nothing is
    /// deleted); a storage error rolls everything back.
    pub fn delete_entry(&self, id: i64, user: &str) -> PoolResult<()> {
        let (data_table, data_ref) = self.resolve_identity(id)?;
        let files = self.files_for(id)?;

        self.shared.with_transaction(|conn| {
            let builder = SqlBuilder::new(&self.shared.structure);
            let steps = [
                builder.build_delete(FULLTEXT_TABLE, "id", SqlValue::Int(id))?,
                builder.build_delete(FILE_TABLE, "id", SqlValue::Int(id))?,
                builder.build_delete(&data_table, "id", SqlValue::Int(data_ref))?,
                builder.build_delete(META_TABLE, "id", SqlValue::Int(id))?,
            ];
            for step in &steps {
                conn.execute(&step.text, &step.args)?;
                self.shared.stats.record_execute();
            }
            Ok(())
        })?;
        self.shared.stats.record_entry_deleted();

        if let Some(store) = &self.shared.files {
            for record in &files {
                if record.path.is_empty() {
                    continue;
                }
                if let Err(err) = store.retire(id, &record.path) {
                    warn!("blob move failed for entry {}: {}", id, err);
                }
            }
        }
        info!("deleted entry {} (type '{}') for {}", id, data_table, user);
        Ok(())
    }

    /// Deep-copies an entry and, depth-first, every entry contained under
    /// it, re-parented beneath the new ids. Identity fields are never
    /// copied; file blobs are copied when `with_files` is set.
    ///
    /// # Errors
    ///
    /// Fails when the source is missing or any copy step fails; the
    /// traversal is bounded like the ancestry queries.
    pub fn duplicate_entry(&self, id: i64, with_files: bool, user: &str) -> PoolResult<Entry> {
        self.duplicate_below(id, None, with_files, user, 0)
    }

    fn duplicate_below(
        &self,
        id: i64,
        new_parent: Option<i64>,
        with_files: bool,
        user: &str,
        depth: usize,
    ) -> PoolResult<Entry> {
        if depth > self.shared.config.max_tree_depth {
            return Err(StorageError::inconsistent(format!(
                "containment tree under entry {id} exceeds depth {}",
                self.shared.config.max_tree_depth
            ))
            .into());
        }
        let source = self.get_entry(id, Preload::All)?;
        let copy = self.create_entry(source.data_table(), user)?;

        let mut meta = source.meta_snapshot()?;
        for field in pooldb_schema::IDENTITY_FIELDS {
            meta.remove(field);
        }
        if let Some(parent) = new_parent {
            meta.insert("pool_unitref".to_string(), Value::Int(parent));
        }
        copy.update_meta(meta)?;

        let mut data = source.data_snapshot()?;
        data.remove("id");
        copy.update_data(data)?;
        copy.commit(user)?;

        if with_files {
            let store = self.shared.file_store()?;
            for record in source.files()? {
                let key = record.filekey.clone();
                let filename = record.filename.clone();
                let handle = store.read(record)?;
                copy.set_file(key, filename, handle);
            }
            copy.commit(user)?;
        }

        for child in self.child_ids(id)? {
            self.duplicate_below(child, Some(copy.id()), with_files, user, depth + 1)?;
        }
        Ok(copy)
    }

    // Ancestry ---------------------------------------------------------

    /// The chain of parent ids above an entry, root first, the entry
    /// itself excluded.
    ///
    /// # Errors
    ///
    /// [`PoolError::NotFound`] for an unknown id; an inconsistency error
    /// on a parent cycle or a chain deeper than the configured bound.
    pub fn parent_path(&self, id: i64) -> PoolResult<Vec<i64>> {
        if !self.is_id_used(id)? {
            return Err(PoolError::not_found(id));
        }
        let mut path = Vec::new();
        let mut seen = BTreeSet::from([id]);
        let mut current = id;
        for _ in 0..self.shared.config.max_tree_depth {
            let Some(parent) = self.parent_of(current)? else {
                path.reverse();
                return Ok(path);
            };
            if !seen.insert(parent) {
                return Err(StorageError::inconsistent(format!(
                    "parent cycle at entry {parent}"
                ))
                .into());
            }
            path.push(parent);
            current = parent;
        }
        Err(StorageError::inconsistent(format!(
            "parent chain of entry {id} exceeds depth {}",
            self.shared.config.max_tree_depth
        ))
        .into())
    }

    /// Like [`Self::parent_path`], with each ancestor's title.
    ///
    /// # Errors
    ///
    /// As [`Self::parent_path`].
    pub fn parent_titles(&self, id: i64) -> PoolResult<Vec<(i64, String)>> {
        let path = self.parent_path(id)?;
        if path.is_empty() {
            return Ok(Vec::new());
        }
        let builder = SqlBuilder::new(&self.shared.structure);
        let values = path.iter().map(|p| Value::Int(*p)).collect();
        let query = builder.build_table_select(
            META_TABLE,
            &["id", "title"],
            &[ParamFilter::any_of("id", values)],
            &SelectSpec::new(),
        )?;
        let rows = self.shared.query(&query)?;
        let mut titles = BTreeMap::new();
        for row in rows {
            if let (Some(SqlValue::Int(row_id)), Some(SqlValue::Text(title))) =
                (row.first(), row.get(1))
            {
                titles.insert(*row_id, title.clone());
            }
        }
        Ok(path
            .into_iter()
            .map(|p| {
                let title = titles.get(&p).cloned().unwrap_or_default();
                (p, title)
            })
            .collect())
    }

    /// Every id contained under a base entry, via iterative frontier
    /// expansion over the parent pointer, breadth-first.
    ///
    /// # Errors
    ///
    /// [`PoolError::NotFound`] for an unknown base; an inconsistency
    /// error on a cycle or a tree deeper than the configured bound.
    pub fn contained_ids(&self, base: i64) -> PoolResult<Vec<i64>> {
        if !self.is_id_used(base)? {
            return Err(PoolError::not_found(base));
        }
        let builder = SqlBuilder::new(&self.shared.structure);
        let mut seen = BTreeSet::from([base]);
        let mut result = Vec::new();
        let mut frontier = vec![base];
        for _ in 0..self.shared.config.max_tree_depth {
            let values = frontier.iter().map(|id| Value::Int(*id)).collect();
            let query = builder.build_table_select(
                META_TABLE,
                &["id"],
                &[ParamFilter::any_of("pool_unitref", values)],
                &SelectSpec::new().sort(vec![SortField::asc("id")]),
            )?;
            let rows = self.shared.query(&query)?;
            let mut next = Vec::new();
            for row in rows {
                let Some(SqlValue::Int(child)) = row.first() else {
                    continue;
                };
                if !seen.insert(*child) {
                    return Err(StorageError::inconsistent(format!(
                        "containment cycle at entry {child}"
                    ))
                    .into());
                }
                result.push(*child);
                next.push(*child);
            }
            if next.is_empty() {
                return Ok(result);
            }
            frontier = next;
        }
        Err(StorageError::inconsistent(format!(
            "containment tree under entry {base} exceeds depth {}",
            self.shared.config.max_tree_depth
        ))
        .into())
    }

    /// Whether an entry with this id exists.
    ///
    /// # Errors
    ///
    /// Fails when the lookup fails.
    pub fn is_id_used(&self, id: i64) -> PoolResult<bool> {
        let builder = SqlBuilder::new(&self.shared.structure);
        let query = builder.build_table_select(
            META_TABLE,
            &["id"],
            &[ParamFilter::eq("id", Value::Int(id))],
            &SelectSpec::new(),
        )?;
        Ok(!self.shared.query(&query)?.is_empty())
    }

    /// Counts entries, optionally restricted to one type.
    ///
    /// # Errors
    ///
    /// Fails when the query fails.
    pub fn count_entries(&self, type_tag: Option<&str>) -> PoolResult<u64> {
        let builder = SqlBuilder::new(&self.shared.structure);
        let filters = match type_tag {
            Some(tag) => vec![ParamFilter::eq("pool_type", Value::Text(tag.to_string()))],
            None => Vec::new(),
        };
        let query =
            builder.build_table_select(META_TABLE, &["-COUNT(*)"], &filters, &SelectSpec::new())?;
        let rows = self.shared.query(&query)?;
        let count = rows
            .first()
            .and_then(|row| row.first())
            .and_then(|value| value.as_int())
            .unwrap_or(0);
        Ok(count.max(0) as u64)
    }

    // Raw selects ------------------------------------------------------

    /// Runs a joined select over the meta table and an optional data
    /// table; see the query builder for field resolution rules.
    ///
    /// # Errors
    ///
    /// Fails when the query cannot be built or fails to run.
    pub fn select(
        &self,
        fields: &[&str],
        filters: &[ParamFilter],
        spec: &SelectSpec,
        data_table: Option<&str>,
    ) -> PoolResult<Vec<Vec<SqlValue>>> {
        let builder = SqlBuilder::new(&self.shared.structure);
        let query = builder.build_select(fields, filters, spec, data_table)?;
        self.shared.query(&query)
    }

    /// Runs a single-table select without the meta join.
    ///
    /// # Errors
    ///
    /// As [`Self::select`].
    pub fn select_table(
        &self,
        table: &str,
        fields: &[&str],
        filters: &[ParamFilter],
        spec: &SelectSpec,
    ) -> PoolResult<Vec<Vec<SqlValue>>> {
        let builder = SqlBuilder::new(&self.shared.structure);
        let query = builder.build_table_select(table, fields, filters, spec)?;
        self.shared.query(&query)
    }

    /// Runs a joined select restricted by a fulltext phrase.
    ///
    /// # Errors
    ///
    /// As [`Self::select`].
    pub fn fulltext_search(
        &self,
        phrase: &str,
        fields: &[&str],
        filters: &[ParamFilter],
        spec: &SelectSpec,
        data_table: Option<&str>,
    ) -> PoolResult<Vec<Vec<SqlValue>>> {
        let builder = SqlBuilder::new(&self.shared.structure);
        let query = builder.build_fulltext(phrase, fields, filters, spec, data_table)?;
        self.shared.query(&query)
    }

    // Fulltext rows ----------------------------------------------------

    /// Creates or replaces the fulltext body of an entry.
    ///
    /// # Errors
    ///
    /// Fails when a statement fails.
    pub fn update_fulltext(&self, id: i64, text: &str) -> PoolResult<()> {
        upsert_fulltext(&self.shared, id, text)
    }

    /// Reads the fulltext body of an entry.
    ///
    /// # Errors
    ///
    /// Fails when the lookup fails.
    pub fn get_fulltext(&self, id: i64) -> PoolResult<Option<String>> {
        fetch_fulltext(&self.shared, id)
    }

    /// Removes the fulltext body of an entry, if any.
    ///
    /// # Errors
    ///
    /// Fails when the statement fails.
    pub fn delete_fulltext(&self, id: i64) -> PoolResult<()> {
        let builder = SqlBuilder::new(&self.shared.structure);
        let delete = builder.build_delete(FULLTEXT_TABLE, "id", SqlValue::Int(id))?;
        self.shared.execute(&delete)?;
        Ok(())
    }

    // Sys table --------------------------------------------------------

    /// Reads a system value by key.
    ///
    /// # Errors
    ///
    /// Fails when the lookup fails.
    pub fn load_sys_value(&self, key: &str) -> PoolResult<Option<String>> {
        let builder = SqlBuilder::new(&self.shared.structure);
        let query = builder.build_table_select(
            SYS_TABLE,
            &["value"],
            &[ParamFilter::eq("id", Value::Text(key.to_string()))],
            &SelectSpec::new(),
        )?;
        let rows = self.shared.query(&query)?;
        Ok(rows.into_iter().next().and_then(|row| {
            row.into_iter().next().and_then(|value| match value {
                SqlValue::Text(text) => Some(text),
                _ => None,
            })
        }))
    }

    /// Creates or replaces a system value, stamping its timestamp.
    ///
    /// # Errors
    ///
    /// Fails when a statement fails.
    pub fn store_sys_value(&self, key: &str, value: &str) -> PoolResult<()> {
        let builder = SqlBuilder::new(&self.shared.structure);
        let lookup = builder.build_table_select(
            SYS_TABLE,
            &["id"],
            &[ParamFilter::eq("id", Value::Text(key.to_string()))],
            &SelectSpec::new(),
        )?;
        let exists = !self.shared.query(&lookup)?.is_empty();

        let mut values = BTreeMap::new();
        values.insert("value".to_string(), SqlValue::Text(value.to_string()));
        values.insert(
            "ts".to_string(),
            SqlValue::Text(
                Local::now()
                    .naive_local()
                    .format(pooldb_schema::DATETIME_FORMAT)
                    .to_string(),
            ),
        );
        let statement = if exists {
            builder.build_update(SYS_TABLE, &values, "id", SqlValue::Text(key.to_string()))?
        } else {
            values.insert("id".to_string(), SqlValue::Text(key.to_string()));
            builder.build_insert(SYS_TABLE, &values)?
        };
        self.shared.execute(&statement)?;
        Ok(())
    }

    /// Removes a system value, if present.
    ///
    /// # Errors
    ///
    /// Fails when the statement fails.
    pub fn delete_sys_value(&self, key: &str) -> PoolResult<()> {
        let builder = SqlBuilder::new(&self.shared.structure);
        let delete = builder.build_delete(SYS_TABLE, "id", SqlValue::Text(key.to_string()))?;
        self.shared.execute(&delete)?;
        Ok(())
    }

    // File metadata ----------------------------------------------------

    /// All file rows of an entry, ordered by file id.
    ///
    /// # Errors
    ///
    /// Fails when the lookup fails.
    pub fn files_for(&self, id: i64) -> PoolResult<Vec<FileRecord>> {
        let builder = SqlBuilder::new(&self.shared.structure);
        let query = builder.build_table_select(
            FILE_TABLE,
            &FILE_COLUMNS,
            &[ParamFilter::eq("id", Value::Int(id))],
            &SelectSpec::new().sort(vec![SortField::asc("fileid")]),
        )?;
        let rows = self.shared.query(&query)?;
        Ok(rows.iter().filter_map(|r| FileRecord::from_row(r)).collect())
    }

    /// Finds file rows whose filename matches a contains pattern.
    ///
    /// # Errors
    ///
    /// Fails when the lookup fails.
    pub fn search_filename(&self, pattern: &str) -> PoolResult<Vec<FileRecord>> {
        let builder = SqlBuilder::new(&self.shared.structure);
        let query = builder.build_table_select(
            FILE_TABLE,
            &FILE_COLUMNS,
            &[ParamFilter::like("filename", pattern)],
            &SelectSpec::new().sort(vec![SortField::asc("fileid")]),
        )?;
        let rows = self.shared.query(&query)?;
        Ok(rows.iter().filter_map(|r| FileRecord::from_row(r)).collect())
    }

    // Internal ---------------------------------------------------------

    /// Resolves an entry's type link, or `NotFound`.
    fn resolve_identity(&self, id: i64) -> PoolResult<(String, i64)> {
        let builder = SqlBuilder::new(&self.shared.structure);
        let query = builder.build_table_select(
            META_TABLE,
            &["pool_datatbl", "pool_dataref"],
            &[ParamFilter::eq("id", Value::Int(id))],
            &SelectSpec::new(),
        )?;
        let rows = self.shared.query(&query)?;
        let Some(row) = rows.into_iter().next() else {
            return Err(PoolError::not_found(id));
        };
        let data_table = match row.first() {
            Some(SqlValue::Text(table)) if !table.is_empty() => table.clone(),
            _ => {
                return Err(StorageError::inconsistent(format!(
                    "entry {id} has no data table link"
                ))
                .into())
            }
        };
        let data_ref = row.get(1).and_then(|v| v.as_int()).unwrap_or(0);
        Ok((data_table, data_ref))
    }

    /// Loads one full row of a layer table keyed by id, decoded.
    fn fetch_layer(&self, table: &str, key: i64) -> PoolResult<BTreeMap<String, Value>> {
        self.fetch_layer_opt(table, key)?
            .ok_or_else(|| PoolError::not_found(key))
    }

    fn fetch_layer_opt(&self, table: &str, key: i64) -> PoolResult<Option<BTreeMap<String, Value>>> {
        let fields: Vec<&str> = self.shared.structure.table(table)?.field_ids().collect();
        let builder = SqlBuilder::new(&self.shared.structure);
        let query = builder.build_table_select(
            table,
            &fields,
            &[ParamFilter::eq("id", Value::Int(key))],
            &SelectSpec::new(),
        )?;
        let rows = self.shared.query(&query)?;
        Ok(rows
            .into_iter()
            .next()
            .map(|row| decode_row(&self.shared.structure, table, &fields, &row)))
    }

    fn parent_of(&self, id: i64) -> PoolResult<Option<i64>> {
        let builder = SqlBuilder::new(&self.shared.structure);
        let query = builder.build_table_select(
            META_TABLE,
            &["pool_unitref"],
            &[ParamFilter::eq("id", Value::Int(id))],
            &SelectSpec::new(),
        )?;
        let rows = self.shared.query(&query)?;
        let parent = rows
            .first()
            .and_then(|row| row.first())
            .and_then(|value| value.as_int())
            .unwrap_or(0);
        Ok(if parent > 0 { Some(parent) } else { None })
    }

    fn child_ids(&self, id: i64) -> PoolResult<Vec<i64>> {
        let builder = SqlBuilder::new(&self.shared.structure);
        let query = builder.build_table_select(
            META_TABLE,
            &["id"],
            &[ParamFilter::eq("pool_unitref", Value::Int(id))],
            &SelectSpec::new().sort(vec![SortField::asc("id")]),
        )?;
        let rows = self.shared.query(&query)?;
        Ok(rows
            .iter()
            .filter_map(|row| row.first().and_then(|v| v.as_int()))
            .collect())
    }
}

//! Physical schema deployment.
//!
//! The registry declares tables; this module makes the database match it.
//! [`Migrator::diff`] introspects the physical schema through the dialect's
//! catalog queries and reports what is missing; [`Migrator::apply`] runs
//! the statements to close the gap, one transaction per table.
//!
//! The differ is additive only. Missing tables are created, missing
//! columns are added, and nothing is ever dropped or rewritten on its own:
//! a column type change must be requested explicitly per column and runs
//! only where the dialect can express it (SQLite cannot; the request is
//! reported as skipped, not failed). Surplus physical tables and columns
//! are left alone.

use crate::error::PoolResult;
use pooldb_driver::{DbConnection, Dialect};
use pooldb_schema::{PoolStructure, SqlValue};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// One schema change the differ found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationStep {
    /// The declared table has no physical counterpart.
    CreateTable {
        /// Table to create.
        table: String,
    },
    /// The physical table lacks a declared column.
    AddColumn {
        /// Table to alter.
        table: String,
        /// Column to add.
        field: String,
    },
    /// A requested column rewrite; see [`Migrator::modify_column`].
    ModifyColumn {
        /// Table to alter.
        table: String,
        /// Column to rewrite.
        field: String,
    },
}

impl MigrationStep {
    /// The table this step touches.
    #[must_use]
    pub fn table(&self) -> &str {
        match self {
            Self::CreateTable { table }
            | Self::AddColumn { table, .. }
            | Self::ModifyColumn { table, .. } => table,
        }
    }
}

/// What happened to one table during [`Migrator::apply`].
#[derive(Debug, Clone)]
pub struct TableReport {
    /// The table name.
    pub table: String,
    /// Statements applied and committed.
    pub statements: Vec<String>,
    /// Requested changes the dialect cannot express.
    pub skipped: Vec<String>,
    /// The failure that rolled this table back, if any.
    pub error: Option<String>,
}

/// Aggregated outcome of an [`Migrator::apply`] run.
#[derive(Debug, Clone, Default)]
pub struct MigrationReport {
    /// Per-table outcomes, in the order they were attempted.
    pub tables: Vec<TableReport>,
    /// Statements applied and committed across all tables.
    pub applied_count: usize,
    /// Requested changes skipped as inexpressible.
    pub skipped_count: usize,
    /// Tables whose transaction rolled back. The run stops at the first.
    pub failed_count: usize,
}

impl MigrationReport {
    /// Whether every attempted table committed.
    #[must_use]
    pub fn ok(&self) -> bool {
        self.failed_count == 0
    }
}

/// Diffs a declared [`PoolStructure`] against a physical database and
/// applies the additive statements needed to close the gap. System tables
/// deploy through the same path as type tables.
pub struct Migrator<'a> {
    structure: &'a PoolStructure,
    modify: Vec<(String, String)>,
}

impl<'a> Migrator<'a> {
    /// Creates a migrator for a registry.
    #[must_use]
    pub fn new(structure: &'a PoolStructure) -> Self {
        Self {
            structure,
            modify: Vec::new(),
        }
    }

    /// Requests a column type rewrite for one declared field.
    ///
    /// Rewrites never happen implicitly. The request is honored only when
    /// the column physically exists (a missing column is added instead)
    /// and the dialect supports `MODIFY COLUMN`; otherwise it lands in the
    /// report's skipped list.
    #[must_use]
    pub fn modify_column(mut self, table: impl Into<String>, field: impl Into<String>) -> Self {
        self.modify.push((table.into(), field.into()));
        self
    }

    /// Computes the steps that would bring the database in line with the
    /// registry, grouped by table in name order. An empty result means the
    /// schemas already match.
    ///
    /// # Errors
    ///
    /// Fails when a catalog query fails or a modify request names an
    /// undeclared table or field.
    pub fn diff(&self, conn: &dyn DbConnection) -> PoolResult<Vec<MigrationStep>> {
        for (table, field) in &self.modify {
            self.structure.field(table, field)?;
        }

        let dialect = conn.dialect();
        let mut physical = BTreeSet::new();
        for row in conn.query(dialect.list_tables_sql(), &[])? {
            if let Some(SqlValue::Text(name)) = row.into_iter().next() {
                physical.insert(name);
            }
        }

        let mut steps = Vec::new();
        for table in self.structure.tables() {
            if !physical.contains(table.name()) {
                steps.push(MigrationStep::CreateTable {
                    table: table.name().to_string(),
                });
                continue;
            }
            let columns = existing_columns(conn, dialect, table.name())?;
            for field in table.fields() {
                if !columns.contains(&field.id) {
                    steps.push(MigrationStep::AddColumn {
                        table: table.name().to_string(),
                        field: field.id.clone(),
                    });
                }
            }
            for (m_table, m_field) in &self.modify {
                if m_table == table.name() && columns.contains(m_field) {
                    steps.push(MigrationStep::ModifyColumn {
                        table: m_table.clone(),
                        field: m_field.clone(),
                    });
                }
            }
        }
        Ok(steps)
    }

    /// Applies the diff, one transaction per table, stopping at the first
    /// table whose transaction fails. Statement failures are recorded in
    /// the report rather than returned; a failed table leaves no partial
    /// changes behind.
    ///
    /// # Errors
    ///
    /// Fails only when the diff itself cannot be computed.
    pub fn apply(&self, conn: &dyn DbConnection) -> PoolResult<MigrationReport> {
        let steps = self.diff(conn)?;
        let mut report = MigrationReport::default();
        if steps.is_empty() {
            debug!("schema already in sync");
            return Ok(report);
        }

        let dialect = conn.dialect();
        let mut index = 0;
        while index < steps.len() {
            let table = steps[index].table().to_string();
            let mut end = index;
            while end < steps.len() && steps[end].table() == table {
                end += 1;
            }
            let group = &steps[index..end];
            index = end;

            let mut entry = TableReport {
                table: table.clone(),
                statements: Vec::new(),
                skipped: Vec::new(),
                error: None,
            };
            let outcome = self.apply_group(conn, dialect, group, &mut entry);
            report.skipped_count += entry.skipped.len();
            match outcome {
                Ok(()) => {
                    report.applied_count += entry.statements.len();
                    report.tables.push(entry);
                }
                Err(err) => {
                    // rolled back, so nothing in this group persisted
                    entry.statements.clear();
                    entry.error = Some(err.to_string());
                    report.failed_count += 1;
                    report.tables.push(entry);
                    warn!("schema update of '{}' failed: {}", table, err);
                    break;
                }
            }
        }

        info!(
            "schema update: {} applied, {} skipped, {} failed",
            report.applied_count, report.skipped_count, report.failed_count
        );
        Ok(report)
    }

    fn apply_group(
        &self,
        conn: &dyn DbConnection,
        dialect: Dialect,
        group: &[MigrationStep],
        entry: &mut TableReport,
    ) -> PoolResult<()> {
        // Render everything up front; registry lookups must not fail
        // inside the open transaction.
        let mut statements = Vec::new();
        for step in group {
            match step {
                MigrationStep::CreateTable { table } => {
                    statements.push(dialect.create_table_sql(self.structure.table(table)?));
                }
                MigrationStep::AddColumn { table, field } => {
                    statements
                        .push(dialect.add_column_sql(table, self.structure.field(table, field)?));
                }
                MigrationStep::ModifyColumn { table, field } => {
                    match dialect.modify_column_sql(table, self.structure.field(table, field)?) {
                        Some(sql) => statements.push(sql),
                        None => entry.skipped.push(format!(
                            "{table}.{field}: column rewrite not available in {}",
                            dialect.name()
                        )),
                    }
                }
            }
        }
        if statements.is_empty() {
            return Ok(());
        }

        conn.begin()?;
        for sql in statements {
            if let Err(err) = conn.execute(&sql, &[]) {
                let _ = conn.rollback();
                return Err(err.into());
            }
            debug!("applied: {}", sql);
            entry.statements.push(sql);
        }
        if let Err(err) = conn.commit() {
            let _ = conn.rollback();
            return Err(err.into());
        }
        Ok(())
    }
}

fn existing_columns(
    conn: &dyn DbConnection,
    dialect: Dialect,
    table: &str,
) -> PoolResult<BTreeSet<String>> {
    let index = dialect.column_name_index();
    let mut columns = BTreeSet::new();
    for row in conn.query(&dialect.list_columns_sql(table), &[])? {
        if let Some(SqlValue::Text(name)) = row.into_iter().nth(index) {
            columns.insert(name);
        }
    }
    Ok(columns)
}

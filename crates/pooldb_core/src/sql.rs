//! SQL builder for record store queries.
//!
//! Every builder produces a [`SqlQuery`]: statement text with positional
//! `?` placeholders plus the argument list in placeholder order. Values
//! never enter the text; the two documented escape hatches
//! ([`SelectSpec::condition`] and [`SelectSpec::custom_join`]) splice
//! caller text verbatim and are for trusted input only.
//!
//! Joined selects read from `pool_meta AS meta__`, optionally joined to
//! one data table `AS data__`. A bare field name resolves against the
//! meta table first, then the data table; a `-` prefix bypasses
//! resolution and is rendered verbatim (aggregates, counted columns).
//!
//! The output is dialect-neutral: both supported dialects accept the same
//! placeholder and `LIMIT n OFFSET s` syntax, so one build serves either.

use crate::error::PoolResult;
use pooldb_schema::{
    serialize_value, Datatype, PoolStructure, SchemaError, SqlValue, Value, DATETIME_FORMAT,
    DATE_FORMAT, FULLTEXT_TABLE, META_TABLE,
};
use std::collections::BTreeMap;

/// Comparison operators available to parameter filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `LIKE` with contains semantics: `*` maps to `%`, a pattern without
    /// any wildcard is wrapped in `%`.
    Like,
    /// Inclusive range test over a low/high pair.
    Between,
    /// Membership in a sequence. An empty sequence drops the condition; a
    /// one-element sequence degenerates to `=`.
    In,
    /// Negated membership. Empty drops the condition; one element
    /// degenerates to `!=`.
    NotIn,
}

impl Operator {
    const fn sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Like => "LIKE",
            Self::Between => "BETWEEN",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
        }
    }
}

/// How multiple filter conditions combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Combine {
    /// All conditions must hold.
    #[default]
    And,
    /// Any condition may hold.
    Or,
    /// None of the conditions may hold: renders `NOT (c1 AND c2 ...)`.
    Not,
}

/// Join used to attach the data table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinType {
    /// Rows must have a matching data row.
    #[default]
    Inner,
    /// Meta rows survive without a matching data row.
    Left,
}

/// Value side of a filter, shaped by the operator.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// One value, for the scalar operators and `LIKE`.
    Scalar(Value),
    /// Low/high pair for `BETWEEN`.
    Range(Value, Value),
    /// Sequence for `IN` / `NOT IN`.
    Set(Vec<Value>),
}

/// One condition over a declared or raw field.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamFilter {
    /// Field name, resolved like select fields (`-` prefix = raw).
    pub field: String,
    /// The comparison operator.
    pub operator: Operator,
    /// The value(s) to compare against.
    pub value: FilterValue,
}

impl ParamFilter {
    /// Creates a filter from its parts.
    pub fn new(field: impl Into<String>, operator: Operator, value: FilterValue) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    /// Equality filter.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::Eq, FilterValue::Scalar(value.into()))
    }

    /// Inequality filter.
    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::Ne, FilterValue::Scalar(value.into()))
    }

    /// Less-than filter.
    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::Lt, FilterValue::Scalar(value.into()))
    }

    /// Less-or-equal filter.
    pub fn le(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::Le, FilterValue::Scalar(value.into()))
    }

    /// Greater-than filter.
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::Gt, FilterValue::Scalar(value.into()))
    }

    /// Greater-or-equal filter.
    pub fn ge(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::Ge, FilterValue::Scalar(value.into()))
    }

    /// Contains filter (`LIKE`).
    pub fn like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(
            field,
            Operator::Like,
            FilterValue::Scalar(Value::Text(pattern.into())),
        )
    }

    /// Inclusive range filter (`BETWEEN`).
    pub fn between(
        field: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        Self::new(
            field,
            Operator::Between,
            FilterValue::Range(low.into(), high.into()),
        )
    }

    /// Membership filter (`IN`).
    pub fn any_of(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::new(field, Operator::In, FilterValue::Set(values))
    }

    /// Negated membership filter (`NOT IN`).
    pub fn none_of(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::new(field, Operator::NotIn, FilterValue::Set(values))
    }
}

/// Sort key with per-field direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortField {
    /// Field name, resolved like select fields.
    pub field: String,
    /// Sort this key descending.
    pub descending: bool,
}

impl SortField {
    /// Ascending sort key.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
        }
    }

    /// Descending sort key.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: true,
        }
    }
}

/// Options shaping a select beyond its filters.
#[derive(Debug, Clone, Default)]
pub struct SelectSpec {
    /// How filter conditions combine.
    pub combine: Combine,
    /// How the data table is joined.
    pub join: JoinType,
    /// Sort keys, applied in order.
    pub sort: Vec<SortField>,
    /// `LIMIT`: maximum number of rows. `None` returns everything (and
    /// disables `start`).
    pub max: Option<u64>,
    /// `OFFSET`: rows skipped before the first result.
    pub start: Option<u64>,
    /// `GROUP BY` field, resolved like select fields.
    pub group_by: Option<String>,
    /// Trusted literal condition, attached to the other conditions with
    /// the combinator (`AND` when the combinator is `Not`).
    pub condition: Option<String>,
    /// Trusted literal join fragment, appended after the standard joins.
    pub custom_join: Option<String>,
}

impl SelectSpec {
    /// Creates an empty spec (AND combine, inner join, no options).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the condition combinator.
    #[must_use]
    pub const fn combine(mut self, value: Combine) -> Self {
        self.combine = value;
        self
    }

    /// Sets the data table join type.
    #[must_use]
    pub const fn join(mut self, value: JoinType) -> Self {
        self.join = value;
        self
    }

    /// Sets the sort keys.
    #[must_use]
    pub fn sort(mut self, value: Vec<SortField>) -> Self {
        self.sort = value;
        self
    }

    /// Sets the maximum number of rows.
    #[must_use]
    pub const fn max(mut self, value: u64) -> Self {
        self.max = Some(value);
        self
    }

    /// Sets the number of rows skipped before the first result.
    #[must_use]
    pub const fn start(mut self, value: u64) -> Self {
        self.start = Some(value);
        self
    }

    /// Sets the `GROUP BY` field.
    #[must_use]
    pub fn group_by(mut self, value: impl Into<String>) -> Self {
        self.group_by = Some(value.into());
        self
    }

    /// Sets the trusted literal condition.
    #[must_use]
    pub fn condition(mut self, value: impl Into<String>) -> Self {
        self.condition = Some(value.into());
        self
    }

    /// Sets the trusted literal join fragment.
    #[must_use]
    pub fn custom_join(mut self, value: impl Into<String>) -> Self {
        self.custom_join = Some(value.into());
        self
    }
}

/// A rendered statement with its ordered arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    /// Statement text with positional `?` placeholders.
    pub text: String,
    /// Arguments in placeholder order.
    pub args: Vec<SqlValue>,
}

/// Builds statements against a schema registry.
///
/// Pure and deterministic: the same inputs always render byte-identical
/// text and the same argument order.
pub struct SqlBuilder<'a> {
    structure: &'a PoolStructure,
}

impl<'a> SqlBuilder<'a> {
    /// Creates a builder over the registry.
    #[must_use]
    pub fn new(structure: &'a PoolStructure) -> Self {
        Self { structure }
    }

    /// Builds a joined select over the meta table and an optional data
    /// table.
    ///
    /// # Errors
    ///
    /// Fails when a field resolves to neither table, the data table is
    /// not a registered type table, or a filter value does not fit its
    /// operator or field datatype.
    pub fn build_select(
        &self,
        fields: &[&str],
        filters: &[ParamFilter],
        spec: &SelectSpec,
        data_table: Option<&str>,
    ) -> PoolResult<SqlQuery> {
        self.build_joined(None, fields, filters, spec, data_table)
    }

    /// Builds a fulltext select: the joined select plus a `LEFT JOIN` on
    /// the fulltext table and a phrase predicate ANDed in front of the
    /// other conditions. An empty phrase adds no predicate.
    ///
    /// # Errors
    ///
    /// As [`Self::build_select`].
    pub fn build_fulltext(
        &self,
        phrase: &str,
        fields: &[&str],
        filters: &[ParamFilter],
        spec: &SelectSpec,
        data_table: Option<&str>,
    ) -> PoolResult<SqlQuery> {
        self.build_joined(Some(phrase), fields, filters, spec, data_table)
    }

    /// Builds a plain select over one registered table without the meta
    /// join. Fields resolve against that table only (`-` raw fields
    /// excepted); `join` is ignored.
    ///
    /// # Errors
    ///
    /// Fails when the table is unknown or a field does not belong to it.
    pub fn build_table_select(
        &self,
        table: &str,
        fields: &[&str],
        filters: &[ParamFilter],
        spec: &SelectSpec,
    ) -> PoolResult<SqlQuery> {
        self.structure.table(table)?;
        if fields.is_empty() {
            return Err(SchemaError::invalid_identifier("", "select list is empty").into());
        }

        let mut select = Vec::with_capacity(fields.len());
        for field in fields {
            let (name, _) = self.resolve_single(table, field)?;
            select.push(name);
        }

        let mut text = format!("SELECT {} FROM {}", select.join(", "), table);
        let mut args = Vec::new();
        if let Some(custom) = nonempty(spec.custom_join.as_deref()) {
            text.push(' ');
            text.push_str(custom);
        }

        let (conds, mut where_args) =
            self.render_filters(filters, |f| self.resolve_single(table, f))?;
        let group = assemble_where(&conds, spec.combine, nonempty(spec.condition.as_deref()));
        if !group.is_empty() {
            text.push_str(" WHERE ");
            text.push_str(&group);
            args.append(&mut where_args);
        }

        if let Some(group_by) = nonempty(spec.group_by.as_deref()) {
            let (name, _) = self.resolve_single(table, group_by)?;
            text.push_str(" GROUP BY ");
            text.push_str(&name);
        }
        self.push_sort(&mut text, &spec.sort, |f| self.resolve_single(table, f))?;
        push_limit(&mut text, spec);

        Ok(SqlQuery { text, args })
    }

    /// Builds `INSERT INTO table (..) VALUES (..)` from a column map.
    ///
    /// # Errors
    ///
    /// Fails when the table or a column is not declared, or the map is
    /// empty.
    pub fn build_insert(
        &self,
        table: &str,
        values: &BTreeMap<String, SqlValue>,
    ) -> PoolResult<SqlQuery> {
        self.structure.table(table)?;
        if values.is_empty() {
            return Err(SchemaError::empty_write(table).into());
        }
        let mut cols = Vec::with_capacity(values.len());
        let mut args = Vec::with_capacity(values.len());
        for (col, value) in values {
            if !self.structure.has_field(table, col) {
                return Err(SchemaError::unknown_field(table, col).into());
            }
            cols.push(col.as_str());
            args.push(value.clone());
        }
        let placeholders = vec!["?"; cols.len()].join(", ");
        let text = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            cols.join(", "),
            placeholders
        );
        Ok(SqlQuery { text, args })
    }

    /// Builds `UPDATE table SET .. WHERE key_field = ?`.
    ///
    /// # Errors
    ///
    /// Fails when the table, a column, or the key field is not declared,
    /// or the map is empty.
    pub fn build_update(
        &self,
        table: &str,
        values: &BTreeMap<String, SqlValue>,
        key_field: &str,
        key: SqlValue,
    ) -> PoolResult<SqlQuery> {
        self.structure.table(table)?;
        self.structure.field(table, key_field)?;
        if values.is_empty() {
            return Err(SchemaError::empty_write(table).into());
        }
        let mut sets = Vec::with_capacity(values.len());
        let mut args = Vec::with_capacity(values.len() + 1);
        for (col, value) in values {
            if !self.structure.has_field(table, col) {
                return Err(SchemaError::unknown_field(table, col).into());
            }
            sets.push(format!("{col} = ?"));
            args.push(value.clone());
        }
        args.push(key);
        let text = format!(
            "UPDATE {} SET {} WHERE {} = ?",
            table,
            sets.join(", "),
            key_field
        );
        Ok(SqlQuery { text, args })
    }

    /// Builds `DELETE FROM table WHERE key_field = ?`.
    ///
    /// # Errors
    ///
    /// Fails when the table or key field is not declared.
    pub fn build_delete(&self, table: &str, key_field: &str, key: SqlValue) -> PoolResult<SqlQuery> {
        self.structure.field(table, key_field)?;
        Ok(SqlQuery {
            text: format!("DELETE FROM {table} WHERE {key_field} = ?"),
            args: vec![key],
        })
    }

    fn build_joined(
        &self,
        fulltext: Option<&str>,
        fields: &[&str],
        filters: &[ParamFilter],
        spec: &SelectSpec,
        data_table: Option<&str>,
    ) -> PoolResult<SqlQuery> {
        if fields.is_empty() {
            return Err(SchemaError::invalid_identifier("", "select list is empty").into());
        }
        if let Some(table) = data_table {
            if !self.structure.is_type_table(table) {
                if self.structure.has_table(table) {
                    return Err(SchemaError::reserved_table(table).into());
                }
                return Err(SchemaError::unknown_table(table).into());
            }
        }

        let mut select = Vec::with_capacity(fields.len());
        for field in fields {
            let (name, _) = self.resolve_joined(field, data_table)?;
            select.push(name);
        }

        let mut text = format!("SELECT {} FROM {META_TABLE} AS meta__", select.join(", "));
        let mut args = Vec::new();

        if fulltext.is_some() {
            text.push_str(&format!(
                " LEFT JOIN {FULLTEXT_TABLE} ON ({FULLTEXT_TABLE}.id = meta__.id)"
            ));
        }
        if let Some(table) = data_table {
            let join = match spec.join {
                JoinType::Inner => "INNER",
                JoinType::Left => "LEFT",
            };
            // The type constraint lives in the ON clause so a LEFT join
            // keeps its outer semantics.
            text.push_str(&format!(
                " {join} JOIN {table} AS data__ ON (meta__.pool_dataref = data__.id \
                 AND meta__.pool_datatbl = ?)"
            ));
            args.push(SqlValue::Text(table.to_string()));
        }
        if let Some(custom) = nonempty(spec.custom_join.as_deref()) {
            text.push(' ');
            text.push_str(custom);
        }

        let phrase_arg = fulltext.and_then(|p| like_pattern(p));
        let (conds, mut where_args) =
            self.render_filters(filters, |f| self.resolve_joined(f, data_table))?;
        let group = assemble_where(&conds, spec.combine, nonempty(spec.condition.as_deref()));

        match (phrase_arg, group.is_empty()) {
            (Some(pattern), true) => {
                text.push_str(&format!(" WHERE {FULLTEXT_TABLE}.text LIKE ?"));
                args.push(SqlValue::Text(pattern));
            }
            (Some(pattern), false) => {
                text.push_str(&format!(" WHERE {FULLTEXT_TABLE}.text LIKE ? AND ({group})"));
                args.push(SqlValue::Text(pattern));
                args.append(&mut where_args);
            }
            (None, false) => {
                text.push_str(" WHERE ");
                text.push_str(&group);
                args.append(&mut where_args);
            }
            (None, true) => {}
        }

        if let Some(group_by) = nonempty(spec.group_by.as_deref()) {
            let (name, _) = self.resolve_joined(group_by, data_table)?;
            text.push_str(" GROUP BY ");
            text.push_str(&name);
        }
        self.push_sort(&mut text, &spec.sort, |f| self.resolve_joined(f, data_table))?;
        push_limit(&mut text, spec);

        Ok(SqlQuery { text, args })
    }

    /// Resolves a field in joined mode: raw prefix verbatim, then the
    /// meta table, then the data table.
    fn resolve_joined(
        &self,
        field: &str,
        data_table: Option<&str>,
    ) -> PoolResult<(String, Option<Datatype>)> {
        if let Some(raw) = field.strip_prefix('-') {
            return Ok((raw.to_string(), None));
        }
        if self.structure.has_field(META_TABLE, field) {
            let datatype = self.structure.field_type(META_TABLE, field)?;
            return Ok((format!("meta__.{field}"), Some(datatype)));
        }
        if let Some(table) = data_table {
            if self.structure.has_field(table, field) {
                let datatype = self.structure.field_type(table, field)?;
                return Ok((format!("data__.{field}"), Some(datatype)));
            }
            return Err(SchemaError::unknown_field(table, field).into());
        }
        Err(SchemaError::unknown_field(META_TABLE, field).into())
    }

    /// Resolves a field in single-table mode.
    fn resolve_single(&self, table: &str, field: &str) -> PoolResult<(String, Option<Datatype>)> {
        if let Some(raw) = field.strip_prefix('-') {
            return Ok((raw.to_string(), None));
        }
        let datatype = self.structure.field_type(table, field)?;
        Ok((field.to_string(), Some(datatype)))
    }

    fn render_filters<R>(
        &self,
        filters: &[ParamFilter],
        resolve: R,
    ) -> PoolResult<(Vec<String>, Vec<SqlValue>)>
    where
        R: Fn(&str) -> PoolResult<(String, Option<Datatype>)>,
    {
        let mut conds = Vec::new();
        let mut args = Vec::new();
        for filter in filters {
            let (name, datatype) = resolve(&filter.field)?;
            match filter.operator {
                Operator::Like => {
                    let value = scalar(filter)?;
                    match value {
                        // Contains search over text.
                        Value::Text(s) => {
                            let Some(pattern) = like_pattern(s) else {
                                continue;
                            };
                            conds.push(format!("{name} LIKE ?"));
                            args.push(SqlValue::Text(pattern));
                        }
                        // LIKE over non-text degrades to equality.
                        other => {
                            conds.push(format!("{name} = ?"));
                            args.push(self.lower(datatype, &filter.field, other)?);
                        }
                    }
                }
                Operator::Between => {
                    let FilterValue::Range(low, high) = &filter.value else {
                        return Err(SchemaError::invalid_filter(
                            &filter.field,
                            "BETWEEN needs a low/high pair",
                        )
                        .into());
                    };
                    conds.push(format!("{name} BETWEEN ? AND ?"));
                    args.push(self.lower(datatype, &filter.field, low)?);
                    args.push(self.lower(datatype, &filter.field, high)?);
                }
                Operator::In | Operator::NotIn => {
                    let FilterValue::Set(items) = &filter.value else {
                        return Err(SchemaError::invalid_filter(
                            &filter.field,
                            "IN / NOT IN need a sequence",
                        )
                        .into());
                    };
                    // No elements, no constraint.
                    if items.is_empty() {
                        continue;
                    }
                    if items.len() == 1 {
                        let op = if filter.operator == Operator::In {
                            "="
                        } else {
                            "!="
                        };
                        conds.push(format!("{name} {op} ?"));
                        args.push(self.lower(datatype, &filter.field, &items[0])?);
                        continue;
                    }
                    let placeholders = vec!["?"; items.len()].join(", ");
                    conds.push(format!("{name} {} ({placeholders})", filter.operator.sql()));
                    for item in items {
                        args.push(self.lower(datatype, &filter.field, item)?);
                    }
                }
                _ => {
                    let value = scalar(filter)?;
                    conds.push(format!("{name} {} ?", filter.operator.sql()));
                    args.push(self.lower(datatype, &filter.field, value)?);
                }
            }
        }
        Ok((conds, args))
    }

    fn push_sort<R>(&self, text: &mut String, sort: &[SortField], resolve: R) -> PoolResult<()>
    where
        R: Fn(&str) -> PoolResult<(String, Option<Datatype>)>,
    {
        if sort.is_empty() {
            return Ok(());
        }
        let mut keys = Vec::with_capacity(sort.len());
        for key in sort {
            let (name, _) = resolve(&key.field)?;
            if key.descending {
                keys.push(format!("{name} DESC"));
            } else {
                keys.push(name);
            }
        }
        text.push_str(" ORDER BY ");
        text.push_str(&keys.join(", "));
        Ok(())
    }

    /// Lowers a filter value to its storage shape. Fields with a declared
    /// datatype go through the registry serialization; raw fields map
    /// naturally.
    fn lower(
        &self,
        datatype: Option<Datatype>,
        field: &str,
        value: &Value,
    ) -> PoolResult<SqlValue> {
        if let Some(datatype) = datatype {
            return Ok(serialize_value(datatype, field, value)?);
        }
        match value {
            Value::Null => Ok(SqlValue::Null),
            Value::Bool(v) => Ok(SqlValue::Int(i64::from(*v))),
            Value::Int(v) => Ok(SqlValue::Int(*v)),
            Value::Float(v) => Ok(SqlValue::Float(*v)),
            Value::Text(s) => Ok(SqlValue::Text(s.clone())),
            Value::DateTime(dt) => Ok(SqlValue::Text(dt.format(DATETIME_FORMAT).to_string())),
            Value::Date(d) => Ok(SqlValue::Text(d.format(DATE_FORMAT).to_string())),
            Value::Binary(b) => Ok(SqlValue::Blob(b.clone())),
            Value::List(_) | Value::Refs(_) | Value::Json(_) => Err(SchemaError::invalid_filter(
                field,
                "sequence and JSON values need a declared field",
            )
            .into()),
        }
    }
}

fn scalar(filter: &ParamFilter) -> PoolResult<&Value> {
    match &filter.value {
        FilterValue::Scalar(v) => Ok(v),
        _ => Err(SchemaError::invalid_filter(&filter.field, "operator needs a single value").into()),
    }
}

/// Maps a contains pattern to SQL LIKE syntax. Returns `None` for the
/// empty pattern (no constraint).
fn like_pattern(pattern: &str) -> Option<String> {
    if pattern.is_empty() {
        return None;
    }
    let mapped = pattern.replace('*', "%");
    if mapped.contains('%') {
        Some(mapped)
    } else {
        Some(format!("%{mapped}%"))
    }
}

fn assemble_where(conds: &[String], combine: Combine, condition: Option<&str>) -> String {
    let mut group = match combine {
        Combine::And => conds.join(" AND "),
        Combine::Or => conds.join(" OR "),
        Combine::Not => {
            if conds.is_empty() {
                String::new()
            } else {
                format!("NOT ({})", conds.join(" AND "))
            }
        }
    };
    if let Some(cond) = condition {
        if group.is_empty() {
            group = format!("({cond})");
        } else {
            let connector = match combine {
                Combine::Or => "OR",
                // The literal condition always restricts, even when the
                // filters are negated.
                Combine::And | Combine::Not => "AND",
            };
            group = format!("{group} {connector} ({cond})");
        }
    }
    group
}

fn push_limit(text: &mut String, spec: &SelectSpec) {
    if let Some(max) = spec.max {
        text.push_str(&format!(" LIMIT {max}"));
        if let Some(start) = spec.start {
            text.push_str(&format!(" OFFSET {start}"));
        }
    }
}

fn nonempty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

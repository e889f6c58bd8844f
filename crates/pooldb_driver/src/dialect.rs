//! SQL dialect descriptors.
//!
//! A [`Dialect`] is a pure text generator: it maps declared field types to
//! column types and renders the DDL and introspection statements the
//! migrator needs. Dialects never execute anything - execution stays
//! behind [`crate::DbConnection`].

use pooldb_schema::{Datatype, FieldDef, TableDef, FILE_TABLE, FULLTEXT_TABLE};

/// The SQL dialects understood by the engine.
///
/// Both dialects use positional `?` placeholders, so query text built for
/// one is valid for the other; only DDL column types and introspection
/// statements differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// SQLite 3. Executable through [`crate::SqliteConnection`].
    Sqlite,
    /// MySQL / MariaDB. Text generation only; a live connector plugs in
    /// through the [`crate::Connector`] trait.
    Mysql,
}

impl Dialect {
    /// Returns the lowercase dialect name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Mysql => "mysql",
        }
    }

    /// Returns the column type for a field declaration.
    #[must_use]
    pub fn column_type(self, field: &FieldDef) -> String {
        match self {
            Self::Sqlite => match field.datatype {
                Datatype::Number | Datatype::Bool | Datatype::Unit | Datatype::Bytesize => {
                    "INTEGER".to_string()
                }
                Datatype::Float => "REAL".to_string(),
                // Everything else, dates included, stores as text.
                _ => "TEXT".to_string(),
            },
            Self::Mysql => match field.datatype {
                Datatype::String => format!("VARCHAR({})", string_size(field)),
                Datatype::List => format!("VARCHAR({})", string_size(field)),
                Datatype::File => "VARCHAR(255)".to_string(),
                Datatype::Text
                | Datatype::Multilist
                | Datatype::Unitlist
                | Datatype::Json => "MEDIUMTEXT".to_string(),
                Datatype::Number | Datatype::Unit | Datatype::Bytesize => "BIGINT".to_string(),
                Datatype::Float => "DOUBLE".to_string(),
                Datatype::Bool => "TINYINT(1)".to_string(),
                Datatype::Date => "DATE".to_string(),
                Datatype::Datetime | Datatype::Timestamp => "DATETIME".to_string(),
            },
        }
    }

    /// Renders the `CREATE TABLE` statement for a table definition.
    ///
    /// Key columns are derived from the definition: a numeric `id` becomes
    /// the auto-increment primary key, a string `id` a plain text key
    /// (the sys table). Two system tables deviate: the file table keys on
    /// `fileid` (several file rows share one entry id), and the fulltext
    /// table keys on `id` without auto-increment (assigned the entry id).
    #[must_use]
    pub fn create_table_sql(self, table: &TableDef) -> String {
        let mut columns = Vec::with_capacity(table.fields().len());
        for field in table.fields() {
            columns.push(self.column_sql(table.name(), field));
        }
        format!("CREATE TABLE {} ({})", table.name(), columns.join(", "))
    }

    /// Renders the `ALTER TABLE .. ADD COLUMN` statement for one field.
    #[must_use]
    pub fn add_column_sql(self, table: &str, field: &FieldDef) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            table,
            field.id,
            self.column_type(field)
        )
    }

    /// Renders the statement changing an existing column to the declared
    /// type, or `None` where the dialect cannot alter column types
    /// (SQLite).
    #[must_use]
    pub fn modify_column_sql(self, table: &str, field: &FieldDef) -> Option<String> {
        match self {
            Self::Sqlite => None,
            Self::Mysql => Some(format!(
                "ALTER TABLE {} MODIFY COLUMN {} {}",
                table,
                field.id,
                self.column_type(field)
            )),
        }
    }

    /// Renders an insert that creates a row from column defaults alone.
    ///
    /// Used to allocate an auto-increment id before any field value is
    /// known.
    #[must_use]
    pub fn empty_insert_sql(self, table: &str) -> String {
        match self {
            Self::Sqlite => format!("INSERT INTO {table} DEFAULT VALUES"),
            Self::Mysql => format!("INSERT INTO {table} () VALUES ()"),
        }
    }

    /// Returns the query listing all physical table names.
    ///
    /// The name is the first column of each result row.
    #[must_use]
    pub const fn list_tables_sql(self) -> &'static str {
        match self {
            Self::Sqlite => "SELECT name FROM sqlite_master WHERE type = 'table'",
            Self::Mysql => "SHOW TABLES",
        }
    }

    /// Returns the query listing the columns of a physical table.
    ///
    /// The column name sits at [`Self::column_name_index`] in each row.
    #[must_use]
    pub fn list_columns_sql(self, table: &str) -> String {
        match self {
            Self::Sqlite => format!("PRAGMA table_info({table})"),
            Self::Mysql => format!("SHOW COLUMNS FROM {table}"),
        }
    }

    /// Index of the column-name field in [`Self::list_columns_sql`] rows.
    #[must_use]
    pub const fn column_name_index(self) -> usize {
        match self {
            // PRAGMA table_info: (cid, name, type, notnull, dflt_value, pk).
            Self::Sqlite => 1,
            Self::Mysql => 0,
        }
    }

    fn column_sql(self, table: &str, field: &FieldDef) -> String {
        if field.id == "id" && field.datatype == Datatype::Number {
            if table == FILE_TABLE {
                // Several file rows share one entry id; fileid is the key.
                return match self {
                    Self::Sqlite => "id INTEGER".to_string(),
                    Self::Mysql => "id BIGINT NOT NULL".to_string(),
                };
            }
            if table == FULLTEXT_TABLE {
                // Keyed by the owning entry id, never auto-assigned.
                return match self {
                    Self::Sqlite => "id INTEGER PRIMARY KEY".to_string(),
                    Self::Mysql => "id BIGINT NOT NULL PRIMARY KEY".to_string(),
                };
            }
            return match self {
                Self::Sqlite => "id INTEGER PRIMARY KEY AUTOINCREMENT".to_string(),
                Self::Mysql => "id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY".to_string(),
            };
        }
        if field.id == "id" && field.datatype == Datatype::String {
            return match self {
                Self::Sqlite => "id TEXT PRIMARY KEY".to_string(),
                Self::Mysql => "id VARCHAR(255) NOT NULL PRIMARY KEY".to_string(),
            };
        }
        if field.id == "fileid" && table == FILE_TABLE {
            return match self {
                Self::Sqlite => "fileid INTEGER PRIMARY KEY AUTOINCREMENT".to_string(),
                Self::Mysql => "fileid BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY".to_string(),
            };
        }
        format!("{} {}", field.id, self.column_type(field))
    }
}

fn string_size(field: &FieldDef) -> u32 {
    if field.size > 0 {
        field.size
    } else {
        255
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pooldb_schema::PoolStructure;

    fn structure() -> PoolStructure {
        let mut s = PoolStructure::new();
        s.define(
            "articles",
            vec![
                FieldDef::new("header", Datatype::String).with_size(120),
                FieldDef::new("body", Datatype::Text),
                FieldDef::new("rating", Datatype::Number),
                FieldDef::new("published", Datatype::Date),
            ],
        )
        .unwrap();
        s
    }

    #[test]
    fn type_table_ddl_sqlite() {
        let s = structure();
        let sql = Dialect::Sqlite.create_table_sql(s.table("articles").unwrap());
        assert_eq!(
            sql,
            "CREATE TABLE articles (id INTEGER PRIMARY KEY AUTOINCREMENT, \
             header TEXT, body TEXT, rating INTEGER, published TEXT)"
        );
    }

    #[test]
    fn type_table_ddl_mysql() {
        let s = structure();
        let sql = Dialect::Mysql.create_table_sql(s.table("articles").unwrap());
        assert_eq!(
            sql,
            "CREATE TABLE articles (id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY, \
             header VARCHAR(120), body MEDIUMTEXT, rating BIGINT, published DATE)"
        );
    }

    #[test]
    fn sys_table_keys_on_string_id() {
        let s = PoolStructure::new();
        let sqlite = Dialect::Sqlite.create_table_sql(s.table("pool_sys").unwrap());
        assert!(sqlite.starts_with("CREATE TABLE pool_sys (id TEXT PRIMARY KEY, "));
        let mysql = Dialect::Mysql.create_table_sql(s.table("pool_sys").unwrap());
        assert!(mysql.starts_with("CREATE TABLE pool_sys (id VARCHAR(255) NOT NULL PRIMARY KEY, "));
    }

    #[test]
    fn file_table_keys_on_fileid() {
        let s = PoolStructure::new();
        let sql = Dialect::Sqlite.create_table_sql(s.table("pool_files").unwrap());
        assert!(sql.contains("id INTEGER,"));
        assert!(sql.contains("fileid INTEGER PRIMARY KEY AUTOINCREMENT"));
    }

    #[test]
    fn fulltext_table_id_is_plain_key() {
        let s = PoolStructure::new();
        let sql = Dialect::Sqlite.create_table_sql(s.table("pool_fulltext").unwrap());
        assert!(sql.starts_with("CREATE TABLE pool_fulltext (id INTEGER PRIMARY KEY, "));
        assert!(!sql.contains("AUTOINCREMENT"));
    }

    #[test]
    fn add_column() {
        let field = FieldDef::new("subtitle", Datatype::String).with_size(80);
        assert_eq!(
            Dialect::Sqlite.add_column_sql("articles", &field),
            "ALTER TABLE articles ADD COLUMN subtitle TEXT"
        );
        assert_eq!(
            Dialect::Mysql.add_column_sql("articles", &field),
            "ALTER TABLE articles ADD COLUMN subtitle VARCHAR(80)"
        );
    }

    #[test]
    fn modify_column_unsupported_on_sqlite() {
        let field = FieldDef::new("rating", Datatype::Float);
        assert_eq!(Dialect::Sqlite.modify_column_sql("articles", &field), None);
        assert_eq!(
            Dialect::Mysql.modify_column_sql("articles", &field),
            Some("ALTER TABLE articles MODIFY COLUMN rating DOUBLE".to_string())
        );
    }

    #[test]
    fn empty_insert() {
        assert_eq!(
            Dialect::Sqlite.empty_insert_sql("articles"),
            "INSERT INTO articles DEFAULT VALUES"
        );
        assert_eq!(
            Dialect::Mysql.empty_insert_sql("articles"),
            "INSERT INTO articles () VALUES ()"
        );
    }

    #[test]
    fn introspection_queries() {
        assert_eq!(
            Dialect::Sqlite.list_tables_sql(),
            "SELECT name FROM sqlite_master WHERE type = 'table'"
        );
        assert_eq!(Dialect::Mysql.list_tables_sql(), "SHOW TABLES");
        assert_eq!(
            Dialect::Sqlite.list_columns_sql("pool_meta"),
            "PRAGMA table_info(pool_meta)"
        );
        assert_eq!(
            Dialect::Mysql.list_columns_sql("pool_meta"),
            "SHOW COLUMNS FROM pool_meta"
        );
        assert_eq!(Dialect::Sqlite.column_name_index(), 1);
        assert_eq!(Dialect::Mysql.column_name_index(), 0);
    }
}

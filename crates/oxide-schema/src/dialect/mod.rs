//! Database dialect implementations.
//!
//! A dialect turns table definitions into the DDL its database understands.
//! Only SQLite is provided: the rebuild strategy exists for engines that
//! cannot alter a table in place.

mod sqlite;

pub use sqlite::SqliteDialect;

use crate::schema::{Field, FieldKind, SqlType, TableDefinition};

/// Trait for database-specific SQL generation.
pub trait MigrationDialect: Send + Sync {
    /// Returns the dialect name.
    fn name(&self) -> &'static str;

    /// Returns the SQL type name for the given type.
    fn type_name(&self, sql_type: &SqlType) -> String;

    /// Returns the auto-increment keyword for this dialect.
    fn auto_increment_keyword(&self) -> &'static str;

    /// Quote an identifier (table name, column name, etc.).
    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Generates the column definition for a field.
    ///
    /// Returns `None` for fields without a column.
    fn column_definition(&self, field: &Field) -> Option<String> {
        let sql_type = field.sql_type()?;
        let mut parts = vec![
            self.quote_identifier(&field.column),
            self.type_name(sql_type),
        ];

        // An integer key aliases the rowid and is never NULL. Any other key
        // has to say so, or SQLite accepts NULL keys.
        let rowid_alias = field.primary_key && sql_type.is_integer();
        if field.primary_key {
            parts.push("PRIMARY KEY".to_string());
            if field.auto_created && rowid_alias {
                parts.push(self.auto_increment_keyword().to_string());
            }
        }

        if (!field.nullable || field.primary_key) && !rowid_alias {
            parts.push("NOT NULL".to_string());
        }

        if field.unique && !field.primary_key {
            parts.push("UNIQUE".to_string());
        }

        if let Some(default_sql) = field.default.to_sql() {
            parts.push(format!("DEFAULT {}", default_sql));
        }

        if let FieldKind::ForeignKey {
            to_table,
            to_column,
            ..
        } = &field.kind
        {
            parts.push(format!(
                "REFERENCES {} ({})",
                self.quote_identifier(to_table),
                self.quote_identifier(to_column)
            ));
        }

        Some(parts.join(" "))
    }

    /// Generates SQL for creating a table.
    ///
    /// Each uniqueness constraint becomes a table-level `UNIQUE (...)` over
    /// the columns of the named fields.
    fn create_table_sql(&self, table: &TableDefinition) -> String {
        let mut defs: Vec<String> = table
            .fields
            .iter()
            .filter_map(|f| self.column_definition(f))
            .collect();

        for names in &table.unique_together {
            let columns: Vec<String> = names
                .iter()
                .filter_map(|name| table.get_field(name))
                .filter(|f| f.has_column())
                .map(|f| self.quote_identifier(&f.column))
                .collect();
            if !columns.is_empty() {
                defs.push(format!("UNIQUE ({})", columns.join(", ")));
            }
        }

        format!(
            "CREATE TABLE {} (\n  {}\n)",
            self.quote_identifier(&table.name),
            defs.join(",\n  ")
        )
    }

    /// Generates SQL for dropping a table.
    fn drop_table_sql(&self, name: &str) -> String {
        format!("DROP TABLE {}", self.quote_identifier(name))
    }

    /// Generates SQL for renaming a table.
    fn rename_table_sql(&self, old_name: &str, new_name: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME TO {}",
            self.quote_identifier(old_name),
            self.quote_identifier(new_name)
        )
    }

    /// Generates SQL for creating an index.
    fn create_index_sql(&self, name: &str, table: &str, columns: &[&str], unique: bool) -> String {
        let quoted: Vec<String> = columns.iter().map(|c| self.quote_identifier(c)).collect();
        format!(
            "CREATE {}INDEX {} ON {} ({})",
            if unique { "UNIQUE " } else { "" },
            self.quote_identifier(name),
            self.quote_identifier(table),
            quoted.join(", ")
        )
    }

    /// Statements that must run once the table exists.
    ///
    /// Indexes for foreign keys and `db_index` fields are emitted here so
    /// they can be queued rather than inlined in CREATE TABLE.
    fn deferred_table_sql(&self, table: &TableDefinition) -> Vec<String> {
        table
            .concrete_fields()
            .filter(|f| !f.primary_key && !f.unique)
            .filter(|f| f.db_index || matches!(f.kind, FieldKind::ForeignKey { .. }))
            .map(|f| {
                let index_name = format!("{}_{}", table.name, f.column);
                self.create_index_sql(&index_name, &table.name, &[f.column.as_str()], false)
            })
            .collect()
    }
}

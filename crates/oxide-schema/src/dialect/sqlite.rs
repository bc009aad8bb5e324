//! SQLite dialect.
//!
//! SQLite has limited ALTER TABLE support, so structural changes use the
//! "table recreation" strategy: create a new table, copy data, drop the old
//! table, rename the new table.

use crate::schema::SqlType;

use super::MigrationDialect;

/// SQLite migration dialect.
#[derive(Debug, Clone, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Creates a new SQLite dialect.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl MigrationDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn type_name(&self, sql_type: &SqlType) -> String {
        match sql_type {
            SqlType::Integer | SqlType::SmallInt | SqlType::BigInt => "INTEGER".to_string(),
            SqlType::Text | SqlType::Json | SqlType::Uuid => "TEXT".to_string(),
            SqlType::Varchar(len) => format!("VARCHAR({})", len),
            SqlType::Char(len) => format!("CHAR({})", len),
            SqlType::Boolean => "BOOL".to_string(),
            SqlType::DateTime => "DATETIME".to_string(),
            SqlType::Date => "DATE".to_string(),
            SqlType::Time => "TIME".to_string(),
            SqlType::Real => "REAL".to_string(),
            SqlType::Double => "DOUBLE PRECISION".to_string(),
            SqlType::Decimal(p, s) => format!("DECIMAL({}, {})", p, s),
            SqlType::Blob => "BLOB".to_string(),
        }
    }

    fn auto_increment_keyword(&self) -> &'static str {
        "AUTOINCREMENT"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DefaultValue, Field, TableDefinition};

    fn dialect() -> SqliteDialect {
        SqliteDialect::new()
    }

    fn posts() -> TableDefinition {
        TableDefinition::new("blog", "posts")
            .field(Field::auto_id())
            .field(Field::column("title", SqlType::Varchar(200)))
            .field(Field::column("slug", SqlType::Varchar(50)).unique())
            .field(Field::foreign_key("author", "users", "id"))
            .field(
                Field::column("published", SqlType::Boolean).default(DefaultValue::Bool(false)),
            )
    }

    #[test]
    fn test_auto_id_column() {
        let sql = dialect().column_definition(&Field::auto_id()).unwrap();
        assert_eq!(sql, "\"id\" INTEGER PRIMARY KEY AUTOINCREMENT");
    }

    #[test]
    fn test_declared_primary_key_has_no_autoincrement() {
        let field = Field::column("code", SqlType::Varchar(10)).primary_key();
        let sql = dialect().column_definition(&field).unwrap();
        assert_eq!(sql, "\"code\" VARCHAR(10) PRIMARY KEY NOT NULL");
    }

    #[test]
    fn test_integer_primary_key_stays_a_rowid_alias() {
        let field = Field::column("number", SqlType::BigInt).primary_key();
        let sql = dialect().column_definition(&field).unwrap();
        assert_eq!(sql, "\"number\" INTEGER PRIMARY KEY");

        let nullable_key = Field::column("code", SqlType::Text).primary_key().nullable();
        let sql = dialect().column_definition(&nullable_key).unwrap();
        assert_eq!(sql, "\"code\" TEXT PRIMARY KEY NOT NULL");
    }

    #[test]
    fn test_dialect_name() {
        assert_eq!(dialect().name(), "sqlite");
    }

    #[test]
    fn test_column_definition_flags() {
        let field = Field::column("email", SqlType::Varchar(255))
            .unique()
            .default(DefaultValue::String(String::new()));
        let sql = dialect().column_definition(&field).unwrap();
        assert_eq!(sql, "\"email\" VARCHAR(255) NOT NULL UNIQUE DEFAULT ''");
    }

    #[test]
    fn test_many_to_many_has_no_column_definition() {
        let field = Field::many_to_many("tags", TableDefinition::new("blog", "posts_tags"), true);
        assert!(dialect().column_definition(&field).is_none());
    }

    #[test]
    fn test_create_table() {
        let table = posts().unique_together(["title", "author"]);
        let sql = dialect().create_table_sql(&table);

        assert!(sql.starts_with("CREATE TABLE \"posts\" ("));
        assert!(sql.contains("\"id\" INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(sql.contains("\"title\" VARCHAR(200) NOT NULL"));
        assert!(sql.contains("\"author_id\" INTEGER NOT NULL REFERENCES \"users\" (\"id\")"));
        assert!(sql.contains("\"published\" BOOL NOT NULL DEFAULT 0"));
        assert!(sql.contains("UNIQUE (\"title\", \"author_id\")"));
    }

    #[test]
    fn test_deferred_indexes() {
        let table = posts().field(Field::column("views", SqlType::Integer).db_index());
        let deferred = dialect().deferred_table_sql(&table);

        assert_eq!(
            deferred,
            vec![
                "CREATE INDEX \"posts_author_id\" ON \"posts\" (\"author_id\")".to_string(),
                "CREATE INDEX \"posts_views\" ON \"posts\" (\"views\")".to_string(),
            ]
        );
    }

    #[test]
    fn test_drop_and_rename() {
        let d = dialect();
        assert_eq!(d.drop_table_sql("users"), "DROP TABLE \"users\"");
        assert_eq!(
            d.rename_table_sql("users__new", "users"),
            "ALTER TABLE \"users__new\" RENAME TO \"users\""
        );
    }

    #[test]
    fn test_quote_identifier_escapes_quotes() {
        assert_eq!(dialect().quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_type_names() {
        let d = dialect();
        assert_eq!(d.type_name(&SqlType::BigInt), "INTEGER");
        assert_eq!(d.type_name(&SqlType::Varchar(255)), "VARCHAR(255)");
        assert_eq!(d.type_name(&SqlType::Boolean), "BOOL");
        assert_eq!(d.type_name(&SqlType::Decimal(10, 2)), "DECIMAL(10, 2)");
        assert_eq!(d.type_name(&SqlType::Blob), "BLOB");
    }
}

//! Table-rebuilding schema editor for SQLite.
//!
//! SQLite cannot change a column's type, drop most constraints, or add a
//! composite UNIQUE constraint to an existing table. `oxide-schema` applies
//! such changes the only way SQLite allows: by rebuilding the table.
//!
//! # Architecture
//!
//! - **Schema** - [`TableDefinition`](schema::TableDefinition) and
//!   [`Field`](schema::Field) values describing a table's shape
//! - **Rebuild** - [`RebuildPlan`](rebuild::RebuildPlan) derives the new
//!   table and the column mapping from a set of [`TableEdits`](rebuild::TableEdits)
//! - **Editor** - [`SchemaEditor`](editor::SchemaEditor) runs plans against a
//!   connection and owns the deferred SQL queue
//! - **Dialect** - Database-specific SQL generation
//!
//! # Example
//!
//! ```rust,ignore
//! use oxide_schema::prelude::*;
//! use sqlx::{Connection, SqliteConnection};
//!
//! let mut conn = SqliteConnection::connect("sqlite:app.db").await?;
//! let mut tx = conn.begin().await?;
//! let mut editor = SchemaEditor::new(&mut tx, SqliteDialect::new());
//!
//! let users = TableDefinition::new("accounts", "users")
//!     .field(Field::auto_id())
//!     .field(Field::column("name", SqlType::Varchar(100)));
//!
//! let age = Field::column("age", SqlType::Integer).nullable();
//! let users = editor.add_field(&users, &age).await?;
//!
//! editor.finish().await?;
//! tx.commit().await?;
//! ```

pub mod dialect;
pub mod editor;
pub mod error;
pub mod rebuild;
pub mod schema;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::dialect::{MigrationDialect, SqliteDialect};
    pub use crate::editor::SchemaEditor;
    pub use crate::error::{Result, SchemaError};
    pub use crate::rebuild::{ColumnMapping, RebuildPlan, TableEdits, TEMP_TABLE_SUFFIX};
    pub use crate::schema::{DefaultValue, Field, FieldKind, SqlType, TableDefinition};
}

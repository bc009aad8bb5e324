//! Error types for the schema editor.

/// Errors that can occur while editing a table's schema.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// Adding a NOT NULL column that existing rows could not be filled for.
    #[error(
        "Cannot add NOT NULL field '{field}' to '{table}' without a default value on SQLite"
    )]
    NotNullWithoutDefault {
        /// Table the field was being added to.
        table: String,
        /// The offending field.
        field: String,
    },

    /// Altering between a column-backed field and a column-less one.
    #[error("Cannot alter field '{old}' into '{new}': they are not compatible types")]
    IncompatibleFieldTypes {
        /// Name of the existing field.
        old: String,
        /// Name of the replacement field.
        new: String,
    },

    /// An edit refers to a field the table does not have.
    #[error("Table '{table}' has no field named '{field}'")]
    UnknownField {
        /// Table name.
        table: String,
        /// Field name.
        field: String,
    },

    /// Two fields share a name.
    #[error("Field '{field}' is defined more than once on '{table}'")]
    DuplicateField {
        /// Table name.
        table: String,
        /// Field name.
        field: String,
    },

    /// Two fields share a storage column.
    #[error("Column '{column}' is defined more than once on '{table}'")]
    DuplicateColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },

    /// More than one field is marked as primary key.
    #[error("Table '{0}' would have more than one primary key")]
    MultiplePrimaryKeys(String),

    /// A referenced table cannot be rebuilt because foreign keys are
    /// enforced and SQLite ignores switching them off inside a transaction.
    #[error(
        "Cannot rebuild '{table}' while rows of '{referenced_by}' reference it and foreign \
         keys are enforced; disable foreign keys before opening the transaction"
    )]
    ForeignKeysEnforced {
        /// Table being rebuilt.
        table: String,
        /// A table holding rows that reference it.
        referenced_by: String,
    },

    /// Rows left dangling once a table was rebuilt.
    #[error("Rebuilding '{table}' left {violations} foreign key violation(s)")]
    ForeignKeyViolation {
        /// Table that was rebuilt.
        table: String,
        /// Number of offending rows.
        violations: i64,
    },

    /// Database error while executing a statement.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO error (reading definition files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SchemaError {
    /// Returns whether the error describes a change that can never be
    /// applied, as opposed to a failure of the database itself.
    ///
    /// Configuration errors are raised before the schema is touched.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::NotNullWithoutDefault { .. }
                | Self::IncompatibleFieldTypes { .. }
                | Self::UnknownField { .. }
                | Self::DuplicateField { .. }
                | Self::DuplicateColumn { .. }
                | Self::MultiplePrimaryKeys(_)
                | Self::ForeignKeysEnforced { .. }
        )
    }
}

/// Result type for schema editing operations.
pub type Result<T> = std::result::Result<T, SchemaError>;

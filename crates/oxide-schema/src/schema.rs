//! Table and field definitions.
//!
//! A [`TableDefinition`] is a plain value describing the full shape of one
//! table: the fields it stores and the uniqueness constraints across them.
//! The schema editor derives new definitions from old ones when it rebuilds
//! a table, so nothing here is tied to a live database.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dialect::MigrationDialect;
use crate::error::{Result, SchemaError};

/// SQL data types a column can be declared with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlType {
    /// Integer (32-bit).
    Integer,
    /// Big integer (64-bit).
    BigInt,
    /// Small integer (16-bit).
    SmallInt,
    /// Unbounded text.
    Text,
    /// Variable-length character string.
    Varchar(usize),
    /// Fixed-length character string.
    Char(usize),
    /// Boolean.
    Boolean,
    /// Date and time.
    DateTime,
    /// Date only.
    Date,
    /// Time only.
    Time,
    /// Floating point (single precision).
    Real,
    /// Floating point (double precision).
    Double,
    /// Decimal with precision and scale.
    Decimal(u8, u8),
    /// Binary large object.
    Blob,
    /// JSON document.
    Json,
    /// UUID.
    Uuid,
}

impl SqlType {
    /// Returns true for the integer family (candidates for rowid aliases).
    #[must_use]
    pub fn is_integer(&self) -> bool {
        matches!(self, Self::Integer | Self::BigInt | Self::SmallInt)
    }

    /// Returns true for types whose values may legitimately be `''`.
    #[must_use]
    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            Self::Text | Self::Varchar(_) | Self::Char(_) | Self::Json | Self::Uuid
        )
    }
}

/// Default value for a column.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum DefaultValue {
    /// No default value.
    #[default]
    None,
    /// NULL default.
    Null,
    /// Boolean default.
    Bool(bool),
    /// Integer default.
    Integer(i64),
    /// Float default.
    Float(f64),
    /// String default.
    String(String),
    /// SQL expression (e.g., "CURRENT_TIMESTAMP").
    Expression(String),
}

impl DefaultValue {
    /// Returns the SQL representation of this default value.
    #[must_use]
    pub fn to_sql(&self) -> Option<String> {
        match self {
            Self::None => None,
            Self::Null => Some("NULL".to_string()),
            Self::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
            Self::Integer(i) => Some(i.to_string()),
            Self::Float(f) => Some(f.to_string()),
            Self::String(s) => Some(format!("'{}'", s.replace('\'', "''"))),
            Self::Expression(expr) => Some(format!("({})", expr)),
        }
    }

    /// Returns whether existing rows could be filled from this default.
    ///
    /// A `NULL` default is not usable for a NOT NULL column.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        !matches!(self, Self::None | Self::Null)
    }
}

/// What a field stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldKind {
    /// A plain column.
    Column(SqlType),
    /// A column holding a reference to a row of another table.
    ForeignKey {
        /// Storage type of the referencing column.
        sql_type: SqlType,
        /// Referenced table.
        to_table: String,
        /// Referenced column.
        to_column: String,
    },
    /// A many-to-many relation stored in a separate join table.
    ///
    /// The field has no column of its own.
    ManyToMany {
        /// The join table.
        through: Box<TableDefinition>,
        /// Whether the join table is generated for the relation rather than
        /// declared explicitly.
        auto_created: bool,
    },
}

/// Definition of a single field of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Field name, unique within the table.
    pub name: String,
    /// Storage column name.
    pub column: String,
    /// What the field stores.
    pub kind: FieldKind,
    /// Whether the column allows NULL values.
    #[serde(default)]
    pub nullable: bool,
    /// Default value.
    #[serde(default)]
    pub default: DefaultValue,
    /// Whether this field is the primary key.
    #[serde(default)]
    pub primary_key: bool,
    /// Whether the field was generated rather than declared (implicit `id`).
    #[serde(default)]
    pub auto_created: bool,
    /// Whether the column has a UNIQUE constraint.
    #[serde(default)]
    pub unique: bool,
    /// Whether an index should be created on the column.
    #[serde(default)]
    pub db_index: bool,
}

impl Field {
    /// Creates a field whose column has the same name.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        let name = name.into();
        Self {
            column: name.clone(),
            name,
            kind,
            nullable: false,
            default: DefaultValue::None,
            primary_key: false,
            auto_created: false,
            unique: false,
            db_index: false,
        }
    }

    /// Creates a plain column field.
    #[must_use]
    pub fn column(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self::new(name, FieldKind::Column(sql_type))
    }

    /// Creates a foreign key field stored in `<name>_id`.
    #[must_use]
    pub fn foreign_key(
        name: impl Into<String>,
        to_table: impl Into<String>,
        to_column: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let column = format!("{}_id", name);
        Self::new(
            name,
            FieldKind::ForeignKey {
                sql_type: SqlType::BigInt,
                to_table: to_table.into(),
                to_column: to_column.into(),
            },
        )
        .db_column(column)
    }

    /// Creates a many-to-many field backed by `through`.
    #[must_use]
    pub fn many_to_many(
        name: impl Into<String>,
        through: TableDefinition,
        auto_created: bool,
    ) -> Self {
        let mut field = Self::new(
            name,
            FieldKind::ManyToMany {
                through: Box::new(through),
                auto_created,
            },
        );
        field.nullable = true;
        field
    }

    /// The implicit auto-incrementing `id` key.
    #[must_use]
    pub fn auto_id() -> Self {
        let mut field = Self::column("id", SqlType::Integer).primary_key();
        field.auto_created = true;
        field
    }

    /// Overrides the storage column name.
    #[must_use]
    pub fn db_column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    /// Allows NULL values.
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default(mut self, value: DefaultValue) -> Self {
        self.default = value;
        self
    }

    /// Marks the field as the primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    /// Adds a UNIQUE constraint.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Requests an index on the column.
    #[must_use]
    pub fn db_index(mut self) -> Self {
        self.db_index = true;
        self
    }

    /// Returns the storage type, or `None` when the field has no column.
    #[must_use]
    pub fn sql_type(&self) -> Option<&SqlType> {
        match &self.kind {
            FieldKind::Column(sql_type) | FieldKind::ForeignKey { sql_type, .. } => Some(sql_type),
            FieldKind::ManyToMany { .. } => None,
        }
    }

    /// Resolves the concrete column type for `dialect`.
    #[must_use]
    pub fn db_type<D: MigrationDialect + ?Sized>(&self, dialect: &D) -> Option<String> {
        self.sql_type().map(|t| dialect.type_name(t))
    }

    /// Returns whether the field is backed by a physical column.
    #[must_use]
    pub fn has_column(&self) -> bool {
        self.sql_type().is_some()
    }

    /// Returns whether the default could populate existing rows.
    #[must_use]
    pub fn has_usable_default(&self) -> bool {
        self.default.is_usable()
    }

    #[must_use]
    pub fn empty_strings_allowed(&self) -> bool {
        self.sql_type().is_some_and(SqlType::is_textual)
    }

    /// SQL literal that existing rows receive when this NOT NULL field is
    /// added without a usable default.
    ///
    /// Only fields accepting empty strings have one: `''`.
    #[must_use]
    pub fn empty_fill(&self) -> Option<String> {
        if self.nullable || self.has_usable_default() || !self.empty_strings_allowed() {
            return None;
        }
        DefaultValue::String(String::new()).to_sql()
    }

    /// Returns the join table when it was generated for this relation.
    #[must_use]
    pub fn auto_created_join_table(&self) -> Option<&TableDefinition> {
        match &self.kind {
            FieldKind::ManyToMany {
                through,
                auto_created: true,
            } => Some(through),
            _ => None,
        }
    }

    /// Returns a copy under a new field name and column.
    #[must_use]
    pub fn renamed(&self, name: impl Into<String>, column: impl Into<String>) -> Self {
        let mut field = self.clone();
        field.name = name.into();
        field.column = column.into();
        field
    }
}

/// Complete definition of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDefinition {
    /// Application namespace the table belongs to.
    pub app_label: String,
    /// Table name.
    pub name: String,
    /// Fields, in declaration order.
    pub fields: Vec<Field>,
    /// Sets of field names that must be jointly unique.
    #[serde(default)]
    pub unique_together: Vec<Vec<String>>,
}

impl TableDefinition {
    /// Creates an empty table definition.
    #[must_use]
    pub fn new(app_label: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            app_label: app_label.into(),
            name: name.into(),
            fields: Vec::new(),
            unique_together: Vec::new(),
        }
    }

    /// Adds a field.
    #[must_use]
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Adds a uniqueness constraint over the given field names.
    #[must_use]
    pub fn unique_together<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique_together
            .push(names.into_iter().map(Into::into).collect());
        self
    }

    /// Gets a field by name.
    #[must_use]
    pub fn get_field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Gets a field by storage column name.
    #[must_use]
    pub fn get_field_by_column(&self, column: &str) -> Option<&Field> {
        self.fields
            .iter()
            .find(|f| f.has_column() && f.column == column)
    }

    /// Returns the primary key field, if any.
    #[must_use]
    pub fn primary_key(&self) -> Option<&Field> {
        self.fields.iter().find(|f| f.primary_key)
    }

    /// Fields backed by a physical column.
    pub fn concrete_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.has_column())
    }

    /// Storage column names, in field order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.concrete_fields().map(|f| f.column.as_str())
    }

    /// Checks field/column uniqueness, primary key count and that every
    /// uniqueness constraint names existing fields.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        let mut columns = HashSet::new();
        for field in &self.fields {
            if !names.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateField {
                    table: self.name.clone(),
                    field: field.name.clone(),
                });
            }
            if field.has_column() && !columns.insert(field.column.as_str()) {
                return Err(SchemaError::DuplicateColumn {
                    table: self.name.clone(),
                    column: field.column.clone(),
                });
            }
        }

        if self.fields.iter().filter(|f| f.primary_key).count() > 1 {
            return Err(SchemaError::MultiplePrimaryKeys(self.name.clone()));
        }

        for name in self.unique_together.iter().flatten() {
            if !names.contains(name.as_str()) {
                return Err(SchemaError::UnknownField {
                    table: self.name.clone(),
                    field: name.clone(),
                });
            }
        }

        Ok(())
    }

    /// Loads a definition from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Serializes the definition as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

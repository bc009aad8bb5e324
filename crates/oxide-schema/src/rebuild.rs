//! Table rebuild planning.
//!
//! SQLite cannot change a column's type or a table's constraints in place.
//! Every structural change is applied by building a new table with the
//! final shape, copying rows across, dropping the original and renaming the
//! new table into its place.
//!
//! [`RebuildPlan`] computes everything that rebuild needs without touching
//! the database: the target [`TableDefinition`], the [`ColumnMapping`]
//! driving the data copy, and the primary key that had to be demoted to make
//! room for a new one. The [`SchemaEditor`](crate::editor::SchemaEditor)
//! executes the plan.

use std::collections::HashMap;

use crate::dialect::MigrationDialect;
use crate::error::{Result, SchemaError};
use crate::schema::{Field, TableDefinition};

/// Suffix of the temporary table a rebuild creates.
pub const TEMP_TABLE_SUFFIX: &str = "__new";

/// Ordered `new column -> old column` correspondence for the data copy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMapping {
    pairs: Vec<(String, String)>,
}

impl ColumnMapping {
    /// Maps every column to itself.
    #[must_use]
    pub fn identity<'a>(columns: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            pairs: columns
                .into_iter()
                .map(|c| (c.to_string(), c.to_string()))
                .collect(),
        }
    }

    /// Maps `new_column` to `old_column`, replacing any existing entry for
    /// `new_column` in place.
    pub fn insert(&mut self, new_column: impl Into<String>, old_column: impl Into<String>) {
        let new_column = new_column.into();
        let old_column = old_column.into();
        match self.pairs.iter_mut().find(|(new, _)| *new == new_column) {
            Some(pair) => pair.1 = old_column,
            None => self.pairs.push((new_column, old_column)),
        }
    }

    /// Removes the entry for `new_column`, returning its source column.
    pub fn remove(&mut self, new_column: &str) -> Option<String> {
        let idx = self.pairs.iter().position(|(new, _)| new == new_column)?;
        Some(self.pairs.remove(idx).1)
    }

    /// Returns the source column for `new_column`.
    #[must_use]
    pub fn get(&self, new_column: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(new, _)| new == new_column)
            .map(|(_, old)| old.as_str())
    }

    /// Iterates `(new, old)` pairs in mapping order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(new, old)| (new.as_str(), old.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// The field-level edits applied by one rebuild.
///
/// All categories compose; an empty set rebuilds the table unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableEdits {
    /// Fields to add.
    pub create_fields: Vec<Field>,
    /// Names of fields to remove.
    pub delete_fields: Vec<String>,
    /// `(old, new)` pairs; `new` replaces the field named `old.name`.
    pub alter_fields: Vec<(Field, Field)>,
    /// `(old_name, new_name)` pairs.
    pub rename_fields: Vec<(String, String)>,
    /// Replacement uniqueness constraints.
    pub override_uniques: Option<Vec<Vec<String>>>,
}

impl TableEdits {
    /// Creates an empty edit set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field.
    #[must_use]
    pub fn create(mut self, field: Field) -> Self {
        self.create_fields.push(field);
        self
    }

    /// Removes a field.
    #[must_use]
    pub fn delete(mut self, name: impl Into<String>) -> Self {
        self.delete_fields.push(name.into());
        self
    }

    /// Replaces `old` with `new`.
    #[must_use]
    pub fn alter(mut self, old: Field, new: Field) -> Self {
        self.alter_fields.push((old, new));
        self
    }

    /// Renames a field.
    #[must_use]
    pub fn rename(mut self, old_name: impl Into<String>, new_name: impl Into<String>) -> Self {
        self.rename_fields.push((old_name.into(), new_name.into()));
        self
    }

    /// Replaces the uniqueness constraints.
    #[must_use]
    pub fn override_uniques(mut self, uniques: Vec<Vec<String>>) -> Self {
        self.override_uniques = Some(uniques);
        self
    }

    /// Returns true when no edit is requested.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.create_fields.is_empty()
            && self.delete_fields.is_empty()
            && self.alter_fields.is_empty()
            && self.rename_fields.is_empty()
            && self.override_uniques.is_none()
    }

    fn introduces_primary_key(&self) -> bool {
        self.create_fields.iter().any(|f| f.primary_key)
            || self.alter_fields.iter().any(|(_, new)| new.primary_key)
    }
}

/// A computed table rebuild.
#[derive(Debug, Clone, PartialEq)]
pub struct RebuildPlan {
    /// The table as it exists now.
    pub source: TableDefinition,
    /// The table to create, under its temporary name.
    pub target: TableDefinition,
    /// Column correspondence for the data copy.
    pub mapping: ColumnMapping,
    /// Created NOT NULL columns and the literal existing rows receive.
    pub fills: Vec<(String, String)>,
    /// The previous primary key, when a new one displaced it.
    ///
    /// Holds the field as it was before the rebuild (still flagged as
    /// primary key). An auto-created key is absent from `target` entirely.
    pub demoted_primary_key: Option<Field>,
}

impl RebuildPlan {
    /// Applies `edits` to `current`.
    ///
    /// `current` is left untouched.
    pub fn new(current: &TableDefinition, edits: TableEdits) -> Result<Self> {
        current.validate()?;

        let mut fields = current.fields.clone();
        let mut mapping = ColumnMapping::identity(current.column_names());
        let mut demoted_primary_key = None;
        let mut renamed: HashMap<String, String> = HashMap::new();
        let mut removed: Vec<String> = Vec::new();

        for (old, _) in &edits.alter_fields {
            position(current, &fields, &old.name)?;
        }

        if edits.introduces_primary_key() {
            let replaced = |name: &str| edits.alter_fields.iter().any(|(old, _)| old.name == name);
            if let Some(idx) = fields
                .iter()
                .position(|f| f.primary_key && !replaced(f.name.as_str()))
            {
                let previous = fields[idx].clone();
                if previous.auto_created {
                    fields.remove(idx);
                    if previous.has_column() {
                        mapping.remove(&previous.column);
                    }
                    removed.push(previous.name.clone());
                } else {
                    fields[idx].primary_key = false;
                }
                demoted_primary_key = Some(previous);
            }
        }

        let fills: Vec<(String, String)> = edits
            .create_fields
            .iter()
            .filter_map(|f| Some((f.column.clone(), f.empty_fill()?)))
            .collect();
        fields.extend(edits.create_fields.iter().cloned());

        for (old, new) in &edits.alter_fields {
            let idx = position(current, &fields, &old.name)?;
            let existing = &fields[idx];
            if existing.has_column() {
                let old_column = existing.column.clone();
                mapping.remove(&old_column);
                if new.has_column() {
                    mapping.insert(new.column.clone(), old_column);
                }
            }
            if new.name != old.name {
                renamed.insert(old.name.clone(), new.name.clone());
            }
            fields[idx] = new.clone();
        }

        for (old_name, new_name) in &edits.rename_fields {
            let idx = position(current, &fields, old_name)?;
            let existing = &fields[idx];
            let column = if existing.column == existing.name {
                new_name.clone()
            } else {
                existing.column.clone()
            };
            let new = existing.renamed(new_name.clone(), column);
            if existing.has_column() {
                let old_column = existing.column.clone();
                mapping.remove(&old_column);
                mapping.insert(new.column.clone(), old_column);
            }
            renamed.insert(old_name.clone(), new_name.clone());
            fields[idx] = new;
        }

        for name in &edits.delete_fields {
            let idx = position(current, &fields, name)?;
            let field = fields.remove(idx);
            if field.has_column() {
                mapping.remove(&field.column);
            }
            removed.push(field.name);
        }

        let unique_together = match edits.override_uniques {
            Some(uniques) => uniques,
            None => carry_uniques(&current.unique_together, &renamed, &removed),
        };

        let target = TableDefinition {
            app_label: current.app_label.clone(),
            name: format!("{}{}", current.name, TEMP_TABLE_SUFFIX),
            fields,
            unique_together,
        };
        target.validate()?;

        Ok(Self {
            source: current.clone(),
            target,
            mapping,
            fills,
            demoted_primary_key,
        })
    }

    /// Name of the temporary table.
    #[must_use]
    pub fn temp_name(&self) -> &str {
        &self.target.name
    }

    /// Name the rebuilt table ends up with.
    #[must_use]
    pub fn final_name(&self) -> &str {
        &self.source.name
    }

    /// The target definition under the original table name.
    #[must_use]
    pub fn final_definition(&self) -> TableDefinition {
        let mut definition = self.target.clone();
        definition.name = self.source.name.clone();
        definition
    }

    /// Renders the `INSERT ... SELECT` copying rows into the new table.
    ///
    /// Mapped columns come first, then the filled ones. Returns `None` when
    /// there is nothing to copy.
    #[must_use]
    pub fn copy_sql<D: MigrationDialect + ?Sized>(&self, dialect: &D) -> Option<String> {
        if self.mapping.is_empty() && self.fills.is_empty() {
            return None;
        }
        let (new_columns, sources): (Vec<String>, Vec<String>) = self
            .mapping
            .iter()
            .map(|(new, old)| (dialect.quote_identifier(new), dialect.quote_identifier(old)))
            .chain(
                self.fills
                    .iter()
                    .map(|(column, value)| (dialect.quote_identifier(column), value.clone())),
            )
            .unzip();
        Some(format!(
            "INSERT INTO {} ({}) SELECT {} FROM {}",
            dialect.quote_identifier(self.temp_name()),
            new_columns.join(", "),
            sources.join(", "),
            dialect.quote_identifier(self.final_name())
        ))
    }

    /// Points a statement written against the temporary table at the final
    /// table instead.
    #[must_use]
    pub fn retarget(&self, sql: &str) -> String {
        sql.replace(self.temp_name(), self.final_name())
    }
}

fn position(table: &TableDefinition, fields: &[Field], name: &str) -> Result<usize> {
    fields
        .iter()
        .position(|f| f.name == name)
        .ok_or_else(|| SchemaError::UnknownField {
            table: table.name.clone(),
            field: name.to_string(),
        })
}

// Constraints naming a removed field are dropped as a whole.
fn carry_uniques(
    uniques: &[Vec<String>],
    renamed: &HashMap<String, String>,
    removed: &[String],
) -> Vec<Vec<String>> {
    uniques
        .iter()
        .filter(|names| !names.iter().any(|n| removed.contains(n)))
        .map(|names| {
            names
                .iter()
                .map(|n| renamed.get(n).cloned().unwrap_or_else(|| n.clone()))
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::SqliteDialect;
    use crate::schema::{DefaultValue, SqlType};

    fn people() -> TableDefinition {
        TableDefinition::new("crm", "people")
            .field(Field::auto_id())
            .field(Field::column("name", SqlType::Varchar(100)))
            .field(Field::column("email", SqlType::Varchar(255)).nullable())
    }

    fn assert_mapping_complete(plan: &RebuildPlan) {
        let target: Vec<&str> = plan.target.column_names().collect();
        let source: Vec<&str> = plan.source.column_names().collect();
        for (new, old) in plan.mapping.iter() {
            assert!(target.contains(&new), "{new} missing from target");
            assert!(source.contains(&old), "{old} missing from source");
        }
    }

    fn names(table: &TableDefinition) -> Vec<&str> {
        table.fields.iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn test_mapping_insert_replaces_in_place() {
        let mut mapping = ColumnMapping::identity(["a", "b", "c"]);
        mapping.insert("b", "x");
        mapping.insert("d", "a");

        assert_eq!(
            mapping.iter().collect::<Vec<_>>(),
            vec![("a", "a"), ("b", "x"), ("c", "c"), ("d", "a")]
        );
        assert_eq!(mapping.remove("a"), Some("a".to_string()));
        assert_eq!(mapping.remove("a"), None);
        assert_eq!(mapping.get("b"), Some("x"));
        assert_eq!(mapping.len(), 3);
    }

    #[test]
    fn test_empty_edits_copy_verbatim() {
        let plan = RebuildPlan::new(&people(), TableEdits::new()).unwrap();

        assert_eq!(plan.temp_name(), "people__new");
        assert_eq!(plan.final_name(), "people");
        assert_eq!(names(&plan.target), vec!["id", "name", "email"]);
        assert_eq!(
            plan.copy_sql(&SqliteDialect::new()).unwrap(),
            "INSERT INTO \"people__new\" (\"id\", \"name\", \"email\") \
             SELECT \"id\", \"name\", \"email\" FROM \"people\""
        );
        assert!(plan.demoted_primary_key.is_none());
    }

    #[test]
    fn test_create_field_not_in_mapping() {
        let age = Field::column("age", SqlType::Integer).nullable();
        let plan = RebuildPlan::new(&people(), TableEdits::new().create(age)).unwrap();

        assert_eq!(names(&plan.target), vec!["id", "name", "email", "age"]);
        assert_eq!(plan.mapping.get("age"), None);
        assert_eq!(plan.mapping.len(), 3);
        assert_mapping_complete(&plan);
    }

    #[test]
    fn test_not_null_text_field_is_filled_with_empty_string() {
        let bio = Field::column("bio", SqlType::Text);
        let age = Field::column("age", SqlType::Integer).default(DefaultValue::Integer(0));
        let plan = RebuildPlan::new(&people(), TableEdits::new().create(bio).create(age)).unwrap();

        assert_eq!(plan.fills, vec![("bio".to_string(), "''".to_string())]);
        assert_eq!(plan.mapping.get("bio"), None);
        assert_eq!(
            plan.copy_sql(&SqliteDialect::new()).unwrap(),
            "INSERT INTO \"people__new\" (\"id\", \"name\", \"email\", \"bio\") \
             SELECT \"id\", \"name\", \"email\", '' FROM \"people\""
        );
        assert_mapping_complete(&plan);
    }

    #[test]
    fn test_alter_maps_new_column_from_old() {
        let old = people().get_field("name").cloned().unwrap();
        let new = Field::column("name", SqlType::Text).db_column("full_name");
        let plan = RebuildPlan::new(&people(), TableEdits::new().alter(old, new)).unwrap();

        assert_eq!(names(&plan.target), vec!["id", "name", "email"]);
        assert_eq!(plan.target.fields[1].column, "full_name");
        assert_eq!(plan.mapping.get("full_name"), Some("name"));
        assert_eq!(plan.mapping.get("name"), None);
        assert_mapping_complete(&plan);
    }

    #[test]
    fn test_delete_removes_field_and_mapping() {
        let plan = RebuildPlan::new(&people(), TableEdits::new().delete("email")).unwrap();

        assert_eq!(names(&plan.target), vec!["id", "name"]);
        assert_eq!(
            plan.mapping.iter().collect::<Vec<_>>(),
            vec![("id", "id"), ("name", "name")]
        );
    }

    #[test]
    fn test_rename_follows_column() {
        let table = people().unique_together(["name", "email"]);
        let plan = RebuildPlan::new(&table, TableEdits::new().rename("email", "mail")).unwrap();

        let mail = plan.target.get_field("mail").unwrap();
        assert_eq!(mail.column, "mail");
        assert_eq!(plan.mapping.get("mail"), Some("email"));
        assert_eq!(
            plan.target.unique_together,
            vec![vec!["name".to_string(), "mail".to_string()]]
        );
        assert_mapping_complete(&plan);
    }

    #[test]
    fn test_rename_keeps_explicit_column() {
        let table = TableDefinition::new("crm", "people")
            .field(Field::auto_id())
            .field(Field::column("name", SqlType::Text).db_column("person_name"));
        let plan = RebuildPlan::new(&table, TableEdits::new().rename("name", "label")).unwrap();

        assert_eq!(plan.target.get_field("label").unwrap().column, "person_name");
        assert_eq!(plan.mapping.get("person_name"), Some("person_name"));
    }

    #[test]
    fn test_new_primary_key_drops_auto_id() {
        let code = Field::column("code", SqlType::Varchar(20))
            .primary_key()
            .default(DefaultValue::String("x".to_string()));
        let plan = RebuildPlan::new(&people(), TableEdits::new().create(code)).unwrap();

        assert_eq!(names(&plan.target), vec!["name", "email", "code"]);
        assert_eq!(plan.mapping.get("id"), None);
        assert_eq!(plan.target.primary_key().unwrap().name, "code");

        let demoted = plan.demoted_primary_key.as_ref().unwrap();
        assert_eq!(demoted.name, "id");
        assert!(demoted.primary_key);
        assert!(people().get_field("id").unwrap().primary_key);
        assert_mapping_complete(&plan);
    }

    #[test]
    fn test_new_primary_key_demotes_declared_key() {
        let table = TableDefinition::new("shop", "products")
            .field(Field::column("sku", SqlType::Varchar(20)).primary_key())
            .field(Field::column("ean", SqlType::Varchar(13)));
        let old = table.get_field("ean").cloned().unwrap();
        let new = old.clone().primary_key();
        let plan = RebuildPlan::new(&table, TableEdits::new().alter(old, new)).unwrap();

        let sku = plan.target.get_field("sku").unwrap();
        assert!(!sku.primary_key);
        assert_eq!(plan.target.primary_key().unwrap().name, "ean");
        assert_eq!(plan.demoted_primary_key.as_ref().unwrap().name, "sku");
        assert_eq!(plan.mapping.get("sku"), Some("sku"));
        assert_eq!(
            plan.target.fields.iter().filter(|f| f.primary_key).count(),
            1
        );
    }

    #[test]
    fn test_altering_the_primary_key_itself_keeps_data() {
        let old = Field::auto_id();
        let mut new = Field::column("id", SqlType::BigInt).primary_key();
        new.auto_created = true;
        let plan = RebuildPlan::new(&people(), TableEdits::new().alter(old, new)).unwrap();

        assert!(plan.demoted_primary_key.is_none());
        assert_eq!(plan.mapping.get("id"), Some("id"));
        assert_eq!(plan.target.primary_key().unwrap().name, "id");
    }

    #[test]
    fn test_two_new_primary_keys_rejected() {
        let edits = TableEdits::new()
            .create(Field::column("a", SqlType::Integer).primary_key())
            .create(Field::column("b", SqlType::Integer).primary_key());
        assert!(matches!(
            RebuildPlan::new(&people(), edits),
            Err(SchemaError::MultiplePrimaryKeys(_))
        ));
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(matches!(
            RebuildPlan::new(&people(), TableEdits::new().delete("phone")),
            Err(SchemaError::UnknownField { .. })
        ));
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let edits = TableEdits::new().create(Field::column("email", SqlType::Text));
        assert!(matches!(
            RebuildPlan::new(&people(), edits),
            Err(SchemaError::DuplicateField { .. })
        ));
    }

    #[test]
    fn test_override_uniques() {
        let table = people().unique_together(["name", "email"]);
        let edits = TableEdits::new().override_uniques(vec![vec!["name".to_string()]]);
        let plan = RebuildPlan::new(&table, edits).unwrap();

        assert_eq!(plan.target.unique_together, vec![vec!["name".to_string()]]);
        assert_eq!(plan.mapping.len(), 3);
    }

    #[test]
    fn test_deleted_field_drops_its_uniqueness_constraint() {
        let table = people()
            .unique_together(["name", "email"])
            .unique_together(["name"]);
        let plan = RebuildPlan::new(&table, TableEdits::new().delete("email")).unwrap();

        assert_eq!(plan.target.unique_together, vec![vec!["name".to_string()]]);
    }

    #[test]
    fn test_combined_edits() {
        let old = people().get_field("name").cloned().unwrap();
        let new = Field::column("name", SqlType::Text);
        let edits = TableEdits::new()
            .create(Field::column("age", SqlType::Integer).nullable())
            .alter(old, new)
            .delete("email");
        let plan = RebuildPlan::new(&people(), edits).unwrap();

        assert_eq!(names(&plan.target), vec!["id", "name", "age"]);
        assert_eq!(
            plan.mapping.iter().collect::<Vec<_>>(),
            vec![("id", "id"), ("name", "name")]
        );
        assert_mapping_complete(&plan);
    }

    #[test]
    fn test_final_definition_and_retarget() {
        let plan = RebuildPlan::new(&people(), TableEdits::new()).unwrap();

        assert_eq!(plan.final_definition().name, "people");
        assert_eq!(
            plan.retarget("CREATE INDEX \"people__new_name\" ON \"people__new\" (\"name\")"),
            "CREATE INDEX \"people_name\" ON \"people\" (\"name\")"
        );
    }

    #[test]
    fn test_no_surviving_column_yields_no_copy() {
        let table = TableDefinition::new("crm", "tokens").field(Field::auto_id());
        let key = Field::column("value", SqlType::BigInt).primary_key();
        let plan = RebuildPlan::new(&table, TableEdits::new().create(key)).unwrap();

        assert!(plan.mapping.is_empty());
        assert!(plan.copy_sql(&SqliteDialect::new()).is_none());
    }
}

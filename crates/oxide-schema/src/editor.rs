//! Schema editor.
//!
//! The editor owns one schema-editing session on a SQLite connection: it
//! issues DDL, keeps the queue of statements deferred until their table
//! exists, and applies field-level changes by rebuilding tables.
//!
//! The editor never opens a transaction. Callers that want a rebuild to be
//! atomic hand it a connection borrowed from an open transaction.

use sqlx::sqlite::SqliteConnection;
use tracing::{debug, info, warn};

use crate::dialect::MigrationDialect;
use crate::error::{Result, SchemaError};
use crate::rebuild::{RebuildPlan, TableEdits};
use crate::schema::{Field, TableDefinition};

/// Applies schema changes to a SQLite database.
pub struct SchemaEditor<'c, D: MigrationDialect> {
    conn: &'c mut SqliteConnection,
    dialect: D,
    deferred_sql: Vec<String>,
    dry_run: bool,
    collected_sql: Vec<String>,
}

impl<'c, D: MigrationDialect> SchemaEditor<'c, D> {
    /// Creates a new schema editor on `conn`.
    pub fn new(conn: &'c mut SqliteConnection, dialect: D) -> Self {
        Self {
            conn,
            dialect,
            deferred_sql: Vec::new(),
            dry_run: false,
            collected_sql: Vec::new(),
        }
    }

    /// Enables dry-run mode (SQL is collected but not executed).
    #[must_use]
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Returns the dialect.
    #[must_use]
    pub fn dialect(&self) -> &D {
        &self.dialect
    }

    /// Returns the underlying connection.
    pub fn connection(&mut self) -> &mut SqliteConnection {
        &mut *self.conn
    }

    /// Statements waiting for their table to exist.
    #[must_use]
    pub fn deferred_sql(&self) -> &[String] {
        &self.deferred_sql
    }

    /// Queues a statement to run after the current operation.
    pub fn defer(&mut self, sql: impl Into<String>) {
        self.deferred_sql.push(sql.into());
    }

    /// Statements recorded in dry-run mode.
    #[must_use]
    pub fn collected_sql(&self) -> &[String] {
        &self.collected_sql
    }

    /// Executes a single statement.
    pub async fn execute(&mut self, sql: &str) -> Result<()> {
        debug!(sql = %sql, "Executing SQL");
        if self.dry_run {
            self.collected_sql.push(sql.to_string());
        } else {
            sqlx::query(sql).execute(&mut *self.conn).await?;
        }
        Ok(())
    }

    /// Creates a table, along with the join tables of its auto-created
    /// many-to-many fields.
    ///
    /// Index statements are queued on the deferred queue.
    pub async fn create_table(&mut self, table: &TableDefinition) -> Result<()> {
        info!(table = %table.name, "Creating table");
        self.create_single_table(table).await?;
        for field in &table.fields {
            if let Some(through) = field.auto_created_join_table() {
                self.create_single_table(through).await?;
            }
        }
        Ok(())
    }

    /// Drops a table, along with the join tables of its auto-created
    /// many-to-many fields.
    pub async fn drop_table(&mut self, table: &TableDefinition) -> Result<()> {
        info!(table = %table.name, "Dropping table");
        for field in &table.fields {
            if let Some(through) = field.auto_created_join_table() {
                self.drop_single_table(&through.name).await?;
            }
        }
        self.drop_single_table(&table.name).await
    }

    /// Renames a table.
    pub async fn rename_table(&mut self, old_name: &str, new_name: &str) -> Result<()> {
        let sql = self.dialect.rename_table_sql(old_name, new_name);
        self.execute(&sql).await
    }

    /// Adds a field to `table`.
    ///
    /// An auto-created many-to-many field only needs its join table created.
    /// Any other field rebuilds the table. A NOT NULL field must come with
    /// a usable default unless it accepts empty strings.
    pub async fn add_field(
        &mut self,
        table: &TableDefinition,
        field: &Field,
    ) -> Result<TableDefinition> {
        if let Some(through) = field.auto_created_join_table() {
            info!(table = %table.name, field = %field.name, "Creating join table");
            self.create_table(through).await?;
            let mut updated = table.clone();
            updated.fields.push(field.clone());
            return Ok(updated);
        }

        if !field.nullable && !field.has_usable_default() && !field.empty_strings_allowed() {
            return Err(SchemaError::NotNullWithoutDefault {
                table: table.name.clone(),
                field: field.name.clone(),
            });
        }

        self.remake_table(table, TableEdits::new().create(field.clone()))
            .await
    }

    /// Removes a field from `table`.
    pub async fn remove_field(
        &mut self,
        table: &TableDefinition,
        field: &Field,
    ) -> Result<TableDefinition> {
        if let Some(through) = field.auto_created_join_table() {
            info!(table = %table.name, field = %field.name, "Dropping join table");
            self.drop_table(through).await?;
            let mut updated = table.clone();
            updated.fields.retain(|f| f.name != field.name);
            return Ok(updated);
        }

        self.remake_table(table, TableEdits::new().delete(field.name.clone()))
            .await
    }

    /// Replaces `old` with `new` on `table`.
    ///
    /// Both fields must either have a column or have none. When neither has
    /// one nothing is stored in `table`, and the change is skipped.
    pub async fn alter_field(
        &mut self,
        table: &TableDefinition,
        old: &Field,
        new: &Field,
    ) -> Result<TableDefinition> {
        let old_type = old.db_type(&self.dialect);
        let new_type = new.db_type(&self.dialect);
        match (old_type, new_type) {
            (None, None) => {
                // TODO: repoint the join table when a many-to-many target changes.
                debug!(
                    table = %table.name,
                    old = %old.name,
                    new = %new.name,
                    "Neither field has a column, skipping"
                );
                Ok(table.clone())
            }
            (None, Some(_)) | (Some(_), None) => Err(SchemaError::IncompatibleFieldTypes {
                old: old.name.clone(),
                new: new.name.clone(),
            }),
            (Some(_), Some(_)) => {
                self.remake_table(table, TableEdits::new().alter(old.clone(), new.clone()))
                    .await
            }
        }
    }

    /// Replaces the uniqueness constraints of `table`.
    pub async fn alter_unique_together(
        &mut self,
        table: &TableDefinition,
        _old: &[Vec<String>],
        new: &[Vec<String>],
    ) -> Result<TableDefinition> {
        self.remake_table(table, TableEdits::new().override_uniques(new.to_vec()))
            .await
    }

    /// Rebuilds `current` with `edits` applied.
    ///
    /// Creates the new table under a temporary name, copies the rows over,
    /// drops the original, renames the new table into place, then runs
    /// every deferred statement against the final name and clears the
    /// queue. Returns the resulting definition; `current` is not modified.
    ///
    /// A failure part way leaves both tables behind. Run inside a
    /// transaction to get all or nothing.
    ///
    /// Foreign key enforcement is switched off around the table swap and the
    /// rebuilt table is checked afterwards. Inside a transaction SQLite keeps
    /// enforcement on, so a table that other rows reference is refused with
    /// [`SchemaError::ForeignKeysEnforced`].
    pub async fn remake_table(
        &mut self,
        current: &TableDefinition,
        edits: TableEdits,
    ) -> Result<TableDefinition> {
        let plan = RebuildPlan::new(current, edits)?;
        info!(
            dialect = self.dialect.name(),
            table = %plan.final_name(),
            temp = %plan.temp_name(),
            columns = plan.mapping.len(),
            "Rebuilding table"
        );

        let suspended = self.suspend_foreign_keys(plan.final_name()).await?;
        let mut swapped = self.swap_tables(&plan).await;
        if suspended {
            if swapped.is_ok() {
                swapped = self.check_foreign_keys(plan.final_name()).await;
            }
            self.execute("PRAGMA foreign_keys = ON").await?;
        }
        swapped?;

        self.run_deferred(|sql| plan.retarget(sql)).await?;

        if let Some(previous) = &plan.demoted_primary_key {
            debug!(
                table = %plan.final_name(),
                field = %previous.name,
                "Primary key handed over to new field"
            );
        }

        Ok(plan.final_definition())
    }

    /// Runs the statements still deferred and ends the session.
    ///
    /// Returns the statements collected in dry-run mode.
    pub async fn finish(mut self) -> Result<Vec<String>> {
        self.run_deferred(str::to_string).await?;
        Ok(self.collected_sql)
    }

    /// Fails when rows of any table point at missing rows of `table`, or
    /// when rows of `table` point at missing rows elsewhere.
    ///
    /// Callers that switch foreign keys off themselves run this before
    /// committing. Nothing is checked in dry-run mode.
    pub async fn check_foreign_keys(&mut self, table: &str) -> Result<()> {
        if self.dry_run {
            return Ok(());
        }
        let (violations,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM pragma_foreign_key_check() WHERE \"table\" = ? OR parent = ?",
        )
        .bind(table)
        .bind(table)
        .fetch_one(&mut *self.conn)
        .await?;
        if violations > 0 {
            return Err(SchemaError::ForeignKeyViolation {
                table: table.to_string(),
                violations,
            });
        }
        Ok(())
    }

    async fn swap_tables(&mut self, plan: &RebuildPlan) -> Result<()> {
        self.create_single_table(&plan.target).await?;

        match plan.copy_sql(&self.dialect) {
            Some(sql) => self.execute(&sql).await?,
            None => warn!(table = %plan.final_name(), "No column survives, rows are not copied"),
        }

        self.drop_single_table(plan.final_name()).await?;
        self.rename_table(plan.temp_name(), plan.final_name()).await
    }

    // Each distinct statement runs once, in queue order.
    async fn run_deferred(&mut self, retarget: impl Fn(&str) -> String) -> Result<()> {
        let mut executed: Vec<String> = Vec::new();
        for sql in std::mem::take(&mut self.deferred_sql) {
            let sql = retarget(&sql);
            if executed.contains(&sql) {
                debug!(sql = %sql, "Skipping repeated deferred statement");
                continue;
            }
            self.execute(&sql).await?;
            executed.push(sql);
        }
        Ok(())
    }

    /// Switches foreign key enforcement off for a rebuild of `table`.
    ///
    /// Returns true when enforcement has to be switched back on.
    async fn suspend_foreign_keys(&mut self, table: &str) -> Result<bool> {
        if self.dry_run || !self.foreign_keys_enabled().await? {
            return Ok(false);
        }
        self.execute("PRAGMA foreign_keys = OFF").await?;
        if !self.foreign_keys_enabled().await? {
            return Ok(true);
        }

        // Still on: the connection is inside a transaction. Dropping the
        // table would fail on any referencing row.
        let referencing: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT m.name FROM sqlite_master m, pragma_foreign_key_list(m.name) f \
             WHERE m.type = 'table' AND f.\"table\" = ?",
        )
        .bind(table)
        .fetch_all(&mut *self.conn)
        .await?;
        for (child,) in referencing {
            let sql = format!(
                "SELECT EXISTS (SELECT 1 FROM {})",
                self.dialect.quote_identifier(&child)
            );
            let (has_rows,): (i64,) = sqlx::query_as(&sql).fetch_one(&mut *self.conn).await?;
            if has_rows != 0 {
                return Err(SchemaError::ForeignKeysEnforced {
                    table: table.to_string(),
                    referenced_by: child,
                });
            }
        }
        Ok(false)
    }

    async fn foreign_keys_enabled(&mut self) -> Result<bool> {
        let (enabled,): (i64,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(&mut *self.conn)
            .await?;
        Ok(enabled != 0)
    }

    async fn create_single_table(&mut self, table: &TableDefinition) -> Result<()> {
        table.validate()?;
        let sql = self.dialect.create_table_sql(table);
        self.execute(&sql).await?;
        self.deferred_sql.extend(self.dialect.deferred_table_sql(table));
        Ok(())
    }

    async fn drop_single_table(&mut self, name: &str) -> Result<()> {
        let sql = self.dialect.drop_table_sql(name);
        self.execute(&sql).await
    }
}

//! oxide-schema CLI
//!
//! Applies a single field-level change to a SQLite table described by a
//! JSON table definition, and writes the resulting definition back out.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::Connection;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use oxide_schema::prelude::{Field, SchemaEditor, SchemaError, SqliteDialect, TableDefinition};

/// Rebuild SQLite tables to apply schema changes.
#[derive(Parser)]
#[command(name = "oxide-schema")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL (SQLite path or connection string).
    #[arg(short, long, env = "DATABASE_URL", default_value = "sqlite:db.sqlite3")]
    database: String,

    /// JSON file with the current table definition.
    #[arg(short, long)]
    table: PathBuf,

    /// Where to write the resulting table definition (stdout if omitted).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the SQL instead of executing it.
    #[arg(long)]
    dry_run: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a field described by a JSON file.
    AddField {
        /// JSON file with the field definition.
        #[arg(short, long)]
        field: PathBuf,
    },

    /// Remove a field by name.
    RemoveField {
        /// Name of the field to remove.
        #[arg(short, long)]
        name: String,
    },

    /// Replace an existing field with a new definition.
    AlterField {
        /// Name of the field to replace.
        #[arg(short, long)]
        name: String,

        /// JSON file with the new field definition.
        #[arg(short, long)]
        field: PathBuf,
    },

    /// Replace the table's composite uniqueness constraints.
    AlterUniqueTogether {
        /// Comma-separated field names of one constraint (repeatable).
        #[arg(short, long = "set")]
        sets: Vec<String>,
    },
}

fn load_field(path: &Path) -> anyhow::Result<Field> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading field definition {}", path.display()))?;
    Ok(serde_json::from_str(&contents)?)
}

fn find_field(table: &TableDefinition, name: &str) -> Result<Field, SchemaError> {
    table
        .get_field(name)
        .cloned()
        .ok_or_else(|| SchemaError::UnknownField {
            table: table.name.clone(),
            field: name.to_string(),
        })
}

async fn run(
    editor: &mut SchemaEditor<'_, SqliteDialect>,
    table: &TableDefinition,
    command: Commands,
) -> anyhow::Result<TableDefinition> {
    let updated = match command {
        Commands::AddField { field } => {
            let field = load_field(&field)?;
            editor.add_field(table, &field).await?
        }
        Commands::RemoveField { name } => {
            let field = find_field(table, &name)?;
            editor.remove_field(table, &field).await?
        }
        Commands::AlterField { name, field } => {
            let old = find_field(table, &name)?;
            let new = load_field(&field)?;
            editor.alter_field(table, &old, &new).await?
        }
        Commands::AlterUniqueTogether { sets } => {
            let uniques: Vec<Vec<String>> = sets
                .iter()
                .map(|set| set.split(',').map(|n| n.trim().to_string()).collect())
                .collect();
            editor
                .alter_unique_together(table, &table.unique_together, &uniques)
                .await?
        }
    };
    Ok(updated)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let table = TableDefinition::from_json_file(&cli.table)
        .with_context(|| format!("loading table definition {}", cli.table.display()))?;

    // Foreign keys cannot be switched off once the transaction is open.
    let options = SqliteConnectOptions::from_str(&cli.database)?
        .create_if_missing(true)
        .foreign_keys(false);
    let mut conn = SqliteConnection::connect_with(&options).await?;
    let mut tx = conn.begin().await?;

    let mut editor = SchemaEditor::new(&mut *tx, SqliteDialect::new()).dry_run(cli.dry_run);
    let updated = run(&mut editor, &table, cli.command).await?;
    editor.check_foreign_keys(&updated.name).await?;
    let statements = editor.finish().await?;

    if cli.dry_run {
        for sql in &statements {
            println!("{};", sql);
        }
        tx.rollback().await?;
    } else {
        tx.commit().await?;
        info!(table = %updated.name, "Schema change committed");
    }

    let json = updated.to_json()?;
    match cli.output {
        Some(path) => {
            std::fs::write(&path, json)?;
            info!("Wrote table definition to {}", path.display());
        }
        None if !cli.dry_run => println!("{}", json),
        None => {}
    }

    Ok(())
}

#![allow(dead_code)]

use oxide_schema::prelude::*;
use sqlx::{Connection, SqliteConnection};

pub async fn connect() -> SqliteConnection {
    SqliteConnection::connect("sqlite::memory:")
        .await
        .unwrap_or_else(|e| panic!("Failed to open in-memory SQLite connection: {e}"))
}

/// `T(id PK, name varchar)`.
pub fn people() -> TableDefinition {
    TableDefinition::new("crm", "people")
        .field(Field::auto_id())
        .field(Field::column("name", SqlType::Varchar(100)))
}

/// Creates `people` and fills it with `names`, ids counting from 1.
pub async fn seed_people(conn: &mut SqliteConnection, names: &[&str]) {
    let mut editor = SchemaEditor::new(&mut *conn, SqliteDialect::new());
    editor.create_table(&people()).await.unwrap();
    editor.finish().await.unwrap();
    for name in names {
        sqlx::query("INSERT INTO people (name) VALUES (?)")
            .bind(*name)
            .execute(&mut *conn)
            .await
            .unwrap();
    }
}

/// `pets(id PK, owner -> people.id)`.
pub fn pets() -> TableDefinition {
    TableDefinition::new("crm", "pets")
        .field(Field::auto_id())
        .field(Field::foreign_key("owner", "people", "id"))
}

/// Creates `pets` with one row owned by person `owner`.
pub async fn seed_pet(conn: &mut SqliteConnection, owner: i64) {
    let mut editor = SchemaEditor::new(&mut *conn, SqliteDialect::new());
    editor.create_table(&pets()).await.unwrap();
    editor.finish().await.unwrap();
    sqlx::query("INSERT INTO pets (owner_id) VALUES (?)")
        .bind(owner)
        .execute(&mut *conn)
        .await
        .unwrap();
}

pub async fn foreign_keys_enabled(conn: &mut SqliteConnection) -> bool {
    let (enabled,): (i64,) = sqlx::query_as("PRAGMA foreign_keys")
        .fetch_one(conn)
        .await
        .unwrap();
    enabled != 0
}

pub async fn columns(conn: &mut SqliteConnection, table: &str) -> Vec<String> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT name FROM pragma_table_info(?) ORDER BY cid")
        .bind(table)
        .fetch_all(conn)
        .await
        .unwrap();
    rows.into_iter().map(|(name,)| name).collect()
}

pub async fn primary_key_columns(conn: &mut SqliteConnection, table: &str) -> Vec<String> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT name FROM pragma_table_info(?) WHERE pk > 0 ORDER BY pk")
            .bind(table)
            .fetch_all(conn)
            .await
            .unwrap();
    rows.into_iter().map(|(name,)| name).collect()
}

pub async fn tables(conn: &mut SqliteConnection) -> Vec<String> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT name FROM sqlite_master WHERE type = 'table' \
         AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(conn)
    .await
    .unwrap();
    rows.into_iter().map(|(name,)| name).collect()
}

pub async fn indexes(conn: &mut SqliteConnection, table: &str) -> Vec<String> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT name FROM sqlite_master WHERE type = 'index' \
         AND tbl_name = ? AND sql IS NOT NULL ORDER BY name",
    )
    .bind(table)
    .fetch_all(conn)
    .await
    .unwrap();
    rows.into_iter().map(|(name,)| name).collect()
}

/// The stored CREATE TABLE statement.
pub async fn table_sql(conn: &mut SqliteConnection, table: &str) -> String {
    let row: (String,) =
        sqlx::query_as("SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(table)
            .fetch_one(conn)
            .await
            .unwrap();
    row.0
}

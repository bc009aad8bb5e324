//! Example: Evolving a blog's `posts` table on SQLite
//!
//! Every change below rebuilds the table: the SQL printed for each step
//! shows the create / copy / drop / rename cycle and the index statements
//! replayed against the final table.
//!
//! Run with: cargo run --example blog_rebuilds -p oxide-schema

use oxide_schema::prelude::*;
use sqlx::{Connection, SqliteConnection};

fn posts() -> TableDefinition {
    TableDefinition::new("blog", "posts")
        .field(Field::auto_id())
        .field(Field::column("title", SqlType::Varchar(200)))
        .field(Field::column("body", SqlType::Text))
        .field(Field::foreign_key("author", "users", "id"))
}

fn print_step(title: &str, sql: &[String]) {
    println!("{}", title);
    for statement in sql {
        println!("    {};", statement.replace('\n', " "));
    }
    println!();
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    println!("{}", "=".repeat(70));
    println!(" OXIDE-SCHEMA: Blog Table Rebuilds");
    println!("{}", "=".repeat(70));
    println!();

    let mut conn = SqliteConnection::connect("sqlite::memory:").await?;

    let mut editor = SchemaEditor::new(&mut conn, SqliteDialect::new());
    editor
        .execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
        .await?;
    editor.create_table(&posts()).await?;
    editor.finish().await?;

    sqlx::query("INSERT INTO users (id, name) VALUES (1, 'ada')")
        .execute(&mut conn)
        .await?;
    sqlx::query("INSERT INTO posts (title, body, author_id) VALUES ('Hello', 'First post', 1)")
        .execute(&mut conn)
        .await?;

    // [1] Add a nullable column
    let mut editor = SchemaEditor::new(&mut conn, SqliteDialect::new()).dry_run(true);
    let summary = Field::column("summary", SqlType::Varchar(300)).nullable();
    editor.add_field(&posts(), &summary).await?;
    print_step("[1] Add posts.summary", &editor.finish().await?);

    // [2] Widen the title
    let mut editor = SchemaEditor::new(&mut conn, SqliteDialect::new()).dry_run(true);
    let old = posts().get_field("title").cloned().ok_or("no title")?;
    let new = Field::column("title", SqlType::Text);
    editor.alter_field(&posts(), &old, &new).await?;
    print_step("[2] Retype posts.title", &editor.finish().await?);

    // [3] Titles unique per author
    let mut editor = SchemaEditor::new(&mut conn, SqliteDialect::new()).dry_run(true);
    let uniques = vec![vec!["title".to_string(), "author".to_string()]];
    editor.alter_unique_together(&posts(), &[], &uniques).await?;
    print_step("[3] unique_together (title, author)", &editor.finish().await?);

    // [4] A NOT NULL column without default is refused
    let mut editor = SchemaEditor::new(&mut conn, SqliteDialect::new());
    let views = Field::column("views", SqlType::Integer);
    match editor.add_field(&posts(), &views).await {
        Err(e) => println!("[4] Refused: {}\n", e),
        Ok(_) => println!("[4] Unexpectedly accepted\n"),
    }

    // [5] Apply for real
    let mut tx = conn.begin().await?;
    let mut editor = SchemaEditor::new(&mut *tx, SqliteDialect::new());
    let table = editor.add_field(&posts(), &summary).await?;
    editor.finish().await?;
    tx.commit().await?;

    let row: (String, Option<String>) = sqlx::query_as("SELECT title, summary FROM posts")
        .fetch_one(&mut conn)
        .await?;
    println!("[5] Applied; posts now has {} columns", table.column_names().count());
    println!("    Row preserved: {:?}", row);

    Ok(())
}

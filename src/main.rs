use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dbweave::{Configuration, Database};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dbweave")]
#[command(about = "Inspect and query a SQLite database through the dbweave engine")]
struct Cli {
    /// SQLite database file
    #[arg(long)]
    database: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the live columns of a table
    Scheme { table: String },
    /// Run a query and print the result table
    Query { sql: String },
    /// Run a statement and print the affected row count
    Exec { sql: String },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let path = cli.database.to_string_lossy();
    let db = Database::open(Configuration::sqlite(&path))
        .with_context(|| format!("failed to open {}", path))?;
    let mut conn = db.get_connection().context("failed to connect")?;

    match cli.command {
        Command::Scheme { table } => {
            let columns = conn
                .get_scheme(&table)
                .with_context(|| format!("failed to read the scheme of {}", table))?;
            if columns.is_empty() {
                println!("Table '{}' not found", table);
            }
            for column in columns {
                let size = column.size.map(|s| format!("({})", s)).unwrap_or_default();
                let null = if column.nullable { "NULL" } else { "NOT NULL" };
                println!("{:<24} {}{} {}", column.name, column.type_name, size, null);
            }
        }
        Command::Query { sql } => {
            let result = conn.query_raw(&sql, &[]).context("query failed")?;
            result.print();
        }
        Command::Exec { sql } => {
            let affected = conn.execute_raw(&sql, &[]).context("statement failed")?;
            println!("{} row(s) affected", affected);
        }
    }

    conn.close().context("failed to close the connection")?;
    Ok(())
}

use anyhow::{bail, Context, Result};
use rusqlite::{Connection, Transaction};

const CURRENT_SCHEMA_VERSION: i32 = 1;

pub fn run_migrations(conn: &mut Connection, table: &str) -> Result<()> {
    let mut version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read user_version pragma")?;

    if version > CURRENT_SCHEMA_VERSION {
        bail!(
            "database version ({}) is newer than supported schema ({})",
            version,
            CURRENT_SCHEMA_VERSION
        );
    }

    let tx = conn
        .transaction()
        .context("failed to open migration transaction")?;

    while version < CURRENT_SCHEMA_VERSION {
        let next_version = version + 1;
        apply_migration(&tx, next_version, table)
            .with_context(|| format!("migration to version {next_version} failed"))?;
        version = next_version;
    }

    // The schema version is per file, but the table name is configurable, so
    // a file migrated under another name still needs this table.
    create_slot_table(&tx, table)?;

    tx.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)
        .context("failed to update user_version pragma")?;
    tx.commit().context("failed to commit migrations")?;

    Ok(())
}

fn apply_migration(tx: &Transaction<'_>, version: i32, table: &str) -> Result<()> {
    match version {
        1 => create_slot_table(tx, table),
        _ => bail!("no migration defined for version {version}"),
    }
}

fn create_slot_table(tx: &Transaction<'_>, table: &str) -> Result<()> {
    tx.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {table} (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             slot INTEGER NOT NULL UNIQUE,
             status TEXT NOT NULL,
             jarak REAL NOT NULL DEFAULT 0,
             created_at TEXT NOT NULL
         );"
    ))
    .with_context(|| format!("failed to create slot table {table}"))
}

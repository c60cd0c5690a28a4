use sqlx::SqlitePool;

use crate::errors::{DbError, DbResult};

// Embed all migration SQL files at compile time
const MIGRATION_BOOKKEEPING: &str = include_str!("../migrations/20240601000000_bookkeeping.sql");
const MIGRATION_STORED_DOCUMENTS: &str = include_str!("../migrations/20240602000000_stored_documents.sql");

// List of migrations with their names and SQL content, in application order
const MIGRATIONS: &[(&str, &str)] = &[
    ("20240601000000_bookkeeping.sql", MIGRATION_BOOKKEEPING),
    ("20240602000000_stored_documents.sql", MIGRATION_STORED_DOCUMENTS),
];

/// Apply every migration not yet recorded in `schema_migrations`.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    log::info!("Starting database migration process");

    create_migrations_table(pool).await?;

    let last_migration = get_last_migration(pool).await?;
    match &last_migration {
        Some(name) => log::debug!("Last applied migration: {}", name),
        None => log::debug!("No migrations applied yet"),
    }

    apply_pending_migrations(pool, last_migration).await?;
    log::info!("Database migration process completed");
    Ok(())
}

async fn create_migrations_table(pool: &SqlitePool) -> DbResult<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await
    .map_err(|e| DbError::Migration(format!("Failed to create migrations table: {}", e)))?;

    Ok(())
}

async fn get_last_migration(pool: &SqlitePool) -> DbResult<Option<String>> {
    sqlx::query_scalar::<_, String>("SELECT name FROM schema_migrations ORDER BY id DESC LIMIT 1")
        .fetch_optional(pool)
        .await
        .map_err(|e| DbError::Migration(format!("Failed to get last migration: {}", e)))
}

async fn apply_pending_migrations(pool: &SqlitePool, last_migration: Option<String>) -> DbResult<()> {
    let pending = get_pending_migrations(last_migration.as_deref())?;
    if pending.is_empty() {
        log::debug!("No pending migrations to apply");
        return Ok(());
    }

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| DbError::Transaction(format!("Failed to begin transaction: {}", e)))?;

    for (migration_name, migration_sql) in pending {
        log::info!("Applying migration {}", migration_name);

        sqlx::query(migration_sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::Migration(format!("Failed to apply migration {}: {}", migration_name, e)))?;

        sqlx::query("INSERT INTO schema_migrations (name, applied_at) VALUES (?, ?)")
            .bind(migration_name)
            .bind(chrono::Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::Migration(format!("Failed to record migration {}: {}", migration_name, e)))?;
    }

    tx.commit()
        .await
        .map_err(|e| DbError::Transaction(format!("Failed to commit migrations: {}", e)))?;
    Ok(())
}

/// Migrations after the last applied one. An unknown last migration is an error.
fn get_pending_migrations(last_migration: Option<&str>) -> DbResult<Vec<(&'static str, &'static str)>> {
    let Some(last) = last_migration else {
        return Ok(MIGRATIONS.to_vec());
    };

    let position = MIGRATIONS
        .iter()
        .position(|(name, _)| *name == last)
        .ok_or_else(|| DbError::Migration(format!("Database has unknown migration {}", last)))?;

    Ok(MIGRATIONS[position + 1..].to_vec())
}

//! Database schema migrations
//!
//! Versioned schema migrations tracked in the `schema_version` table.
//! Migrations are idempotent and safe to run on every startup.
//!
//! # Migration Guidelines
//!
//! 1. **Never modify existing migrations** - databases in the field were built with them
//! 2. **Always add new migrations** - one function per schema change
//! 3. **Use ALTER TABLE / CREATE ... IF NOT EXISTS** - preserve existing data

use crate::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Current schema version
///
/// **IMPORTANT:** Increment this when adding new migrations
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Get current schema version from database
///
/// Returns 0 if schema_version table doesn't exist or has no rows
pub async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type='table' AND name='schema_version'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;

    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = get_schema_version(pool).await?;

    if current_version == CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current_version);
        return Ok(());
    }

    if current_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Database schema version ({}) is newer than code version ({})",
            current_version, CURRENT_SCHEMA_VERSION
        );
        return Ok(());
    }

    info!(
        "Running database migrations: v{} -> v{}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(pool).await?;
        set_schema_version(pool, 1).await?;
        info!("✓ Migration v1 completed");
    }

    if current_version < 2 {
        migrate_v2(pool).await?;
        set_schema_version(pool, 2).await?;
        info!("✓ Migration v2 completed");
    }

    Ok(())
}

/// Migration v1: lookup indexes for per-mix batch passes
async fn migrate_v1(pool: &SqlitePool) -> Result<()> {
    info!("Running migration v1: component and dataset indexes");

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_mix_components_mix_guid ON mix_components(mix_guid)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_mixes_dataset_code ON mixes(dataset_code)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Migration v2: ratio_corrections log for corrective runs
///
/// Each overwrite of a stored ratio appends one row, so a corrective run can
/// be traced after the fact.
async fn migrate_v2(pool: &SqlitePool) -> Result<()> {
    info!("Running migration v2: ratio_corrections table");

    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type='table' AND name='ratio_corrections'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if table_exists {
        info!("  ratio_corrections table already exists - skipping");
        return Ok(());
    }

    sqlx::query(
        r#"
        CREATE TABLE ratio_corrections (
            guid TEXT PRIMARY KEY,
            mix_guid TEXT NOT NULL REFERENCES mixes(guid) ON DELETE CASCADE,
            field TEXT NOT NULL,
            old_value TEXT,
            new_value TEXT NOT NULL,
            corrected_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX idx_ratio_corrections_mix_guid ON ratio_corrections(mix_guid)",
    )
    .execute(pool)
    .await?;

    info!("  ✓ Created ratio_corrections table");
    Ok(())
}

//! Database initialization
//!
//! Creates the normalized mix-design schema on first run and opens the
//! existing database afterwards. Every statement is idempotent, so opening a
//! database that is already initialized is safe.

use crate::db::models::MATERIAL_CLASSES;
use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Pragmas go on the connect options so every pooled connection gets them
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));

    // Batch runs are sequential; a small pool is enough
    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .min_connections(1)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    // Versioned migrations run after the base tables exist
    crate::db::migrations::run_migrations(&pool).await?;

    Ok(pool)
}

/// Create every base table and seed reference data
///
/// Split out from [`init_database`] so tests can build the schema on an
/// in-memory pool.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_datasets_table(pool).await?;
    create_material_classes_table(pool).await?;
    create_materials_table(pool).await?;
    create_mixes_table(pool).await?;
    create_mix_components_table(pool).await?;

    seed_material_classes(pool).await?;
    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_datasets_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS datasets (
            code TEXT PRIMARY KEY,
            name TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_material_classes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS material_classes (
            code TEXT PRIMARY KEY,
            description TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Materials are shared across mixes; identity is (class_code, subtype)
async fn create_materials_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS materials (
            guid TEXT PRIMARY KEY,
            class_code TEXT NOT NULL REFERENCES material_classes(code),
            subtype TEXT NOT NULL COLLATE NOCASE,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (class_code, subtype)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Ratio columns are TEXT so decimal values round-trip exactly
async fn create_mixes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS mixes (
            guid TEXT PRIMARY KEY,
            mix_code TEXT NOT NULL,
            dataset_code TEXT NOT NULL REFERENCES datasets(code),
            wc_ratio TEXT,
            wb_ratio TEXT,
            wb_ratio_k TEXT,
            uses_k_value INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (dataset_code, mix_code)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_mix_components_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS mix_components (
            guid TEXT PRIMARY KEY,
            mix_guid TEXT NOT NULL REFERENCES mixes(guid) ON DELETE CASCADE,
            material_guid TEXT NOT NULL REFERENCES materials(guid) ON DELETE RESTRICT,
            dosage_kg_m3 TEXT NOT NULL CHECK (CAST(dosage_kg_m3 AS REAL) >= 0),
            is_cementitious INTEGER NOT NULL DEFAULT 0,
            UNIQUE (mix_guid, material_guid)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn seed_material_classes(pool: &SqlitePool) -> Result<()> {
    for (code, description) in MATERIAL_CLASSES {
        sqlx::query("INSERT OR IGNORE INTO material_classes (code, description) VALUES (?, ?)")
            .bind(*code)
            .bind(*description)
            .execute(pool)
            .await?;
    }

    debug!("Material classes seeded ({})", MATERIAL_CLASSES.len());
    Ok(())
}

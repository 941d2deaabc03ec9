//! End-to-end tests against a SQLite file
//!
//! Import a small dataset, then run audit, correction and flag
//! reconciliation passes through real batch transactions.

use mixdb_audit::import::{import_files, ImportSummary};
use mixdb_audit::store::MixSink;
use mixdb_audit::{
    audit, correct, reconcile_flags, AuditError, Disposition, IssueCode, MixSource, SqliteBatch,
};
use mixdb_common::db::init_database;
use mixdb_common::{Error, ReconcileConfig};
use rust_decimal::Decimal;
use sqlx::SqlitePool;
use std::str::FromStr;
use tempfile::TempDir;

const MIXES_CSV: &str = "\
dataset,mix_code,wc_ratio,wb_ratio,wb_ratio_k,uses_k_value
DS1,M1,0.60,0.46,,0
DS1,M2,,0.50,,0
DS1,M3,,0.50,,1
DS1,M4,0.5,0.5,,
DS2,X1,0.55,,,no
";

const COMPONENTS_CSV: &str = "\
dataset,mix_code,material_class,material_subtype,dosage_kg_m3
DS1,M1,WATER,,180
DS1,M1,CEMENT,CEM I 42.5R,300
DS1,M1,SCM,Fly ash,90
DS1,M1,SCM,Limestone powder,40
DS1,M2,WATER,,212
DS1,M2,CEMENT,CEM I 42.5R,300
DS1,M2,SCM,GGBS,100
DS1,M3,WATER,,212
DS1,M3,CEMENT,CEM I 42.5R,300
DS1,M3,SCM,GGBS,100
DS1,M9,WATER,,100
DS1,M1,UNOBTAINIUM,x,5
DS1,M2,ADM,superplasticizer,-1
DS2,X1,WATER,,165
DS2,X1,CEMENT,cem i 42.5r,300
";

async fn import(pool: &SqlitePool, dir: &TempDir) -> ImportSummary {
    let mixes = dir.path().join("mixes.csv");
    let components = dir.path().join("components.csv");
    std::fs::write(&mixes, MIXES_CSV).unwrap();
    std::fs::write(&components, COMPONENTS_CSV).unwrap();

    let mut batch = SqliteBatch::begin(pool).await.unwrap();
    let outcome = import_files(&mut batch, &mixes, &components).await;
    batch.finish(outcome, Disposition::Commit).await.unwrap()
}

async fn seeded() -> (TempDir, SqlitePool) {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("mixdb.db")).await.unwrap();
    import(&pool, &dir).await;
    (dir, pool)
}

async fn stored_wb(pool: &SqlitePool, mix_code: &str) -> Option<String> {
    sqlx::query_scalar("SELECT wb_ratio FROM mixes WHERE mix_code = ?")
        .bind(mix_code)
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn run_correct(pool: &SqlitePool, disposition: Disposition) -> mixdb_audit::CorrectionReport {
    let mut batch = SqliteBatch::begin(pool).await.unwrap();
    let outcome = correct(&mut batch, None, &ReconcileConfig::default()).await;
    batch.finish(outcome, disposition).await.unwrap()
}

#[tokio::test]
async fn test_import_skips_invalid_rows() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("mixdb.db")).await.unwrap();

    let summary = import(&pool, &dir).await;

    assert_eq!(summary.datasets_created, 2);
    assert_eq!(summary.mixes, 5);
    assert_eq!(summary.components, 12);
    // Subtype matching is case-insensitive, so X1's cement reuses M1's material
    assert_eq!(summary.materials_created, 5);
    assert_eq!(summary.skipped.len(), 3);
    let reasons: Vec<&str> = summary.skipped.iter().map(|s| s.reason.as_str()).collect();
    assert!(reasons.iter().any(|r| r.contains("unknown mix M9")));
    assert!(reasons.iter().any(|r| r.contains("unknown material class")));
    assert!(reasons.iter().any(|r| r.contains("negative")));

    // Flags come from the classifier: 4 cements, fly ash and 2 x GGBS
    let cementitious: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM mix_components WHERE is_cementitious = 1")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(cementitious, 7);
}

#[tokio::test]
async fn test_reimport_creates_no_duplicates() {
    let (dir, pool) = seeded().await;

    let second = import(&pool, &dir).await;

    assert_eq!(second.datasets_created, 0);
    assert_eq!(second.materials_created, 0);
    assert_eq!(count(&pool, "mixes").await, 5);
    assert_eq!(count(&pool, "materials").await, 5);
    assert_eq!(count(&pool, "mix_components").await, 12);
}

#[tokio::test]
async fn test_audit_reports_mismatch_and_missing_data() {
    let (_dir, pool) = seeded().await;

    let mut batch = SqliteBatch::begin(&pool).await.unwrap();
    let outcome = audit(&mut batch, None, &ReconcileConfig::default()).await;
    let report = batch.finish(outcome, Disposition::Discard).await.unwrap();

    assert_eq!(report.summary.processed, 5);
    assert_eq!(report.summary.flagged, 1);
    assert_eq!(report.summary.no_data, 1);
    assert_eq!(report.summary.failed, 0);

    let found: Vec<(&str, IssueCode)> = report
        .issues
        .iter()
        .map(|i| (i.mix_code.as_str(), i.issue_code))
        .collect();
    assert_eq!(
        found,
        vec![("M2", IssueCode::WbRatioMismatch), ("M4", IssueCode::CannotCalculate)]
    );
}

#[tokio::test]
async fn test_audit_dataset_filter() {
    let (_dir, pool) = seeded().await;

    let mut batch = SqliteBatch::begin(&pool).await.unwrap();
    let outcome = audit(&mut batch, Some("DS2"), &ReconcileConfig::default()).await;
    let report = batch.finish(outcome, Disposition::Discard).await.unwrap();

    assert_eq!(report.summary.processed, 1);
    assert!(report.issues.is_empty());
}

#[tokio::test]
async fn test_correct_twice_is_idempotent() {
    let (_dir, pool) = seeded().await;

    let first = run_correct(&pool, Disposition::Commit).await;
    assert_eq!(first.summary.corrected, 3);
    assert_eq!(stored_wb(&pool, "M1").await.as_deref(), Some("0.462"));
    assert_eq!(stored_wb(&pool, "M2").await.as_deref(), Some("0.530"));
    assert_eq!(stored_wb(&pool, "X1").await.as_deref(), Some("0.550"));
    // k-value mix keeps its reported value
    assert_eq!(stored_wb(&pool, "M3").await.as_deref(), Some("0.50"));
    assert_eq!(count(&pool, "ratio_corrections").await, 3);

    let second = run_correct(&pool, Disposition::Commit).await;
    assert_eq!(second.summary.corrected, 0);
    assert_eq!(count(&pool, "ratio_corrections").await, 3);

    // Corrected values no longer trip the audit
    let mut batch = SqliteBatch::begin(&pool).await.unwrap();
    let outcome = audit(&mut batch, None, &ReconcileConfig::default()).await;
    let report = batch.finish(outcome, Disposition::Discard).await.unwrap();
    assert_eq!(report.summary.flagged, 0);
}

#[tokio::test]
async fn test_correct_dry_run_leaves_database_unchanged() {
    let (_dir, pool) = seeded().await;

    let report = run_correct(&pool, Disposition::Discard).await;

    assert_eq!(report.summary.corrected, 3);
    assert_eq!(stored_wb(&pool, "M2").await.as_deref(), Some("0.50"));
    assert_eq!(stored_wb(&pool, "X1").await, None);
    assert_eq!(count(&pool, "ratio_corrections").await, 0);
}

#[tokio::test]
async fn test_failed_batch_rolls_back_earlier_writes() {
    let (_dir, pool) = seeded().await;

    let mut batch = SqliteBatch::begin(&pool).await.unwrap();
    let keys = batch.list_mixes(Some("DS1")).await.unwrap();
    let m2 = keys.iter().find(|k| k.mix_code == "M2").unwrap().clone();
    batch
        .update_wb_ratio(&m2, None, Decimal::from_str("0.530").unwrap())
        .await
        .unwrap();

    let outcome: Result<(), AuditError> =
        Err(Error::Internal("simulated write failure".to_string()).into());
    let result = batch.finish(outcome, Disposition::Commit).await;

    assert!(result.is_err());
    assert_eq!(stored_wb(&pool, "M2").await.as_deref(), Some("0.50"));
    assert_eq!(count(&pool, "ratio_corrections").await, 0);
}

#[tokio::test]
async fn test_reclassify_fixes_stale_flags() {
    let (_dir, pool) = seeded().await;

    // Mark limestone as cementitious, the way an old keyword list did
    sqlx::query(
        r#"
        UPDATE mix_components SET is_cementitious = 1
        WHERE material_guid IN (SELECT guid FROM materials WHERE subtype LIKE '%limestone%')
        "#,
    )
    .execute(&pool)
    .await
    .unwrap();

    let mut batch = SqliteBatch::begin(&pool).await.unwrap();
    let outcome = reconcile_flags(&mut batch, None).await;
    let result = batch.finish(outcome, Disposition::Commit).await.unwrap();

    assert_eq!(result.checked, 12);
    assert_eq!(result.updated, 1);
    assert_eq!(result.changes[0].mix_code, "M1");
    assert!(!result.changes[0].is_cementitious);

    let mut batch = SqliteBatch::begin(&pool).await.unwrap();
    let outcome = reconcile_flags(&mut batch, None).await;
    let again = batch.finish(outcome, Disposition::Commit).await.unwrap();
    assert_eq!(again.updated, 0);
}

//! SQLite-backed store scoped to one batch transaction
//!
//! A batch is one logical run. It commits only when the run finishes
//! normally; an error or a dry run rolls everything back. Dropping an
//! unfinished batch also rolls back.

use super::{ComponentFlag, MixKey, MixRecord, MixSink, MixSource};
use async_trait::async_trait;
use mixdb_common::db::{parse_decimal, parse_optional_decimal, Mix, MixComponent};
use mixdb_common::{Error, Result};
use rust_decimal::Decimal;
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How a finished batch ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Commit,
    Discard,
}

impl Disposition {
    pub fn from_dry_run(dry_run: bool) -> Self {
        if dry_run {
            Disposition::Discard
        } else {
            Disposition::Commit
        }
    }
}

type MixRow = (String, String, String, Option<String>, Option<String>, Option<String>, bool);
type ComponentRow = (String, String, String, String, bool);
type FlagRow = (String, String, String, String, bool);

pub struct SqliteBatch {
    tx: Transaction<'static, Sqlite>,
    writes: usize,
}

impl SqliteBatch {
    /// Open the batch transaction
    pub async fn begin(pool: &SqlitePool) -> Result<Self> {
        let tx = pool.begin().await?;
        debug!("Batch transaction started");
        Ok(Self { tx, writes: 0 })
    }

    /// Connection inside the batch, for callers issuing their own statements
    pub fn connection(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    /// Record a write made through [`Self::connection`]
    pub fn note_write(&mut self) {
        self.writes += 1;
    }

    /// End the batch according to the run outcome
    ///
    /// `Ok` with `Commit` commits. `Ok` with `Discard` rolls back and still
    /// returns the value. `Err` rolls back and returns the run error unchanged.
    pub async fn finish<T, E>(
        self,
        outcome: std::result::Result<T, E>,
        disposition: Disposition,
    ) -> std::result::Result<T, E>
    where
        E: From<Error>,
    {
        let writes = self.writes;
        match outcome {
            Ok(value) => {
                match disposition {
                    Disposition::Commit => {
                        self.tx.commit().await.map_err(Error::from)?;
                        info!("Batch committed ({} writes)", writes);
                    }
                    Disposition::Discard => {
                        self.tx.rollback().await.map_err(Error::from)?;
                        info!("Batch discarded ({} writes rolled back)", writes);
                    }
                }
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = self.tx.rollback().await {
                    warn!("Rollback after failed batch also failed: {}", rollback_err);
                } else {
                    warn!("Batch rolled back after error ({} writes undone)", writes);
                }
                Err(e)
            }
        }
    }
}

fn mix_from_row(row: MixRow) -> Result<Mix> {
    let (guid, mix_code, dataset_code, wc, wb, wb_k, uses_k_value) = row;
    Ok(Mix {
        wc_ratio: parse_optional_decimal("wc_ratio", wc.as_deref())?,
        wb_ratio: parse_optional_decimal("wb_ratio", wb.as_deref())?,
        wb_ratio_k: parse_optional_decimal("wb_ratio_k", wb_k.as_deref())?,
        guid,
        mix_code,
        dataset_code,
        uses_k_value,
    })
}

#[async_trait]
impl MixSource for SqliteBatch {
    async fn list_mixes(&mut self, dataset: Option<&str>) -> Result<Vec<MixKey>> {
        let rows: Vec<(String, String, String)> = match dataset {
            Some(code) => {
                sqlx::query_as(
                    "SELECT guid, mix_code, dataset_code FROM mixes WHERE dataset_code = ? ORDER BY mix_code",
                )
                .bind(code)
                .fetch_all(&mut *self.tx)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT guid, mix_code, dataset_code FROM mixes ORDER BY dataset_code, mix_code",
                )
                .fetch_all(&mut *self.tx)
                .await?
            }
        };

        Ok(rows
            .into_iter()
            .map(|(guid, mix_code, dataset_code)| MixKey { guid, mix_code, dataset_code })
            .collect())
    }

    async fn load_mix(&mut self, key: &MixKey) -> Result<Option<MixRecord>> {
        let row: Option<MixRow> = sqlx::query_as(
            r#"
            SELECT guid, mix_code, dataset_code, wc_ratio, wb_ratio, wb_ratio_k, uses_k_value
            FROM mixes WHERE guid = ?
            "#,
        )
        .bind(&key.guid)
        .fetch_optional(&mut *self.tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mix = mix_from_row(row)?;

        let component_rows: Vec<ComponentRow> = sqlx::query_as(
            r#"
            SELECT c.guid, m.class_code, m.subtype, c.dosage_kg_m3, c.is_cementitious
            FROM mix_components c
            JOIN materials m ON m.guid = c.material_guid
            WHERE c.mix_guid = ?
            ORDER BY m.class_code, m.subtype
            "#,
        )
        .bind(&key.guid)
        .fetch_all(&mut *self.tx)
        .await?;

        let mut components = Vec::with_capacity(component_rows.len());
        for (guid, class_code, subtype, dosage, is_cementitious) in component_rows {
            components.push(MixComponent {
                dosage_kg_m3: parse_decimal("dosage_kg_m3", &dosage)?,
                guid,
                class_code,
                subtype,
                is_cementitious,
            });
        }

        Ok(Some(MixRecord { mix, components }))
    }

    async fn list_component_flags(&mut self, dataset: Option<&str>) -> Result<Vec<ComponentFlag>> {
        let base = r#"
            SELECT c.guid, x.mix_code, m.class_code, m.subtype, c.is_cementitious
            FROM mix_components c
            JOIN mixes x ON x.guid = c.mix_guid
            JOIN materials m ON m.guid = c.material_guid
        "#;

        let rows: Vec<FlagRow> = match dataset {
            Some(code) => {
                let sql = format!("{} WHERE x.dataset_code = ? ORDER BY x.mix_code, m.class_code", base);
                sqlx::query_as(&sql).bind(code).fetch_all(&mut *self.tx).await?
            }
            None => {
                let sql = format!("{} ORDER BY x.dataset_code, x.mix_code, m.class_code", base);
                sqlx::query_as(&sql).fetch_all(&mut *self.tx).await?
            }
        };

        Ok(rows
            .into_iter()
            .map(|(component_guid, mix_code, class_code, subtype, is_cementitious)| ComponentFlag {
                component_guid,
                mix_code,
                class_code,
                subtype,
                is_cementitious,
            })
            .collect())
    }
}

#[async_trait]
impl MixSink for SqliteBatch {
    async fn update_wb_ratio(
        &mut self,
        key: &MixKey,
        previous: Option<Decimal>,
        value: Decimal,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE mixes SET wb_ratio = ?, updated_at = CURRENT_TIMESTAMP WHERE guid = ?",
        )
        .bind(value.to_string())
        .bind(&key.guid)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("mix {} ({})", key.mix_code, key.guid)));
        }

        sqlx::query(
            r#"
            INSERT INTO ratio_corrections (guid, mix_guid, field, old_value, new_value)
            VALUES (?, ?, 'wb_ratio', ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&key.guid)
        .bind(previous.map(|p| p.to_string()))
        .bind(value.to_string())
        .execute(&mut *self.tx)
        .await?;

        self.writes += 1;
        Ok(())
    }

    async fn set_cementitious_flag(&mut self, component_guid: &str, is_cementitious: bool) -> Result<()> {
        let result = sqlx::query("UPDATE mix_components SET is_cementitious = ? WHERE guid = ?")
            .bind(is_cementitious)
            .bind(component_guid)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("mix component {}", component_guid)));
        }

        self.writes += 1;
        Ok(())
    }
}

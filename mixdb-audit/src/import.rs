//! Dataset importer
//!
//! Loads a mixes CSV and a components CSV into the normalized schema inside
//! one batch. Import is repeatable: mixes are keyed by (dataset, mix_code),
//! materials by (class, subtype) and components by (mix, material), so a
//! second import of the same files updates rows in place.
//!
//! Invalid rows (unknown class, bad or negative dosage, unknown mix,
//! malformed cells) are logged and skipped. Database errors abort the import.

use crate::classifier::{classify_class, MaterialClass};
use crate::error::AuditResult;
use crate::store::SqliteBatch;
use mixdb_common::db::{parse_decimal, parse_optional_decimal};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Row of the mixes CSV
#[derive(Debug, Clone, Deserialize)]
pub struct MixRow {
    pub dataset: String,
    pub mix_code: String,
    #[serde(default)]
    pub wc_ratio: Option<String>,
    #[serde(default)]
    pub wb_ratio: Option<String>,
    #[serde(default)]
    pub wb_ratio_k: Option<String>,
    #[serde(default)]
    pub uses_k_value: Option<String>,
}

/// Row of the components CSV
#[derive(Debug, Clone, Deserialize)]
pub struct ComponentRow {
    pub dataset: String,
    pub mix_code: String,
    pub material_class: String,
    #[serde(default)]
    pub material_subtype: Option<String>,
    pub dosage_kg_m3: String,
}

/// A row left out of the import
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedRow {
    pub file: String,
    pub line: u64,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportSummary {
    pub datasets_created: usize,
    pub mixes: usize,
    pub materials_created: usize,
    pub components: usize,
    pub skipped: Vec<SkippedRow>,
}

impl ImportSummary {
    pub fn display_string(&self) -> String {
        format!(
            "datasets_created={}, mixes={}, materials_created={}, components={}, skipped={}",
            self.datasets_created,
            self.mixes,
            self.materials_created,
            self.components,
            self.skipped.len()
        )
    }

    fn skip(&mut self, file: &str, line: u64, reason: String) {
        warn!("Skipping {} line {}: {}", file, line, reason);
        self.skipped.push(SkippedRow {
            file: file.to_string(),
            line,
            reason,
        });
    }
}

/// Import both files; mixes first so component rows can resolve them
pub async fn import_files(
    batch: &mut SqliteBatch,
    mixes_csv: &Path,
    components_csv: &Path,
) -> AuditResult<ImportSummary> {
    info!(
        "Importing mixes from {} and components from {}",
        mixes_csv.display(),
        components_csv.display()
    );
    let mut summary = ImportSummary::default();
    import_mixes(batch, File::open(mixes_csv)?, &mut summary).await?;
    import_components(batch, File::open(components_csv)?, &mut summary).await?;
    info!("Import finished: {}", summary.display_string());
    Ok(summary)
}

fn csv_reader<R: Read>(input: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(input)
}

/// Read every record, skipping malformed ones; IO failures abort
fn read_rows<R, T>(input: R, file: &str, summary: &mut ImportSummary) -> AuditResult<Vec<(u64, T)>>
where
    R: Read,
    T: for<'de> Deserialize<'de>,
{
    let mut reader = csv_reader(input);
    let headers = reader.headers()?.clone();
    let mut rows = Vec::new();

    for (index, record) in reader.records().enumerate() {
        let fallback_line = index as u64 + 2;
        let record = match record {
            Ok(record) => record,
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                summary.skip(file, fallback_line, e.to_string());
                continue;
            }
        };
        let line = record.position().map_or(fallback_line, |p| p.line());
        match record.deserialize::<T>(Some(&headers)) {
            Ok(row) => rows.push((line, row)),
            Err(e) => summary.skip(file, line, e.to_string()),
        }
    }

    Ok(rows)
}

/// Accepts 1/0, true/false, yes/no; empty means false
pub fn parse_flag(raw: Option<&str>) -> Option<bool> {
    match raw.map(|s| s.trim().to_lowercase()).as_deref() {
        None | Some("") | Some("0") | Some("false") | Some("no") | Some("n") => Some(false),
        Some("1") | Some("true") | Some("yes") | Some("y") => Some(true),
        _ => None,
    }
}

struct ParsedMix {
    wc_ratio: Option<Decimal>,
    wb_ratio: Option<Decimal>,
    wb_ratio_k: Option<Decimal>,
    uses_k_value: bool,
}

fn parse_mix_row(row: &MixRow) -> Result<ParsedMix, String> {
    if row.dataset.is_empty() || row.mix_code.is_empty() {
        return Err("dataset and mix_code are required".to_string());
    }
    let uses_k_value = parse_flag(row.uses_k_value.as_deref()).ok_or_else(|| {
        format!(
            "uses_k_value = '{}' is not a flag",
            row.uses_k_value.as_deref().unwrap_or_default()
        )
    })?;
    Ok(ParsedMix {
        wc_ratio: parse_optional_decimal("wc_ratio", row.wc_ratio.as_deref()).map_err(|e| e.to_string())?,
        wb_ratio: parse_optional_decimal("wb_ratio", row.wb_ratio.as_deref()).map_err(|e| e.to_string())?,
        wb_ratio_k: parse_optional_decimal("wb_ratio_k", row.wb_ratio_k.as_deref())
            .map_err(|e| e.to_string())?,
        uses_k_value,
    })
}

/// Upsert mixes keyed by (dataset, mix_code)
pub async fn import_mixes<R: Read>(
    batch: &mut SqliteBatch,
    input: R,
    summary: &mut ImportSummary,
) -> AuditResult<()> {
    const FILE: &str = "mixes";

    for (line, row) in read_rows::<_, MixRow>(input, FILE, summary)? {
        let parsed = match parse_mix_row(&row) {
            Ok(parsed) => parsed,
            Err(reason) => {
                summary.skip(FILE, line, reason);
                continue;
            }
        };

        let created = sqlx::query("INSERT OR IGNORE INTO datasets (code) VALUES (?)")
            .bind(&row.dataset)
            .execute(batch.connection())
            .await?;
        if created.rows_affected() > 0 {
            debug!("Created dataset {}", row.dataset);
            summary.datasets_created += 1;
            batch.note_write();
        }

        sqlx::query(
            r#"
            INSERT INTO mixes (guid, mix_code, dataset_code, wc_ratio, wb_ratio, wb_ratio_k, uses_k_value)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (dataset_code, mix_code) DO UPDATE SET
                wc_ratio = excluded.wc_ratio,
                wb_ratio = excluded.wb_ratio,
                wb_ratio_k = excluded.wb_ratio_k,
                uses_k_value = excluded.uses_k_value,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&row.mix_code)
        .bind(&row.dataset)
        .bind(parsed.wc_ratio.map(|d| d.to_string()))
        .bind(parsed.wb_ratio.map(|d| d.to_string()))
        .bind(parsed.wb_ratio_k.map(|d| d.to_string()))
        .bind(parsed.uses_k_value)
        .execute(batch.connection())
        .await?;

        batch.note_write();
        summary.mixes += 1;
    }

    Ok(())
}

async fn find_mix_guid(batch: &mut SqliteBatch, dataset: &str, mix_code: &str) -> AuditResult<Option<String>> {
    let guid: Option<(String,)> =
        sqlx::query_as("SELECT guid FROM mixes WHERE dataset_code = ? AND mix_code = ?")
            .bind(dataset)
            .bind(mix_code)
            .fetch_optional(batch.connection())
            .await?;
    Ok(guid.map(|(g,)| g))
}

/// Existing material guid, or a newly inserted one
async fn get_or_create_material(
    batch: &mut SqliteBatch,
    class: &MaterialClass,
    subtype: &str,
    summary: &mut ImportSummary,
) -> AuditResult<String> {
    let existing: Option<(String,)> =
        sqlx::query_as("SELECT guid FROM materials WHERE class_code = ? AND subtype = ?")
            .bind(class.code())
            .bind(subtype)
            .fetch_optional(batch.connection())
            .await?;
    if let Some((guid,)) = existing {
        return Ok(guid);
    }

    let guid = Uuid::new_v4().to_string();
    sqlx::query("INSERT INTO materials (guid, class_code, subtype) VALUES (?, ?, ?)")
        .bind(&guid)
        .bind(class.code())
        .bind(subtype)
        .execute(batch.connection())
        .await?;

    debug!("Created material {} '{}'", class, subtype);
    batch.note_write();
    summary.materials_created += 1;
    Ok(guid)
}

fn parse_dosage(raw: &str) -> Result<Decimal, String> {
    let dosage = parse_decimal("dosage_kg_m3", raw).map_err(|e| e.to_string())?;
    if dosage.is_sign_negative() && !dosage.is_zero() {
        return Err(format!("dosage_kg_m3 = {} is negative", dosage));
    }
    Ok(dosage)
}

/// Upsert components keyed by (mix, material)
///
/// A pair that appears twice keeps the dosage of the later row.
pub async fn import_components<R: Read>(
    batch: &mut SqliteBatch,
    input: R,
    summary: &mut ImportSummary,
) -> AuditResult<()> {
    const FILE: &str = "components";

    for (line, row) in read_rows::<_, ComponentRow>(input, FILE, summary)? {
        let class = MaterialClass::from_code(&row.material_class);
        if !class.is_known() {
            summary.skip(FILE, line, format!("unknown material class '{}'", row.material_class));
            continue;
        }

        let dosage = match parse_dosage(&row.dosage_kg_m3) {
            Ok(dosage) => dosage,
            Err(reason) => {
                summary.skip(FILE, line, reason);
                continue;
            }
        };

        let Some(mix_guid) = find_mix_guid(batch, &row.dataset, &row.mix_code).await? else {
            summary.skip(
                FILE,
                line,
                format!("unknown mix {} in dataset {}", row.mix_code, row.dataset),
            );
            continue;
        };

        let subtype = row.material_subtype.as_deref().unwrap_or_default();
        let material_guid = get_or_create_material(batch, &class, subtype, summary).await?;
        let is_cementitious = classify_class(&class, subtype).is_cementitious();

        sqlx::query(
            r#"
            INSERT INTO mix_components (guid, mix_guid, material_guid, dosage_kg_m3, is_cementitious)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (mix_guid, material_guid) DO UPDATE SET
                dosage_kg_m3 = excluded.dosage_kg_m3,
                is_cementitious = excluded.is_cementitious
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&mix_guid)
        .bind(&material_guid)
        .bind(dosage.to_string())
        .bind(is_cementitious)
        .execute(batch.connection())
        .await?;

        batch.note_write();
        summary.components += 1;
    }

    Ok(())
}

//! Run summaries and report files
//!
//! Detail and correction reports are CSV files with fixed columns. The run
//! summary can also be exported as JSON for downstream tooling.

use crate::error::AuditResult;
use crate::reconcile::{FlaggedIssue, WbCorrection};
use crate::ratios::format_ratio;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use uuid::Uuid;

const ISSUE_COLUMNS: [&str; 3] = ["mix_code", "issue_code", "issue_description"];
const CORRECTION_COLUMNS: [&str; 4] = ["mix_code", "field", "old_value", "new_value"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Audit,
    Correct,
}

/// Counters for one audit or correction run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub mode: RunMode,
    pub dataset: Option<String>,
    pub started_at: DateTime<Utc>,
    /// Mixes loaded and evaluated
    pub processed: usize,
    /// Mixes with at least one mismatch or range finding
    pub flagged: usize,
    /// Mixes whose stored w/b was overwritten
    pub corrected: usize,
    /// Mixes without components or without binder
    pub no_data: usize,
    /// Mixes that could not be read
    pub failed: usize,
}

impl RunSummary {
    pub fn new(mode: RunMode, dataset: Option<&str>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            mode,
            dataset: dataset.map(str::to_string),
            started_at: Utc::now(),
            processed: 0,
            flagged: 0,
            corrected: 0,
            no_data: 0,
            failed: 0,
        }
    }

    /// One-line summary for logs and the terminal
    pub fn display_string(&self) -> String {
        format!(
            "processed={}, flagged={}, corrected={}, no_data={}, failed={}",
            self.processed, self.flagged, self.corrected, self.no_data, self.failed
        )
    }

    /// Write the summary as pretty-printed JSON
    pub fn export_json<P: AsRef<Path>>(&self, path: P) -> AuditResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

/// One row of the correction report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionRow {
    pub mix_code: String,
    pub field: String,
    pub old_value: String,
    pub new_value: String,
}

impl CorrectionRow {
    pub fn from_correction(correction: &WbCorrection, storage_places: u32) -> Self {
        Self {
            mix_code: correction.key.mix_code.clone(),
            field: "wb_ratio".to_string(),
            old_value: correction
                .previous
                .map(|v| v.to_string())
                .unwrap_or_default(),
            new_value: format_ratio(correction.value, storage_places),
        }
    }
}

/// Write rows under a fixed header; the header is written even with no rows
fn write_rows<P, T>(path: P, header: &[&str], rows: impl IntoIterator<Item = T>) -> AuditResult<usize>
where
    P: AsRef<Path>,
    T: Serialize,
{
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    wtr.write_record(header)?;

    let mut count = 0;
    for row in rows {
        wtr.serialize(row)?;
        count += 1;
    }
    wtr.flush()?;
    Ok(count)
}

/// Detail report: `mix_code,issue_code,issue_description`
pub fn write_issues_csv<P: AsRef<Path>>(path: P, issues: &[FlaggedIssue]) -> AuditResult<usize> {
    write_rows(path, &ISSUE_COLUMNS, issues)
}

/// Correction report: `mix_code,field,old_value,new_value`
pub fn write_corrections_csv<P: AsRef<Path>>(
    path: P,
    corrections: &[WbCorrection],
    storage_places: u32,
) -> AuditResult<usize> {
    write_rows(
        path,
        &CORRECTION_COLUMNS,
        corrections
            .iter()
            .map(|c| CorrectionRow::from_correction(c, storage_places)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::IssueCode;
    use crate::store::MixKey;
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use tempfile::TempDir;

    fn key(code: &str) -> MixKey {
        MixKey {
            guid: format!("guid-{}", code),
            mix_code: code.to_string(),
            dataset_code: "DS1".to_string(),
        }
    }

    #[test]
    fn test_issue_report_columns_and_codes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("issues.csv");
        let issues = vec![FlaggedIssue {
            mix_code: "M2".to_string(),
            issue_code: IssueCode::WbRatioMismatch,
            issue_description: "Calculated w/b 0.53 differs from reported 0.50".to_string(),
        }];

        assert_eq!(write_issues_csv(&path, &issues).unwrap(), 1);

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("mix_code,issue_code,issue_description"));
        assert_eq!(
            lines.next(),
            Some("M2,WB_RATIO_MISMATCH,Calculated w/b 0.53 differs from reported 0.50")
        );
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_failed_mixes_use_issue_columns() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("failures.csv");
        let failures = vec![
            FlaggedIssue {
                mix_code: "A".to_string(),
                issue_code: IssueCode::ReadFailed,
                issue_description: "mix no longer exists".to_string(),
            },
            FlaggedIssue {
                mix_code: "B".to_string(),
                issue_code: IssueCode::DosageOverflow,
                issue_description: "cement dosage total overflows".to_string(),
            },
        ];

        write_issues_csv(&path, &failures).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines,
            vec![
                "mix_code,issue_code,issue_description",
                "A,READ_FAILED,mix no longer exists",
                "B,DOSAGE_OVERFLOW,cement dosage total overflows",
            ]
        );
    }

    #[test]
    fn test_empty_report_still_has_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("issues.csv");

        assert_eq!(write_issues_csv(&path, &[]).unwrap(), 0);
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.trim_end(), "mix_code,issue_code,issue_description");
    }

    #[test]
    fn test_correction_report_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("corrections.csv");
        let corrections = vec![
            WbCorrection {
                key: key("A"),
                previous: Some(Decimal::from_str("0.50").unwrap()),
                value: Decimal::from_str("0.462").unwrap(),
            },
            WbCorrection {
                key: key("B"),
                previous: None,
                value: Decimal::from_str("0.4").unwrap(),
            },
        ];

        write_corrections_csv(&path, &corrections, 3).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines,
            vec![
                "mix_code,field,old_value,new_value",
                "A,wb_ratio,0.50,0.462",
                "B,wb_ratio,,0.400",
            ]
        );
    }

    #[test]
    fn test_summary_json_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("summary.json");
        let mut summary = RunSummary::new(RunMode::Correct, Some("DS1"));
        summary.processed = 4;
        summary.corrected = 2;

        summary.export_json(&path).unwrap();
        let loaded: RunSummary =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();

        assert_eq!(loaded.run_id, summary.run_id);
        assert_eq!(loaded.mode, RunMode::Correct);
        assert_eq!(loaded.dataset.as_deref(), Some("DS1"));
        assert_eq!(loaded.corrected, 2);
        assert_eq!(
            loaded.display_string(),
            "processed=4, flagged=0, corrected=2, no_data=0, failed=0"
        );
    }
}

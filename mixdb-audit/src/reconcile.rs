//! Ratio reconciliation
//!
//! Compares calculated w/c and w/b against the ratios stored on each mix.
//!
//! Two operations, never combined:
//! - [`audit`] reads only and returns flagged issues
//! - [`correct`] overwrites stored w/b with the calculated value
//!
//! Rules:
//! - Mismatch checks round both sides to `comparison_rounding_places` and
//!   flag when the difference exceeds `mismatch_tolerance`.
//! - Mixes designed with the k-value convention skip the w/b comparison and
//!   are never w/b-corrected. The w/c plausibility range still applies.
//! - A mix without components, or without cement and reactive SCM, cannot be
//!   calculated. It is counted as no data, never as a mismatch.

use crate::aggregator::{aggregate, ComponentTotals, DosageOverflow};
use crate::ratios::{format_ratio, round_ratio, MixRatios};
use crate::report::{RunMode, RunSummary};
use crate::store::{MixKey, MixRecord, MixSink, MixSource};
use mixdb_common::db::Mix;
use mixdb_common::{ReconcileConfig, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// Stable issue identifiers used by downstream tooling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    WcRatioMismatch,
    WbRatioMismatch,
    WcRatioRange,
    CannotCalculate,
    ReadFailed,
    DosageOverflow,
}

impl IssueCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueCode::WcRatioMismatch => "WC_RATIO_MISMATCH",
            IssueCode::WbRatioMismatch => "WB_RATIO_MISMATCH",
            IssueCode::WcRatioRange => "WC_RATIO_RANGE",
            IssueCode::CannotCalculate => "CANNOT_CALCULATE",
            IssueCode::ReadFailed => "READ_FAILED",
            IssueCode::DosageOverflow => "DOSAGE_OVERFLOW",
        }
    }

    /// Mismatch and plausibility findings, as opposed to missing data
    pub fn is_finding(&self) -> bool {
        matches!(
            self,
            IssueCode::WcRatioMismatch | IssueCode::WbRatioMismatch | IssueCode::WcRatioRange
        )
    }
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the detail report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlaggedIssue {
    pub mix_code: String,
    pub issue_code: IssueCode,
    pub issue_description: String,
}

impl FlaggedIssue {
    fn new(mix_code: &str, issue_code: IssueCode, issue_description: String) -> Self {
        Self {
            mix_code: mix_code.to_string(),
            issue_code,
            issue_description,
        }
    }
}

/// What could be derived from a mix's components
#[derive(Debug, Clone, PartialEq)]
pub enum Assessment {
    NoComponents,
    NoBinder(ComponentTotals),
    Calculated {
        totals: ComponentTotals,
        ratios: MixRatios,
    },
}

impl Assessment {
    pub fn is_no_data(&self) -> bool {
        !matches!(self, Assessment::Calculated { .. })
    }
}

/// Aggregate a mix and derive its ratios
pub fn assess(record: &MixRecord) -> std::result::Result<Assessment, DosageOverflow> {
    let totals = aggregate(record.component_inputs())?;
    if totals.is_empty() {
        return Ok(Assessment::NoComponents);
    }
    if totals.has_no_binder() {
        return Ok(Assessment::NoBinder(totals));
    }
    let ratios = MixRatios::from_totals(&totals);
    Ok(Assessment::Calculated { totals, ratios })
}

/// The mix was designed with the k-value convention
pub fn k_value_applies(mix: &Mix) -> bool {
    mix.uses_k_value || mix.wb_ratio_k.is_some()
}

/// Rounded difference when it exceeds the mismatch tolerance
pub fn mismatch(calculated: Decimal, stored: Decimal, config: &ReconcileConfig) -> Option<Decimal> {
    let places = config.comparison_rounding_places;
    let diff = round_ratio(calculated, places)
        .checked_sub(round_ratio(stored, places))
        .map_or(Decimal::MAX, |d| d.abs());
    (diff > config.mismatch_tolerance).then_some(diff)
}

fn mismatch_issue(
    mix_code: &str,
    code: IssueCode,
    label: &str,
    calculated: Decimal,
    stored: Decimal,
    diff: Decimal,
    config: &ReconcileConfig,
) -> FlaggedIssue {
    let places = config.comparison_rounding_places;
    FlaggedIssue::new(
        mix_code,
        code,
        format!(
            "Calculated {} {} differs from reported {} by {} (tolerance {})",
            label,
            format_ratio(calculated, places),
            format_ratio(stored, places),
            format_ratio(diff, places),
            config.mismatch_tolerance
        ),
    )
}

/// Findings for a mix whose ratios could be calculated
pub fn ratio_issues(mix: &Mix, ratios: &MixRatios, config: &ReconcileConfig) -> Vec<FlaggedIssue> {
    let mut issues = Vec::new();

    if let (Some(calculated), Some(stored)) = (ratios.water_cement, mix.wc_ratio) {
        if let Some(diff) = mismatch(calculated, stored, config) {
            issues.push(mismatch_issue(
                &mix.mix_code,
                IssueCode::WcRatioMismatch,
                "w/c",
                calculated,
                stored,
                diff,
                config,
            ));
        }
    }

    if k_value_applies(mix) {
        debug!("{}: k-value convention, w/b comparison skipped", mix.mix_code);
    } else if let (Some(calculated), Some(stored)) = (ratios.water_binder, mix.wb_ratio) {
        if let Some(diff) = mismatch(calculated, stored, config) {
            issues.push(mismatch_issue(
                &mix.mix_code,
                IssueCode::WbRatioMismatch,
                "w/b",
                calculated,
                stored,
                diff,
                config,
            ));
        }
    }

    if let Some(calculated) = ratios.water_cement {
        if calculated < config.wc_plausible_min || calculated > config.wc_plausible_max {
            issues.push(FlaggedIssue::new(
                &mix.mix_code,
                IssueCode::WcRatioRange,
                format!(
                    "Calculated w/c {} outside plausible range [{}, {}]",
                    calculated.round_dp(6).normalize(),
                    config.wc_plausible_min,
                    config.wc_plausible_max
                ),
            ));
        }
    }

    issues
}

fn cannot_calculate(mix_code: &str, assessment: &Assessment) -> Option<FlaggedIssue> {
    let description = match assessment {
        Assessment::NoComponents => "No components recorded".to_string(),
        Assessment::NoBinder(totals) => format!(
            "No cement or reactive SCM among {} components",
            totals.component_count
        ),
        Assessment::Calculated { .. } => return None,
    };
    Some(FlaggedIssue::new(mix_code, IssueCode::CannotCalculate, description))
}

/// Everything the audit derives for one mix
pub fn check_mix(
    record: &MixRecord,
    config: &ReconcileConfig,
) -> std::result::Result<(Assessment, Vec<FlaggedIssue>), DosageOverflow> {
    let assessment = assess(record)?;
    let issues = match &assessment {
        Assessment::Calculated { ratios, .. } => ratio_issues(&record.mix, ratios, config),
        other => cannot_calculate(&record.mix.mix_code, other).into_iter().collect(),
    };
    Ok((assessment, issues))
}

/// A planned overwrite of the stored w/b ratio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WbCorrection {
    pub key: MixKey,
    pub previous: Option<Decimal>,
    pub value: Decimal,
}

/// Decide whether corrective mode overwrites this mix's w/b
///
/// The calculated value is rounded to storage places first, so a corrected
/// mix compares equal on the next run.
pub fn plan_wb_correction(
    mix: &Mix,
    ratios: &MixRatios,
    config: &ReconcileConfig,
) -> Option<WbCorrection> {
    if k_value_applies(mix) {
        return None;
    }
    let calculated = ratios.water_binder?;

    let mut value = round_ratio(calculated, config.storage_rounding_places);
    value.rescale(config.storage_rounding_places);

    let needs_update = match mix.wb_ratio {
        None => true,
        Some(stored) => stored
            .checked_sub(value)
            .map_or(true, |d| d.abs() > config.correction_tolerance),
    };

    needs_update.then(|| WbCorrection {
        key: MixKey::from(mix),
        previous: mix.wb_ratio,
        value,
    })
}

/// Load a mix, turning per-row failures into a report row
async fn load_or_record<S: MixSource + ?Sized>(
    store: &mut S,
    key: &MixKey,
    summary: &mut RunSummary,
    failures: &mut Vec<FlaggedIssue>,
) -> Option<MixRecord> {
    let reason = match store.load_mix(key).await {
        Ok(Some(record)) => return Some(record),
        Ok(None) => "mix no longer exists".to_string(),
        Err(e) => e.to_string(),
    };

    warn!("Skipping {} ({}): {}", key.mix_code, key.dataset_code, reason);
    summary.failed += 1;
    failures.push(FlaggedIssue::new(&key.mix_code, IssueCode::ReadFailed, reason));
    None
}

/// Record a loaded mix whose totals cannot be computed
fn record_overflow(
    key: &MixKey,
    err: DosageOverflow,
    summary: &mut RunSummary,
    failures: &mut Vec<FlaggedIssue>,
) {
    warn!("Skipping {} ({}): {}", key.mix_code, key.dataset_code, err);
    summary.failed += 1;
    failures.push(FlaggedIssue::new(&key.mix_code, IssueCode::DosageOverflow, err.to_string()));
}

/// Result of an audit run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    pub summary: RunSummary,
    pub issues: Vec<FlaggedIssue>,
}

/// Read-only health check over every mix in scope
pub async fn audit<S: MixSource + ?Sized>(
    store: &mut S,
    dataset: Option<&str>,
    config: &ReconcileConfig,
) -> Result<AuditReport> {
    let keys = store.list_mixes(dataset).await?;
    let mut summary = RunSummary::new(RunMode::Audit, dataset);
    let mut issues = Vec::new();

    info!("Auditing {} mixes", keys.len());

    for key in &keys {
        let Some(record) = load_or_record(&mut *store, key, &mut summary, &mut issues).await else {
            continue;
        };
        let (assessment, mix_issues) = match check_mix(&record, config) {
            Ok(checked) => checked,
            Err(err) => {
                record_overflow(key, err, &mut summary, &mut issues);
                continue;
            }
        };
        summary.processed += 1;

        if assessment.is_no_data() {
            summary.no_data += 1;
        } else if mix_issues.iter().any(|issue| issue.issue_code.is_finding()) {
            summary.flagged += 1;
        }
        issues.extend(mix_issues);
    }

    info!("Audit finished: {}", summary.display_string());
    Ok(AuditReport { summary, issues })
}

/// Result of a corrective run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionReport {
    pub summary: RunSummary,
    pub corrections: Vec<WbCorrection>,
    pub failures: Vec<FlaggedIssue>,
}

/// Overwrite stored w/b ratios that drifted from the calculated value
///
/// Read failures skip the mix. A failed write is returned as an error so the
/// caller rolls back the whole batch.
pub async fn correct<S: MixSink + ?Sized>(
    store: &mut S,
    dataset: Option<&str>,
    config: &ReconcileConfig,
) -> Result<CorrectionReport> {
    let keys = store.list_mixes(dataset).await?;
    let mut summary = RunSummary::new(RunMode::Correct, dataset);
    let mut corrections = Vec::new();
    let mut failures = Vec::new();

    info!("Correcting w/b ratios of {} mixes", keys.len());

    for key in &keys {
        let Some(record) = load_or_record(&mut *store, key, &mut summary, &mut failures).await else {
            continue;
        };
        let ratios = match assess(&record) {
            Ok(Assessment::Calculated { ratios, .. }) => ratios,
            Ok(_) => {
                summary.processed += 1;
                summary.no_data += 1;
                continue;
            }
            Err(err) => {
                record_overflow(key, err, &mut summary, &mut failures);
                continue;
            }
        };
        summary.processed += 1;

        if let Some(correction) = plan_wb_correction(&record.mix, &ratios, config) {
            store
                .update_wb_ratio(&correction.key, correction.previous, correction.value)
                .await?;
            info!(
                "Corrected w/b of {} ({}): {} -> {}",
                key.mix_code,
                key.dataset_code,
                correction
                    .previous
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "unset".to_string()),
                correction.value
            );
            summary.corrected += 1;
            corrections.push(correction);
        }
    }

    info!("Correction finished: {}", summary.display_string());
    Ok(CorrectionReport {
        summary,
        corrections,
        failures,
    })
}

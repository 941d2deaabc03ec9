//! mixdb-audit library interface
//!
//! Ratio reconciliation over the mix-design database:
//! - material classification and per-mix aggregation
//! - w/c and w/b calculation
//! - audit (report only) and correction (overwrite w/b) passes
//! - cementitious flag reconciliation
//! - CSV dataset import

pub mod aggregator;
pub mod classifier;
pub mod error;
pub mod import;
pub mod ratios;
pub mod reclassify;
pub mod reconcile;
pub mod report;
pub mod store;

pub use crate::error::{AuditError, AuditResult};
pub use crate::reconcile::{audit, correct, AuditReport, CorrectionReport, FlaggedIssue, IssueCode};
pub use crate::reclassify::{reconcile_flags, FlagReconciliation};
pub use crate::report::{RunMode, RunSummary};
pub use crate::store::{Disposition, MemoryStore, MixSink, MixSource, SqliteBatch};

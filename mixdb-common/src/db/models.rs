//! Database models

use crate::{Error, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Reference rows for `material_classes`
pub const MATERIAL_CLASSES: &[(&str, &str)] = &[
    ("CEMENT", "Portland and blended cements"),
    ("SCM", "Supplementary cementitious materials and mineral fillers"),
    ("WATER", "Mixing water"),
    ("AGGR_C", "Coarse aggregate"),
    ("AGGR_F", "Fine aggregate"),
    ("ADM", "Chemical admixtures"),
    ("FIBER", "Fibers"),
];

/// A concrete formulation with its reported ratios
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mix {
    pub guid: String,
    pub mix_code: String,
    pub dataset_code: String,
    pub wc_ratio: Option<Decimal>,
    pub wb_ratio: Option<Decimal>,
    pub wb_ratio_k: Option<Decimal>,
    pub uses_k_value: bool,
}

/// One (mix, material) dosage row joined with its material classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixComponent {
    pub guid: String,
    pub class_code: String,
    pub subtype: String,
    pub dosage_kg_m3: Decimal,
    pub is_cementitious: bool,
}

/// Parse a decimal column value
pub fn parse_decimal(column: &str, raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw.trim())
        .map_err(|e| Error::InvalidInput(format!("{} = '{}': {}", column, raw, e)))
}

/// Parse a nullable decimal column; empty text counts as unset
pub fn parse_optional_decimal(column: &str, raw: Option<&str>) -> Result<Option<Decimal>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => parse_decimal(column, value).map(Some),
    }
}

//! Ratio calculator
//!
//! Water/cement and water/binder from aggregated totals. A ratio whose
//! denominator is zero is `None`: missing data, not zero and not an error.

use crate::aggregator::ComponentTotals;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Calculated ratios at full precision
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MixRatios {
    pub water_cement: Option<Decimal>,
    pub water_binder: Option<Decimal>,
}

impl MixRatios {
    /// Derive both ratios from component totals
    pub fn from_totals(totals: &ComponentTotals) -> Self {
        Self {
            water_cement: ratio(totals.water, totals.cement),
            water_binder: ratio(totals.water, totals.binder()),
        }
    }

    /// Both ratios rounded to `places`
    pub fn rounded(&self, places: u32) -> Self {
        Self {
            water_cement: self.water_cement.map(|r| round_ratio(r, places)),
            water_binder: self.water_binder.map(|r| round_ratio(r, places)),
        }
    }
}

/// `numerator / denominator`, undefined unless the denominator is positive
pub fn ratio(numerator: Decimal, denominator: Decimal) -> Option<Decimal> {
    if denominator <= Decimal::ZERO {
        return None;
    }
    numerator.checked_div(denominator)
}

/// Round half to even, the same rule used for stored ratios
pub fn round_ratio(value: Decimal, places: u32) -> Decimal {
    value.round_dp_with_strategy(places, RoundingStrategy::MidpointNearestEven)
}

/// Round and pad to exactly `places` digits, e.g. `0.6` -> `"0.600"`
pub fn format_ratio(value: Decimal, places: u32) -> String {
    let mut rounded = round_ratio(value, places);
    rounded.rescale(places);
    rounded.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::{aggregate, ComponentInput};
    use std::str::FromStr;

    fn dec(value: &str) -> Decimal {
        Decimal::from_str(value).unwrap()
    }

    fn totals(water: &str, cement: &str, scm: &str) -> ComponentTotals {
        ComponentTotals {
            water: dec(water),
            cement: dec(cement),
            reactive_scm: dec(scm),
            component_count: 3,
            ..ComponentTotals::default()
        }
    }

    #[test]
    fn test_reference_mix_ratios() {
        let components = vec![
            ComponentInput { class_code: "WATER", subtype: "", dosage_kg_m3: dec("180") },
            ComponentInput { class_code: "CEMENT", subtype: "CEM I", dosage_kg_m3: dec("300") },
            ComponentInput { class_code: "SCM", subtype: "fly ash", dosage_kg_m3: dec("90") },
            ComponentInput { class_code: "SCM", subtype: "limestone", dosage_kg_m3: dec("40") },
        ];
        let ratios = MixRatios::from_totals(&aggregate(components).unwrap()).rounded(3);

        assert_eq!(ratios.water_cement, Some(dec("0.600")));
        assert_eq!(ratios.water_binder, Some(dec("0.462")));
    }

    #[test]
    fn test_zero_binder_is_undefined() {
        let ratios = MixRatios::from_totals(&totals("180", "0", "0"));
        assert_eq!(ratios.water_cement, None);
        assert_eq!(ratios.water_binder, None);
    }

    #[test]
    fn test_scm_only_binder_defines_wb_but_not_wc() {
        let ratios = MixRatios::from_totals(&totals("160", "0", "400"));
        assert_eq!(ratios.water_cement, None);
        assert_eq!(ratios.water_binder, Some(dec("0.4")));
    }

    #[test]
    fn test_wc_is_exact_quotient() {
        let t = totals("175", "350", "0");
        let ratios = MixRatios::from_totals(&t);
        assert_eq!(ratios.water_cement, Some(t.water / t.cement));
        assert_eq!(ratios.water_cement, Some(dec("0.5")));
    }

    #[test]
    fn test_storage_and_comparison_rounding_differ() {
        let value = dec("0.4615384615");
        assert_eq!(round_ratio(value, 3), dec("0.462"));
        assert_eq!(round_ratio(value, 2), dec("0.46"));
    }

    #[test]
    fn test_format_ratio_pads_places() {
        assert_eq!(format_ratio(dec("0.6"), 3), "0.600");
        assert_eq!(format_ratio(dec("0.4615384615"), 2), "0.46");
    }

    #[test]
    fn test_round_half_even() {
        assert_eq!(round_ratio(dec("0.125"), 2), dec("0.12"));
        assert_eq!(round_ratio(dec("0.135"), 2), dec("0.14"));
    }
}

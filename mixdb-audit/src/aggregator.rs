//! Component aggregator
//!
//! Sums component dosages (kg/m³) of one mix by binder role. All sums are
//! fixed-point decimals so repeated runs produce identical totals.

use crate::classifier::{classify_class, Cementitious, MaterialClass};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One component as seen by the aggregator
#[derive(Debug, Clone)]
pub struct ComponentInput<'a> {
    pub class_code: &'a str,
    pub subtype: &'a str,
    pub dosage_kg_m3: Decimal,
}

/// Per-role dosage totals for one mix
///
/// Every total is zero when nothing matched. `component_count` is the only
/// way to tell an empty mix from one whose components simply carry no
/// binder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentTotals {
    pub water: Decimal,
    pub cement: Decimal,
    pub reactive_scm: Decimal,
    pub inert_filler: Decimal,
    pub coarse_aggregate: Decimal,
    pub fine_aggregate: Decimal,
    pub admixture: Decimal,
    pub fiber: Decimal,
    pub component_count: usize,
}

impl ComponentTotals {
    /// Cement plus reactive SCM
    pub fn binder(&self) -> Decimal {
        self.cement + self.reactive_scm
    }

    pub fn is_empty(&self) -> bool {
        self.component_count == 0
    }

    /// True when there is neither cement nor reactive SCM to divide by
    pub fn has_no_binder(&self) -> bool {
        self.cement.is_zero() && self.reactive_scm.is_zero()
    }

    fn add(&mut self, class: &MaterialClass, subtype: &str, dosage: Decimal) -> Result<(), DosageOverflow> {
        self.component_count += 1;

        let (role, total) = match class {
            MaterialClass::Water => ("water", &mut self.water),
            MaterialClass::CoarseAggregate => ("coarse aggregate", &mut self.coarse_aggregate),
            MaterialClass::FineAggregate => ("fine aggregate", &mut self.fine_aggregate),
            MaterialClass::Admixture => ("admixture", &mut self.admixture),
            MaterialClass::Fiber => ("fiber", &mut self.fiber),
            MaterialClass::Cement | MaterialClass::Scm => match classify_class(class, subtype) {
                Cementitious::Cement => ("cement", &mut self.cement),
                Cementitious::ReactiveScm(_) => ("reactive SCM", &mut self.reactive_scm),
                Cementitious::InertFiller => ("inert filler", &mut self.inert_filler),
                Cementitious::Other => return Ok(()),
            },
            MaterialClass::Other(_) => return Ok(()),
        };

        *total = total.checked_add(dosage).ok_or(DosageOverflow { role })?;
        Ok(())
    }
}

/// A dosage sum left the representable decimal range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{role} dosage total overflows")]
pub struct DosageOverflow {
    pub role: &'static str,
}

/// Sum the components of one mix
///
/// Fails when a total, or the binder sum, does not fit in a decimal.
pub fn aggregate<'a, I>(components: I) -> Result<ComponentTotals, DosageOverflow>
where
    I: IntoIterator<Item = ComponentInput<'a>>,
{
    let mut totals = ComponentTotals::default();
    for component in components {
        let class = MaterialClass::from_code(component.class_code);
        totals.add(&class, component.subtype, component.dosage_kg_m3)?;
    }
    // binder() relies on this sum fitting
    totals
        .cement
        .checked_add(totals.reactive_scm)
        .ok_or(DosageOverflow { role: "binder" })?;
    Ok(totals)
}

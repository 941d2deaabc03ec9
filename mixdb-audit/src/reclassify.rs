//! Cementitious flag reconciliation
//!
//! Components carry a stored `is_cementitious` flag that older imports set
//! from ad hoc keyword lists. This pass re-derives the flag from the
//! classifier and rewrites every stored value that disagrees.

use crate::classifier::classify;
use crate::store::MixSink;
use mixdb_common::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// One rewritten flag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagChange {
    pub component_guid: String,
    pub mix_code: String,
    pub class_code: String,
    pub subtype: String,
    pub is_cementitious: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlagReconciliation {
    pub checked: usize,
    pub updated: usize,
    pub changes: Vec<FlagChange>,
}

/// Rewrite stored flags that disagree with the classifier
pub async fn reconcile_flags<S: MixSink + ?Sized>(
    store: &mut S,
    dataset: Option<&str>,
) -> Result<FlagReconciliation> {
    let flags = store.list_component_flags(dataset).await?;
    let mut result = FlagReconciliation::default();

    info!("Checking cementitious flags of {} components", flags.len());

    for flag in flags {
        result.checked += 1;
        let expected = classify(&flag.class_code, &flag.subtype).is_cementitious();
        if expected == flag.is_cementitious {
            continue;
        }

        store
            .set_cementitious_flag(&flag.component_guid, expected)
            .await?;
        debug!(
            "{}: {} '{}' is_cementitious {} -> {}",
            flag.mix_code, flag.class_code, flag.subtype, flag.is_cementitious, expected
        );
        result.updated += 1;
        result.changes.push(FlagChange {
            component_guid: flag.component_guid,
            mix_code: flag.mix_code,
            class_code: flag.class_code,
            subtype: flag.subtype,
            is_cementitious: expected,
        });
    }

    info!(
        "Flag reconciliation finished: checked={}, updated={}",
        result.checked, result.updated
    );
    Ok(result)
}

//! Storage seam for batch passes
//!
//! Reconciliation code never touches the database directly. Reads go
//! through [`MixSource`]; anything that mutates stored data needs a
//! [`MixSink`]. Audit runs are written against `MixSource` only, so an
//! advisory pass cannot overwrite anything.

use crate::aggregator::ComponentInput;
use async_trait::async_trait;
use mixdb_common::db::{Mix, MixComponent};
use mixdb_common::Result;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::{Disposition, SqliteBatch};

/// Identifies one mix inside a batch
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MixKey {
    pub guid: String,
    pub mix_code: String,
    pub dataset_code: String,
}

impl From<&Mix> for MixKey {
    fn from(mix: &Mix) -> Self {
        Self {
            guid: mix.guid.clone(),
            mix_code: mix.mix_code.clone(),
            dataset_code: mix.dataset_code.clone(),
        }
    }
}

/// A mix with all of its components
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixRecord {
    pub mix: Mix,
    pub components: Vec<MixComponent>,
}

impl MixRecord {
    pub fn key(&self) -> MixKey {
        MixKey::from(&self.mix)
    }

    /// Components in the shape the aggregator consumes
    pub fn component_inputs(&self) -> impl Iterator<Item = ComponentInput<'_>> {
        self.components.iter().map(|c| ComponentInput {
            class_code: &c.class_code,
            subtype: &c.subtype,
            dosage_kg_m3: c.dosage_kg_m3,
        })
    }
}

/// Stored cementitious flag of one component, with what it was derived from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentFlag {
    pub component_guid: String,
    pub mix_code: String,
    pub class_code: String,
    pub subtype: String,
    pub is_cementitious: bool,
}

/// Read side of the store
#[async_trait]
pub trait MixSource: Send {
    /// Mixes in a dataset (or all datasets), ordered by dataset then code
    async fn list_mixes(&mut self, dataset: Option<&str>) -> Result<Vec<MixKey>>;

    /// Load one mix; `Ok(None)` when the row disappeared since listing
    async fn load_mix(&mut self, key: &MixKey) -> Result<Option<MixRecord>>;

    /// Every component with its material classification
    async fn list_component_flags(&mut self, dataset: Option<&str>) -> Result<Vec<ComponentFlag>>;
}

/// Write side of the store
#[async_trait]
pub trait MixSink: MixSource {
    /// Overwrite the stored w/b ratio and log the change
    async fn update_wb_ratio(
        &mut self,
        key: &MixKey,
        previous: Option<Decimal>,
        value: Decimal,
    ) -> Result<()>;

    /// Rewrite the stored cementitious flag of one component
    async fn set_cementitious_flag(&mut self, component_guid: &str, is_cementitious: bool) -> Result<()>;
}

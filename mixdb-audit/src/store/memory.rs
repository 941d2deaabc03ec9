//! In-memory store
//!
//! Holds mixes in a `Vec` and applies writes in place. Used for runs over
//! data that is not in a database and by tests. Individual mixes can be
//! marked to fail on read or to disappear once they have been listed.

use super::{ComponentFlag, MixKey, MixRecord, MixSink, MixSource};
use async_trait::async_trait;
use mixdb_common::{Error, Result};
use rust_decimal::Decimal;
use std::collections::HashSet;

/// One applied w/b overwrite
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedCorrection {
    pub mix_guid: String,
    pub previous: Option<Decimal>,
    pub value: Decimal,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    mixes: Vec<MixRecord>,
    failing_reads: HashSet<String>,
    vanishing: HashSet<String>,
    corrections: Vec<AppliedCorrection>,
}

impl MemoryStore {
    pub fn new(mixes: Vec<MixRecord>) -> Self {
        Self {
            mixes,
            ..Self::default()
        }
    }

    /// Make every `load_mix` for this guid return an error
    pub fn fail_reads_for(&mut self, guid: &str) {
        self.failing_reads.insert(guid.to_string());
    }

    /// Delete this mix right after the next `list_mixes`, as a concurrent
    /// writer would between listing and loading
    pub fn vanish_after_listing(&mut self, guid: &str) {
        self.vanishing.insert(guid.to_string());
    }

    pub fn mix(&self, guid: &str) -> Option<&MixRecord> {
        self.mixes.iter().find(|record| record.mix.guid == guid)
    }

    pub fn corrections(&self) -> &[AppliedCorrection] {
        &self.corrections
    }
}

#[async_trait]
impl MixSource for MemoryStore {
    async fn list_mixes(&mut self, dataset: Option<&str>) -> Result<Vec<MixKey>> {
        let mut keys: Vec<MixKey> = self
            .mixes
            .iter()
            .filter(|record| dataset.map_or(true, |code| record.mix.dataset_code == code))
            .map(MixRecord::key)
            .collect();
        keys.sort_by(|a, b| {
            (a.dataset_code.as_str(), a.mix_code.as_str()).cmp(&(b.dataset_code.as_str(), b.mix_code.as_str()))
        });

        let vanishing = std::mem::take(&mut self.vanishing);
        self.mixes.retain(|record| !vanishing.contains(&record.mix.guid));
        Ok(keys)
    }

    async fn load_mix(&mut self, key: &MixKey) -> Result<Option<MixRecord>> {
        if self.failing_reads.contains(&key.guid) {
            return Err(Error::Internal(format!("read failure injected for {}", key.mix_code)));
        }
        Ok(self.mix(&key.guid).cloned())
    }

    async fn list_component_flags(&mut self, dataset: Option<&str>) -> Result<Vec<ComponentFlag>> {
        Ok(self
            .mixes
            .iter()
            .filter(|record| dataset.map_or(true, |code| record.mix.dataset_code == code))
            .flat_map(|record| {
                record.components.iter().map(move |c| ComponentFlag {
                    component_guid: c.guid.clone(),
                    mix_code: record.mix.mix_code.clone(),
                    class_code: c.class_code.clone(),
                    subtype: c.subtype.clone(),
                    is_cementitious: c.is_cementitious,
                })
            })
            .collect())
    }
}

#[async_trait]
impl MixSink for MemoryStore {
    async fn update_wb_ratio(
        &mut self,
        key: &MixKey,
        previous: Option<Decimal>,
        value: Decimal,
    ) -> Result<()> {
        let record = self
            .mixes
            .iter_mut()
            .find(|record| record.mix.guid == key.guid)
            .ok_or_else(|| Error::NotFound(format!("mix {}", key.mix_code)))?;

        record.mix.wb_ratio = Some(value);
        self.corrections.push(AppliedCorrection {
            mix_guid: key.guid.clone(),
            previous,
            value,
        });
        Ok(())
    }

    async fn set_cementitious_flag(&mut self, component_guid: &str, is_cementitious: bool) -> Result<()> {
        let component = self
            .mixes
            .iter_mut()
            .flat_map(|record| record.components.iter_mut())
            .find(|c| c.guid == component_guid)
            .ok_or_else(|| Error::NotFound(format!("mix component {}", component_guid)))?;

        component.is_cementitious = is_cementitious;
        Ok(())
    }
}

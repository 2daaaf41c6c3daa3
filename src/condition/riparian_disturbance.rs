//! RIPARIAN DISTURBANCE
//!
//! Direct threshold comparison on a proximity-weighted human influence
//! index. No expected value is modeled.
//!
//! **Columns needed**: the index column named by
//! [`RiparianDisturbanceConfig::metric`] (default `HIFPANYCIRCA_SYN`)

use super::{ConditionRecord, EcoThresholds, Thresholds};
use crate::data::WideTable;
use crate::error::{PhabError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiparianDisturbanceConfig {
    pub metric: String,
    pub ecoregion: String,
    pub thresholds: EcoThresholds,
}

impl Default for RiparianDisturbanceConfig {
    fn default() -> Self {
        Self {
            metric: "HIFPANYCIRCA_SYN".into(),
            ecoregion: "ECO9".into(),
            thresholds: EcoThresholds::uniform(Thresholds::lower_is_better(0.20, 0.75)),
        }
    }
}

impl RiparianDisturbanceConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(PhabError::from)
    }
}

pub fn assign_riparian_disturbance(wide: &WideTable, config: &RiparianDisturbanceConfig) -> Vec<ConditionRecord> {
    let records: Vec<ConditionRecord> = wide
        .sites()
        .map(|site| {
            let observed = wide.num(site, &config.metric);
            let eco = wide.text(site, &config.ecoregion).map(|e| e.to_ascii_uppercase());
            let t = config.thresholds.for_ecoregion(eco.as_deref());
            ConditionRecord {
                site: site.clone(),
                observed,
                expected: None,
                ratio: None,
                condition: t.classify(observed),
            }
        })
        .collect();

    debug!(sites = records.len(), metric = %config.metric, "riparian disturbance assigned");
    records
}

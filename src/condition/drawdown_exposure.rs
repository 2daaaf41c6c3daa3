//! DRAWDOWN EXPOSURE
//!
//! Lake level drawdown judged on two axes: the horizontal distance and the
//! vertical height of the exposed zone. Each axis is classed against its
//! ecoregion thresholds and the site takes the worse of the two.
//!
//! **Columns needed**: `BFXHORIZDIST_DD`, `BFXVERTHEIGHT_DD` (names
//! configurable) and the ecoregion covariate

use super::{ConditionClass, EcoThresholds, Thresholds};
use crate::data::{Key, WideTable};
use crate::error::{PhabError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawdownExposureConfig {
    pub horizontal_metric: String,
    pub vertical_metric: String,
    pub ecoregion: String,
    pub horizontal: EcoThresholds,
    pub vertical: EcoThresholds,
}

impl Default for DrawdownExposureConfig {
    fn default() -> Self {
        Self {
            horizontal_metric: "BFXHORIZDIST_DD".into(),
            vertical_metric: "BFXVERTHEIGHT_DD".into(),
            ecoregion: "ECO9".into(),
            horizontal: EcoThresholds::uniform(Thresholds::lower_is_better(10.0, 40.0)),
            vertical: EcoThresholds::uniform(Thresholds::lower_is_better(0.5, 1.5)),
        }
    }
}

impl DrawdownExposureConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(PhabError::from)
    }
}

/// Per-axis and combined drawdown condition of one site visit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrawdownRecord {
    pub site: Key,
    pub horizontal: Option<f64>,
    pub vertical: Option<f64>,
    pub horizontal_condition: ConditionClass,
    pub vertical_condition: ConditionClass,
    pub condition: ConditionClass,
}

pub fn assign_drawdown_exposure(wide: &WideTable, config: &DrawdownExposureConfig) -> Vec<DrawdownRecord> {
    let records: Vec<DrawdownRecord> = wide
        .sites()
        .map(|site| {
            let eco = wide.text(site, &config.ecoregion).map(|e| e.to_ascii_uppercase());
            let horizontal = wide.num(site, &config.horizontal_metric);
            let vertical = wide.num(site, &config.vertical_metric);
            let h = config.horizontal.for_ecoregion(eco.as_deref()).classify(horizontal);
            let v = config.vertical.for_ecoregion(eco.as_deref()).classify(vertical);
            DrawdownRecord {
                site: site.clone(),
                horizontal,
                vertical,
                horizontal_condition: h,
                vertical_condition: v,
                condition: h.worst(v),
            }
        })
        .collect();

    debug!(sites = records.len(), "drawdown exposure assigned");
    records
}

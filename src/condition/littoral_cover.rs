//! LITTORAL COVER
//!
//! Observed/expected comparison of littoral fish cover. The expected value
//! comes from a reference table keyed by ecoregion × origin × protocol;
//! rows may leave any key blank to act as a wildcard, and the most specific
//! matching row wins (ecoregion outranks origin, origin outranks protocol).
//!
//! **Columns needed**: cover index (default `FCIALL_LIT`) plus the
//! ecoregion, origin and protocol covariates

use super::{ConditionRecord, CovariateColumns, EcoThresholds, Origin, Protocol, SiteCovariates, Thresholds};
use crate::data::WideTable;
use crate::error::{PhabError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// One reference row; `None` keys match anything
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedRow {
    #[serde(default)]
    pub ecoregion: Option<String>,
    #[serde(default)]
    pub origin: Option<Origin>,
    #[serde(default)]
    pub protocol: Option<Protocol>,
    pub expected: f64,
}

impl ExpectedRow {
    /// Specificity of this row for a site, or None when a key disagrees
    fn score(&self, cov: &SiteCovariates) -> Option<u8> {
        let mut score = 0;
        if let Some(eco) = &self.ecoregion {
            if cov.ecoregion.as_deref() != Some(eco.as_str()) {
                return None;
            }
            score += 4;
        }
        if let Some(origin) = self.origin {
            if cov.origin != Some(origin) {
                return None;
            }
            score += 2;
        }
        if let Some(protocol) = self.protocol {
            if cov.protocol != Some(protocol) {
                return None;
            }
            score += 1;
        }
        Some(score)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpectedTable {
    pub rows: Vec<ExpectedRow>,
}

impl ExpectedTable {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(PhabError::from)
    }

    /// Expected value of the most specific matching row; first row wins ties
    pub fn lookup(&self, cov: &SiteCovariates) -> Option<f64> {
        let mut best: Option<(u8, f64)> = None;
        for row in &self.rows {
            if let Some(score) = row.score(cov) {
                if best.map_or(true, |(s, _)| score > s) {
                    best = Some((score, row.expected));
                }
            }
        }
        best.map(|(_, e)| e)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LittoralCoverConfig {
    pub metric: String,
    pub covariates: CovariateColumns,
    pub expected: ExpectedTable,
    pub thresholds: EcoThresholds,
}

impl Default for LittoralCoverConfig {
    fn default() -> Self {
        Self {
            metric: "FCIALL_LIT".into(),
            covariates: CovariateColumns::default(),
            expected: ExpectedTable::default(),
            thresholds: EcoThresholds::uniform(Thresholds::higher_is_better(0.75, 0.40)),
        }
    }
}

impl LittoralCoverConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(PhabError::from)
    }
}

pub fn assign_littoral_cover(wide: &WideTable, config: &LittoralCoverConfig) -> Vec<ConditionRecord> {
    let records: Vec<ConditionRecord> = wide
        .sites()
        .map(|site| {
            let cov = SiteCovariates::from_wide(wide, site, &config.covariates);
            let observed = wide.num(site, &config.metric);
            let expected = config.expected.lookup(&cov);

            let (Some(o), Some(e)) = (observed, expected) else {
                trace!(%site, "littoral cover not assessed");
                return ConditionRecord::not_assessed(site.clone(), observed, expected);
            };
            if e <= 0.0 {
                return ConditionRecord::not_assessed(site.clone(), observed, expected);
            }
            let ratio = o / e;
            let t = config.thresholds.for_ecoregion(cov.ecoregion.as_deref());
            ConditionRecord {
                site: site.clone(),
                observed,
                expected,
                ratio: Some(ratio),
                condition: t.classify(Some(ratio)),
            }
        })
        .collect();

    debug!(sites = records.len(), "littoral cover assigned");
    records
}

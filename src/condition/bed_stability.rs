//! BED STABILITY
//!
//! Observed bottom substrate size against the size expected from site
//! covariates. The expected value comes from a caller-supplied linear model;
//! the residual O − E is classed, with strongly negative residuals marking
//! beds finer than the setting predicts.
//!
//! **Columns needed**: mean log10 diameter (default `BSXLDIA`) plus every
//! covariate the model names

use super::{ConditionRecord, CovariateColumns, EcoThresholds, SiteCovariates, Thresholds};
use crate::data::WideTable;
use crate::error::{PhabError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Covariate {
    Lat,
    Lon,
    Elevation,
    Area,
    Slope,
    Width,
}

impl Covariate {
    fn value(self, cov: &SiteCovariates) -> Option<f64> {
        match self {
            Covariate::Lat => cov.lat,
            Covariate::Lon => cov.lon,
            Covariate::Elevation => cov.elevation,
            Covariate::Area => cov.area,
            Covariate::Slope => cov.slope,
            Covariate::Width => cov.width,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    #[default]
    Identity,
    Log10,
    /// log10(x + 1), for covariates that may be zero
    Log10Plus1,
}

impl Transform {
    fn apply(self, x: f64) -> Option<f64> {
        let y = match self {
            Transform::Identity => x,
            Transform::Log10 => x.log10(),
            Transform::Log10Plus1 => (x + 1.0).log10(),
        };
        y.is_finite().then_some(y)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub covariate: Covariate,
    #[serde(default)]
    pub transform: Transform,
    pub coef: f64,
}

/// `intercept + Σ coef · transform(covariate)`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub intercept: f64,
    #[serde(default)]
    pub terms: Vec<Term>,
}

impl LinearModel {
    /// None when a covariate is missing or falls outside its transform's domain
    pub fn predict(&self, cov: &SiteCovariates) -> Option<f64> {
        self.terms.iter().try_fold(self.intercept, |acc, term| {
            let x = term.covariate.value(cov)?;
            Some(acc + term.coef * term.transform.apply(x)?)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BedStabilityConfig {
    pub metric: String,
    pub covariates: CovariateColumns,
    pub model: LinearModel,
    pub thresholds: EcoThresholds,
}

impl Default for BedStabilityConfig {
    fn default() -> Self {
        Self {
            metric: "BSXLDIA".into(),
            covariates: CovariateColumns::default(),
            model: LinearModel::default(),
            thresholds: EcoThresholds::uniform(Thresholds::higher_is_better(-0.5, -1.5)),
        }
    }
}

impl BedStabilityConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(PhabError::from)
    }
}

pub fn assign_bed_stability(wide: &WideTable, config: &BedStabilityConfig) -> Vec<ConditionRecord> {
    let records: Vec<ConditionRecord> = wide
        .sites()
        .map(|site| {
            let cov = SiteCovariates::from_wide(wide, site, &config.covariates);
            let observed = wide.num(site, &config.metric);
            let expected = config.model.predict(&cov);

            let (Some(o), Some(e)) = (observed, expected) else {
                trace!(%site, "bed stability not assessed");
                return ConditionRecord::not_assessed(site.clone(), observed, expected);
            };
            let residual = o - e;
            let t = config.thresholds.for_ecoregion(cov.ecoregion.as_deref());
            ConditionRecord {
                site: site.clone(),
                observed,
                expected,
                ratio: Some(residual),
                condition: t.classify(Some(residual)),
            }
        })
        .collect();

    debug!(sites = records.len(), "bed stability assigned");
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::ConditionClass;
    use crate::data::{Key, MetricValue};
    use approx::assert_relative_eq;

    fn config() -> BedStabilityConfig {
        BedStabilityConfig::from_json(
            r#"{"model": {"intercept": 0.5, "terms": [
                    {"covariate": "elevation", "transform": "log10", "coef": 0.5},
                    {"covariate": "slope", "coef": -0.1}
               ]}}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_model_prediction() {
        let cov = SiteCovariates {
            elevation: Some(100.0),
            slope: Some(2.0),
            ..SiteCovariates::default()
        };
        assert_relative_eq!(config().model.predict(&cov).unwrap(), 1.3, epsilon = 1e-12);

        let no_slope = SiteCovariates {
            elevation: Some(100.0),
            ..SiteCovariates::default()
        };
        assert_eq!(config().model.predict(&no_slope), None);

        let bad_log = SiteCovariates {
            elevation: Some(0.0),
            slope: Some(2.0),
            ..SiteCovariates::default()
        };
        assert_eq!(config().model.predict(&bad_log), None);
    }

    #[test]
    fn test_residual_classes() {
        let mut wide = WideTable::default();
        for (site, obs) in [(1, 1.0), (2, 0.3), (3, -1.0)] {
            let k = Key::from(site);
            wide.insert(k.clone(), "ELEVATION", MetricValue::Num(100.0));
            wide.insert(k.clone(), "SLOPE", MetricValue::Num(2.0));
            wide.insert(k, "BSXLDIA", MetricValue::Num(obs));
        }
        wide.insert(Key::from(4), "BSXLDIA", MetricValue::Num(1.0));

        let out = assign_bed_stability(&wide, &config());
        assert_relative_eq!(out[0].ratio.unwrap(), -0.3, epsilon = 1e-12);
        assert_eq!(out[0].condition, ConditionClass::Good);
        assert_eq!(out[1].condition, ConditionClass::Fair);
        assert_eq!(out[2].condition, ConditionClass::Poor);
        assert_eq!(out[3].condition, ConditionClass::NotAssessed);
        assert_eq!(out[3].expected, None);
        assert_eq!(out[3].observed, Some(1.0));
    }
}

//! Condition indicator assigners
//!
//! Consume the wide metric table (one row per site visit) together with
//! site covariates, compare observed metric values against thresholds or
//! expected values, and assign a condition class. Column names are supplied
//! by the caller; a missing metric or covariate yields `Not Assessed`.

pub mod riparian_disturbance;
pub mod littoral_cover;
pub mod drawdown_exposure;
pub mod bed_stability;

pub use riparian_disturbance::{assign_riparian_disturbance, RiparianDisturbanceConfig};
pub use littoral_cover::{assign_littoral_cover, ExpectedRow, ExpectedTable, LittoralCoverConfig};
pub use drawdown_exposure::{assign_drawdown_exposure, DrawdownExposureConfig, DrawdownRecord};
pub use bed_stability::{assign_bed_stability, BedStabilityConfig, Covariate, LinearModel, Term, Transform};

use crate::data::{Key, MetricValue, WideTable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// Nine aggregated ecoregions used to key thresholds and expected values
pub const ECOREGIONS: &[&str] = &["CPL", "NAP", "NPL", "SAP", "SPL", "TPL", "UMW", "WMT", "XER"];

/// Ordered condition category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionClass {
    Good,
    Fair,
    Poor,
    #[serde(rename = "Not Assessed")]
    NotAssessed,
}

impl ConditionClass {
    pub fn label(self) -> &'static str {
        match self {
            ConditionClass::Good => "Good",
            ConditionClass::Fair => "Fair",
            ConditionClass::Poor => "Poor",
            ConditionClass::NotAssessed => "Not Assessed",
        }
    }

    fn rank(self) -> Option<u8> {
        match self {
            ConditionClass::Good => Some(0),
            ConditionClass::Fair => Some(1),
            ConditionClass::Poor => Some(2),
            ConditionClass::NotAssessed => None,
        }
    }

    /// The worse of two classes; not assessed wins over any assessment
    pub fn worst(self, other: ConditionClass) -> ConditionClass {
        match (self.rank(), other.rank()) {
            (Some(a), Some(b)) => {
                if a >= b {
                    self
                } else {
                    other
                }
            }
            _ => ConditionClass::NotAssessed,
        }
    }
}

impl fmt::Display for ConditionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One assessed site visit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionRecord {
    pub site: Key,
    pub observed: Option<f64>,
    pub expected: Option<f64>,
    /// O/E ratio, or the O − E residual for regression-expected indicators
    pub ratio: Option<f64>,
    pub condition: ConditionClass,
}

impl ConditionRecord {
    pub fn not_assessed(site: Key, observed: Option<f64>, expected: Option<f64>) -> Self {
        Self {
            site,
            observed,
            expected,
            ratio: None,
            condition: ConditionClass::NotAssessed,
        }
    }
}

/// Wide form of assigner output: `<prefix>_OBS`, `<prefix>_EXP`, `<prefix>_OE`, `<prefix>_COND`
pub fn records_to_wide(records: &[ConditionRecord], prefix: &str) -> WideTable {
    let mut wide = WideTable::default();
    for r in records {
        wide.insert(r.site.clone(), format!("{}_OBS", prefix), MetricValue::from_option(r.observed));
        wide.insert(r.site.clone(), format!("{}_EXP", prefix), MetricValue::from_option(r.expected));
        wide.insert(r.site.clone(), format!("{}_OE", prefix), MetricValue::from_option(r.ratio));
        wide.insert(
            r.site.clone(),
            format!("{}_COND", prefix),
            MetricValue::Text(r.condition.label().to_string()),
        );
    }
    wide
}

// ============================================================================
// COVARIATES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Origin {
    Natural,
    ManMade,
}

impl Origin {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().replace(['-', ' '], "_").as_str() {
            "NATURAL" => Some(Origin::Natural),
            "MAN_MADE" | "MANMADE" => Some(Origin::ManMade),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Protocol {
    Wadeable,
    Boatable,
    Lake,
}

impl Protocol {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "WADEABLE" => Some(Protocol::Wadeable),
            "BOATABLE" => Some(Protocol::Boatable),
            "LAKE" | "NLA" => Some(Protocol::Lake),
            _ => None,
        }
    }
}

/// Caller column names of the site covariates in the wide table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CovariateColumns {
    pub ecoregion: String,
    pub origin: String,
    pub lat: String,
    pub lon: String,
    pub elevation: String,
    pub area: String,
    pub protocol: String,
    pub slope: String,
    pub width: String,
}

impl Default for CovariateColumns {
    fn default() -> Self {
        Self {
            ecoregion: "ECO9".into(),
            origin: "LAKE_ORIGIN".into(),
            lat: "LAT_DD".into(),
            lon: "LON_DD".into(),
            elevation: "ELEVATION".into(),
            area: "AREA_HA".into(),
            protocol: "PROTOCOL".into(),
            slope: "SLOPE".into(),
            width: "WIDTH".into(),
        }
    }
}

/// Covariates of one site visit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SiteCovariates {
    pub ecoregion: Option<String>,
    pub origin: Option<Origin>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub elevation: Option<f64>,
    pub area: Option<f64>,
    pub protocol: Option<Protocol>,
    pub slope: Option<f64>,
    pub width: Option<f64>,
}

impl SiteCovariates {
    /// Read covariates from one row of a wide table; unknown codes become missing
    pub fn from_wide(wide: &WideTable, site: &Key, cols: &CovariateColumns) -> Self {
        let ecoregion = wide.text(site, &cols.ecoregion).and_then(|e| {
            let e = e.trim().to_ascii_uppercase();
            if ECOREGIONS.contains(&e.as_str()) {
                Some(e)
            } else {
                warn!(%site, ecoregion = %e, "unknown ecoregion, treated as missing");
                None
            }
        });
        Self {
            ecoregion,
            origin: wide.text(site, &cols.origin).and_then(|s| Origin::parse(&s)),
            lat: wide.num(site, &cols.lat),
            lon: wide.num(site, &cols.lon),
            elevation: wide.num(site, &cols.elevation),
            area: wide.num(site, &cols.area),
            protocol: wide.text(site, &cols.protocol).and_then(|s| Protocol::parse(&s)),
            slope: wide.num(site, &cols.slope),
            width: wide.num(site, &cols.width),
        }
    }
}

// ============================================================================
// THRESHOLDS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    LowerIsBetter,
    HigherIsBetter,
}

/// Good/poor cut points; values between them are fair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub good: f64,
    pub poor: f64,
    pub direction: Direction,
}

impl Thresholds {
    pub fn lower_is_better(good: f64, poor: f64) -> Self {
        Self {
            good,
            poor,
            direction: Direction::LowerIsBetter,
        }
    }

    pub fn higher_is_better(good: f64, poor: f64) -> Self {
        Self {
            good,
            poor,
            direction: Direction::HigherIsBetter,
        }
    }

    pub fn classify(&self, value: Option<f64>) -> ConditionClass {
        let Some(v) = value.filter(|v| v.is_finite()) else {
            return ConditionClass::NotAssessed;
        };
        match self.direction {
            Direction::LowerIsBetter if v <= self.good => ConditionClass::Good,
            Direction::LowerIsBetter if v >= self.poor => ConditionClass::Poor,
            Direction::HigherIsBetter if v >= self.good => ConditionClass::Good,
            Direction::HigherIsBetter if v <= self.poor => ConditionClass::Poor,
            _ => ConditionClass::Fair,
        }
    }
}

/// Thresholds per ecoregion with a fallback for the rest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EcoThresholds {
    pub default: Thresholds,
    #[serde(default)]
    pub by_ecoregion: BTreeMap<String, Thresholds>,
}

impl EcoThresholds {
    pub fn uniform(t: Thresholds) -> Self {
        Self {
            default: t,
            by_ecoregion: BTreeMap::new(),
        }
    }

    pub fn for_ecoregion(&self, eco: Option<&str>) -> &Thresholds {
        eco.and_then(|e| self.by_ecoregion.get(e))
            .unwrap_or(&self.default)
    }
}

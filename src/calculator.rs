//! Whole-visit metric calculation
//!
//! Runs every metric family whose inputs are present and concatenates the
//! long records into one table sorted by site then metric name. The parallel
//! variant spreads families over rayon's pool; families share only immutable
//! lookups and configuration, so both variants return identical tables.

use crate::data::MetricTable;
use crate::error::{Issue, PhabError, Result};
use crate::metrics::{
    calculate_bank_morphology, calculate_channel_habitat, calculate_fish_cover, calculate_human_influence,
    calculate_invasive_species, calculate_littoral_depth, calculate_riparian_vegetation, calculate_substrate,
    AggregatorConfig, SubstrateZone,
};
use crate::utils::frames::metrics_to_frame;
use crate::utils::lookup_tables::LookupTables;
use polars::prelude::DataFrame;
use rayon::prelude::*;
use std::time::Instant;
use tracing::{debug, info};

/// Raw long tables of one batch of site visits; absent tables are `None`
#[derive(Debug, Clone, Default)]
pub struct PhabInputs {
    pub shore_substrate: Option<DataFrame>,
    pub bottom_substrate: Option<DataFrame>,
    pub hi_riparian: Option<DataFrame>,
    pub hi_drawdown: Option<DataFrame>,
    pub rv_riparian: Option<DataFrame>,
    pub rv_drawdown: Option<DataFrame>,
    pub rv_type: Option<DataFrame>,
    pub fc_littoral: Option<DataFrame>,
    pub fc_drawdown: Option<DataFrame>,
    pub bank_angle: Option<DataFrame>,
    pub horiz_dist_dd: Option<DataFrame>,
    pub vert_height_dd: Option<DataFrame>,
    pub drawdown: Option<DataFrame>,
    pub channel_unit: Option<DataFrame>,
    /// One presence table per invasive taxon, in reporting order
    pub invasive: Vec<(String, DataFrame)>,
    pub invasive_none: Option<DataFrame>,
    pub littoral_depth: Option<DataFrame>,
}

/// Metric families in reporting order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    ShoreSubstrate,
    BottomSubstrate,
    HumanInfluence,
    RiparianVegetation,
    FishCover,
    BankMorphology,
    ChannelHabitat,
    InvasiveSpecies,
    LittoralDepth,
}

pub const FAMILIES: &[Family] = &[
    Family::ShoreSubstrate,
    Family::BottomSubstrate,
    Family::HumanInfluence,
    Family::RiparianVegetation,
    Family::FishCover,
    Family::BankMorphology,
    Family::ChannelHabitat,
    Family::InvasiveSpecies,
    Family::LittoralDepth,
];

impl Family {
    /// Whether any table this family aggregates was supplied
    pub fn has_inputs(self, inputs: &PhabInputs) -> bool {
        match self {
            Family::ShoreSubstrate => inputs.shore_substrate.is_some(),
            Family::BottomSubstrate => inputs.bottom_substrate.is_some(),
            Family::HumanInfluence => inputs.hi_riparian.is_some() || inputs.hi_drawdown.is_some(),
            Family::RiparianVegetation => {
                inputs.rv_riparian.is_some() || inputs.rv_drawdown.is_some() || inputs.rv_type.is_some()
            }
            Family::FishCover => inputs.fc_littoral.is_some() || inputs.fc_drawdown.is_some(),
            Family::BankMorphology => {
                inputs.bank_angle.is_some() || inputs.horiz_dist_dd.is_some() || inputs.vert_height_dd.is_some()
            }
            Family::ChannelHabitat => inputs.channel_unit.is_some(),
            Family::InvasiveSpecies => !inputs.invasive.is_empty() || inputs.invasive_none.is_some(),
            Family::LittoralDepth => inputs.littoral_depth.is_some(),
        }
    }
}

pub struct PhabCalculator {
    lookups: LookupTables,
    config: AggregatorConfig,
}

impl Default for PhabCalculator {
    fn default() -> Self {
        Self::new(LookupTables::default(), AggregatorConfig::default())
    }
}

impl PhabCalculator {
    pub fn new(lookups: LookupTables, config: AggregatorConfig) -> Self {
        Self { lookups, config }
    }

    /// Build from JSON overrides; either document may be empty for defaults
    pub fn from_json(lookups_json: Option<&str>, config_json: Option<&str>) -> Result<Self> {
        let lookups = match lookups_json {
            Some(json) => LookupTables::from_json(json)?,
            None => LookupTables::default(),
        };
        let config = match config_json {
            Some(json) => AggregatorConfig::from_json(json)?,
            None => AggregatorConfig::default(),
        };
        Ok(Self::new(lookups, config))
    }

    pub fn lookups(&self) -> &LookupTables {
        &self.lookups
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Run one family against its tables
    pub fn run_family(&self, family: Family, inputs: &PhabInputs) -> Result<MetricTable> {
        let (l, c) = (&self.lookups, &self.config);
        match family {
            Family::ShoreSubstrate => calculate_substrate(SubstrateZone::Shore, inputs.shore_substrate.as_ref(), l, c),
            Family::BottomSubstrate => {
                calculate_substrate(SubstrateZone::Bottom, inputs.bottom_substrate.as_ref(), l, c)
            }
            Family::HumanInfluence => calculate_human_influence(
                inputs.hi_riparian.as_ref(),
                inputs.hi_drawdown.as_ref(),
                inputs.horiz_dist_dd.as_ref(),
                inputs.drawdown.as_ref(),
                l,
                c,
            ),
            Family::RiparianVegetation => calculate_riparian_vegetation(
                inputs.rv_riparian.as_ref(),
                inputs.rv_drawdown.as_ref(),
                inputs.rv_type.as_ref(),
                inputs.horiz_dist_dd.as_ref(),
                inputs.drawdown.as_ref(),
                l,
                c,
            ),
            Family::FishCover => calculate_fish_cover(
                inputs.fc_littoral.as_ref(),
                inputs.fc_drawdown.as_ref(),
                inputs.horiz_dist_dd.as_ref(),
                inputs.drawdown.as_ref(),
                l,
                c,
            ),
            Family::BankMorphology => calculate_bank_morphology(
                inputs.bank_angle.as_ref(),
                inputs.horiz_dist_dd.as_ref(),
                inputs.vert_height_dd.as_ref(),
                l,
                c,
            ),
            Family::ChannelHabitat => calculate_channel_habitat(inputs.channel_unit.as_ref(), l, c),
            Family::InvasiveSpecies => {
                let taxa: Vec<(&str, Option<&DataFrame>)> =
                    inputs.invasive.iter().map(|(name, df)| (name.as_str(), Some(df))).collect();
                calculate_invasive_species(&taxa, inputs.invasive_none.as_ref(), c)
            }
            Family::LittoralDepth => calculate_littoral_depth(inputs.littoral_depth.as_ref(), c),
        }
    }

    /// Calculate every family with inputs, one after another
    pub fn calculate(&self, inputs: &PhabInputs) -> Result<MetricTable> {
        let start = Instant::now();
        let results: Vec<Result<MetricTable>> = FAMILIES
            .iter()
            .filter(|f| f.has_inputs(inputs))
            .map(|f| self.run_family(*f, inputs))
            .collect();
        let table = combine(results)?;
        info!(records = table.len(), elapsed = ?start.elapsed(), "metrics calculated");
        Ok(table)
    }

    /// Calculate every family with inputs on the rayon pool
    pub fn calculate_parallel(&self, inputs: &PhabInputs) -> Result<MetricTable> {
        let start = Instant::now();
        let results: Vec<Result<MetricTable>> = FAMILIES
            .par_iter()
            .filter(|f| f.has_inputs(inputs))
            .map(|f| self.run_family(*f, inputs))
            .collect();
        let table = combine(results)?;
        info!(records = table.len(), elapsed = ?start.elapsed(), "metrics calculated in parallel");
        Ok(table)
    }

    /// Calculate and return the `{SITE, METRIC, VALUE}` frame
    pub fn calculate_frame(&self, inputs: &PhabInputs) -> Result<DataFrame> {
        let table = self.calculate_parallel(inputs)?;
        Ok(metrics_to_frame(&table)?)
    }
}

/// Merge family results; validation issues of all families are reported together
fn combine(results: Vec<Result<MetricTable>>) -> Result<MetricTable> {
    let mut issues: Vec<Issue> = Vec::new();
    let mut tables: Vec<MetricTable> = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok(t) => tables.push(t),
            Err(PhabError::Validation(found)) => issues.extend(found),
            Err(e) => return Err(e),
        }
    }
    if !issues.is_empty() {
        return Err(PhabError::Validation(issues));
    }

    let mut out = MetricTable::new();
    for t in tables {
        debug!(records = t.len(), "merging family");
        out.extend(t)?;
    }
    Ok(out.sorted())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Key;
    use polars::prelude::*;

    #[test]
    fn test_families_without_inputs_are_skipped() {
        let inputs = PhabInputs {
            littoral_depth: Some(
                df![
                    "SITE" => [1i64, 1],
                    "STATION" => ["A", "B"],
                    "VALUE" => [1.0, 2.0],
                ]
                .unwrap(),
            ),
            ..PhabInputs::default()
        };
        let out = PhabCalculator::default().calculate(&inputs).unwrap();
        let names = out.metrics_for(&Key::from(1));
        assert!(names.contains("XLIT"));
        assert!(names.iter().all(|m| m.ends_with("LIT")));
        assert!(PhabCalculator::default().calculate(&PhabInputs::default()).unwrap().is_empty());
    }

    #[test]
    fn test_validation_issues_concatenated_across_families() {
        let bad_depth = df![
            "SITE" => [1i64],
            "STATION" => ["A"],
            "VALUE" => [-1.0],
        ]
        .unwrap();
        let bad_units = df![
            "SITE" => [1i64],
            "STATION" => ["A"],
            "VALUE" => ["ZZ"],
        ]
        .unwrap();
        let inputs = PhabInputs {
            littoral_depth: Some(bad_depth),
            channel_unit: Some(bad_units),
            ..PhabInputs::default()
        };
        let err = PhabCalculator::default().calculate_parallel(&inputs).unwrap_err();
        let tables: Vec<&str> = err.issues().iter().map(|i| i.table.as_str()).collect();
        assert_eq!(tables.len(), 2);
        assert!(tables.contains(&"littoralDepth"));
        assert!(tables.contains(&"channelUnit"));
    }
}

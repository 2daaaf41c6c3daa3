//! Metric aggregators, one module per metric family
//!
//! Every family follows the same pipeline: standardize its input tables,
//! map codes to weights, optionally reconcile drawdown readings, reduce
//! stations to site summaries and emit long `(site, metric, value)` records.
//! The helpers in this module are the parts shared by all families.

pub mod substrate;
pub mod human_influence;
pub mod riparian_vegetation;
pub mod fish_cover;
pub mod bank_morphology;
pub mod channel_habitat;
pub mod invasive_species;
pub mod littoral_depth;

// Re-export metric functions
pub use substrate::{calculate_substrate, SubstrateZone};
pub use human_influence::calculate_human_influence;
pub use riparian_vegetation::calculate_riparian_vegetation;
pub use fish_cover::calculate_fish_cover;
pub use bank_morphology::calculate_bank_morphology;
pub use channel_habitat::calculate_channel_habitat;
pub use invasive_species::calculate_invasive_species;
pub use littoral_depth::calculate_littoral_depth;

use crate::data::{Key, MetricTable, MetricValue};
use crate::drawdown::DrawdownPolicy;
use crate::error::Result;
use crate::utils::class_counter;
use crate::utils::normalization::{summarize, ClassSummary, StationWeight};
use crate::utils::schema::{ColumnSpec, TableSchema};
use crate::utils::standardize::Standardizer;
use crate::utils::stats;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Per-call options shared by every aggregator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Report validation issues as warnings instead of failing
    pub unit_test: bool,
    /// Trace every standardized input table
    pub dump_arguments: bool,
    pub drawdown: DrawdownPolicy,
}

impl AggregatorConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub(crate) fn standardizer(&self, context: &str) -> Standardizer {
        Standardizer::new(context, self.unit_test).dump_arguments(self.dump_arguments)
    }
}

// ============================================================================
// SHARED INPUT SCHEMAS
// ============================================================================

/// Horizontal drawdown distance (m); unparseable entries become null
pub fn horiz_dist_schema() -> TableSchema {
    TableSchema::station_numbers("horizDistDD", ColumnSpec::numeric(0.0, 500.0).na_by_coercion())
}

/// Vertical drawdown height (m); unparseable entries become null
pub fn vert_height_schema() -> TableSchema {
    TableSchema::station_numbers("vertHeightDD", ColumnSpec::numeric(0.0, 100.0).na_by_coercion())
}

/// Station flag for an exposed drawdown zone
pub fn drawdown_schema() -> TableSchema {
    TableSchema::station_codes("drawdown", &["Y", "YES", "N", "NO"])
}

// ============================================================================
// METRIC NAMING AND EMISSION
// ============================================================================

/// `<PREFIX><CLASS>[_<ZONE>]`
pub fn metric_name(prefix: &str, class: &str, zone: Option<&str>) -> String {
    match zone {
        Some(z) => format!("{}{}_{}", prefix, class, z),
        None => format!("{}{}", prefix, class),
    }
}

/// Classes seen in `rows`, in canonical declared order
///
/// Classes outside the canonical list sort after it, alphabetically.
pub fn seen_classes(rows: &[StationWeight], canonical: &[&str]) -> Vec<String> {
    let seen: BTreeSet<&str> = rows.iter().map(|r| r.class.as_str()).collect();
    let mut out: Vec<String> = canonical
        .iter()
        .filter(|c| seen.contains(*c))
        .map(|c| c.to_string())
        .collect();
    out.extend(
        seen.iter()
            .filter(|c| !canonical.contains(c))
            .map(|c| c.to_string()),
    );
    out
}

pub fn sites_of(rows: &[StationWeight]) -> BTreeSet<Key> {
    rows.iter().map(|r| r.key.site.clone()).collect()
}

/// Prefixes of the per-class statistics; `None` skips that statistic
#[derive(Debug, Clone, Copy)]
pub struct ClassPrefixes<'a> {
    pub mean: Option<&'a str>,
    pub sd: Option<&'a str>,
    pub count: Option<&'a str>,
    pub presence: Option<&'a str>,
}

/// Emit mean, sd, presence and dense counts for every (site, class)
///
/// Returns the summaries for composite metrics.
pub fn push_class_metrics(
    out: &mut MetricTable,
    rows: &[StationWeight],
    classes: &[String],
    prefixes: ClassPrefixes<'_>,
    zone: Option<&str>,
) -> Result<BTreeMap<(Key, String), ClassSummary>> {
    let summaries = summarize(rows);

    for ((site, class), s) in &summaries {
        if let Some(p) = prefixes.mean {
            out.push_num(site, metric_name(p, class, zone), s.mean)?;
        }
        if let Some(p) = prefixes.sd {
            out.push_num(site, metric_name(p, class, zone), s.sd)?;
        }
        if let Some(p) = prefixes.presence {
            out.push_num(site, metric_name(p, class, zone), s.presence)?;
        }
    }

    if let Some(p) = prefixes.count {
        let sites = sites_of(rows);
        for (site, class, n) in class_counter::dense_counts(&sites, classes, &summaries) {
            out.push(&site, metric_name(p, &class, zone), MetricValue::Num(n as f64))?;
        }
    }

    Ok(summaries)
}

/// Null-safe sum of the site means of `members`
///
/// Returns `None` when no member was observed at the site at all, so the
/// composite is not emitted; observed but all-null members give `Some(None)`.
pub fn composite_sum(
    summaries: &BTreeMap<(Key, String), ClassSummary>,
    site: &Key,
    members: &[&str],
) -> Option<Option<f64>> {
    let means: Vec<Option<f64>> = members
        .iter()
        .filter_map(|m| summaries.get(&(site.clone(), m.to_string())))
        .map(|s| s.mean)
        .collect();
    if means.is_empty() {
        None
    } else {
        Some(stats::null_safe_sum(means))
    }
}

/// Emit a named composite for every site that observed any member
pub fn push_composite(
    out: &mut MetricTable,
    summaries: &BTreeMap<(Key, String), ClassSummary>,
    sites: &BTreeSet<Key>,
    name: &str,
    members: &[&str],
) -> Result<()> {
    for site in sites {
        if let Some(v) = composite_sum(summaries, site, members) {
            out.push_num(site, name, v)?;
        }
    }
    Ok(())
}

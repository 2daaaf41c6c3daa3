//! INVASIVE SPECIES PRESENCE
//!
//! One presence table per invasive taxon, given as an ordered list of
//! `(taxon, table)` pairs, plus a `none` table marking stations where the
//! crew looked and found no invasives. `none` is therefore reserved and
//! cannot name a taxon.
//!
//! A station is sampled when any of these tables has a reading for it.
//!
//! Metrics: `f_<taxon>` fraction of sampled stations with the taxon present,
//! `ip_score` the sum of those fractions (0 at sites with no invasives).

use crate::data::{Key, MetricTable, ObservationTable, StationKey};
use crate::error::{Issue, PhabError, Result};
use crate::metrics::AggregatorConfig;
use crate::utils::schema::{ColumnSpec, TableSchema};
use crate::utils::stats;
use polars::prelude::DataFrame;
use regex::Regex;
use rustc_hash::FxHashSet;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Reserved name of the no-invasives indicator table
pub const NONE_KEY: &str = "none";

const MARKER_PATTERN: &str = r"(?i)^(X|Y|YES|1|TRUE|PRESENT|N|NO|0|FALSE|ABSENT)$";
const PRESENT_MARKERS: &[&str] = &["X", "Y", "YES", "1", "TRUE", "PRESENT"];

fn is_present(code: &str) -> bool {
    PRESENT_MARKERS.iter().any(|m| m.eq_ignore_ascii_case(code))
}

fn marker_schema(name: &str) -> Result<TableSchema> {
    let re = Regex::new(MARKER_PATTERN)
        .map_err(|e| PhabError::StructuralMismatch(format!("presence marker pattern: {}", e)))?;
    Ok(TableSchema::new(name)
        .column(ColumnSpec::site())
        .column(ColumnSpec::station())
        .column(ColumnSpec::pattern(re)))
}

/// Calculate invasive species presence metrics
pub fn calculate_invasive_species(
    taxa: &[(&str, Option<&DataFrame>)],
    none: Option<&DataFrame>,
    config: &AggregatorConfig,
) -> Result<MetricTable> {
    let mut args = config.standardizer("invasiveSpecies");

    // STEP 1: Taxon keys, then every table
    let mut names: FxHashSet<String> = FxHashSet::default();
    for (taxon, _) in taxa {
        if taxon.trim().is_empty() {
            args.push(Issue::schema("invasiveSpecies", "taxon name is empty"));
        } else if taxon.eq_ignore_ascii_case(NONE_KEY) {
            args.push(Issue::schema(
                "invasiveSpecies",
                format!("taxon name '{}' is reserved for the no-invasives table", taxon),
            ));
        } else if !names.insert(taxon.to_ascii_lowercase()) {
            args.push(Issue::schema(
                "invasiveSpecies",
                format!("taxon '{}' is given more than once", taxon),
            ));
        }
    }

    let mut tables: Vec<(&str, ObservationTable)> = Vec::with_capacity(taxa.len());
    for (taxon, df) in taxa {
        if let Some(t) = args.standardize(*df, &marker_schema(taxon)?) {
            tables.push((*taxon, t));
        }
    }
    let none_table = args.standardize(none, &marker_schema(NONE_KEY)?);

    let mut out = MetricTable::new();
    out.warnings = args.finish()?;

    // STEP 2: Sampled stations per site
    let mut sampled: BTreeMap<Key, BTreeSet<StationKey>> = BTreeMap::new();
    for table in tables.iter().map(|(_, t)| t).chain(none_table.iter()) {
        for row in &table.rows {
            if let (Some(key), false) = (row.station_key(), row.value.is_null()) {
                sampled.entry(key.site.clone()).or_default().insert(key);
            }
        }
    }

    // STEP 3: Presence fractions, dense over sampled sites
    let mut scores: BTreeMap<Key, Vec<Option<f64>>> =
        sampled.keys().map(|s| (s.clone(), Vec::new())).collect();
    for (taxon, table) in &tables {
        let present: BTreeSet<StationKey> = table
            .rows
            .iter()
            .filter(|r| r.value.as_code().map_or(false, is_present))
            .filter_map(|r| r.station_key())
            .collect();

        for (site, stations) in &sampled {
            let k = stations.iter().filter(|s| present.contains(*s)).count();
            let f = k as f64 / stations.len() as f64;
            out.push_num(site, format!("f_{}", taxon), Some(f))?;
            if let Some(v) = scores.get_mut(site) {
                v.push(Some(f));
            }
        }
    }

    for (site, fractions) in &scores {
        out.push_num(site, "ip_score", Some(stats::sum(fractions).unwrap_or(0.0)))?;
    }

    debug!(taxa = tables.len(), sites = sampled.len(), "invasive species metrics complete");
    Ok(out)
}

//! SUBSTRATE COMPOSITION (SHORELINE AND BOTTOM)
//!
//! Cover-class codes per substrate class and station, for either the
//! shoreline (`SS` prefix) or the littoral bottom (`BS` prefix).
//!
//! **Columns needed**: SITE, STATION, CLASS (substrate class), VALUE (cover code 0-4)
//!
//! Metrics (`<P>` is the zone prefix):
//!   - `<P>FC<CLASS>`, `<P>V<CLASS>`, `<P>N<CLASS>`, `<P>PC<CLASS>`: mean cover,
//!     sd, count and presence fraction after per-station normalization
//!   - `<P>XLDIA`: sum of site mean cover × log10 diameter over classes present
//!   - `<P>XLDIA_STA`, `<P>VLDIA`, `<P>16LDIA` .. `<P>84LDIA`: distribution of
//!     station log diameters
//!   - `<P>OFCLASS`, `<P>OPCLASS`: modal class by cover and by presence

use crate::data::{Key, MetricTable, MetricValue};
use crate::error::Result;
use crate::metrics::{push_class_metrics, seen_classes, sites_of, AggregatorConfig, ClassPrefixes};
use crate::utils::lookup_tables::LookupTables;
use crate::utils::normalization::{
    distribution, map_codes, modal_class, normalize_station_covers, site_log_diameter,
    station_log_diameters,
};
use crate::utils::schema::TableSchema;
use polars::prelude::DataFrame;
use std::collections::BTreeMap;
use tracing::debug;

/// Substrate classes recorded along the shoreline
pub const SHORE_CLASSES: &[&str] = &[
    "BEDROCK", "BOULDERS", "COBBLE", "GRAVEL", "SAND", "SILT", "WOODY", "VEGETATION", "OTHER",
];

/// Substrate classes recorded on the littoral bottom
pub const BOTTOM_CLASSES: &[&str] = &[
    "BEDROCK", "BOULDERS", "COBBLE", "GRAVEL", "SAND", "SILT", "ORGANIC", "WOOD",
];

/// Where the substrate was recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubstrateZone {
    Shore,
    Bottom,
}

impl SubstrateZone {
    pub fn prefix(self) -> &'static str {
        match self {
            SubstrateZone::Shore => "SS",
            SubstrateZone::Bottom => "BS",
        }
    }

    pub fn classes(self) -> &'static [&'static str] {
        match self {
            SubstrateZone::Shore => SHORE_CLASSES,
            SubstrateZone::Bottom => BOTTOM_CLASSES,
        }
    }

    pub fn table_name(self) -> &'static str {
        match self {
            SubstrateZone::Shore => "shoreSubstrate",
            SubstrateZone::Bottom => "bottomSubstrate",
        }
    }

    pub fn schema(self, lookups: &LookupTables) -> TableSchema {
        TableSchema::class_codes(self.table_name(), self.classes(), &lookups.cover.codes())
    }
}

/// Calculate substrate metrics for one zone
pub fn calculate_substrate(
    zone: SubstrateZone,
    substrate: Option<&DataFrame>,
    lookups: &LookupTables,
    config: &AggregatorConfig,
) -> Result<MetricTable> {
    let p = zone.prefix();

    // STEP 1: Validate inputs and lookup coverage
    let mut args = config.standardizer(zone.table_name());
    let table = args.standardize(substrate, &zone.schema(lookups));
    for issue in lookups.cover.check_weights("coverClasses") {
        args.push(issue);
    }
    let mut out = MetricTable::new();
    out.warnings = args.finish()?;
    let Some(table) = table else {
        return Ok(out);
    };

    // STEP 2: Codes → covers, rescaled where a station is over-covered
    let mut rows = map_codes(&table, &lookups.cover)?;
    normalize_station_covers(&mut rows, zone.classes());
    let classes = seen_classes(&rows, zone.classes());
    debug!(zone = p, rows = rows.len(), classes = classes.len(), "substrate covers mapped");

    // STEP 3: Per-class statistics
    let fc = format!("{}FC", p);
    let v = format!("{}V", p);
    let n = format!("{}N", p);
    let pc = format!("{}PC", p);
    let summaries = push_class_metrics(
        &mut out,
        &rows,
        &classes,
        ClassPrefixes {
            mean: Some(fc.as_str()),
            sd: Some(v.as_str()),
            count: Some(n.as_str()),
            presence: Some(pc.as_str()),
        },
        None,
    )?;

    // STEP 4: Grain size from site mean covers
    let sites = sites_of(&rows);
    for site in &sites {
        let means: Vec<(String, Option<f64>)> = classes
            .iter()
            .map(|c| (c.clone(), summaries.get(&(site.clone(), c.clone())).and_then(|s| s.mean)))
            .collect();
        out.push_num(site, format!("{}XLDIA", p), site_log_diameter(&means, &lookups.diameters))?;
    }

    // STEP 5: Distribution of station grain sizes
    let mut per_site: BTreeMap<Key, Vec<Option<f64>>> = BTreeMap::new();
    for (key, ldia) in station_log_diameters(&rows, &lookups.diameters) {
        per_site.entry(key.site).or_default().push(ldia);
    }
    for (site, values) in &per_site {
        let d = distribution(values);
        out.push_num(site, format!("{}XLDIA_STA", p), d.mean)?;
        out.push_num(site, format!("{}VLDIA", p), d.sd)?;
        out.push_num(site, format!("{}16LDIA", p), d.p16)?;
        out.push_num(site, format!("{}25LDIA", p), d.p25)?;
        out.push_num(site, format!("{}50LDIA", p), d.p50)?;
        out.push_num(site, format!("{}75LDIA", p), d.p75)?;
        out.push_num(site, format!("{}84LDIA", p), d.p84)?;
    }

    // STEP 6: Modal classes
    for site in &sites {
        let by_cover: Vec<(&str, Option<f64>)> = classes
            .iter()
            .map(|c| (c.as_str(), summaries.get(&(site.clone(), c.clone())).and_then(|s| s.mean)))
            .collect();
        let by_presence: Vec<(&str, Option<f64>)> = classes
            .iter()
            .map(|c| (c.as_str(), summaries.get(&(site.clone(), c.clone())).and_then(|s| s.presence)))
            .collect();
        out.push(site, format!("{}OFCLASS", p), label_value(modal_class(&by_cover).label()))?;
        out.push(site, format!("{}OPCLASS", p), label_value(modal_class(&by_presence).label()))?;
    }

    debug!(zone = p, metrics = out.len(), "substrate metrics complete");
    Ok(out)
}

fn label_value(label: Option<String>) -> MetricValue {
    label.map_or(MetricValue::Null, MetricValue::Text)
}

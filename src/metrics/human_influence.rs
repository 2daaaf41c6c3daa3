//! HUMAN INFLUENCE (PROXIMITY OF DISTURBANCES)
//!
//! Proximity codes per disturbance class and station: `0` not present,
//! `P` present beyond the station plot, `C` present within it (circa).
//! Computed separately for the riparian zone (`_RIP`), the drawdown zone
//! (`_DD`, after fill-in) and the synthetic bank profile (`_SYN`).
//!
//! **Columns needed**: SITE, STATION, CLASS (disturbance), VALUE (proximity code)
//!
//! Per zone:
//!   - `HIPW<CLASS>`, `HIFP<CLASS>`, `HIN<CLASS>`: mean weight, presence, count
//!   - `HIFPANY`, `HIFPANYCIRCA`: stations with any (circa) disturbance
//!   - `HIPWALL`, `HIPWAG`, `HIPWNONAG`: null-safe sums of class means
//!   - `HINALL`, `HINAG`, `HINNONAG`: mean per-station variety
//!   - `HIVALL`: distinct disturbances present at the site

use crate::data::MetricTable;
use crate::drawdown::{reconcile_drawdown, synthesize};
use crate::error::{Issue, Result};
use crate::metrics::{
    drawdown_schema, horiz_dist_schema, metric_name, push_class_metrics, push_composite,
    seen_classes, sites_of, AggregatorConfig, ClassPrefixes,
};
use crate::utils::class_counter::{any_flag_fraction, mean_station_variety, site_variety, station_variety};
use crate::utils::lookup_tables::LookupTables;
use crate::utils::normalization::{map_codes, StationWeight};
use crate::utils::schema::TableSchema;
use polars::prelude::DataFrame;
use tracing::debug;

pub const HI_CLASSES: &[&str] = &[
    "BUILDINGS", "COMMERCIAL", "CROPS", "DOCKS", "LANDFILL", "LAWN", "ORCHARD", "OTHER", "PARK",
    "PASTURE", "POWERLINES", "ROAD", "WALLS",
];

/// Agricultural disturbances
pub const AG_CLASSES: &[&str] = &["CROPS", "ORCHARD", "PASTURE"];

/// Code written into structurally absent drawdown rows
pub const NO_INFLUENCE: &str = "0";

fn non_ag_classes() -> Vec<&'static str> {
    HI_CLASSES
        .iter()
        .copied()
        .filter(|c| !AG_CLASSES.contains(c))
        .collect()
}

pub fn riparian_schema(lookups: &LookupTables) -> TableSchema {
    TableSchema::class_codes("hiRiparian", HI_CLASSES, &lookups.proximity.codes())
}

pub fn drawdown_zone_schema(lookups: &LookupTables) -> TableSchema {
    TableSchema::class_codes("hiDrawdown", HI_CLASSES, &lookups.proximity.codes())
}

/// Calculate human influence metrics for all available zones
pub fn calculate_human_influence(
    riparian: Option<&DataFrame>,
    drawdown_zone: Option<&DataFrame>,
    horiz_dist: Option<&DataFrame>,
    drawdown: Option<&DataFrame>,
    lookups: &LookupTables,
    config: &AggregatorConfig,
) -> Result<MetricTable> {
    let policy = &config.drawdown;

    // STEP 1: Validate every input table in one pass
    let mut args = config.standardizer("humanInfluence");
    let rip = args.standardize(riparian, &riparian_schema(lookups));
    let dd = args.standardize(drawdown_zone, &drawdown_zone_schema(lookups));
    let horiz = args.standardize(horiz_dist, &horiz_dist_schema());
    let flags = args.standardize(drawdown, &drawdown_schema());
    for issue in lookups.proximity.check_weights("proximityClasses") {
        args.push(issue);
    }
    if policy.fill_drawdown && lookups.proximity.get(NO_INFLUENCE).is_none() {
        args.push(Issue::mismatch(
            "proximityClasses",
            format!("drawdown fill-in needs a row for code '{}'", NO_INFLUENCE),
        ));
    }
    let mut out = MetricTable::new();
    out.warnings = args.finish()?;

    // STEP 2: Riparian zone
    let rip_rows = match &rip {
        Some(t) => map_codes(t, &lookups.proximity)?,
        None => Vec::new(),
    };
    if !rip_rows.is_empty() {
        push_zone(&mut out, &rip_rows, "RIP")?;
    }

    // STEP 3: Drawdown zone after fill-in
    let dd_table = reconcile_drawdown(
        dd.as_ref(),
        rip.as_ref(),
        horiz.as_ref(),
        flags.as_ref(),
        NO_INFLUENCE,
        policy,
    );
    let dd_rows = match &dd_table {
        Some(t) => map_codes(t, &lookups.proximity)?,
        None => Vec::new(),
    };
    if !dd_rows.is_empty() {
        push_zone(&mut out, &dd_rows, "DD")?;
    }

    // STEP 4: Synthetic profile, requested whenever drawdown readings exist
    if policy.create_synthetic && dd.is_some() {
        let syn_rows = synthesize(&rip_rows, &dd_rows, horiz.as_ref(), policy.plot_width)?;
        if !syn_rows.is_empty() {
            push_zone(&mut out, &syn_rows, "SYN")?;
        }
    }

    debug!(metrics = out.len(), "human influence metrics complete");
    Ok(out)
}

fn push_zone(out: &mut MetricTable, rows: &[StationWeight], zone: &str) -> Result<()> {
    let classes = seen_classes(rows, HI_CLASSES);
    let summaries = push_class_metrics(
        out,
        rows,
        &classes,
        ClassPrefixes {
            mean: Some("HIPW"),
            sd: None,
            count: Some("HIN"),
            presence: Some("HIFP"),
        },
        Some(zone),
    )?;

    for (site, v) in any_flag_fraction(rows, HI_CLASSES, |r| r.present) {
        out.push_num(&site, metric_name("HIFPANY", "", Some(zone)), v)?;
    }
    for (site, v) in any_flag_fraction(rows, HI_CLASSES, |r| r.circa) {
        out.push_num(&site, metric_name("HIFPANYCIRCA", "", Some(zone)), v)?;
    }

    let non_ag = non_ag_classes();
    let groups: [(&str, &[&str]); 3] = [("ALL", HI_CLASSES), ("AG", AG_CLASSES), ("NONAG", non_ag.as_slice())];
    let sites = sites_of(rows);
    for (group, members) in groups {
        push_composite(out, &summaries, &sites, &metric_name("HIPW", group, Some(zone)), members)?;
        for (site, v) in mean_station_variety(&station_variety(rows, members)) {
            out.push_num(&site, metric_name("HIN", group, Some(zone)), v)?;
        }
    }

    for (site, n) in site_variety(rows, HI_CLASSES) {
        out.push_num(&site, metric_name("HIV", "ALL", Some(zone)), Some(n as f64))?;
    }
    Ok(())
}

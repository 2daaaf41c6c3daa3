//! FISH COVER
//!
//! Cover-class codes per fish cover type and station, in the littoral plot
//! (`_LIT`) and the drawdown zone (`_DD`), plus their synthetic blend
//! (`_SYN`). Cover types overlap, so nothing is normalized.
//!
//! **Columns needed**: SITE, STATION, CLASS (cover type), VALUE (cover code 0-4)

use crate::data::MetricTable;
use crate::drawdown::{reconcile_drawdown, synthesize};
use crate::error::Result;
use crate::metrics::{
    drawdown_schema, horiz_dist_schema, metric_name, push_class_metrics, push_composite,
    seen_classes, sites_of, AggregatorConfig, ClassPrefixes,
};
use crate::utils::class_counter::{any_flag_fraction, mean_station_variety, station_variety};
use crate::utils::lookup_tables::LookupTables;
use crate::utils::normalization::{map_codes, StationWeight};
use crate::utils::schema::TableSchema;
use polars::prelude::DataFrame;
use tracing::debug;

pub const FC_CLASSES: &[&str] = &[
    "AQUATIC", "BOULDERS", "BRUSH", "LEDGES", "LIVETREES", "OVERHANG", "SNAGS", "STRUCTURES",
];

static COMPOSITES: &[(&str, &[&str])] = &[
    ("FCIALL", FC_CLASSES),
    ("FCIBIG", &["BOULDERS", "LEDGES", "OVERHANG", "STRUCTURES"]),
    (
        "FCINATURAL",
        &["AQUATIC", "BOULDERS", "BRUSH", "LEDGES", "LIVETREES", "OVERHANG", "SNAGS"],
    ),
    ("FCIRIPVEG", &["BRUSH", "LIVETREES", "OVERHANG", "SNAGS"]),
];

const NO_COVER: &str = "0";

pub fn littoral_schema(lookups: &LookupTables) -> TableSchema {
    TableSchema::class_codes("fcLittoral", FC_CLASSES, &lookups.cover.codes())
}

pub fn drawdown_zone_schema(lookups: &LookupTables) -> TableSchema {
    TableSchema::class_codes("fcDrawdown", FC_CLASSES, &lookups.cover.codes())
}

/// Calculate fish cover metrics
pub fn calculate_fish_cover(
    littoral: Option<&DataFrame>,
    drawdown_zone: Option<&DataFrame>,
    horiz_dist: Option<&DataFrame>,
    drawdown: Option<&DataFrame>,
    lookups: &LookupTables,
    config: &AggregatorConfig,
) -> Result<MetricTable> {
    let policy = &config.drawdown;

    let mut args = config.standardizer("fishCover");
    let lit = args.standardize(littoral, &littoral_schema(lookups));
    let dd = args.standardize(drawdown_zone, &drawdown_zone_schema(lookups));
    let horiz = args.standardize(horiz_dist, &horiz_dist_schema());
    let flags = args.standardize(drawdown, &drawdown_schema());
    for issue in lookups.cover.check_weights("coverClasses") {
        args.push(issue);
    }
    let mut out = MetricTable::new();
    out.warnings = args.finish()?;

    let lit_rows = match &lit {
        Some(t) => map_codes(t, &lookups.cover)?,
        None => Vec::new(),
    };
    if !lit_rows.is_empty() {
        push_zone(&mut out, &lit_rows, "LIT")?;
    }

    let dd_table = reconcile_drawdown(dd.as_ref(), lit.as_ref(), horiz.as_ref(), flags.as_ref(), NO_COVER, policy);
    let dd_rows = match &dd_table {
        Some(t) => map_codes(t, &lookups.cover)?,
        None => Vec::new(),
    };
    if !dd_rows.is_empty() {
        push_zone(&mut out, &dd_rows, "DD")?;
    }

    if policy.create_synthetic && dd.is_some() {
        let syn_rows = synthesize(&lit_rows, &dd_rows, horiz.as_ref(), policy.plot_width)?;
        if !syn_rows.is_empty() {
            push_zone(&mut out, &syn_rows, "SYN")?;
        }
    }

    debug!(metrics = out.len(), "fish cover metrics complete");
    Ok(out)
}

fn push_zone(out: &mut MetricTable, rows: &[StationWeight], zone: &str) -> Result<()> {
    let classes = seen_classes(rows, FC_CLASSES);
    let summaries = push_class_metrics(
        out,
        rows,
        &classes,
        ClassPrefixes {
            mean: Some("FCFC"),
            sd: Some("FCV"),
            count: Some("FCN"),
            presence: Some("FCFP"),
        },
        Some(zone),
    )?;

    for (site, v) in any_flag_fraction(rows, FC_CLASSES, |r| r.present) {
        out.push_num(&site, metric_name("FCFP", "ALL", Some(zone)), v)?;
    }

    let sites = sites_of(rows);
    for (name, members) in COMPOSITES {
        push_composite(out, &summaries, &sites, &metric_name(name, "", Some(zone)), members)?;
    }

    for (site, v) in mean_station_variety(&station_variety(rows, FC_CLASSES)) {
        out.push_num(&site, metric_name("FCN", "ALL", Some(zone)), v)?;
    }
    Ok(())
}

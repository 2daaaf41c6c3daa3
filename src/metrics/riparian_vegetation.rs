//! RIPARIAN VEGETATION COVER AND STRUCTURE
//!
//! Cover-class codes for canopy, understory and ground layers per station,
//! in the riparian plot and the drawdown zone. Ground-layer classes share
//! one cover budget and are normalized per station; canopy and understory
//! classes overlap and are left as recorded.
//!
//! **Columns needed**: SITE, STATION, CLASS (layer class), VALUE (cover code 0-4)
//!
//! Per zone (`_RIP`, `_DD`, `_SYN`):
//!   - `RVFC<CLASS>`, `RVV<CLASS>`, `RVN<CLASS>`, `RVFP<CLASS>`
//!   - `RVICANOPY`, `RVIUNDERSTORY`, `RVICANUND`, `RVIGROUND`, `RVIWOODY`:
//!     null-safe sums of class mean covers
//!
//! Riparian only: `RVFPCAN<TYPE>_RIP`, `RVFPUND<TYPE>_RIP` vegetation type
//! fractions for the canopy and understory layers.

use crate::data::{Key, MetricTable, ObservationTable};
use crate::drawdown::{reconcile_drawdown, synthesize};
use crate::error::Result;
use crate::metrics::{
    drawdown_schema, horiz_dist_schema, push_class_metrics, push_composite, seen_classes, sites_of,
    AggregatorConfig, ClassPrefixes,
};
use crate::utils::lookup_tables::LookupTables;
use crate::utils::normalization::{map_codes, normalize_station_covers, StationWeight};
use crate::utils::schema::TableSchema;
use polars::prelude::DataFrame;
use std::collections::BTreeMap;
use tracing::debug;

pub const RV_CLASSES: &[&str] = &[
    "CANBIG", "CANSMALL", "UNDWOODY", "UNDNONW", "GNDWOODY", "GNDNONW", "GNDBARE", "GNDINUNDATED",
];

/// Ground-layer classes competing for one cover budget
pub const GROUND_CLASSES: &[&str] = &["GNDWOODY", "GNDNONW", "GNDBARE", "GNDINUNDATED"];

static COMPOSITES: &[(&str, &[&str])] = &[
    ("RVICANOPY", &["CANBIG", "CANSMALL"]),
    ("RVIUNDERSTORY", &["UNDWOODY", "UNDNONW"]),
    ("RVICANUND", &["CANBIG", "CANSMALL", "UNDWOODY", "UNDNONW"]),
    ("RVIGROUND", &["GNDWOODY", "GNDNONW"]),
    ("RVIWOODY", &["CANBIG", "CANSMALL", "UNDWOODY", "GNDWOODY"]),
];

/// Vegetation type code → metric suffix
static VEG_TYPES: &[(&str, &str)] = &[
    ("D", "DECIDUOUS"),
    ("C", "CONIFEROUS"),
    ("E", "BROADLEAF"),
    ("M", "MIXED"),
    ("N", "NONE"),
];

/// Layer class in the type table → metric prefix
static TYPE_LAYERS: &[(&str, &str)] = &[("CANOPY", "RVFPCAN"), ("UNDERSTORY", "RVFPUND")];

const NO_COVER: &str = "0";

pub fn riparian_schema(lookups: &LookupTables) -> TableSchema {
    TableSchema::class_codes("rvRiparian", RV_CLASSES, &lookups.cover.codes())
}

pub fn drawdown_zone_schema(lookups: &LookupTables) -> TableSchema {
    TableSchema::class_codes("rvDrawdown", RV_CLASSES, &lookups.cover.codes())
}

pub fn type_schema() -> TableSchema {
    let layers: Vec<&str> = TYPE_LAYERS.iter().map(|(l, _)| *l).collect();
    let codes: Vec<&str> = VEG_TYPES.iter().map(|(c, _)| *c).collect();
    TableSchema::class_codes("rvType", &layers, &codes)
}

/// Calculate riparian vegetation metrics
pub fn calculate_riparian_vegetation(
    riparian: Option<&DataFrame>,
    drawdown_zone: Option<&DataFrame>,
    veg_type: Option<&DataFrame>,
    horiz_dist: Option<&DataFrame>,
    drawdown: Option<&DataFrame>,
    lookups: &LookupTables,
    config: &AggregatorConfig,
) -> Result<MetricTable> {
    let policy = &config.drawdown;

    // STEP 1: Validate inputs
    let mut args = config.standardizer("riparianVegetation");
    let rip = args.standardize(riparian, &riparian_schema(lookups));
    let dd = args.standardize(drawdown_zone, &drawdown_zone_schema(lookups));
    let types = args.standardize(veg_type, &type_schema());
    let horiz = args.standardize(horiz_dist, &horiz_dist_schema());
    let flags = args.standardize(drawdown, &drawdown_schema());
    for issue in lookups.cover.check_weights("coverClasses") {
        args.push(issue);
    }
    let mut out = MetricTable::new();
    out.warnings = args.finish()?;

    // STEP 2: Riparian plot
    let rip_rows = match &rip {
        Some(t) => cover_rows(t, lookups)?,
        None => Vec::new(),
    };
    if !rip_rows.is_empty() {
        push_zone(&mut out, &rip_rows, "RIP")?;
    }

    // STEP 3: Drawdown zone after fill-in
    let dd_table = reconcile_drawdown(dd.as_ref(), rip.as_ref(), horiz.as_ref(), flags.as_ref(), NO_COVER, policy);
    let dd_rows = match &dd_table {
        Some(t) => cover_rows(t, lookups)?,
        None => Vec::new(),
    };
    if !dd_rows.is_empty() {
        push_zone(&mut out, &dd_rows, "DD")?;
    }

    // STEP 4: Synthetic profile; blends of normalized covers stay normalized
    if policy.create_synthetic && dd.is_some() {
        let syn_rows = synthesize(&rip_rows, &dd_rows, horiz.as_ref(), policy.plot_width)?;
        if !syn_rows.is_empty() {
            push_zone(&mut out, &syn_rows, "SYN")?;
        }
    }

    // STEP 5: Vegetation type fractions
    if let Some(types) = &types {
        push_type_fractions(&mut out, types)?;
    }

    debug!(metrics = out.len(), "riparian vegetation metrics complete");
    Ok(out)
}

fn cover_rows(table: &ObservationTable, lookups: &LookupTables) -> Result<Vec<StationWeight>> {
    let mut rows = map_codes(table, &lookups.cover)?;
    normalize_station_covers(&mut rows, GROUND_CLASSES);
    Ok(rows)
}

fn push_zone(out: &mut MetricTable, rows: &[StationWeight], zone: &str) -> Result<()> {
    let classes = seen_classes(rows, RV_CLASSES);
    let summaries = push_class_metrics(
        out,
        rows,
        &classes,
        ClassPrefixes {
            mean: Some("RVFC"),
            sd: Some("RVV"),
            count: Some("RVN"),
            presence: Some("RVFP"),
        },
        Some(zone),
    )?;

    let sites = sites_of(rows);
    for (name, members) in COMPOSITES {
        push_composite(out, &summaries, &sites, &format!("{}_{}", name, zone), members)?;
    }
    Ok(())
}

fn push_type_fractions(out: &mut MetricTable, types: &ObservationTable) -> Result<()> {
    for (layer, prefix) in TYPE_LAYERS {
        // site → (non-null stations, stations per type code)
        let mut tallies: BTreeMap<Key, (usize, BTreeMap<String, usize>)> = BTreeMap::new();
        for row in types.for_class(layer) {
            let entry = tallies.entry(row.site.clone()).or_default();
            if let Some(code) = row.value.as_code() {
                entry.0 += 1;
                *entry.1.entry(code.to_string()).or_default() += 1;
            }
        }

        for (site, (n, counts)) in &tallies {
            for (code, suffix) in VEG_TYPES {
                let v = if *n == 0 {
                    None
                } else {
                    Some(counts.get(*code).copied().unwrap_or(0) as f64 / *n as f64)
                };
                out.push_num(site, format!("{}{}_RIP", prefix, suffix), v)?;
            }
        }
    }
    Ok(())
}

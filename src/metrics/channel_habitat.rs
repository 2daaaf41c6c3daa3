//! CHANNEL HABITAT UNITS
//!
//! One channel unit code per station (riffle, glide, pool types, dry
//! channel...). Reported as percentages of stations with a recorded unit,
//! per code and per flow type.
//!
//! Metrics: `PCT_<CODE>`, `PCT_FAST`, `PCT_SLOW`, `PCT_POOL`, `PCT_DRS`, `N_CH`

use crate::data::{Key, MetricTable, MetricValue, ObservationTable};
use crate::error::Result;
use crate::metrics::AggregatorConfig;
use crate::utils::lookup_tables::{ClassWeightTable, FlowType, LookupTables};
use crate::utils::schema::TableSchema;
use polars::prelude::DataFrame;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

static FLOW_METRICS: &[(FlowType, &str)] = &[
    (FlowType::Fast, "PCT_FAST"),
    (FlowType::Slow, "PCT_SLOW"),
    (FlowType::Pool, "PCT_POOL"),
    (FlowType::Dry, "PCT_DRS"),
];

pub fn channel_unit_schema(lookups: &LookupTables) -> TableSchema {
    TableSchema::station_codes("channelUnit", &lookups.channel_units.codes())
}

/// Calculate channel habitat percentages
pub fn calculate_channel_habitat(
    channel_unit: Option<&DataFrame>,
    lookups: &LookupTables,
    config: &AggregatorConfig,
) -> Result<MetricTable> {
    let mut args = config.standardizer("channelHabitat");
    let units = args.standardize(channel_unit, &channel_unit_schema(lookups));
    let mut out = MetricTable::new();
    out.warnings = args.finish()?;

    if let Some(units) = &units {
        push_unit_metrics(&mut out, units, &lookups.channel_units)?;
    }

    debug!(metrics = out.len(), "channel habitat metrics complete");
    Ok(out)
}

fn push_unit_metrics(out: &mut MetricTable, units: &ObservationTable, lookup: &ClassWeightTable) -> Result<()> {
    let mut tallies: BTreeMap<Key, (usize, BTreeMap<String, usize>)> = BTreeMap::new();
    let mut seen: BTreeSet<String> = BTreeSet::new();
    for row in &units.rows {
        let entry = tallies.entry(row.site.clone()).or_default();
        if let Some(code) = row.value.as_code() {
            entry.0 += 1;
            *entry.1.entry(code.to_string()).or_default() += 1;
            seen.insert(code.to_string());
        }
    }
    let codes: Vec<String> = lookup.codes().into_iter().filter(|c| seen.contains(c)).collect();

    for (site, (n, counts)) in &tallies {
        let pct = |k: usize| if *n == 0 { None } else { Some(100.0 * k as f64 / *n as f64) };

        for code in &codes {
            let k = counts.get(code).copied().unwrap_or(0);
            out.push_num(site, format!("PCT_{}", code), pct(k))?;
        }
        for (flow, name) in FLOW_METRICS {
            let k: usize = counts
                .iter()
                .filter(|(code, _)| lookup.flow(code) == Some(*flow))
                .map(|(_, k)| *k)
                .sum();
            out.push_num(site, *name, pct(k))?;
        }
        out.push(site, "N_CH", MetricValue::Num(*n as f64))?;
    }
    Ok(())
}

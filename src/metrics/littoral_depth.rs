//! LITTORAL DEPTH
//!
//! Water depth (m) at each station's littoral plot.
//!
//! Metrics: `XLIT` mean, `VLIT` sd, `MNLIT` min, `MXLIT` max, `NLIT` count,
//! `50LIT` median (type-2 quantile)

use crate::data::{Key, MetricTable, MetricValue};
use crate::error::Result;
use crate::metrics::AggregatorConfig;
use crate::utils::schema::{ColumnSpec, TableSchema};
use crate::utils::stats;
use polars::prelude::DataFrame;
use std::collections::BTreeMap;
use tracing::debug;

pub fn depth_schema() -> TableSchema {
    TableSchema::station_numbers("littoralDepth", ColumnSpec::numeric(0.0, 500.0))
}

/// Calculate littoral depth statistics
pub fn calculate_littoral_depth(depth: Option<&DataFrame>, config: &AggregatorConfig) -> Result<MetricTable> {
    let mut args = config.standardizer("littoralDepth");
    let table = args.standardize(depth, &depth_schema());
    let mut out = MetricTable::new();
    out.warnings = args.finish()?;
    let Some(table) = table else {
        return Ok(out);
    };

    let mut by_site: BTreeMap<Key, Vec<Option<f64>>> = BTreeMap::new();
    for row in &table.rows {
        by_site.entry(row.site.clone()).or_default().push(row.value.as_f64());
    }

    for (site, values) in &by_site {
        out.push_num(site, "XLIT", stats::mean(values))?;
        out.push_num(site, "VLIT", stats::sd(values))?;
        out.push_num(site, "MNLIT", stats::min(values))?;
        out.push_num(site, "MXLIT", stats::max(values))?;
        out.push(site, "NLIT", MetricValue::Num(stats::count(values) as f64))?;
        out.push_num(site, "50LIT", stats::quantile_type2(values, 0.5))?;
    }

    debug!(sites = by_site.len(), "littoral depth metrics complete");
    Ok(out)
}

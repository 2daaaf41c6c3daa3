//! BANK MORPHOLOGY
//!
//! Bank angle class per station, and the horizontal and vertical extent of
//! the drawdown zone. Distances arrive from field forms as free text often
//! enough that unparseable entries are read as missing rather than rejected.
//!
//! Metrics:
//!   - `BFF<CLASS>`: fraction of stations with that angle class
//!   - `BFN<CLASS>`: stations with that angle class
//!   - `BFNANGLE`: stations with an angle recorded
//!   - `BFOANGLE`: modal angle class
//!   - `BFXHORIZDIST_DD`, `BFVHORIZDIST_DD`, `BFNHORIZDIST_DD` and the
//!     `VERTHEIGHT_DD` counterparts: mean, sd and count of drawdown extent

use crate::data::{Key, MetricTable, MetricValue, ObservationTable};
use crate::error::Result;
use crate::metrics::{horiz_dist_schema, vert_height_schema, AggregatorConfig};
use crate::utils::lookup_tables::LookupTables;
use crate::utils::normalization::modal_class;
use crate::utils::schema::TableSchema;
use crate::utils::stats;
use polars::prelude::DataFrame;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

pub fn angle_schema(lookups: &LookupTables) -> TableSchema {
    TableSchema::station_codes("bankAngle", &lookups.bank_angles.codes())
}

/// Calculate bank morphology metrics
pub fn calculate_bank_morphology(
    angle: Option<&DataFrame>,
    horiz_dist: Option<&DataFrame>,
    vert_height: Option<&DataFrame>,
    lookups: &LookupTables,
    config: &AggregatorConfig,
) -> Result<MetricTable> {
    let mut args = config.standardizer("bankMorphology");
    let angles = args.standardize(angle, &angle_schema(lookups));
    let horiz = args.standardize(horiz_dist, &horiz_dist_schema());
    let vert = args.standardize(vert_height, &vert_height_schema());
    let mut out = MetricTable::new();
    out.warnings = args.finish()?;

    if let Some(angles) = &angles {
        push_angle_metrics(&mut out, angles, &lookups.bank_angles.codes())?;
    }
    if let Some(horiz) = &horiz {
        push_extent_metrics(&mut out, horiz, "HORIZDIST_DD")?;
    }
    if let Some(vert) = &vert {
        push_extent_metrics(&mut out, vert, "VERTHEIGHT_DD")?;
    }

    debug!(metrics = out.len(), "bank morphology metrics complete");
    Ok(out)
}

fn push_angle_metrics(out: &mut MetricTable, angles: &ObservationTable, canonical: &[String]) -> Result<()> {
    // site → angle class → stations
    let mut tallies: BTreeMap<Key, (usize, BTreeMap<String, usize>)> = BTreeMap::new();
    let mut seen: BTreeSet<String> = BTreeSet::new();
    for row in &angles.rows {
        let entry = tallies.entry(row.site.clone()).or_default();
        if let Some(code) = row.value.as_code() {
            entry.0 += 1;
            *entry.1.entry(code.to_string()).or_default() += 1;
            seen.insert(code.to_string());
        }
    }
    let classes: Vec<&String> = canonical.iter().filter(|c| seen.contains(*c)).collect();

    for (site, (n, counts)) in &tallies {
        let mut freqs: Vec<(&str, Option<f64>)> = Vec::with_capacity(classes.len());
        for class in &classes {
            let k = counts.get(*class).copied().unwrap_or(0);
            let frac = if *n == 0 { None } else { Some(k as f64 / *n as f64) };
            out.push_num(site, format!("BFF{}", class), frac)?;
            out.push(site, format!("BFN{}", class), MetricValue::Num(k as f64))?;
            freqs.push((class.as_str(), frac));
        }
        out.push(site, "BFNANGLE", MetricValue::Num(*n as f64))?;
        let mode = modal_class(&freqs).label();
        out.push(site, "BFOANGLE", mode.map_or(MetricValue::Null, MetricValue::Text))?;
    }
    Ok(())
}

fn push_extent_metrics(out: &mut MetricTable, table: &ObservationTable, suffix: &str) -> Result<()> {
    let mut by_site: BTreeMap<Key, Vec<Option<f64>>> = BTreeMap::new();
    for row in &table.rows {
        by_site.entry(row.site.clone()).or_default().push(row.value.as_f64());
    }
    for (site, values) in &by_site {
        out.push_num(site, format!("BFX{}", suffix), stats::mean(values))?;
        out.push_num(site, format!("BFV{}", suffix), stats::sd(values))?;
        out.push(site, format!("BFN{}", suffix), MetricValue::Num(stats::count(values) as f64))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use polars::prelude::*;

    #[test]
    fn test_angle_fractions_and_mode() {
        let df = df![
            "SITE" => [1i64, 1, 1, 1, 2],
            "STATION" => ["A", "B", "C", "D", "A"],
            "VALUE" => [Some("STEEP"), Some("GRADUAL"), Some("STEEP"), None, Some("FLAT")],
        ]
        .unwrap();
        let out = calculate_bank_morphology(
            Some(&df),
            None,
            None,
            &LookupTables::default(),
            &AggregatorConfig::default(),
        )
        .unwrap();

        let site = Key::from(1);
        assert_relative_eq!(out.get(&site, "BFFSTEEP").unwrap().as_f64().unwrap(), 2.0 / 3.0);
        assert_relative_eq!(out.get(&site, "BFFFLAT").unwrap().as_f64().unwrap(), 0.0);
        assert_eq!(out.get(&site, "BFNANGLE"), Some(&MetricValue::Num(3.0)));
        assert_eq!(out.get(&site, "BFOANGLE"), Some(&MetricValue::Text("STEEP".into())));
        assert_eq!(out.get(&Key::from(2), "BFNSTEEP"), Some(&MetricValue::Num(0.0)));
        // VERTICAL never observed anywhere → not part of the grid
        assert!(out.get(&site, "BFFVERTICAL").is_none());
    }

    #[test]
    fn test_extent_text_coerced_to_missing() {
        let horiz = df![
            "SITE" => [1i64, 1, 1],
            "STATION" => ["A", "B", "C"],
            "VALUE" => ["2.5", "n/a", "3.5"],
        ]
        .unwrap();
        let out = calculate_bank_morphology(
            None,
            Some(&horiz),
            None,
            &LookupTables::default(),
            &AggregatorConfig::default(),
        )
        .unwrap();

        let site = Key::from(1);
        assert_relative_eq!(out.get(&site, "BFXHORIZDIST_DD").unwrap().as_f64().unwrap(), 3.0);
        assert_eq!(out.get(&site, "BFNHORIZDIST_DD"), Some(&MetricValue::Num(2.0)));
        assert!(out.warnings.is_empty());
    }
}

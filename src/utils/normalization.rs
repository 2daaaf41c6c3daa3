//! Cover Normalization Engine
//!
//! Converts categorical station codes into numeric weights, rescales
//! competing covers at a station, and reduces station values to site-level
//! statistics: mean, sd, count, presence fraction, grain-size indices and
//! modal classes.

use crate::data::{Key, ObservationTable, StationKey, Value};
use crate::error::{PhabError, Result};
use crate::utils::lookup_tables::ClassWeightTable;
use crate::utils::stats;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::collections::BTreeMap;

/// Numeric reading of one class at one station
#[derive(Debug, Clone, PartialEq)]
pub struct StationWeight {
    pub key: StationKey,
    pub class: String,
    pub weight: Option<f64>,
    pub present: Option<bool>,
    pub circa: Option<bool>,
}

impl StationWeight {
    pub fn missing(key: StationKey, class: impl Into<String>) -> Self {
        Self {
            key,
            class: class.into(),
            weight: None,
            present: None,
            circa: None,
        }
    }
}

/// Map each coded row to its weight and flags
///
/// Standardization already limits codes to the table, so an unmapped code
/// here means the lookup table changed between the two steps.
pub fn map_codes(table: &ObservationTable, lookup: &ClassWeightTable) -> Result<Vec<StationWeight>> {
    let mut out = Vec::with_capacity(table.len());
    for row in &table.rows {
        let (Some(key), Some(class)) = (row.station_key(), row.class.clone()) else {
            continue;
        };
        let mapped = match &row.value {
            Value::Text(code) => {
                let entry = lookup.get(code).ok_or_else(|| {
                    PhabError::StructuralMismatch(format!(
                        "{}: no lookup row for code '{}'",
                        table.name, code
                    ))
                })?;
                StationWeight {
                    key,
                    class,
                    weight: entry.weight,
                    present: Some(entry.present),
                    circa: Some(entry.circa),
                }
            }
            _ => StationWeight::missing(key, class),
        };
        out.push(mapped);
    }
    Ok(out)
}

/// Rescale competing covers so a station never exceeds full cover
///
/// Only classes in `competing` take part. When their non-null sum at a
/// station exceeds 1 each is divided by the sum; sums at or below 1 are
/// left untouched. All-null stations stay null.
pub fn normalize_station_covers(rows: &mut [StationWeight], competing: &[&str]) {
    let mut totals: FxHashMap<StationKey, f64> = FxHashMap::default();
    let mut station_values: FxHashMap<StationKey, Vec<Option<f64>>> = FxHashMap::default();

    for row in rows.iter().filter(|r| competing.contains(&r.class.as_str())) {
        station_values.entry(row.key.clone()).or_default().push(row.weight);
    }
    for (key, values) in station_values {
        if let Some(total) = stats::sum(&values) {
            totals.insert(key, total);
        }
    }

    for row in rows.iter_mut() {
        if !competing.contains(&row.class.as_str()) {
            continue;
        }
        if let (Some(w), Some(&total)) = (row.weight, totals.get(&row.key)) {
            if total > 1.0 {
                row.weight = Some(w / total);
            }
        }
    }
}

/// Site-level reduction of one class
#[derive(Debug, Clone, PartialEq)]
pub struct ClassSummary {
    pub mean: Option<f64>,
    pub sd: Option<f64>,
    pub count: usize,
    /// Fraction of non-null stations where the class is present
    pub presence: Option<f64>,
}

/// Reduce station readings to (site, class) summaries
///
/// Only groups with at least one row appear; counts of zero for classes
/// absent from a site are added by the dense count helpers.
pub fn summarize(rows: &[StationWeight]) -> BTreeMap<(Key, String), ClassSummary> {
    let mut weights: BTreeMap<(Key, String), Vec<Option<f64>>> = BTreeMap::new();
    let mut presence: BTreeMap<(Key, String), Vec<Option<f64>>> = BTreeMap::new();

    for row in rows {
        let group = (row.key.site.clone(), row.class.clone());
        weights.entry(group.clone()).or_default().push(row.weight);
        presence
            .entry(group)
            .or_default()
            .push(row.present.map(|p| if p { 1.0 } else { 0.0 }));
    }

    weights
        .into_iter()
        .map(|(group, values)| {
            let pres = presence.get(&group).and_then(|p| stats::mean(p));
            let summary = ClassSummary {
                mean: stats::mean(&values),
                sd: stats::sd(&values),
                count: stats::count(&values),
                presence: pres,
            };
            (group, summary)
        })
        .collect()
}

/// Cover-weighted mean log10 diameter at each station
///
/// Classes without a diameter, and covers that are null or zero, are left
/// out. A station with nothing left is null.
pub fn station_log_diameters(
    rows: &[StationWeight],
    diameters: &ClassWeightTable,
) -> BTreeMap<StationKey, Option<f64>> {
    let mut terms: BTreeMap<StationKey, Vec<(f64, f64)>> = BTreeMap::new();
    for row in rows {
        let entry = terms.entry(row.key.clone()).or_default();
        if let (Some(c), Some(d)) = (row.weight, diameters.diameter(&row.class)) {
            if c > 0.0 && d > 0.0 {
                entry.push((c, d.log10()));
            }
        }
    }
    terms
        .into_iter()
        .map(|(key, t)| (key, weighted_log_mean(&t)))
        .collect()
}

/// Site grain-size index from site mean covers
///
/// Sum of `cover × log10(diameter)` over classes with a diameter and a
/// positive mean cover. Null when no such class is left.
pub fn site_log_diameter(class_means: &[(String, Option<f64>)], diameters: &ClassWeightTable) -> Option<f64> {
    let terms: Vec<Option<f64>> = class_means
        .iter()
        .filter_map(|(class, cover)| match (cover, diameters.diameter(class)) {
            (Some(c), Some(d)) if *c > 0.0 && d > 0.0 => Some(Some(c * d.log10())),
            _ => None,
        })
        .collect();
    stats::sum(&terms)
}

fn weighted_log_mean(terms: &[(f64, f64)]) -> Option<f64> {
    let total = stats::sum(&terms.iter().map(|(c, _)| Some(*c)).collect::<Vec<_>>())?;
    if total <= 0.0 {
        return None;
    }
    let weighted = stats::sum(&terms.iter().map(|(c, l)| Some(c * l)).collect::<Vec<_>>())?;
    Some(weighted / total)
}

/// Distribution of station values across a site
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Distribution {
    pub mean: Option<f64>,
    pub sd: Option<f64>,
    pub p16: Option<f64>,
    pub p25: Option<f64>,
    pub p50: Option<f64>,
    pub p75: Option<f64>,
    pub p84: Option<f64>,
}

/// Mean, sd and type-2 percentiles of station values
pub fn distribution(values: &[Option<f64>]) -> Distribution {
    let sorted = stats::ordered(values.iter().copied());
    let q = |p: f64| stats::quantile_type2_sorted(&sorted, p);
    Distribution {
        mean: stats::mean(values),
        sd: stats::sd(values),
        p16: q(0.16),
        p25: q(0.25),
        p50: q(0.50),
        p75: q(0.75),
        p84: q(0.84),
    }
}

/// Separator between tied modal class names
pub const TIE_SEPARATOR: &str = ", ";

/// Most frequent class at a site
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModalClass {
    /// Every frequency is zero or missing
    NoMode,
    Single(String),
    /// Tied classes in canonical order
    Tie(SmallVec<[String; 4]>),
}

impl ModalClass {
    /// Label written to the metric table; no mode is written as null
    pub fn label(&self) -> Option<String> {
        match self {
            ModalClass::NoMode => None,
            ModalClass::Single(c) => Some(c.clone()),
            ModalClass::Tie(cs) => Some(cs.join(TIE_SEPARATOR)),
        }
    }
}

/// Pick the modal class from frequencies listed in canonical class order
pub fn modal_class<S: AsRef<str>>(freqs: &[(S, Option<f64>)]) -> ModalClass {
    let best = freqs
        .iter()
        .filter_map(|(_, f)| *f)
        .fold(f64::NEG_INFINITY, f64::max);
    if !(best > 0.0) {
        return ModalClass::NoMode;
    }

    let tied: SmallVec<[String; 4]> = freqs
        .iter()
        .filter(|(_, f)| f.map_or(false, |v| (v - best).abs() <= 1e-12))
        .map(|(c, _)| c.as_ref().to_string())
        .collect();

    if tied.len() == 1 {
        ModalClass::Single(tied[0].clone())
    } else {
        ModalClass::Tie(tied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Observation;
    use approx::assert_relative_eq;

    fn sk(site: i64, station: &str) -> StationKey {
        StationKey::new(Key::from(site), Key::from(station))
    }

    fn sw(site: i64, station: &str, class: &str, w: Option<f64>) -> StationWeight {
        StationWeight {
            key: sk(site, station),
            class: class.to_string(),
            weight: w,
            present: w.map(|v| v > 0.0),
            circa: None,
        }
    }

    #[test]
    fn test_map_codes() {
        let table = ObservationTable::new(
            "cover",
            vec![
                Observation::new(1, "A", Value::Text("2".into())).with_class("SAND"),
                Observation::new(1, "B", Value::Null).with_class("SAND"),
            ],
        );
        let rows = map_codes(&table, &ClassWeightTable::cover_classes()).unwrap();
        assert_eq!(rows[0].weight, Some(0.25));
        assert_eq!(rows[0].present, Some(true));
        assert_eq!(rows[1].weight, None);

        let bad = ObservationTable::new(
            "cover",
            vec![Observation::new(1, "A", Value::Text("9".into())).with_class("SAND")],
        );
        assert!(map_codes(&bad, &ClassWeightTable::cover_classes()).is_err());
    }

    #[test]
    fn test_normalization_only_corrects_over_coverage() {
        let mut rows = vec![
            sw(1, "A", "SAND", Some(0.875)),
            sw(1, "A", "SILT", Some(0.575)),
            sw(1, "B", "SAND", Some(0.25)),
            sw(1, "B", "SILT", Some(0.05)),
            sw(1, "C", "SAND", None),
            sw(1, "C", "SILT", None),
        ];
        normalize_station_covers(&mut rows, &["SAND", "SILT"]);

        // A: sum 1.45 > 1 → rescaled, sums to 1, ratio kept
        let a_sand = rows[0].weight.unwrap();
        let a_silt = rows[1].weight.unwrap();
        assert_relative_eq!(a_sand + a_silt, 1.0, epsilon = 1e-12);
        assert_relative_eq!(a_sand / a_silt, 0.875 / 0.575, epsilon = 1e-12);

        // B: sum 0.30 → untouched
        assert_eq!(rows[2].weight, Some(0.25));
        assert_eq!(rows[3].weight, Some(0.05));

        // C: all missing stays missing
        assert_eq!(rows[4].weight, None);
    }

    #[test]
    fn test_non_competing_classes_untouched() {
        let mut rows = vec![sw(1, "A", "SAND", Some(0.875)), sw(1, "A", "CANOPY", Some(0.875))];
        normalize_station_covers(&mut rows, &["SAND"]);
        assert_eq!(rows[0].weight, Some(0.875));
        assert_eq!(rows[1].weight, Some(0.875));
    }

    #[test]
    fn test_summarize_ignores_nulls() {
        let mut rows = Vec::new();
        for i in 0..6 {
            rows.push(sw(1, &format!("S{}", i), "SAND", Some(0.25)));
        }
        for i in 6..10 {
            rows.push(sw(1, &format!("S{}", i), "SAND", None));
        }
        let s = summarize(&rows);
        let sand = &s[&(Key::from(1), "SAND".to_string())];
        assert_relative_eq!(sand.mean.unwrap(), 0.25);
        assert_eq!(sand.count, 6);
        assert_relative_eq!(sand.sd.unwrap(), 0.0);
        assert_relative_eq!(sand.presence.unwrap(), 1.0);
    }

    #[test]
    fn test_log_diameters() {
        let d = ClassWeightTable::substrate_diameters();
        let rows = vec![
            sw(1, "A", "BOULDERS", Some(0.5)),
            sw(1, "A", "SAND", Some(0.5)),
            sw(1, "A", "WOOD", Some(0.5)),
            sw(1, "B", "SAND", Some(0.0)),
        ];
        let per_station = station_log_diameters(&rows, &d);
        let expected = (3.0 + 0.346f64.log10()) / 2.0;
        assert_relative_eq!(per_station[&sk(1, "A")].unwrap(), expected, epsilon = 1e-12);
        assert_eq!(per_station[&sk(1, "B")], None);

        let site = site_log_diameter(
            &[("BOULDERS".into(), Some(0.25)), ("SILT".into(), None), ("OTHER".into(), Some(0.5))],
            &d,
        );
        // covers are not rescaled to one
        assert_relative_eq!(site.unwrap(), 0.75, epsilon = 1e-12);

        let none = site_log_diameter(&[("WOOD".into(), Some(0.5)), ("SAND".into(), Some(0.0))], &d);
        assert_eq!(none, None);
    }

    #[test]
    fn test_modal_class_tie_in_canonical_order() {
        let m = modal_class(&[("A", Some(0.5)), ("B", Some(0.5)), ("C", Some(0.0))]);
        assert_eq!(m.label(), Some("A, B".to_string()));
        assert!(matches!(m, ModalClass::Tie(_)));

        let m = modal_class(&[("B", Some(0.5)), ("A", Some(0.5))]);
        assert_eq!(m.label(), Some("B, A".to_string()));

        let m = modal_class(&[("A", Some(0.2)), ("B", Some(0.7))]);
        assert_eq!(m, ModalClass::Single("B".into()));

        let m = modal_class(&[("A", Some(0.0)), ("B", None)]);
        assert_eq!(m, ModalClass::NoMode);
        assert_eq!(m.label(), None);
    }

    #[test]
    fn test_distribution_uses_type2_quantiles() {
        let values: Vec<Option<f64>> = (1..=10).map(|i| Some(i as f64)).chain([None]).collect();
        let d = distribution(&values);
        assert_relative_eq!(d.mean.unwrap(), 5.5);
        assert_relative_eq!(d.p50.unwrap(), 5.5);
        assert_relative_eq!(d.p16.unwrap(), 2.0);
        assert_relative_eq!(d.p84.unwrap(), 9.0);
    }
}

//! Class Presence and Variety Counter
//!
//! Counts how many classes are present at each station and across each
//! site, how often any class of a group is present, and fills out the
//! dense (site × class) grid for sample-size metrics.

use crate::data::{Key, StationKey};
use crate::utils::normalization::{ClassSummary, StationWeight};
use crate::utils::stats;
use rustc_hash::FxHashSet;
use std::collections::{BTreeMap, BTreeSet};

/// Sample size for every (site, class) pair, zero where a site lacks the class
///
/// `sites` are the sites with any data in the family, `classes` the classes
/// seen anywhere in the family input.
pub fn dense_counts(
    sites: &BTreeSet<Key>,
    classes: &[String],
    summaries: &BTreeMap<(Key, String), ClassSummary>,
) -> Vec<(Key, String, usize)> {
    let mut out = Vec::with_capacity(sites.len() * classes.len());
    for site in sites {
        for class in classes {
            let n = summaries
                .get(&(site.clone(), class.clone()))
                .map_or(0, |s| s.count);
            out.push((site.clone(), class.clone(), n));
        }
    }
    out
}

/// Number of `classes` present at each station
///
/// A station where any of its rows has an unknown presence is null. Classes
/// with no row at a station do not count either way.
pub fn station_variety(rows: &[StationWeight], classes: &[&str]) -> BTreeMap<StationKey, Option<usize>> {
    let wanted: FxHashSet<&str> = classes.iter().copied().collect();
    let mut out: BTreeMap<StationKey, Option<usize>> = BTreeMap::new();

    for row in rows.iter().filter(|r| wanted.contains(r.class.as_str())) {
        let entry = out.entry(row.key.clone()).or_insert(Some(0));
        *entry = match (*entry, row.present) {
            (Some(n), Some(true)) => Some(n + 1),
            (Some(n), Some(false)) => Some(n),
            _ => None,
        };
    }
    out
}

/// Mean per-station variety for each site
pub fn mean_station_variety(varieties: &BTreeMap<StationKey, Option<usize>>) -> BTreeMap<Key, Option<f64>> {
    let mut by_site: BTreeMap<Key, Vec<Option<f64>>> = BTreeMap::new();
    for (key, v) in varieties {
        by_site
            .entry(key.site.clone())
            .or_default()
            .push(v.map(|n| n as f64));
    }
    by_site
        .into_iter()
        .map(|(site, values)| (site, stats::mean(&values)))
        .collect()
}

/// Distinct `classes` present anywhere at each site
pub fn site_variety(rows: &[StationWeight], classes: &[&str]) -> BTreeMap<Key, usize> {
    let wanted: FxHashSet<&str> = classes.iter().copied().collect();
    let mut present: BTreeMap<Key, BTreeSet<String>> = BTreeMap::new();
    for row in rows.iter().filter(|r| wanted.contains(r.class.as_str())) {
        let entry = present.entry(row.key.site.clone()).or_default();
        if row.present == Some(true) {
            entry.insert(row.class.clone());
        }
    }
    present
        .into_iter()
        .map(|(site, set)| (site, set.len()))
        .collect()
}

/// Fraction of stations where any of `classes` is flagged
///
/// A station counts as 1 when any row is flagged, 0 when every row is known
/// and unflagged, and null otherwise.
pub fn any_flag_fraction<F>(rows: &[StationWeight], classes: &[&str], flag: F) -> BTreeMap<Key, Option<f64>>
where
    F: Fn(&StationWeight) -> Option<bool>,
{
    let wanted: FxHashSet<&str> = classes.iter().copied().collect();
    let mut per_station: BTreeMap<StationKey, (bool, bool)> = BTreeMap::new();

    for row in rows.iter().filter(|r| wanted.contains(r.class.as_str())) {
        let (any, unknown) = per_station.entry(row.key.clone()).or_insert((false, false));
        match flag(row) {
            Some(true) => *any = true,
            Some(false) => {}
            None => *unknown = true,
        }
    }

    let mut by_site: BTreeMap<Key, Vec<Option<f64>>> = BTreeMap::new();
    for (key, (any, unknown)) in per_station {
        let v = if any {
            Some(1.0)
        } else if unknown {
            None
        } else {
            Some(0.0)
        };
        by_site.entry(key.site).or_default().push(v);
    }
    by_site
        .into_iter()
        .map(|(site, values)| (site, stats::mean(&values)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::normalization::summarize;
    use approx::assert_relative_eq;

    fn row(site: i64, station: &str, class: &str, w: Option<f64>, circa: Option<bool>) -> StationWeight {
        StationWeight {
            key: StationKey::new(Key::from(site), Key::from(station)),
            class: class.to_string(),
            weight: w,
            present: w.map(|v| v > 0.0),
            circa,
        }
    }

    #[test]
    fn test_dense_counts_fill_zero() {
        let rows = vec![
            row(1, "A", "ROAD", Some(1.0), None),
            row(2, "A", "DOCKS", Some(0.5), None),
            row(2, "B", "DOCKS", None, None),
        ];
        let summaries = summarize(&rows);
        let sites: BTreeSet<Key> = [Key::from(1), Key::from(2)].into_iter().collect();
        let classes = vec!["DOCKS".to_string(), "ROAD".to_string()];
        let counts = dense_counts(&sites, &classes, &summaries);

        assert_eq!(counts.len(), 4);
        assert!(counts.contains(&(Key::from(1), "DOCKS".into(), 0)));
        assert!(counts.contains(&(Key::from(1), "ROAD".into(), 1)));
        assert!(counts.contains(&(Key::from(2), "DOCKS".into(), 1)));
        assert!(counts.contains(&(Key::from(2), "ROAD".into(), 0)));
    }

    #[test]
    fn test_station_variety_propagates_null() {
        let rows = vec![
            row(1, "A", "ROAD", Some(1.0), None),
            row(1, "A", "DOCKS", Some(0.5), None),
            row(1, "A", "LAWN", Some(0.0), None),
            row(1, "B", "ROAD", Some(1.0), None),
            row(1, "B", "DOCKS", None, None),
        ];
        let v = station_variety(&rows, &["ROAD", "DOCKS", "LAWN"]);
        let a = StationKey::new(Key::from(1), Key::from("A"));
        let b = StationKey::new(Key::from(1), Key::from("B"));
        assert_eq!(v[&a], Some(2));
        assert_eq!(v[&b], None);

        let mean = mean_station_variety(&v);
        assert_relative_eq!(mean[&Key::from(1)].unwrap(), 2.0);

        let site = site_variety(&rows, &["ROAD", "DOCKS", "LAWN"]);
        assert_eq!(site[&Key::from(1)], 2);

        // a class subset skips the null row entirely
        let v = station_variety(&rows, &["ROAD"]);
        assert_eq!(v[&b], Some(1));
    }

    #[test]
    fn test_any_flag_fraction() {
        let rows = vec![
            row(1, "A", "ROAD", Some(1.0), Some(true)),
            row(1, "B", "ROAD", Some(0.5), Some(false)),
            row(1, "C", "ROAD", Some(0.0), Some(false)),
            row(1, "D", "ROAD", None, None),
        ];
        let present = any_flag_fraction(&rows, &["ROAD"], |r| r.present);
        assert_relative_eq!(present[&Key::from(1)].unwrap(), 2.0 / 3.0);

        let circa = any_flag_fraction(&rows, &["ROAD"], |r| r.circa);
        assert_relative_eq!(circa[&Key::from(1)].unwrap(), 1.0 / 3.0);
    }
}

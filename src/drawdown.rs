//! DRAWDOWN / SYNTHETIC-VALUE RECONCILER
//!
//! Lake shorelines are surveyed in two zones: the riparian plot above the
//! waterline and the drawdown zone exposed between the waterline and the
//! high-water mark. This module fills gaps in drawdown observations and
//! blends the two zones into "synthetic" readings of the whole bank profile.
//!
//! Blending is linear in the horizontal drawdown distance `h` relative to
//! the riparian plot width `w`:
//!
//! ```text
//! f   = clamp(h / w, 0, 1)
//! syn = (1 - f) * rip + f * dd
//! ```
//!
//! so a station with no exposed drawdown zone reads as pure riparian, and a
//! drawdown zone at least as wide as the plot reads as pure drawdown.

use crate::data::{Key, Observation, ObservationTable, StationKey, Value};
use crate::error::{PhabError, Result};
use crate::utils::normalization::StationWeight;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Policy flags for drawdown-aware families
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawdownPolicy {
    /// Insert default codes for structurally absent drawdown rows
    pub fill_drawdown: bool,
    /// Copy riparian readings into missing drawdown readings near the waterline
    pub fill_dd_with_riparian: bool,
    /// Largest horizontal drawdown distance (m) that still takes riparian fill
    pub dd_fill_max_distance: f64,
    /// Emit `_SYN` metrics
    pub create_synthetic: bool,
    /// Riparian plot width (m) used to scale the synthetic blend
    pub plot_width: f64,
}

impl Default for DrawdownPolicy {
    fn default() -> Self {
        Self {
            fill_drawdown: true,
            fill_dd_with_riparian: true,
            dd_fill_max_distance: 1.5,
            create_synthetic: true,
            plot_width: 15.0,
        }
    }
}

impl DrawdownPolicy {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

// ============================================================================
// STATION-LEVEL INPUTS
// ============================================================================

/// Horizontal drawdown distance per station
pub fn horizontal_distances(horiz: &ObservationTable) -> BTreeMap<StationKey, Option<f64>> {
    horiz
        .by_station()
        .into_iter()
        .map(|(k, v)| (k, v.as_f64()))
        .collect()
}

/// Parse a DRAWDOWN indicator table: Y/YES → true, N/NO → false
pub fn drawdown_flags(drawdown: &ObservationTable) -> BTreeMap<StationKey, Option<bool>> {
    drawdown
        .by_station()
        .into_iter()
        .map(|(k, v)| {
            let flag = v.as_code().and_then(|code| match code.to_ascii_uppercase().as_str() {
                "Y" | "YES" => Some(true),
                "N" | "NO" => Some(false),
                _ => None,
            });
            (k, flag)
        })
        .collect()
}

// ============================================================================
// FILL-IN POLICIES
// ============================================================================

/// Substitute riparian codes for missing drawdown codes near the waterline
///
/// A drawdown reading is missing when its row is null or absent. It takes
/// the riparian code of the same station and class when the station's
/// horizontal drawdown distance is known and within `[0, max_distance]`.
/// Only sites already present in the drawdown table are filled.
pub fn fill_dd_with_riparian(
    dd: &ObservationTable,
    rip: &ObservationTable,
    horiz: &BTreeMap<StationKey, Option<f64>>,
    max_distance: f64,
) -> ObservationTable {
    let dd_sites = dd.sites();
    let mut rows = dd.rows.clone();
    let mut index: BTreeMap<(StationKey, String), usize> = BTreeMap::new();
    for (i, row) in rows.iter().enumerate() {
        if let (Some(k), Some(c)) = (row.station_key(), &row.class) {
            index.insert((k, c.clone()), i);
        }
    }

    let mut filled = 0usize;
    for rip_row in &rip.rows {
        let (Some(key), Some(class)) = (rip_row.station_key(), rip_row.class.clone()) else {
            continue;
        };
        if rip_row.value.is_null() || !dd_sites.contains(&key.site) {
            continue;
        }
        let near = horiz
            .get(&key)
            .copied()
            .flatten()
            .map_or(false, |h| (0.0..=max_distance).contains(&h));
        if !near {
            continue;
        }
        match index.get(&(key.clone(), class.clone())) {
            Some(&i) if rows[i].value.is_null() => {
                rows[i].value = rip_row.value.clone();
                filled += 1;
            }
            Some(_) => {}
            None => {
                index.insert((key.clone(), class.clone()), rows.len());
                rows.push(Observation {
                    site: key.site.clone(),
                    station: Some(key.station.clone()),
                    class: Some(class),
                    value: rip_row.value.clone(),
                });
                filled += 1;
            }
        }
    }

    debug!(table = %dd.name, filled, "drawdown readings filled from riparian");
    ObservationTable::new(&dd.name, rows)
}

/// Insert `default` for structurally absent (station, class) rows
///
/// Every station of `stations` is expected to carry every class of
/// `classes`. With a DRAWDOWN indicator table only stations flagged as
/// having no drawdown zone are filled; the rest stay absent.
pub fn fill_absent_missing_with_default(
    table: &ObservationTable,
    stations: &BTreeSet<StationKey>,
    classes: &[String],
    default: &str,
    drawdown: Option<&ObservationTable>,
) -> ObservationTable {
    let flags = drawdown.map(drawdown_flags);
    let present: BTreeSet<(StationKey, String)> = table.by_station_class().into_keys().collect();

    let mut rows = table.rows.clone();
    let mut filled = 0usize;
    for key in stations {
        let eligible = match &flags {
            None => true,
            Some(f) => f.get(key).copied().flatten() == Some(false),
        };
        if !eligible {
            continue;
        }
        for class in classes {
            if present.contains(&(key.clone(), class.clone())) {
                continue;
            }
            rows.push(Observation {
                site: key.site.clone(),
                station: Some(key.station.clone()),
                class: Some(class.clone()),
                value: Value::Text(default.to_string()),
            });
            filled += 1;
        }
    }

    debug!(table = %table.name, filled, default, "absent rows filled with default");
    ObservationTable::new(&table.name, rows)
}

/// Stations that belong to the drawdown survey of a site
///
/// Sites come from the family's drawdown-zone tables; stations are gathered
/// from every table given for those sites. Shared distance and flag tables
/// never introduce a site of their own.
pub fn drawdown_station_universe(
    dd_tables: &[Option<&ObservationTable>],
    other_tables: &[Option<&ObservationTable>],
) -> BTreeSet<StationKey> {
    let sites: BTreeSet<Key> = dd_tables
        .iter()
        .flatten()
        .flat_map(|t| t.sites())
        .collect();
    dd_tables
        .iter()
        .chain(other_tables.iter())
        .flatten()
        .flat_map(|t| t.stations())
        .filter(|k| sites.contains(&k.site))
        .collect()
}

/// Apply both fill-in policies to one drawdown class table
///
/// Riparian fill runs before default fill. Without a drawdown-zone table
/// there is no drawdown zone to reconcile.
pub fn reconcile_drawdown(
    dd: Option<&ObservationTable>,
    rip: Option<&ObservationTable>,
    horiz: Option<&ObservationTable>,
    drawdown: Option<&ObservationTable>,
    default_code: &str,
    policy: &DrawdownPolicy,
) -> Option<ObservationTable> {
    let dd = dd?;
    let universe = drawdown_station_universe(&[Some(dd)], &[horiz, drawdown, rip]);
    let mut table = dd.clone();

    if policy.fill_dd_with_riparian {
        if let (Some(rip), Some(horiz)) = (rip, horiz) {
            let distances = horizontal_distances(horiz);
            table = fill_dd_with_riparian(&table, rip, &distances, policy.dd_fill_max_distance);
        }
    }

    if policy.fill_drawdown {
        let mut classes: BTreeSet<String> = table.classes();
        if let Some(rip) = rip {
            classes.extend(rip.classes());
        }
        let classes: Vec<String> = classes.into_iter().collect();
        table = fill_absent_missing_with_default(&table, &universe, &classes, default_code, drawdown);
    }

    if table.is_empty() {
        None
    } else {
        Some(table)
    }
}

// ============================================================================
// SYNTHETIC VALUES
// ============================================================================

/// Share of the synthetic reading taken from the drawdown zone
pub fn blend_fraction(horiz: f64, plot_width: f64) -> f64 {
    if plot_width <= 0.0 {
        return 1.0;
    }
    (horiz / plot_width).clamp(0.0, 1.0)
}

/// Blend a riparian and a drawdown cover
///
/// A reading whose share is zero may be null; otherwise both are needed.
pub fn calc_syn_cover(rip: Option<f64>, dd: Option<f64>, f: f64) -> Option<f64> {
    if f <= 0.0 {
        return rip;
    }
    if f >= 1.0 {
        return dd;
    }
    Some((1.0 - f) * rip? + f * dd?)
}

/// Blend one class's riparian and drawdown proximity readings
///
/// The weight follows [`calc_syn_cover`]. Circa holds when the drawdown
/// reading is circa and contributes (`f > 0`), or the riparian reading is
/// circa and still contributes (`f < 1`).
pub fn calc_syn_influence(rip: &StationWeight, dd: &StationWeight, f: f64) -> StationWeight {
    let weight = calc_syn_cover(rip.weight, dd.weight, f);

    let dd_circa = if f > 0.0 { dd.circa } else { Some(false) };
    let rip_circa = if f < 1.0 { rip.circa } else { Some(false) };
    let circa = match (rip_circa, dd_circa) {
        (Some(true), _) | (_, Some(true)) => Some(true),
        (Some(false), Some(false)) => Some(false),
        _ => None,
    };

    StationWeight {
        key: rip.key.clone(),
        class: rip.class.clone(),
        weight,
        present: weight.map(|w| w > 0.0),
        circa,
    }
}

/// Combine riparian and drawdown station readings into synthetic readings
///
/// Fails when the horizontal distance table is absent. A station without a
/// known distance yields a null synthetic reading. Sites with no drawdown
/// readings get no synthetic readings.
pub fn synthesize(
    rip: &[StationWeight],
    dd: &[StationWeight],
    horiz: Option<&ObservationTable>,
    plot_width: f64,
) -> Result<Vec<StationWeight>> {
    let horiz = horiz.ok_or_else(|| {
        PhabError::MissingInput(
            "synthetic values requested but the horizontal drawdown distance table (HORIZ_DIST_DD) is absent"
                .to_string(),
        )
    })?;
    let distances = horizontal_distances(horiz);
    let dd_sites: BTreeSet<&Key> = dd.iter().map(|d| &d.key.site).collect();

    let mut pairs: BTreeMap<(StationKey, String), (Option<&StationWeight>, Option<&StationWeight>)> =
        BTreeMap::new();
    for r in rip.iter().filter(|r| dd_sites.contains(&r.key.site)) {
        pairs.entry((r.key.clone(), r.class.clone())).or_default().0 = Some(r);
    }
    for d in dd {
        pairs.entry((d.key.clone(), d.class.clone())).or_default().1 = Some(d);
    }

    let out: Vec<StationWeight> = pairs
        .into_iter()
        .map(|((key, class), (r, d))| {
            let Some(h) = distances.get(&key).copied().flatten() else {
                return StationWeight::missing(key, class);
            };
            let missing = StationWeight::missing(key.clone(), class.clone());
            let mut syn = calc_syn_influence(
                r.unwrap_or(&missing),
                d.unwrap_or(&missing),
                blend_fraction(h, plot_width),
            );
            syn.key = key;
            syn.class = class;
            syn
        })
        .collect();

    debug!(rows = out.len(), "synthetic readings computed");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sk(station: &str) -> StationKey {
        StationKey::new(Key::from(1), Key::from(station))
    }

    fn obs(station: &str, class: &str, value: Value) -> Observation {
        Observation::new(1, station, value).with_class(class)
    }

    fn code(c: &str) -> Value {
        Value::Text(c.to_string())
    }

    fn weight(station: &str, class: &str, w: Option<f64>, circa: Option<bool>) -> StationWeight {
        StationWeight {
            key: sk(station),
            class: class.to_string(),
            weight: w,
            present: w.map(|v| v > 0.0),
            circa,
        }
    }

    #[test]
    fn test_riparian_fill_within_threshold() {
        let rip = ObservationTable::new(
            "hiRiparian",
            vec![
                obs("A", "BUILDINGS", code("C")),
                obs("B", "BUILDINGS", code("P")),
                obs("C", "BUILDINGS", code("P")),
            ],
        );
        let dd = ObservationTable::new(
            "hiDrawdown",
            vec![obs("A", "BUILDINGS", Value::Null), obs("B", "BUILDINGS", Value::Null)],
        );
        let horiz: BTreeMap<StationKey, Option<f64>> =
            [(sk("A"), Some(1.0)), (sk("B"), Some(4.0)), (sk("C"), Some(0.0))]
                .into_iter()
                .collect();

        let filled = fill_dd_with_riparian(&dd, &rip, &horiz, 1.5);
        let map = filled.by_station_class();
        assert_eq!(map[&(sk("A"), "BUILDINGS".to_string())], code("C"));
        // beyond the threshold stays missing
        assert_eq!(map[&(sk("B"), "BUILDINGS".to_string())], Value::Null);
        // structurally absent row within the threshold is added
        assert_eq!(map[&(sk("C"), "BUILDINGS".to_string())], code("P"));
    }

    #[test]
    fn test_riparian_fill_needs_known_distance() {
        let rip = ObservationTable::new("r", vec![obs("A", "ROAD", code("C"))]);
        let dd = ObservationTable::new("d", vec![obs("A", "ROAD", Value::Null)]);
        let horiz: BTreeMap<StationKey, Option<f64>> = [(sk("A"), None)].into_iter().collect();
        let filled = fill_dd_with_riparian(&dd, &rip, &horiz, 1.5);
        assert_eq!(filled.rows[0].value, Value::Null);
    }

    #[test]
    fn test_default_fill_respects_drawdown_flags() {
        let dd = ObservationTable::new("hiDrawdown", vec![obs("A", "ROAD", code("P"))]);
        let flags = ObservationTable::new(
            "drawdown",
            vec![
                Observation::new(1, "A", code("NO")),
                Observation::new(1, "B", code("N")),
                Observation::new(1, "C", code("YES")),
            ],
        );
        let stations: BTreeSet<StationKey> = [sk("A"), sk("B"), sk("C")].into_iter().collect();
        let classes = vec!["DOCKS".to_string(), "ROAD".to_string()];

        let filled = fill_absent_missing_with_default(&dd, &stations, &classes, "0", Some(&flags));
        let map = filled.by_station_class();
        assert_eq!(map[&(sk("A"), "ROAD".to_string())], code("P"));
        assert_eq!(map[&(sk("A"), "DOCKS".to_string())], code("0"));
        assert_eq!(map[&(sk("B"), "ROAD".to_string())], code("0"));
        assert!(!map.contains_key(&(sk("C"), "ROAD".to_string())));

        let unflagged = fill_absent_missing_with_default(&dd, &stations, &classes, "0", None);
        assert_eq!(unflagged.len(), 6);
    }

    #[test]
    fn test_reconcile_respects_policy() {
        let rip = ObservationTable::new("r", vec![obs("A", "ROAD", code("C"))]);
        let horiz = ObservationTable::new("h", vec![Observation::new(1, "A", Value::Num(1.0))]);

        let dd = ObservationTable::new("d", vec![obs("A", "DOCKS", code("P"))]);

        let policy = DrawdownPolicy::default();
        let out = reconcile_drawdown(Some(&dd), Some(&rip), Some(&horiz), None, "0", &policy).unwrap();
        let map = out.by_station_class();
        assert_eq!(map[&(sk("A"), "ROAD".to_string())], code("C"));
        assert_eq!(map[&(sk("A"), "DOCKS".to_string())], code("P"));

        let off = DrawdownPolicy {
            fill_drawdown: false,
            fill_dd_with_riparian: false,
            ..DrawdownPolicy::default()
        };
        let out = reconcile_drawdown(Some(&dd), Some(&rip), Some(&horiz), None, "0", &off).unwrap();
        assert_eq!(out.len(), 1);

        // no drawdown-zone table, nothing to reconcile
        assert!(reconcile_drawdown(None, Some(&rip), Some(&horiz), None, "0", &policy).is_none());
    }

    #[test]
    fn test_policy_from_json() {
        let policy = DrawdownPolicy::from_json(r#"{"dd_fill_max_distance": 3.0, "fill_drawdown": false}"#).unwrap();
        assert_relative_eq!(policy.dd_fill_max_distance, 3.0);
        assert!(!policy.fill_drawdown);
        assert!(policy.fill_dd_with_riparian);
        assert_relative_eq!(policy.plot_width, 15.0);
    }

    #[test]
    fn test_blend_boundaries() {
        assert_relative_eq!(calc_syn_cover(Some(0.2), Some(0.8), 0.0).unwrap(), 0.2);
        assert_relative_eq!(calc_syn_cover(Some(0.2), Some(0.8), 1.0).unwrap(), 0.8);
        assert_relative_eq!(calc_syn_cover(Some(0.2), Some(0.8), 0.5).unwrap(), 0.5);
        assert_eq!(calc_syn_cover(Some(0.2), None, 0.0), Some(0.2));
        assert_eq!(calc_syn_cover(Some(0.2), None, 0.5), None);

        assert_relative_eq!(blend_fraction(0.0, 15.0), 0.0);
        assert_relative_eq!(blend_fraction(7.5, 15.0), 0.5);
        assert_relative_eq!(blend_fraction(40.0, 15.0), 1.0);

        // monotonic in distance
        let mut last = f64::NEG_INFINITY;
        for h in 0..=20 {
            let v = calc_syn_cover(Some(0.1), Some(0.9), blend_fraction(h as f64, 15.0)).unwrap();
            assert!(v >= last);
            last = v;
        }
    }

    #[test]
    fn test_syn_influence_circa() {
        let rip = weight("A", "ROAD", Some(0.5), Some(false));
        let dd = weight("A", "ROAD", Some(1.0), Some(true));

        let at_zero = calc_syn_influence(&rip, &dd, 0.0);
        assert_eq!(at_zero.circa, Some(false));
        assert_eq!(at_zero.weight, Some(0.5));

        let mid = calc_syn_influence(&rip, &dd, 0.4);
        assert_eq!(mid.circa, Some(true));
        assert_relative_eq!(mid.weight.unwrap(), 0.7);
    }

    #[test]
    fn test_synthesize_requires_horizontal_distance() {
        let rip = vec![weight("A", "ROAD", Some(0.5), Some(false))];
        let err = synthesize(&rip, &[], None, 15.0).unwrap_err();
        assert!(matches!(err, PhabError::MissingInput(_)));
        assert!(err.to_string().contains("HORIZ_DIST_DD"));

        let horiz = ObservationTable::new(
            "h",
            vec![Observation::new(1, "A", Value::Num(0.0)), Observation::new(1, "B", Value::Null)],
        );
        let rip = vec![
            weight("A", "ROAD", Some(0.5), Some(false)),
            weight("B", "ROAD", Some(0.5), Some(false)),
        ];
        let dd = vec![weight("A", "ROAD", None, None)];
        let syn = synthesize(&rip, &dd, Some(&horiz), 15.0).unwrap();
        assert_eq!(syn[0].weight, Some(0.5));
        assert_eq!(syn[1].weight, None);
    }

    #[test]
    fn test_sites_without_drawdown_readings_stay_out() {
        let other = StationKey::new(Key::from(2), Key::from("A"));
        let rip = ObservationTable::new(
            "r",
            vec![
                obs("A", "ROAD", code("C")),
                Observation::new(2, "A", code("C")).with_class("ROAD"),
            ],
        );
        let dd = ObservationTable::new("d", vec![obs("A", "ROAD", Value::Null)]);
        let horiz = ObservationTable::new(
            "h",
            vec![Observation::new(1, "A", Value::Num(1.0)), Observation::new(2, "A", Value::Num(1.0))],
        );

        let out = reconcile_drawdown(Some(&dd), Some(&rip), Some(&horiz), None, "0", &DrawdownPolicy::default())
            .unwrap();
        assert_eq!(out.sites(), BTreeSet::from([Key::from(1)]));
        assert_eq!(out.by_station_class()[&(sk("A"), "ROAD".to_string())], code("C"));

        let rip_rows = vec![
            weight("A", "ROAD", Some(1.0), Some(true)),
            StationWeight {
                key: other,
                ..weight("A", "ROAD", Some(1.0), Some(true))
            },
        ];
        let dd_rows = vec![weight("A", "ROAD", Some(0.5), Some(false))];
        let syn = synthesize(&rip_rows, &dd_rows, Some(&horiz), 15.0).unwrap();
        assert_eq!(syn.len(), 1);
        assert_eq!(syn[0].key, sk("A"));
    }
}

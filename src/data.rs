//! Long-format Data Model
//!
//! Observations come in one row per site × station × class, metrics leave as
//! one row per site × metric name. The long form is canonical inside the
//! crate; [`MetricTable::pivot_wide`] is the only reshape to wide form.

use crate::error::{PhabError, Result};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Opaque, comparable identifier for a site visit or a station
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    Int(i64),
    Text(String),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(i) => write!(f, "{}", i),
            Key::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Key {
    fn from(v: i64) -> Self {
        Key::Int(v)
    }
}

impl From<i32> for Key {
    fn from(v: i32) -> Self {
        Key::Int(v as i64)
    }
}

impl From<&str> for Key {
    fn from(v: &str) -> Self {
        Key::Text(v.to_string())
    }
}

impl From<String> for Key {
    fn from(v: String) -> Self {
        Key::Text(v)
    }
}

/// Observed cell value after standardization
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Num(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Num(v) => Some(*v),
            _ => None,
        }
    }

    /// Categorical code; numbers are not codes once standardized
    pub fn as_code(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// One row of a long observation table
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub site: Key,
    pub station: Option<Key>,
    pub class: Option<String>,
    pub value: Value,
}

impl Observation {
    pub fn new(site: impl Into<Key>, station: impl Into<Key>, value: Value) -> Self {
        Self {
            site: site.into(),
            station: Some(station.into()),
            class: None,
            value,
        }
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    /// (site, station) address; site-level rows have no station address
    pub fn station_key(&self) -> Option<StationKey> {
        self.station
            .as_ref()
            .map(|st| StationKey::new(self.site.clone(), st.clone()))
    }
}

/// Address of one station within one site
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StationKey {
    pub site: Key,
    pub station: Key,
}

impl StationKey {
    pub fn new(site: Key, station: Key) -> Self {
        Self { site, station }
    }
}

/// A standardized input table: every row shares one conceptual parameter
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservationTable {
    pub name: String,
    pub rows: Vec<Observation>,
}

impl ObservationTable {
    pub fn new(name: impl Into<String>, rows: Vec<Observation>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn sites(&self) -> BTreeSet<Key> {
        self.rows.iter().map(|r| r.site.clone()).collect()
    }

    /// Classes seen anywhere in the table
    pub fn classes(&self) -> BTreeSet<String> {
        self.rows.iter().filter_map(|r| r.class.clone()).collect()
    }

    pub fn stations(&self) -> BTreeSet<StationKey> {
        self.rows.iter().filter_map(|r| r.station_key()).collect()
    }

    /// Values of a single-parameter table keyed by station
    pub fn by_station(&self) -> BTreeMap<StationKey, Value> {
        self.rows
            .iter()
            .filter_map(|r| r.station_key().map(|k| (k, r.value.clone())))
            .collect()
    }

    /// Values of a class-based table keyed by station and class
    pub fn by_station_class(&self) -> BTreeMap<(StationKey, String), Value> {
        self.rows
            .iter()
            .filter_map(|r| match (r.station_key(), &r.class) {
                (Some(k), Some(c)) => Some(((k, c.clone()), r.value.clone())),
                _ => None,
            })
            .collect()
    }

    /// Rows restricted to one class, class label kept
    pub fn for_class(&self, class: &str) -> Vec<&Observation> {
        self.rows
            .iter()
            .filter(|r| r.class.as_deref() == Some(class))
            .collect()
    }
}

/// Metric value: numeric, categorical (modal classes) or missing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Null,
    Num(f64),
    Text(String),
}

impl MetricValue {
    pub fn from_option(v: Option<f64>) -> Self {
        v.map_or(MetricValue::Null, MetricValue::Num)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Num(v) => Some(*v),
            MetricValue::Text(s) => s.trim().parse().ok(),
            MetricValue::Null => None,
        }
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            MetricValue::Null => None,
            MetricValue::Num(v) => Some(format!("{}", v)),
            MetricValue::Text(s) => Some(s.clone()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, MetricValue::Null)
    }
}

/// The uniform output unit: (site, metric name, value)
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    pub site: Key,
    pub metric: String,
    pub value: MetricValue,
}

/// Long metric table produced by one aggregator call
///
/// (site, metric) pairs are unique. `warnings` is only populated in
/// unit-test mode, where validation issues do not abort the call.
#[derive(Debug, Clone, Default)]
pub struct MetricTable {
    records: Vec<MetricRecord>,
    seen: FxHashSet<(Key, String)>,
    pub warnings: Vec<crate::error::Issue>,
}

impl MetricTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record; a repeated (site, metric) pair is a structural error
    pub fn push(&mut self, site: &Key, metric: impl Into<String>, value: MetricValue) -> Result<()> {
        let metric = metric.into();
        if !self.seen.insert((site.clone(), metric.clone())) {
            return Err(PhabError::StructuralMismatch(format!(
                "metric {} computed twice for site {}",
                metric, site
            )));
        }
        self.records.push(MetricRecord {
            site: site.clone(),
            metric,
            value,
        });
        Ok(())
    }

    pub fn push_num(&mut self, site: &Key, metric: impl Into<String>, value: Option<f64>) -> Result<()> {
        self.push(site, metric, MetricValue::from_option(value))
    }

    pub fn extend(&mut self, other: MetricTable) -> Result<()> {
        for rec in other.records {
            self.push(&rec.site, rec.metric, rec.value)?;
        }
        self.warnings.extend(other.warnings);
        Ok(())
    }

    pub fn get(&self, site: &Key, metric: &str) -> Option<&MetricValue> {
        self.records
            .iter()
            .find(|r| &r.site == site && r.metric == metric)
            .map(|r| &r.value)
    }

    pub fn records(&self) -> &[MetricRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Metric names present for one site
    pub fn metrics_for(&self, site: &Key) -> BTreeSet<String> {
        self.records
            .iter()
            .filter(|r| &r.site == site)
            .map(|r| r.metric.clone())
            .collect()
    }

    /// Records ordered by site then metric name
    pub fn sorted(mut self) -> Self {
        self.records
            .sort_by(|a, b| a.site.cmp(&b.site).then_with(|| a.metric.cmp(&b.metric)));
        self
    }

    /// Reshape to one row per site, one column per metric
    pub fn pivot_wide(&self) -> WideTable {
        let mut wide = WideTable::default();
        for rec in &self.records {
            wide.insert(rec.site.clone(), rec.metric.clone(), rec.value.clone());
        }
        wide
    }
}

/// Keyed-map wide form: site → column → value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WideTable {
    pub rows: BTreeMap<Key, BTreeMap<String, MetricValue>>,
}

impl WideTable {
    pub fn insert(&mut self, site: Key, column: impl Into<String>, value: MetricValue) {
        self.rows.entry(site).or_default().insert(column.into(), value);
    }

    /// Add columns of another table; existing cells are overwritten
    pub fn merge(&mut self, other: WideTable) {
        for (site, cols) in other.rows {
            self.rows.entry(site).or_default().extend(cols);
        }
    }

    pub fn sites(&self) -> impl Iterator<Item = &Key> {
        self.rows.keys()
    }

    pub fn value(&self, site: &Key, column: &str) -> Option<&MetricValue> {
        self.rows.get(site).and_then(|cols| cols.get(column))
    }

    pub fn num(&self, site: &Key, column: &str) -> Option<f64> {
        self.value(site, column).and_then(|v| v.as_f64())
    }

    pub fn text(&self, site: &Key, column: &str) -> Option<String> {
        self.value(site, column)
            .and_then(|v| v.as_text())
            .filter(|s| !s.trim().is_empty())
    }
}

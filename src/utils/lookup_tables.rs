//! Class/Weight Lookup Tables
//!
//! Maps raw field codes to numeric weights and flags. Defaults are embedded
//! below; any table can be replaced per call, e.g. from JSON:
//!
//! ```json
//! [{"code": "0", "weight": 0.0}, {"code": "P", "weight": 0.667, "present": true}]
//! ```
//!
//! Data sources:
//! - Cover classes: 0 absent, 1 sparse (<10%), 2 moderate (10-40%),
//!   3 heavy (40-75%), 4 very heavy (>75%); weight is the class midpoint
//! - Human influence proximity: 0 not present, P beyond the plot, C within the plot
//! - Substrate diameters: geometric mean of each size class bounds (mm)

use crate::error::{Issue, PhabError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Flow character of a channel unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowType {
    Fast,
    Slow,
    Pool,
    Dry,
}

/// One row of a lookup table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassRow {
    /// Raw code (or class name, for per-class tables such as diameters)
    pub code: String,
    #[serde(default)]
    pub weight: Option<f64>,
    /// Code indicates the class is present
    #[serde(default)]
    pub present: bool,
    /// Code indicates presence within the station plot itself
    #[serde(default)]
    pub circa: bool,
    /// Characteristic diameter in mm
    #[serde(default)]
    pub diameter: Option<f64>,
    #[serde(default)]
    pub flow: Option<FlowType>,
}

impl ClassRow {
    fn weighted(code: &str, weight: f64, present: bool, circa: bool) -> Self {
        Self {
            code: code.to_string(),
            weight: Some(weight),
            present,
            circa,
            diameter: None,
            flow: None,
        }
    }
}

/// Immutable code → weight/flag mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassWeightTable {
    rows: Vec<ClassRow>,
}

// ============================================================================
// EMBEDDED DEFAULTS
// ============================================================================

static COVER_CLASS_WEIGHTS: &[(&str, f64)] = &[
    ("0", 0.0),
    ("1", 0.05),
    ("2", 0.25),
    ("3", 0.575),
    ("4", 0.875),
];

static PROXIMITY_WEIGHTS: &[(&str, f64, bool, bool)] = &[
    ("0", 0.0, false, false),
    ("P", 0.5, true, false),
    ("C", 1.0, true, true),
];

static SUBSTRATE_DIAMETERS: &[(&str, Option<f64>)] = &[
    ("BEDROCK", Some(5660.0)),
    ("BOULDERS", Some(1000.0)),
    ("COBBLE", Some(126.5)),
    ("GRAVEL", Some(11.31)),
    ("SAND", Some(0.346)),
    ("SILT", Some(0.00775)),
    ("ORGANIC", None),
    ("WOOD", None),
    ("WOODY", None),
    ("VEGETATION", None),
    ("OTHER", None),
];

static CHANNEL_UNITS: &[(&str, FlowType)] = &[
    ("FA", FlowType::Fast),
    ("CA", FlowType::Fast),
    ("RP", FlowType::Fast),
    ("RI", FlowType::Fast),
    ("GL", FlowType::Slow),
    ("PP", FlowType::Pool),
    ("PD", FlowType::Pool),
    ("PL", FlowType::Pool),
    ("PT", FlowType::Pool),
    ("PB", FlowType::Pool),
    ("P", FlowType::Pool),
    ("DR", FlowType::Dry),
    ("SB", FlowType::Dry),
];

static BANK_ANGLES: &[&str] = &["FLAT", "GRADUAL", "STEEP", "VERTICAL"];

impl ClassWeightTable {
    pub fn from_rows(rows: Vec<ClassRow>) -> Result<Self> {
        let table = Self { rows };
        table.check_unique()?;
        Ok(table)
    }

    /// Parse an override table from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let rows: Vec<ClassRow> = serde_json::from_str(json)?;
        Self::from_rows(rows)
    }

    /// Cover class code → fractional cover; presence for any non-zero code
    pub fn cover_classes() -> Self {
        Self {
            rows: COVER_CLASS_WEIGHTS
                .iter()
                .map(|&(code, w)| ClassRow::weighted(code, w, w > 0.0, false))
                .collect(),
        }
    }

    /// Human influence proximity code → weight, presence and circa flags
    pub fn proximity() -> Self {
        Self {
            rows: PROXIMITY_WEIGHTS
                .iter()
                .map(|&(code, w, present, circa)| ClassRow::weighted(code, w, present, circa))
                .collect(),
        }
    }

    /// Substrate class → characteristic diameter
    pub fn substrate_diameters() -> Self {
        Self {
            rows: SUBSTRATE_DIAMETERS
                .iter()
                .map(|&(class, d)| ClassRow {
                    code: class.to_string(),
                    weight: None,
                    present: true,
                    circa: false,
                    diameter: d,
                    flow: None,
                })
                .collect(),
        }
    }

    /// Channel unit code → flow type
    pub fn channel_units() -> Self {
        Self {
            rows: CHANNEL_UNITS
                .iter()
                .map(|&(code, flow)| ClassRow {
                    code: code.to_string(),
                    weight: Some(1.0),
                    present: true,
                    circa: false,
                    diameter: None,
                    flow: Some(flow),
                })
                .collect(),
        }
    }

    /// Bank angle class codes, each indicating presence of its class
    pub fn bank_angles() -> Self {
        Self {
            rows: BANK_ANGLES
                .iter()
                .map(|&code| ClassRow::weighted(code, 1.0, true, false))
                .collect(),
        }
    }

    fn check_unique(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for row in &self.rows {
            if !seen.insert(row.code.as_str()) {
                return Err(PhabError::StructuralMismatch(format!(
                    "lookup table lists code '{}' more than once",
                    row.code
                )));
            }
        }
        Ok(())
    }

    /// Codes in declared order
    pub fn codes(&self) -> Vec<String> {
        self.rows.iter().map(|r| r.code.clone()).collect()
    }

    pub fn rows(&self) -> &[ClassRow] {
        &self.rows
    }

    pub fn get(&self, code: &str) -> Option<&ClassRow> {
        self.rows.iter().find(|r| r.code == code)
    }

    pub fn weight(&self, code: &str) -> Option<f64> {
        self.get(code).and_then(|r| r.weight)
    }

    pub fn diameter(&self, class: &str) -> Option<f64> {
        self.get(class).and_then(|r| r.diameter)
    }

    pub fn flow(&self, code: &str) -> Option<FlowType> {
        self.get(code).and_then(|r| r.flow)
    }

    /// Issues for codes the table must cover but does not, or rows lacking a weight
    pub fn require_weights<S: AsRef<str>>(&self, table: &str, codes: &[S]) -> Vec<Issue> {
        let mut issues = Vec::new();
        for code in codes {
            let code = code.as_ref();
            match self.get(code) {
                None => issues.push(Issue::mismatch(
                    table,
                    format!("lookup table has no row for code '{}'", code),
                )),
                Some(row) if row.weight.is_none() => issues.push(Issue::mismatch(
                    table,
                    format!("lookup row for code '{}' has no weight", code),
                )),
                Some(_) => {}
            }
        }
        issues
    }

    /// Issues for a weight table: every row needs a weight
    pub fn check_weights(&self, table: &str) -> Vec<Issue> {
        let codes = self.codes();
        self.require_weights(table, &codes)
    }
}

/// The set of lookup tables one calculation uses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupTables {
    pub cover: ClassWeightTable,
    pub proximity: ClassWeightTable,
    pub diameters: ClassWeightTable,
    pub channel_units: ClassWeightTable,
    pub bank_angles: ClassWeightTable,
}

impl Default for LookupTables {
    fn default() -> Self {
        Self {
            cover: ClassWeightTable::cover_classes(),
            proximity: ClassWeightTable::proximity(),
            diameters: ClassWeightTable::substrate_diameters(),
            channel_units: ClassWeightTable::channel_units(),
            bank_angles: ClassWeightTable::bank_angles(),
        }
    }
}

impl LookupTables {
    /// Parse overrides; tables not named keep their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let tables: LookupTables = serde_json::from_str(json)?;
        for t in [
            &tables.cover,
            &tables.proximity,
            &tables.diameters,
            &tables.channel_units,
            &tables.bank_angles,
        ] {
            t.check_unique()?;
        }
        Ok(tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_cover_weights() {
        let t = ClassWeightTable::cover_classes();
        assert_eq!(t.codes(), vec!["0", "1", "2", "3", "4"]);
        assert_relative_eq!(t.weight("2").unwrap(), 0.25);
        assert_relative_eq!(t.weight("3").unwrap(), 0.575);
        assert!(!t.get("0").unwrap().present);
        assert!(t.get("1").unwrap().present);
    }

    #[test]
    fn test_proximity_flags() {
        let t = ClassWeightTable::proximity();
        let c = t.get("C").unwrap();
        assert!(c.present && c.circa);
        let p = t.get("P").unwrap();
        assert!(p.present && !p.circa);
        assert_relative_eq!(p.weight.unwrap(), 0.5);
    }

    #[test]
    fn test_override_from_json() {
        let t = ClassWeightTable::from_json(
            r#"[{"code": "0", "weight": 0.0}, {"code": "P", "weight": 0.667, "present": true}]"#,
        )
        .unwrap();
        assert_relative_eq!(t.weight("P").unwrap(), 0.667);
        assert!(t.get("C").is_none());
        assert_eq!(t.require_weights("hi", &["0", "P", "C"]).len(), 1);

        let dup = ClassWeightTable::from_json(r#"[{"code": "0"}, {"code": "0"}]"#);
        assert!(dup.is_err());
    }

    #[test]
    fn test_partial_lookup_override_keeps_defaults() {
        let tables = LookupTables::from_json(r#"{"proximity": [{"code": "0", "weight": 0.0}]}"#).unwrap();
        assert_eq!(tables.proximity.codes(), vec!["0"]);
        assert_eq!(tables.cover, ClassWeightTable::cover_classes());
    }

    #[test]
    fn test_diameters_and_flow() {
        let d = ClassWeightTable::substrate_diameters();
        assert_relative_eq!(d.diameter("SAND").unwrap(), 0.346);
        assert_eq!(d.diameter("WOOD"), None);

        let cu = ClassWeightTable::channel_units();
        assert_eq!(cu.flow("RI"), Some(FlowType::Fast));
        assert_eq!(cu.flow("GL"), Some(FlowType::Slow));
        assert_eq!(cu.flow("PT"), Some(FlowType::Pool));
        assert_eq!(cu.flow("SB"), Some(FlowType::Dry));
    }
}

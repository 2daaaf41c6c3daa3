//! Argument Standardizer
//!
//! Every metric function passes its input tables through here. A table is
//! checked against its [`TableSchema`] (columns present, accepted kinds,
//! legal values, numeric bounds) and converted into an
//! [`ObservationTable`]. Problems are returned as [`Issue`]s, never raised,
//! so that one call can report every bad table at once.

use crate::data::{Key, Observation, ObservationTable, Value};
use crate::error::{Issue, PhabError, Result};
use crate::utils::frames::{column_cells, materialize_with_columns, missing_columns, Cell};
use crate::utils::schema::{ColumnKind, ColumnSpec, Coercion, Role, TableSchema, Target};
use polars::prelude::DataFrame;
use std::collections::BTreeSet;
use tracing::{debug, trace, warn};

/// Outcome of standardizing one table
#[derive(Debug, Clone, PartialEq)]
pub enum Standardized {
    /// Valid, non-empty table
    Table(ObservationTable),
    /// Table absent or zero rows: the dependent metrics are skipped
    Empty,
}

impl Standardized {
    pub fn into_table(self) -> Option<ObservationTable> {
        match self {
            Standardized::Table(t) => Some(t),
            Standardized::Empty => None,
        }
    }
}

/// Number of offending values quoted in an issue message
const MAX_QUOTED: usize = 5;

/// Validate one table against its schema
///
/// Absent and zero-row tables are a valid "no data" case. All problems found
/// in the table are returned together.
pub fn standardize_table(
    df: Option<&DataFrame>,
    schema: &TableSchema,
) -> std::result::Result<Standardized, Vec<Issue>> {
    let Some(df) = df else {
        return Ok(Standardized::Empty);
    };
    if df.height() == 0 {
        return Ok(Standardized::Empty);
    }

    let missing = missing_columns(df, &schema.column_names());
    if !missing.is_empty() {
        return Err(vec![Issue::schema(
            &schema.name,
            format!("missing required column(s) {}", missing.join(", ")),
        )]);
    }
    let df = &materialize_with_columns(df, &schema.column_names(), &schema.name)
        .map_err(|e| vec![Issue::schema(&schema.name, format!("{:#}", e))])?;

    let mut issues = Vec::new();
    let mut converted: Vec<(Role, Vec<ConvertedCell>)> = Vec::new();

    for spec in &schema.columns {
        match convert_column(df, spec, &schema.name) {
            Ok(cells) => converted.push((spec.role, cells)),
            Err(mut col_issues) => issues.append(&mut col_issues),
        }
    }

    if !issues.is_empty() {
        return Err(issues);
    }

    let rows = assemble_rows(df.height(), converted);
    Ok(Standardized::Table(ObservationTable::new(&schema.name, rows)))
}

#[derive(Debug, Clone)]
enum ConvertedCell {
    Key(Key),
    Value(Value),
}

fn convert_column(
    df: &DataFrame,
    spec: &ColumnSpec,
    table: &str,
) -> std::result::Result<Vec<ConvertedCell>, Vec<Issue>> {
    let (kind, cells) = column_cells(df, &spec.name, table)
        .map_err(|e| vec![Issue::schema(table, format!("{:#}", e))])?;

    if !kind_accepted(spec, kind, &cells) {
        let accepted: Vec<String> = spec.kinds.iter().map(|k| k.to_string()).collect();
        return Err(vec![Issue::schema(
            table,
            format!(
                "column {} is {}, expected {}",
                spec.name,
                kind,
                accepted.join(" or ")
            ),
        )]);
    }

    let mut out = Vec::with_capacity(cells.len());
    let mut unparseable: BTreeSet<String> = BTreeSet::new();
    let mut illegal: BTreeSet<String> = BTreeSet::new();
    let mut out_of_range: Vec<f64> = Vec::new();
    let mut null_keys = 0usize;
    let mut bad_keys: BTreeSet<String> = BTreeSet::new();

    for cell in cells {
        match spec.target {
            Target::Key => match to_key(&cell) {
                Err(text) => {
                    bad_keys.insert(text);
                    out.push(ConvertedCell::Value(Value::Null));
                }
                Ok(Some(key)) => {
                    if let Some(legal) = &spec.legal {
                        if !legal.allows(&key.to_string()) {
                            illegal.insert(key.to_string());
                        }
                    }
                    out.push(ConvertedCell::Key(key));
                }
                Ok(None) => {
                    null_keys += 1;
                    out.push(ConvertedCell::Value(Value::Null));
                }
            },
            Target::Code => {
                let value = to_code(&cell);
                if spec.role == Role::Class && value.is_null() {
                    null_keys += 1;
                }
                if let (Value::Text(code), Some(legal)) = (&value, &spec.legal) {
                    if !legal.allows(code) {
                        illegal.insert(code.clone());
                    }
                }
                out.push(ConvertedCell::Value(value));
            }
            Target::Number => {
                let value = match to_number(&cell) {
                    Ok(v) => v,
                    Err(text) => {
                        if spec.coercion == Coercion::Strict {
                            unparseable.insert(text);
                        }
                        Value::Null
                    }
                };
                if let (Value::Num(v), Some((lo, hi))) = (&value, spec.range) {
                    if *v < lo || *v > hi {
                        out_of_range.push(*v);
                    }
                }
                out.push(ConvertedCell::Value(value));
            }
        }
    }

    let mut issues = Vec::new();
    if null_keys > 0 {
        issues.push(Issue::illegal(
            table,
            format!("column {} has {} missing identifier(s)", spec.name, null_keys),
        ));
    }
    if !bad_keys.is_empty() {
        issues.push(Issue::illegal(
            table,
            format!(
                "column {} has identifier(s) {} outside the integer range",
                spec.name,
                quote(bad_keys.iter().cloned())
            ),
        ));
    }
    if !unparseable.is_empty() {
        issues.push(Issue::illegal(
            table,
            format!(
                "column {} has non-numeric value(s) {}",
                spec.name,
                quote(unparseable.iter().cloned())
            ),
        ));
    }
    if !illegal.is_empty() {
        let expected = spec
            .legal
            .as_ref()
            .map(|l| l.describe())
            .unwrap_or_default();
        issues.push(Issue::illegal(
            table,
            format!(
                "column {} has illegal value(s) {}; expected {}",
                spec.name,
                quote(illegal.iter().cloned()),
                expected
            ),
        ));
    }
    if !out_of_range.is_empty() {
        if let Some((lo, hi)) = spec.range {
            issues.push(Issue::illegal(
                table,
                format!(
                    "column {} has {} value(s) outside [{}, {}], e.g. {}",
                    spec.name,
                    out_of_range.len(),
                    lo,
                    hi,
                    quote(out_of_range.iter().map(|v| v.to_string()))
                ),
            ));
        }
    }

    if issues.is_empty() {
        Ok(out)
    } else {
        Err(issues)
    }
}

/// Accepted kinds plus the permitted coercions: integers widen to doubles,
/// text may stand in for numbers when the target is numeric
fn kind_accepted(spec: &ColumnSpec, kind: ColumnKind, cells: &[Cell]) -> bool {
    if spec.accepts(kind) {
        return true;
    }
    match kind {
        ColumnKind::Integer => spec.accepts(ColumnKind::Double),
        ColumnKind::Character if spec.target == Target::Number => {
            spec.coercion == Coercion::NaByCoercion
                || cells.iter().all(|c| match c {
                    Cell::Str(s) => s.trim().is_empty() || s.trim().parse::<f64>().is_ok(),
                    _ => true,
                })
        }
        ColumnKind::Double if spec.target == Target::Key => cells.iter().all(|c| match c {
            Cell::Float(f) => f.fract() == 0.0,
            _ => true,
        }),
        // all-null columns arrive without a useful dtype
        ColumnKind::Logical => cells.iter().all(|c| matches!(c, Cell::Null)),
        _ => false,
    }
}

/// Identifier conversion; whole floats must fit an i64 exactly
fn to_key(cell: &Cell) -> std::result::Result<Option<Key>, String> {
    match cell {
        Cell::Int(i) => Ok(Some(Key::Int(*i))),
        Cell::Float(f) if f.fract() == 0.0 => {
            if (i64::MIN as f64..i64::MAX as f64).contains(f) {
                Ok(Some(Key::Int(*f as i64)))
            } else {
                Err(f.to_string())
            }
        }
        Cell::Str(s) if !s.trim().is_empty() => Ok(Some(Key::Text(s.trim().to_string()))),
        _ => Ok(None),
    }
}

fn to_code(cell: &Cell) -> Value {
    match cell {
        Cell::Null => Value::Null,
        Cell::Int(i) => Value::Text(i.to_string()),
        Cell::Float(f) if f.fract() == 0.0 => Value::Text(format!("{}", *f as i64)),
        Cell::Float(f) => Value::Text(f.to_string()),
        Cell::Str(s) if s.trim().is_empty() => Value::Null,
        Cell::Str(s) => Value::Text(s.trim().to_string()),
        Cell::Bool(b) => Value::Text(if *b { "TRUE".into() } else { "FALSE".into() }),
    }
}

/// Numeric conversion; the error carries the unparseable text
fn to_number(cell: &Cell) -> std::result::Result<Value, String> {
    match cell {
        Cell::Null => Ok(Value::Null),
        Cell::Int(i) => Ok(Value::Num(*i as f64)),
        Cell::Float(f) => Ok(Value::Num(*f)),
        Cell::Str(s) => {
            let t = s.trim();
            if t.is_empty() || t.eq_ignore_ascii_case("NA") {
                return Ok(Value::Null);
            }
            t.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(Value::Num)
                .ok_or_else(|| t.to_string())
        }
        Cell::Bool(b) => Err(b.to_string()),
    }
}

fn assemble_rows(height: usize, converted: Vec<(Role, Vec<ConvertedCell>)>) -> Vec<Observation> {
    let mut rows: Vec<Observation> = (0..height)
        .map(|_| Observation {
            site: Key::Int(0),
            station: None,
            class: None,
            value: Value::Null,
        })
        .collect();

    for (role, cells) in converted {
        for (row, cell) in rows.iter_mut().zip(cells) {
            match (role, cell) {
                (Role::Site, ConvertedCell::Key(k)) => row.site = k,
                (Role::Station, ConvertedCell::Key(k)) => row.station = Some(k),
                (Role::Class, ConvertedCell::Value(Value::Text(c))) => row.class = Some(c),
                (Role::Value, ConvertedCell::Value(v)) => row.value = v,
                _ => {}
            }
        }
    }
    rows
}

fn quote(values: impl Iterator<Item = String>) -> String {
    let all: Vec<String> = values.collect();
    let shown: Vec<String> = all
        .iter()
        .take(MAX_QUOTED)
        .map(|v| format!("'{}'", v))
        .collect();
    if all.len() > MAX_QUOTED {
        format!("{} (+{} more)", shown.join(", "), all.len() - MAX_QUOTED)
    } else {
        shown.join(", ")
    }
}

/// Collects issues across every input table of one aggregator call
///
/// In unit-test mode issues become warnings on the output instead of
/// aborting the call, and the offending table is treated as absent.
#[derive(Debug)]
pub struct Standardizer {
    context: String,
    unit_test: bool,
    dump_arguments: bool,
    issues: Vec<Issue>,
}

impl Standardizer {
    pub fn new(context: impl Into<String>, unit_test: bool) -> Self {
        Self {
            context: context.into(),
            unit_test,
            dump_arguments: false,
            issues: Vec::new(),
        }
    }

    /// Emit each standardized table at trace level
    pub fn dump_arguments(mut self, dump: bool) -> Self {
        self.dump_arguments = dump;
        self
    }

    /// Standardize one table; `None` means absent, empty or invalid
    pub fn standardize(&mut self, df: Option<&DataFrame>, schema: &TableSchema) -> Option<ObservationTable> {
        match standardize_table(df, schema) {
            Ok(Standardized::Table(table)) => {
                debug!(context = %self.context, table = %schema.name, rows = table.len(), "standardized input");
                if self.dump_arguments {
                    trace!(context = %self.context, table = %schema.name, rows = ?table.rows, "standardized argument");
                }
                Some(table)
            }
            Ok(Standardized::Empty) => {
                debug!(context = %self.context, table = %schema.name, "input absent or empty, skipping");
                None
            }
            Err(mut issues) => {
                self.issues.append(&mut issues);
                None
            }
        }
    }

    /// Record a problem found outside schema checks
    pub fn push(&mut self, issue: Issue) {
        self.issues.push(issue);
    }

    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }

    pub fn is_unit_test(&self) -> bool {
        self.unit_test
    }

    /// Abort with every collected issue, or hand them back as warnings
    pub fn finish(self) -> Result<Vec<Issue>> {
        if self.issues.is_empty() {
            return Ok(Vec::new());
        }
        if self.unit_test {
            for issue in &self.issues {
                warn!(context = %self.context, %issue, "validation issue (unit-test mode)");
            }
            return Ok(self.issues);
        }
        Err(PhabError::Validation(self.issues))
    }
}

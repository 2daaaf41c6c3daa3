//! DataFrame boundary helpers
//!
//! Inputs arrive as polars DataFrames and metrics leave as one. Everything in
//! between works on the long row types of [`crate::data`], so polars is only
//! touched here: column projection, typed cell extraction and frame output.

use crate::data::{Key, MetricTable, MetricValue, WideTable};
use crate::utils::schema::ColumnKind;
use anyhow::{anyhow, bail, Context, Result};
use polars::prelude::*;
use std::collections::HashSet;

/// One cell read from a frame, before schema conversion
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

/// Project a DataFrame onto `columns`, checking each is present
///
/// # Errors
/// Returns error if any column is missing or the projection fails.
pub fn materialize_with_columns(df: &DataFrame, columns: &[&str], context: &str) -> Result<DataFrame> {
    let actual_cols: HashSet<String> = df
        .get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();

    for &expected in columns {
        if !actual_cols.contains(expected) {
            return Err(anyhow!(
                "{}: Missing expected column '{}'. Available columns: {:?}",
                context,
                expected,
                actual_cols
            ));
        }
    }

    let col_exprs: Vec<Expr> = columns.iter().map(|&name| col(name)).collect();

    df.clone()
        .lazy()
        .select(&col_exprs)
        .collect()
        .with_context(|| format!("{}: Failed to materialize columns {:?}", context, columns))
}

/// Names of `columns` that the frame does not carry
pub fn missing_columns(df: &DataFrame, columns: &[&str]) -> Vec<String> {
    let actual: HashSet<String> = df
        .get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();
    columns
        .iter()
        .filter(|c| !actual.contains(**c))
        .map(|c| c.to_string())
        .collect()
}

/// Read a column into cells, reporting the primitive kind it arrived as
///
/// Integer and float columns of any width are widened to 64 bits.
/// Other dtypes (categoricals, dates) are cast to text.
pub fn column_cells(df: &DataFrame, name: &str, context: &str) -> Result<(ColumnKind, Vec<Cell>)> {
    let column = df
        .column(name)
        .with_context(|| format!("{}: Missing {} column", context, name))?;
    let dtype = column.dtype().clone();

    if dtype.is_integer() {
        let cast = column.cast(&DataType::Int64)?;
        let cells = cast
            .i64()?
            .into_iter()
            .map(|v| v.map_or(Cell::Null, Cell::Int))
            .collect();
        return Ok((ColumnKind::Integer, cells));
    }

    if dtype.is_float() {
        let cast = column.cast(&DataType::Float64)?;
        let cells = cast
            .f64()?
            .into_iter()
            .map(|v| match v {
                Some(f) if !f.is_nan() => Cell::Float(f),
                _ => Cell::Null,
            })
            .collect();
        return Ok((ColumnKind::Double, cells));
    }

    match dtype {
        DataType::Boolean => {
            let cells = column
                .bool()?
                .into_iter()
                .map(|v| v.map_or(Cell::Null, Cell::Bool))
                .collect();
            Ok((ColumnKind::Logical, cells))
        }
        DataType::Null => Ok((ColumnKind::Logical, vec![Cell::Null; column.len()])),
        DataType::String => Ok((ColumnKind::Character, string_cells(column.str()?))),
        other => {
            let cast = column.cast(&DataType::String).with_context(|| {
                format!("{}: column '{}' has unsupported type {:?}", context, name, other)
            })?;
            Ok((ColumnKind::Character, string_cells(cast.str()?)))
        }
    }
}

fn string_cells(ca: &StringChunked) -> Vec<Cell> {
    ca.into_iter()
        .map(|v| v.map_or(Cell::Null, |s| Cell::Str(s.to_string())))
        .collect()
}

/// Long metric table as a frame with string columns SITE, METRIC, VALUE
pub fn metrics_to_frame(table: &MetricTable) -> Result<DataFrame> {
    let n = table.len();
    let mut sites: Vec<String> = Vec::with_capacity(n);
    let mut metrics: Vec<String> = Vec::with_capacity(n);
    let mut values: Vec<Option<String>> = Vec::with_capacity(n);

    for rec in table.records() {
        sites.push(rec.site.to_string());
        metrics.push(rec.metric.clone());
        values.push(rec.value.as_text());
    }

    DataFrame::new(vec![
        Series::new("SITE".into(), sites).into(),
        Series::new("METRIC".into(), metrics).into(),
        Series::new("VALUE".into(), values).into(),
    ])
    .context("Failed to build metric frame")
}

/// Read a wide frame (one row per site) into a [`WideTable`]
///
/// # Errors
/// Returns error if the site column is missing, holds nulls, or a site
/// appears on more than one row.
pub fn wide_from_frame(df: &DataFrame, site_col: &str) -> Result<WideTable> {
    let (_, site_cells) = column_cells(df, site_col, "wide table")?;
    let mut keys = Vec::with_capacity(site_cells.len());
    for (idx, cell) in site_cells.into_iter().enumerate() {
        let key = match cell {
            Cell::Int(i) => Key::Int(i),
            Cell::Str(s) if !s.trim().is_empty() => Key::Text(s.trim().to_string()),
            Cell::Float(f) if f.fract() == 0.0 => Key::Int(f as i64),
            _ => bail!("wide table: row {} has no usable {} value", idx + 1, site_col),
        };
        keys.push(key);
    }

    let unique: HashSet<&Key> = keys.iter().collect();
    if unique.len() != keys.len() {
        bail!("wide table: {} values are not unique", site_col);
    }

    let mut wide = WideTable::default();
    for name in df.get_column_names() {
        let name = name.to_string();
        if name == site_col {
            continue;
        }
        let (_, cells) = column_cells(df, &name, "wide table")?;
        for (key, cell) in keys.iter().zip(cells) {
            let value = match cell {
                Cell::Null => MetricValue::Null,
                Cell::Int(i) => MetricValue::Num(i as f64),
                Cell::Float(f) => MetricValue::Num(f),
                Cell::Str(s) => MetricValue::Text(s),
                Cell::Bool(b) => MetricValue::Text(if b { "TRUE".into() } else { "FALSE".into() }),
            };
            wide.insert(key.clone(), name.clone(), value);
        }
    }
    Ok(wide)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_materialize_with_columns_success() {
        let df = df![
            "SITE" => &[1i64, 2],
            "VALUE" => &["0", "P"],
            "EXTRA" => &["e1", "e2"],
        ]
        .unwrap();

        let materialized = materialize_with_columns(&df, &["SITE", "VALUE"], "test").unwrap();
        assert_eq!(materialized.width(), 2);
        assert_eq!(materialized.height(), 2);
    }

    #[test]
    fn test_materialize_with_columns_missing() {
        let df = df!["SITE" => &[1i64]].unwrap();
        let err = materialize_with_columns(&df, &["STATION"], "test").unwrap_err();
        assert!(err.to_string().contains("STATION"));
        assert_eq!(missing_columns(&df, &["SITE", "STATION"]), vec!["STATION".to_string()]);
    }

    #[test]
    fn test_column_cells_kinds() {
        let df = df![
            "I" => &[Some(1i32), None],
            "F" => &[Some(0.5f64), Some(f64::NAN)],
            "S" => &[Some("a"), None],
            "B" => &[true, false],
        ]
        .unwrap();

        let (kind, cells) = column_cells(&df, "I", "test").unwrap();
        assert_eq!(kind, ColumnKind::Integer);
        assert_eq!(cells, vec![Cell::Int(1), Cell::Null]);

        let (kind, cells) = column_cells(&df, "F", "test").unwrap();
        assert_eq!(kind, ColumnKind::Double);
        assert_eq!(cells, vec![Cell::Float(0.5), Cell::Null]);

        let (kind, cells) = column_cells(&df, "S", "test").unwrap();
        assert_eq!(kind, ColumnKind::Character);
        assert_eq!(cells, vec![Cell::Str("a".into()), Cell::Null]);

        let (kind, _) = column_cells(&df, "B", "test").unwrap();
        assert_eq!(kind, ColumnKind::Logical);
    }

    #[test]
    fn test_metrics_round_trip_through_frame() {
        let mut table = MetricTable::new();
        table.push_num(&Key::from(7), "SSFCSAND", Some(0.25)).unwrap();
        table.push_num(&Key::from(7), "SSVSAND", None).unwrap();

        let df = metrics_to_frame(&table).unwrap();
        assert_eq!(df.height(), 2);
        let values = df.column("VALUE").unwrap().str().unwrap();
        assert_eq!(values.get(0), Some("0.25"));
        assert_eq!(values.get(1), None);
    }

    #[test]
    fn test_wide_from_frame() {
        let df = df![
            "SITE_ID" => &["a", "b"],
            "ECOREGION" => &["CPL", "XER"],
            "HIPWALL_SYN" => &[Some(0.4f64), None],
        ]
        .unwrap();
        let wide = wide_from_frame(&df, "SITE_ID").unwrap();
        assert_eq!(wide.text(&Key::from("a"), "ECOREGION"), Some("CPL".to_string()));
        assert_eq!(wide.num(&Key::from("a"), "HIPWALL_SYN"), Some(0.4));
        assert_eq!(wide.num(&Key::from("b"), "HIPWALL_SYN"), None);
    }
}

//! Typed schema descriptors for input tables
//!
//! A [`TableSchema`] lists the columns a table must carry, the primitive
//! kinds each column may arrive as, optional legal values (literal list or
//! pattern) and optional numeric bounds. One generic routine in
//! [`super::standardize`] consumes these descriptors.

use regex::Regex;
use std::fmt;

/// Primitive kind of an incoming column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    Integer,
    Double,
    Character,
    Logical,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ColumnKind::Integer => "integer",
            ColumnKind::Double => "double",
            ColumnKind::Character => "character",
            ColumnKind::Logical => "logical",
        };
        f.write_str(s)
    }
}

/// Where a column lands in an [`Observation`](crate::data::Observation)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Site,
    Station,
    Class,
    Value,
}

/// Representation a column is converted to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Opaque identifier (integer or text)
    Key,
    /// Categorical code, always text after standardization
    Code,
    /// Numeric measurement
    Number,
}

/// How unparseable text is handled when a number is expected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    /// Unparseable text is an illegal value
    Strict,
    /// Unparseable text becomes null
    NaByCoercion,
}

/// Legal values of a column
#[derive(Debug, Clone)]
pub enum Legal {
    Values(Vec<String>),
    Pattern(Regex),
}

impl Legal {
    pub fn values<S: AsRef<str>>(values: &[S]) -> Self {
        Legal::Values(values.iter().map(|v| v.as_ref().to_string()).collect())
    }

    pub fn allows(&self, value: &str) -> bool {
        match self {
            Legal::Values(values) => values.iter().any(|v| v == value),
            Legal::Pattern(re) => re.is_match(value),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Legal::Values(values) => format!("one of [{}]", values.join(", ")),
            Legal::Pattern(re) => format!("matching /{}/", re.as_str()),
        }
    }
}

/// Declared expectations for one column
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub name: String,
    pub role: Role,
    pub kinds: Vec<ColumnKind>,
    pub target: Target,
    pub legal: Option<Legal>,
    pub range: Option<(f64, f64)>,
    pub coercion: Coercion,
}

impl ColumnSpec {
    fn new(name: &str, role: Role, kinds: &[ColumnKind], target: Target) -> Self {
        Self {
            name: name.to_string(),
            role,
            kinds: kinds.to_vec(),
            target,
            legal: None,
            range: None,
            coercion: Coercion::Strict,
        }
    }

    pub fn site() -> Self {
        Self::new("SITE", Role::Site, &[ColumnKind::Integer, ColumnKind::Character], Target::Key)
    }

    pub fn station() -> Self {
        Self::new("STATION", Role::Station, &[ColumnKind::Integer, ColumnKind::Character], Target::Key)
    }

    pub fn class<S: AsRef<str>>(classes: &[S]) -> Self {
        let mut spec = Self::new("CLASS", Role::Class, &[ColumnKind::Character], Target::Code);
        spec.legal = Some(Legal::values(classes));
        spec
    }

    /// Categorical VALUE column restricted to `codes`
    pub fn codes<S: AsRef<str>>(codes: &[S]) -> Self {
        let mut spec = Self::new(
            "VALUE",
            Role::Value,
            &[ColumnKind::Integer, ColumnKind::Character, ColumnKind::Logical],
            Target::Code,
        );
        spec.legal = Some(Legal::values(codes));
        spec
    }

    /// Categorical VALUE column restricted by a pattern
    pub fn pattern(re: Regex) -> Self {
        let mut spec = Self::new(
            "VALUE",
            Role::Value,
            &[ColumnKind::Integer, ColumnKind::Character, ColumnKind::Logical],
            Target::Code,
        );
        spec.legal = Some(Legal::Pattern(re));
        spec
    }

    /// Numeric VALUE column within `[min, max]`
    pub fn numeric(min: f64, max: f64) -> Self {
        let mut spec = Self::new("VALUE", Role::Value, &[ColumnKind::Integer, ColumnKind::Double], Target::Number);
        spec.range = Some((min, max));
        spec
    }

    /// Accept numeric-looking text, turning anything unparseable into null
    pub fn na_by_coercion(mut self) -> Self {
        self.coercion = Coercion::NaByCoercion;
        self
    }

    pub fn accepts(&self, kind: ColumnKind) -> bool {
        self.kinds.contains(&kind)
    }
}

/// Declared schema of one input table
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSpec>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    pub fn column(mut self, spec: ColumnSpec) -> Self {
        self.columns.push(spec);
        self
    }

    /// SITE, STATION, VALUE with categorical values
    pub fn station_codes<S: AsRef<str>>(name: impl Into<String>, codes: &[S]) -> Self {
        Self::new(name)
            .column(ColumnSpec::site())
            .column(ColumnSpec::station())
            .column(ColumnSpec::codes(codes))
    }

    /// SITE, STATION, CLASS, VALUE with categorical values
    pub fn class_codes<S: AsRef<str>, T: AsRef<str>>(
        name: impl Into<String>,
        classes: &[S],
        codes: &[T],
    ) -> Self {
        Self::new(name)
            .column(ColumnSpec::site())
            .column(ColumnSpec::station())
            .column(ColumnSpec::class(classes))
            .column(ColumnSpec::codes(codes))
    }

    /// SITE, STATION, VALUE with a numeric value spec
    pub fn station_numbers(name: impl Into<String>, value: ColumnSpec) -> Self {
        Self::new(name)
            .column(ColumnSpec::site())
            .column(ColumnSpec::station())
            .column(value)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn spec_for(&self, role: Role) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.role == role)
    }
}

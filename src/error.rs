//! Error taxonomy for metric calculation
//!
//! Validation problems are collected as [`Issue`]s so that every input table
//! of a call can be checked in one pass. Outside unit-test mode the collected
//! issues abort the aggregator as a single [`PhabError::Validation`].

use polars::prelude::PolarsError;
use std::fmt;
use thiserror::Error;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, PhabError>;

/// Classification of a single validation problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssueKind {
    /// Wrong column set or column types
    Schema,
    /// Value outside the legal set or numeric range
    IllegalValue,
    /// Table required for the requested computation is absent
    MissingInput,
    /// Lookup table lacks rows or columns for observed values
    StructuralMismatch,
}

impl IssueKind {
    fn label(self) -> &'static str {
        match self {
            IssueKind::Schema => "schema violation",
            IssueKind::IllegalValue => "illegal value",
            IssueKind::MissingInput => "missing input",
            IssueKind::StructuralMismatch => "structural mismatch",
        }
    }
}

/// One validation problem, tied to the input table it was found in
#[derive(Debug, Clone, PartialEq)]
pub struct Issue {
    pub table: String,
    pub kind: IssueKind,
    pub message: String,
}

impl Issue {
    pub fn new(table: impl Into<String>, kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            kind,
            message: message.into(),
        }
    }

    pub fn schema(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(table, IssueKind::Schema, message)
    }

    pub fn illegal(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(table, IssueKind::IllegalValue, message)
    }

    pub fn missing(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(table, IssueKind::MissingInput, message)
    }

    pub fn mismatch(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(table, IssueKind::StructuralMismatch, message)
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.table, self.kind.label(), self.message)
    }
}

/// Errors returned by aggregators, the reconciler and condition assigners
#[derive(Error, Debug)]
pub enum PhabError {
    /// Wrong column set or column types on an input table
    #[error("Schema violation in {table}: {message}")]
    SchemaViolation { table: String, message: String },

    /// A value outside the declared legal set or numeric range
    #[error("Illegal value in {table}: {message}")]
    IllegalValue { table: String, message: String },

    /// A table required for the requested computation mode is absent
    #[error("Missing mandatory input: {0}")]
    MissingInput(String),

    /// Lookup table is missing rows or columns for values actually observed
    #[error("Structural mismatch: {0}")]
    StructuralMismatch(String),

    /// Every issue collected while standardizing the inputs of one call
    #[error("{}", join_issues(.0))]
    Validation(Vec<Issue>),

    /// Failure inside polars while building or reading a frame
    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    /// Failure at the frame boundary, with context chain
    #[error(transparent)]
    Frame(#[from] anyhow::Error),

    /// Override configuration could not be parsed
    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

impl PhabError {
    /// Validation issues carried by this error, if any
    pub fn issues(&self) -> &[Issue] {
        match self {
            PhabError::Validation(issues) => issues,
            _ => &[],
        }
    }
}

impl From<Issue> for PhabError {
    fn from(issue: Issue) -> Self {
        match issue.kind {
            IssueKind::Schema => PhabError::SchemaViolation {
                table: issue.table,
                message: issue.message,
            },
            IssueKind::IllegalValue => PhabError::IllegalValue {
                table: issue.table,
                message: issue.message,
            },
            IssueKind::MissingInput => {
                PhabError::MissingInput(format!("{}: {}", issue.table, issue.message))
            }
            IssueKind::StructuralMismatch => {
                PhabError::StructuralMismatch(format!("{}: {}", issue.table, issue.message))
            }
        }
    }
}

fn join_issues(issues: &[Issue]) -> String {
    let lines: Vec<String> = issues.iter().map(|i| i.to_string()).collect();
    format!(
        "{} validation error(s) in input tables:\n  {}",
        issues.len(),
        lines.join("\n  ")
    )
}

//! Utility modules for metric aggregation
//!
//! Contains shared functionality used across every metric family:
//! - Schema + standardization: validating raw input tables
//! - Lookup tables: code → weight/flag/diameter mappings
//! - Normalization: station cover rescaling and site reductions
//! - Class counting: presence, variety and dense count grids
//! - Frame helpers: polars boundary conversions

pub mod schema;
pub mod standardize;
pub mod frames;
pub mod stats;
pub mod lookup_tables;
pub mod normalization;
pub mod class_counter;

// Re-export commonly used types
pub use schema::{ColumnKind, ColumnSpec, TableSchema};
pub use standardize::{standardize_table, Standardized, Standardizer};
pub use frames::{materialize_with_columns, metrics_to_frame, wide_from_frame};
pub use lookup_tables::{ClassWeightTable, FlowType, LookupTables};
pub use normalization::{modal_class, normalize_station_covers, ModalClass, StationWeight};

//! Physical Habitat Metrics
//!
//! Site-level physical habitat metrics from long-format aquatic survey
//! observations, and the condition classes derived from them.
//!
//! Layout:
//! - `utils/`: standardization, lookup tables, cover normalization, statistics
//! - `drawdown`: drawdown-zone reconciliation and synthetic riparian/drawdown blends
//! - `metrics/`: one aggregator per metric family
//! - `condition/`: threshold and observed/expected condition assigners
//! - `calculator`: runs all families for a batch of site visits
//!
//! Data flows one way: raw tables → standardizer → drawdown reconciler →
//! cover normalization → aggregators → long `(site, metric, value)` records.

pub mod error;
pub mod data;
pub mod utils;
pub mod drawdown;
pub mod metrics;
pub mod condition;
pub mod calculator;

// Re-export commonly used types
pub use calculator::{Family, PhabCalculator, PhabInputs, FAMILIES};
pub use condition::{ConditionClass, ConditionRecord, SiteCovariates};
pub use data::{Key, MetricRecord, MetricTable, MetricValue, Observation, ObservationTable, WideTable};
pub use drawdown::DrawdownPolicy;
pub use error::{Issue, PhabError, Result};
pub use metrics::*;
pub use utils::{metrics_to_frame, wide_from_frame, LookupTables};

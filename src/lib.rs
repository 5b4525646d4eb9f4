//! Safety analytics over loosely-shaped incident, hazard, audit, and inspection tables.
//!
//! Every computation takes [`table::Table`] snapshots and a [`filter::FilterSpec`], resolves the
//! columns it needs by name at runtime, and returns serializable summaries.

pub mod aggregate;
pub mod charts;
pub mod columns;
pub mod config;
pub mod error;
pub mod filter;
pub mod forecast;
pub mod insights;
pub mod kpi;
pub mod loader;
pub mod models;
pub mod pyramid;
pub mod report;
pub mod risk;
pub mod severity;
pub mod table;

pub use error::{HseError, Result};
pub use filter::FilterSpec;
pub use table::{Table, Value};

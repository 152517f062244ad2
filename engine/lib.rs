#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

//! Confounder adjustment for pairwise county comparisons.
//!
//! A year of county records is residualized against a chosen set of
//! confounders with an ordinary-least-squares fit, so two counties can be
//! compared on outcomes with the confounders' influence removed.

pub mod adjuster;
pub mod compare;
pub mod config;
pub mod eligibility;
pub mod encode;
pub mod record;
pub mod regression;
pub mod result;
pub mod store;

pub use compare::{
    AdjustmentRequest, ControlSet, adjust, adjust_dataset, adjust_years, find_comparable_pair,
};
pub use config::{AdjustmentConfig, ConfigError};
pub use record::{Confounder, ConfounderValue, Outcome, RegionRecord, UrbanRural};
pub use result::{AdjustmentReport, OutcomeResult, RequestError};
pub use store::{CsvYearStore, JsonYearStore, MemoryStore, RecordStore, StoreError, YearDataset};

// ===============================
// src/lib.rs
// ===============================
pub mod config;
pub mod controller;
pub mod dashboard;
pub mod delta;
pub mod domain;
pub mod engine;
pub mod error;
pub mod gate;
pub mod http_store;
pub mod memory_store;
pub mod metrics;
pub mod server;
pub mod state;
pub mod store;

pub use dashboard::{Dashboard, Summary};
pub use domain::{AggregationSnapshot, LedgerCategory, Money, MutationIntent, PeriodKey};
pub use engine::{ReconciliationEngine, RetryPolicy};
pub use error::{LedgerError, RefreshError, StoreError, ValidationError};
pub use state::{AggregationState, Freshness};

//! A/B experiment metrics
//!
//! Builds a per-user experiment record from group assignments, the
//! active-user log, and payments, then derives per-group conversion rate,
//! ARPAU, and ARPPU.
//!
//! Stages run one way: loader → reconcile → assemble → consolidate. Only
//! the loader performs I/O.

pub mod assemble;
pub mod config;
pub mod consolidate;
pub mod loader;
pub mod models;
pub mod pipeline;
pub mod reconcile;
pub mod report;
pub mod table;

mod error;

pub use assemble::assemble;
pub use consolidate::{consolidate, consolidate_with, ZeroDenominatorPolicy};
pub use error::{MetricsError, Result};
pub use reconcile::reconcile;

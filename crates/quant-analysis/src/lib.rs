//! Returns, risk metrics, drawdowns and export projections over a validated
//! price table.
//!
//! [`DataProcessor`] is the entry point: it owns one request's raw prices and
//! caches every derived table so all downstream outputs agree.

pub mod correlation;
pub mod drawdown;
pub mod export;
pub mod metrics;
pub mod monthly;
pub mod processor;
pub mod returns;

pub use processor::DataProcessor;

//! Strata - container image layer analysis
//!
//! Analyzes container images in the background and serves the results
//! from a bounded, time-limited cache.

pub mod analysis;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod server;
pub mod ui;
pub mod views;

pub use error::{StrataError, StrataResult};

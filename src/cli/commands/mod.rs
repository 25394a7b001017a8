//! CLI command implementations

pub mod analyze;
pub mod config;
pub mod serve;

pub use analyze::execute as analyze;
pub use config::execute as config;
pub use serve::execute as serve;

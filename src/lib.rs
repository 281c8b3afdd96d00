pub mod analyzer;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod graph;
pub mod query;
pub mod server;

#[cfg(test)]
pub(crate) mod testing;

pub use analyzer::{Analyzer, AnalyzerStats, Path};
pub use config::Config;
pub use error::{PathfinderError, Result};
pub use query::QueryClient;
pub use server::PathServer;

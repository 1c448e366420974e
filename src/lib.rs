pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use config::{cli::LocalStorage, toml_config::ScanConfig};
pub use crate::core::{
    budget::SystemClock, extractor::ListingExtractor, scanner::ScanOrchestrator,
    walker::CatalogWalker,
};
pub use utils::error::{Result, ScanError};

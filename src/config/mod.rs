pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
use crate::utils::error::Result;
#[cfg(feature = "cli")]
use crate::utils::validation::Validate;
#[cfg(feature = "cli")]
use clap::Parser;
#[cfg(feature = "cli")]
use serde::{Deserialize, Serialize};

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(name = "arbitrage-scan")]
#[command(about = "Scan catalog listings and compare them against reference marketplace prices")]
pub struct CliConfig {
    #[arg(long, short = 'c', default_value = "scan.toml")]
    pub config: String,

    #[arg(long, help = "Override [scan].max_pages")]
    pub max_pages: Option<usize>,

    #[arg(long, help = "Catalog language filter, e.g. German or any")]
    pub language: Option<String>,

    #[arg(long, help = "Write the full scan report as JSON to this path")]
    pub output: Option<String>,

    #[arg(long, help = "Validate configuration and print the resolved plan without scanning")]
    pub dry_run: bool,

    #[arg(long, help = "Emit logs as JSON lines")]
    pub json_logs: bool,

    #[arg(long, short = 'v', help = "Enable verbose output")]
    pub verbose: bool,
}

#[cfg(feature = "cli")]
impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        crate::utils::validation::validate_non_empty_string("config", &self.config)?;
        if let Some(pages) = self.max_pages {
            crate::utils::validation::validate_positive_number("max_pages", pages as u64, 1)?;
        }
        if let Some(output) = &self.output {
            crate::utils::validation::validate_path("output", output)?;
        }
        Ok(())
    }
}

#[cfg(all(test, feature = "cli"))]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_and_overrides() {
        let config = CliConfig::parse_from(["arbitrage-scan"]);
        assert_eq!(config.config, "scan.toml");
        assert!(!config.dry_run);
        assert!(config.validate().is_ok());

        let config = CliConfig::parse_from([
            "arbitrage-scan",
            "--config",
            "prod.toml",
            "--max-pages",
            "5",
            "--language",
            "any",
            "--dry-run",
        ]);
        assert_eq!(config.max_pages, Some(5));
        assert_eq!(config.language.as_deref(), Some("any"));
        assert!(config.dry_run);
    }

    #[test]
    fn test_zero_pages_rejected() {
        let config = CliConfig::parse_from(["arbitrage-scan", "--max-pages", "0"]);
        assert!(config.validate().is_err());

        let config = CliConfig::parse_from(["arbitrage-scan", "--config", " "]);
        assert!(config.validate().is_err());
    }
}

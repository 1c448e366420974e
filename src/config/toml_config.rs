use crate::adapters::ebay::{
    EbayCredentials, EbaySettings, SearchLinks, DEFAULT_AUTH_URL, DEFAULT_BROWSE_URL,
    DEFAULT_MARKETPLACE_ID, DEFAULT_SITE_URL,
};
use crate::adapters::fetcher::FetcherSettings;
use crate::core::scanner::ScanSettings;
use crate::domain::language::LanguageFilter;
use crate::domain::model::CatalogSource;
use crate::utils::error::{AuthError, Result, ScanError};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

static ENV_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("env placeholder pattern"));

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default)]
    pub scan: ScanSection,
    #[serde(default)]
    pub fetcher: FetcherSection,
    #[serde(default)]
    pub reference: ReferenceSection,
    #[serde(default)]
    pub report: ReportSection,
    #[serde(default)]
    pub sources: Vec<CatalogSource>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSection {
    pub max_pages: usize,
    /// 未設定時依來源數量分級：1-2 個來源 300，3 個以上 200
    pub max_items_per_source: Option<usize>,
    pub category_budget_secs: u64,
    /// 未設定時：2 個來源以內 2000ms，3 個以上 1500ms
    pub lookup_delay_ms: Option<u64>,
    pub rate_limit_threshold: usize,
    pub safety_margin_secs: u64,
    pub lookup_cost_estimate_ms: u64,
    pub language: String,
    pub min_roi_report: f64,
}

impl Default for ScanSection {
    fn default() -> Self {
        Self {
            max_pages: 3,
            max_items_per_source: None,
            category_budget_secs: 540,
            lookup_delay_ms: None,
            rate_limit_threshold: 5,
            safety_margin_secs: 20,
            lookup_cost_estimate_ms: 2000,
            language: "German".to_string(),
            min_roi_report: 150.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherSection {
    pub base_url: String,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub timeout_secs: u64,
    pub retry_attempts: u32,
    pub accept_language: String,
}

impl Default for FetcherSection {
    fn default() -> Self {
        let defaults = FetcherSettings::default();
        Self {
            base_url: "https://www.vinted.de".to_string(),
            min_delay_ms: defaults.min_delay_ms,
            max_delay_ms: defaults.max_delay_ms,
            timeout_secs: defaults.timeout_secs,
            retry_attempts: 0,
            accept_language: defaults.accept_language,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceSection {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub marketplace_id: String,
    pub auth_url: String,
    pub browse_url: String,
    pub site_url: String,
    pub timeout_secs: u64,
}

impl Default for ReferenceSection {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            marketplace_id: DEFAULT_MARKETPLACE_ID.to_string(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            browse_url: DEFAULT_BROWSE_URL.to_string(),
            site_url: DEFAULT_SITE_URL.to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSection {
    pub output_path: String,
    pub enabled: bool,
}

impl Default for ReportSection {
    fn default() -> Self {
        Self {
            output_path: "./output".to_string(),
            enabled: true,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl ScanConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(ScanError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = Self::substitute_env_vars(content);

        toml::from_str(&processed).map_err(|e| ScanError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換 ${VAR}；找不到的變數替換為空字串，視同未設定
    fn substitute_env_vars(content: &str) -> String {
        ENV_PLACEHOLDER
            .replace_all(content, |caps: &regex::Captures| {
                std::env::var(&caps[1]).unwrap_or_default()
            })
            .into_owned()
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// 部署時慣用的環境變數；數值無法解析時保留原值
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(name: &str, raw: Option<String>) -> Option<T> {
            let raw = raw?;
            match raw.trim().parse::<T>() {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!("⚠️ Ignoring invalid value '{}' for {}", raw, name);
                    None
                }
            }
        }

        if let Some(pages) = parsed::<usize>("MAX_SCAN_PAGES", lookup("MAX_SCAN_PAGES")) {
            self.scan.max_pages = pages;
        }
        if let Some(roi) = parsed::<f64>("MIN_ROI_EMAIL", lookup("MIN_ROI_EMAIL")) {
            self.scan.min_roi_report = roi;
        }
        if let Some(delay) = parsed::<u64>("EBAY_API_DELAY_MS", lookup("EBAY_API_DELAY_MS")) {
            self.scan.lookup_delay_ms = Some(delay);
        }

        if non_empty(&self.reference.client_id).is_none() {
            self.reference.client_id = lookup("EBAY_CLIENT_ID");
        }
        if non_empty(&self.reference.client_secret).is_none() {
            self.reference.client_secret = lookup("EBAY_CLIENT_SECRET");
        }
        if let Some(marketplace) = lookup("EBAY_MARKETPLACE_ID").filter(|v| !v.trim().is_empty()) {
            self.reference.marketplace_id = marketplace;
        }
    }

    pub fn enabled_sources(&self) -> Vec<CatalogSource> {
        self.sources.iter().filter(|s| s.enabled).cloned().collect()
    }

    /// 依啟用來源數量決定預算
    pub fn scan_settings(&self, source_count: usize) -> ScanSettings {
        let default_items = if source_count >= 3 { 200 } else { 300 };
        let default_delay = if source_count >= 3 { 1500 } else { 2000 };

        ScanSettings {
            max_pages: self.scan.max_pages,
            max_items_per_source: Some(self.scan.max_items_per_source.unwrap_or(default_items)),
            category_budget: Duration::from_secs(self.scan.category_budget_secs),
            lookup_delay: Duration::from_millis(self.scan.lookup_delay_ms.unwrap_or(default_delay)),
            rate_limit_threshold: self.scan.rate_limit_threshold,
            safety_margin: Duration::from_secs(self.scan.safety_margin_secs),
            lookup_cost_estimate: Duration::from_millis(self.scan.lookup_cost_estimate_ms),
            language: LanguageFilter::parse(&self.scan.language),
        }
    }

    pub fn fetcher_settings(&self) -> FetcherSettings {
        FetcherSettings {
            min_delay_ms: self.fetcher.min_delay_ms,
            max_delay_ms: self.fetcher.max_delay_ms,
            timeout_secs: self.fetcher.timeout_secs,
            accept_language: self.fetcher.accept_language.clone(),
            referer: Some(format!("{}/", self.fetcher.base_url.trim_end_matches('/'))),
        }
    }

    pub fn ebay_settings(&self) -> EbaySettings {
        EbaySettings {
            auth_url: self.reference.auth_url.clone(),
            browse_url: self.reference.browse_url.clone(),
            timeout_secs: self.reference.timeout_secs,
        }
    }

    pub fn search_links(&self) -> SearchLinks {
        SearchLinks::new(&self.reference.site_url, &self.reference.marketplace_id)
    }

    /// 兩個值都沒設定時回傳 None（只用人工搜尋連結）
    pub fn credentials(&self) -> Option<std::result::Result<EbayCredentials, AuthError>> {
        let id = non_empty(&self.reference.client_id);
        let secret = non_empty(&self.reference.client_secret);
        if id.is_none() && secret.is_none() {
            return None;
        }
        Some(EbayCredentials::new(
            id.unwrap_or_default(),
            secret.unwrap_or_default(),
            &self.reference.marketplace_id,
        ))
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validation::validate_positive_number("scan.max_pages", self.scan.max_pages as u64, 1)?;
        validation::validate_positive_number(
            "scan.rate_limit_threshold",
            self.scan.rate_limit_threshold as u64,
            1,
        )?;
        validation::validate_positive_number(
            "scan.category_budget_secs",
            self.scan.category_budget_secs,
            1,
        )?;
        if let Some(cap) = self.scan.max_items_per_source {
            validation::validate_positive_number("scan.max_items_per_source", cap as u64, 1)?;
        }
        if !self.scan.min_roi_report.is_finite() {
            return Err(ScanError::InvalidConfigValueError {
                field: "scan.min_roi_report".to_string(),
                value: self.scan.min_roi_report.to_string(),
                reason: "Value must be a finite number".to_string(),
            });
        }

        validation::validate_url("fetcher.base_url", &self.fetcher.base_url)?;
        validation::validate_ordered_range(
            "fetcher.min_delay_ms..max_delay_ms",
            self.fetcher.min_delay_ms,
            self.fetcher.max_delay_ms,
        )?;
        validation::validate_positive_number("fetcher.timeout_secs", self.fetcher.timeout_secs, 1)?;

        validation::validate_url("reference.auth_url", &self.reference.auth_url)?;
        validation::validate_url("reference.browse_url", &self.reference.browse_url)?;
        validation::validate_url("reference.site_url", &self.reference.site_url)?;

        if self.report.enabled {
            validation::validate_path("report.output_path", &self.report.output_path)?;
        }

        // 單一來源的網址錯誤由掃描時記錄為該來源失敗，不中止整次掃描
        for (index, source) in self.sources.iter().enumerate().filter(|(_, s)| s.enabled) {
            if let Err(e) = validation::validate_url(&format!("sources[{}].url", index), &source.url) {
                tracing::warn!(
                    "⚠️ Source '{}' will be reported as failed: {}",
                    source.name,
                    e.user_friendly_message()
                );
            }
        }

        Ok(())
    }
}

impl Validate for ScanConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const BASIC: &str = r#"
[scan]
max_pages = 2
language = "any"

[fetcher]
min_delay_ms = 0
max_delay_ms = 0

[report]
output_path = "./deals"

[[sources]]
name = "Manga"
url = "https://www.vinted.de/catalog?catalog[]=2309"
category = "Books"

[[sources]]
name = "Games"
url = "https://www.vinted.de/catalog?catalog[]=3026"
enabled = false
"#;

    #[test]
    fn test_parse_basic_config_with_defaults() {
        let config = ScanConfig::from_toml_str(BASIC).unwrap();

        assert_eq!(config.scan.max_pages, 2);
        assert_eq!(config.scan.category_budget_secs, 540);
        assert_eq!(config.scan.min_roi_report, 150.0);
        assert_eq!(config.reference.marketplace_id, "EBAY_DE");
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[1].category, "Uncategorized");
        assert_eq!(config.enabled_sources().len(), 1);
        assert!(config.validate().is_ok());
        assert!(config.credentials().is_none());
    }

    #[test]
    fn test_tiered_defaults_by_source_count() {
        let config = ScanConfig::default();

        let one = config.scan_settings(1);
        assert_eq!(one.max_items_per_source, Some(300));
        assert_eq!(one.lookup_delay, Duration::from_millis(2000));
        assert_eq!(one.language, LanguageFilter::Only { name: "German", book_id: "6437" });

        let two = config.scan_settings(2);
        assert_eq!(two.max_items_per_source, Some(300));

        let three = config.scan_settings(3);
        assert_eq!(three.max_items_per_source, Some(200));
        assert_eq!(three.lookup_delay, Duration::from_millis(1500));
    }

    #[test]
    fn test_explicit_values_beat_tiers() {
        let mut config = ScanConfig::default();
        config.scan.max_items_per_source = Some(50);
        config.scan.lookup_delay_ms = Some(750);

        let settings = config.scan_settings(4);
        assert_eq!(settings.max_items_per_source, Some(50));
        assert_eq!(settings.lookup_delay, Duration::from_millis(750));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("MAX_SCAN_PAGES", "5"),
            ("MIN_ROI_EMAIL", "200"),
            ("EBAY_API_DELAY_MS", "not-a-number"),
            ("EBAY_CLIENT_ID", "env-client-id-0123456789"),
            ("EBAY_CLIENT_SECRET", "env-client-secret-0123456789"),
        ]);

        let mut config = ScanConfig::default();
        config.reference.client_secret = Some("file-secret-0123456789abc".to_string());
        config.apply_overrides(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.scan.max_pages, 5);
        assert_eq!(config.scan.min_roi_report, 200.0);
        assert_eq!(config.scan.lookup_delay_ms, None);
        assert_eq!(config.reference.client_id.as_deref(), Some("env-client-id-0123456789"));
        assert_eq!(
            config.reference.client_secret.as_deref(),
            Some("file-secret-0123456789abc")
        );

        let creds = config.credentials().unwrap().unwrap();
        assert_eq!(creds.client_id, "env-client-id-0123456789");
    }

    #[test]
    fn test_unresolved_placeholder_means_unset() {
        let content = r#"
[reference]
client_id = "${ARBITRAGE_SCAN_TEST_UNSET_ID}"
client_secret = "${ARBITRAGE_SCAN_TEST_UNSET_SECRET}"
"#;
        let config = ScanConfig::from_toml_str(content).unwrap();
        assert!(config.credentials().is_none());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("ARBITRAGE_SCAN_TEST_BASE_URL", "https://www.vinted.fr");
        let config =
            ScanConfig::from_toml_str("[fetcher]\nbase_url = \"${ARBITRAGE_SCAN_TEST_BASE_URL}\"\n")
                .unwrap();
        assert_eq!(config.fetcher.base_url, "https://www.vinted.fr");
        assert_eq!(
            config.fetcher_settings().referer.as_deref(),
            Some("https://www.vinted.fr/")
        );
        std::env::remove_var("ARBITRAGE_SCAN_TEST_BASE_URL");
    }

    #[test]
    fn test_config_validation_failures() {
        let mut config = ScanConfig::from_toml_str(BASIC).unwrap();
        config.fetcher.min_delay_ms = 6000;
        config.fetcher.max_delay_ms = 2000;
        assert!(config.validate().is_err());

        let mut config = ScanConfig::from_toml_str(BASIC).unwrap();
        config.scan.max_pages = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_source_urls_do_not_fail_validation() {
        let mut config = ScanConfig::from_toml_str(BASIC).unwrap();
        config.sources[1].url = "vinted catalog manga".to_string();
        assert!(config.validate().is_ok());

        config.sources[0].url = "invalid-url".to_string();
        assert!(config.validate().is_ok());
        assert_eq!(config.enabled_sources().len(), 1);
    }

    #[test]
    fn test_malformed_credentials_surface_as_auth_error() {
        let mut config = ScanConfig::default();
        config.reference.client_id = Some("\"short\"".to_string());
        config.reference.client_secret = Some("also-short".to_string());

        match config.credentials() {
            Some(Err(AuthError::MalformedCredentials { field, length, .. })) => {
                assert_eq!(field, "client_id");
                assert_eq!(length, 5);
            }
            other => panic!("unexpected credentials result: {:?}", other),
        }
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(BASIC.as_bytes()).unwrap();

        let config = ScanConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.sources[0].name, "Manga");
    }
}

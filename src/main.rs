use arbitrage_scan::adapters::{DigestReporter, EbayBrowseClient, HttpPageFetcher, TokenCache};
use arbitrage_scan::domain::model::{ReportOutcome, ScanReport};
use arbitrage_scan::domain::ports::{Clock, DealReporter, PriceLookup, Storage};
use arbitrage_scan::utils::error::ErrorSeverity;
use arbitrage_scan::utils::{logger, validation::Validate};
use arbitrage_scan::{
    CatalogWalker, CliConfig, LocalStorage, Result, ScanConfig, ScanError, ScanOrchestrator,
    SystemClock,
};
use clap::Parser;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let cli = CliConfig::parse();

    // 初始化日誌
    if cli.json_logs {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting arbitrage-scan CLI");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    if let Err(e) = run(cli).await {
        tracing::error!(
            "❌ Scan failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 建議: {}", e.recovery_suggestion());

        // 根據錯誤嚴重程度決定退出碼
        let exit_code = match e.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        };
        if exit_code > 0 {
            std::process::exit(exit_code);
        }
    }
}

fn load_config(cli: &CliConfig) -> Result<ScanConfig> {
    cli.validate()?;

    let mut config = ScanConfig::from_file(&cli.config)?;
    config.apply_env_overrides();

    if let Some(pages) = cli.max_pages {
        config.scan.max_pages = pages;
    }
    if let Some(language) = &cli.language {
        config.scan.language = language.clone();
    }

    config.validate()?;
    Ok(config)
}

fn build_lookup(config: &ScanConfig, clock: Arc<dyn Clock>) -> Option<Arc<dyn PriceLookup>> {
    let credentials = match config.credentials() {
        None => {
            tracing::info!("ℹ️ EBAY_CLIENT_ID / EBAY_CLIENT_SECRET not set, price lookups disabled");
            return None;
        }
        Some(Err(e)) => {
            tracing::error!("❌ Reference credentials rejected: {}", e);
            tracing::error!("💡 {}", e.diagnostic());
            return None;
        }
        Some(Ok(credentials)) => credentials,
    };

    tracing::info!(
        "🔑 Reference credentials loaded for {} (id {} chars, secret {} chars)",
        credentials.marketplace_id,
        credentials.client_id.len(),
        credentials.client_secret.len()
    );

    let tokens = Arc::new(TokenCache::new(clock));
    match EbayBrowseClient::new(credentials, config.ebay_settings(), tokens, config.search_links()) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            tracing::error!("❌ Could not build reference marketplace client: {}", e);
            None
        }
    }
}

async fn write_json_report(path: &str, report: &ScanReport) -> Result<()> {
    let json = serde_json::to_vec_pretty(report)?;
    LocalStorage::new(".").write_file(path, &json).await?;
    tracing::info!("📁 Scan report saved to: {}", path);
    Ok(())
}

async fn run(cli: CliConfig) -> Result<()> {
    let config = load_config(&cli)?;
    let sources = config.enabled_sources();
    let settings = config.scan_settings(sources.len());

    if cli.dry_run {
        println!("✅ Configuration valid: {}", cli.config);
        println!(
            "📋 {} enabled sources, {} pages each, {}s budget per source, {}ms lookup delay",
            sources.len(),
            settings.max_pages,
            settings.category_budget.as_secs(),
            settings.lookup_delay.as_millis()
        );
        for source in &sources {
            println!("  - {} [{}]: {}", source.name, source.category, source.url);
        }
        return Ok(());
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let fetcher = HttpPageFetcher::new(config.fetcher_settings(), clock.clone())
        .map_err(|e| ScanError::config(format!("failed to build catalog HTTP client: {}", e)))?;
    let walker = CatalogWalker::new(Arc::new(fetcher))
        .with_retry_attempts(config.fetcher.retry_attempts);

    let lookup = build_lookup(&config, clock.clone());
    let scanner = ScanOrchestrator::new(walker, lookup, config.search_links(), clock, settings);

    let report = scanner.run(&sources).await?;

    // 報表與 JSON 輸出互不影響
    let digest = async {
        if !config.report.enabled {
            return None;
        }
        let reporter = DigestReporter::new(
            LocalStorage::new(config.report.output_path.clone()),
            config.search_links(),
        );
        Some(
            reporter
                .report(
                    &report.deals,
                    config.scan.min_roi_report,
                    &report.stats.per_source_stats,
                    &report.stats,
                )
                .await,
        )
    };
    let json_output = async {
        match &cli.output {
            Some(path) => Some(write_json_report(path, &report).await),
            None => None,
        }
    };
    let (digest_outcome, json_outcome) = tokio::join!(digest, json_output);

    println!("✅ Scan completed in {}s", report.duration_secs);
    println!(
        "📊 {} deals: {} priced, {} fallback only, {} skipped for time",
        report.deals.len(),
        report.stats.items_with_price_result,
        report.stats.items_fallback_only,
        report.stats.items_skipped_for_timeout
    );
    for source in &report.stats.per_source_stats {
        match &source.error {
            Some(error) => println!("  ❌ {}: {}", source.name, error),
            None => println!(
                "  - {}: {} pages, {} items, {} priced",
                source.name, source.pages_scraped, source.items_scraped, source.with_price_result
            ),
        }
    }

    if let Some(ReportOutcome {
        success,
        message,
        filtered_count,
    }) = digest_outcome
    {
        let marker = if success { "📬" } else { "⚠️" };
        println!("{} Digest: {} ({} deals)", marker, message, filtered_count);
    }
    if let Some(Err(e)) = json_outcome {
        tracing::error!("❌ Failed to write scan report: {}", e);
        eprintln!("⚠️ {}", e.user_friendly_message());
    }

    Ok(())
}

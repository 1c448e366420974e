use anyhow::{anyhow, Context, Result};
use arbitrage_scan::adapters::{EbayBrowseClient, TokenCache};
use arbitrage_scan::domain::model::Condition;
use arbitrage_scan::domain::ports::{LookupOutcome, PriceLookup};
use arbitrage_scan::utils::logger;
use arbitrage_scan::{ScanConfig, SystemClock};
use clap::Parser;
use std::sync::Arc;

/// 用目前的憑證對參考市場做一次查價，確認金鑰與網路設定
#[derive(Debug, Parser)]
#[command(name = "price_probe")]
struct ProbeArgs {
    #[arg(long, help = "Listing title to look up")]
    title: String,

    #[arg(long, default_value = "Gut", help = "Condition label, e.g. Neu, Sehr gut, Used")]
    condition: String,

    #[arg(long, short = 'c', help = "Optional scan config; environment variables are used otherwise")]
    config: Option<String>,

    #[arg(long, short = 'v')]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = ProbeArgs::parse();
    logger::init_cli_logger(args.verbose);

    let mut config = match &args.config {
        Some(path) => ScanConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path))?,
        None => ScanConfig::default(),
    };
    config.apply_env_overrides();

    let credentials = config
        .credentials()
        .ok_or_else(|| anyhow!("EBAY_CLIENT_ID and EBAY_CLIENT_SECRET are not set"))?
        .map_err(|e| anyhow!("{} ({})", e, e.diagnostic()))?;

    println!("🚀 Probing reference marketplace {}", credentials.marketplace_id);

    let links = config.search_links();
    let tokens = Arc::new(TokenCache::new(Arc::new(SystemClock)));
    let client = EbayBrowseClient::new(credentials, config.ebay_settings(), tokens, links.clone())
        .map_err(|e| anyhow!("building client: {}", e))?;

    let condition = Condition::from_label(&args.condition);
    match client.lookup(&args.title, condition).await {
        LookupOutcome::Priced(result) => {
            println!("✅ {:.2} € incl. shipping", result.price);
            println!("   {}", result.title);
            println!("   {}", result.url);
        }
        LookupOutcome::NoResult => println!("📭 No matching fixed-price listing"),
        LookupOutcome::RateLimited => println!("🚫 Rate limited, try again later"),
        LookupOutcome::Fatal(e) => return Err(anyhow!("authentication failed: {} ({})", e, e.diagnostic())),
    }

    println!("🔎 Search:   {}", links.search_url(&args.title, condition));
    println!("📈 Research: {}", links.research_url(&args.title));
    Ok(())
}

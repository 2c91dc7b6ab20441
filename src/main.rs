use anyhow::{Context, Result, anyhow};
use catalog_scraper::config::{ObjectStoreConfig, ScraperConfig};
use catalog_scraper::logging::init_logging;
use catalog_scraper::models::ScrapedProductRecord;
use catalog_scraper::pipeline::{PipelineDriver, RunReport};
use catalog_scraper::storage::{CatalogStore, CatalogUploader, JsonFileExport, StoreSink};
use chrono::Utc;
use std::env;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

const DEFAULT_CONFIG: &str = "src/configs/scraper.toml";

#[derive(Debug, Default)]
struct CliArgs {
    config: Option<String>,
    addresses: Vec<String>,
    replay: Option<PathBuf>,
    upload: bool,
    list: Option<String>,
    due: bool,
}

fn parse_args(args: impl Iterator<Item = String>) -> Result<CliArgs> {
    let mut cli = CliArgs::default();
    let mut args = args.skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                cli.config = Some(args.next().ok_or_else(|| anyhow!("--config needs a path"))?);
            }
            "--address" | "-a" => {
                cli.addresses
                    .push(args.next().ok_or_else(|| anyhow!("--address needs a value"))?);
            }
            "--replay" | "-r" => {
                let dir = args.next().ok_or_else(|| anyhow!("--replay needs a directory"))?;
                cli.replay = Some(PathBuf::from(dir));
            }
            "--upload" | "-u" => cli.upload = true,
            "--list" | "-l" => {
                cli.list = Some(args.next().ok_or_else(|| anyhow!("--list needs an address"))?);
            }
            "--due" => cli.due = true,
            other => return Err(anyhow!("Unknown argument: {}", other)),
        }
    }
    Ok(cli)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    let cli = parse_args(env::args())?;
    let config_path = cli.config.clone().unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let mut config = if Path::new(&config_path).exists() {
        ScraperConfig::from_file(&config_path)
            .with_context(|| format!("Failed to load scraper config: {}", config_path))?
    } else {
        ScraperConfig::default()
    };
    if cli.upload {
        config.output.upload = true;
    }

    let _log_guard = init_logging(&config.logging)?;
    info!("🚀 Starting catalog scraper ({})", config.site.name);

    if let Some(address) = &cli.list {
        return list_store(&config, address);
    }
    if cli.due {
        return list_due_stores(&config);
    }

    let addresses = if cli.addresses.is_empty() {
        config.addresses.clone()
    } else {
        cli.addresses.clone()
    };
    if addresses.is_empty() {
        warn!("⚠️ No addresses configured, nothing to do");
        return Ok(());
    }

    let driver = build_driver(config).await?;

    let mut reports = Vec::new();
    for address in &addresses {
        info!("\n=== Processing address: {} ===", address);

        let result = match &cli.replay {
            Some(dir) => driver.replay(dir, address).await,
            None => driver.run(address).await,
        };

        match result {
            Ok(report) => {
                log_report(&report);
                reports.push(report);
            }
            Err(e) => {
                error!("❌ Could not retrieve data for address {}: {}", address, e);
                // Continue with other addresses even if one fails
            }
        }
    }

    let total_products: usize = reports.iter().map(|r| r.catalog.len()).sum();
    info!("\n=== Catalog Scraper Summary ===");
    info!(
        "✅ Successfully processed {} out of {} addresses",
        reports.len(),
        addresses.len()
    );
    info!("📊 Total products collected: {}", total_products);

    let partial = reports.iter().filter(|r| r.is_partial()).count();
    if reports.is_empty() {
        warn!("⚠️ No addresses were processed successfully");
    } else if partial > 0 {
        warn!("⚠️ {} catalog(s) are partial, see the log for skipped pages", partial);
    } else {
        info!("🎉 All catalogs collected");
    }

    Ok(())
}

async fn build_driver(config: ScraperConfig) -> Result<PipelineDriver> {
    let output = config.output.clone();
    let mut driver = PipelineDriver::new(config)?
        .with_sink(Box::new(JsonFileExport::new(&output.results_dir)));

    if let Some(snapshot) = &output.store_snapshot {
        let sink = StoreSink::open(snapshot)
            .with_context(|| format!("Failed to open catalog store: {}", snapshot.display()))?;
        driver = driver.with_sink(Box::new(sink));
    }

    if output.upload {
        let store_config = ObjectStoreConfig::from_file(&output.object_store_config.to_string_lossy())
            .context("Failed to load object store configuration")?;
        info!(
            "Loaded object store configuration: {}@{}",
            store_config.endpoint, store_config.bucket_name
        );

        let uploader = CatalogUploader::from_config(&store_config).context(
            "Failed to initialize object store client. Please ensure MinIO is running and the credential variables are set",
        )?;
        uploader.ensure_bucket().await?;
        driver = driver.with_sink(Box::new(uploader));
    }

    Ok(driver)
}

fn log_report(report: &RunReport) {
    info!(
        "✅ {}: {} products from {} of {} pages ({:?})",
        report.address,
        report.catalog.len(),
        report.pages_processed,
        report.declared_pages,
        report.end
    );
    if !report.pages_failed.is_empty() {
        warn!("Skipped pages: {:?}", report.pages_failed);
    }
    if report.item_errors > 0 {
        warn!("{} product cards could not be read", report.item_errors);
    }
    for output in &report.outputs {
        info!("💾 {}", output);
    }
}

fn store_snapshot(config: &ScraperConfig) -> Result<&PathBuf> {
    config
        .output
        .store_snapshot
        .as_ref()
        .ok_or_else(|| anyhow!("output.store_snapshot is not configured"))
}

/// Print the stored catalog for an address. Counts as a request for the
/// store's popularity.
fn list_store(config: &ScraperConfig, address: &str) -> Result<()> {
    let snapshot = store_snapshot(config)?;
    let mut store = CatalogStore::load(snapshot)?;

    let Some(store_id) = store.get_store_by_address(address).map(|s| s.id) else {
        warn!("⚠️ No store recorded for address {}", address);
        return Ok(());
    };
    if let Some(updated) = store.update_popularity(store_id, Utc::now()) {
        info!(
            "📈 {}: popularity {:.1}, refresh every {} min",
            updated.address, updated.popularity_score, updated.update_frequency_minutes
        );
    }

    for product in store.products_by_store(store_id) {
        println!("{}", listing_line(&product.record));
    }

    store.save(snapshot)
}

/// Tab-separated category, name, volume and price.
fn listing_line(record: &ScrapedProductRecord) -> String {
    format!(
        "{}\t{}\t{}\t{}",
        record.category_label(),
        record.cleaned_name,
        record.volume_text,
        record.price_text
    )
}

fn list_due_stores(config: &ScraperConfig) -> Result<()> {
    let snapshot = store_snapshot(config)?;
    let store = CatalogStore::load(snapshot)?;

    let due = store.stores_due_for_update(Utc::now());
    info!("📊 {} store(s) due for update", due.len());
    for entry in due {
        println!("{}\t{}", entry.address, entry.update_frequency_minutes);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        std::iter::once("catalog-scraper".to_string()).chain(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_repeated_addresses() {
        let cli = parse_args(args(&["-a", "Ижевск, Кирова ул., 146", "--address", "Москва, Тверская, 1", "--upload"])).unwrap();
        assert_eq!(cli.addresses.len(), 2);
        assert!(cli.upload);
        assert!(cli.replay.is_none());
    }

    #[test]
    fn test_listing_line_keeps_drink_subtype() {
        let classifier = catalog_scraper::processor::NameClassifier::new().unwrap();
        let mut record = classifier.classify("напиток пивной Essa ананас 6,5%");
        record.volume_text = "0.45 л".to_string();
        record.price_text = "89,99 ₽".to_string();

        assert_eq!(
            listing_line(&record),
            "Напиток пивной\tEssa ананас\t0.45 л\t89,99 ₽"
        );
    }

    #[test]
    fn test_parse_rejects_unknown_and_missing_values() {
        assert!(parse_args(args(&["--bogus"])).is_err());
        assert!(parse_args(args(&["--replay"])).is_err());
    }
}

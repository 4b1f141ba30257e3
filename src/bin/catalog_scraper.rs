use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use assessrec::catalog::write_raw_rows;
use assessrec::logging;
use assessrec::scrape::{
    CatalogScraper, ScrapeSettings, CATALOG_BASE_URL, MAX_PAGES, PAGE_DELAY, PRODUCT_DELAY,
};
use assessrec::RawCatalogRow;
use clap::Parser;
use serde::Serialize;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "assessrec-scrape",
    about = "Scrape the Individual Test Solutions catalog into CSV and JSON"
)]
struct ScrapeCli {
    /// Catalog landing page
    #[arg(long, env = "ASSESSREC_CATALOG_URL", default_value = CATALOG_BASE_URL)]
    base_url: String,

    /// CSV output; a JSON copy is written next to it
    #[arg(
        long,
        env = "ASSESSREC_SCRAPE_OUTPUT",
        default_value = "data/shl_individual_test_solutions.csv"
    )]
    output: PathBuf,

    /// Listing snapshot written before product pages are fetched
    #[arg(long, default_value = "data/product_list.json")]
    product_list: PathBuf,

    /// Maximum catalog pages to walk
    #[arg(long, default_value_t = MAX_PAGES)]
    max_pages: usize,

    /// Milliseconds between catalog pages
    #[arg(long, default_value_t = PAGE_DELAY.as_millis() as u64)]
    page_delay_ms: u64,

    /// Milliseconds between product pages
    #[arg(long, default_value_t = PRODUCT_DELAY.as_millis() as u64)]
    product_delay_ms: u64,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ScrapeCli::parse();
    logging::init(cli.verbose);

    let settings = ScrapeSettings {
        base_url: cli.base_url.clone(),
        max_pages: cli.max_pages.max(1),
        page_delay: Duration::from_millis(cli.page_delay_ms),
        product_delay: Duration::from_millis(cli.product_delay_ms),
        ..ScrapeSettings::default()
    };
    let scraper = CatalogScraper::new(settings)?;

    let listings = scraper.list_products().await?;
    anyhow::ensure!(
        !listings.is_empty(),
        "no products found; the catalog markup may have changed"
    );
    write_json(&cli.product_list, &listings)?;
    info!(products = listings.len(), "starting product scrape");

    let backup_csv = suffixed(&cli.output, "backup");
    let backup_json = suffixed(&cli.output, "backup.json");
    let rows = scraper
        .scrape_products(listings, |rows| {
            write_csv(&backup_csv, rows)?;
            write_json(&backup_json, rows)
        })
        .await?;

    write_csv(&cli.output, &rows)?;
    write_json(&cli.output.with_extension("json"), &rows)?;
    info!(output = %cli.output.display(), rows = rows.len(), "scraping completed");
    Ok(())
}

fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

fn create(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("failed to create {:?}", parent))?;
    }
    File::create(path).with_context(|| format!("failed to create {:?}", path))
}

fn write_csv(path: &Path, rows: &[RawCatalogRow]) -> Result<()> {
    let file = create(path)?;
    write_raw_rows(BufWriter::new(file), rows).with_context(|| format!("failed to write {:?}", path))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let file = create(path)?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)
        .with_context(|| format!("failed to write {:?}", path))
}

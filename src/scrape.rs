//! Sequential scraper for the public product catalog.
//!
//! Catalog pages are walked one at a time, the "Individual Test Solutions" table is parsed
//! into listings, then every product page is fetched with a fixed politeness delay.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use url::Url;

use crate::catalog::{RawCatalogRow, MIN_CATALOG_SIZE};

/// Product catalog landing page.
pub const CATALOG_BASE_URL: &str = "https://www.shl.com/products/product-catalog/";
/// Listings per catalog page.
pub const ITEMS_PER_PAGE: usize = 12;
/// Pagination upper bound.
pub const MAX_PAGES: usize = 32;
/// Attempts per fetch.
pub const RETRY_ATTEMPTS: usize = 3;
/// Multiplied by the attempt number between retries.
pub const RETRY_DELAY: Duration = Duration::from_secs(2);
/// Pause between catalog pages.
pub const PAGE_DELAY: Duration = Duration::from_secs(2);
/// Pause between product pages.
pub const PRODUCT_DELAY: Duration = Duration::from_millis(1500);
/// Checkpoint interval, in products.
pub const BACKUP_EVERY: usize = 50;

const LISTING_TABLE_HEADING: &str = "Individual Test Solutions";
const FAILED_DESCRIPTION: &str = "Failed to scrape";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// URL of catalog page `page` (1-based), filtered to individual tests.
pub fn pagination_url(base: &str, page: usize) -> String {
    let start = page.saturating_sub(1) * ITEMS_PER_PAGE;
    match page {
        0 | 1 => format!("{base}?type=1"),
        2 => format!("{base}?start={start}&type=1"),
        _ => format!("{base}?start={start}&type=1&type=1"),
    }
}

/// One row of the catalog table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogListing {
    /// Link text.
    pub name: String,
    /// Absolute product URL.
    pub url: String,
    /// Raw "Remote Testing" cell.
    pub remote_testing: String,
    /// Raw "Adaptive/IRT" cell.
    pub adaptive: String,
    /// Raw test type letters.
    pub test_type: String,
}

/// Fields pulled from a product page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductDetails {
    /// Page heading.
    pub title: String,
    /// Description block or meta description.
    pub description: String,
    /// Overview block.
    pub overview: String,
    /// Category or breadcrumb tail.
    pub category: String,
    /// Feature bullets joined with ` | `.
    pub features: String,
    /// Benefit bullets joined with ` | `.
    pub benefits: String,
    /// Detail paragraphs joined with ` | `.
    pub details: String,
    /// Duration text.
    pub duration: String,
    /// Language text.
    pub language: String,
}

impl CatalogListing {
    /// Builds the output row; `None` marks a failed product fetch.
    pub fn into_row(self, details: Option<ProductDetails>) -> RawCatalogRow {
        let scraped_at = Utc::now().to_rfc3339();
        match details {
            Some(details) => RawCatalogRow {
                title: if details.title.is_empty() {
                    self.name.clone()
                } else {
                    details.title
                },
                name: self.name,
                url: self.url,
                description: details.description,
                overview: details.overview,
                category: details.category,
                remote_testing: self.remote_testing,
                adaptive_irt: self.adaptive,
                test_type: self.test_type,
                features: details.features,
                benefits: details.benefits,
                details: details.details,
                duration: details.duration,
                language: details.language,
                scraped_at,
                status: "success".to_string(),
            },
            None => RawCatalogRow {
                title: self.name.clone(),
                name: self.name,
                url: self.url,
                description: FAILED_DESCRIPTION.to_string(),
                remote_testing: self.remote_testing,
                adaptive_irt: self.adaptive,
                test_type: self.test_type,
                scraped_at,
                status: "error".to_string(),
                ..RawCatalogRow::default()
            },
        }
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|err| anyhow!("invalid selector {css:?}: {err:?}"))
}

fn selectors(css: &[&str]) -> Result<Vec<Selector>> {
    css.iter().map(|css| selector(css)).collect()
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Extracts listings from the "Individual Test Solutions" table of a catalog page.
///
/// Relative links resolve against `page_url`. Header rows and rows without a named link are
/// skipped. Returns an empty list when the table is absent.
pub fn parse_catalog_page(html: &str, page_url: &Url) -> Result<Vec<CatalogListing>> {
    let document = Html::parse_document(html);
    let table_sel = selector("table")?;
    let heading_sel = selector("th")?;
    let row_sel = selector("tbody tr")?;
    let cell_sel = selector("td")?;
    let cell_link_sel = selector("td a")?;
    let link_sel = selector("a")?;

    let Some(table) = document.select(&table_sel).find(|table| {
        table
            .select(&heading_sel)
            .any(|th| element_text(th).contains(LISTING_TABLE_HEADING))
    }) else {
        return Ok(Vec::new());
    };

    let mut listings = Vec::new();
    for row in table.select(&row_sel) {
        if row.select(&heading_sel).next().is_some() {
            continue;
        }
        let Some(link) = row
            .select(&cell_link_sel)
            .next()
            .or_else(|| row.select(&link_sel).next())
        else {
            continue;
        };
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let name = element_text(link);
        if name.is_empty() {
            continue;
        }
        let url = match page_url.join(href) {
            Ok(url) => url.to_string(),
            Err(err) => {
                warn!(href, error = %err, "skipping listing with unparsable link");
                continue;
            }
        };
        let cells: Vec<String> = row.select(&cell_sel).map(element_text).collect();
        let cell = |idx: usize| cells.get(idx).cloned().unwrap_or_default();
        listings.push(CatalogListing {
            name,
            url,
            remote_testing: cell(1),
            adaptive: cell(2),
            test_type: cell(3),
        });
    }
    Ok(listings)
}

struct ProductSelectors {
    title: Vec<Selector>,
    description: Vec<Selector>,
    overview: Vec<Selector>,
    category: Vec<Selector>,
    features: Vec<Selector>,
    benefits: Vec<Selector>,
    details: Vec<Selector>,
    duration: Vec<Selector>,
    language: Vec<Selector>,
    meta_description: Vec<Selector>,
}

impl ProductSelectors {
    fn new() -> Result<Self> {
        Ok(Self {
            title: selectors(&["h1.product-title", "h1.hero-title", "h1", ".page-title", ".product-name"])?,
            description: selectors(&[
                ".product-description",
                ".description",
                ".intro-text",
                "p.lead",
                ".summary",
                ".hero-description",
            ])?,
            overview: selectors(&[".overview", ".product-overview", ".about-product"])?,
            category: selectors(&[
                ".product-category",
                ".category",
                ".breadcrumb li:last-child",
                ".product-type",
            ])?,
            features: selectors(&[
                ".feature-item",
                ".features li",
                ".benefits li",
                ".key-features li",
                ".feature-list li",
            ])?,
            benefits: selectors(&[".benefit-item", ".benefits-list li", ".advantages li"])?,
            details: selectors(&[
                ".detail-item",
                ".specifications li",
                ".product-details p",
                ".overview p",
                ".product-info p",
            ])?,
            duration: selectors(&[".duration", ".test-duration", "*[class*=\"duration\"]"])?,
            language: selectors(&[".language", ".languages", "*[class*=\"language\"]"])?,
            meta_description: selectors(&[
                "meta[name=\"description\"]",
                "meta[property=\"description\"]",
            ])?,
        })
    }
}

/// Text of the first element matched by the first selector that matches anything.
fn first_text(document: &Html, selectors: &[Selector]) -> String {
    selectors
        .iter()
        .find_map(|sel| document.select(sel).next())
        .map(element_text)
        .unwrap_or_default()
}

/// Non-empty texts of every element matched by any selector, joined with ` | `.
fn all_text(document: &Html, selectors: &[Selector]) -> String {
    selectors
        .iter()
        .flat_map(|sel| document.select(sel))
        .map(element_text)
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Pulls product fields through ordered selector fallbacks.
pub fn parse_product_page(html: &str) -> Result<ProductDetails> {
    let document = Html::parse_document(html);
    let sel = ProductSelectors::new()?;
    let mut description = first_text(&document, &sel.description);
    if description.is_empty() {
        description = sel
            .meta_description
            .iter()
            .find_map(|s| document.select(s).next())
            .and_then(|meta| meta.value().attr("content"))
            .unwrap_or_default()
            .trim()
            .to_string();
    }
    Ok(ProductDetails {
        title: first_text(&document, &sel.title),
        description,
        overview: first_text(&document, &sel.overview),
        category: first_text(&document, &sel.category),
        features: all_text(&document, &sel.features),
        benefits: all_text(&document, &sel.benefits),
        details: all_text(&document, &sel.details),
        duration: first_text(&document, &sel.duration),
        language: first_text(&document, &sel.language),
    })
}

/// Runs `op` up to `attempts` times, sleeping `delay × attempt` after each failure.
pub async fn with_retry<T, F, Fut>(attempts: usize, delay: Duration, label: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < attempts => {
                warn!(label, attempt, error = %format!("{err:#}"), "attempt failed");
                tokio::time::sleep(delay * attempt as u32).await;
                attempt += 1;
            }
            Err(err) => {
                return Err(err.context(format!("{label} failed after {attempts} attempts")))
            }
        }
    }
}

/// Pacing and retry settings.
#[derive(Debug, Clone)]
pub struct ScrapeSettings {
    /// Catalog landing page.
    pub base_url: String,
    /// Pagination upper bound.
    pub max_pages: usize,
    /// Pause between catalog pages.
    pub page_delay: Duration,
    /// Pause between product pages.
    pub product_delay: Duration,
    /// Attempts per fetch.
    pub retry_attempts: usize,
    /// Base retry delay.
    pub retry_delay: Duration,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for ScrapeSettings {
    fn default() -> Self {
        Self {
            base_url: CATALOG_BASE_URL.to_string(),
            max_pages: MAX_PAGES,
            page_delay: PAGE_DELAY,
            product_delay: PRODUCT_DELAY,
            retry_attempts: RETRY_ATTEMPTS,
            retry_delay: RETRY_DELAY,
            timeout: Duration::from_secs(30),
        }
    }
}

/// One-shot sequential catalog crawl.
pub struct CatalogScraper {
    client: Client,
    settings: ScrapeSettings,
}

impl CatalogScraper {
    /// Builds the HTTP client.
    pub fn new(settings: ScrapeSettings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(settings.timeout)
            .build()
            .context("failed to build scraper HTTP client")?;
        Ok(Self { client, settings })
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        let client = &self.client;
        with_retry(
            self.settings.retry_attempts,
            self.settings.retry_delay,
            url,
            || async move {
                let resp = client
                    .get(url)
                    .send()
                    .await
                    .with_context(|| format!("request to {url} failed"))?;
                let resp = resp
                    .error_for_status()
                    .with_context(|| format!("{url} returned an error status"))?;
                resp.text()
                    .await
                    .with_context(|| format!("failed to read body of {url}"))
            },
        )
        .await
    }

    /// Walks the catalog pages and returns listings deduplicated by URL.
    pub async fn list_products(&self) -> Result<Vec<CatalogListing>> {
        let base = &self.settings.base_url;
        let mut all = Vec::new();
        for page in 1..=self.settings.max_pages {
            let url = pagination_url(base, page);
            info!(page, max_pages = self.settings.max_pages, %url, "loading catalog page");
            let html = match self.fetch(&url).await {
                Ok(html) => html,
                Err(err) => {
                    error!(page, error = %format!("{err:#}"), "catalog page failed");
                    continue;
                }
            };
            let page_url = Url::parse(&url).with_context(|| format!("invalid catalog URL {url}"))?;
            let listings = parse_catalog_page(&html, &page_url).unwrap_or_else(|err| {
                error!(page, error = %format!("{err:#}"), "failed to parse catalog page");
                Vec::new()
            });
            if listings.is_empty() {
                warn!(page, "no products found; may have reached the end");
                if page > 3 {
                    break;
                }
            }
            info!(page, found = listings.len(), total = all.len() + listings.len(), "collected listings");
            all.extend(listings);
            tokio::time::sleep(self.settings.page_delay).await;
        }
        let unique = dedup_listings(all);
        info!(unique = unique.len(), "catalog listing complete");
        Ok(unique)
    }

    /// Fetches one product page. Failures yield an `error` row.
    pub async fn scrape_product(&self, listing: CatalogListing) -> RawCatalogRow {
        let details = match self.fetch(&listing.url).await.and_then(|html| parse_product_page(&html)) {
            Ok(details) => Some(details),
            Err(err) => {
                error!(name = %listing.name, error = %format!("{err:#}"), "product scrape failed");
                None
            }
        };
        listing.into_row(details)
    }

    /// Scrapes every listing in order, calling `checkpoint` every [`BACKUP_EVERY`] products.
    pub async fn scrape_products<F>(
        &self,
        listings: Vec<CatalogListing>,
        mut checkpoint: F,
    ) -> Result<Vec<RawCatalogRow>>
    where
        F: FnMut(&[RawCatalogRow]) -> Result<()>,
    {
        let total = listings.len();
        let mut rows = Vec::with_capacity(total);
        for (idx, listing) in listings.into_iter().enumerate() {
            info!(progress = idx + 1, total, name = %listing.name, "scraping product");
            rows.push(self.scrape_product(listing).await);
            if (idx + 1) % BACKUP_EVERY == 0 {
                checkpoint(&rows)?;
                info!(saved = idx + 1, "backup written");
            }
            tokio::time::sleep(self.settings.product_delay).await;
        }
        let successful = rows.iter().filter(|row| row.status == "success").count();
        info!(total = rows.len(), successful, failed = rows.len() - successful, "scrape complete");
        if rows.len() < MIN_CATALOG_SIZE {
            warn!(
                found = rows.len(),
                minimum = MIN_CATALOG_SIZE,
                "fewer products than expected"
            );
        }
        Ok(rows)
    }
}

/// Drops repeated URLs, keeping the first listing.
pub fn dedup_listings(listings: Vec<CatalogListing>) -> Vec<CatalogListing> {
    let mut seen = HashSet::new();
    listings
        .into_iter()
        .filter(|listing| seen.insert(listing.url.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const CATALOG_PAGE: &str = r#"
        <html><body>
        <table>
          <tr><th>Pre-packaged Job Solutions</th><th>Remote Testing</th></tr>
          <tr><td><a href="/view/account-manager-solution/">Account Manager Solution</a></td>
              <td>Yes</td><td></td><td>C P A B</td></tr>
        </table>
        <table>
          <tr><th>Individual Test Solutions</th><th>Remote Testing</th><th>Adaptive/IRT</th><th>Test Type</th></tr>
          <tr><td><a href="/products/product-catalog/view/core-java-entry-level-new/">Core Java (Entry Level) (New)</a></td>
              <td><span class="catalogue__circle -yes">●</span></td><td></td><td>K</td></tr>
          <tr><td><a href="https://www.shl.com/products/product-catalog/view/opq32r/"> OPQ32r </a></td>
              <td>●</td><td>●</td><td>P</td></tr>
          <tr><td><a href="/view/nameless/">  </a></td><td></td><td></td><td>K</td></tr>
        </table>
        </body></html>"#;

    const PRODUCT_PAGE: &str = r#"
        <html><head><meta name="description" content=" Measures Java knowledge. "></head>
        <body>
          <h1>Core Java (Entry Level)</h1>
          <ul class="breadcrumb"><li>Catalog</li><li>Knowledge</li></ul>
          <ul class="features"><li>Multiple choice</li><li></li><li>Timed</li></ul>
          <div class="product-details"><p>Approximate Completion Time in minutes = 13</p></div>
          <p class="test-duration">13 minutes</p>
        </body></html>"#;

    #[test]
    fn pagination_follows_catalog_pattern() {
        let base = CATALOG_BASE_URL;
        assert_eq!(pagination_url(base, 1), format!("{base}?type=1"));
        assert_eq!(pagination_url(base, 2), format!("{base}?start=12&type=1"));
        assert_eq!(pagination_url(base, 3), format!("{base}?start=24&type=1&type=1"));
        assert_eq!(pagination_url(base, 32), format!("{base}?start=372&type=1&type=1"));
    }

    #[test]
    fn parses_only_the_individual_tests_table() {
        let page_url = Url::parse(&pagination_url(CATALOG_BASE_URL, 1)).unwrap();
        let listings = parse_catalog_page(CATALOG_PAGE, &page_url).unwrap();
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].name, "Core Java (Entry Level) (New)");
        assert_eq!(
            listings[0].url,
            "https://www.shl.com/products/product-catalog/view/core-java-entry-level-new/"
        );
        assert_eq!(listings[0].remote_testing, "●");
        assert_eq!(listings[0].adaptive, "");
        assert_eq!(listings[0].test_type, "K");
        assert_eq!(listings[1].name, "OPQ32r");
        assert_eq!(listings[1].adaptive, "●");
    }

    #[test]
    fn page_without_listing_table_is_empty() {
        let page_url = Url::parse(CATALOG_BASE_URL).unwrap();
        let listings = parse_catalog_page("<html><body><p>none</p></body></html>", &page_url).unwrap();
        assert!(listings.is_empty());
    }

    #[test]
    fn product_fields_use_fallbacks() {
        let details = parse_product_page(PRODUCT_PAGE).unwrap();
        assert_eq!(details.title, "Core Java (Entry Level)");
        assert_eq!(details.description, "Measures Java knowledge.");
        assert_eq!(details.category, "Knowledge");
        assert_eq!(details.features, "Multiple choice | Timed");
        assert_eq!(details.details, "Approximate Completion Time in minutes = 13");
        assert_eq!(details.duration, "13 minutes");
        assert_eq!(details.language, "");
    }

    fn listing(url: &str) -> CatalogListing {
        CatalogListing {
            name: "Core Java".into(),
            url: url.into(),
            remote_testing: "Yes".into(),
            adaptive: String::new(),
            test_type: "K".into(),
        }
    }

    #[test]
    fn failed_product_becomes_error_row() {
        let row = listing("https://h/view/core-java/").into_row(None);
        assert_eq!(row.status, "error");
        assert_eq!(row.description, "Failed to scrape");
        assert_eq!(row.title, "Core Java");
        assert_eq!(row.test_type, "K");
        assert!(!row.scraped_at.is_empty());
    }

    #[test]
    fn empty_title_falls_back_to_listing_name() {
        let row = listing("https://h/view/core-java/").into_row(Some(ProductDetails::default()));
        assert_eq!(row.status, "success");
        assert_eq!(row.title, "Core Java");
    }

    #[test]
    fn dedup_keeps_first_listing() {
        let mut second = listing("https://h/a/");
        second.name = "Other".into();
        let out = dedup_listings(vec![listing("https://h/a/"), second, listing("https://h/b/")]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].name, "Core Java");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn retry_succeeds_after_transient_failures() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let value = with_retry(3, Duration::ZERO, "flaky", || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                anyhow::bail!("timeout")
            }
            Ok(7)
        })
        .await
        .unwrap();
        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn retry_gives_up_after_last_attempt() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let err = with_retry(3, Duration::ZERO, "broken", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(anyhow!("connection refused"))
        })
        .await
        .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(err.to_string().contains("broken failed after 3 attempts"));
    }
}

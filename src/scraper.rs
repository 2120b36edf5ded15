use crate::config::{
    location_code, ContractType, PropertyKind, ScraperConfig, LISTINGS_PER_PAGE, SEARCH_URL,
};
use crate::error::{ConfigError, FetchError};
use crate::listing_page::parse_listings_from_page;
use crate::models::{ListingRecord, PropertyRecord};
use crate::parser::parse_total_count;
use crate::reconcile::{dedupe_listings, enrich_with_details};
use crate::transport::{PageFetcher, ScrapingAntClient};
use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use scraper::Html;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub location: String,
    pub contract: ContractType,
    pub property: PropertyKind,
}

impl SearchQuery {
    pub fn new(location: impl Into<String>, contract: ContractType, property: PropertyKind) -> Self {
        Self {
            location: location.into(),
            contract,
            property,
        }
    }

    /// `{SEARCH_URL}/{contract}/{location}[/{property}][?page=n]`; the page
    /// parameter is omitted for page 1.
    pub fn page_url(&self, page: usize) -> String {
        let location = match location_code(&self.location) {
            Some(code) => code.to_string(),
            None => urlencoding::encode(self.location.trim()).into_owned(),
        };

        let mut url = format!("{}/{}/{}", SEARCH_URL, self.contract.segment(), location);
        let property = self.property.segment();
        if !property.is_empty() {
            url.push('/');
            url.push_str(property);
        }

        let mut params = Vec::new();
        if self.contract.is_new_build() {
            params.push("neuf=oui".to_string());
        }
        if page > 1 {
            params.push(format!("page={}", page));
        }
        if !params.is_empty() {
            url.push('?');
            url.push_str(&params.join("&"));
        }

        url
    }
}

#[derive(Debug, Clone)]
pub struct ScrapingOptions {
    /// Caps the estimated page count. `None` or 0 means no cap.
    pub max_pages: Option<usize>,
    /// Truncates the de-duplicated listings before detail fetching.
    pub limit: Option<usize>,
    pub fetch_details: bool,
}

impl Default for ScrapingOptions {
    fn default() -> Self {
        Self {
            max_pages: None,
            limit: None,
            fetch_details: true,
        }
    }
}

/// `ceil(total_count / max(first_page_cards, 24))`.
pub fn estimate_total_pages(total_count: u64, first_page_cards: usize) -> usize {
    let per_page = first_page_cards.max(LISTINGS_PER_PAGE) as u64;
    total_count.div_ceil(per_page) as usize
}

pub fn build_records(listings: Vec<ListingRecord>) -> Vec<PropertyRecord> {
    listings
        .into_iter()
        .filter_map(|listing| match PropertyRecord::from_listing(listing) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Failed to create property record: {}", e);
                None
            }
        })
        .collect()
}

pub struct BieniciScraper<F> {
    fetcher: F,
    max_workers: usize,
    progress: ProgressBar,
}

impl BieniciScraper<ScrapingAntClient> {
    pub fn from_config(config: &ScraperConfig) -> Result<Self, ConfigError> {
        let client = ScrapingAntClient::new(config)?;
        Ok(Self::new(client, config.max_workers))
    }
}

impl<F: PageFetcher> BieniciScraper<F> {
    pub fn new(fetcher: F, max_workers: usize) -> Self {
        Self {
            fetcher,
            max_workers: max_workers.max(1),
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// One index page: the total count (page 1 only, else 0) and its cards.
    pub async fn scrape_page(
        &self,
        query: &SearchQuery,
        page: usize,
    ) -> Result<(u64, Vec<ListingRecord>), FetchError> {
        let url = query.page_url(page);
        debug!("Fetching page {}: {}", page, url);

        let html = self.fetcher.fetch(&url).await?;
        let total_count = if page == 1 {
            parse_total_count(&Html::parse_document(&html))
        } else {
            0
        };
        Ok((total_count, parse_listings_from_page(&html)))
    }

    /// Runs one full scrape. Failures of the first page end the scrape with
    /// an empty result; failures of later pages or detail pages only lose
    /// that page's or listing's data.
    pub async fn scrape(&self, query: &SearchQuery, options: &ScrapingOptions) -> Vec<PropertyRecord> {
        info!(
            "Starting scrape: {} for {} in {}",
            query.property.as_str(),
            query.contract.as_str(),
            query.location
        );

        let first_url = query.page_url(1);
        info!("Fetching first page: {}", first_url);
        let (total_count, first_page) = match self.scrape_page(query, 1).await {
            Ok(result) => result,
            Err(e) => {
                error!("Failed to fetch first page: {}", e);
                return Vec::new();
            }
        };

        if first_page.is_empty() {
            warn!("No properties found on first page");
            return Vec::new();
        }

        let total_pages = estimate_total_pages(total_count, first_page.len());
        info!("Found {} properties across ~{} pages", total_count, total_pages);

        let pages_to_scrape = match options.max_pages.filter(|m| *m > 0) {
            Some(max_pages) => total_pages.min(max_pages),
            None => total_pages,
        };
        info!("Will scrape {} pages", pages_to_scrape);

        let mut all_listings = first_page;
        if pages_to_scrape > 1 {
            all_listings.extend(self.scrape_remaining_pages(query, pages_to_scrape).await);
        }

        let mut unique = dedupe_listings(all_listings);
        if let Some(limit) = options.limit.filter(|l| *l > 0) {
            unique.truncate(limit);
        }
        info!("Collected {} unique properties", unique.len());

        if options.fetch_details {
            info!("Fetching detail pages...");
            unique =
                enrich_with_details(&self.fetcher, unique, self.max_workers, &self.progress).await;
        }

        let records = build_records(unique);
        info!("Successfully scraped {} properties", records.len());
        records
    }

    /// Pages `2..=last_page`, fetched concurrently and gathered in completion order.
    async fn scrape_remaining_pages(&self, query: &SearchQuery, last_page: usize) -> Vec<ListingRecord> {
        let mut pages = stream::iter(2..=last_page)
            .map(|page| async move { (page, self.scrape_page(query, page).await) })
            .buffer_unordered(self.max_workers);

        let mut listings = Vec::new();
        while let Some((page, result)) = pages.next().await {
            match result {
                Ok((_, page_listings)) => {
                    info!("Page {}: found {} properties", page, page_listings.len());
                    listings.extend(page_listings);
                }
                Err(e) => error!("Error fetching page {}: {}", page, e),
            }
        }
        listings
    }
}

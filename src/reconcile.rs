use crate::detail_page::parse_property_detail;
use crate::error::FetchError;
use crate::models::ListingRecord;
use crate::transport::PageFetcher;
use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Keeps the first record seen for each `listing_id`, preserving order.
/// Records without a `listing_id` are dropped.
pub fn dedupe_listings(records: Vec<ListingRecord>) -> Vec<ListingRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| match record.listing_id.as_deref() {
            Some(id) if !id.is_empty() => seen.insert(id.to_string()),
            _ => false,
        })
        .collect()
}

pub async fn fetch_detail<F>(fetcher: &F, url: &str) -> Result<ListingRecord, FetchError>
where
    F: PageFetcher + ?Sized,
{
    debug!(url = %url, "Fetching detail");
    let html = fetcher.fetch(url).await?;
    Ok(parse_property_detail(&html, url))
}

/// Fetches every listing's detail page with at most `max_workers` requests
/// in flight and merges the result into the index record. A listing whose
/// detail fetch fails keeps its index data.
pub async fn enrich_with_details<F>(
    fetcher: &F,
    mut records: Vec<ListingRecord>,
    max_workers: usize,
    progress: &ProgressBar,
) -> Vec<ListingRecord>
where
    F: PageFetcher + ?Sized,
{
    let targets: Vec<(usize, String)> = records
        .iter()
        .enumerate()
        .filter_map(|(slot, record)| record.url.clone().map(|url| (slot, url)))
        .collect();

    if targets.is_empty() {
        return records;
    }

    progress.set_length(targets.len() as u64);
    progress.set_message("detail pages");
    progress.enable_steady_tick(Duration::from_millis(100));

    let mut completed = stream::iter(targets)
        .map(|(slot, url)| async move {
            let detail = fetch_detail(fetcher, &url).await;
            (slot, url, detail)
        })
        .buffer_unordered(max_workers.max(1));

    let mut enriched = 0usize;
    // Each slot is written only by the completion that owns its URL.
    while let Some((slot, url, detail)) = completed.next().await {
        match detail {
            Ok(detail) => {
                records[slot].merge_from(detail);
                enriched += 1;
            }
            Err(e) => warn!(url = %url, "Error fetching detail: {}", e),
        }
        progress.inc(1);
    }
    progress.finish_and_clear();

    info!("Enriched {}/{} listings with detail pages", enriched, records.len());
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    fn listing(id: &str) -> ListingRecord {
        ListingRecord {
            url: Some(format!("https://www.bienici.com/annonce/vente/paris/{}", id)),
            listing_id: Some(id.to_string()),
            ..Default::default()
        }
    }

    struct FakeFetcher {
        pages: HashMap<String, String>,
    }

    #[async_trait]
    impl PageFetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            self.pages.get(url).cloned().ok_or(FetchError::Status(404))
        }
    }

    #[test]
    fn test_dedupe_keeps_first_seen_order() {
        let mut first_a = listing("A");
        first_a.price = Some(1);
        let mut second_a = listing("A");
        second_a.price = Some(2);

        let deduped = dedupe_listings(vec![first_a, listing("B"), second_a, listing("C")]);
        let ids: Vec<_> = deduped
            .iter()
            .map(|r| r.listing_id.clone().unwrap())
            .collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
        assert_eq!(deduped[0].price, Some(1));
    }

    #[test]
    fn test_dedupe_drops_records_without_id() {
        let no_id = ListingRecord {
            url: Some("https://www.bienici.com/annonce/".into()),
            ..Default::default()
        };
        let empty_id = ListingRecord {
            listing_id: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(dedupe_listings(vec![no_id, listing("A"), empty_id]).len(), 1);
    }

    #[tokio::test]
    async fn test_failed_detail_keeps_index_data() {
        let mut a = listing("A");
        a.price = Some(300_000);
        let mut b = listing("B");
        b.price = Some(450_000);
        b.floor = Some("2".into());

        let detail_a = r#"<html><body><h1>Appartement</h1>
            <p>310 000 €</p>
            <h2>Descriptif de ce bien</h2><p>Calme et lumineux</p>
            <p>Rez-de-chaussée</p></body></html>"#;
        let fetcher = FakeFetcher {
            pages: HashMap::from([(a.url.clone().unwrap(), detail_a.to_string())]),
        };

        let progress = ProgressBar::hidden();
        let enriched = enrich_with_details(&fetcher, vec![a, b], 4, &progress).await;

        assert_eq!(enriched.len(), 2);
        assert_eq!(progress.length(), Some(2));
        assert_eq!(progress.position(), 2);
        assert_eq!(enriched[0].price, Some(300_000));
        assert_eq!(enriched[0].description.as_deref(), Some("Calme et lumineux"));
        assert_eq!(enriched[0].floor.as_deref(), Some("0"));
        assert_eq!(enriched[0].property_type.as_deref(), Some("apartment"));

        assert_eq!(enriched[1].listing_id.as_deref(), Some("B"));
        assert_eq!(enriched[1].price, Some(450_000));
        assert_eq!(enriched[1].floor.as_deref(), Some("2"));
        assert_eq!(enriched[1].description, None);
    }

    #[tokio::test]
    async fn test_fetch_detail_parses_page() {
        let url = "https://www.bienici.com/annonce/location/lyon/ag-5";
        let fetcher = FakeFetcher {
            pages: HashMap::from([(
                url.to_string(),
                "<html><body><h1>Studio 1 pièce 22 m² 69003 Lyon</h1><p>690 €</p></body></html>"
                    .to_string(),
            )]),
        };

        let detail = fetch_detail(&fetcher, url).await.unwrap();
        assert_eq!(detail.listing_id.as_deref(), Some("ag-5"));
        assert_eq!(detail.property_type.as_deref(), Some("studio"));
        assert_eq!(detail.price, Some(690));
        assert_eq!(detail.contract_type.as_deref(), Some("rent"));

        let missing = fetch_detail(&fetcher, "https://www.bienici.com/annonce/x").await;
        assert!(matches!(missing, Err(FetchError::Status(404))));
    }

    #[tokio::test]
    async fn test_enrich_without_urls_is_noop() {
        let records = vec![ListingRecord {
            listing_id: Some("X".into()),
            ..Default::default()
        }];
        let fetcher = FakeFetcher {
            pages: HashMap::new(),
        };
        let out = enrich_with_details(&fetcher, records.clone(), 2, &ProgressBar::hidden()).await;
        assert_eq!(out, records);
    }
}

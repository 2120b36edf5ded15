//! Search-result (index) pages: one `<article>` card per listing.

use crate::models::ListingRecord;
use crate::parser::{
    absolute_listing_url, contract_type_from_path, element_text, listing_id_from_url,
    parse_price, parse_price_per_sqm, parse_title_text,
};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use tracing::{debug, warn};

static CARD: LazyLock<Selector> = LazyLock::new(|| Selector::parse("article").unwrap());
static LISTING_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href*='/annonce/']").unwrap());
static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h3").unwrap());
static DIV: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div").unwrap());

// Group 2 marks a per-square-metre figure, which is not a price.
static CURRENCY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d[\d\s\u{a0}\u{202f}]*€(\s*/\s*m)?").unwrap());
static PER_SQM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\d[\d\s\u{a0}\u{202f},.]*k?\s*€\s*/\s*m²").unwrap());
static DIGIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d").unwrap());

/// Prices found by the sibling-block fallback must exceed this to count.
const FALLBACK_PRICE_FLOOR: u64 = 1000;

const VIDEO_MARKER: &str = "Vidéo";
const EXCLUSIVE_MARKER: &str = "Exclusivité";
const PRICE_DROP_MARKER: &str = "Baisse de prix";

/// Every card on the page that links to a listing. Cards without a
/// listing link (ads, promos) are skipped.
pub fn parse_listings_from_page(html: &str) -> Vec<ListingRecord> {
    let document = Html::parse_document(html);
    let mut listings = Vec::new();

    for (index, card) in document.select(&CARD).enumerate() {
        match extract_listing_card(&card) {
            Some(record) => listings.push(record),
            None => debug!("Skipping card {} without a listing link", index),
        }
    }

    if listings.is_empty() {
        warn!("No listing cards found on page");
    }
    listings
}

pub fn parse_listing_urls(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut urls: Vec<String> = Vec::new();

    for card in document.select(&CARD) {
        if let Some(href) = listing_href(&card) {
            let url = absolute_listing_url(href);
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
    }

    urls
}

fn listing_href<'a>(card: &ElementRef<'a>) -> Option<&'a str> {
    card.select(&LISTING_LINK)
        .find_map(|a| a.value().attr("href"))
        .filter(|href| !href.is_empty())
}

pub fn extract_listing_card(card: &ElementRef) -> Option<ListingRecord> {
    let href = listing_href(card)?;
    let url = absolute_listing_url(href);

    let mut record = ListingRecord {
        listing_id: listing_id_from_url(&url),
        url: Some(url),
        ..Default::default()
    };

    if let Some(h3) = card.select(&TITLE).next() {
        let title = element_text(&h3);
        if !title.is_empty() {
            parse_title_text(&title).apply_to(&mut record);
            record.title = Some(title);
        }
    }

    record.price = card_price(card).or_else(|| fallback_price(card));
    record.price_per_sqm = card
        .text()
        .find_map(|node| PER_SQM.find(node))
        .and_then(|m| parse_price_per_sqm(m.as_str()));

    let text = card.text().collect::<String>();
    record.has_video = Some(text.contains(VIDEO_MARKER));
    record.is_exclusive = Some(text.contains(EXCLUSIVE_MARKER));
    record.price_drop = Some(text.contains(PRICE_DROP_MARKER));

    record.contract_type = contract_type_from_path(href).map(str::to_string);

    Some(record)
}

/// First text node carrying a euro amount that is not a per-m² figure.
fn card_price(card: &ElementRef) -> Option<u64> {
    card.text().find_map(|node| {
        CURRENCY
            .captures_iter(node)
            .find(|caps| caps.get(1).is_none())
            .and_then(|caps| parse_price(&caps[0]))
    })
}

// Heuristic: any nested block mentioning € whose digits exceed the floor.
fn fallback_price(card: &ElementRef) -> Option<u64> {
    card.select(&DIV).find_map(|div| {
        let text = element_text(&div);
        if !text.contains('€') || !DIGIT.is_match(&text) {
            return None;
        }
        parse_price(&text).filter(|price| *price > FALLBACK_PRICE_FLOOR)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
        <h2>2 biens à vendre</h2>
        <article>
            <a href="/annonce/vente/paris-18e/appartement/3pieces/ag-001?q=x">
                <h3>Appartement 3 pièces 78 m² 75018 Paris 18e</h3>
            </a>
            <div class="price"><span>430 000 €</span><span>5 513 €/m²</span></div>
            <span>Vidéo</span><span>Exclusivité</span>
        </article>
        <article>
            <div class="ad">Publicité: crédit immobilier à 3,2 %</div>
        </article>
        <article>
            <a href="https://www.bienici.com/annonce/location/lyon-4e/maison/5pieces/ag-002">
                <h3>Maison 5 pièces 120 m² 69004 Lyon (Croix-Rousse)</h3>
            </a>
            <div><span>2 150</span><span>€</span><span>par mois</span></div>
            <span>12,2k €/m²</span>
            <span>Baisse de prix</span>
        </article>
        </body></html>
    "#;

    #[test]
    fn test_parse_listings_skips_cards_without_link() {
        let listings = parse_listings_from_page(PAGE);
        assert_eq!(listings.len(), 2);

        let first = &listings[0];
        assert_eq!(
            first.url.as_deref(),
            Some("https://www.bienici.com/annonce/vente/paris-18e/appartement/3pieces/ag-001")
        );
        assert_eq!(first.listing_id.as_deref(), Some("ag-001"));
        assert_eq!(first.title.as_deref(), Some("Appartement 3 pièces 78 m² 75018 Paris 18e"));
        assert_eq!(first.property_type.as_deref(), Some("apartment"));
        assert_eq!(first.rooms, Some(3));
        assert_eq!(first.living_area, Some(78.0));
        assert_eq!(first.postal_code.as_deref(), Some("75018"));
        assert_eq!(first.price, Some(430_000));
        assert_eq!(first.price_per_sqm, Some(5513.0));
        assert_eq!(first.has_video, Some(true));
        assert_eq!(first.is_exclusive, Some(true));
        assert_eq!(first.price_drop, Some(false));
        assert_eq!(first.contract_type.as_deref(), Some("buy"));
    }

    #[test]
    fn test_fallback_price_scans_blocks() {
        let listings = parse_listings_from_page(PAGE);
        let second = &listings[1];

        assert_eq!(second.listing_id.as_deref(), Some("ag-002"));
        assert_eq!(second.price, Some(2150));
        assert_eq!(second.price_per_sqm, Some(12200.0));
        assert_eq!(second.price_drop, Some(true));
        assert_eq!(second.has_video, Some(false));
        assert_eq!(second.contract_type.as_deref(), Some("rent"));
        assert_eq!(second.district.as_deref(), Some("Croix-Rousse"));
    }

    #[test]
    fn test_fallback_price_ignores_small_amounts() {
        let html = r#"<article>
            <a href="/annonce/vente/nice/parking/ag-9"><h3>Parking 06000 Nice</h3></a>
            <div><span>900</span><span>€</span></div>
        </article>"#;
        let listings = parse_listings_from_page(html);
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].price, None);
        assert_eq!(listings[0].property_type.as_deref(), Some("parking"));
    }

    #[test]
    fn test_parse_listing_urls_dedupes() {
        let html = r#"
            <article><a href="/annonce/vente/paris/ag-1?a=1">A</a></article>
            <article><a href="/annonce/vente/paris/ag-1?a=2">A again</a></article>
            <article><a href="/annonce/vente/paris/ag-2">B</a></article>
        "#;
        assert_eq!(
            parse_listing_urls(html),
            vec![
                "https://www.bienici.com/annonce/vente/paris/ag-1".to_string(),
                "https://www.bienici.com/annonce/vente/paris/ag-2".to_string(),
            ]
        );
    }

    #[test]
    fn test_malformed_markup_yields_no_listings() {
        assert!(parse_listings_from_page("<article><a href=").is_empty());
        assert!(parse_listings_from_page("").is_empty());
    }

    #[test]
    fn test_extraction_is_deterministic() {
        assert_eq!(parse_listings_from_page(PAGE), parse_listings_from_page(PAGE));
    }
}

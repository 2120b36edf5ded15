//! Pure text extractors. None of these fail: malformed input yields `None`.

use crate::config::BASE_URL;
use crate::models::ListingRecord;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;

static NON_DIGIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\D").unwrap());
static K_SUFFIXED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+(?:[,.]\d+)?)\s*k").unwrap());
static GROUPED_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d[\d \u{a0}\u{202f}]*").unwrap());

static ROOMS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)\s*pièces?").unwrap());
static AREA: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+(?:[,.]\d+)?)\s*m²").unwrap());
static POSTAL_CITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{5})\s+([^(]+?)(?:\s*\(|$)").unwrap());
static DISTRICT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\(([^)]+)\)").unwrap());
static ARRONDISSEMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)\s+(\d{1,2}(?:e|er|ème))$").unwrap());

static TOTAL_COUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d[\d\s\u{a0}\u{202f}]*)\s*biens?\s+à\s+(?:vendre|louer)").unwrap()
});
static H2: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h2").unwrap());

/// French title words mapped to canonical property types. First match wins.
const TITLE_PROPERTY_TYPES: &[(&str, &str)] = &[
    ("appartement", "apartment"),
    ("maison", "house"),
    ("studio", "studio"),
    ("duplex", "duplex"),
    ("loft", "loft"),
    ("terrain", "land"),
    ("parking", "parking"),
    ("commerce", "commercial"),
    ("bureaux", "office"),
    ("villa", "house"),
    ("immeuble", "building"),
];

/// Strips every non-digit and parses what is left, e.g. `"430 000 €"` -> 430000.
pub fn parse_price(text: &str) -> Option<u64> {
    let digits = NON_DIGIT.replace_all(text, "");
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Handles `"12,2k €/m²"` (-> 12200.0) as well as `"9 055 €/m²"` (-> 9055.0).
pub fn parse_price_per_sqm(text: &str) -> Option<f64> {
    let lower = text.to_lowercase();
    if let Some(caps) = K_SUFFIXED.captures(&lower) {
        if let Some(value) = parse_decimal(&caps[1]) {
            return Some(value * 1000.0);
        }
    }

    let number = GROUPED_NUMBER.find(text)?;
    parse_price(number.as_str()).map(|n| n as f64)
}

pub fn parse_decimal(text: &str) -> Option<f64> {
    text.trim().replace(',', ".").parse().ok()
}

/// Fields recovered from a listing title such as
/// `"Appartement 3 pièces 78 m² 75018 Paris 18e"`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TitleInfo {
    pub property_type: Option<&'static str>,
    pub rooms: Option<u32>,
    pub living_area: Option<f64>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub district: Option<String>,
}

impl TitleInfo {
    pub fn apply_to(self, record: &mut ListingRecord) {
        if let Some(property_type) = self.property_type {
            record.property_type = Some(property_type.to_string());
        }
        if self.rooms.is_some() {
            record.rooms = self.rooms;
        }
        if self.living_area.is_some() {
            record.living_area = self.living_area;
        }
        if self.postal_code.is_some() {
            record.postal_code = self.postal_code;
        }
        if self.city.is_some() {
            record.city = self.city;
        }
        if self.district.is_some() {
            record.district = self.district;
        }
    }
}

pub fn parse_title_text(title: &str) -> TitleInfo {
    let mut info = TitleInfo::default();

    let lower = title.to_lowercase();
    info.property_type = TITLE_PROPERTY_TYPES
        .iter()
        .find(|(french, _)| lower.contains(french))
        .map(|(_, canonical)| *canonical);

    info.rooms = ROOMS.captures(title).and_then(|c| c[1].parse().ok());
    info.living_area = AREA.captures(title).and_then(|c| parse_decimal(&c[1]));

    if let Some(caps) = POSTAL_CITY.captures(title) {
        info.postal_code = Some(caps[1].to_string());
        let city = caps[2].trim();
        if !city.is_empty() {
            info.city = Some(city.to_string());
        }
    }

    if let Some(caps) = DISTRICT.captures(title) {
        info.district = Some(caps[1].trim().to_string());
    } else if let Some(city) = info.city.take() {
        // "Paris 18e" -> city "Paris", district "18e"
        match ARRONDISSEMENT.captures(&city) {
            Some(caps) => {
                info.district = Some(caps[2].to_string());
                info.city = Some(caps[1].to_string());
            }
            None => info.city = Some(city),
        }
    }

    info
}

/// Reads the "N biens à vendre" / "N biens à louer" heading of an index page.
pub fn parse_total_count(document: &Html) -> u64 {
    document
        .select(&H2)
        .filter_map(|h2| {
            let text = element_text(&h2);
            let caps = TOTAL_COUNT.captures(&text)?;
            parse_price(&caps[1])
        })
        .next()
        .unwrap_or(0)
}

pub fn element_text(element: &ElementRef) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Drops the query string and resolves site-relative paths against [`BASE_URL`].
pub fn absolute_listing_url(href: &str) -> String {
    let path = href.split('?').next().unwrap_or(href);
    if path.starts_with("//") {
        format!("https:{}", path)
    } else if path.starts_with('/') {
        format!("{}{}", BASE_URL, path)
    } else {
        path.to_string()
    }
}

/// The last path segment of a listing URL, the dedup key for a listing.
pub fn listing_id_from_url(url: &str) -> Option<String> {
    let path = url.split('?').next().unwrap_or(url);
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty() && !segment.contains(':'))
        .map(str::to_string)
}

pub fn contract_type_from_path(path: &str) -> Option<&'static str> {
    if path.contains("/vente/") {
        Some("buy")
    } else if path.contains("/location/") {
        Some("rent")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_price_with_french_separators() {
        assert_eq!(parse_price("430 000 €"), Some(430_000));
        assert_eq!(parse_price("1\u{a0}250\u{a0}000 €"), Some(1_250_000));
        assert_eq!(parse_price("85000"), Some(85_000));
        assert_eq!(parse_price("Prix sur demande"), None);
        assert_eq!(parse_price(""), None);
    }

    #[test]
    fn test_parse_price_per_sqm() {
        assert_eq!(parse_price_per_sqm("12,2k €/m²"), Some(12200.0));
        assert_eq!(parse_price_per_sqm("9 055 €/m²"), Some(9055.0));
        assert_eq!(parse_price_per_sqm("4.5K €/m²"), Some(4500.0));
        assert_eq!(parse_price_per_sqm("9\u{a0}055 €/m²"), Some(9055.0));
        assert_eq!(parse_price_per_sqm("€/m²"), None);
    }

    #[test]
    fn test_parse_title_text() {
        let info = parse_title_text("Appartement 3 pièces 78 m² 75018 Paris 18e");
        assert_eq!(info.property_type, Some("apartment"));
        assert_eq!(info.rooms, Some(3));
        assert_eq!(info.living_area, Some(78.0));
        assert_eq!(info.postal_code.as_deref(), Some("75018"));
        assert_eq!(info.city.as_deref(), Some("Paris"));
        assert_eq!(info.district.as_deref(), Some("18e"));
    }

    #[test]
    fn test_parse_title_text_with_parenthesised_district() {
        let info = parse_title_text("Maison 5 pièces 120,5 m² 69004 Lyon (Croix-Rousse)");
        assert_eq!(info.property_type, Some("house"));
        assert_eq!(info.rooms, Some(5));
        assert_eq!(info.living_area, Some(120.5));
        assert_eq!(info.postal_code.as_deref(), Some("69004"));
        assert_eq!(info.city.as_deref(), Some("Lyon"));
        assert_eq!(info.district.as_deref(), Some("Croix-Rousse"));
    }

    #[test]
    fn test_parse_title_text_first_vocabulary_match_wins() {
        // "maison" precedes "villa" in the table
        let info = parse_title_text("Maison villa 1 pièce");
        assert_eq!(info.property_type, Some("house"));
        assert_eq!(info.rooms, Some(1));

        let info = parse_title_text("Studio meublé");
        assert_eq!(info.property_type, Some("studio"));
        assert_eq!(info.postal_code, None);
        assert_eq!(info.city, None);
    }

    #[test]
    fn test_parse_title_text_empty() {
        assert_eq!(parse_title_text(""), TitleInfo::default());
    }

    #[test]
    fn test_title_info_apply_keeps_unset_fields() {
        let mut record = ListingRecord {
            city: Some("Nice".into()),
            ..Default::default()
        };
        parse_title_text("Appartement 2 pièces").apply_to(&mut record);
        assert_eq!(record.property_type.as_deref(), Some("apartment"));
        assert_eq!(record.rooms, Some(2));
        assert_eq!(record.city.as_deref(), Some("Nice"));
    }

    #[test]
    fn test_parse_total_count() {
        let html = Html::parse_document(
            "<html><body><h2>Filtres</h2><h2>1\u{a0}234 biens à vendre</h2></body></html>",
        );
        assert_eq!(parse_total_count(&html), 1234);

        let html = Html::parse_document("<h2>87 biens à louer</h2>");
        assert_eq!(parse_total_count(&html), 87);

        let html = Html::parse_document("<h2>Aucun résultat</h2>");
        assert_eq!(parse_total_count(&html), 0);
    }

    #[test]
    fn test_listing_urls() {
        assert_eq!(
            absolute_listing_url("/annonce/vente/paris-18e/appartement/3pieces/ag-123?q=1"),
            "https://www.bienici.com/annonce/vente/paris-18e/appartement/3pieces/ag-123"
        );
        assert_eq!(
            absolute_listing_url("https://www.bienici.com/annonce/location/lyon/ag-9"),
            "https://www.bienici.com/annonce/location/lyon/ag-9"
        );
        assert_eq!(
            absolute_listing_url("//www.bienici.com/annonce/vente/nice/ag-7"),
            "https://www.bienici.com/annonce/vente/nice/ag-7"
        );
        assert_eq!(
            listing_id_from_url("https://www.bienici.com/annonce/vente/paris/ag-123/"),
            Some("ag-123".to_string())
        );
        assert_eq!(listing_id_from_url("https://www.bienici.com/annonce/x?y=1"), Some("x".into()));
        assert_eq!(listing_id_from_url(""), None);
    }

    #[test]
    fn test_contract_type_from_path() {
        assert_eq!(contract_type_from_path("/annonce/vente/paris/x"), Some("buy"));
        assert_eq!(contract_type_from_path("/annonce/location/paris/x"), Some("rent"));
        assert_eq!(contract_type_from_path("/annonce/viager/paris/x"), None);
    }

    #[test]
    fn test_parsers_are_deterministic() {
        let title = "Loft 4 pièces 98,5 m² 13001 Marseille (Belsunce)";
        assert_eq!(parse_title_text(title), parse_title_text(title));
        assert_eq!(parse_price_per_sqm("3,9k €/m²"), parse_price_per_sqm("3,9k €/m²"));
    }
}

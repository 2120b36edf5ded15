//! Listing detail pages.
//!
//! Most fields come from independent regex passes over the page's visible
//! text. The energy, agency and description blocks are found in two steps:
//! locate a landmark text node, then search a bounded set of its ancestors.
//! A missing landmark only leaves that field empty.

use crate::models::{Field, FieldValue, ListingRecord};
use crate::parser::{
    contract_type_from_path, element_text, listing_id_from_url, parse_decimal, parse_price,
    parse_price_per_sqm, parse_title_text,
};
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use std::sync::LazyLock;

/// How many ancestors of a landmark are searched before giving up.
const MAX_SCOPE_DEPTH: usize = 3;
const DESCRIPTION_MAX_CHARS: usize = 2000;
const AGENCY_ADDRESS_MAX_CHARS: usize = 100;

static H1: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").unwrap());
static AGENCY_NAME: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1, h3").unwrap());
static ADDRESS_BLOCK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div, span, p").unwrap());

static PRICE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d[\d \u{a0}\u{202f}]*\s*€(\s*/\s*m)?").unwrap());
static PRICE_PER_SQM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\d[\d \u{a0}\u{202f},.]*k?\s*€\s*/\s*m²").unwrap()
});
static AGENCY_FEES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Honoraires\s*:\s*(\d+(?:[,.]\d+)?)\s*%").unwrap());
static PRICE_WITHOUT_FEES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\((\d[\d\s\u{a0}\u{202f}]*)\s*€\s*hors\s*honoraires\)").unwrap()
});
static FLOOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)(?:er|ème|e)?\s*étage|Rez-de-chaussée").unwrap());
static EXPOSURE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Exposée?\s+([\w \-]+?)\s*(?:\n|$|\.|,)").unwrap());
static BEDROOMS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)\s*chambres?").unwrap());
static ENERGY_BILL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Entre\s*(\d[\d\s\u{a0}\u{202f}]*)\s*€\s*et\s*(\d[\d\s\u{a0}\u{202f}]*)\s*€\s*par\s*an")
        .unwrap()
});
static GES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)(?i:émissions).*?\b([A-G])\s*(\d+)\s*(?i:kg\s*co)").unwrap()
});

static HEATING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Chauffage\s*:\s*([^.\n]+?)\s*(?:\n|$|\.)").unwrap());
static DPE_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Date de réalisation du DPE\s*:\s*(\d+\s+\w+\s+\d+)").unwrap()
});
static REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Réf\.\s*(?:de l'annonce\s*)?:\s*(\S+)").unwrap());
static PUBLISHED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Publiée?\s+le\s+(\d+\s+\w+\.?\s+\d+)").unwrap());
static MODIFIED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Modifiée?\s+le\s+(\d+\s+\w+\.?\s+\d+)").unwrap());

static TEXT_PASSES: &[(Field, &LazyLock<Regex>)] = &[
    (Field::HeatingType, &HEATING),
    (Field::DpeDate, &DPE_DATE),
    (Field::Reference, &REFERENCE),
    (Field::PublishedDate, &PUBLISHED),
    (Field::ModifiedDate, &MODIFIED),
];

static ENERGY_LANDMARK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Performance énergétique").unwrap());
static ENERGY_IN_SCOPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\b([A-G])\b.*?(\d+)\s*kWh").unwrap());
static LONE_GRADE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*([A-G])\s*$").unwrap());
static AGENCY_LANDMARK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"À propos de l[’']agence").unwrap());
static POSTAL_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d{5}").unwrap());
static DESCRIPTION_LANDMARK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Descriptif de ce").unwrap());

const VIDEO_MARKER: &str = "Vidéo";
const EXCLUSIVE_MARKER: &str = "Exclusivité";
const PRICE_DROP_MARKER: &str = "Baisse de prix";
const EXCLUSIVE_MANDATE_MARKER: &str = "exclusivité";

pub fn parse_property_detail(html: &str, url: &str) -> ListingRecord {
    let document = Html::parse_document(html);
    let text = visible_text(&document);

    let mut record = ListingRecord {
        url: Some(url.to_string()),
        listing_id: listing_id_from_url(url),
        ..Default::default()
    };

    if let Some(h1) = document.select(&H1).next() {
        let title = element_text(&h1);
        if !title.is_empty() {
            parse_title_text(&title).apply_to(&mut record);
            record.title = Some(title);
        }
    }

    record.price = price(&text);
    record.price_per_sqm = price_per_sqm(&text);
    record.agency_fees_percent = agency_fees_percent(&text);
    record.price_without_fees = price_without_fees(&text);
    record.floor = floor(&text);
    record.exposure = exposure(&text);
    record.bedrooms = BEDROOMS.captures(&text).and_then(|c| c[1].parse().ok());

    for (field, pattern) in TEXT_PASSES {
        if let Some(caps) = pattern.captures(&text) {
            record.set(*field, FieldValue::Text(caps[1].trim().to_string()));
        }
    }

    if let Some((rating, consumption)) = energy_rating(&document) {
        record.energy_rating = Some(rating);
        record.energy_consumption = consumption;
    }
    if let Some((rating, emission)) = ges_rating(&text) {
        record.ges_rating = Some(rating);
        record.ges_emission = Some(emission);
    }
    if let Some((min, max)) = energy_bill(&text) {
        record.energy_bill_min = Some(min);
        record.energy_bill_max = Some(max);
    }

    if text.to_lowercase().contains(EXCLUSIVE_MANDATE_MARKER) {
        record.mandate_type = Some("exclusive".to_string());
    }

    if let Some(agency) = agency(&document) {
        record.agency_name = agency.name;
        record.agency_address = agency.address;
    }
    record.description = description(&document);

    record.has_video = Some(text.contains(VIDEO_MARKER));
    record.is_exclusive = Some(text.contains(EXCLUSIVE_MARKER));
    record.price_drop = Some(text.contains(PRICE_DROP_MARKER));
    record.contract_type = contract_type_from_path(url).map(str::to_string);

    record
}

pub fn visible_text(document: &Html) -> String {
    document
        .root_element()
        .descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let parent = node.parent().and_then(ElementRef::wrap)?;
            match parent.value().name() {
                "script" | "style" | "noscript" | "template" => None,
                _ => Some(text.trim()),
            }
        })
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn price(text: &str) -> Option<u64> {
    PRICE
        .captures_iter(text)
        .find(|caps| caps.get(1).is_none())
        .and_then(|caps| parse_price(&caps[0]))
}

pub fn price_per_sqm(text: &str) -> Option<f64> {
    PRICE_PER_SQM
        .find(text)
        .and_then(|m| parse_price_per_sqm(m.as_str()))
}

pub fn agency_fees_percent(text: &str) -> Option<f64> {
    AGENCY_FEES
        .captures(text)
        .and_then(|c| parse_decimal(&c[1]))
}

pub fn price_without_fees(text: &str) -> Option<u64> {
    PRICE_WITHOUT_FEES
        .captures(text)
        .and_then(|c| parse_price(&c[1]))
}

/// Ground floor is reported as `"0"`.
pub fn floor(text: &str) -> Option<String> {
    let caps = FLOOR.captures(text)?;
    match caps.get(1) {
        Some(level) => Some(level.as_str().to_string()),
        None => Some("0".to_string()),
    }
}

pub fn exposure(text: &str) -> Option<String> {
    EXPOSURE
        .captures(text)
        .map(|c| c[1].trim().to_string())
        .filter(|e| !e.is_empty())
}

pub fn ges_rating(text: &str) -> Option<(String, u32)> {
    let caps = GES.captures(text)?;
    let emission = caps[2].parse().ok()?;
    Some((caps[1].to_string(), emission))
}

pub fn energy_bill(text: &str) -> Option<(u64, u64)> {
    let caps = ENERGY_BILL.captures(text)?;
    Some((parse_price(&caps[1])?, parse_price(&caps[2])?))
}

/// Runs `search` on the ancestors of every text node matching `landmark`,
/// nearest first, at most [`MAX_SCOPE_DEPTH`] levels up.
fn search_near_landmark<'a, T>(
    document: &'a Html,
    landmark: &Regex,
    mut search: impl FnMut(ElementRef<'a>) -> Option<T>,
) -> Option<T> {
    document
        .root_element()
        .descendants()
        .filter(|node| matches!(node.value(), Node::Text(t) if landmark.is_match(t)))
        .find_map(|node| {
            node.ancestors()
                .filter_map(ElementRef::wrap)
                .take(MAX_SCOPE_DEPTH)
                .find_map(&mut search)
        })
}

/// Letter grade and kWh figure from the "Performance énergétique" block,
/// falling back to a lone A-G letter inside an element with a DPE/energy class.
pub fn energy_rating(document: &Html) -> Option<(String, Option<u32>)> {
    let in_block = search_near_landmark(document, &ENERGY_LANDMARK, |scope| {
        let scope_text = element_text(&scope);
        let caps = ENERGY_IN_SCOPE.captures(&scope_text)?;
        Some((caps[1].to_string(), caps[2].parse().ok()))
    });
    if in_block.is_some() {
        return in_block;
    }

    document.root_element().descendants().find_map(|node| {
        let text = node.value().as_text()?;
        let grade = LONE_GRADE.captures(text)?;
        let parent = node.parent().and_then(ElementRef::wrap)?;
        let classes = parent.value().attr("class")?.to_lowercase();
        if classes.contains("dpe") || classes.contains("energy") {
            Some((grade[1].to_string(), None))
        } else {
            None
        }
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgencyInfo {
    pub name: Option<String>,
    pub address: Option<String>,
}

/// Agency name (heading) and address (short block with a postal code)
/// near the "À propos de l'agence" landmark.
pub fn agency(document: &Html) -> Option<AgencyInfo> {
    search_near_landmark(document, &AGENCY_LANDMARK, |scope| {
        let name = scope
            .select(&AGENCY_NAME)
            .map(|h| element_text(&h))
            .find(|t| !t.is_empty() && !AGENCY_LANDMARK.is_match(t));
        let address = scope
            .select(&ADDRESS_BLOCK)
            .map(|block| element_text(&block))
            .find(|t| {
                POSTAL_CODE.is_match(t) && t.chars().count() < AGENCY_ADDRESS_MAX_CHARS
            });

        if name.is_none() && address.is_none() {
            None
        } else {
            Some(AgencyInfo { name, address })
        }
    })
}

/// Text of the block following the "Descriptif de ce bien" heading,
/// or of the heading's container when it has no following sibling.
pub fn description(document: &Html) -> Option<String> {
    let heading = document
        .root_element()
        .descendants()
        .filter(|node| matches!(node.value(), Node::Text(t) if DESCRIPTION_LANDMARK.is_match(t)))
        .find_map(|node| node.parent().and_then(ElementRef::wrap))?;

    let block = heading
        .next_siblings()
        .find_map(ElementRef::wrap)
        .or_else(|| heading.parent().and_then(ElementRef::wrap))?;

    let text: String = element_text(&block)
        .chars()
        .take(DESCRIPTION_MAX_CHARS)
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

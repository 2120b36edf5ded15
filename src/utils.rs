use crate::models::PropertyRecord;
use anyhow::{Context, Result};
use std::path::Path;
use tracing::{info, warn};

/// Writes `properties` as CSV with one column per record field, in field
/// order. Nothing is written when there are no properties.
pub fn export_to_csv(properties: &[PropertyRecord], output_path: impl AsRef<Path>) -> Result<()> {
    let path = output_path.as_ref();
    if properties.is_empty() {
        warn!("No properties to export");
        return Ok(());
    }

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create output file: {}", path.display()))?;

    for property in properties {
        writer
            .serialize(property)
            .with_context(|| format!("Failed to write property {}", property.listing_id))?;
    }

    writer.flush()?;
    info!("Exported {} properties to {}", properties.len(), path.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ListingRecord;
    use chrono::{Local, TimeZone};

    fn record(id: &str, price: Option<u64>) -> PropertyRecord {
        let listing = ListingRecord {
            url: Some(format!("https://www.bienici.com/annonce/vente/paris/{}", id)),
            listing_id: Some(id.to_string()),
            title: Some("Appartement, 3 pièces".to_string()),
            price,
            has_video: Some(true),
            ..Default::default()
        };
        let at = Local.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        PropertyRecord::from_listing_at(listing, at).unwrap()
    }

    #[test]
    fn test_export_writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("properties.csv");

        export_to_csv(&[record("A", Some(430_000)), record("B", None)], &path).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.get(0), Some("url"));
        assert_eq!(headers.get(1), Some("listing_id"));
        assert_eq!(headers.iter().last(), Some("date_scraped"));
        assert_eq!(headers.len(), 37);

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);

        let price = headers.iter().position(|h| h == "price").unwrap();
        let title = headers.iter().position(|h| h == "title").unwrap();
        let has_video = headers.iter().position(|h| h == "has_video").unwrap();
        assert_eq!(&rows[0][price], "430000");
        assert_eq!(&rows[0][title], "Appartement, 3 pièces");
        assert_eq!(&rows[0][has_video], "true");
        assert_eq!(&rows[1][price], "");
    }

    #[test]
    fn test_export_nothing_writes_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");

        export_to_csv(&[], &path).unwrap();
        assert!(!path.exists());
    }
}

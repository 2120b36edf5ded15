use crate::error::RecordError;
use chrono::{DateTime, Local};
use serde::Serialize;

/// How a detail-page value competes with the value already taken from the index card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    PreferIndex,
    PreferDetail,
}

/// Fields for which the detail page is more authoritative than the index card.
const PREFER_DETAIL: &[Field] = &[
    Field::Description,
    Field::AgencyName,
    Field::AgencyAddress,
    Field::EnergyRating,
    Field::GesRating,
    Field::Floor,
    Field::Exposure,
    Field::HeatingType,
    Field::PublishedDate,
    Field::ModifiedDate,
    Field::Reference,
    Field::MandateType,
    Field::EnergyConsumption,
    Field::GesEmission,
    Field::EnergyBillMin,
    Field::EnergyBillMax,
    Field::PriceWithoutFees,
    Field::AgencyFeesPercent,
];

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(u64),
    Decimal(f64),
    Flag(bool),
}

pub trait FromFieldValue: Sized {
    fn from_field_value(value: FieldValue) -> Option<Self>;
}

impl FromFieldValue for String {
    fn from_field_value(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::Text(s) => Some(s),
            FieldValue::Integer(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

impl FromFieldValue for u64 {
    fn from_field_value(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::Integer(n) => Some(n),
            _ => None,
        }
    }
}

impl FromFieldValue for u32 {
    fn from_field_value(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::Integer(n) => u32::try_from(n).ok(),
            _ => None,
        }
    }
}

impl FromFieldValue for f64 {
    fn from_field_value(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::Decimal(x) => Some(x),
            FieldValue::Integer(n) => Some(n as f64),
            _ => None,
        }
    }
}

impl FromFieldValue for bool {
    fn from_field_value(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::Flag(b) => Some(b),
            _ => None,
        }
    }
}

/// Whether a value counts as "having data" when merging.
/// Empty strings, zero and `false` do not.
pub trait Presence {
    fn is_present(&self) -> bool;
}

impl Presence for String {
    fn is_present(&self) -> bool {
        !self.is_empty()
    }
}

impl Presence for u64 {
    fn is_present(&self) -> bool {
        *self != 0
    }
}

impl Presence for u32 {
    fn is_present(&self) -> bool {
        *self != 0
    }
}

impl Presence for f64 {
    fn is_present(&self) -> bool {
        *self != 0.0
    }
}

impl Presence for bool {
    fn is_present(&self) -> bool {
        *self
    }
}

fn merge_slot<T: Presence>(slot: &mut Option<T>, incoming: Option<T>, policy: MergePolicy) {
    let Some(value) = incoming.filter(T::is_present) else {
        return;
    };
    let index_has_value = slot.as_ref().is_some_and(T::is_present);
    if !index_has_value || policy == MergePolicy::PreferDetail {
        *slot = Some(value);
    }
}

macro_rules! listing_fields {
    ($($name:ident: $ty:ty => $variant:ident),* $(,)?) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Field {
            $($variant),*
        }

        impl Field {
            pub const ALL: &'static [Field] = &[$(Field::$variant),*];

            pub fn name(self) -> &'static str {
                match self {
                    $(Field::$variant => stringify!($name)),*
                }
            }

            /// Unknown names yield `None`; there is no open-ended field map.
            pub fn from_name(name: &str) -> Option<Field> {
                match name {
                    $(stringify!($name) => Some(Field::$variant),)*
                    _ => None,
                }
            }

            pub fn merge_policy(self) -> MergePolicy {
                if PREFER_DETAIL.contains(&self) {
                    MergePolicy::PreferDetail
                } else {
                    MergePolicy::PreferIndex
                }
            }
        }

        /// Partial listing accumulated by the extractors. Every field is
        /// independently optional.
        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct ListingRecord {
            $(pub $name: Option<$ty>),*
        }

        impl ListingRecord {
            /// Stores `value` into `field`. Returns `false` and leaves the
            /// record untouched when the value does not fit the field's type.
            pub fn set(&mut self, field: Field, value: FieldValue) -> bool {
                match field {
                    $(Field::$variant => match <$ty as FromFieldValue>::from_field_value(value) {
                        Some(v) => {
                            self.$name = Some(v);
                            true
                        }
                        None => false,
                    }),*
                }
            }

            /// Like [`set`](Self::set) but keyed by field name; unrecognised keys are ignored.
            pub fn set_named(&mut self, name: &str, value: FieldValue) -> bool {
                match Field::from_name(name) {
                    Some(field) => self.set(field, value),
                    None => false,
                }
            }

            /// Folds a detail-page record into this index-page record,
            /// evaluating each field's [`MergePolicy`].
            pub fn merge_from(&mut self, detail: ListingRecord) {
                $(merge_slot(&mut self.$name, detail.$name, Field::$variant.merge_policy());)*
            }
        }
    };
}

listing_fields! {
    url: String => Url,
    listing_id: String => ListingId,
    title: String => Title,
    property_type: String => PropertyType,
    contract_type: String => ContractType,
    price: u64 => Price,
    price_per_sqm: f64 => PricePerSqm,
    price_without_fees: u64 => PriceWithoutFees,
    agency_fees_percent: f64 => AgencyFeesPercent,
    city: String => City,
    district: String => District,
    postal_code: String => PostalCode,
    full_address: String => FullAddress,
    living_area: f64 => LivingArea,
    rooms: u32 => Rooms,
    bedrooms: u32 => Bedrooms,
    floor: String => Floor,
    exposure: String => Exposure,
    heating_type: String => HeatingType,
    dpe_date: String => DpeDate,
    energy_rating: String => EnergyRating,
    energy_consumption: u32 => EnergyConsumption,
    ges_rating: String => GesRating,
    ges_emission: u32 => GesEmission,
    energy_bill_min: u64 => EnergyBillMin,
    energy_bill_max: u64 => EnergyBillMax,
    has_video: bool => HasVideo,
    is_exclusive: bool => IsExclusive,
    price_drop: bool => PriceDrop,
    agency_name: String => AgencyName,
    agency_address: String => AgencyAddress,
    mandate_type: String => MandateType,
    reference: String => Reference,
    description: String => Description,
    published_date: String => PublishedDate,
    modified_date: String => ModifiedDate,
}

/// Final, immutable listing as written to the export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyRecord {
    pub url: String,
    pub listing_id: String,
    pub title: Option<String>,
    pub property_type: Option<String>,
    pub contract_type: Option<String>,
    pub price: Option<u64>,
    pub price_per_sqm: Option<f64>,
    pub price_without_fees: Option<u64>,
    pub agency_fees_percent: Option<f64>,
    pub city: Option<String>,
    pub district: Option<String>,
    pub postal_code: Option<String>,
    pub full_address: Option<String>,
    pub living_area: Option<f64>,
    pub rooms: Option<u32>,
    pub bedrooms: Option<u32>,
    pub floor: Option<String>,
    pub exposure: Option<String>,
    pub heating_type: Option<String>,
    pub dpe_date: Option<String>,
    pub energy_rating: Option<String>,
    pub energy_consumption: Option<u32>,
    pub ges_rating: Option<String>,
    pub ges_emission: Option<u32>,
    pub energy_bill_min: Option<u64>,
    pub energy_bill_max: Option<u64>,
    pub has_video: bool,
    pub is_exclusive: bool,
    pub price_drop: bool,
    pub agency_name: Option<String>,
    pub agency_address: Option<String>,
    pub mandate_type: Option<String>,
    pub reference: Option<String>,
    pub description: Option<String>,
    pub published_date: Option<String>,
    pub modified_date: Option<String>,
    pub date_scraped: DateTime<Local>,
}

impl PropertyRecord {
    pub fn from_listing(record: ListingRecord) -> Result<Self, RecordError> {
        Self::from_listing_at(record, Local::now())
    }

    pub fn from_listing_at(
        record: ListingRecord,
        date_scraped: DateTime<Local>,
    ) -> Result<Self, RecordError> {
        let url = record
            .url
            .filter(|u| !u.is_empty())
            .ok_or(RecordError::MissingField("url"))?;
        let listing_id = record
            .listing_id
            .filter(|id| !id.is_empty())
            .ok_or(RecordError::MissingField("listing_id"))?;

        Ok(PropertyRecord {
            url,
            listing_id,
            title: record.title,
            property_type: record.property_type,
            contract_type: record.contract_type,
            price: record.price,
            price_per_sqm: record.price_per_sqm,
            price_without_fees: record.price_without_fees,
            agency_fees_percent: record.agency_fees_percent,
            city: record.city,
            district: record.district,
            postal_code: record.postal_code,
            full_address: record.full_address,
            living_area: record.living_area,
            rooms: record.rooms,
            bedrooms: record.bedrooms,
            floor: record.floor,
            exposure: record.exposure,
            heating_type: record.heating_type,
            dpe_date: record.dpe_date,
            energy_rating: record.energy_rating,
            energy_consumption: record.energy_consumption,
            ges_rating: record.ges_rating,
            ges_emission: record.ges_emission,
            energy_bill_min: record.energy_bill_min,
            energy_bill_max: record.energy_bill_max,
            has_video: record.has_video.unwrap_or(false),
            is_exclusive: record.is_exclusive.unwrap_or(false),
            price_drop: record.price_drop.unwrap_or(false),
            agency_name: record.agency_name,
            agency_address: record.agency_address,
            mandate_type: record.mandate_type,
            reference: record.reference,
            description: record.description,
            published_date: record.published_date,
            modified_date: record.modified_date,
            date_scraped,
        })
    }
}

//! Site constants, search vocabularies and runtime settings.

use crate::error::ConfigError;
use clap::ValueEnum;
use std::time::Duration;

pub const SCRAPINGANT_API_URL: &str = "https://api.scrapingant.com/v2/general";
pub const API_KEY_ENV: &str = "SCRAPINGANT_API_KEY";
pub const PROXY_COUNTRY: &str = "FR";
pub const PROXY_TYPE: &str = "residential";

pub const BASE_URL: &str = "https://www.bienici.com";
pub const SEARCH_URL: &str = "https://www.bienici.com/recherche";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
pub const MAX_RETRIES: u32 = 3;
pub const DEFAULT_MAX_WORKERS: usize = 10;

/// Cards per index page assumed when the first page shows fewer.
pub const LISTINGS_PER_PAGE: usize = 24;

pub const LOCATIONS: &[(&str, &str)] = &[
    ("paris", "paris-75000"),
    ("lyon", "lyon-69000"),
    ("marseille", "marseille-13000"),
    ("toulouse", "toulouse-31000"),
    ("nice", "nice-06000"),
    ("nantes", "nantes-44000"),
    ("montpellier", "montpellier-34000"),
    ("strasbourg", "strasbourg-67000"),
    ("bordeaux", "bordeaux-33000"),
    ("lille", "lille-59000"),
    ("rennes", "rennes-35000"),
    ("reims", "reims-51100"),
    ("saint-etienne", "saint-etienne-42000"),
    ("le-havre", "le-havre-76600"),
    ("toulon", "toulon-83000"),
    ("grenoble", "grenoble-38000"),
    ("dijon", "dijon-21000"),
    ("angers", "angers-49000"),
    ("nimes", "nimes-30000"),
    ("aix-en-provence", "aix-en-provence-13100"),
];

pub fn location_code(location: &str) -> Option<&'static str> {
    let key = location.trim().to_lowercase();
    LOCATIONS
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, code)| *code)
}

pub fn location_names() -> Vec<&'static str> {
    LOCATIONS.iter().map(|(name, _)| *name).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ContractType {
    Buy,
    Rent,
    // searched under "achat" with neuf=oui
    New,
}

impl ContractType {
    pub fn segment(self) -> &'static str {
        match self {
            ContractType::Buy | ContractType::New => "achat",
            ContractType::Rent => "location",
        }
    }

    pub fn is_new_build(self) -> bool {
        matches!(self, ContractType::New)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContractType::Buy => "buy",
            ContractType::Rent => "rent",
            ContractType::New => "new",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PropertyKind {
    All,
    Apartment,
    House,
    Land,
    Parking,
    Commercial,
    Office,
}

impl PropertyKind {
    pub fn segment(self) -> &'static str {
        match self {
            PropertyKind::All => "",
            PropertyKind::Apartment => "appartement",
            PropertyKind::House => "maisonvilla",
            PropertyKind::Land => "terrain",
            PropertyKind::Parking => "parking",
            PropertyKind::Commercial => "commerce",
            PropertyKind::Office => "bureaux",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PropertyKind::All => "all",
            PropertyKind::Apartment => "apartment",
            PropertyKind::House => "house",
            PropertyKind::Land => "land",
            PropertyKind::Parking => "parking",
            PropertyKind::Commercial => "commercial",
            PropertyKind::Office => "office",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScraperConfig {
    pub api_key: String,
    pub max_workers: usize,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl ScraperConfig {
    /// Resolves the API key from `api_key_override`, then the environment
    /// (a `.env` file is loaded first if present). Fails before any network
    /// activity when neither yields a non-empty key.
    pub fn resolve(api_key_override: Option<&str>) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let from_env = std::env::var(API_KEY_ENV).ok();
        Self::resolve_from(api_key_override, from_env.as_deref())
    }

    fn resolve_from(
        api_key_override: Option<&str>,
        from_env: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let api_key = api_key_override
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .or_else(|| from_env.map(str::trim).filter(|k| !k.is_empty()))
            .ok_or(ConfigError::MissingApiKey { env: API_KEY_ENV })?;

        Ok(Self::with_api_key(api_key))
    }

    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            max_workers: DEFAULT_MAX_WORKERS,
            timeout: DEFAULT_TIMEOUT,
            max_retries: MAX_RETRIES,
        }
    }

    pub fn max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }
}

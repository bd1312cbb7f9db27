//! Provider and country lookup for reachable addresses.

use crate::error::LookupError;
use crate::middleware::RateLimitMiddleware;

use async_trait::async_trait;
use log::debug;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Placeholder used when provider or country is unknown.
pub const UNKNOWN: &str = "-";

/// Lookup service used for enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GeoIpMode {
    #[default]
    IpInfo,
    IpApi,
    Whois,
}

impl From<&str> for GeoIpMode {
    /// Unknown names fall back to ipinfo.
    fn from(name: &str) -> Self {
        match name {
            "ip-api" => GeoIpMode::IpApi,
            "whois" => GeoIpMode::Whois,
            _ => GeoIpMode::IpInfo,
        }
    }
}

impl fmt::Display for GeoIpMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GeoIpMode::IpInfo => "ipinfo",
            GeoIpMode::IpApi => "ip-api",
            GeoIpMode::Whois => "whois",
        })
    }
}

/// Provider and country of an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoInfo {
    pub provider: String,
    pub country: String,
}

/// A geo/provider lookup backend.
#[async_trait]
pub trait GeoLookup: Send + Sync {
    async fn lookup(&self, ip: &str, mode: GeoIpMode) -> Result<GeoInfo, LookupError>;
}

/// Looks addresses up over HTTP at ipinfo.io, ip-api.com or an RDAP server.
#[derive(Clone)]
pub struct HttpGeoLookup {
    client: ClientWithMiddleware,
}

impl HttpGeoLookup {
    /// Build a client with the given per-request timeout and rate limit.
    pub fn new(timeout: Duration, max_requests_per_second: f64) -> Result<Self, reqwest::Error> {
        let inner = reqwest::Client::builder().timeout(timeout).build()?;
        let client = ClientBuilder::new(inner)
            .with(RateLimitMiddleware::new(max_requests_per_second))
            .build();
        Ok(Self { client })
    }

    fn url(ip: &str, mode: GeoIpMode) -> String {
        match mode {
            GeoIpMode::IpInfo => format!("https://ipinfo.io/{}/json", ip),
            GeoIpMode::IpApi => format!("http://ip-api.com/json/{}?fields=country,countryCode,as,org", ip),
            GeoIpMode::Whois => format!("https://rdap.org/ip/{}", ip),
        }
    }
}

#[async_trait]
impl GeoLookup for HttpGeoLookup {
    async fn lookup(&self, ip: &str, mode: GeoIpMode) -> Result<GeoInfo, LookupError> {
        let response = self.client.get(Self::url(ip, mode)).send().await?;
        if !response.status().is_success() {
            return Err(LookupError::Status(response.status()));
        }
        let body: Value = response.json().await?;
        extract(mode, &body)
    }
}

fn non_empty_str<'a>(body: &'a Value, key: &str) -> Option<&'a str> {
    body.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Pull provider and country out of a lookup response.
///
/// Each missing field becomes [`UNKNOWN`]; a body with neither is an error.
pub fn extract(mode: GeoIpMode, body: &Value) -> Result<GeoInfo, LookupError> {
    let (provider, country) = match mode {
        GeoIpMode::IpInfo => (non_empty_str(body, "org"), non_empty_str(body, "country")),
        GeoIpMode::IpApi => (
            non_empty_str(body, "as").or_else(|| non_empty_str(body, "org")),
            non_empty_str(body, "countryCode").or_else(|| non_empty_str(body, "country")),
        ),
        GeoIpMode::Whois => (non_empty_str(body, "name"), non_empty_str(body, "country")),
    };
    if provider.is_none() && country.is_none() {
        return Err(LookupError::MissingFields);
    }
    Ok(GeoInfo {
        provider: provider.unwrap_or(UNKNOWN).to_string(),
        country: country.unwrap_or(UNKNOWN).to_string(),
    })
}

/// Runs lookups in a fixed mode.
#[derive(Clone)]
pub struct Enricher {
    backend: Arc<dyn GeoLookup>,
    mode: GeoIpMode,
}

impl Enricher {
    pub fn new(backend: Arc<dyn GeoLookup>, mode: GeoIpMode) -> Self {
        Self { backend, mode }
    }

    pub fn mode(&self) -> GeoIpMode {
        self.mode
    }

    /// Look up `ip`, keeping the failure reason.
    pub async fn try_enrich(&self, ip: &str) -> Result<GeoInfo, LookupError> {
        let result = self.backend.lookup(ip, self.mode).await;
        if let Err(e) = &result {
            debug!("{} lookup for {} failed: {}", self.mode, ip, e);
        }
        result
    }

    /// Look up `ip`, returning `("-", "-")` on any failure.
    pub async fn enrich(&self, ip: &str) -> (String, String) {
        match self.try_enrich(ip).await {
            Ok(info) => (info.provider, info.country),
            Err(_) => (UNKNOWN.to_string(), UNKNOWN.to_string()),
        }
    }
}

/// Regional-indicator flag for a two-letter country code, empty for anything else.
pub fn country_flag(country: &str) -> String {
    let letters: Vec<char> = country.chars().collect();
    if letters.len() != 2 || !letters.iter().all(char::is_ascii_alphabetic) {
        return String::new();
    }
    letters
        .iter()
        .filter_map(|c| char::from_u32(0x1F1E6 + (c.to_ascii_uppercase() as u32 - 'A' as u32)))
        .collect()
}

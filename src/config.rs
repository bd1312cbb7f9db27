//! Configuration for link test runs.

use crate::geoip::GeoIpMode;
use crate::merge::DEFAULT_SELECTOR_TAGS;
use std::time::Duration;

/// Configuration for a [`LinkTester`](crate::LinkTester).
#[derive(Debug, Clone)]
pub struct TesterConfig {
    /// Timeout for each TCP connect probe and DNS resolution.
    pub connect_timeout: Duration,
    /// Timeout for each enrichment lookup.
    pub lookup_timeout: Duration,
    /// Maximum number of links probed at the same time.
    pub concurrency: usize,
    /// Lookup service used for enrichment.
    pub geoip_mode: GeoIpMode,
    /// Maximum lookup requests per second.
    pub lookup_requests_per_second: f64,
    /// Tags of the selector groups rewritten by a merge.
    pub selector_tags: Vec<String>,
}

impl TesterConfig {
    /// Create a new configuration builder.
    pub fn builder() -> TesterConfigBuilder {
        TesterConfigBuilder::new()
    }
}

impl Default for TesterConfig {
    fn default() -> Self {
        TesterConfigBuilder::new().build()
    }
}

/// Builder for `TesterConfig`.
pub struct TesterConfigBuilder {
    connect_timeout: Option<Duration>,
    lookup_timeout: Option<Duration>,
    concurrency: Option<usize>,
    geoip_mode: Option<GeoIpMode>,
    lookup_requests_per_second: Option<f64>,
    selector_tags: Option<Vec<String>>,
}

impl TesterConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self {
            connect_timeout: None,
            lookup_timeout: None,
            concurrency: None,
            geoip_mode: None,
            lookup_requests_per_second: None,
            selector_tags: None,
        }
    }

    /// Set the timeout for connect probes.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the timeout for enrichment lookups.
    pub fn lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = Some(timeout);
        self
    }

    /// Set how many links are probed at once. Zero is treated as one.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    /// Set the lookup service by name; unknown names select ipinfo.
    pub fn geoip_mode(mut self, mode: impl Into<GeoIpMode>) -> Self {
        self.geoip_mode = Some(mode.into());
        self
    }

    pub fn lookup_requests_per_second(mut self, rps: f64) -> Self {
        self.lookup_requests_per_second = Some(rps);
        self
    }

    /// Set the selector group tags.
    pub fn selector_tags(mut self, tags: Vec<impl Into<String>>) -> Self {
        self.selector_tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    /// Build the configuration.
    pub fn build(self) -> TesterConfig {
        TesterConfig {
            connect_timeout: self.connect_timeout.unwrap_or(Duration::from_secs(5)),
            lookup_timeout: self.lookup_timeout.unwrap_or(Duration::from_secs(5)),
            concurrency: self.concurrency.unwrap_or(16).max(1),
            geoip_mode: self.geoip_mode.unwrap_or_default(),
            lookup_requests_per_second: self.lookup_requests_per_second.unwrap_or(5.0),
            selector_tags: self
                .selector_tags
                .unwrap_or_else(|| DEFAULT_SELECTOR_TAGS.iter().map(|s| s.to_string()).collect()),
        }
    }
}

impl Default for TesterConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

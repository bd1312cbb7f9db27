//! Batch link testing: parse, probe, enrich, tag and merge.

use crate::config::TesterConfig;
use crate::error::Error;
use crate::geoip::{country_flag, Enricher, GeoLookup, HttpGeoLookup};
use crate::link::parse_link;
use crate::merge::{merge, ConfigTemplate};
use crate::outbound::Outbound;
use crate::probe::{ProbeResult, Prober, Status};
use crate::store::TemplateStore;
use crate::tag::TagAssigner;

use futures::stream::{self, StreamExt};
use log::info;
use serde::Serialize;
use std::sync::Arc;

/// One row of the test result table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestRow {
    /// 1-based position in input order.
    pub no: usize,
    /// Assigned tag; empty for dead links.
    pub tag: String,
    pub host: String,
    pub ip: String,
    pub provider: String,
    pub country: String,
    pub status: Status,
    pub host_status: Status,
    pub path_status: Status,
    /// Path-embedded endpoint address, `"-"` when the path carries none.
    pub path_ip: String,
    /// Flag of `country`, empty when unknown.
    pub flag: String,
}

impl TestRow {
    fn new(no: usize, tag: String, result: &ProbeResult) -> Self {
        Self {
            no,
            tag,
            host: result.host_tested.clone(),
            ip: result.tested_ip.clone(),
            provider: result.provider.clone(),
            country: result.country.clone(),
            status: result.status,
            host_status: Status::from_alive(result.alive_host),
            path_status: Status::from_alive(result.alive_path),
            path_ip: result.path_ip.clone().unwrap_or_else(|| "-".to_string()),
            flag: country_flag(&result.country),
        }
    }
}

/// Outcome of testing a batch of links.
#[derive(Debug, Default)]
pub struct TestReport {
    /// One row per parsed link, in input order.
    pub rows: Vec<TestRow>,
    /// Live outbounds carrying their assigned tags, in input order.
    pub outbounds: Vec<Outbound>,
}

impl TestReport {
    pub fn alive_count(&self) -> usize {
        self.outbounds.len()
    }
}

/// Outcome of a test-and-merge run.
#[derive(Debug)]
pub struct MergeRun {
    pub rows: Vec<TestRow>,
    /// The template with its outbounds replaced by the merged list.
    pub config: ConfigTemplate,
}

/// Tests share-links and merges the live ones into configuration templates.
pub struct LinkTester {
    prober: Prober,
    enricher: Enricher,
    /// Configuration for test runs.
    pub config: TesterConfig,
}

impl LinkTester {
    /// Create a tester that enriches over HTTP.
    pub fn new(config: TesterConfig) -> Result<Self, Error> {
        let lookup = HttpGeoLookup::new(config.lookup_timeout, config.lookup_requests_per_second)?;
        Ok(Self::with_lookup(config, Arc::new(lookup)))
    }

    /// Create a tester with a custom lookup backend.
    pub fn with_lookup(config: TesterConfig, lookup: Arc<dyn GeoLookup>) -> Self {
        Self {
            prober: Prober::new(config.connect_timeout),
            enricher: Enricher::new(lookup, config.geoip_mode),
            config,
        }
    }

    /// Probe one outbound and enrich it if reachable.
    pub async fn probe(&self, outbound: &Outbound) -> ProbeResult {
        let reach = self.prober.check(outbound).await;
        let lookup = match reach.lookup_target() {
            Some(ip) => Some(self.enricher.try_enrich(&ip).await),
            None => None,
        };
        ProbeResult::new(reach, lookup)
    }

    /// Parse and test a batch of share-links.
    ///
    /// Blank and unparseable links produce no row.
    pub async fn test_links<S: AsRef<str>>(&self, links: &[S]) -> TestReport {
        let outbounds: Vec<Outbound> = links
            .iter()
            .map(AsRef::<str>::as_ref)
            .filter(|link| !link.trim().is_empty())
            .filter_map(parse_link)
            .collect();
        if outbounds.len() < links.len() {
            info!("Parsed {} of {} links", outbounds.len(), links.len());
        }
        self.test_outbounds(outbounds).await
    }

    /// Test already parsed outbounds.
    pub async fn test_outbounds(&self, outbounds: Vec<Outbound>) -> TestReport {
        info!(
            "Starting test of {} outbounds ({} at a time, {} lookups)",
            outbounds.len(),
            self.config.concurrency,
            self.enricher.mode()
        );

        // `buffered` yields results in input order regardless of completion order.
        let results: Vec<ProbeResult> = stream::iter(&outbounds)
            .map(|outbound| self.probe(outbound))
            .buffered(self.config.concurrency)
            .collect()
            .await;

        let mut tags = TagAssigner::new();
        let mut report = TestReport::default();
        for (mut outbound, result) in outbounds.into_iter().zip(results) {
            let tag = if result.is_alive() {
                tags.assign(&result)
            } else {
                String::new()
            };
            report.rows.push(TestRow::new(report.rows.len() + 1, tag.clone(), &result));
            if result.is_alive() {
                outbound.tag = tag;
                report.outbounds.push(outbound);
            }
        }

        info!(
            "Test completed: {} alive, {} dead",
            report.alive_count(),
            report.rows.len() - report.alive_count()
        );
        report
    }

    /// Test `links` and merge the live outbounds into `template`.
    pub async fn run<S: AsRef<str>>(
        &self,
        mut template: ConfigTemplate,
        links: &[S],
    ) -> Result<MergeRun, Error> {
        let report = self.test_links(links).await;
        template.outbounds = merge(&template, &report.outbounds, &self.config.selector_tags)?;
        Ok(MergeRun {
            rows: report.rows,
            config: template,
        })
    }

    /// Like [`run`](Self::run), with the template fetched from `store` by name.
    pub async fn run_from_store<S: AsRef<str>>(
        &self,
        store: &dyn TemplateStore,
        template_name: &str,
        links: &[S],
    ) -> Result<MergeRun, Error> {
        let bytes = store.fetch(template_name).await?;
        let template = ConfigTemplate::from_slice(&bytes)?;
        self.run(template, links).await
    }
}

//! # linkprobe
//!
//! Share-link tester for sing-box configurations.
//!
//! This library parses `ss://`, `vless://` and `trojan://` share-links, checks that each
//! endpoint accepts TCP connections, labels live endpoints with their provider and country,
//! and merges them into an existing sing-box configuration template.

pub mod config;
pub mod error;
pub mod geoip;
pub mod link;
pub mod merge;
pub mod middleware;
pub mod outbound;
pub mod probe;
pub mod store;
pub mod tag;
pub mod tester;
mod utils;

pub use config::{TesterConfig, TesterConfigBuilder};
pub use error::{Error, LookupError, ProbeError, StorageError};
pub use geoip::{country_flag, GeoIpMode, GeoLookup, HttpGeoLookup};
pub use link::parse_link;
pub use merge::{merge, ConfigTemplate, TemplateOutbound};
pub use outbound::{Outbound, Protocol};
pub use probe::{ProbeResult, Status};
pub use store::{GithubConfig, GithubStore, MemoryStore, TemplateStore};
pub use tester::{LinkTester, MergeRun, TestReport, TestRow};
pub use utils::{fetch_links_from_source, parse_link_list};

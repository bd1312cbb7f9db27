//! TCP liveness probing of outbound hosts and path-embedded endpoints.

use crate::error::{LookupError, ProbeError};
use crate::geoip::{GeoInfo, UNKNOWN};
use crate::outbound::Outbound;

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;

static PATH_ENDPOINT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/(\d+\.\d+\.\d+\.\d+)-(\d+)").expect("valid path endpoint regex"));

/// Overall reachability of an outbound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Alive,
    Dead,
}

impl Status {
    pub fn from_alive(alive: bool) -> Self {
        if alive {
            Status::Alive
        } else {
            Status::Dead
        }
    }
}

/// Pick the host to probe from the outbound server and its websocket host hint.
///
/// A hint of the form `<server>.<rest>` is shortened to `<rest>`.
pub fn host_to_test(server: &str, ws_host: Option<&str>) -> String {
    match ws_host {
        Some(ws_host) if !ws_host.is_empty() => {
            let prefix = format!("{}.", server);
            match ws_host.strip_prefix(&prefix) {
                Some(rest) => rest.to_string(),
                None => ws_host.to_string(),
            }
        }
        _ => server.to_string(),
    }
}

/// Find an `/<ipv4>-<port>` endpoint embedded in a transport path.
pub fn path_endpoint(path: &str) -> Option<(Ipv4Addr, u16)> {
    let caps = PATH_ENDPOINT.captures(path)?;
    let ip = caps[1].parse::<Ipv4Addr>().ok()?;
    let port = caps[2].parse::<u16>().ok()?;
    Some((ip, port))
}

/// Result of probing the path-embedded endpoint.
#[derive(Debug)]
pub struct PathCheck {
    pub ip: Ipv4Addr,
    pub port: u16,
    pub outcome: Result<(), ProbeError>,
}

impl PathCheck {
    pub fn alive(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Reachability of one outbound, before enrichment.
#[derive(Debug)]
pub struct Reachability {
    /// Host actually probed after normalisation.
    pub host_tested: String,
    /// Resolved address of `host_tested`, or the name itself when resolution failed.
    pub host_ip: String,
    pub host: Result<(), ProbeError>,
    pub path: Option<PathCheck>,
}

impl Reachability {
    pub fn alive_host(&self) -> bool {
        self.host.is_ok()
    }

    pub fn alive_path(&self) -> bool {
        self.path.as_ref().is_some_and(PathCheck::alive)
    }

    /// Address enrichment should use: the live path endpoint first, then the live host.
    pub fn lookup_target(&self) -> Option<String> {
        match &self.path {
            Some(path) if path.alive() => Some(path.ip.to_string()),
            _ if self.alive_host() => Some(self.host_ip.clone()),
            _ => None,
        }
    }

    pub fn tested_ip(&self) -> String {
        match &self.path {
            Some(path) if path.alive() => path.ip.to_string(),
            _ => self.host_ip.clone(),
        }
    }
}

/// Full per-outbound test outcome.
#[derive(Debug)]
pub struct ProbeResult {
    pub alive_host: bool,
    pub alive_path: bool,
    pub tested_ip: String,
    pub host_tested: String,
    pub path_ip: Option<String>,
    /// Provider label, `"-"` when the lookup failed, empty when nothing was looked up.
    pub provider: String,
    /// Country code or name, with the same sentinels as `provider`.
    pub country: String,
    pub status: Status,
    pub host_error: Option<ProbeError>,
    pub path_error: Option<ProbeError>,
    pub lookup_error: Option<LookupError>,
}

impl ProbeResult {
    /// Combine reachability with an optional lookup outcome.
    pub fn new(reach: Reachability, lookup: Option<Result<GeoInfo, LookupError>>) -> Self {
        let alive_host = reach.alive_host();
        let alive_path = reach.alive_path();
        let tested_ip = reach.tested_ip();
        let (provider, country, lookup_error) = match lookup {
            Some(Ok(info)) => (info.provider, info.country, None),
            Some(Err(e)) => (UNKNOWN.to_string(), UNKNOWN.to_string(), Some(e)),
            None => (String::new(), String::new(), None),
        };
        let (path_ip, path_error) = match reach.path {
            Some(path) => (Some(path.ip.to_string()), path.outcome.err()),
            None => (None, None),
        };
        Self {
            alive_host,
            alive_path,
            tested_ip,
            host_tested: reach.host_tested,
            path_ip,
            provider,
            country,
            status: Status::from_alive(alive_host || alive_path),
            host_error: reach.host.err(),
            path_error,
            lookup_error,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.status == Status::Alive
    }
}

/// Resolve a host name, preferring IPv4.
pub async fn resolve(host: &str, limit: Duration) -> Result<IpAddr, ProbeError> {
    if host.is_empty() {
        return Err(ProbeError::NoAddress(String::new()));
    }
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }
    let addrs: Vec<SocketAddr> = match timeout(limit, lookup_host((host, 0))).await {
        Ok(Ok(addrs)) => addrs.collect(),
        Ok(Err(source)) => {
            return Err(ProbeError::Resolve {
                host: host.to_string(),
                source,
            })
        }
        Err(_) => return Err(ProbeError::Timeout(host.to_string())),
    };
    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .map(SocketAddr::ip)
        .ok_or_else(|| ProbeError::NoAddress(host.to_string()))
}

/// Single bounded-time TCP connect attempt. The connection is closed immediately.
pub async fn connect_probe(addr: SocketAddr, limit: Duration) -> Result<(), ProbeError> {
    match timeout(limit, TcpStream::connect(addr)).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(source)) => Err(ProbeError::Connect {
            addr: addr.to_string(),
            source,
        }),
        Err(_) => Err(ProbeError::Timeout(addr.to_string())),
    }
}

/// Checks reachability of outbounds.
#[derive(Debug, Clone)]
pub struct Prober {
    connect_timeout: Duration,
}

impl Prober {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    /// Probe the outbound host and, when present, its path endpoint concurrently.
    pub async fn check(&self, outbound: &Outbound) -> Reachability {
        let host_tested = host_to_test(&outbound.server, outbound.hints.ws_host.as_deref());
        let endpoint = outbound.hints.path.as_deref().and_then(path_endpoint);

        let host_check = async {
            match resolve(&host_tested, self.connect_timeout).await {
                Ok(ip) => {
                    let addr = SocketAddr::new(ip, outbound.server_port);
                    (ip.to_string(), connect_probe(addr, self.connect_timeout).await)
                }
                Err(e) => (host_tested.clone(), Err(e)),
            }
        };
        let path_check = async {
            match endpoint {
                Some((ip, port)) => {
                    let addr = SocketAddr::new(IpAddr::V4(ip), port);
                    Some(PathCheck {
                        ip,
                        port,
                        outcome: connect_probe(addr, self.connect_timeout).await,
                    })
                }
                None => None,
            }
        };
        let ((host_ip, host), path) = tokio::join!(host_check, path_check);

        if let Err(e) = &host {
            debug!("Host probe for {} failed: {}", host_tested, e);
        }
        if let Some(PathCheck {
            outcome: Err(e), ..
        }) = &path
        {
            debug!("Path probe for {} failed: {}", host_tested, e);
        }

        Reachability {
            host_tested,
            host_ip,
            host,
            path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbound::{Credentials, TestHints};
    use tokio::net::TcpListener;

    fn outbound(server: &str, port: u16, hints: TestHints) -> Outbound {
        Outbound {
            tag: server.to_string(),
            server: server.to_string(),
            server_port: port,
            credentials: Credentials::Trojan {
                password: "pw".into(),
            },
            tls: None,
            transport: None,
            hints,
        }
    }

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    }

    #[test]
    fn host_to_test_strips_server_prefix() {
        assert_eq!(host_to_test("a.com", Some("a.com.cdn.net")), "cdn.net");
        assert_eq!(host_to_test("a.com", Some("edge.net")), "edge.net");
        assert_eq!(host_to_test("a.com", Some("")), "a.com");
        assert_eq!(host_to_test("a.com", None), "a.com");
    }

    #[test]
    fn path_endpoint_extraction() {
        assert_eq!(
            path_endpoint("/ws/1.2.3.4-8080?ed=2048"),
            Some((Ipv4Addr::new(1, 2, 3, 4), 8080))
        );
        assert_eq!(path_endpoint("/ws"), None);
        assert_eq!(path_endpoint("/1.2.3.4-99999"), None);
        assert_eq!(path_endpoint("/300.2.3.4-80"), None);
    }

    #[test]
    fn status_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Status::Alive).unwrap(), "\"ALIVE\"");
        assert_eq!(serde_json::to_string(&Status::Dead).unwrap(), "\"DEAD\"");
    }

    #[tokio::test]
    async fn live_host_is_alive() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let prober = Prober::new(Duration::from_secs(2));

        let reach = prober.check(&outbound("127.0.0.1", port, TestHints::default())).await;
        assert!(reach.alive_host());
        assert!(!reach.alive_path());
        assert_eq!(reach.host_ip, "127.0.0.1");
        assert_eq!(reach.lookup_target().as_deref(), Some("127.0.0.1"));
    }

    #[tokio::test]
    async fn path_endpoint_takes_priority() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let live = listener.local_addr().unwrap().port();
        let dead = closed_port().await;
        let prober = Prober::new(Duration::from_secs(2));

        let hints = TestHints::new("", &format!("/127.0.0.1-{}", live));
        let reach = prober.check(&outbound("127.0.0.1", dead, hints)).await;
        assert!(!reach.alive_host());
        assert!(reach.alive_path());
        assert_eq!(reach.tested_ip(), "127.0.0.1");

        let result = ProbeResult::new(reach, Some(Ok(GeoInfo {
            provider: "AS1 Org".into(),
            country: "SG".into(),
        })));
        assert_eq!(result.status, Status::Alive);
        assert_eq!(result.path_ip.as_deref(), Some("127.0.0.1"));
        assert!(result.host_error.is_some());
    }

    #[tokio::test]
    async fn unresolvable_host_keeps_name() {
        let prober = Prober::new(Duration::from_secs(2));
        let reach = prober
            .check(&outbound("", 443, TestHints::default()))
            .await;
        assert!(!reach.alive_host());
        assert_eq!(reach.host_ip, "");
        assert_eq!(reach.lookup_target(), None);

        let result = ProbeResult::new(reach, None);
        assert_eq!(result.status, Status::Dead);
        assert_eq!(result.provider, "");
        assert_eq!(result.country, "");
    }

    #[tokio::test]
    async fn failed_lookup_becomes_sentinel() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let reach = Prober::new(Duration::from_secs(2))
            .check(&outbound("127.0.0.1", port, TestHints::default()))
            .await;
        let result = ProbeResult::new(reach, Some(Err(LookupError::MissingFields)));
        assert!(result.is_alive());
        assert_eq!(result.provider, "-");
        assert_eq!(result.country, "-");
        assert!(result.lookup_error.is_some());
    }
}

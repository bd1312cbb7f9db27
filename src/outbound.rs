//! Normalized outbound records produced from share-links.

use serde::Serialize;

/// Port used when a link does not carry one.
pub const DEFAULT_PORT: u16 = 443;

/// Protocol of an outbound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Shadowsocks,
    Vless,
    Trojan,
}

/// Protocol-specific credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Credentials {
    Shadowsocks {
        method: String,
        password: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        plugin: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        plugin_opts: Option<String>,
    },
    Vless {
        uuid: String,
    },
    Trojan {
        password: String,
    },
}

impl Credentials {
    /// Protocol these credentials belong to.
    pub fn protocol(&self) -> Protocol {
        match self {
            Credentials::Shadowsocks { .. } => Protocol::Shadowsocks,
            Credentials::Vless { .. } => Protocol::Vless,
            Credentials::Trojan { .. } => Protocol::Trojan,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tls {
    pub enabled: bool,
    pub server_name: String,
    pub insecure: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Ws,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WsHeaders {
    #[serde(rename = "Host")]
    pub host: String,
}

/// Websocket transport block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transport {
    #[serde(rename = "type")]
    pub kind: TransportKind,
    pub path: String,
    pub headers: WsHeaders,
}

/// Transport host and path remembered for liveness testing only.
///
/// These never appear in [`OutboundView`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestHints {
    pub ws_host: Option<String>,
    pub path: Option<String>,
}

impl TestHints {
    pub(crate) fn new(ws_host: &str, path: &str) -> Self {
        let keep = |s: &str| (!s.is_empty()).then(|| s.to_string());
        Self {
            ws_host: keep(ws_host),
            path: keep(path),
        }
    }
}

/// A proxy endpoint decoded from a share-link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    /// Display label. Replaced by the tag assigner once the endpoint is verified.
    pub tag: String,
    /// Hostname or IP. Empty when the link carried no authority.
    pub server: String,
    pub server_port: u16,
    pub credentials: Credentials,
    pub tls: Option<Tls>,
    pub transport: Option<Transport>,
    pub hints: TestHints,
}

impl Outbound {
    pub fn protocol(&self) -> Protocol {
        self.credentials.protocol()
    }

    /// Serializable projection without the test hints.
    pub fn public_view(&self) -> OutboundView<'_> {
        OutboundView {
            protocol: self.protocol(),
            tag: &self.tag,
            server: &self.server,
            server_port: self.server_port,
            credentials: &self.credentials,
            tls: self.tls.as_ref(),
            transport: self.transport.as_ref(),
        }
    }
}

/// The sing-box shaped form of an [`Outbound`].
#[derive(Debug, Serialize)]
pub struct OutboundView<'a> {
    #[serde(rename = "type")]
    pub protocol: Protocol,
    pub tag: &'a str,
    pub server: &'a str,
    pub server_port: u16,
    #[serde(flatten)]
    pub credentials: &'a Credentials,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<&'a Tls>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<&'a Transport>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn trojan() -> Outbound {
        Outbound {
            tag: "node".into(),
            server: "example.com".into(),
            server_port: 443,
            credentials: Credentials::Trojan {
                password: "secret".into(),
            },
            tls: Some(Tls {
                enabled: true,
                server_name: "example.com".into(),
                insecure: false,
            }),
            transport: Some(Transport {
                kind: TransportKind::Ws,
                path: "/1.2.3.4-8080".into(),
                headers: WsHeaders {
                    host: "cdn.example.com".into(),
                },
            }),
            hints: TestHints::new("cdn.example.com", "/1.2.3.4-8080"),
        }
    }

    #[test]
    fn public_view_drops_hints() {
        let value = serde_json::to_value(trojan().public_view()).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "trojan",
                "tag": "node",
                "server": "example.com",
                "server_port": 443,
                "password": "secret",
                "tls": {"enabled": true, "server_name": "example.com", "insecure": false},
                "transport": {"type": "ws", "path": "/1.2.3.4-8080", "headers": {"Host": "cdn.example.com"}}
            })
        );
    }

    #[test]
    fn shadowsocks_without_plugin_omits_plugin_fields() {
        let ob = Outbound {
            tag: "ss".into(),
            server: "1.2.3.4".into(),
            server_port: 8388,
            credentials: Credentials::Shadowsocks {
                method: "aes-256-gcm".into(),
                password: "pass".into(),
                plugin: None,
                plugin_opts: None,
            },
            tls: None,
            transport: None,
            hints: TestHints::default(),
        };
        let value = serde_json::to_value(ob.public_view()).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj["type"], "shadowsocks");
        assert_eq!(obj["method"], "aes-256-gcm");
        assert!(!obj.contains_key("plugin"));
        assert!(!obj.contains_key("tls"));
    }

    #[test]
    fn empty_hints_are_absent() {
        let hints = TestHints::new("", "");
        assert_eq!(hints, TestHints::default());
    }
}

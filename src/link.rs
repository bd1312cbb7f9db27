//! Share-link parsing for `ss://`, `vless://` and `trojan://`.

use crate::outbound::{
    Credentials, Outbound, TestHints, Tls, Transport, TransportKind, WsHeaders, DEFAULT_PORT,
};
use crate::utils::{decode_base64, percent_decode, QueryParams};
use log::debug;
use url::{Host, Url};

/// Share-link scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Shadowsocks,
    Vless,
    Trojan,
}

impl Scheme {
    /// Detect the scheme from the link prefix.
    pub fn detect(link: &str) -> Option<Self> {
        if link.starts_with("vless://") {
            Some(Scheme::Vless)
        } else if link.starts_with("trojan://") {
            Some(Scheme::Trojan)
        } else if link.starts_with("ss://") {
            Some(Scheme::Shadowsocks)
        } else {
            None
        }
    }
}

/// Parse one share-link.
///
/// Returns `None` for unknown schemes and for links too malformed to yield a record.
pub fn parse_link(link: &str) -> Option<Outbound> {
    let link = link.trim();
    let parsed = match Scheme::detect(link)? {
        Scheme::Shadowsocks => parse_ss(link),
        scheme @ (Scheme::Vless | Scheme::Trojan) => parse_url_link(link, scheme),
    };
    if parsed.is_none() {
        debug!("Dropping malformed link {}", link);
    }
    parsed
}

fn parse_port(port: &str) -> u16 {
    let port = port.trim_end_matches('/');
    if port.is_empty() {
        return DEFAULT_PORT;
    }
    match port.parse::<u16>() {
        Ok(p) if p != 0 => p,
        _ => {
            debug!("Invalid port {:?}, using {}", port, DEFAULT_PORT);
            DEFAULT_PORT
        }
    }
}

/// Split `host:port`, accepting `[v6]:port`.
fn split_host_port(hostport: &str) -> (String, u16) {
    let hostport = hostport.trim_end_matches('/');
    if let Some(rest) = hostport.strip_prefix('[') {
        if let Some((host, tail)) = rest.split_once(']') {
            let port = tail.strip_prefix(':').unwrap_or("");
            return (host.to_string(), parse_port(port));
        }
    }
    match hostport.split_once(':') {
        Some((host, port)) => (host.to_string(), parse_port(port)),
        None => (hostport.to_string(), DEFAULT_PORT),
    }
}

fn split_method_password(secret: &str) -> Option<(String, String)> {
    secret
        .split_once(':')
        .map(|(method, password)| (method.to_string(), password.to_string()))
}

fn parse_ss(link: &str) -> Option<Outbound> {
    let body = &link["ss://".len()..];
    let (body, fragment) = match body.split_once('#') {
        Some((body, fragment)) => (body, percent_decode(fragment)),
        None => (body, String::new()),
    };
    let content = body.replace("/?", "?");

    let (method, password, server, server_port, query) = match content.split_once('@') {
        Some((userinfo, rest)) => {
            // SIP002: base64(method:password)@host:port
            let userinfo = percent_decode(userinfo);
            let (method, password) = decode_base64(&userinfo)
                .and_then(|decoded| split_method_password(&decoded))
                .or_else(|| split_method_password(&userinfo))?;
            let (hostport, query) = rest.split_once('?').unwrap_or((rest, ""));
            let (server, port) = split_host_port(hostport);
            (method, password, server, port, QueryParams::parse(query))
        }
        None => {
            // Legacy: base64(method:password@host:port), host may also come from the query.
            let (encoded, query) = content.split_once('?').unwrap_or((content.as_str(), ""));
            let query = QueryParams::parse(query);
            let (method, password, mut server, mut port) =
                decode_legacy(&percent_decode(encoded)).unwrap_or_default();
            if server.is_empty() {
                if let Some(host) = query.get("server") {
                    server = host.to_string();
                }
            }
            if port.is_empty() {
                if let Some(p) = query.get("port") {
                    port = p.to_string();
                }
            }
            (method, password, server, parse_port(&port), query)
        }
    };

    let mut opts = Vec::new();
    if query.get("type") == Some("ws") {
        opts.push("mode=websocket".to_string());
    }
    if let Some(path) = query.get("path") {
        opts.push(format!("path={}", path));
    }
    if let Some(host) = query.get("host") {
        opts.push(format!("host={}", host));
    }
    if query.get("security") == Some("tls") {
        opts.push("tls".to_string());
    }
    if let Some(sni) = query.get("sni") {
        opts.push(format!("sni={}", sni));
    }
    if let Some(encryption) = query.get("encryption") {
        opts.push(format!("encryption={}", encryption));
    }
    let (plugin, plugin_opts) = if opts.is_empty() {
        (None, None)
    } else {
        (Some("v2ray-plugin".to_string()), Some(opts.join(";")))
    };

    let tag = if !fragment.is_empty() {
        fragment
    } else if !server.is_empty() {
        server.clone()
    } else {
        "ss".to_string()
    };

    Some(Outbound {
        tag,
        server,
        server_port,
        credentials: Credentials::Shadowsocks {
            method,
            password,
            plugin,
            plugin_opts,
        },
        tls: None,
        transport: None,
        hints: TestHints::new(query.get("host").unwrap_or(""), query.get("path").unwrap_or("")),
    })
}

/// Decode the legacy body into `(method, password, host, port)`; host and port may be empty.
fn decode_legacy(encoded: &str) -> Option<(String, String, String, String)> {
    let decoded = decode_base64(encoded)?;
    match decoded.split_once('@') {
        Some((secret, hostport)) => {
            let (method, password) = split_method_password(secret)?;
            let (host, port) = hostport.split_once(':').unwrap_or((hostport, ""));
            Some((method, password, host.to_string(), port.to_string()))
        }
        None => {
            let (method, password) = split_method_password(&decoded)?;
            Some((method, password, String::new(), String::new()))
        }
    }
}

/// Drop the port from the authority of `link`, keeping everything around it.
fn strip_port(link: &str) -> Option<String> {
    let start = link.find("://")? + 3;
    let end = link[start..]
        .find(['/', '?', '#'])
        .map_or(link.len(), |i| start + i);
    let authority = &link[start..end];
    let host_start = authority.rfind('@').map_or(0, |i| i + 1);
    let host_end = authority[host_start..]
        .rfind(']')
        .map_or(host_start, |i| host_start + i);
    let colon = host_end + authority[host_end..].find(':')?;
    Some(format!("{}{}{}", &link[..start], &authority[..colon], &link[end..]))
}

fn parse_url_link(link: &str, scheme: Scheme) -> Option<Outbound> {
    let url = match Url::parse(link) {
        Ok(url) => url,
        Err(url::ParseError::InvalidPort) => {
            debug!("Invalid port in {}, using {}", link, DEFAULT_PORT);
            Url::parse(&strip_port(link)?).ok()?
        }
        Err(_) => return None,
    };
    let query = QueryParams::parse(url.query().unwrap_or(""));

    let hostname = match url.host() {
        Some(Host::Ipv6(addr)) => addr.to_string(),
        Some(Host::Domain(domain)) => domain.to_ascii_lowercase(),
        Some(host) => host.to_string(),
        None => String::new(),
    };
    let server_port = match url.port() {
        Some(p) if p != 0 => p,
        _ => DEFAULT_PORT,
    };
    let tag = match url.fragment() {
        Some(fragment) if !fragment.is_empty() => percent_decode(fragment),
        _ => hostname.clone(),
    };
    let user = url.username().to_string();
    let credentials = match scheme {
        Scheme::Vless => Credentials::Vless { uuid: user },
        _ => Credentials::Trojan { password: user },
    };

    let tls = Tls {
        enabled: query.get("security").unwrap_or("tls") == "tls",
        server_name: query.get("sni").unwrap_or(hostname.as_str()).to_string(),
        insecure: query.get("allowInsecure") == Some("true"),
    };

    let (transport, hints) = if query.get("type").unwrap_or("ws") == "ws" {
        let path = query.get("path").unwrap_or("");
        let transport = Transport {
            kind: TransportKind::Ws,
            path: path.to_string(),
            headers: WsHeaders {
                host: query.get("host").unwrap_or(hostname.as_str()).to_string(),
            },
        };
        let hints = TestHints::new(query.get("host").unwrap_or(""), path);
        (Some(transport), hints)
    } else {
        (None, TestHints::default())
    };

    Some(Outbound {
        tag,
        server: hostname,
        server_port,
        credentials,
        tls: Some(tls),
        transport,
        hints,
    })
}

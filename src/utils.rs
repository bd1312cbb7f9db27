//! Utility functions shared by the link parser and the tester.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use percent_encoding::percent_decode_str;
use reqwest::Client;
use std::collections::HashMap;

const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Fetch a list of share-links from a URL or file path.
pub async fn fetch_links_from_source(source: &str) -> Result<Vec<String>, reqwest::Error> {
    if source.starts_with("http") {
        let client = Client::new();
        let response = client.get(source).send().await?;
        let content = response.text().await?;
        Ok(parse_link_list(&content))
    } else {
        match std::fs::read_to_string(source) {
            Ok(content) => Ok(parse_link_list(&content)),
            Err(_) => Ok(Vec::new()),
        }
    }
}

/// Split text content into candidate share-links, one per line.
///
/// Blank lines and `#` comments are skipped. Lines are not validated here;
/// unknown schemes are dropped later by the parser.
pub fn parse_link_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Decode base64 text accepting both alphabets and missing padding.
///
/// Returns `None` when the input is not base64 or not UTF-8.
pub(crate) fn decode_base64(input: &str) -> Option<String> {
    let mut normalized: String = input
        .trim()
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            c => c,
        })
        .collect();
    while normalized.len() % 4 != 0 {
        normalized.push('=');
    }
    let bytes = URL_SAFE_LENIENT.decode(normalized.as_bytes()).ok()?;
    String::from_utf8(bytes).ok()
}

/// Best-effort percent-decoding. Malformed escapes are kept as literal text.
pub(crate) fn percent_decode(input: &str) -> String {
    percent_decode_str(input).decode_utf8_lossy().into_owned()
}

/// Query parameters keyed by name, keeping the first non-empty value of each.
///
/// Parameters with an empty value count as absent.
#[derive(Debug, Default)]
pub(crate) struct QueryParams(HashMap<String, String>);

impl QueryParams {
    pub(crate) fn parse(query: &str) -> Self {
        let mut params = HashMap::new();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            if value.is_empty() {
                continue;
            }
            params.entry(key.into_owned()).or_insert_with(|| value.into_owned());
        }
        Self(params)
    }

    pub(crate) fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_list_skips_blank_and_comments() {
        let links = parse_link_list("ss://abc\n\n# note\n  trojan://x@h:1  \n");
        assert_eq!(links, vec!["ss://abc", "trojan://x@h:1"]);
    }

    #[test]
    fn base64_restores_padding_and_accepts_both_alphabets() {
        assert_eq!(decode_base64("YWVzLTI1Ni1nY206cGFzcw").as_deref(), Some("aes-256-gcm:pass"));
        assert_eq!(decode_base64("YWVzLTI1Ni1nY206cGFzcw==").as_deref(), Some("aes-256-gcm:pass"));
        // "??>" encodes to "Pz8+" in the standard alphabet and "Pz8-" in the url-safe one.
        assert_eq!(decode_base64("Pz8+").as_deref(), Some("??>"));
        assert_eq!(decode_base64("Pz8-").as_deref(), Some("??>"));
    }

    #[test]
    fn base64_rejects_plain_text() {
        assert_eq!(decode_base64("aes-256-gcm:pass"), None);
    }

    #[test]
    fn percent_decode_is_lossy_not_fatal() {
        assert_eq!(percent_decode("My%20Node"), "My Node");
        assert_eq!(percent_decode("bad%zzescape%"), "bad%zzescape%");
    }

    #[test]
    fn query_keeps_first_non_empty_value() {
        let q = QueryParams::parse("path=&host=a.com&host=b.com&type=ws");
        assert_eq!(q.get("path"), None);
        assert_eq!(q.get("host"), Some("a.com"));
        assert_eq!(q.get("type"), Some("ws"));
    }
}

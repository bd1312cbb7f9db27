//! sing-box configuration template and the outbound merger.

use crate::outbound::Outbound;

use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::str::FromStr;

/// Selector groups rewritten by a merge unless configured otherwise.
pub const DEFAULT_SELECTOR_TAGS: [&str; 3] = ["Internet", "Best Latency", "Lock Region ID"];

/// One entry of the template's `outbounds` list.
///
/// Kept as the raw JSON object so unknown fields and key order survive a merge.
/// Only the tag and the member list are interpreted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateOutbound(Map<String, Value>);

impl TemplateOutbound {
    /// Template entry for a verified outbound, without its test hints.
    pub fn from_outbound(outbound: &Outbound) -> Result<Self, serde_json::Error> {
        serde_json::to_value(outbound.public_view()).and_then(serde_json::from_value)
    }

    pub fn tag(&self) -> Option<&str> {
        self.0.get("tag").and_then(Value::as_str)
    }

    /// Member tags of a group entry, stored under `outbounds` in the document.
    pub fn members(&self) -> impl Iterator<Item = &str> {
        self.0
            .get("outbounds")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
    }

    /// Replace the member list, keeping the field's position when it already exists.
    pub fn set_members(&mut self, members: Vec<String>) {
        self.0.insert("outbounds".to_string(), Value::from(members));
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// A sing-box configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigTemplate {
    #[serde(default)]
    pub outbounds: Vec<TemplateOutbound>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl ConfigTemplate {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn to_string_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl FromStr for ConfigTemplate {
    type Err = serde_json::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(s)
    }
}

/// Fold verified outbounds into the template's outbound list.
///
/// The result is the selector groups in template order with their members
/// rewritten, then the verified outbounds, then every other template entry
/// whose tag does not clash with a verified one.
pub fn merge(
    template: &ConfigTemplate,
    tagged: &[Outbound],
    selector_tags: &[String],
) -> Result<Vec<TemplateOutbound>, serde_json::Error> {
    let is_selector = |tag: Option<&str>| tag.is_some_and(|t| selector_tags.iter().any(|s| s == t));
    let new_tags: Vec<&str> = tagged.iter().map(|ob| ob.tag.as_str()).collect();
    let new_tag_set: HashSet<&str> = new_tags.iter().copied().collect();

    let mut merged = Vec::with_capacity(template.outbounds.len() + tagged.len());

    for entry in template.outbounds.iter().filter(|e| is_selector(e.tag())) {
        let mut selector = entry.clone();
        let kept = entry
            .members()
            .filter(|m| !is_selector(Some(*m)) && !new_tag_set.contains(*m))
            .map(str::to_string);
        let members = new_tags.iter().map(|t| t.to_string()).chain(kept).collect();
        selector.set_members(members);
        merged.push(selector);
    }

    for outbound in tagged {
        merged.push(TemplateOutbound::from_outbound(outbound)?);
    }

    merged.extend(
        template
            .outbounds
            .iter()
            .filter(|e| !is_selector(e.tag()))
            .filter(|e| e.tag().map_or(true, |t| !new_tag_set.contains(t)))
            .cloned(),
    );

    warn_duplicate_tags(&merged);
    Ok(merged)
}

fn warn_duplicate_tags(outbounds: &[TemplateOutbound]) {
    let mut seen = HashSet::new();
    for tag in outbounds.iter().filter_map(TemplateOutbound::tag) {
        if !seen.insert(tag) {
            warn!("Merged outbounds contain duplicate tag {:?}", tag);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbound::{Credentials, TestHints};
    use serde_json::json;

    fn selectors() -> Vec<String> {
        DEFAULT_SELECTOR_TAGS.iter().map(|s| s.to_string()).collect()
    }

    fn tagged(tag: &str) -> Outbound {
        Outbound {
            tag: tag.to_string(),
            server: "1.2.3.4".into(),
            server_port: 443,
            credentials: Credentials::Trojan {
                password: "pw".into(),
            },
            tls: None,
            transport: None,
            hints: TestHints::new("cdn.example.com", "/1.2.3.4-443"),
        }
    }

    fn template() -> ConfigTemplate {
        serde_json::from_value(json!({
            "log": {"level": "info"},
            "outbounds": [
                {"type": "selector", "tag": "Internet", "outbounds": ["manual-route", "Best Latency"], "default": "manual-route"},
                {"type": "urltest", "tag": "Best Latency", "outbounds": ["old-node1"], "url": "https://www.gstatic.com/generate_204"},
                {"type": "direct", "tag": "manual-route"},
                {"type": "trojan", "tag": "🇸🇬 ORG1", "server": "9.9.9.9", "server_port": 443, "password": "stale"},
                {"type": "block", "tag": "block"}
            ],
            "route": {"final": "Internet"}
        }))
        .unwrap()
    }

    fn tags(outbounds: &[TemplateOutbound]) -> Vec<&str> {
        outbounds.iter().filter_map(TemplateOutbound::tag).collect()
    }

    fn members(entry: &TemplateOutbound) -> Vec<&str> {
        entry.members().collect()
    }

    #[test]
    fn selector_members_prepend_new_tags() {
        let merged = merge(&template(), &[tagged("🇸🇬 ORG1")], &selectors()).unwrap();
        assert_eq!(members(&merged[0]), ["🇸🇬 ORG1", "manual-route"]);
        assert_eq!(members(&merged[1]), ["🇸🇬 ORG1", "old-node1"]);
        assert_eq!(merged[0].fields()["default"], "manual-route");
    }

    #[test]
    fn order_and_eviction() {
        let template = template();
        let new = [tagged("🇸🇬 ORG1"), tagged("🇸🇬 ORG2")];
        let merged = merge(&template, &new, &selectors()).unwrap();
        assert_eq!(
            tags(&merged),
            vec!["Internet", "Best Latency", "🇸🇬 ORG1", "🇸🇬 ORG2", "manual-route", "block"]
        );
        // 2 selectors + 2 verified + 2 remaining others
        assert_eq!(merged.len(), 2 + new.len() + 2);
        assert_eq!(merged[2].fields()["password"], "pw");
    }

    #[test]
    fn hints_are_not_emitted() {
        let merged = merge(&template(), &[tagged("n1")], &selectors()).unwrap();
        let value = serde_json::to_value(&merged[2]).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj["type"], "trojan");
        assert!(!obj.contains_key("ws_host"));
        assert!(!obj.contains_key("hints"));
        assert!(!obj.contains_key("path"));
        assert!(!obj.contains_key("outbounds"));
    }

    #[test]
    fn others_tail_is_stable_across_runs() {
        let new = [tagged("n1")];
        let mut config = template();
        let first = merge(&config, &new, &selectors()).unwrap();
        config.outbounds = first.clone();
        let second = merge(&config, &new, &selectors()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first[3..], second[3..]);
    }

    #[test]
    fn empty_run_keeps_utility_members() {
        let merged = merge(&template(), &[], &selectors()).unwrap();
        assert_eq!(members(&merged[0]), ["manual-route"]);
        assert_eq!(merged.len(), template().outbounds.len());
    }

    #[test]
    fn template_round_trip_keeps_unknown_fields() {
        let text = r#"{"dns":{"servers":[]},"outbounds":[{"tag":"direct","type":"direct"}],"experimental":{}}"#;
        let config: ConfigTemplate = text.parse().unwrap();
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["dns"], json!({"servers": []}));
        assert_eq!(value["experimental"], json!({}));
        assert_eq!(value["outbounds"][0], json!({"tag": "direct", "type": "direct"}));
    }

    #[test]
    fn untagged_entries_survive() {
        let config: ConfigTemplate =
            serde_json::from_value(json!({"outbounds": [{"type": "dns"}]})).unwrap();
        let merged = merge(&config, &[tagged("n1")], &selectors()).unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[1].tag(), None);
    }

    #[test]
    fn duplicate_generated_tags_are_kept() {
        let merged = merge(&template(), &[tagged("AS111"), tagged("AS111")], &selectors()).unwrap();
        assert_eq!(members(&merged[0]), ["AS111", "AS111", "manual-route"]);
        assert_eq!(tags(&merged[2..4]), ["AS111", "AS111"]);
    }

    #[test]
    fn entries_keep_their_key_order() {
        let text = r#"{"outbounds":[{"type":"selector","outbounds":["manual-route"],"tag":"Internet","default":"manual-route"},{"type":"direct","tag":"manual-route"}]}"#;
        let config: ConfigTemplate = text.parse().unwrap();
        let merged = merge(&config, &[tagged("n1")], &selectors()).unwrap();

        assert_eq!(
            serde_json::to_string(&merged[0]).unwrap(),
            r#"{"type":"selector","outbounds":["n1","manual-route"],"tag":"Internet","default":"manual-route"}"#
        );
        assert_eq!(
            serde_json::to_string(&merged[2]).unwrap(),
            r#"{"type":"direct","tag":"manual-route"}"#
        );
    }

    #[test]
    fn selector_without_members_gains_them() {
        let config: ConfigTemplate =
            serde_json::from_value(json!({"outbounds": [{"type": "selector", "tag": "Internet"}]})).unwrap();
        let merged = merge(&config, &[tagged("n1")], &selectors()).unwrap();
        assert_eq!(members(&merged[0]), ["n1"]);
        assert_eq!(merged[0].fields().keys().last().map(String::as_str), Some("outbounds"));
    }
}

//! Unique display tags for verified outbounds.

use crate::geoip::{country_flag, UNKNOWN};
use crate::probe::ProbeResult;
use std::collections::HashMap;

/// Tag without its counter: flag followed by provider, country or address.
pub fn base_tag(provider: &str, country: &str, tested_ip: &str) -> String {
    let label = if provider != UNKNOWN {
        provider
    } else if country != UNKNOWN {
        country
    } else {
        tested_ip
    };
    format!("{} {}", country_flag(country), label)
        .trim()
        .to_string()
}

/// Hands out `base1`, `base2`, ... for repeated base tags within one run.
#[derive(Debug, Default)]
pub struct TagAssigner {
    counts: HashMap<String, usize>,
}

impl TagAssigner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next tag for `base`. The counter is always appended, without a separator,
    /// so distinct bases can still meet (`AS1` + `11` and `AS11` + `1` both read `AS111`).
    pub fn next_tag(&mut self, base: &str) -> String {
        let count = self.counts.entry(base.to_string()).or_insert(0);
        *count += 1;
        format!("{}{}", base, count)
    }

    /// Tag for a verified outbound's test result.
    pub fn assign(&mut self, result: &ProbeResult) -> String {
        self.next_tag(&base_tag(&result.provider, &result.country, &result.tested_ip))
    }
}

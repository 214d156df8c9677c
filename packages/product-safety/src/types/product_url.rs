//! Product URL helpers: canonical form, fingerprint, retailer name.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

/// Known Amazon storefronts, most specific host suffix first.
const AMAZON_RETAILERS: &[(&str, &str)] = &[
    ("amazon.com.au", "Amazon.com.au"),
    ("amazon.co.uk", "Amazon.co.uk"),
    ("amazon.co.jp", "Amazon.co.jp"),
    ("amazon.com", "Amazon.com"),
    ("amazon.ca", "Amazon.ca"),
    ("amazon.de", "Amazon.de"),
    ("amazon.fr", "Amazon.fr"),
    ("amazon.it", "Amazon.it"),
    ("amazon.es", "Amazon.es"),
];

/// Canonical string form of a product URL.
///
/// Absolute URLs go through `url::Url` (lowercased scheme and host,
/// default port dropped) with the fragment removed; anything else is
/// only trimmed.
pub fn canonical_url(raw: &str) -> String {
    let trimmed = raw.trim();
    match Url::parse(trimmed) {
        Ok(mut url) => {
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => trimmed.to_string(),
    }
}

/// Retailer display name for a product URL.
pub fn retailer_for(raw: &str) -> String {
    let Ok(url) = Url::parse(raw.trim()) else {
        return "Unknown".to_string();
    };
    let Some(host) = url.host_str() else {
        return "Unknown".to_string();
    };
    let host = host.trim_start_matches("www.");

    AMAZON_RETAILERS
        .iter()
        .find(|(suffix, _)| host == *suffix || host.ends_with(&format!(".{}", suffix)))
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| host.to_string())
}

/// Stable SHA-256 identity of a product URL.
///
/// Used as the cache key for analyses and review insights. The same URL
/// always yields the same fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint of a product URL.
    pub fn of(url: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(canonical_url(url).as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Wrap an existing hex digest (e.g. read back from storage).
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 16 characters, for log lines.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(16) {
            Some((end, _)) => &self.0[..end],
            None => &self.0,
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

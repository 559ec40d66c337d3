//! Hidden-service address validation.
//!
//! An address is accepted when it is an absolute `http`/`https` URL whose
//! host ends in a well-formed `.onion` service label (16 characters for v2,
//! 56 for v3, base32 alphabet) and whose length stays under the configured
//! bound. Nothing is canonicalized: the accepted string is the entry.

use crate::error::{Error, Result};
use url::Url;

pub const ONION_SUFFIX: &str = ".onion";

const V2_LABEL_LEN: usize = 16;
const V3_LABEL_LEN: usize = 56;

#[derive(Debug, Clone)]
pub struct AddressRules {
    max_length: usize,
    skip_extensions: Vec<String>,
}

impl AddressRules {
    pub fn new(max_length: usize, skip_extensions: &[String]) -> Self {
        Self {
            max_length,
            skip_extensions: skip_extensions
                .iter()
                .map(|ext| ext.to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn validate(&self, url: &str) -> Result<Url> {
        let reject = |reason: &str| Error::Address {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        if url.len() > self.max_length {
            return Err(reject("exceeds maximum length"));
        }

        let parsed = Url::parse(url).map_err(|e| reject(&e.to_string()))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(reject("unsupported scheme"));
        }

        let host = parsed.host_str().ok_or_else(|| reject("missing host"))?;
        let service = host
            .strip_suffix(ONION_SUFFIX)
            .and_then(|rest| rest.rsplit('.').next())
            .ok_or_else(|| reject("not a hidden-service host"))?;

        if !is_service_label(service) {
            return Err(reject("malformed service label"));
        }

        Ok(parsed)
    }

    pub fn is_valid(&self, url: &str) -> bool {
        self.validate(url).is_ok()
    }

    pub fn is_skippable(&self, url: &str) -> bool {
        let lower = url.to_ascii_lowercase();
        self.skip_extensions.iter().any(|ext| lower.ends_with(ext))
    }
}

fn is_service_label(label: &str) -> bool {
    (label.len() == V2_LABEL_LEN || label.len() == V3_LABEL_LEN)
        && label
            .bytes()
            .all(|b| b.is_ascii_lowercase() || (b'2'..=b'7').contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    const V3: &str = "http://jaz45aabn5vkemy4jkg4mi4syheisqn2wn2n4fsuitpccdackjwxplad.onion/";

    fn rules() -> AddressRules {
        AddressRules::new(2048, &[".pdf".to_string(), ".JPG".to_string()])
    }

    #[test]
    fn test_accepts_v3_and_v2_addresses() {
        let rules = rules();
        assert!(rules.is_valid(V3));
        assert!(rules.is_valid("https://expyuzz4wqqyqhjn.onion/index.html"));
        assert!(rules.is_valid("http://www.expyuzz4wqqyqhjn.onion/"));
    }

    #[test]
    fn test_rejects_clearnet_and_bad_labels() {
        let rules = rules();
        assert!(!rules.is_valid("https://example.com/"));
        assert!(!rules.is_valid("http://short.onion/"));
        assert!(!rules.is_valid("http://expyuzz4wqqyqhj1.onion/"));
        assert!(!rules.is_valid("ftp://expyuzz4wqqyqhjn.onion/"));
        assert!(!rules.is_valid("expyuzz4wqqyqhjn.onion"));
    }

    #[test]
    fn test_rejects_oversized_address() {
        let rules = AddressRules::new(40, &[]);
        let long = format!("{}{}", V3, "a".repeat(10));
        match rules.validate(&long) {
            Err(Error::Address { reason, .. }) => assert!(reason.contains("length")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_skip_extensions_are_case_insensitive() {
        let rules = rules();
        assert!(rules.is_skippable("http://expyuzz4wqqyqhjn.onion/report.PDF"));
        assert!(rules.is_skippable("http://expyuzz4wqqyqhjn.onion/cat.jpg"));
        assert!(!rules.is_skippable("http://expyuzz4wqqyqhjn.onion/page.html"));
    }
}

//! Device signature resolution.
//!
//! A signature is the captured fingerprint when the login event carries one,
//! otherwise a coarse browser bucket derived from the User-Agent. The network
//! address is never part of it: rotating IPs would make every login look new.
//!
//! The User-Agent buckets are a deterministic heuristic, not a stable contract.

use std::collections::HashMap;
use std::fmt;

use super::capture::FINGERPRINT_NOTE;

const FINGERPRINT_DESCRIPTOR_CHARS: usize = 10;
const OTHER_BUCKET_CHARS: usize = 40;

/// Non-blank string identifying a device/browser combination.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceSignature(String);

impl DeviceSignature {
    /// Returns `None` for empty or whitespace-only input.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            None
        } else {
            Some(Self(value))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureSource {
    Fingerprint,
    UserAgent,
}

impl SignatureSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fingerprint => "Fingerprint",
            Self::UserAgent => "UserAgent",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSignature {
    pub signature: DeviceSignature,
    pub source: SignatureSource,
    /// Human readable device description used in notifications.
    pub device_info: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("cannot identify device: fingerprint and User-Agent are both missing")]
    Unidentified,
}

/// Derive the signature for a login event.
///
/// `user_agent` comes from the request being handled, not from the event.
///
/// # Errors
/// Returns `ResolveError::Unidentified` when neither source is usable.
pub fn resolve(
    details: &HashMap<String, String>,
    user_agent: Option<&str>,
) -> Result<ResolvedSignature, ResolveError> {
    let fingerprint = details
        .get(FINGERPRINT_NOTE)
        .and_then(|value| DeviceSignature::new(value.as_str()));
    if let Some(signature) = fingerprint {
        let shown: String = signature
            .as_str()
            .chars()
            .take(FINGERPRINT_DESCRIPTOR_CHARS)
            .collect();
        return Ok(ResolvedSignature {
            device_info: format!("Browser Fingerprint: [{shown}...]"),
            signature,
            source: SignatureSource::Fingerprint,
        });
    }

    let user_agent = user_agent
        .filter(|ua| !ua.trim().is_empty())
        .ok_or(ResolveError::Unidentified)?;
    let signature =
        DeviceSignature::new(normalize_user_agent(user_agent)).ok_or(ResolveError::Unidentified)?;

    Ok(ResolvedSignature {
        signature,
        source: SignatureSource::UserAgent,
        device_info: format!("Browser/OS: {user_agent}"),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserFamily {
    Firefox,
    Chrome,
    Safari,
    Edge,
    InternetExplorer,
}

impl BrowserFamily {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Firefox => "UA_Firefox",
            Self::Chrome => "UA_Chrome",
            Self::Safari => "UA_Safari",
            Self::Edge => "UA_Edge",
            Self::InternetExplorer => "UA_IE",
        }
    }

    /// Classify a User-Agent, case-insensitively. Order of checks matters:
    /// Edge and Chrome both advertise `Safari/`, Edge also advertises `Chrome/`.
    #[must_use]
    pub fn classify(user_agent: &str) -> Option<Self> {
        let ua = user_agent.to_lowercase();
        let edge = ua.contains("edg/");
        let chrome = ua.contains("chrome/");

        if ua.contains("firefox/") {
            Some(Self::Firefox)
        } else if chrome && !edge {
            Some(Self::Chrome)
        } else if ua.contains("safari/") && !chrome && !edge {
            Some(Self::Safari)
        } else if edge {
            Some(Self::Edge)
        } else if ua.contains("msie") || ua.contains("trident") {
            Some(Self::InternetExplorer)
        } else {
            None
        }
    }
}

/// Bucket label for a User-Agent. Unrecognized agents fall back to
/// `UA_Other_` plus the first 40 characters with non-alphanumerics as `_`.
#[must_use]
pub fn normalize_user_agent(user_agent: &str) -> String {
    if let Some(family) = BrowserFamily::classify(user_agent) {
        return family.label().to_string();
    }

    let sanitized: String = user_agent
        .chars()
        .take(OTHER_BUCKET_CHARS)
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("UA_Other_{sanitized}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIREFOX_115: &str =
        "Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/115.0";
    const FIREFOX_120: &str =
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:120.0) Gecko/20100101 Firefox/120.0";
    const CHROME: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const EDGE: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.2210.91";
    const SAFARI: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_2) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15";
    const IE11: &str = "Mozilla/5.0 (Windows NT 10.0; WOW64; Trident/7.0; rv:11.0) like Gecko";

    fn details(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn blank_signatures_are_rejected() {
        assert!(DeviceSignature::new("").is_none());
        assert!(DeviceSignature::new(" \t").is_none());
        assert_eq!(
            DeviceSignature::new("fp").map(|s| s.to_string()),
            Some("fp".to_string())
        );
    }

    #[test]
    fn fingerprint_is_used_verbatim() {
        for fingerprint in ["fp-abc123", " padded ", "Ünïcödé-hash", "a"] {
            let resolved = resolve(&details(&[(FINGERPRINT_NOTE, fingerprint)]), Some(CHROME));
            let resolved = resolved.ok();
            assert_eq!(
                resolved.as_ref().map(|r| r.signature.as_str()),
                Some(fingerprint)
            );
            assert_eq!(
                resolved.map(|r| r.source),
                Some(SignatureSource::Fingerprint)
            );
        }
    }

    #[test]
    fn fingerprint_descriptor_shows_prefix() {
        let resolved = resolve(&details(&[(FINGERPRINT_NOTE, "0123456789abcdef")]), None);
        assert_eq!(
            resolved.ok().map(|r| r.device_info),
            Some("Browser Fingerprint: [0123456789...]".to_string())
        );
    }

    #[test]
    fn blank_fingerprint_falls_back_to_user_agent() {
        let resolved = resolve(&details(&[(FINGERPRINT_NOTE, "  ")]), Some(FIREFOX_115)).ok();
        assert_eq!(
            resolved.as_ref().map(|r| r.signature.as_str()),
            Some("UA_Firefox")
        );
        assert_eq!(
            resolved.map(|r| r.device_info),
            Some(format!("Browser/OS: {FIREFOX_115}"))
        );
    }

    #[test]
    fn nothing_to_resolve_is_an_error() {
        assert_eq!(
            resolve(&HashMap::new(), None),
            Err(ResolveError::Unidentified)
        );
        assert_eq!(
            resolve(&HashMap::new(), Some("   ")),
            Err(ResolveError::Unidentified)
        );
    }

    #[test]
    fn browser_buckets() {
        assert_eq!(normalize_user_agent(FIREFOX_115), "UA_Firefox");
        assert_eq!(normalize_user_agent(CHROME), "UA_Chrome");
        assert_eq!(normalize_user_agent(EDGE), "UA_Edge");
        assert_eq!(normalize_user_agent(SAFARI), "UA_Safari");
        assert_eq!(normalize_user_agent(IE11), "UA_IE");
        assert_eq!(
            normalize_user_agent("Mozilla/4.0 (compatible; MSIE 8.0)"),
            "UA_IE"
        );
    }

    #[test]
    fn chrome_is_detected_regardless_of_case() {
        let upper = CHROME.to_uppercase();
        let lower = CHROME.to_lowercase();
        for ua in [CHROME, upper.as_str(), lower.as_str(), "x cHrOmE/1 y"] {
            assert_eq!(BrowserFamily::classify(ua), Some(BrowserFamily::Chrome));
        }
    }

    #[test]
    fn firefox_versions_share_a_bucket() {
        assert_eq!(
            normalize_user_agent(FIREFOX_115),
            normalize_user_agent(FIREFOX_120)
        );
    }

    #[test]
    fn unknown_agents_get_sanitized_prefix() {
        assert_eq!(normalize_user_agent("curl/8.4.0"), "UA_Other_curl_8_4_0");

        let long = "Some-Bot/1.0 (+https://example.com/bot-information-page)";
        let bucket = normalize_user_agent(long);
        assert_eq!(bucket, "UA_Other_Some_Bot_1_0___https___example_com_bot_i");
        assert_eq!(bucket.len(), "UA_Other_".len() + 40);
    }

    #[test]
    fn classification_is_deterministic() {
        let ua = "Weird Agent ☃ 1.0";
        assert_eq!(normalize_user_agent(ua), normalize_user_agent(ua));
        assert_eq!(normalize_user_agent(ua), "UA_Other_Weird_Agent___1_0");
    }
}

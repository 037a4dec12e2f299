//! Caller identity captured from the transport layer.
//!
//! An [`Origin`] is built once, at connect time, from what the transport
//! reports (the WebSocket `Origin` header, or the embedding host for
//! in-process channels). Nothing inside a message payload can produce or
//! alter one.

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Schemes a dApp page or wallet extension context can legitimately carry.
pub const ALLOWED_SCHEMES: &[&str] = &["http", "https", "chrome-extension", "moz-extension"];

/// Maximum accepted length of a display hint (favicon URL).
pub const MAX_DISPLAY_HINT_LEN: usize = 2048;

/// Reasons a transport-supplied origin string is unusable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OriginError {
    #[error("origin is empty")]
    Empty,
    #[error("opaque origin")]
    Opaque,
    #[error("unparseable origin: {0}")]
    Unparseable(String),
    #[error("unsupported origin scheme: {0}")]
    UnsupportedScheme(String),
    #[error("origin must not carry a path, query, fragment or credentials")]
    NotAnOrigin,
}

/// Canonical `scheme://host[:port]` identity of a requesting page.
///
/// Lowercased, default ports elided. Two origins are the same principal iff
/// their canonical strings are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Origin(String);

impl Origin {
    /// Parse and canonicalise a transport-supplied origin.
    pub fn parse(raw: &str) -> Result<Self, OriginError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(OriginError::Empty);
        }
        if raw.eq_ignore_ascii_case("null") {
            return Err(OriginError::Opaque);
        }

        let url = Url::parse(raw).map_err(|e| OriginError::Unparseable(e.to_string()))?;
        let scheme = url.scheme();
        if !ALLOWED_SCHEMES.contains(&scheme) {
            return Err(OriginError::UnsupportedScheme(scheme.to_string()));
        }

        let has_path = !(url.path().is_empty() || url.path() == "/");
        if has_path
            || url.query().is_some()
            || url.fragment().is_some()
            || !url.username().is_empty()
            || url.password().is_some()
        {
            return Err(OriginError::NotAnOrigin);
        }

        // Non-special schemes (extension ids) keep their host case in `url`.
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or(OriginError::Opaque)?
            .to_ascii_lowercase();

        let canonical = match url.port() {
            Some(port) => format!("{}://{}:{}", scheme, host, port),
            None => format!("{}://{}", scheme, host),
        };
        Ok(Self(canonical))
    }

    /// Canonical string form
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Origin {
    type Error = OriginError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Origin::parse(&value)
    }
}

impl From<Origin> for String {
    fn from(origin: Origin) -> Self {
        origin.0
    }
}

/// Optional icon shown next to the origin in the approval UI.
///
/// Purely cosmetic; never used for any authorization decision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DisplayHint(String);

impl DisplayHint {
    /// Accept `http(s)` or inline `data:image/` URLs of bounded length.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() || raw.len() > MAX_DISPLAY_HINT_LEN {
            return None;
        }
        if raw.chars().any(char::is_control) {
            return None;
        }
        let lower = raw.to_ascii_lowercase();
        let acceptable = lower.starts_with("https://")
            || lower.starts_with("http://")
            || lower.starts_with("data:image/");
        acceptable.then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DisplayHint {
    type Error = &'static str;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        DisplayHint::parse(&value).ok_or("unacceptable display hint")
    }
}

impl From<DisplayHint> for String {
    fn from(hint: DisplayHint) -> Self {
        hint.0
    }
}

/// Who is calling: the immutable identity a connection was accepted with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub origin: Origin,
    pub display_hint: Option<DisplayHint>,
}

impl Caller {
    pub fn new(origin: Origin, display_hint: Option<DisplayHint>) -> Self {
        Self {
            origin,
            display_hint,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_canonical_forms() {
        let cases = [
            ("https://dapp.example", "https://dapp.example"),
            ("https://dapp.example/", "https://dapp.example"),
            ("HTTPS://DApp.Example", "https://dapp.example"),
            ("https://dapp.example:443", "https://dapp.example"),
            ("http://localhost:8080", "http://localhost:8080"),
            ("http://127.0.0.1", "http://127.0.0.1"),
            ("chrome-extension://AbCdEf", "chrome-extension://abcdef"),
        ];
        for (raw, expected) in cases {
            assert_eq!(Origin::parse(raw).unwrap().as_str(), expected, "{}", raw);
        }
    }

    #[test]
    fn test_rejects_unusable_origins() {
        assert_eq!(Origin::parse(""), Err(OriginError::Empty));
        assert_eq!(Origin::parse("   "), Err(OriginError::Empty));
        assert_eq!(Origin::parse("null"), Err(OriginError::Opaque));
        assert!(matches!(
            Origin::parse("dapp.example"),
            Err(OriginError::Unparseable(_))
        ));
        assert!(matches!(
            Origin::parse("file:///etc/passwd"),
            Err(OriginError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            Origin::parse("javascript:alert(1)"),
            Err(OriginError::UnsupportedScheme(_))
        ));
        assert_eq!(
            Origin::parse("https://dapp.example/wallet"),
            Err(OriginError::NotAnOrigin)
        );
        assert_eq!(
            Origin::parse("https://dapp.example?x=1"),
            Err(OriginError::NotAnOrigin)
        );
        assert_eq!(
            Origin::parse("https://user:pw@dapp.example"),
            Err(OriginError::NotAnOrigin)
        );
    }

    #[test]
    fn test_distinct_ports_are_distinct_origins() {
        let a = Origin::parse("http://localhost:3000").unwrap();
        let b = Origin::parse("http://localhost:3001").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_origin_serde_validates() {
        let origin: Origin = serde_json::from_str("\"https://dapp.example\"").unwrap();
        assert_eq!(origin.as_str(), "https://dapp.example");
        assert!(serde_json::from_str::<Origin>("\"null\"").is_err());
    }

    #[test]
    fn test_display_hint_rules() {
        assert!(DisplayHint::parse("https://dapp.example/favicon.ico").is_some());
        assert!(DisplayHint::parse("data:image/png;base64,AAAA").is_some());
        assert!(DisplayHint::parse("javascript:alert(1)").is_none());
        assert!(DisplayHint::parse("").is_none());
        assert!(DisplayHint::parse("https://a.example/\nx").is_none());
        let long = format!("https://a.example/{}", "x".repeat(MAX_DISPLAY_HINT_LEN));
        assert!(DisplayHint::parse(&long).is_none());
    }

    proptest! {
        #[test]
        fn prop_canonicalisation_is_idempotent(
            host in "[a-z][a-z0-9]{0,12}(\\.[a-z]{2,6})?",
            port in proptest::option::of(1024u16..65535),
        ) {
            let raw = match port {
                Some(p) => format!("https://{}:{}", host, p),
                None => format!("https://{}", host),
            };
            let once = Origin::parse(&raw).unwrap();
            let twice = Origin::parse(once.as_str()).unwrap();
            prop_assert_eq!(&once, &twice);

            let shouted = Origin::parse(&raw.to_ascii_uppercase()).unwrap();
            prop_assert_eq!(once, shouted);
        }
    }
}

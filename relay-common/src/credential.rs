//! Normalization of the caller's authentication token.
//!
//! Two textual encodings are accepted: a query-string triple
//! (`id=..&signature=..&loginPhrase=..`) and a colon-joined triple
//! (`id:signature:loginPhrase`, where the login phrase may itself contain
//! colons). Nodes receive the credential as a JSON object in a header.

use crate::error::{RelayError, Result};
use chrono::{DateTime, Duration, Utc};
use percent_encoding::percent_decode_str;

/// Header every node reads the credential from.
pub const AUTH_HEADER: &str = "zelidauth";

/// A credential is expired once its login phrase is older than this.
pub const MAX_CREDENTIAL_AGE_MINUTES: i64 = 90;

/// Number of leading login-phrase characters holding the issue timestamp.
const TIMESTAMP_DIGITS: usize = 13;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub id: String,
    pub signature: String,
    pub login_phrase: String,
}

impl Credential {
    pub fn new(
        id: impl Into<String>,
        signature: impl Into<String>,
        login_phrase: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            signature: signature.into(),
            login_phrase: login_phrase.into(),
        }
    }

    /// Query-string decoding first, colon splitting second.
    pub fn normalize(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(RelayError::InvalidCredential("empty credential".into()));
        }

        Self::from_query(raw)
            .or_else(|| Self::from_colon_triple(raw))
            .ok_or_else(|| {
                RelayError::InvalidCredential(
                    "expected id, signature and loginPhrase".into(),
                )
            })
    }

    fn from_query(raw: &str) -> Option<Self> {
        let query = raw.strip_prefix('?').unwrap_or(raw);
        let mut id = None;
        let mut signature = None;
        let mut login_phrase = None;

        for pair in query.split('&') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            let Some(value) = form_decode(value) else {
                continue;
            };
            match form_decode(key).as_deref() {
                Some("id") | Some("zelid") => id = Some(value),
                Some("signature") => signature = Some(value),
                Some("loginPhrase") => login_phrase = Some(value),
                _ => {}
            }
        }

        match (id, signature, login_phrase) {
            (Some(id), Some(signature), Some(login_phrase))
                if !id.is_empty() && !signature.is_empty() && !login_phrase.is_empty() =>
            {
                Some(Self::new(id, signature, login_phrase))
            }
            _ => None,
        }
    }

    fn from_colon_triple(raw: &str) -> Option<Self> {
        let mut parts = raw.splitn(3, ':');
        let id = parts.next().filter(|s| !s.is_empty())?;
        let signature = parts.next().filter(|s| !s.is_empty())?;
        let login_phrase = parts.next().filter(|s| !s.is_empty())?;
        Some(Self::new(id, signature, login_phrase))
    }

    /// Issue time embedded in the first 13 characters of the login phrase.
    pub fn issued_at_millis(&self) -> Option<i64> {
        let prefix: String = self.login_phrase.chars().take(TIMESTAMP_DIGITS).collect();
        prefix.parse::<i64>().ok().filter(|millis| *millis > 0)
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.is_valid_for(now, Duration::minutes(MAX_CREDENTIAL_AGE_MINUTES))
    }

    /// Fails closed: an unreadable or non-positive timestamp is expired.
    pub fn is_valid_for(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        match self.issued_at_millis() {
            Some(issued) => now.timestamp_millis() - issued <= max_age.num_milliseconds(),
            None => false,
        }
    }

    pub fn to_wire_header(&self) -> String {
        serde_json::json!({
            "zelid": self.id,
            "signature": self.signature,
            "loginPhrase": self.login_phrase,
        })
        .to_string()
    }
}

/// Header value for a raw credential; unparsable input is passed through
/// unchanged since some nodes accept it as-is.
pub fn wire_header(raw: &str) -> String {
    match Credential::normalize(raw) {
        Ok(credential) => credential.to_wire_header(),
        Err(_) => raw.to_string(),
    }
}

fn form_decode(value: &str) -> Option<String> {
    let spaced = value.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .ok()
        .map(|decoded| decoded.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const ISSUED: i64 = 1_700_000_000_000;

    fn phrase() -> String {
        format!("{}x9k2lq0e:extra", ISSUED)
    }

    fn header_fields(header: &str) -> serde_json::Value {
        serde_json::from_str(header).unwrap()
    }

    #[test]
    fn test_normalize_query_string() {
        let raw = format!("id=1Abc&signature=H%2Fsig%3D%3D&loginPhrase={}", phrase());
        let cred = Credential::normalize(&raw).unwrap();
        assert_eq!(cred.id, "1Abc");
        assert_eq!(cred.signature, "H/sig==");
        assert_eq!(cred.login_phrase, phrase());

        let wire = header_fields(&cred.to_wire_header());
        assert_eq!(wire["zelid"], "1Abc");
        assert_eq!(wire["signature"], "H/sig==");
        assert_eq!(wire["loginPhrase"], phrase());
        assert_eq!(wire.as_object().unwrap().len(), 3);
    }

    #[test]
    fn test_normalize_colon_triple_keeps_colons_in_phrase() {
        let raw = format!("1Abc:sig==:{}", phrase());
        let cred = Credential::normalize(&raw).unwrap();
        assert_eq!(cred.id, "1Abc");
        assert_eq!(cred.signature, "sig==");
        assert_eq!(cred.login_phrase, phrase());
    }

    #[test]
    fn test_partial_query_falls_back_to_colon_split() {
        // query form is missing loginPhrase, so the colon split wins
        let cred = Credential::normalize("id=a:b:c").unwrap();
        assert_eq!(cred.id, "id=a");
        assert_eq!(cred.signature, "b");
        assert_eq!(cred.login_phrase, "c");
    }

    #[test]
    fn test_normalize_rejects_incomplete_input() {
        for raw in ["", "   ", "onlyone", "two:parts", "id=a&signature=b", "a::c"] {
            let err = Credential::normalize(raw).unwrap_err();
            assert!(matches!(err, RelayError::InvalidCredential(_)), "{raw}");
        }
    }

    #[test]
    fn test_zelid_alias() {
        let cred = Credential::normalize("zelid=z&signature=s&loginPhrase=p").unwrap();
        assert_eq!(cred.id, "z");
    }

    #[test]
    fn test_validity_window() {
        let cred = Credential::new("id", "sig", phrase());
        let issued = Utc.timestamp_millis_opt(ISSUED).unwrap();

        assert!(cred.is_valid(issued));
        assert!(cred.is_valid(issued + Duration::minutes(89)));
        assert!(!cred.is_valid(issued + Duration::minutes(91)));
    }

    #[test]
    fn test_validity_fails_closed() {
        let now = Utc.timestamp_millis_opt(ISSUED).unwrap();
        assert!(!Credential::new("id", "sig", "not-a-timestamp").is_valid(now));
        assert!(!Credential::new("id", "sig", "0000000000000abc").is_valid(now));
        assert!(!Credential::new("id", "sig", "-000000000001").is_valid(now));
    }

    #[test]
    fn test_wire_header_passthrough() {
        assert_eq!(wire_header("opaque-token"), "opaque-token");
        let header = wire_header(&format!("a:b:{}", phrase()));
        assert_eq!(header_fields(&header)["zelid"], "a");
    }
}

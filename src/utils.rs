//! Utility functions for payment negotiation.
//!
//! This module provides helper functions for wallet token encoding, wire date
//! handling, and locale parsing used throughout the library.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, TimeZone, Utc};

use crate::errors::Result;

/// The sentinel substituted for any wire date that fails to parse.
///
/// Callers must treat this value as "unknown/invalid", never as a real date.
pub fn distant_past() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(1, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Serde adapter for ISO-8601 UTC wire dates with the distant-past fallback.
///
/// Decoding never fails: a missing, null, or unparsable date becomes
/// [`distant_past`] instead of poisoning the whole body decode.
pub mod iso8601_sentinel {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    use super::distant_past;

    /// Deserializes an optional ISO-8601 string, substituting the sentinel.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(distant_past))
    }

    /// Serializes the date back to an ISO-8601 UTC string.
    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&date.to_rfc3339())
    }
}

/// Encodes a raw wallet authorization token as Base64 for the
/// attempt-payload body.
pub fn encode_wallet_token(token: &[u8]) -> String {
    BASE64.encode(token)
}

/// Decodes a Base64 wallet payload back into raw token bytes.
pub fn decode_wallet_token(encoded: &str) -> Result<Vec<u8>> {
    Ok(BASE64.decode(encoded.as_bytes())?)
}

/// Extracts the uppercase region code from a locale identifier.
///
/// # Examples
///
/// ```
/// use paylink_rs::utils::region_of_locale;
///
/// assert_eq!(region_of_locale("sv-SE"), Some("SE".to_string()));
/// assert_eq!(region_of_locale("en_US"), Some("US".to_string()));
/// assert_eq!(region_of_locale("sv"), None);
/// ```
pub fn region_of_locale(locale: &str) -> Option<String> {
    let region = locale.rsplit(['-', '_']).next()?;
    if region.len() == 2 && region.chars().all(|c| c.is_ascii_alphabetic()) && region != locale {
        Some(region.to_ascii_uppercase())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_wallet_token() {
        let token = b"opaque wallet token";
        let encoded = encode_wallet_token(token);
        assert!(!encoded.is_empty());

        let decoded = decode_wallet_token(&encoded).unwrap();
        assert_eq!(decoded, token);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_wallet_token("!!not base64!!").is_err());
    }

    #[test]
    fn test_distant_past_is_stable() {
        let sentinel = distant_past();
        assert_eq!(sentinel, distant_past());
        assert_eq!(sentinel.to_rfc3339(), "0001-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_sentinel_date_decoding() {
        #[derive(serde::Deserialize)]
        struct Wrapper {
            #[serde(with = "iso8601_sentinel", default = "distant_past")]
            date: chrono::DateTime<Utc>,
        }

        let ok: Wrapper = serde_json::from_str(r#"{"date": "2024-03-01T12:00:00Z"}"#).unwrap();
        assert_eq!(ok.date.to_rfc3339(), "2024-03-01T12:00:00+00:00");

        let bad: Wrapper = serde_json::from_str(r#"{"date": "not-a-date"}"#).unwrap();
        assert_eq!(bad.date, distant_past());

        let null: Wrapper = serde_json::from_str(r#"{"date": null}"#).unwrap();
        assert_eq!(null.date, distant_past());

        let missing: Wrapper = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(missing.date, distant_past());
    }

    #[test]
    fn test_region_of_locale() {
        assert_eq!(region_of_locale("sv-SE"), Some("SE".to_string()));
        assert_eq!(region_of_locale("nb-NO"), Some("NO".to_string()));
        assert_eq!(region_of_locale("en_us"), Some("US".to_string()));
        assert_eq!(region_of_locale("sv"), None);
        assert_eq!(region_of_locale(""), None);
        assert_eq!(region_of_locale("x-klingon"), None);
    }
}

//! The verification gateway: the trust boundary for inbound readings.
//!
//! Each inbound message is handled on its own. The only shared state is the
//! immutable key, so any number of messages may be verified concurrently.

use crate::core::mac::{verify, SharedKey, Tag, TAG_HEX_LEN};
use crate::core::reading::Reading;
use crate::gateway::canonical::derive;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Why a message was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Bytes could not be parsed into a reading and a tag
    MalformedPayload,
    /// Recomputed tag differs from the supplied tag
    TagMismatch,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::MalformedPayload => write!(f, "malformed payload"),
            RejectReason::TagMismatch => write!(f, "tag mismatch"),
        }
    }
}

/// A rejected message with enough context to diagnose it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    pub reason: RejectReason,
    pub detail: String,
}

impl Rejection {
    fn malformed(detail: impl Into<String>) -> Self {
        Self {
            reason: RejectReason::MalformedPayload,
            detail: detail.into(),
        }
    }
}

/// Outcome of verifying one inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accepted(Reading),
    Rejected(Rejection),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted(_))
    }

    pub fn reason(&self) -> Option<RejectReason> {
        match self {
            Verdict::Accepted(_) => None,
            Verdict::Rejected(r) => Some(r.reason),
        }
    }
}

/// The reading object exactly as received. Unknown fields are refused since
/// the field set is part of the protocol.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct InboundData {
    #[serde(rename = "tempC")]
    temp_c: f64,
    bpm: f64,
    avg_bpm: u32,
}

#[derive(Debug, Deserialize)]
struct InboundMessage {
    data: InboundData,
    hmac: String,
}

/// Verifies inbound messages against the shared key.
#[derive(Debug, Clone)]
pub struct Gateway {
    key: Arc<SharedKey>,
}

impl Gateway {
    pub fn new(key: Arc<SharedKey>) -> Self {
        Self { key }
    }

    /// Parse, re-derive, verify.
    ///
    /// Never panics and never returns an error: every input ends in a
    /// [`Verdict`].
    pub fn handle(&self, inbound: &[u8]) -> Verdict {
        let message: InboundMessage = match serde_json::from_slice(inbound) {
            Ok(m) => m,
            Err(e) => return Verdict::Rejected(Rejection::malformed(e.to_string())),
        };

        let Some(tag) = parse_tag(&message.hmac) else {
            return Verdict::Rejected(Rejection::malformed(format!(
                "hmac must be {TAG_HEX_LEN} hex characters, got {} characters",
                message.hmac.chars().count()
            )));
        };

        let InboundData {
            temp_c,
            bpm,
            avg_bpm,
        } = message.data;

        let reading = match Reading::new(temp_c, bpm, avg_bpm) {
            Ok(r) => r,
            Err(e) => return Verdict::Rejected(Rejection::malformed(e.to_string())),
        };

        let canonical = derive(temp_c, bpm, avg_bpm);
        if verify(&self.key, &canonical, &tag) {
            Verdict::Accepted(reading)
        } else {
            Verdict::Rejected(Rejection {
                reason: RejectReason::TagMismatch,
                detail: "recomputed tag does not match".to_string(),
            })
        }
    }
}

/// Wire tags are lowercase hex only.
fn parse_tag(text: &str) -> Option<Tag> {
    let lower_hex = |b: u8| b.is_ascii_digit() || (b'a'..=b'f').contains(&b);
    if text.len() != TAG_HEX_LEN || !text.bytes().all(lower_hex) {
        return None;
    }
    Tag::from_hex(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mac::sign;
    use crate::core::message::AuthenticatedMessage;

    const REFERENCE_CANONICAL: &str = r#"{"tempC":36.52,"bpm":72.3,"avg_bpm":70}"#;

    fn key() -> Arc<SharedKey> {
        Arc::new(SharedKey::from_bytes(b"gateway test shared key 0123456789").unwrap())
    }

    fn reference_payload(key: &SharedKey) -> String {
        let tag = sign(key, REFERENCE_CANONICAL.as_bytes()).to_hex();
        format!(r#"{{"data":{{"tempC":36.52,"bpm":72.3,"avg_bpm":70}},"hmac":"{tag}"}}"#)
    }

    fn flip_last_hex(payload: &str) -> String {
        // Payload ends with `<last hex char>"}`.
        let idx = payload.len() - 3;
        let last = payload.as_bytes()[idx];
        let flipped = if last == b'0' { '1' } else { '0' };
        let mut out = payload.to_string();
        out.replace_range(idx..idx + 1, &flipped.to_string());
        out
    }

    #[test]
    fn test_reference_payload_accepted() {
        let key = key();
        let gateway = Gateway::new(key.clone());
        let verdict = gateway.handle(reference_payload(&key).as_bytes());

        let expected = Reading::new(36.52, 72.3, 70).unwrap();
        assert_eq!(verdict, Verdict::Accepted(expected));
    }

    #[test]
    fn test_flipped_last_hex_char_rejected() {
        let key = key();
        let gateway = Gateway::new(key.clone());
        let tampered = flip_last_hex(&reference_payload(&key));

        assert_eq!(
            gateway.handle(tampered.as_bytes()).reason(),
            Some(RejectReason::TagMismatch)
        );
    }

    #[test]
    fn test_tampered_field_rejected() {
        let key = key();
        let gateway = Gateway::new(key.clone());
        let tampered = reference_payload(&key).replace("\"avg_bpm\":70", "\"avg_bpm\":71");

        assert_eq!(
            gateway.handle(tampered.as_bytes()).reason(),
            Some(RejectReason::TagMismatch)
        );
    }

    #[test]
    fn test_wrong_key_rejected() {
        let producer_key = SharedKey::from_bytes(b"a different key entirely!!").unwrap();
        let gateway = Gateway::new(key());

        assert_eq!(
            gateway.handle(reference_payload(&producer_key).as_bytes()).reason(),
            Some(RejectReason::TagMismatch)
        );
    }

    #[test]
    fn test_producer_message_accepted() {
        let key = key();
        let gateway = Gateway::new(key.clone());
        let reading = Reading::new(37.25, 88.4, 86).unwrap();
        let wire = AuthenticatedMessage::sign(&key, reading).to_wire();

        assert_eq!(gateway.handle(&wire), Verdict::Accepted(reading));
    }

    #[test]
    fn test_field_order_does_not_matter() {
        let key = key();
        let gateway = Gateway::new(key.clone());
        let tag = sign(&key, REFERENCE_CANONICAL.as_bytes()).to_hex();

        let shuffled = [
            format!(r#"{{"hmac":"{tag}","data":{{"avg_bpm":70,"tempC":36.52,"bpm":72.3}}}}"#),
            format!(r#"{{"data":{{"bpm":72.3,"avg_bpm":70,"tempC":36.52}},"hmac":"{tag}"}}"#),
            format!(
                "{{ \"data\" : {{ \"tempC\" : 36.520, \"avg_bpm\" : 70, \"bpm\" : 72.30 }}, \"hmac\" : \"{tag}\" }}"
            ),
        ];

        for payload in shuffled {
            assert!(gateway.handle(payload.as_bytes()).is_accepted(), "{payload}");
        }
    }

    #[test]
    fn test_malformed_payloads() {
        let gateway = Gateway::new(key());
        let tag = "ab".repeat(32);

        let cases = [
            String::new(),
            "not json".to_string(),
            "[]".to_string(),
            format!(r#"{{"hmac":"{tag}"}}"#),
            r#"{"data":{"tempC":36.52,"bpm":72.3,"avg_bpm":70}}"#.to_string(),
            format!(r#"{{"data":{{"tempC":36.52,"bpm":72.3}},"hmac":"{tag}"}}"#),
            format!(r#"{{"data":{{"tempC":"36.52","bpm":72.3,"avg_bpm":70}},"hmac":"{tag}"}}"#),
            format!(r#"{{"data":{{"tempC":36.52,"bpm":72.3,"avg_bpm":70.5}},"hmac":"{tag}"}}"#),
            format!(r#"{{"data":{{"tempC":36.52,"bpm":72.3,"avg_bpm":-1}},"hmac":"{tag}"}}"#),
            format!(
                r#"{{"data":{{"tempC":36.52,"bpm":72.3,"avg_bpm":70,"spo2":98}},"hmac":"{tag}"}}"#
            ),
            format!(r#"{{"data":{{"tempC":1e300,"bpm":72.3,"avg_bpm":70}},"hmac":"{tag}"}}"#),
            r#"{"data":{"tempC":36.52,"bpm":72.3,"avg_bpm":70},"hmac":"abc"}"#.to_string(),
            format!(
                r#"{{"data":{{"tempC":36.52,"bpm":72.3,"avg_bpm":70}},"hmac":"{}"}}"#,
                "zz".repeat(32)
            ),
            format!(
                r#"{{"data":{{"tempC":36.52,"bpm":72.3,"avg_bpm":70}},"hmac":"{}"}}"#,
                "é".repeat(32)
            ),
        ];

        for payload in cases {
            assert_eq!(
                gateway.handle(payload.as_bytes()).reason(),
                Some(RejectReason::MalformedPayload),
                "{payload}"
            );
        }
    }

    #[test]
    fn test_uppercase_tag_is_malformed() {
        let key = key();
        let gateway = Gateway::new(key.clone());
        let tag = sign(&key, REFERENCE_CANONICAL.as_bytes()).to_hex();
        let upper = reference_payload(&key).replace(&tag, &tag.to_uppercase());
        assert_ne!(tag, tag.to_uppercase());

        assert_eq!(
            gateway.handle(upper.as_bytes()).reason(),
            Some(RejectReason::MalformedPayload)
        );
    }

    #[test]
    fn test_invalid_utf8_is_malformed() {
        let gateway = Gateway::new(key());
        assert_eq!(
            gateway.handle(&[0xff, 0xfe, 0x00]).reason(),
            Some(RejectReason::MalformedPayload)
        );
    }

    #[test]
    fn test_concurrent_verification() {
        let key = key();
        let gateway = Gateway::new(key.clone());
        let good = reference_payload(&key);
        let bad = flip_last_hex(&good);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let gateway = gateway.clone();
                let payload = if i % 2 == 0 { good.clone() } else { bad.clone() };
                std::thread::spawn(move || {
                    (0..200)
                        .map(|_| gateway.handle(payload.as_bytes()).is_accepted())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            let results = handle.join().unwrap();
            assert!(results.iter().all(|&accepted| accepted == (i % 2 == 0)));
        }
    }
}

//! Authenticated messages as produced at the source.

use crate::core::canonical::{encode, CanonicalBytes};
use crate::core::mac::{sign, SharedKey, Tag};
use crate::core::reading::Reading;

/// A reading together with the tag computed over its canonical bytes.
///
/// The tag is computed once, here, and only ever compared afterwards.
#[derive(Debug, Clone)]
pub struct AuthenticatedMessage {
    data: Reading,
    canonical: CanonicalBytes,
    tag: Tag,
}

impl AuthenticatedMessage {
    /// Encode and sign a reading.
    pub fn sign(key: &SharedKey, data: Reading) -> Self {
        let canonical = encode(&data);
        let tag = sign(key, canonical.as_bytes());
        Self {
            data,
            canonical,
            tag,
        }
    }

    pub fn data(&self) -> &Reading {
        &self.data
    }

    pub fn tag(&self) -> &Tag {
        &self.tag
    }

    pub fn canonical(&self) -> &CanonicalBytes {
        &self.canonical
    }

    /// Render the wire payload `{"data":{...},"hmac":"<hex>"}`.
    ///
    /// The `data` object is the canonical text itself, so numeric formatting
    /// on the wire matches what was signed.
    pub fn to_wire(&self) -> Vec<u8> {
        let tag = self.tag.to_hex();
        let mut out = Vec::with_capacity(self.canonical.len() + tag.len() + 20);
        out.extend_from_slice(b"{\"data\":");
        out.extend_from_slice(self.canonical.as_bytes());
        out.extend_from_slice(b",\"hmac\":\"");
        out.extend_from_slice(tag.as_bytes());
        out.extend_from_slice(b"\"}");
        out
    }
}

//! HMAC-SHA-256 tags over canonical bytes.
//!
//! Tags travel as 64 lowercase hex characters. Verification recomputes the
//! tag and compares it in constant time.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Size of an authentication tag in bytes.
pub const TAG_SIZE: usize = 32;

/// Length of a tag rendered as hex.
pub const TAG_HEX_LEN: usize = TAG_SIZE * 2;

/// Shortest shared key accepted.
pub const MIN_KEY_LEN: usize = 16;

/// Environment variable that overrides the configured key file.
pub const KEY_ENV_VAR: &str = "SIGNED_VITALS_KEY";

/// Errors while provisioning the shared key.
///
/// Messages never contain key material.
#[derive(Debug)]
pub enum KeyError {
    Io(String),
    TooShort(usize),
    InvalidHex,
    Missing,
}

impl fmt::Display for KeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyError::Io(msg) => write!(f, "Key file error: {msg}"),
            KeyError::TooShort(len) => {
                write!(f, "Shared key is {len} bytes, need at least {MIN_KEY_LEN}")
            }
            KeyError::InvalidHex => write!(f, "Shared key is not valid hex"),
            KeyError::Missing => write!(f, "No shared key configured"),
        }
    }
}

impl std::error::Error for KeyError {}

/// The pre-shared symmetric key.
///
/// Immutable once built. Only the keyed HMAC state is retained; `Debug` is
/// redacted and there is no `Display`.
#[derive(Clone)]
pub struct SharedKey {
    mac: HmacSha256,
}

impl SharedKey {
    /// Build a key from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() < MIN_KEY_LEN {
            return Err(KeyError::TooShort(bytes.len()));
        }
        // HMAC takes keys of any length; the error arm is unreachable in practice.
        let mac = HmacSha256::new_from_slice(bytes).map_err(|_| KeyError::TooShort(bytes.len()))?;
        Ok(Self { mac })
    }

    /// Build a key from hex text (surrounding whitespace ignored).
    pub fn from_hex(text: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(text.trim()).map_err(|_| KeyError::InvalidHex)?;
        Self::from_bytes(&bytes)
    }

    /// Load a key file.
    ///
    /// The file holds hex text; if it does not decode as hex, its raw bytes
    /// are used as the key.
    pub fn load(path: &Path) -> Result<Self, KeyError> {
        let raw = std::fs::read(path)
            .map_err(|e| KeyError::Io(format!("Failed to read key file {path:?}: {e}")))?;

        match std::str::from_utf8(&raw).ok().map(str::trim) {
            Some(text) if !text.is_empty() && hex::decode(text).is_ok() => Self::from_hex(text),
            _ => Self::from_bytes(&raw),
        }
    }

    /// Resolve the key from `SIGNED_VITALS_KEY`, falling back to `path`.
    pub fn resolve(path: Option<&Path>) -> Result<Self, KeyError> {
        if let Ok(text) = std::env::var(KEY_ENV_VAR) {
            return Self::from_hex(&text);
        }
        match path {
            Some(path) => Self::load(path),
            None => Err(KeyError::Missing),
        }
    }
}

/// Fresh 32-byte key as hex, drawn from two v4 UUIDs (244 random bits).
pub fn generate_key_hex() -> String {
    let mut bytes = Vec::with_capacity(32);
    bytes.extend_from_slice(uuid::Uuid::new_v4().as_bytes());
    bytes.extend_from_slice(uuid::Uuid::new_v4().as_bytes());
    hex::encode(bytes)
}

/// Write a hex key file readable by the owner only.
///
/// An existing file is truncated and its permissions tightened.
pub fn write_key_file(path: &Path, key_hex: &str) -> Result<(), KeyError> {
    let io_err =
        |e: std::io::Error| KeyError::Io(format!("Failed to write key file {path:?}: {e}"));

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path).map_err(io_err)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600)).map_err(io_err)?;
    }

    file.write_all(format!("{key_hex}\n").as_bytes()).map_err(io_err)
}

impl fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedKey(<redacted>)")
    }
}

/// A 32-byte authentication tag.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag([u8; TAG_SIZE]);

impl Tag {
    pub const fn from_bytes(bytes: [u8; TAG_SIZE]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; TAG_SIZE] {
        &self.0
    }

    /// Parse a 64-character hex tag. Either case is accepted.
    pub fn from_hex(text: &str) -> Option<Self> {
        if text.len() != TAG_HEX_LEN {
            return None;
        }
        let mut bytes = [0u8; TAG_SIZE];
        hex::decode_to_slice(text, &mut bytes).ok()?;
        Some(Self(bytes))
    }

    /// Lowercase hex form used on the wire.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({:02x}{:02x}...)", self.0[0], self.0[1])
    }
}

/// Compute the tag for `bytes`.
pub fn sign(key: &SharedKey, bytes: &[u8]) -> Tag {
    let mut mac = key.mac.clone();
    mac.update(bytes);
    let mut tag = [0u8; TAG_SIZE];
    tag.copy_from_slice(&mac.finalize().into_bytes());
    Tag(tag)
}

/// Check `tag` against `bytes`.
///
/// Running time does not depend on where the first differing byte is.
pub fn verify(key: &SharedKey, bytes: &[u8], tag: &Tag) -> bool {
    let computed = sign(key, bytes);
    computed.0.as_slice().ct_eq(tag.0.as_slice()).into()
}

/// Check a hex-encoded tag. Malformed or wrong-length tags never verify.
pub fn verify_hex(key: &SharedKey, bytes: &[u8], tag_hex: &str) -> bool {
    match Tag::from_hex(tag_hex) {
        Some(tag) => verify(key, bytes, &tag),
        None => false,
    }
}

use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha1::{Digest, Sha1};

/// 20-byte SHA-1 digest, rendered everywhere as 40 lowercase hex chars.
/// The all-zero value is the "no parent / empty" sentinel.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectHash([u8; 20]);

impl ObjectHash {
    pub const ZERO: ObjectHash = ObjectHash([0u8; 20]);

    pub fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(40);
        for byte in self.0 {
            out.push(hex_char(byte >> 4));
            out.push(hex_char(byte & 0x0f));
        }
        out
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != 40 {
            return None;
        }
        let bytes = hex.as_bytes();
        let mut out = [0u8; 20];
        let mut i = 0;
        while i < 20 {
            let hi = from_hex_byte(bytes[i * 2])?;
            let lo = from_hex_byte(bytes[i * 2 + 1])?;
            out[i] = (hi << 4) | lo;
            i += 1;
        }
        Some(Self(out))
    }
}

/// SHA-1 over the raw, uncompressed object bytes.
pub fn hash_bytes(content: &[u8]) -> ObjectHash {
    let mut hasher = Sha1::new();
    hasher.update(content);
    let digest = hasher.finalize();
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest);
    ObjectHash(out)
}

impl Default for ObjectHash {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Debug for ObjectHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Display for ObjectHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for ObjectHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ObjectHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        // The original format stored "no parent" as either the empty string
        // or forty zeros; both decode to the sentinel.
        if text.is_empty() {
            return Ok(ObjectHash::ZERO);
        }
        ObjectHash::from_hex(&text)
            .ok_or_else(|| D::Error::custom(format!("invalid object hash {text:?}")))
    }
}

fn hex_char(value: u8) -> char {
    match value {
        0..=9 => (b'0' + value) as char,
        10..=15 => (b'a' + (value - 10)) as char,
        _ => '0',
    }
}

fn from_hex_byte(value: u8) -> Option<u8> {
    match value {
        b'0'..=b'9' => Some(value - b'0'),
        b'a'..=b'f' => Some(value - b'a' + 10),
        b'A'..=b'F' => Some(value - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        let hash = hash_bytes(b"hello\n");
        let hex = hash.to_hex();
        assert_eq!(hex.len(), 40);
        let decoded = ObjectHash::from_hex(&hex).expect("decode");
        assert_eq!(decoded, hash);
    }

    #[test]
    fn sha1_of_known_input() {
        // sha1("hello\n")
        let hash = hash_bytes(b"hello\n");
        assert_eq!(hash.to_hex(), "f572d396fae9206628714fb2ce00f72e94f2258f");
    }

    #[test]
    fn zero_sentinel() {
        assert!(ObjectHash::ZERO.is_zero());
        assert_eq!(ObjectHash::ZERO.to_hex(), "0".repeat(40));
        assert!(!hash_bytes(b"x").is_zero());
    }

    #[test]
    fn serde_as_hex_string() {
        let hash = hash_bytes(b"data");
        let json = serde_json::to_string(&hash).expect("serialize");
        assert_eq!(json, format!("\"{}\"", hash.to_hex()));
        let back: ObjectHash = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, hash);
    }

    #[test]
    fn serde_empty_string_is_zero() {
        let back: ObjectHash = serde_json::from_str("\"\"").expect("deserialize");
        assert!(back.is_zero());
    }
}

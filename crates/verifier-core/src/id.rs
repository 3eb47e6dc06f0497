//! Time-ordered 128-bit signature identifiers
//!
//! Layout: the high 48 bits hold the creation time in milliseconds since the
//! Unix epoch, the low 80 bits are random. The textual form is 26 characters
//! of Crockford base32, so lexicographic order of the text equals numeric
//! order of the id.
//!
//! ```text
//!  127                    80 79                                  0
//!  ┌────────────────────────┬─────────────────────────────────────┐
//!  │   unix time (ms, 48b)  │           randomness (80b)          │
//!  └────────────────────────┴─────────────────────────────────────┘
//! ```

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::IdParseError;

const RANDOM_BITS: u32 = 80;
const RANDOM_MASK: u128 = (1u128 << RANDOM_BITS) - 1;
const MAX_TIMESTAMP_MS: u64 = (1u64 << 48) - 1;
const ENCODED_LEN: usize = 26;
const ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// Identifier of an attestation record
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignatureId(u128);

impl SignatureId {
    pub const MIN: Self = Self(0);
    pub const MAX: Self = Self(u128::MAX);

    /// Build an id from a millisecond timestamp and a random component.
    /// Both parts are truncated to their field widths.
    pub fn from_parts(timestamp_ms: u64, random: u128) -> Self {
        let ts = (timestamp_ms.min(MAX_TIMESTAMP_MS) as u128) << RANDOM_BITS;
        Self(ts | (random & RANDOM_MASK))
    }

    pub fn from_u128(value: u128) -> Self {
        Self(value)
    }

    pub fn as_u128(&self) -> u128 {
        self.0
    }

    pub fn timestamp_ms(&self) -> u64 {
        (self.0 >> RANDOM_BITS) as u64
    }

    pub fn random_part(&self) -> u128 {
        self.0 & RANDOM_MASK
    }

    pub fn to_bytes(&self) -> [u8; 16] {
        self.0.to_be_bytes()
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(u128::from_be_bytes(bytes))
    }

    /// Creation time as a UTC datetime
    pub fn datetime(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        chrono::DateTime::from_timestamp_millis(self.timestamp_ms() as i64)
    }

    /// Mint a fresh id from the process-wide generator
    pub fn generate() -> Self {
        GENERATOR.next()
    }

    /// The smallest id strictly greater than this one
    pub fn successor(&self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Lowest id whose timestamp lies `margin` before this id's timestamp.
    ///
    /// Used as an exclusive lower bound, so the result also admits records
    /// minted in the same millisecond as the rewound timestamp.
    pub fn rewind(&self, margin: Duration) -> Self {
        let margin_ms = u64::try_from(margin.as_millis()).unwrap_or(u64::MAX);
        Self::from_parts(self.timestamp_ms().saturating_sub(margin_ms), 0)
    }
}

impl fmt::Display for SignatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = [0u8; ENCODED_LEN];
        for (i, slot) in buf.iter_mut().enumerate() {
            let shift = 5 * (ENCODED_LEN - 1 - i);
            *slot = ALPHABET[((self.0 >> shift) & 0x1f) as usize];
        }
        // ALPHABET is pure ASCII
        f.write_str(std::str::from_utf8(&buf).map_err(|_| fmt::Error)?)
    }
}

impl fmt::Debug for SignatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SignatureId({})", self)
    }
}

fn decode_char(c: u8) -> Option<u8> {
    match c.to_ascii_uppercase() {
        b'O' => Some(0),
        b'I' | b'L' => Some(1),
        upper => ALPHABET.iter().position(|&a| a == upper).map(|p| p as u8),
    }
}

impl FromStr for SignatureId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != ENCODED_LEN {
            return Err(IdParseError::InvalidLength(s.len()));
        }
        let mut value: u128 = 0;
        for (i, &b) in s.as_bytes().iter().enumerate() {
            let digit = decode_char(b).ok_or(IdParseError::InvalidChar(b as char))?;
            // 26 * 5 = 130 bits, so the leading digit only carries 3
            if i == 0 && digit > 7 {
                return Err(IdParseError::Overflow);
            }
            value = (value << 5) | digit as u128;
        }
        Ok(Self(value))
    }
}

impl Serialize for SignatureId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.collect_str(self)
        } else {
            serializer.serialize_u128(self.0)
        }
    }
}

struct SignatureIdVisitor;

impl<'de> Visitor<'de> for SignatureIdVisitor {
    type Value = SignatureId;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a 26-character base32 signature id or a u128")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        v.parse().map_err(E::custom)
    }

    fn visit_u128<E: de::Error>(self, v: u128) -> Result<Self::Value, E> {
        Ok(SignatureId(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(SignatureId(v as u128))
    }
}

impl<'de> Deserialize<'de> for SignatureId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            deserializer.deserialize_str(SignatureIdVisitor)
        } else {
            deserializer.deserialize_u128(SignatureIdVisitor)
        }
    }
}

// ============================================================================
// Generator
// ============================================================================

static GENERATOR: Lazy<IdGenerator> = Lazy::new(IdGenerator::default);

/// Monotonic id source.
///
/// Within one millisecond (or when the wall clock steps backwards) the next
/// id is the successor of the previous one, so ids never repeat and never
/// decrease inside a process.
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: Mutex<Option<SignatureId>>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> SignatureId {
        let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
        self.next_at(now)
    }

    /// Mint an id as if the wall clock read `now_ms`
    pub fn next_at(&self, now_ms: u64) -> SignatureId {
        let mut last = self.last.lock();
        let id = match *last {
            Some(prev) if prev.timestamp_ms() >= now_ms => prev.successor(),
            _ => SignatureId::from_parts(now_ms, rand::random::<u128>()),
        };
        *last = Some(id);
        id
    }
}

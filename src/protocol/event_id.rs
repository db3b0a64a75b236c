//! Event identifiers
//!
//! Application event names never travel on the wire. Each name is reduced to a
//! positional checksum of its UTF-16 code units:
//!
//! ```text
//! id(name) = sum(code_unit[i] * (i + 1))   for i in 0..len
//! ```
//!
//! rendered as lowercase hexadecimal. Both peers must compute the same digest,
//! so the formula is part of the protocol. Distinct names can collide.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Error parsing a hexadecimal event id
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid event id: {0:?}")]
pub struct InvalidEventId(pub String);

/// Compact digest of an event name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(u64);

impl EventId {
    /// Digest an event name
    pub fn of(name: &str) -> Self {
        let sum = name
            .encode_utf16()
            .enumerate()
            .fold(0u64, |sum, (index, unit)| {
                sum.wrapping_add(u64::from(unit).wrapping_mul(index as u64 + 1))
            });
        Self(sum)
    }

    /// Build an id from its raw value
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw numeric value
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

impl FromStr for EventId {
    type Err = InvalidEventId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(InvalidEventId(s.to_string()));
        }
        u64::from_str_radix(s, 16)
            .map(Self)
            .map_err(|_| InvalidEventId(s.to_string()))
    }
}

impl From<&str> for EventId {
    fn from(name: &str) -> Self {
        Self::of(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_char() {
        assert_eq!(EventId::of("a").to_string(), "61");
    }

    #[test]
    fn test_weights_are_one_indexed() {
        // 97 * 1 + 98 * 2 = 293
        assert_eq!(EventId::of("ab").raw(), 293);
        assert_eq!(EventId::of("ab").to_string(), "125");
    }

    #[test]
    fn test_sum_event() {
        // 115 + 117 * 2 + 109 * 3 = 676
        assert_eq!(EventId::of("sum").to_string(), "2a4");
    }

    #[test]
    fn test_empty_name() {
        assert_eq!(EventId::of("").to_string(), "0");
    }

    #[test]
    fn test_utf16_code_units() {
        // U+1F600 is a surrogate pair: 0xD83D, 0xDE00
        let expected = 0xD83Du64 + 0xDE00 * 2;
        assert_eq!(EventId::of("\u{1F600}").raw(), expected);
    }

    #[test]
    fn test_known_collision() {
        // 99 + 97 * 2 = 293, same as "ab"
        assert_eq!(EventId::of("ca"), EventId::of("ab"));
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!("2a4".parse::<EventId>().unwrap(), EventId::of("sum"));
        assert_eq!("2A4".parse::<EventId>().unwrap(), EventId::of("sum"));
        assert!("".parse::<EventId>().is_err());
        assert!("xyz".parse::<EventId>().is_err());
        assert!("+1".parse::<EventId>().is_err());
    }
}

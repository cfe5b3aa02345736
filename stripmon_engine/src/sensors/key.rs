//! Fixed-width vendor sensor keys.
//!
//! Hardware sensors surface as a flat namespace of 4-character codes
//! ("Tp0a", "F0Ac"). Families share a prefix and vary in wildcard
//! positions; nothing guarantees the variants are contiguous or complete.

use std::fmt;

pub const KEY_WIDTH: usize = 4;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SensorKey([u8; KEY_WIDTH]);

impl SensorKey {
    /// Parse a raw code; must be exactly four printable ASCII characters.
    pub fn parse(s: &str) -> Option<Self> {
        let bytes = s.as_bytes();
        if bytes.len() != KEY_WIDTH {
            return None;
        }
        if !bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
            return None;
        }
        let mut code = [0u8; KEY_WIDTH];
        code.copy_from_slice(bytes);
        Some(Self(code))
    }

    pub fn from_bytes(code: [u8; KEY_WIDTH]) -> Self {
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }

    pub fn char_at(&self, position: usize) -> Option<char> {
        self.0.get(position).map(|b| *b as char)
    }

    /// Temperature keys use the 'T' prefix convention.
    pub fn is_temperature(&self) -> bool {
        self.0[0] == b'T'
    }

    /// Fan keys use the 'F' prefix convention.
    pub fn is_fan(&self) -> bool {
        self.0[0] == b'F'
    }
}

impl fmt::Display for SensorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Debug prints the code itself; the byte-array form is never useful in logs.
impl fmt::Debug for SensorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SensorKey({})", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_validates_width_and_ascii() {
        assert!(SensorKey::parse("Tp0a").is_some());
        assert!(SensorKey::parse("Tp0").is_none());
        assert!(SensorKey::parse("Tp0ab").is_none());
        assert!(SensorKey::parse("Tp0\u{fc}").is_none());
    }

    #[test]
    fn display_round_trips() {
        let k = SensorKey::parse("F0Ac").unwrap();
        assert_eq!(k.to_string(), "F0Ac");
        assert_eq!(k.char_at(1), Some('0'));
        assert!(k.is_fan());
        assert!(!k.is_temperature());
    }
}

//! BOLT9-style feature bitmaps.
//!
//! Feature bitfields are big-endian: bit `n` lives in byte
//! `len - 1 - n / 8`, at position `n % 8`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// `option_onion_messages` (even: required).
pub const ONION_MESSAGES_REQ: u16 = 38;
/// `option_onion_messages` (odd: optional).
pub const ONION_MESSAGES_OPT: u16 = 39;

/// A variable-length feature bitmap.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Features(#[serde(with = "offerd_common::hexstr_or_bytes")] Vec<u8>);

impl Features {
    pub const fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        // All-zero bytes are semantically empty as well.
        self.0.iter().all(|b| *b == 0)
    }

    pub fn is_set(&self, bit: u16) -> bool {
        let bit = usize::from(bit);
        let byte_idx = bit / 8;
        if byte_idx >= self.0.len() {
            return false;
        }
        let byte = self.0[self.0.len() - 1 - byte_idx];
        byte & (1 << (bit % 8)) != 0
    }

    pub fn set(&mut self, bit: u16) {
        let bit = usize::from(bit);
        let byte_idx = bit / 8;
        if byte_idx >= self.0.len() {
            let grow_by = byte_idx + 1 - self.0.len();
            // New most-significant bytes go at the front.
            self.0.splice(0..0, std::iter::repeat(0u8).take(grow_by));
        }
        let len = self.0.len();
        self.0[len - 1 - byte_idx] |= 1 << (bit % 8);
    }

    pub fn supports_onion_messages(&self) -> bool {
        self.is_set(ONION_MESSAGES_REQ) || self.is_set(ONION_MESSAGES_OPT)
    }

    /// Returns the lowest even bit set in `self` which is not set in `ours`,
    /// if any. Unknown even bits make a record unusable; unknown odd bits are
    /// ignored.
    pub fn unknown_even_bit(&self, ours: &Features) -> Option<u16> {
        let max_bit = self.0.len() * 8;
        (0..max_bit)
            .step_by(2)
            .map(|bit| bit as u16)
            .find(|bit| self.is_set(*bit) && !ours.is_set(*bit))
    }
}

impl fmt::Display for Features {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", offerd_common::hex::display(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_test_bits() {
        let mut features = Features::empty();
        assert!(!features.is_set(0));
        assert!(features.is_empty());

        features.set(0);
        assert!(features.is_set(0));
        assert_eq!(features.as_bytes(), &[0x01]);

        features.set(39);
        assert!(features.is_set(39));
        assert!(features.supports_onion_messages());
        // bit 39 = byte 4 (from the end), position 7
        assert_eq!(features.as_bytes(), &[0x80, 0x00, 0x00, 0x00, 0x01]);
    }

    #[test]
    fn unknown_even_bits() {
        let ours = {
            let mut f = Features::empty();
            f.set(8);
            f
        };

        let mut theirs = Features::empty();
        theirs.set(9); // odd: ignored
        assert_eq!(theirs.unknown_even_bit(&ours), None);

        theirs.set(8); // known even
        assert_eq!(theirs.unknown_even_bit(&ours), None);

        theirs.set(12); // unknown even
        assert_eq!(theirs.unknown_even_bit(&ours), Some(12));
    }

    #[test]
    fn all_zero_is_empty() {
        assert!(Features::from_bytes(vec![0, 0]).is_empty());
        assert!(!Features::from_bytes(vec![0, 1]).is_empty());
    }
}

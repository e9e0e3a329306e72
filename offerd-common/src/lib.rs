//! The `offerd-common` crate contains small utilities shared between the
//! offerd subsystem crates: hex codecs, randomness, hashing, and timestamps.

/// Hex utils.
pub mod hex;
/// serde_with-style helper for hex-in-JSON byte fields.
pub mod hexstr_or_bytes;
/// `hexstr_or_bytes` but for [`Option`] bytes types.
pub mod hexstr_or_bytes_opt;
/// Random number generation.
pub mod rng;
/// sha256 convenience module.
pub mod sha256;
/// `TimestampSecs`.
pub mod time;

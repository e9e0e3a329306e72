//! Like [`hexstr_or_bytes`](crate::hexstr_or_bytes), but for `Option<T>`
//! byte types.
//!
//! ## Example:
//!
//! ```rust
//! use offerd_common::hexstr_or_bytes_opt;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Foo(#[serde(with = "hexstr_or_bytes_opt")] Option<Vec<u8>>);
//! ```

use serde::{de::Deserialize, ser::Serialize, Deserializer, Serializer};

use crate::{hex, hex::FromHex};

pub fn serialize<S, T>(
    data: &Option<T>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: Serialize + AsRef<[u8]>,
{
    if serializer.is_human_readable() {
        data.as_ref()
            .map(|bytes| hex::encode(bytes.as_ref()))
            .serialize(serializer)
    } else {
        data.serialize(serializer)
    }
}

pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + FromHex,
{
    if deserializer.is_human_readable() {
        let opt_str = Option::<String>::deserialize(deserializer)?;
        opt_str
            .map(|s| T::from_hex(&s))
            .transpose()
            .map_err(serde::de::Error::custom)
    } else {
        Option::<T>::deserialize(deserializer)
    }
}

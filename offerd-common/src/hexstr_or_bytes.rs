//! [`serde`] serialize and deserialize helpers for types that should be
//! hex-encoded for human-readable formats and raw-bytes for binary codecs.
//!
//! ## Example:
//!
//! ```rust
//! use offerd_common::hexstr_or_bytes;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Foo(#[serde(with = "hexstr_or_bytes")] Vec<u8>);
//! ```

use std::{fmt, marker::PhantomData};

use serde::{de, ser, Deserializer, Serializer};

use crate::hex::{self, FromHex};

pub fn serialize<S, T>(data: T, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: ser::Serialize + AsRef<[u8]>,
{
    if serializer.is_human_readable() {
        let s = hex::encode(data.as_ref());
        serializer.serialize_str(&s)
    } else {
        data.serialize(serializer)
    }
}

pub fn deserialize<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: de::Deserialize<'de> + FromHex,
{
    struct HexVisitor<T>(PhantomData<T>);

    impl<T: FromHex> de::Visitor<'_> for HexVisitor<T> {
        type Value = T;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("expecting hex string")
        }

        fn visit_str<E: de::Error>(self, s: &str) -> Result<Self::Value, E> {
            T::from_hex(s).map_err(de::Error::custom)
        }
    }

    if deserializer.is_human_readable() {
        deserializer.deserialize_str(HexVisitor(PhantomData))
    } else {
        T::deserialize(deserializer)
    }
}

#[cfg(test)]
mod test {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Foo(#[serde(with = "crate::hexstr_or_bytes")] Vec<u8>);

    #[test]
    fn json_roundtrip() {
        let foo = Foo(vec![0xde, 0xad, 0xbe, 0xef]);
        let json = serde_json::to_string(&foo).unwrap();
        assert_eq!(json, "\"deadbeef\"");
        assert_eq!(serde_json::from_str::<Foo>(&json).unwrap(), foo);
    }
}

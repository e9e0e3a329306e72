//! Human-readable bolt12 strings: the bech32 character set with an `lno` /
//! `lnr` / `lni` prefix and no checksum. Long strings may be split with `+`
//! (optionally followed by whitespace).

use bech32::{
    primitives::iter::{ByteIterExt, Fe32IterExt},
    Fe32,
};

use super::Bolt12Error;

/// Prefix for offers.
pub const OFFER_HRP: &str = "lno";
/// Prefix for invoice requests.
pub const INVREQ_HRP: &str = "lnr";
/// Prefix for invoices.
pub const INVOICE_HRP: &str = "lni";

/// Encodes raw TLV bytes under the given prefix.
pub fn encode(hrp: &str, data: &[u8]) -> String {
    let mut out = String::with_capacity(hrp.len() + 1 + data.len() * 8 / 5);
    out.push_str(hrp);
    out.push('1');
    for fe in data.iter().copied().bytes_to_fes() {
        out.push(fe.to_char());
    }
    out
}

/// Decodes a bolt12 string, requiring the given prefix. Accepts
/// `+`-continuations and uppercase input, rejects mixed case.
pub fn decode(hrp: &'static str, s: &str) -> Result<Vec<u8>, Bolt12Error> {
    let joined = join_continuations(s)?;

    let has_upper = joined.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = joined.chars().any(|c| c.is_ascii_lowercase());
    if has_upper && has_lower {
        return Err(Bolt12Error::BadString("mixed case"));
    }
    let joined = if has_upper {
        joined.to_ascii_lowercase()
    } else {
        joined
    };

    let (found_hrp, data) = joined
        .rsplit_once('1')
        .ok_or(Bolt12Error::BadString("no separator"))?;
    if found_hrp != hrp {
        return Err(Bolt12Error::WrongPrefix(hrp));
    }

    let fes = data
        .chars()
        .map(|c| {
            Fe32::from_char(c)
                .map_err(|_| Bolt12Error::BadString("invalid character"))
        })
        .collect::<Result<Vec<Fe32>, Bolt12Error>>()?;

    Ok(fes.into_iter().fes_to_bytes().collect())
}

/// Strips `+`-continuations: each part may be surrounded by whitespace, and
/// no part may be empty.
fn join_continuations(s: &str) -> Result<String, Bolt12Error> {
    if !s.contains('+') {
        return Ok(s.trim().to_owned());
    }
    let mut joined = String::with_capacity(s.len());
    for part in s.split('+') {
        let part = part.trim();
        if part.is_empty() {
            return Err(Bolt12Error::BadString("empty continuation"));
        }
        joined.push_str(part);
    }
    Ok(joined)
}

#[cfg(test)]
mod tests {
    use proptest::{arbitrary::any, collection::vec, proptest};

    use super::*;

    #[test]
    fn roundtrip() {
        proptest!(|(data in vec(any::<u8>(), 0..128))| {
            let s = encode(OFFER_HRP, &data);
            assert!(s.starts_with("lno1"));
            assert_eq!(decode(OFFER_HRP, &s).unwrap(), data);
        });
    }

    #[test]
    fn accepts_continuations_and_upper() {
        let data = vec![0x12, 0x34, 0x56, 0x78, 0x9a];
        let s = encode(OFFER_HRP, &data);
        let (head, tail) = s.split_at(6);
        let split = format!("{head}+ {tail}");
        assert_eq!(decode(OFFER_HRP, &split).unwrap(), data);

        let upper = s.to_ascii_uppercase();
        assert_eq!(decode(OFFER_HRP, &upper).unwrap(), data);
    }

    #[test]
    fn rejects_bad_strings() {
        let data = vec![0xab; 8];
        let s = encode(OFFER_HRP, &data);

        // wrong prefix
        assert!(decode(INVREQ_HRP, &s).is_err());
        // mixed case
        let mut mixed = s.clone();
        mixed.make_ascii_lowercase();
        let mixed = format!("LNO1{}", &mixed[4..]);
        assert!(decode(OFFER_HRP, &mixed).is_err());
        // dangling continuation
        assert!(decode(OFFER_HRP, &format!("{s}+")).is_err());
        // invalid charset ('b' is not a bech32 character)
        assert!(decode(OFFER_HRP, "lno1bbbb").is_err());
        // no separator
        assert!(decode(OFFER_HRP, "lno").is_err());
    }
}

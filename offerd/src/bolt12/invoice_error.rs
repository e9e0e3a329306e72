//! The `invoice_error` TLV record: a recipient's structured refusal to issue
//! an invoice.

use super::{
    read_tu64, read_utf8,
    tlv::{self, TlvRecord, TlvStream},
    Bolt12Error,
};

mod typ {
    pub const ERRONEOUS_FIELD: u64 = 1;
    pub const SUGGESTED_VALUE: u64 = 3;
    pub const ERROR: u64 = 5;
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InvoiceError {
    /// TLV type number of the field the recipient objected to.
    pub erroneous_field: Option<u64>,
    /// A replacement value for the erroneous field.
    pub suggested_value: Option<Vec<u8>>,
    /// Free-form error text.
    pub error: Option<String>,
}

impl InvoiceError {
    pub fn decode(bytes: &[u8]) -> Result<Self, Bolt12Error> {
        let stream = TlvStream::from_bytes(bytes)?;
        let mut err = InvoiceError::default();

        for record in stream.records() {
            let value = record.value.as_slice();
            match record.typ {
                typ::ERRONEOUS_FIELD => {
                    err.erroneous_field =
                        Some(read_tu64("erroneous_field", value)?);
                }
                typ::SUGGESTED_VALUE => {
                    err.suggested_value = Some(value.to_vec());
                }
                typ::ERROR => {
                    err.error = Some(read_utf8("error", value)?);
                }
                unknown if unknown % 2 == 0 => {
                    return Err(Bolt12Error::UnknownEvenType(unknown));
                }
                // ignored; invoice_error is terminal, nothing is re-encoded
                _ => {}
            }
        }

        Ok(err)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut records = Vec::new();
        if let Some(field) = self.erroneous_field {
            let mut value = Vec::new();
            tlv::write_tu64(&mut value, field);
            records.push(TlvRecord {
                typ: typ::ERRONEOUS_FIELD,
                value,
            });
        }
        if let Some(suggested) = &self.suggested_value {
            records.push(TlvRecord {
                typ: typ::SUGGESTED_VALUE,
                value: suggested.clone(),
            });
        }
        if let Some(error) = &self.error {
            records.push(TlvRecord {
                typ: typ::ERROR,
                value: error.as_bytes().to_vec(),
            });
        }
        TlvStream::from_sorted_records(records).to_bytes()
    }
}

use std::borrow::Cow;

use tally_types::{ChainHash, Document, FiscalLogEntry, OperationalLogEntry};

/// One field of a canonical record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Field<'a> {
    /// A present value, rendered as text.
    Text(Cow<'a, str>),
    /// An absent optional value. Encodes differently from the empty string.
    Absent,
}

impl<'a> Field<'a> {
    pub fn text(value: &'a str) -> Self {
        Self::Text(Cow::Borrowed(value))
    }

    pub fn owned(value: String) -> Self {
        Self::Text(Cow::Owned(value))
    }

    pub fn uint(value: u64) -> Self {
        Self::owned(value.to_string())
    }

    pub fn optional<T: ToString>(value: Option<T>) -> Self {
        match value {
            Some(v) => Self::owned(v.to_string()),
            None => Self::Absent,
        }
    }

    pub fn document(doc: &'a Document) -> Self {
        Self::text(doc.as_str())
    }
}

/// Versioned, domain-separated hash-chain codec.
///
/// Canonical form (v1): the domain tag, then for every field in order a
/// newline followed by `<byte length>:<text>` for present values or `-` for
/// absent ones. The digest is BLAKE3 over the canonical string.
///
/// The field order and this encoding are frozen: every stored chain hash
/// was computed with them. A new encoding needs a new domain tag.
pub struct ChainCodec {
    domain: &'static str,
}

impl ChainCodec {
    /// Codec for the fiscal ledger chain.
    pub const FISCAL: Self = Self {
        domain: "tally-fiscal-v1",
    };
    /// Codec for the operational ledger chain.
    pub const OPERATIONAL: Self = Self {
        domain: "tally-operational-v1",
    };

    /// Create a codec with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Build the canonical string for an ordered field tuple.
    pub fn canonical(&self, fields: &[Field<'_>]) -> String {
        let mut out = String::from(self.domain);
        for field in fields {
            out.push('\n');
            match field {
                Field::Text(text) => {
                    out.push_str(&text.len().to_string());
                    out.push(':');
                    out.push_str(text);
                }
                Field::Absent => out.push('-'),
            }
        }
        out
    }

    /// Digest an ordered field tuple.
    pub fn digest(&self, fields: &[Field<'_>]) -> ChainHash {
        let canonical = self.canonical(fields);
        ChainHash::from_bytes(*blake3::hash(canonical.as_bytes()).as_bytes())
    }

    /// The domain tag used by this codec.
    pub fn domain(&self) -> &str {
        self.domain
    }
}

/// Compute the `current_log_hash` of a fiscal entry from its stored fields.
///
/// Field order: `log_id, timestamp_utc, event_type, user_id,
/// transaction_number_tse, payload_for_tse, tse_response, previous_log_hash`.
/// `sequence` and `current_log_hash` are not part of the digest.
pub fn fiscal_entry_hash(entry: &FiscalLogEntry) -> Result<ChainHash, CodecError> {
    let response = Document::from_serialize(&entry.tse_response)
        .map_err(|e| CodecError::Serialization(e.to_string()))?;

    Ok(ChainCodec::FISCAL.digest(&[
        Field::owned(entry.log_id.to_string()),
        Field::owned(entry.timestamp_utc.canonical()),
        Field::text(&entry.event_type),
        Field::optional(entry.user_id),
        Field::uint(entry.transaction_number_tse),
        Field::document(&entry.payload_for_tse),
        Field::document(&response),
        Field::owned(entry.previous_log_hash.to_hex()),
    ]))
}

/// Compute the `current_log_hash` of an operational entry from its stored fields.
///
/// Field order: `log_id, timestamp_utc, event_type, user_id, details,
/// previous_log_hash`.
pub fn operational_entry_hash(entry: &OperationalLogEntry) -> ChainHash {
    ChainCodec::OPERATIONAL.digest(&[
        Field::owned(entry.log_id.to_string()),
        Field::owned(entry.timestamp_utc.canonical()),
        Field::text(&entry.event_type),
        Field::optional(entry.user_id),
        Field::document(&entry.details),
        Field::owned(entry.previous_log_hash.to_hex()),
    ])
}

/// Errors from canonical encoding.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("serialization error: {0}")]
    Serialization(String),
}

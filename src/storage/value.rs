//! The two value kinds the store holds, and the expiry metadata around them.

use std::time::Instant;

/// A stored value: either a plain string or an append-only stream of
/// field/value pairs.
#[derive(Debug, Clone)]
pub enum StorageValue {
    /// A string value (bytes).
    String(Vec<u8>),

    /// A stream: an ordered sequence of field/value entries, appended to by
    /// `XADD` and never truncated.
    Stream(Vec<(Vec<u8>, Vec<u8>)>),
}

/// The name `TYPE` reports for each kind of stored value.
impl StorageValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            StorageValue::String(_) => "string",
            StorageValue::Stream(_) => "stream",
        }
    }
}

/// A value together with its absolute expiry deadline, if any.
///
/// Expiry is always an absolute instant computed at write time (`now + PX`),
/// never a relative duration re-checked against a changing "now": the
/// deadline is fixed the moment the key is written.
#[derive(Debug, Clone)]
pub struct Entry {
    pub value: StorageValue,
    pub expires_at: Option<Instant>,
}

impl Entry {
    pub fn new(value: StorageValue) -> Self {
        Entry {
            value,
            expires_at: None,
        }
    }

    pub fn with_expiry(value: StorageValue, expires_at: Instant) -> Self {
        Entry {
            value,
            expires_at: Some(expires_at),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.map(|at| Instant::now() >= at).unwrap_or(false)
    }
}

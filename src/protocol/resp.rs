//! Wire types for the request/response framing protocol.
//!
//! Requests are always a flat array of bulk strings (`DecodedMessage`).
//! Replies are the richer `ReplyFrame`, which also carries the raw-snapshot
//! variant used only during a replica handshake.

use std::sync::Arc;

/// A single byte string, shared cheaply between the parsed request and any
/// place that holds on to it (e.g. the raw bytes propagated to replicas).
pub type Bytes = Arc<Vec<u8>>;

/// A fully decoded client request: a flat array of byte strings.
pub type DecodedMessage = Vec<Bytes>;

/// A reply frame the server writes back to a socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyFrame {
    /// `+...\r\n`
    SimpleString(Bytes),
    /// `-...\r\n`
    Error(Bytes),
    /// `:...\r\n`
    Integer(i64),
    /// `$len\r\n...\r\n`, or `$-1\r\n` when `None`.
    BulkString(Option<Bytes>),
    /// `*len\r\n...`, or `*-1\r\n` when `None`.
    Array(Option<Vec<ReplyFrame>>),
    /// `$len\r\n<len bytes, no trailing CRLF>`. Used only for the snapshot
    /// transfer during a replica handshake, never for an ordinary reply.
    RawSnapshot(Vec<u8>),
}

impl ReplyFrame {
    pub fn ok() -> Self {
        ReplyFrame::simple_string("OK")
    }

    pub fn simple_string(s: impl Into<Vec<u8>>) -> Self {
        ReplyFrame::SimpleString(Arc::new(s.into()))
    }

    pub fn error(msg: impl Into<Vec<u8>>) -> Self {
        ReplyFrame::Error(Arc::new(msg.into()))
    }

    pub fn null_bulk() -> Self {
        ReplyFrame::BulkString(None)
    }

    pub fn null_array() -> Self {
        ReplyFrame::Array(None)
    }

    pub fn bulk_string(bytes: impl AsRef<[u8]>) -> Self {
        ReplyFrame::BulkString(Some(Arc::new(bytes.as_ref().to_vec())))
    }

    pub fn array(frames: Vec<ReplyFrame>) -> Self {
        ReplyFrame::Array(Some(frames))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ReplyFrame::Error(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ReplyFrame::BulkString(None) | ReplyFrame::Array(None))
    }
}

impl From<i64> for ReplyFrame {
    fn from(n: i64) -> Self {
        ReplyFrame::Integer(n)
    }
}

/// Wraps a byte string in the shared `Bytes` type a `DecodedMessage` is made of.
pub fn bytes_from(s: impl Into<Vec<u8>>) -> Bytes {
    Arc::new(s.into())
}

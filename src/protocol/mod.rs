//! Wire protocol: request decoding, reply encoding, and shared frame types.

pub mod parser;
pub mod resp;
pub mod serializer;

pub use parser::{hex_to_bytes, parse_message};
pub use resp::{bytes_from, Bytes, DecodedMessage, ReplyFrame};
pub use serializer::{serialize_command, serialize_reply, serialize_to_vec};

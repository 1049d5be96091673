//! Request codec.
//!
//! Requests on the wire are always a RESP array of bulk strings (the client
//! command form). Unlike an incremental streaming parser, `parse_message`
//! has no notion of "come back with more bytes later": a buffer that ends
//! mid-frame is a hard parse error, not a signal to wait. Every connection
//! read is parsed against exactly the bytes it delivered.

use super::resp::{bytes_from, DecodedMessage};
use crate::error::{Result, ServerError};

/// Parses every complete command out of `data`, returning each decoded
/// command alongside the exact number of bytes it occupied on the wire.
///
/// Byte-length accounting matters beyond bookkeeping: the master advances
/// its replication offset by the raw bytes it propagates, and a replica
/// advances its own offset by the parsed length of each command it applies
/// from the master link. Both numbers must trace back to this function.
pub fn parse_message(data: &[u8]) -> Result<Vec<(DecodedMessage, usize)>> {
    let mut commands = Vec::new();
    let mut offset = 0;

    while offset < data.len() {
        let (message, consumed) = parse_command(&data[offset..])?;
        commands.push((message, consumed));
        offset += consumed;
    }

    Ok(commands)
}

/// Parses exactly one command (a RESP array of bulk strings) from the front
/// of `data`. A truncated frame is always an error: there is no buffering
/// of partial input across calls.
fn parse_command(data: &[u8]) -> Result<(DecodedMessage, usize)> {
    if data.is_empty() {
        return Err(ServerError::Protocol("empty command buffer".into()));
    }

    if data[0] != b'*' {
        return Err(ServerError::Protocol(format!(
            "expected array header '*', got '{}'",
            data[0] as char
        )));
    }

    let (len_line, mut consumed) = read_line(data, 1)?;
    let count: usize = parse_len(len_line, "array")?
        .try_into()
        .map_err(|_| ServerError::Protocol("negative array length".into()))?;

    let mut elements = Vec::with_capacity(count);
    for _ in 0..count {
        let (bulk, used) = parse_bulk_string(&data[consumed..])?;
        elements.push(bulk);
        consumed += used;
    }

    Ok((elements, consumed))
}

fn parse_bulk_string(data: &[u8]) -> Result<(super::resp::Bytes, usize)> {
    if data.is_empty() || data[0] != b'$' {
        return Err(ServerError::Protocol(
            "expected bulk string header '$'".into(),
        ));
    }

    let (len_line, header_len) = read_line(data, 1)?;
    let len: usize = parse_len(len_line, "bulk string")?
        .try_into()
        .map_err(|_| ServerError::Protocol("negative bulk string length".into()))?;

    let total = header_len + len + 2;
    if data.len() < total {
        return Err(ServerError::Protocol(
            "truncated bulk string: incomplete frame".into(),
        ));
    }

    if data[header_len + len] != b'\r' || data[header_len + len + 1] != b'\n' {
        return Err(ServerError::Protocol(
            "missing CRLF terminator after bulk string".into(),
        ));
    }

    let content = data[header_len..header_len + len].to_vec();
    Ok((bytes_from(content), total))
}

/// Reads a `\r\n`-terminated line starting `skip` bytes into `data`.
/// Returns the line contents (excluding the terminator) and the total bytes
/// consumed including the terminator. A missing terminator is a hard error:
/// there is no "wait for more data" outcome.
fn read_line(data: &[u8], skip: usize) -> Result<(&[u8], usize)> {
    if data.len() < skip {
        return Err(ServerError::Protocol("truncated frame header".into()));
    }

    for i in skip..data.len().saturating_sub(1) {
        if data[i] == b'\r' && data[i + 1] == b'\n' {
            return Ok((&data[skip..i], i + 2));
        }
    }

    Err(ServerError::Protocol(
        "truncated frame: missing CRLF".into(),
    ))
}

fn parse_len(line: &[u8], what: &str) -> Result<i64> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| ServerError::Protocol(format!("invalid {} length", what)))
}

/// Decodes a hex string into raw bytes, two hex characters per byte.
pub fn hex_to_bytes(hex: &str) -> Result<Vec<u8>> {
    hex::decode(hex).map_err(|e| ServerError::Protocol(format!("invalid hex string: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_command() {
        let data = b"*1\r\n$4\r\nPING\r\n";
        let commands = parse_message(data).unwrap();
        assert_eq!(commands.len(), 1);
        let (msg, consumed) = &commands[0];
        assert_eq!(consumed, &data.len());
        assert_eq!(msg.len(), 1);
        assert_eq!(msg[0].as_slice(), b"PING");
    }

    #[test]
    fn test_parse_multiple_commands_in_one_buffer() {
        let data = b"*1\r\n$4\r\nPING\r\n*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n";
        let commands = parse_message(data).unwrap();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].0[0].as_slice(), b"PING");
        assert_eq!(commands[1].0[1].as_slice(), b"foo");
    }

    #[test]
    fn test_byte_length_accounting() {
        let data = b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n";
        let commands = parse_message(data).unwrap();
        assert_eq!(commands[0].1, data.len());
    }

    #[test]
    fn test_truncated_frame_is_a_hard_error() {
        let data = b"*2\r\n$3\r\nGET\r\n$3\r\nfo";
        assert!(parse_message(data).is_err());
    }

    #[test]
    fn test_hex_to_bytes() {
        assert_eq!(hex_to_bytes("48656c6c6f").unwrap(), b"Hello".to_vec());
        assert!(hex_to_bytes("zz").is_err());
    }
}

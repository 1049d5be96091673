//! The replica-side synchronous handshake.
//!
//! Runs once, synchronously, during bootstrap, before the event loop
//! starts, not on a background thread and not with a reconnect loop. If
//! the master link later drops, this instance keeps serving ordinary
//! clients as an orphaned replica; it does not retry the handshake.

use crate::error::{Result, ServerError};
use crate::protocol::serializer::serialize_command;
use std::io::{Read, Write};
use std::net::TcpStream;

pub struct HandshakeOutcome {
    pub master_replid: String,
    pub master_initial_offset: u64,
}

/// `PING` → `REPLCONF listening-port <port>` → `REPLCONF capa psync2` →
/// `PSYNC ? -1` → read the `+FULLRESYNC <replid> <offset>` line → discard
/// the snapshot that follows it. The snapshot bytes are never applied to
/// this instance's store (§4.5): only the handshake's own accounting
/// survives past this function.
pub fn perform_handshake(stream: &mut TcpStream, listening_port: u16) -> Result<HandshakeOutcome> {
    send_command(stream, &[b"PING"])?;
    let _ = read_line(stream)?;

    let port = listening_port.to_string();
    send_command(stream, &[b"REPLCONF", b"listening-port", port.as_bytes()])?;
    let _ = read_line(stream)?;

    send_command(stream, &[b"REPLCONF", b"capa", b"psync2"])?;
    let _ = read_line(stream)?;

    send_command(stream, &[b"PSYNC", b"?", b"-1"])?;
    let fullresync_line = read_line(stream)?;
    let (master_replid, master_initial_offset) = parse_fullresync(&fullresync_line)?;

    discard_snapshot(stream)?;

    Ok(HandshakeOutcome {
        master_replid,
        master_initial_offset,
    })
}

/// Translates `localhost` to `127.0.0.1` before connecting, matching the
/// original implementation's handling of that one hostname.
pub fn resolve_master_host(host: &str) -> String {
    if host == "localhost" {
        "127.0.0.1".to_string()
    } else {
        host.to_string()
    }
}

fn send_command(stream: &mut TcpStream, parts: &[&[u8]]) -> Result<()> {
    stream.write_all(&serialize_command(parts))?;
    Ok(())
}

/// Reads bytes one at a time until (and including) a `\n`. Byte-by-byte is
/// mandatory here: a bulk `read()` risks pulling in bytes belonging to the
/// snapshot (or, past the snapshot, the first propagated command) that
/// arrived in the same TCP segment as this line.
fn read_line(stream: &mut TcpStream) -> Result<Vec<u8>> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = stream.read(&mut byte)?;
        if n == 0 {
            return Err(ServerError::Connection(
                "master link closed during handshake".into(),
            ));
        }
        line.push(byte[0]);
        if byte[0] == b'\n' {
            return Ok(line);
        }
    }
}

fn parse_fullresync(line: &[u8]) -> Result<(String, u64)> {
    let text = std::str::from_utf8(line)
        .map_err(|_| ServerError::Protocol("non-UTF-8 FULLRESYNC line".into()))?
        .trim_end();

    let rest = text
        .strip_prefix('+')
        .unwrap_or(text)
        .strip_prefix("FULLRESYNC ")
        .ok_or_else(|| ServerError::Protocol(format!("expected FULLRESYNC, got {:?}", text)))?;

    let mut parts = rest.split_whitespace();
    let replid = parts
        .next()
        .ok_or_else(|| ServerError::Protocol("missing replid in FULLRESYNC".into()))?
        .to_string();
    let offset = parts
        .next()
        .ok_or_else(|| ServerError::Protocol("missing offset in FULLRESYNC".into()))?
        .parse::<u64>()
        .map_err(|_| ServerError::Protocol("invalid offset in FULLRESYNC".into()))?;

    Ok((replid, offset))
}

/// Reads and discards the raw snapshot frame: `$<len>` header (byte-by-byte,
/// its end is unknown in advance) followed by exactly `len` payload bytes
/// with no trailing CRLF. Bounding the payload read to exactly `len` bytes
/// (rather than reading into an oversized buffer) is what keeps any bytes
/// of the next propagated command (which may already have arrived on the
/// same TCP segment) untouched for the event loop to pick up afterward.
fn discard_snapshot(stream: &mut TcpStream) -> Result<()> {
    let mut digits = Vec::new();
    let mut byte = [0u8; 1];

    loop {
        let n = stream.read(&mut byte)?;
        if n == 0 {
            return Err(ServerError::Connection(
                "master link closed mid-snapshot-header".into(),
            ));
        }
        match byte[0] {
            b'$' => continue,
            b'\r' => continue,
            b'\n' => break,
            digit => digits.push(digit),
        }
    }

    let len_str = std::str::from_utf8(&digits)
        .map_err(|_| ServerError::Protocol("non-UTF-8 snapshot length".into()))?;
    let len: usize = len_str
        .parse()
        .map_err(|_| ServerError::Protocol("invalid snapshot length".into()))?;

    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload)?;
    Ok(())
}

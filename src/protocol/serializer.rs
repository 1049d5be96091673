//! Reply codec: writes a `ReplyFrame` out in wire format.

use super::resp::ReplyFrame;
use crate::error::Result;
use std::io::Write;

/// Serializes a reply frame to a writer.
pub fn serialize_reply<W: Write>(frame: &ReplyFrame, writer: &mut W) -> Result<()> {
    match frame {
        ReplyFrame::SimpleString(bytes) => {
            writer.write_all(b"+")?;
            writer.write_all(bytes)?;
            writer.write_all(b"\r\n")?;
        }

        ReplyFrame::Error(bytes) => {
            writer.write_all(b"-")?;
            writer.write_all(bytes)?;
            writer.write_all(b"\r\n")?;
        }

        ReplyFrame::Integer(n) => {
            writer.write_all(b":")?;
            writer.write_all(n.to_string().as_bytes())?;
            writer.write_all(b"\r\n")?;
        }

        ReplyFrame::BulkString(opt) => match opt {
            Some(bytes) => {
                writer.write_all(b"$")?;
                writer.write_all(bytes.len().to_string().as_bytes())?;
                writer.write_all(b"\r\n")?;
                writer.write_all(bytes)?;
                writer.write_all(b"\r\n")?;
            }
            None => {
                writer.write_all(b"$-1\r\n")?;
            }
        },

        ReplyFrame::Array(opt) => match opt {
            Some(frames) => {
                writer.write_all(b"*")?;
                writer.write_all(frames.len().to_string().as_bytes())?;
                writer.write_all(b"\r\n")?;
                for frame in frames {
                    serialize_reply(frame, writer)?;
                }
            }
            None => {
                writer.write_all(b"*-1\r\n")?;
            }
        },

        // No trailing CRLF: the snapshot transfer is framed purely by its
        // declared length so a byte-by-byte reader on the replica side
        // never risks consuming bytes of the next propagated command.
        ReplyFrame::RawSnapshot(bytes) => {
            writer.write_all(b"$")?;
            writer.write_all(bytes.len().to_string().as_bytes())?;
            writer.write_all(b"\r\n")?;
            writer.write_all(bytes)?;
        }
    }

    Ok(())
}

/// Serializes a reply frame to a fresh byte vector.
pub fn serialize_to_vec(frame: &ReplyFrame) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    serialize_reply(frame, &mut buf)?;
    Ok(buf)
}

/// Serializes a request (a plain array of bulk strings) for the replication
/// and handshake paths, where the server itself plays client and must write
/// commands out instead of only ever reading them.
pub fn serialize_command(parts: &[&[u8]]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(format!("*{}\r\n", parts.len()).as_bytes());
    for part in parts {
        buf.extend_from_slice(format!("${}\r\n", part.len()).as_bytes());
        buf.extend_from_slice(part);
        buf.extend_from_slice(b"\r\n");
    }
    buf
}

//! Per-connection I/O: buffered writes, bounded reads, and no protocol
//! state of its own. Parsing is stateless (see `protocol::parser`), so a
//! `Connection` only ever needs to hand the event loop the bytes it read.

use crate::error::{Result, ServerError};
use crate::protocol::ReplyFrame;
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Instant;

/// How large a single read from a socket may be. Bounded reads (rather than
/// reading until `WouldBlock`) keep one chatty client from starving the
/// readiness sweep over every other socket.
const READ_CHUNK: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Closing,
}

/// A single client (or master-link) socket.
pub struct Connection {
    pub id: u64,
    stream: TcpStream,
    pub addr: SocketAddr,
    pub state: ConnectionState,
    write_buffer: Vec<u8>,
    pub last_activity: Instant,
}

impl Connection {
    pub fn new(id: u64, stream: TcpStream, addr: SocketAddr) -> Result<Self> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;

        Ok(Connection {
            id,
            stream,
            addr,
            state: ConnectionState::Connected,
            write_buffer: Vec::with_capacity(4096),
            last_activity: Instant::now(),
        })
    }

    /// Reads up to `READ_CHUNK` bytes. `Ok(None)` means no data was ready;
    /// `Ok(Some(bytes))` is everything read this call, handed straight to
    /// the caller for parsing; there is no internal buffer carrying a
    /// partial frame over to the next call.
    pub fn read_available(&mut self) -> Result<Option<Vec<u8>>> {
        let mut buf = [0u8; READ_CHUNK];
        match self.stream.read(&mut buf) {
            Ok(0) => {
                self.state = ConnectionState::Closing;
                Err(ServerError::Connection("connection closed by peer".into()))
            }
            Ok(n) => {
                self.last_activity = Instant::now();
                Ok(Some(buf[..n].to_vec()))
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn send_frame(&mut self, frame: &ReplyFrame) -> Result<()> {
        crate::protocol::serialize_reply(frame, &mut self.write_buffer)?;
        self.flush()
    }

    pub fn send_raw(&mut self, data: &[u8]) -> Result<()> {
        self.write_buffer.extend_from_slice(data);
        self.flush()
    }

    /// Flushes as much of the write buffer as the socket accepts right now.
    /// A partial write (or `WouldBlock`) simply leaves the remainder
    /// buffered for the next flush. It never blocks the event loop.
    pub fn flush(&mut self) -> Result<()> {
        if self.write_buffer.is_empty() {
            return Ok(());
        }

        let mut written = 0;
        while written < self.write_buffer.len() {
            match self.stream.write(&self.write_buffer[written..]) {
                Ok(n) => {
                    written += n;
                    self.last_activity = Instant::now();
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            }
        }

        self.write_buffer.drain(..written);
        Ok(())
    }

    pub fn has_pending_writes(&self) -> bool {
        !self.write_buffer.is_empty()
    }

    pub fn close(&mut self) -> Result<()> {
        self.state = ConnectionState::Closing;
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
        Ok(())
    }

    pub fn is_closing(&self) -> bool {
        self.state == ConnectionState::Closing
    }

    pub fn idle_time(&self) -> std::time::Duration {
        self.last_activity.elapsed()
    }
}

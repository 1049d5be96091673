//! TCP listener for accepting client connections.

use super::NetworkConfig;
use crate::error::{Result, ServerError};
use socket2::{Domain, Socket, Type};
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};

/// TCP listener wrapper. Binds with `SO_REUSEADDR` set explicitly so a
/// restart doesn't have to wait out the previous socket's TIME_WAIT.
pub struct Listener {
    listener: TcpListener,
}

impl Listener {
    pub fn bind(config: &NetworkConfig) -> Result<Self> {
        let addr: SocketAddr = format!("{}:{}", config.bind_addr, config.port)
            .parse()
            .map_err(|e| ServerError::Io(format!("invalid bind address: {}", e)))?;

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, None)?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.listen(128)?;
        socket.set_nonblocking(true)?;

        let listener: TcpListener = socket.into();

        tracing::info!(%addr, "listening");

        Ok(Listener { listener })
    }

    /// Accepts a new connection. Returns `Ok(None)` if none is pending.
    /// The listener is non-blocking, so this never suspends the event loop.
    pub fn accept(&self) -> Result<Option<(TcpStream, SocketAddr)>> {
        match self.listener.accept() {
            Ok((stream, addr)) => Ok(Some((stream, addr))),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(Into::into)
    }
}

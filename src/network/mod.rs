//! Networking: listener setup, per-connection buffering, command dispatch,
//! and the cooperative single-threaded event loop.

pub mod connection;
pub mod dispatcher;
pub mod listener;
pub mod server;

pub use connection::{Connection, ConnectionState};
pub use dispatcher::{dispatch, DispatchResult, ServerSettings};
pub use listener::Listener;
pub use server::{EventLoop, ServerBootstrap};

/// TCP bind configuration used by the listener.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// TCP bind address.
    pub bind_addr: String,

    /// TCP port.
    pub port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            bind_addr: "127.0.0.1".to_string(),
            port: 6379,
        }
    }
}

//! Configuration: CLI flags layered onto an optional `key value` config
//! file. CLI flags always win where both set the same field.

mod cli;
mod parser;

pub use cli::{parse_cli_args, CliArgs};
pub use parser::{parse_config_file, ConfigParseError};

use std::path::PathBuf;

/// Fully resolved server configuration, ready for `ServerBootstrap`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// TCP port to listen on.
    pub port: u16,

    /// Interface to bind to.
    pub bind: String,

    /// Master to replicate from, if this instance is a replica.
    pub replicaof: Option<(String, u16)>,

    /// Working directory for the snapshot file.
    pub dir: Option<String>,

    /// Snapshot filename, relative to `dir`.
    pub dbfilename: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 6379,
            bind: "127.0.0.1".to_string(),
            replicaof: None,
            dir: None,
            dbfilename: None,
        }
    }
}

impl Config {
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigParseError> {
        parser::parse_config_file(path)
    }

    /// Layers CLI flags on top of this config. A flag present on the
    /// command line always overrides whatever the file (or the default)
    /// already set.
    pub fn apply_cli_args(&mut self, args: CliArgs) {
        if let Some(port) = args.port {
            self.port = port;
        }
        if let Some(bind) = args.bind {
            self.bind = bind;
        }
        if let Some(replicaof) = args.replicaof {
            self.replicaof = Some(replicaof);
        }
        if let Some(dir) = args.dir {
            self.dir = Some(dir);
        }
        if let Some(dbfilename) = args.dbfilename {
            self.dbfilename = Some(dbfilename);
        }
    }
}

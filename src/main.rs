//! Entry point: parse configuration, then hand off to `ServerBootstrap`.

use std::process;

use kvrepld::config::{self, Config};
use kvrepld::error::{Result, ServerError};
use kvrepld::ServerBootstrap;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(e) = run() {
        tracing::error!(error = %e, "fatal error during startup");
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli_args = config::parse_cli_args();

    let mut cfg = match &cli_args.config {
        Some(path) => {
            Config::from_file(path).map_err(|e| ServerError::Config(e.to_string()))?
        }
        None => Config::default(),
    };
    cfg.apply_cli_args(cli_args);

    tracing::info!(port = cfg.port, bind = %cfg.bind, "starting kvrepld");

    ServerBootstrap::run(cfg)
}

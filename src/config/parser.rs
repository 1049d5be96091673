//! Configuration file parsing: one `param value` pair per line, `#`
//! comments, blank lines ignored.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use super::Config;

/// Errors raised while parsing a config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigParseError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid line format at line {0}: {1}")]
    Format(usize, String),

    #[error("invalid value for parameter '{0}' at line {1}: {2}")]
    Value(String, usize, String),
}

/// Parses a `key value`-per-line config file into a `Config`. Unknown
/// parameters are logged and skipped rather than treated as an error, so a
/// config file written for a larger superset of parameters still loads.
pub fn parse_config_file(path: &Path) -> Result<Config, ConfigParseError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut config = Config::default();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut parts = line.splitn(2, ' ');
        let param = parts
            .next()
            .ok_or_else(|| ConfigParseError::Format(line_num + 1, line.to_string()))?
            .to_ascii_lowercase();
        let value = parts
            .next()
            .ok_or_else(|| ConfigParseError::Format(line_num + 1, line.to_string()))?
            .trim();

        apply_param(&mut config, &param, value, line_num + 1)?;
    }

    Ok(config)
}

fn apply_param(
    config: &mut Config,
    param: &str,
    value: &str,
    line_num: usize,
) -> Result<(), ConfigParseError> {
    match param {
        "port" => {
            config.port = value
                .parse()
                .map_err(|_| ConfigParseError::Value(param.to_string(), line_num, value.to_string()))?;
        }
        "bind" => {
            config.bind = value.to_string();
        }
        "dir" => {
            config.dir = Some(value.to_string());
        }
        "dbfilename" => {
            config.dbfilename = Some(value.to_string());
        }
        "replicaof" | "slaveof" => {
            let mut parts = value.split_whitespace();
            let host = parts
                .next()
                .ok_or_else(|| ConfigParseError::Value(param.to_string(), line_num, value.to_string()))?;
            let port = parts
                .next()
                .ok_or_else(|| ConfigParseError::Value(param.to_string(), line_num, value.to_string()))?;

            if host.eq_ignore_ascii_case("no") && port.eq_ignore_ascii_case("one") {
                config.replicaof = None;
            } else {
                let port: u16 = port.parse().map_err(|_| {
                    ConfigParseError::Value(param.to_string(), line_num, value.to_string())
                })?;
                config.replicaof = Some((host.to_string(), port));
            }
        }
        _ => {
            tracing::warn!(param, line = line_num, "unknown configuration parameter, skipping");
        }
    }

    Ok(())
}

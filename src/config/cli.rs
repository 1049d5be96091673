//! Command-line argument parsing.
//!
//! `--replicaof` takes its host and port as a single space-separated
//! argument (`--replicaof "localhost 6380"`), not two separate flags,
//! matching how the program this engine descends from took it.

use std::path::PathBuf;

/// Command-line arguments, each `None`/unset unless the flag was given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliArgs {
    /// Configuration file path.
    pub config: Option<PathBuf>,

    /// Port to listen on.
    pub port: Option<u16>,

    /// Address to bind to.
    pub bind: Option<String>,

    /// Master to replicate from, parsed out of a single `"host port"` flag.
    pub replicaof: Option<(String, u16)>,

    /// Directory for the snapshot file.
    pub dir: Option<String>,

    /// Snapshot filename.
    pub dbfilename: Option<String>,
}

/// Parses `std::env::args()`, exiting the process on `--help`/`--version`
/// or on a malformed flag.
pub fn parse_cli_args() -> CliArgs {
    parse_args(std::env::args().skip(1).collect())
}

fn parse_args(args: Vec<String>) -> CliArgs {
    let mut cli_args = CliArgs::default();
    let mut i = 0;

    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-v" => {
                println!("kvrepld {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                cli_args.config = Some(PathBuf::from(require_arg(&args, &mut i, "--config")));
            }
            "--port" | "-p" => {
                let value = require_arg(&args, &mut i, "--port");
                cli_args.port = Some(parse_or_exit(&value, "--port"));
            }
            "--bind" => {
                cli_args.bind = Some(require_arg(&args, &mut i, "--bind"));
            }
            "--replicaof" | "--slaveof" => {
                let value = require_arg(&args, &mut i, "--replicaof");
                cli_args.replicaof = Some(parse_replicaof(&value));
            }
            "--dir" => {
                cli_args.dir = Some(require_arg(&args, &mut i, "--dir"));
            }
            "--dbfilename" => {
                cli_args.dbfilename = Some(require_arg(&args, &mut i, "--dbfilename"));
            }
            arg if arg.ends_with(".conf") => {
                cli_args.config = Some(PathBuf::from(arg));
                i += 1;
            }
            arg => {
                eprintln!("Error: unknown argument: {}", arg);
                print_help();
                std::process::exit(1);
            }
        }
    }

    cli_args
}

/// Consumes `args[i]` (the flag itself) and `args[i + 1]` (its value),
/// advancing `i` past both. Exits the process if the value is missing.
fn require_arg(args: &[String], i: &mut usize, flag: &str) -> String {
    match args.get(*i + 1) {
        Some(value) => {
            *i += 2;
            value.clone()
        }
        None => {
            eprintln!("Error: missing argument for {}", flag);
            std::process::exit(1);
        }
    }
}

fn parse_or_exit<T: std::str::FromStr>(value: &str, flag: &str) -> T {
    value.parse().unwrap_or_else(|_| {
        eprintln!("Error: invalid value for {}: {}", flag, value);
        std::process::exit(1);
    })
}

/// `"<host> <port>"`, space-separated inside one argument.
fn parse_replicaof(value: &str) -> (String, u16) {
    let mut parts = value.split_whitespace();
    let host = parts.next().unwrap_or_else(|| {
        eprintln!("Error: --replicaof requires \"<host> <port>\"");
        std::process::exit(1);
    });
    let port = parts.next().unwrap_or_else(|| {
        eprintln!("Error: --replicaof requires \"<host> <port>\"");
        std::process::exit(1);
    });
    let port: u16 = parse_or_exit(port, "--replicaof");
    (host.to_string(), port)
}

fn print_help() {
    println!("Usage: kvrepld [OPTIONS] [/path/to/kvrepld.conf]");
    println!();
    println!("Options:");
    println!("  --help, -h                  Show this help message");
    println!("  --version, -v                Show version information");
    println!("  --config, -c  <file>         Configuration file to use");
    println!("  --port, -p    <port>         TCP port to listen on (default: 6379)");
    println!("  --bind        <address>      Interface to bind to (default: 127.0.0.1)");
    println!("  --replicaof   \"<host> <port>\" Make this server a replica of another instance");
    println!("  --dir         <dir>          Directory for the snapshot file");
    println!("  --dbfilename  <filename>     Snapshot filename");
}

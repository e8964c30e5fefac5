//! Command-line interface handling for the Arena gateway.
//!
//! This module provides command-line argument parsing using the `clap` crate.

use clap::{Arg, ArgMatches, Command};
use std::ffi::OsString;
use std::path::PathBuf;

/// Command line arguments parsed from user input.
///
/// Everything except the config path overrides a value from the
/// configuration file.
#[derive(Debug, Clone, PartialEq)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Optional override for the socket listener ("" disables it)
    pub socket_bind: Option<String>,
    /// Optional override for the WebSocket listener ("" disables it)
    pub websocket_bind: Option<String>,
    /// Optional override for the NATS server URL
    pub bus_url: Option<String>,
    /// Use the in-process bus instead of NATS
    pub local_bus: bool,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
}

impl CliArgs {
    /// Parses the process arguments.
    pub fn parse() -> Self {
        Self::from_matches(&command().get_matches())
    }

    /// Parses an explicit argument list; the first item is the program name.
    pub fn parse_from<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Self::from_matches(&command().get_matches_from(args))
    }

    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("config.toml")),
            socket_bind: matches.get_one::<String>("socket-bind").cloned(),
            websocket_bind: matches.get_one::<String>("websocket-bind").cloned(),
            bus_url: matches.get_one::<String>("bus-url").cloned(),
            local_bus: matches.get_flag("local-bus"),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
        }
    }
}

fn command() -> Command {
    Command::new("Arena Gateway")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Connects game bots to the Arena backend over TCP and WebSocket")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config.toml"),
        )
        .arg(
            Arg::new("socket-bind")
                .short('s')
                .long("socket-bind")
                .value_name("ADDRESS")
                .help("Socket listener address (e.g., 0.0.0.0:2000), empty to disable"),
        )
        .arg(
            Arg::new("websocket-bind")
                .short('w')
                .long("websocket-bind")
                .value_name("ADDRESS")
                .help("WebSocket listener address (e.g., 0.0.0.0:2001), empty to disable"),
        )
        .arg(
            Arg::new("bus-url")
                .short('b')
                .long("bus-url")
                .value_name("URL")
                .help("NATS server URL (e.g., nats://127.0.0.1:4222)"),
        )
        .arg(
            Arg::new("local-bus")
                .long("local-bus")
                .help("Run against an in-process bus instead of NATS")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .help("Output logs in JSON format")
                .action(clap::ArgAction::SetTrue),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = CliArgs::parse_from(["arena"]);
        assert_eq!(args.config_path, PathBuf::from("config.toml"));
        assert_eq!(args.socket_bind, None);
        assert_eq!(args.websocket_bind, None);
        assert_eq!(args.bus_url, None);
        assert!(!args.local_bus);
        assert_eq!(args.log_level, None);
        assert!(!args.json_logs);
    }

    #[test]
    fn test_overrides() {
        let args = CliArgs::parse_from([
            "arena",
            "--config",
            "prod.toml",
            "--socket-bind",
            "127.0.0.1:2100",
            "-w",
            "",
            "-b",
            "nats://10.0.0.5:4222",
            "--local-bus",
            "-l",
            "debug",
            "--json-logs",
        ]);
        assert_eq!(args.config_path, PathBuf::from("prod.toml"));
        assert_eq!(args.socket_bind.as_deref(), Some("127.0.0.1:2100"));
        assert_eq!(args.websocket_bind.as_deref(), Some(""));
        assert_eq!(args.bus_url.as_deref(), Some("nats://10.0.0.5:4222"));
        assert!(args.local_bus);
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(args.json_logs);
    }
}

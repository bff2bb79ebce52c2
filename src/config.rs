use std::net::SocketAddr;

use clap::{Parser, ValueEnum};
use dir_client::DEFAULT_HISTORY_WINDOW;

#[derive(Parser, Debug, Clone)]
#[command(version, about = "In-memory directory store for development and tests")]
pub struct ServerConfig {
    /// Address to serve the gRPC API on
    #[arg(long, env = "DIRSTORE_LISTEN", default_value = "127.0.0.1:50061")]
    pub listen: SocketAddr,

    /// Number of past changes kept for watches to resume from
    #[arg(long, env = "DIRSTORE_HISTORY_WINDOW", default_value_t = DEFAULT_HISTORY_WINDOW)]
    pub history_window: usize,

    #[arg(long, short, env = "DIRSTORE_LOG_LEVEL", default_value = "info", value_enum)]
    pub log_level: LogLevel,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_tracing_level(self) -> Option<tracing::Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(tracing::Level::ERROR),
            LogLevel::Warn => Some(tracing::Level::WARN),
            LogLevel::Info => Some(tracing::Level::INFO),
            LogLevel::Debug => Some(tracing::Level::DEBUG),
            LogLevel::Trace => Some(tracing::Level::TRACE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ServerConfig::try_parse_from(["dirstore-server"]).unwrap();
        assert_eq!(config.listen, "127.0.0.1:50061".parse::<SocketAddr>().unwrap());
        assert_eq!(config.history_window, DEFAULT_HISTORY_WINDOW);
        assert_eq!(config.log_level, LogLevel::Info);
    }

    #[test]
    fn flags_override_defaults() {
        let config = ServerConfig::try_parse_from([
            "dirstore-server",
            "--listen",
            "0.0.0.0:7000",
            "--history-window",
            "10",
            "-l",
            "off",
        ])
        .unwrap();
        assert_eq!(config.listen.port(), 7000);
        assert_eq!(config.history_window, 10);
        assert_eq!(config.log_level.to_tracing_level(), None);
    }
}

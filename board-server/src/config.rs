//! Command-line and environment configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::validation::DEFAULT_MAX_MESSAGE_BYTES;

/// Default port for the sync server.
pub const DEFAULT_PORT: u16 = 4000;
/// Default keepalive ping interval (seconds).
pub const DEFAULT_KEEPALIVE_SECS: u64 = 120;
/// Default burst capacity for rate limiting (messages).
pub const DEFAULT_RATE_LIMIT_BURST: u32 = 600;
/// Default sustained rate for rate limiting (messages per second).
pub const DEFAULT_RATE_LIMIT_SUSTAINED: u32 = 240;
/// Default browser origin allowed to open sockets.
pub const DEFAULT_ALLOWED_ORIGIN: &str = "http://localhost:3000";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Sketchboard session sync server.
#[derive(Debug, Clone, Parser)]
#[command(name = "sketchboard", version, about)]
pub struct Cli {
    /// Address to bind.
    #[arg(long, env = "SKETCHBOARD_HOST", default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub host: IpAddr,

    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Browser origins allowed to open sockets (comma separated).
    #[arg(
        long,
        env = "ALLOWED_ORIGINS",
        value_delimiter = ',',
        default_value = DEFAULT_ALLOWED_ORIGIN
    )]
    pub allowed_origins: Vec<String>,

    /// Seconds between keep-alive pings on idle connections.
    #[arg(long, env = "SKETCHBOARD_KEEPALIVE_SECS", default_value_t = DEFAULT_KEEPALIVE_SECS)]
    pub keepalive_secs: u64,

    /// Largest accepted WebSocket message.
    #[arg(long, env = "SKETCHBOARD_MAX_MESSAGE_BYTES", default_value_t = DEFAULT_MAX_MESSAGE_BYTES)]
    pub max_message_bytes: usize,

    /// Per-connection burst allowance (messages).
    #[arg(long, env = "WS_RATE_LIMIT_BURST", default_value_t = DEFAULT_RATE_LIMIT_BURST)]
    pub rate_limit_burst: u32,

    /// Per-connection sustained rate (messages per second).
    #[arg(long, env = "WS_RATE_LIMIT_SUSTAINED", default_value_t = DEFAULT_RATE_LIMIT_SUSTAINED)]
    pub rate_limit_sustained: u32,

    /// Directory for saved boards; boards are kept in memory when unset.
    #[arg(long, env = "SKETCHBOARD_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// JSON token table for the board API. Ignored when `--jwt-secret` is set.
    #[arg(long, env = "SKETCHBOARD_TOKENS_FILE")]
    pub tokens_file: Option<PathBuf>,

    /// Secret for signing account tokens; enables `/api/auth/signup` and
    /// `/api/auth/login`.
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    /// Log output format.
    #[arg(long, env = "RUST_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

impl Cli {
    /// Socket address to bind.
    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Settings for the connection gateway.
    #[must_use]
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            allowed_origins: self
                .allowed_origins
                .iter()
                .map(|o| o.trim().trim_end_matches('/').to_string())
                .filter(|o| !o.is_empty())
                .collect(),
            keepalive_interval: Duration::from_secs(self.keepalive_secs.max(1)),
            max_message_bytes: self.max_message_bytes,
            rate_limit_burst: self.rate_limit_burst,
            rate_limit_sustained: self.rate_limit_sustained,
        }
    }
}

/// Connection gateway settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Origins allowed to upgrade, compared exactly.
    pub allowed_origins: Vec<String>,
    /// Interval between server pings.
    pub keepalive_interval: Duration,
    /// Largest accepted inbound frame.
    pub max_message_bytes: usize,
    /// Rate limiter burst capacity.
    pub rate_limit_burst: u32,
    /// Rate limiter refill per second.
    pub rate_limit_sustained: u32,
}

impl GatewayConfig {
    /// Whether a browser origin may open a socket.
    #[must_use]
    pub fn origin_allowed(&self, origin: &str) -> bool {
        let origin = origin.trim_end_matches('/');
        self.allowed_origins.iter().any(|allowed| allowed == origin)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![DEFAULT_ALLOWED_ORIGIN.to_string()],
            keepalive_interval: Duration::from_secs(DEFAULT_KEEPALIVE_SECS),
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            rate_limit_burst: DEFAULT_RATE_LIMIT_BURST,
            rate_limit_sustained: DEFAULT_RATE_LIMIT_SUSTAINED,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["sketchboard"]).expect("parse");
        assert_eq!(cli.port, DEFAULT_PORT);
        assert_eq!(cli.bind_addr().to_string(), "127.0.0.1:4000");
        assert_eq!(cli.gateway_config(), GatewayConfig::default());
        assert!(cli.data_dir.is_none());
    }

    #[test]
    fn test_jwt_secret_flag() {
        let cli = Cli::try_parse_from(["sketchboard", "--jwt-secret", "s3cret"]).expect("parse");
        assert_eq!(cli.jwt_secret.as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_origin_list_parsing() {
        let cli = Cli::try_parse_from([
            "sketchboard",
            "--allowed-origins",
            "https://draw.example.com/, http://localhost:5173",
        ])
        .expect("parse");
        let config = cli.gateway_config();
        assert_eq!(
            config.allowed_origins,
            vec![
                "https://draw.example.com".to_string(),
                "http://localhost:5173".to_string()
            ]
        );
        assert!(config.origin_allowed("https://draw.example.com"));
        assert!(config.origin_allowed("http://localhost:5173/"));
        assert!(!config.origin_allowed("http://localhost:3000"));
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::try_parse_from([
            "sketchboard",
            "--port",
            "9000",
            "--keepalive-secs",
            "5",
            "--rate-limit-burst",
            "10",
            "--log-format",
            "json",
        ])
        .expect("parse");
        let config = cli.gateway_config();
        assert_eq!(cli.port, 9000);
        assert_eq!(config.keepalive_interval, Duration::from_secs(5));
        assert_eq!(config.rate_limit_burst, 10);
        assert_eq!(cli.log_format, LogFormat::Json);
    }
}

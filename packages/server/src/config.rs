//! Command-line and environment configuration.

use std::time::Duration;

use clap::Parser;

use crate::{error::ServerError, usecase::HistoryLimits};

/// Hiroba chat server
#[derive(Debug, Clone, Parser)]
#[command(name = "hiroba-server", version, about = "Real-time multi-room chat server")]
pub struct ServerArgs {
    /// Address to bind
    #[arg(long, env = "HIROBA_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "HIROBA_PORT", default_value_t = 8080)]
    pub port: u16,

    /// SQLite URL such as `sqlite://hiroba.db`; in-memory storage when omitted
    #[arg(long, env = "HIROBA_DATABASE_URL")]
    pub database_url: Option<String>,

    /// Interval between persistence flush cycles, in milliseconds
    #[arg(long, env = "HIROBA_FLUSH_INTERVAL_MS", default_value_t = 1000)]
    pub flush_interval_ms: u64,

    /// Maximum number of cached messages committed per channel and cycle
    #[arg(long, env = "HIROBA_FLUSH_BATCH_SIZE", default_value_t = 100)]
    pub flush_batch_size: usize,

    /// Interval between WebSocket pings, in seconds
    #[arg(long, env = "HIROBA_HEARTBEAT_INTERVAL_SECS", default_value_t = 15)]
    pub heartbeat_interval_secs: u64,

    /// Silence after which a WebSocket client is considered gone, in seconds
    #[arg(long, env = "HIROBA_CLIENT_TIMEOUT_SECS", default_value_t = 45)]
    pub client_timeout_secs: u64,

    /// History page size when the client does not ask for one
    #[arg(long, env = "HIROBA_HISTORY_DEFAULT_LIMIT", default_value_t = 50)]
    pub history_default_limit: usize,

    /// Largest history page a client may ask for
    #[arg(long, env = "HIROBA_HISTORY_MAX_LIMIT", default_value_t = 200)]
    pub history_max_limit: usize,

    /// Default log level when `RUST_LOG` is not set
    #[arg(long, env = "HIROBA_LOG_LEVEL", default_value = "debug")]
    pub log_level: String,
}

impl ServerArgs {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validate the arguments into runtime settings.
    pub fn settings(&self) -> Result<ServerSettings, ServerError> {
        if self.flush_interval_ms == 0 {
            return Err(ServerError::Config(
                "flush interval must be positive".to_string(),
            ));
        }
        if self.flush_batch_size == 0 {
            return Err(ServerError::Config(
                "flush batch size must be positive".to_string(),
            ));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(ServerError::Config(
                "heartbeat interval must be positive".to_string(),
            ));
        }
        if self.client_timeout_secs <= self.heartbeat_interval_secs {
            return Err(ServerError::Config(format!(
                "client timeout ({}s) must exceed the heartbeat interval ({}s)",
                self.client_timeout_secs, self.heartbeat_interval_secs
            )));
        }
        if self.history_default_limit > self.history_max_limit {
            return Err(ServerError::Config(format!(
                "default history limit ({}) exceeds the maximum ({})",
                self.history_default_limit, self.history_max_limit
            )));
        }

        Ok(ServerSettings {
            database_url: self.database_url.clone(),
            flush_interval: Duration::from_millis(self.flush_interval_ms),
            flush_batch_size: self.flush_batch_size,
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs),
            client_timeout: Duration::from_secs(self.client_timeout_secs),
            history: HistoryLimits {
                default_limit: self.history_default_limit,
                max_limit: self.history_max_limit,
            },
        })
    }
}

/// Validated runtime settings
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub database_url: Option<String>,
    pub flush_interval: Duration,
    pub flush_batch_size: usize,
    pub heartbeat_interval: Duration,
    pub client_timeout: Duration,
    pub history: HistoryLimits,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            database_url: None,
            flush_interval: Duration::from_secs(1),
            flush_batch_size: 100,
            heartbeat_interval: Duration::from_secs(15),
            client_timeout: Duration::from_secs(45),
            history: HistoryLimits::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_server_settings_default() {
        // テスト項目: 引数なしの設定値が ServerSettings::default() と一致する
        // when (操作):
        let args = ServerArgs::try_parse_from(["hiroba-server"]).unwrap();
        let settings = args.settings().unwrap();

        // then (期待する結果):
        let expected = ServerSettings::default();
        assert_eq!(settings.flush_interval, expected.flush_interval);
        assert_eq!(settings.flush_batch_size, expected.flush_batch_size);
        assert_eq!(settings.heartbeat_interval, expected.heartbeat_interval);
        assert_eq!(settings.client_timeout, expected.client_timeout);
        assert_eq!(settings.history, expected.history);
    }

    #[test]
    fn test_timeout_must_exceed_heartbeat() {
        // テスト項目: クライアントタイムアウトがハートビート間隔以下なら設定エラー
        // given (前提条件):
        let args = ServerArgs::try_parse_from([
            "hiroba-server",
            "--heartbeat-interval-secs",
            "30",
            "--client-timeout-secs",
            "30",
        ])
        .unwrap();

        // when (操作):
        let result = args.settings();

        // then (期待する結果):
        assert!(matches!(result, Err(ServerError::Config(_))));
    }

    #[test]
    fn test_bind_addr() {
        // テスト項目: host と port からバインドアドレスを組み立てる
        let args =
            ServerArgs::try_parse_from(["hiroba-server", "--host", "0.0.0.0", "-p", "9000"])
                .unwrap();
        assert_eq!(args.bind_addr(), "0.0.0.0:9000");
    }
}

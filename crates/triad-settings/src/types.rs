//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so partial
//! JSON files deserialize with missing fields taking their defaults.

use serde::{Deserialize, Serialize};

/// Root settings type.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TriadSettings {
    pub server: ServerSettings,
    pub backend: BackendSettings,
    pub storage: StorageSettings,
    pub logging: LoggingSettings,
}

/// HTTP listener settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    pub port: u16,
    /// Interval between SSE keep-alive comments.
    pub keep_alive_secs: u64,
    /// Events a run may get ahead of a slow observer.
    pub event_buffer: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            keep_alive_secs: 15,
            event_buffer: 16,
        }
    }
}

/// Completion backend settings. Retry policy is fixed and not listed here.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackendSettings {
    /// Chat-completions endpoint.
    pub api_url: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    /// Backend identifiers in priority order.
    pub backends: Vec<String>,
    pub max_output_tokens: u32,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            api_url: "https://openrouter.ai/api/v1/chat/completions".to_string(),
            api_key_env: "OPENROUTER_API_KEY".to_string(),
            backends: vec![
                "google/gemma-3-27b-it:free".to_string(),
                "google/gemma-3-12b-it:free".to_string(),
                "mistralai/mistral-small-3.1-24b-instruct:free".to_string(),
                "meta-llama/llama-3.3-70b-instruct:free".to_string(),
            ],
            max_output_tokens: 1500,
            connect_timeout_ms: 3_000,
            request_timeout_ms: 10_000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    /// SQLite file. Relative paths resolve under `~/.triad`.
    pub db_path: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            db_path: "database/triad.db".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    pub level: String,
    /// JSON lines when true, plain text otherwise.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

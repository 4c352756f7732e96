//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`TriadSettings::default()`]
//! 2. If `~/.triad/settings.json` exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::TriadSettings;

/// Root of per-user state (`~/.triad`).
pub fn triad_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".triad")
}

/// Resolve the path to the settings file (`~/.triad/settings.json`).
pub fn settings_path() -> PathBuf {
    triad_home().join("settings.json")
}

/// Load settings from `~/.triad/settings.json` with env var overrides.
pub fn load_settings() -> (TriadSettings, Option<SettingsError>) {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file means defaults. A file that cannot be read, parsed or
/// validated is returned as the error next to usable settings: defaults
/// with the env layer still applied.
pub fn load_settings_from_path(path: &Path) -> (TriadSettings, Option<SettingsError>) {
    resolve_with(path, env_lookup)
}

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn load_with<F>(path: &Path, lookup: F) -> Result<TriadSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let mut settings = load_file_layer(path)?;
    apply_overrides_from(&mut settings, lookup);
    validate(&settings)?;
    Ok(settings)
}

fn resolve_with<F>(path: &Path, lookup: F) -> (TriadSettings, Option<SettingsError>)
where
    F: Fn(&str) -> Option<String>,
{
    let file_error = match load_with(path, &lookup) {
        Ok(settings) => return (settings, None),
        Err(e) => e,
    };

    let mut settings = TriadSettings::default();
    apply_overrides_from(&mut settings, &lookup);
    if validate(&settings).is_err() {
        settings = TriadSettings::default();
    }
    (settings, Some(file_error))
}

/// Defaults merged with the settings file, without env overrides.
pub fn load_file_layer(path: &Path) -> Result<TriadSettings> {
    let parse_error = |source| SettingsError::Parse {
        path: path.to_owned(),
        source,
    };
    let defaults = serde_json::to_value(TriadSettings::default()).map_err(parse_error)?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_owned(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content).map_err(parse_error)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    serde_json::from_value(merged).map_err(parse_error)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Reject settings no run could work with.
pub fn validate(settings: &TriadSettings) -> Result<()> {
    if settings.backend.backends.iter().all(|b| b.trim().is_empty()) {
        return Err(SettingsError::InvalidValue {
            key: "backend.backends",
            reason: "must name at least one backend",
        });
    }
    if settings.backend.max_output_tokens == 0 {
        return Err(SettingsError::InvalidValue {
            key: "backend.maxOutputTokens",
            reason: "must be positive",
        });
    }
    if settings.server.keep_alive_secs == 0 {
        return Err(SettingsError::InvalidValue {
            key: "server.keepAliveSecs",
            reason: "must be positive",
        });
    }
    if settings.server.event_buffer == 0 {
        return Err(SettingsError::InvalidValue {
            key: "server.eventBuffer",
            reason: "must be positive",
        });
    }
    Ok(())
}

/// Apply `TRIAD_*` overrides read through `lookup`. Invalid values are logged and
/// ignored, falling back to file/default.
pub fn apply_overrides_from<F>(settings: &mut TriadSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let string = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = string("TRIAD_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = checked("TRIAD_PORT", string("TRIAD_PORT"), |v| {
        parse_u16_range(v, 1, 65535)
    }) {
        settings.server.port = v;
    }

    // ── Storage ─────────────────────────────────────────────────────
    if let Some(v) = string("TRIAD_DB_PATH") {
        settings.storage.db_path = v;
    }

    // ── Backend ─────────────────────────────────────────────────────
    if let Some(v) = string("TRIAD_API_URL") {
        settings.backend.api_url = v;
    }
    if let Some(v) = checked("TRIAD_BACKENDS", string("TRIAD_BACKENDS"), parse_backend_list) {
        settings.backend.backends = v;
    }
    if let Some(v) = checked(
        "TRIAD_MAX_OUTPUT_TOKENS",
        string("TRIAD_MAX_OUTPUT_TOKENS"),
        |v| parse_u32_range(v, 1, 32_768),
    ) {
        settings.backend.max_output_tokens = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = string("TRIAD_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = checked("TRIAD_LOG_JSON", string("TRIAD_LOG_JSON"), parse_bool) {
        settings.logging.json = v;
    }
}

fn checked<T>(name: &str, raw: Option<String>, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
    let val = raw?;
    let result = parse(&val);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid env override, ignoring");
    }
    result
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Comma-separated identifiers; blanks dropped. None when nothing remains.
pub fn parse_backend_list(val: &str) -> Option<Vec<String>> {
    let ids: Vec<String> = val
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();
    (!ids.is_empty()).then_some(ids)
}

/// Resolve a configured database path: absolute paths as-is, relative ones
/// under `~/.triad`.
pub fn resolve_db_path(settings: &TriadSettings) -> PathBuf {
    let configured = PathBuf::from(&settings.storage.db_path);
    if configured.is_absolute() {
        configured
    } else {
        triad_home().join(configured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"server": {"port": 8000, "host": "localhost"}});
        let source = serde_json::json!({"server": {"port": 9090}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "localhost");
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"backends": ["a", "b", "c"]});
        let source = serde_json::json!({"backends": ["z"]});
        assert_eq!(deep_merge(target, source)["backends"], serde_json::json!(["z"]));
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    // ── file layer ──────────────────────────────────────────────────

    #[test]
    fn missing_file_returns_defaults() {
        let settings = load_file_layer(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings, TriadSettings::default());
    }

    #[test]
    fn partial_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"port": 9090}, "backend": {"backends": ["only/one"]}}"#,
        )
        .unwrap();

        let settings = load_file_layer(&path).unwrap();
        assert_eq!(settings.server.port, 9090);
        assert_eq!(settings.server.keep_alive_secs, 15);
        assert_eq!(settings.backend.backends, vec!["only/one"]);
        assert_eq!(settings.backend.max_output_tokens, 1500);
    }

    #[test]
    fn invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();
        assert!(matches!(
            load_file_layer(&path),
            Err(SettingsError::Parse { path: p, .. }) if p == path
        ));
    }

    #[test]
    fn empty_backend_list_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"backend": {"backends": []}}"#).unwrap();

        let settings = load_file_layer(&path).unwrap();
        assert!(matches!(
            validate(&settings),
            Err(SettingsError::InvalidValue {
                key: "backend.backends",
                ..
            })
        ));
    }

    #[test]
    fn wrong_type_in_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"port": "eighty"}}"#).unwrap();
        assert!(matches!(
            load_file_layer(&path),
            Err(SettingsError::Parse { .. })
        ));
    }

    // ── startup fallback ────────────────────────────────────────────

    #[test]
    fn env_overrides_survive_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"keepAliveSecs": 0}}"#).unwrap();

        let (settings, error) = resolve_with(
            &path,
            env(&[("TRIAD_PORT", "9999"), ("TRIAD_BACKENDS", "solo/model")]),
        );
        assert_eq!(settings.server.port, 9999);
        assert_eq!(settings.server.keep_alive_secs, 15);
        assert_eq!(settings.backend.backends, vec!["solo/model"]);
        assert!(matches!(
            error,
            Some(SettingsError::InvalidValue {
                key: "server.keepAliveSecs",
                ..
            })
        ));
    }

    #[test]
    fn env_overrides_survive_unparseable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();

        let (settings, error) = resolve_with(&path, env(&[("TRIAD_DB_PATH", "/srv/triad.db")]));
        assert_eq!(settings.storage.db_path, "/srv/triad.db");
        assert!(matches!(error, Some(SettingsError::Parse { .. })));
    }

    #[test]
    fn valid_file_reports_no_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"port": 7000}}"#).unwrap();

        let (settings, error) = resolve_with(&path, env(&[("TRIAD_HOST", "0.0.0.0")]));
        assert!(error.is_none());
        assert_eq!(settings.server.port, 7000);
        assert_eq!(settings.server.host, "0.0.0.0");
    }

    // ── env overrides ───────────────────────────────────────────────

    #[test]
    fn env_overrides_apply() {
        let mut settings = TriadSettings::default();
        apply_overrides_from(
            &mut settings,
            env(&[
                ("TRIAD_HOST", "0.0.0.0"),
                ("TRIAD_PORT", "9999"),
                ("TRIAD_DB_PATH", "/var/lib/triad.db"),
                ("TRIAD_BACKENDS", " a/one , b/two ,, "),
                ("TRIAD_MAX_OUTPUT_TOKENS", "800"),
                ("TRIAD_LOG_LEVEL", "debug"),
                ("TRIAD_LOG_JSON", "off"),
            ]),
        );
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 9999);
        assert_eq!(settings.storage.db_path, "/var/lib/triad.db");
        assert_eq!(settings.backend.backends, vec!["a/one", "b/two"]);
        assert_eq!(settings.backend.max_output_tokens, 800);
        assert_eq!(settings.logging.level, "debug");
        assert!(!settings.logging.json);
    }

    #[test]
    fn invalid_env_values_ignored() {
        let mut settings = TriadSettings::default();
        apply_overrides_from(
            &mut settings,
            env(&[
                ("TRIAD_PORT", "0"),
                ("TRIAD_MAX_OUTPUT_TOKENS", "lots"),
                ("TRIAD_BACKENDS", " , "),
                ("TRIAD_LOG_JSON", "maybe"),
                ("TRIAD_HOST", "  "),
            ]),
        );
        assert_eq!(settings, TriadSettings::default());
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_values() {
        assert_eq!(parse_bool("YES"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("sure"), None);
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u16_range("8080", 1, 65535), Some(8080));
        assert_eq!(parse_u16_range("70000", 1, 65535), None);
        assert_eq!(parse_u32_range("32769", 1, 32_768), None);
    }

    #[test]
    fn db_path_resolution() {
        let mut settings = TriadSettings::default();
        assert!(resolve_db_path(&settings).ends_with(".triad/database/triad.db"));
        settings.storage.db_path = "/abs/x.db".into();
        assert_eq!(resolve_db_path(&settings), PathBuf::from("/abs/x.db"));
    }
}

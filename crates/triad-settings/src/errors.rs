use std::path::PathBuf;

/// Why a settings layer could not be used.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{} is not valid triad settings: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid setting {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        reason: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, SettingsError>;

//! Plugin error types.

use emuchievements_mount::MountError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PluginError {
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("host {actual} is older than the required {required}")]
    IncompatibleHost { required: String, actual: String },

    #[error("achievement service error: {0}")]
    Service(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("mount error: {0}")]
    Mount(#[from] MountError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("semver error: {0}")]
    Semver(#[from] semver::Error),
}

impl From<PluginError> for MountError {
    fn from(e: PluginError) -> Self {
        match e {
            PluginError::Mount(inner) => inner,
            other => MountError::Collaborator(other.to_string()),
        }
    }
}

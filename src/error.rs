pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Encounter IO error, {0}")]
    IoError(#[from] std::io::Error),
    #[error("Tokio Runtime error: {0}")]
    TokioRuntimeError(#[from] TokioRuntimeError),
    #[cfg(feature = "serde")]
    #[error("Serde error: {0}")]
    SerdeError(#[from] serde_json::Error),
    #[error("Error: {0}")]
    Custom(String),
}

/// Rejected configuration. The value that produced it is never applied.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} = {value} is out of range, expected {expected}")]
    OutOfRange {
        name: &'static str,
        value: String,
        expected: &'static str,
    },
    #[error("Update interval must be greater than zero")]
    ZeroUpdateInterval,
    #[error("Unknown queue mode \"{0}\"")]
    UnknownMode(String),
    #[error("Failed to load config, {0}")]
    Load(String),
}

impl ConfigError {
    pub(crate) fn out_of_range<V: ToString>(
        name: &'static str,
        value: V,
        expected: &'static str,
    ) -> Self {
        ConfigError::OutOfRange {
            name,
            value: value.to_string(),
            expected,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TokioRuntimeError {
    #[error("No tokio runtime in the current context, {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

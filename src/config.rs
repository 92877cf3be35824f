use std::path::Path;

use figment::{
    providers::{Env, Format, Json, Toml},
    Figment,
};
use tracing::debug;

use crate::cells::queue::RemConfig;
use crate::error::{ConfigError, Error};

/// Prefix of environment variables overriding file values, e.g. `RATTAN_REM_TARGET=70`.
pub const ENV_PREFIX: &str = "RATTAN_REM_";

fn rem_figment(path: &Path) -> Result<Figment, ConfigError> {
    let figment = match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Figment::new().merge(Json::file(path)),
        Some("toml") => Figment::new().merge(Toml::file(path)),
        _ => {
            return Err(ConfigError::Load(format!(
                "Unsupported config file {}, expect .json or .toml",
                path.display()
            )))
        }
    };
    Ok(figment.merge(Env::prefixed(ENV_PREFIX)))
}

/// Load a REM config from a JSON or TOML file, overridden by `RATTAN_REM_*` variables.
/// Missing keys take their default values; the result is validated.
pub fn load_rem_config<T: AsRef<Path>>(path: T) -> Result<RemConfig, Error> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(ConfigError::Load(format!("No config file at {}", path.display())).into());
    }
    let config: RemConfig = rem_figment(path)?
        .extract()
        .map_err(|e| ConfigError::Load(e.to_string()))?;
    config.validate()?;
    debug!(?config, "Load REM config from {}", path.display());
    Ok(config)
}

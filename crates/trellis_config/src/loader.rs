//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::PlacerConfig;
use std::path::Path;

/// Loads and validates a `trellis.toml` configuration from a directory.
///
/// Reads `<dir>/trellis.toml`, parses it, and validates the values.
pub fn load_config(dir: &Path) -> Result<PlacerConfig, ConfigError> {
    let config_path = dir.join("trellis.toml");
    let content = std::fs::read_to_string(&config_path)?;
    load_config_from_str(&content)
}

/// Parses and validates a `trellis.toml` configuration from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<PlacerConfig, ConfigError> {
    let config: PlacerConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Validates that configuration values are usable by the engine.
fn validate_config(config: &PlacerConfig) -> Result<(), ConfigError> {
    if config.num_threads == 0 {
        return Err(ConfigError::ValidationError(
            "num_threads must be at least 1".to_string(),
        ));
    }
    if config.trellis_width == 0 {
        return Err(ConfigError::ValidationError(
            "trellis_width must be at least 1".to_string(),
        ));
    }
    if !config.bound_weight.is_finite() || config.bound_weight < 0.0 {
        return Err(ConfigError::ValidationError(
            "bound_weight must be finite and non-negative".to_string(),
        ));
    }
    if !config.aspect_ratio_weight.is_finite() || config.aspect_ratio_weight < 0.0 {
        return Err(ConfigError::ValidationError(
            "aspect_ratio_weight must be finite and non-negative".to_string(),
        ));
    }
    Ok(())
}

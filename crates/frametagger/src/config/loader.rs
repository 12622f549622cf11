use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.library_directory.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "library_directory must not be empty".to_string(),
        });
    }

    if config.canvas.width == 0 || config.canvas.height == 0 {
        return Err(ConfigError::Validation {
            message: format!(
                "Canvas dimensions must be positive, got {}x{}",
                config.canvas.width, config.canvas.height
            ),
        });
    }

    if !(0.0..1.0).contains(&config.aspect_tolerance) {
        return Err(ConfigError::Validation {
            message: format!(
                "aspect_tolerance must be in [0, 1), got {}",
                config.aspect_tolerance
            ),
        });
    }

    if let Err(e) = config.default_crop_box.validate() {
        return Err(ConfigError::Validation {
            message: format!("default_crop_box: {}", e),
        });
    }

    if config.frame_jpeg_quality == 0 || config.frame_jpeg_quality > 100 {
        return Err(ConfigError::Validation {
            message: format!(
                "frame_jpeg_quality must be in 1..=100, got {}",
                config.frame_jpeg_quality
            ),
        });
    }

    Ok(())
}

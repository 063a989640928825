use super::{
    types::{AuthMethod, Config},
    ConfigError,
};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - An API key is present when the api_key method is selected
/// - Batch size and fetch timeout are positive
/// - Accepted and rejected files go to different folders
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.auth.method == AuthMethod::ApiKey
        && config.auth.api_key.as_ref().is_none_or(|k| k.is_empty())
    {
        return Err(ConfigError::ValidationError(
            "auth.api_key must be set when auth.method = \"api_key\"".to_string(),
        ));
    }

    if config.batch.batch_size == 0 {
        return Err(ConfigError::ValidationError(
            "batch.batch_size must be greater than 0".to_string(),
        ));
    }

    if config.batch.fetch_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "batch.fetch_timeout_secs must be greater than 0".to_string(),
        ));
    }

    if config.archive.accepted_dir == config.archive.rejected_dir {
        return Err(ConfigError::ValidationError(
            "archive.accepted_dir and archive.rejected_dir must differ".to_string(),
        ));
    }

    Ok(())
}

//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{
    ClientSection, CourierConfig, LogOutput, LoggingConfig, RetrySection, SchedulerSection,
};

/// Validates the entire configuration.
pub fn validate_config(config: &CourierConfig) -> ConfigResult<()> {
    validate_logging(&config.logging)?;
    validate_client(&config.client)?;
    validate_scheduler(&config.scheduler)?;
    config.permissions.to_provider()?;
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::validation(
            "logging.file_path is required when logging.output is `file`",
        ));
    }
    Ok(())
}

fn validate_client(client: &ClientSection) -> ConfigResult<()> {
    if client.timeout_ms == 0 {
        return Err(ConfigError::validation("Timeout must be greater than 0"));
    }

    if client.rate_limit.capacity == 0 {
        return Err(ConfigError::validation(
            "Rate limit capacity must be greater than 0",
        ));
    }

    if client.rate_limit.period_ms == 0 {
        return Err(ConfigError::validation(
            "Rate limit period must be greater than 0",
        ));
    }

    if let Some(url) = &client.base_url {
        validate_url(url)?;
    }

    validate_retry_config(&client.retry)
}

/// Validates retry configuration.
fn validate_retry_config(retry: &RetrySection) -> ConfigResult<()> {
    if retry.initial_delay_ms == 0 {
        return Err(ConfigError::validation(
            "Initial retry delay must be greater than 0",
        ));
    }

    if retry.max_delay_ms < retry.initial_delay_ms {
        return Err(ConfigError::validation(
            "Max retry delay must be greater than or equal to initial delay",
        ));
    }

    if retry.backoff_multiplier.is_nan() || retry.backoff_multiplier < 1.0 {
        return Err(ConfigError::validation(
            "Backoff multiplier must be at least 1.0",
        ));
    }

    Ok(())
}

fn validate_scheduler(scheduler: &SchedulerSection) -> ConfigResult<()> {
    if scheduler.workers == 0 {
        return Err(ConfigError::validation("Worker count must be greater than 0"));
    }
    if scheduler.queue_capacity == 0 {
        return Err(ConfigError::validation(
            "Queue capacity must be greater than 0",
        ));
    }
    Ok(())
}

/// Validates a URL.
fn validate_url(url: &str) -> ConfigResult<()> {
    if url.is_empty() {
        return Err(ConfigError::invalid_url(url, "URL is empty"));
    }

    let valid_schemes = ["http://", "https://"];
    if !valid_schemes.iter().any(|s| url.starts_with(s)) {
        return Err(ConfigError::invalid_url(
            url,
            format!("URL must start with one of: {:?}", valid_schemes),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        let config = CourierConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_zero_capacity() {
        let mut config = CourierConfig::default();
        config.client.rate_limit.capacity = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));

        let mut config = CourierConfig::default();
        config.scheduler.queue_capacity = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_retry() {
        let mut config = CourierConfig::default();
        config.client.retry.max_delay_ms = 10;
        assert!(validate_config(&config).is_err());

        let mut config = CourierConfig::default();
        config.client.retry.backoff_multiplier = f64::NAN;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_base_url() {
        let mut config = CourierConfig::default();
        config.client.base_url = Some("ws://localhost:8080".to_string());
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidUrl { .. })
        ));

        config.client.base_url = Some("https://api.example.com/bot123".to_string());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_permission_keys() {
        let mut config = CourierConfig::default();
        config
            .permissions
            .actors
            .insert("admin".to_string(), Default::default());
        assert!(validate_config(&config).is_err());

        config.permissions.actors.clear();
        config
            .permissions
            .actors
            .insert("1001".to_string(), Default::default());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_file_output_needs_path() {
        let mut config = CourierConfig::default();
        config.logging.output = LogOutput::File;
        assert!(validate_config(&config).is_err());

        config.logging.file_path = Some("logs/courier.log".into());
        assert!(validate_config(&config).is_ok());
    }
}

use crate::config::types::{
    BrowserConfig, Config, EngineConfig, ProxyConfig, QueueConfig, UserAgentConfig,
};
use crate::model::ProxyDescriptor;
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_engine_config(&config.engine)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_browser_config(&config.browser)?;
    validate_proxy_config(&config.proxy)?;
    validate_queue_config(&config.queue)?;
    Ok(())
}

/// Validates fetch pipeline configuration
fn validate_engine_config(config: &EngineConfig) -> Result<(), ConfigError> {
    if config.concurrency < 1 || config.concurrency > 256 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 256, got {}",
            config.concurrency
        )));
    }

    if config.default_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "default_timeout_ms must be > 0".to_string(),
        ));
    }

    if config.backoff_max_ms < config.backoff_base_ms {
        return Err(ConfigError::Validation(format!(
            "backoff_max_ms ({}) must be >= backoff_base_ms ({})",
            config.backoff_max_ms, config.backoff_base_ms
        )));
    }

    if config.default_retries > 20 {
        return Err(ConfigError::Validation(format!(
            "default_retries must be <= 20, got {}",
            config.default_retries
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

fn validate_browser_config(config: &BrowserConfig) -> Result<(), ConfigError> {
    if config.enabled && config.max_contexts == 0 {
        return Err(ConfigError::Validation(
            "max_contexts must be >= 1 when the browser is enabled".to_string(),
        ));
    }

    if let Some(path) = &config.executable {
        if !path.exists() {
            return Err(ConfigError::Validation(format!(
                "browser executable '{}' does not exist",
                path.display()
            )));
        }
    }

    Ok(())
}

/// Validates proxy URLs without contacting them
fn validate_proxy_config(config: &ProxyConfig) -> Result<(), ConfigError> {
    for proxy in &config.urls {
        let url = Url::parse(proxy)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid proxy '{}': {}", proxy, e)))?;

        if !ProxyDescriptor::SCHEMES.contains(&url.scheme()) {
            return Err(ConfigError::Validation(format!(
                "Proxy '{}' must use http or https",
                proxy
            )));
        }
    }

    if !config.urls.is_empty() && config.rotate_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "rotate_interval_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_queue_config(config: &QueueConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(
            "max_attempts must be >= 1".to_string(),
        ));
    }

    if config.workers < 1 {
        return Err(ConfigError::Validation("workers must be >= 1".to_string()));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}

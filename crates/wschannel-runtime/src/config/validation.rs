//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{AppConfig, ClientConfig, LogOutput, LoggingConfig, ServerConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &AppConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_server_config(&config.server)?;
    validate_client_config(&config.client)?;
    Ok(())
}

fn validate_logging_config(config: &LoggingConfig) -> ConfigResult<()> {
    if config.output == LogOutput::File && config.file_path.is_none() {
        return Err(ConfigError::MissingField("logging.file_path"));
    }
    Ok(())
}

fn validate_server_config(config: &ServerConfig) -> ConfigResult<()> {
    if config.host.trim().is_empty() {
        return Err(ConfigError::MissingField("server.host"));
    }
    validate_port(config.port)?;
    validate_path(&config.path)?;
    Ok(())
}

fn validate_client_config(config: &ClientConfig) -> ConfigResult<()> {
    let secure = validate_url(&config.url)?;

    match (secure, &config.ca_file) {
        (false, Some(_)) => Err(ConfigError::invalid_url(
            &config.url,
            "client.ca_file is set but the URL is not wss://",
        )),
        (true, None) => Err(ConfigError::invalid_url(
            &config.url,
            "wss:// requires client.ca_file",
        )),
        _ => Ok(()),
    }
}

/// Validates a WebSocket URL and returns whether it is secure.
fn validate_url(url: &str) -> ConfigResult<bool> {
    if url.is_empty() {
        return Err(ConfigError::MissingField("client.url"));
    }

    let Some((scheme, rest)) = url.split_once("://") else {
        return Err(ConfigError::invalid_url(url, "missing URL scheme"));
    };
    if rest.is_empty() {
        return Err(ConfigError::invalid_url(url, "missing host"));
    }

    match scheme.to_ascii_lowercase().as_str() {
        "ws" => Ok(false),
        "wss" => Ok(true),
        _ => Err(ConfigError::invalid_url(
            url,
            "URL must start with ws:// or wss://",
        )),
    }
}

fn validate_port(port: u16) -> ConfigResult<()> {
    if port == 0 {
        return Err(ConfigError::InvalidPort(port));
    }
    Ok(())
}

fn validate_path(path: &str) -> ConfigResult<()> {
    if !path.starts_with('/') {
        return Err(ConfigError::invalid("server.path", "must start with '/'"));
    }
    if path.contains(['{', '}', '*']) {
        return Err(ConfigError::invalid(
            "server.path",
            format!("route wildcards are not allowed in {path}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_validate_path() {
        let mut config = AppConfig::default();
        config.server.path = "test".to_string();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::Invalid { .. })
        ));

        config.server.path = "/{id}".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_host_and_port() {
        let mut config = AppConfig::default();
        config.server.host = " ".to_string();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField("server.host"))
        ));

        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidPort(0))
        ));
    }

    #[test]
    fn test_validate_url_scheme() {
        let mut config = AppConfig::default();
        config.client.url = "http://localhost:41001/test".to_string();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidUrl { .. })
        ));

        config.client.url = "localhost:41001".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_ca_file_requires_secure_url() {
        let mut config = AppConfig::default();
        config.client.ca_file = Some(PathBuf::from("localhost.crt"));
        assert!(validate_config(&config).is_err());

        config.client.url = "wss://localhost:41001/test".to_string();
        assert!(validate_config(&config).is_ok());

        config.client.ca_file = None;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_file_output_requires_path() {
        let mut config = AppConfig::default();
        config.logging.output = LogOutput::File;
        assert!(validate_config(&config).is_err());

        config.logging.file_path = Some(PathBuf::from("wschannel.log"));
        assert!(validate_config(&config).is_ok());
    }
}

use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_base_url: String,
    pub api_token: Option<String>,
    pub request_timeout_secs: u64,
    pub last_known_good_directory: Option<String>,
    pub last_known_good_directory_path: Option<String>,
    pub bind_addr: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: String::new(),
            api_token: None,
            request_timeout_secs: 15,
            last_known_good_directory: None,
            last_known_good_directory_path: None,
            bind_addr: "0.0.0.0:3000".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            api_base_url: env::var("CLINIC_API_BASE_URL")
                .unwrap_or_else(|_| {
                    warn!("CLINIC_API_BASE_URL not set, using empty value");
                    String::new()
                }),
            api_token: env::var("CLINIC_API_TOKEN").ok().filter(|t| !t.is_empty()),
            request_timeout_secs: env::var("REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|raw| match raw.parse::<u64>() {
                    Ok(secs) => Some(secs),
                    Err(_) => {
                        warn!("REQUEST_TIMEOUT_SECS is not a number ({}), using default", raw);
                        None
                    }
                })
                .unwrap_or(defaults.request_timeout_secs),
            last_known_good_directory: env::var("LAST_KNOWN_GOOD_DIRECTORY").ok(),
            last_known_good_directory_path: env::var("LAST_KNOWN_GOOD_DIRECTORY_PATH").ok(),
            bind_addr: env::var("BIND_ADDR")
                .unwrap_or_else(|_| defaults.bind_addr.clone()),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.api_base_url.is_empty()
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.api_base_url = base_url.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_not_configured() {
        let config = AppConfig::default();
        assert!(!config.is_configured());
        assert_eq!(config.request_timeout_secs, 15);
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
    }

    #[test]
    fn base_url_marks_config_as_configured() {
        let config = AppConfig::default().with_base_url("http://localhost:8080");
        assert!(config.is_configured());
    }
}

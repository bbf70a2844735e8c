use serde::Deserialize;
use std::env;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use dotenv::dotenv;

use crate::error::ConfigError;

const MIN_SESSION_SECRET_LEN: usize = 64;

#[derive(Deserialize, Clone, Debug)]
pub struct Settings {
    /// Base URL of the external scheduling backend, without trailing slash
    pub api_base_url: String,
    /// Bearer token sent with every backend call
    pub api_token: String,
    /// Seats per group meeting slot
    #[serde(default = "default_group_limit")]
    pub group_limit: i64,
    #[serde(default = "default_individual_type_id")]
    pub individual_type_id: u32,
    #[serde(default = "default_group_type_id")]
    pub group_type_id: u32,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Cookie signing secret, at least 64 bytes
    pub session_secret: String,
}

fn default_group_limit() -> i64 {
    5
}

fn default_individual_type_id() -> u32 {
    1
}

fn default_group_type_id() -> u32 {
    2
}

fn default_port() -> u16 {
    8080
}

impl Settings {
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        dotenv().ok();

        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        let mut settings: Settings = serde_yaml::from_str(contents)?;

        settings.api_base_url = parse_env_var(&settings.api_base_url)?
            .trim_end_matches('/')
            .to_string();
        settings.api_token = parse_env_var(&settings.api_token)?;
        settings.session_secret = parse_env_var(&settings.session_secret)?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base_url.is_empty() {
            return Err(ConfigError::Invalid {
                key: "api_base_url",
                reason: "must not be empty".to_string(),
            });
        }
        if self.group_limit < 1 {
            return Err(ConfigError::Invalid {
                key: "group_limit",
                reason: format!("must be positive, got {}", self.group_limit),
            });
        }
        if self.session_secret.len() < MIN_SESSION_SECRET_LEN {
            return Err(ConfigError::Invalid {
                key: "session_secret",
                reason: format!("must be at least {} bytes", MIN_SESSION_SECRET_LEN),
            });
        }
        Ok(())
    }
}

fn parse_env_var(value: &str) -> Result<String, ConfigError> {
    if value.starts_with("${") && value.ends_with('}') {
        let env_name = &value[2..value.len() - 1];
        env::var(env_name).map_err(|_| ConfigError::MissingEnv(env_name.to_string()))
    } else {
        Ok(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret() -> String {
        "s".repeat(64)
    }

    #[test]
    fn applies_defaults_and_trims_base_url() {
        let yaml = format!(
            "api_base_url: https://agenda.example.com/api/\napi_token: abc\nsession_secret: {}\n",
            secret()
        );
        let settings = Settings::from_yaml_str(&yaml).unwrap();
        assert_eq!(settings.api_base_url, "https://agenda.example.com/api");
        assert_eq!(settings.group_limit, 5);
        assert_eq!(settings.individual_type_id, 1);
        assert_eq!(settings.group_type_id, 2);
        assert_eq!(settings.port, 8080);
    }

    #[test]
    fn expands_environment_placeholders() {
        env::set_var("MENTOR_BOOKING_TEST_TOKEN", "from-env");
        let yaml = format!(
            "api_base_url: http://localhost:9000\napi_token: ${{MENTOR_BOOKING_TEST_TOKEN}}\nsession_secret: {}\n",
            secret()
        );
        let settings = Settings::from_yaml_str(&yaml).unwrap();
        assert_eq!(settings.api_token, "from-env");
    }

    #[test]
    fn missing_environment_variable_is_an_error() {
        let yaml = format!(
            "api_base_url: http://localhost:9000\napi_token: ${{MENTOR_BOOKING_SURELY_UNSET}}\nsession_secret: {}\n",
            secret()
        );
        let err = Settings::from_yaml_str(&yaml).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnv(name) if name == "MENTOR_BOOKING_SURELY_UNSET"));
    }

    #[test]
    fn rejects_short_session_secret() {
        let yaml = "api_base_url: http://localhost:9000\napi_token: t\nsession_secret: short\n";
        let err = Settings::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "session_secret", .. }));
    }
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub admin: AdminConfig,
    pub node: NodeConfig,
    pub sweeper: SweeperConfig,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind_address: String,
    pub data_dir: String,
    /// Caller identity used when a request only reveals a loopback address
    pub server_ip: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AdminConfig {
    /// Seeded as the login password when none is stored yet
    pub default_password: String,
    /// Idle admin sessions older than this are removed by the sweeper
    pub session_ttl_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct SweeperConfig {
    pub cleanup_interval_seconds: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            data_dir: "./data".to_string(),
            server_ip: None,
        }
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            default_password: "root123".to_string(),
            session_ttl_seconds: 86400, // 24 hours
        }
    }
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_seconds: 60,
        }
    }
}

fn parse_seconds(name: &str, value: Option<String>, default: u64) -> Result<u64, ConfigError> {
    match value {
        Some(raw) => raw.trim().parse().map_err(|_| {
            ConfigError::ValidationError(format!(
                "{name} must be a whole number of seconds, got '{raw}'"
            ))
        }),
        None => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let node_defaults = NodeConfig::default();
        let admin_defaults = AdminConfig::default();
        let sweeper_defaults = SweeperConfig::default();

        let bind_address = lookup("BIND_ADDRESS").unwrap_or(node_defaults.bind_address);
        let data_dir = lookup("DATA_DIR").unwrap_or(node_defaults.data_dir);
        let server_ip = lookup("SERVER_IP")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let default_password =
            lookup("ADMIN_DEFAULT_PASSWORD").unwrap_or(admin_defaults.default_password);
        let session_ttl_seconds = parse_seconds(
            "ADMIN_SESSION_TTL_SECONDS",
            lookup("ADMIN_SESSION_TTL_SECONDS"),
            admin_defaults.session_ttl_seconds,
        )?;
        let cleanup_interval_seconds = parse_seconds(
            "CLEANUP_INTERVAL_SECONDS",
            lookup("CLEANUP_INTERVAL_SECONDS"),
            sweeper_defaults.cleanup_interval_seconds,
        )?;

        let config = Config {
            admin: AdminConfig {
                default_password,
                session_ttl_seconds,
            },
            node: NodeConfig {
                bind_address,
                data_dir,
                server_ip,
            },
            sweeper: SweeperConfig {
                cleanup_interval_seconds,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.node.data_dir.is_empty() {
            return Err(ConfigError::ValidationError(
                "DATA_DIR cannot be empty".to_string(),
            ));
        }
        if self.admin.default_password.is_empty() {
            return Err(ConfigError::ValidationError(
                "ADMIN_DEFAULT_PASSWORD cannot be empty".to_string(),
            ));
        }
        if self.sweeper.cleanup_interval_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "CLEANUP_INTERVAL_SECONDS must be at least 1".to_string(),
            ));
        }
        if self.admin.session_ttl_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "ADMIN_SESSION_TTL_SECONDS must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.node.bind_address, "0.0.0.0:8080");
        assert_eq!(config.node.data_dir, "./data");
        assert!(config.node.server_ip.is_none());
        assert_eq!(config.admin.default_password, "root123");
        assert_eq!(config.admin.session_ttl_seconds, 86400);
        assert_eq!(config.sweeper.cleanup_interval_seconds, 60);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("BIND_ADDRESS", "127.0.0.1:3000"),
            ("SERVER_IP", " 10.0.0.5 "),
            ("CLEANUP_INTERVAL_SECONDS", "5"),
            ("ADMIN_SESSION_TTL_SECONDS", "600"),
        ])
        .unwrap();
        assert_eq!(config.node.bind_address, "127.0.0.1:3000");
        assert_eq!(config.node.server_ip.as_deref(), Some("10.0.0.5"));
        assert_eq!(config.sweeper.cleanup_interval_seconds, 5);
        assert_eq!(config.admin.session_ttl_seconds, 600);
    }

    #[test]
    fn test_blank_server_ip_is_unset() {
        let config = load(&[("SERVER_IP", "  ")]).unwrap();
        assert!(config.node.server_ip.is_none());
    }

    #[test]
    fn test_invalid_numbers_rejected() {
        assert!(matches!(
            load(&[("CLEANUP_INTERVAL_SECONDS", "soon")]),
            Err(ConfigError::ValidationError(_))
        ));
        assert!(matches!(
            load(&[("ADMIN_SESSION_TTL_SECONDS", "-1")]),
            Err(ConfigError::ValidationError(_))
        ));
        assert!(matches!(
            load(&[("CLEANUP_INTERVAL_SECONDS", "0")]),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_empty_default_password_rejected() {
        assert!(matches!(
            load(&[("ADMIN_DEFAULT_PASSWORD", "")]),
            Err(ConfigError::ValidationError(_))
        ));
    }
}

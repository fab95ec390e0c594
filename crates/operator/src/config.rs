use serde::{Deserialize, Serialize};

pub const DEFAULT_REPORTER: &str = "gitops-operator";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub kube: KubeConfig,
    pub events: EventsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub addr: String,
}

/// Cluster connection parameters. With no context set, the client is
/// inferred from the in-cluster environment or the default kubeconfig.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KubeConfig {
    pub context: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Component name stamped on every emitted event.
    pub reporter: String,
}

impl Config {
    pub fn load() -> crate::Result<Self> {
        // Load environment variables from .env file if it exists
        let _ = dotenvy::dotenv();

        let config = Config {
            server: ServerConfig {
                addr: std::env::var("SERVER_ADDR")
                    .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            },
            kube: KubeConfig {
                context: std::env::var("KUBE_CONTEXT")
                    .ok()
                    .filter(|c| !c.is_empty()),
            },
            events: EventsConfig {
                reporter: std::env::var("EVENT_REPORTER")
                    .unwrap_or_else(|_| DEFAULT_REPORTER.to_string()),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.events.reporter.trim().is_empty() {
            return Err(crate::Error::Config(
                "EVENT_REPORTER must not be empty".to_string(),
            ));
        }
        if self.server.addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(crate::Error::Config(format!(
                "SERVER_ADDR is not a socket address: {}",
                self.server.addr
            )));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                addr: "0.0.0.0:8080".to_string(),
            },
            kube: KubeConfig::default(),
            events: EventsConfig {
                reporter: DEFAULT_REPORTER.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.events.reporter, "gitops-operator");
        assert!(config.kube.context.is_none());
    }

    #[test]
    fn empty_reporter_is_rejected() {
        let mut config = Config::default();
        config.events.reporter = "  ".to_string();
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));
    }

    #[test]
    fn malformed_server_addr_is_rejected() {
        let mut config = Config::default();
        config.server.addr = "not-an-addr".to_string();
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));
    }
}

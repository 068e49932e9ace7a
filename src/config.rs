use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Docker daemon endpoint, e.g. `unix:///var/run/docker.sock` or `tcp://host:2375`.
    pub docker_socket: String,
    pub plugin_version: String,
    /// Plugin version -> docker network driver name.
    pub network_types: HashMap<String, String>,
    pub service_ip_refresh_secs: u64,
    pub reconnect_backoff_secs: u64,
    pub event_workers: usize,
    pub event_queue_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            docker_socket: "unix:///var/run/docker.sock".into(),
            plugin_version: "v2".into(),
            network_types: [("v1", "nuage"), ("v2", "nuage:latest")]
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            service_ip_refresh_secs: 30,
            reconnect_backoff_secs: 3,
            event_workers: 8,
            event_queue_depth: 256,
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::from_figment(
            Figment::from(Serialized::defaults(Config::default()))
                .merge(Toml::file("nuage-docker.toml"))
                .merge(Json::file("nuage-docker.json"))
                .merge(Env::prefixed("NUAGE_DOCKER_")),
        )
    }

    fn from_figment(figment: Figment) -> anyhow::Result<Self> {
        let config: Config = figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        if config.event_workers == 0 || config.event_queue_depth == 0 {
            anyhow::bail!("event_workers and event_queue_depth must be non-zero");
        }
        config.network_type()?;
        Ok(config)
    }

    /// Network driver name this plugin version registers with docker.
    pub fn network_type(&self) -> anyhow::Result<&str> {
        self.network_types
            .get(&self.plugin_version)
            .map(String::as_str)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "No network type configured for plugin version {}",
                    self.plugin_version
                )
            })
    }

    pub fn service_ip_refresh(&self) -> Duration {
        Duration::from_secs(self.service_ip_refresh_secs)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_secs(self.reconnect_backoff_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.network_type().unwrap(), "nuage:latest");
        assert_eq!(config.service_ip_refresh(), Duration::from_secs(30));
        assert_eq!(config.reconnect_backoff(), Duration::from_secs(3));
    }

    #[test]
    fn test_v1_network_type() {
        let config = Config {
            plugin_version: "v1".into(),
            ..Config::default()
        };
        assert_eq!(config.network_type().unwrap(), "nuage");
    }

    #[test]
    fn test_unknown_plugin_version_is_rejected() {
        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Serialized::default("plugin_version", "v9"));
        let err = Config::from_figment(figment).unwrap_err();
        assert!(err.to_string().contains("v9"));
    }

    #[test]
    fn test_overrides_merge_over_defaults() {
        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Serialized::default("docker_socket", "tcp://10.1.1.1:2375"))
            .merge(Serialized::default("event_workers", 2));
        let config = Config::from_figment(figment).unwrap();
        assert_eq!(config.docker_socket, "tcp://10.1.1.1:2375");
        assert_eq!(config.event_workers, 2);
        assert_eq!(config.event_queue_depth, 256);
    }

    #[test]
    fn test_zero_workers_is_rejected() {
        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Serialized::default("event_workers", 0));
        assert!(Config::from_figment(figment).is_err());
    }
}

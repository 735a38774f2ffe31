pub(crate) use crate::config::scopes::ScopeSeed;
pub(crate) use crate::config::store::{StoreConfig, StoreKind};
use config::{Config as ConfigCrate, ConfigError, Environment, File, FileFormat, Map};
use serde::Deserialize;
use std::time::Duration;

pub mod scopes;
pub mod store;

const DEFAULT_CONFIG_FILE: &str = "uma.toml";

/// Upper bound for the ticket lifetime, ten years
const MAX_TICKET_LIFETIME: u64 = 10 * 365 * 24 * 3600;

/// Main configuration structure for the UMA authorization server
#[derive(Debug, Deserialize, Clone)]
pub struct UmaConfig {
    /// The port the server will listen to (default: 7788)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Issuer URL, used as the base endpoint of Internal scope URLs and as the
    /// authorization-server host recorded on tickets and RPTs
    #[serde(default = "default_issuer")]
    pub issuer: String,

    /// Permission ticket lifetime in seconds (default: 1 hour)
    #[serde(default = "default_ticket_lifetime")]
    pub ticket_lifetime: u64,

    /// Register unknown External scope URLs on first sight
    #[serde(default = "default_true")]
    pub add_scopes_automatically: bool,

    /// Only the client owning a resource may register permissions for it
    #[serde(default)]
    pub restrict_resource_to_associated_client: bool,

    /// Scope URLs that can't be granted without claims in the RPT request
    #[serde(default)]
    pub claims_required_scopes: Vec<String>,

    /// Interval between expired ticket/RPT sweeps in seconds (default: 60)
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,

    /// Scope descriptions registered at startup
    #[serde(default)]
    pub scopes: Vec<ScopeSeed>,

    /// Persistence configuration
    #[serde(default)]
    pub store: StoreConfig,
}

impl Default for UmaConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            issuer: default_issuer(),
            ticket_lifetime: default_ticket_lifetime(),
            add_scopes_automatically: true,
            restrict_resource_to_associated_client: false,
            claims_required_scopes: Vec::new(),
            cleanup_interval: default_cleanup_interval(),
            scopes: Vec::new(),
            store: StoreConfig::default(),
        }
    }
}

impl UmaConfig {
    /// Creates a new Config instance from the optional TOML file named by
    /// `UMA_CONFIG_FILE` (default `uma.toml`) overlaid with `UMA_*` environment variables
    pub fn new() -> Result<Self, String> {
        let file =
            std::env::var("UMA_CONFIG_FILE").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::from_sources(&file)
    }

    pub fn from_sources(file: &str) -> Result<Self, String> {
        Self::load(file, None)
    }

    /// Loads the file overlaid with `env`, or with the process environment when `None`
    fn load(file: &str, env: Option<Map<String, String>>) -> Result<Self, String> {
        let config = ConfigCrate::builder()
            .add_source(File::new(file, FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix("UMA")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("claims_required_scopes")
                    .try_parsing(true)
                    .source(env),
            )
            .build()
            .map_err(|e: ConfigError| e.to_string())?
            .try_deserialize::<Self>()
            .map_err(|e| e.to_string())?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        url::Url::parse(&self.issuer).map_err(|e| format!("Invalid issuer '{}': {e}", self.issuer))?;
        if self.ticket_lifetime > MAX_TICKET_LIFETIME {
            return Err(format!(
                "ticket_lifetime must not exceed {MAX_TICKET_LIFETIME} seconds"
            ));
        }
        if self.cleanup_interval == 0 {
            return Err("cleanup_interval must be greater than zero".to_string());
        }
        Ok(())
    }

    /// Issuer without a trailing slash, the prefix of every synthesized scope URL
    pub fn base_endpoint(&self) -> &str {
        self.issuer.trim_end_matches('/')
    }

    pub fn ticket_lifetime(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.ticket_lifetime.min(MAX_TICKET_LIFETIME) as i64)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval)
    }

    #[cfg(test)]
    pub fn for_test() -> Self {
        Self {
            port: 0, // Let the OS choose a port
            issuer: "https://as.example.com".to_string(),
            ..Default::default()
        }
    }
}

fn default_port() -> u16 {
    7788
}

fn default_issuer() -> String {
    format!("http://localhost:{}", default_port())
}

fn default_ticket_lifetime() -> u64 {
    3600
}

fn default_cleanup_interval() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config_file(name: &str, contents: &str) -> String {
        let path = std::env::temp_dir().join(name);
        let mut file = std::fs::File::create(&path).expect("Failed to create config file");
        file.write_all(contents.as_bytes())
            .expect("Failed to write config file");
        path.to_string_lossy().to_string()
    }

    #[test]
    fn test_default_config() {
        let config = UmaConfig::from_sources("does-not-exist.toml").unwrap();
        assert_eq!(config.issuer, "http://localhost:7788");
        assert_eq!(config.ticket_lifetime, 3600);
        assert!(config.add_scopes_automatically);
        assert!(!config.restrict_resource_to_associated_client);
        assert_eq!(config.cleanup_interval, 60);
        assert_eq!(config.store.memory.capacity_mib, 128);
        assert_eq!(config.store.redis.scan_chunk_size, 100);
        assert!(config.scopes.is_empty());
    }

    #[test]
    fn test_file_config() {
        let path = write_config_file(
            "uma-config-test.toml",
            r#"
            issuer = "https://as.example.com/"
            ticket_lifetime = 120
            claims_required_scopes = ["https://rs.example.com/scopes/delete"]

            [[scopes]]
            id = "view"
            display_name = "View"

            [[scopes]]
            id = "print"
            url = "https://rs.example.com/scopes/print"

            [store.memory]
            capacity_mib = 16
            "#,
        );

        let config = UmaConfig::from_sources(&path).unwrap();
        assert_eq!(config.base_endpoint(), "https://as.example.com");
        assert_eq!(config.ticket_lifetime(), chrono::Duration::seconds(120));
        assert_eq!(
            config.claims_required_scopes,
            vec!["https://rs.example.com/scopes/delete".to_string()]
        );
        assert_eq!(config.scopes.len(), 2);
        assert_eq!(config.scopes[0].url, None);
        assert_eq!(
            config.scopes[1].url.as_deref(),
            Some("https://rs.example.com/scopes/print")
        );
        assert_eq!(config.store.memory.capacity_mib, 16);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_redis_store_from_env() {
        let env = Map::from([
            ("UMA_STORE__KIND".to_string(), "redis".to_string()),
            (
                "UMA_STORE__REDIS__URL".to_string(),
                "redis://localhost:6379".to_string(),
            ),
            ("UMA_TICKET_LIFETIME".to_string(), "90".to_string()),
        ]);

        let config = UmaConfig::load("does-not-exist.toml", Some(env)).unwrap();
        assert_eq!(config.store.kind, StoreKind::Redis);
        assert_eq!(config.store.redis.url, "redis://localhost:6379");
        assert_eq!(config.ticket_lifetime(), chrono::Duration::seconds(90));
    }

    #[test]
    fn test_invalid_issuer_is_rejected() {
        let path = write_config_file("uma-config-bad-issuer.toml", "issuer = \"not a url\"\n");

        let result = UmaConfig::from_sources(&path);
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("Invalid issuer"));

        std::fs::remove_file(path).ok();
    }
}

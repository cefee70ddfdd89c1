//! Configuration for omsdeploy
//!
//! Handles loading and merging configuration from multiple sources:
//! - Default values
//! - System configuration (/etc/omsdeploy/omsdeploy.toml)
//! - User configuration (~/.omsdeploy.toml)
//! - Project configuration (./omsdeploy.toml)
//! - Environment variables
//!
//! Command-line flags are applied on top by the binary.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::azure::{CloudEnvironment, Credential};
use crate::dispatcher::DEFAULT_FORKS;
use crate::error::{Error, Result};
use crate::provisioner::ProvisionerOptions;
use crate::retry::RetryPolicy;
use crate::secret::SecretString;

/// Credential name used when none is given on the command line.
pub const DEFAULT_CREDENTIAL: &str = "AzureRunAsConnection";

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Run defaults
    pub defaults: Defaults,

    /// Retry behaviour for Resource Manager calls
    pub retry: RetryConfig,

    /// Logging settings
    pub logging: LoggingConfig,

    /// Endpoint overrides for sovereign or test clouds
    pub endpoints: EndpointsConfig,

    /// Stored service principal credentials, by name
    pub credentials: HashMap<String, CredentialConfig>,
}

/// Default run settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Defaults {
    /// Concurrent provisioning units (0 = unbounded)
    pub forks: usize,

    /// Leave VMs that are not running alone
    pub skip_not_running: bool,

    /// Seconds to wait for an extension to finish provisioning
    pub extension_timeout: u64,

    /// Seconds between provisioning state polls
    pub poll_interval: u64,

    /// Credential to use when none is named
    pub credential: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            forks: DEFAULT_FORKS,
            skip_not_running: true,
            extension_timeout: 900,
            poll_interval: 15,
            credential: DEFAULT_CREDENTIAL.to_string(),
        }
    }
}

/// Retry settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay_ms: 1000,
            max_delay_ms: 60_000,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(Error::Config(format!("unknown log format '{}'", other))),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level when neither RUST_LOG nor -v is given
    pub level: String,

    /// Log format
    pub format: LogFormat,

    /// Colored human output
    pub color: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Text,
            color: true,
        }
    }
}

/// Endpoint overrides
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
    pub authority_host: Option<String>,
    pub resource_manager: Option<String>,
}

/// A stored service principal
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialConfig {
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub application_id: String,
    #[serde(default)]
    pub certificate_thumbprint: Option<String>,
    #[serde(default)]
    pub certificate_path: Option<PathBuf>,
    #[serde(default)]
    pub client_secret: Option<SecretString>,
}

impl Config {
    /// Load configuration from all sources
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let paths = Self::get_config_paths(config_path)
            .into_iter()
            .filter(|path| path.exists());
        let mut config = Self::from_layers(paths)?;

        config.apply_env_overrides();

        Ok(config)
    }

    /// Get the list of configuration file paths to check
    fn get_config_paths(explicit_path: Option<&PathBuf>) -> Vec<PathBuf> {
        let mut paths = Vec::new();

        // Explicit path takes priority
        if let Some(path) = explicit_path {
            paths.push(path.clone());
            return paths;
        }

        if let Ok(env_config) = std::env::var("OMSDEPLOY_CONFIG") {
            paths.push(PathBuf::from(env_config));
            return paths;
        }

        paths.push(PathBuf::from("/etc/omsdeploy/omsdeploy.toml"));

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".omsdeploy.toml"));
        }

        paths.push(PathBuf::from("omsdeploy.toml"));

        paths
    }

    /// Build a config from files applied in order.
    ///
    /// Keys set in a later file replace the same keys from earlier files,
    /// whatever their value; tables are merged key by key.
    fn from_layers(paths: impl IntoIterator<Item = PathBuf>) -> Result<Self> {
        let mut merged = Value::Object(Map::new());
        for path in paths {
            merge_values(&mut merged, Self::read_layer(&path)?);
        }
        serde_json::from_value(merged).map_err(|e| Error::Config(e.to_string()))
    }

    /// Parse one file into a raw layer, checking it against the schema.
    fn read_layer(path: &Path) -> Result<Value> {
        let parse_failed = |message: String| Error::ConfigParse {
            path: path.to_path_buf(),
            message,
        };
        let content = std::fs::read_to_string(path).map_err(|e| parse_failed(e.to_string()))?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let layer: Value = match extension {
            "yml" | "yaml" => serde_yaml::from_str(&content).map_err(|e| e.to_string()),
            "json" => serde_json::from_str(&content).map_err(|e| e.to_string()),
            _ => toml::from_str(&content).map_err(|e| e.to_string()),
        }
        .map_err(parse_failed)?;

        // An empty YAML document parses as null.
        let layer = if layer.is_null() {
            Value::Object(Map::new())
        } else {
            layer
        };
        serde_json::from_value::<Config>(layer.clone()).map_err(|e| parse_failed(e.to_string()))?;

        Ok(layer)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // OMSDEPLOY_FORKS
        if let Ok(forks) = std::env::var("OMSDEPLOY_FORKS") {
            if let Ok(n) = forks.parse() {
                self.defaults.forks = n;
            }
        }

        // OMSDEPLOY_LOG_FORMAT
        if let Ok(format) = std::env::var("OMSDEPLOY_LOG_FORMAT") {
            if let Ok(format) = format.parse() {
                self.logging.format = format;
            }
        }

        // OMSDEPLOY_AUTHORITY_HOST
        if let Ok(host) = std::env::var("OMSDEPLOY_AUTHORITY_HOST") {
            self.endpoints.authority_host = Some(host);
        }

        // OMSDEPLOY_RESOURCE_MANAGER
        if let Ok(url) = std::env::var("OMSDEPLOY_RESOURCE_MANAGER") {
            self.endpoints.resource_manager = Some(url);
        }

        // NO_COLOR
        if std::env::var("NO_COLOR").is_ok() || std::env::var("OMSDEPLOY_NO_COLOR").is_ok() {
            self.logging.color = false;
        }
    }

    /// Resolve a named credential.
    ///
    /// Stored credentials come first. Failing that, the standard `AZURE_*`
    /// service principal variables are used, whatever the name.
    pub fn credential(&self, name: &str) -> Result<Credential> {
        if let Some(stored) = self.credentials.get(name) {
            return stored.to_credential(name);
        }

        let tenant_id = std::env::var("AZURE_TENANT_ID").ok();
        let application_id = std::env::var("AZURE_CLIENT_ID").ok();
        match (tenant_id, application_id) {
            (Some(tenant_id), Some(application_id)) => Ok(Credential {
                name: name.to_string(),
                tenant_id,
                application_id,
                certificate_thumbprint: std::env::var("AZURE_CLIENT_CERTIFICATE_THUMBPRINT").ok(),
                certificate_path: std::env::var("AZURE_CLIENT_CERTIFICATE_PATH")
                    .ok()
                    .map(PathBuf::from),
                client_secret: std::env::var("AZURE_CLIENT_SECRET").ok().map(SecretString::new),
            }),
            _ => Err(Error::credential(
                name,
                "no stored credential with this name and AZURE_TENANT_ID/AZURE_CLIENT_ID are not set",
            )),
        }
    }

    /// The named cloud with any configured endpoint overrides applied.
    pub fn environment(&self, name: &str) -> Result<CloudEnvironment> {
        let environment: CloudEnvironment = name.parse()?;
        Ok(environment.with_overrides(
            self.endpoints.authority_host.as_deref(),
            self.endpoints.resource_manager.as_deref(),
        ))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(
            self.retry.max_retries,
            Duration::from_millis(self.retry.initial_delay_ms),
            Duration::from_millis(self.retry.max_delay_ms),
        )
    }

    pub fn provisioner_options(&self) -> ProvisionerOptions {
        ProvisionerOptions {
            skip_not_running: self.defaults.skip_not_running,
            timeout: Duration::from_secs(self.defaults.extension_timeout),
            poll_interval: Duration::from_secs(self.defaults.poll_interval),
            ..ProvisionerOptions::default()
        }
    }

    /// Load from a specific file only
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_layers([path.as_ref().to_path_buf()])
    }
}

impl CredentialConfig {
    fn to_credential(&self, name: &str) -> Result<Credential> {
        if self.tenant_id.trim().is_empty() || self.application_id.trim().is_empty() {
            return Err(Error::credential(
                name,
                "tenant_id and application_id must not be empty",
            ));
        }
        Ok(Credential {
            name: name.to_string(),
            tenant_id: self.tenant_id.clone(),
            application_id: self.application_id.clone(),
            certificate_thumbprint: self.certificate_thumbprint.clone(),
            certificate_path: self.certificate_path.clone(),
            client_secret: self.client_secret.clone(),
        })
    }
}

fn merge_values(base: &mut Value, layer: Value) {
    match (base, layer) {
        (Value::Object(base), Value::Object(layer)) => {
            for (key, value) in layer {
                merge_values(base.entry(key).or_insert(Value::Null), value);
            }
        }
        (slot, value) => *slot = value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.defaults.forks, 16);
        assert!(config.defaults.skip_not_running);
        assert_eq!(config.defaults.credential, "AzureRunAsConnection");
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    fn config_file(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        writeln!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn test_config_layers() {
        let user = config_file(".toml", "[defaults]\nforks = 4\npoll_interval = 5");
        let project = config_file(".yaml", "defaults:\n  forks: 16");

        let config =
            Config::from_layers([user.path().to_path_buf(), project.path().to_path_buf()]).unwrap();
        assert_eq!(config.defaults.forks, 16);
        assert_eq!(config.defaults.poll_interval, 5);
    }

    #[test]
    fn test_later_layer_can_restore_default() {
        let first = config_file(".toml", "[logging]\ncolor = false\n[retry]\nmax_retries = 1");
        let second = config_file(".toml", "[logging]\ncolor = true\n[retry]\nmax_retries = 5");

        let config =
            Config::from_layers([first.path().to_path_buf(), second.path().to_path_buf()]).unwrap();
        assert!(config.logging.color);
        assert_eq!(config.retry.max_retries, 5);
    }

    #[test]
    fn test_credentials_merge_per_field() {
        let system = config_file(
            ".toml",
            "[credentials.ops]\ntenant_id = \"t\"\napplication_id = \"a\"\nclient_secret = \"old\"",
        );
        let user = config_file(".toml", "[credentials.ops]\nclient_secret = \"new\"");

        let config =
            Config::from_layers([system.path().to_path_buf(), user.path().to_path_buf()]).unwrap();
        let credential = config.credential("ops").unwrap();
        assert_eq!(credential.tenant_id, "t");
        assert_eq!(credential.client_secret.unwrap().expose(), "new");
    }

    #[test]
    fn test_wrong_type_names_the_file() {
        let file = config_file(".toml", "[defaults]\nforks = \"many\"");
        match Config::from_file(file.path()) {
            Err(Error::ConfigParse { path, .. }) => assert_eq!(path, file.path()),
            other => panic!("unexpected result {:?}", other.map(|c| c.defaults.forks)),
        }
    }

    #[test]
    fn test_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[defaults]
forks = 8
skip_not_running = false

[endpoints]
resource_manager = "http://127.0.0.1:8080"

[credentials.AzureRunAsConnection]
tenant_id = "tenant"
application_id = "app"
client_secret = "s3cret"
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.defaults.forks, 8);
        assert!(!config.provisioner_options().skip_not_running);

        let credential = config.credential("AzureRunAsConnection").unwrap();
        assert_eq!(credential.tenant_id, "tenant");
        assert_eq!(credential.client_secret.unwrap().expose(), "s3cret");

        let env = config.environment("AzureCloud").unwrap();
        assert_eq!(env.resource_manager(), "http://127.0.0.1:8080");
        assert_eq!(env.authority_host(), "https://login.microsoftonline.com");
    }

    #[test]
    fn test_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "logging:\n  format: json\nretry:\n  max_retries: 2").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.retry.max_retries, 2);
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[defaults\nforks = ").unwrap();

        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, Error::ConfigParse { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_empty_tenant_is_rejected() {
        let mut config = Config::default();
        config.credentials.insert(
            "broken".into(),
            CredentialConfig {
                tenant_id: " ".into(),
                application_id: "app".into(),
                certificate_thumbprint: None,
                certificate_path: None,
                client_secret: None,
            },
        );
        assert!(matches!(
            config.credential("broken"),
            Err(Error::Credential { .. })
        ));
    }

    #[test]
    #[serial]
    fn test_env_override() {
        std::env::set_var("OMSDEPLOY_FORKS", "20");
        std::env::set_var("OMSDEPLOY_LOG_FORMAT", "json");
        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.defaults.forks, 20);
        assert_eq!(config.logging.format, LogFormat::Json);
        std::env::remove_var("OMSDEPLOY_FORKS");
        std::env::remove_var("OMSDEPLOY_LOG_FORMAT");
    }

    #[test]
    #[serial]
    fn test_credential_from_environment() {
        std::env::set_var("AZURE_TENANT_ID", "env-tenant");
        std::env::set_var("AZURE_CLIENT_ID", "env-app");
        std::env::set_var("AZURE_CLIENT_SECRET", "env-secret");

        let credential = Config::default().credential("AzureRunAsConnection").unwrap();
        assert_eq!(credential.tenant_id, "env-tenant");
        assert_eq!(credential.application_id, "env-app");
        assert!(credential.certificate_path.is_none());

        std::env::remove_var("AZURE_TENANT_ID");
        std::env::remove_var("AZURE_CLIENT_ID");
        std::env::remove_var("AZURE_CLIENT_SECRET");

        assert!(Config::default().credential("AzureRunAsConnection").is_err());
    }
}

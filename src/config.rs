//! Server configuration
//!
//! Settings come from an optional TOML file, then environment variables, then
//! command-line flags, each layer overriding the previous one. The result is
//! validated once at startup and never changes afterwards.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::smtp::{DomainPolicy, ServerSettings, SmtpLimits};
use crate::storage::{DEFAULT_ENDPOINT, DEFAULT_REGION, S3Settings, StorageTarget};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid configuration file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },

    #[error("No storage configured (set BUCKET_NAME or STORAGE_ROOT)")]
    MissingStorage,

    #[error("Both a bucket and a storage root are configured")]
    ConflictingStorage,

    #[error("At least one accepted domain is required")]
    NoDomains,

    #[error("Invalid accepted domain {0:?}")]
    InvalidDomain(String),

    #[error("max_message_size must be greater than zero")]
    ZeroMessageSize,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// TCP port to listen on.
    pub port: u16,

    /// Address to bind. IPv6 literals are written without brackets.
    pub bind_address: String,

    /// Recipient domains mail is accepted for.
    ///
    /// An address is accepted when it ends with `@` followed by one of these.
    pub accept_domains: Vec<String>,

    pub storage: StorageConfig,

    /// If true, expect a PROXY v1/v2 header from a load balancer at the start
    /// of each connection. Connections that send nothing for a few seconds
    /// are served as direct clients.
    pub proxy_protocol: bool,

    /// Seconds a read or write may block before the connection is dropped.
    /// Unset or zero means no limit.
    pub idle_timeout_secs: Option<u64>,

    /// Largest message body accepted, in bytes.
    pub max_message_size: usize,

    /// If true, DATA is refused until a recipient has been accepted.
    pub require_recipient: bool,

    /// If true, domains are compared ASCII case-insensitively.
    pub ignore_domain_case: bool,
}

/// Exactly one of `bucket` and `root` selects the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// S3-compatible bucket the `emails/<yyyy>/<mm>/<dd>/<id>.eml` objects
    /// are written to.
    pub bucket: Option<String>,

    /// Bucket endpoint. Defaults to Tigris.
    pub endpoint: Option<String>,

    /// Defaults to `auto`.
    pub region: Option<String>,

    /// Address the bucket as `<endpoint>/<bucket>` instead of a subdomain.
    pub force_path_style: bool,

    /// Local directory used instead of a bucket.
    pub root: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 2525,
            bind_address: "0.0.0.0".to_string(),
            accept_domains: vec!["ghostpost.sh".to_string(), "xn--9q8hgh.ws".to_string()],
            storage: StorageConfig::default(),
            proxy_protocol: false,
            idle_timeout_secs: None,
            max_message_size: SmtpLimits::MAX_DATA_SIZE,
            require_recipient: false,
            ignore_domain_case: false,
        }
    }
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read `path` if given, otherwise start from the defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Apply overrides from environment variables.
    ///
    /// `lookup` is normally `|key| std::env::var(key).ok()`. Empty values are
    /// ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(port) = get("PORT") {
            self.port = port.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "PORT",
                value: port.clone(),
            })?;
        }
        if let Some(address) = get("BIND_ADDRESS") {
            self.bind_address = address.trim().to_string();
        }
        if let Some(domains) = get("ACCEPT_DOMAINS") {
            self.accept_domains = domains
                .split(',')
                .map(str::trim)
                .filter(|domain| !domain.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(bucket) = get("BUCKET_NAME") {
            self.storage.bucket = Some(bucket.trim().to_string());
        }
        if let Some(endpoint) = get("S3_ENDPOINT") {
            self.storage.endpoint = Some(endpoint.trim().to_string());
        }
        if let Some(region) = get("S3_REGION") {
            self.storage.region = Some(region.trim().to_string());
        }
        if let Some(flag) = get("S3_FORCE_PATH_STYLE") {
            self.storage.force_path_style =
                parse_bool(&flag).ok_or_else(|| ConfigError::InvalidValue {
                    key: "S3_FORCE_PATH_STYLE",
                    value: flag.clone(),
                })?;
        }
        if let Some(root) = get("STORAGE_ROOT") {
            self.storage.root = Some(PathBuf::from(root));
        }
        if let Some(flag) = get("PROXY_PROTOCOL") {
            self.proxy_protocol = parse_bool(&flag).ok_or_else(|| ConfigError::InvalidValue {
                key: "PROXY_PROTOCOL",
                value: flag.clone(),
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.storage_target()?;
        if self.accept_domains.is_empty() {
            return Err(ConfigError::NoDomains);
        }
        if let Some(bad) = self
            .accept_domains
            .iter()
            .find(|d| d.is_empty() || d.contains('@') || d.contains(char::is_whitespace))
        {
            return Err(ConfigError::InvalidDomain(bad.clone()));
        }
        if self.max_message_size == 0 {
            return Err(ConfigError::ZeroMessageSize);
        }
        Ok(())
    }

    /// `host:port` suitable for binding
    pub fn listen_address(&self) -> String {
        if self.bind_address.contains(':') && !self.bind_address.starts_with('[') {
            format!("[{}]:{}", self.bind_address, self.port)
        } else {
            format!("{}:{}", self.bind_address, self.port)
        }
    }

    pub fn storage_target(&self) -> Result<StorageTarget, ConfigError> {
        let storage = &self.storage;
        match (&storage.bucket, &storage.root) {
            (Some(_), Some(_)) => Err(ConfigError::ConflictingStorage),
            (Some(bucket), None) => {
                if bucket.is_empty() || bucket.contains(|c: char| c == '/' || c.is_whitespace()) {
                    return Err(ConfigError::InvalidValue {
                        key: "storage.bucket",
                        value: bucket.clone(),
                    });
                }
                Ok(StorageTarget::Bucket(S3Settings {
                    bucket: bucket.clone(),
                    endpoint: storage
                        .endpoint
                        .clone()
                        .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
                    region: storage
                        .region
                        .clone()
                        .unwrap_or_else(|| DEFAULT_REGION.to_string()),
                    force_path_style: storage.force_path_style,
                    credentials: None,
                }))
            }
            (None, Some(root)) => Ok(StorageTarget::Directory(root.clone())),
            (None, None) => Err(ConfigError::MissingStorage),
        }
    }

    pub fn domain_policy(&self) -> DomainPolicy {
        DomainPolicy::new(self.accept_domains.iter().cloned()).ignore_case(self.ignore_domain_case)
    }

    pub fn server_settings(&self) -> ServerSettings {
        ServerSettings {
            max_message_size: self.max_message_size,
            idle_timeout: self
                .idle_timeout_secs
                .filter(|&secs| secs > 0)
                .map(Duration::from_secs),
            proxy_protocol: self.proxy_protocol,
            require_recipient: self.require_recipient,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.port, 2525);
        assert_eq!(config.listen_address(), "0.0.0.0:2525");
        assert_eq!(config.accept_domains, vec!["ghostpost.sh", "xn--9q8hgh.ws"]);
        assert_eq!(config.max_message_size, 10 * 1024 * 1024);
        assert!(!config.proxy_protocol);
        assert!(matches!(config.validate(), Err(ConfigError::MissingStorage)));
    }

    #[test]
    fn test_from_toml() {
        let config = Config::from_toml_str(
            r#"
            port = 2600
            accept_domains = ["example.org"]
            idle_timeout_secs = 30
            require_recipient = true
            ignore_domain_case = true

            [storage]
            root = "/var/lib/ghostpost"
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 2600);
        assert_eq!(config.bind_address, "0.0.0.0");
        assert_eq!(
            config.storage_target().unwrap(),
            StorageTarget::Directory(PathBuf::from("/var/lib/ghostpost"))
        );
        config.validate().unwrap();

        let settings = config.server_settings();
        assert_eq!(settings.idle_timeout, Some(Duration::from_secs(30)));
        assert!(settings.require_recipient);

        let policy = config.domain_policy();
        assert!(policy.accepts("a@EXAMPLE.org"));
        assert!(!policy.accepts("a@ghostpost.sh"));
    }

    #[test]
    fn test_bucket_from_toml() {
        let config = Config::from_toml_str(
            r#"
            [storage]
            bucket = "ghostpost-mail"
            endpoint = "http://localhost:9000"
            force_path_style = true
            "#,
        )
        .unwrap();
        config.validate().unwrap();

        let StorageTarget::Bucket(s3) = config.storage_target().unwrap() else {
            panic!("expected a bucket target");
        };
        assert_eq!(s3.bucket, "ghostpost-mail");
        assert_eq!(s3.endpoint, "http://localhost:9000");
        assert_eq!(s3.region, "auto");
        assert!(s3.force_path_style);
    }

    #[test]
    fn test_bucket_from_env() {
        let mut config = Config::default();
        config.apply_env(env(&[("BUCKET_NAME", "inbound")])).unwrap();

        let StorageTarget::Bucket(s3) = config.storage_target().unwrap() else {
            panic!("expected a bucket target");
        };
        assert_eq!(s3, S3Settings::new("inbound"));

        config
            .apply_env(env(&[("S3_REGION", "eu-west-1"), ("S3_ENDPOINT", "https://s3.test")]))
            .unwrap();
        let StorageTarget::Bucket(s3) = config.storage_target().unwrap() else {
            panic!("expected a bucket target");
        };
        assert_eq!(s3.region, "eu-west-1");
        assert_eq!(s3.endpoint, "https://s3.test");
    }

    #[test]
    fn test_storage_selection_errors() {
        let mut config = Config::default();
        config.storage.bucket = Some("mail".to_string());
        config.storage.root = Some(PathBuf::from("/srv/mail"));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ConflictingStorage)
        ));

        config.storage.root = None;
        config.storage.bucket = Some("bad/bucket".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { key: "storage.bucket", .. })
        ));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        assert!(matches!(
            Config::from_toml_str("prot = 25"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let result = Config::load(Some(&tmp.path().join("absent.toml")));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
        assert_eq!(Config::load(None).unwrap(), Config::default());
    }

    #[test]
    fn test_load_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ghostpost.toml");
        fs::write(&path, "port = 25\n[storage]\nroot = \"mail\"\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.port, 25);
        assert_eq!(config.storage.root, Some(PathBuf::from("mail")));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::from_toml_str("port = 2600").unwrap();
        config
            .apply_env(env(&[
                ("PORT", "2700"),
                ("ACCEPT_DOMAINS", "a.test, b.test,,"),
                ("STORAGE_ROOT", "/srv/mail"),
                ("PROXY_PROTOCOL", "yes"),
                ("BIND_ADDRESS", ""),
            ]))
            .unwrap();

        assert_eq!(config.port, 2700);
        assert_eq!(config.accept_domains, vec!["a.test", "b.test"]);
        assert_eq!(config.storage.root, Some(PathBuf::from("/srv/mail")));
        assert!(config.proxy_protocol);
        assert_eq!(config.bind_address, "0.0.0.0");
        config.validate().unwrap();
    }

    #[test]
    fn test_env_invalid_values() {
        let mut config = Config::default();
        assert!(matches!(
            config.apply_env(env(&[("PORT", "smtp")])),
            Err(ConfigError::InvalidValue { key: "PORT", .. })
        ));
        assert!(matches!(
            config.apply_env(env(&[("PROXY_PROTOCOL", "maybe")])),
            Err(ConfigError::InvalidValue { key: "PROXY_PROTOCOL", .. })
        ));
        assert!(matches!(
            config.apply_env(env(&[("S3_FORCE_PATH_STYLE", "sometimes")])),
            Err(ConfigError::InvalidValue { key: "S3_FORCE_PATH_STYLE", .. })
        ));
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.storage.root = Some(PathBuf::from("/tmp/mail"));
        config.validate().unwrap();

        config.accept_domains = Vec::new();
        assert!(matches!(config.validate(), Err(ConfigError::NoDomains)));

        config.accept_domains = vec!["user@ghostpost.sh".to_string()];
        assert!(matches!(config.validate(), Err(ConfigError::InvalidDomain(_))));

        config.accept_domains = vec!["ghost post.sh".to_string()];
        assert!(matches!(config.validate(), Err(ConfigError::InvalidDomain(_))));

        config.accept_domains = vec!["ghostpost.sh".to_string()];
        config.max_message_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroMessageSize)));
    }

    #[test]
    fn test_ipv6_listen_address() {
        let config = Config {
            bind_address: "::".to_string(),
            port: 25,
            ..Config::default()
        };
        assert_eq!(config.listen_address(), "[::]:25");
    }

    #[test]
    fn test_zero_idle_timeout_means_none() {
        let config = Config {
            idle_timeout_secs: Some(0),
            ..Config::default()
        };
        assert_eq!(config.server_settings().idle_timeout, None);
    }
}

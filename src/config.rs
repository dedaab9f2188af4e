//! Configuration manager for jwtauth.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use indexmap::IndexMap;
use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};

use crate::claims::ClaimValue;
use crate::claims::validator::DEFAULT_REQUIRED_CLAIMS;

pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const SECRET_KEY: &str = "secret";

const DEFAULT_ALGORITHM: &str = "HS256";
const DEFAULT_TTL: u64 = 60 * 60; // 1 hour.
const DEFAULT_REFRESH_TTL: u64 = 60 * 60 * 24 * 14; // 2 weeks.
const DEFAULT_ISSUER: &str = "jwtauth";
const DEFAULT_IDENTIFIER: &str = "sub";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot access configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("configuration file root must be a mapping")]
    NotAMapping,
    #[error("unsupported algorithm `{0}`")]
    UnsupportedAlgorithm(String),
    #[error("missing `secret` entry for a symmetric algorithm")]
    MissingSecret,
    #[error("missing `keys.{0}` entry for an asymmetric algorithm")]
    MissingKey(&'static str),
    #[error("`{0}` must be greater than zero")]
    Zero(&'static str),
    #[error("`identifier` cannot be empty")]
    EmptyIdentifier,
}

/// Process-wide settings, read once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Shared secret for HMAC algorithms.
    #[serde(skip_serializing)]
    pub secret: Option<String>,
    /// Signing algorithm, e.g. `HS256`, `RS256`, `ES256`.
    pub algo: String,
    /// PEM keys for asymmetric algorithms.
    #[serde(skip_serializing)]
    pub keys: Keys,
    /// Lifetime of a token, in seconds.
    pub ttl: u64,
    /// Time after issuance during which a token can be refreshed, in
    /// seconds.
    pub refresh_ttl: u64,
    /// Whether revoked tokens are tracked at all.
    pub blacklist_enabled: bool,
    /// Seconds a revoked token is still accepted by a refresh.
    pub blacklist_grace_period: u64,
    /// Tolerated clock skew, in seconds.
    pub leeway: u64,
    /// Value of the `iss` claim.
    pub issuer: String,
    /// Claims a token must carry.
    pub required_claims: Vec<String>,
    /// Claim holding the user identifier.
    pub identifier: String,
    /// Custom claims added to every token.
    pub claims: IndexMap<String, ClaimValue>,
    /// Implementation used for each capability.
    pub providers: Providers,
    /// Users of the in-memory directory.
    #[serde(skip_serializing)]
    pub users: Vec<User>,
    /// Related to Argon2 configuration.
    #[serde(skip_serializing)]
    pub argon2: Option<Argon2>,
    #[serde(skip)]
    path: PathBuf,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            secret: None,
            algo: DEFAULT_ALGORITHM.to_owned(),
            keys: Keys::default(),
            ttl: DEFAULT_TTL,
            refresh_ttl: DEFAULT_REFRESH_TTL,
            blacklist_enabled: true,
            blacklist_grace_period: 0,
            leeway: 0,
            issuer: DEFAULT_ISSUER.to_owned(),
            required_claims: DEFAULT_REQUIRED_CLAIMS
                .iter()
                .map(|claim| claim.to_string())
                .collect(),
            identifier: DEFAULT_IDENTIFIER.to_owned(),
            claims: IndexMap::new(),
            providers: Providers::default(),
            users: Vec::new(),
            argon2: None,
            path: PathBuf::new(),
        }
    }
}

/// PEM encoded keys.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keys {
    pub public: Option<String>,
    pub private: Option<String>,
}

/// Concrete implementation of each pluggable capability.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Providers {
    pub user: UserProvider,
    pub jwt: JwtProvider,
    pub auth: AuthProvider,
    pub storage: StorageProvider,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserProvider {
    /// Users listed under `users`.
    #[default]
    Memory,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JwtProvider {
    #[default]
    Jsonwebtoken,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    /// Principal signed in on the current session.
    #[default]
    Session,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    #[default]
    Memory,
}

/// User of the in-memory directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    /// Argon2 PHC string.
    pub password: String,
    #[serde(default)]
    pub claims: IndexMap<String, ClaimValue>,
}

/// Argon2 configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Argon2 {
    /// Memory used while hashing.
    pub memory_cost: u32,
    /// Iterations of hash.
    pub iterations: u32,
    /// Parallelism degree.
    pub parallelism: u32,
    /// Output hash length.
    pub hash_length: usize,
}

impl Default for Argon2 {
    fn default() -> Self {
        Self {
            memory_cost: 1024 * 64, // 64 MiB.
            iterations: 4,
            parallelism: 2,
            hash_length: 32,
        }
    }
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location. A missing file falls back on defaults.
    pub fn read(self) -> Result<Arc<Self>, ConfigError> {
        let file_path = if self.path.is_file() {
            self.path.clone()
        } else {
            Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        };

        let config = match File::open(&file_path) {
            Ok(file) => {
                let mut config: Configuration = serde_yaml::from_reader(file)?;
                config.path = file_path;
                config
            },
            Err(err) => {
                tracing::error!(error = %err, path = %file_path.display(), "configuration file not found, using defaults");
                self
            },
        };

        config.validate()?;
        Ok(Arc::new(config))
    }

    /// Parse a configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Configuration = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that would make the token lifecycle meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl == 0 {
            return Err(ConfigError::Zero("ttl"));
        }
        if self.refresh_ttl == 0 {
            return Err(ConfigError::Zero("refresh_ttl"));
        }
        if self.identifier.trim().is_empty() {
            return Err(ConfigError::EmptyIdentifier);
        }
        self.algorithm()?;

        Ok(())
    }

    /// Signing algorithm.
    pub fn algorithm(&self) -> Result<Algorithm, ConfigError> {
        Algorithm::from_str(&self.algo)
            .map_err(|_| ConfigError::UnsupportedAlgorithm(self.algo.clone()))
    }
}

/// Set the `secret` entry of the configuration file at `path`, keeping every
/// other entry. The file is created if missing.
pub fn write_secret(path: &Path, secret: &str) -> Result<(), ConfigError> {
    let mut document = if path.is_file() {
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            serde_yaml::Value::Mapping(serde_yaml::Mapping::new())
        } else {
            serde_yaml::from_str(&content)?
        }
    } else {
        serde_yaml::Value::Mapping(serde_yaml::Mapping::new())
    };

    let serde_yaml::Value::Mapping(mapping) = &mut document else {
        return Err(ConfigError::NotAMapping);
    };
    mapping.insert(SECRET_KEY.into(), secret.into());

    std::fs::write(path, serde_yaml::to_string(&document)?)?;
    tracing::info!(path = %path.display(), "signing secret written");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Configuration::default();

        assert_eq!(config.algorithm().unwrap(), Algorithm::HS256);
        assert_eq!(config.ttl, 3600);
        assert!(config.blacklist_enabled);
        assert_eq!(config.identifier, "sub");
        assert_eq!(config.required_claims.len(), 6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_yaml() {
        let config = Configuration::from_yaml(
            r#"
secret: changeme
algo: HS512
ttl: 60
refresh_ttl: 600
blacklist_grace_period: 30
required_claims: [sub, exp]
claims:
  aud: api
providers:
  storage: memory
users:
  - id: "42"
    username: ada
    password: "$argon2id$..."
"#,
        )
        .unwrap();

        assert_eq!(config.secret.as_deref(), Some("changeme"));
        assert_eq!(config.algorithm().unwrap(), Algorithm::HS512);
        assert_eq!(config.ttl, 60);
        assert_eq!(config.blacklist_grace_period, 30);
        assert_eq!(config.required_claims, vec!["sub", "exp"]);
        assert_eq!(config.claims.get("aud"), Some(&ClaimValue::from("api")));
        assert_eq!(config.providers.storage, StorageProvider::Memory);
        assert_eq!(config.users[0].username, "ada");
        // Untouched entries keep their default.
        assert_eq!(config.issuer, "jwtauth");
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            Configuration::from_yaml("ttl: 0"),
            Err(ConfigError::Zero("ttl"))
        ));
        assert!(matches!(
            Configuration::from_yaml("algo: none"),
            Err(ConfigError::UnsupportedAlgorithm(_))
        ));
        assert!(matches!(
            Configuration::from_yaml("identifier: ''"),
            Err(ConfigError::EmptyIdentifier)
        ));
        assert!(matches!(
            Configuration::from_yaml("providers:\n  storage: redis"),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn test_read_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jwt.yaml");
        std::fs::write(&path, "secret: abc\nttl: 120\n").unwrap();

        let config = Configuration::default().path(path).read().unwrap();
        assert_eq!(config.secret.as_deref(), Some("abc"));
        assert_eq!(config.ttl, 120);
    }

    #[test]
    fn test_write_secret_keeps_other_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "secret: old\nttl: 120\n").unwrap();

        write_secret(&path, "new").unwrap();

        let config = Configuration::default().path(path).read().unwrap();
        assert_eq!(config.secret.as_deref(), Some("new"));
        assert_eq!(config.ttl, 120);
    }

    #[test]
    fn test_write_secret_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");

        write_secret(&path, "fresh").unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("secret: fresh"));
    }

    #[test]
    fn test_write_secret_rejects_non_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "- a\n- b\n").unwrap();

        assert!(matches!(
            write_secret(&path, "x"),
            Err(ConfigError::NotAMapping)
        ));
    }
}

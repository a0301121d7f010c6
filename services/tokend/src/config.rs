use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::net::SocketAddr;

pub const DEFAULT_ISSUER: &str = "tokend";
pub const DEFAULT_AUDIENCE: &str = "tokend-api";
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 2_000;
pub const MIN_SIGNING_SECRET_BYTES: usize = 32;

// Service configuration sourced from environment variables, optionally
// overridden by the YAML file named in TOKEND_CONFIG.
#[derive(Debug, Clone)]
pub struct TokendConfig {
    pub bind_addr: SocketAddr,
    pub metrics_bind: SocketAddr,
    pub signing: SigningConfig,
    pub operator: OperatorCredential,
    pub storage: StorageBackend,
    pub postgres: Option<PostgresConfig>,
    // Deadline applied to every store call made on behalf of a request.
    pub store_timeout_ms: u64,
}

#[derive(Clone)]
pub struct SigningConfig {
    pub secret: Vec<u8>,
    pub issuer: String,
    pub audience: String,
}

impl fmt::Debug for SigningConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningConfig")
            .field("secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .finish()
    }
}

/// Static operator credential checked by the administrative routes.
#[derive(Clone, PartialEq, Eq)]
pub struct OperatorCredential {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for OperatorCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorCredential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Postgres,
}

impl StorageBackend {
    fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            other => bail!("unknown storage backend {other}"),
        }
    }
}

#[derive(Clone, Deserialize)]
pub struct PostgresConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_ms: u64,
    pub acquire_timeout_ms: u64,
}

impl fmt::Debug for PostgresConfig {
    // The URL may embed credentials.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("url", &"<redacted>")
            .field("max_connections", &self.max_connections)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("acquire_timeout_ms", &self.acquire_timeout_ms)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokendConfigOverride {
    bind_addr: Option<String>,
    metrics_bind: Option<String>,
    issuer: Option<String>,
    audience: Option<String>,
    storage: Option<StorageBackend>,
    postgres: Option<PostgresConfig>,
    store_timeout_ms: Option<u64>,
}

impl TokendConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr = std::env::var("TOKEND_BIND")
            .unwrap_or_else(|_| "0.0.0.0:8443".to_string())
            .parse()
            .with_context(|| "parse TOKEND_BIND")?;
        let metrics_bind = std::env::var("TOKEND_METRICS_BIND")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()
            .with_context(|| "parse TOKEND_METRICS_BIND")?;

        let secret = std::env::var("TOKEND_SIGNING_SECRET")
            .with_context(|| "TOKEND_SIGNING_SECRET is required")?;
        let signing = SigningConfig {
            secret: secret.into_bytes(),
            issuer: std::env::var("TOKEND_ISSUER").unwrap_or_else(|_| DEFAULT_ISSUER.to_string()),
            audience: std::env::var("TOKEND_AUDIENCE")
                .unwrap_or_else(|_| DEFAULT_AUDIENCE.to_string()),
        };

        let operator = OperatorCredential {
            username: std::env::var("TOKEND_OPERATOR_USER")
                .with_context(|| "TOKEND_OPERATOR_USER is required")?,
            password: std::env::var("TOKEND_OPERATOR_PASSWORD")
                .with_context(|| "TOKEND_OPERATOR_PASSWORD is required")?,
        };

        let storage = match std::env::var("TOKEND_STORAGE") {
            Ok(value) => StorageBackend::parse(&value)?,
            Err(_) => StorageBackend::Memory,
        };
        let postgres = std::env::var("TOKEND_POSTGRES_URL")
            .ok()
            .map(|url| PostgresConfig {
                url,
                max_connections: env_u64("TOKEND_PG_MAX_CONNECTIONS", 10) as u32,
                connect_timeout_ms: env_u64("TOKEND_PG_CONNECT_TIMEOUT_MS", 5_000),
                acquire_timeout_ms: env_u64("TOKEND_PG_ACQUIRE_TIMEOUT_MS", 5_000),
            });
        let store_timeout_ms = env_u64("TOKEND_STORE_TIMEOUT_MS", DEFAULT_STORE_TIMEOUT_MS);

        let config = Self {
            bind_addr,
            metrics_bind,
            signing,
            operator,
            storage,
            postgres,
            store_timeout_ms,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::from_env()?;
        if let Ok(path) = std::env::var("TOKEND_CONFIG") {
            let contents =
                fs::read_to_string(&path).with_context(|| format!("read TOKEND_CONFIG: {path}"))?;
            config.apply_yaml(&contents)?;
            config.validate()?;
        }
        Ok(config)
    }

    fn apply_yaml(&mut self, contents: &str) -> Result<()> {
        let override_cfg: TokendConfigOverride =
            serde_yaml::from_str(contents).with_context(|| "parse tokend config yaml")?;
        if let Some(value) = override_cfg.bind_addr {
            self.bind_addr = value.parse().with_context(|| "parse bind_addr")?;
        }
        if let Some(value) = override_cfg.metrics_bind {
            self.metrics_bind = value.parse().with_context(|| "parse metrics_bind")?;
        }
        if let Some(value) = override_cfg.issuer {
            self.signing.issuer = value;
        }
        if let Some(value) = override_cfg.audience {
            self.signing.audience = value;
        }
        if let Some(value) = override_cfg.storage {
            self.storage = value;
        }
        if let Some(value) = override_cfg.postgres {
            self.postgres = Some(value);
        }
        if let Some(value) = override_cfg.store_timeout_ms {
            self.store_timeout_ms = value;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.signing.secret.len() < MIN_SIGNING_SECRET_BYTES {
            bail!("signing secret must be at least {MIN_SIGNING_SECRET_BYTES} bytes");
        }
        if self.operator.username.is_empty() || self.operator.password.is_empty() {
            bail!("operator credential must not be empty");
        }
        if self.operator.username.contains(':') {
            bail!("operator username must not contain ':'");
        }
        if self.store_timeout_ms == 0 {
            bail!("store timeout must be positive");
        }
        Ok(())
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const REQUIRED: [(&str, &str); 3] = [
        (
            "TOKEND_SIGNING_SECRET",
            "0123456789abcdef0123456789abcdef",
        ),
        ("TOKEND_OPERATOR_USER", "ops"),
        ("TOKEND_OPERATOR_PASSWORD", "hunter2"),
    ];

    const OPTIONAL: [&str; 10] = [
        "TOKEND_BIND",
        "TOKEND_METRICS_BIND",
        "TOKEND_ISSUER",
        "TOKEND_AUDIENCE",
        "TOKEND_STORAGE",
        "TOKEND_POSTGRES_URL",
        "TOKEND_PG_MAX_CONNECTIONS",
        "TOKEND_STORE_TIMEOUT_MS",
        "TOKEND_CONFIG",
        "TOKEND_PG_ACQUIRE_TIMEOUT_MS",
    ];

    struct EnvGuard {
        saved: Vec<(&'static str, Option<String>)>,
    }

    impl EnvGuard {
        fn new() -> Self {
            let mut saved = Vec::new();
            for (key, value) in REQUIRED {
                saved.push((key, std::env::var(key).ok()));
                unsafe {
                    std::env::set_var(key, value);
                }
            }
            for key in OPTIONAL {
                saved.push((key, std::env::var(key).ok()));
                unsafe {
                    std::env::remove_var(key);
                }
            }
            Self { saved }
        }

        fn set(&self, key: &str, value: &str) {
            unsafe {
                std::env::set_var(key, value);
            }
        }

        fn unset(&self, key: &str) {
            unsafe {
                std::env::remove_var(key);
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in &self.saved {
                match value {
                    Some(value) => unsafe {
                        std::env::set_var(key, value);
                    },
                    None => unsafe {
                        std::env::remove_var(key);
                    },
                }
            }
        }
    }

    #[test]
    #[serial]
    fn from_env_applies_defaults() {
        let _guard = EnvGuard::new();
        let config = TokendConfig::from_env().expect("config");
        assert_eq!(config.bind_addr, "0.0.0.0:8443".parse().expect("addr"));
        assert_eq!(config.signing.issuer, DEFAULT_ISSUER);
        assert_eq!(config.signing.audience, DEFAULT_AUDIENCE);
        assert_eq!(config.storage, StorageBackend::Memory);
        assert!(config.postgres.is_none());
        assert_eq!(config.store_timeout_ms, DEFAULT_STORE_TIMEOUT_MS);
    }

    #[test]
    #[serial]
    fn from_env_requires_signing_secret() {
        let guard = EnvGuard::new();
        guard.unset("TOKEND_SIGNING_SECRET");
        let err = TokendConfig::from_env().expect_err("missing secret");
        assert!(err.to_string().contains("TOKEND_SIGNING_SECRET"));
    }

    #[test]
    #[serial]
    fn from_env_rejects_short_secret() {
        let guard = EnvGuard::new();
        guard.set("TOKEND_SIGNING_SECRET", "short");
        let err = TokendConfig::from_env().expect_err("short secret");
        assert!(err.to_string().contains("at least"));
    }

    #[test]
    #[serial]
    fn from_env_reads_postgres_settings() {
        let guard = EnvGuard::new();
        guard.set("TOKEND_STORAGE", "postgres");
        guard.set("TOKEND_POSTGRES_URL", "postgres://u:p@localhost/db");
        guard.set("TOKEND_PG_MAX_CONNECTIONS", "3");
        let config = TokendConfig::from_env().expect("config");
        assert_eq!(config.storage, StorageBackend::Postgres);
        let pg = config.postgres.expect("postgres");
        assert_eq!(pg.max_connections, 3);
        assert_eq!(pg.acquire_timeout_ms, 5_000);
    }

    #[test]
    #[serial]
    fn yaml_overrides_env_values() {
        let _guard = EnvGuard::new();
        let mut config = TokendConfig::from_env().expect("config");
        config
            .apply_yaml(
                "bind_addr: 127.0.0.1:9000\nissuer: custom-issuer\nstorage: postgres\nstore_timeout_ms: 250\n",
            )
            .expect("yaml");
        assert_eq!(config.bind_addr, "127.0.0.1:9000".parse().expect("addr"));
        assert_eq!(config.signing.issuer, "custom-issuer");
        assert_eq!(config.storage, StorageBackend::Postgres);
        assert_eq!(config.store_timeout_ms, 250);
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let signing = SigningConfig {
            secret: b"super-secret-value".to_vec(),
            issuer: "i".to_string(),
            audience: "a".to_string(),
        };
        let operator = OperatorCredential {
            username: "ops".to_string(),
            password: "hunter2".to_string(),
        };
        let rendered = format!("{signing:?} {operator:?}");
        assert!(!rendered.contains("super-secret-value"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn storage_backend_parse_rejects_unknown() {
        assert_eq!(
            StorageBackend::parse("Postgres").expect("pg"),
            StorageBackend::Postgres
        );
        assert!(StorageBackend::parse("sqlite").is_err());
    }
}

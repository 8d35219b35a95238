//! Run-time credential lookup.
//!
//! Secrets are resolved at the start of every run and handed down to the
//! stages that need them. Nothing is cached between runs, so a rotated key is
//! picked up by the next run.

pub mod key_vault;

pub use key_vault::KeyVaultSecretProvider;

use crate::error::{PipelineError, Result};
use crate::utils::constants::{
    DEFAULT_API_KEY_SECRET, DEFAULT_STORAGE_URL_SECRET, ENV_SECRET_PREFIX,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use tracing::info;

#[async_trait]
pub trait SecretProvider: Send + Sync {
    /// Resolve one named secret. Unknown names and unreachable backends are
    /// both `SecretUnavailable`.
    async fn resolve(&self, name: &str) -> Result<String>;
}

/// Names of the two secrets a run consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretNames {
    pub api_key: String,
    pub storage_url: String,
}

impl Default for SecretNames {
    fn default() -> Self {
        Self {
            api_key: DEFAULT_API_KEY_SECRET.to_string(),
            storage_url: DEFAULT_STORAGE_URL_SECRET.to_string(),
        }
    }
}

/// Credentials for one run.
#[derive(Clone)]
pub struct RunSecrets {
    api_key: String,
    storage_url: String,
}

impl RunSecrets {
    pub fn new(api_key: impl Into<String>, storage_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            storage_url: storage_url.into(),
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn storage_url(&self) -> &str {
        &self.storage_url
    }
}

impl fmt::Debug for RunSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunSecrets")
            .field("api_key", &"<redacted>")
            .field("storage_url", &"<redacted>")
            .finish()
    }
}

/// Resolve both run secrets, one lookup per name, in order.
pub async fn resolve_run_secrets(
    provider: &dyn SecretProvider,
    names: &SecretNames,
) -> Result<RunSecrets> {
    let api_key = resolve_non_empty(provider, &names.api_key).await?;
    let storage_url = resolve_non_empty(provider, &names.storage_url).await?;

    info!("Resolved run secrets");
    Ok(RunSecrets::new(api_key, storage_url))
}

async fn resolve_non_empty(provider: &dyn SecretProvider, name: &str) -> Result<String> {
    let value = provider.resolve(name).await?;
    if value.trim().is_empty() {
        return Err(PipelineError::secret_unavailable(name, "secret is empty"));
    }
    Ok(value)
}

/// Reads `WEATHER_SECRET_<NAME>` environment variables, where `<NAME>` is the
/// secret name upper-cased with non-alphanumerics replaced by `_`.
#[derive(Debug, Clone)]
pub struct EnvSecretProvider {
    prefix: String,
}

impl EnvSecretProvider {
    pub fn new() -> Self {
        Self::with_prefix(ENV_SECRET_PREFIX)
    }

    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    pub fn variable_name(&self, secret_name: &str) -> String {
        let suffix: String = secret_name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}{}", self.prefix, suffix)
    }
}

impl Default for EnvSecretProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecretProvider for EnvSecretProvider {
    async fn resolve(&self, name: &str) -> Result<String> {
        let variable = self.variable_name(name);
        std::env::var(&variable).map_err(|_| {
            PipelineError::secret_unavailable(name, format!("environment variable {} is not set", variable))
        })
    }
}

/// In-memory secrets, for fixed deployments and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticSecrets {
    values: HashMap<String, String>,
}

impl StaticSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, name: &str, value: &str) -> Self {
        self.values.insert(name.to_string(), value.to_string());
        self
    }
}

#[async_trait]
impl SecretProvider for StaticSecrets {
    async fn resolve(&self, name: &str) -> Result<String> {
        self.values
            .get(name)
            .cloned()
            .ok_or_else(|| PipelineError::secret_unavailable(name, "unknown secret"))
    }
}

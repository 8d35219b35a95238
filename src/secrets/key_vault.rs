use crate::error::{PipelineError, Result};
use crate::secrets::SecretProvider;
use crate::utils::constants::KEYVAULT_API_VERSION;
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct SecretBundle {
    value: Option<String>,
}

/// Azure Key Vault secrets over its REST API.
///
/// The bearer token is read from an environment variable on every lookup;
/// obtaining that token is left to the deployment.
pub struct KeyVaultSecretProvider {
    client: Client,
    vault_url: String,
    token_env: String,
}

impl KeyVaultSecretProvider {
    pub fn new(vault_url: &str, token_env: &str) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            vault_url: vault_url.trim_end_matches('/').to_string(),
            token_env: token_env.to_string(),
        })
    }

    fn access_token(&self, name: &str) -> Result<String> {
        std::env::var(&self.token_env).map_err(|_| {
            PipelineError::secret_unavailable(
                name,
                format!("no vault access token in {}", self.token_env),
            )
        })
    }

    /// `{vault}/secrets/{name}` with the name as one escaped path segment
    fn secret_url(&self, name: &str) -> Result<Url> {
        let mut url = Url::parse(&self.vault_url)
            .map_err(|e| PipelineError::secret_unavailable(name, format!("invalid vault URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| PipelineError::secret_unavailable(name, "vault URL cannot take a path"))?
            .pop_if_empty()
            .push("secrets")
            .push(name);
        Ok(url)
    }
}

#[async_trait]
impl SecretProvider for KeyVaultSecretProvider {
    async fn resolve(&self, name: &str) -> Result<String> {
        let token = self.access_token(name)?;
        let url = self.secret_url(name)?;
        debug!(secret = name, vault = %self.vault_url, "Requesting secret");

        let response = self
            .client
            .get(url)
            .query(&[("api-version", KEYVAULT_API_VERSION)])
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| PipelineError::secret_unavailable(name, e.without_url().to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(PipelineError::secret_unavailable(name, "unknown secret"));
        }
        if !status.is_success() {
            return Err(PipelineError::secret_unavailable(
                name,
                format!("vault returned {}", status),
            ));
        }

        let bundle: SecretBundle = response
            .json()
            .await
            .map_err(|e| PipelineError::secret_unavailable(name, e.without_url().to_string()))?;

        let value = bundle
            .value
            .ok_or_else(|| PipelineError::secret_unavailable(name, "secret has no value"))?;

        info!(secret = name, "Retrieved secret from key vault");
        Ok(value)
    }
}

//! Credential fetch, storage and export

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command;
use tokio::sync::RwLock;
use url::Url;

use super::endpoint::endpoint_from_env;
use super::error::CredentialError;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub const ENV_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const ENV_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
pub const ENV_SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";

/// Temporary credentials as served by the metadata endpoint
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct CredentialSet {
    #[serde(rename = "AccessKeyId")]
    pub access_key_id: String,
    #[serde(rename = "SecretAccessKey")]
    pub secret_access_key: String,
    #[serde(rename = "Token")]
    pub session_token: String,
    #[serde(rename = "Expiration", default)]
    pub expiration: Option<String>,
}

impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSet")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .field("expiration", &self.expiration)
            .finish()
    }
}

impl CredentialSet {
    /// Export into a child process environment
    pub fn export(&self, command: &mut Command) {
        command
            .env(ENV_ACCESS_KEY_ID, &self.access_key_id)
            .env(ENV_SECRET_ACCESS_KEY, &self.secret_access_key)
            .env(ENV_SESSION_TOKEN, &self.session_token);
    }
}

/// Keeps the latest credential set for pipeline launches
///
/// Without an endpoint every refresh is a logged no-op and children inherit
/// whatever static credentials the parent environment holds.
pub struct CredentialManager {
    client: reqwest::Client,
    endpoint: Option<Url>,
    current: RwLock<Option<CredentialSet>>,
}

impl CredentialManager {
    pub fn new(endpoint: Option<Url>) -> Result<Self, CredentialError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            endpoint,
            current: RwLock::new(None),
        })
    }

    /// Resolve the endpoint from an explicit URL or the container environment
    pub fn from_env(explicit: Option<&str>) -> Result<Self, CredentialError> {
        Self::new(endpoint_from_env(explicit)?)
    }

    /// Manager that never fetches
    pub fn disabled() -> Result<Self, CredentialError> {
        Self::new(None)
    }

    pub fn endpoint(&self) -> Option<&Url> {
        self.endpoint.as_ref()
    }

    /// Best-effort refresh, `true` when a new set was stored
    pub async fn refresh(&self) -> bool {
        match self.fetch_and_store().await {
            Ok(()) => true,
            Err(CredentialError::NoEndpoint) => {
                tracing::debug!("No credential endpoint, keeping inherited environment");
                false
            }
            Err(e) => {
                tracing::info!(error = %e, "Credential refresh failed");
                false
            }
        }
    }

    /// Refresh before a restart; failures are louder but never fatal
    pub async fn force_refresh(&self) -> bool {
        match self.fetch_and_store().await {
            Ok(()) => true,
            Err(CredentialError::NoEndpoint) => false,
            Err(e) => {
                let has_previous = self.current.read().await.is_some();
                tracing::warn!(
                    error = %e,
                    has_previous = has_previous,
                    "Forced credential refresh failed, launching with stored credentials"
                );
                false
            }
        }
    }

    /// Fetch once and replace the stored set
    pub async fn fetch_and_store(&self) -> Result<(), CredentialError> {
        let credentials = self.fetch().await?;
        tracing::info!(
            access_key_id = %credentials.access_key_id,
            expiration = credentials.expiration.as_deref().unwrap_or("unknown"),
            "Credentials refreshed"
        );
        *self.current.write().await = Some(credentials);
        Ok(())
    }

    async fn fetch(&self) -> Result<CredentialSet, CredentialError> {
        let endpoint = self.endpoint.as_ref().ok_or(CredentialError::NoEndpoint)?;

        let response = self.client.get(endpoint.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CredentialError::Status(status.as_u16()));
        }

        Ok(response.json::<CredentialSet>().await?)
    }

    pub async fn current(&self) -> Option<CredentialSet> {
        self.current.read().await.clone()
    }

    /// Export the stored set, if any, into a launching process
    pub async fn apply(&self, command: &mut Command) {
        if let Some(credentials) = self.current.read().await.as_ref() {
            credentials.export(command);
        }
    }
}

impl fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialManager")
            .field("endpoint", &self.endpoint.as_ref().map(Url::as_str))
            .finish()
    }
}

//! Credential resolution
//!
//! Secret storage and interactive prompting belong to the host; this module only
//! defines the traits it implements and the lookup order.

use std::collections::HashMap;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::error::LlmError;
use crate::types::{ModelConfig, ProtocolFamily};

/// Key consulted when no provider-specific credential is stored.
pub const GENERIC_CREDENTIAL_KEY: &str = "default";

/// Host-side secret storage.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<SecretString>;
}

/// Asks the user for a credential; only consulted when the request allows it.
#[async_trait]
pub trait CredentialPrompt: Send + Sync {
    async fn prompt(&self, key: &str) -> Option<SecretString>;
}

/// In-memory store, handy for tests and for hosts that resolve secrets up front.
#[derive(Default)]
pub struct StaticCredentials {
    secrets: HashMap<String, SecretString>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, secret: impl Into<String>) -> Self {
        self.secrets
            .insert(key.into(), SecretString::from(secret.into()));
        self
    }
}

impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("keys", &self.secrets.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[async_trait]
impl CredentialStore for StaticCredentials {
    async fn get(&self, key: &str) -> Option<SecretString> {
        self.secrets
            .get(key)
            .map(|secret| SecretString::from(secret.expose_secret().to_owned()))
    }
}

/// Resolve the credential for `model`.
///
/// Order: the model's credential key, then the generic key, then the prompt
/// (only when `allow_prompt`). Ollama tolerates a missing credential and
/// resolves to `None`; every other family fails with `InvalidConfiguration`.
pub async fn resolve_credential(
    model: &ModelConfig,
    store: &dyn CredentialStore,
    prompt: Option<&dyn CredentialPrompt>,
    allow_prompt: bool,
) -> Result<Option<SecretString>, LlmError> {
    let key = model.credential_key();
    if let Some(secret) = store.get(key).await {
        return Ok(Some(secret));
    }
    if key != GENERIC_CREDENTIAL_KEY
        && let Some(secret) = store.get(GENERIC_CREDENTIAL_KEY).await
    {
        tracing::debug!(family = %model.family, key, "using generic credential");
        return Ok(Some(secret));
    }
    if allow_prompt
        && let Some(prompt) = prompt
        && let Some(secret) = prompt.prompt(key).await
    {
        return Ok(Some(secret));
    }

    if model.family == ProtocolFamily::Ollama {
        return Ok(None);
    }
    Err(LlmError::InvalidConfiguration(format!(
        "missing credential '{key}' for {} model '{}'",
        model.family, model.id
    )))
}

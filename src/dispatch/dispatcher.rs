use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;

use super::http::{build_headers, endpoint_url, send_once};
use super::pacing::{PacePermit, RequestPacer};
use super::adapter_for;
use crate::auth::{CredentialPrompt, CredentialStore, resolve_credential};
use crate::config::AdapterConfig;
use crate::error::LlmError;
use crate::reasoning_cache::ReasoningCache;
use crate::retry::RetryExecutor;
use crate::standards::{BuildContext, BuiltRequest};
use crate::streaming::{StreamParseState, drive_stream, frames};
use crate::types::{ChatMessage, ChatStream, ModelConfig, RequestOptions};
use crate::utils::cancel::CancelHandle;

/// Runs chat turns against any supported backend.
///
/// One `Dispatcher` is shared by the host for all requests. It owns the HTTP
/// client, the reasoning cache and the pacing state; nothing else is shared
/// between requests.
pub struct Dispatcher {
    client: reqwest::Client,
    config: AdapterConfig,
    credentials: Arc<dyn CredentialStore>,
    prompt: Option<Arc<dyn CredentialPrompt>>,
    reasoning_cache: Arc<ReasoningCache>,
    pacer: RequestPacer,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .field("has_prompt", &self.prompt.is_some())
            .field("reasoning_cache_len", &self.reasoning_cache.len())
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(config: AdapterConfig, credentials: Arc<dyn CredentialStore>) -> Result<Self, LlmError> {
        let client = config.http.build_client()?;
        Ok(Self::with_client(client, config, credentials))
    }

    /// Use a caller-provided HTTP client; `config.http` is then ignored.
    pub fn with_client(
        client: reqwest::Client,
        config: AdapterConfig,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        let reasoning_cache = Arc::new(ReasoningCache::new(config.reasoning_cache_capacity));
        Self {
            client,
            config,
            credentials,
            prompt: None,
            reasoning_cache,
            pacer: RequestPacer::new(),
        }
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn CredentialPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    pub fn reasoning_cache(&self) -> &Arc<ReasoningCache> {
        &self.reasoning_cache
    }

    /// Build the provider request body without sending it.
    pub fn build_request(
        &self,
        messages: &[ChatMessage],
        model: &ModelConfig,
        options: &RequestOptions,
    ) -> Result<BuiltRequest, LlmError> {
        let ctx = BuildContext::new()
            .with_reasoning_cache(&self.reasoning_cache)
            .with_sampling(self.config.sampling_defaults());
        (adapter_for(model.family).build)(messages, model, options, &ctx)
    }

    /// Start one chat turn and return its canonical event stream.
    ///
    /// Configuration problems fail before any network call. Transport failures
    /// during the connection phase are retried per the configured policy; once
    /// the response body streams, errors surface through the returned stream.
    pub async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        model: &ModelConfig,
        options: &RequestOptions,
        cancel: CancelHandle,
    ) -> Result<ChatStream, LlmError> {
        cancel.check()?;
        let adapter = adapter_for(model.family);
        let family = adapter.family;

        let url = endpoint_url(adapter, model)?;
        let built = self.build_request(messages, model, options)?;
        let credential = resolve_credential(
            model,
            self.credentials.as_ref(),
            self.prompt.as_deref(),
            options.allow_credential_prompt,
        )
        .await?;
        let headers = build_headers(adapter, model, credential.as_ref(), &self.config.http.user_agent)?;
        let body = Bytes::from(serde_json::to_vec(&built.body)?);
        tracing::debug!(
            %family,
            model = %model.id,
            %url,
            warnings = built.warnings.len(),
            "dispatching chat request"
        );

        let permit = match self.config.request_delay(model.request_delay_ms) {
            Some(delay) => Some(self.pacer.acquire(delay, &cancel).await?),
            None => None,
        };

        let executor = RetryExecutor::new(self.config.retry.clone());
        let mut attempt = 0u32;
        let response = executor
            .execute_cancellable(
                || {
                    attempt += 1;
                    tracing::debug!(%family, %url, attempt, "sending request");
                    send_once(&self.client, &url, headers.clone(), body.clone(), family)
                },
                &cancel,
            )
            .await
            .map_err(|e| e.with_family(family))?;

        let bytes = response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| LlmError::from(e).with_family(family)));
        let state = StreamParseState::new(family, self.config.stream_options())
            .with_reasoning_cache(Arc::clone(&self.reasoning_cache));
        let events = drive_stream(
            frames(bytes, adapter.framing),
            adapter.new_converter(state),
            cancel,
        );

        Ok(match permit {
            Some(permit) => hold_permit(events, permit),
            None => events,
        })
    }
}

/// Keep the pacing permit alive until the stream finishes or is dropped.
fn hold_permit(mut events: ChatStream, permit: PacePermit) -> ChatStream {
    Box::pin(async_stream::stream! {
        let _permit = permit;
        while let Some(event) = events.next().await {
            yield event;
        }
    })
}

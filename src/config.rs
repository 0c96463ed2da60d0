//! Adapter-wide configuration
//!
//! `AdapterConfig` is loaded by the host (usually from its settings store) and
//! shared by every request a [`Dispatcher`](crate::dispatch::Dispatcher) runs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::reasoning_cache::DEFAULT_REASONING_CACHE_CAPACITY;
use crate::retry::RetryPolicy;
use crate::standards::SamplingDefaults;
use crate::streaming::StreamOptions;

/// `llm-wire/<crate version>`
pub fn default_user_agent() -> String {
    format!("llm-wire/{}", env!("CARGO_PKG_VERSION"))
}

/// HTTP client settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpConfig {
    /// Whole-request timeout. Leave unset for long streams.
    pub timeout_secs: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
    pub proxy: Option<String>,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: None,
            connect_timeout_secs: None,
            proxy: None,
            user_agent: default_user_agent(),
        }
    }
}

impl HttpConfig {
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn with_connect_timeout_secs(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = Some(secs);
        self
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Build the shared HTTP client.
    pub fn build_client(&self) -> Result<reqwest::Client, LlmError> {
        let mut builder = reqwest::Client::builder().user_agent(&self.user_agent);

        if let Some(secs) = self.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = self.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(secs));
        }
        if let Some(proxy_url) = &self.proxy {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| LlmError::InvalidConfiguration(format!("Invalid proxy URL: {e}")))?;
            builder = builder.proxy(proxy);
        }

        builder
            .build()
            .map_err(|e| LlmError::InvalidConfiguration(format!("Failed to build HTTP client: {e}")))
    }
}

/// Configuration shared by every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdapterConfig {
    pub retry: RetryPolicy,
    /// Minimum gap between one request's completion and the next request's start.
    pub request_delay_ms: Option<u64>,
    pub thinking_flush_interval_ms: u64,
    pub emit_filler_space: bool,
    pub emit_tool_call_begin_hint: bool,
    pub scan_think_tags: bool,
    pub reasoning_cache_capacity: usize,
    /// Used when a model leaves `temperature` unset.
    pub default_temperature: Option<f64>,
    /// Used when a model leaves `top_p` unset.
    pub default_top_p: Option<f64>,
    pub http: HttpConfig,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            request_delay_ms: None,
            thinking_flush_interval_ms: 100,
            emit_filler_space: true,
            emit_tool_call_begin_hint: false,
            scan_think_tags: true,
            reasoning_cache_capacity: DEFAULT_REASONING_CACHE_CAPACITY,
            default_temperature: None,
            default_top_p: None,
            http: HttpConfig::default(),
        }
    }
}

impl AdapterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_request_delay_ms(mut self, delay_ms: u64) -> Self {
        self.request_delay_ms = Some(delay_ms);
        self
    }

    pub fn with_thinking_flush_interval_ms(mut self, interval_ms: u64) -> Self {
        self.thinking_flush_interval_ms = interval_ms;
        self
    }

    pub fn with_filler_space(mut self, enabled: bool) -> Self {
        self.emit_filler_space = enabled;
        self
    }

    pub fn with_tool_call_begin_hint(mut self, enabled: bool) -> Self {
        self.emit_tool_call_begin_hint = enabled;
        self
    }

    pub fn with_think_tag_scanning(mut self, enabled: bool) -> Self {
        self.scan_think_tags = enabled;
        self
    }

    pub fn with_reasoning_cache_capacity(mut self, capacity: usize) -> Self {
        self.reasoning_cache_capacity = capacity;
        self
    }

    pub fn with_default_sampling(mut self, temperature: Option<f64>, top_p: Option<f64>) -> Self {
        self.default_temperature = temperature;
        self.default_top_p = top_p;
        self
    }

    pub fn with_http(mut self, http: HttpConfig) -> Self {
        self.http = http;
        self
    }

    pub fn stream_options(&self) -> StreamOptions {
        StreamOptions {
            thinking_flush_interval: Duration::from_millis(self.thinking_flush_interval_ms),
            emit_filler_space: self.emit_filler_space,
            emit_tool_call_begin_hint: self.emit_tool_call_begin_hint,
            scan_think_tags: self.scan_think_tags,
        }
    }

    pub fn sampling_defaults(&self) -> SamplingDefaults {
        SamplingDefaults {
            temperature: self.default_temperature,
            top_p: self.default_top_p,
        }
    }

    /// Effective inter-request delay; a per-model value wins over the global one.
    pub fn request_delay(&self, model_delay_ms: Option<u64>) -> Option<Duration> {
        model_delay_ms
            .or(self.request_delay_ms)
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

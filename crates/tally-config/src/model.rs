// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Tally agent service.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};
use tally_core::ProviderId;

/// Top-level Tally configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment
/// variable overrides. All sections are optional and default to sensible
/// values.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TallyConfig {
    /// Service identity and logging settings.
    #[serde(default)]
    pub service: ServiceConfig,

    /// HTTP gateway settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Upstream provider settings.
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Retry/backoff settings for upstream calls.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Availability cooldown settings.
    #[serde(default)]
    pub resilience: ResilienceConfig,

    /// Credit billing settings.
    #[serde(default)]
    pub billing: BillingConfig,

    /// Push notification settings.
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Agent personality catalog. When empty, a built-in default
    /// catalog is used.
    #[serde(default = "default_agents")]
    pub agents: Vec<AgentProfileConfig>,
}

impl Default for TallyConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            gateway: GatewayConfig::default(),
            storage: StorageConfig::default(),
            providers: ProvidersConfig::default(),
            retry: RetryConfig::default(),
            resilience: ResilienceConfig::default(),
            billing: BillingConfig::default(),
            notify: NotifyConfig::default(),
            agents: default_agents(),
        }
    }
}

/// Service identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Display name of the service.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "tally".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// HTTP gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Host address to bind.
    #[serde(default = "default_gateway_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bearer token for API auth. `None` rejects all authenticated
    /// routes (fail-closed).
    #[serde(default)]
    pub bearer_token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
            bearer_token: None,
        }
    }
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    8420
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("tally").join("tally.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("tally.db"))
        .to_string_lossy()
        .into_owned()
}

/// Per-provider upstream configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Whether this provider participates in routing and fan-out.
    #[serde(default = "default_provider_enabled")]
    pub enabled: bool,

    /// API key. `None` requires an environment variable override.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Base URL of the provider API (overridable for testing).
    pub base_url: String,

    /// Default model used when a request names none.
    pub default_model: String,

    /// Hard ceiling on `max_tokens`; out-of-range requests are rejected
    /// before any network call.
    pub max_tokens_ceiling: u32,

    /// Requests allowed within the trailing 60 seconds.
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,

    /// Tokens allowed within the trailing 60 seconds (bookkeeping).
    #[serde(default = "default_tokens_per_minute")]
    pub tokens_per_minute: u32,

    /// Baseline for the heuristic confidence score.
    pub confidence_baseline: f64,
}

fn default_provider_enabled() -> bool {
    true
}

fn default_requests_per_minute() -> u32 {
    60
}

fn default_tokens_per_minute() -> u32 {
    90_000
}

/// Upstream provider settings: one table per vendor plus shared knobs.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProvidersConfig {
    /// Per-message content ceiling in characters; longer content is
    /// truncated before leaving the process.
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,

    #[serde(default = "default_openai")]
    pub openai: ProviderConfig,

    #[serde(default = "default_anthropic")]
    pub anthropic: ProviderConfig,

    #[serde(default = "default_gemini")]
    pub gemini: ProviderConfig,
}

impl ProvidersConfig {
    /// Settings for a provider by id.
    pub fn get(&self, provider: ProviderId) -> &ProviderConfig {
        match provider {
            ProviderId::OpenAi => &self.openai,
            ProviderId::Anthropic => &self.anthropic,
            ProviderId::Gemini => &self.gemini,
        }
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            max_message_chars: default_max_message_chars(),
            openai: default_openai(),
            anthropic: default_anthropic(),
            gemini: default_gemini(),
        }
    }
}

fn default_max_message_chars() -> usize {
    8000
}

fn default_openai() -> ProviderConfig {
    ProviderConfig {
        enabled: true,
        api_key: None,
        base_url: "https://api.openai.com/v1".to_string(),
        default_model: "gpt-4o-mini".to_string(),
        max_tokens_ceiling: 4096,
        requests_per_minute: default_requests_per_minute(),
        tokens_per_minute: default_tokens_per_minute(),
        confidence_baseline: 0.85,
    }
}

fn default_anthropic() -> ProviderConfig {
    ProviderConfig {
        enabled: true,
        api_key: None,
        base_url: "https://api.anthropic.com".to_string(),
        default_model: "claude-sonnet-4-20250514".to_string(),
        max_tokens_ceiling: 8192,
        requests_per_minute: default_requests_per_minute(),
        tokens_per_minute: default_tokens_per_minute(),
        confidence_baseline: 0.80,
    }
}

fn default_gemini() -> ProviderConfig {
    ProviderConfig {
        enabled: true,
        api_key: None,
        base_url: "https://generativelanguage.googleapis.com".to_string(),
        default_model: "gemini-2.0-flash".to_string(),
        max_tokens_ceiling: 2048,
        requests_per_minute: default_requests_per_minute(),
        tokens_per_minute: default_tokens_per_minute(),
        confidence_baseline: 0.75,
    }
}

/// Retry/backoff configuration for upstream provider calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts per provider call, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay in milliseconds; attempt n waits `base × 2^(n−1)`.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

/// Availability cooldown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ResilienceConfig {
    /// Seconds a provider stays marked unavailable before the tracker
    /// auto-heals it. Time-based, not health-checked.
    #[serde(default = "default_availability_cooldown_secs")]
    pub availability_cooldown_secs: u64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            availability_cooldown_secs: default_availability_cooldown_secs(),
        }
    }
}

fn default_availability_cooldown_secs() -> u64 {
    300 // 5 minutes
}

/// Credit billing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BillingConfig {
    /// Credits granted once per user on trial signup.
    #[serde(default = "default_trial_credits")]
    pub trial_credits: i64,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            trial_credits: default_trial_credits(),
        }
    }
}

fn default_trial_credits() -> i64 {
    25
}

/// Push notification configuration (Telegram bot API shape).
///
/// Both `bot_token` and `chat_id` must be set for notifications to be
/// sent; otherwise the notifier is disabled.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NotifyConfig {
    #[serde(default)]
    pub bot_token: Option<String>,

    #[serde(default)]
    pub chat_id: Option<String>,

    /// Base URL of the bot API (overridable for testing).
    #[serde(default = "default_notify_api_base")]
    pub api_base: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            chat_id: None,
            api_base: default_notify_api_base(),
        }
    }
}

fn default_notify_api_base() -> String {
    "https://api.telegram.org".to_string()
}

/// One agent personality in the catalog.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentProfileConfig {
    /// Stable identifier used in API paths and idempotency keys.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Personality system prompt prepended to every turn.
    pub system_prompt: String,

    /// Provider tried first for this agent.
    pub provider: ProviderId,

    /// Model override; `None` uses the provider's default model.
    #[serde(default)]
    pub model: Option<String>,

    /// Credits debited per invocation.
    pub credits_cost: i64,

    #[serde(default = "default_agent_temperature")]
    pub temperature: f32,

    #[serde(default = "default_agent_max_tokens")]
    pub max_tokens: u32,
}

fn default_agent_temperature() -> f32 {
    0.7
}

fn default_agent_max_tokens() -> u32 {
    1024
}

/// Built-in personalities used when the config lists no agents.
pub fn default_agents() -> Vec<AgentProfileConfig> {
    vec![
        AgentProfileConfig {
            id: "scholar".to_string(),
            name: "Scholar".to_string(),
            system_prompt: "You are Scholar, a meticulous research assistant. \
                            Cite your reasoning and admit uncertainty plainly."
                .to_string(),
            provider: ProviderId::Anthropic,
            model: None,
            credits_cost: 2,
            temperature: 0.4,
            max_tokens: 1024,
        },
        AgentProfileConfig {
            id: "spark".to_string(),
            name: "Spark".to_string(),
            system_prompt: "You are Spark, an energetic creative partner for \
                            brainstorming and writing. Favor vivid, concrete ideas."
                .to_string(),
            provider: ProviderId::OpenAi,
            model: None,
            credits_cost: 1,
            temperature: 0.9,
            max_tokens: 1024,
        },
        AgentProfileConfig {
            id: "pragma".to_string(),
            name: "Pragma".to_string(),
            system_prompt: "You are Pragma, a pragmatic software engineering \
                            assistant. Answer with working code first, prose second."
                .to_string(),
            provider: ProviderId::Gemini,
            model: None,
            credits_cost: 1,
            temperature: 0.3,
            max_tokens: 1024,
        },
    ]
}

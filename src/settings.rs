use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://api.perplexity.ai";
pub const DEFAULT_MODEL: &str = "sonar-pro";
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8080";
pub const DEFAULT_MAX_ITERATIONS: u32 = 8;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ModelParams {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct LoopLimits {
    pub max_iterations: Option<u32>,
    pub request_timeout_secs: Option<u64>,
    pub tool_timeout_secs: Option<u64>,
}

/// Values read from the process environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct EnvDefaults {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub weather_url: Option<String>,
    pub pest_url: Option<String>,
    pub market_url: Option<String>,
    pub model_params: Option<ModelParams>,
    pub limits: Option<LoopLimits>,
}

impl EnvDefaults {
    pub fn from_env() -> Self {
        let var = |k: &str| std::env::var(k).ok().filter(|v| !v.trim().is_empty());
        let parse_u64 = |k: &str| var(k).and_then(|v| v.parse::<u64>().ok());
        Self {
            base_url: var("LLM_BASE_URL"),
            api_key: var("LLM_API_KEY").or_else(|| var("PERPLEXITY_API_KEY")),
            model: var("LLM_MODEL"),
            weather_url: var("WEATHER_API_URL"),
            pest_url: var("PEST_API_URL"),
            market_url: var("MARKET_API_URL"),
            model_params: Some(ModelParams {
                temperature: var("LLM_TEMPERATURE").and_then(|v| v.parse().ok()),
                max_tokens: var("LLM_MAX_TOKENS").and_then(|v| v.parse().ok()),
                top_p: None,
            }),
            limits: Some(LoopLimits {
                max_iterations: var("AGENT_MAX_ITERATIONS").and_then(|v| v.parse().ok()),
                request_timeout_secs: parse_u64("AGENT_REQUEST_TIMEOUT_SECS"),
                tool_timeout_secs: parse_u64("TOOL_TIMEOUT_SECS"),
            }),
        }
    }
}

/// Values given on the command line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CliOverrides {
    pub model: Option<String>,
    pub model_params: Option<ModelParams>,
    pub limits: Option<LoopLimits>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendUrls {
    pub weather: String,
    pub pest: String,
    pub market: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub model_params: ModelParams,
    pub backends: BackendUrls,
    pub max_iterations: u32,
    pub request_timeout: Duration,
    pub tool_timeout: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("invalid {name} url {value:?}: {source}")]
    InvalidUrl { name: &'static str, value: String, source: url::ParseError },
    #[error("max_iterations must be at least 1")]
    ZeroIterations,
}

fn checked_url(name: &'static str, value: Option<&String>, fallback: &str) -> Result<String, SettingsError> {
    let value = value.map(String::as_str).unwrap_or(fallback);
    Url::parse(value).map_err(|source| SettingsError::InvalidUrl { name, value: value.into(), source })?;
    Ok(value.trim_end_matches('/').to_string())
}

/// CLI values win over the environment, which wins over built-in defaults.
pub fn resolve_effective_settings(env: &EnvDefaults, cli: &CliOverrides) -> Result<EffectiveSettings, SettingsError> {
    let model = cli
        .model
        .clone()
        .or_else(|| env.model.clone())
        .unwrap_or_else(|| DEFAULT_MODEL.into());

    let model_params = ModelParams {
        temperature: cli
            .model_params
            .as_ref()
            .and_then(|p| p.temperature)
            .or_else(|| env.model_params.as_ref().and_then(|p| p.temperature))
            .or(Some(0.7)),
        max_tokens: cli
            .model_params
            .as_ref()
            .and_then(|p| p.max_tokens)
            .or_else(|| env.model_params.as_ref().and_then(|p| p.max_tokens)),
        top_p: cli
            .model_params
            .as_ref()
            .and_then(|p| p.top_p)
            .or_else(|| env.model_params.as_ref().and_then(|p| p.top_p)),
    };

    let limit = |pick: fn(&LoopLimits) -> Option<u64>| {
        cli.limits.as_ref().and_then(pick).or_else(|| env.limits.as_ref().and_then(pick))
    };
    let max_iterations = cli
        .limits
        .as_ref()
        .and_then(|l| l.max_iterations)
        .or_else(|| env.limits.as_ref().and_then(|l| l.max_iterations))
        .unwrap_or(DEFAULT_MAX_ITERATIONS);
    if max_iterations == 0 {
        return Err(SettingsError::ZeroIterations);
    }

    Ok(EffectiveSettings {
        base_url: checked_url("model", env.base_url.as_ref(), DEFAULT_BASE_URL)?,
        api_key: env.api_key.clone(),
        model,
        model_params,
        backends: BackendUrls {
            weather: checked_url("weather", env.weather_url.as_ref(), DEFAULT_BACKEND_URL)?,
            pest: checked_url("pest", env.pest_url.as_ref(), DEFAULT_BACKEND_URL)?,
            market: checked_url("market", env.market_url.as_ref(), DEFAULT_BACKEND_URL)?,
        },
        max_iterations,
        request_timeout: Duration::from_secs(
            limit(|l| l.request_timeout_secs).unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        ),
        tool_timeout: Duration::from_secs(limit(|l| l.tool_timeout_secs).unwrap_or(DEFAULT_TOOL_TIMEOUT_SECS)),
    })
}

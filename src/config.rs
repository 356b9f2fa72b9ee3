// src/config.rs
use std::fmt::Debug;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::message::ErrorKind;

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_COMPLETION_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a friendly, informative assistant. \
Answer clearly and concisely, and always reply in the same language the user wrote in.";

pub const DEFAULT_GREETING: &str = "👋 হ্যালো! আমি তোমার সহকারী। কোনো কিছু জানতে চাইলে প্রশ্ন করো বা গল্প করতে চাইলে গল্প করতে পারো আমার সাথে!";
pub const DEFAULT_TIMEOUT_NOTICE: &str = "⏳ উত্তর দিতে একটু বেশি সময় লাগছে। একটু অপেক্ষা করে আবার চেষ্টা করো।";
pub const DEFAULT_FAILURE_NOTICE: &str = "😓 দুঃখিত, কিছু একটা সমস্যা হয়েছে। একটু পরে আবার চেষ্টা করো।";

/// What the runner does when the chat intake cannot start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntakeFailurePolicy {
    /// Log at critical severity and exit.
    #[default]
    FailFast,
    /// Keep the liveness endpoint up with a dead bot.
    Degrade,
}

impl FromStr for IntakeFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fail-fast" | "fail_fast" | "failfast" => Ok(Self::FailFast),
            "degrade" => Ok(Self::Degrade),
            other => Err(format!("expected `fail-fast` or `degrade`, got `{other}`")),
        }
    }
}

/// Fixed user-facing texts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notices {
    pub greeting: String,
    pub timeout: String,
    pub failure: String,
}

impl Default for Notices {
    fn default() -> Self {
        Self {
            greeting: DEFAULT_GREETING.to_string(),
            timeout: DEFAULT_TIMEOUT_NOTICE.to_string(),
            failure: DEFAULT_FAILURE_NOTICE.to_string(),
        }
    }
}

impl Notices {
    pub fn for_failure(&self, cause: ErrorKind) -> &str {
        match cause {
            ErrorKind::Timeout => &self.timeout,
            ErrorKind::RemoteError
            | ErrorKind::EmptyResponse
            | ErrorKind::InvalidRequest
            | ErrorKind::Internal => &self.failure,
        }
    }
}

/// Process-wide settings, read once at startup and never mutated.
#[derive(Clone)]
pub struct Config {
    pub telegram_token: String,
    pub telegram_api_base: String,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub system_instruction: Option<String>,
    pub completion_timeout: Duration,
    pub port: u16,
    pub intake_failure_policy: IntakeFailurePolicy,
    pub notices: Notices,
}

impl Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("telegram_token", &"<redacted>")
            .field("telegram_api_base", &self.telegram_api_base)
            .field("openai_api_key", &"<redacted>")
            .field("openai_base_url", &self.openai_base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("system_instruction", &self.system_instruction.is_some())
            .field("completion_timeout", &self.completion_timeout)
            .field("port", &self.port)
            .field("intake_failure_policy", &self.intake_failure_policy)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup, so tests never touch the real environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |key: &'static str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(key))
        };
        let optional = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let telegram_token = required("TELEGRAM_TOKEN")?;
        let openai_api_key = required("OPENAI_API_KEY")?;

        let port = match optional("PORT") {
            Some(raw) => parse("PORT", &raw)?,
            None => DEFAULT_PORT,
        };

        let temperature = match optional("OPENAI_TEMPERATURE") {
            Some(raw) => {
                let value: f32 = parse("OPENAI_TEMPERATURE", &raw)?;
                if !(0.0..=2.0).contains(&value) {
                    return Err(invalid("OPENAI_TEMPERATURE", raw, "must be within [0, 2]"));
                }
                value
            }
            None => DEFAULT_TEMPERATURE,
        };

        let max_tokens = match optional("OPENAI_MAX_TOKENS") {
            Some(raw) => {
                let value: u32 = parse("OPENAI_MAX_TOKENS", &raw)?;
                if value == 0 {
                    return Err(invalid("OPENAI_MAX_TOKENS", raw, "must be positive"));
                }
                Some(value)
            }
            None => None,
        };

        let completion_timeout = match optional("COMPLETION_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = parse("COMPLETION_TIMEOUT_SECS", &raw)?;
                if secs == 0 {
                    return Err(invalid("COMPLETION_TIMEOUT_SECS", raw, "must be positive"));
                }
                Duration::from_secs(secs)
            }
            None => DEFAULT_COMPLETION_TIMEOUT,
        };

        // Set-but-empty disables the system message; unset keeps the default.
        let system_instruction = match lookup("SYSTEM_PROMPT") {
            Some(raw) if raw.trim().is_empty() => None,
            Some(raw) => Some(raw.trim().to_string()),
            None => Some(DEFAULT_SYSTEM_PROMPT.to_string()),
        };

        let intake_failure_policy = match optional("INTAKE_FAILURE_POLICY") {
            Some(raw) => raw
                .parse::<IntakeFailurePolicy>()
                .map_err(|reason| invalid("INTAKE_FAILURE_POLICY", raw, reason))?,
            None => IntakeFailurePolicy::default(),
        };

        let defaults = Notices::default();
        let notices = Notices {
            greeting: optional("GREETING_TEXT").unwrap_or(defaults.greeting),
            timeout: optional("TIMEOUT_NOTICE").unwrap_or(defaults.timeout),
            failure: optional("FAILURE_NOTICE").unwrap_or(defaults.failure),
        };

        Ok(Self {
            telegram_token,
            telegram_api_base: optional("TELEGRAM_API_BASE")
                .unwrap_or_else(|| DEFAULT_TELEGRAM_API_BASE.to_string()),
            openai_api_key,
            openai_base_url: optional("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            model: optional("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temperature,
            max_tokens,
            system_instruction,
            completion_timeout,
            port,
            intake_failure_policy,
            notices,
        })
    }
}

fn parse<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e: T::Err| invalid(key, raw.to_string(), e.to_string()))
}

fn invalid(key: &'static str, value: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.into(),
        reason: reason.into(),
    }
}

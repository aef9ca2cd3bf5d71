//! Environment configuration.

use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use completion_api::{CompletionApiConfig, DEFAULT_BASE_URL};
use tracing::warn;

use crate::templates::PromptTemplate;

pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 1000;
pub const MAX_TEMPERATURE: f64 = 2.0;

#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Preferred model. Kept when model listing fails; otherwise selected only
    /// if the backend lists it.
    pub model: Option<String>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout: Option<Duration>,
    /// Root for persisted history. Default: `<cwd>/.chat/storage`.
    pub storage_dir: Option<PathBuf>,
    pub template: PromptTemplate,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            api_key: None,
            model: None,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: None,
            storage_dir: None,
            template: PromptTemplate::default(),
        }
    }
}

impl ChatConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: env_string_opt("CHAT_API_BASE_URL").unwrap_or(defaults.base_url),
            api_key: env_string_opt("CHAT_API_KEY"),
            model: env_string_opt("CHAT_MODEL").map(|model| model.trim().to_owned()),
            temperature: clamp_temperature(env_parse("CHAT_TEMPERATURE", defaults.temperature)),
            max_tokens: env_parse("CHAT_MAX_TOKENS", defaults.max_tokens).max(1),
            timeout: env_parse_opt::<u64>("CHAT_TIMEOUT_SEC")
                .filter(|seconds| *seconds > 0)
                .map(Duration::from_secs),
            storage_dir: env_string_opt("CHAT_STORAGE_DIR").map(PathBuf::from),
            template: env_parse("CHAT_TEMPLATE", defaults.template),
        }
    }

    pub fn api_config(&self) -> CompletionApiConfig {
        let mut config = CompletionApiConfig::new(self.base_url.clone());
        if let Some(api_key) = &self.api_key {
            config = config.with_api_key(api_key.clone());
        }
        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }
        config
    }
}

/// Temperature limited to `0.0..=2.0`; NaN falls back to the default.
pub fn clamp_temperature(value: f64) -> f64 {
    if value.is_nan() {
        return DEFAULT_TEMPERATURE;
    }
    value.clamp(0.0, MAX_TEMPERATURE)
}

pub(crate) fn env_flag(key: &str) -> bool {
    env::var(key)
        .map(|value| matches!(value.trim(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false)
}

pub(crate) fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}

fn env_parse_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = env_string_opt(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(error) => {
            warn!(key, value = %raw, %error, "ignoring unparsable environment value");
            None
        }
    }
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: Display,
{
    env_parse_opt(key).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::{ChatConfig, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};
    use crate::templates::PromptTemplate;
    use std::env;
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};
    use std::time::Duration;

    const KEYS: [&str; 8] = [
        "CHAT_API_BASE_URL",
        "CHAT_API_KEY",
        "CHAT_MODEL",
        "CHAT_TEMPERATURE",
        "CHAT_MAX_TOKENS",
        "CHAT_TIMEOUT_SEC",
        "CHAT_STORAGE_DIR",
        "CHAT_TEMPLATE",
    ];

    struct EnvGuard {
        key: &'static str,
        previous: Option<String>,
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            if let Some(value) = &self.previous {
                env::set_var(self.key, value);
            } else {
                env::remove_var(self.key);
            }
        }
    }

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
            .lock()
            .expect("env lock poisoned")
    }

    fn set_env_guard(key: &'static str, value: Option<&str>) -> EnvGuard {
        let previous = env::var(key).ok();
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
        EnvGuard { key, previous }
    }

    fn clear_all() -> Vec<EnvGuard> {
        KEYS.into_iter().map(|key| set_env_guard(key, None)).collect()
    }

    #[test]
    fn env_defaults_apply_when_unset() {
        let _lock = env_lock();
        let _guards = clear_all();

        let config = ChatConfig::from_env();
        assert_eq!(config, ChatConfig::default());
        assert_eq!(config.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(config.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(config.base_url, "http://localhost:5002");
    }

    #[test]
    fn env_values_are_read_and_normalized() {
        let _lock = env_lock();
        let _guards = clear_all();
        let _g1 = set_env_guard("CHAT_API_BASE_URL", Some("https://chat.example.com"));
        let _g2 = set_env_guard("CHAT_API_KEY", Some("secret"));
        let _g3 = set_env_guard("CHAT_MODEL", Some(" gpt-4 "));
        let _g4 = set_env_guard("CHAT_TEMPERATURE", Some("3.5"));
        let _g5 = set_env_guard("CHAT_MAX_TOKENS", Some("256"));
        let _g6 = set_env_guard("CHAT_TIMEOUT_SEC", Some("30"));
        let _g7 = set_env_guard("CHAT_STORAGE_DIR", Some("/tmp/chat"));
        let _g8 = set_env_guard("CHAT_TEMPLATE", Some("eli5"));

        let config = ChatConfig::from_env();
        assert_eq!(config.base_url, "https://chat.example.com");
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.model.as_deref(), Some("gpt-4"));
        assert_eq!(config.temperature, 2.0);
        assert_eq!(config.max_tokens, 256);
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.storage_dir, Some(PathBuf::from("/tmp/chat")));
        assert_eq!(config.template, PromptTemplate::Explain);

        let api = config.api_config();
        assert_eq!(api.api_key.as_deref(), Some("secret"));
        assert_eq!(api.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn blank_and_unparsable_values_fall_back() {
        let _lock = env_lock();
        let _guards = clear_all();
        let _g1 = set_env_guard("CHAT_API_KEY", Some("   "));
        let _g2 = set_env_guard("CHAT_TEMPERATURE", Some("warm"));
        let _g3 = set_env_guard("CHAT_MAX_TOKENS", Some("-5"));
        let _g4 = set_env_guard("CHAT_TEMPLATE", Some("poem"));

        let config = ChatConfig::from_env();
        assert!(config.api_key.is_none());
        assert_eq!(config.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(config.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(config.template, PromptTemplate::General);
    }
}

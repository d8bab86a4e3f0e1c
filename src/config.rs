//! Configuration parsing and validation for chatrelay.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::Path;
use std::time::Duration;

/// Environment variable consulted for the completion provider key when the
/// config file does not name one.
pub const OPENROUTER_KEY_VAR: &str = "OPENROUTER_API_KEY";

/// Environment variable consulted for the chat provider key.
pub const GOOGLE_KEY_VAR: &str = "GOOGLE_API_KEY";

/// Built-in assistant persona prepended to every completion prompt.
pub const DEFAULT_PERSONA: &str = "You are a helpful and patient coding assistant specialized in guiding beginners through using Visual Studio Code (VSCode) and learning how to code. Your role is to assist users who have little to no experience with coding or using VSCode. You should provide clear, concise, and friendly explanations, breaking down complex concepts into simple, understandable steps.";

/// Root configuration structure.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub relay: RelayConfig,
    pub completion: CompletionConfig,
    pub chat: ChatConfig,
    pub logging: LoggingConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "127.0.0.1:3000")
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Upper bound on a single relay, from outbound request to last byte.
    #[serde(default = "default_relay_timeout")]
    pub relay_timeout_secs: u64,
}

fn default_listen() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_relay_timeout() -> u64 {
    120
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            relay_timeout_secs: default_relay_timeout(),
        }
    }
}

impl ServerConfig {
    pub fn relay_timeout(&self) -> Duration {
        Duration::from_secs(self.relay_timeout_secs)
    }
}

/// Which provider strategy serves `/api/chat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayMode {
    /// Single-shot completion API, buffered into one chunk.
    #[default]
    Completion,
    /// Chat-style streaming API, forwarded fragment by fragment.
    Chat,
}

impl std::fmt::Display for RelayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayMode::Completion => write!(f, "completion"),
            RelayMode::Chat => write!(f, "chat"),
        }
    }
}

/// Relay behaviour shared by both strategies.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub mode: RelayMode,
    /// Persona text; falls back to [`DEFAULT_PERSONA`].
    #[serde(default = "default_persona")]
    pub persona: String,
}

fn default_persona() -> String {
    DEFAULT_PERSONA.to_string()
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            mode: RelayMode::default(),
            persona: default_persona(),
        }
    }
}

/// API key wrapper that redacts in Debug/Display/Serialize and zeroizes on drop.
///
/// Only accessible via `.expose_secret()` so every use is grep-auditable.
#[derive(Clone)]
pub struct ApiKey(SecretString);

impl ApiKey {
    /// Access the raw key value. Every call site is auditable via `grep expose_secret`.
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl std::fmt::Display for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl Serialize for ApiKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("[REDACTED]")
    }
}

impl<'de> serde::Deserialize<'de> for ApiKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(|s| ApiKey(SecretString::from(s)))
    }
}

impl From<String> for ApiKey {
    fn from(s: String) -> Self {
        ApiKey(SecretString::from(s))
    }
}

impl From<&str> for ApiKey {
    fn from(s: &str) -> Self {
        ApiKey(SecretString::from(s))
    }
}

/// How a provider's API key was resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum KeySource {
    /// Key was a literal string in config (no ${} references)
    Literal,
    /// Key contained ${VAR} references expanded from environment
    EnvExpanded,
    /// Key was read from the conventional env var (holds var name)
    Convention(String),
    /// No key available
    None,
}

impl std::fmt::Display for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeySource::Literal => write!(f, "config-literal"),
            KeySource::EnvExpanded => write!(f, "env-expanded"),
            KeySource::Convention(var) => write!(f, "convention ({})", var),
            KeySource::None => write!(f, "none"),
        }
    }
}

/// Completion-style provider (OpenRouter `/v1/completions`).
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub url: String,
    pub api_key: Option<ApiKey>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Sampling parameters sent with every chat-style request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GenerationSettings {
    #[serde(default = "default_chat_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

fn default_chat_temperature() -> f32 {
    0.9
}

fn default_top_k() -> u32 {
    1
}

fn default_top_p() -> f32 {
    1.0
}

fn default_max_output_tokens() -> u32 {
    2048
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: default_chat_temperature(),
            top_k: default_top_k(),
            top_p: default_top_p(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

/// One content-safety threshold, passed through to the provider verbatim.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SafetySetting {
    pub category: String,
    pub threshold: String,
}

fn default_safety() -> Vec<SafetySetting> {
    [
        "HARM_CATEGORY_HARASSMENT",
        "HARM_CATEGORY_HATE_SPEECH",
        "HARM_CATEGORY_SEXUALLY_EXPLICIT",
        "HARM_CATEGORY_DANGEROUS_CONTENT",
    ]
    .into_iter()
    .map(|category| SafetySetting {
        category: category.to_string(),
        threshold: "BLOCK_MEDIUM_AND_ABOVE".to_string(),
    })
    .collect()
}

/// Chat-style streaming provider (Gemini `streamGenerateContent`).
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub base_url: String,
    pub api_key: Option<ApiKey>,
    pub model: String,
    /// Send the persona as a system instruction. Older models reject it.
    pub use_persona: bool,
    pub generation: GenerationSettings,
    pub safety: Vec<SafetySetting>,
    /// Sessions unused for this long are discarded.
    pub session_idle_secs: u64,
    /// Upper bound on live sessions; the least recently used one is
    /// evicted to make room.
    pub max_sessions: usize,
}

impl ChatConfig {
    pub fn session_idle(&self) -> Duration {
        Duration::from_secs(self.session_idle_secs)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable '{var}' not set for provider '{provider}': {message}")]
    EnvVar {
        var: String,
        provider: String,
        message: String,
    },

    #[error("No API key for the {provider} provider: set {var} or [{provider}].api_key")]
    MissingCredential { provider: String, var: String },
}

/// Raw completion section; `api_key` may still hold `${VAR}` references.
#[derive(Deserialize)]
pub struct RawCompletionConfig {
    #[serde(default = "default_completion_url")]
    url: String,
    api_key: Option<String>,
    #[serde(default = "default_completion_model")]
    model: String,
    #[serde(default = "default_max_tokens")]
    max_tokens: u32,
    #[serde(default = "default_completion_temperature")]
    temperature: f32,
}

fn default_completion_url() -> String {
    "https://openrouter.ai/api/v1/completions".to_string()
}

fn default_completion_model() -> String {
    "meta-llama/llama-3.1-8b-instruct:free".to_string()
}

fn default_max_tokens() -> u32 {
    512
}

fn default_completion_temperature() -> f32 {
    0.7
}

impl Default for RawCompletionConfig {
    fn default() -> Self {
        Self {
            url: default_completion_url(),
            api_key: None,
            model: default_completion_model(),
            max_tokens: default_max_tokens(),
            temperature: default_completion_temperature(),
        }
    }
}

/// Raw chat section; `api_key` may still hold `${VAR}` references.
#[derive(Deserialize)]
pub struct RawChatConfig {
    #[serde(default = "default_chat_base_url")]
    base_url: String,
    api_key: Option<String>,
    #[serde(default = "default_chat_model")]
    model: String,
    #[serde(default)]
    use_persona: bool,
    #[serde(default)]
    generation: GenerationSettings,
    #[serde(default = "default_safety")]
    safety: Vec<SafetySetting>,
    #[serde(default = "default_session_idle")]
    session_idle_secs: u64,
    #[serde(default = "default_max_sessions")]
    max_sessions: usize,
}

fn default_session_idle() -> u64 {
    1800
}

fn default_max_sessions() -> usize {
    1024
}

fn default_chat_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_chat_model() -> String {
    "gemini-1.0-pro-001".to_string()
}

impl Default for RawChatConfig {
    fn default() -> Self {
        Self {
            base_url: default_chat_base_url(),
            api_key: None,
            model: default_chat_model(),
            use_persona: false,
            generation: GenerationSettings::default(),
            safety: default_safety(),
            session_idle_secs: default_session_idle(),
            max_sessions: default_max_sessions(),
        }
    }
}

/// Raw configuration deserialized directly from TOML.
#[derive(Default, Deserialize)]
pub struct RawConfig {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    relay: RelayConfig,
    #[serde(default)]
    completion: RawCompletionConfig,
    #[serde(default)]
    chat: RawChatConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

/// Expand all `${VAR}` references in a string using a custom lookup function.
///
/// Supports multiple `${VAR}` in one string (e.g., `${SCHEME}://${HOST}/v1`).
/// Fails on first missing variable, unclosed `${`, or empty variable name.
fn expand_env_vars_with<F>(
    input: &str,
    provider_name: &str,
    lookup: F,
) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if !input.contains("${") {
        return Ok(input.to_string());
    }

    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let end = after.find('}').ok_or_else(|| ConfigError::EnvVar {
            var: "<unclosed>".to_string(),
            provider: provider_name.to_string(),
            message: "Unclosed '${' in config value".to_string(),
        })?;

        let var_name = &after[..end];
        if var_name.is_empty() {
            return Err(ConfigError::EnvVar {
                var: "".to_string(),
                provider: provider_name.to_string(),
                message: "Empty variable name in '${}' reference".to_string(),
            });
        }

        let value = lookup(var_name).ok_or_else(|| ConfigError::EnvVar {
            var: var_name.to_string(),
            provider: provider_name.to_string(),
            message: format!("Environment variable '{}' is not set", var_name),
        })?;

        result.push_str(&value);
        rest = &after[end + 1..];
    }

    result.push_str(rest);
    Ok(result)
}

/// Resolve one provider key: `${VAR}` expansion, literal, or the
/// conventional variable when the config names nothing.
fn resolve_key_with<F>(
    raw: Option<&str>,
    provider_name: &str,
    convention_var: &str,
    lookup: F,
) -> Result<(Option<ApiKey>, KeySource), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    // An empty key is treated as absent so validation rejects it.
    match raw {
        Some(raw_key) if raw_key.contains("${") => {
            let expanded = expand_env_vars_with(raw_key, provider_name, lookup)?;
            if expanded.is_empty() {
                return Ok((None, KeySource::None));
            }
            Ok((Some(ApiKey::from(expanded)), KeySource::EnvExpanded))
        }
        Some("") => Ok((None, KeySource::None)),
        Some(raw_key) => Ok((Some(ApiKey::from(raw_key)), KeySource::Literal)),
        None => match lookup(convention_var).filter(|v| !v.is_empty()) {
            Some(value) => Ok((
                Some(ApiKey::from(value)),
                KeySource::Convention(convention_var.to_string()),
            )),
            None => Ok((None, KeySource::None)),
        },
    }
}

/// Where each provider's key came from, for `chatrelay check`.
#[derive(Debug, Clone, PartialEq)]
pub struct KeySources {
    pub completion: KeySource,
    pub chat: KeySource,
}

impl Config {
    /// Load configuration from a TOML file, resolving credentials from the
    /// process environment.
    pub fn from_file(path: impl AsRef<Path>) -> Result<(Self, KeySources), ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        Self::parse_str(&content)
    }

    /// Parse configuration from a TOML string using the process environment.
    pub fn parse_str(content: &str) -> Result<(Self, KeySources), ConfigError> {
        Self::parse_str_with(content, |name| std::env::var(name).ok())
    }

    /// Parse configuration from a TOML string with a custom env lookup.
    pub fn parse_str_with<F>(content: &str, lookup: F) -> Result<(Self, KeySources), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw: RawConfig = toml::from_str(content).map_err(ConfigError::Parse)?;
        let (config, sources) = Self::from_raw(raw, &lookup)?;
        config.validate()?;
        Ok((config, sources))
    }

    /// Convert raw (deserialized) config to final config with key resolution.
    pub fn from_raw<F>(raw: RawConfig, lookup: &F) -> Result<(Self, KeySources), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let (completion_key, completion_source) = resolve_key_with(
            raw.completion.api_key.as_deref(),
            "completion",
            OPENROUTER_KEY_VAR,
            lookup,
        )?;
        let (chat_key, chat_source) =
            resolve_key_with(raw.chat.api_key.as_deref(), "chat", GOOGLE_KEY_VAR, lookup)?;

        let config = Config {
            server: raw.server,
            relay: raw.relay,
            completion: CompletionConfig {
                url: raw.completion.url,
                api_key: completion_key,
                model: raw.completion.model,
                max_tokens: raw.completion.max_tokens,
                temperature: raw.completion.temperature,
            },
            chat: ChatConfig {
                base_url: raw.chat.base_url,
                api_key: chat_key,
                model: raw.chat.model,
                use_persona: raw.chat.use_persona,
                generation: raw.chat.generation,
                safety: raw.chat.safety,
                session_idle_secs: raw.chat.session_idle_secs,
                max_sessions: raw.chat.max_sessions,
            },
            logging: raw.logging,
        };

        Ok((
            config,
            KeySources {
                completion: completion_source,
                chat: chat_source,
            },
        ))
    }

    /// Validate the configuration.
    ///
    /// The active mode's credential must be present: sending an
    /// unauthenticated request is never attempted.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.relay_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "server.relay_timeout_secs must be greater than zero".to_string(),
            ));
        }

        if self.chat.session_idle_secs == 0 || self.chat.max_sessions == 0 {
            return Err(ConfigError::Validation(
                "chat.session_idle_secs and chat.max_sessions must be greater than zero"
                    .to_string(),
            ));
        }

        match self.relay.mode {
            RelayMode::Completion => {
                if self.completion.url.is_empty() {
                    return Err(ConfigError::Validation(
                        "completion.url is empty".to_string(),
                    ));
                }
                if self.completion.api_key.is_none() {
                    return Err(ConfigError::MissingCredential {
                        provider: "completion".to_string(),
                        var: OPENROUTER_KEY_VAR.to_string(),
                    });
                }
            }
            RelayMode::Chat => {
                if self.chat.base_url.is_empty() || self.chat.model.is_empty() {
                    return Err(ConfigError::Validation(
                        "chat.base_url and chat.model must be set".to_string(),
                    ));
                }
                if self.chat.api_key.is_none() {
                    return Err(ConfigError::MissingCredential {
                        provider: "chat".to_string(),
                        var: GOOGLE_KEY_VAR.to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |name: &str| {
            pairs
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_parse_empty_config_uses_defaults() {
        let (config, sources) =
            Config::parse_str_with("", env(&[(OPENROUTER_KEY_VAR, "or-key")])).unwrap();

        assert_eq!(config.server.listen, "127.0.0.1:3000");
        assert_eq!(config.server.relay_timeout_secs, 120);
        assert_eq!(config.relay.mode, RelayMode::Completion);
        assert_eq!(config.relay.persona, DEFAULT_PERSONA);
        assert_eq!(config.completion.max_tokens, 512);
        assert_eq!(config.completion.temperature, 0.7);
        assert_eq!(config.chat.model, "gemini-1.0-pro-001");
        assert_eq!(config.chat.generation, GenerationSettings::default());
        assert_eq!(config.chat.safety.len(), 4);
        assert_eq!(
            sources.completion,
            KeySource::Convention(OPENROUTER_KEY_VAR.to_string())
        );
        assert_eq!(sources.chat, KeySource::None);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [server]
            listen = "0.0.0.0:8080"
            relay_timeout_secs = 30

            [relay]
            mode = "chat"
            persona = "You are terse."

            [completion]
            url = "https://example.com/v1/completions"
            api_key = "literal-key"
            model = "tiny"
            max_tokens = 64
            temperature = 0.1

            [chat]
            base_url = "https://example.com/v1beta"
            api_key = "${CHAT_KEY}"
            model = "gemini-test"

            [chat.generation]
            temperature = 0.5
            top_k = 3
            top_p = 0.8
            max_output_tokens = 100

            [[chat.safety]]
            category = "HARM_CATEGORY_HARASSMENT"
            threshold = "BLOCK_NONE"

            [logging]
            level = "debug"
        "#;

        let (config, sources) = Config::parse_str_with(toml, env(&[("CHAT_KEY", "g-key")])).unwrap();
        assert_eq!(config.server.relay_timeout(), Duration::from_secs(30));
        assert_eq!(config.relay.mode, RelayMode::Chat);
        assert_eq!(config.relay.persona, "You are terse.");
        assert_eq!(config.completion.model, "tiny");
        assert_eq!(config.chat.generation.top_k, 3);
        assert_eq!(config.chat.safety.len(), 1);
        assert_eq!(config.chat.safety[0].threshold, "BLOCK_NONE");
        assert_eq!(config.chat.api_key.as_ref().unwrap().expose_secret(), "g-key");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(sources.completion, KeySource::Literal);
        assert_eq!(sources.chat, KeySource::EnvExpanded);
    }

    #[test]
    fn test_missing_credential_fails_fast() {
        let err = Config::parse_str_with("", env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential { .. }));
        assert!(err.to_string().contains(OPENROUTER_KEY_VAR));

        let toml = r#"
            [relay]
            mode = "chat"
        "#;
        let err = Config::parse_str_with(toml, env(&[(OPENROUTER_KEY_VAR, "x")])).unwrap_err();
        assert!(err.to_string().contains(GOOGLE_KEY_VAR));
    }

    #[test]
    fn test_inactive_provider_may_lack_key() {
        let toml = r#"
            [relay]
            mode = "chat"
        "#;
        let (config, _) = Config::parse_str_with(toml, env(&[(GOOGLE_KEY_VAR, "g")])).unwrap();
        assert!(config.completion.api_key.is_none());
    }

    #[test]
    fn test_empty_convention_var_is_ignored() {
        let err = Config::parse_str_with("", env(&[(OPENROUTER_KEY_VAR, "")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential { .. }));
    }

    #[test]
    fn test_empty_literal_key_is_missing_credential() {
        let toml = r#"
            [completion]
            api_key = ""
        "#;
        let err = Config::parse_str_with(toml, env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential { .. }));
    }

    #[test]
    fn test_key_expanding_to_empty_is_missing_credential() {
        let toml = r#"
            [relay]
            mode = "chat"

            [chat]
            api_key = "${BLANK_CHAT_KEY}"
        "#;
        let err = Config::parse_str_with(toml, env(&[("BLANK_CHAT_KEY", "")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential { .. }));
        assert!(err.to_string().contains(GOOGLE_KEY_VAR));
    }

    #[test]
    fn test_session_bounds_defaults_and_validation() {
        let (config, _) = Config::parse_str_with("", env(&[(OPENROUTER_KEY_VAR, "k")])).unwrap();
        assert_eq!(config.chat.session_idle(), Duration::from_secs(1800));
        assert_eq!(config.chat.max_sessions, 1024);

        let toml = r#"
            [chat]
            max_sessions = 0
        "#;
        let err = Config::parse_str_with(toml, env(&[(OPENROUTER_KEY_VAR, "k")])).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let toml = r#"
            [server]
            relay_timeout_secs = 0
        "#;
        let err = Config::parse_str_with(toml, env(&[(OPENROUTER_KEY_VAR, "k")])).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_unknown_mode_is_parse_error() {
        let toml = r#"
            [relay]
            mode = "telepathy"
        "#;
        let err = Config::parse_str_with(toml, env(&[(OPENROUTER_KEY_VAR, "k")])).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_api_key_debug_redaction() {
        let key = ApiKey::from("super-secret-token");
        let debug_output = format!("{:?}", key);
        assert_eq!(debug_output, "[REDACTED]");
        assert_eq!(format!("{}", key), "[REDACTED]");
    }

    #[test]
    fn test_api_key_serialize_redaction() {
        let key = ApiKey::from("real-secret-value");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"[REDACTED]\"");
    }

    #[test]
    fn test_config_debug_never_leaks_keys() {
        let (config, _) = Config::parse_str_with(
            "",
            env(&[(OPENROUTER_KEY_VAR, "sk-or-abc123"), (GOOGLE_KEY_VAR, "AIzaXYZ")]),
        )
        .unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("sk-or-abc123"));
        assert!(!debug.contains("AIzaXYZ"));
        assert!(debug.contains("[REDACTED]"));
    }

    // ── Expansion tests (using expand_env_vars_with, no global env state) ──

    #[test]
    fn test_expand_multiple_vars() {
        let lookup = |name: &str| match name {
            "SCHEME" => Some("https".to_string()),
            "HOST" => Some("example.com".to_string()),
            _ => None,
        };
        let result = expand_env_vars_with("${SCHEME}://${HOST}/v1", "test", lookup).unwrap();
        assert_eq!(result, "https://example.com/v1");
    }

    #[test]
    fn test_expand_no_vars_passthrough() {
        let lookup = |_: &str| -> Option<String> { panic!("should not be called") };
        let result = expand_env_vars_with("$NOT_A_VAR", "test", lookup).unwrap();
        assert_eq!(result, "$NOT_A_VAR");
    }

    #[test]
    fn test_expand_missing_var_fails() {
        let result = expand_env_vars_with("${MISSING}", "chat", |_| None);
        let err = result.unwrap_err().to_string();
        assert!(err.contains("MISSING"), "Error should name the variable");
        assert!(err.contains("chat"), "Error should name the provider");
    }

    #[test]
    fn test_expand_unclosed_brace_fails() {
        let lookup = |_: &str| -> Option<String> { panic!("should not be called") };
        let err = expand_env_vars_with("${UNCLOSED", "test", lookup)
            .unwrap_err()
            .to_string()
            .to_lowercase();
        assert!(err.contains("unclosed"));
    }

    #[test]
    fn test_expand_empty_var_name_fails() {
        let lookup = |_: &str| -> Option<String> { panic!("should not be called") };
        let err = expand_env_vars_with("${}", "test", lookup)
            .unwrap_err()
            .to_string()
            .to_lowercase();
        assert!(err.contains("empty"));
    }
}

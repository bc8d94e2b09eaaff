use crate::util::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_SPEAKER_ID: u32 = 1;
pub const DEFAULT_MODEL: &str = "gpt-4o-audio-preview";
pub const DEFAULT_WORKER_POOL_SIZE: usize = 4;
pub const DEFAULT_CHARACTER: &str =
    "Aya is a Japanese girl, she is bold and confident, she is a student and likes to tease others";
pub const DEFAULT_RESPONSE_FORMAT: &str =
    "Respond with Aya's response in japanese. Strictly only respond with Aya's line and nothing else.";
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_TTS_QUEST_API_KEY: &str = "TTS_QUEST_API_KEY";
pub const ENV_MODEL: &str = "VOICE_CHAT_MODEL";

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new<S: Into<String>>(value: S) -> Result<Self, ConfigError> {
        let v = value.into();
        if v.trim().is_empty() {
            return Err(ConfigError::EmptyApiKey);
        }
        Ok(Self(v))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(**redacted**)")
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiKeys {
    pub openai: Option<ApiKey>,
    pub tts_quest: Option<ApiKey>,
}

/// Character the assistant plays, plus the constraint on how it must answer.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Persona {
    pub character: String,
    pub response_format: String,
}

impl Persona {
    pub fn new<C, R>(character: C, response_format: R) -> Result<Self, ConfigError>
    where
        C: Into<String>,
        R: Into<String>,
    {
        let character = character.into();
        if character.trim().is_empty() {
            return Err(ConfigError::EmptyPersona);
        }
        Ok(Self {
            character,
            response_format: response_format.into(),
        })
    }

    /// The leading instruction sent ahead of every conversation.
    pub fn instruction(&self) -> String {
        format!(
            "Generate a appropriate response for the audio in this character style: {}\n\nResponse format: \n{}",
            self.character, self.response_format
        )
    }
}

impl Default for Persona {
    fn default() -> Self {
        Self {
            character: DEFAULT_CHARACTER.to_owned(),
            response_format: DEFAULT_RESPONSE_FORMAT.to_owned(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct InferenceConfig {
    pub model: String,
    pub persona: Persona,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_owned(),
            persona: Persona::default(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SynthesisConfig {
    pub speaker_id: u32,
    pub retry: RetryPolicy,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            speaker_id: DEFAULT_SPEAKER_ID,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    pub api_keys: ApiKeys,
    pub inference: InferenceConfig,
    pub synthesis: SynthesisConfig,
    pub worker_pool_size: usize,
}

impl AppConfig {
    pub fn openai_key(&self) -> Result<&ApiKey, ConfigError> {
        self.api_keys
            .openai
            .as_ref()
            .ok_or(ConfigError::MissingApiKey(ENV_OPENAI_API_KEY))
    }
}

pub fn worker_pool_size(value: usize) -> Result<usize, ConfigError> {
    if value == 0 {
        return Err(ConfigError::ZeroWorkers);
    }
    Ok(value)
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("api key must not be empty")]
    EmptyApiKey,
    #[error("missing api key (set {0})")]
    MissingApiKey(&'static str),
    #[error("persona description must not be empty")]
    EmptyPersona,
    #[error("worker pool needs at least one worker")]
    ZeroWorkers,
}

pub trait Env {
    fn var(&self, key: &str) -> Option<String>;
}

#[derive(Clone, Debug, Default)]
pub struct StdEnv;

impl Env for StdEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Clone, Debug, Default)]
pub struct MapEnv {
    vars: std::collections::BTreeMap<String, String>,
}

impl MapEnv {
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_owned(), value.to_owned());
        self
    }
}

impl Env for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

pub fn resolve_api_key(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
) -> Result<Option<ApiKey>, ConfigError> {
    match cli_value {
        Some(v) => Ok(Some(ApiKey::new(v)?)),
        None => match env.var(env_key) {
            Some(v) => Ok(Some(ApiKey::new(v)?)),
            None => Ok(None),
        },
    }
}

pub fn resolve_string_with_default(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
    default: &str,
) -> String {
    match cli_value {
        Some(v) => v,
        None => env.var(env_key).unwrap_or_else(|| default.to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_cli_takes_precedence_over_env() {
        let env = MapEnv::default().with_var(ENV_OPENAI_API_KEY, "env-key");
        let key = resolve_api_key(Some("cli-key".to_owned()), ENV_OPENAI_API_KEY, &env)
            .expect("valid key")
            .expect("present");
        assert_eq!(key.expose(), "cli-key");
    }

    #[test]
    fn api_key_env_used_when_cli_missing() {
        let env = MapEnv::default().with_var(ENV_TTS_QUEST_API_KEY, "env-key");
        let key = resolve_api_key(None, ENV_TTS_QUEST_API_KEY, &env)
            .expect("valid key")
            .expect("present");
        assert_eq!(key.expose(), "env-key");
    }

    #[test]
    fn blank_api_key_rejected() {
        let env = MapEnv::default().with_var(ENV_OPENAI_API_KEY, "   ");
        assert_eq!(
            resolve_api_key(None, ENV_OPENAI_API_KEY, &env),
            Err(ConfigError::EmptyApiKey)
        );
    }

    #[test]
    fn api_key_debug_is_redacted() {
        let key = ApiKey::new("sk-secret").expect("valid");
        assert!(!format!("{key:?}").contains("sk-secret"));
    }

    #[test]
    fn missing_openai_key_reported() {
        let cfg = AppConfig {
            api_keys: ApiKeys::default(),
            inference: InferenceConfig::default(),
            synthesis: SynthesisConfig::default(),
            worker_pool_size: DEFAULT_WORKER_POOL_SIZE,
        };
        assert_eq!(
            cfg.openai_key().unwrap_err(),
            ConfigError::MissingApiKey(ENV_OPENAI_API_KEY)
        );
    }

    #[test]
    fn persona_instruction_carries_character_and_format() {
        let persona = Persona::new("Ken, a grumpy chef", "One line of English.").expect("valid");
        let text = persona.instruction();
        assert!(text.contains("character style: Ken, a grumpy chef"));
        assert!(text.ends_with("One line of English."));
    }

    #[test]
    fn empty_persona_rejected() {
        assert_eq!(Persona::new(" ", "x"), Err(ConfigError::EmptyPersona));
    }

    #[test]
    fn zero_workers_rejected() {
        assert_eq!(worker_pool_size(0), Err(ConfigError::ZeroWorkers));
        assert_eq!(worker_pool_size(2), Ok(2));
    }

    #[test]
    fn resolve_string_with_default_default_used_when_both_missing() {
        let env = MapEnv::default();
        let v = resolve_string_with_default(None, ENV_MODEL, &env, "def");
        assert_eq!(v, "def");
    }

    #[test]
    fn resolve_string_with_default_env_used_when_cli_missing() {
        let env = MapEnv::default().with_var(ENV_MODEL, "env");
        let v = resolve_string_with_default(None, ENV_MODEL, &env, "def");
        assert_eq!(v, "env");
    }
}

//! Configuration types.
//!
//! Everything is read once at start-up from environment variables into an
//! `AppConfig`, which `main` hands to each component's constructor.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::channels::EmailConfig;
use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};
use crate::pitch::writer::DEFAULT_VALUE_ADD;
use crate::pitch::{SenderIdentity, WriterConfig};
use crate::sync::GithubSyncConfig;

/// Source of configuration values.
pub struct Env {
    vars: HashMap<String, String>,
}

impl Env {
    /// Snapshot of the process environment.
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Fixed values, for tests and embedding.
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self {
            vars: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    /// Trimmed value; empty counts as unset.
    pub fn optional(&self, key: &str) -> Option<String> {
        self.vars
            .get(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    pub fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    pub fn or(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }
}

/// Parse `key` if set, otherwise use `default`.
pub fn parse_or<T>(env: &Env, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env.optional(key) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{raw}': {e}"),
        }),
        None => Ok(default),
    }
}

/// Lead store location and daily cap.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub csv_path: PathBuf,
    /// Maximum sends per UTC day; 0 disables the cap.
    pub daily_limit: usize,
}

impl StoreConfig {
    pub fn from_env(env: &Env) -> Result<Self, ConfigError> {
        Ok(Self {
            csv_path: PathBuf::from(env.or("LEADS_CSV_PATH", "jobs_database.csv")),
            daily_limit: parse_or(env, "DAILY_SEND_LIMIT", 450)?,
        })
    }
}

/// Logging setup.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// Directory for a daily-rolling log file, in addition to stderr.
    pub log_dir: Option<PathBuf>,
}

impl LogConfig {
    pub fn from_env(env: &Env) -> Self {
        Self {
            log_dir: env.optional("OUTREACH_LOG_DIR").map(PathBuf::from),
        }
    }
}

/// Everything a run needs.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub writer: WriterConfig,
    pub email: EmailConfig,
    pub sender: SenderIdentity,
    pub sync: GithubSyncConfig,
    pub store: StoreConfig,
    pub log: LogConfig,
}

impl AppConfig {
    /// Load and validate. Fails on the first missing or malformed value,
    /// before anything touches the network.
    pub fn from_env(env: &Env) -> Result<Self, ConfigError> {
        let llm = llm_from_env(env)?;
        let email = EmailConfig::from_env(env)?;
        let sender = sender_from_env(env, &email.from_address);

        let writer = WriterConfig {
            max_tokens: parse_or(env, "PITCH_MAX_TOKENS", 600)?,
            min_tokens: parse_or(env, "PITCH_MIN_TOKENS", 150)?,
            max_attempts: parse_or(env, "PITCH_MAX_ATTEMPTS", 3)?,
            temperature: parse_or(env, "PITCH_TEMPERATURE", 0.7)?,
            retry_delay: Duration::from_secs(parse_or(env, "PITCH_RETRY_DELAY_SECS", 2)?),
            value_add: env.or("MY_VALUE_ADD", DEFAULT_VALUE_ADD),
            sender_name: sender.name.clone(),
        };
        if writer.max_tokens == 0 {
            return Err(ConfigError::InvalidValue {
                key: "PITCH_MAX_TOKENS".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if writer.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "PITCH_MAX_ATTEMPTS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            llm,
            writer,
            email,
            sender,
            sync: GithubSyncConfig::from_env(env)?,
            store: StoreConfig::from_env(env)?,
            log: LogConfig::from_env(env),
        })
    }
}

fn llm_from_env(env: &Env) -> Result<LlmConfig, ConfigError> {
    let backend: LlmBackend = parse_or(env, "LLM_BACKEND", LlmBackend::Gemini)?;
    let api_key = SecretString::from(env.required(backend.api_key_var())?);
    Ok(LlmConfig {
        backend,
        api_key,
        model: env.or("LLM_MODEL", backend.default_model()),
        base_url: env.optional("LLM_BASE_URL"),
    })
}

fn sender_from_env(env: &Env, from_address: &str) -> SenderIdentity {
    SenderIdentity {
        name: env.or("SENDER_NAME", from_address),
        phone: env.or("SENDER_PHONE", ""),
        linkedin: env.or("SENDER_LINKEDIN", ""),
        portfolio: env.or("SENDER_PORTFOLIO", ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    const BASE: &[(&str, &str)] = &[
        ("GEMINI_API_KEY", "g-key"),
        ("SMTP_EMAIL", "me@test.com"),
        ("SMTP_PASSWORD", "pw"),
        ("GH_TOKEN", "gh"),
        ("GITHUB_REPO", "me/jobs"),
    ];

    fn env_with(extra: &[(&str, &str)]) -> Env {
        let mut pairs = BASE.to_vec();
        pairs.extend_from_slice(extra);
        Env::from_pairs(&pairs)
    }

    #[test]
    fn minimal_environment_loads_with_defaults() {
        let cfg = AppConfig::from_env(&env_with(&[])).unwrap();
        assert_eq!(cfg.llm.backend, LlmBackend::Gemini);
        assert_eq!(cfg.llm.model, "gemini-2.0-flash");
        assert_eq!(cfg.llm.api_key.expose_secret(), "g-key");
        assert_eq!(cfg.writer.max_tokens, 600);
        assert_eq!(cfg.writer.max_attempts, 3);
        assert_eq!(cfg.store.daily_limit, 450);
        assert_eq!(cfg.store.csv_path, PathBuf::from("jobs_database.csv"));
        // Sender name falls back to the SMTP address.
        assert_eq!(cfg.sender.name, "me@test.com");
        assert_eq!(cfg.writer.sender_name, "me@test.com");
        assert!(cfg.log.log_dir.is_none());
    }

    #[test]
    fn backend_selects_its_key() {
        let err = AppConfig::from_env(&env_with(&[("LLM_BACKEND", "anthropic")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "ANTHROPIC_API_KEY"));

        let cfg = AppConfig::from_env(&env_with(&[
            ("LLM_BACKEND", "anthropic"),
            ("ANTHROPIC_API_KEY", "a-key"),
        ]))
        .unwrap();
        assert_eq!(cfg.llm.backend, LlmBackend::Anthropic);
    }

    #[test]
    fn each_required_value_is_checked() {
        for missing in ["GEMINI_API_KEY", "SMTP_EMAIL", "SMTP_PASSWORD", "GH_TOKEN", "GITHUB_REPO"] {
            let pairs: Vec<_> = BASE.iter().copied().filter(|(k, _)| *k != missing).collect();
            let err = AppConfig::from_env(&Env::from_pairs(&pairs)).unwrap_err();
            assert!(
                matches!(err, ConfigError::MissingEnvVar(ref k) if k == missing),
                "expected {missing} to be reported, got {err}"
            );
        }
    }

    #[test]
    fn blank_values_count_as_missing() {
        let err = AppConfig::from_env(&env_with(&[("GEMINI_API_KEY", "   ")]));
        // Later pairs win in the map.
        assert!(matches!(err, Err(ConfigError::MissingEnvVar(_))));
    }

    #[test]
    fn malformed_numbers_rejected() {
        let err = AppConfig::from_env(&env_with(&[("PITCH_MAX_TOKENS", "lots")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "PITCH_MAX_TOKENS"));

        let err = AppConfig::from_env(&env_with(&[("PITCH_MAX_ATTEMPTS", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn sender_identity_fields() {
        let cfg = AppConfig::from_env(&env_with(&[
            ("SENDER_NAME", "Sam Lee"),
            ("SENDER_PHONE", "+1 555"),
            ("SENDER_LINKEDIN", "li/sam"),
        ]))
        .unwrap();
        assert_eq!(cfg.sender.name, "Sam Lee");
        assert_eq!(cfg.sender.phone, "+1 555");
        assert_eq!(cfg.sender.linkedin, "li/sam");
        assert_eq!(cfg.sender.portfolio, "");
        assert_eq!(cfg.email.from_name.as_deref(), Some("Sam Lee"));
    }
}

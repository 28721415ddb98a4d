//! Layered configuration: defaults, TOML file, CLI flags, then secrets from a
//! secrets file and the environment. Any problem here is fatal at startup.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::cli::Args;
use crate::conditions::{Condition, ConditionRegistry};
use crate::error::ConfigError;
use crate::phase::Phase;
use crate::providers::{GenerationParams, DEFAULT_API_BASE};
use crate::session::{SessionLimits, DEFAULT_MAX_SESSIONS, DEFAULT_SESSION_IDLE_MS};

pub const OPENAI_KEY_ENV: &str = "OPENAI_API_KEY";
pub const ADMIN_PASSPHRASE_ENV: &str = "STUDY_ADMIN_PASSPHRASE";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StudyConfig {
    pub host: String,
    pub port: u16,
    /// Page title shown above every phase.
    pub title: String,
    pub instruction_minutes: u64,
    pub brainstorm_minutes: u64,
    pub survey_url: String,
    pub assets_dir: PathBuf,
    pub api_base: String,
    pub generation: GenerationParams,
    /// Replaces the built-in arms when non-empty.
    pub conditions: Vec<Condition>,
    /// Browser sessions idle this long are dropped.
    pub session_idle_minutes: u64,
    /// Upper bound on stored browser sessions.
    pub max_sessions: usize,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8501,
            title: "Sci-Fi Brainstorming Study".to_string(),
            instruction_minutes: 5,
            brainstorm_minutes: 10,
            survey_url: "https://survey.example.org/study".to_string(),
            assets_dir: PathBuf::from("assets"),
            api_base: DEFAULT_API_BASE.to_string(),
            generation: GenerationParams::default(),
            conditions: Vec::new(),
            session_idle_minutes: DEFAULT_SESSION_IDLE_MS / 60_000,
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

fn read_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let text = std::fs::read_to_string(path)
        .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
}

impl StudyConfig {
    /// Defaults, overlaid with the TOML file when one is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => read_toml(p),
            None => Ok(Self::default()),
        }
    }

    /// CLI flags win over the file.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(host) = &args.host {
            self.host = host.clone();
        }
        if let Some(port) = args.port {
            self.port = port;
        }
        if let Some(model) = &args.model {
            self.generation.model = model.clone();
        }
        if let Some(dir) = &args.assets_dir {
            self.assets_dir = dir.clone();
        }
        if let Some(url) = &args.survey_url {
            self.survey_url = url.clone();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instruction_minutes == 0 {
            return Err(ConfigError::Invalid {
                field: "instruction_minutes",
                detail: "must be greater than zero".to_string(),
            });
        }
        if self.brainstorm_minutes == 0 {
            return Err(ConfigError::Invalid {
                field: "brainstorm_minutes",
                detail: "must be greater than zero".to_string(),
            });
        }
        reqwest::Url::parse(&self.survey_url).map_err(|e| ConfigError::Invalid {
            field: "survey_url",
            detail: e.to_string(),
        })?;
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(ConfigError::Invalid {
                field: "generation.temperature",
                detail: format!("{} is outside 0.0..=2.0", self.generation.temperature),
            });
        }
        if self.generation.max_tokens == 0 {
            return Err(ConfigError::Invalid {
                field: "generation.max_tokens",
                detail: "must be greater than zero".to_string(),
            });
        }
        if self.session_idle_minutes == 0 {
            return Err(ConfigError::Invalid {
                field: "session_idle_minutes",
                detail: "must be greater than zero".to_string(),
            });
        }
        if self.max_sessions == 0 {
            return Err(ConfigError::Invalid {
                field: "max_sessions",
                detail: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// The configured arms, or the built-in study arms.
    pub fn registry(&self) -> Result<ConditionRegistry, ConfigError> {
        if self.conditions.is_empty() {
            Ok(ConditionRegistry::builtin())
        } else {
            ConditionRegistry::new(self.conditions.clone())
        }
    }

    /// Timer length of a phase; `None` for phases without a countdown.
    pub fn duration_for(&self, phase: Phase) -> Option<u64> {
        match phase {
            Phase::Login | Phase::Submission => None,
            Phase::Instruction => Some(self.instruction_minutes),
            Phase::Brainstorming => Some(self.brainstorm_minutes),
        }
    }

    /// Survey link carrying the participant id and group.
    pub fn redirect_url(&self, participant_id: &str, group: &str) -> String {
        match reqwest::Url::parse_with_params(
            &self.survey_url,
            &[("PID", participant_id), ("GROUP", group)],
        ) {
            Ok(url) => url.to_string(),
            Err(_) => self.survey_url.clone(),
        }
    }

    pub fn session_limits(&self) -> SessionLimits {
        SessionLimits {
            idle_ttl_ms: self.session_idle_minutes.saturating_mul(60_000),
            max_sessions: self.max_sessions,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ---------------------------------------------------------------------------
// Secrets
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct SecretsFile {
    #[serde(rename = "OPENAI_API_KEY")]
    openai_api_key: Option<String>,
    #[serde(rename = "ADMIN_PASSPHRASE")]
    admin_passphrase: Option<String>,
}

/// Required secrets. Never logged.
#[derive(Clone)]
pub struct Secrets {
    pub openai_api_key: String,
    pub admin_passphrase: String,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("openai_api_key", &"<redacted>")
            .field("admin_passphrase", &"<redacted>")
            .finish()
    }
}

impl Secrets {
    /// Read the secrets file (if any), then let the environment override it.
    /// `env` is injected so tests do not touch the process environment.
    pub fn resolve(
        file: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let from_file: SecretsFile = match file {
            Some(p) => read_toml(p)?,
            None => SecretsFile::default(),
        };
        let pick = |env_name: &str, file_value: Option<String>| {
            env(env_name)
                .or(file_value)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let openai_api_key = pick(OPENAI_KEY_ENV, from_file.openai_api_key).ok_or(
            ConfigError::MissingSecret { name: "OPENAI_API_KEY", env: OPENAI_KEY_ENV },
        )?;
        let admin_passphrase = pick(ADMIN_PASSPHRASE_ENV, from_file.admin_passphrase).ok_or(
            ConfigError::MissingSecret { name: "ADMIN_PASSPHRASE", env: ADMIN_PASSPHRASE_ENV },
        )?;
        Ok(Self { openai_api_key, admin_passphrase })
    }

    pub fn from_env(file: Option<&Path>) -> Result<Self, ConfigError> {
        Self::resolve(file, |k| std::env::var(k).ok())
    }
}

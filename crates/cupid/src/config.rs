use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tokio::fs;

// ============================================================================
// Config (root)
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub turn: TurnConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_saphyr::Error),

    #[error("environment variable '{0}' is not set")]
    MissingEnvVar(String),

    #[error("unclosed variable reference '${{' (missing '}}')")]
    UnclosedVarReference,
}

impl Config {
    /// Load the YAML config at `path`, falling back to defaults when absent.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = match fs::read_to_string(path.as_ref()).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        Self::parse(&contents)
    }

    /// Parse config text after environment expansion.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;
        Ok(serde_saphyr::from_str(&expanded)?)
    }
}

/// Resolve `path` against the directory holding the config file.
pub fn resolve_path(config_path: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    config_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(path)
}

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_SESSIONS_DIR: &str = ".cupid/sessions";
pub const DEFAULT_ARTIFACTS_DIR: &str = ".cupid/artifacts";

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    300
}

fn default_keep_alive_interval() -> u64 {
    15
}

fn default_max_connections() -> usize {
    256
}

fn default_model_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model_name() -> String {
    "gpt-4o-mini".to_string()
}

fn default_model_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_history_limit() -> usize {
    20
}

fn default_turn_timeout() -> u64 {
    120
}

fn default_max_capability_rounds() -> usize {
    8
}

fn default_search_api_key_env() -> String {
    "BRAVE_API_KEY".to_string()
}

fn default_search_max_results() -> usize {
    5
}

fn default_sessions_dir() -> PathBuf {
    PathBuf::from(DEFAULT_SESSIONS_DIR)
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from(DEFAULT_ARTIFACTS_DIR)
}

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand `${VAR}`, `${VAR:-default}` and `$$` in raw config text.
///
/// A bare `$` not followed by `{` or `$` is kept literally. Defaults are not
/// themselves expanded.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos + 1..];

        if let Some(after) = tail.strip_prefix('$') {
            out.push('$');
            rest = after;
        } else if let Some(body) = tail.strip_prefix('{') {
            let end = body.find('}').ok_or(ConfigError::UnclosedVarReference)?;
            out.push_str(&lookup_var(&body[..end])?);
            rest = &body[end + 1..];
        } else {
            out.push('$');
            rest = tail;
        }
    }

    out.push_str(rest);
    Ok(out)
}

fn lookup_var(reference: &str) -> Result<String, ConfigError> {
    let (name, default) = match reference.split_once(":-") {
        Some((name, default)) => (name, Some(default)),
        None => (reference, None),
    };

    match (std::env::var(name), default) {
        (Ok(value), _) => Ok(value),
        (Err(_), Some(default)) => Ok(default.to_string()),
        (Err(_), None) => Err(ConfigError::MissingEnvVar(name.to_string())),
    }
}

// ============================================================================
// ServerConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_keep_alive_interval")]
    pub keep_alive_interval_seconds: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_seconds: default_request_timeout(),
            keep_alive_interval_seconds: default_keep_alive_interval(),
            max_connections: default_max_connections(),
        }
    }
}

// ============================================================================
// ModelConfig
// ============================================================================

/// The OpenAI-compatible endpoint that does the reasoning.
#[derive(Debug, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model_base_url")]
    pub base_url: String,
    #[serde(default = "default_model_name")]
    pub name: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_model_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_model_base_url(),
            name: default_model_name(),
            api_key_env: default_model_api_key_env(),
            temperature: None,
            max_tokens: None,
        }
    }
}

// ============================================================================
// TurnConfig
// ============================================================================

/// What happens to a running turn when its streaming client disconnects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnDisconnect {
    /// Finish the turn and commit the assistant message anyway.
    #[default]
    Continue,
    /// Stop at the next event boundary and commit nothing further.
    Abort,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TurnConfig {
    /// Messages of history included in each prompt.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Upper bound on a whole turn, capability calls included.
    #[serde(default = "default_turn_timeout")]
    pub timeout_seconds: u64,
    /// Reasoning round trips allowed within one turn.
    #[serde(default = "default_max_capability_rounds")]
    pub max_capability_rounds: usize,
    #[serde(default)]
    pub on_disconnect: OnDisconnect,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            timeout_seconds: default_turn_timeout(),
            max_capability_rounds: default_max_capability_rounds(),
            on_disconnect: OnDisconnect::default(),
        }
    }
}

// ============================================================================
// SearchConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_search_max_results")]
    pub max_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_search_api_key_env(),
            max_results: default_search_max_results(),
        }
    }
}

// ============================================================================
// PathsConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_sessions_dir")]
    pub sessions_dir: PathBuf,
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: PathBuf,
    /// Markdown knowledge documents appended to the system prompt.
    #[serde(default)]
    pub knowledge: Vec<PathBuf>,
    /// Optional persona file replacing the built-in persona.
    #[serde(default)]
    pub instructions: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            sessions_dir: default_sessions_dir(),
            artifacts_dir: default_artifacts_dir(),
            knowledge: Vec::new(),
            instructions: None,
        }
    }
}

impl PathsConfig {
    /// Rewrite every relative path against the config file location.
    pub fn resolve_against(&mut self, config_path: &Path) {
        self.sessions_dir = resolve_path(config_path, &self.sessions_dir);
        self.artifacts_dir = resolve_path(config_path, &self.artifacts_dir);
        for doc in &mut self.knowledge {
            *doc = resolve_path(config_path, doc);
        }
        if let Some(instructions) = self.instructions.as_mut() {
            *instructions = resolve_path(config_path, instructions);
        }
    }
}

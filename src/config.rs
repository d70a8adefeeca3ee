//! Process configuration read from the environment

use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_MAX_ITERATIONS: usize = 16;

/// Decision-maker model settings
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    pub anthropic_api_key: Option<String>,
    /// Gateway URL used instead of the public Anthropic endpoint
    pub gateway: Option<String>,
    pub model: Option<String>,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self {
            anthropic_api_key: non_empty_var("ANTHROPIC_API_KEY"),
            gateway: non_empty_var("LLM_GATEWAY"),
            model: non_empty_var("INERGY_MODEL"),
        }
    }
}

/// Commerce network participant identity
#[derive(Debug, Clone)]
pub struct BecknConfig {
    pub base_url: String,
    pub bap_id: String,
    pub bap_uri: String,
    pub bpp_id: String,
    pub bpp_uri: String,
}

impl BecknConfig {
    /// `None` unless `BECKN_BASE_URL` is set
    pub fn from_env() -> Option<Self> {
        let base_url = non_empty_var("BECKN_BASE_URL")?;
        Some(Self {
            base_url,
            bap_id: std::env::var("BECKN_BAP_ID").unwrap_or_default(),
            bap_uri: std::env::var("BECKN_BAP_URI").unwrap_or_default(),
            bpp_id: std::env::var("BECKN_BPP_ID").unwrap_or_default(),
            bpp_uri: std::env::var("BECKN_BPP_URI").unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub port: u16,
    /// Decision steps allowed per turn before the turn is failed
    pub max_iterations: usize,
    pub llm: LlmConfig,
    pub beckn: Option<BecknConfig>,
    pub world_engine_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            port: DEFAULT_PORT,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            llm: LlmConfig::default(),
            beckn: None,
            world_engine_url: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            db_path: non_empty_var("INERGY_DB_PATH").map_or(defaults.db_path, PathBuf::from),
            port: parsed_var("INERGY_PORT").unwrap_or(defaults.port),
            max_iterations: parsed_var("INERGY_MAX_ITERATIONS")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_iterations),
            llm: LlmConfig::from_env(),
            beckn: BecknConfig::from_env(),
            world_engine_url: non_empty_var("WORLD_ENGINE_BASE_URL"),
        }
    }
}

fn default_db_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".inergy").join("sessions.db")
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    non_empty_var(key).and_then(|v| v.trim().parse().ok())
}

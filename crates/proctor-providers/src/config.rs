//! Grader configuration and factory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use proctor_core::traits::EssayGrader;

use crate::anthropic::AnthropicGrader;
use crate::mock::MockGrader;
use crate::ollama::OllamaGrader;
use crate::openai::OpenAiGrader;

/// Configuration for a single essay grader.
///
/// Note: Custom Debug impl masks API keys to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GraderConfig {
    OpenAI {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        org_id: Option<String>,
    },
    Anthropic {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
    },
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
    },
    /// Offline grader; `response` replays a fixed model output.
    Mock {
        #[serde(default)]
        response: Option<String>,
    },
}

impl std::fmt::Debug for GraderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraderConfig::OpenAI {
                api_key: _,
                base_url,
                org_id,
            } => f
                .debug_struct("OpenAI")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .field("org_id", org_id)
                .finish(),
            GraderConfig::Anthropic {
                api_key: _,
                base_url,
            } => f
                .debug_struct("Anthropic")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .finish(),
            GraderConfig::Ollama { base_url } => f
                .debug_struct("Ollama")
                .field("base_url", base_url)
                .finish(),
            GraderConfig::Mock { response } => f
                .debug_struct("Mock")
                .field("response", response)
                .finish(),
        }
    }
}

impl GraderConfig {
    /// The `type` tag of this grader.
    pub fn kind(&self) -> &'static str {
        match self {
            GraderConfig::OpenAI { .. } => "openai",
            GraderConfig::Anthropic { .. } => "anthropic",
            GraderConfig::Ollama { .. } => "ollama",
            GraderConfig::Mock { .. } => "mock",
        }
    }
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

/// Top-level proctor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProctorConfig {
    /// Grader configurations keyed by name.
    #[serde(default)]
    pub graders: HashMap<String, GraderConfig>,
    /// Grader used for essays; none means essays are not sent anywhere.
    #[serde(default)]
    pub default_grader: Option<String>,
    /// Model passed to the grader; each grader has its own default.
    #[serde(default)]
    pub essay_model: Option<String>,
    /// Directory submissions are written to.
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,
    /// Upper bound on a single essay grading call.
    #[serde(default = "default_grader_timeout")]
    pub grader_timeout_secs: u64,
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("./proctor-submissions")
}
fn default_grader_timeout() -> u64 {
    60
}

impl Default for ProctorConfig {
    fn default() -> Self {
        Self {
            graders: HashMap::new(),
            default_grader: None,
            essay_model: None,
            store_dir: default_store_dir(),
            grader_timeout_secs: default_grader_timeout(),
        }
    }
}

impl ProctorConfig {
    /// Build the default grader, if one is configured.
    pub fn build_default_grader(&self) -> Result<Option<Arc<dyn EssayGrader>>> {
        let Some(name) = &self.default_grader else {
            return Ok(None);
        };
        let config = self
            .graders
            .get(name)
            .with_context(|| format!("default grader '{name}' is not configured"))?;
        create_grader(config, self.essay_model.clone()).map(Some)
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

fn resolve_grader_config(config: &GraderConfig) -> GraderConfig {
    match config {
        GraderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => GraderConfig::OpenAI {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_deref().map(resolve_env_vars),
            org_id: org_id.as_deref().map(resolve_env_vars),
        },
        GraderConfig::Anthropic { api_key, base_url } => GraderConfig::Anthropic {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_deref().map(resolve_env_vars),
        },
        GraderConfig::Ollama { base_url } => GraderConfig::Ollama {
            base_url: resolve_env_vars(base_url),
        },
        GraderConfig::Mock { response } => GraderConfig::Mock {
            response: response.clone(),
        },
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `proctor.toml` in the current directory
/// 2. `~/.config/proctor/config.toml`
///
/// Environment variable overrides: `PROCTOR_OPENAI_KEY`, `PROCTOR_ANTHROPIC_KEY`.
pub fn load_config() -> Result<ProctorConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<ProctorConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from("proctor.toml");
            if local.exists() {
                Some(local)
            } else {
                dirs_path()
                    .map(|home| home.join("config.toml"))
                    .filter(|global| global.exists())
            }
        }
    };

    let config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            parse_config_str(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => ProctorConfig::default(),
    };

    Ok(apply_env(config))
}

/// Parse a configuration document without touching the environment.
pub fn parse_config_str(content: &str) -> Result<ProctorConfig> {
    Ok(toml::from_str::<ProctorConfig>(content)?)
}

/// Apply key overrides and resolve `${VAR}` references.
fn apply_env(mut config: ProctorConfig) -> ProctorConfig {
    if let Ok(key) = std::env::var("PROCTOR_ANTHROPIC_KEY") {
        let entry = config
            .graders
            .entry("anthropic".into())
            .or_insert(GraderConfig::Anthropic {
                api_key: String::new(),
                base_url: None,
            });
        if let GraderConfig::Anthropic { api_key, .. } = entry {
            *api_key = key;
        }
    }

    if let Ok(key) = std::env::var("PROCTOR_OPENAI_KEY") {
        let entry = config
            .graders
            .entry("openai".into())
            .or_insert(GraderConfig::OpenAI {
                api_key: String::new(),
                base_url: None,
                org_id: None,
            });
        if let GraderConfig::OpenAI { api_key, .. } = entry {
            *api_key = key;
        }
    }

    config.graders = config
        .graders
        .iter()
        .map(|(k, v)| (k.clone(), resolve_grader_config(v)))
        .collect();
    config
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("proctor"))
}

/// Create a grader instance from its configuration.
pub fn create_grader(config: &GraderConfig, model: Option<String>) -> Result<Arc<dyn EssayGrader>> {
    let grader: Arc<dyn EssayGrader> = match config {
        GraderConfig::Anthropic { api_key, base_url } => {
            Arc::new(AnthropicGrader::new(api_key, base_url.clone(), model)?)
        }
        GraderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => Arc::new(OpenAiGrader::new(
            api_key,
            base_url.clone(),
            org_id.clone(),
            model,
        )?),
        GraderConfig::Ollama { base_url } => Arc::new(OllamaGrader::new(base_url, model)?),
        GraderConfig::Mock { response } => match response {
            Some(raw) => Arc::new(MockGrader::with_fixed_response(raw)),
            None => Arc::new(MockGrader::new()),
        },
    };
    Ok(grader)
}

//! Launcher configuration: a TOML file, then command-line overrides.
//!
//! ```toml
//! index_path = "vectorstore/index.json"
//! top_k = 3
//!
//! [generation]
//! model = "llama-3.1-8b-instant"
//! temperature = 0.5
//!
//! [embedding]
//! provider = "local"
//! ```
//!
//! Credentials are never read from this file; they come from the environment
//! (or a `.env` file).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use medibot_rag::RagConfig;
use serde::{Deserialize, Serialize};

/// File picked up from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "medibot.toml";

/// Which embedding provider embeds queries. Must match the model the index
/// was built with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    #[default]
    Local,
    OpenAI,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingBackend,
    /// Remote model name; ignored by the local provider.
    pub model: Option<String>,
    /// Matryoshka dimensions for remote models that support them.
    pub dimensions: Option<usize>,
}

/// Everything the launcher reads from its config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    #[serde(flatten)]
    pub rag: RagConfig,
    pub embedding: EmbeddingConfig,
    /// Base URL of an OpenAI-compatible chat completions API. Groq when unset.
    pub generation_base_url: Option<String>,
}

impl LauncherConfig {
    /// Load from `path`, or from [`DEFAULT_CONFIG_FILE`] if it exists, or fall
    /// back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|p| p.exists()),
        };

        match path {
            Some(path) => {
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                Self::from_toml(&content)
                    .with_context(|| format!("failed to parse {}", path.display()))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply command-line overrides, then validate the result.
    pub fn apply(&mut self, overrides: &Overrides) -> Result<()> {
        if let Some(index) = &overrides.index {
            self.rag.index_path = index.clone();
        }
        if let Some(top_k) = overrides.top_k {
            self.rag.top_k = top_k;
        }
        if let Some(model) = &overrides.model {
            self.rag.generation.model = model.clone();
        }
        if let Some(temperature) = overrides.temperature {
            self.rag.generation.temperature = temperature;
        }
        if let Some(max_tokens) = overrides.max_tokens {
            self.rag.generation.max_output_tokens = max_tokens;
        }
        self.rag.validate()?;
        Ok(())
    }
}

/// Values given on the command line. `None` keeps the file's value.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub index: Option<PathBuf>,
    pub top_k: Option<usize>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

// SPDX-License-Identifier: MIT

//! Runtime configuration
//!
//! Values come from three layers, later ones winning: built-in defaults,
//! an optional YAML file, then environment variables (`MODEL_PROVIDER`,
//! `MARKET_MODEL`, `MARKET_OUTPUT_DIR`, `MARKET_HISTORY_DIR`,
//! `MARKET_MAX_REVISIONS`). CLI flags are applied on top by the binary.

use crate::adk::error::{MarketError, ModelError, Result};
use crate::adk::model::gemini::{self, GeminiModel};
use crate::adk::model::openai::{self, OpenAIModel};
use crate::adk::model::{GenerationConfig, Model};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// Text-generation backend selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[serde(rename = "openai")]
    #[value(name = "openai")]
    OpenAI,
    #[default]
    Gemini,
}

impl Provider {
    /// Model used when none is configured
    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::OpenAI => openai::DEFAULT_MODEL,
            Provider::Gemini => gemini::DEFAULT_MODEL,
        }
    }

    /// Generation parameters used when none are configured
    pub fn default_generation(&self) -> Option<GenerationConfig> {
        match self {
            Provider::OpenAI => None,
            Provider::Gemini => Some(GenerationConfig {
                temperature: Some(0.7),
                ..Default::default()
            }),
        }
    }

    /// Construct the model client, reading this provider's credential from the environment
    pub fn build_model(&self, model_name: Option<&str>) -> Result<Arc<dyn Model>> {
        let name = model_name.unwrap_or(self.default_model()).to_string();
        log::info!("Using provider: {} with model: {}", self, name);
        Ok(match self {
            Provider::OpenAI => Arc::new(OpenAIModel::new(name)?),
            Provider::Gemini => Arc::new(GeminiModel::new(name)?),
        })
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::OpenAI => write!(f, "openai"),
            Provider::Gemini => write!(f, "gemini"),
        }
    }
}

impl FromStr for Provider {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAI),
            "gemini" | "google" | "" => Ok(Provider::Gemini),
            other => Err(ModelError::UnknownProvider(other.to_string()).into()),
        }
    }
}

/// Chart sandbox settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Interpreter used to run generated chart scripts
    pub interpreter: String,
    /// Wall-clock limit for one script
    pub timeout_secs: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            timeout_secs: 60,
        }
    }
}

/// Workflow configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkflowConfig {
    pub provider: Provider,
    /// Overrides the provider's default model
    pub model_name: Option<String>,
    /// Overrides the provider's default temperature
    pub temperature: Option<f32>,
    /// Rejections allowed before the reviewer approves unconditionally
    pub max_revisions: u32,
    /// Parent directory of the per-run output directories
    pub output_root: PathBuf,
    /// Where saved reports are kept
    pub history_dir: PathBuf,
    pub sandbox: SandboxConfig,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            model_name: None,
            temperature: None,
            max_revisions: 2,
            output_root: PathBuf::from("runs"),
            history_dir: PathBuf::from("history"),
            sandbox: SandboxConfig::default(),
        }
    }
}

impl WorkflowConfig {
    /// Load defaults, the optional YAML file and the process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_yaml(&std::fs::read_to_string(p)?)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse a YAML document; missing keys keep their defaults
    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply environment overrides through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(p) = lookup("MODEL_PROVIDER") {
            self.provider = p.parse()?;
        }
        if let Some(m) = lookup("MARKET_MODEL") {
            self.model_name = Some(m);
        }
        if let Some(dir) = lookup("MARKET_OUTPUT_DIR") {
            self.output_root = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("MARKET_HISTORY_DIR") {
            self.history_dir = PathBuf::from(dir);
        }
        if let Some(n) = lookup("MARKET_MAX_REVISIONS") {
            self.max_revisions = n.trim().parse().map_err(|_| {
                MarketError::config(format!("MARKET_MAX_REVISIONS must be an integer, got '{}'", n))
            })?;
        }
        Ok(())
    }

    /// Generation parameters for the configured provider
    pub fn generation(&self) -> Option<GenerationConfig> {
        match self.temperature {
            Some(t) => Some(GenerationConfig {
                temperature: Some(t),
                ..Default::default()
            }),
            None => self.provider.default_generation(),
        }
    }
}

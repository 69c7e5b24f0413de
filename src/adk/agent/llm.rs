// SPDX-License-Identifier: MIT

//! LLM Agent - single-turn text generation
//!
//! Sends a system instruction plus the user prompt to a model and returns
//! the concatenated text of the reply.

use super::Agent;
use crate::adk::error::Result;
use crate::adk::model::{Content, GenerationConfig, Model};
use async_trait::async_trait;
use std::sync::Arc;

/// Model-backed agent
pub struct LLMAgent {
    pub name: String,
    pub instruction: String,
    pub model: Arc<dyn Model>,
    pub config: Option<GenerationConfig>,
}

impl LLMAgent {
    pub fn new(name: String, instruction: String, model: Arc<dyn Model>) -> Self {
        Self {
            name,
            instruction,
            model,
            config: None,
        }
    }

    /// Attach generation parameters sent with every request
    pub fn with_config(mut self, config: GenerationConfig) -> Self {
        self.config = Some(config);
        self
    }
}

#[async_trait]
impl Agent for LLMAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, input: String) -> Result<String> {
        let history = vec![
            Content::text("system", self.instruction.clone()),
            Content::text("user", input),
        ];

        let response = self
            .model
            .generate_content(&history, self.config.as_ref())
            .await?;

        let text = response.text_output();
        if text.trim().is_empty() {
            log::warn!("Agent {} received an empty completion", self.name);
            return Ok(String::new());
        }

        log::info!(
            "Agent {} returning text response (length: {}, preview: '{}')",
            self.name,
            text.len(),
            text.chars().take(100).collect::<String>()
        );
        Ok(text)
    }
}

// SPDX-License-Identifier: MIT

//! OpenAI Model - ChatGPT API implementation

use super::{Content, GenerationConfig, Model, Part};
use crate::adk::error::{MarketError, ModelError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::env;

/// Default chat model for the OpenAI provider
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// OpenAI ChatGPT model implementation
pub struct OpenAIModel {
    client: Client,
    api_key: String,
    model_name: String,
    base_url: String,
}

impl OpenAIModel {
    /// Create a new OpenAIModel
    ///
    /// Requires `OPENAI_API_KEY` environment variable to be set.
    /// Optionally uses `OPENAI_BASE_URL` for custom endpoints.
    pub fn new(model_name: String) -> Result<Self> {
        let api_key = env::var("OPENAI_API_KEY")
            .map_err(|_| ModelError::ApiKeyMissing("OpenAI (OPENAI_API_KEY)".to_string()))?;
        let base_url =
            env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

        Ok(Self {
            client: Client::new(),
            api_key,
            model_name,
            base_url,
        })
    }

    /// Convert internal Content to OpenAI message format
    fn content_to_openai_message(content: &Content) -> serde_json::Value {
        let role = match content.role.as_str() {
            "system" => "system",
            "user" => "user",
            "model" => "assistant",
            other => other,
        };

        let mut text_content = String::new();
        for part in &content.parts {
            match part {
                Part::Text(t) => text_content.push_str(t),
                Part::Thinking(t) => text_content.push_str(t),
            }
        }

        json!({
            "role": role,
            "content": text_content
        })
    }

    /// Build the request body for a chat completion
    fn build_body(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
    ) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = history
            .iter()
            .map(Self::content_to_openai_message)
            .collect();

        let mut body = json!({
            "model": self.model_name,
            "messages": messages
        });

        if let Some(cfg) = config {
            if let Some(temp) = cfg.temperature {
                body["temperature"] = json!(temp);
            }
            if let Some(max_tokens) = cfg.max_output_tokens {
                body["max_tokens"] = json!(max_tokens);
            }
            if let Some(top_p) = cfg.top_p {
                body["top_p"] = json!(top_p);
            }
        }

        body
    }

    /// Parse OpenAI response into Content
    fn parse_openai_response(response: &serde_json::Value) -> Result<Content> {
        let choice = response["choices"]
            .as_array()
            .and_then(|c| c.first())
            .ok_or_else(|| {
                ModelError::InvalidResponse("No choices in OpenAI response".to_string())
            })?;

        let mut parts = Vec::new();
        if let Some(content) = choice["message"]["content"].as_str() {
            if !content.is_empty() {
                parts.push(Part::Text(content.to_string()));
            }
        }

        Ok(Content {
            role: "model".to_string(),
            parts,
        })
    }
}

#[async_trait]
impl Model for OpenAIModel {
    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
    ) -> Result<Content> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_body(history, config);

        log::debug!(
            "OpenAI request body: {}",
            serde_json::to_string_pretty(&body).unwrap_or_default()
        );

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await?;
            return Err(MarketError::api("OpenAI", format!("{}: {}", status, text)));
        }

        let resp_json: serde_json::Value = resp.json().await?;
        log::debug!("OpenAI response: {}", resp_json);

        Self::parse_openai_response(&resp_json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_model() -> OpenAIModel {
        OpenAIModel {
            client: Client::new(),
            api_key: "test".to_string(),
            model_name: DEFAULT_MODEL.to_string(),
            base_url: "http://localhost".to_string(),
        }
    }

    #[test]
    fn test_content_to_openai_user_message() {
        let content = Content::text("user", "Hello");

        let msg = OpenAIModel::content_to_openai_message(&content);
        assert_eq!(msg["role"], "user");
        assert_eq!(msg["content"], "Hello");
    }

    #[test]
    fn test_content_to_openai_assistant_message() {
        let content = Content::text("model", "I can help");

        let msg = OpenAIModel::content_to_openai_message(&content);
        assert_eq!(msg["role"], "assistant");
        assert_eq!(msg["content"], "I can help");
    }

    #[test]
    fn test_build_body_applies_generation_config() {
        let model = test_model();
        let history = vec![
            Content::text("system", "You are an analyst."),
            Content::text("user", "Analyze solar"),
        ];
        let config = GenerationConfig {
            temperature: Some(0.5),
            max_output_tokens: Some(800),
            ..Default::default()
        };

        let body = model.build_body(&history, Some(&config));
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["temperature"], json!(0.5));
        assert_eq!(body["max_tokens"], json!(800));
        assert!(body.get("top_p").is_none());
    }

    #[test]
    fn test_parse_openai_text_response() {
        let response = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "APPROVED"
                }
            }]
        });

        let content = OpenAIModel::parse_openai_response(&response).unwrap();
        assert_eq!(content.role, "model");
        assert_eq!(content.text_output(), "APPROVED");
    }

    #[test]
    fn test_parse_openai_response_without_choices() {
        let response = json!({ "error": { "message": "bad request" } });
        let err = OpenAIModel::parse_openai_response(&response).unwrap_err();
        assert!(matches!(
            err,
            MarketError::Model(ModelError::InvalidResponse(_))
        ));
    }
}

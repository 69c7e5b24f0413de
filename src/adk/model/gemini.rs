// SPDX-License-Identifier: MIT

//! Gemini Model - Google's Gemini API implementation

use super::{Content, GenerationConfig, Model, Part};
use crate::adk::error::{MarketError, ModelError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::env;

/// Default model for the Gemini provider
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Google Gemini model implementation
pub struct GeminiModel {
    client: Client,
    api_key: String,
    model_name: String,
}

impl GeminiModel {
    /// Create a new GeminiModel
    ///
    /// Reads `GEMINI_API_KEY`, falling back to `GOOGLE_API_KEY`.
    pub fn new(model_name: String) -> Result<Self> {
        let api_key = env::var("GEMINI_API_KEY")
            .or_else(|_| env::var("GOOGLE_API_KEY"))
            .map_err(|_| ModelError::ApiKeyMissing("Gemini (GEMINI_API_KEY)".to_string()))?;
        Ok(Self {
            client: Client::new(),
            api_key,
            model_name,
        })
    }
}

/// Build the generateContent request body
///
/// System messages are lifted into `systemInstruction`; Gemini only accepts
/// `user` and `model` roles in `contents`.
pub fn build_request_body(history: &[Content], config: Option<&GenerationConfig>) -> serde_json::Value {
    let mut system_parts = Vec::new();
    let mut contents = Vec::new();

    for c in history {
        let parts: Vec<serde_json::Value> = c.parts.iter().filter_map(part_to_gemini_json).collect();
        if c.role == "system" {
            system_parts.extend(parts);
        } else {
            contents.push(json!({ "role": c.role, "parts": parts }));
        }
    }

    let mut body = json!({ "contents": contents });

    if !system_parts.is_empty() {
        body["systemInstruction"] = json!({ "parts": system_parts });
    }

    if let Some(cfg) = config {
        let mut generation = serde_json::Map::new();
        if let Some(t) = cfg.temperature {
            generation.insert("temperature".to_string(), json!(t));
        }
        if let Some(m) = cfg.max_output_tokens {
            generation.insert("maxOutputTokens".to_string(), json!(m));
        }
        if let Some(p) = cfg.top_p {
            generation.insert("topP".to_string(), json!(p));
        }
        if let Some(k) = cfg.top_k {
            generation.insert("topK".to_string(), json!(k));
        }
        if !generation.is_empty() {
            body["generationConfig"] = serde_json::Value::Object(generation);
        }
    }

    body
}

/// Serialize a Part to Gemini API JSON format
/// Returns None for parts that shouldn't be sent (e.g., Thinking)
pub fn part_to_gemini_json(part: &Part) -> Option<serde_json::Value> {
    match part {
        Part::Text(t) => Some(json!({ "text": t })),
        Part::Thinking(_) => None,
    }
}

/// Parse a Gemini API JSON part into Parts
pub fn parse_gemini_part(p: &serde_json::Value) -> Vec<Part> {
    let mut parts = Vec::new();

    // Thinking models flag reasoning parts with `thought: true`
    let is_thought = p.get("thought").and_then(|t| t.as_bool()).unwrap_or(false);

    if let Some(text) = p["text"].as_str() {
        if is_thought {
            parts.push(Part::Thinking(text.to_string()));
        } else {
            parts.push(Part::Text(text.to_string()));
        }
    }

    parts
}

/// Parse a full generateContent response
pub fn parse_response(resp_json: &serde_json::Value) -> Result<Content> {
    let candidate = resp_json["candidates"]
        .as_array()
        .and_then(|c| c.first())
        .ok_or_else(|| ModelError::InvalidResponse("No candidates in response".to_string()))?;

    if let Some(finish_reason) = candidate.get("finishReason").and_then(|v| v.as_str()) {
        log::debug!("Gemini finish reason: {}", finish_reason);
        if finish_reason == "SAFETY" {
            return Err(MarketError::api(
                "Gemini",
                "response blocked by safety filters",
            ));
        }
    }

    let parts_json = candidate
        .get("content")
        .and_then(|c| c.get("parts"))
        .and_then(|v| v.as_array())
        .ok_or_else(|| {
            log::error!("No parts in candidate. Full response: {}", resp_json);
            ModelError::InvalidResponse(format!("No content parts in candidate: {}", candidate))
        })?;

    Ok(Content {
        role: "model".to_string(),
        parts: parts_json.iter().flat_map(parse_gemini_part).collect(),
    })
}

#[async_trait]
impl Model for GeminiModel {
    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
    ) -> Result<Content> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
            self.model_name
        );

        let body = build_request_body(history, config);

        log::debug!(
            "Gemini request body: {}",
            serde_json::to_string_pretty(&body).unwrap_or_default()
        );

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await?;
            return Err(MarketError::api("Gemini", format!("{}: {}", status, text)));
        }

        let resp_json: serde_json::Value = resp.json().await?;
        log::debug!("Gemini response: {}", resp_json);

        parse_response(&resp_json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serialize_text_part() {
        let part = Part::Text("Hello world".to_string());
        let json = part_to_gemini_json(&part).unwrap();
        assert_eq!(json, json!({ "text": "Hello world" }));
    }

    #[test]
    fn test_serialize_thinking_part_returns_none() {
        let part = Part::Thinking("Internal reasoning".to_string());
        assert!(part_to_gemini_json(&part).is_none());
    }

    #[test]
    fn test_system_message_becomes_system_instruction() {
        let history = vec![
            Content::text("system", "You are a reviewer."),
            Content::text("user", "Review this"),
        ];
        let body = build_request_body(&history, None);

        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "You are a reviewer.");
        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0]["role"], "user");
        assert!(body.get("generationConfig").is_none());
    }

    #[test]
    fn test_generation_config_is_camel_cased() {
        let config = GenerationConfig {
            temperature: Some(0.7),
            max_output_tokens: Some(2048),
            ..Default::default()
        };
        let body = build_request_body(&[Content::text("user", "hi")], Some(&config));

        assert_eq!(body["generationConfig"]["temperature"], json!(0.7f32));
        assert_eq!(body["generationConfig"]["maxOutputTokens"], json!(2048));
        assert!(body["generationConfig"].get("topK").is_none());
    }

    #[test]
    fn test_parse_thought_part() {
        let json = json!({ "text": "Let me think about this...", "thought": true });
        let parts = parse_gemini_part(&json);

        assert_eq!(parts.len(), 1);
        match &parts[0] {
            Part::Thinking(t) => assert_eq!(t, "Let me think about this..."),
            _ => panic!("Expected Thinking part"),
        }
    }

    #[test]
    fn test_parse_response_collects_text() {
        let resp = json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        { "text": "reasoning", "thought": true },
                        { "text": "REJECTED Too generic" }
                    ]
                },
                "finishReason": "STOP"
            }]
        });

        let content = parse_response(&resp).unwrap();
        assert_eq!(content.parts.len(), 2);
        assert_eq!(content.text_output(), "REJECTED Too generic");
    }

    #[test]
    fn test_parse_response_safety_block() {
        let resp = json!({
            "candidates": [{ "finishReason": "SAFETY" }]
        });
        let err = parse_response(&resp).unwrap_err();
        assert!(matches!(err, MarketError::Api { .. }));
    }

    #[test]
    fn test_parse_response_without_candidates() {
        let err = parse_response(&json!({})).unwrap_err();
        assert!(matches!(
            err,
            MarketError::Model(ModelError::InvalidResponse(_))
        ));
    }
}

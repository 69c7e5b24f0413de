// SPDX-License-Identifier: MIT

//! Web search capability used by the researcher stage
//!
//! [`BraveSearchTool`] is used when `BRAVE_API_KEY` is set; otherwise
//! [`DuckDuckGoSearchTool`] queries the keyless Instant Answer API.

use crate::adk::error::{MarketError, Result};
use crate::adk::tool::Tool;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::env;
use std::sync::Arc;

// --- Static schema ---

static SEARCH_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "description": "The search query"
            },
            "count": {
                "type": "integer",
                "description": "Number of results to return (default 10, max 20)"
            },
            "freshness": {
                "type": "string",
                "description": "Freshness filter: pd (past day), pw (past week), pm (past month), py (past year)"
            }
        },
        "required": ["query"]
    })
});

/// Brave wraps matched terms in `<strong>` and escapes entities
static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("tag pattern is valid"));

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchArgs {
    pub query: String,
    #[serde(default)]
    pub count: Option<u32>,
    #[serde(default)]
    pub freshness: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub query: String,
}

/// Pick the best available search backend
pub fn create_search_tool() -> Arc<dyn Tool> {
    match BraveSearchTool::new() {
        Ok(tool) => {
            log::info!("Registered tool: brave_search");
            Arc::new(tool)
        }
        Err(e) => {
            log::warn!("Brave search unavailable ({}), using DuckDuckGo", e);
            Arc::new(DuckDuckGoSearchTool::new())
        }
    }
}

/// Render a search tool's output as plain text for prompts
pub fn results_to_text(output: &Value) -> String {
    if let Some(s) = output.as_str() {
        return s.to_string();
    }

    match serde_json::from_value::<SearchResponse>(output.clone()) {
        Ok(resp) if resp.results.is_empty() => format!("No results found for: {}", resp.query),
        Ok(resp) => resp
            .results
            .iter()
            .map(|r| {
                let mut line = format!("{}: {}", r.title, r.description);
                if let Some(age) = &r.age {
                    line.push_str(&format!(" [{}]", age));
                }
                if !r.url.is_empty() {
                    line.push_str(&format!(" ({})", r.url));
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Err(_) => output.to_string(),
    }
}

pub struct BraveSearchTool {
    client: Client,
    api_key: String,
}

impl BraveSearchTool {
    pub fn new() -> Result<Self> {
        let api_key = env::var("BRAVE_API_KEY")
            .map_err(|_| MarketError::config("BRAVE_API_KEY must be set"))?;
        Ok(Self {
            client: Client::new(),
            api_key,
        })
    }

    /// Map a `web/search` payload to results, dropping entries without a title
    pub fn parse_web_results(body: &Value) -> Vec<SearchResult> {
        let text = |v: &Value| -> String {
            let raw = v.as_str().unwrap_or_default();
            HTML_TAG
                .replace_all(raw, "")
                .replace("&amp;", "&")
                .replace("&quot;", "\"")
                .replace("&#x27;", "'")
                .trim()
                .to_string()
        };

        body["web"]["results"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        let title = text(&item["title"]);
                        if title.is_empty() {
                            return None;
                        }
                        Some(SearchResult {
                            title,
                            url: item["url"].as_str().unwrap_or_default().to_string(),
                            description: text(&item["description"]),
                            age: item["age"]
                                .as_str()
                                .or_else(|| item["page_age"].as_str())
                                .map(str::to_string),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl Tool for BraveSearchTool {
    fn name(&self) -> &str {
        "brave_search"
    }

    fn description(&self) -> &str {
        "Searches the web using Brave Search API. Returns relevant search results with titles, URLs, and descriptions."
    }

    fn schema(&self) -> &Value {
        &SEARCH_SCHEMA
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let args: SearchArgs = serde_json::from_value(input)?;

        let count = args.count.unwrap_or(10).min(20);

        let mut url = reqwest::Url::parse("https://api.search.brave.com/res/v1/web/search")
            .map_err(|e| MarketError::other(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("q", &args.query)
            .append_pair("count", &count.to_string());

        if let Some(freshness) = &args.freshness {
            url.query_pairs_mut().append_pair("freshness", freshness);
        }

        let resp = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .send()
            .await?;

        if !resp.status().is_success() {
            let text = resp.text().await?;
            return Err(MarketError::api("Brave", text));
        }

        let body: Value = resp.json().await?;
        let results = Self::parse_web_results(&body);
        log::debug!("Brave returned {} results for '{}'", results.len(), args.query);

        Ok(serde_json::to_value(SearchResponse {
            results,
            query: args.query,
        })?)
    }
}

/// Keyless search over DuckDuckGo's Instant Answer API
pub struct DuckDuckGoSearchTool {
    client: Client,
    endpoint: String,
}

impl DuckDuckGoSearchTool {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            endpoint: "https://api.duckduckgo.com/".to_string(),
        }
    }

    /// Flatten an Instant Answer payload into search results
    pub fn parse_instant_answer(body: &Value, limit: usize) -> Vec<SearchResult> {
        let mut results = Vec::new();

        if let Some(text) = body["AbstractText"].as_str().filter(|t| !t.is_empty()) {
            results.push(SearchResult {
                title: body["Heading"].as_str().unwrap_or_default().to_string(),
                url: body["AbstractURL"].as_str().unwrap_or_default().to_string(),
                description: text.to_string(),
                age: None,
            });
        }

        let mut stack: Vec<&Value> = body["RelatedTopics"]
            .as_array()
            .map(|topics| topics.iter().rev().collect())
            .unwrap_or_default();

        while let Some(topic) = stack.pop() {
            if results.len() >= limit {
                break;
            }
            // Grouped topics nest their entries under "Topics"
            if let Some(nested) = topic["Topics"].as_array() {
                stack.extend(nested.iter().rev());
                continue;
            }
            if let Some(text) = topic["Text"].as_str() {
                let title = text.split(" - ").next().unwrap_or(text).to_string();
                results.push(SearchResult {
                    title,
                    url: topic["FirstURL"].as_str().unwrap_or_default().to_string(),
                    description: text.to_string(),
                    age: None,
                });
            }
        }

        results.truncate(limit);
        results
    }
}

impl Default for DuckDuckGoSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for DuckDuckGoSearchTool {
    fn name(&self) -> &str {
        "duckduckgo_search"
    }

    fn description(&self) -> &str {
        "Searches DuckDuckGo instant answers. Returns related topics with titles, URLs, and descriptions."
    }

    fn schema(&self) -> &Value {
        &SEARCH_SCHEMA
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let args: SearchArgs = serde_json::from_value(input)?;
        let limit = args.count.unwrap_or(10).min(20) as usize;

        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("q", args.query.as_str()),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let text = resp.text().await?;
            return Err(MarketError::api("DuckDuckGo", text));
        }

        // The endpoint answers with `application/x-javascript`, so decode manually
        let body: Value = serde_json::from_str(&resp.text().await?)?;

        Ok(serde_json::to_value(SearchResponse {
            results: Self::parse_instant_answer(&body, limit),
            query: args.query,
        })?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_results_to_text_formats_lines() {
        let output = json!({
            "query": "solar",
            "results": [
                { "title": "Solar boom", "url": "https://a.example", "description": "Capacity up 30%", "age": "2 days ago" },
                { "title": "Panels", "url": "", "description": "Prices fall" }
            ]
        });
        let text = results_to_text(&output);
        assert_eq!(
            text,
            "Solar boom: Capacity up 30% [2 days ago] (https://a.example)\nPanels: Prices fall"
        );
    }

    #[test]
    fn test_results_to_text_empty_and_plain() {
        let empty = json!({ "query": "nothing", "results": [] });
        assert_eq!(results_to_text(&empty), "No results found for: nothing");
        assert_eq!(results_to_text(&json!("raw text")), "raw text");
    }

    #[test]
    fn test_brave_payload_maps_to_prompt_text() {
        let body = json!({
            "type": "search",
            "web": {
                "results": [
                    {
                        "title": "<strong>Solar</strong> installs hit record",
                        "url": "https://news.example/solar",
                        "description": "Capacity grew 24% &amp; prices fell",
                        "age": "3 days ago"
                    },
                    {
                        "title": "Wind outlook",
                        "url": "https://news.example/wind",
                        "description": "Offshore slows",
                        "page_age": "2025-01-04T00:00:00"
                    },
                    { "url": "https://news.example/untitled", "description": "no title" }
                ]
            }
        });

        let results = BraveSearchTool::parse_web_results(&body);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "Solar installs hit record");
        assert_eq!(results[1].age.as_deref(), Some("2025-01-04T00:00:00"));

        let output = serde_json::to_value(SearchResponse {
            results,
            query: "solar".to_string(),
        })
        .unwrap();
        assert_eq!(
            results_to_text(&output),
            "Solar installs hit record: Capacity grew 24% & prices fell [3 days ago] (https://news.example/solar)\n\
             Wind outlook: Offshore slows [2025-01-04T00:00:00] (https://news.example/wind)"
        );
    }

    #[test]
    fn test_brave_payload_without_web_section_is_empty() {
        assert!(BraveSearchTool::parse_web_results(&json!({ "type": "search" })).is_empty());
    }

    #[test]
    fn test_parse_instant_answer_flattens_topics() {
        let body = json!({
            "Heading": "Renewable energy",
            "AbstractText": "Energy from renewable resources.",
            "AbstractURL": "https://en.wikipedia.org/wiki/Renewable_energy",
            "RelatedTopics": [
                { "Text": "Solar power - Conversion of sunlight", "FirstURL": "https://duckduckgo.com/Solar_power" },
                { "Name": "Policy", "Topics": [
                    { "Text": "Feed-in tariff - A policy mechanism", "FirstURL": "https://duckduckgo.com/FIT" }
                ]},
                { "Text": "Wind power - Use of wind energy", "FirstURL": "https://duckduckgo.com/Wind_power" }
            ]
        });

        let results = DuckDuckGoSearchTool::parse_instant_answer(&body, 10);
        let titles: Vec<&str> = results.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["Renewable energy", "Solar power", "Feed-in tariff", "Wind power"]
        );

        let limited = DuckDuckGoSearchTool::parse_instant_answer(&body, 2);
        assert_eq!(limited.len(), 2);
    }
}

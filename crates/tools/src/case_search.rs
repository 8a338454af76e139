//! Case search tool — semantic retrieval over indexed case documents.
//!
//! Queries the external vector-search service and returns the top matches.
//! The service is the only network dependency the workers have; its
//! timeout is enforced here so a stalled search surfaces as a tool
//! failure the model can route around.

use async_trait::async_trait;
use serde::Deserialize;
use themis_config::SearchConfig;
use themis_core::error::ToolError;
use themis_core::tool::{Tool, ToolResponse};
use tracing::debug;

pub struct CaseSearchTool {
    base_url: String,
    collection: String,
    timeout_secs: u64,
    max_results: usize,
    client: reqwest::Client,
}

impl CaseSearchTool {
    pub fn new(
        base_url: impl Into<String>,
        collection: impl Into<String>,
        timeout_secs: u64,
        max_results: usize,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
            timeout_secs,
            max_results,
            client,
        }
    }

    pub fn from_config(config: &SearchConfig) -> Self {
        Self::new(
            &config.base_url,
            &config.collection,
            config.timeout_secs,
            config.max_results,
        )
    }
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    case_id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    score: f64,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[async_trait]
impl Tool for CaseSearchTool {
    fn name(&self) -> &str {
        "search_cases"
    }

    fn description(&self) -> &str {
        "Semantic search over the indexed case documents. Returns the most \
         relevant cases for a natural-language query."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Natural-language search query"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of results to return"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolResponse, ToolError> {
        let query = arguments["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;

        let limit = arguments["limit"]
            .as_u64()
            .map(|n| n as usize)
            .unwrap_or(self.max_results)
            .min(self.max_results);

        debug!(query = %query, limit, "Searching cases");

        let url = format!("{}/search", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "collection": self.collection,
                "query": query,
                "top_k": limit,
            }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ToolError::Timeout {
                        tool_name: "search_cases".into(),
                        timeout_secs: self.timeout_secs,
                    }
                } else {
                    ToolError::ExecutionFailed {
                        tool_name: "search_cases".into(),
                        reason: e.to_string(),
                    }
                }
            })?;

        if !response.status().is_success() {
            return Ok(ToolResponse::fail(format!(
                "Search service returned status {}",
                response.status().as_u16()
            )));
        }

        let parsed: SearchResponse =
            response
                .json()
                .await
                .map_err(|e| ToolError::ExecutionFailed {
                    tool_name: "search_cases".into(),
                    reason: format!("Failed to parse search response: {e}"),
                })?;

        let results: Vec<serde_json::Value> = parsed
            .results
            .into_iter()
            .take(limit)
            .map(|hit| {
                serde_json::json!({
                    "case_id": hit.case_id,
                    "title": hit.title,
                    "snippet": hit.snippet,
                    "score": hit.score,
                })
            })
            .collect();

        Ok(ToolResponse::ok(serde_json::json!({
            "results": results,
            "count": results.len(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_definition() {
        let tool = CaseSearchTool::new("http://127.0.0.1:9200", "case_documents", 30, 30);
        assert_eq!(tool.name(), "search_cases");
        let schema = tool.parameters_schema();
        assert_eq!(schema["required"], serde_json::json!(["query"]));
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let tool = CaseSearchTool::new("http://search.internal/", "case_documents", 30, 30);
        assert_eq!(tool.base_url, "http://search.internal");
    }

    #[tokio::test]
    async fn missing_query_rejected() {
        let tool = CaseSearchTool::new("http://127.0.0.1:9200", "case_documents", 30, 30);
        let result = tool.execute(serde_json::json!({})).await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }

    #[test]
    fn search_response_parsing() {
        let data = r#"{
            "results": [
                {"case_id": "2024-0193", "title": "State v. Okafor", "snippet": "bail set at...", "score": 0.91},
                {"case_id": "2024-0211", "title": "State v. Mehta", "score": 0.84}
            ]
        }"#;
        let parsed: SearchResponse = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.results.len(), 2);
        assert_eq!(parsed.results[0].case_id, "2024-0193");
        assert_eq!(parsed.results[1].snippet, "");
    }
}

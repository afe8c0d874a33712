//! Web search for the research agents (Serper API).

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{instrument, warn};

use crate::core::status_line::SUCCESS_MARKER;
use crate::tools::{Tool, ToolOutput, parse_args};

pub struct WebSearchTool {
    base_url: String,
    api_key: String,
    max_results: usize,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SearchInput {
    query: String,
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperResult>,
}

#[derive(Debug, Deserialize)]
struct SerperResult {
    title: String,
    link: String,
    #[serde(default)]
    snippet: String,
}

impl WebSearchTool {
    pub fn new(base_url: &str, api_key: &str, max_results: usize, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            max_results,
            http,
        }
    }

    async fn search(&self, query: &str) -> Result<Vec<SerperResult>, String> {
        let response = self
            .http
            .post(format!("{}/search", self.base_url))
            .header("X-API-KEY", &self.api_key)
            .json(&json!({"q": query, "num": self.max_results}))
            .send()
            .await
            .map_err(|err| err.without_url().to_string())?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("search service returned {}: {}", status.as_u16(), body.trim()));
        }
        let parsed: SerperResponse = response
            .json()
            .await
            .map_err(|err| format!("unexpected search response: {err}"))?;
        Ok(parsed.organic.into_iter().take(self.max_results).collect())
    }
}

fn render_results(query: &str, results: &[SerperResult]) -> String {
    if results.is_empty() {
        return format!("{SUCCESS_MARKER} No results for '{query}'");
    }
    let mut out = format!("{SUCCESS_MARKER} Results for '{query}':");
    for (idx, result) in results.iter().enumerate() {
        out.push_str(&format!(
            "\n{}. {}\n   {}\n   {}",
            idx + 1,
            result.title,
            result.link,
            result.snippet
        ));
    }
    out
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Searches the web and returns the top results (title, link, snippet)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"query": {"type": "string", "description": "Search query"}},
            "required": ["query"],
            "additionalProperties": false
        })
    }

    #[instrument(skip_all, fields(tool = "web_search"))]
    async fn call(&self, args: Value) -> ToolOutput {
        let query = match parse_args::<SearchInput>(args) {
            Ok(input) if !input.query.trim().is_empty() => input.query.trim().to_string(),
            Ok(_) => return ToolOutput::failure("searching the web", "query must not be blank"),
            Err(error) => return ToolOutput::failure("searching the web", &error),
        };
        match self.search(&query).await {
            Ok(results) => ToolOutput::success(render_results(&query, &results)),
            Err(error) => {
                warn!(%error, "web search failed");
                ToolOutput::failure("searching the web", &error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_render_as_numbered_list() {
        let results = vec![SerperResult {
            title: "PCI DSS overview".to_string(),
            link: "https://example.org/pci".to_string(),
            snippet: "Card data rules".to_string(),
        }];
        let text = render_results("pci", &results);
        assert!(text.starts_with("✅ Results for 'pci':"));
        assert!(text.contains("1. PCI DSS overview\n   https://example.org/pci"));
        assert_eq!(render_results("x", &[]), "✅ No results for 'x'");
    }

    #[tokio::test]
    async fn blank_query_is_rejected_without_a_request() {
        let tool = WebSearchTool::new("http://127.0.0.1:9", "key", 5, Duration::from_secs(1));
        let output = tool.call(json!({"query": "  "})).await;
        assert!(!output.ok);
        assert_eq!(output.message, "❌ Error searching the web: query must not be blank");
    }

    mod http {
        use super::super::*;
        use wiremock::matchers::{body_partial_json, header, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        /// Verifies the key header and result limit are sent and extra
        /// results are dropped.
        #[tokio::test]
        async fn search_sends_key_and_limits_results() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/search"))
                .and(header("x-api-key", "serper-key"))
                .and(body_partial_json(json!({"q": "pci dss", "num": 2})))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({"organic": [
                    {"title": "One", "link": "https://a.example", "snippet": "first"},
                    {"title": "Two", "link": "https://b.example"},
                    {"title": "Three", "link": "https://c.example", "snippet": "third"}
                ]})))
                .expect(1)
                .mount(&server)
                .await;
            let tool = WebSearchTool::new(&server.uri(), "serper-key", 2, Duration::from_secs(5));

            let output = tool.call(json!({"query": " pci dss "})).await;

            assert!(output.ok, "{}", output.message);
            assert!(output.message.starts_with("✅ Results for 'pci dss':"));
            assert!(output.message.contains("2. Two\n   https://b.example"));
            assert!(!output.message.contains("Three"));
        }

        #[tokio::test]
        async fn rejected_search_is_a_failure_line() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/search"))
                .respond_with(ResponseTemplate::new(403).set_body_string("bad key"))
                .mount(&server)
                .await;
            let tool = WebSearchTool::new(&server.uri(), "wrong", 5, Duration::from_secs(5));

            let output = tool.call(json!({"query": "pci"})).await;

            assert!(!output.ok);
            assert_eq!(
                output.message,
                "❌ Error searching the web: search service returned 403: bad key"
            );
        }
    }
}

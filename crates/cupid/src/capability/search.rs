//! Web search backed by the Brave Search API.

use std::fmt::Write;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{Capability, CapabilityError, CapabilityKind, CapabilityResult};
use crate::llm::ToolDefinition;

pub const SEARCH_CAPABILITY: &str = "search";

const BRAVE_ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";
const MAX_COUNT: usize = 20;

pub struct SearchCapability {
    client: reqwest::Client,
    api_key: Option<String>,
    default_count: usize,
}

impl SearchCapability {
    /// Build the capability. Without a key it stays registered (so the model
    /// still sees it) but every call reports the capability as unavailable.
    pub fn new(client: reqwest::Client, api_key: Option<String>, default_count: usize) -> Self {
        Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            default_count: default_count.clamp(1, MAX_COUNT),
        }
    }

    /// Read the key from the named environment variable.
    pub fn from_env(api_key_env: &str, default_count: usize) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self::new(client, std::env::var(api_key_env).ok(), default_count))
    }
}

#[async_trait]
impl Capability for SearchCapability {
    fn name(&self) -> &str {
        SEARCH_CAPABILITY
    }

    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Search
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            SEARCH_CAPABILITY,
            "Search the web for recent advice, psychology research and real couples' experiences. \
             Returns titles, URLs and snippets to cite.",
            json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Short search query, e.g. \"情侣吵架冷战怎么解决 心理学\""
                    },
                    "count": {
                        "type": "integer",
                        "description": "Number of results (1-20, default 5)"
                    }
                },
                "required": ["query"]
            }),
        )
    }

    async fn invoke(&self, arguments: &Value) -> Result<CapabilityResult, CapabilityError> {
        let args: SearchArgs = serde_json::from_value(arguments.clone())
            .map_err(|e| CapabilityError::InvalidArguments(e.to_string()))?;
        if args.query.trim().is_empty() {
            return Err(CapabilityError::InvalidArguments("query is empty".to_string()));
        }

        let Some(api_key) = &self.api_key else {
            return Err(CapabilityError::Unavailable(
                "search API key is not configured".to_string(),
            ));
        };

        let count = args
            .count
            .unwrap_or(self.default_count)
            .clamp(1, MAX_COUNT)
            .to_string();
        let response = self
            .client
            .get(BRAVE_ENDPOINT)
            .query(&[("q", args.query.as_str()), ("count", count.as_str())])
            .header("X-Subscription-Token", api_key)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| CapabilityError::Failed(format!("search request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CapabilityError::Failed(format!(
                "search API error ({status}): {body}"
            )));
        }

        let body: BraveResponse = response
            .json()
            .await
            .map_err(|e| CapabilityError::Failed(format!("unreadable search response: {e}")))?;

        let results = body.web.map(|w| w.results).unwrap_or_default();
        Ok(CapabilityResult::text(format_results(&results)))
    }
}

fn format_results(results: &[WebResult]) -> String {
    if results.is_empty() {
        return "No results found.".to_string();
    }

    let mut out = String::new();
    for (i, result) in results.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}. {}\n   {}\n   {}\n",
            i + 1,
            result.title,
            result.url,
            result.description.as_deref().unwrap_or("")
        );
    }
    out
}

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
    count: Option<usize>,
}

#[derive(Deserialize)]
struct BraveResponse {
    web: Option<WebResults>,
}

#[derive(Deserialize)]
struct WebResults {
    results: Vec<WebResult>,
}

#[derive(Deserialize)]
struct WebResult {
    title: String,
    url: String,
    description: Option<String>,
}

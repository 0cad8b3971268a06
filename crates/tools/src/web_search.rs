//! Web search tool: deterministic offline results.
//!
//! Returns canned results about inference engines and accelerators so the
//! agent can be exercised without network access.

use async_trait::async_trait;
use cpmagent_core::error::ToolError;
use cpmagent_core::tool::{Tool, ToolResult};
use serde::Serialize;

pub struct WebSearchTool;

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for information about models, inference engines and hardware. Returns titles, URLs and snippets."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "num_results": {
                    "type": "integer",
                    "description": "Number of results to return (default 3, max 5)",
                    "default": 3
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = arguments["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;

        let num_results = arguments["num_results"].as_u64().unwrap_or(3).clamp(1, 5) as usize;
        let results = search(query, num_results);

        let data = serde_json::to_value(&results).map_err(|e| ToolError::ExecutionFailed {
            tool_name: "web_search".into(),
            reason: e.to_string(),
        })?;

        let output = serde_json::to_string_pretty(&data).unwrap_or_default();
        Ok(ToolResult {
            output,
            ..ToolResult::json(data)
        })
    }
}

#[derive(Debug, Clone, Serialize)]
struct SearchResult {
    title: String,
    url: String,
    snippet: String,
}

impl SearchResult {
    fn new(title: &str, url: &str, snippet: &str) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            snippet: snippet.into(),
        }
    }
}

fn search(query: &str, count: usize) -> Vec<SearchResult> {
    let q = query.to_lowercase();

    let topical: &[(&str, fn() -> Vec<SearchResult>)] = &[
        ("vllm", || {
            vec![
                SearchResult::new(
                    "vLLM documentation",
                    "https://docs.vllm.ai/",
                    "vLLM is a high-throughput serving engine with PagedAttention, continuous batching and chunked prefill.",
                ),
                SearchResult::new(
                    "vLLM parallelism and scaling",
                    "https://docs.vllm.ai/en/latest/serving/distributed_serving.html",
                    "Tensor, pipeline and expert parallelism options for multi-GPU serving.",
                ),
            ]
        }),
        ("tensorrt", || {
            vec![SearchResult::new(
                "TensorRT-LLM",
                "https://github.com/NVIDIA/TensorRT-LLM",
                "NVIDIA's library for optimized LLM inference with in-flight batching and FP8 kernels.",
            )]
        }),
        ("h800", || {
            vec![SearchResult::new(
                "NVIDIA H800 Tensor Core GPU",
                "https://www.nvidia.com/en-us/data-center/h100/",
                "Hopper-generation accelerator with reduced NVLink bandwidth compared with H100.",
            )]
        }),
    ];

    for (keyword, results) in topical {
        if q.contains(keyword) {
            return results().into_iter().take(count).collect();
        }
    }

    (0..count)
        .map(|i| SearchResult {
            title: format!("Result {} for: {}", i + 1, query),
            url: format!("https://example.com/search?q={}&p={}", query.replace(' ', "+"), i + 1),
            snippet: format!("Offline search result for '{query}'."),
        })
        .collect()
}

//! Tool-calling chat agent.
//!
//! One conversation: the model either answers or asks for tools, either
//! natively or through a tagged `<tool_call>` block in its text. Tool
//! results are fed back until the model answers or the iteration limit is
//! reached. Performance records returned along the way are collected and
//! summarized.

use cpmagent_config::AgentConfig;
use cpmagent_core::error::Result;
use cpmagent_core::message::Message;
use cpmagent_core::prompt::{PromptLibrary, names};
use cpmagent_core::provider::ToolDefinition;
use cpmagent_core::tool::{ToolCall, ToolRegistry};
use cpmagent_tools::{PERFORMANCE_TOOL, PerformanceRecord};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::extractor;
use crate::generator::Generator;

/// Shown when no records were found and the model said nothing.
pub const NO_PERFORMANCE_DATA: &str = "No performance data found.";

/// The result of one chat.
#[derive(Debug, Clone, Serialize)]
pub struct ChatOutcome {
    /// Summary when records were found, otherwise the model's answer.
    pub response: String,
    pub performance_data: Vec<PerformanceRecord>,
    pub tool_calls_made: usize,
    /// Number of model calls.
    pub iterations: usize,
    #[serde(skip)]
    pub messages: Vec<Message>,
}

pub struct ToolAgent {
    generator: Generator,
    prompts: Arc<PromptLibrary>,
    tools: Arc<ToolRegistry>,
    max_iterations: usize,
}

impl ToolAgent {
    pub fn new(generator: Generator, prompts: Arc<PromptLibrary>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            generator,
            prompts,
            tools,
            max_iterations: 5,
        }
    }

    pub fn from_config(
        generator: Generator,
        prompts: Arc<PromptLibrary>,
        tools: Arc<ToolRegistry>,
        config: &AgentConfig,
    ) -> Self {
        Self::new(generator, prompts, tools).with_max_iterations(config.max_tool_iterations)
    }

    /// Set the maximum number of model calls per chat.
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn generator(&self) -> &Generator {
        &self.generator
    }

    fn system_prompt(&self, definitions: &[ToolDefinition]) -> Result<String> {
        let catalog = definitions
            .iter()
            .map(|d| format!("- {}: {}\n  parameters: {}", d.name, d.description, d.parameters))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(self.prompts.render(names::TOOL_SYSTEM, &[("tools", &catalog)])?)
    }

    pub async fn chat(&self, user_message: &str) -> Result<ChatOutcome> {
        let definitions = self.tools.definitions();
        let mut messages = vec![
            Message::system(self.system_prompt(&definitions)?),
            Message::user(user_message),
        ];

        let mut records: Vec<PerformanceRecord> = Vec::new();
        let mut tool_calls_made = 0usize;
        let mut iterations = 0usize;
        let mut final_text = String::new();

        info!(model = self.generator.model(), max_iter = self.max_iterations, "Tool chat starting");

        loop {
            if iterations >= self.max_iterations {
                warn!("Tool chat: max iterations reached ({})", self.max_iterations);
                break;
            }
            iterations += 1;

            let mut request = self.generator.request(messages.clone());
            request.tools = definitions.clone();
            let response = self.generator.provider().complete(request).await?;

            let mut reply = response.message;
            // Native calls win; otherwise look for a tagged block in the text.
            if reply.tool_calls.is_empty() {
                extractor::apply(&mut reply);
            }

            if reply.tool_calls.is_empty() {
                final_text = reply.content.trim().to_string();
                messages.push(reply);
                break;
            }

            let calls = reply.tool_calls.clone();
            final_text = reply.content.trim().to_string();
            messages.push(reply);

            for tc in &calls {
                tool_calls_made += 1;
                let call = ToolCall::from_message_call(tc);
                debug!(tool = %call.name, id = %call.id, "Dispatching tool call");

                let content = match self.tools.execute(&call).await {
                    Ok(result) => {
                        if call.name == PERFORMANCE_TOOL
                            && result.success
                            && let Some(data) = &result.data
                        {
                            match serde_json::from_value::<Vec<PerformanceRecord>>(data.clone()) {
                                Ok(found) => records.extend(found),
                                Err(e) => warn!("Unexpected performance data shape: {e}"),
                            }
                        }
                        result.output
                    }
                    Err(e) => {
                        warn!(tool = %call.name, error = %e, "Tool call failed");
                        format!("Error: {e}")
                    }
                };

                messages.push(Message::tool_result(&tc.id, content));
            }
        }

        let response = summarize(&records, &final_text);
        info!(
            iterations,
            tool_calls = tool_calls_made,
            records = records.len(),
            "Tool chat completed"
        );

        Ok(ChatOutcome {
            response,
            performance_data: records,
            tool_calls_made,
            iterations,
            messages,
        })
    }
}

/// One-line summary of the collected records, or the model's own answer.
pub fn summarize(records: &[PerformanceRecord], model_text: &str) -> String {
    let Some(first) = records.first() else {
        return if model_text.is_empty() {
            NO_PERFORMANCE_DATA.to_string()
        } else {
            model_text.to_string()
        };
    };

    let peak = records
        .iter()
        .map(|r| r.throughput)
        .fold(f64::NEG_INFINITY, f64::max);

    format!(
        "Found {} performance configurations for {} on {} using the {} engine; peak throughput {:.2} tokens/sec",
        records.len(),
        first.model_name,
        first.device_type,
        first.engine_name,
        peak
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{
        SequentialMockProvider, make_text_response, make_tool_call, make_tool_call_response,
        tagged_tool_call,
    };
    use cpmagent_config::ToolsConfig;
    use cpmagent_core::message::Role;
    use serde_json::json;

    fn lookup_args() -> serde_json::Value {
        json!({
            "model_name": "Qwen/Qwen3-235B-A22B",
            "engine_name": "vllm",
            "device_type": "nvidia/h800"
        })
    }

    fn agent(provider: Arc<SequentialMockProvider>) -> ToolAgent {
        ToolAgent::new(
            Generator::new(provider, "mock-model"),
            Arc::new(PromptLibrary::builtin()),
            Arc::new(cpmagent_tools::default_registry(&ToolsConfig::default())),
        )
    }

    #[tokio::test]
    async fn tagged_call_is_dispatched_and_summarized() {
        let provider = Arc::new(SequentialMockProvider::texts(&[
            &tagged_tool_call("get_performance_data", lookup_args()),
            "vllm on H800 peaks at 968.73 tokens/sec.",
        ]));
        let outcome = agent(provider.clone()).chat("How fast is Qwen3-235B on H800?").await.unwrap();

        assert_eq!(
            outcome.response,
            "Found 1 performance configurations for Qwen/Qwen3-235B-A22B on nvidia/h800 using the vllm engine; peak throughput 968.73 tokens/sec"
        );
        assert_eq!(outcome.performance_data.len(), 1);
        assert_eq!(outcome.tool_calls_made, 1);
        assert_eq!(outcome.iterations, 2);

        let second = &provider.requests()[1];
        let tool_msg = second.messages.iter().find(|m| m.role == Role::Tool).unwrap();
        assert!(tool_msg.content.contains("968.73"));
        let assistant = second.messages.iter().find(|m| m.role == Role::Assistant).unwrap();
        assert_eq!(assistant.tool_calls.len(), 1);
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some(assistant.tool_calls[0].id.as_str()));
    }

    #[tokio::test]
    async fn native_tool_calls_are_used_as_is() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(vec![make_tool_call("get_performance_data", lookup_args())], ""),
            make_text_response("done"),
        ]));
        let outcome = agent(provider).chat("q").await.unwrap();
        assert_eq!(outcome.performance_data[0].id, 1);
    }

    #[tokio::test]
    async fn plain_answer_is_returned() {
        let provider = Arc::new(SequentialMockProvider::single_text("  I only know about GPUs.  "));
        let outcome = agent(provider.clone()).chat("hello").await.unwrap();

        assert_eq!(outcome.response, "I only know about GPUs.");
        assert!(outcome.performance_data.is_empty());

        let first = &provider.requests()[0];
        assert_eq!(first.messages[0].role, Role::System);
        assert!(first.messages[0].content.contains("get_performance_data"));
        assert_eq!(first.tools.len(), 1);
    }

    #[tokio::test]
    async fn empty_answer_without_records() {
        let provider = Arc::new(SequentialMockProvider::single_text(""));
        let outcome = agent(provider).chat("hello").await.unwrap();
        assert_eq!(outcome.response, NO_PERFORMANCE_DATA);
    }

    #[tokio::test]
    async fn unknown_tool_becomes_error_message() {
        let provider = Arc::new(SequentialMockProvider::texts(&[
            &tagged_tool_call("weather", json!({"city": "Beijing"})),
            "Sorry, I cannot check the weather.",
        ]));
        let outcome = agent(provider.clone()).chat("weather?").await.unwrap();

        assert_eq!(outcome.response, "Sorry, I cannot check the weather.");
        let tool_msg = provider.requests()[1]
            .messages
            .iter()
            .find(|m| m.role == Role::Tool)
            .cloned()
            .unwrap();
        assert!(tool_msg.content.starts_with("Error: "));
        assert!(tool_msg.content.contains("weather"));
    }

    #[tokio::test]
    async fn iteration_limit_is_respected() {
        let call = tagged_tool_call("get_performance_data", json!({"model_name": "x", "engine_name": "y", "device_type": "z"}));
        let provider = Arc::new(SequentialMockProvider::texts(&[&call, &call, &call]));
        let outcome = agent(provider.clone()).with_max_iterations(2).chat("loop").await.unwrap();

        assert_eq!(provider.call_count(), 2);
        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.tool_calls_made, 2);
        assert_eq!(outcome.response, NO_PERFORMANCE_DATA);
    }

    #[test]
    fn summary_reports_peak_throughput() {
        let mut records = cpmagent_tools::performance::lookup("Qwen/Qwen3-235B-A22B", "vllm", "nvidia/h800");
        records.extend(cpmagent_tools::performance::lookup("Qwen/Qwen3-235B-A22B", "vllm", "nvidia/h100"));
        let summary = summarize(&records, "ignored");
        assert!(summary.starts_with("Found 2 performance configurations"));
        assert!(summary.ends_with("peak throughput 1250.45 tokens/sec"));
    }
}

//! Tool-call extractor: pulls a `<tool_call>{...}</tool_call>` block out of
//! model text.
//!
//! Small models rarely emit native tool calls, so they are instructed to
//! write a tagged JSON object instead:
//!
//! ```text
//! <tool_call>{"name": "get_performance_data", "arguments": {"model_name": "..."}}</tool_call>
//! ```
//!
//! Only the first block is parsed. Every block is stripped from the display
//! text. Anything that does not parse cleanly leaves the message untouched.

use cpmagent_core::message::Message;
use cpmagent_core::tool::ToolCall;
use regex_lite::Regex;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

static TOOL_CALL_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<tool_call>(.*?)</tool_call>").expect("tool call pattern is valid")
});

static CALL_SEQ: AtomicU64 = AtomicU64::new(0);

/// A successfully parsed call and the message text with blocks removed.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedCall {
    pub call: ToolCall,
    pub cleaned: String,
}

/// `tool_call_<unix-millis>_<sequence>`, unique within the process.
fn next_call_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let seq = CALL_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("tool_call_{millis}_{seq}")
}

/// Parse the first tagged call in an assistant message.
///
/// Returns `None` for non-assistant messages, text without a block, invalid
/// JSON, or a payload missing a string `name` or an object `arguments`.
pub fn extract(message: &Message) -> Option<ExtractedCall> {
    if !message.is_from_model() {
        return None;
    }

    let captures = TOOL_CALL_BLOCK.captures(&message.content)?;
    let body = captures.get(1)?.as_str().trim();

    let payload: serde_json::Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, "Tool call block is not valid JSON");
            return None;
        }
    };

    let Some(name) = payload.get("name").and_then(|n| n.as_str()) else {
        debug!("Tool call block has no string 'name'");
        return None;
    };
    let Some(arguments) = payload.get("arguments").filter(|a| a.is_object()) else {
        debug!(tool = name, "Tool call block has no object 'arguments'");
        return None;
    };

    let cleaned = TOOL_CALL_BLOCK
        .replace_all(&message.content, "")
        .trim()
        .to_string();

    Some(ExtractedCall {
        call: ToolCall {
            id: next_call_id(),
            name: name.to_string(),
            arguments: arguments.clone(),
        },
        cleaned,
    })
}

/// Extract and rewrite the message in place: cleaned content, call attached.
///
/// On any failure the message is left exactly as it was.
pub fn apply(message: &mut Message) -> Option<ToolCall> {
    let ExtractedCall { call, cleaned } = extract(message)?;
    debug!(tool = %call.name, id = %call.id, "Extracted tagged tool call");
    message.content = cleaned;
    message.tool_calls = vec![call.to_message_call()];
    Some(call)
}

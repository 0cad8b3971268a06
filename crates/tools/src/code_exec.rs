//! Code execution tool: run a short Python or shell snippet with a timeout.
//!
//! A non-zero exit is reported as an unsuccessful result, not an error, so
//! the model can read the traceback and try again.

use async_trait::async_trait;
use cpmagent_core::error::ToolError;
use cpmagent_core::tool::{Tool, ToolResult};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

pub struct CodeExecTool {
    timeout: Duration,
}

impl CodeExecTool {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn command_for(language: &str, code: &str) -> Result<Command, ToolError> {
        let (program, flag) = match language {
            "python" | "python3" | "py" => ("python3", "-c"),
            "shell" | "sh" | "bash" => ("sh", "-c"),
            other => {
                return Err(ToolError::InvalidArguments(format!(
                    "Unsupported language '{other}', expected python or shell"
                )));
            }
        };
        let mut cmd = Command::new(program);
        cmd.args([flag, code]).kill_on_drop(true);
        Ok(cmd)
    }
}

#[async_trait]
impl Tool for CodeExecTool {
    fn name(&self) -> &str {
        "code_exec"
    }

    fn description(&self) -> &str {
        "Run a short Python or shell snippet and return its output. Useful for arithmetic over benchmark numbers."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "language": {
                    "type": "string",
                    "enum": ["python", "shell"],
                    "description": "Interpreter to use"
                },
                "code": {
                    "type": "string",
                    "description": "The source code to run"
                }
            },
            "required": ["language", "code"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let language = arguments["language"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'language' argument".into()))?;
        let code = arguments["code"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'code' argument".into()))?;

        let mut cmd = Self::command_for(language, code)?;
        debug!(language, bytes = code.len(), "Executing code");

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ToolError::ExecutionFailed {
                    tool_name: "code_exec".into(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                return Err(ToolError::Timeout {
                    tool_name: "code_exec".into(),
                    timeout_secs: self.timeout.as_secs(),
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let success = output.status.success();

        let text = if success {
            if stderr.is_empty() {
                stdout.into_owned()
            } else {
                format!("{stdout}\n[stderr]: {stderr}")
            }
        } else {
            let code = output.status.code().unwrap_or(-1);
            warn!(exit_code = code, "Snippet failed");
            format!("[exit code: {code}]\n{stdout}\n{stderr}")
        };

        let text = text.trim();
        Ok(if success { ToolResult::text(text) } else { ToolResult::failure(text) })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn tool() -> CodeExecTool {
        CodeExecTool::new(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn shell_snippet_runs() {
        let result = tool()
            .execute(serde_json::json!({"language": "shell", "code": "echo 968.73"}))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output, "968.73");
    }

    #[tokio::test]
    async fn failing_snippet_is_unsuccessful() {
        let result = tool()
            .execute(serde_json::json!({"language": "sh", "code": "echo oops >&2; exit 3"}))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.output.contains("[exit code: 3]"));
        assert!(result.output.contains("oops"));
    }

    #[tokio::test]
    async fn slow_snippet_times_out() {
        let tool = CodeExecTool::new(Duration::from_millis(200));
        let err = tool
            .execute(serde_json::json!({"language": "shell", "code": "sleep 5"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout { .. }));
    }

    #[tokio::test]
    async fn unknown_language_rejected() {
        let err = tool()
            .execute(serde_json::json!({"language": "cobol", "code": "DISPLAY 1"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}

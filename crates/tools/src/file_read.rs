//! File read tool: read local benchmark notes, logs or configs.

use async_trait::async_trait;
use cpmagent_core::error::ToolError;
use cpmagent_core::tool::{Tool, ToolResult};

use crate::path_guard::validate_path;

/// Files larger than this are truncated in the tool output.
const MAX_OUTPUT_BYTES: usize = 64 * 1024;

pub struct FileReadTool {
    /// Allowed root directories. Empty = allow all.
    allowed_roots: Vec<String>,
    /// Forbidden path prefixes.
    forbidden_paths: Vec<String>,
}

impl FileReadTool {
    pub fn new(allowed_roots: Vec<String>, forbidden_paths: Vec<String>) -> Self {
        Self {
            allowed_roots,
            forbidden_paths,
        }
    }
}

fn truncate_utf8(mut s: String, max: usize) -> String {
    if s.len() <= max {
        return s;
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
    s.push_str("\n[truncated]");
    s
}

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "file_read"
    }

    fn description(&self) -> &str {
        "Read the contents of a text file at the given path."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to read"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let path = arguments["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;

        let resolved = validate_path(path, &self.allowed_roots, &self.forbidden_paths).map_err(|e| {
            ToolError::PermissionDenied {
                tool_name: "file_read".into(),
                reason: e.to_string(),
            }
        })?;

        match tokio::fs::read_to_string(&resolved).await {
            Ok(content) => Ok(ToolResult::text(truncate_utf8(content, MAX_OUTPUT_BYTES))),
            Err(e) => Ok(ToolResult::failure(format!("Failed to read file: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unrestricted() -> FileReadTool {
        FileReadTool::new(vec![], vec![])
    }

    #[tokio::test]
    async fn read_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("bench.txt");
        std::fs::write(&file_path, "h800 throughput 968.73\n").unwrap();

        let result = unrestricted()
            .execute(serde_json::json!({"path": file_path.to_str().unwrap()}))
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.output.contains("968.73"));
    }

    #[tokio::test]
    async fn read_nonexistent_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.txt");
        let result = unrestricted()
            .execute(serde_json::json!({"path": missing.to_str().unwrap()}))
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.output.contains("Failed to read file"));
    }

    #[tokio::test]
    async fn missing_path_argument() {
        let result = unrestricted().execute(serde_json::json!({})).await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }

    #[tokio::test]
    async fn path_outside_roots_denied() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FileReadTool::new(vec![dir.path().to_string_lossy().into_owned()], vec![]);
        let result = tool.execute(serde_json::json!({"path": "../../../etc/passwd"})).await;
        assert!(matches!(result, Err(ToolError::PermissionDenied { .. })));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let s = "é".repeat(10);
        let out = truncate_utf8(s, 5);
        assert!(out.starts_with("éé"));
        assert!(out.ends_with("[truncated]"));
    }
}

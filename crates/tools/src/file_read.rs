//! File read tool — read a text file from the agent's workspace.

use async_trait::async_trait;
use mindthread_core::error::ToolError;
use mindthread_core::tool::{Tool, ToolResult, required_str};
use crate::path::WorkspaceScope;

/// Upper bound on returned text; larger files are cut at a char boundary.
const MAX_READ_BYTES: usize = 64 * 1024;

#[derive(Default)]
pub struct FileReadTool {
    scope: WorkspaceScope,
}

impl FileReadTool {
    /// No workspace restriction.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_workspace(root: impl Into<std::path::PathBuf>) -> Self {
        Self::with_scope(WorkspaceScope::rooted(root))
    }

    pub fn with_scope(scope: WorkspaceScope) -> Self {
        Self { scope }
    }
}

/// Cut `content` to at most `limit` bytes. Returns whether anything was cut.
fn truncate_at_char_boundary(content: &mut String, limit: usize) -> bool {
    if content.len() <= limit {
        return false;
    }
    let mut cut = limit;
    while !content.is_char_boundary(cut) {
        cut -= 1;
    }
    content.truncate(cut);
    true
}

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "file_read"
    }

    fn description(&self) -> &str {
        "Read a text file from the workspace. Use max_bytes to read only the beginning of a large file."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path, relative to the workspace"
                },
                "max_bytes": {
                    "type": "integer",
                    "description": "Return at most this many bytes (default and maximum 65536)"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let path = required_str(&arguments, "path")?;
        let limit = arguments["max_bytes"]
            .as_u64()
            .map_or(MAX_READ_BYTES, |n| (n as usize).clamp(1, MAX_READ_BYTES));

        let resolved = self.scope.resolve(self.name(), path)?;

        let mut content = match tokio::fs::read_to_string(&resolved).await {
            Ok(content) => content,
            Err(e) => return Ok(ToolResult::failed(format!("Failed to read {path}: {e}"))),
        };
        let total_bytes = content.len();
        let truncated = truncate_at_char_boundary(&mut content, limit);

        Ok(ToolResult::ok(content).with_data(serde_json::json!({
            "path": self.scope.display(&resolved),
            "total_bytes": total_bytes,
            "truncated": truncated,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_utf8() {
        let mut s = "héllo".to_string();
        // 'é' spans bytes 1..3; a 2-byte limit must back off to 1
        assert!(truncate_at_char_boundary(&mut s, 2));
        assert_eq!(s, "h");

        let mut short = "ok".to_string();
        assert!(!truncate_at_char_boundary(&mut short, 10));
    }

    #[tokio::test]
    async fn reads_file_relative_to_workspace() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "Alice owns Falcon\n").unwrap();

        let tool = FileReadTool::in_workspace(dir.path());
        let result = tool.execute(serde_json::json!({ "path": "notes.txt" })).await.unwrap();

        assert!(result.success);
        assert_eq!(result.output, "Alice owns Falcon\n");
        let data = result.data.unwrap();
        assert_eq!(data["path"], "notes.txt");
        assert_eq!(data["truncated"], false);
    }

    #[tokio::test]
    async fn max_bytes_limits_output() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("long.txt"), "0123456789").unwrap();

        let tool = FileReadTool::in_workspace(dir.path());
        let result = tool
            .execute(serde_json::json!({ "path": "long.txt", "max_bytes": 4 }))
            .await
            .unwrap();

        assert_eq!(result.output, "0123");
        let data = result.data.unwrap();
        assert_eq!(data["truncated"], true);
        assert_eq!(data["total_bytes"], 10);
    }

    #[tokio::test]
    async fn missing_file_is_an_unsuccessful_result() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FileReadTool::in_workspace(dir.path());
        let result = tool.execute(serde_json::json!({ "path": "missing.txt" })).await.unwrap();

        assert!(!result.success);
        assert!(result.output.starts_with("Failed to read missing.txt"));
    }

    #[tokio::test]
    async fn bad_arguments_and_escapes_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FileReadTool::in_workspace(dir.path());

        let err = tool.execute(serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));

        let err = tool
            .execute(serde_json::json!({ "path": "../../../etc/passwd" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied { .. }));
    }
}

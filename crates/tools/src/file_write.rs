//! File write tool — create, overwrite, or append to workspace files.

use async_trait::async_trait;
use mindthread_core::error::ToolError;
use mindthread_core::tool::{Tool, ToolResult, required_str};
use tokio::io::AsyncWriteExt;
use crate::path::WorkspaceScope;

#[derive(Default)]
pub struct FileWriteTool {
    scope: WorkspaceScope,
}

impl FileWriteTool {
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

async fn write_file(path: &std::path::Path, content: &str, append: bool) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    if !append {
        return tokio::fs::write(path, content).await;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(content.as_bytes()).await?;
    file.flush().await
}

#[async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "file_write"
    }

    fn description(&self) -> &str {
        "Write text to a workspace file, creating parent directories as needed. \
         Overwrites by default; set append to add to the end instead."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path, relative to the workspace"
                },
                "content": {
                    "type": "string",
                    "description": "Text to write"
                },
                "append": {
                    "type": "boolean",
                    "description": "Append instead of overwriting (default false)"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let path = required_str(&arguments, "path")?;
        let content = required_str(&arguments, "content")?;
        let append = arguments["append"].as_bool().unwrap_or(false);

        let resolved = self.scope.resolve(self.name(), path)?;
        let shown = self.scope.display(&resolved);

        match write_file(&resolved, content, append).await {
            Ok(()) => {
                let verb = if append { "Appended" } else { "Wrote" };
                Ok(ToolResult::ok(format!("{verb} {} bytes to {shown}", content.len())).with_data(
                    serde_json::json!({
                        "path": shown,
                        "bytes_written": content.len(),
                        "appended": append,
                    }),
                ))
            }
            Err(e) => Ok(ToolResult::failed(format!("Failed to write {shown}: {e}"))),
        }
    }
}

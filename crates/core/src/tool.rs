//! Tool trait — concrete actions that are exposed through tool-backed
//! capabilities.
//!
//! Tools report bad input or refused access through `ToolError` and
//! ordinary failures (missing file, I/O error) as an unsuccessful
//! [`ToolResult`]. The capability adapter folds both into a
//! `CapabilityResult` with `success = false`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::ToolError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    /// Human-readable output, or the failure message
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            data: None,
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Fetch a required string argument.
pub fn required_str<'a>(arguments: &'a serde_json::Value, key: &str) -> Result<&'a str, ToolError> {
    arguments[key]
        .as_str()
        .ok_or_else(|| ToolError::InvalidArguments(format!("Missing '{key}' argument")))
}

#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name; also used as the capability id.
    fn name(&self) -> &str;

    /// Shown to the model in the tool catalog.
    fn description(&self) -> &str;

    fn parameters_schema(&self) -> serde_json::Value;

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError>;
}

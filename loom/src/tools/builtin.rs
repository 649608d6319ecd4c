//! Builtin tools auto-registered by the runtime: error detail retrieval and
//! out-of-band tool result retrieval.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::error_store::ErrorStore;
use crate::shared_memory::{SharedMemory, SharedNamespace};

use super::{Tool, ToolContext, ToolError, ToolSpec};

pub const TOOL_GET_ERROR_DETAIL: &str = "get_error_detail";
pub const TOOL_GET_TOOL_RESULT: &str = "get_tool_result";

/// Retrieves the full stored record behind an `err_…` id.
///
/// Registered iff an error store is configured, which is what makes the
/// progressive-disclosure error messages actionable.
pub struct GetErrorDetailTool {
    store: Arc<dyn ErrorStore>,
}

impl GetErrorDetailTool {
    pub fn new(store: Arc<dyn ErrorStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for GetErrorDetailTool {
    fn name(&self) -> &str {
        TOOL_GET_ERROR_DETAIL
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_GET_ERROR_DETAIL.to_string(),
            description: Some(
                "Fetch the full details of a previously reported tool error by its error id."
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "required": ["error_id"],
                "properties": {
                    "error_id": {
                        "type": "string",
                        "description": "The err_… id from a failed tool call."
                    }
                }
            }),
        }
    }

    async fn call(
        &self,
        args: serde_json::Value,
        _ctx: &ToolContext,
    ) -> Result<String, ToolError> {
        let error_id = args
            .get("error_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArgs("error_id must be a string".to_string()))?;
        let record = self
            .store
            .get(error_id)
            .await
            .map_err(|e| ToolError::execution(e.to_string()))?;
        serde_json::to_string_pretty(&record).map_err(|e| ToolError::execution(e.to_string()))
    }
}

/// Retrieves a tool result that was too large to inline and was parked in
/// session-scoped shared memory.
pub struct GetToolResultTool {
    shared_memory: Arc<SharedMemory>,
}

impl GetToolResultTool {
    pub fn new(shared_memory: Arc<SharedMemory>) -> Self {
        Self { shared_memory }
    }
}

#[async_trait]
impl Tool for GetToolResultTool {
    fn name(&self) -> &str {
        TOOL_GET_TOOL_RESULT
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_GET_TOOL_RESULT.to_string(),
            description: Some(
                "Fetch a large tool result by the handle given in place of the inline result."
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "required": ["handle"],
                "properties": {
                    "handle": {
                        "type": "string",
                        "description": "The result handle from a previous tool call."
                    }
                }
            }),
        }
    }

    async fn call(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<String, ToolError> {
        let handle = args
            .get("handle")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArgs("handle must be a string".to_string()))?;
        let ns = SharedNamespace::Session(ctx.session_id.clone());
        let bytes = self
            .shared_memory
            .get(&ns, handle)
            .await
            .map_err(|e| ToolError::execution(e.to_string()))?;
        String::from_utf8(bytes)
            .map_err(|e| ToolError::execution(format!("stored result is not UTF-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_store::InMemoryErrorStore;
    use crate::shared_memory::PutOpts;

    /// **Scenario**: get_error_detail returns the full stored payload.
    #[tokio::test]
    async fn error_detail_round_trip() {
        let store = Arc::new(InMemoryErrorStore::new());
        let id = store
            .store("s1", "fetch", json!({"message": "boom", "trace": "long trace"}))
            .await
            .unwrap();

        let tool = GetErrorDetailTool::new(store);
        let ctx = ToolContext::new("a1", "s1");
        let out = tool.call(json!({ "error_id": id }), &ctx).await.unwrap();
        assert!(out.contains("long trace"));
        assert!(out.contains("boom"));
    }

    /// **Scenario**: get_tool_result reads only from the caller's session.
    #[tokio::test]
    async fn tool_result_is_session_scoped() {
        let dir = tempfile::tempdir().unwrap();
        let shared = Arc::new(SharedMemory::with_spill_dir(dir.path()));
        let ns = SharedNamespace::Session("s1".to_string());
        shared
            .put(&ns, "tool_result/c1", b"the big result", PutOpts::default())
            .await
            .unwrap();

        let tool = GetToolResultTool::new(Arc::clone(&shared));
        let ctx = ToolContext::new("a1", "s1");
        let out = tool
            .call(json!({"handle": "tool_result/c1"}), &ctx)
            .await
            .unwrap();
        assert_eq!(out, "the big result");

        let other = ToolContext::new("a1", "other-session");
        assert!(tool
            .call(json!({"handle": "tool_result/c1"}), &other)
            .await
            .is_err());
    }
}

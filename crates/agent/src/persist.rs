//! Storing step outcomes.

use stepwise_core::error::StorageError;
use stepwise_core::plan::Step;
use stepwise_core::protocol::now_millis;
use stepwise_core::storage::{FileRecord, StorageBackend, ToolResultRecord};
use stepwise_core::tool::ToolContent;
use tracing::{debug, warn};

use crate::tool_call::StepOutcome;

/// Save a step's output file (successful results only) and its tool result
/// record (always). A failed file write is logged and does not fail the step.
pub async fn persist_result(
    storage: &dyn StorageBackend,
    outcome: &StepOutcome,
    step: &Step,
    task_uuid: &str,
) -> Result<ToolResultRecord, StorageError> {
    let file_name = &step.result_file_name;
    let (result, mime_type, content) = match outcome.result.item() {
        Some(ToolContent::Text { text }) => {
            let mime = if serde_json::from_str::<serde_json::Value>(text).is_ok() {
                "application/json"
            } else {
                "text/plain"
            };
            (text.clone(), mime.to_string(), text.clone())
        }
        Some(ToolContent::Image { data, mime_type }) => (
            format!("[Image: {file_name}]"),
            mime_type.clone().unwrap_or_else(|| "image/png".to_string()),
            data.clone(),
        ),
        _ => {
            let text = "Unknown tool error".to_string();
            (text.clone(), "text/plain".to_string(), text)
        }
    };
    let now = now_millis();

    if let Some(file_id) = step.result_file_id.as_ref().filter(|_| !outcome.result.is_error) {
        let file = FileRecord {
            id: file_id.clone(),
            name: file_name.clone(),
            mime_type,
            content,
            created_at: now,
        };
        if let Err(e) = upsert_file(storage, file).await {
            warn!(file_id = %file_id, error = %e, "could not save step output file");
        }
    }

    let record = ToolResultRecord {
        id: step.step_uuid.clone(),
        step_id: step.step_id.clone(),
        task_id: task_uuid.to_string(),
        step_goal: step.step_goal.clone(),
        result,
        is_error: outcome.result.is_error,
        result_file: file_name.clone(),
        file_id: step.result_file_id.clone(),
        tool: outcome.tool.clone(),
        should_act: outcome.should_act,
        input: outcome
            .input
            .as_ref()
            .and_then(|call| serde_json::to_value(call).ok()),
        created_at: now,
    };
    let saved = match storage.create_tool_result(record.clone()).await {
        Err(StorageError::Duplicate { .. }) => storage.update_tool_result(record.clone()).await?.unwrap_or(record),
        other => other?,
    };
    debug!(step_uuid = %saved.id, is_error = saved.is_error, "tool result persisted");
    Ok(saved)
}

async fn upsert_file(storage: &dyn StorageBackend, file: FileRecord) -> Result<(), StorageError> {
    match storage.create_file(file.clone()).await {
        Err(StorageError::Duplicate { .. }) => storage.update_file(file).await.map(|_| ()),
        other => other.map(|_| ()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepwise_core::tool::{ToolDefinition, ToolInvocation, ToolResult};
    use stepwise_storage::LocalStorage;

    fn step() -> Step {
        Step {
            step_id: "step-1.1".into(),
            step_uuid: "s1".into(),
            step_goal: "compute".into(),
            result_file_name: "sum".into(),
            result_file_id: Some("f1".into()),
            ..Default::default()
        }
    }

    fn outcome(result: ToolResult) -> StepOutcome {
        StepOutcome {
            result,
            should_act: true,
            input: Some(ToolInvocation {
                id: "c1".into(),
                name: "calculator".into(),
                arguments: serde_json::json!({"code": "return 2+2"}),
            }),
            tool: Some(ToolDefinition {
                name: "calculator".into(),
                description: "math".into(),
                parameters: serde_json::json!({}),
            }),
        }
    }

    #[tokio::test]
    async fn text_result_saves_file_and_record() {
        let storage = LocalStorage::in_memory();
        let record = persist_result(&storage, &outcome(ToolResult::text("4")), &step(), "t1")
            .await
            .unwrap();
        assert_eq!(record.id, "s1");
        assert_eq!(record.task_id, "t1");
        assert_eq!(record.result, "4");
        assert_eq!(record.input.unwrap()["name"], "calculator");

        let file = storage.get_file("f1").await.unwrap().unwrap();
        // "4" parses as JSON
        assert_eq!(file.mime_type, "application/json");
        assert_eq!(file.name, "sum");
    }

    #[tokio::test]
    async fn plain_text_mime() {
        let storage = LocalStorage::in_memory();
        persist_result(&storage, &outcome(ToolResult::text("four")), &step(), "t1")
            .await
            .unwrap();
        assert_eq!(storage.get_file("f1").await.unwrap().unwrap().mime_type, "text/plain");
    }

    #[tokio::test]
    async fn error_result_skips_file() {
        let storage = LocalStorage::in_memory();
        let record = persist_result(&storage, &outcome(ToolResult::error("boom")), &step(), "t1")
            .await
            .unwrap();
        assert!(record.is_error);
        assert!(storage.get_file("f1").await.unwrap().is_none());
        assert!(storage.get_tool_result("s1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn image_result_keeps_data_and_mime() {
        let storage = LocalStorage::in_memory();
        let image = ToolResult::success(ToolContent::Image {
            data: "aGk=".into(),
            mime_type: None,
        });
        let record = persist_result(&storage, &outcome(image), &step(), "t1").await.unwrap();
        assert_eq!(record.result, "[Image: sum]");
        let file = storage.get_file("f1").await.unwrap().unwrap();
        assert_eq!(file.mime_type, "image/png");
        assert_eq!(file.content, "aGk=");
    }

    #[tokio::test]
    async fn rerun_overwrites_record() {
        let storage = LocalStorage::in_memory();
        persist_result(&storage, &outcome(ToolResult::error("boom")), &step(), "t1")
            .await
            .unwrap();
        let record = persist_result(&storage, &outcome(ToolResult::text("4")), &step(), "t1")
            .await
            .unwrap();
        assert!(!record.is_error);
        assert_eq!(storage.list_tool_results().await.unwrap().len(), 1);
    }
}

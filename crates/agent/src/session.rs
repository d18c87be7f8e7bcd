//! Session history: saving finished runs and replaying them.

use serde::{Deserialize, Serialize};
use stepwise_core::error::StorageError;
use stepwise_core::message::Role;
use stepwise_core::plan::Status;
use stepwise_core::protocol::now_millis;
use stepwise_core::state::StateContext;
use stepwise_core::storage::{
    FileMeta, SessionContent, SessionNode, SessionRecord, SessionStep, StorageBackend,
};
use tracing::debug;

/// Render one side of a finished run as a session node.
pub fn build_node(id: &str, role: Role, parent: Option<String>, context: &StateContext) -> SessionNode {
    let mut content = Vec::new();
    if role == Role::User {
        content.push(SessionContent::Text {
            text: context.user_input.clone(),
            attachments: Vec::new(),
        });
    } else {
        if !context.thinking.is_empty() {
            content.push(SessionContent::Thinking {
                text: context.thinking.clone(),
            });
        }
        for task in context.plan.iter().flat_map(|p| &p.tasks) {
            content.push(SessionContent::Task {
                task_uuid: task.task_uuid.clone(),
                task_goal: task.task_goal.clone(),
                status: task.status,
                steps: task
                    .steps
                    .iter()
                    .map(|s| SessionStep {
                        step_uuid: s.step_uuid.clone(),
                        step_goal: s.step_goal.clone(),
                        tool_name: s.tool_name.clone(),
                        status: s.status,
                    })
                    .collect(),
            });
        }
        if let Some(answer) = &context.final_answer {
            content.push(SessionContent::Text {
                text: answer.clone(),
                attachments: context.final_attachments.clone(),
            });
        } else if let Some(error) = &context.error {
            content.push(SessionContent::Text {
                text: error.to_string(),
                attachments: Vec::new(),
            });
        }
    }
    SessionNode {
        id: id.to_string(),
        role,
        parent,
        content,
    }
}

/// Append the user and assistant nodes of a finished run to a session,
/// creating the session on first use.
pub async fn save_history(
    storage: &dyn StorageBackend,
    session_id: &str,
    user_message_id: &str,
    assistant_message_id: &str,
    context: &StateContext,
) -> Result<SessionRecord, StorageError> {
    let existing = storage.get_session(session_id).await?;
    let mut nodes = existing.as_ref().map(|s| s.nodes.clone()).unwrap_or_default();

    let parent = nodes
        .iter()
        .rev()
        .find(|n| n.role == Role::Assistant)
        .map(|n| n.id.clone());
    nodes.push(build_node(user_message_id, Role::User, parent, context));
    nodes.push(build_node(
        assistant_message_id,
        Role::Assistant,
        Some(user_message_id.to_string()),
        context,
    ));
    debug!(session_id, nodes = nodes.len(), "saving session history");

    match existing {
        Some(session) => {
            storage
                .update_session(SessionRecord { nodes, ..session })
                .await
        }
        None => {
            let name = nodes
                .iter()
                .find(|n| n.role == Role::User)
                .and_then(|n| n.content.first())
                .and_then(|c| match c {
                    SessionContent::Text { text, .. } => Some(text.clone()),
                    _ => None,
                })
                .unwrap_or_else(|| session_id.to_string());
            let now = now_millis();
            storage
                .create_session(SessionRecord {
                    id: session_id.to_string(),
                    name,
                    nodes,
                    created_at: now,
                    updated_at: now,
                })
                .await
        }
    }
}

/// A stored session replayed with step results attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub id: String,
    pub nodes: Vec<HistoryNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryNode {
    pub id: String,
    pub role: Role,
    pub parent: Option<String>,
    pub content: Vec<HistoryContent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistoryContent {
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        attachments: Vec<FileMeta>,
    },
    Thinking {
        text: String,
    },
    Task {
        task_uuid: String,
        task_goal: String,
        status: Status,
        steps: Vec<HistoryStep>,
    },
}

/// A step plus what its tool result record says about it. The result fields
/// are empty for steps that never ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryStep {
    pub step_uuid: String,
    pub step_goal: String,
    pub tool_name: String,
    pub status: Status,
    pub step_id: Option<String>,
    pub should_act: Option<bool>,
    pub input: Option<serde_json::Value>,
    pub result: Option<String>,
    pub attachment: Option<FileMeta>,
}

pub async fn load_history(
    storage: &dyn StorageBackend,
    session_id: &str,
) -> Result<Option<HistoryResponse>, StorageError> {
    let Some(session) = storage.get_session(session_id).await? else {
        return Ok(None);
    };

    let mut nodes = Vec::with_capacity(session.nodes.len());
    for node in session.nodes {
        let mut content = Vec::with_capacity(node.content.len());
        for item in node.content {
            content.push(match item {
                SessionContent::Text { text, attachments } => HistoryContent::Text { text, attachments },
                SessionContent::Thinking { text } => HistoryContent::Thinking { text },
                SessionContent::Task {
                    task_uuid,
                    task_goal,
                    status,
                    steps,
                } => {
                    let mut enriched = Vec::with_capacity(steps.len());
                    for step in steps {
                        enriched.push(enrich_step(storage, step).await?);
                    }
                    HistoryContent::Task {
                        task_uuid,
                        task_goal,
                        status,
                        steps: enriched,
                    }
                }
            });
        }
        nodes.push(HistoryNode {
            id: node.id,
            role: node.role,
            parent: node.parent,
            content,
        });
    }
    Ok(Some(HistoryResponse { id: session.id, nodes }))
}

async fn enrich_step(storage: &dyn StorageBackend, step: SessionStep) -> Result<HistoryStep, StorageError> {
    let record = storage.get_tool_result(&step.step_uuid).await?;
    let attachment = match record.as_ref().and_then(|r| r.file_id.as_deref()) {
        Some(file_id) => storage.get_file(file_id).await?.map(|f| f.meta()),
        None => None,
    };
    Ok(HistoryStep {
        step_uuid: step.step_uuid,
        step_goal: step.step_goal,
        tool_name: step.tool_name,
        status: step.status,
        step_id: record.as_ref().map(|r| r.step_id.clone()),
        should_act: record.as_ref().map(|r| r.should_act),
        input: record.as_ref().and_then(|r| r.input.clone()),
        result: record.map(|r| r.result),
        attachment,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub name: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Stored sessions, most recently updated first.
pub async fn list_sessions(storage: &dyn StorageBackend) -> Result<Vec<SessionSummary>, StorageError> {
    let mut sessions: Vec<SessionSummary> = storage
        .list_sessions()
        .await?
        .into_iter()
        .map(|s| SessionSummary {
            id: s.id,
            name: s.name,
            created_at: s.created_at,
            updated_at: s.updated_at,
        })
        .collect();
    sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    Ok(sessions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepwise_core::plan::{Plan, Step, Task};
    use stepwise_core::state::ContextUpdate;
    use stepwise_core::storage::{FileRecord, ToolResultRecord};
    use stepwise_storage::LocalStorage;

    fn finished(input: &str) -> StateContext {
        let plan = Plan {
            tasks: vec![Task {
                task_uuid: "t1".into(),
                task_goal: "add".into(),
                status: Status::Done,
                steps: vec![
                    Step {
                        step_uuid: "s1".into(),
                        step_goal: "compute".into(),
                        tool_name: "calculator".into(),
                        status: Status::Done,
                        ..Default::default()
                    },
                    Step {
                        step_uuid: "s2".into(),
                        step_goal: "never ran".into(),
                        ..Default::default()
                    },
                ],
                ..Default::default()
            }],
        };
        StateContext::new(input).merged(
            ContextUpdate::new()
                .plan(plan)
                .thinking("let me add")
                .final_answer("It is 4")
                .final_attachments(vec![FileMeta {
                    id: "f1".into(),
                    name: "sum".into(),
                    mime_type: "text/plain".into(),
                }]),
        )
    }

    #[test]
    fn assistant_node_layout() {
        let node = build_node("a1", Role::Assistant, Some("u1".into()), &finished("2+2?"));
        assert_eq!(node.content.len(), 3);
        assert!(matches!(node.content[0], SessionContent::Thinking { .. }));
        assert!(matches!(node.content[1], SessionContent::Task { .. }));
        match &node.content[2] {
            SessionContent::Text { text, attachments } => {
                assert_eq!(text, "It is 4");
                assert_eq!(attachments[0].id, "f1");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn second_run_links_to_previous_assistant() {
        let storage = LocalStorage::in_memory();
        let first = save_history(&storage, "sess", "u1", "a1", &finished("2+2?")).await.unwrap();
        assert_eq!(first.name, "2+2?");
        assert_eq!(first.nodes.len(), 2);
        assert_eq!(first.nodes[0].parent, None);
        assert_eq!(first.nodes[1].parent.as_deref(), Some("u1"));

        let second = save_history(&storage, "sess", "u2", "a2", &finished("and 3+3?")).await.unwrap();
        assert_eq!(second.nodes.len(), 4);
        assert_eq!(second.nodes[2].parent.as_deref(), Some("a1"));
        // named after the first message only
        assert_eq!(second.name, "2+2?");
    }

    #[tokio::test]
    async fn history_enriches_steps() {
        let storage = LocalStorage::in_memory();
        storage
            .create_file(FileRecord {
                id: "f1".into(),
                name: "sum".into(),
                mime_type: "application/json".into(),
                content: "4".into(),
                created_at: 0,
            })
            .await
            .unwrap();
        storage
            .create_tool_result(ToolResultRecord {
                id: "s1".into(),
                step_id: "step-1.1".into(),
                task_id: "t1".into(),
                step_goal: "compute".into(),
                result: "4".into(),
                is_error: false,
                result_file: "sum".into(),
                file_id: Some("f1".into()),
                tool: None,
                should_act: true,
                input: Some(serde_json::json!({"name": "calculator"})),
                created_at: 0,
            })
            .await
            .unwrap();
        save_history(&storage, "sess", "u1", "a1", &finished("2+2?")).await.unwrap();

        let history = load_history(&storage, "sess").await.unwrap().unwrap();
        assert_eq!(history.nodes.len(), 2);
        let HistoryContent::Task { steps, .. } = &history.nodes[1].content[1] else {
            panic!("expected task content");
        };
        assert_eq!(steps[0].result.as_deref(), Some("4"));
        assert_eq!(steps[0].should_act, Some(true));
        assert_eq!(steps[0].attachment.as_ref().unwrap().mime_type, "application/json");
        assert!(steps[1].result.is_none());

        assert!(load_history(&storage, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sessions_newest_first() {
        let storage = LocalStorage::in_memory();
        for (id, at) in [("old", 1), ("new", 5), ("mid", 3)] {
            storage
                .create_session(SessionRecord {
                    id: id.into(),
                    name: id.into(),
                    nodes: vec![],
                    created_at: at,
                    updated_at: at,
                })
                .await
                .unwrap();
        }
        let ids: Vec<String> = list_sessions(&storage).await.unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
    }
}

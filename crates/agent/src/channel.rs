//! Output channel of a single run.
//!
//! [`TaskContext`] is the producer half used by the controller. It owns the
//! content-block framing: block indexes, which block is open, and when a
//! `content_block_stop` is due. [`TaskStream`] is the consumer half handed
//! to the caller; dropping it or calling [`TaskStream::cancel`] cancels the
//! run cooperatively.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use stepwise_core::AgentError;
use stepwise_core::plan::{Step, Task};
use stepwise_core::protocol::{
    AgentChunk, BlockKind, ContentBlock, MessageStartInfo, MessageStopInfo, StopReason, now_millis,
};
use stepwise_core::state::AgentState;
use stepwise_core::tool::ToolResult;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::trace;

/// Create a connected producer/consumer pair.
pub fn channel(capacity: usize, parent: impl Into<String>) -> (TaskContext, TaskStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let cancel = CancellationToken::new();
    let ctx = TaskContext {
        tx,
        cancel: cancel.clone(),
        message_id: uuid::Uuid::new_v4().to_string(),
        parent: parent.into(),
        next_index: 0,
        open: None,
    };
    let stream = TaskStream {
        inner: ReceiverStream::new(rx),
        _guard: cancel.clone().drop_guard(),
        cancel,
    };
    (ctx, stream)
}

/// Producer half of a run's output.
#[derive(Debug)]
pub struct TaskContext {
    tx: mpsc::Sender<AgentChunk>,
    cancel: CancellationToken,
    message_id: String,
    parent: String,
    next_index: usize,
    open: Option<(BlockKind, usize)>,
}

impl TaskContext {
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn parent(&self) -> &str {
        &self.parent
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Emit `message_start`.
    pub async fn start(&mut self) -> Result<(), AgentError> {
        let chunk = AgentChunk::MessageStart {
            message: MessageStartInfo {
                id: self.message_id.clone(),
                role: "assistant".into(),
                parent: self.parent.clone(),
                start_timestamp: now_millis(),
                content: Vec::new(),
            },
        };
        self.send(chunk).await
    }

    /// Announce a phase change on the side channel.
    pub async fn status(&mut self, status: AgentState) -> Result<(), AgentError> {
        self.send(AgentChunk::StatusBlock { status }).await
    }

    pub async fn text(&mut self, text: &str) -> Result<(), AgentError> {
        self.write_text(ContentBlock::Text { text: text.to_string() }).await
    }

    pub async fn thinking(&mut self, text: &str) -> Result<(), AgentError> {
        self.write_text(ContentBlock::Thinking { text: text.to_string() }).await
    }

    /// Open a task block carrying the task snapshot.
    pub async fn task_start(&mut self, task: &Task) -> Result<(), AgentError> {
        self.close_block().await?;
        let index = self.open_block(BlockKind::Task);
        self.send(AgentChunk::ContentBlockStart {
            index,
            content_block: ContentBlock::Task(task.clone()),
        })
        .await
    }

    pub async fn task_status(&mut self, task: &Task) -> Result<(), AgentError> {
        self.task_delta(ContentBlock::TaskStatus {
            task_uuid: task.task_uuid.clone(),
            status: task.status,
        })
        .await
    }

    pub async fn tool_use(
        &mut self,
        task: &Task,
        step: &Step,
        input: Option<serde_json::Value>,
        should_act: Option<bool>,
    ) -> Result<(), AgentError> {
        self.task_delta(ContentBlock::ToolUse {
            task_uuid: task.task_uuid.clone(),
            step_uuid: step.step_uuid.clone(),
            input,
            should_act,
        })
        .await
    }

    pub async fn tool_result(&mut self, task: &Task, step: &Step, result: &ToolResult) -> Result<(), AgentError> {
        self.task_delta(ContentBlock::ToolResult {
            task_uuid: task.task_uuid.clone(),
            step_uuid: step.step_uuid.clone(),
            content: result.content.clone(),
            is_error: result.is_error,
        })
        .await
    }

    /// Step-level payload. Goes into the open task block, or opens one.
    pub async fn task_delta(&mut self, block: ContentBlock) -> Result<(), AgentError> {
        match self.open_index(block.kind()) {
            Some(index) => self.send(AgentChunk::ContentBlockDelta { index, content_block: block }).await,
            None => {
                self.close_block().await?;
                let index = self.open_block(block.kind());
                self.send(AgentChunk::ContentBlockStart { index, content_block: block }).await
            }
        }
    }

    /// Close the open block, if any. Closing twice emits nothing.
    pub async fn close_block(&mut self) -> Result<(), AgentError> {
        let Some((_, index)) = self.open.take() else {
            return Ok(());
        };
        self.send(AgentChunk::ContentBlockStop {
            index,
            stop_timestamp: now_millis(),
        })
        .await
    }

    /// Close any open block and emit `message_stop`.
    pub async fn finish(&mut self, stop_reason: StopReason) -> Result<(), AgentError> {
        self.close_block().await?;
        let chunk = AgentChunk::MessageStop {
            message: MessageStopInfo {
                id: self.message_id.clone(),
                stop_reason,
            },
        };
        self.send(chunk).await
    }

    /// Best-effort `message_stop` after cancellation. Never waits.
    pub fn abort(&mut self) {
        self.open = None;
        let _ = self.tx.try_send(AgentChunk::MessageStop {
            message: MessageStopInfo {
                id: self.message_id.clone(),
                stop_reason: StopReason::Error,
            },
        });
    }

    /// Text and thinking open their block with an empty payload, then
    /// stream deltas into it.
    async fn write_text(&mut self, block: ContentBlock) -> Result<(), AgentError> {
        let kind = block.kind();
        let index = match self.open_index(kind) {
            Some(index) => index,
            None => {
                self.close_block().await?;
                let index = self.open_block(kind);
                let empty = match kind {
                    BlockKind::Thinking => ContentBlock::Thinking { text: String::new() },
                    _ => ContentBlock::Text { text: String::new() },
                };
                self.send(AgentChunk::ContentBlockStart {
                    index,
                    content_block: empty,
                })
                .await?;
                index
            }
        };
        let empty = matches!(&block, ContentBlock::Text { text } | ContentBlock::Thinking { text } if text.is_empty());
        if empty {
            return Ok(());
        }
        self.send(AgentChunk::ContentBlockDelta {
            index,
            content_block: block,
        })
        .await
    }

    /// Index of the open block if it is of `kind`.
    fn open_index(&self, kind: BlockKind) -> Option<usize> {
        self.open.filter(|(open, _)| *open == kind).map(|(_, index)| index)
    }

    fn open_block(&mut self, kind: BlockKind) -> usize {
        let index = self.next_index;
        self.next_index += 1;
        self.open = Some((kind, index));
        index
    }

    async fn send(&self, chunk: AgentChunk) -> Result<(), AgentError> {
        if self.cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        trace!(message_id = %self.message_id, ?chunk, "emit");
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(AgentError::Cancelled),
            sent = self.tx.send(chunk) => sent.map_err(|_| AgentError::StreamClosed),
        }
    }
}

/// Consumer half of a run's output, in emission order.
#[derive(Debug)]
pub struct TaskStream {
    inner: ReceiverStream<AgentChunk>,
    cancel: CancellationToken,
    _guard: DropGuard,
}

impl TaskStream {
    /// Ask the run to stop. Chunks already queued can still be read.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Stream for TaskStream {
    type Item = AgentChunk;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

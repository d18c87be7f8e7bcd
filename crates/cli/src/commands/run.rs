//! `stepwise run`: carry out one goal and stream its chunks.

use std::io::Write;
use std::path::Path;

use futures::StreamExt;
use stepwise_agent::TaskRequest;
use stepwise_core::protocol::{AgentChunk, StopReason};

use crate::wiring;

pub async fn run(config: Option<&Path>, goal: String, session: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = wiring::load_config(config)?;
    let service = wiring::service(&config);

    let mut request = TaskRequest::new(goal);
    request.session_id = session;
    let mut stream = service.task_stream(request);

    let stdout = std::io::stdout();
    let mut stop_reason = None;
    loop {
        let chunk = tokio::select! {
            chunk = stream.next() => chunk,
            _ = tokio::signal::ctrl_c() => {
                stream.cancel();
                continue;
            }
        };
        let Some(chunk) = chunk else { break };
        if let AgentChunk::MessageStop { message } = &chunk {
            stop_reason = Some(message.stop_reason);
        }
        let mut out = stdout.lock();
        writeln!(out, "{}", serde_json::to_string(&chunk)?)?;
        out.flush()?;
    }

    match stop_reason {
        Some(StopReason::Success) => Ok(()),
        Some(StopReason::Error) => Err("run ended with an error".into()),
        None => Err("run ended without a final message".into()),
    }
}

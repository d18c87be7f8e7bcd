//! Test doubles shared by the tool tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use stepwise_core::error::{Error, ProviderError};
use stepwise_core::message::Message;
use stepwise_core::provider::TextGenerator;

/// Records every conversation and answers with a fixed text.
pub struct Recording {
    reply: Option<String>,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl Recording {
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(reply.to_string()),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            seen: Mutex::new(Vec::new()),
        })
    }

    /// The most recent conversation.
    pub fn last(&self) -> Vec<Message> {
        self.seen.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl TextGenerator for Recording {
    fn model(&self) -> &str {
        "recording"
    }

    async fn generate(&self, messages: Vec<Message>) -> Result<String, Error> {
        self.seen.lock().unwrap().push(messages);
        self.reply
            .clone()
            .ok_or_else(|| ProviderError::NotConfigured("offline".into()).into())
    }
}

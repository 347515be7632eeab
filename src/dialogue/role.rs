use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::message::{Message, Transcript};

#[derive(Debug, Error)]
pub enum DialogueError {
    #[error("reply generation failed: {0}")]
    Generation(String),

    #[error("code execution failed: {0}")]
    Execution(String),

    #[error("code execution timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid dialogue config: {0}")]
    InvalidConfig(String),
}

/// The writing side: produces the next message from everything said so far.
#[async_trait]
pub trait ReplyWriter: Send + Sync {
    async fn produce_reply(&self, transcript: &Transcript) -> Result<Message, DialogueError>;
}

/// The executing side: runs whatever the writer's message asks for and
/// reports back. Returns an error only when the dialogue cannot continue.
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    async fn execute(&self, message: &Message) -> Result<Message, DialogueError>;
}

/// Builds a fresh executor for each dialogue run.
pub trait ExecutorFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn CodeExecutor>, DialogueError>;
}

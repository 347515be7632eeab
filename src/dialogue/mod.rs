//! Bounded two-party dialogue between a code-writing role and a
//! code-executing role.
//!
//! The engine knows nothing about language models or interpreters. Both
//! sides are role handles ([`ReplyWriter`], [`CodeExecutor`]) so tests and
//! alternative backends can be dropped in without touching the loop.

mod engine;
mod message;
mod role;
mod termination;

pub use engine::{DialogueConfig, DialogueEngine, DialogueOutcome, DialogueStatus};
pub use message::{Message, Role, Transcript, KIND_EXECUTION_RESULT, KIND_TEXT};
pub use role::{CodeExecutor, DialogueError, ExecutorFactory, ReplyWriter};
pub use termination::DEFAULT_TERMINATION_KEYWORD;

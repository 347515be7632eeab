use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::message::{Message, Role, Transcript, KIND_PROMPT};
use super::role::{CodeExecutor, DialogueError, ReplyWriter};
use super::termination::{KeywordTermination, TerminationCheck, DEFAULT_TERMINATION_KEYWORD};

/// Per-run limits and identities. Built fresh for every request.
#[derive(Debug, Clone)]
pub struct DialogueConfig {
    /// Upper bound on replies appended after the seed prompt.
    pub max_turns: usize,
    pub termination_keyword: String,
    pub writer_name: String,
    pub executor_name: String,
    /// Auto-replies a role may send in one run before it is silenced.
    pub writer_auto_reply_cap: Option<usize>,
    pub executor_auto_reply_cap: Option<usize>,
}

impl DialogueConfig {
    pub fn with_max_turns(max_turns: usize) -> Self {
        Self {
            max_turns,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), DialogueError> {
        if self.max_turns == 0 {
            return Err(DialogueError::InvalidConfig("max_turns must be at least 1".to_string()));
        }
        if self.termination_keyword.trim().is_empty() {
            return Err(DialogueError::InvalidConfig("termination keyword is empty".to_string()));
        }
        Ok(())
    }

    fn auto_reply_cap(&self, role: Role) -> Option<usize> {
        match role {
            Role::Writer => self.writer_auto_reply_cap,
            Role::Executor => self.executor_auto_reply_cap,
        }
    }

    fn name_of(&self, role: Role) -> &str {
        match role {
            Role::Writer => &self.writer_name,
            Role::Executor => &self.executor_name,
        }
    }
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            max_turns: 10,
            termination_keyword: DEFAULT_TERMINATION_KEYWORD.to_string(),
            writer_name: "code_writer_agent".to_string(),
            executor_name: "code_executor_agent".to_string(),
            writer_auto_reply_cap: None,
            executor_auto_reply_cap: Some(3),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogueStatus {
    Completed,
    TurnLimitReached,
    Failed,
}

/// Result of one run. `error` is set exactly when the status is `Failed`.
#[derive(Debug, Clone)]
pub struct DialogueOutcome {
    pub transcript: Transcript,
    pub status: DialogueStatus,
    pub error: Option<String>,
}

impl DialogueOutcome {
    fn finished(transcript: Transcript, status: DialogueStatus) -> Self {
        Self {
            transcript,
            status,
            error: None,
        }
    }

    fn failed(transcript: Transcript, error: DialogueError) -> Self {
        Self {
            transcript,
            status: DialogueStatus::Failed,
            error: Some(error.to_string()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == DialogueStatus::Failed
    }
}

/// Drives the writer/executor exchange for one prompt.
///
/// The writer always speaks first and the roles strictly alternate. A run
/// stops on the first of:
/// - a reply that passes the termination check (`Completed`)
/// - a role reaching its auto-reply cap (`TurnLimitReached`)
/// - `max_turns` replies appended (`TurnLimitReached`)
/// - an error from either role handle (`Failed`, transcript kept)
#[derive(Debug, Default, Clone, Copy)]
pub struct DialogueEngine;

impl DialogueEngine {
    pub fn new() -> Self {
        Self
    }

    /// Runs with keyword termination on the config's keyword.
    pub async fn run(
        &self,
        prompt: &str,
        config: &DialogueConfig,
        writer: &dyn ReplyWriter,
        executor: &dyn CodeExecutor,
    ) -> DialogueOutcome {
        let termination = KeywordTermination::new(config.termination_keyword.clone());
        self.run_with(prompt, config, writer, executor, &termination).await
    }

    /// Like [`run`](Self::run), but ends the dialogue on `termination` instead of the keyword.
    pub async fn run_with(
        &self,
        prompt: &str,
        config: &DialogueConfig,
        writer: &dyn ReplyWriter,
        executor: &dyn CodeExecutor,
        termination: &dyn TerminationCheck,
    ) -> DialogueOutcome {
        let run_id = Uuid::new_v4();
        let seed = Message::new(Role::Executor, prompt)
            .with_kind(KIND_PROMPT)
            .with_metadata("name", config.executor_name.clone());
        let mut transcript = Transcript::seeded(seed);

        if let Err(e) = config.validate() {
            warn!("⚠️ [DIALOGUE {}] Rejected config: {}", run_id, e);
            return DialogueOutcome::failed(transcript, e);
        }

        info!(
            "💬 [DIALOGUE {}] Starting: max_turns={}, writer={}, executor={}",
            run_id, config.max_turns, config.writer_name, config.executor_name
        );

        let mut replies = 0usize;
        // Auto-replies per role since the run started; nothing resets them mid-run.
        let mut writer_replies = 0usize;
        let mut executor_replies = 0usize;
        let mut speaker = Role::Writer;

        loop {
            let sent = match speaker {
                Role::Writer => writer_replies,
                Role::Executor => executor_replies,
            };
            if let Some(cap) = config.auto_reply_cap(speaker) {
                if sent >= cap {
                    warn!(
                        "⏹️ [DIALOGUE {}] {} reached its auto-reply cap ({}), suppressing further replies",
                        run_id, speaker, cap
                    );
                    return DialogueOutcome::finished(transcript, DialogueStatus::TurnLimitReached);
                }
            }

            let produced = match speaker {
                Role::Writer => writer.produce_reply(&transcript).await,
                Role::Executor => match transcript.last_from(Role::Writer) {
                    Some(latest) => executor.execute(latest).await,
                    None => Err(DialogueError::Execution("no writer message to execute".to_string())),
                },
            };

            let reply = match produced {
                Ok(reply) => stamp(reply, speaker, config.name_of(speaker)),
                Err(e) => {
                    warn!("❌ [DIALOGUE {}] {} failed after {} replies: {}", run_id, speaker, replies, e);
                    return DialogueOutcome::failed(transcript, e);
                }
            };

            let terminates = termination.is_termination(&reply);
            debug!(
                "[DIALOGUE {}] turn {} from {} ({} chars)",
                run_id,
                replies + 1,
                speaker,
                reply.text().len()
            );
            transcript.push(reply);
            replies += 1;
            match speaker {
                Role::Writer => writer_replies += 1,
                Role::Executor => executor_replies += 1,
            }

            if terminates {
                info!("✅ [DIALOGUE {}] Completed by {} after {} replies", run_id, speaker, replies);
                return DialogueOutcome::finished(transcript, DialogueStatus::Completed);
            }

            if replies >= config.max_turns {
                info!("⏹️ [DIALOGUE {}] Turn limit {} reached", run_id, config.max_turns);
                return DialogueOutcome::finished(transcript, DialogueStatus::TurnLimitReached);
            }

            speaker = speaker.counterpart();
        }
    }
}

/// Forces the sender role and fills in the sender name when the handle left it out.
fn stamp(mut reply: Message, role: Role, name: &str) -> Message {
    reply.role = role;
    if reply.name().is_none() {
        reply = reply.with_metadata("name", name.to_string());
    }
    reply
}

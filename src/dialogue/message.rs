use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Message kinds produced by the engine and the built-in role handles.
pub const KIND_PROMPT: &str = "prompt";
pub const KIND_TEXT: &str = "text";
pub const KIND_EXECUTION_RESULT: &str = "execution_result";

/// Which side of the dialogue produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Writer,
    Executor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Writer => "writer",
            Role::Executor => "executor",
        }
    }

    /// The role that answers this one.
    pub fn counterpart(&self) -> Role {
        match self {
            Role::Writer => Role::Executor,
            Role::Executor => Role::Writer,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "writer" => Ok(Role::Writer),
            "executor" => Ok(Role::Executor),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// One turn of a dialogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub content: Option<String>,
    pub role: Role,
    pub kind: Option<String>,
    pub metadata: Option<Map<String, Value>>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            role,
            kind: None,
            metadata: None,
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    /// Sender display name, if one was recorded.
    pub fn name(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("name"))
            .and_then(Value::as_str)
    }
}

/// Ordered messages of one dialogue run.
///
/// Only the engine appends. Once a run ends the transcript is handed to the
/// caller by value and nothing can add to it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub(crate) fn seeded(seed: Message) -> Self {
        Self { messages: vec![seed] }
    }

    pub(crate) fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Latest message sent by `role`.
    pub fn last_from(&self, role: Role) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == role)
    }
}

impl FromIterator<Message> for Transcript {
    fn from_iter<I: IntoIterator<Item = Message>>(iter: I) -> Self {
        Self {
            messages: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse_is_case_insensitive() {
        assert_eq!("Writer".parse::<Role>().unwrap(), Role::Writer);
        assert_eq!("EXECUTOR".parse::<Role>().unwrap(), Role::Executor);
        assert!("assistant".parse::<Role>().is_err());
    }

    #[test]
    fn test_metadata_builder_records_name() {
        let msg = Message::new(Role::Writer, "hello")
            .with_kind(KIND_TEXT)
            .with_metadata("name", "code_writer_agent");
        assert_eq!(msg.name(), Some("code_writer_agent"));
        assert_eq!(msg.kind.as_deref(), Some("text"));
    }

    #[test]
    fn test_last_from_finds_latest_message_of_role() {
        let transcript: Transcript = vec![
            Message::new(Role::Executor, "task"),
            Message::new(Role::Writer, "first"),
            Message::new(Role::Executor, "ran"),
            Message::new(Role::Writer, "second"),
        ]
        .into_iter()
        .collect();

        assert_eq!(transcript.last_from(Role::Writer).unwrap().text(), "second");
        assert_eq!(transcript.last_from(Role::Executor).unwrap().text(), "ran");
    }
}

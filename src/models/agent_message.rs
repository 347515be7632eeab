use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::dialogue::{Message, Transcript};

/// Wire form of one dialogue message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub content: Option<String>,
    pub role: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub metadata: Option<Map<String, Value>>,
}

impl From<&Message> for AgentMessage {
    fn from(message: &Message) -> Self {
        Self {
            content: message.content.clone(),
            role: Some(message.role.as_str().to_string()),
            kind: message.kind.clone(),
            metadata: message.metadata.clone(),
        }
    }
}

impl TryFrom<AgentMessage> for Message {
    type Error = String;

    fn try_from(value: AgentMessage) -> Result<Self, Self::Error> {
        let role = value
            .role
            .ok_or_else(|| "message has no role".to_string())?
            .parse()?;
        Ok(Message {
            content: value.content,
            role,
            kind: value.kind,
            metadata: value.metadata,
        })
    }
}

pub fn format_transcript(transcript: &Transcript) -> Vec<AgentMessage> {
    transcript.messages().iter().map(AgentMessage::from).collect()
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialogue::{Role, KIND_EXECUTION_RESULT, KIND_TEXT};
    use serde_json::json;

    fn sample_transcript() -> Transcript {
        vec![
            Message::new(Role::Executor, "Analyze AAPL")
                .with_kind("prompt")
                .with_metadata("name", "code_executor_agent"),
            Message::new(Role::Writer, "```python\nprint(1)\n```")
                .with_kind(KIND_TEXT)
                .with_metadata("model", "gpt-4-turbo-preview")
                .with_metadata("total_tokens", 42),
            Message {
                content: None,
                role: Role::Executor,
                kind: Some(KIND_EXECUTION_RESULT.to_string()),
                metadata: None,
            },
            Message::new(Role::Writer, "Done. TERMINATE"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_transcript_survives_wire_round_trip() {
        let transcript = sample_transcript();

        let wire = serde_json::to_string(&format_transcript(&transcript)).unwrap();
        let parsed: Vec<AgentMessage> = serde_json::from_str(&wire).unwrap();
        let restored: Transcript = parsed
            .into_iter()
            .map(Message::try_from)
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(restored, transcript);
    }

    #[test]
    fn test_kind_serializes_as_type() {
        let message = Message::new(Role::Writer, "hi").with_kind(KIND_TEXT);
        let value = serde_json::to_value(AgentMessage::from(&message)).unwrap();
        assert_eq!(value["type"], json!("text"));
        assert_eq!(value["role"], json!("writer"));
        assert_eq!(value["metadata"], Value::Null);
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        let wire = AgentMessage {
            content: Some("hi".to_string()),
            role: Some("assistant".to_string()),
            kind: None,
            metadata: None,
        };
        assert!(Message::try_from(wire).is_err());
    }
}

use super::message::Message;

pub const DEFAULT_TERMINATION_KEYWORD: &str = "TERMINATE";

/// Decides whether a message ends the dialogue.
pub trait TerminationCheck: Send + Sync {
    fn is_termination(&self, message: &Message) -> bool;
}

/// Case-insensitive substring match on the message content.
#[derive(Debug, Clone)]
pub struct KeywordTermination {
    keyword: String,
}

impl KeywordTermination {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into().to_uppercase(),
        }
    }
}

impl Default for KeywordTermination {
    fn default() -> Self {
        Self::new(DEFAULT_TERMINATION_KEYWORD)
    }
}

impl TerminationCheck for KeywordTermination {
    fn is_termination(&self, message: &Message) -> bool {
        match &message.content {
            Some(content) if !self.keyword.is_empty() => {
                content.to_uppercase().contains(&self.keyword)
            }
            _ => false,
        }
    }
}

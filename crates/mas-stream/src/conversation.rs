use crate::errors::ChatError;

/// Author of a conversation turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message in the conversation.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    /// Creates a user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Creates an assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Prior turns in chronological order plus the turn that triggers the run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Conversation {
    history: Vec<Turn>,
    message: Turn,
}

impl Conversation {
    /// Creates a conversation from its history and the triggering turn.
    pub fn new(history: Vec<Turn>, message: Turn) -> Self {
        Self { history, message }
    }

    /// Convenience for a first message without history.
    pub fn from_user_text(text: impl Into<String>) -> Self {
        Self::new(Vec::new(), Turn::user(text))
    }

    /// Prior turns, oldest first.
    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    /// The turn that triggers the run.
    pub fn message(&self) -> &Turn {
        &self.message
    }

    /// Rejects conversations whose triggering turn is not a non-empty user turn.
    pub fn validate(&self) -> Result<(), ChatError> {
        if self.message.role != Role::User {
            return Err(ChatError::InvalidInput(
                "the triggering turn must be a user turn".into(),
            ));
        }
        if self.message.content.trim().is_empty() {
            return Err(ChatError::InvalidInput(
                "the triggering turn must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn into_parts(self) -> (Vec<Turn>, Turn) {
        (self.history, self.message)
    }
}

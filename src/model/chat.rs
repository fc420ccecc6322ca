use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single message from the stream chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub author: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub platform: String,
}

impl ChatMessage {
    pub fn new(
        author: impl Into<String>,
        message: impl Into<String>,
        platform: impl Into<String>,
    ) -> Self {
        Self {
            author: author.into(),
            message: message.into(),
            timestamp: Utc::now(),
            platform: platform.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One entry in a chat completion conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: Role,
    pub content: String,
}

impl LlmMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

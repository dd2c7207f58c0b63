use serde::{ Serialize, Deserialize };
use std::fmt;
use std::str::FromStr;

const USER_KEY_PREFIX: &str = "/users/";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(format!("Unknown message role: '{}'", other)),
        }
    }
}

/// One record of the chat log. `user_id` holds the normalised owner
/// reference (`/users/{uid}`), `timestamp` is epoch milliseconds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub role: Role,
    pub text: String,
    pub timestamp: i64,
}

impl ChatMessage {
    pub fn new(user_id: &str, role: Role, text: &str, timestamp: i64) -> Self {
        Self {
            user_id: format_user_key(user_id),
            role,
            text: text.to_string(),
            timestamp,
        }
    }

    /// Records with a blank owner or text are never written remotely.
    pub fn is_persistable(&self) -> bool {
        let owner = self.user_id.trim();
        !owner.is_empty() && owner != USER_KEY_PREFIX && !self.text.trim().is_empty()
    }
}

/// Summary of one contiguous run of messages, as shown in a chat list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub title: String,
    pub timestamp: i64,
    #[serde(rename = "messageCount")]
    pub message_count: usize,
    pub preview: String,
}

/// Normalises a raw uid into the `/users/{uid}` owner reference. Keys that
/// already carry the prefix are returned unchanged.
pub fn format_user_key(user_id: &str) -> String {
    let trimmed = user_id.trim();
    if trimmed.starts_with(USER_KEY_PREFIX) {
        trimmed.to_string()
    } else {
        format!("{}{}", USER_KEY_PREFIX, trimmed)
    }
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

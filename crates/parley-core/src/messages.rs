use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Conversation turn roles. The set is closed; anything else read back
/// from storage is treated as corruption.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::System => write!(f, "system"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// One turn in a conversation. Messages are owned by their conversation
/// and are never edited or deleted individually.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: String,
}

impl Message {
    /// Build a message stamped now. Content is trimmed; emptiness is
    /// rejected at the operation boundaries, not here.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into().trim().to_string(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Rehydrate a stored message with its original timestamp.
    pub fn at(role: Role, content: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: timestamp.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_display_and_parse_roundtrip() {
        for role in [Role::User, Role::Assistant, Role::System] {
            let parsed: Role = role.to_string().parse().unwrap();
            assert_eq!(parsed, role);
        }
    }

    #[test]
    fn role_parse_rejects_unknown() {
        assert!("moderator".parse::<Role>().is_err());
    }

    #[test]
    fn role_serde_uses_snake_case() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }

    #[test]
    fn new_trims_content() {
        let msg = Message::user("  hello there  ");
        assert_eq!(msg.content, "hello there");
        assert_eq!(msg.role, Role::User);
    }

    #[test]
    fn new_stamps_rfc3339_timestamp() {
        let msg = Message::assistant("hi");
        assert!(chrono::DateTime::parse_from_rfc3339(&msg.timestamp).is_ok());
    }

    #[test]
    fn whitespace_only_content_is_empty() {
        let msg = Message::user("   \n\t ");
        assert!(msg.is_empty());
    }

    #[test]
    fn at_preserves_timestamp() {
        let msg = Message::at(Role::System, "rules", "2026-01-01T00:00:00+00:00");
        assert_eq!(msg.timestamp, "2026-01-01T00:00:00+00:00");
    }
}

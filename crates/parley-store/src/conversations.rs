use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use parley_core::ids::ConversationId;
use parley_core::messages::{Message, Role};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// Display-name bounds, enforced on create and rename.
pub const NAME_MIN_CHARS: usize = 3;
pub const NAME_MAX_CHARS: usize = 100;

/// A conversation document: an owned, named, ordered log of messages.
/// Messages are a composition — they have no identity outside their
/// conversation and are removed with it.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    pub owner_id: String,
    pub name: String,
    pub messages: Vec<Message>,
    pub created_at: String,
    pub updated_at: String,
}

pub struct ConversationRepo {
    db: Database,
}

impl ConversationRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a conversation with an empty message log.
    #[instrument(skip(self), fields(owner))]
    pub fn create(&self, owner: &str, name: &str) -> Result<Conversation, StoreError> {
        let name = validate_name(name)?;
        let id = ConversationId::new();
        let now = Utc::now().to_rfc3339();

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO conversations (id, owner_id, name, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                rusqlite::params![id.as_str(), owner, name, now],
            )?;

            Ok(Conversation {
                id: id.clone(),
                owner_id: owner.to_string(),
                name: name.clone(),
                messages: Vec::new(),
                created_at: now.clone(),
                updated_at: now,
            })
        })
    }

    /// List the owner's conversations, most recently updated first.
    /// An owner with no conversations gets an empty list, not an error.
    #[instrument(skip(self), fields(owner))]
    pub fn list(&self, owner: &str) -> Result<Vec<Conversation>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, owner_id, name, created_at, updated_at
                 FROM conversations WHERE owner_id = ?1
                 ORDER BY updated_at DESC, created_at DESC",
            )?;
            let mut rows = stmt.query([owner])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                let mut conversation = row_to_conversation(row)?;
                conversation.messages = load_messages(conn, &conversation.id)?;
                results.push(conversation);
            }
            Ok(results)
        })
    }

    /// Get one owned conversation with its ordered messages. A conversation
    /// that exists but belongs to someone else is reported exactly like an
    /// absent one.
    #[instrument(skip(self), fields(owner, conversation_id = %id))]
    pub fn get(&self, owner: &str, id: &ConversationId) -> Result<Conversation, StoreError> {
        self.db.with_conn(|conn| get_inner(conn, owner, id))
    }

    /// Rename an owned conversation and bump its update time.
    #[instrument(skip(self), fields(owner, conversation_id = %id))]
    pub fn rename(
        &self,
        owner: &str,
        id: &ConversationId,
        new_name: &str,
    ) -> Result<Conversation, StoreError> {
        let name = validate_name(new_name)?;

        self.db.with_conn(|conn| {
            let now = Utc::now().to_rfc3339();
            let changed = conn.execute(
                "UPDATE conversations SET name = ?1, updated_at = ?2
                 WHERE id = ?3 AND owner_id = ?4",
                rusqlite::params![name, now, id.as_str(), owner],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("conversation {id}")));
            }
            get_inner(conn, owner, id)
        })
    }

    /// Permanently delete an owned conversation and its messages.
    /// No soft-delete: a second call for the same id is NotFound.
    #[instrument(skip(self), fields(owner, conversation_id = %id))]
    pub fn delete(&self, owner: &str, id: &ConversationId) -> Result<(), StoreError> {
        self.db.with_tx(|tx| {
            let owned: bool = tx
                .query_row(
                    "SELECT 1 FROM conversations WHERE id = ?1 AND owner_id = ?2",
                    rusqlite::params![id.as_str(), owner],
                    |_| Ok(true),
                )
                .unwrap_or(false);
            if !owned {
                return Err(StoreError::NotFound(format!("conversation {id}")));
            }

            tx.execute("DELETE FROM messages WHERE conversation_id = ?1", [id.as_str()])?;
            tx.execute("DELETE FROM conversations WHERE id = ?1", [id.as_str()])?;
            Ok(())
        })
    }

    /// Append one message. The sequence number is assigned inside the
    /// transaction, so concurrent appends compose instead of overwriting
    /// each other — there is no read-whole-log/write-whole-log cycle.
    #[instrument(skip(self, message), fields(owner, conversation_id = %id, role = %message.role))]
    pub fn append_message(
        &self,
        owner: &str,
        id: &ConversationId,
        message: &Message,
    ) -> Result<Conversation, StoreError> {
        if message.is_empty() {
            return Err(StoreError::Invalid("message content must not be empty".into()));
        }

        self.db.with_tx(|tx| {
            ensure_owned(tx, owner, id)?;
            insert_message(tx, id, message)?;
            touch(tx, id)?;
            get_inner(tx, owner, id)
        })
    }

    /// Append a user/assistant pair in a single transaction, user first.
    /// Either both messages land or neither does.
    #[instrument(skip(self, user, assistant), fields(owner, conversation_id = %id))]
    pub fn append_turn(
        &self,
        owner: &str,
        id: &ConversationId,
        user: &Message,
        assistant: &Message,
    ) -> Result<Conversation, StoreError> {
        if user.is_empty() || assistant.is_empty() {
            return Err(StoreError::Invalid("message content must not be empty".into()));
        }

        self.db.with_tx(|tx| {
            ensure_owned(tx, owner, id)?;
            insert_message(tx, id, user)?;
            insert_message(tx, id, assistant)?;
            touch(tx, id)?;
            get_inner(tx, owner, id)
        })
    }
}

fn validate_name(raw: &str) -> Result<String, StoreError> {
    let name = raw.trim();
    let chars = name.chars().count();
    if chars < NAME_MIN_CHARS {
        return Err(StoreError::Invalid(format!(
            "conversation name must be at least {NAME_MIN_CHARS} characters"
        )));
    }
    if chars > NAME_MAX_CHARS {
        return Err(StoreError::Invalid(format!(
            "conversation name must not exceed {NAME_MAX_CHARS} characters"
        )));
    }
    Ok(name.to_string())
}

fn ensure_owned(
    conn: &rusqlite::Connection,
    owner: &str,
    id: &ConversationId,
) -> Result<(), StoreError> {
    let owned: bool = conn
        .query_row(
            "SELECT 1 FROM conversations WHERE id = ?1 AND owner_id = ?2",
            rusqlite::params![id.as_str(), owner],
            |_| Ok(true),
        )
        .unwrap_or(false);
    if owned {
        Ok(())
    } else {
        Err(StoreError::NotFound(format!("conversation {id}")))
    }
}

fn insert_message(
    conn: &rusqlite::Connection,
    id: &ConversationId,
    message: &Message,
) -> Result<i64, StoreError> {
    let seq: i64 = conn.query_row(
        "SELECT COALESCE(MAX(seq) + 1, 0) FROM messages WHERE conversation_id = ?1",
        [id.as_str()],
        |row| row.get(0),
    )?;

    conn.execute(
        "INSERT INTO messages (conversation_id, seq, role, content, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            id.as_str(),
            seq,
            message.role.to_string(),
            message.content,
            message.timestamp,
        ],
    )?;
    Ok(seq)
}

fn touch(conn: &rusqlite::Connection, id: &ConversationId) -> Result<(), StoreError> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
        rusqlite::params![now, id.as_str()],
    )?;
    Ok(())
}

fn get_inner(
    conn: &rusqlite::Connection,
    owner: &str,
    id: &ConversationId,
) -> Result<Conversation, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, owner_id, name, created_at, updated_at
         FROM conversations WHERE id = ?1 AND owner_id = ?2",
    )?;
    let mut rows = stmt.query(rusqlite::params![id.as_str(), owner])?;
    match rows.next()? {
        Some(row) => {
            let mut conversation = row_to_conversation(row)?;
            conversation.messages = load_messages(conn, &conversation.id)?;
            Ok(conversation)
        }
        None => Err(StoreError::NotFound(format!("conversation {id}"))),
    }
}

fn load_messages(
    conn: &rusqlite::Connection,
    id: &ConversationId,
) -> Result<Vec<Message>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT role, content, timestamp FROM messages
         WHERE conversation_id = ?1 ORDER BY seq",
    )?;
    let mut rows = stmt.query([id.as_str()])?;
    let mut messages = Vec::new();
    while let Some(row) = rows.next()? {
        let role_str: String = row_helpers::get(row, 0, "messages", "role")?;
        let role: Role = row_helpers::parse_enum(&role_str, "messages", "role")?;
        messages.push(Message::at(
            role,
            row_helpers::get::<String>(row, 1, "messages", "content")?,
            row_helpers::get::<String>(row, 2, "messages", "timestamp")?,
        ));
    }
    Ok(messages)
}

fn row_to_conversation(row: &rusqlite::Row<'_>) -> Result<Conversation, StoreError> {
    Ok(Conversation {
        id: ConversationId::from_raw(row_helpers::get::<String>(row, 0, "conversations", "id")?),
        owner_id: row_helpers::get(row, 1, "conversations", "owner_id")?,
        name: row_helpers::get(row, 2, "conversations", "name")?,
        messages: Vec::new(),
        created_at: row_helpers::get(row, 3, "conversations", "created_at")?,
        updated_at: row_helpers::get(row, 4, "conversations", "updated_at")?,
    })
}

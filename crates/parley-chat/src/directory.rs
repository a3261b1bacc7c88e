use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument};

use parley_core::errors::ChatError;
use parley_core::ids::ConversationId;
use parley_store::{Conversation, ConversationRepo};

use crate::map_store_err;

/// Name given to a conversation the directory creates on a user's behalf.
pub const DEFAULT_CONVERSATION_NAME: &str = "New Chat";

/// What a client needs to seed its local session state: the owner's
/// conversations, newest-updated first, and which one to show.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryView {
    pub conversations: Vec<Conversation>,
    pub selected: ConversationId,
}

/// Per-user conversation listing and default selection. A first-time user
/// gets a conversation created for them; everyone else resumes their most
/// recently updated one. The selection itself is client-local state — this
/// only seeds it.
pub struct SessionDirectory {
    conversations: Arc<ConversationRepo>,
}

impl SessionDirectory {
    pub fn new(conversations: Arc<ConversationRepo>) -> Self {
        Self { conversations }
    }

    #[instrument(skip(self), fields(owner))]
    pub fn open(&self, owner: &str) -> Result<DirectoryView, ChatError> {
        if owner.trim().is_empty() {
            return Err(ChatError::Unauthenticated("no resolvable caller identity".into()));
        }

        let mut conversations = self.conversations.list(owner).map_err(map_store_err)?;

        if conversations.is_empty() {
            let created = self
                .conversations
                .create(owner, DEFAULT_CONVERSATION_NAME)
                .map_err(map_store_err)?;
            info!(conversation_id = %created.id, "created first conversation");
            conversations.push(created);
        }

        // The list is newest-updated first, so the head is the default.
        let selected = conversations[0].id.clone();

        Ok(DirectoryView {
            conversations,
            selected,
        })
    }
}

use std::sync::Arc;

use tracing::{info, instrument, warn};

use parley_core::errors::ChatError;
use parley_core::ids::ConversationId;
use parley_core::messages::Message;
use parley_llm::GenerationBackend;
use parley_store::{ConversationRepo, StoreError};

use crate::map_store_err;

#[derive(Clone, Debug)]
pub struct TurnConfig {
    /// Minimum prompt length after trimming. The service configures 5 as a
    /// quality gate; the protocol itself only requires a non-empty prompt.
    pub min_prompt_chars: usize,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self { min_prompt_chars: 1 }
    }
}

/// Runs one conversation turn end to end:
/// validate → load → stage user message → generate → persist the pair.
///
/// Failure policy: when generation fails (transport, upstream status,
/// timeout, or an empty reply) nothing is persisted — the caller resubmits
/// the whole turn. When the store write fails after a successful
/// generation, that is reported as `PersistenceFailed`, distinct from
/// `GenerationFailed`: the text existed but was not saved. No step retries
/// on its own.
pub struct TurnRunner {
    conversations: Arc<ConversationRepo>,
    backend: Arc<dyn GenerationBackend>,
    config: TurnConfig,
}

impl TurnRunner {
    pub fn new(conversations: Arc<ConversationRepo>, backend: Arc<dyn GenerationBackend>) -> Self {
        Self::with_config(conversations, backend, TurnConfig::default())
    }

    pub fn with_config(
        conversations: Arc<ConversationRepo>,
        backend: Arc<dyn GenerationBackend>,
        config: TurnConfig,
    ) -> Self {
        Self {
            conversations,
            backend,
            config,
        }
    }

    /// Append a user turn and its generated reply. Returns the assistant
    /// message on success. Validation happens before any I/O.
    #[instrument(skip(self, prompt), fields(owner, conversation_id = raw_id, backend = self.backend.name()))]
    pub async fn run(
        &self,
        owner: &str,
        raw_id: &str,
        prompt: &str,
    ) -> Result<Message, ChatError> {
        if owner.trim().is_empty() {
            return Err(ChatError::Unauthenticated("no resolvable caller identity".into()));
        }

        let id = ConversationId::parse(raw_id)?;

        let prompt = prompt.trim();
        if prompt.chars().count() < self.config.min_prompt_chars {
            return Err(ChatError::InvalidInput(format!(
                "prompt must be at least {} characters",
                self.config.min_prompt_chars
            )));
        }

        let conversation = self.conversations.get(owner, &id).map_err(map_store_err)?;

        let user_message = Message::user(prompt);
        let mut history = conversation.messages;
        history.push(user_message.clone());

        let reply = match self.backend.generate(&history).await {
            Ok(text) => text,
            Err(e) => {
                warn!(kind = e.error_kind(), "generation failed, turn not persisted");
                return Err(ChatError::GenerationFailed(e));
            }
        };

        let assistant_message = Message::assistant(reply);

        match self
            .conversations
            .append_turn(owner, &id, &user_message, &assistant_message)
        {
            Ok(updated) => {
                info!(messages = updated.messages.len(), "turn persisted");
                Ok(assistant_message)
            }
            // The conversation can disappear between load and persist.
            Err(StoreError::NotFound(m)) => Err(ChatError::NotFound(m)),
            Err(e) => Err(ChatError::PersistenceFailed(e.to_string())),
        }
    }
}

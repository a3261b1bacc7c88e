use parley_core::errors::ChatError;
use parley_core::ids::ConversationId;
use parley_core::messages::{Message, Role};
use parley_store::Conversation;

/// The optimistic turn a client is waiting on.
#[derive(Clone, Debug)]
enum PendingTurn {
    InFlight { user: Message },
    Failed { user: Message, kind: String },
}

/// A client's local copy of one conversation, kept consistent with the
/// server's store.
///
/// A staged user message is visible immediately, before the server
/// confirms. A failed turn stays visible in its failed state until the
/// client discards or resubmits it — a failure is never presented as a
/// successful reply. Incremental reveal of assistant text is a rendering
/// affordance: `confirm` always takes the full content the store wrote.
#[derive(Clone, Debug)]
pub struct LocalConversation {
    id: ConversationId,
    messages: Vec<Message>,
    pending: Option<PendingTurn>,
}

impl LocalConversation {
    /// Seed the local view from a server snapshot.
    pub fn from_snapshot(conversation: &Conversation) -> Self {
        Self {
            id: conversation.id.clone(),
            messages: conversation.messages.clone(),
            pending: None,
        }
    }

    pub fn id(&self) -> &ConversationId {
        &self.id
    }

    /// The committed log plus the optimistic user message, in order.
    pub fn visible_messages(&self) -> Vec<&Message> {
        let mut all: Vec<&Message> = self.messages.iter().collect();
        match &self.pending {
            Some(PendingTurn::InFlight { user }) | Some(PendingTurn::Failed { user, .. }) => {
                all.push(user);
            }
            None => {}
        }
        all
    }

    /// Stage a user message optimistically. Only one turn may be pending.
    pub fn stage(&mut self, prompt: &str) -> Result<(), ChatError> {
        if self.pending.is_some() {
            return Err(ChatError::InvalidInput("a turn is already pending".into()));
        }
        let user = Message::user(prompt);
        if user.is_empty() {
            return Err(ChatError::InvalidInput("prompt must not be empty".into()));
        }
        self.pending = Some(PendingTurn::InFlight { user });
        Ok(())
    }

    /// The server confirmed the turn: commit the staged user message and
    /// the assistant reply to the local log.
    pub fn confirm(&mut self, assistant: Message) -> Result<(), ChatError> {
        match self.pending.take() {
            Some(PendingTurn::InFlight { user }) => {
                debug_assert_eq!(assistant.role, Role::Assistant);
                self.messages.push(user);
                self.messages.push(assistant);
                Ok(())
            }
            Some(failed @ PendingTurn::Failed { .. }) => {
                self.pending = Some(failed);
                Err(ChatError::InvalidInput("pending turn already failed".into()))
            }
            None => Err(ChatError::InvalidInput("no pending turn to confirm".into())),
        }
    }

    /// The turn failed server-side. The optimistic user message is kept,
    /// marked failed, so the client can surface the error.
    pub fn fail(&mut self, kind: &str) {
        if let Some(PendingTurn::InFlight { user }) = self.pending.take() {
            self.pending = Some(PendingTurn::Failed {
                user,
                kind: kind.to_string(),
            });
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// The failure kind of the pending turn, if it failed.
    pub fn failed_kind(&self) -> Option<&str> {
        match &self.pending {
            Some(PendingTurn::Failed { kind, .. }) => Some(kind),
            _ => None,
        }
    }

    /// The prompt of a failed turn, for resubmission.
    pub fn failed_prompt(&self) -> Option<&str> {
        match &self.pending {
            Some(PendingTurn::Failed { user, .. }) => Some(&user.content),
            _ => None,
        }
    }

    /// Drop a failed optimistic message. Returns whether one was removed.
    pub fn discard_failed(&mut self) -> bool {
        if matches!(self.pending, Some(PendingTurn::Failed { .. })) {
            self.pending = None;
            true
        } else {
            false
        }
    }
}

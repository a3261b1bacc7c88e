pub mod directory;
pub mod sync;
pub mod turn;

pub use directory::{DirectoryView, SessionDirectory, DEFAULT_CONVERSATION_NAME};
pub use sync::LocalConversation;
pub use turn::{TurnConfig, TurnRunner};

use parley_core::errors::ChatError;
use parley_store::StoreError;

/// Map store failures into the operation taxonomy. Raw store errors never
/// cross an operation boundary.
pub(crate) fn map_store_err(e: StoreError) -> ChatError {
    match e {
        StoreError::NotFound(m) => ChatError::NotFound(m),
        StoreError::Conflict(m) => ChatError::Conflict(m),
        StoreError::Invalid(m) => ChatError::InvalidInput(m),
        other => ChatError::PersistenceFailed(other.to_string()),
    }
}

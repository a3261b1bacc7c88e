pub mod errors;
pub mod ids;
pub mod messages;

pub use errors::{ChatError, GenerationError};
pub use ids::{ConversationId, UserId};
pub use messages::{Message, Role};

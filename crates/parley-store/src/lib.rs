pub mod conversations;
pub mod database;
pub mod error;
pub mod row_helpers;
pub mod schema;
pub mod users;

pub use conversations::{Conversation, ConversationRepo};
pub use database::Database;
pub use error::StoreError;
pub use users::{UserRepo, UserRow};

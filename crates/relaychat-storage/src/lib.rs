pub mod database;
pub mod repository;
pub mod schema;
pub mod store;

pub use database::{Database, DatabaseError};
pub use repository::{ConversationRepository, MessageRepository};
pub use store::{ConversationStore, MessageStore};

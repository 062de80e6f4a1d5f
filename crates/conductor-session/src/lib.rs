//! Conversation persistence for Conductor.
//!
//! The engine writes each finished transcript once, best-effort, through
//! [`ConversationStore`]. [`FileConversationStore`] keeps one JSON file per
//! conversation.

pub mod record;
pub mod store;

pub use record::ConversationRecord;
pub use store::{ConversationStore, FileConversationStore};

//! Conversation value types
//!
//! Immutable-ish data carried through the dispatch pipeline: conversations,
//! messages, roles, and byte-oriented image/document attachments.

mod conversation;
mod document;
mod image;
mod message;
mod role;

pub use conversation::Conversation;
pub use document::{Document, DocumentFormat};
pub use image::{Image, ImageFormat};
pub use message::Message;
pub use role::Role;

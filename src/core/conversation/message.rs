//! Conversation messages

use serde::{Deserialize, Serialize};

use super::document::Document;
use super::image::Image;
use super::role::Role;

/// One turn in a conversation: a role, optional text and optional
/// attachments. Vendors only accept attachments on user-role messages;
/// that contract is enforced at conversion time by each adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<Image>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub documents: Vec<Document>,
}

impl Message {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: Some(text.into()),
            images: Vec::new(),
            documents: Vec::new(),
        }
    }

    pub fn has_attachments(&self) -> bool {
        !self.images.is_empty() || !self.documents.is_empty()
    }
}

//! Conversation container

use serde::{Deserialize, Serialize};

use super::document::Document;
use super::image::Image;
use super::message::Message;
use super::role::Role;

/// An ordered message sequence with an optional system preamble
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// One-message user conversation from a plain prompt
    pub fn from_prompt(text: impl Into<String>) -> Self {
        Self {
            system: None,
            messages: vec![Message::text(Role::User, text)],
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn add_text_message(&mut self, role: Role, text: impl Into<String>) {
        self.messages.push(Message::text(role, text));
    }

    /// Attach an image to the last message, creating a user message if the
    /// conversation is empty
    pub fn add_image(&mut self, image: Image) {
        if self.messages.is_empty() {
            self.messages.push(Message {
                role: Role::User,
                text: None,
                images: Vec::new(),
                documents: Vec::new(),
            });
        }
        self.messages.last_mut().expect("non-empty").images.push(image);
    }

    /// Attach a document to the last message, creating a user message if the
    /// conversation is empty
    pub fn add_document(&mut self, document: Document) {
        if self.messages.is_empty() {
            self.messages.push(Message {
                role: Role::User,
                text: None,
                images: Vec::new(),
                documents: Vec::new(),
            });
        }
        self.messages
            .last_mut()
            .expect("non-empty")
            .documents
            .push(document);
    }

    /// Text of the last message, if any
    pub fn last_text(&self) -> Option<&str> {
        self.messages.iter().rev().find_map(|m| m.text.as_deref())
    }
}

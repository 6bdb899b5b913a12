//! Type definitions for chat primitives
//!

use serde::{Deserialize, Serialize};

/// The author of a `Content` entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    /// A `System` entry is an authoritative message which is used to
    /// instruct the model. Usually, it appears as the first entry
    /// in a dialog.
    System,

    /// An entry authored by the user
    User,

    /// An entry authored by the model. Providers disagree on the name,
    /// so "assistant" is accepted as well.
    #[serde(alias = "assistant")]
    Model,
}

/// A structured segment of a `Content` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    /// Plain text
    Text(String),
    /// Anything else (images, function calls, ...). Connectors that do not
    /// understand the payload skip it.
    Data(serde_json::Value),
}

/// A single entry in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    /// The author of the entry
    pub role: Role,
    /// The text of the entry
    #[serde(default)]
    pub message: String,
    /// Structured segments; when present they take precedence over `message`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn new(role: Role, message: impl Into<String>) -> Content {
        Content {
            role,
            message: message.into(),
            parts: Vec::new(),
        }
    }

    pub fn system(message: impl Into<String>) -> Content {
        Content::new(Role::System, message)
    }

    pub fn user(message: impl Into<String>) -> Content {
        Content::new(Role::User, message)
    }

    pub fn model(message: impl Into<String>) -> Content {
        Content::new(Role::Model, message)
    }

    /// True when the entry carries neither a message nor any parts
    pub fn is_empty(&self) -> bool {
        self.message.is_empty() && self.parts.is_empty()
    }

    /// The textual rendering of the entry. Text parts are concatenated when
    /// parts are present, otherwise the message is used.
    pub fn text(&self) -> String {
        if self.parts.is_empty() {
            return self.message.clone();
        }

        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Text(text) => Some(text.as_str()),
                Part::Data(_) => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assistant_is_an_alias_for_model() {
        let content: Content =
            serde_json::from_str(r#"{"role": "assistant", "message": "hi"}"#).unwrap();

        assert_eq!(content.role, Role::Model);
        assert_eq!(serde_json::to_value(content.role).unwrap(), "model");
    }

    #[test]
    fn text_prefers_parts() {
        let mut content = Content::user("ignored");
        content.parts = vec![
            Part::Text("Hello, ".to_string()),
            Part::Data(serde_json::json!({"image": "..."})),
            Part::Text("world".to_string()),
        ];

        assert_eq!(content.text(), "Hello, world");
        assert_eq!(Content::user("plain").text(), "plain");
    }

    #[test]
    fn emptiness() {
        assert!(Content::model("").is_empty());
        assert!(!Content::model("x").is_empty());
    }
}

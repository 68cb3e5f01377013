use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Virtual file system snapshot keyed by absolute path. Node payloads are
/// carried verbatim and never inspected server-side.
pub type FileSystemData = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub content: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: Value::String(content.into()),
            extra: Map::new(),
        }
    }
}

/// Work captured before the visitor authenticated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnonymousWork {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(rename = "fileSystemData", default)]
    pub file_system_data: FileSystemData,
}

impl AnonymousWork {
    pub fn new(messages: Vec<ChatMessage>, file_system_data: FileSystemData) -> Self {
        Self {
            messages,
            file_system_data,
        }
    }

    /// Only a non-empty message history counts as work worth keeping.
    pub fn has_messages(&self) -> bool {
        !self.messages.is_empty()
    }
}

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Arguments of a tool call as they arrive from the chat stream: either the
/// raw JSON text of a call still being streamed or an already decoded object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolArgs {
    Encoded(String),
    Structured(Map<String, Value>),
}

impl Default for ToolArgs {
    fn default() -> Self {
        Self::Structured(Map::new())
    }
}

impl From<Value> for ToolArgs {
    fn from(value: Value) -> Self {
        match value {
            Value::String(raw) => Self::Encoded(raw),
            Value::Object(map) => Self::Structured(map),
            _ => Self::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolCallState {
    PartialCall,
    Call,
    Result,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    #[serde(rename = "toolName")]
    pub tool_name: String,
    #[serde(default)]
    pub args: ToolArgs,
    pub state: ToolCallState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolIcon {
    FilePlus,
    FileEdit,
    FolderOpen,
    Trash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolDisplayStatus {
    InProgress,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDisplay {
    pub icon: ToolIcon,
    pub label: String,
    pub status: ToolDisplayStatus,
}

use serde_json::{Map, Value};

use uiforge_types::{
    ToolArgs, ToolCallState, ToolDisplay, ToolDisplayStatus, ToolIcon, ToolInvocation,
};

pub const STR_REPLACE_EDITOR: &str = "str_replace_editor";
pub const FILE_MANAGER: &str = "file_manager";

/// Decodes streamed arguments. Valid JSON that is not an object carries no
/// command or path, so it maps to an empty argument set.
pub fn parse_tool_args(args: &ToolArgs) -> Result<Map<String, Value>, serde_json::Error> {
    match args {
        ToolArgs::Structured(map) => Ok(map.clone()),
        ToolArgs::Encoded(raw) => match serde_json::from_str::<Value>(raw)? {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        },
    }
}

pub fn describe_tool_call(tool_name: &str, args: &Map<String, Value>) -> (ToolIcon, String) {
    let command = string_arg(args, "command");
    let file = display_file_name(string_arg(args, "path"));

    let (icon, label) = match tool_name {
        STR_REPLACE_EDITOR => match command {
            "create" => (ToolIcon::FilePlus, format!("Creating {file}")),
            "str_replace" => (ToolIcon::FileEdit, format!("Editing {file}")),
            "insert" => (ToolIcon::FileEdit, format!("Inserting into {file}")),
            "view" => (ToolIcon::FolderOpen, format!("Viewing {file}")),
            _ => (ToolIcon::FileEdit, format!("Modifying {file}")),
        },
        FILE_MANAGER => match command {
            "rename" => {
                let new_file = display_file_name(string_arg(args, "new_path"));
                (ToolIcon::FileEdit, format!("Renaming {file} to {new_file}"))
            }
            "delete" => (ToolIcon::Trash, format!("Deleting {file}")),
            _ => (ToolIcon::FileEdit, format!("Managing {file}")),
        },
        other => (ToolIcon::FileEdit, other.to_string()),
    };
    (icon, label.trim_end().to_string())
}

pub fn present_tool_invocation(
    invocation: &ToolInvocation,
) -> Result<ToolDisplay, serde_json::Error> {
    let args = parse_tool_args(&invocation.args)?;
    let (icon, label) = describe_tool_call(&invocation.tool_name, &args);
    let completed = invocation.state == ToolCallState::Result
        && invocation.result.as_ref().is_some_and(is_truthy);
    Ok(ToolDisplay {
        icon,
        label,
        status: if completed {
            ToolDisplayStatus::Completed
        } else {
            ToolDisplayStatus::InProgress
        },
    })
}

/// JavaScript truthiness; empty objects and arrays count as truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn string_arg<'a>(args: &'a Map<String, Value>, key: &str) -> &'a str {
    args.get(key).and_then(Value::as_str).unwrap_or("")
}

fn display_file_name(path: &str) -> &str {
    match path.rsplit('/').next() {
        Some(segment) if !segment.is_empty() => segment,
        _ => path,
    }
}

//! Provider-neutral request and response shapes
//!
//! A request carries the prompt, the conversation so far and the operation
//! catalogue. A response is already split into reply text and tool calls.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub system: Vec<PromptSection>,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
    pub max_tokens: u32,
}

/// One part of the system prompt
#[derive(Debug, Clone)]
pub struct PromptSection {
    pub text: String,
    /// Same text on every request, so providers may cache it
    pub stable: bool,
}

impl PromptSection {
    pub fn stable(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            stable: true,
        }
    }

    pub fn per_request(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            stable: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

/// Operation invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// Message content, in the wire shape of the Messages API
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    #[serde(rename = "tool_use")]
    Call(ToolCall),
    #[serde(rename = "tool_result")]
    CallResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },
}

impl ContentBlock {
    pub fn text(s: impl Into<String>) -> Self {
        ContentBlock::Text { text: s.into() }
    }

    pub fn call(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        ContentBlock::Call(ToolCall {
            id: id.into(),
            name: name.into(),
            input,
        })
    }

    pub fn call_result(tool_use_id: impl Into<String>, content: impl Into<String>, is_error: bool) -> Self {
        ContentBlock::CallResult {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error,
        }
    }
}

/// Operation advertised to the model
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LlmResponse {
    /// Concatenated text blocks
    pub text: String,
    pub calls: Vec<ToolCall>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

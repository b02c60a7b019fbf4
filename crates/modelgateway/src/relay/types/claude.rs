use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Request {
	pub model: String,
	pub max_tokens: u64,
	pub messages: Vec<Message>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub system: Option<SystemPrompt>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub stop_sequences: Vec<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stream: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub temperature: Option<f32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub top_p: Option<f32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub top_k: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tools: Option<Vec<Tool>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tool_choice: Option<ToolChoice>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub thinking: Option<Thinking>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub metadata: Option<Value>,
	#[serde(flatten, default)]
	pub rest: Value,
}

/// Thinking control. `type` is an open string because compatible vendors
/// accept values beyond Anthropic's `enabled`/`disabled` pair.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Thinking {
	#[serde(default)]
	pub r#type: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub budget_tokens: Option<u64>,
	#[serde(flatten, default)]
	pub rest: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SystemPrompt {
	Text(String),
	Blocks(Vec<SystemBlock>),
}

impl SystemPrompt {
	pub fn joined(&self) -> String {
		match self {
			SystemPrompt::Text(t) => t.clone(),
			SystemPrompt::Blocks(blocks) => blocks
				.iter()
				.map(|b| b.text.as_str())
				.collect::<Vec<_>>()
				.join("\n"),
		}
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemBlock {
	pub r#type: String,
	#[serde(default)]
	pub text: String,
	#[serde(flatten, default)]
	pub rest: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
	pub role: Role,
	#[serde(deserialize_with = "content_blocks")]
	pub content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
	#[default]
	User,
	Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ContentBlock {
	Text {
		text: String,
	},
	Image {
		source: ImageSource,
	},
	Thinking {
		thinking: String,
		#[serde(default, skip_serializing_if = "String::is_empty")]
		signature: String,
	},
	RedactedThinking {
		data: String,
	},
	ToolUse {
		id: String,
		name: String,
		input: Value,
	},
	ToolResult {
		tool_use_id: String,
		#[serde(default)]
		content: ToolResultContent,
		#[serde(skip_serializing_if = "Option::is_none")]
		is_error: Option<bool>,
	},
	// There are many more block types; pass them through without failing.
	#[serde(untagged)]
	Other(Value),
}

/// Claude allows a bare string wherever a content block array is expected.
fn content_blocks<'de, D: Deserializer<'de>>(
	deserializer: D,
) -> Result<Vec<ContentBlock>, D::Error> {
	use serde::de::Error;
	let value = Value::deserialize(deserializer)?;
	match value {
		Value::String(text) => Ok(vec![ContentBlock::Text { text }]),
		Value::Array(_) => Vec::<ContentBlock>::deserialize(value).map_err(D::Error::custom),
		_ => Err(D::Error::custom(
			"content must be either a string or an array",
		)),
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSource {
	pub r#type: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub media_type: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub data: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolResultContent {
	Text(String),
	Blocks(Vec<ContentBlock>),
}

impl Default for ToolResultContent {
	fn default() -> Self {
		ToolResultContent::Text(String::new())
	}
}

impl ToolResultContent {
	pub fn joined_text(&self) -> String {
		match self {
			ToolResultContent::Text(t) => t.clone(),
			ToolResultContent::Blocks(blocks) => blocks
				.iter()
				.filter_map(|b| match b {
					ContentBlock::Text { text } => Some(text.as_str()),
					_ => None,
				})
				.collect::<Vec<_>>()
				.join("\n"),
		}
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tool {
	pub name: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(default)]
	pub input_schema: Value,
	#[serde(flatten, default)]
	pub rest: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ToolChoice {
	Auto,
	Any,
	Tool { name: String },
	None,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Response {
	pub id: String,
	pub r#type: String,
	pub role: Role,
	pub content: Vec<ContentBlock>,
	pub model: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stop_reason: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stop_sequence: Option<String>,
	pub usage: Usage,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
	#[serde(default)]
	pub input_tokens: u64,
	#[serde(default)]
	pub output_tokens: u64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub cache_creation_input_tokens: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub cache_read_input_tokens: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum StreamEvent {
	MessageStart {
		message: Response,
	},
	ContentBlockStart {
		index: usize,
		content_block: ContentBlock,
	},
	ContentBlockDelta {
		index: usize,
		delta: BlockDelta,
	},
	ContentBlockStop {
		index: usize,
	},
	MessageDelta {
		delta: MessageDelta,
		usage: Usage,
	},
	MessageStop,
	Ping,
}

impl StreamEvent {
	pub fn event_name(&self) -> &'static str {
		match self {
			StreamEvent::MessageStart { .. } => "message_start",
			StreamEvent::ContentBlockStart { .. } => "content_block_start",
			StreamEvent::ContentBlockDelta { .. } => "content_block_delta",
			StreamEvent::ContentBlockStop { .. } => "content_block_stop",
			StreamEvent::MessageDelta { .. } => "message_delta",
			StreamEvent::MessageStop => "message_stop",
			StreamEvent::Ping => "ping",
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
#[allow(clippy::enum_variant_names)]
pub enum BlockDelta {
	TextDelta { text: String },
	InputJsonDelta { partial_json: String },
	ThinkingDelta { thinking: String },
	SignatureDelta { signature: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageDelta {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stop_reason: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stop_sequence: Option<String>,
}

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::relay::usage::Usage;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Request {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub model: Option<String>,
	pub messages: Vec<RequestMessage>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub max_tokens: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub max_completion_tokens: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub temperature: Option<f32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub top_p: Option<f32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub n: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub presence_penalty: Option<f32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub frequency_penalty: Option<f32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stream: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stream_options: Option<StreamOptions>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stop: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub user: Option<String>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub tools: Option<Vec<Tool>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tool_choice: Option<ToolChoice>,
	/// Legacy function-calling surface; carried through untouched.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub functions: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub function_call: Option<Value>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub response_format: Option<ResponseFormat>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub reasoning_effort: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub web_search_options: Option<WebSearchOptions>,
	/// Vendor thinking controls (Claude translation, DeepSeek-style channels).
	#[serde(skip_serializing_if = "Option::is_none")]
	pub thinking: Option<Thinking>,
	/// OpenRouter provider routing hints.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub provider: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub include_reasoning: Option<bool>,

	#[serde(flatten, default)]
	pub rest: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamOptions {
	pub include_usage: bool,
	#[serde(flatten, default)]
	pub rest: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebSearchOptions {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub search_context_size: Option<String>,
	#[serde(flatten, default)]
	pub rest: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thinking {
	pub r#type: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub budget_tokens: Option<u64>,
	#[serde(flatten, default)]
	pub rest: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestMessage {
	pub role: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub content: Option<MessageContent>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tool_calls: Option<Vec<ToolCall>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tool_call_id: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub reasoning_content: Option<String>,
	#[serde(flatten, default)]
	pub rest: Value,
}

impl RequestMessage {
	/// Collapses the content to plain text when every part is textual.
	pub fn text(&self) -> Option<String> {
		match self.content.as_ref()? {
			MessageContent::Text(t) => Some(t.clone()),
			MessageContent::Parts(parts) => {
				let texts: Vec<&str> = parts
					.iter()
					.filter_map(|p| match p {
						ContentPart::Text { text } => Some(text.as_str()),
						_ => None,
					})
					.collect();
				if texts.len() == parts.len() {
					Some(texts.join("\n"))
				} else {
					None
				}
			},
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
	Text(String),
	Parts(Vec<ContentPart>),
}

impl MessageContent {
	pub fn is_empty(&self) -> bool {
		match self {
			MessageContent::Text(t) => t.is_empty(),
			MessageContent::Parts(p) => p.is_empty(),
		}
	}
}

/// One tagged part of a structured message content array.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
	Text {
		text: String,
	},
	ImageUrl {
		image_url: ImageUrl,
	},
	InputAudio {
		input_audio: InputAudio,
	},
	/// Encrypted reasoning replayed from a Response API turn.
	Reasoning {
		#[serde(skip_serializing_if = "Option::is_none")]
		encrypted_content: Option<String>,
		#[serde(skip_serializing_if = "Option::is_none")]
		summary: Option<Value>,
	},
	#[serde(untagged)]
	Other(Value),
}

impl<'de> Deserialize<'de> for ContentPart {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		use serde::de::Error;
		let v = Value::deserialize(deserializer)?;
		let kind = v.get("type").and_then(Value::as_str).unwrap_or_default();
		let part = match kind {
			"text" => ContentPart::Text {
				text: v
					.get("text")
					.and_then(Value::as_str)
					.unwrap_or_default()
					.to_string(),
			},
			"image_url" => ContentPart::ImageUrl {
				image_url: serde_json::from_value(v.get("image_url").cloned().unwrap_or_default())
					.map_err(D::Error::custom)?,
			},
			"input_audio" => ContentPart::InputAudio {
				input_audio: serde_json::from_value(v.get("input_audio").cloned().unwrap_or_default())
					.map_err(D::Error::custom)?,
			},
			"reasoning" => ContentPart::Reasoning {
				encrypted_content: v
					.get("encrypted_content")
					.and_then(Value::as_str)
					.map(str::to_string),
				summary: v.get("summary").cloned(),
			},
			_ => ContentPart::Other(v),
		};
		Ok(part)
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageUrl {
	pub url: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub detail: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputAudio {
	pub data: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub format: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Tool {
	Function(FunctionTool),
	/// Non-function tools (`web_search`, `mcp`, ...) keep their vendor fields.
	Other(Value),
}

impl Tool {
	pub fn kind(&self) -> &str {
		match self {
			Tool::Function(_) => "function",
			Tool::Other(v) => v.get("type").and_then(Value::as_str).unwrap_or_default(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionTool {
	pub r#type: FunctionTag,
	pub function: FunctionObject,
}

/// Serde marker restricting [`FunctionTool`] to `type == "function"`, so the
/// untagged [`Tool`] enum cannot swallow other tool types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionTag {
	Function,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionObject {
	pub name: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub parameters: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub strict: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolChoice {
	/// "auto" | "none" | "required"
	Mode(String),
	Named(NamedToolChoice),
}

/// Accepts every named shape seen on the wire: `{type:"function",
/// function:{name}}`, `{type:"function", name}` and `{type:"tool", name}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NamedToolChoice {
	pub r#type: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub function: Option<FunctionName>,
}

impl NamedToolChoice {
	pub fn target(&self) -> Option<&str> {
		self
			.name
			.as_deref()
			.or_else(|| self.function.as_ref().map(|f| f.name.as_str()))
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionName {
	pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
	pub id: String,
	pub r#type: String,
	pub function: FunctionCall,
	#[serde(flatten, default)]
	pub rest: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionCall {
	pub name: String,
	pub arguments: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseFormat {
	pub r#type: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub json_schema: Option<JsonSchemaSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JsonSchemaSpec {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub schema: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub strict: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Response {
	pub id: String,
	pub object: String,
	pub created: i64,
	pub model: String,
	pub choices: Vec<Choice>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub usage: Option<Usage>,
	#[serde(flatten, default)]
	pub rest: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Choice {
	pub index: u32,
	pub message: ResponseMessage,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub finish_reason: Option<String>,
	#[serde(flatten, default)]
	pub rest: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseMessage {
	pub role: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub content: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub reasoning_content: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub thinking: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tool_calls: Option<Vec<ToolCall>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub annotations: Option<Value>,
	#[serde(flatten, default)]
	pub rest: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamResponse {
	pub id: String,
	pub object: String,
	pub created: i64,
	pub model: String,
	pub choices: Vec<ChunkChoice>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub usage: Option<Usage>,
	#[serde(flatten, default)]
	pub rest: Value,
}

impl StreamResponse {
	pub fn chunk(id: &str, model: &str, created: i64, choices: Vec<ChunkChoice>) -> Self {
		StreamResponse {
			id: id.to_string(),
			object: "chat.completion.chunk".to_string(),
			created,
			model: model.to_string(),
			choices,
			usage: None,
			rest: Value::Null,
		}
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkChoice {
	pub index: u32,
	pub delta: Delta,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub finish_reason: Option<String>,
	#[serde(flatten, default)]
	pub rest: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Delta {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub role: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub content: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub reasoning_content: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tool_calls: Option<Vec<ToolCallDelta>>,
	#[serde(flatten, default)]
	pub rest: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolCallDelta {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub index: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub r#type: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub function: Option<FunctionCallDelta>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionCallDelta {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub arguments: Option<String>,
}

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Request {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub model: Option<String>,
	#[serde(default)]
	pub input: Input,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub instructions: Option<String>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub tools: Option<Vec<Tool>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tool_choice: Option<ToolChoice>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub text: Option<TextConfig>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub reasoning: Option<ReasoningConfig>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub stream: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub background: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub max_output_tokens: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub temperature: Option<f32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub top_p: Option<f32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub user: Option<String>,

	#[serde(flatten, default)]
	pub rest: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Input {
	Text(String),
	Items(Vec<Item>),
}

impl Default for Input {
	fn default() -> Self {
		Input::Items(Vec::new())
	}
}

impl Input {
	pub fn items(&self) -> &[Item] {
		match self {
			Input::Text(_) => &[],
			Input::Items(items) => items,
		}
	}
}

/// One typed item of a Response API `input` or `output` sequence. The wire
/// tag is `type`, absent for plain messages, so deserialization dispatches by
/// hand; serialization is untagged because every variant carries its own tag
/// field.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Item {
	Message(MessageItem),
	FunctionCall(FunctionCallItem),
	FunctionCallOutput(FunctionCallOutputItem),
	Reasoning(ReasoningItem),
	WebSearchCall(WebSearchCallItem),
	Other(Value),
}

impl<'de> Deserialize<'de> for Item {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		use serde::de::Error;
		let v = Value::deserialize(deserializer)?;
		let kind = v.get("type").and_then(Value::as_str).unwrap_or("message");
		let item = match kind {
			"message" => Item::Message(serde_json::from_value(v).map_err(D::Error::custom)?),
			"function_call" => Item::FunctionCall(serde_json::from_value(v).map_err(D::Error::custom)?),
			"function_call_output" => {
				Item::FunctionCallOutput(serde_json::from_value(v).map_err(D::Error::custom)?)
			},
			"reasoning" => Item::Reasoning(serde_json::from_value(v).map_err(D::Error::custom)?),
			"web_search_call" => {
				Item::WebSearchCall(serde_json::from_value(v).map_err(D::Error::custom)?)
			},
			_ => Item::Other(v),
		};
		Ok(item)
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageItem {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub r#type: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	pub role: String,
	pub content: ItemContent,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub status: Option<String>,
	#[serde(flatten, default)]
	pub rest: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemContent {
	Text(String),
	Parts(Vec<ContentPart>),
}

impl Default for ItemContent {
	fn default() -> Self {
		ItemContent::Parts(Vec::new())
	}
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
	InputText {
		text: String,
	},
	OutputText {
		text: String,
		#[serde(skip_serializing_if = "Option::is_none")]
		annotations: Option<Value>,
	},
	InputImage {
		#[serde(skip_serializing_if = "Option::is_none")]
		image_url: Option<String>,
		#[serde(skip_serializing_if = "Option::is_none")]
		detail: Option<String>,
	},
	Refusal {
		refusal: String,
	},
	#[serde(untagged)]
	Other(Value),
}

impl<'de> Deserialize<'de> for ContentPart {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let v = Value::deserialize(deserializer)?;
		let text = |v: &Value, key: &str| {
			v.get(key)
				.and_then(Value::as_str)
				.unwrap_or_default()
				.to_string()
		};
		let part = match v.get("type").and_then(Value::as_str).unwrap_or_default() {
			"input_text" => ContentPart::InputText {
				text: text(&v, "text"),
			},
			"output_text" => ContentPart::OutputText {
				text: text(&v, "text"),
				annotations: v.get("annotations").cloned(),
			},
			"input_image" => ContentPart::InputImage {
				image_url: v.get("image_url").and_then(Value::as_str).map(str::to_string),
				detail: v.get("detail").and_then(Value::as_str).map(str::to_string),
			},
			"refusal" => ContentPart::Refusal {
				refusal: text(&v, "refusal"),
			},
			_ => ContentPart::Other(v),
		};
		Ok(part)
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionCallItem {
	pub r#type: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	pub call_id: String,
	pub name: String,
	pub arguments: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub status: Option<String>,
	#[serde(flatten, default)]
	pub rest: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionCallOutputItem {
	pub r#type: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	pub call_id: String,
	/// Always serialized; upstreams reject a missing output field.
	#[serde(default)]
	pub output: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub status: Option<String>,
	#[serde(flatten, default)]
	pub rest: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReasoningItem {
	pub r#type: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub summary: Vec<SummaryPart>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub encrypted_content: Option<String>,
	#[serde(flatten, default)]
	pub rest: Value,
}

impl ReasoningItem {
	pub fn summary_text(&self) -> String {
		self
			.summary
			.iter()
			.map(|s| s.text.as_str())
			.collect::<Vec<_>>()
			.join("\n")
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SummaryPart {
	pub r#type: String,
	#[serde(default)]
	pub text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebSearchCallItem {
	pub r#type: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub status: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub action: Option<Value>,
	#[serde(flatten, default)]
	pub rest: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Tool {
	Function(FunctionTool),
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

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionTool {
	pub r#type: FunctionTag,
	pub name: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub parameters: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub strict: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionTag {
	#[default]
	Function,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolChoice {
	Mode(String),
	/// Flat named form: `{type:"function", name:"..."}`.
	Named(NamedToolChoice),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NamedToolChoice {
	pub r#type: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(flatten, default)]
	pub rest: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextConfig {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub format: Option<TextFormat>,
	#[serde(flatten, default)]
	pub rest: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextFormat {
	pub r#type: String,
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
pub struct ReasoningConfig {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub effort: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub summary: Option<String>,
	#[serde(flatten, default)]
	pub rest: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Response {
	pub id: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub object: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub created_at: Option<i64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub status: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub model: Option<String>,
	#[serde(default)]
	pub output: Vec<Item>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub usage: Option<ResponseUsage>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub instructions: Option<String>,
	#[serde(flatten, default)]
	pub rest: Value,
}

impl Response {
	/// Concatenated assistant text across output messages.
	pub fn output_text(&self) -> String {
		let mut out = String::new();
		for item in &self.output {
			if let Item::Message(m) = item {
				match &m.content {
					ItemContent::Text(t) => out.push_str(t),
					ItemContent::Parts(parts) => {
						for p in parts {
							if let ContentPart::OutputText { text, .. } = p {
								out.push_str(text);
							}
						}
					},
				}
			}
		}
		out
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseUsage {
	#[serde(default)]
	pub input_tokens: u64,
	#[serde(default)]
	pub output_tokens: u64,
	#[serde(default)]
	pub total_tokens: u64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub input_tokens_details: Option<InputTokensDetails>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub output_tokens_details: Option<OutputTokensDetails>,
	#[serde(flatten, default)]
	pub rest: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputTokensDetails {
	#[serde(default)]
	pub cached_tokens: u64,
	#[serde(flatten, default)]
	pub rest: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputTokensDetails {
	#[serde(default)]
	pub reasoning_tokens: u64,
	#[serde(flatten, default)]
	pub rest: Value,
}

/// One streamed Response API event. The event family is open-ended, so this
/// is the flat shape every event shares rather than a variant per type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamEvent {
	pub r#type: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub sequence_number: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub item_id: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub output_index: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub content_index: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub delta: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub text: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub item: Option<Item>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub response: Option<Response>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<Value>,
	#[serde(flatten, default)]
	pub rest: Value,
}

impl StreamEvent {
	pub fn delta_str(&self) -> Option<&str> {
		self.delta.as_ref().and_then(Value::as_str)
	}

	pub fn is_delta(&self) -> bool {
		self.r#type.ends_with(".delta")
	}

	pub fn is_done(&self) -> bool {
		self.r#type.ends_with(".done")
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn item_dispatch_defaults_to_message() {
		let item: Item =
			serde_json::from_value(json!({"role": "user", "content": "hello"})).unwrap();
		assert!(matches!(item, Item::Message(_)));

		let item: Item = serde_json::from_value(json!({
			"type": "function_call",
			"call_id": "call_1",
			"name": "f",
			"arguments": "{}"
		}))
		.unwrap();
		let Item::FunctionCall(fc) = item else {
			panic!("expected function call")
		};
		assert_eq!(fc.call_id, "call_1");
	}

	#[test]
	fn unknown_items_round_trip() {
		let raw = json!({
			"type": "computer_call",
			"call_id": "cc_1",
			"action": {"type": "screenshot"}
		});
		let item: Item = serde_json::from_value(raw.clone()).unwrap();
		assert!(matches!(item, Item::Other(_)));
		assert_eq!(serde_json::to_value(&item).unwrap(), raw);
	}

	#[test]
	fn function_call_output_serializes_empty_output() {
		let out = FunctionCallOutputItem {
			r#type: "function_call_output".to_string(),
			call_id: "call_1".to_string(),
			..Default::default()
		};
		let v = serde_json::to_value(&out).unwrap();
		assert_eq!(v.get("output").unwrap(), "");
	}

	#[test]
	fn stream_event_shape() {
		let ev: StreamEvent = serde_json::from_value(json!({
			"type": "response.output_text.delta",
			"sequence_number": 3,
			"item_id": "msg_1",
			"output_index": 0,
			"content_index": 0,
			"delta": "The"
		}))
		.unwrap();
		assert!(ev.is_delta());
		assert_eq!(ev.delta_str(), Some("The"));
	}
}

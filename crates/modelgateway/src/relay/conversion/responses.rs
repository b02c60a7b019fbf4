//! Chat Completions <-> Response API translation, request and response
//! directions plus both streaming directions.

use itertools::Itertools;
use serde_json::Value;
use tracing::debug;

use crate::Body;
use crate::parse;
use crate::relay::conversion::schema;
use crate::relay::error::RelayError;
use crate::relay::model;
use crate::relay::types::{completions, responses};
use crate::relay::usage::{Usage, UsageRecorder};

/// Normalizes a tool call identifier to the Response API `call_id` form.
/// Canonical prefixes are preserved.
fn ensure_call_prefix(id: &str) -> String {
	if id.starts_with("call_") {
		id.to_string()
	} else {
		format!("call_{id}")
	}
}

fn function_item_id(id: &str) -> String {
	if id.starts_with("fc_") {
		id.to_string()
	} else {
		format!("fc_{}", id.strip_prefix("call_").unwrap_or(id))
	}
}

/// Pulls the human-readable text out of a reasoning `summary`, which arrives
/// either as a plain string or as `[{type, text}]` parts.
fn reasoning_summary_text(summary: &Value) -> Option<String> {
	match summary {
		Value::String(s) if !s.is_empty() => Some(s.clone()),
		Value::Array(parts) => {
			let text = parts
				.iter()
				.filter_map(|p| p.get("text").and_then(Value::as_str))
				.join("\n");
			(!text.is_empty()).then_some(text)
		},
		_ => None,
	}
}

pub mod from_completions {
	use super::*;

	/// Translates a Chat Completions request into a Response API request:
	/// system messages become `instructions`, tool calls and outputs become
	/// typed input items.
	pub fn translate(req: &completions::Request) -> Result<responses::Request, RelayError> {
		let model_name = req.model.clone().unwrap_or_default();

		let mut instructions: Vec<String> = Vec::new();
		let mut items: Vec<responses::Item> = Vec::new();
		let mut leading = true;
		for msg in &req.messages {
			if leading && msg.role == "system" {
				if let Some(text) = msg.text() {
					instructions.push(text);
				}
				continue;
			}
			leading = false;
			match msg.role.as_str() {
				"assistant" => translate_assistant_message(msg, &mut items),
				"tool" => {
					items.push(responses::Item::FunctionCallOutput(
						responses::FunctionCallOutputItem {
							r#type: "function_call_output".to_string(),
							call_id: ensure_call_prefix(msg.tool_call_id.as_deref().unwrap_or_default()),
							// `output` must be present even when the tool returned nothing
							output: msg.text().unwrap_or_default(),
							..Default::default()
						},
					));
				},
				role => {
					let content = input_content(msg, role);
					items.push(responses::Item::Message(responses::MessageItem {
						role: role.to_string(),
						content,
						..Default::default()
					}));
				},
			}
		}

		let tools = req.tools.as_ref().map(|tools| {
			tools
				.iter()
				.map(|t| match t {
					completions::Tool::Function(f) => responses::Tool::Function(responses::FunctionTool {
						r#type: responses::FunctionTag::Function,
						name: f.function.name.clone(),
						description: f.function.description.clone(),
						parameters: f.function.parameters.clone(),
						strict: f.function.strict,
					}),
					// mcp / web_search / file_search / computer_use_preview keep
					// their vendor-specific fields as-is
					completions::Tool::Other(v) => responses::Tool::Other(v.clone()),
				})
				.collect()
		});

		let tool_choice = req.tool_choice.as_ref().and_then(translate_tool_choice);

		let text = req.response_format.as_ref().and_then(|rf| {
			let format = match rf.r#type.as_str() {
				"json_schema" => {
					let spec = rf.json_schema.clone().unwrap_or_default();
					responses::TextFormat {
						r#type: "json_schema".to_string(),
						name: spec.name,
						description: spec.description,
						schema: spec.schema,
						strict: spec.strict,
					}
				},
				"" => return None,
				other => responses::TextFormat {
					r#type: other.to_string(),
					..Default::default()
				},
			};
			Some(responses::TextConfig {
				format: Some(format),
				rest: Value::Null,
			})
		});

		let reasoning = if model::is_reasoning_model(&model_name) {
			Some(responses::ReasoningConfig {
				effort: Some(
					req
						.reasoning_effort
						.clone()
						.unwrap_or_else(|| "medium".to_string()),
				),
				summary: Some(if model_name.trim().to_ascii_lowercase().starts_with("o4") {
					"detailed".to_string()
				} else {
					"auto".to_string()
				}),
				rest: Value::Null,
			})
		} else {
			None
		};

		Ok(responses::Request {
			model: req.model.clone(),
			input: responses::Input::Items(items),
			instructions: (!instructions.is_empty()).then(|| instructions.join("\n")),
			tools,
			tool_choice,
			text,
			reasoning,
			stream: req.stream,
			background: None,
			max_output_tokens: req.max_completion_tokens.or(req.max_tokens),
			temperature: req.temperature,
			top_p: req.top_p,
			user: req.user.clone(),
			rest: Value::Null,
		})
	}

	fn translate_tool_choice(tc: &completions::ToolChoice) -> Option<responses::ToolChoice> {
		match tc {
			completions::ToolChoice::Mode(m) => {
				let m = m.trim();
				(!m.is_empty()).then(|| responses::ToolChoice::Mode(m.to_string()))
			},
			completions::ToolChoice::Named(named) => {
				let name = named.target()?.to_string();
				Some(responses::ToolChoice::Named(responses::NamedToolChoice {
					r#type: "function".to_string(),
					name: Some(name),
					rest: Value::Null,
				}))
			},
		}
	}

	fn input_content(msg: &completions::RequestMessage, role: &str) -> responses::ItemContent {
		let text_type = if role == "assistant" {
			"output_text"
		} else {
			"input_text"
		};
		let parts = match msg.content.as_ref() {
			None => Vec::new(),
			Some(completions::MessageContent::Text(t)) => vec![text_part(text_type, t)],
			Some(completions::MessageContent::Parts(parts)) => parts
				.iter()
				.filter_map(|p| match p {
					completions::ContentPart::Text { text } => Some(text_part(text_type, text)),
					completions::ContentPart::ImageUrl { image_url } => {
						Some(responses::ContentPart::InputImage {
							image_url: Some(image_url.url.clone()),
							detail: image_url.detail.clone(),
						})
					},
					completions::ContentPart::InputAudio { .. } => None,
					completions::ContentPart::Reasoning { .. } => None,
					completions::ContentPart::Other(v) => Some(responses::ContentPart::Other(v.clone())),
				})
				.collect(),
		};
		responses::ItemContent::Parts(parts)
	}

	fn text_part(text_type: &str, text: &str) -> responses::ContentPart {
		if text_type == "output_text" {
			responses::ContentPart::OutputText {
				text: text.to_string(),
				annotations: None,
			}
		} else {
			responses::ContentPart::InputText {
				text: text.to_string(),
			}
		}
	}

	fn translate_assistant_message(
		msg: &completions::RequestMessage,
		items: &mut Vec<responses::Item>,
	) {
		let mut parts: Vec<responses::ContentPart> = Vec::new();
		match msg.content.as_ref() {
			None => {},
			Some(completions::MessageContent::Text(t)) => {
				if !t.is_empty() {
					parts.push(responses::ContentPart::OutputText {
						text: t.clone(),
						annotations: None,
					});
				}
			},
			Some(completions::MessageContent::Parts(raw)) => {
				for p in raw {
					match p {
						completions::ContentPart::Text { text } => {
							parts.push(responses::ContentPart::OutputText {
								text: text.clone(),
								annotations: None,
							});
						},
						// Replayed reasoning cannot be verified across a
						// conversation resumption: keep the summary as plain
						// output text, or drop the whole message when only the
						// encrypted payload exists.
						completions::ContentPart::Reasoning {
							encrypted_content,
							summary,
						} => {
							let summary_text = summary.as_ref().and_then(reasoning_summary_text);
							match summary_text {
								Some(text) => parts.push(responses::ContentPart::OutputText {
									text,
									annotations: None,
								}),
								None if encrypted_content.is_some() => return,
								None => {},
							}
						},
						_ => {},
					}
				}
			},
		}
		if !parts.is_empty() {
			items.push(responses::Item::Message(responses::MessageItem {
				role: "assistant".to_string(),
				content: responses::ItemContent::Parts(parts),
				..Default::default()
			}));
		}
		for tc in msg.tool_calls.iter().flatten() {
			items.push(responses::Item::FunctionCall(responses::FunctionCallItem {
				r#type: "function_call".to_string(),
				id: Some(function_item_id(&tc.id)),
				call_id: ensure_call_prefix(&tc.id),
				name: tc.function.name.clone(),
				arguments: tc.function.arguments.clone(),
				..Default::default()
			}));
		}
	}
}

pub mod to_completions {
	use super::*;

	/// Translates a Response API request into a Chat Completions request, for
	/// channels that only speak the older dialect. Tool types the target does
	/// not support are dropped; a `tool_choice` naming a dropped tool is
	/// downgraded to `auto`.
	pub fn translate(req: &responses::Request) -> Result<completions::Request, RelayError> {
		let mut messages: Vec<completions::RequestMessage> = Vec::new();
		if let Some(instructions) = req.instructions.as_ref().filter(|i| !i.is_empty()) {
			messages.push(completions::RequestMessage {
				role: "system".to_string(),
				content: Some(completions::MessageContent::Text(instructions.clone())),
				..Default::default()
			});
		}

		match &req.input {
			responses::Input::Text(text) => {
				messages.push(completions::RequestMessage {
					role: "user".to_string(),
					content: Some(completions::MessageContent::Text(text.clone())),
					..Default::default()
				});
			},
			responses::Input::Items(items) => {
				for item in items {
					translate_item(item, &mut messages);
				}
			},
		}

		let mut kept_functions: Vec<String> = Vec::new();
		let tools = req.tools.as_ref().map(|tools| {
			tools
				.iter()
				.filter_map(|t| match t {
					responses::Tool::Function(f) => {
						kept_functions.push(f.name.clone());
						let mut parameters = f.parameters.clone();
						if let Some(p) = parameters.as_mut() {
							schema::sanitize_schema(p);
						}
						Some(completions::Tool::Function(completions::FunctionTool {
							r#type: completions::FunctionTag::Function,
							function: completions::FunctionObject {
								name: f.name.clone(),
								description: f.description.clone(),
								parameters,
								strict: None,
							},
						}))
					},
					// web_search and friends do not exist on this surface
					responses::Tool::Other(_) => None,
				})
				.collect::<Vec<_>>()
		});
		let tools = tools.filter(|t| !t.is_empty());

		let tool_choice = req.tool_choice.as_ref().map(|tc| match tc {
			responses::ToolChoice::Mode(m) => completions::ToolChoice::Mode(m.trim().to_string()),
			responses::ToolChoice::Named(named) => match &named.name {
				Some(name) if kept_functions.contains(name) => {
					completions::ToolChoice::Named(completions::NamedToolChoice {
						r#type: "function".to_string(),
						name: None,
						function: Some(completions::FunctionName { name: name.clone() }),
					})
				},
				// Named a stripped (or nameless) tool: downgrade
				_ => completions::ToolChoice::Mode("auto".to_string()),
			},
		});

		let response_format = req
			.text
			.as_ref()
			.and_then(|t| t.format.as_ref())
			.map(|f| match f.r#type.as_str() {
				"json_schema" => {
					let mut schema_value = f.schema.clone();
					if let Some(s) = schema_value.as_mut() {
						schema::sanitize_schema(s);
					}
					completions::ResponseFormat {
						r#type: "json_schema".to_string(),
						json_schema: Some(completions::JsonSchemaSpec {
							name: f.name.clone(),
							description: f.description.clone(),
							schema: schema_value,
							strict: f.strict,
						}),
					}
				},
				other => completions::ResponseFormat {
					r#type: other.to_string(),
					json_schema: None,
				},
			});

		Ok(completions::Request {
			model: req.model.clone(),
			messages,
			max_completion_tokens: req.max_output_tokens,
			temperature: req.temperature,
			top_p: req.top_p,
			stream: req.stream,
			user: req.user.clone(),
			tools,
			tool_choice,
			response_format,
			reasoning_effort: req.reasoning.as_ref().and_then(|r| r.effort.clone()),
			..Default::default()
		})
	}

	fn translate_item(item: &responses::Item, messages: &mut Vec<completions::RequestMessage>) {
		match item {
			responses::Item::Message(m) => {
				messages.push(completions::RequestMessage {
					role: m.role.clone(),
					content: Some(message_content(&m.content)),
					..Default::default()
				});
			},
			responses::Item::FunctionCall(fc) => {
				let call = completions::ToolCall {
					id: fc.call_id.clone(),
					r#type: "function".to_string(),
					function: completions::FunctionCall {
						name: fc.name.clone(),
						arguments: fc.arguments.clone(),
					},
					rest: Value::Null,
				};
				// Consecutive function_call items collapse into one assistant turn
				match messages.last_mut() {
					Some(last) if last.role == "assistant" && last.tool_calls.is_some() => {
						last.tool_calls.as_mut().expect("checked").push(call);
					},
					_ => messages.push(completions::RequestMessage {
						role: "assistant".to_string(),
						tool_calls: Some(vec![call]),
						..Default::default()
					}),
				}
			},
			responses::Item::FunctionCallOutput(out) => {
				messages.push(completions::RequestMessage {
					role: "tool".to_string(),
					tool_call_id: Some(out.call_id.clone()),
					content: Some(completions::MessageContent::Text(out.output.clone())),
					..Default::default()
				});
			},
			// Reasoning items cannot be replayed into Chat Completions
			responses::Item::Reasoning(_) => {},
			responses::Item::WebSearchCall(_) | responses::Item::Other(_) => {},
		}
	}

	fn message_content(content: &responses::ItemContent) -> completions::MessageContent {
		match content {
			responses::ItemContent::Text(t) => completions::MessageContent::Text(t.clone()),
			responses::ItemContent::Parts(parts) => {
				let all_text = parts.iter().all(|p| {
					matches!(
						p,
						responses::ContentPart::InputText { .. }
							| responses::ContentPart::OutputText { .. }
					)
				});
				if all_text {
					let text = parts
						.iter()
						.filter_map(|p| match p {
							responses::ContentPart::InputText { text } => Some(text.as_str()),
							responses::ContentPart::OutputText { text, .. } => Some(text.as_str()),
							_ => None,
						})
						.join("\n");
					completions::MessageContent::Text(text)
				} else {
					completions::MessageContent::Parts(
						parts
							.iter()
							.filter_map(|p| match p {
								responses::ContentPart::InputText { text } => {
									Some(completions::ContentPart::Text { text: text.clone() })
								},
								responses::ContentPart::OutputText { text, .. } => {
									Some(completions::ContentPart::Text { text: text.clone() })
								},
								responses::ContentPart::InputImage { image_url, detail } => {
									Some(completions::ContentPart::ImageUrl {
										image_url: completions::ImageUrl {
											url: image_url.clone().unwrap_or_default(),
											detail: detail.clone(),
										},
									})
								},
								responses::ContentPart::Refusal { .. } => None,
								responses::ContentPart::Other(v) => {
									Some(completions::ContentPart::Other(v.clone()))
								},
							})
							.collect(),
					)
				}
			},
		}
	}

	/// Translates a Response API reply into a Chat Completions response body.
	pub fn translate_response(resp: &responses::Response) -> completions::Response {
		let mut content = String::new();
		let mut reasoning_content: Option<String> = None;
		let mut tool_calls: Vec<completions::ToolCall> = Vec::new();
		for item in &resp.output {
			match item {
				responses::Item::Message(m) => {
					if let responses::ItemContent::Parts(parts) = &m.content {
						for p in parts {
							if let responses::ContentPart::OutputText { text, .. } = p {
								content.push_str(text);
							}
						}
					} else if let responses::ItemContent::Text(t) = &m.content {
						content.push_str(t);
					}
				},
				responses::Item::FunctionCall(fc) => {
					tool_calls.push(completions::ToolCall {
						id: fc.call_id.clone(),
						r#type: "function".to_string(),
						function: completions::FunctionCall {
							name: fc.name.clone(),
							arguments: fc.arguments.clone(),
						},
						rest: Value::Null,
					});
				},
				responses::Item::Reasoning(r) => {
					let text = r.summary_text();
					if !text.is_empty() {
						reasoning_content = Some(text);
					}
				},
				responses::Item::FunctionCallOutput(_)
				| responses::Item::WebSearchCall(_)
				| responses::Item::Other(_) => {},
			}
		}

		let finish_reason = match resp.status.as_deref() {
			Some("incomplete") => "length",
			_ if !tool_calls.is_empty() => "tool_calls",
			_ => "stop",
		};

		completions::Response {
			id: resp.id.clone(),
			object: "chat.completion".to_string(),
			created: resp
				.created_at
				.unwrap_or_else(|| chrono::Utc::now().timestamp()),
			model: resp.model.clone().unwrap_or_default(),
			choices: vec![completions::Choice {
				index: 0,
				message: completions::ResponseMessage {
					role: "assistant".to_string(),
					content: (!content.is_empty() || tool_calls.is_empty()).then_some(content),
					reasoning_content,
					tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
					..Default::default()
				},
				finish_reason: Some(finish_reason.to_string()),
				rest: Value::Null,
			}],
			usage: resp.usage.as_ref().map(Usage::from_response_usage),
			rest: Value::Null,
		}
	}
}

/// Maps canonical usage back onto Response API counters.
pub fn to_response_usage(usage: &Usage) -> responses::ResponseUsage {
	responses::ResponseUsage {
		input_tokens: usage.prompt_tokens,
		output_tokens: usage.completion_tokens,
		total_tokens: usage.total_tokens,
		input_tokens_details: usage.prompt_tokens_details.as_ref().map(|d| {
			responses::InputTokensDetails {
				cached_tokens: d.cached_tokens,
				rest: Value::Null,
			}
		}),
		output_tokens_details: usage.completion_tokens_details.as_ref().map(|d| {
			responses::OutputTokensDetails {
				reasoning_tokens: d.reasoning_tokens,
				rest: Value::Null,
			}
		}),
		rest: Value::Null,
	}
}

/// Translates a Chat Completions reply into a Response API body, for clients
/// speaking the newer dialect against an older upstream.
pub fn response_from_completions(resp: &completions::Response) -> responses::Response {
	let mut output: Vec<responses::Item> = Vec::new();
	let choice = resp.choices.first();
	if let Some(choice) = choice {
		if let Some(reasoning) = choice
			.message
			.reasoning_content
			.as_ref()
			.filter(|r| !r.is_empty())
		{
			output.push(responses::Item::Reasoning(responses::ReasoningItem {
				r#type: "reasoning".to_string(),
				id: Some(format!("rs_{}", resp.id)),
				summary: vec![responses::SummaryPart {
					r#type: "summary_text".to_string(),
					text: reasoning.clone(),
				}],
				..Default::default()
			}));
		}
		if let Some(content) = choice.message.content.as_ref().filter(|c| !c.is_empty()) {
			output.push(responses::Item::Message(responses::MessageItem {
				r#type: Some("message".to_string()),
				id: Some(format!("msg_{}", resp.id)),
				role: "assistant".to_string(),
				content: responses::ItemContent::Parts(vec![responses::ContentPart::OutputText {
					text: content.clone(),
					annotations: None,
				}]),
				status: Some("completed".to_string()),
				rest: Value::Null,
			}));
		}
		for tc in choice.message.tool_calls.iter().flatten() {
			output.push(responses::Item::FunctionCall(responses::FunctionCallItem {
				r#type: "function_call".to_string(),
				id: Some(function_item_id(&tc.id)),
				call_id: ensure_call_prefix(&tc.id),
				name: tc.function.name.clone(),
				arguments: tc.function.arguments.clone(),
				status: Some("completed".to_string()),
				rest: Value::Null,
			}));
		}
	}

	let status = match choice.and_then(|c| c.finish_reason.as_deref()) {
		Some("length") => "incomplete",
		_ => "completed",
	};

	responses::Response {
		id: if resp.id.starts_with("resp_") {
			resp.id.clone()
		} else {
			format!("resp_{}", resp.id)
		},
		object: Some("response".to_string()),
		created_at: Some(resp.created),
		status: Some(status.to_string()),
		model: Some(resp.model.clone()),
		output,
		usage: resp.usage.as_ref().map(to_response_usage),
		..Default::default()
	}
}

/// Observes a Response API passthrough stream, accumulating usage (idempotent
/// per response id) and chargeable web search calls.
pub fn passthrough_stream(body: Body, limit: usize, recorder: UsageRecorder) -> Body {
	parse::sse::json_passthrough::<responses::StreamEvent, _>(body, limit, move |event| {
		let Some(event) = event else { return };
		let event = match event {
			Ok(ev) => ev,
			Err(e) => {
				debug!("failed to parse responses stream event: {e}");
				return;
			},
		};
		observe_event(&event, &recorder);
	})
}

fn observe_event(event: &responses::StreamEvent, recorder: &UsageRecorder) {
	if let Some(resp) = &event.response {
		if let Some(usage) = &resp.usage {
			recorder.record_response_usage(&resp.id, usage);
		}
	}
	if event.r#type == "response.output_item.done" {
		if let Some(responses::Item::WebSearchCall(call)) = &event.item {
			let action_type = call
				.action
				.as_ref()
				.and_then(|a| a.get("type"))
				.and_then(Value::as_str)
				.unwrap_or_default();
			if matches!(action_type, "" | "search") {
				let key = call
					.id
					.clone()
					.or_else(|| {
						call
							.action
							.as_ref()
							.and_then(|a| a.get("query"))
							.and_then(Value::as_str)
							.map(|q| format!("query:{q}"))
					})
					.unwrap_or_else(|| format!("anon-{}", event.output_index.unwrap_or_default()));
				recorder.record_web_search(&key);
			}
		}
	}
}

/// Rewrites a Response API event stream into Chat Completions chunks.
///
/// Text accumulates from `*.delta` events only; `*.done` events repeat the
/// full text and must never re-accumulate. `response.completed` produces one
/// trailing chunk with an empty content delta and the terminal usage.
pub fn stream_to_completions(
	body: Body,
	limit: usize,
	recorder: UsageRecorder,
	fallback_model: String,
) -> Body {
	let mut state = StreamState::new(fallback_model);
	parse::sse::json_transform::<responses::StreamEvent, completions::StreamResponse, _>(
		body,
		limit,
		move |event| {
			let event = match event {
				Ok(ev) => ev,
				Err(e) => {
					debug!("failed to parse responses stream event: {e}");
					return None;
				},
			};
			state.translate(event, &recorder)
		},
	)
}

struct StreamState {
	id: String,
	model: String,
	created: i64,
	first_chunk: bool,
	saw_tool_calls: bool,
	next_tool_index: u32,
	/// item_id -> chat tool_calls index, assigned when the call item appears.
	tool_indices: std::collections::HashMap<String, u32>,
}

impl StreamState {
	fn new(fallback_model: String) -> Self {
		StreamState {
			id: String::new(),
			model: fallback_model,
			created: chrono::Utc::now().timestamp(),
			first_chunk: true,
			saw_tool_calls: false,
			next_tool_index: 0,
			tool_indices: Default::default(),
		}
	}

	fn chunk(&mut self, mut choice: completions::ChunkChoice) -> completions::StreamResponse {
		if self.first_chunk {
			self.first_chunk = false;
			choice.delta.role = Some("assistant".to_string());
		}
		completions::StreamResponse::chunk(&self.id, &self.model, self.created, vec![choice])
	}

	fn tool_index(&mut self, item_id: Option<&str>, output_index: Option<u32>) -> u32 {
		if let Some(id) = item_id {
			if let Some(idx) = self.tool_indices.get(id) {
				return *idx;
			}
		}
		// Index derives from the event's output_index; fall back to arrival
		// order so argument deltas still land on distinct calls.
		let idx = output_index.unwrap_or(self.next_tool_index);
		self.next_tool_index = self.next_tool_index.max(idx) + 1;
		if let Some(id) = item_id {
			self.tool_indices.insert(id.to_string(), idx);
		}
		idx
	}

	fn translate(
		&mut self,
		event: responses::StreamEvent,
		recorder: &UsageRecorder,
	) -> Option<completions::StreamResponse> {
		observe_event(&event, recorder);
		match event.r#type.as_str() {
			"response.created" | "response.in_progress" => {
				if let Some(resp) = &event.response {
					self.id = resp.id.clone();
					if let Some(model) = &resp.model {
						self.model = model.clone();
					}
					if let Some(created) = resp.created_at {
						self.created = created;
					}
				}
				None
			},
			"response.output_text.delta" => {
				let text = event.delta_str()?.to_string();
				recorder.append_completion(&text);
				Some(self.chunk(completions::ChunkChoice {
					index: 0,
					delta: completions::Delta {
						content: Some(text),
						..Default::default()
					},
					finish_reason: None,
					rest: Value::Null,
				}))
			},
			"response.reasoning_summary_text.delta" | "response.reasoning_text.delta" => {
				let text = event.delta_str()?.to_string();
				Some(self.chunk(completions::ChunkChoice {
					index: 0,
					delta: completions::Delta {
						reasoning_content: Some(text),
						..Default::default()
					},
					finish_reason: None,
					rest: Value::Null,
				}))
			},
			"response.output_item.added" => {
				let responses::Item::FunctionCall(fc) = event.item.as_ref()? else {
					return None;
				};
				let index = self.tool_index(fc.id.as_deref(), event.output_index);
				self.saw_tool_calls = true;
				Some(self.chunk(completions::ChunkChoice {
					index: 0,
					delta: completions::Delta {
						tool_calls: Some(vec![completions::ToolCallDelta {
							index: Some(index),
							id: Some(fc.call_id.clone()),
							r#type: Some("function".to_string()),
							function: Some(completions::FunctionCallDelta {
								name: Some(fc.name.clone()),
								arguments: Some(fc.arguments.clone()),
							}),
						}]),
						..Default::default()
					},
					finish_reason: None,
					rest: Value::Null,
				}))
			},
			"response.function_call_arguments.delta" => {
				let arguments = event.delta_str()?.to_string();
				let index = self.tool_index(event.item_id.as_deref(), event.output_index);
				Some(self.chunk(completions::ChunkChoice {
					index: 0,
					delta: completions::Delta {
						tool_calls: Some(vec![completions::ToolCallDelta {
							index: Some(index),
							function: Some(completions::FunctionCallDelta {
								name: None,
								arguments: Some(arguments),
							}),
							..Default::default()
						}]),
						..Default::default()
					},
					finish_reason: None,
					rest: Value::Null,
				}))
			},
			"response.completed" => {
				let usage = event
					.response
					.as_ref()
					.and_then(|r| r.usage.as_ref())
					.map(Usage::from_response_usage)
					.unwrap_or_else(|| recorder.snapshot());
				let finish = if self.saw_tool_calls {
					"tool_calls"
				} else {
					"stop"
				};
				let mut chunk = self.chunk(completions::ChunkChoice {
					index: 0,
					delta: completions::Delta {
						content: Some(String::new()),
						..Default::default()
					},
					finish_reason: Some(finish.to_string()),
					rest: Value::Null,
				});
				chunk.usage = Some(usage);
				Some(chunk)
			},
			// `*.done` events repeat already-streamed content; accumulating
			// them would duplicate every token.
			_ => None,
		}
	}
}

/// Rewrites a Chat Completions chunk stream into Response API events, for
/// clients speaking the newer dialect against an older upstream.
pub fn completions_stream_to_responses(body: Body, limit: usize, recorder: UsageRecorder) -> Body {
	let mut state = ReverseStreamState::default();
	parse::sse::named_transform::<completions::StreamResponse, responses::StreamEvent, _>(
		body,
		limit,
		move |chunk| match chunk {
			Some(Ok(c)) => state.translate(c, &recorder),
			Some(Err(e)) => {
				debug!("failed to parse completions stream chunk: {e}");
				Vec::new()
			},
			None => state.finalize(&recorder),
		},
	)
}

#[derive(Default)]
struct ReverseStreamState {
	response_id: String,
	model: String,
	created: i64,
	started: bool,
	text_open: bool,
	text: String,
	output_index: u32,
	sequence: u64,
	/// chat tool_calls index -> (item id, call id, name, accumulated args)
	open_calls: std::collections::HashMap<u32, (String, String, String, String)>,
	finished: bool,
	usage: Option<Usage>,
	finish_reason: Option<String>,
}

impl ReverseStreamState {
	/// Allocates the next event; the returned name doubles as the SSE
	/// `event:` frame so it is written once per call site.
	fn event(&mut self, name: &'static str) -> (&'static str, responses::StreamEvent) {
		self.sequence += 1;
		(
			name,
			responses::StreamEvent {
				r#type: name.to_string(),
				sequence_number: Some(self.sequence),
				..Default::default()
			},
		)
	}

	fn snapshot(&self, status: &str) -> responses::Response {
		responses::Response {
			id: self.response_id.clone(),
			object: Some("response".to_string()),
			created_at: Some(self.created),
			status: Some(status.to_string()),
			model: Some(self.model.clone()),
			..Default::default()
		}
	}

	fn translate(
		&mut self,
		chunk: completions::StreamResponse,
		recorder: &UsageRecorder,
	) -> Vec<(&'static str, responses::StreamEvent)> {
		let mut out: Vec<(&'static str, responses::StreamEvent)> = Vec::new();
		if self.finished {
			return out;
		}
		if !self.started {
			self.started = true;
			self.response_id = if chunk.id.starts_with("resp_") {
				chunk.id.clone()
			} else {
				format!("resp_{}", chunk.id)
			};
			self.model = chunk.model.clone();
			self.created = chunk.created;
			let (name, mut ev) = self.event("response.created");
			ev.response = Some(self.snapshot("in_progress"));
			out.push((name, ev));
		}

		if let Some(usage) = &chunk.usage {
			if !usage.is_empty() {
				self.usage = Some(usage.clone());
			}
		}

		for choice in &chunk.choices {
			if let Some(text) = choice.delta.content.as_ref().filter(|t| !t.is_empty()) {
				if !self.text_open {
					self.text_open = true;
					let (name, mut ev) = self.event("response.output_item.added");
					ev.output_index = Some(self.output_index);
					ev.item = Some(responses::Item::Message(responses::MessageItem {
						r#type: Some("message".to_string()),
						id: Some(format!("msg_{}", self.response_id)),
						role: "assistant".to_string(),
						content: responses::ItemContent::Parts(Vec::new()),
						status: Some("in_progress".to_string()),
						rest: Value::Null,
					}));
					out.push((name, ev));
				}
				self.text.push_str(text);
				recorder.append_completion(text);
				let (name, mut ev) = self.event("response.output_text.delta");
				ev.item_id = Some(format!("msg_{}", self.response_id));
				ev.output_index = Some(self.output_index);
				ev.content_index = Some(0);
				ev.delta = Some(Value::String(text.clone()));
				out.push((name, ev));
			}
			for tc in choice.delta.tool_calls.iter().flatten() {
				let index = tc.index.unwrap_or(0);
				if let Some(id) = &tc.id {
					// New call starts; close the text item if one is open
					self.close_text(&mut out);
					let name = tc
						.function
						.as_ref()
						.and_then(|f| f.name.clone())
						.unwrap_or_default();
					let item_id = function_item_id(id);
					self.open_calls.insert(
						index,
						(item_id.clone(), ensure_call_prefix(id), name.clone(), String::new()),
					);
					self.output_index += 1;
					let (ev_name, mut ev) = self.event("response.output_item.added");
					ev.output_index = Some(self.output_index);
					ev.item = Some(responses::Item::FunctionCall(responses::FunctionCallItem {
						r#type: "function_call".to_string(),
						id: Some(item_id),
						call_id: ensure_call_prefix(id),
						name,
						arguments: String::new(),
						status: Some("in_progress".to_string()),
						rest: Value::Null,
					}));
					out.push((ev_name, ev));
				}
				if let Some(args) = tc.function.as_ref().and_then(|f| f.arguments.as_ref()) {
					if !args.is_empty() {
						if let Some((item_id, _, _, acc)) = self.open_calls.get_mut(&index) {
							acc.push_str(args);
							let item_id = item_id.clone();
							let (name, mut ev) = self.event("response.function_call_arguments.delta");
							ev.item_id = Some(item_id);
							ev.output_index = Some(self.output_index);
							ev.delta = Some(Value::String(args.clone()));
							out.push((name, ev));
						}
					}
				}
			}
			if let Some(reason) = &choice.finish_reason {
				self.finish_reason = Some(reason.clone());
			}
		}

		// Close out as soon as the terminal usage chunk arrives. Upstreams
		// that never report usage are handled by `finalize` at stream end.
		if self.finish_reason.is_some() && self.usage.is_some() {
			self.finish(&mut out, recorder);
		}
		out
	}

	/// Stream-end hook: some compatible upstreams ignore
	/// `stream_options.include_usage` and close after the finish_reason
	/// chunk, so the terminal event train must not depend on usage arriving.
	fn finalize(&mut self, recorder: &UsageRecorder) -> Vec<(&'static str, responses::StreamEvent)> {
		let mut out = Vec::new();
		if self.started && !self.finished {
			self.finish(&mut out, recorder);
		}
		out
	}

	fn close_text(&mut self, out: &mut Vec<(&'static str, responses::StreamEvent)>) {
		if !self.text_open {
			return;
		}
		self.text_open = false;
		let (name, mut ev) = self.event("response.output_text.done");
		ev.item_id = Some(format!("msg_{}", self.response_id));
		ev.output_index = Some(self.output_index);
		ev.content_index = Some(0);
		ev.text = Some(self.text.clone());
		out.push((name, ev));
		let (name, mut ev) = self.event("response.output_item.done");
		ev.output_index = Some(self.output_index);
		ev.item = Some(responses::Item::Message(responses::MessageItem {
			r#type: Some("message".to_string()),
			id: Some(format!("msg_{}", self.response_id)),
			role: "assistant".to_string(),
			content: responses::ItemContent::Parts(vec![responses::ContentPart::OutputText {
				text: self.text.clone(),
				annotations: None,
			}]),
			status: Some("completed".to_string()),
			rest: Value::Null,
		}));
		out.push((name, ev));
	}

	fn finish(
		&mut self,
		out: &mut Vec<(&'static str, responses::StreamEvent)>,
		recorder: &UsageRecorder,
	) {
		self.finished = true;
		self.close_text(out);
		let open_calls = std::mem::take(&mut self.open_calls);
		let mut calls: Vec<_> = open_calls.into_iter().collect();
		calls.sort_by_key(|(index, _)| *index);
		for (_, (item_id, call_id, fn_name, args)) in calls {
			let (name, mut ev) = self.event("response.function_call_arguments.done");
			ev.item_id = Some(item_id.clone());
			out.push((name, ev));
			let (name, mut ev) = self.event("response.output_item.done");
			ev.item = Some(responses::Item::FunctionCall(responses::FunctionCallItem {
				r#type: "function_call".to_string(),
				id: Some(item_id),
				call_id,
				name: fn_name,
				arguments: args,
				status: Some("completed".to_string()),
				rest: Value::Null,
			}));
			out.push((name, ev));
		}

		let usage = self.usage.clone().unwrap_or_default();
		if let Some(u) = &self.usage {
			recorder.mutate(|r| *r = u.clone());
		}
		let status = if self.finish_reason.as_deref() == Some("length") {
			"incomplete"
		} else {
			"completed"
		};
		let mut snapshot = self.snapshot(status);
		snapshot.usage = Some(to_response_usage(&usage));
		let (name, mut ev) = self.event("response.completed");
		ev.response = Some(snapshot);
		out.push((name, ev));
	}
}

//! Claude Messages <-> OpenAI translation: requests to either OpenAI dialect,
//! replies and streams back into Claude shape.

use serde_json::Value;
use tracing::debug;

use crate::Body;
use crate::parse;
use crate::relay::error::RelayError;
use crate::relay::types::{claude, completions, responses};
use crate::relay::usage::{Usage, UsageRecorder};

pub fn map_stop_reason(finish_reason: &str) -> &'static str {
	match finish_reason {
		"length" => "max_tokens",
		"tool_calls" | "function_call" => "tool_use",
		"content_filter" => "stop_sequence",
		_ => "end_turn",
	}
}

pub mod from_claude {
	use super::*;

	/// Translates a Claude Messages request into a Chat Completions request.
	/// `deepseek_thinking` applies the channel coercion that only understands
	/// `enabled`/`disabled` thinking types.
	pub fn translate(
		req: &claude::Request,
		deepseek_thinking: bool,
	) -> Result<completions::Request, RelayError> {
		let mut messages: Vec<completions::RequestMessage> = Vec::new();
		if let Some(system) = &req.system {
			let text = system.joined();
			if !text.is_empty() {
				messages.push(completions::RequestMessage {
					role: "system".to_string(),
					content: Some(completions::MessageContent::Text(text)),
					..Default::default()
				});
			}
		}

		for msg in &req.messages {
			match msg.role {
				claude::Role::User => translate_user_message(msg, &mut messages),
				claude::Role::Assistant => translate_assistant_message(msg, &mut messages),
			}
		}

		let tools = req.tools.as_ref().map(|tools| {
			tools
				.iter()
				.map(|t| {
					completions::Tool::Function(completions::FunctionTool {
						r#type: completions::FunctionTag::Function,
						function: completions::FunctionObject {
							name: t.name.clone(),
							description: t.description.clone(),
							parameters: Some(t.input_schema.clone()),
							strict: None,
						},
					})
				})
				.collect()
		});

		let tool_choice = req.tool_choice.as_ref().map(|tc| match tc {
			claude::ToolChoice::Auto => completions::ToolChoice::Mode("auto".to_string()),
			claude::ToolChoice::Any => completions::ToolChoice::Mode("required".to_string()),
			claude::ToolChoice::None => completions::ToolChoice::Mode("none".to_string()),
			claude::ToolChoice::Tool { name } => {
				completions::ToolChoice::Named(completions::NamedToolChoice {
					r#type: "function".to_string(),
					name: None,
					function: Some(completions::FunctionName { name: name.clone() }),
				})
			},
		});

		let thinking = req.thinking.as_ref().map(|t| {
			let mut out = completions::Thinking {
				r#type: t.r#type.clone(),
				budget_tokens: t.budget_tokens,
				rest: Value::Null,
			};
			if deepseek_thinking && matches!(t.r#type.as_str(), "adaptive" | "auto" | "") {
				out.r#type = if t.budget_tokens.is_some_and(|b| b > 0) {
					"enabled".to_string()
				} else {
					"disabled".to_string()
				};
			}
			out
		});

		Ok(completions::Request {
			model: Some(req.model.clone()),
			messages,
			max_tokens: Some(req.max_tokens as u32),
			temperature: req.temperature,
			top_p: req.top_p,
			stream: req.stream,
			stop: (!req.stop_sequences.is_empty())
				.then(|| serde_json::to_value(&req.stop_sequences).unwrap_or_default()),
			tools,
			tool_choice,
			thinking,
			..Default::default()
		})
	}

	fn translate_user_message(msg: &claude::Message, out: &mut Vec<completions::RequestMessage>) {
		let mut parts: Vec<completions::ContentPart> = Vec::new();
		for block in &msg.content {
			match block {
				claude::ContentBlock::Text { text } => {
					parts.push(completions::ContentPart::Text { text: text.clone() });
				},
				claude::ContentBlock::Image { source } => {
					let url = match source.r#type.as_str() {
						"base64" => format!(
							"data:{};base64,{}",
							source.media_type.as_deref().unwrap_or("image/png"),
							source.data.as_deref().unwrap_or_default()
						),
						_ => source.url.clone().unwrap_or_default(),
					};
					parts.push(completions::ContentPart::ImageUrl {
						image_url: completions::ImageUrl { url, detail: None },
					});
				},
				// Tool results become their own tool-role turns
				claude::ContentBlock::ToolResult {
					tool_use_id,
					content,
					..
				} => {
					out.push(completions::RequestMessage {
						role: "tool".to_string(),
						tool_call_id: Some(tool_use_id.clone()),
						content: Some(completions::MessageContent::Text(content.joined_text())),
						..Default::default()
					});
				},
				_ => {},
			}
		}
		if !parts.is_empty() {
			let content = if parts.len() == 1 {
				if let completions::ContentPart::Text { text } = &parts[0] {
					completions::MessageContent::Text(text.clone())
				} else {
					completions::MessageContent::Parts(parts)
				}
			} else {
				completions::MessageContent::Parts(parts)
			};
			out.push(completions::RequestMessage {
				role: "user".to_string(),
				content: Some(content),
				..Default::default()
			});
		}
	}

	fn translate_assistant_message(
		msg: &claude::Message,
		out: &mut Vec<completions::RequestMessage>,
	) {
		let mut text: Option<String> = None;
		let mut reasoning: Option<String> = None;
		let mut tool_calls: Vec<completions::ToolCall> = Vec::new();
		for block in &msg.content {
			match block {
				claude::ContentBlock::Text { text: t } => text = Some(t.clone()),
				claude::ContentBlock::Thinking { thinking, .. } => reasoning = Some(thinking.clone()),
				claude::ContentBlock::ToolUse { id, name, input } => {
					tool_calls.push(completions::ToolCall {
						id: id.clone(),
						r#type: "function".to_string(),
						function: completions::FunctionCall {
							name: name.clone(),
							arguments: serde_json::to_string(input).unwrap_or_default(),
						},
						rest: Value::Null,
					});
				},
				_ => {},
			}
		}
		if text.is_some() || reasoning.is_some() || !tool_calls.is_empty() {
			out.push(completions::RequestMessage {
				role: "assistant".to_string(),
				content: text.map(completions::MessageContent::Text),
				reasoning_content: reasoning,
				tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
				..Default::default()
			});
		}
	}
}

pub mod to_claude {
	use super::*;

	/// Re-encodes a Chat Completions reply as a Claude message.
	pub fn translate_response(resp: &completions::Response) -> claude::Response {
		let mut content: Vec<claude::ContentBlock> = Vec::new();
		let mut stop_reason = "end_turn".to_string();
		if let Some(choice) = resp.choices.first() {
			let reasoning = choice
				.message
				.reasoning_content
				.as_ref()
				.or(choice.message.thinking.as_ref());
			if let Some(thinking) = reasoning.filter(|r| !r.is_empty()) {
				content.push(claude::ContentBlock::Thinking {
					thinking: thinking.clone(),
					signature: String::new(),
				});
			}
			if let Some(text) = choice.message.content.as_ref().filter(|c| !c.is_empty()) {
				content.push(claude::ContentBlock::Text { text: text.clone() });
			}
			for tc in choice.message.tool_calls.iter().flatten() {
				content.push(claude::ContentBlock::ToolUse {
					id: tc.id.clone(),
					name: tc.function.name.clone(),
					input: serde_json::from_str(&tc.function.arguments)
						.unwrap_or_else(|_| Value::Object(Default::default())),
				});
			}
			if let Some(reason) = &choice.finish_reason {
				stop_reason = map_stop_reason(reason).to_string();
			}
		}

		let usage = resp.usage.clone().unwrap_or_default();
		claude::Response {
			id: if resp.id.starts_with("msg_") {
				resp.id.clone()
			} else {
				format!("msg_{}", resp.id)
			},
			r#type: "message".to_string(),
			role: claude::Role::Assistant,
			content,
			model: resp.model.clone(),
			stop_reason: Some(stop_reason),
			stop_sequence: None,
			usage: claude::Usage {
				input_tokens: usage.prompt_tokens,
				output_tokens: usage.completion_tokens,
				cache_read_input_tokens: usage
					.prompt_tokens_details
					.as_ref()
					.map(|d| d.cached_tokens),
				cache_creation_input_tokens: None,
			},
		}
	}

	/// Re-encodes a Response API reply as a Claude message.
	pub fn translate_responses_response(resp: &responses::Response) -> claude::Response {
		let openai = super::super::responses::to_completions::translate_response(resp);
		translate_response(&openai)
	}

	/// Rewrites a Chat Completions chunk stream into Claude stream events.
	/// The SSE `event:` names come from [`claude::StreamEvent::event_name`].
	pub fn translate_stream(body: Body, limit: usize, recorder: UsageRecorder) -> Body {
		let mut state = StreamState::default();
		let named = |events: Vec<claude::StreamEvent>| {
			events.into_iter().map(|ev| (ev.event_name(), ev)).collect()
		};
		parse::sse::named_transform::<completions::StreamResponse, claude::StreamEvent, _>(
			body,
			limit,
			move |chunk| match chunk {
				Some(Ok(c)) => named(state.translate(c, &recorder)),
				Some(Err(e)) => {
					debug!("failed to parse completions stream chunk: {e}");
					Vec::new()
				},
				None => named(state.finalize(&recorder)),
			},
		)
	}

	#[derive(Default, PartialEq)]
	enum OpenBlock {
		#[default]
		None,
		Thinking,
		Text,
		ToolUse,
	}

	#[derive(Default)]
	struct StreamState {
		started: bool,
		finished: bool,
		block: OpenBlock,
		block_index: usize,
		finish_reason: Option<String>,
		usage: Option<Usage>,
	}

	impl StreamState {
		fn close_block(&mut self, out: &mut Vec<claude::StreamEvent>) {
			if self.block == OpenBlock::None {
				return;
			}
			out.push(claude::StreamEvent::ContentBlockStop {
				index: self.block_index,
			});
			self.block = OpenBlock::None;
			self.block_index += 1;
		}

		fn open_block(
			&mut self,
			kind: OpenBlock,
			content_block: claude::ContentBlock,
			out: &mut Vec<claude::StreamEvent>,
		) {
			self.close_block(out);
			out.push(claude::StreamEvent::ContentBlockStart {
				index: self.block_index,
				content_block,
			});
			self.block = kind;
		}

		fn translate(
			&mut self,
			chunk: completions::StreamResponse,
			recorder: &UsageRecorder,
		) -> Vec<claude::StreamEvent> {
			let mut out: Vec<claude::StreamEvent> = Vec::new();
			if self.finished {
				return out;
			}
			if !self.started {
				self.started = true;
				out.push(claude::StreamEvent::MessageStart {
					message: claude::Response {
						id: if chunk.id.starts_with("msg_") {
							chunk.id.clone()
						} else {
							format!("msg_{}", chunk.id)
						},
						r#type: "message".to_string(),
						role: claude::Role::Assistant,
						content: Vec::new(),
						model: chunk.model.clone(),
						stop_reason: None,
						stop_sequence: None,
						usage: claude::Usage::default(),
					},
				});
			}

			if let Some(usage) = &chunk.usage {
				if !usage.is_empty() {
					self.usage = Some(usage.clone());
				}
			}

			for choice in &chunk.choices {
				if let Some(thinking) = choice
					.delta
					.reasoning_content
					.as_ref()
					.filter(|t| !t.is_empty())
				{
					if self.block != OpenBlock::Thinking {
						self.open_block(
							OpenBlock::Thinking,
							claude::ContentBlock::Thinking {
								thinking: String::new(),
								signature: String::new(),
							},
							&mut out,
						);
					}
					out.push(claude::StreamEvent::ContentBlockDelta {
						index: self.block_index,
						delta: claude::BlockDelta::ThinkingDelta {
							thinking: thinking.clone(),
						},
					});
				}
				if let Some(text) = choice.delta.content.as_ref().filter(|t| !t.is_empty()) {
					recorder.append_completion(text);
					if self.block != OpenBlock::Text {
						self.open_block(
							OpenBlock::Text,
							claude::ContentBlock::Text {
								text: String::new(),
							},
							&mut out,
						);
					}
					out.push(claude::StreamEvent::ContentBlockDelta {
						index: self.block_index,
						delta: claude::BlockDelta::TextDelta { text: text.clone() },
					});
				}
				for tc in choice.delta.tool_calls.iter().flatten() {
					if let Some(id) = &tc.id {
						self.open_block(
							OpenBlock::ToolUse,
							claude::ContentBlock::ToolUse {
								id: id.clone(),
								name: tc
									.function
									.as_ref()
									.and_then(|f| f.name.clone())
									.unwrap_or_default(),
								input: Value::Object(Default::default()),
							},
							&mut out,
						);
					}
					if let Some(args) = tc.function.as_ref().and_then(|f| f.arguments.as_ref()) {
						if !args.is_empty() && self.block == OpenBlock::ToolUse {
							out.push(claude::StreamEvent::ContentBlockDelta {
								index: self.block_index,
								delta: claude::BlockDelta::InputJsonDelta {
									partial_json: args.clone(),
								},
							});
						}
					}
				}
				if let Some(reason) = &choice.finish_reason {
					self.finish_reason = Some(reason.clone());
				}
			}

			// Finish as soon as the terminal usage chunk arrives; upstreams
			// that never send one are closed out by `finalize`
			if self.finish_reason.is_some() && self.usage.is_some() {
				self.finish(&mut out, recorder);
			}
			out
		}

		/// Stream-end hook. The Anthropic stream contract requires
		/// `message_delta` and `message_stop` even when the upstream dropped
		/// the connection without reporting usage.
		fn finalize(&mut self, recorder: &UsageRecorder) -> Vec<claude::StreamEvent> {
			let mut out = Vec::new();
			if self.started && !self.finished {
				self.finish(&mut out, recorder);
			}
			out
		}

		fn finish(&mut self, out: &mut Vec<claude::StreamEvent>, recorder: &UsageRecorder) {
			self.finished = true;
			self.close_block(out);
			let usage = self.usage.clone().unwrap_or_default();
			if let Some(u) = &self.usage {
				recorder.mutate(|r| *r = u.clone());
			}
			out.push(claude::StreamEvent::MessageDelta {
				delta: claude::MessageDelta {
					stop_reason: self
						.finish_reason
						.as_deref()
						.map(|r| map_stop_reason(r).to_string()),
					stop_sequence: None,
				},
				usage: claude::Usage {
					input_tokens: usage.prompt_tokens,
					output_tokens: usage.completion_tokens,
					cache_creation_input_tokens: None,
					cache_read_input_tokens: usage
						.prompt_tokens_details
						.as_ref()
						.map(|d| d.cached_tokens),
				},
			});
			out.push(claude::StreamEvent::MessageStop);
		}
	}
}

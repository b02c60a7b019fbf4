use http_body_util::BodyExt;
use serde_json::{Value, json};

use crate::Body;
use crate::relay::conversion::{claude as claude_conv, responses as resp_conv};
use crate::relay::types::{claude, completions, responses};
use crate::relay::usage::UsageRecorder;

fn completions_request(v: Value) -> completions::Request {
	serde_json::from_value(v).unwrap()
}

fn responses_request(v: Value) -> responses::Request {
	serde_json::from_value(v).unwrap()
}

#[test]
fn system_messages_become_instructions() {
	let req = completions_request(json!({
		"model": "gpt-5",
		"messages": [
			{"role": "system", "content": "first"},
			{"role": "system", "content": "second"},
			{"role": "user", "content": "hi"}
		]
	}));
	let out = resp_conv::from_completions::translate(&req).unwrap();
	assert_eq!(out.instructions.as_deref(), Some("first\nsecond"));
	let items = out.input.items();
	assert_eq!(items.len(), 1);
	let responses::Item::Message(m) = &items[0] else {
		panic!("expected message")
	};
	assert_eq!(m.role, "user");
}

#[test]
fn tool_calls_pair_with_outputs() {
	let req = completions_request(json!({
		"model": "gpt-5",
		"messages": [
			{"role": "user", "content": "weather in sf"},
			{"role": "assistant", "tool_calls": [
				{"id": "call_abc", "type": "function",
				 "function": {"name": "get_weather", "arguments": "{\"city\":\"sf\"}"}}
			]},
			{"role": "tool", "tool_call_id": "call_abc", "content": ""}
		]
	}));
	let out = resp_conv::from_completions::translate(&req).unwrap();
	let items = out.input.items();
	assert_eq!(items.len(), 3);
	let responses::Item::FunctionCall(fc) = &items[1] else {
		panic!("expected function call")
	};
	assert_eq!(fc.call_id, "call_abc");
	assert_eq!(fc.id.as_deref(), Some("fc_abc"));
	assert_eq!(fc.name, "get_weather");
	let responses::Item::FunctionCallOutput(out_item) = &items[2] else {
		panic!("expected function call output")
	};
	assert_eq!(out_item.call_id, "call_abc");
	// Empty tool output still serializes the output field
	let raw = serde_json::to_value(out_item).unwrap();
	assert_eq!(raw.get("output").unwrap(), "");
}

#[test]
fn tool_choice_flattens_for_response_api() {
	let req = completions_request(json!({
		"model": "gpt-5",
		"messages": [{"role": "user", "content": "hi"}],
		"tool_choice": {"type": "function", "function": {"name": "get_weather"}}
	}));
	let out = resp_conv::from_completions::translate(&req).unwrap();
	let raw = serde_json::to_value(out.tool_choice.as_ref().unwrap()).unwrap();
	// Flat shape: no nested function block
	assert_eq!(raw, json!({"type": "function", "name": "get_weather"}));
}

#[test]
fn reasoning_summary_replaces_encrypted_block() {
	let req = completions_request(json!({
		"model": "gpt-5",
		"messages": [
			{"role": "user", "content": "hi"},
			{"role": "assistant", "content": [
				{"type": "reasoning", "encrypted_content": "opaque",
				 "summary": [{"type": "summary_text", "text": "thought about it"}]}
			]},
			{"role": "user", "content": "and then?"}
		]
	}));
	let out = resp_conv::from_completions::translate(&req).unwrap();
	let items = out.input.items();
	assert_eq!(items.len(), 3);
	let responses::Item::Message(m) = &items[1] else {
		panic!("expected message")
	};
	let responses::ItemContent::Parts(parts) = &m.content else {
		panic!("expected parts")
	};
	assert!(
		matches!(&parts[0], responses::ContentPart::OutputText { text, .. } if text == "thought about it")
	);
}

#[test]
fn encrypted_reasoning_without_summary_drops_message() {
	let req = completions_request(json!({
		"model": "gpt-5",
		"messages": [
			{"role": "user", "content": "hi"},
			{"role": "assistant", "content": [
				{"type": "reasoning", "encrypted_content": "opaque"}
			]},
			{"role": "user", "content": "and then?"}
		]
	}));
	let out = resp_conv::from_completions::translate(&req).unwrap();
	// The unverifiable assistant turn is gone
	assert_eq!(out.input.items().len(), 2);
}

#[test]
fn vendor_tools_keep_their_fields() {
	let req = completions_request(json!({
		"model": "gpt-5",
		"messages": [{"role": "user", "content": "hi"}],
		"tools": [
			{"type": "mcp", "server_label": "wiki", "server_url": "https://mcp.example.com",
			 "require_approval": "never", "allowed_tools": ["read"]},
			{"type": "web_search", "search_context_size": "high"}
		]
	}));
	let out = resp_conv::from_completions::translate(&req).unwrap();
	let raw = serde_json::to_value(out.tools.as_ref().unwrap()).unwrap();
	assert_eq!(raw[0].get("server_label").unwrap(), "wiki");
	assert_eq!(raw[0].get("allowed_tools").unwrap(), &json!(["read"]));
	assert_eq!(raw[1].get("search_context_size").unwrap(), "high");
}

#[test]
fn reasoning_config_defaults() {
	let req = completions_request(json!({
		"model": "o4-mini",
		"messages": [{"role": "user", "content": "hi"}]
	}));
	let out = resp_conv::from_completions::translate(&req).unwrap();
	let reasoning = out.reasoning.as_ref().unwrap();
	assert_eq!(reasoning.effort.as_deref(), Some("medium"));
	assert_eq!(reasoning.summary.as_deref(), Some("detailed"));

	let req = completions_request(json!({
		"model": "gpt-5",
		"messages": [{"role": "user", "content": "hi"}],
		"reasoning_effort": "high"
	}));
	let out = resp_conv::from_completions::translate(&req).unwrap();
	let reasoning = out.reasoning.as_ref().unwrap();
	assert_eq!(reasoning.effort.as_deref(), Some("high"));
	assert_eq!(reasoning.summary.as_deref(), Some("auto"));

	// Non-reasoning models carry no reasoning config
	let req = completions_request(json!({
		"model": "gpt-4o",
		"messages": [{"role": "user", "content": "hi"}]
	}));
	assert!(
		resp_conv::from_completions::translate(&req)
			.unwrap()
			.reasoning
			.is_none()
	);
}

#[test]
fn response_format_maps_to_text_format() {
	let req = completions_request(json!({
		"model": "gpt-5",
		"messages": [{"role": "user", "content": "hi"}],
		"response_format": {"type": "json_schema", "json_schema": {
			"name": "weather", "schema": {"type": "object"}, "strict": true
		}}
	}));
	let out = resp_conv::from_completions::translate(&req).unwrap();
	let format = out.text.unwrap().format.unwrap();
	assert_eq!(format.r#type, "json_schema");
	assert_eq!(format.name.as_deref(), Some("weather"));
	assert_eq!(format.schema.unwrap(), json!({"type": "object"}));
	assert_eq!(format.strict, Some(true));
}

#[test]
fn responses_request_round_trips_through_completions() {
	let original = responses_request(json!({
		"model": "gpt-4o",
		"instructions": "be helpful",
		"input": [
			{"type": "message", "role": "user", "content": "weather in sf"},
			{"type": "function_call", "id": "fc_x", "call_id": "call_x",
			 "name": "get_weather", "arguments": "{\"city\":\"sf\"}"},
			{"type": "function_call_output", "call_id": "call_x", "output": "{\"temp\":21}"},
			{"type": "message", "role": "user", "content": "thanks"}
		],
		"tools": [{"type": "function", "name": "get_weather", "parameters": {"type": "object"}}]
	}));
	let down = resp_conv::to_completions::translate(&original).unwrap();
	let back = resp_conv::from_completions::translate(&down).unwrap();

	assert_eq!(back.instructions.as_deref(), Some("be helpful"));
	let items = back.input.items();
	assert_eq!(items.len(), 4);
	let responses::Item::FunctionCall(fc) = &items[1] else {
		panic!("expected function call, got {:?}", items[1])
	};
	assert_eq!(fc.id.as_deref(), Some("fc_x"));
	assert_eq!(fc.call_id, "call_x");
	assert_eq!(fc.name, "get_weather");
	assert_eq!(fc.arguments, "{\"city\":\"sf\"}");
	let responses::Item::FunctionCallOutput(out) = &items[2] else {
		panic!("expected output")
	};
	assert_eq!(out.call_id, "call_x");
	assert_eq!(out.output, "{\"temp\":21}");
	let responses::Item::Message(m) = &items[3] else {
		panic!("expected message")
	};
	assert_eq!(m.role, "user");
}

#[test]
fn unsupported_tools_are_dropped_and_choice_downgraded() {
	let req = responses_request(json!({
		"model": "gpt-4o",
		"input": "hi",
		"tools": [
			{"type": "web_search"},
			{"type": "function", "name": "f", "parameters": {
				"type": "object", "additionalProperties": false,
				"properties": {"a": {"type": "integer", "minimum": 0}}
			}}
		],
		"tool_choice": {"type": "web_search"}
	}));
	let out = resp_conv::to_completions::translate(&req).unwrap();
	let tools = out.tools.as_ref().unwrap();
	assert_eq!(tools.len(), 1);
	let completions::Tool::Function(f) = &tools[0] else {
		panic!("expected function")
	};
	// Parameter schemas are sanitized on the way down
	assert_eq!(
		f.function.parameters.as_ref().unwrap(),
		&json!({"type": "object", "properties": {"a": {"type": "integer"}}})
	);
	assert!(matches!(
		out.tool_choice.as_ref().unwrap(),
		completions::ToolChoice::Mode(m) if m == "auto"
	));
}

#[test]
fn responses_response_translates_to_completions() {
	let resp: responses::Response = serde_json::from_value(json!({
		"id": "resp_1",
		"object": "response",
		"created_at": 1700000000,
		"status": "completed",
		"model": "gpt-5",
		"output": [
			{"type": "reasoning", "summary": [{"type": "summary_text", "text": "let me think"}]},
			{"type": "message", "role": "assistant", "content": [
				{"type": "output_text", "text": "The answer is 42."}
			]}
		],
		"usage": {"input_tokens": 8555,
			"input_tokens_details": {"cached_tokens": 4224},
			"output_tokens": 889,
			"output_tokens_details": {"reasoning_tokens": 640},
			"total_tokens": 9444}
	}))
	.unwrap();
	let out = resp_conv::to_completions::translate_response(&resp);
	assert_eq!(out.choices[0].message.content.as_deref(), Some("The answer is 42."));
	assert_eq!(
		out.choices[0].message.reasoning_content.as_deref(),
		Some("let me think")
	);
	assert_eq!(out.choices[0].finish_reason.as_deref(), Some("stop"));
	let usage = out.usage.as_ref().unwrap();
	assert_eq!(usage.prompt_tokens, 8555);
	assert_eq!(usage.completion_tokens, 889);
	assert_eq!(usage.total_tokens, 9444);
	assert_eq!(usage.prompt_tokens_details.as_ref().unwrap().cached_tokens, 4224);
	assert_eq!(
		usage
			.completion_tokens_details
			.as_ref()
			.unwrap()
			.reasoning_tokens,
		640
	);
}

#[test]
fn completions_response_translates_to_responses() {
	let resp: completions::Response = serde_json::from_value(json!({
		"id": "chatcmpl-1",
		"object": "chat.completion",
		"created": 1700000000,
		"model": "gpt-4o",
		"choices": [{"index": 0, "finish_reason": "tool_calls", "message": {
			"role": "assistant",
			"content": "calling a tool",
			"tool_calls": [{"id": "call_1", "type": "function",
				"function": {"name": "f", "arguments": "{}"}}]
		}}],
		"usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
	}))
	.unwrap();
	let out = resp_conv::response_from_completions(&resp);
	assert_eq!(out.id, "resp_chatcmpl-1");
	assert_eq!(out.status.as_deref(), Some("completed"));
	assert_eq!(out.output.len(), 2);
	let responses::Item::FunctionCall(fc) = &out.output[1] else {
		panic!("expected function call")
	};
	assert_eq!(fc.call_id, "call_1");
	let usage = out.usage.as_ref().unwrap();
	assert_eq!(usage.input_tokens, 10);
	assert_eq!(usage.output_tokens, 5);
}

// --- Claude translation ---

#[test]
fn claude_request_translates_to_completions() {
	let req: claude::Request = serde_json::from_value(json!({
		"model": "gpt-4o",
		"max_tokens": 1024,
		"system": "be terse",
		"messages": [
			{"role": "user", "content": "weather in sf"},
			{"role": "assistant", "content": [
				{"type": "text", "text": "checking"},
				{"type": "tool_use", "id": "toolu_1", "name": "get_weather",
				 "input": {"city": "sf"}}
			]},
			{"role": "user", "content": [
				{"type": "tool_result", "tool_use_id": "toolu_1", "content": "21C"}
			]}
		],
		"tools": [{"name": "get_weather", "description": "d",
			"input_schema": {"type": "object"}}],
		"tool_choice": {"type": "any"}
	}))
	.unwrap();
	let out = claude_conv::from_claude::translate(&req, false).unwrap();
	assert_eq!(out.messages[0].role, "system");
	assert_eq!(out.messages[1].role, "user");
	let assistant = &out.messages[2];
	assert_eq!(assistant.role, "assistant");
	let calls = assistant.tool_calls.as_ref().unwrap();
	assert_eq!(calls[0].id, "toolu_1");
	assert_eq!(calls[0].function.arguments, "{\"city\":\"sf\"}");
	let tool_msg = &out.messages[3];
	assert_eq!(tool_msg.role, "tool");
	assert_eq!(tool_msg.tool_call_id.as_deref(), Some("toolu_1"));
	assert!(matches!(
		out.tool_choice.as_ref().unwrap(),
		completions::ToolChoice::Mode(m) if m == "required"
	));
	assert_eq!(out.max_tokens, Some(1024));
}

#[test]
fn claude_tool_choice_tool_maps_to_named_function() {
	let req: claude::Request = serde_json::from_value(json!({
		"model": "gpt-4o",
		"max_tokens": 10,
		"messages": [{"role": "user", "content": "hi"}],
		"tool_choice": {"type": "tool", "name": "get_weather"}
	}))
	.unwrap();
	let out = claude_conv::from_claude::translate(&req, false).unwrap();
	let Some(completions::ToolChoice::Named(named)) = &out.tool_choice else {
		panic!("expected named choice")
	};
	assert_eq!(named.r#type, "function");
	assert_eq!(named.function.as_ref().unwrap().name, "get_weather");
}

#[test]
fn adaptive_thinking_coerced_for_deepseek() {
	let req: claude::Request = serde_json::from_value(json!({
		"model": "deepseek-reasoner",
		"max_tokens": 100,
		"messages": [{"role": "user", "content": "hi"}],
		"thinking": {"type": "adaptive", "budget_tokens": 2048}
	}))
	.unwrap();
	let out = claude_conv::from_claude::translate(&req, true).unwrap();
	let thinking = out.thinking.as_ref().unwrap();
	assert_eq!(thinking.r#type, "enabled");
	assert_eq!(thinking.budget_tokens, Some(2048));

	// Without a budget the coercion disables thinking
	let req: claude::Request = serde_json::from_value(json!({
		"model": "deepseek-chat",
		"max_tokens": 100,
		"messages": [{"role": "user", "content": "hi"}],
		"thinking": {"type": "auto"}
	}))
	.unwrap();
	let out = claude_conv::from_claude::translate(&req, true).unwrap();
	assert_eq!(out.thinking.as_ref().unwrap().r#type, "disabled");

	// Non-DeepSeek channels keep the original type
	let req: claude::Request = serde_json::from_value(json!({
		"model": "gpt-4o",
		"max_tokens": 100,
		"messages": [{"role": "user", "content": "hi"}],
		"thinking": {"type": "adaptive", "budget_tokens": 2048}
	}))
	.unwrap();
	let out = claude_conv::from_claude::translate(&req, false).unwrap();
	assert_eq!(out.thinking.as_ref().unwrap().r#type, "adaptive");
}

#[test]
fn claude_images_become_data_urls() {
	let req: claude::Request = serde_json::from_value(json!({
		"model": "gpt-4o",
		"max_tokens": 100,
		"messages": [{"role": "user", "content": [
			{"type": "text", "text": "what is this"},
			{"type": "image", "source": {"type": "base64", "media_type": "image/jpeg", "data": "aGk="}}
		]}]
	}))
	.unwrap();
	let out = claude_conv::from_claude::translate(&req, false).unwrap();
	let completions::MessageContent::Parts(parts) = out.messages[0].content.as_ref().unwrap()
	else {
		panic!("expected parts")
	};
	let completions::ContentPart::ImageUrl { image_url } = &parts[1] else {
		panic!("expected image")
	};
	assert_eq!(image_url.url, "data:image/jpeg;base64,aGk=");
}

#[test]
fn openai_response_translates_to_claude() {
	let resp: completions::Response = serde_json::from_value(json!({
		"id": "chatcmpl-9",
		"object": "chat.completion",
		"created": 1700000000,
		"model": "gpt-4o",
		"choices": [{"index": 0, "finish_reason": "tool_calls", "message": {
			"role": "assistant",
			"content": "on it",
			"reasoning_content": "user wants weather",
			"tool_calls": [{"id": "call_7", "type": "function",
				"function": {"name": "get_weather", "arguments": "{\"city\":\"sf\"}"}}]
		}}],
		"usage": {"prompt_tokens": 12, "completion_tokens": 34, "total_tokens": 46}
	}))
	.unwrap();
	let out = claude_conv::to_claude::translate_response(&resp);
	assert_eq!(out.id, "msg_chatcmpl-9");
	assert_eq!(out.stop_reason.as_deref(), Some("tool_use"));
	assert_eq!(out.usage.input_tokens, 12);
	assert_eq!(out.usage.output_tokens, 34);
	assert!(matches!(&out.content[0], claude::ContentBlock::Thinking { thinking, .. } if thinking == "user wants weather"));
	assert!(matches!(&out.content[1], claude::ContentBlock::Text { text } if text == "on it"));
	let claude::ContentBlock::ToolUse { id, name, input } = &out.content[2] else {
		panic!("expected tool use")
	};
	assert_eq!(id, "call_7");
	assert_eq!(name, "get_weather");
	assert_eq!(input, &json!({"city": "sf"}));
}

#[test]
fn stop_reason_mapping() {
	assert_eq!(claude_conv::map_stop_reason("stop"), "end_turn");
	assert_eq!(claude_conv::map_stop_reason("length"), "max_tokens");
	assert_eq!(claude_conv::map_stop_reason("tool_calls"), "tool_use");
	assert_eq!(claude_conv::map_stop_reason("content_filter"), "stop_sequence");
}

// --- Streaming ---

fn sse_body(events: &[Value]) -> Body {
	let mut out = String::new();
	for ev in events {
		out.push_str(&format!("data: {ev}\n\n"));
	}
	Body::from(out)
}

async fn collect_string(body: Body) -> String {
	let bytes = body.collect().await.unwrap().to_bytes();
	String::from_utf8(bytes.to_vec()).unwrap()
}

fn parse_chunks(raw: &str) -> Vec<Value> {
	raw
		.lines()
		.filter_map(|l| l.strip_prefix("data: "))
		.filter(|p| *p != "[DONE]")
		.map(|p| serde_json::from_str(p).unwrap())
		.collect()
}

#[tokio::test]
async fn responses_stream_translates_to_chunks_without_duplication() {
	let recorder = UsageRecorder::default();
	let body = sse_body(&[
		json!({"type": "response.created", "response": {
			"id": "resp_1", "model": "gpt-5", "created_at": 123, "output": []}}),
		json!({"type": "response.output_text.delta", "item_id": "msg_1",
			"output_index": 0, "content_index": 0, "delta": "The"}),
		json!({"type": "response.output_text.delta", "item_id": "msg_1",
			"output_index": 0, "content_index": 0, "delta": " quick"}),
		json!({"type": "response.output_text.done", "item_id": "msg_1",
			"output_index": 0, "content_index": 0, "text": "The quick"}),
		json!({"type": "response.completed", "response": {
			"id": "resp_1", "model": "gpt-5", "created_at": 123, "output": [],
			"usage": {"input_tokens": 3, "output_tokens": 2, "total_tokens": 5}}}),
	]);
	let out = resp_conv::stream_to_completions(body, 0, recorder.clone(), "gpt-5".to_string());
	let raw = collect_string(out).await;
	assert!(raw.ends_with("data: [DONE]\n\n"));

	let chunks = parse_chunks(&raw);
	assert_eq!(chunks.len(), 3);
	assert_eq!(chunks[0].pointer("/choices/0/delta/content").unwrap(), "The");
	assert_eq!(chunks[0].pointer("/choices/0/delta/role").unwrap(), "assistant");
	assert_eq!(chunks[1].pointer("/choices/0/delta/content").unwrap(), " quick");
	// Trailing usage chunk with an empty content delta
	assert_eq!(chunks[2].pointer("/choices/0/delta/content").unwrap(), "");
	assert_eq!(chunks[2].pointer("/usage/total_tokens").unwrap(), 5);
	assert_eq!(chunks[2].pointer("/id").unwrap(), "resp_1");
	assert_eq!(chunks[2].pointer("/object").unwrap(), "chat.completion.chunk");

	// The done event did not re-accumulate the text
	assert_eq!(recorder.completion_text(), "The quick");
	assert_eq!(recorder.snapshot().total_tokens, 5);
}

#[tokio::test]
async fn duplicated_usage_snapshots_count_once() {
	let recorder = UsageRecorder::default();
	let usage = json!({"input_tokens": 10, "output_tokens": 20, "total_tokens": 30});
	let body = sse_body(&[
		json!({"type": "response.created", "response": {
			"id": "resp_9", "model": "gpt-5", "output": [], "usage": usage}}),
		json!({"type": "response.in_progress", "response": {
			"id": "resp_9", "model": "gpt-5", "output": [], "usage": usage}}),
		json!({"type": "response.completed", "response": {
			"id": "resp_9", "model": "gpt-5", "output": [], "usage": usage}}),
	]);
	let out = resp_conv::stream_to_completions(body, 0, recorder.clone(), "gpt-5".to_string());
	collect_string(out).await;
	let snap = recorder.snapshot();
	assert_eq!(snap.prompt_tokens, 10);
	assert_eq!(snap.completion_tokens, 20);
	assert_eq!(snap.total_tokens, 30);
}

#[tokio::test]
async fn tool_call_deltas_carry_indices() {
	let recorder = UsageRecorder::default();
	let body = sse_body(&[
		json!({"type": "response.output_item.added", "output_index": 2, "item": {
			"type": "function_call", "id": "fc_1", "call_id": "call_1",
			"name": "get_weather", "arguments": ""}}),
		json!({"type": "response.function_call_arguments.delta",
			"item_id": "fc_1", "output_index": 2, "delta": "{\"city\":"}),
		json!({"type": "response.function_call_arguments.delta",
			"item_id": "fc_1", "output_index": 2, "delta": "\"sf\"}"}),
	]);
	let out = resp_conv::stream_to_completions(body, 0, recorder, "gpt-5".to_string());
	let chunks = parse_chunks(&collect_string(out).await);
	assert_eq!(chunks.len(), 3);
	for chunk in &chunks {
		assert_eq!(chunk.pointer("/choices/0/delta/tool_calls/0/index").unwrap(), 2);
	}
	assert_eq!(
		chunks[0].pointer("/choices/0/delta/tool_calls/0/id").unwrap(),
		"call_1"
	);
	assert_eq!(
		chunks[1]
			.pointer("/choices/0/delta/tool_calls/0/function/arguments")
			.unwrap(),
		"{\"city\":"
	);
}

#[tokio::test]
async fn completions_stream_translates_to_claude_events() {
	let recorder = UsageRecorder::default();
	let body = sse_body(&[
		json!({"id": "chatcmpl-1", "object": "chat.completion.chunk", "created": 1,
			"model": "gpt-4o", "choices": [{"index": 0, "delta": {"role": "assistant", "content": "Hel"}}]}),
		json!({"id": "chatcmpl-1", "object": "chat.completion.chunk", "created": 1,
			"model": "gpt-4o", "choices": [{"index": 0, "delta": {"content": "lo"}}]}),
		json!({"id": "chatcmpl-1", "object": "chat.completion.chunk", "created": 1,
			"model": "gpt-4o", "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]}),
		json!({"id": "chatcmpl-1", "object": "chat.completion.chunk", "created": 1,
			"model": "gpt-4o", "choices": [],
			"usage": {"prompt_tokens": 5, "completion_tokens": 2, "total_tokens": 7}}),
	]);
	let out = claude_conv::to_claude::translate_stream(body, 0, recorder.clone());
	let raw = collect_string(out).await;

	let events: Vec<&str> = raw
		.lines()
		.filter_map(|l| l.strip_prefix("event: "))
		.collect();
	assert_eq!(
		events,
		vec![
			"message_start",
			"content_block_start",
			"content_block_delta",
			"content_block_delta",
			"content_block_stop",
			"message_delta",
			"message_stop"
		]
	);
	assert!(raw.contains(r#""text":"Hel""#));
	assert!(raw.contains(r#""stop_reason":"end_turn""#));
	assert!(raw.contains(r#""output_tokens":2"#));
	assert_eq!(recorder.snapshot().total_tokens, 7);
}

#[tokio::test]
async fn completions_stream_translates_to_responses_events() {
	let recorder = UsageRecorder::default();
	let body = sse_body(&[
		json!({"id": "chatcmpl-2", "object": "chat.completion.chunk", "created": 9,
			"model": "gpt-4o", "choices": [{"index": 0, "delta": {"role": "assistant", "content": "Hi"}}]}),
		json!({"id": "chatcmpl-2", "object": "chat.completion.chunk", "created": 9,
			"model": "gpt-4o", "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}],
			"usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}}),
	]);
	let out = resp_conv::completions_stream_to_responses(body, 0, recorder.clone());
	let raw = collect_string(out).await;

	let events: Vec<&str> = raw
		.lines()
		.filter_map(|l| l.strip_prefix("event: "))
		.collect();
	assert_eq!(
		events,
		vec![
			"response.created",
			"response.output_item.added",
			"response.output_text.delta",
			"response.output_text.done",
			"response.output_item.done",
			"response.completed"
		]
	);
	assert!(raw.contains(r#""id":"resp_chatcmpl-2""#));
	assert!(raw.contains(r#""total_tokens":2"#));
	assert_eq!(recorder.snapshot().total_tokens, 2);
}

#[tokio::test]
async fn claude_stream_terminates_without_usage() {
	// Compatible upstreams routinely ignore stream_options.include_usage and
	// close right after the finish_reason chunk
	let recorder = UsageRecorder::default();
	let body = sse_body(&[
		json!({"id": "chatcmpl-3", "object": "chat.completion.chunk", "created": 1,
			"model": "novita-model", "choices": [{"index": 0, "delta": {"role": "assistant", "content": "Hi"}}]}),
		json!({"id": "chatcmpl-3", "object": "chat.completion.chunk", "created": 1,
			"model": "novita-model", "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]}),
	]);
	let out = claude_conv::to_claude::translate_stream(body, 0, recorder);
	let raw = collect_string(out).await;

	let events: Vec<&str> = raw
		.lines()
		.filter_map(|l| l.strip_prefix("event: "))
		.collect();
	assert_eq!(
		events,
		vec![
			"message_start",
			"content_block_start",
			"content_block_delta",
			"content_block_stop",
			"message_delta",
			"message_stop"
		]
	);
	assert!(raw.contains(r#""stop_reason":"end_turn""#));
}

#[tokio::test]
async fn responses_stream_terminates_without_usage() {
	let recorder = UsageRecorder::default();
	let body = sse_body(&[
		json!({"id": "chatcmpl-4", "object": "chat.completion.chunk", "created": 2,
			"model": "gpt-4o", "choices": [{"index": 0, "delta": {"role": "assistant", "content": "Hi"}}]}),
		json!({"id": "chatcmpl-4", "object": "chat.completion.chunk", "created": 2,
			"model": "gpt-4o", "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]}),
	]);
	let out = resp_conv::completions_stream_to_responses(body, 0, recorder);
	let raw = collect_string(out).await;

	let events: Vec<&str> = raw
		.lines()
		.filter_map(|l| l.strip_prefix("event: "))
		.collect();
	assert_eq!(
		events,
		vec![
			"response.created",
			"response.output_item.added",
			"response.output_text.delta",
			"response.output_text.done",
			"response.output_item.done",
			"response.completed"
		]
	);
	assert!(raw.contains(r#""status":"completed""#));
}

#[tokio::test]
async fn responses_passthrough_stream_records_usage_and_searches() {
	let recorder = UsageRecorder::default();
	let body = sse_body(&[
		json!({"type": "response.output_item.done", "output_index": 0, "item": {
			"type": "web_search_call", "id": "ws_1", "status": "completed",
			"action": {"type": "search", "query": "rust"}}}),
		json!({"type": "response.output_item.done", "output_index": 0, "item": {
			"type": "web_search_call", "id": "ws_1", "status": "completed",
			"action": {"type": "search", "query": "rust"}}}),
		json!({"type": "response.completed", "response": {
			"id": "resp_5", "model": "gpt-5", "output": [],
			"usage": {"input_tokens": 4, "output_tokens": 6, "total_tokens": 10}}}),
	]);
	let out = resp_conv::passthrough_stream(body, 0, recorder.clone());
	let raw = collect_string(out).await;
	// Passthrough leaves bytes untouched
	assert!(raw.contains("response.completed"));
	assert_eq!(recorder.web_search_calls(), 1);
	assert_eq!(recorder.snapshot().total_tokens, 10);
}

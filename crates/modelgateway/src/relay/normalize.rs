//! Inbound request normalization: everything that must happen to a Chat
//! Completions payload before dialect translation, in a fixed rule order.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};

use crate::Deps;
use crate::relay::error::RelayError;
use crate::relay::types::completions;
use crate::relay::{ChannelFamily, RelayMeta, force_response_api, model};

pub async fn normalize_request(
	meta: &mut RelayMeta,
	req: &mut completions::Request,
	deps: &Deps,
) -> Result<(), RelayError> {
	// 1. model mapping
	let origin = req.model.clone().unwrap_or_default();
	meta.origin_model_name = origin.clone();
	let actual = meta.mapped_model(&origin);
	meta.actual_model_name = actual.clone();
	req.model = Some(actual.clone());
	meta.is_stream = req.stream.unwrap_or_default();

	// 2. provider-specific flags
	if meta.channel_family == ChannelFamily::OpenRouter {
		req.include_reasoning = Some(true);
		if let Some(sort) = &deps.config.openrouter_provider_sort {
			let provider = req
				.provider
				.get_or_insert_with(|| Value::Object(Default::default()));
			if let Some(obj) = provider.as_object_mut() {
				obj.entry("sort".to_string()).or_insert(json!(sort));
			}
		}
	}

	// 3. stream-mode billing needs the final usage event
	if meta.is_stream && deps.config.enforce_include_usage {
		match req.stream_options.as_mut() {
			Some(opts) => opts.include_usage = true,
			None => {
				req.stream_options = Some(completions::StreamOptions {
					include_usage: true,
					rest: Value::Null,
				});
			},
		}
	}

	// 4. collapse the legacy token cap; max_completion_tokens wins when both
	// arrive
	if req.max_completion_tokens.is_none() {
		req.max_completion_tokens = req.max_tokens;
	}
	req.max_tokens = None;
	if req.max_completion_tokens.is_none() {
		req.max_completion_tokens = Some(deps.config.default_max_tokens);
	}

	// 5. reasoning-model coercion
	if model::is_reasoning_model(&actual) {
		let response_api_target = force_response_api(meta, &actual);
		if response_api_target {
			req.temperature = None;
		} else {
			req.temperature = Some(1.0);
		}
		req.top_p = None;
		req.reasoning_effort = Some(normalize_reasoning_effort(
			&actual,
			req.reasoning_effort.as_deref(),
		));
		// On the Response API surface the dialect translator lifts system
		// messages into `instructions`; on Chat Completions they are dropped
		// outright.
		if !response_api_target {
			req.messages.retain(|m| m.role != "system");
		}
	}

	// 6. web-search models take no sampling knobs
	if model::is_web_search_model(&actual) {
		req.temperature = None;
		req.top_p = None;
		req.presence_penalty = None;
		req.frequency_penalty = None;
		req.n = None;
	}

	// 7. deep-research models require a web_search tool
	if model::is_deep_research_model(&actual) {
		let has_web_search = req
			.tools
			.iter()
			.flatten()
			.any(|t| matches!(t.kind(), "web_search" | "web_search_preview"));
		if !has_web_search {
			req
				.tools
				.get_or_insert_with(Vec::new)
				.push(completions::Tool::Other(json!({"type": "web_search"})));
		}
		req.reasoning_effort = Some("medium".to_string());
	}

	// 8. structured output schema sanitization
	if let Some(schema) = req
		.response_format
		.as_mut()
		.and_then(|rf| rf.json_schema.as_mut())
		.and_then(|js| js.schema.as_mut())
	{
		if meta.channel_family == ChannelFamily::Azure {
			super::conversion::schema::sanitize_schema_for_azure(schema);
		} else {
			super::conversion::schema::sanitize_schema(schema);
		}
	}

	// 9. tool_choice shape
	if let Some(completions::ToolChoice::Named(named)) = req.tool_choice.as_mut() {
		if let Some(name) = named.target().map(str::to_string) {
			named.r#type = "function".to_string();
			named.name = None;
			named.function = Some(completions::FunctionName { name });
		}
	}

	// 10. inline remote images
	inline_images(req, deps).await?;

	// 11. audio models cannot stream without usage enforcement in place
	if model::is_audio_model(&actual) && meta.is_stream && !deps.config.enforce_include_usage {
		return Err(RelayError::InvalidRequest(
			"unsupported mode: audio models cannot stream without usage enforcement".to_string(),
		));
	}

	Ok(())
}

fn normalize_reasoning_effort(model_name: &str, requested: Option<&str>) -> String {
	if model::is_medium_only_reasoning(model_name) {
		return "medium".to_string();
	}
	match requested {
		Some(e @ ("low" | "medium" | "high")) => e.to_string(),
		_ => "medium".to_string(),
	}
}

async fn inline_images(req: &mut completions::Request, deps: &Deps) -> Result<(), RelayError> {
	for msg in &mut req.messages {
		let Some(completions::MessageContent::Parts(parts)) = msg.content.as_mut() else {
			continue;
		};
		for part in parts {
			let completions::ContentPart::ImageUrl { image_url } = part else {
				continue;
			};
			if image_url.url.starts_with("http://") || image_url.url.starts_with("https://") {
				let (mime, bytes) = deps
					.media
					.fetch_image(&image_url.url)
					.await
					.map_err(|e| RelayError::InvalidRequest(format!("failed to fetch image: {e}")))?;
				image_url.url = format!("data:{mime};base64,{}", BASE64.encode(&bytes));
			} else if image_url.url.starts_with("data:") {
				validate_data_image_url(&image_url.url)?;
			}
		}
	}
	Ok(())
}

/// Structural validation of a `data:image/...;base64,...` URI.
pub fn validate_data_image_url(url: &str) -> Result<(), RelayError> {
	let err = |reason: &str| RelayError::InvalidRequest(format!("invalid image data url: {reason}"));
	let rest = url
		.strip_prefix("data:image/")
		.ok_or_else(|| err("expected data:image/ prefix"))?;
	let (_mime, payload) = rest
		.split_once(";base64,")
		.ok_or_else(|| err("expected base64 payload"))?;
	if payload.is_empty() {
		return Err(err("empty payload"));
	}
	BASE64
		.decode(payload)
		.map_err(|_| err("payload is not valid base64"))?;
	Ok(())
}

//! HTTP transport and the response-direction pipeline: buffered JSON
//! rewriting, SSE stream rewriting, and billing finalization.

use bytes::Bytes;
use futures_util::TryStreamExt;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use tracing::debug;

use crate::relay::conversion;
use crate::relay::error::RelayError;
use crate::relay::tools::count_chargeable_web_searches;
use crate::relay::types::{completions, responses};
use crate::relay::usage::{self, Usage, UsageRecorder};
use crate::relay::{ChannelFamily, ConvertedRequest, RelayContext, RelayMeta, RelayMode, model};
use crate::{Body, Deps, Response};

/// Upper bound for buffering non-streaming upstream bodies.
const RESPONSE_BUFFER_LIMIT: usize = 32 * 1024 * 1024;
/// SSE line buffer bound; a single event never legitimately approaches this.
const SSE_BUFFER_LIMIT: usize = 8 * 1024 * 1024;

pub async fn do_request(
	deps: &Deps,
	ctx: &mut RelayContext,
	meta: &RelayMeta,
	url: &str,
	body: Bytes,
) -> Result<Response, RelayError> {
	let mut headers = http::HeaderMap::new();
	headers.insert(CONTENT_TYPE, http::HeaderValue::from_static("application/json"));
	super::endpoint::build_headers(meta, &mut headers)?;

	ctx.upstream_request_possibly_forwarded = true;
	let upstream = deps
		.client
		.post(url)
		.headers(headers)
		.body(body)
		.send()
		.await
		.map_err(|e| RelayError::UpstreamTransport(e.into()))?;

	let status = upstream.status();
	let headers = upstream.headers().clone();
	let body = Body::from_stream(upstream.bytes_stream().map_err(axum::Error::new));

	let mut resp = http::Response::builder()
		.status(status)
		.body(body)
		.map_err(|e| RelayError::UpstreamTransport(e.into()))?;
	*resp.headers_mut() = headers;
	Ok(resp)
}

pub async fn handle_response(
	deps: &Deps,
	ctx: &mut RelayContext,
	resp: Response,
	meta: &RelayMeta,
) -> Result<(Response, UsageRecorder), RelayError> {
	let status = resp.status();
	if !status.is_success() {
		let (_, body) = resp.into_parts();
		let bytes = axum::body::to_bytes(body, RESPONSE_BUFFER_LIMIT)
			.await
			.map_err(|e| RelayError::UpstreamTransport(anyhow::anyhow!(e)))?;
		return Err(RelayError::Upstream {
			status: status.as_u16(),
			body: bytes,
		});
	}

	if meta.is_stream {
		handle_streaming(deps, ctx, resp, meta)
	} else {
		handle_buffered(deps, ctx, resp, meta).await
	}
}

fn handle_streaming(
	deps: &Deps,
	ctx: &mut RelayContext,
	resp: Response,
	meta: &RelayMeta,
) -> Result<(Response, UsageRecorder), RelayError> {
	let recorder = UsageRecorder::default();
	let (mut parts, body) = resp.into_parts();

	let upstream_is_responses = matches!(
		ctx.converted_request,
		Some(ConvertedRequest::Responses(_))
	) || (meta.mode == RelayMode::ResponseApi && ctx.converted_request.is_none());

	let body = match meta.mode {
		RelayMode::ClaudeMessages => {
			let chunks = if upstream_is_responses {
				// Bridge through the Chat Completions chunk dialect
				conversion::responses::stream_to_completions(
					body,
					SSE_BUFFER_LIMIT,
					recorder.clone(),
					meta.actual_model_name.clone(),
				)
			} else {
				body
			};
			conversion::claude::to_claude::translate_stream(chunks, SSE_BUFFER_LIMIT, recorder.clone())
		},
		RelayMode::ChatCompletions => {
			if upstream_is_responses {
				conversion::responses::stream_to_completions(
					body,
					SSE_BUFFER_LIMIT,
					recorder.clone(),
					meta.actual_model_name.clone(),
				)
			} else {
				conversion::completions::passthrough_stream(
					body,
					SSE_BUFFER_LIMIT,
					recorder.clone(),
					deps.tokens.clone(),
					meta.actual_model_name.clone(),
					meta.prompt_tokens,
				)
			}
		},
		RelayMode::ResponseApi => {
			if upstream_is_responses {
				conversion::responses::passthrough_stream(body, SSE_BUFFER_LIMIT, recorder.clone())
			} else {
				conversion::responses::completions_stream_to_responses(
					body,
					SSE_BUFFER_LIMIT,
					recorder.clone(),
				)
			}
		},
		mode => {
			return Err(RelayError::InvalidRequest(format!(
				"mode {mode:?} does not stream"
			)));
		},
	};

	parts.headers.remove(CONTENT_LENGTH);
	parts
		.headers
		.insert(CONTENT_TYPE, http::HeaderValue::from_static("text/event-stream"));
	Ok((Response::from_parts(parts, body), recorder))
}

async fn handle_buffered(
	deps: &Deps,
	ctx: &mut RelayContext,
	resp: Response,
	meta: &RelayMeta,
) -> Result<(Response, UsageRecorder), RelayError> {
	let recorder = UsageRecorder::default();
	let (mut parts, body) = resp.into_parts();
	let bytes = axum::body::to_bytes(body, RESPONSE_BUFFER_LIMIT)
		.await
		.map_err(|e| RelayError::UpstreamTransport(anyhow::anyhow!(e)))?;

	let upstream_is_responses = matches!(
		ctx.converted_request,
		Some(ConvertedRequest::Responses(_))
	) || (meta.mode == RelayMode::ResponseApi && ctx.converted_request.is_none());

	let body = match meta.mode {
		RelayMode::ChatCompletions | RelayMode::ClaudeMessages | RelayMode::ResponseApi => {
			if upstream_is_responses {
				let upstream: responses::Response =
					serde_json::from_slice(&bytes).map_err(RelayError::Internal)?;
				if let Some(u) = &upstream.usage {
					recorder.record_response_usage(&upstream.id, u);
				}
				if ctx.web_search_call_count.is_none() {
					let calls = count_chargeable_web_searches(&upstream.output);
					if calls > 0 {
						ctx.web_search_call_count = Some(calls);
					}
				}
				match meta.mode {
					RelayMode::ClaudeMessages => serialize(
						&conversion::claude::to_claude::translate_responses_response(&upstream),
					)?,
					RelayMode::ChatCompletions => serialize(
						&conversion::responses::to_completions::translate_response(&upstream),
					)?,
					_ => bytes.clone(),
				}
			} else {
				let mut upstream: completions::Response =
					serde_json::from_slice(&bytes).map_err(RelayError::Internal)?;
				extract_completions_usage(deps, meta, &upstream, &recorder);
				match meta.mode {
					RelayMode::ClaudeMessages => {
						serialize(&conversion::claude::to_claude::translate_response(&upstream))?
					},
					RelayMode::ResponseApi => {
						serialize(&conversion::responses::response_from_completions(&upstream))?
					},
					_ => {
						if meta.query_param("reasoning_format").as_deref() == Some("thinking") {
							for choice in &mut upstream.choices {
								if let Some(r) = choice.message.reasoning_content.take() {
									choice.message.thinking = Some(r);
								}
							}
							serialize(&upstream)?
						} else {
							bytes.clone()
						}
					},
				}
			}
		},
		// Images / embeddings / videos pass through; usage is extracted
		// loosely when the body carries it
		_ => {
			if let Ok(v) = serde_json::from_slice::<serde_json::Value>(&bytes) {
				if let Some(u) = v.get("usage") {
					if let Ok(u) = serde_json::from_value::<Usage>(u.clone()) {
						recorder.mutate(|r| *r = u);
					}
				}
			}
			bytes.clone()
		},
	};

	// The rewrite may have changed the length
	parts.headers.remove(CONTENT_LENGTH);
	parts
		.headers
		.insert(CONTENT_LENGTH, http::HeaderValue::from(body.len()));
	Ok((Response::from_parts(parts, Body::from(body)), recorder))
}

fn serialize<T: serde::Serialize>(value: &T) -> Result<Bytes, RelayError> {
	serde_json::to_vec(value)
		.map(Bytes::from)
		.map_err(RelayError::Internal)
}

/// Pulls usage off a buffered Chat Completions reply, synthesizing counters
/// from the response text when the upstream reported nothing.
fn extract_completions_usage(
	deps: &Deps,
	meta: &RelayMeta,
	resp: &completions::Response,
	recorder: &UsageRecorder,
) {
	let mut usage = resp.usage.clone().unwrap_or_default();
	if usage.is_empty() {
		let text: String = resp
			.choices
			.iter()
			.filter_map(|c| c.message.content.as_deref())
			.collect();
		usage.prompt_tokens = meta.prompt_tokens;
		usage.completion_tokens = deps.tokens.count(&meta.actual_model_name, &text);
		usage.total_tokens = usage.prompt_tokens + usage.completion_tokens;
		debug!(
			model = %meta.actual_model_name,
			completion_tokens = usage.completion_tokens,
			"upstream omitted usage; synthesized from response text"
		);
	} else {
		usage.reconcile(meta.prompt_tokens);
	}
	recorder.mutate(|u| *u = usage);
}

/// Final billing pass, run by the host once the client body has been written
/// (or the write failed; the recorder keeps whatever was accumulated). Adds
/// tool surcharges and returns the canonical usage.
pub fn finalize_usage(
	deps: &Deps,
	ctx: &mut RelayContext,
	meta: &RelayMeta,
	recorder: &UsageRecorder,
) -> Result<Usage, RelayError> {
	let mut usage = recorder.snapshot();
	usage.reconcile(meta.prompt_tokens);

	let explicit = ctx.web_search_call_count;
	let counted = explicit.unwrap_or_else(|| recorder.web_search_calls());
	if counted > 0 {
		let context_size = ctx
			.origin_request
			.as_ref()
			.and_then(|r| r.web_search_options.as_ref())
			.and_then(|o| o.search_context_size.clone())
			.unwrap_or_default();
		usage.tools_cost += usage::web_search_quota(
			&meta.actual_model_name,
			&context_size,
			counted,
			deps.config.quota_per_usd,
		)?;
		ctx.tool_counts.add("web_search", counted);
	} else if meta.channel_family == ChannelFamily::OpenAI
		&& meta.mode == RelayMode::ChatCompletions
		&& ctx.converted_request.is_none()
		&& meta.actual_model_name.contains("-search-preview")
	{
		// Implicit invocation: the preview models search without reporting it
		let tag = if model::is_reasoning_model(&meta.actual_model_name) {
			"web_search_preview_reasoning"
		} else {
			"web_search_preview_non_reasoning"
		};
		ctx.tool_counts.record(tag);
	}

	let has_json_schema = ctx
		.origin_request
		.as_ref()
		.and_then(|r| r.response_format.as_ref())
		.is_some_and(|rf| rf.r#type == "json_schema" && rf.json_schema.is_some());
	if has_json_schema {
		let ratio = deps.prices.model_ratio(&meta.actual_model_name);
		usage.tools_cost += usage::structured_output_cost(usage.completion_tokens, ratio);
	}

	Ok(usage)
}

//! Response API over WebSocket. Streaming POSTs to `/v1/responses` on the
//! OpenAI channel are promoted to a WebSocket session; tenants without
//! WebSocket access fall back to plain HTTP transparently.

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use http::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tracing::{debug, warn};

use crate::relay::error::RelayError;
use crate::relay::{ChannelFamily, RelayMeta};
use crate::{Body, Deps, Response};

const CONNECTION_LIMIT_CODE: &str = "websocket_connection_limit_reached";
/// Events that end a Response API session.
const TERMINAL_EVENTS: &[&str] = &["response.completed", "response.failed", "error"];

/// A streaming Response API POST is promoted to WebSocket when the channel is
/// OpenAI, the target is `/v1/responses`, and the payload is plain JSON
/// without `background: true`. A prior fallback disables promotion.
pub fn eligible(meta: &RelayMeta, url: &str, body: &Bytes) -> bool {
	if meta.channel_family != ChannelFamily::OpenAI || meta.response_api_fallback {
		return false;
	}
	let path = url.split('?').next().unwrap_or(url);
	if !path.ends_with("/v1/responses") {
		return false;
	}
	let Ok(payload) = serde_json::from_slice::<Value>(body) else {
		return false;
	};
	payload.get("background").and_then(Value::as_bool) != Some(true)
}

/// Rewrites the outbound payload into a `response.create` event, returning it
/// with the requested stream mode. `stream` and `background` never cross the
/// socket.
pub fn rewrite_request(body: &Bytes) -> Result<(String, bool), RelayError> {
	let mut payload: Value = serde_json::from_slice(body)
		.map_err(|e| RelayError::InvalidRequest(format!("malformed request body: {e}")))?;
	let obj = payload
		.as_object_mut()
		.ok_or_else(|| RelayError::InvalidRequest("request body must be an object".to_string()))?;
	let stream = obj
		.remove("stream")
		.and_then(|v| v.as_bool())
		.unwrap_or_default();
	obj.remove("background");
	obj.insert("type".to_string(), json!("response.create"));
	Ok((payload.to_string(), stream))
}

/// `https -> wss` / `http -> ws`, preserving path and query.
pub fn upgrade_scheme(url: &str) -> Result<String, RelayError> {
	let mut parsed = url::Url::parse(url)
		.map_err(|e| RelayError::UpstreamTransport(anyhow::anyhow!("invalid upstream url: {e}")))?;
	let scheme = match parsed.scheme() {
		"https" => "wss",
		"http" => "ws",
		other => {
			return Err(RelayError::UpstreamTransport(anyhow::anyhow!(
				"cannot upgrade scheme {other}"
			)));
		},
	};
	parsed
		.set_scheme(scheme)
		.map_err(|_| RelayError::UpstreamTransport(anyhow::anyhow!("scheme rewrite failed")))?;
	Ok(parsed.to_string())
}

pub(crate) enum FirstFrame {
	/// Tenant has no WebSocket access; retry over HTTP.
	Fallback,
	/// Upstream rejected the request; synthesize an HTTP error response.
	Error { status: u16, body: Value },
	/// Normal event; the session proceeds.
	Event(String),
}

pub(crate) fn classify_first_event(text: &str) -> FirstFrame {
	let Ok(event) = serde_json::from_str::<Value>(text) else {
		return FirstFrame::Event(text.to_string());
	};
	if event.get("type").and_then(Value::as_str) != Some("error") {
		return FirstFrame::Event(text.to_string());
	}
	let code = event
		.get("code")
		.or_else(|| event.pointer("/error/code"))
		.and_then(Value::as_str)
		.unwrap_or_default();
	let message = event
		.get("message")
		.or_else(|| event.pointer("/error/message"))
		.and_then(Value::as_str)
		.unwrap_or_default();
	if code == CONNECTION_LIMIT_CODE || message.contains("reconnect") {
		return FirstFrame::Fallback;
	}
	let status = event
		.get("status")
		.and_then(Value::as_u64)
		.map(|s| s as u16)
		.unwrap_or(500);
	let error = event
		.get("error")
		.cloned()
		.unwrap_or_else(|| json!({"message": message, "type": "upstream_error", "code": code}));
	FirstFrame::Error {
		status,
		body: json!({"error": error}),
	}
}

/// Executes the request over WebSocket. `Ok(None)` means the session could
/// not be established in a retryable way and the caller should repeat the
/// call over plain HTTP.
pub async fn do_request(
	_deps: &Deps,
	meta: &RelayMeta,
	url: &str,
	body: &Bytes,
) -> Result<Option<Response>, RelayError> {
	let (payload, stream) = rewrite_request(body)?;
	let ws_url = upgrade_scheme(url)?;

	let mut request = ws_url
		.as_str()
		.into_client_request()
		.map_err(|e| RelayError::UpstreamTransport(e.into()))?;
	let mut auth = http::HeaderValue::from_str(&format!("Bearer {}", meta.api_key))
		.map_err(|_| RelayError::InvalidRequest("api key contains invalid header characters".to_string()))?;
	auth.set_sensitive(true);
	request.headers_mut().insert(AUTHORIZATION, auth);

	let (ws, _) = match tokio_tungstenite::connect_async(request).await {
		Ok(ok) => ok,
		Err(e) => {
			debug!("websocket dial failed, falling back to http: {e}");
			return Ok(None);
		},
	};
	let (mut sink, mut source) = ws.split();

	if let Err(e) = sink.send(Message::Text(payload)).await {
		let _ = sink.close().await;
		return Err(RelayError::UpstreamTransport(e.into()));
	}

	// First frame decides between fallback, synthesized error and a live
	// session.
	let first = loop {
		match source.next().await {
			// Normal close before any event: this tenant cannot use WebSocket
			None | Some(Ok(Message::Close(_))) => {
				let _ = sink.close().await;
				return Ok(None);
			},
			Some(Ok(Message::Text(text))) => break text,
			Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
			Some(Ok(Message::Binary(_))) => {
				let _ = sink.close().await;
				return Err(RelayError::WebSocketProtocol(
					"unexpected binary frame".to_string(),
				));
			},
			Some(Err(e)) => {
				let _ = sink.close().await;
				return Err(RelayError::WebSocketProtocol(e.to_string()));
			},
		}
	};

	let first = match classify_first_event(&first) {
		FirstFrame::Fallback => {
			let _ = sink.close().await;
			return Ok(None);
		},
		FirstFrame::Error { status, body } => {
			let _ = sink.close().await;
			let bytes = body.to_string();
			let resp = http::Response::builder()
				.status(status)
				.header(CONTENT_TYPE, "application/json")
				.header(CONTENT_LENGTH, bytes.len())
				.body(Body::from(bytes))
				.map_err(|e| RelayError::UpstreamTransport(e.into()))?;
			return Ok(Some(resp));
		},
		FirstFrame::Event(text) => text,
	};

	if stream {
		Ok(Some(forward_stream(first, sink, source)))
	} else {
		collect_response(first, sink, source).await.map(Some)
	}
}

fn is_terminal(text: &str) -> bool {
	serde_json::from_str::<Value>(text)
		.ok()
		.and_then(|v| {
			v.get("type")
				.and_then(Value::as_str)
				.map(|t| TERMINAL_EVENTS.contains(&t))
		})
		.unwrap_or(false)
}

/// Copies WebSocket text frames into a synthesized SSE body. The channel is
/// bounded, so a slow client exerts backpressure on the socket read; a
/// dropped receiver (client gone) stops the forwarder and closes the socket.
fn forward_stream<W, R>(first: String, mut sink: W, mut source: R) -> Response
where
	W: futures_util::Sink<Message> + Unpin + Send + 'static,
	R: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
		+ Unpin
		+ Send
		+ 'static,
{
	let (tx, rx) = tokio::sync::mpsc::channel::<Result<Bytes, axum::Error>>(16);
	tokio::spawn(async move {
		let frame = |text: &str| Bytes::from(format!("data: {text}\n\n"));
		let mut done = is_terminal(&first);
		if tx.send(Ok(frame(&first))).await.is_err() {
			done = true;
		}
		while !done {
			match source.next().await {
				Some(Ok(Message::Text(text))) => {
					done = is_terminal(&text);
					if tx.send(Ok(frame(&text))).await.is_err() {
						break;
					}
				},
				Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
				Some(Ok(Message::Binary(_))) => continue,
				None | Some(Ok(Message::Close(_))) => break,
				Some(Err(e)) => {
					warn!("websocket read failed mid-stream: {e}");
					break;
				},
			}
		}
		let _ = tx.send(Ok(Bytes::from_static(b"data: [DONE]\n\n"))).await;
		let _ = sink.close().await;
	});

	let body = Body::from_stream(tokio_stream::wrappers::ReceiverStream::new(rx));
	let mut resp = http::Response::new(body);
	resp
		.headers_mut()
		.insert(CONTENT_TYPE, http::HeaderValue::from_static("text/event-stream"));
	resp
}

/// Reads until a terminal event and returns the final response object as a
/// plain HTTP 200 JSON body.
async fn collect_response<W, R>(
	first: String,
	mut sink: W,
	mut source: R,
) -> Result<Response, RelayError>
where
	W: futures_util::Sink<Message> + Unpin,
	R: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
	let mut current = first;
	let final_event = loop {
		if is_terminal(&current) {
			break current;
		}
		match source.next().await {
			Some(Ok(Message::Text(text))) => current = text,
			Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
			Some(Ok(Message::Binary(_))) => continue,
			None | Some(Ok(Message::Close(_))) => {
				let _ = sink.close().await;
				return Err(RelayError::WebSocketProtocol(
					"stream closed before a terminal event".to_string(),
				));
			},
			Some(Err(e)) => {
				let _ = sink.close().await;
				return Err(RelayError::WebSocketProtocol(e.to_string()));
			},
		}
	};
	let _ = sink.close().await;

	let event: Value = serde_json::from_str(&final_event)
		.map_err(|e| RelayError::WebSocketProtocol(format!("unparseable terminal event: {e}")))?;
	if event.get("type").and_then(Value::as_str) == Some("error") {
		let status = event
			.get("status")
			.and_then(Value::as_u64)
			.map(|s| s as u16)
			.unwrap_or(500);
		let error = event
			.get("error")
			.cloned()
			.unwrap_or_else(|| json!({"message": "upstream error"}));
		let bytes = json!({"error": error}).to_string();
		let resp = http::Response::builder()
			.status(status)
			.header(CONTENT_TYPE, "application/json")
			.header(CONTENT_LENGTH, bytes.len())
			.body(Body::from(bytes))
			.map_err(|e| RelayError::UpstreamTransport(e.into()))?;
		return Ok(resp);
	}
	let response = event.get("response").cloned().ok_or_else(|| {
		RelayError::WebSocketProtocol("terminal event carried no response object".to_string())
	})?;
	let bytes = response.to_string();
	http::Response::builder()
		.status(200)
		.header(CONTENT_TYPE, "application/json")
		.header(CONTENT_LENGTH, bytes.len())
		.body(Body::from(bytes))
		.map_err(|e| RelayError::UpstreamTransport(e.into()))
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use super::*;
	use crate::relay::RelayMode;

	fn test_meta() -> RelayMeta {
		RelayMeta {
			channel_family: ChannelFamily::OpenAI,
			mode: RelayMode::ResponseApi,
			origin_model_name: "gpt-5".to_string(),
			actual_model_name: "gpt-5".to_string(),
			base_url: "https://api.openai.com".to_string(),
			api_key: "sk-test".to_string(),
			api_version: None,
			api_format: None,
			request_url_path: "/v1/responses".to_string(),
			is_stream: true,
			prompt_tokens: 0,
			response_api_fallback: false,
			channel_id: 1,
			model_mapping: HashMap::new(),
		}
	}

	#[test]
	fn eligibility() {
		let meta = test_meta();
		let body = Bytes::from_static(br#"{"model":"gpt-5","input":"hi","stream":true}"#);
		assert!(eligible(&meta, "https://api.openai.com/v1/responses", &body));

		// background jobs stay on HTTP
		let bg = Bytes::from_static(br#"{"model":"gpt-5","input":"hi","background":true}"#);
		assert!(!eligible(&meta, "https://api.openai.com/v1/responses", &bg));

		// wrong path
		assert!(!eligible(&meta, "https://api.openai.com/v1/chat/completions", &body));

		// invalid JSON
		assert!(!eligible(&meta, "https://api.openai.com/v1/responses", &Bytes::from_static(b"{")));

		// a prior fallback pins the request to HTTP
		let mut meta = test_meta();
		meta.response_api_fallback = true;
		assert!(!eligible(&meta, "https://api.openai.com/v1/responses", &body));

		let mut meta = test_meta();
		meta.channel_family = ChannelFamily::Azure;
		assert!(!eligible(&meta, "https://api.openai.com/v1/responses", &body));
	}

	#[test]
	fn request_rewrite() {
		let body = Bytes::from_static(
			br#"{"model":"gpt-5","input":"hi","stream":true,"background":false}"#,
		);
		let (payload, stream) = rewrite_request(&body).unwrap();
		assert!(stream);
		let v: Value = serde_json::from_str(&payload).unwrap();
		assert_eq!(v.get("type").unwrap(), "response.create");
		assert!(v.get("stream").is_none());
		assert!(v.get("background").is_none());
		assert_eq!(v.get("model").unwrap(), "gpt-5");
	}

	#[test]
	fn scheme_upgrade() {
		assert_eq!(
			upgrade_scheme("https://api.openai.com/v1/responses?x=1").unwrap(),
			"wss://api.openai.com/v1/responses?x=1"
		);
		assert_eq!(
			upgrade_scheme("http://localhost:8080/v1/responses").unwrap(),
			"ws://localhost:8080/v1/responses"
		);
	}

	#[test]
	fn connection_limit_triggers_fallback() {
		let event = r#"{"type":"error","status":400,"error":{"code":"websocket_connection_limit_reached","message":"too many connections"}}"#;
		assert!(matches!(classify_first_event(event), FirstFrame::Fallback));

		let event = r#"{"type":"error","message":"please reconnect over http"}"#;
		assert!(matches!(classify_first_event(event), FirstFrame::Fallback));
	}

	#[test]
	fn other_errors_become_http_responses() {
		let event = r#"{"type":"error","status":429,"error":{"code":"rate_limited","message":"slow down"}}"#;
		match classify_first_event(event) {
			FirstFrame::Error { status, body } => {
				assert_eq!(status, 429);
				assert_eq!(body.pointer("/error/code").unwrap(), "rate_limited");
			},
			_ => panic!("expected error"),
		}
	}

	#[test]
	fn normal_events_pass_through() {
		let event = r#"{"type":"response.created","response":{"id":"resp_1"}}"#;
		assert!(matches!(classify_first_event(event), FirstFrame::Event(_)));
		assert!(!is_terminal(event));
		assert!(is_terminal(r#"{"type":"response.completed","response":{"id":"resp_1"}}"#));
	}
}

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canonical failure taxonomy. Every error surfaced to a client is request
/// scoped; nothing here is fatal to the process.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
	/// Malformed client input (bad image data, invalid search context size,
	/// invalid mode).
	#[error("invalid request: {0}")]
	InvalidRequest(String),
	/// Non-2xx from the upstream; the body is passed through.
	#[error("upstream returned status {status}")]
	Upstream { status: u16, body: Bytes },
	/// Connection, dial or read failure talking to the upstream.
	#[error("upstream transport: {0}")]
	UpstreamTransport(#[source] anyhow::Error),
	/// Unexpected frame or abnormal close on a WebSocket session.
	#[error("websocket protocol: {0}")]
	WebSocketProtocol(String),
	/// Marshal/unmarshal of a payload we constructed ourselves.
	#[error("internal: {0}")]
	Internal(#[source] serde_json::Error),
	/// Client disconnected mid-stream. Recoverable for billing.
	#[error("client cancelled")]
	Cancelled,
}

impl RelayError {
	pub fn status_code(&self) -> u16 {
		match self {
			RelayError::InvalidRequest(_) => 400,
			RelayError::Upstream { status, .. } => *status,
			RelayError::UpstreamTransport(_) => 502,
			RelayError::WebSocketProtocol(_) => 502,
			RelayError::Internal(_) => 500,
			RelayError::Cancelled => 499,
		}
	}

	fn kind(&self) -> &'static str {
		match self {
			RelayError::InvalidRequest(_) => "invalid_request_error",
			RelayError::Upstream { .. } => "upstream_error",
			RelayError::UpstreamTransport(_) => "upstream_transport_error",
			RelayError::WebSocketProtocol(_) => "websocket_protocol_error",
			RelayError::Internal(_) => "internal_error",
			RelayError::Cancelled => "client_cancelled",
		}
	}

	/// The user-visible body. Diagnostic detail stays in the logs; the raw
	/// source error is never serialized to clients.
	pub fn to_client_body(&self) -> ClientError {
		// Upstream bodies already carry a provider error object; reuse it when
		// it parses, otherwise wrap the raw text.
		if let RelayError::Upstream { body, .. } = self {
			if let Ok(parsed) = serde_json::from_slice::<ClientError>(body) {
				return parsed;
			}
			return ClientError {
				error: ClientErrorDetail {
					message: String::from_utf8_lossy(body).into_owned(),
					r#type: self.kind().to_string(),
					code: None,
				},
			};
		}
		ClientError {
			error: ClientErrorDetail {
				message: self.to_string(),
				r#type: self.kind().to_string(),
				code: None,
			},
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientError {
	pub error: ClientErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientErrorDetail {
	pub message: String,
	pub r#type: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub code: Option<Value>,
}

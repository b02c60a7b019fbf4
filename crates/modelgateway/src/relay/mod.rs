use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{Deps, Response};

pub mod context;
pub mod conversion;
pub mod endpoint;
pub mod error;
pub mod model;
pub mod normalize;
pub mod oracle;
pub mod tools;
pub mod transport;
pub mod types;
pub mod usage;
pub mod websocket;

pub use context::{ConvertedRequest, RelayContext};
pub use error::RelayError;
pub use usage::{Usage, UsageRecorder};

use crate::relay::types::{claude, completions, responses};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelFamily {
	OpenAI,
	Azure,
	OpenAICompatible,
	OpenRouter,
	Minimax,
	Doubao,
	Novita,
	BaiduV2,
	AliBailian,
	GeminiOpenAICompatible,
}

/// The wire surface a channel exposes upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiFormat {
	ChatCompletion,
	Response,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayMode {
	ChatCompletions,
	ResponseApi,
	ClaudeMessages,
	ImagesGenerations,
	ImagesEdits,
	Embeddings,
	Videos,
}

/// A configured upstream. Immutable once loaded; per-request state lives in
/// [`RelayMeta`] and [`RelayContext`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
	pub id: u64,
	pub family: ChannelFamily,
	pub base_url: String,
	pub api_key: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub api_version: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub api_format: Option<ApiFormat>,
	#[serde(default, skip_serializing_if = "HashMap::is_empty")]
	pub model_mapping: HashMap<String, String>,
}

/// Per-request metadata assembled by the host. Mutable during normalization
/// (which may reset the target path and model name), read-only afterwards.
#[derive(Debug, Clone)]
pub struct RelayMeta {
	pub channel_family: ChannelFamily,
	pub mode: RelayMode,
	pub origin_model_name: String,
	pub actual_model_name: String,
	pub base_url: String,
	pub api_key: String,
	pub api_version: Option<String>,
	pub api_format: Option<ApiFormat>,
	/// Client path plus query string, e.g. `/v1/chat/completions?reasoning_format=thinking`.
	pub request_url_path: String,
	pub is_stream: bool,
	/// Pre-estimated prompt tokens, used to back-fill incomplete usage.
	pub prompt_tokens: u64,
	/// Per-request override set after a WebSocket (or transient) failure so
	/// the retry goes over plain HTTP.
	pub response_api_fallback: bool,
	pub channel_id: u64,
	pub model_mapping: HashMap<String, String>,
}

impl RelayMeta {
	pub fn for_channel(channel: &Channel, mode: RelayMode, request_url_path: &str) -> Self {
		RelayMeta {
			channel_family: channel.family,
			mode,
			origin_model_name: String::new(),
			actual_model_name: String::new(),
			base_url: channel.base_url.trim_end_matches('/').to_string(),
			api_key: channel.api_key.clone(),
			api_version: channel.api_version.clone(),
			api_format: channel.api_format,
			request_url_path: request_url_path.to_string(),
			is_stream: false,
			prompt_tokens: 0,
			response_api_fallback: false,
			channel_id: channel.id,
			model_mapping: channel.model_mapping.clone(),
		}
	}

	pub fn mapped_model(&self, model: &str) -> String {
		self
			.model_mapping
			.get(model)
			.cloned()
			.unwrap_or_else(|| model.to_string())
	}

	/// GitHub Models speaks the compatible surface but rejects the Response
	/// API even when a channel is configured for it.
	pub fn is_github_models(&self) -> bool {
		self.base_url.contains("models.github.ai")
			|| self.base_url.contains("models.inference.ai.azure.com")
	}

	/// DeepSeek-compatible channels only understand enabled/disabled thinking.
	pub fn is_deepseek_compatible(&self) -> bool {
		self.base_url.contains("deepseek")
	}

	/// Value of a query parameter on the client request path.
	pub fn query_param(&self, name: &str) -> Option<String> {
		let (_, query) = self.request_url_path.split_once('?')?;
		query.split('&').find_map(|pair| {
			let (k, v) = pair.split_once('=')?;
			(k == name).then(|| v.to_string())
		})
	}
}

/// Decides whether the upstream call uses the Response API surface.
pub fn force_response_api(meta: &RelayMeta, model: &str) -> bool {
	match meta.channel_family {
		ChannelFamily::OpenAI => {
			!model::is_chat_completion_only(model) && !meta.response_api_fallback
		},
		ChannelFamily::Azure => model::azure_requires_response_api(model),
		ChannelFamily::OpenAICompatible => {
			meta.api_format == Some(ApiFormat::Response) && !meta.is_github_models()
		},
		_ => false,
	}
}

/// The host-framework contract: one adaptor instance per channel family,
/// driving request conversion, transport and response conversion.
#[async_trait]
pub trait Adaptor: Send + Sync {
	fn init(&mut self, meta: &RelayMeta);

	fn get_request_url(&self, meta: &RelayMeta) -> Result<String, RelayError>;

	fn setup_request_header(
		&self,
		ctx: &RelayContext,
		headers: &mut http::HeaderMap,
		meta: &RelayMeta,
	) -> Result<(), RelayError>;

	/// Converts an inbound OpenAI-dialect request (Chat Completions or
	/// Response API body, per `meta.mode`) into the upstream payload.
	async fn convert_request(
		&self,
		ctx: &mut RelayContext,
		meta: &mut RelayMeta,
		body: Bytes,
	) -> Result<Bytes, RelayError>;

	/// Converts an inbound Claude Messages request into the upstream payload.
	async fn convert_claude_request(
		&self,
		ctx: &mut RelayContext,
		meta: &mut RelayMeta,
		body: Bytes,
	) -> Result<Bytes, RelayError>;

	async fn do_request(
		&self,
		ctx: &mut RelayContext,
		meta: &mut RelayMeta,
		body: Bytes,
	) -> Result<Response, RelayError>;

	/// Translates the upstream reply back into the client dialect. The
	/// returned recorder carries usage; for streams it keeps filling as the
	/// body is copied to the client, so a client write error still leaves
	/// billable counters behind.
	async fn do_response(
		&self,
		ctx: &mut RelayContext,
		resp: Response,
		meta: &RelayMeta,
	) -> Result<(Response, UsageRecorder), RelayError>;
}

/// Adaptor for the OpenAI family: canonical OpenAI, Azure OpenAI and the
/// OpenAI-compatible vendor channels.
pub struct OpenAIAdaptor {
	deps: Deps,
	channel_id: u64,
}

impl OpenAIAdaptor {
	pub fn new(deps: Deps) -> Self {
		OpenAIAdaptor {
			deps,
			channel_id: 0,
		}
	}

	pub fn deps(&self) -> &Deps {
		&self.deps
	}
}

#[async_trait]
impl Adaptor for OpenAIAdaptor {
	fn init(&mut self, meta: &RelayMeta) {
		self.channel_id = meta.channel_id;
	}

	fn get_request_url(&self, meta: &RelayMeta) -> Result<String, RelayError> {
		endpoint::build_url(meta)
	}

	fn setup_request_header(
		&self,
		_ctx: &RelayContext,
		headers: &mut http::HeaderMap,
		meta: &RelayMeta,
	) -> Result<(), RelayError> {
		endpoint::build_headers(meta, headers)
	}

	async fn convert_request(
		&self,
		ctx: &mut RelayContext,
		meta: &mut RelayMeta,
		body: Bytes,
	) -> Result<Bytes, RelayError> {
		match meta.mode {
			RelayMode::ChatCompletions => {
				let mut req: completions::Request = serde_json::from_slice(&body)
					.map_err(|e| RelayError::InvalidRequest(format!("malformed request body: {e}")))?;
				normalize::normalize_request(meta, &mut req, &self.deps).await?;
				ctx.origin_request = Some(req.clone());
				if force_response_api(meta, &meta.actual_model_name) {
					let converted = conversion::responses::from_completions::translate(&req)?;
					meta.request_url_path = "/v1/responses".to_string();
					let bytes = serde_json::to_vec(&converted).map_err(RelayError::Internal)?;
					ctx.converted_request = Some(ConvertedRequest::Responses(converted));
					Ok(Bytes::from(bytes))
				} else {
					serde_json::to_vec(&req)
						.map(Bytes::from)
						.map_err(RelayError::Internal)
				}
			},
			RelayMode::ResponseApi => {
				let req: responses::Request = serde_json::from_slice(&body)
					.map_err(|e| RelayError::InvalidRequest(format!("malformed request body: {e}")))?;
				meta.origin_model_name = req.model.clone().unwrap_or_default();
				meta.actual_model_name = meta.mapped_model(&meta.origin_model_name);
				meta.is_stream = req.stream.unwrap_or_default();
				if force_response_api(meta, &meta.actual_model_name) {
					let mut req = req;
					req.model = Some(meta.actual_model_name.clone());
					serde_json::to_vec(&req)
						.map(Bytes::from)
						.map_err(RelayError::Internal)
				} else {
					// Channel only speaks Chat Completions; translate down and
					// remember to translate the reply back up
					let mut converted = conversion::responses::to_completions::translate(&req)?;
					converted.model = Some(meta.actual_model_name.clone());
					normalize::normalize_request(meta, &mut converted, &self.deps).await?;
					meta.request_url_path = "/v1/chat/completions".to_string();
					let bytes = serde_json::to_vec(&converted).map_err(RelayError::Internal)?;
					ctx.converted_request = Some(ConvertedRequest::ChatCompletions(converted));
					Ok(Bytes::from(bytes))
				}
			},
			mode => Err(RelayError::InvalidRequest(format!(
				"mode {mode:?} is not convertible by this adaptor"
			))),
		}
	}

	async fn convert_claude_request(
		&self,
		ctx: &mut RelayContext,
		meta: &mut RelayMeta,
		body: Bytes,
	) -> Result<Bytes, RelayError> {
		let req: claude::Request = serde_json::from_slice(&body)
			.map_err(|e| RelayError::InvalidRequest(format!("malformed request body: {e}")))?;
		ctx.claude_messages_conversion = true;
		let mut converted =
			conversion::claude::from_claude::translate(&req, meta.is_deepseek_compatible())?;
		normalize::normalize_request(meta, &mut converted, &self.deps).await?;
		ctx.origin_request = Some(converted.clone());
		if force_response_api(meta, &meta.actual_model_name) {
			let responses_req = conversion::responses::from_completions::translate(&converted)?;
			meta.request_url_path = "/v1/responses".to_string();
			let bytes = serde_json::to_vec(&responses_req).map_err(RelayError::Internal)?;
			ctx.converted_request = Some(ConvertedRequest::Responses(responses_req));
			Ok(Bytes::from(bytes))
		} else {
			meta.request_url_path = "/v1/chat/completions".to_string();
			serde_json::to_vec(&converted)
				.map(Bytes::from)
				.map_err(RelayError::Internal)
		}
	}

	async fn do_request(
		&self,
		ctx: &mut RelayContext,
		meta: &mut RelayMeta,
		body: Bytes,
	) -> Result<Response, RelayError> {
		let url = self.get_request_url(meta)?;
		if websocket::eligible(meta, &url, &body) {
			match websocket::do_request(&self.deps, meta, &url, &body).await? {
				Some(resp) => return Ok(resp),
				None => {
					// Tenant has no WebSocket access (or hit the connection
					// limit); retry the same payload over plain HTTP
					meta.response_api_fallback = true;
				},
			}
		}
		transport::do_request(&self.deps, ctx, meta, &url, body).await
	}

	async fn do_response(
		&self,
		ctx: &mut RelayContext,
		resp: Response,
		meta: &RelayMeta,
	) -> Result<(Response, UsageRecorder), RelayError> {
		transport::handle_response(&self.deps, ctx, resp, meta).await
	}
}

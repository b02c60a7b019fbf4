//! Upstream URL and auth header construction per channel family.

use http::HeaderValue;
use http::header::AUTHORIZATION;

use crate::relay::error::RelayError;
use crate::relay::{ApiFormat, ChannelFamily, RelayMeta, RelayMode, force_response_api};

const AZURE_DEFAULT_API_VERSION: &str = "2024-03-01-preview";
// o-family deployments only exist on the newer preview surface
const AZURE_O_FAMILY_API_VERSION: &str = "2025-04-01-preview";

fn split_path_query(path: &str) -> (&str, Option<&str>) {
	match path.split_once('?') {
		Some((p, q)) => (p, Some(q)),
		None => (path, None),
	}
}

fn with_query(path: String, query: Option<&str>) -> String {
	match query {
		Some(q) if !q.is_empty() => format!("{path}?{q}"),
		_ => path,
	}
}

fn azure_task(mode: RelayMode) -> &'static str {
	match mode {
		RelayMode::ImagesGenerations => "images/generations",
		RelayMode::ImagesEdits => "images/edits",
		RelayMode::Embeddings => "embeddings",
		RelayMode::Videos => "videos",
		RelayMode::ResponseApi => "responses",
		RelayMode::ChatCompletions | RelayMode::ClaudeMessages => "chat/completions",
	}
}

pub fn build_url(meta: &RelayMeta) -> Result<String, RelayError> {
	let base = meta.base_url.trim_end_matches('/');
	let model = meta.actual_model_name.as_str();
	let (path, query) = split_path_query(&meta.request_url_path);

	let url = match meta.channel_family {
		ChannelFamily::Azure => {
			if force_response_api(meta, model) || path == "/v1/responses" {
				format!("{base}/openai/v1/responses?api-version=v1")
			} else {
				let lowered = model.trim().to_ascii_lowercase();
				let api_version = if lowered.starts_with("o1")
					|| lowered.starts_with("o3")
					|| lowered.starts_with("o4")
				{
					AZURE_O_FAMILY_API_VERSION
				} else {
					meta
						.api_version
						.as_deref()
						.unwrap_or(AZURE_DEFAULT_API_VERSION)
				};
				// Deployment names pass through verbatim, dots included
				format!(
					"{base}/openai/deployments/{model}/{}?api-version={api_version}",
					azure_task(meta.mode)
				)
			}
		},
		ChannelFamily::OpenAI => {
			let path = if matches!(path, "/v1/chat/completions" | "/v1/messages")
				&& force_response_api(meta, model)
			{
				"/v1/responses".to_string()
			} else {
				path.to_string()
			};
			format!("{base}{}", with_query(path, query))
		},
		ChannelFamily::OpenAICompatible | ChannelFamily::OpenRouter => {
			let path = if meta.api_format == Some(ApiFormat::Response) && !meta.is_github_models() {
				"/v1/responses".to_string()
			} else if matches!(
				meta.mode,
				RelayMode::ChatCompletions | RelayMode::ClaudeMessages
			) {
				"/v1/chat/completions".to_string()
			} else {
				path.to_string()
			};
			format!("{base}{}", with_query(path, query))
		},
		ChannelFamily::Minimax => format!("{base}/v1/text/chatcompletion_v2"),
		ChannelFamily::Doubao => format!("{base}/api/v3/chat/completions"),
		ChannelFamily::Novita => format!("{base}/v3/openai/chat/completions"),
		ChannelFamily::BaiduV2 => format!("{base}/v2/chat/completions"),
		ChannelFamily::AliBailian => format!("{base}/compatible-mode/v1/chat/completions"),
		ChannelFamily::GeminiOpenAICompatible => {
			format!("{base}/v1beta/openai/chat/completions")
		},
	};
	Ok(url)
}

pub fn build_headers(meta: &RelayMeta, headers: &mut http::HeaderMap) -> Result<(), RelayError> {
	let key_err =
		|_| RelayError::InvalidRequest("api key contains invalid header characters".to_string());
	match meta.channel_family {
		ChannelFamily::Azure => {
			let mut value = HeaderValue::from_str(&meta.api_key).map_err(key_err)?;
			value.set_sensitive(true);
			headers.insert("api-key", value);
		},
		_ => {
			let mut value =
				HeaderValue::from_str(&format!("Bearer {}", meta.api_key)).map_err(key_err)?;
			value.set_sensitive(true);
			headers.insert(AUTHORIZATION, value);
		},
	}
	if meta.channel_family == ChannelFamily::OpenRouter {
		headers.insert(
			"HTTP-Referer",
			HeaderValue::from_static("https://github.com/modelgateway/modelgateway"),
		);
		headers.insert("X-Title", HeaderValue::from_static("Model Gateway"));
	}
	Ok(())
}

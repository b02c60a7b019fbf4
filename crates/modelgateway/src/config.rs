use serde::{Deserialize, Serialize};

/// Process configuration. Loaded once at startup and read freely afterwards;
/// nothing here is mutated at request time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Config {
	/// Applied when a request carries neither `max_tokens` nor
	/// `max_completion_tokens`.
	pub default_max_tokens: u32,
	/// Force `stream_options.include_usage` on streaming requests so the
	/// final SSE event carries billable usage.
	pub enforce_include_usage: bool,
	/// Global provider sort hint forwarded to OpenRouter.
	pub openrouter_provider_sort: Option<String>,
	pub debug_enabled: bool,
	/// Quota units per USD; used to scale per-call tool surcharges.
	pub quota_per_usd: f64,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			default_max_tokens: 4096,
			enforce_include_usage: true,
			openrouter_provider_sort: None,
			debug_enabled: false,
			quota_per_usd: 500_000.0,
		}
	}
}

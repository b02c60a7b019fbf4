use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::relay::error::RelayError;
use crate::relay::types::responses::ResponseUsage;

/// Canonical billable usage. This is also the Chat Completions wire shape, so
/// passthrough responses serialize it untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
	#[serde(default)]
	pub prompt_tokens: u64,
	#[serde(default)]
	pub completion_tokens: u64,
	#[serde(default)]
	pub total_tokens: u64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub prompt_tokens_details: Option<PromptTokensDetails>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub completion_tokens_details: Option<CompletionTokensDetails>,
	/// Quota surcharge for tool invocations, on top of token cost.
	#[serde(default, skip_serializing_if = "is_zero")]
	pub tools_cost: u64,
	#[serde(flatten, default)]
	pub rest: Value,
}

fn is_zero(v: &u64) -> bool {
	*v == 0
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptTokensDetails {
	#[serde(default)]
	pub cached_tokens: u64,
	#[serde(default, skip_serializing_if = "is_zero")]
	pub audio_tokens: u64,
	#[serde(flatten, default)]
	pub rest: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionTokensDetails {
	#[serde(default)]
	pub reasoning_tokens: u64,
	#[serde(flatten, default)]
	pub rest: Value,
}

impl Usage {
	pub fn is_empty(&self) -> bool {
		self.prompt_tokens == 0 && self.completion_tokens == 0 && self.total_tokens == 0
	}

	/// Maps Response API counters onto the canonical shape, promoting the
	/// cached and reasoning sub-counters into their detail structures.
	pub fn from_response_usage(u: &ResponseUsage) -> Usage {
		let mut usage = Usage {
			prompt_tokens: u.input_tokens,
			completion_tokens: u.output_tokens,
			total_tokens: u.total_tokens,
			..Default::default()
		};
		if let Some(d) = &u.input_tokens_details {
			if d.cached_tokens > 0 {
				usage.prompt_tokens_details = Some(PromptTokensDetails {
					cached_tokens: d.cached_tokens,
					..Default::default()
				});
			}
		}
		if let Some(d) = &u.output_tokens_details {
			if d.reasoning_tokens > 0 {
				usage.completion_tokens_details = Some(CompletionTokensDetails {
					reasoning_tokens: d.reasoning_tokens,
					..Default::default()
				});
			}
		}
		usage.reconcile(0);
		usage
	}

	/// Repairs counters the upstream reported incompletely: a missing total is
	/// recomputed, and a missing prompt count is back-filled from the
	/// pre-estimated request tokens.
	pub fn reconcile(&mut self, estimated_prompt_tokens: u64) {
		if self.total_tokens == 0 {
			self.total_tokens = self.prompt_tokens + self.completion_tokens;
		} else if self.prompt_tokens == 0 {
			self.prompt_tokens = estimated_prompt_tokens;
			self.completion_tokens = self.total_tokens.saturating_sub(self.prompt_tokens);
		}
	}
}

/// Shared usage cell. The streaming body transforms update it as events pass
/// through, so a client write error still leaves the billing layer with the
/// best-effort counters accumulated so far.
#[derive(Clone, Default, Debug)]
pub struct UsageRecorder {
	state: Arc<Mutex<RecorderState>>,
}

#[derive(Default, Debug)]
struct RecorderState {
	usage: Usage,
	counted_response_ids: HashSet<String>,
	web_search_calls: u64,
	seen_web_search_keys: HashSet<String>,
	completion_text: String,
}

impl UsageRecorder {
	pub fn mutate(&self, f: impl FnOnce(&mut Usage)) {
		let mut state = self.state.lock().expect("usage recorder poisoned");
		f(&mut state.usage);
	}

	/// Accumulates a Response API usage snapshot, idempotent per response id.
	/// `response.created`, `response.in_progress` and `response.completed` may
	/// all repeat the same counters; only the first snapshot per id counts.
	pub fn record_response_usage(&self, response_id: &str, u: &ResponseUsage) -> bool {
		let mut state = self.state.lock().expect("usage recorder poisoned");
		if !state.counted_response_ids.insert(response_id.to_string()) {
			return false;
		}
		let add = Usage::from_response_usage(u);
		let usage = &mut state.usage;
		usage.prompt_tokens += add.prompt_tokens;
		usage.completion_tokens += add.completion_tokens;
		usage.total_tokens += add.total_tokens;
		if let Some(d) = add.prompt_tokens_details {
			usage
				.prompt_tokens_details
				.get_or_insert_with(Default::default)
				.cached_tokens += d.cached_tokens;
		}
		if let Some(d) = add.completion_tokens_details {
			usage
				.completion_tokens_details
				.get_or_insert_with(Default::default)
				.reasoning_tokens += d.reasoning_tokens;
		}
		true
	}

	/// Records one chargeable web search, de-duplicated by item key.
	pub fn record_web_search(&self, key: &str) {
		let mut state = self.state.lock().expect("usage recorder poisoned");
		if state.seen_web_search_keys.insert(key.to_string()) {
			state.web_search_calls += 1;
		}
	}

	pub fn web_search_calls(&self) -> u64 {
		self.state.lock().expect("usage recorder poisoned").web_search_calls
	}

	/// Accumulates assistant text so usage can be synthesized when the
	/// upstream never reports it.
	pub fn append_completion(&self, text: &str) {
		let mut state = self.state.lock().expect("usage recorder poisoned");
		state.completion_text.push_str(text);
	}

	pub fn completion_text(&self) -> String {
		self
			.state
			.lock()
			.expect("usage recorder poisoned")
			.completion_text
			.clone()
	}

	pub fn snapshot(&self) -> Usage {
		self.state.lock().expect("usage recorder poisoned").usage.clone()
	}
}

struct WebSearchRate {
	model_prefix: &'static str,
	/// USD per 1000 calls by context size.
	low: f64,
	medium: f64,
	high: f64,
}

// Mini before the full-size model so the longer prefix wins.
const WEB_SEARCH_RATES: &[WebSearchRate] = &[
	WebSearchRate {
		model_prefix: "gpt-4o-mini-search",
		low: 25.0,
		medium: 27.5,
		high: 30.0,
	},
	WebSearchRate {
		model_prefix: "gpt-4o-search",
		low: 30.0,
		medium: 35.0,
		high: 50.0,
	},
];

/// Quota surcharge for `calls` web searches at the model's per-1000-call USD
/// rate, scaled by `quota_per_usd`. An empty context size means `medium`.
pub fn web_search_quota(
	model: &str,
	search_context_size: &str,
	calls: u64,
	quota_per_usd: f64,
) -> Result<u64, RelayError> {
	if calls == 0 {
		return Ok(0);
	}
	let model = model.trim().to_ascii_lowercase();
	let rate = WEB_SEARCH_RATES
		.iter()
		.find(|r| model.starts_with(r.model_prefix))
		.unwrap_or(&WEB_SEARCH_RATES[1]);
	let usd_per_k = match search_context_size {
		"low" => rate.low,
		"" | "medium" => rate.medium,
		"high" => rate.high,
		other => {
			return Err(RelayError::InvalidRequest(format!(
				"invalid search_context_size: {other}"
			)));
		},
	};
	Ok((usd_per_k / 1000.0 * calls as f64 * quota_per_usd).ceil() as u64)
}

/// Structured-output surcharge: a quarter of the completion tokens at the
/// model's ratio, rounded up.
pub fn structured_output_cost(completion_tokens: u64, model_ratio: f64) -> u64 {
	(completion_tokens as f64 * 0.25 * model_ratio).ceil() as u64
}

/// Audio prompt tokens from a probed duration. Charged once per request, not
/// per message.
pub fn audio_input_tokens(duration_secs: f64, tokens_per_second: f64) -> u64 {
	(duration_secs * tokens_per_second).ceil() as u64
}

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::relay::types::responses;

/// Per-request `tool name -> invocation count` bookkeeping, attached to the
/// request context and drained by the billing layer. Keys are case-folded.
#[derive(Debug, Clone, Default)]
pub struct ToolCounts {
	counts: HashMap<String, u64>,
}

impl ToolCounts {
	pub fn record(&mut self, name: &str) {
		self.add(name, 1);
	}

	pub fn add(&mut self, name: &str, n: u64) {
		if n == 0 {
			return;
		}
		*self.counts.entry(name.to_ascii_lowercase()).or_default() += n;
	}

	pub fn get(&self, name: &str) -> u64 {
		self
			.counts
			.get(&name.to_ascii_lowercase())
			.copied()
			.unwrap_or_default()
	}

	pub fn is_empty(&self) -> bool {
		self.counts.is_empty()
	}

	pub fn into_map(self) -> HashMap<String, u64> {
		self.counts
	}

	/// Merge inbound counters. Hosts hand these over as loosely-typed JSON, so
	/// every numeric representation is accepted and coerced to an integer.
	pub fn merge_value(&mut self, value: &Value) {
		let Some(map) = value.as_object() else {
			return;
		};
		for (name, v) in map {
			let n = match v {
				Value::Number(n) => n
					.as_u64()
					.or_else(|| n.as_i64().map(|i| i.max(0) as u64))
					.or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
				_ => None,
			};
			if let Some(n) = n {
				self.add(name, n);
			}
		}
	}
}

/// Counts chargeable `web_search_call` output items. An item is chargeable
/// when its action type is `search` (or missing, which older snapshots emit).
/// Items are de-duplicated by id, falling back to the query text, then to a
/// synthesized key so id-less items still count once each.
pub fn count_chargeable_web_searches(output: &[responses::Item]) -> u64 {
	let mut seen = HashSet::new();
	let mut anon = 0u64;
	let mut count = 0u64;
	for item in output {
		let responses::Item::WebSearchCall(call) = item else {
			continue;
		};
		let action_type = call
			.action
			.as_ref()
			.and_then(|a| a.get("type"))
			.and_then(Value::as_str)
			.unwrap_or_default();
		if !matches!(action_type, "" | "search") {
			continue;
		}
		let key = match (&call.id, call.action.as_ref()) {
			(Some(id), _) => id.clone(),
			(None, Some(action)) => match action.get("query").and_then(Value::as_str) {
				Some(q) => format!("query:{q}"),
				None => {
					anon += 1;
					format!("anon-{anon}")
				},
			},
			(None, None) => {
				anon += 1;
				format!("anon-{anon}")
			},
		};
		if seen.insert(key) {
			count += 1;
		}
	}
	count
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn merge_coerces_numeric_types() {
		let mut counts = ToolCounts::default();
		counts.merge_value(&json!({
			"Web_Search": 2,
			"code_interpreter": 1.0,
			"file_search": -1,
			"bogus": "three"
		}));
		assert_eq!(counts.get("web_search"), 2);
		assert_eq!(counts.get("code_interpreter"), 1);
		assert_eq!(counts.get("file_search"), 0);
		assert_eq!(counts.get("bogus"), 0);
	}

	#[test]
	fn chargeable_searches_dedupe_by_id_then_query() {
		let output: Vec<responses::Item> = serde_json::from_value(json!([
			{"type": "web_search_call", "id": "ws_1", "status": "completed", "action": {"type": "search", "query": "a"}},
			{"type": "web_search_call", "id": "ws_1", "status": "completed", "action": {"type": "search", "query": "a"}},
			{"type": "web_search_call", "status": "completed", "action": {"type": "search", "query": "b"}},
			{"type": "web_search_call", "status": "completed", "action": {"type": "search", "query": "b"}},
			{"type": "web_search_call", "status": "completed", "action": {"type": "open_page"}},
			{"type": "web_search_call", "status": "completed"}
		]))
		.unwrap();
		// ws_1 once, query:b once, the id-less/query-less one once; open_page
		// is not chargeable.
		assert_eq!(count_chargeable_web_searches(&output), 3);
	}
}

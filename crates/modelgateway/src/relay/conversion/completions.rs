use std::sync::Arc;

use tracing::debug;

use crate::Body;
use crate::parse;
use crate::relay::oracle::TokenCounter;
use crate::relay::types::completions;
use crate::relay::usage::UsageRecorder;

/// Observes a Chat Completions passthrough stream. Usage comes from the final
/// usage-bearing chunk when the upstream sends one; otherwise it is
/// synthesized from the accumulated completion text when the stream ends.
pub fn passthrough_stream(
	body: Body,
	limit: usize,
	recorder: UsageRecorder,
	tokens: Arc<dyn TokenCounter>,
	model: String,
	estimated_prompt_tokens: u64,
) -> Body {
	parse::sse::json_passthrough::<completions::StreamResponse, _>(body, limit, move |event| {
		match event {
			Some(Ok(chunk)) => {
				for choice in &chunk.choices {
					if let Some(text) = &choice.delta.content {
						recorder.append_completion(text);
					}
				}
				if let Some(usage) = chunk.usage {
					if !usage.is_empty() {
						recorder.mutate(|u| *u = usage);
					}
				}
			},
			Some(Err(e)) => {
				debug!("failed to parse completions stream chunk: {e}");
			},
			None => {
				// Stream over; backfill usage if the upstream never reported it
				let text = recorder.completion_text();
				recorder.mutate(|u| {
					if u.is_empty() {
						u.prompt_tokens = estimated_prompt_tokens;
						u.completion_tokens = tokens.count(&model, &text);
						u.total_tokens = u.prompt_tokens + u.completion_tokens;
					} else {
						u.reconcile(estimated_prompt_tokens);
					}
				});
			},
		}
	})
}

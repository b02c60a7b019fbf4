use crate::relay::tools::ToolCounts;
use crate::relay::types::{completions, responses};

/// A request payload rewritten into a different dialect for the upstream; the
/// response direction uses it to translate back.
#[derive(Debug)]
pub enum ConvertedRequest {
	/// Client spoke Chat Completions (or Claude), upstream got Response API.
	Responses(responses::Request),
	/// Client spoke Response API, upstream got Chat Completions.
	ChatCompletions(completions::Request),
}

/// Request-scoped state carried alongside the request, owned by the host and
/// threaded through the adaptor operations by `&mut`.
#[derive(Debug, Default)]
pub struct RelayContext {
	pub converted_request: Option<ConvertedRequest>,
	/// The normalized Chat Completions request, kept for response-side
	/// decisions (structured-output surcharge, implicit tool counting).
	pub origin_request: Option<completions::Request>,
	/// Set when the client spoke Claude Messages and the reply must be
	/// re-encoded as a Claude message.
	pub claude_messages_conversion: bool,
	/// Explicit upstream-reported web search count; suppresses implicit
	/// counting when present.
	pub web_search_call_count: Option<u64>,
	pub tool_counts: ToolCounts,
	/// The upstream request may already have been written when an error
	/// surfaced; billing must not assume the call never happened.
	pub upstream_request_possibly_forwarded: bool,
}

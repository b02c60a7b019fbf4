//! SSE body plumbing. Streams are rewritten as `Body -> Body` transforms so
//! the client write path stays a plain body copy with the socket providing
//! backpressure.

use async_stream::stream;
use bytes::Bytes;
use futures_util::StreamExt;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::Body;

/// Terminal sentinel payload of an OpenAI-style SSE stream.
pub const DONE_PAYLOAD: &str = "[DONE]";

#[derive(Debug, thiserror::Error)]
#[error("sse buffer limit exceeded")]
pub struct BufferLimitExceeded;

enum ScanItem {
	Data(String),
	Done,
}

/// Incremental SSE line scanner. Feeds on raw chunks, yields complete
/// `data:` payloads. A missing space after the `data:` prefix is tolerated.
struct EventScanner {
	buf: Vec<u8>,
	limit: usize,
}

impl EventScanner {
	fn new(limit: usize) -> Self {
		EventScanner {
			buf: Vec::new(),
			limit,
		}
	}

	fn push(&mut self, chunk: &[u8]) -> Result<Vec<ScanItem>, BufferLimitExceeded> {
		self.buf.extend_from_slice(chunk);
		if self.limit > 0 && self.buf.len() > self.limit {
			return Err(BufferLimitExceeded);
		}
		let mut out = Vec::new();
		while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
			let line: Vec<u8> = self.buf.drain(..=pos).collect();
			let mut line = &line[..line.len() - 1];
			if line.last() == Some(&b'\r') {
				line = &line[..line.len() - 1];
			}
			let Ok(line) = std::str::from_utf8(line) else {
				continue;
			};
			if let Some(payload) = line.strip_prefix("data:") {
				let payload = payload.trim_start_matches(' ');
				if payload == DONE_PAYLOAD {
					out.push(ScanItem::Done);
				} else if !payload.is_empty() {
					out.push(ScanItem::Data(payload.to_string()));
				}
			}
			// "event:" lines, comments and blank separators carry no payload
		}
		Ok(out)
	}
}

/// Forwards the body unchanged while feeding each `data:` event to `f`.
/// `f(None)` is invoked once when the stream ends.
pub fn json_passthrough<T, F>(body: Body, limit: usize, mut f: F) -> Body
where
	T: DeserializeOwned,
	F: FnMut(Option<Result<T, serde_json::Error>>) + Send + 'static,
{
	let mut data = body.into_data_stream();
	Body::from_stream(stream! {
		let mut scan = EventScanner::new(limit);
		while let Some(chunk) = data.next().await {
			match chunk {
				Ok(bytes) => {
					let events = match scan.push(&bytes) {
						Ok(events) => events,
						Err(e) => {
							yield Err(axum::Error::new(e));
							return;
						},
					};
					for ev in events {
						if let ScanItem::Data(payload) = ev {
							f(Some(serde_json::from_str::<T>(&payload)));
						}
					}
					yield Ok(bytes);
				},
				Err(e) => {
					f(None);
					yield Err(e);
					return;
				},
			}
		}
		f(None);
	})
}

/// Re-frames an upstream event stream into a different dialect. Each upstream
/// `data:` event maps to at most one downstream event; the downstream stream
/// is always terminated with `data: [DONE]`.
pub fn json_transform<I, O, F>(body: Body, limit: usize, mut f: F) -> Body
where
	I: DeserializeOwned,
	O: Serialize + Send,
	F: FnMut(Result<I, serde_json::Error>) -> Option<O> + Send + 'static,
{
	let mut data = body.into_data_stream();
	Body::from_stream(stream! {
		let mut scan = EventScanner::new(limit);
		'read: while let Some(chunk) = data.next().await {
			match chunk {
				Ok(bytes) => {
					let events = match scan.push(&bytes) {
						Ok(events) => events,
						Err(e) => {
							yield Err(axum::Error::new(e));
							return;
						},
					};
					for ev in events {
						match ev {
							ScanItem::Data(payload) => {
								let Some(out) = f(serde_json::from_str::<I>(&payload)) else {
									continue;
								};
								match serde_json::to_string(&out) {
									Ok(json) => yield Ok(Bytes::from(format!("data: {json}\n\n"))),
									Err(e) => {
										yield Err(axum::Error::new(e));
										return;
									},
								}
							},
							// The upstream terminator is not forwarded; we emit our own
							ScanItem::Done => break 'read,
						}
					}
				},
				Err(e) => {
					yield Err(e);
					return;
				},
			}
		}
		yield Ok(Bytes::from_static(b"data: [DONE]\n\n"));
	})
}

/// Like [`json_transform`] but each upstream event may fan out into several
/// named downstream events (`event: <name>` framing, Anthropic style). No
/// `[DONE]` terminator is appended. `f(None)` is invoked once when the
/// upstream ends, so translators can flush their terminal events even when
/// the upstream never announced completion.
pub fn named_transform<I, O, F>(body: Body, limit: usize, mut f: F) -> Body
where
	I: DeserializeOwned,
	O: Serialize + Send,
	F: FnMut(Option<Result<I, serde_json::Error>>) -> Vec<(&'static str, O)> + Send + 'static,
{
	let mut data = body.into_data_stream();
	Body::from_stream(stream! {
		let mut scan = EventScanner::new(limit);
		'read: while let Some(chunk) = data.next().await {
			match chunk {
				Ok(bytes) => {
					let events = match scan.push(&bytes) {
						Ok(events) => events,
						Err(e) => {
							yield Err(axum::Error::new(e));
							return;
						},
					};
					for ev in events {
						match ev {
							ScanItem::Data(payload) => {
								for (name, out) in f(Some(serde_json::from_str::<I>(&payload))) {
									match serde_json::to_string(&out) {
										Ok(json) => {
											yield Ok(Bytes::from(format!("event: {name}\ndata: {json}\n\n")))
										},
										Err(e) => {
											yield Err(axum::Error::new(e));
											return;
										},
									}
								}
							},
							ScanItem::Done => break 'read,
						}
					}
				},
				Err(e) => {
					// Best effort: let the translator close out before the
					// error surfaces, so billing keeps what was accumulated
					for (name, out) in f(None) {
						if let Ok(json) = serde_json::to_string(&out) {
							yield Ok(Bytes::from(format!("event: {name}\ndata: {json}\n\n")));
						}
					}
					yield Err(e);
					return;
				},
			}
		}
		for (name, out) in f(None) {
			match serde_json::to_string(&out) {
				Ok(json) => yield Ok(Bytes::from(format!("event: {name}\ndata: {json}\n\n"))),
				Err(e) => {
					yield Err(axum::Error::new(e));
					return;
				},
			}
		}
	})
}

//! Collaborator seams. The gateway consumes these; it owns none of them.

use async_trait::async_trait;
use bytes::Bytes;

/// Probes and fetches media referenced by requests. Implementations live in
/// the host (they own the HTTP client policy and any caching).
#[async_trait]
pub trait MediaProbe: Send + Sync {
	/// Download an image and report its mime type.
	async fn fetch_image(&self, url: &str) -> anyhow::Result<(String, Bytes)>;
	/// Pixel dimensions, used for tile-based image token pricing.
	async fn image_dimensions(&self, url: &str) -> anyhow::Result<(u32, u32)>;
	/// Duration of an audio payload in seconds.
	async fn audio_duration_secs(&self, data: &[u8]) -> anyhow::Result<f64>;
}

/// Token counting for synthesized usage when the upstream omits it.
pub trait TokenCounter: Send + Sync {
	fn count(&self, model: &str, text: &str) -> u64;
}

/// Model pricing lookup, used to scale tool surcharges.
pub trait PriceTable: Send + Sync {
	fn model_ratio(&self, model: &str) -> f64;
}

use std::sync::Arc;

pub mod config;
pub mod parse;
pub mod relay;

/// Body type used on both the client-facing and upstream-facing side.
/// SSE rewriting is a `Body -> Body` transform, so everything streams.
pub type Body = axum::body::Body;
pub type Request = ::http::Request<Body>;
pub type Response = ::http::Response<Body>;

pub use config::Config;
pub use relay::error::RelayError;

/// Shared process-wide state handed to every adaptor instance.
#[derive(Clone)]
pub struct Deps {
	pub config: Arc<Config>,
	pub client: reqwest::Client,
	pub media: Arc<dyn relay::oracle::MediaProbe>,
	pub tokens: Arc<dyn relay::oracle::TokenCounter>,
	pub prices: Arc<dyn relay::oracle::PriceTable>,
}

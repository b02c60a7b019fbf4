//! Model-name heuristics. Pure functions over lowercased, trimmed names; the
//! tables here gate normalization, dialect routing and image-token pricing.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::relay::oracle::MediaProbe;

static O_FAMILY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^o\d").unwrap());
static GPT_5_PLUS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^gpt-(?:[5-9]|1\d)").unwrap());

fn canon(model: &str) -> String {
	model.trim().to_ascii_lowercase()
}

/// Models with a distinct thinking phase that accept `reasoning_effort`.
pub fn is_reasoning_model(model: &str) -> bool {
	let m = canon(model);
	if m.starts_with("gpt-5-chat") {
		return false;
	}
	O_FAMILY.is_match(&m) || GPT_5_PLUS.is_match(&m)
}

/// Reasoning models pinned to `"medium"` effort.
pub fn is_medium_only_reasoning(model: &str) -> bool {
	let m = canon(model);
	m.starts_with('o') || (GPT_5_PLUS.is_match(&m) && m.contains("-chat"))
}

pub fn is_web_search_model(model: &str) -> bool {
	canon(model).contains("-search")
}

pub fn is_deep_research_model(model: &str) -> bool {
	canon(model).contains("deep-research")
}

/// Models the Response API cannot serve; they stay on Chat Completions.
pub fn is_chat_completion_only(model: &str) -> bool {
	let m = canon(model);
	m.contains("gpt") && (m.contains("-search-") || m.contains("-audio-"))
}

pub fn azure_requires_response_api(model: &str) -> bool {
	canon(model).starts_with("gpt-5")
}

pub fn is_audio_model(model: &str) -> bool {
	canon(model).contains("-audio")
}

struct ImageTokenRate {
	prefix: &'static str,
	base: u64,
	tile: u64,
}

// Most specific prefix first; `gpt-4o-mini` must win over `gpt-4o`.
const IMAGE_TOKEN_RATES: &[ImageTokenRate] = &[
	ImageTokenRate {
		prefix: "computer-use-preview",
		base: 65,
		tile: 129,
	},
	ImageTokenRate {
		prefix: "gpt-4o-mini",
		base: 2833,
		tile: 5667,
	},
	ImageTokenRate {
		prefix: "gpt-4.1-mini",
		base: 2833,
		tile: 5667,
	},
	ImageTokenRate {
		prefix: "gpt-5",
		base: 70,
		tile: 140,
	},
	ImageTokenRate {
		prefix: "o1",
		base: 75,
		tile: 150,
	},
	ImageTokenRate {
		prefix: "o3",
		base: 75,
		tile: 150,
	},
	ImageTokenRate {
		prefix: "gpt-4.1",
		base: 85,
		tile: 170,
	},
	ImageTokenRate {
		prefix: "gpt-4o",
		base: 85,
		tile: 170,
	},
];

fn image_rate(model: &str) -> &'static ImageTokenRate {
	let m = canon(model);
	IMAGE_TOKEN_RATES
		.iter()
		.find(|r| m.starts_with(r.prefix))
		// gpt-4o rates are the de-facto default for unknown vision models
		.unwrap_or(&IMAGE_TOKEN_RATES[IMAGE_TOKEN_RATES.len() - 1])
}

/// Tile-based image token count for known pixel dimensions.
///
/// High detail scales the image into a 2048x2048 box, then shrinks until the
/// shortest side is 768, and charges per 512px tile on top of the base cost.
pub fn image_tokens_for_dims(width: u32, height: u32, detail: Option<&str>, model: &str) -> u64 {
	let rate = image_rate(model);
	if detail == Some("low") {
		return rate.base;
	}
	let (mut w, mut h) = (width.max(1) as f64, height.max(1) as f64);
	let longest = w.max(h);
	if longest > 2048.0 {
		let scale = 2048.0 / longest;
		w *= scale;
		h *= scale;
	}
	let shortest = w.min(h);
	if shortest > 768.0 {
		let scale = 768.0 / shortest;
		w *= scale;
		h *= scale;
	}
	let tiles = (w / 512.0).ceil() as u64 * (h / 512.0).ceil() as u64;
	tiles * rate.tile + rate.base
}

/// Image token count for a URL, probing dimensions unless detail is `low`.
pub async fn count_image_tokens(
	media: &dyn MediaProbe,
	url: &str,
	detail: Option<&str>,
	model: &str,
) -> anyhow::Result<u64> {
	if detail == Some("low") {
		return Ok(image_rate(model).base);
	}
	let (w, h) = media.image_dimensions(url).await?;
	Ok(image_tokens_for_dims(w, h, detail, model))
}

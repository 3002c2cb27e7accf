//! Assist operations backed by an OpenAI-compatible chat-completions API.
//!
//! Every operation is one prompt and one HTTP round-trip. Nothing is retried
//! or cached; callers decide how to degrade when a call fails.

mod client;
mod parse;

pub use client::{AiClient, AiConfig, AiError};
pub use parse::{DEFAULT_POINTS, MAX_POINTS, MIN_POINTS, clamp_points, parse_points, strip_code_fence};

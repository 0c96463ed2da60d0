//! Google Gemini generate-content Standard

pub mod request;
pub mod streaming;

pub use request::build_generate_content_request;
pub use streaming::GeminiEventConverter;

/// Path of the streaming endpoint for `model_id`, relative to the base URL.
///
/// Accepts ids with or without the `models/` prefix.
pub fn stream_generate_content_path(model_id: &str) -> String {
    let id = model_id.strip_prefix("models/").unwrap_or(model_id);
    format!(
        "/models/{}:streamGenerateContent?alt=sse",
        urlencoding::encode(id)
    )
}

//! Plumbing shared by the service clients: outbound credential middlewares and
//! Google API error parsing.

pub mod middleware;

#[cfg(feature = "firebase")]
use serde::Deserialize;

/// The `{"error": {...}}` body Google APIs return on failure. Only the fields
/// used in messages are decoded.
#[cfg(feature = "firebase")]
#[derive(Debug, Deserialize)]
pub struct GoogleErrorResponse {
    pub error: GoogleErrorDetails,
}

#[cfg(feature = "firebase")]
#[derive(Debug, Deserialize)]
pub struct GoogleErrorDetails {
    pub code: u16,
    pub message: String,
}

#[cfg(feature = "firebase")]
impl GoogleErrorResponse {
    pub fn display_message(&self) -> String {
        format!("{} (code: {})", self.error.message, self.error.code)
    }
}

/// Turns a failed Google API response into a readable message, falling back to
/// `"{default_msg}: {status}"` when the body is not the standard error shape.
#[cfg(feature = "firebase")]
pub async fn parse_error_response(response: reqwest::Response, default_msg: &str) -> String {
    let status = response.status();
    match response.json::<GoogleErrorResponse>().await {
        Ok(error_resp) => error_resp.display_message(),
        Err(_) => format!("{}: {}", default_msg, status),
    }
}

//! Base64 codec for image payloads.
//!
//! Inbound requests may carry the input image inline as base64, and
//! successful responses always return the generated image inline, so
//! both directions go through this module. Uses the standard alphabet
//! with padding, matching what browsers produce from a data URL.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::error::CoreError;

/// Encode raw image bytes for embedding in a JSON response body.
pub fn encode_image(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode a base64 payload from a request body into raw bytes.
///
/// Returns [`CoreError::Validation`] on malformed input -- a bad inline
/// image is the caller's fault, not ours.
pub fn decode_image(payload: &str) -> Result<Vec<u8>, CoreError> {
    STANDARD
        .decode(payload.trim())
        .map_err(|e| CoreError::Validation(format!("Invalid base64 image payload: {e}")))
}

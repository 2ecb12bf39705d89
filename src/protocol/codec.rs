//! Payload codec for queue deliveries
//!
//! Decoding checks structure only: the payload must be a JSON object whose
//! known fields have the right types. Missing fields take zero values, and
//! domain ranges such as humidity 0-100 are left to the ingestion endpoint.

use super::reading::Reading;
use serde_json::error::Category;
use serde_json::{Map, Value};
use thiserror::Error;

/// Content type sent with forwarded payloads and published messages
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Reasons a payload could not be turned into a [`Reading`]
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Bytes are not syntactically valid JSON (includes truncated input)
    #[error("Malformed JSON payload at line {line}, column {column}: {source}")]
    Syntax {
        line: usize,
        column: usize,
        #[source]
        source: serde_json::Error,
    },
    /// Valid JSON that does not match the reading shape
    #[error("Payload does not match reading shape: {0}")]
    Shape(#[source] serde_json::Error),
}

impl From<serde_json::Error> for DecodeError {
    fn from(error: serde_json::Error) -> Self {
        match error.classify() {
            Category::Data => DecodeError::Shape(error),
            Category::Syntax | Category::Eof | Category::Io => DecodeError::Syntax {
                line: error.line(),
                column: error.column(),
                source: error,
            },
        }
    }
}

/// Parse raw delivery bytes into a [`Reading`]
///
/// The payload is read as an object first, so a JSON array is a shape error
/// rather than a positional reading.
pub fn decode(payload: &[u8]) -> Result<Reading, DecodeError> {
    let object: Map<String, Value> = serde_json::from_slice(payload)?;
    Ok(serde_json::from_value(Value::Object(object))?)
}

/// Serialize a [`Reading`] for forwarding
///
/// A `Reading` holds only numbers, strings and optional numbers, none of
/// which can fail to serialize.
pub fn encode(reading: &Reading) -> Vec<u8> {
    serde_json::to_vec(reading).expect("Reading serialization cannot fail")
}

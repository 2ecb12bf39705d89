//! Wire types for the weather queue
//!
//! The same JSON shape is read from the broker and posted to the ingestion
//! endpoint, so one entity and one codec cover both directions.

pub mod codec;
pub mod reading;

pub use codec::{decode, encode, DecodeError, CONTENT_TYPE_JSON};
pub use reading::Reading;

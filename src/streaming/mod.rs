//! Media streaming module.
//!
//! Streams files produced by the encoder back to HLS clients while keeping
//! the owning transcode job referenced for the duration of the response.

mod content_type;
mod segment;

pub use content_type::content_type_for;
pub use segment::{LeasedStream, SegmentStreamer};

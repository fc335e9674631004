//! segmentd - HLS segment server for externally managed transcodes
//!
//! This library crate exposes the core functionality for integration testing.

pub mod config;
pub mod error;
pub mod server;
pub mod streaming;
pub mod transcoding;

pub use error::{Error, Result};

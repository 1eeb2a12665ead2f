//! Core types and utilities for the LWM2M protocol
//!
//! This crate provides fundamental types, error handling, and the resource
//! locator used throughout the LWM2M server implementation.

pub mod content_format;
pub mod error;
pub mod path;

pub use content_format::ContentFormat;
pub use error::{Lwm2mError, Lwm2mResult};
pub use path::Path;

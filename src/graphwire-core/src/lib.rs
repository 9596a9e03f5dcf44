//! Graphwire core library
//!
//! Pure data layer for the graph protocol client:
//! - Typed values and graph entity snapshots
//! - Hydration of raw JSON result payloads
//! - Error taxonomy and server error classification
//! - Credential encoding
//!
//! Nothing in this crate performs network I/O.

pub mod auth;
pub mod entity;
pub mod error;
pub mod hydrate;
pub mod record;
pub mod value;

// Re-export commonly used types
pub use entity::{Node, Path, PropertyMap, Relationship};
pub use error::{classify, classify_body, GraphError, Result};
pub use record::Record;
pub use value::Value;

//! TPLHOST Core - shared types for the template-compiler host.
//!
//! This crate holds the pieces shared by every layer of the host:
//! - Strongly-typed errors with stable codes
//! - Value types describing spans of guest linear memory

#![warn(missing_docs)]

pub mod error;
pub mod types;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::error::{HostError, Result};
    pub use crate::types::{EncodedStr, MemSpan};
}

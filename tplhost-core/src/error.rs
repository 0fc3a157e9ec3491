//! Error types for the template-compiler host.
//!
//! Every failure mode at the host/module boundary has its own coded
//! variant. Errors carry enough context (export name, offsets, byte
//! counts) to diagnose a misbehaving module without a debugger.

use thiserror::Error;

/// The main error type for host/module operations.
#[derive(Error, Debug)]
pub enum HostError {
    // =========================================================================
    // Load Errors (E001-E099)
    // =========================================================================
    /// Module fetch, validation, or instantiation failed.
    #[error("E001: failed to load compiler module: {cause}")]
    Load {
        /// Reason for the load failure.
        cause: String,
    },

    /// A required export is missing or has the wrong signature.
    #[error("E002: compiler module does not export '{name}' with the expected signature")]
    MissingExport {
        /// The export name that could not be resolved.
        name: &'static str,
    },

    /// The loader already ran and cannot be reused.
    #[error("E003: loader is {state}; a new loader is required to retry")]
    LoaderSpent {
        /// The loader state that refused the request.
        state: &'static str,
    },

    // =========================================================================
    // Memory/Codec Errors (E100-E199)
    // =========================================================================
    /// A read or write fell outside the module's linear memory.
    #[error("E101: memory access out of bounds: offset={offset}, len={len}")]
    MemoryAccess {
        /// Start offset of the rejected access.
        offset: u32,
        /// Length in bytes of the rejected access.
        len: u32,
    },

    /// Bytes returned by the module are not valid UTF-8.
    #[error("E102: module returned invalid UTF-8 at offset {offset}: {cause}")]
    Decode {
        /// Offset of the undecodable byte run.
        offset: u32,
        /// Description of the decoding failure.
        cause: String,
    },

    /// The module's allocator could not satisfy an encoding request.
    #[error("E103: module allocator could not provide {requested} bytes")]
    EncodingOverflow {
        /// Number of bytes that could not be allocated.
        requested: u64,
    },

    // =========================================================================
    // Execution Errors (E200-E299)
    // =========================================================================
    /// An exported function trapped. Module memory is undefined afterwards.
    #[error("E201: module trapped in '{entry}': {cause}")]
    Trap {
        /// The export that was executing when the trap occurred.
        entry: &'static str,
        /// The trap message reported by the runtime.
        cause: String,
    },

    /// The instance trapped earlier and must be replaced before further calls.
    #[error("E202: module instance poisoned by an earlier trap")]
    Poisoned,
}

impl HostError {
    /// Get the error code (e.g., "E001").
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Load { .. } => "E001",
            Self::MissingExport { .. } => "E002",
            Self::LoaderSpent { .. } => "E003",
            Self::MemoryAccess { .. } => "E101",
            Self::Decode { .. } => "E102",
            Self::EncodingOverflow { .. } => "E103",
            Self::Trap { .. } => "E201",
            Self::Poisoned => "E202",
        }
    }

    /// Check if this error leaves the module instance unusable.
    ///
    /// Fatal errors require instantiating a fresh module; non-fatal errors
    /// are local to one call and the instance stays usable.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Trap { .. } | Self::Poisoned)
    }

    /// Check if this error is local to a single compile call.
    #[must_use]
    pub fn is_call_local(&self) -> bool {
        matches!(
            self,
            Self::MemoryAccess { .. } | Self::Decode { .. } | Self::EncodingOverflow { .. }
        )
    }
}

/// Result type alias using `HostError`.
pub type Result<T> = std::result::Result<T, HostError>;

//! TPLHOST - host-side embedding layer for a WASM template compiler.
//!
//! The compiler ships as a precompiled WebAssembly module whose internals
//! are opaque. The host and the module share no type system: strings and
//! compound results cross the boundary as offset/length pairs in the
//! module's linear memory, marshaled by this crate.
//!
//! # Architecture
//!
//! - **HostRuntime**: manages the Wasmtime engine and compiled-module cache
//! - **ModuleLoader**: obtains and instantiates the module (streamed,
//!   buffered, or direct), with a tagged fallback path
//! - **MemoryViews**: caches the linear-memory buffer identity and rebuilds
//!   views when the module's allocator grows the buffer
//! - **StringCodec**: UTF-8 transcoding into and out of module memory
//! - **ScratchStack**: balanced reservation of the shared scratch region
//!   used to return compound results
//! - **TemplateCompiler**: drives one `compile` call end to end
//!
//! # Module ABI Contract
//!
//! The compiler module must export:
//!
//! ```text
//! memory: Memory
//! allocate(size: u32) -> u32                    // allocate, return offset
//! reallocate(ptr: u32, old: u32, new: u32) -> u32
//! free(ptr: u32, size: u32)
//! adjust_stack_pointer(delta: i32) -> i32       // reserve/release scratch
//! compile(result_slot: u32, str_ptr: u32, str_len: u32)
//! ```
//!
//! `compile` writes its result as two consecutive little-endian u32 words
//! at `result_slot`: word 0 is the result byte offset, word 1 the result
//! byte length. The result buffer is module-owned and must be freed by the
//! host once decoded.

#![warn(missing_docs)]

pub mod codec;
pub mod exports;
pub mod invoker;
pub mod loader;
pub mod memory;
pub mod observability;
pub mod runtime;
pub mod scratch;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::codec::StringCodec;
    pub use crate::exports::ModuleExports;
    pub use crate::invoker::{SharedCompiler, TemplateCompiler};
    pub use crate::loader::{
        InstantiationPath, LoadState, ModuleLoader, ModuleResponse, ModuleSource, ReadyModule,
    };
    pub use crate::memory::{MemView, MemoryViews};
    pub use crate::observability::{init_tracing, LogFormat, TracingConfig};
    pub use crate::runtime::{HostRuntime, HostRuntimeConfig};
    pub use crate::scratch::ScratchStack;
    pub use tplhost_core::error::{HostError, Result};
    pub use tplhost_core::types::{EncodedStr, MemSpan};
}

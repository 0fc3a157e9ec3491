//! UTF-8 string transcoding across the host/module boundary.
//!
//! Encoding takes the optimistic path first: most template source is
//! ASCII, so the initial allocation assumes one byte per character and
//! the leading ASCII run is copied verbatim. Only when a multi-byte
//! character appears does the encoder reallocate to a worst-case size
//! and write the remaining suffix, recording the exact byte count
//! actually written.

use crate::exports::{entry_error, ModuleExports, ALLOCATE_EXPORT, FREE_EXPORT, REALLOCATE_EXPORT};
use crate::memory::MemoryViews;
use tplhost_core::error::{HostError, Result};
use tplhost_core::types::{EncodedStr, MemSpan};
use wasmtime::Store;

/// Worst-case UTF-8 expansion of one host character.
///
/// A Rust `char` encodes to at most four bytes.
const MAX_UTF8_BYTES_PER_CHAR: u64 = 4;

/// Encoder/decoder for strings crossing the module boundary.
///
/// Holds the exact byte count of the most recent encode as a
/// side-channel (single most-recent value; not reentrant), mirroring
/// the calling convention the module was compiled against.
#[derive(Debug, Default)]
pub struct StringCodec {
    /// Exact byte count written by the most recent `encode`.
    last_len: u32,
}

impl StringCodec {
    /// Create a new codec.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact number of bytes written by the most recent `encode` call.
    #[must_use]
    pub fn last_len(&self) -> u32 {
        self.last_len
    }

    /// Encode `text` into module memory.
    ///
    /// The returned descriptor names writable memory owned by the
    /// module's allocator; its span length is the exact encoded byte
    /// count, which may be smaller than the backing capacity.
    ///
    /// On failure any allocation the encoder made is freed before the
    /// error surfaces, so a failed encode leaves no module heap behind.
    pub fn encode<T>(
        &mut self,
        store: &mut Store<T>,
        views: &mut MemoryViews<T>,
        exports: &ModuleExports,
        text: &str,
    ) -> Result<EncodedStr> {
        let char_count = text.chars().count();
        let optimistic =
            u32::try_from(char_count).map_err(|_| HostError::EncodingOverflow {
                requested: char_count as u64,
            })?;

        let ptr = exports
            .allocate
            .call(&mut *store, optimistic)
            .map_err(|e| entry_error(ALLOCATE_EXPORT, e))?;
        if ptr == 0 && optimistic > 0 {
            return Err(HostError::EncodingOverflow {
                requested: u64::from(optimistic),
            });
        }

        // The allocation may have grown memory; write_at refreshes the view.
        let bytes = text.as_bytes();
        let ascii_len = bytes
            .iter()
            .position(|b| !b.is_ascii())
            .unwrap_or(bytes.len());
        if let Err(e) = views.write_at(store, ptr, &bytes[..ascii_len]) {
            return Err(discard(store, exports, MemSpan::new(ptr, optimistic), e));
        }

        if ascii_len == bytes.len() {
            let written = ascii_len as u32;
            self.last_len = written;
            return Ok(EncodedStr::new(MemSpan::new(ptr, written), optimistic));
        }

        let rest = &text[ascii_len..];
        let worst = ascii_len as u64 + rest.chars().count() as u64 * MAX_UTF8_BYTES_PER_CHAR;
        let capacity =
            u32::try_from(worst).map_err(|_| HostError::EncodingOverflow { requested: worst })?;

        let moved = exports
            .reallocate
            .call(&mut *store, (ptr, optimistic, capacity))
            .map_err(|e| entry_error(REALLOCATE_EXPORT, e))?;
        if moved == 0 {
            // A refused reallocation leaves the original allocation live.
            let err = HostError::EncodingOverflow {
                requested: u64::from(capacity),
            };
            return Err(discard(store, exports, MemSpan::new(ptr, optimistic), err));
        }

        if let Err(e) = views.write_at(store, moved + ascii_len as u32, rest.as_bytes()) {
            return Err(discard(store, exports, MemSpan::new(moved, capacity), e));
        }

        let written = ascii_len as u32 + rest.len() as u32;
        self.last_len = written;
        Ok(EncodedStr::new(MemSpan::new(moved, written), capacity))
    }

    /// Decode exactly `span.len` bytes at `span.offset` as UTF-8.
    ///
    /// Strict: any invalid byte sequence fails with `Decode`, never a
    /// replacement character.
    pub fn decode<T>(
        &self,
        store: &Store<T>,
        views: &mut MemoryViews<T>,
        span: MemSpan,
    ) -> Result<String> {
        let bytes = views.read_at(store, span.offset, span.len)?;
        String::from_utf8(bytes).map_err(|e| HostError::Decode {
            offset: span.offset,
            cause: e.to_string(),
        })
    }
}

/// Free a live allocation before surfacing `err`.
///
/// A trapped `free` wins over `err`: it leaves the instance unusable,
/// which the caller must see.
fn discard<T>(
    store: &mut Store<T>,
    exports: &ModuleExports,
    span: MemSpan,
    err: HostError,
) -> HostError {
    match exports.free.call(&mut *store, (span.offset, span.len)) {
        Ok(()) => err,
        Err(e) => entry_error(FREE_EXPORT, e),
    }
}

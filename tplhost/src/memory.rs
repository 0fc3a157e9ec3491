//! Cached views over the module's linear memory.
//!
//! The module's allocator may grow linear memory at any time, and growth
//! can relocate the backing buffer. Any view taken before an allocator
//! call is therefore suspect afterwards. `MemoryViews` owns the current
//! buffer identity and rebuilds its view whenever the identity changes,
//! so callers never read through a stale window.

use std::marker::PhantomData;
use tplhost_core::error::{HostError, Result};
use wasmtime::{Memory, Store};

/// Identity of one view over linear memory.
///
/// The runtime may grow memory in place (same base, larger length) or
/// relocate it (new base), so identity is the (base, len) pair. The
/// generation counts how many times the view has been rebuilt; two views
/// with equal generation are views over the same buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemView {
    /// Base address of the buffer in host address space.
    pub base: usize,
    /// Current length of linear memory in bytes.
    pub len: usize,
    /// Rebuild generation of this view.
    pub generation: u64,
}

/// Accessor owning the cached view over the module's linear memory.
pub struct MemoryViews<T> {
    /// The module's linear memory.
    memory: Memory,
    /// Last observed buffer identity.
    cached: Option<MemView>,
    /// Monotonic rebuild counter.
    generation: u64,
    /// Phantom data for the store type.
    _marker: PhantomData<T>,
}

impl<T> MemoryViews<T> {
    /// Create a new accessor over the given memory.
    pub fn new(memory: Memory) -> Self {
        Self {
            memory,
            cached: None,
            generation: 0,
            _marker: PhantomData,
        }
    }

    /// Get the current view, rebuilding it if the buffer changed.
    ///
    /// Must be called (directly or via the read/write helpers) before
    /// any access that may follow a module-side allocation.
    pub fn view(&mut self, store: &Store<T>) -> MemView {
        let base = self.memory.data_ptr(store) as usize;
        let len = self.memory.data_size(store);

        match self.cached {
            Some(view) if view.base == base && view.len == len => view,
            _ => {
                self.generation += 1;
                let view = MemView {
                    base,
                    len,
                    generation: self.generation,
                };
                self.cached = Some(view);
                view
            }
        }
    }

    /// Read `len` bytes starting at `offset` through a fresh view.
    pub fn read_at(&mut self, store: &Store<T>, offset: u32, len: u32) -> Result<Vec<u8>> {
        let _ = self.view(store);

        let start = offset as usize;
        let end = start
            .checked_add(len as usize)
            .ok_or(HostError::MemoryAccess { offset, len })?;

        self.memory
            .data(store)
            .get(start..end)
            .map(<[u8]>::to_vec)
            .ok_or(HostError::MemoryAccess { offset, len })
    }

    /// Read one little-endian u32 word at `offset`.
    pub fn read_u32(&mut self, store: &Store<T>, offset: u32) -> Result<u32> {
        let bytes = self.read_at(store, offset, 4)?;
        // read_at returned exactly four bytes
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Write bytes at `offset` through a fresh view.
    pub fn write_at(&mut self, store: &mut Store<T>, offset: u32, bytes: &[u8]) -> Result<()> {
        let _ = self.view(store);

        let len = u32::try_from(bytes.len()).map_err(|_| HostError::MemoryAccess {
            offset,
            len: u32::MAX,
        })?;
        let start = offset as usize;
        let end = start
            .checked_add(bytes.len())
            .ok_or(HostError::MemoryAccess { offset, len })?;

        let dest = self
            .memory
            .data_mut(store)
            .get_mut(start..end)
            .ok_or(HostError::MemoryAccess { offset, len })?;
        dest.copy_from_slice(bytes);
        Ok(())
    }
}

//! Value types describing spans of the module's linear memory.

/// A span within the module's linear memory.
///
/// Offsets are 32-bit because the module addresses its memory with
/// wasm32 pointers. A span does not own the bytes it names; ownership
/// stays with the module's allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemSpan {
    /// Start offset within linear memory.
    pub offset: u32,
    /// Length of the span in bytes.
    pub len: u32,
}

impl MemSpan {
    /// Create a new span.
    #[must_use]
    pub const fn new(offset: u32, len: u32) -> Self {
        Self { offset, len }
    }

    /// Create an empty span at offset zero.
    #[must_use]
    pub const fn null() -> Self {
        Self { offset: 0, len: 0 }
    }

    /// Check if this is the null span.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.offset == 0 && self.len == 0
    }

    /// End offset (offset + len), or `None` if it would overflow a
    /// 32-bit address.
    #[must_use]
    pub fn end(&self) -> Option<u32> {
        self.offset.checked_add(self.len)
    }
}

/// A host string encoded into module memory.
///
/// `span.len` is the exact number of UTF-8 bytes written; `capacity` is
/// the size of the backing allocation, which may be larger when the
/// encoder reserved worst-case space for multi-byte characters. The
/// module's allocator owns the bytes until they are explicitly freed
/// (or consumed by an entry point that takes ownership).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedStr {
    /// Offset and exact encoded byte count.
    pub span: MemSpan,
    /// Size in bytes of the backing allocation.
    pub capacity: u32,
}

impl EncodedStr {
    /// Create a new encoded-string descriptor.
    #[must_use]
    pub const fn new(span: MemSpan, capacity: u32) -> Self {
        Self { span, capacity }
    }
}

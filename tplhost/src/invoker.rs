//! The compile call protocol.
//!
//! One call crosses the boundary in six steps: reserve a scratch slot
//! for the two-word result, encode the source string into module
//! memory, invoke the entry point, read the result pair back through a
//! fresh view, decode it, and free the module-owned result buffer. The
//! free and the scratch release run on every path; skipping either
//! leaks module heap across calls, because the module never reclaims a
//! result buffer it does not know the host has finished with.

use crate::codec::StringCodec;
use crate::exports::{entry_error, ModuleExports, COMPILE_EXPORT, FREE_EXPORT};
use crate::loader::{InstantiationPath, ModuleLoader, ModuleSource, ReadyModule};
use crate::memory::MemoryViews;
use crate::runtime::HostRuntime;
use crate::scratch::ScratchStack;
use std::sync::Arc;
use tokio::sync::Mutex;
use tplhost_core::error::{HostError, Result};
use tplhost_core::types::MemSpan;
use tracing::{debug, warn};
use wasmtime::{Instance, Store};

/// Scratch bytes reserved per call: two u32 result words, rounded up to
/// the module's 16-byte stack alignment.
const RESULT_SLOT_BYTES: u32 = 16;

/// Host-facing handle for one compiler module instance.
///
/// `compile` takes `&mut self`: at most one call is in flight per
/// instance, because the scratch stack and linear memory are shared
/// mutable state with no per-call isolation. Use [`SharedCompiler`] to
/// queue concurrent callers.
pub struct TemplateCompiler {
    /// Store holding the instance.
    store: Store<()>,
    /// Resolved export table.
    exports: ModuleExports,
    /// Cached linear-memory views.
    views: MemoryViews<()>,
    /// String transcoder.
    codec: StringCodec,
    /// Scratch-stack manager.
    scratch: ScratchStack,
    /// Set after a trap; the instance must not be reused.
    poisoned: bool,
    /// How the module was obtained.
    path: InstantiationPath,
}

impl TemplateCompiler {
    /// Instantiate a loaded module and resolve its exports.
    pub fn instantiate(runtime: &HostRuntime, loaded: &ReadyModule) -> Result<Self> {
        let mut store = Store::new(runtime.engine(), ());
        let instance =
            Instance::new(&mut store, loaded.module(), &[]).map_err(|e| HostError::Load {
                cause: format!("instantiation failed: {e}"),
            })?;

        let exports = ModuleExports::from_instance(&mut store, &instance)?;
        let views = MemoryViews::new(exports.memory);
        let scratch = ScratchStack::new(exports.adjust_stack_pointer.clone());

        debug!(path = ?loaded.path(), "compiler instantiated");
        Ok(Self {
            store,
            exports,
            views,
            codec: StringCodec::new(),
            scratch,
            poisoned: false,
            path: loaded.path(),
        })
    }

    /// Load a module from `source` and instantiate it in one step.
    pub async fn from_source(runtime: Arc<HostRuntime>, source: ModuleSource) -> Result<Self> {
        let mut loader = ModuleLoader::new(Arc::clone(&runtime));
        let loaded = loader.load(source).await?;
        Self::instantiate(&runtime, &loaded)
    }

    /// Compile `source` and return the output text.
    ///
    /// Call-local failures (`Decode`, `EncodingOverflow`) leave the
    /// instance usable; a trap poisons it and every later call fails
    /// with `Poisoned`.
    pub fn compile(&mut self, source: &str) -> Result<String> {
        if self.poisoned {
            return Err(HostError::Poisoned);
        }

        let Self {
            ref mut store,
            ref exports,
            ref mut views,
            ref mut codec,
            ref scratch,
            ..
        } = *self;

        let result = scratch.with_scratch(store, RESULT_SLOT_BYTES, |store, slot| {
            let encoded = codec.encode(store, views, exports, source)?;

            // The entry point consumes the input string and writes the
            // result pair into the slot.
            exports
                .compile
                .call(
                    &mut *store,
                    (slot, encoded.span.offset, encoded.span.len),
                )
                .map_err(|e| entry_error(COMPILE_EXPORT, e))?;

            // The call may have grown memory; both words come through a
            // fresh view.
            let out = MemSpan::new(views.read_u32(store, slot)?, views.read_u32(store, slot + 4)?);

            let decoded = codec.decode(store, views, out);

            // The result buffer is module-owned; release it whether or
            // not decoding succeeded.
            let freed = exports
                .free
                .call(&mut *store, (out.offset, out.len))
                .map_err(|e| entry_error(FREE_EXPORT, e));

            match freed {
                Err(e) => Err(e),
                Ok(()) => decoded,
            }
        });

        if let Err(err) = &result {
            if err.is_fatal() {
                self.poisoned = true;
                warn!(error = %err, "module trapped; instance poisoned");
            }
        }
        result
    }

    /// Read the module's current scratch stack pointer. Diagnostic.
    pub fn stack_pointer(&mut self) -> Result<i32> {
        self.scratch.pointer(&mut self.store)
    }

    /// Current size of the module's linear memory in bytes. Diagnostic.
    pub fn memory_size(&self) -> usize {
        self.exports.memory().data_size(&self.store)
    }

    /// Whether an earlier trap made this instance unusable.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// The instantiation path that produced this instance.
    pub fn instantiation_path(&self) -> InstantiationPath {
        self.path
    }
}

/// Cloneable async handle that queues concurrent compile calls.
///
/// Callers waiting on the internal lock are served in turn; calls are
/// never interleaved, and an in-progress call always runs its cleanup
/// to completion before the next caller starts.
#[derive(Clone)]
pub struct SharedCompiler {
    /// The exclusively-held compiler.
    inner: Arc<Mutex<TemplateCompiler>>,
}

impl SharedCompiler {
    /// Wrap a compiler for shared use.
    pub fn new(compiler: TemplateCompiler) -> Self {
        Self {
            inner: Arc::new(Mutex::new(compiler)),
        }
    }

    /// Compile `source`, waiting for any in-flight call to finish.
    pub async fn compile(&self, source: &str) -> Result<String> {
        let mut guard = self.inner.lock().await;
        guard.compile(source)
    }
}

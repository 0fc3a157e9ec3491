//! Typed view of the compiler module's export table.

use tplhost_core::error::{HostError, Result};
use wasmtime::{Instance, Memory, Store, TypedFunc};

/// Name of the linear memory export.
pub const MEMORY_EXPORT: &str = "memory";
/// Name of the allocator export.
pub const ALLOCATE_EXPORT: &str = "allocate";
/// Name of the reallocator export.
pub const REALLOCATE_EXPORT: &str = "reallocate";
/// Name of the deallocator export.
pub const FREE_EXPORT: &str = "free";
/// Name of the stack-pointer adjustment export.
pub const ADJUST_STACK_POINTER_EXPORT: &str = "adjust_stack_pointer";
/// Name of the compile entry point.
pub const COMPILE_EXPORT: &str = "compile";

/// The module's export table, resolved once at instantiation.
///
/// Immutable after construction; all typed functions are bound to the
/// instance they were resolved from.
pub struct ModuleExports {
    /// The module's linear memory.
    pub(crate) memory: Memory,
    /// `allocate(size) -> ptr`
    pub(crate) allocate: TypedFunc<u32, u32>,
    /// `reallocate(ptr, old_size, new_size) -> ptr`
    pub(crate) reallocate: TypedFunc<(u32, u32, u32), u32>,
    /// `free(ptr, size)`
    pub(crate) free: TypedFunc<(u32, u32), ()>,
    /// `adjust_stack_pointer(delta) -> new_sp`
    pub(crate) adjust_stack_pointer: TypedFunc<i32, i32>,
    /// `compile(result_slot, str_ptr, str_len)`
    pub(crate) compile: TypedFunc<(u32, u32, u32), ()>,
}

impl ModuleExports {
    /// Resolve all required exports from an instance.
    ///
    /// Fails with `MissingExport` if any export is absent or has an
    /// unexpected signature.
    pub fn from_instance<T>(store: &mut Store<T>, instance: &Instance) -> Result<Self> {
        let memory = instance
            .get_memory(&mut *store, MEMORY_EXPORT)
            .ok_or(HostError::MissingExport {
                name: MEMORY_EXPORT,
            })?;

        let allocate = instance
            .get_typed_func::<u32, u32>(&mut *store, ALLOCATE_EXPORT)
            .map_err(|_| HostError::MissingExport {
                name: ALLOCATE_EXPORT,
            })?;

        let reallocate = instance
            .get_typed_func::<(u32, u32, u32), u32>(&mut *store, REALLOCATE_EXPORT)
            .map_err(|_| HostError::MissingExport {
                name: REALLOCATE_EXPORT,
            })?;

        let free = instance
            .get_typed_func::<(u32, u32), ()>(&mut *store, FREE_EXPORT)
            .map_err(|_| HostError::MissingExport { name: FREE_EXPORT })?;

        let adjust_stack_pointer = instance
            .get_typed_func::<i32, i32>(&mut *store, ADJUST_STACK_POINTER_EXPORT)
            .map_err(|_| HostError::MissingExport {
                name: ADJUST_STACK_POINTER_EXPORT,
            })?;

        let compile = instance
            .get_typed_func::<(u32, u32, u32), ()>(&mut *store, COMPILE_EXPORT)
            .map_err(|_| HostError::MissingExport {
                name: COMPILE_EXPORT,
            })?;

        Ok(Self {
            memory,
            allocate,
            reallocate,
            free,
            adjust_stack_pointer,
            compile,
        })
    }

    /// Get the module's linear memory.
    pub fn memory(&self) -> &Memory {
        &self.memory
    }
}

/// Map a failed export call to a host error.
///
/// Any failure of a module export is treated as a trap: the module's
/// internal state is undefined afterwards and the instance must be
/// replaced.
pub(crate) fn entry_error(entry: &'static str, err: wasmtime::Error) -> HostError {
    HostError::Trap {
        entry,
        cause: err.to_string(),
    }
}

//! Balanced reservation of the module's scratch stack.
//!
//! Compound results cross the boundary through a region carved off the
//! module's shared scratch stack. Every reservation must be matched by
//! an equal release on every exit path; an unbalanced pointer corrupts
//! all later calls that use the same region.

use crate::exports::{entry_error, ADJUST_STACK_POINTER_EXPORT};
use tplhost_core::error::Result;
use wasmtime::{Store, TypedFunc};

/// Manager for the module's exported stack-pointer adjustment.
pub struct ScratchStack {
    /// `adjust_stack_pointer(delta) -> new_sp`
    adjust: TypedFunc<i32, i32>,
}

impl ScratchStack {
    /// Create a new scratch-stack manager.
    pub fn new(adjust: TypedFunc<i32, i32>) -> Self {
        Self { adjust }
    }

    /// Reserve `size` bytes of scratch space, run `body` with the
    /// region's base offset, and release the region again.
    ///
    /// The release runs whether `body` succeeds or fails. If the
    /// release itself traps, that error wins only when `body` had
    /// succeeded; a body failure is never masked.
    pub fn with_scratch<T, R, F>(&self, store: &mut Store<T>, size: u32, body: F) -> Result<R>
    where
        F: FnOnce(&mut Store<T>, u32) -> Result<R>,
    {
        let delta = size as i32;
        let base = self
            .adjust
            .call(&mut *store, -delta)
            .map_err(|e| entry_error(ADJUST_STACK_POINTER_EXPORT, e))?;

        let outcome = body(store, base as u32);

        match self.adjust.call(&mut *store, delta) {
            Ok(_) => outcome,
            Err(e) => match outcome {
                Err(first) => Err(first),
                Ok(_) => Err(entry_error(ADJUST_STACK_POINTER_EXPORT, e)),
            },
        }
    }

    /// Read the current stack pointer via a zero-delta adjustment.
    ///
    /// Diagnostic; used to verify that reservations stay balanced.
    pub fn pointer<T>(&self, store: &mut Store<T>) -> Result<i32> {
        self.adjust
            .call(store, 0)
            .map_err(|e| entry_error(ADJUST_STACK_POINTER_EXPORT, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tplhost_core::error::HostError;
    use wasmtime::{Engine, Instance, Module};

    const STACK_FIXTURE: &str = r#"
        (module
            (memory (export "memory") 1)
            (global $sp (mut i32) (i32.const 4096))
            (func (export "adjust_stack_pointer") (param $d i32) (result i32)
                (global.set $sp (i32.add (global.get $sp) (local.get $d)))
                (global.get $sp)))
    "#;

    fn fixture() -> (Store<()>, ScratchStack) {
        let engine = Engine::default();
        let bytes = wat::parse_str(STACK_FIXTURE).expect("failed to parse WAT");
        let module = Module::new(&engine, &bytes).expect("failed to compile fixture");
        let mut store = Store::new(&engine, ());
        let instance = Instance::new(&mut store, &module, &[]).expect("failed to instantiate");
        let adjust = instance
            .get_typed_func::<i32, i32>(&mut store, "adjust_stack_pointer")
            .expect("fixture exports adjust_stack_pointer");
        (store, ScratchStack::new(adjust))
    }

    #[test]
    fn reservation_hands_out_the_base() {
        let (mut store, stack) = fixture();
        let base = stack
            .with_scratch(&mut store, 16, |_, base| Ok(base))
            .expect("scratch failed");
        assert_eq!(base, 4096 - 16);
    }

    #[test]
    fn pointer_is_balanced_after_success() {
        let (mut store, stack) = fixture();
        let before = stack.pointer(&mut store).expect("probe failed");

        stack
            .with_scratch(&mut store, 16, |_, _| Ok(()))
            .expect("scratch failed");

        let after = stack.pointer(&mut store).expect("probe failed");
        assert_eq!(before, after);
    }

    #[test]
    fn pointer_is_balanced_after_failure() {
        let (mut store, stack) = fixture();
        let before = stack.pointer(&mut store).expect("probe failed");

        let result: Result<()> = stack.with_scratch(&mut store, 16, |_, _| {
            Err(HostError::Decode {
                offset: 0,
                cause: "simulated".to_string(),
            })
        });
        assert!(result.is_err());

        let after = stack.pointer(&mut store).expect("probe failed");
        assert_eq!(before, after);
    }

    #[test]
    fn nested_reservations_stay_balanced() {
        let (mut store, stack) = fixture();
        let before = stack.pointer(&mut store).expect("probe failed");

        stack
            .with_scratch(&mut store, 16, |store, outer| {
                stack.with_scratch(store, 32, |_, inner| {
                    assert_eq!(inner, outer - 32);
                    Ok(())
                })
            })
            .expect("scratch failed");

        let after = stack.pointer(&mut store).expect("probe failed");
        assert_eq!(before, after);
    }
}

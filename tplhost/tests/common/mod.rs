//! Shared fixtures: fake compiler modules implementing the export ABI.
//!
//! The fixture allocator is a bump allocator that counts outstanding
//! allocations and rewinds its heap pointer when the count returns to
//! zero, so leak tests can observe whether the host frees everything a
//! call allocated.

#![allow(dead_code)]

use bytes::Bytes;
use futures::Stream;
use std::io;
use std::sync::Arc;
use tplhost::loader::{ModuleLoader, ModuleSource};
use tplhost::invoker::TemplateCompiler;
use tplhost::runtime::HostRuntime;

/// Build a fixture module with the shared memory/allocator scaffolding
/// and the given `compile` export.
pub fn abi_module(compile_func: &str) -> Vec<u8> {
    let wat = format!(
        r#"
        (module
            (memory (export "memory") 1)
            (global $sp (mut i32) (i32.const 4096))
            (global $hp (mut i32) (i32.const 8192))
            (global $live (mut i32) (i32.const 0))

            (func $ensure (param $end i32)
                (if (i32.gt_u (local.get $end)
                              (i32.mul (memory.size) (i32.const 65536)))
                    (then
                        (drop (memory.grow
                            (i32.sub
                                (i32.div_u (i32.add (local.get $end) (i32.const 65535))
                                           (i32.const 65536))
                                (memory.size)))))))

            (func $allocate (export "allocate") (param $size i32) (result i32)
                (local $ptr i32)
                (local.set $ptr (global.get $hp))
                (global.set $hp
                    (i32.add (global.get $hp)
                             (i32.and (i32.add (local.get $size) (i32.const 7))
                                      (i32.const -8))))
                (call $ensure (global.get $hp))
                (global.set $live (i32.add (global.get $live) (i32.const 1)))
                (local.get $ptr))

            (func (export "reallocate")
                    (param $ptr i32) (param $old i32) (param $new i32) (result i32)
                (local $dst i32)
                (local.set $dst (global.get $hp))
                (global.set $hp
                    (i32.add (global.get $hp)
                             (i32.and (i32.add (local.get $new) (i32.const 7))
                                      (i32.const -8))))
                (call $ensure (global.get $hp))
                (memory.copy (local.get $dst) (local.get $ptr) (local.get $old))
                (local.get $dst))

            (func $free (export "free") (param $ptr i32) (param $size i32)
                (global.set $live (i32.sub (global.get $live) (i32.const 1)))
                (if (i32.eqz (global.get $live))
                    (then (global.set $hp (i32.const 8192)))))

            (func (export "adjust_stack_pointer") (param $delta i32) (result i32)
                (global.set $sp (i32.add (global.get $sp) (local.get $delta)))
                (global.get $sp))

            {compile}
        )
        "#,
        compile = compile_func
    );
    wat::parse_str(&wat).expect("failed to parse fixture WAT")
}

/// Compiler that echoes its input back as the result.
pub fn echo_module() -> Vec<u8> {
    abi_module(
        r#"
        (func (export "compile") (param $ret i32) (param $ptr i32) (param $len i32)
            (local $out i32)
            (local.set $out (call $allocate (local.get $len)))
            (memory.copy (local.get $out) (local.get $ptr) (local.get $len))
            (i32.store (local.get $ret) (local.get $out))
            (i32.store offset=4 (local.get $ret) (local.get $len))
            (call $free (local.get $ptr) (local.get $len)))
        "#,
    )
}

/// Compiler that always emits two bytes of invalid UTF-8.
pub fn invalid_utf8_module() -> Vec<u8> {
    abi_module(
        r#"
        (func (export "compile") (param $ret i32) (param $ptr i32) (param $len i32)
            (local $out i32)
            (local.set $out (call $allocate (i32.const 2)))
            (i32.store8 (local.get $out) (i32.const 0xff))
            (i32.store8 offset=1 (local.get $out) (i32.const 0xfe))
            (i32.store (local.get $ret) (local.get $out))
            (i32.store offset=4 (local.get $ret) (i32.const 2))
            (call $free (local.get $ptr) (local.get $len)))
        "#,
    )
}

/// Compiler whose entry point traps unconditionally.
pub fn trapping_module() -> Vec<u8> {
    abi_module(
        r#"
        (func (export "compile") (param i32 i32 i32)
            unreachable)
        "#,
    )
}

/// Module whose allocator refuses requests over 64 bytes and whose
/// reallocator always fails.
pub fn failing_allocator_module() -> Vec<u8> {
    let wat = r#"
        (module
            (memory (export "memory") 1)
            (global $sp (mut i32) (i32.const 4096))
            (global $hp (mut i32) (i32.const 8192))

            (func (export "allocate") (param $size i32) (result i32)
                (local $ptr i32)
                (if (i32.gt_u (local.get $size) (i32.const 64))
                    (then (return (i32.const 0))))
                (local.set $ptr (global.get $hp))
                (global.set $hp (i32.add (global.get $hp) (local.get $size)))
                (local.get $ptr))

            (func (export "reallocate") (param i32 i32 i32) (result i32)
                (i32.const 0))

            (func (export "free") (param i32 i32))

            (func (export "adjust_stack_pointer") (param $delta i32) (result i32)
                (global.set $sp (i32.add (global.get $sp) (local.get $delta)))
                (global.get $sp))

            (func (export "compile") (param i32 i32 i32)))
    "#;
    wat::parse_str(wat).expect("failed to parse fixture WAT")
}

/// Instantiate a compiler from module bytes via the loader.
pub async fn compiler_from(bytes: Vec<u8>) -> TemplateCompiler {
    let runtime = Arc::new(HostRuntime::with_defaults().expect("failed to create runtime"));
    TemplateCompiler::from_source(runtime, ModuleSource::Bytes(bytes))
        .await
        .expect("failed to instantiate fixture")
}

/// Drive a fresh loader over `source` with the given runtime.
pub async fn load_with(
    runtime: &Arc<HostRuntime>,
    source: ModuleSource,
) -> tplhost_core::error::Result<tplhost::loader::ReadyModule> {
    let mut loader = ModuleLoader::new(Arc::clone(runtime));
    loader.load(source).await
}

/// Split bytes into fixed-size body chunks.
pub fn chunked(bytes: Vec<u8>, size: usize) -> impl Stream<Item = io::Result<Bytes>> {
    let chunks: Vec<io::Result<Bytes>> = bytes
        .chunks(size)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    futures::stream::iter(chunks)
}

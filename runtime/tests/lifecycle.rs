// Copyright 2021-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
mod common;

use akira_runtime::{RuntimeConfig, RuntimeError};
use common::*;
use pretty_assertions::assert_eq;

#[test]
fn minimal_module_full_lifecycle() {
    let mut rt = runtime();
    let slot = rt.install(&module(EMPTY_START), None).unwrap();
    assert_eq!(slot, 0);
    assert_eq!(rt.name_of(slot).unwrap(), "app0");
    assert_eq!(rt.capability_mask(slot).unwrap(), 0);
    assert_eq!(rt.memory_quota(slot).unwrap(), 0);

    rt.start(slot).unwrap();
    assert!(rt.is_running(slot));
    rt.stop(slot).unwrap();
    assert!(!rt.is_running(slot));
    rt.destroy(slot).unwrap();
    assert_eq!(rt.slots_in_use(), 0);
}

#[test]
fn manifest_names_and_sizes_the_slot() {
    let mut rt = runtime();
    let wasm = with_manifest(
        &module(EMPTY_START),
        r#"{"name":"paint","version":"1.0","memory_quota":32768,"capabilities":["display.write"]}"#,
    );
    let slot = rt.install(&wasm, None).unwrap();
    assert_eq!(rt.name_of(slot).unwrap(), "paint");
    assert_eq!(rt.version_of(slot).unwrap(), "1.0");
    assert_eq!(rt.memory_quota(slot).unwrap(), 32768);
    assert_eq!(
        rt.capability_mask(slot).unwrap(),
        akira_shared::capability::DISPLAY_WRITE
    );
}

#[test]
fn entry_runs_exactly_once_per_start() {
    let mut rt = runtime();
    let wasm = with_manifest(
        &module(
            r#"(module
                (import "env" "sensor_read" (func $sr (param i32) (result i32)))
                (memory (export "memory") 1)
                (func (export "_start") (drop (call $sr (i32.const 1)))))"#,
        ),
        r#"{"capabilities":["sensor.read"]}"#,
    );
    let slot = rt.install(&wasm, None).unwrap();

    rt.start(slot).unwrap();
    assert_eq!(rt.externs().calls.lock().unwrap().sensor, 1);
    rt.stop(slot).unwrap();

    rt.start(slot).unwrap();
    assert_eq!(rt.externs().calls.lock().unwrap().sensor, 2);
    rt.stop(slot).unwrap();

    rt.destroy(slot).unwrap();
}

#[test]
fn main_is_accepted_as_entry_fallback() {
    let mut rt = runtime();
    let wasm = module(r#"(module (memory (export "memory") 1) (func (export "main")))"#);
    let slot = rt.install(&wasm, None).unwrap();
    rt.start(slot).unwrap();
    assert!(rt.is_running(slot));
}

#[test]
fn missing_entry_fails_start_and_tears_down_the_instance() {
    let mut rt = runtime();
    let slot = rt
        .install(&module(r#"(module (memory (export "memory") 1))"#), None)
        .unwrap();
    let err = rt.start(slot).unwrap_err();
    assert!(matches!(err, RuntimeError::NotFound(_)));
    assert!(!rt.is_running(slot));
    // The slot is still LOADED; stop and destroy work.
    rt.stop(slot).unwrap();
    rt.destroy(slot).unwrap();
}

#[test]
fn trapping_entry_is_reported_but_slot_survives() {
    let mut rt = runtime();
    let wasm = module(r#"(module (memory (export "memory") 1) (func (export "_start") unreachable))"#);
    let slot = rt.install(&wasm, None).unwrap();
    let err = rt.start(slot).unwrap_err();
    assert!(matches!(err, RuntimeError::Io(_)));
    assert!(!rt.is_running(slot));
    rt.stop(slot).unwrap();
    rt.destroy(slot).unwrap();
}

#[test]
fn module_without_memory_export_fails_start() {
    let mut rt = runtime();
    let slot = rt
        .install(&module(r#"(module (func (export "_start")))"#), None)
        .unwrap();
    let err = rt.start(slot).unwrap_err();
    assert!(matches!(err, RuntimeError::Io(_)));
    rt.destroy(slot).unwrap();
}

#[test]
fn stop_is_idempotent() {
    let mut rt = runtime();
    let slot = rt.install(&module(EMPTY_START), None).unwrap();
    rt.stop(slot).unwrap();
    rt.start(slot).unwrap();
    rt.stop(slot).unwrap();
    rt.stop(slot).unwrap();
}

#[test]
fn double_start_is_rejected() {
    let mut rt = runtime();
    let slot = rt.install(&module(EMPTY_START), None).unwrap();
    rt.start(slot).unwrap();
    assert!(matches!(
        rt.start(slot),
        Err(RuntimeError::IllegalArgument(_))
    ));
    assert!(rt.is_running(slot));
}

#[test]
fn slot_exhaustion_fails_with_no_memory_and_frees_cleanly() {
    let mut rt = runtime_with(RuntimeConfig {
        max_slots: 2,
        ..RuntimeConfig::default()
    });
    let wasm = module(EMPTY_START);

    assert_eq!(rt.install(&wasm, None).unwrap(), 0);
    assert_eq!(rt.install(&wasm, None).unwrap(), 1);
    let err = rt.install(&wasm, None).unwrap_err();
    assert!(matches!(err, RuntimeError::OutOfMemory(_)));

    // The first two installs are intact.
    assert_eq!(rt.name_of(0).unwrap(), "app0");
    assert_eq!(rt.name_of(1).unwrap(), "app1");

    rt.destroy(0).unwrap();
    assert_eq!(rt.install(&wasm, None).unwrap(), 0);
}

#[test]
fn malformed_wasm_is_rejected_without_claiming_a_slot() {
    let mut rt = runtime();
    let err = rt
        .install(&[0xDE, 0xAD, 0xBE, 0xEF, 0x01, 0x00, 0x00, 0x00], None)
        .unwrap_err();
    assert!(matches!(err, RuntimeError::IllegalArgument(_)));
    assert_eq!(rt.slots_in_use(), 0);

    // The slot is reusable immediately.
    assert_eq!(rt.install(&module(EMPTY_START), None).unwrap(), 0);
}

#[test]
fn engine_rejection_surfaces_as_io() {
    let mut rt = runtime();
    // Structurally walkable (id 1, one byte of garbage), semantically junk.
    let mut bytes = b"\0asm\x01\0\0\0".to_vec();
    bytes.extend_from_slice(&[0x01, 0x01, 0xFF]);
    let err = rt.install(&bytes, None).unwrap_err();
    assert!(matches!(err, RuntimeError::Io(_)));
    assert_eq!(rt.slots_in_use(), 0);
}

#[test]
fn operations_on_invalid_slots_fail_with_not_found() {
    let mut rt = runtime();
    assert!(matches!(rt.start(3), Err(RuntimeError::NotFound(_))));
    assert!(matches!(rt.stop(99), Err(RuntimeError::NotFound(_))));
    assert!(matches!(rt.destroy(0), Err(RuntimeError::NotFound(_))));
    assert!(matches!(rt.name_of(0), Err(RuntimeError::NotFound(_))));
}

// Copyright 2021-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
mod common;

use akira_shared::capability;
use common::*;
use pretty_assertions::assert_eq;

#[test]
fn apps_root_is_created_at_init() {
    let rt = runtime();
    assert_eq!(*rt.externs().dirs.lock().unwrap(), vec!["/apps".to_owned()]);
}

#[test]
fn sidecar_is_persisted_under_the_guest_name() {
    let mut rt = runtime();
    let sidecar = br#"{"name":"widget","capabilities":["input.read"]}"#;
    let slot = rt.install(&module(EMPTY_START), Some(sidecar)).unwrap();

    assert_eq!(rt.name_of(slot).unwrap(), "widget");
    let files = rt.externs().files.lock().unwrap();
    assert_eq!(
        files.get("/apps/widget.manifest.json").map(Vec::as_slice),
        Some(sidecar.as_slice())
    );
}

#[test]
fn uninstall_removes_the_sidecar_artifact() {
    let mut rt = runtime();
    let sidecar = br#"{"name":"widget"}"#;
    let slot = rt.install(&module(EMPTY_START), Some(sidecar)).unwrap();
    rt.uninstall(slot).unwrap();

    assert!(rt
        .externs()
        .files
        .lock()
        .unwrap()
        .get("/apps/widget.manifest.json")
        .is_none());
    assert_eq!(rt.slots_in_use(), 0);
}

#[test]
fn sidecar_unions_with_embedded_manifest() {
    let mut rt = runtime();
    let wasm = with_manifest(
        &module(EMPTY_START),
        r#"{"name":"paint","memory_quota":1024,"capabilities":["display.write"]}"#,
    );
    let slot = rt
        .install(
            &wasm,
            Some(br#"{"memory_quota":4096,"capabilities":["sensor.read"]}"#),
        )
        .unwrap();

    // Embedded identity wins; sidecar grants union in; sidecar quota wins.
    assert_eq!(rt.name_of(slot).unwrap(), "paint");
    assert_eq!(
        rt.capability_mask(slot).unwrap(),
        capability::DISPLAY_WRITE | capability::SENSOR_READ
    );
    assert_eq!(rt.memory_quota(slot).unwrap(), 4096);
}

#[test]
fn zero_sidecar_quota_does_not_override_embedded() {
    let mut rt = runtime();
    let wasm = with_manifest(&module(EMPTY_START), r#"{"memory_quota":1024}"#);
    let slot = rt
        .install(&wasm, Some(br#"{"capabilities":["input.read"]}"#))
        .unwrap();
    assert_eq!(rt.memory_quota(slot).unwrap(), 1024);
    assert_eq!(rt.capability_mask(slot).unwrap(), capability::INPUT_READ);
}

#[test]
fn unusable_sidecar_is_ignored_and_not_persisted() {
    let mut rt = runtime();
    let slot = rt
        .install(&module(EMPTY_START), Some(b"{this is not json"))
        .unwrap();
    assert_eq!(rt.name_of(slot).unwrap(), "app0");
    assert_eq!(rt.capability_mask(slot).unwrap(), 0);
    assert!(rt.externs().files.lock().unwrap().is_empty());
}

//! Shared fixtures: a recording mock of the host subsystems, and helpers for
//! authoring guest modules in tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::sync::Mutex;

use akira_runtime::externs::{Externs, Hardware, Storage};
use akira_runtime::manifest::MANIFEST_SECTION;
use akira_runtime::{Runtime, RuntimeConfig};
use akira_shared::error::ErrorNumber;

pub const DISPLAY_SIZE: i32 = 240;

/// Counters and captures for every hardware call that actually reached the
/// mock; denial tests assert these stayed untouched.
#[derive(Default)]
pub struct Calls {
    pub display_clear: u32,
    pub display_pixel: u32,
    pub buttons: u32,
    pub sensor: u32,
    pub rf_frames: Vec<Vec<u8>>,
}

#[derive(Default)]
pub struct MockExterns {
    pub calls: Mutex<Calls>,
    pub files: Mutex<HashMap<String, Vec<u8>>>,
    pub dirs: Mutex<Vec<String>>,
}

impl Externs for MockExterns {}

impl Hardware for MockExterns {
    fn display_clear(&self, _color: u32) -> Result<(), ErrorNumber> {
        self.calls.lock().unwrap().display_clear += 1;
        Ok(())
    }

    fn display_pixel(&self, x: i32, y: i32, _color: u32) -> Result<(), ErrorNumber> {
        if !(0..DISPLAY_SIZE).contains(&x) || !(0..DISPLAY_SIZE).contains(&y) {
            return Err(ErrorNumber::IllegalArgument);
        }
        self.calls.lock().unwrap().display_pixel += 1;
        Ok(())
    }

    fn read_buttons(&self) -> u32 {
        self.calls.lock().unwrap().buttons += 1;
        0b0000_0101
    }

    fn sensor_read(&self, kind: i32) -> Result<i32, ErrorNumber> {
        self.calls.lock().unwrap().sensor += 1;
        Ok(kind * 1000 + 250)
    }

    fn rf_send(&self, frame: &[u8]) -> Result<(), ErrorNumber> {
        self.calls.lock().unwrap().rf_frames.push(frame.to_vec());
        Ok(())
    }
}

impl Storage for MockExterns {
    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.to_owned()))
    }

    fn write(&self, path: &str, data: &[u8]) -> io::Result<()> {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_owned(), data.to_vec());
        Ok(())
    }

    fn stat(&self, path: &str) -> io::Result<u64> {
        self.read(path).map(|data| data.len() as u64)
    }

    fn remove(&self, path: &str) -> io::Result<()> {
        self.files
            .lock()
            .unwrap()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.to_owned()))
    }

    fn make_dir(&self, path: &str) -> io::Result<()> {
        self.dirs.lock().unwrap().push(path.to_owned());
        Ok(())
    }
}

pub fn runtime() -> Runtime<MockExterns> {
    runtime_with(RuntimeConfig::default())
}

pub fn runtime_with(config: RuntimeConfig) -> Runtime<MockExterns> {
    Runtime::new(config, MockExterns::default()).unwrap()
}

/// A trivially valid module whose entry returns immediately.
pub const EMPTY_START: &str = r#"(module (memory (export "memory") 1) (func (export "_start")))"#;

pub fn module(wat_text: &str) -> Vec<u8> {
    wat::parse_str(wat_text).unwrap()
}

/// Appends a `.akira.manifest` custom section carrying `json` to a module.
pub fn with_manifest(wasm: &[u8], json: &str) -> Vec<u8> {
    let mut out = wasm.to_vec();
    out.extend_from_slice(&custom_section(MANIFEST_SECTION, json.as_bytes()));
    out
}

fn custom_section(name: &str, payload: &[u8]) -> Vec<u8> {
    let mut body = uleb(name.len() as u32);
    body.extend_from_slice(name.as_bytes());
    body.extend_from_slice(payload);
    let mut section = vec![0u8];
    section.extend_from_slice(&uleb(body.len() as u32));
    section.extend_from_slice(&body);
    section
}

fn uleb(mut value: u32) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
    out
}

/// Reads the little-endian i32 guest code stored at `addr`.
pub fn read_i32(snapshot: &[u8], addr: usize) -> i32 {
    i32::from_le_bytes(snapshot[addr..addr + 4].try_into().unwrap())
}

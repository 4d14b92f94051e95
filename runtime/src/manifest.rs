// Copyright 2021-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! Extraction and decoding of the in-module application manifest.
//!
//! Guests declare their identity, capabilities, and memory quota in a custom
//! section named [`MANIFEST_SECTION`] carrying a small JSON object. A caller
//! may supply the same JSON as a sidecar buffer for modules built without the
//! section.

use akira_shared::{capability, APP_NAME_MAX, APP_VERSION_MAX};
use serde_json::Value;

/// Name of the custom section holding the manifest. Exact, case-sensitive.
pub const MANIFEST_SECTION: &str = ".akira.manifest";

/// The four magic bytes every WASM binary starts with (`\0asm`).
pub const WASM_MAGIC: [u8; 4] = [0x00, 0x61, 0x73, 0x6d];

/// A decoded manifest. `Default` is the no-manifest state: no capabilities,
/// unlimited quota, synthesized name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    /// Declared application name, clipped to [`APP_NAME_MAX`] bytes and
    /// trimmed of NULs. `None` when the manifest did not carry one; the
    /// lifecycle controller synthesizes `app<slot>` in that case.
    pub name: Option<String>,
    /// Declared version string, clipped to [`APP_VERSION_MAX`] bytes.
    pub version: String,
    /// OR of the bits for every recognized capability string.
    pub capability_mask: u32,
    /// Memory quota in bytes. `0` means unlimited.
    pub memory_quota: u32,
    /// Whether any source yielded a parseable manifest.
    pub valid: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// Neither the module nor the fallback yielded a manifest.
    #[error("no manifest found")]
    NotFound,
    /// A manifest was present but could not be decoded.
    #[error("malformed manifest: {0}")]
    Malformed(String),
}

fn malformed(msg: impl Into<String>) -> ManifestError {
    ManifestError::Malformed(msg.into())
}

/// Parses the manifest embedded in `module`, if any.
pub fn parse(module: &[u8]) -> Result<Manifest, ManifestError> {
    match find_custom_section(module, MANIFEST_SECTION)? {
        Some(payload) => parse_json(payload),
        None => Err(ManifestError::NotFound),
    }
}

/// Parses the embedded manifest, falling back to the caller-provided sidecar
/// JSON when the module carries no manifest section. A sidecar that fails to
/// decode counts as absent (the manifest stays at defaults); a malformed
/// *embedded* manifest is an error in its own right.
pub fn parse_with_fallback(
    module: &[u8],
    sidecar: Option<&[u8]>,
) -> Result<Manifest, ManifestError> {
    match parse(module) {
        Err(ManifestError::NotFound) => {}
        other => return other,
    }
    if let Some(json) = sidecar {
        match parse_json(json) {
            Ok(manifest) => return Ok(manifest),
            Err(e) => log::warn!("ignoring unusable sidecar manifest: {}", e),
        }
    }
    Err(ManifestError::NotFound)
}

/// Decodes a manifest JSON object. Unknown keys are ignored; unknown
/// capability strings are logged and dropped.
pub fn parse_json(payload: &[u8]) -> Result<Manifest, ManifestError> {
    // Decoding into `Value` (rather than a derived struct) gets us the
    // required duplicate-key behavior: last occurrence wins.
    let value: Value =
        serde_json::from_slice(payload).map_err(|e| malformed(format!("invalid json: {}", e)))?;
    let object = value
        .as_object()
        .ok_or_else(|| malformed("manifest is not a json object"))?;

    let mut manifest = Manifest {
        valid: true,
        ..Manifest::default()
    };

    if let Some(v) = object.get("name") {
        let s = v.as_str().ok_or_else(|| malformed("name is not a string"))?;
        manifest.name = Some(clip(s, APP_NAME_MAX));
    }
    if let Some(v) = object.get("version") {
        let s = v
            .as_str()
            .ok_or_else(|| malformed("version is not a string"))?;
        manifest.version = clip(s, APP_VERSION_MAX);
    }
    if let Some(v) = object.get("memory_quota") {
        let quota = v
            .as_u64()
            .ok_or_else(|| malformed("memory_quota is not a non-negative integer"))?;
        manifest.memory_quota = u32::try_from(quota)
            .map_err(|_| malformed("memory_quota does not fit in 32 bits"))?;
    }
    if let Some(v) = object.get("capabilities") {
        let entries = v
            .as_array()
            .ok_or_else(|| malformed("capabilities is not an array"))?;
        for entry in entries {
            let name = entry
                .as_str()
                .ok_or_else(|| malformed("capability entry is not a string"))?;
            let bit = capability::bit_of(name);
            if bit == 0 {
                log::warn!("manifest names unknown capability {:?}, ignoring", name);
            } else {
                manifest.capability_mask |= bit;
            }
        }
    }

    Ok(manifest)
}

/// Walks the module's sections and returns the payload of the custom section
/// with the given name, or `None` when absent. Structural damage (bad magic,
/// truncated LEB128, a section extending past the end of the buffer) is
/// reported as [`ManifestError::Malformed`].
pub fn find_custom_section<'a>(
    module: &'a [u8],
    name: &str,
) -> Result<Option<&'a [u8]>, ManifestError> {
    if module.len() < 8 {
        return Err(malformed("module shorter than the wasm header"));
    }
    if module[..4] != WASM_MAGIC {
        return Err(malformed("missing wasm magic"));
    }

    // Skip the 4-byte version header; sections follow.
    let mut rest = &module[8..];
    while !rest.is_empty() {
        let id = rest[0];
        let (len, tail) = read_uleb(&rest[1..])?;
        let len = len as usize;
        let section = tail
            .get(..len)
            .ok_or_else(|| malformed("section extends past end of module"))?;
        rest = &tail[len..];

        if id != 0 {
            continue;
        }
        let (name_len, body) = read_uleb(section)?;
        let name_bytes = body
            .get(..name_len as usize)
            .ok_or_else(|| malformed("custom section name extends past section"))?;
        if name_bytes == name.as_bytes() {
            return Ok(Some(&body[name_len as usize..]));
        }
    }
    Ok(None)
}

fn read_uleb(input: &[u8]) -> Result<(u32, &[u8]), ManifestError> {
    unsigned_varint::decode::u32(input).map_err(|e| malformed(format!("bad uleb128: {}", e)))
}

/// Trims NULs and clips to at most `max` bytes on a character boundary.
fn clip(s: &str, max: usize) -> String {
    let trimmed = s.trim_matches('\0');
    let mut end = trimmed.len().min(max);
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    trimmed[..end].to_owned()
}

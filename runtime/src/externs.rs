// Copyright 2021-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! The boundary to the host subsystems the runtime dispatches into but does
//! not implement: board hardware behind the native bridge, and the persistent
//! store used for sidecar manifests.

use std::io;

use akira_shared::error::ErrorNumber;

/// Everything the runtime needs from its embedder.
pub trait Externs: Hardware + Storage + Send + Sync + 'static {}

/// Board hardware reached through native calls.
///
/// Failures cross the guest boundary as sentinels, so these methods speak
/// [`ErrorNumber`] directly rather than a host error type.
pub trait Hardware {
    /// Fill the display with a color.
    fn display_clear(&self, color: u32) -> Result<(), ErrorNumber>;

    /// Set one pixel. Out-of-range coordinates are an
    /// [`ErrorNumber::IllegalArgument`].
    fn display_pixel(&self, x: i32, y: i32, color: u32) -> Result<(), ErrorNumber>;

    /// Current button state as a bitmask.
    fn read_buttons(&self) -> u32;

    /// Read a sensor, scaled to milli-units.
    fn sensor_read(&self, kind: i32) -> Result<i32, ErrorNumber>;

    /// Transmit a raw radio frame.
    fn rf_send(&self, frame: &[u8]) -> Result<(), ErrorNumber>;
}

/// The narrow read/write/stat surface of the persistent store. The runtime
/// uses it for sidecar manifests only and knows nothing about the filesystem
/// behind it.
pub trait Storage {
    fn read(&self, path: &str) -> io::Result<Vec<u8>>;

    fn write(&self, path: &str, data: &[u8]) -> io::Result<()>;

    /// Size in bytes of the object at `path`.
    fn stat(&self, path: &str) -> io::Result<u64>;

    fn remove(&self, path: &str) -> io::Result<()>;

    /// Create a directory. Must succeed when the directory already exists.
    fn make_dir(&self, path: &str) -> io::Result<()>;
}

// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Handle-based interface to sessions, as consumed by managed runtimes.
//!
//! [`Bridge`] exposes the four operations of the managed API (open, configure, write, close) on
//! plain integer handles and collapses all errors into a `0` handle or a `false` return value. The
//! details of each error are logged under [`crate::LOG_TAG`].
//!
//! Handles are generation-checked (see [`crate::table`]): using a closed handle, including closing
//! it a second time, is a harmless failure rather than undefined behavior.

use std::path::Path;

use crate::device::DeviceConfig;
use crate::device::LoopbackDevice;
use crate::device::OutputDevice;
use crate::session::Session;
use crate::session::WriteOutcome;
use crate::table::SessionHandle;
use crate::table::SessionTable;
use crate::LOG_TAG;

/// Value returned in place of a handle when no session could be created.
pub const INVALID_HANDLE: u64 = 0;

/// Set of sessions addressed by 64-bit handles.
pub struct Bridge<D: OutputDevice = LoopbackDevice> {
    sessions: SessionTable<Session<D>>,
    config: DeviceConfig,
}

impl<D: OutputDevice> Default for Bridge<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: OutputDevice> Bridge<D> {
    /// Create a bridge opening format-aware, non-blocking sessions.
    pub const fn new() -> Self {
        Self::with_config(DeviceConfig::new())
    }

    /// Create a bridge opening sessions with `config` by default.
    pub const fn with_config(config: DeviceConfig) -> Self {
        Self {
            sessions: SessionTable::new(),
            config,
        }
    }

    /// Open the device at `path` with the default configuration of this bridge.
    ///
    /// Returns [`INVALID_HANDLE`] if `path` is missing or empty, or if the device cannot be
    /// opened.
    pub fn open_device(&mut self, path: Option<&str>) -> u64 {
        let config = self.config.clone();
        self.open_device_with(path, &config)
    }

    /// Open the device at `path` with `config`.
    pub fn open_device_with(&mut self, path: Option<&str>, config: &DeviceConfig) -> u64 {
        let Some(path) = path.filter(|p| !p.is_empty()) else {
            log::error!(target: LOG_TAG, "cannot open device: no path given");
            return INVALID_HANDLE;
        };

        let session = match Session::<D>::open(Path::new(path), config) {
            Ok(session) => session,
            Err(e) => {
                log::error!(target: LOG_TAG, "failed to open device: {:#}", e);
                return INVALID_HANDLE;
            }
        };

        match self.sessions.insert(session) {
            Ok(handle) => handle.into_raw(),
            Err(session) => {
                log::error!(target: LOG_TAG, "too many open sessions");
                session.close();
                INVALID_HANDLE
            }
        }
    }

    /// Configure the session behind `handle` for a `width`x`height` YUV 4:2:0 stream.
    pub fn configure_stream(&mut self, handle: u64, width: i32, height: i32) -> bool {
        let Some(session) = self.session_mut(handle) else {
            return false;
        };

        match session.configure(width, height) {
            Ok(()) => true,
            Err(e) => {
                log::error!(
                    target: LOG_TAG,
                    "failed to configure stream {}x{}: {:#}",
                    width,
                    height,
                    e
                );
                false
            }
        }
    }

    /// Write `frame` to the session behind `handle`.
    ///
    /// Returns `true` only if the whole frame has been accepted by the device.
    pub fn write_frame(&mut self, handle: u64, frame: Option<&[u8]>) -> bool {
        match frame {
            Some(frame) => self.write_frame_counted(handle, Some(frame)) == Some(frame.len()),
            None => self.write_frame_counted(handle, None).is_some(),
        }
    }

    /// Write `frame` to the session behind `handle` and return the number of bytes accepted by
    /// the device, which may be smaller than the frame. Returns `None` if nothing was written.
    pub fn write_frame_counted(&mut self, handle: u64, frame: Option<&[u8]>) -> Option<usize> {
        let Some(frame) = frame else {
            log::error!(target: LOG_TAG, "cannot write frame: no buffer given");
            return None;
        };
        let session = self.session_mut(handle)?;

        match session.write_frame(frame) {
            Ok(outcome @ WriteOutcome::Partial { .. }) => Some(outcome.written(frame.len())),
            Ok(WriteOutcome::Complete) => Some(frame.len()),
            Err(e) => {
                log::error!(target: LOG_TAG, "{:#}", e);
                None
            }
        }
    }

    /// Close the session behind `handle`. Does nothing if `handle` is invalid or already closed.
    pub fn close_device(&mut self, handle: u64) {
        if let Some(session) = SessionHandle::from_raw(handle).and_then(|h| self.sessions.remove(h))
        {
            session.close();
        }
    }

    /// Returns the session behind `handle`, if it is still open.
    pub fn session(&self, handle: u64) -> Option<&Session<D>> {
        SessionHandle::from_raw(handle).and_then(|h| self.sessions.get(h))
    }

    fn session_mut(&mut self, handle: u64) -> Option<&mut Session<D>> {
        let session = SessionHandle::from_raw(handle).and_then(|h| self.sessions.get_mut(h));
        if session.is_none() {
            log::error!(target: LOG_TAG, "invalid session handle {:#x}", handle);
        }
        session
    }

    /// Number of sessions currently open.
    pub fn num_sessions(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use crate::device::Capability;
    use crate::device::DeviceConfig;
    use crate::session::tests::DummyDevice;
    use crate::table::SessionHandle;

    use super::Bridge;
    use super::INVALID_HANDLE;

    #[test]
    fn bridge_open_invalid_path() {
        let mut bridge = Bridge::<DummyDevice>::new();
        assert_eq!(bridge.open_device(None), INVALID_HANDLE);
        assert_eq!(bridge.open_device(Some("")), INVALID_HANDLE);
        assert_eq!(bridge.open_device(Some("/dev/does-not-exist")), INVALID_HANDLE);
        assert_eq!(bridge.num_sessions(), 0);
    }

    #[test]
    fn bridge_invalid_handle() {
        let mut bridge = Bridge::<DummyDevice>::new();
        assert!(!bridge.configure_stream(INVALID_HANDLE, 1280, 720));
        assert!(!bridge.write_frame(INVALID_HANDLE, Some(&[0u8; 16])));
        assert_eq!(bridge.write_frame_counted(INVALID_HANDLE, Some(&[0u8; 16])), None);
        bridge.close_device(INVALID_HANDLE);
        assert!(bridge.session(INVALID_HANDLE).is_none());
    }

    #[test]
    fn bridge_end_to_end() {
        let mut bridge = Bridge::<DummyDevice>::new();

        let handle = bridge.open_device(Some("/dummy/video0"));
        assert_ne!(handle, INVALID_HANDLE);
        assert_eq!(bridge.num_sessions(), 1);

        assert!(bridge.configure_stream(handle, 1280, 720));
        let device = bridge.session(handle).unwrap().device();
        assert_eq!(device.formats.len(), 1);
        // SAFETY: formats are created from `pix`.
        let pix = unsafe { device.formats[0].fmt.pix };
        assert_eq!(pix.width, 1280);
        assert_eq!(pix.height, 720);
        assert_eq!(pix.bytesperline, 1280);
        assert_eq!(pix.sizeimage, 1_382_400);

        let frame = vec![0u8; 1_382_400];
        assert!(bridge.write_frame(handle, Some(frame.as_slice())));

        assert!(bridge.configure_stream(handle, 1280, 720));
        assert_eq!(bridge.session(handle).unwrap().device().formats.len(), 1);

        bridge.close_device(handle);
        assert_eq!(bridge.num_sessions(), 0);
        assert!(bridge.session(handle).is_none());

        // Closed handles are rejected, including by a second close.
        assert!(!bridge.configure_stream(handle, 640, 480));
        assert!(!bridge.write_frame(handle, Some(frame.as_slice())));
        bridge.close_device(handle);
    }

    #[test]
    fn bridge_configure_failures_keep_dimensions() {
        let mut bridge = Bridge::<DummyDevice>::new();
        let handle = bridge.open_device(Some("/dummy/video0"));

        assert!(bridge.configure_stream(handle, 640, 480));
        assert!(!bridge.configure_stream(handle, 0, 480));
        assert!(!bridge.configure_stream(handle, 640, -1));
        assert_eq!(bridge.session(handle).unwrap().dimensions(), Some((640, 480)));
    }

    #[test]
    fn bridge_write_failures() {
        let mut bridge = Bridge::<DummyDevice>::new();
        let handle = bridge.open_device(Some("/dummy/video0"));

        assert!(!bridge.write_frame(handle, None));
        assert!(!bridge.write_frame(handle, Some(&[])));
        assert!(bridge.session(handle).unwrap().device().frames.is_empty());
    }

    #[test]
    fn bridge_partial_write() {
        let mut bridge = Bridge::<DummyDevice>::new();
        let handle = bridge.open_device(Some("/dummy/video0"));

        let frame = [0u8; 64];
        let device = bridge
            .sessions
            .get_mut(SessionHandle::from_raw(handle).unwrap())
            .unwrap()
            .device_mut();
        device.write_results.push_back(Ok(10));
        device.write_results.push_back(Ok(10));
        device
            .write_results
            .push_back(Err(io::ErrorKind::WouldBlock.into()));

        assert!(!bridge.write_frame(handle, Some(frame.as_slice())));
        assert_eq!(bridge.write_frame_counted(handle, Some(frame.as_slice())), Some(10));
        assert_eq!(bridge.write_frame_counted(handle, Some(frame.as_slice())), None);
        assert_eq!(bridge.write_frame_counted(handle, Some(frame.as_slice())), Some(64));
    }

    #[test]
    fn bridge_write_only_sessions() {
        let mut bridge = Bridge::<DummyDevice>::with_config(DeviceConfig::new().write_only());
        let handle = bridge.open_device(Some("/dummy/video0"));
        assert_eq!(
            bridge.session(handle).unwrap().capability(),
            Capability::WriteOnly
        );
        assert!(!bridge.configure_stream(handle, 640, 480));
        assert!(bridge.write_frame(handle, Some(&[0u8; 32])));

        let handle = bridge.open_device_with(Some("/dummy/video1"), &DeviceConfig::new());
        assert!(bridge.configure_stream(handle, 640, 480));
    }

    #[test]
    fn bridge_handles_are_not_reused() {
        let mut bridge = Bridge::<DummyDevice>::new();
        let first = bridge.open_device(Some("/dummy/video0"));
        bridge.close_device(first);

        let second = bridge.open_device(Some("/dummy/video0"));
        assert_ne!(first, second);
        assert!(bridge.session(first).is_none());
        bridge.close_device(first);
        assert!(bridge.session(second).is_some());
    }
}

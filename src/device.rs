// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Access to V4L2 output devices.
//!
//! Sessions never call into the kernel directly: they go through the [`OutputDevice`] trait, which
//! [`LoopbackDevice`] implements on top of a file descriptor. This allows sessions to be exercised
//! against dummy devices.

use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::os::fd::AsFd;
use std::os::fd::AsRawFd;
use std::os::fd::BorrowedFd;
use std::os::fd::RawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::path::PathBuf;

use thiserror::Error;
use v4l2r::bindings::v4l2_format;
use v4l2r::ioctl::IntoErrno;

use crate::LOG_TAG;

/// Whether sessions opened with a given configuration may negotiate a format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Capability {
    /// Format is negotiated with `VIDIOC_S_FMT` before frames are written.
    #[default]
    FormatAware,
    /// Frames are written in whatever format the device is already set to.
    WriteOnly,
}

/// Options used when opening an output device.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    non_blocking: bool,
    capability: Capability,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceConfig {
    pub const fn new() -> Self {
        Self {
            non_blocking: true,
            capability: Capability::FormatAware,
        }
    }

    /// Open the device in blocking mode. Writes will then wait for a consumer instead of failing
    /// with `EAGAIN`.
    pub fn blocking(mut self) -> Self {
        self.non_blocking = false;
        self
    }

    /// Open sessions that only write frames and never negotiate a format.
    pub fn write_only(mut self) -> Self {
        self.capability = Capability::WriteOnly;
        self
    }

    pub fn is_non_blocking(&self) -> bool {
        self.non_blocking
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }
}

#[derive(Debug, Error)]
pub enum OpenError {
    #[error("device path is empty")]
    EmptyPath,
    #[error("failed to open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Operations a session needs from the device it writes to.
pub trait OutputDevice: Sized {
    /// Open the device at `path`.
    fn open(path: &Path, config: &DeviceConfig) -> Result<Self, OpenError>;

    /// Perform `VIDIOC_S_FMT` with `format`.
    ///
    /// The error value is the errno returned by the ioctl.
    fn set_format(&mut self, format: v4l2_format) -> Result<v4l2_format, i32>;

    /// Perform a single `write` of `frame` and return the number of bytes accepted by the device.
    ///
    /// Implementations must not retry, so the returned count can be smaller than `frame.len()`.
    fn write(&mut self, frame: &[u8]) -> io::Result<usize>;
}

/// A V4L2 output node, typically created by the `v4l2loopback` kernel module.
pub struct LoopbackDevice {
    file: File,
    path: PathBuf,
}

impl LoopbackDevice {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OutputDevice for LoopbackDevice {
    fn open(path: &Path, config: &DeviceConfig) -> Result<Self, OpenError> {
        if path.as_os_str().is_empty() {
            return Err(OpenError::EmptyPath);
        }

        let mut flags = libc::O_CLOEXEC;
        if config.non_blocking {
            flags |= libc::O_NONBLOCK;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(flags)
            .open(path)
            .map_err(|source| OpenError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        log::debug!(target: LOG_TAG, "opened {} as fd {}", path.display(), file.as_raw_fd());

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    fn set_format(&mut self, format: v4l2_format) -> Result<v4l2_format, i32> {
        v4l2r::ioctl::s_fmt(&mut self.file, format).map_err(IntoErrno::into_errno)
    }

    fn write(&mut self, frame: &[u8]) -> io::Result<usize> {
        self.file.write(frame)
    }
}

impl AsFd for LoopbackDevice {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl AsRawFd for LoopbackDevice {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Lookup of loopback devices on the system.
//!
//! The `v4l2loopback` module creates regular `/dev/videoN` nodes, so finding one is a matter of
//! checking a few candidate paths. [`probe_output`] can then be used to confirm that a node
//! accepts output and identify its driver.

use std::fmt;
use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::path::PathBuf;

use nix::unistd::access;
use nix::unistd::AccessFlags;
use thiserror::Error;
use v4l2r::bindings;
use v4l2r::bindings::v4l2_capability;
use v4l2r::ioctl::IntoErrno;

/// Nodes created by `modprobe v4l2loopback devices=1 video_nr=0` and its neighbours.
pub const DEFAULT_CANDIDATES: [&str; 4] =
    ["/dev/video0", "/dev/video1", "/dev/video2", "/dev/video3"];

/// Driver name reported by `v4l2loopback` devices.
const LOOPBACK_DRIVER: &str = "v4l2 loopback";

/// Reason why a device path cannot be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceIssue {
    EmptyPath,
    NotFound(PathBuf),
    InsufficientPermissions(PathBuf),
}

impl fmt::Display for DeviceIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceIssue::EmptyPath => write!(f, "Device path is empty"),
            DeviceIssue::NotFound(path) => {
                write!(f, "Virtual camera not found at {}", path.display())
            }
            DeviceIssue::InsufficientPermissions(path) => {
                write!(f, "Insufficient permissions for {}", path.display())
            }
        }
    }
}

fn is_read_write(path: &Path) -> bool {
    access(path, AccessFlags::R_OK | AccessFlags::W_OK).is_ok()
}

/// Set of paths that may host a loopback device.
#[derive(Debug, Clone)]
pub struct Discovery {
    candidates: Vec<PathBuf>,
}

impl Default for Discovery {
    fn default() -> Self {
        Self::with_candidates(DEFAULT_CANDIDATES)
    }
}

impl Discovery {
    pub fn with_candidates<I, P>(candidates: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            candidates: candidates.into_iter().map(Into::into).collect(),
        }
    }

    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }

    /// Returns all candidates that exist.
    pub fn list_device_paths(&self) -> Vec<PathBuf> {
        self.candidates
            .iter()
            .filter(|p| p.exists())
            .cloned()
            .collect()
    }

    /// Returns the first candidate that we can open for reading and writing.
    pub fn detect_device_path(&self) -> Option<PathBuf> {
        self.candidates
            .iter()
            .find(|p| p.exists() && is_read_write(p))
            .cloned()
    }
}

/// Check whether `path` can be used as an output device, and explain why if it cannot.
pub fn device_issue(path: &Path) -> Option<DeviceIssue> {
    if path.as_os_str().is_empty() || path.to_string_lossy().trim().is_empty() {
        return Some(DeviceIssue::EmptyPath);
    }
    if !path.exists() {
        return Some(DeviceIssue::NotFound(path.to_path_buf()));
    }
    if !is_read_write(path) {
        return Some(DeviceIssue::InsufficientPermissions(path.to_path_buf()));
    }

    None
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("VIDIOC_QUERYCAP failed with errno {0}")]
    QueryCap(i32),
}

/// Capabilities of a V4L2 node relevant to frame output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputProbe {
    pub driver: String,
    pub card: String,
    /// Whether the node accepts video output, i.e. frames written by us.
    pub video_output: bool,
}

impl OutputProbe {
    pub fn is_loopback(&self) -> bool {
        self.driver == LOOPBACK_DRIVER
    }
}

fn c_string(bytes: &[u8]) -> String {
    let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..len]).into_owned()
}

impl From<v4l2_capability> for OutputProbe {
    fn from(caps: v4l2_capability) -> Self {
        // `device_caps` is only meaningful if the driver says so.
        let caps_bits = if caps.capabilities & bindings::V4L2_CAP_DEVICE_CAPS != 0 {
            caps.device_caps
        } else {
            caps.capabilities
        };

        Self {
            driver: c_string(&caps.driver),
            card: c_string(&caps.card),
            video_output: caps_bits & bindings::V4L2_CAP_VIDEO_OUTPUT != 0,
        }
    }
}

/// Query the capabilities of the V4L2 node at `path`.
pub fn probe_output(path: &Path) -> Result<OutputProbe, ProbeError> {
    let file: File = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NONBLOCK | libc::O_CLOEXEC)
        .open(path)
        .map_err(|source| ProbeError::Open {
            path: path.to_path_buf(),
            source,
        })?;

    v4l2r::ioctl::querycap::<v4l2_capability>(&file)
        .map(OutputProbe::from)
        .map_err(|e| ProbeError::QueryCap(e.into_errno()))
}

// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Device sessions.
//!
//! A [`Session`] owns one open output device, remembers the format negotiated on it, and forwards
//! frames to it. Every operation runs to completion on the calling thread; nothing is retried. A
//! session is closed by dropping it (or by [`Session::close`]), which releases the descriptor.

use std::io;
use std::path::Path;

use thiserror::Error;

use crate::convert::crop_even;
use crate::convert::ConvertError;
use crate::convert::I420Frame;
use crate::device::Capability;
use crate::device::DeviceConfig;
use crate::device::OpenError;
use crate::device::OutputDevice;
use crate::format::FormatError;
use crate::format::StreamFormat;
use crate::LOG_TAG;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigureError {
    #[error("session was opened write-only")]
    WriteOnly,
    #[error("{0}")]
    InvalidFormat(#[from] FormatError),
    #[error("VIDIOC_S_FMT failed with errno {0}")]
    SetFormat(i32),
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("frame is empty")]
    EmptyFrame,
    #[error("failed to write frame: {0}")]
    Io(#[from] io::Error),
}

impl WriteError {
    /// Returns whether the device refused the frame because nobody is consuming it.
    pub fn would_block(&self) -> bool {
        matches!(self, WriteError::Io(e) if e.kind() == io::ErrorKind::WouldBlock)
    }
}

#[derive(Debug, Error)]
pub enum WriteArgbError {
    #[error("{0}")]
    Convert(#[from] ConvertError),
    #[error("{0}")]
    Configure(#[from] ConfigureError),
    #[error("{0}")]
    Write(#[from] WriteError),
}

/// Result of a successful `write` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The whole frame has been accepted by the device.
    Complete,
    /// The device only accepted the first `written` bytes of a `expected` bytes frame.
    Partial { written: usize, expected: usize },
}

impl WriteOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, WriteOutcome::Complete)
    }

    /// Number of bytes accepted by the device.
    pub fn written(&self, expected: usize) -> usize {
        match *self {
            WriteOutcome::Complete => expected,
            WriteOutcome::Partial { written, .. } => written,
        }
    }
}

/// One open output device and its negotiated state.
///
/// Sessions are neither `Clone` nor usable through a shared reference: configuring and writing
/// both require `&mut self`, so operations on a session are always serialized by its owner.
pub struct Session<D: OutputDevice> {
    device: D,
    capability: Capability,
    /// Last format successfully set on the device, if any.
    format: Option<StreamFormat>,
    frames_written: u64,
    bytes_written: u64,
}

impl<D: OutputDevice> Session<D> {
    /// Open the device at `path` and create a session for it.
    pub fn open(path: &Path, config: &DeviceConfig) -> Result<Self, OpenError> {
        D::open(path, config).map(|device| Self::new(device, config.capability()))
    }

    /// Create a session for an already opened device.
    pub fn new(device: D, capability: Capability) -> Self {
        Self {
            device,
            capability,
            format: None,
            frames_written: 0,
            bytes_written: 0,
        }
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    /// Returns the currently configured `(width, height)`, if any.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.format.map(|f| (f.width(), f.height()))
    }

    pub fn format(&self) -> Option<&StreamFormat> {
        self.format.as_ref()
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Set the output format of the device to a `width`x`height` YUV 4:2:0 stream.
    ///
    /// Nothing is sent to the device if it is already configured with these dimensions, as
    /// renegotiating the format can disturb consumers of an ongoing stream. On error, the
    /// previously configured format is kept.
    pub fn configure(&mut self, width: i32, height: i32) -> Result<(), ConfigureError> {
        if self.capability == Capability::WriteOnly {
            return Err(ConfigureError::WriteOnly);
        }

        if let Some(current) = &self.format {
            if current.matches(width, height) {
                return Ok(());
            }
        }

        let format = StreamFormat::new(width, height)?;
        self.device
            .set_format(format.into())
            .map_err(ConfigureError::SetFormat)?;

        log::debug!(
            target: LOG_TAG,
            "configured stream to {}x{} ({} bytes per frame)",
            format.width(),
            format.height(),
            format.size_image()
        );
        self.format = Some(format);

        Ok(())
    }

    /// Write `frame` to the device in a single call.
    ///
    /// The frame layout must match the configured format; it is not checked here. If the device
    /// accepts only part of the frame, [`WriteOutcome::Partial`] is returned and it is up to the
    /// caller to decide what to do with the remainder.
    pub fn write_frame(&mut self, frame: &[u8]) -> Result<WriteOutcome, WriteError> {
        if frame.is_empty() {
            return Err(WriteError::EmptyFrame);
        }

        let written = self.device.write(frame)?;
        self.bytes_written += written as u64;

        if written < frame.len() {
            log::warn!(
                target: LOG_TAG,
                "partial frame write: {} of {} bytes",
                written,
                frame.len()
            );
            return Ok(WriteOutcome::Partial {
                written,
                expected: frame.len(),
            });
        }

        self.frames_written += 1;
        Ok(WriteOutcome::Complete)
    }

    /// Convert a `width`x`height` ARGB8888 image into a YUV 4:2:0 frame and write it.
    ///
    /// Odd dimensions are cropped to the nearest even value, and the stream is (re)configured to
    /// the resulting size before writing.
    pub fn write_argb(
        &mut self,
        pixels: &[u32],
        width: u32,
        height: u32,
    ) -> Result<WriteOutcome, WriteArgbError> {
        let (even_width, even_height) = crop_even(width, height)?;
        let frame = I420Frame::from_argb(pixels, width as usize, even_width, even_height)?;

        let (w, h) = frame.signed_dimensions()?;
        self.configure(w, h)?;

        Ok(self.write_frame(frame.as_bytes())?)
    }

    /// Close the session, releasing its device.
    pub fn close(self) {
        log::debug!(
            target: LOG_TAG,
            "closing session ({} frames, {} bytes written)",
            self.frames_written,
            self.bytes_written
        );
    }
}

// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Output stream format negotiated with loopback devices.
//!
//! Loopback devices are always fed planar YUV 4:2:0 (`YU12`) frames, so the only free parameters
//! of a stream are its width and height. [`StreamFormat`] validates them and produces the exact
//! `v4l2_format` passed to `VIDIOC_S_FMT`.

use std::num::NonZeroU32;

use thiserror::Error;
use v4l2r::bindings;
use v4l2r::bindings::v4l2_format;
use v4l2r::bindings::v4l2_pix_format;
use v4l2r::PixelFormat;
use v4l2r::QueueType;

/// Pixel format of all streams, `V4L2_PIX_FMT_YUV420`.
pub const PIXELFORMAT: u32 = PixelFormat::from_fourcc(b"YU12").to_u32();

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("invalid stream dimensions {0}x{1}")]
    InvalidDimensions(i32, i32),
    #[error("frame size of {0}x{1} stream does not fit in 32 bits")]
    FrameTooLarge(u32, u32),
}

/// Resolution of a YUV 4:2:0 output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    width: NonZeroU32,
    height: NonZeroU32,
    size_image: u32,
}

impl StreamFormat {
    /// Validate `width` and `height` as received from the managed side, where they are signed.
    pub fn new(width: i32, height: i32) -> Result<Self, FormatError> {
        let invalid = || FormatError::InvalidDimensions(width, height);
        let w = u32::try_from(width)
            .ok()
            .and_then(NonZeroU32::new)
            .ok_or_else(invalid)?;
        let h = u32::try_from(height)
            .ok()
            .and_then(NonZeroU32::new)
            .ok_or_else(invalid)?;

        Self::from_dimensions(w, h)
    }

    pub fn from_dimensions(width: NonZeroU32, height: NonZeroU32) -> Result<Self, FormatError> {
        // The product is computed in 64 bits: sizeimage is a u32 in the kernel ABI, and we would
        // rather refuse the format than send a truncated size.
        let size_image = u64::from(width.get()) * u64::from(height.get()) * 3 / 2;
        let size_image = u32::try_from(size_image)
            .map_err(|_| FormatError::FrameTooLarge(width.get(), height.get()))?;

        Ok(Self {
            width,
            height,
            size_image,
        })
    }

    pub fn width(&self) -> u32 {
        self.width.get()
    }

    pub fn height(&self) -> u32 {
        self.height.get()
    }

    /// Stride of the luma plane. Chroma planes use half of it.
    pub fn bytes_per_line(&self) -> u32 {
        self.width.get()
    }

    /// Size in bytes of one frame, i.e. `width * height * 3 / 2`.
    pub fn size_image(&self) -> u32 {
        self.size_image
    }

    /// Returns whether this format has the given signed dimensions.
    pub fn matches(&self, width: i32, height: i32) -> bool {
        i64::from(self.width()) == i64::from(width) && i64::from(self.height()) == i64::from(height)
    }
}

impl From<StreamFormat> for v4l2_format {
    fn from(format: StreamFormat) -> Self {
        let pix = v4l2_pix_format {
            width: format.width(),
            height: format.height(),
            pixelformat: PIXELFORMAT,
            field: bindings::v4l2_field_V4L2_FIELD_NONE,
            bytesperline: format.bytes_per_line(),
            sizeimage: format.size_image(),
            ..Default::default()
        };

        v4l2_format {
            type_: QueueType::VideoOutput as u32,
            fmt: bindings::v4l2_format__bindgen_ty_1 { pix },
        }
    }
}

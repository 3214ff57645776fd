// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Conversion of ARGB8888 images into the YUV 4:2:0 planar frames expected by loopback devices.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConvertError {
    #[error("invalid image dimensions {0}x{1}")]
    InvalidDimensions(u32, u32),
    #[error("image dimensions {0}x{1} must be even")]
    OddDimensions(u32, u32),
    #[error("stride {stride} is smaller than width {width}")]
    InvalidStride { stride: usize, width: u32 },
    #[error("expected at least {expected} pixels, got {actual}")]
    NotEnoughPixels { expected: usize, actual: usize },
}

/// Returns the largest even dimensions that fit in a `width`x`height` image.
///
/// Images one pixel wide or high cannot be represented in 4:2:0 and are rejected.
pub fn crop_even(width: u32, height: u32) -> Result<(u32, u32), ConvertError> {
    if width <= 1 || height <= 1 {
        return Err(ConvertError::InvalidDimensions(width, height));
    }

    Ok((width & !1, height & !1))
}

fn clamp_to_byte(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

/// BT.601 limited range conversion of an ARGB8888 pixel. Alpha is ignored.
fn argb_to_yuv(color: u32) -> (u8, u8, u8) {
    let r = ((color >> 16) & 0xff) as i32;
    let g = ((color >> 8) & 0xff) as i32;
    let b = (color & 0xff) as i32;

    let y = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
    let u = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
    let v = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;

    (clamp_to_byte(y), clamp_to_byte(u), clamp_to_byte(v))
}

/// A YUV 4:2:0 planar (`YU12`) frame: full resolution Y plane followed by the U and V planes at
/// half resolution in both directions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct I420Frame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl I420Frame {
    /// Convert the top-left `width`x`height` area of an ARGB8888 image whose rows are `stride`
    /// pixels apart.
    ///
    /// Chroma is sampled from the top-left pixel of each 2x2 block.
    pub fn from_argb(
        pixels: &[u32],
        stride: usize,
        width: u32,
        height: u32,
    ) -> Result<Self, ConvertError> {
        if width == 0 || height == 0 {
            return Err(ConvertError::InvalidDimensions(width, height));
        }
        if width % 2 != 0 || height % 2 != 0 {
            return Err(ConvertError::OddDimensions(width, height));
        }
        if stride < width as usize {
            return Err(ConvertError::InvalidStride { stride, width });
        }

        let (w, h) = (width as usize, height as usize);
        let expected = stride * (h - 1) + w;
        if pixels.len() < expected {
            return Err(ConvertError::NotEnoughPixels {
                expected,
                actual: pixels.len(),
            });
        }

        let y_size = w * h;
        let uv_size = y_size / 4;
        let mut data = vec![0u8; y_size + uv_size * 2];
        let (y_plane, chroma) = data.split_at_mut(y_size);
        let (u_plane, v_plane) = chroma.split_at_mut(uv_size);

        for (row, line) in pixels.chunks(stride).take(h).enumerate() {
            for (col, &color) in line[..w].iter().enumerate() {
                let (y, u, v) = argb_to_yuv(color);
                y_plane[row * w + col] = y;

                if row % 2 == 0 && col % 2 == 0 {
                    let uv_index = (row / 2) * (w / 2) + col / 2;
                    u_plane[uv_index] = u;
                    v_plane[uv_index] = v;
                }
            }
        }

        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Dimensions in the signed representation used by stream configuration.
    pub fn signed_dimensions(&self) -> Result<(i32, i32), ConvertError> {
        match (i32::try_from(self.width), i32::try_from(self.height)) {
            (Ok(w), Ok(h)) => Ok((w, h)),
            _ => Err(ConvertError::InvalidDimensions(self.width, self.height)),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

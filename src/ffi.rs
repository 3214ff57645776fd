// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! C ABI of the crate.
//!
//! These functions operate on a process-wide [`Bridge`] of [`LoopbackDevice`]s. Handles are
//! 64-bit integers, `0` meaning "no session". Calls are serialized by a mutex, so they can be
//! made from any thread.

use std::ffi::c_char;
use std::ffi::CStr;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use crate::bridge::Bridge;
use crate::device::DeviceConfig;
use crate::device::LoopbackDevice;
use crate::LOG_TAG;

static BRIDGE: Mutex<Bridge<LoopbackDevice>> = Mutex::new(Bridge::new());

pub(crate) fn bridge() -> MutexGuard<'static, Bridge<LoopbackDevice>> {
    // A panic while holding the lock cannot leave the session table inconsistent, so keep going.
    BRIDGE.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Turn a C string into a path, or `None` if it is null or not valid UTF-8.
///
/// # Safety
///
/// `path` must be null or point to a nul-terminated string.
unsafe fn path_arg<'a>(path: *const c_char) -> Option<&'a str> {
    if path.is_null() {
        return None;
    }

    match CStr::from_ptr(path).to_str() {
        Ok(path) => Some(path),
        Err(e) => {
            log::error!(target: LOG_TAG, "device path is not valid UTF-8: {}", e);
            None
        }
    }
}

/// Initialize logging. Not required, but no log will be produced without it unless the
/// application sets up a logger itself.
#[no_mangle]
pub extern "C" fn virtual_camera_init() {
    crate::init_logging();
}

/// Open the device at `path` for format-aware output. Returns `0` on failure.
///
/// # Safety
///
/// `path` must be null or point to a nul-terminated string.
#[no_mangle]
pub unsafe extern "C" fn virtual_camera_open_device(path: *const c_char) -> u64 {
    bridge().open_device(path_arg(path))
}

/// Open the device at `path` for writing frames only, without ever changing its format. Returns
/// `0` on failure.
///
/// # Safety
///
/// `path` must be null or point to a nul-terminated string.
#[no_mangle]
pub unsafe extern "C" fn virtual_camera_open_device_write_only(path: *const c_char) -> u64 {
    bridge().open_device_with(path_arg(path), &DeviceConfig::new().write_only())
}

/// Configure the session for a `width`x`height` YUV 4:2:0 stream.
#[no_mangle]
pub extern "C" fn virtual_camera_configure_stream(handle: u64, width: i32, height: i32) -> bool {
    bridge().configure_stream(handle, width, height)
}

/// Write the `length` bytes at `data` to the session in a single call.
///
/// Returns `true` only if all bytes were accepted. If `written` is not null, the number of bytes
/// actually accepted by the device is stored there, which lets callers detect partial writes.
///
/// # Safety
///
/// `data` must be null or valid for reads of `length` bytes. `written` must be null or valid for
/// a write of a `u64`.
#[no_mangle]
pub unsafe extern "C" fn virtual_camera_write_frame(
    handle: u64,
    data: *const u8,
    length: i32,
    written: *mut u64,
) -> bool {
    let frame = match usize::try_from(length) {
        Ok(length) if !data.is_null() && length > 0 => {
            Some(std::slice::from_raw_parts(data, length))
        }
        _ => None,
    };

    let count = bridge().write_frame_counted(handle, frame);

    if !written.is_null() {
        *written = count.unwrap_or(0) as u64;
    }

    match (frame, count) {
        (Some(frame), Some(count)) => count == frame.len(),
        _ => false,
    }
}

/// Close the session. Closing `0` or an already closed handle does nothing.
#[no_mangle]
pub extern "C" fn virtual_camera_close_device(handle: u64) {
    bridge().close_device(handle)
}

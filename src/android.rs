// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! JNI entry points of `com.example.virtualcamer.VirtualCameraBridge`.
//!
//! The Kotlin class loads `libvirtualcamera.so` and declares its device operations as `external`
//! methods. They share the process-wide bridge of the [`crate::ffi`] module, so handles are the
//! same whichever interface created them. Frames are passed as direct `ByteBuffer`s, which are
//! read in place.

use std::ffi::c_void;

use jni::objects::JByteBuffer;
use jni::objects::JObject;
use jni::objects::JString;
use jni::sys::jboolean;
use jni::sys::jint;
use jni::sys::jlong;
use jni::sys::JNI_FALSE;
use jni::sys::JNI_TRUE;
use jni::sys::JNI_VERSION_1_6;
use jni::JNIEnv;
use jni::JavaVM;

use crate::ffi::bridge;
use crate::LOG_TAG;

fn to_jboolean(value: bool) -> jboolean {
    if value {
        JNI_TRUE
    } else {
        JNI_FALSE
    }
}

/// Resolve the first `length` bytes of a direct buffer from its `address` and `capacity`.
///
/// Fails if the buffer is not direct, or if `length` is not positive or exceeds the capacity.
///
/// # Safety
///
/// If `address` and `capacity` are `Ok`, `address` must be valid for reads of `capacity` bytes
/// during `'a`.
unsafe fn direct_frame<'a>(
    address: jni::errors::Result<*mut u8>,
    capacity: jni::errors::Result<usize>,
    length: jint,
) -> Option<&'a [u8]> {
    let address = match address {
        Ok(address) => address,
        Err(e) => {
            log::error!(target: LOG_TAG, "cannot resolve frame buffer address: {}", e);
            return None;
        }
    };

    let length = match usize::try_from(length) {
        Ok(length) if length > 0 => length,
        _ => {
            log::error!(target: LOG_TAG, "invalid frame length {}", length);
            return None;
        }
    };

    match capacity {
        Ok(capacity) if length <= capacity => Some(std::slice::from_raw_parts(address, length)),
        Ok(capacity) => {
            log::error!(
                target: LOG_TAG,
                "frame length {} exceeds buffer capacity {}",
                length,
                capacity
            );
            None
        }
        Err(e) => {
            log::error!(target: LOG_TAG, "cannot get frame buffer capacity: {}", e);
            None
        }
    }
}

#[no_mangle]
pub extern "system" fn JNI_OnLoad(_vm: JavaVM, _reserved: *mut c_void) -> jint {
    crate::init_logging();
    JNI_VERSION_1_6
}

#[no_mangle]
pub extern "system" fn Java_com_example_virtualcamer_VirtualCameraBridge_nativeOpenDevice<
    'local,
>(
    mut env: JNIEnv<'local>,
    _this: JObject<'local>,
    path: JString<'local>,
) -> jlong {
    let path: Option<String> = if path.is_null() {
        None
    } else {
        match env.get_string(&path) {
            Ok(path) => Some(path.into()),
            Err(e) => {
                log::error!(target: LOG_TAG, "cannot read device path: {}", e);
                None
            }
        }
    };

    bridge().open_device(path.as_deref()) as jlong
}

#[no_mangle]
pub extern "system" fn Java_com_example_virtualcamer_VirtualCameraBridge_nativeConfigureStream<
    'local,
>(
    _env: JNIEnv<'local>,
    _this: JObject<'local>,
    handle: jlong,
    width: jint,
    height: jint,
) -> jboolean {
    to_jboolean(bridge().configure_stream(handle as u64, width, height))
}

#[no_mangle]
pub extern "system" fn Java_com_example_virtualcamer_VirtualCameraBridge_nativeWriteFrame<
    'local,
>(
    env: JNIEnv<'local>,
    _this: JObject<'local>,
    handle: jlong,
    buffer: JByteBuffer<'local>,
    length: jint,
) -> jboolean {
    // SAFETY: the JVM keeps the memory of a direct buffer alive and in place while it is
    // referenced, and `buffer` is referenced until this call returns.
    let frame = unsafe {
        direct_frame(
            env.get_direct_buffer_address(&buffer),
            env.get_direct_buffer_capacity(&buffer),
            length,
        )
    };

    to_jboolean(bridge().write_frame(handle as u64, frame))
}

#[no_mangle]
pub extern "system" fn Java_com_example_virtualcamer_VirtualCameraBridge_nativeCloseDevice<
    'local,
>(
    _env: JNIEnv<'local>,
    _this: JObject<'local>,
    handle: jlong,
) {
    bridge().close_device(handle as u64)
}

#[cfg(test)]
mod tests {
    use jni::errors::Error;
    use jni::errors::JniError;
    use jni::sys::JNI_FALSE;
    use jni::sys::JNI_TRUE;

    use super::direct_frame;
    use super::to_jboolean;

    #[test]
    fn non_direct_buffer() {
        // What `get_direct_buffer_address` returns for heap buffers.
        let frame = unsafe {
            direct_frame(
                Err(Error::NullPtr("get_direct_buffer_address return value")),
                Err(Error::JniCall(JniError::Unknown)),
                16,
            )
        };
        assert!(frame.is_none());
    }

    #[test]
    fn direct_buffer_length() {
        let mut data = [7u8; 32];
        let address = data.as_mut_ptr();

        unsafe {
            assert_eq!(direct_frame(Ok(address), Ok(32), 16), Some(&[7u8; 16][..]));
            assert_eq!(direct_frame(Ok(address), Ok(32), 32).map(<[u8]>::len), Some(32));
            assert!(direct_frame(Ok(address), Ok(32), 33).is_none());
            assert!(direct_frame(Ok(address), Ok(32), 0).is_none());
            assert!(direct_frame(Ok(address), Ok(32), -1).is_none());
            let capacity = Err(Error::JniCall(JniError::Unknown));
            assert!(direct_frame(Ok(address), capacity, 16).is_none());
        }
    }

    #[test]
    fn jboolean_values() {
        assert_eq!(to_jboolean(true), JNI_TRUE);
        assert_eq!(to_jboolean(false), JNI_FALSE);
    }
}

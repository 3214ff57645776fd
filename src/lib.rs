// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! This crate writes raw video frames to V4L2 output devices, typically created by the
//! `v4l2loopback` kernel module, so they can be consumed by other applications as if they came
//! from a camera.
//!
//! # Anatomy of the crate
//!
//! * [`session::Session`] owns an open device, optionally negotiates its output format (planar
//!   YUV 4:2:0 at a given resolution) and writes frames to it. It reaches the kernel through the
//!   [`device::OutputDevice`] trait, implemented for real nodes by [`device::LoopbackDevice`].
//! * [`bridge::Bridge`] stores sessions in a [`table::SessionTable`] and exposes them through
//!   64-bit integer handles, which is what managed runtimes can hold on to. The [`ffi`] module
//!   exports it as a C ABI, and the `android` module (behind the `android` feature) as the JNI
//!   methods of the Android application.
//! * [`convert`] turns ARGB images into frames, and [`discovery`] finds candidate device nodes.
//!
//! All operations are synchronous and run on the calling thread. Devices are opened in
//! non-blocking mode by default, so writing a frame while no consumer is reading fails right away
//! with `EAGAIN`; retrying is left to the caller.

#[cfg(feature = "android")]
pub mod android;
pub mod bridge;
pub mod convert;
pub mod device;
pub mod discovery;
pub mod ffi;
pub mod format;
pub mod session;
pub mod table;

pub use v4l2r;

pub use bridge::Bridge;
pub use device::DeviceConfig;
pub use device::LoopbackDevice;
pub use session::Session;
pub use session::WriteOutcome;

/// Target under which all log records of this crate are emitted.
pub const LOG_TAG: &str = "VirtualCamera";

static LOG_INIT: std::sync::Once = std::sync::Once::new();

/// Set up the logger selected at build time. Records are dropped if no logger feature is enabled
/// and the application did not install one itself.
///
/// Can be called several times; only the first call has an effect.
pub fn init_logging() {
    LOG_INIT.call_once(|| {
        #[cfg(feature = "env_logger")]
        {
            let _ = env_logger::builder().format_timestamp(None).try_init();
        }

        #[cfg(feature = "android")]
        android_logger::init_once(
            android_logger::Config::default()
                .with_tag(LOG_TAG)
                .with_max_level(log::LevelFilter::Debug),
        );
    });
}

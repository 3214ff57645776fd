// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Tests of the handle-based bridge against real file descriptors.
//!
//! FIFOs stand in for loopback devices: like a loopback node opened in non-blocking mode, they
//! accept a limited amount of data before refusing writes with `EAGAIN` while nobody reads.

use std::io::Read;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::path::PathBuf;

use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use tempfile::TempDir;
use virtualcamera::bridge::INVALID_HANDLE;
use virtualcamera::discovery::probe_output;
use virtualcamera::discovery::Discovery;
use virtualcamera::Bridge;
use virtualcamera::DeviceConfig;
use virtualcamera::LoopbackDevice;
use virtualcamera::Session;
use virtualcamera::WriteOutcome;

fn make_fifo() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("video-fifo");
    mkfifo(&path, Mode::S_IRUSR | Mode::S_IWUSR).unwrap();
    (dir, path)
}

#[test]
fn nonexistent_device() {
    let mut bridge = Bridge::<LoopbackDevice>::new();

    let handle = bridge.open_device(Some("/dev/does-not-exist"));
    assert_eq!(handle, INVALID_HANDLE);
    assert!(!bridge.configure_stream(handle, 1280, 720));
    assert!(!bridge.write_frame(handle, Some(&[0u8; 64])));
    bridge.close_device(handle);
    assert_eq!(bridge.num_sessions(), 0);
}

#[test]
fn write_only_dev_null() {
    let mut bridge = Bridge::<LoopbackDevice>::with_config(DeviceConfig::new().write_only());

    let handle = bridge.open_device(Some("/dev/null"));
    assert_ne!(handle, INVALID_HANDLE);

    let frame = vec![0x80u8; 1_382_400];
    for _ in 0..3 {
        assert!(bridge.write_frame(handle, Some(frame.as_slice())));
    }
    let session = bridge.session(handle).unwrap();
    assert_eq!(session.frames_written(), 3);
    assert_eq!(session.bytes_written(), 3 * 1_382_400);
    assert_eq!(session.device().path(), Path::new("/dev/null"));

    bridge.close_device(handle);
    bridge.close_device(handle);
    assert_eq!(bridge.num_sessions(), 0);
}

#[test]
fn fifo_partial_write_then_would_block() {
    let (_dir, path) = make_fifo();

    let mut session = Session::<LoopbackDevice>::open(&path, &DeviceConfig::new().write_only())
        .unwrap();

    // A 720p frame is much larger than the pipe buffer, so only part of it gets in.
    let frame = vec![0x10u8; 1_382_400];
    let written = match session.write_frame(&frame).unwrap() {
        WriteOutcome::Partial { written, expected } => {
            assert_eq!(expected, frame.len());
            written
        }
        WriteOutcome::Complete => panic!("frame should not fit in the pipe"),
    };
    assert!(written > 0 && written < frame.len());
    assert_eq!(session.frames_written(), 0);
    assert_eq!(session.bytes_written(), written as u64);

    // The pipe is now full and nobody reads it.
    let err = session.write_frame(&frame).unwrap_err();
    assert!(err.would_block());

    // Draining the pipe lets the next frame in again.
    let mut reader = std::fs::OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(&path)
        .unwrap();
    let mut drained = vec![0u8; written];
    reader.read_exact(&mut drained).unwrap();
    assert!(drained.iter().all(|&b| b == 0x10));

    let small = [0x20u8; 1024];
    assert_eq!(session.write_frame(&small).unwrap(), WriteOutcome::Complete);
    assert_eq!(session.frames_written(), 1);
}

#[test]
fn fifo_through_bridge_reports_written_count() {
    let (_dir, path) = make_fifo();
    let mut bridge = Bridge::<LoopbackDevice>::new();

    let handle = bridge.open_device(path.to_str());
    assert_ne!(handle, INVALID_HANDLE);

    // FIFOs do not implement V4L2 ioctls.
    assert!(!bridge.configure_stream(handle, 1280, 720));
    assert_eq!(bridge.session(handle).unwrap().dimensions(), None);

    let frame = vec![0u8; 1_382_400];
    assert!(!bridge.write_frame(handle, Some(frame.as_slice())));
    assert_eq!(bridge.write_frame_counted(handle, Some(frame.as_slice())), None);

    bridge.close_device(handle);
}

#[test]
fn fifo_is_not_a_v4l2_device() {
    let (_dir, path) = make_fifo();
    assert!(probe_output(&path).is_err());
}

/// Full scenario on an actual loopback device, if the system has one.
#[test]
fn loopback_device_end_to_end() {
    let Some(path) = Discovery::default()
        .list_device_paths()
        .into_iter()
        .find(|p| probe_output(p).map(|p| p.is_loopback()).unwrap_or(false))
    else {
        println!("Skipping test: no v4l2loopback device available");
        return;
    };

    let mut bridge = Bridge::<LoopbackDevice>::new();
    let handle = bridge.open_device(path.to_str());
    if handle == INVALID_HANDLE {
        println!("Skipping test: cannot open {}", path.display());
        return;
    }

    if !bridge.configure_stream(handle, 1280, 720) {
        println!("Skipping test: {} rejected 1280x720", path.display());
        bridge.close_device(handle);
        return;
    }
    assert_eq!(bridge.session(handle).unwrap().dimensions(), Some((1280, 720)));
    assert!(bridge.configure_stream(handle, 1280, 720));

    let frame = vec![0x80u8; 1_382_400];
    // Without a consumer, a non-blocking write may be refused.
    match bridge.write_frame_counted(handle, Some(frame.as_slice())) {
        Some(count) => assert_eq!(count, frame.len()),
        None => println!("{} refused the frame, no consumer is reading", path.display()),
    }

    bridge.close_device(handle);
    assert!(bridge.session(handle).is_none());
}

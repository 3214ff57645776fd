// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Write a test pattern to a loopback device.
//!
//! Usage: `vcam-pattern [DEVICE] [WIDTH] [HEIGHT] [FRAMES]`
//!
//! If `DEVICE` is not given, the first accessible `/dev/videoN` node is used. Frames that cannot
//! be written because no consumer is reading are dropped.

use std::path::PathBuf;
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use anyhow::anyhow;
use anyhow::Context;
use virtualcamera::discovery::device_issue;
use virtualcamera::discovery::probe_output;
use virtualcamera::discovery::Discovery;
use virtualcamera::session::WriteArgbError;
use virtualcamera::DeviceConfig;
use virtualcamera::LoopbackDevice;
use virtualcamera::Session;
use virtualcamera::WriteOutcome;

const FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// Fill `pixels` with vertical bars whose colors shift with `iteration`.
fn draw_pattern(pixels: &mut [u32], width: u32, iteration: u32) {
    let bar_width = (width / 8).max(1);
    for (i, pixel) in pixels.iter_mut().enumerate() {
        let x = i as u32 % width;
        let bar = (x / bar_width + iteration / 10) % 8;
        let r = if bar & 0b100 != 0 { 0xff } else { 0 };
        let g = if bar & 0b010 != 0 { 0xff } else { 0 };
        let b = if bar & 0b001 != 0 { 0xff } else { 0 };
        *pixel = 0xff00_0000 | (r << 16) | (g << 8) | b;
    }
}

fn parse_arg<T: FromStr>(arg: Option<String>, default: T, name: &str) -> anyhow::Result<T> {
    match arg {
        Some(arg) => arg.parse().map_err(|_| anyhow!("invalid {}: {}", name, arg)),
        None => Ok(default),
    }
}

fn main() -> anyhow::Result<()> {
    virtualcamera::init_logging();

    let mut args = std::env::args().skip(1);
    let path = match args.next() {
        Some(path) => PathBuf::from(path),
        None => Discovery::default()
            .detect_device_path()
            .context("no accessible /dev/video* device found")?,
    };
    let width: u32 = parse_arg(args.next(), 640, "width")?;
    let height: u32 = parse_arg(args.next(), 480, "height")?;
    let frames: u32 = parse_arg(args.next(), 300, "frame count")?;

    if let Some(issue) = device_issue(&path) {
        return Err(anyhow!("{}", issue));
    }
    match probe_output(&path) {
        Ok(probe) if !probe.video_output => {
            log::warn!("{} ({}) does not advertise video output", path.display(), probe.driver)
        }
        Ok(probe) => log::info!("using {} ({}, {})", path.display(), probe.card, probe.driver),
        Err(e) => log::warn!("cannot query {}: {:#}", path.display(), e),
    }

    let mut session = Session::<LoopbackDevice>::open(&path, &DeviceConfig::new())
        .with_context(|| format!("while opening {}", path.display()))?;

    let mut pixels = vec![0u32; width as usize * height as usize];
    let mut dropped = 0;
    for iteration in 0..frames {
        draw_pattern(&mut pixels, width, iteration);

        match session.write_argb(&pixels, width, height) {
            Ok(WriteOutcome::Complete) => (),
            Ok(WriteOutcome::Partial { written, expected }) => {
                log::warn!("frame {} truncated: {}/{} bytes", iteration, written, expected);
            }
            Err(WriteArgbError::Write(e)) if e.would_block() => dropped += 1,
            Err(e) => return Err(e).context("while writing frame"),
        }

        thread::sleep(FRAME_INTERVAL);
    }

    println!(
        "wrote {} frames to {} ({} dropped)",
        session.frames_written(),
        path.display(),
        dropped
    );
    session.close();

    Ok(())
}

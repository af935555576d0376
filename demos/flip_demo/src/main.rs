// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Two-plane animation on the software display device.
//!
//! A full-screen background plane fades while a sprite plane carrying a
//! cached, rescaled badge image moves across it. A background thread drives
//! vertical blanks at 60 Hz. Events are logged through `tracing` and
//! recorded; the recording is exported as Chrome trace JSON and the last
//! composed frame is saved as a PNG.
//!
//! ```text
//! flip_demo [IMAGE] [TRACE_JSON]
//! ```
//!
//! `IMAGE` defaults to a generated badge. Set `RUST_LOG=scanout=trace` to see
//! every flip.

use std::error::Error;
use std::f32::consts::TAU;
use std::fs::File;
use std::io::{BufWriter, Cursor};
use std::time::Duration;

use image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use kurbo::Point;
use scanout_backend_soft::{SoftConfig, SoftwareDevice};
use scanout_core::device::PlaneId;
use scanout_core::format::PixelFormat;
use scanout_core::plane::PlaneGeometry;
use scanout_core::screen::Screen;
use scanout_core::trace::{TraceSink, Tracer};
use scanout_debug::Fanout;
use scanout_debug::chrome;
use scanout_debug::logging::LogSink;
use scanout_debug::recorder::RecorderSink;
use scanout_image::FileSource;

const WIDTH: u32 = 320;
const HEIGHT: u32 = 240;
const SPRITE: u32 = 64;
const FRAME_COUNT: u32 = 120;
/// ≈60 Hz.
const VBLANK: Duration = Duration::from_micros(16_667);

type DemoScreen = Screen<SoftwareDevice, FileSource>;

fn main() -> Result<(), Box<dyn Error>> {
    scanout_debug::logging::init()?;

    let mut args = std::env::args().skip(1);
    let badge = args.next().unwrap_or_else(|| "res:badge".into());
    let trace_path = args
        .next()
        .unwrap_or_else(|| "flip_demo_trace.json".into());

    // -- device ------------------------------------------------------------
    let device =
        SoftwareDevice::new(SoftConfig::new(WIDTH, HEIGHT).with_format(PixelFormat::Argb8888))?;
    let vblank = device.spawn_vblank(VBLANK)?;

    let mut source = FileSource::new();
    source.insert_resource("badge", badge_png()?);
    let mut screen = Screen::new(device.clone(), source);

    // -- animation ---------------------------------------------------------
    let mut recorder = RecorderSink::new();
    {
        let mut log = LogSink;
        let sinks: Vec<&mut dyn TraceSink> = vec![&mut recorder, &mut log];
        let mut fanout = Fanout::new(sinks);
        let mut tracer = Tracer::new(&mut fanout);
        animate(&mut screen, &badge, &mut tracer)?;
    }

    // Let the last flips land before stopping the display.
    std::thread::sleep(VBLANK * 2);
    screen.poll()?;
    vblank.stop();

    let stats = device.stats();
    let images = screen.images().stats();
    tracing::info!(
        vblanks = stats.vblanks,
        flips = stats.latched,
        image_hits = images.hits,
        image_misses = images.misses,
        "animation finished"
    );
    drop(screen);

    // -- output ------------------------------------------------------------
    let mut trace = BufWriter::new(File::create(&trace_path)?);
    chrome::export(recorder.as_bytes(), &mut trace)?;
    tracing::info!(path = %trace_path, "chrome trace written");

    let (desc, bytes) = device.output();
    let frame = RgbImage::from_fn(desc.width, desc.height, |x, y| {
        let at = (y * desc.stride + x * 4) as usize;
        Rgb([bytes[at + 2], bytes[at + 1], bytes[at]])
    });
    frame.save("flip_demo_output.png")?;
    tracing::info!("last frame written to flip_demo_output.png");
    Ok(())
}

fn animate(
    screen: &mut DemoScreen,
    badge: &str,
    tracer: &mut Tracer<'_>,
) -> Result<(), Box<dyn Error>> {
    let background = screen.create_plane(PlaneId(0))?;
    let sprite = screen.create_plane(PlaneId(1))?;
    for (key, geometry) in [
        (background, PlaneGeometry::new(WIDTH, HEIGHT, 2)),
        (sprite, PlaneGeometry::new(SPRITE, SPRITE, 3)),
    ] {
        let plane = screen.plane_mut(key)?;
        plane.configure_traced(geometry, PixelFormat::Argb8888, tracer)?;
        plane.show_traced(tracer)?;
    }

    for frame in 0..FRAME_COUNT {
        let shade = u8::try_from(frame * 2).unwrap_or(u8::MAX);
        screen
            .current_surface_for(background)?
            .fill(&[shade, 0x30, 0x10, 0xff]);
        screen.request_flip_traced(background, tracer)?;

        let phase = TAU * frame as f32 / FRAME_COUNT as f32;
        let scale = 0.75 + 0.25 * phase.sin();
        let image = screen.cached_image_traced(badge, scale, scale, true, tracer)?;
        let surface = screen.current_surface_for(sprite)?;
        surface.fill(&[0, 0, 0, 0]);
        for y in 0..image.height().min(surface.height()) {
            if let (Some(src), Some(dst)) = (image.row(y), surface.row_mut(y)) {
                let n = src.len().min(dst.len());
                dst[..n].copy_from_slice(&src[..n]);
            }
        }

        let t = f64::from(frame) / f64::from(FRAME_COUNT);
        let plane = screen.plane_mut(sprite)?;
        plane.set_position(Point::new(
            t * f64::from(WIDTH - SPRITE),
            88.0 + 60.0 * f64::from(phase.cos()),
        ));
        plane.apply_traced(tracer)?;
        screen.request_flip_traced(sprite, tracer)?;
    }
    Ok(())
}

/// An orange disc on a transparent square, PNG encoded.
fn badge_png() -> Result<Vec<u8>, image::ImageError> {
    let radius = f64::from(SPRITE) / 2.0;
    let badge = RgbaImage::from_fn(SPRITE, SPRITE, |x, y| {
        let dx = f64::from(x) + 0.5 - radius;
        let dy = f64::from(y) + 0.5 - radius;
        if dx * dx + dy * dy <= (radius - 2.0) * (radius - 2.0) {
            Rgba([0xff, 0x90, 0x20, 0xff])
        } else {
            Rgba([0, 0, 0, 0])
        }
    });
    let mut bytes = Cursor::new(Vec::new());
    badge.write_to(&mut bytes, ImageFormat::Png)?;
    Ok(bytes.into_inner())
}

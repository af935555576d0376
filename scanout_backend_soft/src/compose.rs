// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Composition of scanned-out planes into the output framebuffer.
//!
//! The output is `Xrgb8888`. Planes are drawn bottom to top in plane id
//! order. `Argb8888` planes blend (premultiplied source over); every other
//! format is opaque. Scaling is nearest-neighbour.

use scanout_core::format::PixelFormat;
use scanout_core::surface::{PixelMemory, Surface, SurfaceDesc};

/// Copy of a buffer handed to the device by a flip or present.
#[derive(Clone, Debug)]
pub(crate) struct Frame {
    pub(crate) desc: SurfaceDesc,
    pub(crate) bytes: Vec<u8>,
}

impl Frame {
    pub(crate) fn capture<M: PixelMemory>(surface: &Surface<M>) -> Self {
        Self {
            desc: *surface.desc(),
            bytes: surface.pixels().to_vec(),
        }
    }

    /// Premultiplied `[r, g, b, a]` of the pixel at `x`, `y`.
    fn rgba(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.desc.width || y >= self.desc.height {
            return None;
        }
        let bpp = self.desc.format.bytes_per_pixel() as usize;
        let row = y as usize * self.desc.stride as usize;
        let at = row + x as usize * bpp;
        let px = self.bytes.get(at..at + bpp)?;
        Some(match self.desc.format {
            PixelFormat::Rgb565 => {
                let v = u16::from_le_bytes([px[0], px[1]]);
                let r = expand((v >> 11) & 0x1f, 5);
                let g = expand((v >> 5) & 0x3f, 6);
                let b = expand(v & 0x1f, 5);
                [r, g, b, 0xff]
            }
            PixelFormat::Rgb888 | PixelFormat::Xrgb8888 => [px[2], px[1], px[0], 0xff],
            PixelFormat::Argb8888 => [px[2], px[1], px[0], px[3]],
            PixelFormat::Yuyv => {
                // Each 4-byte group holds two pixels sharing chroma.
                let pair = row + (x as usize & !1) * bpp;
                let group = self.bytes.get(pair..pair + 4)?;
                let luma = if x % 2 == 0 { group[0] } else { group[2] };
                yuv_to_rgb(luma, group[1], group[3])
            }
        })
    }
}

/// Widens a `bits`-bit channel to 8 bits by replicating its high bits.
#[expect(clippy::cast_possible_truncation, reason = "masked to 8 bits")]
fn expand(v: u16, bits: u32) -> u8 {
    let v = v << (8 - bits);
    (v | (v >> bits)) as u8
}

/// BT.601 limited-range conversion.
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 4] {
    let c = i32::from(y) - 16;
    let d = i32::from(u) - 128;
    let e = i32::from(v) - 128;
    let r = clamp_u8((298 * c + 409 * e + 128) >> 8);
    let g = clamp_u8((298 * c - 100 * d - 208 * e + 128) >> 8);
    let b = clamp_u8((298 * c + 516 * d + 128) >> 8);
    [r, g, b, 0xff]
}

fn clamp_u8(v: i32) -> u8 {
    u8::try_from(v.clamp(0, 255)).unwrap_or(u8::MAX)
}

/// Latched plane registers in device units.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct Registers {
    pub(crate) x: i32,
    pub(crate) y: i32,
    pub(crate) scale: f64,
    pub(crate) pan_x: i32,
    pub(crate) pan_y: i32,
    pub(crate) pan_width: u32,
    pub(crate) pan_height: u32,
}

impl Registers {
    /// Size of the plane on the output.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "clamped to the u32 range first"
    )]
    fn output_size(&self) -> (u32, u32) {
        let extent = |len: u32| {
            (f64::from(len) * self.scale)
                .round()
                .clamp(0.0, f64::from(u32::MAX)) as u32
        };
        (extent(self.pan_width), extent(self.pan_height))
    }
}

/// Fills the output with opaque black.
pub(crate) fn clear(output: &mut Surface<Vec<u8>>) {
    output.fill(&[0, 0, 0, 0xff]);
}

/// Draws the pan window of `frame` onto `output` as placed by `regs`.
pub(crate) fn blit(output: &mut Surface<Vec<u8>>, frame: &Frame, regs: &Registers) {
    let (width, height) = regs.output_size();
    if width == 0 || height == 0 {
        return;
    }
    let out_w = i64::from(output.width());
    let out_h = i64::from(output.height());
    for dy in 0..height {
        let oy = i64::from(regs.y) + i64::from(dy);
        if oy < 0 || oy >= out_h {
            continue;
        }
        let sy = source_coord(regs.pan_y, dy, regs.pan_height, height);
        let Some(row) = output.row_mut(narrow(oy)) else {
            continue;
        };
        for dx in 0..width {
            let ox = i64::from(regs.x) + i64::from(dx);
            if ox < 0 || ox >= out_w {
                continue;
            }
            let sx = source_coord(regs.pan_x, dx, regs.pan_width, width);
            let Some(src) = frame.rgba(sx, sy) else {
                continue;
            };
            let at = narrow(ox) as usize * 4;
            let dst = &mut row[at..at + 4];
            let inv = u32::from(255 - src[3]);
            // Output bytes are B, G, R, X.
            for (c, s) in [(2, src[0]), (1, src[1]), (0, src[2])] {
                let blended = u32::from(s) + (u32::from(dst[c]) * inv + 127) / 255;
                dst[c] = u8::try_from(blended.min(255)).unwrap_or(u8::MAX);
            }
            dst[3] = 0xff;
        }
    }
}

/// Maps output offset `d` of `dst_len` onto the pan window.
fn source_coord(origin: i32, d: u32, src_len: u32, dst_len: u32) -> u32 {
    let offset = u64::from(d) * u64::from(src_len) / u64::from(dst_len.max(1));
    let coord = i64::from(origin) + i64::try_from(offset).unwrap_or(i64::MAX);
    u32::try_from(coord).unwrap_or(u32::MAX)
}

fn narrow(v: i64) -> u32 {
    u32::try_from(v).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(width: u32, height: u32) -> Surface<Vec<u8>> {
        let mut out = Surface::zeroed(SurfaceDesc::new(width, height, PixelFormat::Xrgb8888))
            .unwrap();
        clear(&mut out);
        out
    }

    fn pixel(out: &Surface<Vec<u8>>, x: u32, y: u32) -> [u8; 4] {
        let row = out.row(y).unwrap();
        let at = x as usize * 4;
        [row[at], row[at + 1], row[at + 2], row[at + 3]]
    }

    fn solid(width: u32, height: u32, format: PixelFormat, px: &[u8]) -> Frame {
        let mut surface = Surface::zeroed(SurfaceDesc::new(width, height, format)).unwrap();
        surface.fill(px);
        Frame::capture(&surface)
    }

    fn unscaled(frame: &Frame, x: i32, y: i32) -> Registers {
        Registers {
            x,
            y,
            scale: 1.0,
            pan_x: 0,
            pan_y: 0,
            pan_width: frame.desc.width,
            pan_height: frame.desc.height,
        }
    }

    #[test]
    fn rgb565_expands_to_full_range() {
        let frame = solid(1, 1, PixelFormat::Rgb565, &0xf800_u16.to_le_bytes());
        assert_eq!(frame.rgba(0, 0), Some([0xff, 0, 0, 0xff]));
        let frame = solid(1, 1, PixelFormat::Rgb565, &0x07e0_u16.to_le_bytes());
        assert_eq!(frame.rgba(0, 0), Some([0, 0xff, 0, 0xff]));
    }

    #[test]
    fn yuyv_grey_is_neutral() {
        let frame = solid(2, 1, PixelFormat::Yuyv, &[126, 128]);
        let [r, g, b, _] = frame.rgba(1, 0).unwrap();
        assert_eq!((r, g), (g, b));
    }

    #[test]
    fn position_offsets_and_clips() {
        let mut out = output(4, 4);
        let frame = solid(2, 2, PixelFormat::Xrgb8888, &[10, 20, 30, 0]);
        blit(&mut out, &frame, &unscaled(&frame, 3, -1));
        assert_eq!(pixel(&out, 3, 0), [10, 20, 30, 0xff]);
        assert_eq!(pixel(&out, 2, 0), [0, 0, 0, 0xff]);
        assert_eq!(pixel(&out, 3, 1), [0, 0, 0, 0xff]);
    }

    #[test]
    fn scale_doubles_each_pixel() {
        let mut out = output(4, 2);
        let mut surface = Surface::zeroed(SurfaceDesc::new(2, 1, PixelFormat::Xrgb8888)).unwrap();
        surface.row_mut(0).unwrap()[4..8].copy_from_slice(&[1, 2, 3, 0]);
        let frame = Frame::capture(&surface);
        let mut regs = unscaled(&frame, 0, 0);
        regs.scale = 2.0;
        blit(&mut out, &frame, &regs);
        assert_eq!(pixel(&out, 1, 1), [0, 0, 0, 0xff]);
        assert_eq!(pixel(&out, 2, 1), [1, 2, 3, 0xff]);
        assert_eq!(pixel(&out, 3, 0), [1, 2, 3, 0xff]);
    }

    #[test]
    fn pan_selects_window() {
        let mut out = output(1, 1);
        let mut surface = Surface::zeroed(SurfaceDesc::new(3, 3, PixelFormat::Xrgb8888)).unwrap();
        surface.row_mut(2).unwrap()[8..12].copy_from_slice(&[9, 9, 9, 0]);
        let frame = Frame::capture(&surface);
        let regs = Registers {
            pan_x: 2,
            pan_y: 2,
            pan_width: 1,
            pan_height: 1,
            ..unscaled(&frame, 0, 0)
        };
        blit(&mut out, &frame, &regs);
        assert_eq!(pixel(&out, 0, 0), [9, 9, 9, 0xff]);
    }

    #[test]
    fn premultiplied_alpha_blends() {
        let mut out = output(1, 1);
        let white = solid(1, 1, PixelFormat::Xrgb8888, &[255, 255, 255, 0]);
        blit(&mut out, &white, &unscaled(&white, 0, 0));
        // Half-transparent black over white.
        let shade = solid(1, 1, PixelFormat::Argb8888, &[0, 0, 0, 128]);
        blit(&mut out, &shade, &unscaled(&shade, 0, 0));
        assert_eq!(pixel(&out, 0, 0), [127, 127, 127, 0xff]);
    }
}

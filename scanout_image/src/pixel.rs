// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Conversion from decoded RGBA to premultiplied `Argb8888`.

use bytemuck::{Pod, Zeroable};
use image::RgbaImage;
use scanout_core::cache::Image;
use scanout_core::error::AllocationError;
use scanout_core::format::PixelFormat;
use scanout_core::surface::{Surface, SurfaceDesc};

/// One `Argb8888` pixel in memory order.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct Bgra {
    /// Blue, premultiplied.
    pub b: u8,
    /// Green, premultiplied.
    pub g: u8,
    /// Red, premultiplied.
    pub r: u8,
    /// Alpha.
    pub a: u8,
}

/// Premultiplies straight `[r, g, b, a]` into a [`Bgra`] pixel.
#[must_use]
pub fn premultiply([r, g, b, a]: [u8; 4]) -> Bgra {
    let scale = |c: u8| {
        let v = (u16::from(c) * u16::from(a) + 127) / 255;
        u8::try_from(v).unwrap_or(u8::MAX)
    };
    Bgra {
        b: scale(b),
        g: scale(g),
        r: scale(r),
        a,
    }
}

/// Converts a decoded image to a premultiplied `Argb8888` surface.
pub(crate) fn to_argb(rgba: &RgbaImage) -> Result<Image, AllocationError> {
    let desc = SurfaceDesc::new(rgba.width(), rgba.height(), PixelFormat::Argb8888);
    let pixels: Vec<Bgra> = rgba.pixels().map(|px| premultiply(px.0)).collect();
    Surface::new(desc, bytemuck::cast_slice::<Bgra, u8>(&pixels).to_vec())
}

/// Packs the rows of an `Argb8888` image into a tightly strided buffer.
///
/// The channel order is kept; resampling treats all four channels alike.
pub(crate) fn to_buffer(image: &Image) -> Option<RgbaImage> {
    let mut packed = Vec::with_capacity(image.desc().row_len() * image.height() as usize);
    for y in 0..image.height() {
        packed.extend_from_slice(image.row(y)?);
    }
    RgbaImage::from_raw(image.width(), image.height(), packed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_pixels_keep_their_channels() {
        assert_eq!(
            premultiply([10, 20, 30, 255]),
            Bgra {
                b: 30,
                g: 20,
                r: 10,
                a: 255
            }
        );
    }

    #[test]
    fn transparent_pixels_are_zero() {
        assert_eq!(premultiply([200, 100, 50, 0]), Bgra::default());
    }

    #[test]
    fn half_alpha_rounds_to_nearest() {
        let px = premultiply([255, 0, 101, 128]);
        assert_eq!((px.r, px.g, px.b, px.a), (128, 0, 51, 128));
    }

    #[test]
    fn conversion_is_bgra_in_memory() {
        let rgba = RgbaImage::from_pixel(2, 1, image::Rgba([1, 2, 3, 255]));
        let surface = to_argb(&rgba).unwrap();
        assert_eq!(surface.format(), PixelFormat::Argb8888);
        assert_eq!(surface.pixels(), &[3, 2, 1, 255, 3, 2, 1, 255]);
    }

    #[test]
    fn strided_rows_are_packed() {
        let desc = SurfaceDesc::new(1, 2, PixelFormat::Argb8888).with_stride(8);
        let mut image = Surface::zeroed(desc).unwrap();
        image.row_mut(1).unwrap()[..4].copy_from_slice(&[4, 5, 6, 7]);
        let buffer = to_buffer(&image).unwrap();
        assert_eq!(buffer.as_raw(), &vec![0, 0, 0, 0, 4, 5, 6, 7]);
    }
}

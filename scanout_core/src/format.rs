// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pixel formats understood by planes and cached images.

use core::fmt;

/// Memory layout of one pixel in a [`Surface`](crate::surface::Surface).
///
/// Multi-byte formats are little-endian, matching the DRM fourcc
/// conventions: `Argb8888` is stored as `B, G, R, A` in memory.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 16-bit RGB, 5-6-5.
    Rgb565,
    /// 24-bit packed RGB.
    Rgb888,
    /// 32-bit RGB with an ignored alpha byte.
    Xrgb8888,
    /// 32-bit premultiplied ARGB.
    Argb8888,
    /// Packed 4:2:2 YUV (`Y0 U Y1 V`).
    Yuyv,
}

impl PixelFormat {
    /// Every format this crate knows about.
    pub const ALL: [Self; 5] = [
        Self::Rgb565,
        Self::Rgb888,
        Self::Xrgb8888,
        Self::Argb8888,
        Self::Yuyv,
    ];

    /// Number of bytes one pixel occupies.
    #[inline]
    #[must_use]
    pub const fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::Rgb565 | Self::Yuyv => 2,
            Self::Rgb888 => 3,
            Self::Xrgb8888 | Self::Argb8888 => 4,
        }
    }

    /// Whether the format carries an alpha channel.
    #[inline]
    #[must_use]
    pub const fn has_alpha(self) -> bool {
        matches!(self, Self::Argb8888)
    }

    /// DRM fourcc code for this format.
    #[must_use]
    pub const fn fourcc(self) -> u32 {
        match self {
            Self::Rgb565 => fourcc(b"RG16"),
            Self::Rgb888 => fourcc(b"RG24"),
            Self::Xrgb8888 => fourcc(b"XR24"),
            Self::Argb8888 => fourcc(b"AR24"),
            Self::Yuyv => fourcc(b"YUYV"),
        }
    }

    /// Looks up the format for a DRM fourcc code reported by a driver.
    #[must_use]
    pub fn from_fourcc(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.fourcc() == code)
    }
}

const fn fourcc(code: &[u8; 4]) -> u32 {
    u32::from_le_bytes(*code)
}

impl fmt::Debug for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Rgb565 => "RGB565",
            Self::Rgb888 => "RGB888",
            Self::Xrgb8888 => "XRGB8888",
            Self::Argb8888 => "ARGB8888",
            Self::Yuyv => "YUYV",
        };
        f.write_str(name)
    }
}

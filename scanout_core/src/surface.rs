// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pixel surfaces and the memory behind them.
//!
//! A [`Surface`] pairs a [`SurfaceDesc`] with a memory object implementing
//! [`PixelMemory`]. Display devices supply their own memory type (a mapped
//! dumb buffer, a `dma-buf`, ...) so that surfaces handed to the hardware are
//! zero-copy; decoded images use plain `Vec<u8>`.

use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use crate::error::AllocationError;
use crate::format::PixelFormat;

/// Geometry and format of a surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SurfaceDesc {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Bytes per row, including padding.
    pub stride: u32,
    /// Pixel layout.
    pub format: PixelFormat,
}

impl SurfaceDesc {
    /// Creates a descriptor with a tightly packed stride.
    #[must_use]
    pub const fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            stride: width * format.bytes_per_pixel(),
            format,
        }
    }

    /// Returns a copy with an explicit row stride (e.g. a driver pitch).
    #[must_use]
    pub const fn with_stride(mut self, stride: u32) -> Self {
        self.stride = stride;
        self
    }

    /// Total number of bytes the surface occupies.
    #[must_use]
    pub const fn byte_len(&self) -> usize {
        self.stride as usize * self.height as usize
    }

    /// Number of meaningful bytes in one row.
    #[must_use]
    pub const fn row_len(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel() as usize
    }

    /// Whether either dimension is zero.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Opaque low-level buffer handle for zero-copy hand-off (a GEM name, a
/// `dma-buf` file descriptor, a physical address).
///
/// Exposing it bypasses the ownership guarantees of [`Surface`]: the holder
/// must not write through it while the buffer is being scanned out, and must
/// not retain it past a ring rotation.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RawHandle(pub u64);

impl fmt::Debug for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawHandle({:#x})", self.0)
    }
}

/// Memory backing a [`Surface`].
pub trait PixelMemory {
    /// Read access to the pixel bytes.
    fn bytes(&self) -> &[u8];

    /// Write access to the pixel bytes.
    fn bytes_mut(&mut self) -> &mut [u8];

    /// The device-level handle for this memory, if it has one.
    fn raw_handle(&self) -> Option<RawHandle> {
        None
    }
}

impl PixelMemory for Vec<u8> {
    fn bytes(&self) -> &[u8] {
        self
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        self
    }
}

/// A pixel buffer: geometry plus the memory that holds it.
pub struct Surface<M = Vec<u8>> {
    desc: SurfaceDesc,
    memory: M,
}

impl<M> fmt::Debug for Surface<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Surface")
            .field("desc", &self.desc)
            .finish_non_exhaustive()
    }
}

impl Surface<Vec<u8>> {
    /// Allocates a zero-filled heap surface.
    ///
    /// # Errors
    ///
    /// Returns [`AllocationError::ZeroSize`] for an empty descriptor.
    pub fn zeroed(desc: SurfaceDesc) -> Result<Self, AllocationError> {
        if desc.is_empty() {
            return Err(AllocationError::ZeroSize {
                width: desc.width,
                height: desc.height,
            });
        }
        Ok(Self {
            desc,
            memory: vec![0; desc.byte_len()],
        })
    }

    /// Consumes the surface and returns its bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.memory
    }
}

impl<M: PixelMemory> Surface<M> {
    /// Wraps existing memory.
    ///
    /// # Errors
    ///
    /// Returns [`AllocationError::ZeroSize`] for an empty descriptor and
    /// [`AllocationError::Undersized`] if `memory` cannot hold `desc`.
    pub fn new(desc: SurfaceDesc, memory: M) -> Result<Self, AllocationError> {
        if desc.is_empty() {
            return Err(AllocationError::ZeroSize {
                width: desc.width,
                height: desc.height,
            });
        }
        let actual = memory.bytes().len();
        if actual < desc.byte_len() || (desc.stride as usize) < desc.row_len() {
            return Err(AllocationError::Undersized {
                required: desc.byte_len().max(desc.row_len() * desc.height as usize),
                actual,
            });
        }
        Ok(Self { desc, memory })
    }

    /// Geometry and format.
    #[must_use]
    pub fn desc(&self) -> &SurfaceDesc {
        &self.desc
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.desc.width
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.desc.height
    }

    /// Bytes per row.
    #[must_use]
    pub fn stride(&self) -> u32 {
        self.desc.stride
    }

    /// Pixel format.
    #[must_use]
    pub fn format(&self) -> PixelFormat {
        self.desc.format
    }

    /// All pixel bytes, `stride * height` long.
    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        &self.memory.bytes()[..self.desc.byte_len()]
    }

    /// Mutable pixel bytes.
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        let len = self.desc.byte_len();
        &mut self.memory.bytes_mut()[..len]
    }

    /// The meaningful bytes of row `y`, without stride padding.
    #[must_use]
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        if y >= self.desc.height {
            return None;
        }
        let start = y as usize * self.desc.stride as usize;
        Some(&self.memory.bytes()[start..start + self.desc.row_len()])
    }

    /// Mutable bytes of row `y`.
    pub fn row_mut(&mut self, y: u32) -> Option<&mut [u8]> {
        if y >= self.desc.height {
            return None;
        }
        let start = y as usize * self.desc.stride as usize;
        let len = self.desc.row_len();
        Some(&mut self.memory.bytes_mut()[start..start + len])
    }

    /// Fills every pixel with `pixel`, which must be one pixel's worth of
    /// bytes in this surface's format.
    pub fn fill(&mut self, pixel: &[u8]) {
        debug_assert_eq!(
            pixel.len(),
            self.desc.format.bytes_per_pixel() as usize,
            "fill pattern must be exactly one pixel"
        );
        if pixel.is_empty() {
            return;
        }
        for y in 0..self.desc.height {
            if let Some(row) = self.row_mut(y) {
                for px in row.chunks_exact_mut(pixel.len()) {
                    px.copy_from_slice(pixel);
                }
            }
        }
    }

    /// Device handle of the backing memory, if any. See [`RawHandle`].
    #[must_use]
    pub fn raw_handle(&self) -> Option<RawHandle> {
        self.memory.raw_handle()
    }

    /// Borrows the backing memory.
    #[must_use]
    pub fn memory(&self) -> &M {
        &self.memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_stride_and_length() {
        let desc = SurfaceDesc::new(800, 480, PixelFormat::Rgb565);
        assert_eq!(desc.stride, 1600);
        assert_eq!(desc.byte_len(), 1600 * 480);
    }

    #[test]
    fn padded_rows_skip_padding() {
        let desc = SurfaceDesc::new(3, 2, PixelFormat::Argb8888).with_stride(16);
        let mut surface = Surface::zeroed(desc).unwrap();
        surface.fill(&[1, 2, 3, 4]);

        assert_eq!(surface.row(1).unwrap(), &[1, 2, 3, 4, 1, 2, 3, 4, 1, 2, 3, 4]);
        // Padding bytes untouched.
        assert_eq!(&surface.pixels()[12..16], &[0, 0, 0, 0]);
        assert!(surface.row(2).is_none());
    }

    #[test]
    fn undersized_memory_is_rejected() {
        let desc = SurfaceDesc::new(4, 4, PixelFormat::Xrgb8888);
        let err = Surface::new(desc, vec![0_u8; 10]).unwrap_err();
        assert_eq!(
            err,
            AllocationError::Undersized {
                required: 64,
                actual: 10
            }
        );
    }

    #[test]
    fn zero_size_is_rejected() {
        let desc = SurfaceDesc::new(0, 4, PixelFormat::Xrgb8888);
        assert!(matches!(
            Surface::zeroed(desc),
            Err(AllocationError::ZeroSize { .. })
        ));
    }

    #[test]
    fn heap_memory_has_no_raw_handle() {
        let surface = Surface::zeroed(SurfaceDesc::new(1, 1, PixelFormat::Rgb565)).unwrap();
        assert_eq!(surface.raw_handle(), None);
    }
}

// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! In-memory image source with call counters.

use alloc::borrow::ToOwned;
use alloc::collections::BTreeMap;
use alloc::rc::Rc;
use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;

use scanout_core::cache::{Image, ImageSource};
use scanout_core::error::{AllocationError, DecodeError};
use scanout_core::format::PixelFormat;
use scanout_core::surface::{Surface, SurfaceDesc};

#[derive(Clone, Debug)]
enum Entry {
    Pixels { desc: SurfaceDesc, bytes: Vec<u8> },
    Corrupt,
}

#[derive(Debug, Default)]
struct SourceState {
    images: BTreeMap<String, Entry>,
    decodes: usize,
    scales: usize,
    scaled_to: Vec<(u32, u32)>,
    fail_decodes: usize,
}

/// An [`ImageSource`] over images registered in memory. Clones share state,
/// so a test can keep one handle while an
/// [`ImageCache`](scanout_core::cache::ImageCache) owns another.
///
/// Scaling is nearest-neighbour and keeps the format.
#[derive(Clone, Default)]
pub struct MockSource {
    state: Rc<RefCell<SourceState>>,
}

impl fmt::Debug for MockSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("MockSource")
            .field("images", &state.images.len())
            .field("decodes", &state.decodes)
            .field("scales", &state.scales)
            .finish_non_exhaustive()
    }
}

impl MockSource {
    /// An empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a solid image of `width` by `height` filled with `pixel`.
    pub fn insert_solid(
        &self,
        id: &str,
        width: u32,
        height: u32,
        format: PixelFormat,
        pixel: &[u8],
    ) {
        let desc = SurfaceDesc::new(width, height, format);
        let bytes = pixel
            .iter()
            .copied()
            .cycle()
            .take(desc.byte_len())
            .collect();
        self.insert(id, desc, bytes);
    }

    /// Registers an image from raw bytes laid out per `desc`.
    pub fn insert(&self, id: &str, desc: SurfaceDesc, bytes: Vec<u8>) {
        self.state
            .borrow_mut()
            .images
            .insert(id.to_string(), Entry::Pixels { desc, bytes });
    }

    /// Registers `id` with contents that fail to decode.
    pub fn insert_corrupt(&self, id: &str) {
        self.state
            .borrow_mut()
            .images
            .insert(id.to_string(), Entry::Corrupt);
    }

    /// Unregisters `id`.
    pub fn remove(&self, id: &str) {
        self.state.borrow_mut().images.remove(id);
    }

    /// Makes the next `n` decodes fail regardless of the identifier.
    pub fn fail_decodes(&self, n: usize) {
        self.state.borrow_mut().fail_decodes = n;
    }

    /// Decode calls so far, successful or not.
    #[must_use]
    pub fn decodes(&self) -> usize {
        self.state.borrow().decodes
    }

    /// Scale calls so far.
    #[must_use]
    pub fn scales(&self) -> usize {
        self.state.borrow().scales
    }

    /// Target sizes of every scale call, in order.
    #[must_use]
    pub fn scaled_to(&self) -> Vec<(u32, u32)> {
        self.state.borrow().scaled_to.clone()
    }
}

impl ImageSource for MockSource {
    fn decode(&mut self, id: &str) -> Result<Image, DecodeError> {
        let mut state = self.state.borrow_mut();
        state.decodes += 1;
        if state.fail_decodes > 0 {
            state.fail_decodes -= 1;
            return Err(DecodeError::Malformed {
                id: id.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        match state.images.get(id) {
            Some(Entry::Pixels { desc, bytes }) => {
                Surface::new(*desc, bytes.clone()).map_err(|e| malformed(id, &e))
            }
            Some(Entry::Corrupt) => Err(DecodeError::Malformed {
                id: id.to_string(),
                reason: "corrupt header".to_string(),
            }),
            None => Err(DecodeError::NotFound(id.to_string())),
        }
    }

    fn scale(
        &mut self,
        id: &str,
        image: &Image,
        width: u32,
        height: u32,
    ) -> Result<Image, DecodeError> {
        {
            let mut state = self.state.borrow_mut();
            state.scales += 1;
            state.scaled_to.push((width, height));
        }
        let desc = SurfaceDesc::new(width, height, image.format());
        let bpp = image.format().bytes_per_pixel() as usize;
        let mut bytes = vec![0_u8; desc.byte_len()];
        for (y, row) in bytes.chunks_exact_mut(desc.stride as usize).enumerate() {
            let sy = scale_coord(y, height, image.height());
            let Some(src) = image.row(sy) else {
                continue;
            };
            for (x, px) in row.chunks_exact_mut(bpp).enumerate() {
                let sx = scale_coord(x, width, image.width()) as usize;
                px.copy_from_slice(&src[sx * bpp..(sx + 1) * bpp]);
            }
        }
        Surface::new(desc, bytes).map_err(|_| DecodeError::Scale {
            id: id.to_owned(),
            width,
            height,
        })
    }
}

/// Maps destination coordinate `d` in `0..dst` to a source coordinate in
/// `0..src`.
#[expect(
    clippy::cast_possible_truncation,
    reason = "result is below src, which is a u32"
)]
fn scale_coord(d: usize, dst: u32, src: u32) -> u32 {
    (d as u64 * u64::from(src) / u64::from(dst.max(1))) as u32
}

fn malformed(id: &str, e: &AllocationError) -> DecodeError {
    DecodeError::Malformed {
        id: id.to_string(),
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_counts_every_call() {
        let mut source = MockSource::new();
        source.insert_solid("a", 2, 2, PixelFormat::Rgb565, &[1, 2]);
        assert_eq!(source.decode("a").unwrap().width(), 2);
        assert!(matches!(source.decode("b"), Err(DecodeError::NotFound(_))));
        assert_eq!(source.decodes(), 2);
    }

    #[test]
    fn nearest_neighbour_scale() {
        let mut source = MockSource::new();
        let desc = SurfaceDesc::new(2, 1, PixelFormat::Rgb565);
        source.insert("ab", desc, vec![1, 1, 2, 2]);
        let image = source.decode("ab").unwrap();
        let scaled = source.scale("ab", &image, 4, 2).unwrap();
        assert_eq!(scaled.row(0).unwrap(), &[1, 1, 1, 1, 2, 2, 2, 2]);
        assert_eq!(scaled.row(1).unwrap(), scaled.row(0).unwrap());
        assert_eq!(source.scaled_to(), [(4, 2)]);
    }

    #[test]
    fn injected_failures_then_recovery() {
        let mut source = MockSource::new();
        source.insert_solid("a", 1, 1, PixelFormat::Argb8888, &[0, 0, 0, 255]);
        source.fail_decodes(1);
        assert!(source.decode("a").is_err());
        assert!(source.decode("a").is_ok());
    }
}

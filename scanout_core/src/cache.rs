// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Memoization of decoded and rescaled images.
//!
//! Painting code asks for an image by source identifier and target scale.
//! [`ImageCache::get`] decodes the source at native resolution, rescales it
//! once, and hands out the result as an [`Arc`]. Asking again with the same
//! key returns the *same* `Arc`, so callers can compare by pointer.
//!
//! With `approximate` set, both scale factors are first snapped to the
//! nearest multiple of [`CacheConfig::step`] (see [`round`]), so that
//! factors differing only by animation jitter share one entry.
//!
//! Failures are never cached: a source that failed to decode is decoded again
//! on the next request. There is no automatic eviction; [`ImageCache::clear`]
//! drops everything.

use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use hashbrown::{Equivalent, HashMap};

use crate::error::DecodeError;
use crate::surface::Surface;
use crate::trace::{CacheClearEvent, CacheLookupEvent, CacheOutcome, Tracer};

/// A decoded image in heap memory.
pub type Image = Surface<Vec<u8>>;

/// Decodes and rescales images for an [`ImageCache`].
pub trait ImageSource {
    /// Decodes the image named `id` at its native resolution.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if the source is missing or unreadable.
    fn decode(&mut self, id: &str) -> Result<Image, DecodeError>;

    /// Resamples `image`, decoded from `id`, to exactly `width` by `height`
    /// pixels.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Scale`] naming `id` if the image cannot be
    /// resampled.
    fn scale(
        &mut self,
        id: &str,
        image: &Image,
        width: u32,
        height: u32,
    ) -> Result<Image, DecodeError>;
}

/// Rounds `value` to the nearest multiple of `fraction`.
///
/// A `fraction` that is not a finite positive number leaves `value`
/// unchanged.
#[must_use]
pub fn round(value: f32, fraction: f32) -> f32 {
    if !(fraction.is_finite() && fraction > 0.0) {
        return value;
    }
    libm::roundf(value / fraction) * fraction
}

/// Configuration for an [`ImageCache`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CacheConfig {
    /// Quantization step for approximate lookups.
    pub step: f32,
}

impl CacheConfig {
    /// Hundredths: `0.501` and `0.5` share an entry.
    #[must_use]
    pub const fn new() -> Self {
        Self { step: 0.01 }
    }

    /// Returns a copy with a different quantization step.
    #[must_use]
    pub const fn with_step(mut self, step: f32) -> Self {
        self.step = step;
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Lookup counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct CacheStats {
    /// Lookups served from the cache.
    pub hits: u64,
    /// Lookups that decoded and inserted an entry.
    pub misses: u64,
    /// Lookups that failed.
    pub failures: u64,
    /// Calls to [`ImageCache::clear`].
    pub clears: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct CacheKey {
    source: String,
    hscale: u32,
    vscale: u32,
}

/// Borrowed form of [`CacheKey`], hashing identically, for lookups without
/// allocating.
#[derive(Hash)]
struct KeyRef<'a> {
    source: &'a str,
    hscale: u32,
    vscale: u32,
}

impl Equivalent<CacheKey> for KeyRef<'_> {
    fn equivalent(&self, key: &CacheKey) -> bool {
        self.source == key.source && self.hscale == key.hscale && self.vscale == key.vscale
    }
}

impl KeyRef<'_> {
    fn to_owned_key(&self) -> CacheKey {
        CacheKey {
            source: self.source.to_string(),
            hscale: self.hscale,
            vscale: self.vscale,
        }
    }
}

/// Decoded, pre-scaled images keyed by source and scale.
pub struct ImageCache<S> {
    source: S,
    config: CacheConfig,
    entries: HashMap<CacheKey, Arc<Image>>,
    stats: CacheStats,
}

impl<S> fmt::Debug for ImageCache<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageCache")
            .field("config", &self.config)
            .field("entries", &self.entries.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl<S: ImageSource> ImageCache<S> {
    /// Creates an empty cache over `source` with the default configuration.
    #[must_use]
    pub fn new(source: S) -> Self {
        Self::with_config(source, CacheConfig::default())
    }

    /// Creates an empty cache over `source`.
    #[must_use]
    pub fn with_config(source: S, config: CacheConfig) -> Self {
        Self {
            source,
            config,
            entries: HashMap::new(),
            stats: CacheStats::default(),
        }
    }

    /// Returns `source` decoded and scaled by `hscale` by `vscale`.
    ///
    /// With `approximate`, both factors are snapped to the configured step
    /// before lookup. Scaling is skipped when both factors are exactly 1.
    /// Scaled dimensions are `max(1, round(native * factor))`.
    ///
    /// # Errors
    ///
    /// [`DecodeError::InvalidScale`] for a factor that is not finite and
    /// positive (after snapping), otherwise whatever the [`ImageSource`]
    /// reports. Errors are not cached.
    pub fn get(
        &mut self,
        source: &str,
        hscale: f32,
        vscale: f32,
        approximate: bool,
    ) -> Result<Arc<Image>, DecodeError> {
        self.get_traced(source, hscale, vscale, approximate, &mut Tracer::none())
    }

    /// [`get`](Self::get) with trace events.
    ///
    /// # Errors
    ///
    /// See [`get`](Self::get).
    pub fn get_traced(
        &mut self,
        source: &str,
        hscale: f32,
        vscale: f32,
        approximate: bool,
        tracer: &mut Tracer<'_>,
    ) -> Result<Arc<Image>, DecodeError> {
        let (hscale, vscale) = if approximate {
            (round(hscale, self.config.step), round(vscale, self.config.step))
        } else {
            (hscale, vscale)
        };
        let result = self.lookup(source, hscale, vscale);
        let outcome = match &result {
            Ok((_, outcome)) => *outcome,
            Err(e) => {
                self.stats.failures += 1;
                tracing::warn!(source, hscale, vscale, error = %e, "image lookup failed");
                CacheOutcome::Failed
            }
        };
        tracer.cache_lookup(&CacheLookupEvent {
            source,
            hscale,
            vscale,
            outcome,
        });
        result.map(|(image, _)| image)
    }

    fn lookup(
        &mut self,
        source: &str,
        hscale: f32,
        vscale: f32,
    ) -> Result<(Arc<Image>, CacheOutcome), DecodeError> {
        let valid = |f: f32| f.is_finite() && f > 0.0;
        if !valid(hscale) || !valid(vscale) {
            return Err(DecodeError::InvalidScale { hscale, vscale });
        }

        let key = KeyRef {
            source,
            hscale: hscale.to_bits(),
            vscale: vscale.to_bits(),
        };
        if let Some(image) = self.entries.get(&key) {
            self.stats.hits += 1;
            tracing::trace!(source, hscale, vscale, "image cache hit");
            return Ok((Arc::clone(image), CacheOutcome::Hit));
        }

        let decoded = self.source.decode(source)?;
        let image = if hscale == 1.0 && vscale == 1.0 {
            decoded
        } else {
            let width = scaled_extent(decoded.width(), hscale);
            let height = scaled_extent(decoded.height(), vscale);
            self.source.scale(source, &decoded, width, height)?
        };
        tracing::debug!(
            source,
            width = image.width(),
            height = image.height(),
            "image decoded"
        );

        let image = Arc::new(image);
        self.entries.insert(key.to_owned_key(), Arc::clone(&image));
        self.stats.misses += 1;
        Ok((image, CacheOutcome::Miss))
    }

    /// Drops every entry. Images still held by callers stay alive.
    pub fn clear(&mut self) {
        self.clear_traced(&mut Tracer::none());
    }

    /// [`clear`](Self::clear) with trace events.
    pub fn clear_traced(&mut self, tracer: &mut Tracer<'_>) {
        let entries = self.entries.len();
        self.entries.clear();
        self.stats.clears += 1;
        tracing::debug!(entries, "image cache cleared");
        tracer.cache_clear(&CacheClearEvent { entries });
    }

    /// Whether an entry exists for this exact key. Factors are compared as
    /// given, without snapping.
    #[must_use]
    pub fn contains(&self, source: &str, hscale: f32, vscale: f32) -> bool {
        self.entries.contains_key(&KeyRef {
            source,
            hscale: hscale.to_bits(),
            vscale: vscale.to_bits(),
        })
    }

    /// Number of cached images.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lookup counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Configuration.
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// The image source.
    #[must_use]
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Mutable access to the image source. Cached entries are not
    /// invalidated; call [`clear`](Self::clear) after changing what a source
    /// identifier resolves to.
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "rounded and clamped to 1..=u32::MAX first"
)]
fn scaled_extent(native: u32, factor: f32) -> u32 {
    let scaled = libm::round(f64::from(native) * f64::from(factor));
    scaled.clamp(1.0, f64::from(u32::MAX)) as u32
}

// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Image cache memoization against the counting source.

use std::sync::Arc;

use scanout_core::cache::{CacheConfig, ImageCache};
use scanout_core::error::DecodeError;
use scanout_core::format::PixelFormat;
use scanout_core::trace::{CacheLookupEvent, CacheOutcome, TraceSink, Tracer};
use scanout_harness::MockSource;

fn source() -> MockSource {
    let source = MockSource::new();
    source.insert_solid("logo", 100, 50, PixelFormat::Argb8888, &[0, 0, 255, 255]);
    source.insert_solid("tile", 10, 6, PixelFormat::Rgb565, &[0x1f, 0x00]);
    source
}

#[test]
fn repeated_lookup_returns_same_image() {
    let source = source();
    let mut cache = ImageCache::new(source.clone());

    let a = cache.get("logo", 0.5, 0.5, false).unwrap();
    let b = cache.get("logo", 0.5, 0.5, false).unwrap();

    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!((a.width(), a.height()), (50, 25));
    assert_eq!(source.decodes(), 1);
    assert_eq!(source.scales(), 1);
    assert_eq!(cache.stats().hits, 1);
}

#[test]
fn approximate_factors_share_an_entry() {
    let source = source();
    let mut cache = ImageCache::new(source.clone());

    let a = cache.get("logo", 0.501, 0.501, true).unwrap();
    let b = cache.get("logo", 0.5, 0.5, true).unwrap();

    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(cache.len(), 1);
    assert_eq!(source.decodes(), 1);
}

#[test]
fn exact_factors_do_not_merge() {
    let source = source();
    let mut cache = ImageCache::new(source.clone());

    let a = cache.get("logo", 0.501, 0.501, false).unwrap();
    let b = cache.get("logo", 0.5, 0.5, false).unwrap();

    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(cache.len(), 2);
    assert_eq!(source.decodes(), 2);
}

#[test]
fn coarser_step_merges_more() {
    let source = source();
    let mut cache = ImageCache::with_config(source.clone(), CacheConfig::new().with_step(0.25));

    let a = cache.get("logo", 0.45, 0.55, true).unwrap();
    let b = cache.get("logo", 0.5, 0.5, true).unwrap();

    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(source.decodes(), 1);
}

#[test]
fn clear_forces_fresh_decode() {
    let source = source();
    let mut cache = ImageCache::new(source.clone());
    let before = cache.get("tile", 2.0, 2.0, false).unwrap();

    cache.clear();
    assert!(cache.is_empty());
    let after = cache.get("tile", 2.0, 2.0, false).unwrap();

    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(source.decodes(), 2);
    // Images handed out before the clear stay valid.
    assert_eq!(before.width(), 20);
}

#[test]
fn failures_are_not_cached() {
    let source = source();
    let mut cache = ImageCache::new(source.clone());

    source.fail_decodes(1);
    assert!(matches!(
        cache.get("logo", 1.0, 1.0, false),
        Err(DecodeError::Malformed { .. })
    ));
    assert!(cache.is_empty());

    assert!(cache.get("logo", 1.0, 1.0, false).is_ok());
    assert_eq!(source.decodes(), 2);
    assert_eq!(cache.stats().failures, 1);
}

#[test]
fn missing_source_succeeds_once_registered() {
    let source = source();
    let mut cache = ImageCache::new(source.clone());

    assert!(matches!(
        cache.get("late", 1.0, 1.0, false),
        Err(DecodeError::NotFound(ref id)) if id == "late"
    ));
    source.insert_solid("late", 4, 4, PixelFormat::Rgb565, &[0, 0]);
    assert!(cache.get("late", 1.0, 1.0, false).is_ok());
}

#[test]
fn corrupt_source_reports_malformed() {
    let source = source();
    source.insert_corrupt("broken");
    let mut cache = ImageCache::new(source.clone());
    assert!(matches!(
        cache.get("broken", 1.0, 1.0, false),
        Err(DecodeError::Malformed { ref id, .. }) if id == "broken"
    ));
}

#[test]
fn unit_scale_skips_resampling() {
    let source = source();
    let mut cache = ImageCache::new(source.clone());
    let image = cache.get("tile", 1.0, 1.0, false).unwrap();
    assert_eq!((image.width(), image.height()), (10, 6));
    assert_eq!(source.scales(), 0);
}

#[test]
fn scaled_extents_round_half_away_from_zero() {
    let source = source();
    let mut cache = ImageCache::new(source.clone());

    cache.get("tile", 0.25, 0.25, false).unwrap();
    cache.get("logo", 0.001, 0.001, false).unwrap();

    assert_eq!(source.scaled_to(), [(3, 2), (1, 1)]);
}

#[test]
fn invalid_scales_are_rejected_without_decoding() {
    let source = source();
    let mut cache = ImageCache::new(source.clone());

    for (h, v) in [(0.0, 1.0), (1.0, -2.0), (f32::NAN, 1.0), (1.0, f32::INFINITY)] {
        assert!(matches!(
            cache.get("logo", h, v, false),
            Err(DecodeError::InvalidScale { .. })
        ));
    }
    // Snaps to zero.
    assert!(matches!(
        cache.get("logo", 0.004, 1.0, true),
        Err(DecodeError::InvalidScale { .. })
    ));
    assert_eq!(source.decodes(), 0);
}

#[derive(Default)]
struct Outcomes(Vec<CacheOutcome>);

impl TraceSink for Outcomes {
    fn on_cache_lookup(&mut self, e: &CacheLookupEvent<'_>) {
        self.0.push(e.outcome);
    }
}

#[test]
fn traced_lookups_report_outcomes() {
    let source = source();
    let mut cache = ImageCache::new(source);
    let mut outcomes = Outcomes::default();
    let mut tracer = Tracer::new(&mut outcomes);

    let _ = cache.get_traced("logo", 1.0, 1.0, false, &mut tracer);
    let _ = cache.get_traced("logo", 1.0, 1.0, false, &mut tracer);
    let _ = cache.get_traced("nope", 1.0, 1.0, false, &mut tracer);
    drop(tracer);

    assert_eq!(
        outcomes.0,
        [CacheOutcome::Miss, CacheOutcome::Hit, CacheOutcome::Failed]
    );
}

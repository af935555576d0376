// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! PNG and JPEG [`ImageSource`] for the scanout image cache.
//!
//! [`FileSource`] resolves image identifiers to encoded bytes, decodes them
//! with the [`image`] crate and converts the result to premultiplied
//! [`Argb8888`](PixelFormat::Argb8888), the format overlay planes blend.
//!
//! Identifiers take one of three forms:
//!
//! - `res:NAME` names bytes registered with [`FileSource::insert_resource`].
//! - `file:PATH` names a file.
//! - anything else is a file path.
//!
//! Relative paths resolve against [`FileSource::with_root`] when set.
//!
//! ```no_run
//! use scanout_core::cache::ImageCache;
//! use scanout_image::FileSource;
//!
//! let mut cache = ImageCache::new(FileSource::new().with_root("/usr/share/ui"));
//! let icon = cache.get("icons/battery.png", 0.5, 0.5, true)?;
//! # Ok::<(), scanout_core::error::DecodeError>(())
//! ```
//!
//! [`ImageSource`]: scanout_core::cache::ImageSource
//! [`PixelFormat::Argb8888`]: scanout_core::format::PixelFormat::Argb8888

mod pixel;
mod source;

pub use image::imageops::FilterType;
pub use pixel::{Bgra, premultiply};
pub use source::FileSource;

#[doc(no_inline)]
pub use scanout_core::format::PixelFormat;

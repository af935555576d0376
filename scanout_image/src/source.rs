// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use image::ImageError;
use image::imageops::{self, FilterType};
use scanout_core::cache::{Image, ImageSource};
use scanout_core::error::DecodeError;
use scanout_core::format::PixelFormat;
use scanout_core::surface::{Surface, SurfaceDesc};

use crate::pixel;

const RESOURCE_PREFIX: &str = "res:";
const FILE_PREFIX: &str = "file:";

/// Decodes PNG and JPEG images from files and registered in-memory
/// resources.
pub struct FileSource {
    root: Option<PathBuf>,
    resources: HashMap<String, Vec<u8>>,
    filter: FilterType,
}

impl fmt::Debug for FileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSource")
            .field("root", &self.root)
            .field("resources", &self.resources.len())
            .field("filter", &self.filter)
            .finish()
    }
}

impl Default for FileSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSource {
    /// A source with no root, no resources and a triangle filter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: None,
            resources: HashMap::new(),
            filter: FilterType::Triangle,
        }
    }

    /// Resolves relative paths against `root`.
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Uses `filter` when rescaling.
    #[must_use]
    pub fn with_filter(mut self, filter: FilterType) -> Self {
        self.filter = filter;
        self
    }

    /// Registers encoded image bytes under `res:NAME`, replacing any earlier
    /// resource of that name.
    pub fn insert_resource(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        self.resources.insert(name.into(), bytes);
    }

    /// Unregisters a resource. Returns whether it existed.
    pub fn remove_resource(&mut self, name: &str) -> bool {
        self.resources.remove(name).is_some()
    }

    /// The path a non-resource identifier resolves to.
    #[must_use]
    pub fn resolve(&self, id: &str) -> PathBuf {
        let path = Path::new(id.strip_prefix(FILE_PREFIX).unwrap_or(id));
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }

    fn load(&self, id: &str) -> Result<Vec<u8>, DecodeError> {
        if let Some(name) = id.strip_prefix(RESOURCE_PREFIX) {
            return self
                .resources
                .get(name)
                .cloned()
                .ok_or_else(|| DecodeError::NotFound(id.to_owned()));
        }
        let path = self.resolve(id);
        std::fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => DecodeError::NotFound(id.to_owned()),
            _ => DecodeError::Malformed {
                id: id.to_owned(),
                reason: e.to_string(),
            },
        })
    }
}

fn decode_error(id: &str, error: ImageError) -> DecodeError {
    match error {
        ImageError::Unsupported(_) => DecodeError::Unsupported(id.to_owned()),
        other => DecodeError::Malformed {
            id: id.to_owned(),
            reason: other.to_string(),
        },
    }
}

impl ImageSource for FileSource {
    fn decode(&mut self, id: &str) -> Result<Image, DecodeError> {
        let bytes = self.load(id)?;
        let decoded = image::load_from_memory(&bytes).map_err(|e| decode_error(id, e))?;
        let surface = pixel::to_argb(&decoded.to_rgba8()).map_err(|e| DecodeError::Malformed {
            id: id.to_owned(),
            reason: e.to_string(),
        })?;
        tracing::debug!(
            id,
            width = surface.width(),
            height = surface.height(),
            "image decoded"
        );
        Ok(surface)
    }

    fn scale(
        &mut self,
        id: &str,
        image: &Image,
        width: u32,
        height: u32,
    ) -> Result<Image, DecodeError> {
        let failed = || DecodeError::Scale {
            id: id.to_owned(),
            width,
            height,
        };
        if image.format() != PixelFormat::Argb8888 || width == 0 || height == 0 {
            return Err(failed());
        }
        let buffer = pixel::to_buffer(image).ok_or_else(failed)?;
        let resized = imageops::resize(&buffer, width, height, self.filter);
        let desc = SurfaceDesc::new(width, height, PixelFormat::Argb8888);
        Surface::new(desc, resized.into_raw()).map_err(|_| failed())
    }
}

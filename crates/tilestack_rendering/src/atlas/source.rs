//! Texture loading.
//!
//! A [`TextureSource`] returns decoded RGBA images in enumeration order.
//! The atlas registry matches each image's name against the tile registry.

use std::path::{Path, PathBuf};

use crate::error::{AtlasError, AtlasResult};

/// A decoded RGBA8 texture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureImage {
    /// File stem; matched against tile names.
    pub name: String,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Tightly packed RGBA8 rows.
    pub rgba: Vec<u8>,
}

impl TextureImage {
    /// A single-colour texture.
    #[must_use]
    pub fn solid(name: impl Into<String>, width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = (width as usize) * (height as usize);
        Self {
            name: name.into(),
            width,
            height,
            rgba: rgba.repeat(pixels),
        }
    }

    /// `(width, height)`.
    #[must_use]
    pub const fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Produces tile textures in a stable order.
pub trait TextureSource {
    /// Loads every texture.
    ///
    /// # Errors
    ///
    /// Returns an [`AtlasError`] if the source cannot be read or decoded.
    fn load_textures(&self) -> AtlasResult<Vec<TextureImage>>;

    /// Where the textures come from, for diagnostics.
    fn location(&self) -> PathBuf;
}

/// Loads `*.png` files from a directory, sorted by file name.
#[derive(Debug, Clone)]
pub struct DirectoryTextureSource {
    dir: PathBuf,
}

impl DirectoryTextureSource {
    /// Creates a source for `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn texture_paths(&self) -> AtlasResult<Vec<PathBuf>> {
        let io_error = |source| AtlasError::Io { path: self.dir.clone(), source };
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(&self.dir).map_err(io_error)? {
            let path = entry.map_err(io_error)?.path();
            if is_png(&path) {
                paths.push(path);
            }
        }
        paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(paths)
    }
}

fn is_png(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
}

impl TextureSource for DirectoryTextureSource {
    fn load_textures(&self) -> AtlasResult<Vec<TextureImage>> {
        let mut textures = Vec::new();
        for path in self.texture_paths()? {
            let decoded = image::open(&path)
                .map_err(|source| AtlasError::Image { path: path.clone(), source })?
                .to_rgba8();
            let name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
            tracing::trace!(texture = %name, width = decoded.width(), height = decoded.height(), "Loaded texture");
            textures.push(TextureImage {
                name,
                width: decoded.width(),
                height: decoded.height(),
                rgba: decoded.into_raw(),
            });
        }
        Ok(textures)
    }

    fn location(&self) -> PathBuf {
        self.dir.clone()
    }
}

/// In-memory textures, returned in insertion order.
#[derive(Debug, Clone, Default)]
pub struct MemoryTextureSource {
    images: Vec<TextureImage>,
}

impl MemoryTextureSource {
    /// Wraps a list of images.
    #[must_use]
    pub fn new(images: Vec<TextureImage>) -> Self {
        Self { images }
    }

    /// One solid 1x1 texture per name, coloured by position.
    #[must_use]
    pub fn solid_tiles<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let images = names
            .into_iter()
            .zip(1u8..)
            .map(|(name, i)| TextureImage::solid(name, 1, 1, [i.wrapping_mul(37), i.wrapping_mul(91), i, 255]))
            .collect();
        Self { images }
    }
}

impl TextureSource for MemoryTextureSource {
    fn load_textures(&self) -> AtlasResult<Vec<TextureImage>> {
        Ok(self.images.clone())
    }

    fn location(&self) -> PathBuf {
        PathBuf::from("<memory>")
    }
}

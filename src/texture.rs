//! Cover textures: decoded pixels on the CPU side, a GL texture object on the GPU side.
//!
//! Uploads and deletes go through the [`Gpu`] trait so the cache logic never
//! touches GL directly. [`GlGpu`] is the real implementation; it needs a GL
//! context current on the calling thread.

use std::path::Path;

use image::imageops::FilterType;
use image::{Rgba, RgbaImage};

/// Decoded image: raw RGBA pixels ready for GL upload.
pub struct DecodedImage {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl DecodedImage {
    /// Decode an image file to RGBA, downscaled so neither side exceeds `max_size`.
    /// Returns None on failure.
    pub fn from_file(path: &Path, max_size: u32) -> Option<Self> {
        let img = match image::open(path) {
            Ok(img) => img,
            Err(e) => {
                tracing::debug!("decode: {}: {}", path.display(), e);
                return None;
            }
        };
        let max_size = max_size.max(1);
        let img = if img.width() > max_size || img.height() > max_size {
            img.resize(max_size, max_size, FilterType::Triangle)
        } else {
            img
        };
        Some(Self::from_rgba(img.into_rgba8()))
    }

    pub fn from_rgba(img: RgbaImage) -> Self {
        let (width, height) = img.dimensions();
        DecodedImage {
            rgba: img.into_raw(),
            width,
            height,
        }
    }
}

/// Info about an uploaded GL texture.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TexInfo {
    pub gl_id: u32,
    pub width: u32,
    pub height: u32,
}

/// Creates and destroys GPU texture objects.
///
/// Implementations are called with a GL context current on the calling thread.
pub trait Gpu: Send + Sync {
    fn upload(&self, img: &DecodedImage) -> u32;
    fn delete(&self, gl_id: u32);
}

/// OpenGL backend. Function pointers must be loaded with `gl::load_with` first.
pub struct GlGpu;

impl Gpu for GlGpu {
    fn upload(&self, img: &DecodedImage) -> u32 {
        unsafe {
            let mut tex = 0u32;
            gl::GenTextures(1, &mut tex);
            gl::BindTexture(gl::TEXTURE_2D, tex);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MIN_FILTER, gl::LINEAR as i32);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MAG_FILTER, gl::LINEAR as i32);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_WRAP_S, gl::CLAMP_TO_EDGE as i32);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_WRAP_T, gl::CLAMP_TO_EDGE as i32);
            gl::PixelStorei(gl::UNPACK_ALIGNMENT, 1);
            gl::TexImage2D(
                gl::TEXTURE_2D,
                0,
                gl::RGBA8 as i32,
                img.width as i32,
                img.height as i32,
                0,
                gl::RGBA,
                gl::UNSIGNED_BYTE,
                img.rgba.as_ptr() as *const _,
            );
            gl::BindTexture(gl::TEXTURE_2D, 0);
            // Objects created here are read by the other context; make sure the
            // upload has landed before the id is published.
            gl::Finish();
            tex
        }
    }

    fn delete(&self, gl_id: u32) {
        unsafe {
            gl::DeleteTextures(1, &gl_id);
        }
    }
}

/// One cover: CPU pixels until uploaded, then a GL texture object.
///
/// `delete` is idempotent and a no-op if the texture was never uploaded.
pub struct CoverTexture {
    pixels: Option<DecodedImage>,
    gl_id: Option<u32>,
    width: u32,
    height: u32,
}

impl CoverTexture {
    pub fn from_image(img: DecodedImage) -> Self {
        CoverTexture {
            width: img.width,
            height: img.height,
            pixels: Some(img),
            gl_id: None,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_uploaded(&self) -> bool {
        self.gl_id.is_some()
    }

    /// GL texture info, once uploaded.
    pub fn info(&self) -> Option<TexInfo> {
        self.gl_id.map(|gl_id| TexInfo {
            gl_id,
            width: self.width,
            height: self.height,
        })
    }

    /// Upload the pixels if that has not happened yet. Returns true if a GL call was made.
    pub fn upload(&mut self, gpu: &dyn Gpu) -> bool {
        match self.take_pixels() {
            Some(pixels) => {
                self.attach(gpu.upload(&pixels));
                true
            }
            None => false,
        }
    }

    /// Take the pending pixels out, for an upload done without holding the owner's lock.
    pub(crate) fn take_pixels(&mut self) -> Option<DecodedImage> {
        if self.gl_id.is_some() {
            return None;
        }
        self.pixels.take()
    }

    pub(crate) fn attach(&mut self, gl_id: u32) {
        self.gl_id = Some(gl_id);
        self.pixels = None;
    }

    pub fn delete(&mut self, gpu: &dyn Gpu) {
        if let Some(id) = self.gl_id.take() {
            gpu.delete(id);
        }
        self.pixels = None;
    }

    /// Drop the GL id without deleting it, when no context can be made current any more.
    pub fn forget(&mut self) -> Option<u32> {
        self.pixels = None;
        self.gl_id.take()
    }
}

impl Drop for CoverTexture {
    fn drop(&mut self) {
        if let Some(id) = self.gl_id {
            tracing::warn!("texture: GL texture {} dropped without delete", id);
        }
    }
}

// ── Placeholders ────────────────────────────────────────────────────────

/// Which sentinel texture to build.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placeholder {
    Loading,
    NoCover,
}

const PLACEHOLDER_SIZE: u32 = 128;

impl Placeholder {
    /// Decode the override at `path`, or build the built-in image.
    ///
    /// Trailing spaces are stripped; an empty path or an undecodable file
    /// falls back to the built-in image.
    pub fn load(self, path: &str, max_size: u32) -> DecodedImage {
        let path = path.trim_end_matches(' ');
        if !path.is_empty() {
            if let Some(img) = DecodedImage::from_file(Path::new(path), max_size) {
                return img;
            }
            tracing::warn!("texloader: cannot load {:?} image {}, using built-in", self, path);
        }
        self.builtin()
    }

    pub fn builtin(self) -> DecodedImage {
        let n = PLACEHOLDER_SIZE;
        let img = match self {
            Placeholder::Loading => RgbaImage::from_pixel(n, n, Rgba([96, 96, 96, 255])),
            Placeholder::NoCover => RgbaImage::from_fn(n, n, |x, y| {
                let on_cross = x.abs_diff(y) < 3 || (x + y).abs_diff(n - 1) < 3;
                let on_border = x < 3 || y < 3 || x >= n - 3 || y >= n - 3;
                if on_cross || on_border {
                    Rgba([140, 140, 140, 255])
                } else {
                    Rgba([48, 48, 48, 255])
                }
            }),
        };
        DecodedImage::from_rgba(img)
    }
}

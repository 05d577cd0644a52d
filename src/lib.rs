//! Asynchronous, capacity-bounded cover texture cache.
//!
//! A single background worker walks outward from a moving center position,
//! decodes covers and uploads them through a second GL context that shares
//! its object namespace with the render context. The render thread only ever
//! reads the cache and destroys evicted textures.
//!
//! Flow:
//!   1. `TexLoader::set_center(pos)` → worker restarts its spiral scan
//!   2. worker decodes `pos`, `pos+1`, `pos-1`, … → uploads (or queues the upload)
//!   3. `TexLoader::get_texture(pos)` → real texture, or a placeholder
//!   4. `TexLoader::run_gl_delete()` (render thread) → destroys evicted textures

pub mod cache;
pub mod collection;
pub mod config;
pub mod context;
pub mod error;
pub mod loader;
pub mod priority;
pub mod queues;
pub mod signal;
pub mod spiral;
pub mod texture;
mod worker;

#[cfg(test)]
mod testutil;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use cache::{Lookup, TextureCache};
pub use collection::{CollectionPos, CoverCollection, DirCollection};
pub use config::LoaderConfig;
pub use context::{GlContext, SdlLoaderContext};
pub use error::{ConfigError, ContextError, InitError};
pub use loader::{LoaderStats, StatsSnapshot, TexLoader};
pub use priority::ThreadPriority;
pub use texture::{CoverTexture, DecodedImage, GlGpu, Gpu, TexInfo};

/// Lock a mutex, recovering the data if another thread panicked while holding it.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

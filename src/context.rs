//! The loader's own GL context.
//!
//! Uploads and deletes need a context current on the calling thread, and the
//! textures they create must be visible to the render context. The loader
//! therefore owns a second context created against the same window and
//! sharing its object namespace with the primary one. The context sits behind
//! a mutex, so only one thread at a time can have it current.

use std::sync::{Mutex, MutexGuard};

use crate::error::{ContextError, InitError};
use crate::lock;

/// A GL context that can be made current on whichever thread reserves it.
pub trait GlContext: Send {
    fn make_current(&self) -> Result<(), ContextError>;

    /// Leave no context current on the calling thread.
    fn release(&self) -> Result<(), ContextError>;
}

/// Holds the context current on this thread until dropped.
pub(crate) struct ContextGuard<'a> {
    ctx: MutexGuard<'a, Box<dyn GlContext>>,
    current: bool,
}

impl ContextGuard<'_> {
    /// Whether make-current succeeded. GL calls are best-effort when it did not.
    pub(crate) fn is_current(&self) -> bool {
        self.current
    }
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        if self.current {
            if let Err(e) = self.ctx.release() {
                tracing::debug!("texloader: {}", e);
            }
        }
    }
}

/// Reserve the context: lock it against other threads and make it current here.
pub(crate) fn reserve(ctx: &Mutex<Box<dyn GlContext>>) -> ContextGuard<'_> {
    let ctx = lock(ctx);
    let current = match ctx.make_current() {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!("texloader: {}", e);
            false
        }
    };
    ContextGuard { ctx, current }
}

// ── SDL2 ────────────────────────────────────────────────────────────────

/// Loader context created by SDL2 next to the window's primary context.
///
/// Raw pointers are stored as `usize` for `Send`; the `sdl2::video::GLContext`
/// that owns the context stays with the caller, which must keep it alive
/// (together with the window) for as long as the loader exists.
pub struct SdlLoaderContext {
    window: usize,
    ctx: usize,
}

impl SdlLoaderContext {
    /// Create a context sharing objects with `primary`.
    ///
    /// Leaves `primary` current on the calling thread.
    pub fn create_shared(
        window: &sdl2::video::Window,
        primary: &sdl2::video::GLContext,
    ) -> Result<(Self, sdl2::video::GLContext), InitError> {
        window
            .gl_make_current(primary)
            .map_err(InitError::Context)?;
        // SDL shares with whatever context is current when the new one is created.
        let rc = unsafe {
            sdl2_sys::SDL_GL_SetAttribute(sdl2_sys::SDL_GLattr::SDL_GL_SHARE_WITH_CURRENT_CONTEXT, 1)
        };
        if rc != 0 {
            return Err(InitError::ShareContext(sdl2::get_error()));
        }
        let loader_ctx = window.gl_create_context().map_err(InitError::Context)?;

        // gl_create_context leaves the new context current; grab its raw ptr.
        window
            .gl_make_current(&loader_ctx)
            .map_err(InitError::Context)?;
        let raw = unsafe { sdl2_sys::SDL_GL_GetCurrentContext() };
        window
            .gl_make_current(primary)
            .map_err(InitError::Context)?;
        if raw.is_null() {
            return Err(InitError::ShareContext(sdl2::get_error()));
        }

        let ctx = SdlLoaderContext {
            window: window.raw() as usize,
            ctx: raw as usize,
        };
        Ok((ctx, loader_ctx))
    }
}

impl GlContext for SdlLoaderContext {
    fn make_current(&self) -> Result<(), ContextError> {
        let win = self.window as *mut sdl2_sys::SDL_Window;
        let ctx = self.ctx as sdl2_sys::SDL_GLContext;
        match unsafe { sdl2_sys::SDL_GL_MakeCurrent(win, ctx) } {
            0 => Ok(()),
            _ => Err(ContextError::MakeCurrent(sdl2::get_error())),
        }
    }

    fn release(&self) -> Result<(), ContextError> {
        let win = self.window as *mut sdl2_sys::SDL_Window;
        match unsafe { sdl2_sys::SDL_GL_MakeCurrent(win, std::ptr::null_mut()) } {
            0 => Ok(()),
            _ => Err(ContextError::Release(sdl2::get_error())),
        }
    }
}

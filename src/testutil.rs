//! Fakes shared by the unit tests: no GL, SDL or display needed.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::collection::CoverCollection;
use crate::context::GlContext;
use crate::error::ContextError;
use crate::texture::{CoverTexture, DecodedImage, Gpu};

pub fn pixels(w: u32, h: u32) -> DecodedImage {
    DecodedImage {
        rgba: vec![0x80; (w * h * 4) as usize],
        width: w,
        height: h,
    }
}

pub fn uploaded(gpu: &dyn Gpu) -> CoverTexture {
    let mut tex = CoverTexture::from_image(pixels(1, 1));
    tex.upload(gpu);
    tex
}

/// Poll `cond` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(2));
    }
}

/// Hands out fake texture ids and remembers which are still alive.
#[derive(Default)]
pub struct RecordingGpu {
    next_id: AtomicU32,
    uploads: AtomicUsize,
    deletes: AtomicUsize,
    live: Mutex<HashSet<u32>>,
}

impl RecordingGpu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> HashSet<u32> {
        self.live.lock().unwrap().clone()
    }
}

impl Gpu for RecordingGpu {
    fn upload(&self, _img: &DecodedImage) -> u32 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.uploads.fetch_add(1, Ordering::SeqCst);
        self.live.lock().unwrap().insert(id);
        id
    }

    fn delete(&self, gl_id: u32) {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        assert!(
            self.live.lock().unwrap().remove(&gl_id),
            "texture {} deleted twice or never created",
            gl_id
        );
    }
}

/// A context that records reservations and can be told to fail.
#[derive(Clone, Default)]
pub struct FakeContext {
    inner: Arc<FakeContextInner>,
}

#[derive(Default)]
struct FakeContextInner {
    current: AtomicBool,
    broken: AtomicBool,
    reservations: AtomicUsize,
    releases: AtomicUsize,
}

impl FakeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_broken(&self, broken: bool) {
        self.inner.broken.store(broken, Ordering::SeqCst);
    }

    pub fn is_current(&self) -> bool {
        self.inner.current.load(Ordering::SeqCst)
    }

    pub fn reservations(&self) -> usize {
        self.inner.reservations.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.inner.releases.load(Ordering::SeqCst)
    }
}

impl GlContext for FakeContext {
    fn make_current(&self) -> Result<(), ContextError> {
        if self.inner.broken.load(Ordering::SeqCst) {
            return Err(ContextError::MakeCurrent("window is gone".into()));
        }
        let was = self.inner.current.swap(true, Ordering::SeqCst);
        assert!(!was, "context made current twice");
        self.inner.reservations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn release(&self) -> Result<(), ContextError> {
        self.inner.current.store(false, Ordering::SeqCst);
        self.inner.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// `count` positions; every rank divisible by `no_cover_every` has no cover.
pub struct FakeCollection {
    count: AtomicUsize,
    generation: AtomicU64,
    no_cover_every: usize,
    decode_delay: Duration,
    decoded: Mutex<Vec<usize>>,
}

impl FakeCollection {
    pub fn new(count: usize) -> Self {
        FakeCollection {
            count: AtomicUsize::new(count),
            generation: AtomicU64::new(1),
            no_cover_every: 0,
            decode_delay: Duration::ZERO,
            decoded: Mutex::new(Vec::new()),
        }
    }

    pub fn with_no_cover_every(mut self, n: usize) -> Self {
        self.no_cover_every = n;
        self
    }

    pub fn with_decode_delay(mut self, d: Duration) -> Self {
        self.decode_delay = d;
        self
    }

    /// Ranks decoded so far, in order.
    pub fn decoded(&self) -> Vec<usize> {
        self.decoded.lock().unwrap().clone()
    }

    pub fn decode_count(&self) -> usize {
        self.decoded.lock().unwrap().len()
    }

    pub fn replace(&self, count: usize) {
        self.count.store(count, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

impl CoverCollection for FakeCollection {
    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    fn load_cover(&self, rank: usize, _max_size: u32) -> Option<DecodedImage> {
        if !self.decode_delay.is_zero() {
            thread::sleep(self.decode_delay);
        }
        self.decoded.lock().unwrap().push(rank);
        if self.no_cover_every > 0 && rank % self.no_cover_every == 0 {
            return None;
        }
        Some(pixels(2, 2))
    }
}

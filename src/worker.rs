//! The loader worker thread.
//!
//! Each iteration of the loop:
//!   1. stop if closing
//!   2. wait for the "may run" gate (pause / resume)
//!   3. drain the upload queue if uploads are allowed right now
//!   4. otherwise, if this pass has loaded enough, sleep until new work arrives
//!   5. otherwise load the next spiral position around the center
//!
//! A scan step runs under the `step` mutex so `clear_cache` never races it.

use std::sync::atomic::{AtomicBool, AtomicIsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::cache::{Evicted, Lookup, TextureCache};
use crate::collection::{CollectionPos, CoverCollection};
use crate::config::LoaderConfig;
use crate::context::{self, ContextGuard, GlContext};
use crate::loader::LoaderStats;
use crate::lock;
use crate::priority::{PrioritySwitch, ThreadPriority};
use crate::queues::{DeleteQueue, UploadQueue};
use crate::signal::{Reset, Signal, SignalHub};
use crate::spiral::Spiral;
use crate::texture::{CoverTexture, Gpu};

/// Loads since the last center move that still count as "near the center".
const NEAR_CENTER_LOADS: usize = 16;

/// Notification threshold right after a redraw.
const MIN_NOTIFY_THRESHOLD: usize = 10;

pub(crate) type RedrawFn = Box<dyn Fn() + Send + Sync>;

/// State shared between the controller and the worker thread.
pub(crate) struct Shared {
    pub(crate) collection: Arc<dyn CoverCollection>,
    pub(crate) gpu: Arc<dyn Gpu>,
    config: RwLock<Arc<LoaderConfig>>,
    pub(crate) cache: Mutex<TextureCache>,
    pub(crate) uploads: UploadQueue,
    pub(crate) deletes: DeleteQueue,
    /// The loader's GL context; holding the lock means owning the context.
    context: Mutex<Box<dyn GlContext>>,
    /// Held by the worker for one scan step, and by `clear_cache`.
    pub(crate) step: Mutex<()>,
    pub(crate) center: Mutex<Option<CollectionPos>>,
    pub(crate) center_moved: AtomicBool,
    visible_first: AtomicIsize,
    visible_last: AtomicIsize,
    pub(crate) closing: AtomicBool,
    pub(crate) idle: AtomicBool,
    /// Manual; reset while paused.
    pub(crate) may_run: Signal,
    /// Auto; center moved, cache cleared, or loading resumed.
    pub(crate) has_work: Signal,
    /// Manual; reset while the render thread wants the GPU to itself.
    pub(crate) may_upload: Signal,
    pub(crate) stats: LoaderStats,
    redraw: RedrawFn,
}

impl Shared {
    pub(crate) fn new(
        config: LoaderConfig,
        collection: Arc<dyn CoverCollection>,
        gpu: Arc<dyn Gpu>,
        context: Box<dyn GlContext>,
        redraw: RedrawFn,
    ) -> Self {
        let mut hub = SignalHub::new();
        // The loader starts paused; the view resumes it once it is ready.
        let may_run = hub.signal(Reset::Manual, false);
        let has_work = hub.signal(Reset::Auto, false);
        let may_upload = hub.signal(Reset::Manual, true);
        let freed = hub.signal(Reset::Auto, false);

        Shared {
            collection,
            gpu,
            cache: Mutex::new(TextureCache::new(config.cache_capacity)),
            uploads: UploadQueue::new(),
            deletes: DeleteQueue::new(config.delete_buffer_size, freed),
            config: RwLock::new(Arc::new(config)),
            context: Mutex::new(context),
            step: Mutex::new(()),
            center: Mutex::new(None),
            center_moved: AtomicBool::new(false),
            visible_first: AtomicIsize::new(0),
            visible_last: AtomicIsize::new(0),
            closing: AtomicBool::new(false),
            idle: AtomicBool::new(false),
            may_run,
            has_work,
            may_upload,
            stats: LoaderStats::default(),
            redraw,
        }
    }

    pub(crate) fn config(&self) -> Arc<LoaderConfig> {
        self.config
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub(crate) fn set_config(&self, config: LoaderConfig) {
        *self.config.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(config);
    }

    pub(crate) fn reserve_context(&self) -> ContextGuard<'_> {
        context::reserve(&self.context)
    }

    pub(crate) fn set_visible_range(&self, first: isize, last: isize) {
        self.visible_first.store(first, Ordering::Relaxed);
        self.visible_last.store(last, Ordering::Relaxed);
    }

    fn is_on_screen(&self, offset: isize) -> bool {
        offset >= self.visible_first.load(Ordering::Relaxed)
            && offset <= self.visible_last.load(Ordering::Relaxed)
    }

    /// Load one position. Returns true if something new entered the cache.
    ///
    /// Entries pushed out of the cache are appended to `evicted`; the caller
    /// queues them for deletion once the context is released.
    pub(crate) fn load_position(
        &self,
        rank: usize,
        do_upload: bool,
        evicted: &mut Vec<Evicted>,
    ) -> bool {
        let owes_upload = {
            let mut cache = lock(&self.cache);
            if cache.touch(rank) {
                Some(cache.lookup(rank) == Lookup::Pending)
            } else {
                None
            }
        };
        if let Some(owes_upload) = owes_upload {
            // decoded earlier, but the upload may have been blocked back then
            if do_upload && owes_upload {
                let ctx = self.reserve_context();
                if ctx.is_current() {
                    self.upload_cached(rank);
                }
            }
            return false;
        }

        let max_size = self.config().max_texture_size;
        let image = self.collection.load_cover(rank, max_size);
        self.stats.decoded.fetch_add(1, Ordering::Relaxed);
        tracing::trace!("texloader: decoded {} (cover: {})", rank, image.is_some());

        let mut texture = image.map(CoverTexture::from_image);
        if let Some(tex) = texture.as_mut() {
            let mut uploaded = false;
            if do_upload {
                let ctx = self.reserve_context();
                if ctx.is_current() {
                    uploaded = tex.upload(&*self.gpu);
                }
            }
            if uploaded {
                self.stats.uploaded.fetch_add(1, Ordering::Relaxed);
            } else {
                self.uploads.push(rank);
            }
        }

        lock(&self.cache).insert_or_touch(rank, texture, evicted);
        true
    }

    /// Upload a cached entry that still owes its upload. Needs the context reserved.
    ///
    /// The cache lock is not held during the GL call.
    fn upload_cached(&self, rank: usize) -> bool {
        let Some(pixels) = lock(&self.cache).begin_upload(rank) else {
            return false;
        };
        let id = self.gpu.upload(&pixels);
        if let Err(id) = lock(&self.cache).finish_upload(rank, id) {
            self.gpu.delete(id);
            return false;
        }
        self.stats.uploaded.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Upload queued ranks front to back while uploads stay allowed.
    ///
    /// Ranks that left the cache since they were queued are skipped.
    /// None if the context could not be made current; the queue is untouched.
    pub(crate) fn drain_uploads(&self) -> Option<usize> {
        let ctx = self.reserve_context();
        if !ctx.is_current() {
            return None;
        }
        let mut n = 0;
        while self.may_upload.poll() {
            let Some(rank) = self.uploads.pop() else {
                break;
            };
            if self.upload_cached(rank) {
                n += 1;
            }
        }
        Some(n)
    }

    /// Queue evicted textures for destruction. Blocks while the delete buffer is full.
    pub(crate) fn queue_deletes(&self, evicted: Vec<Evicted>) {
        for e in evicted {
            self.stats.evicted.fetch_add(1, Ordering::Relaxed);
            if let Some(tex) = e.texture {
                self.deletes.push(tex);
            }
        }
    }

    /// Destroy queued textures. Needs a GL context current on the calling thread.
    pub(crate) fn drain_deletes(&self) -> usize {
        let n = self.deletes.drain(&*self.gpu);
        self.stats.deleted.fetch_add(n as u64, Ordering::Relaxed);
        n
    }

    fn notify_redraw(&self) {
        self.stats.redraws.fetch_add(1, Ordering::Relaxed);
        (self.redraw)();
    }
}

// ── Scan state ──────────────────────────────────────────────────────────

/// Decides when a finished load is worth a redraw of the owning window.
///
/// Near the center every other load notifies, on-screen loads every fourth,
/// the first load of a pass always. Otherwise a counter has to reach a
/// threshold that grows with `load_count² / capacity`, so redraws thin out
/// as the scan moves away from what is visible.
struct NotifyThrottle {
    count: usize,
    threshold: usize,
}

impl NotifyThrottle {
    fn new() -> Self {
        NotifyThrottle {
            count: 0,
            threshold: MIN_NOTIFY_THRESHOLD,
        }
    }

    fn should_notify(
        &mut self,
        near_center: bool,
        on_screen: bool,
        load_count: usize,
        capacity: usize,
    ) -> bool {
        self.count += 1;
        let fire = load_count == 1
            || (near_center && self.count % 2 == 0)
            || (on_screen && self.count % 4 == 0)
            || self.count >= self.threshold;
        if fire {
            self.count = 0;
            self.threshold = (load_count * load_count / capacity.max(1)).max(MIN_NOTIFY_THRESHOLD);
        }
        fire
    }
}

struct Scan {
    spiral: Option<Spiral>,
    load_count: usize,
    throttle: NotifyThrottle,
    reported_done: bool,
}

impl Scan {
    fn new() -> Self {
        Scan {
            spiral: None,
            load_count: 0,
            throttle: NotifyThrottle::new(),
            reported_done: false,
        }
    }

    fn restart(&mut self, center: Option<CollectionPos>) {
        *self = Scan::new();
        self.spiral = center.map(|c| Spiral::new(c.rank()));
    }

    fn is_done(&self, budget: usize, count: usize) -> bool {
        match &self.spiral {
            None => true,
            Some(s) => s.is_exhausted() || self.load_count >= budget || self.load_count >= count,
        }
    }
}

// ── Thread body ─────────────────────────────────────────────────────────

pub(crate) fn run(shared: Arc<Shared>) {
    let mut scan = Scan::new();
    let mut priority = PrioritySwitch::new();
    priority.apply(shared.config().priority);
    // Set when the context could not be made current. Uploads then stay
    // queued and the scan goes on decoding until new work arrives.
    let mut uploads_stalled = false;
    tracing::info!("texloader: worker started");

    while !shared.closing.load(Ordering::Acquire) {
        shared.may_run.wait();
        if shared.closing.load(Ordering::Acquire) {
            break;
        }

        if !uploads_stalled && !shared.uploads.is_empty() && shared.may_upload.poll() {
            let _step = lock(&shared.step);
            match shared.drain_uploads() {
                Some(n) => tracing::trace!("texloader: uploaded {} queued covers", n),
                None => {
                    tracing::debug!("texloader: context unavailable, uploads stay queued");
                    uploads_stalled = true;
                }
            }
            continue;
        }

        if shared.center_moved.swap(false, Ordering::AcqRel) {
            let center = *lock(&shared.center);
            tracing::debug!("texloader: scan restarts at {:?}", center.map(|c| c.rank()));
            scan.restart(center);
            shared.stats.restarts.fetch_add(1, Ordering::Relaxed);
        }

        let config = shared.config();
        let count = shared.collection.count();
        if scan.is_done(config.load_budget(), count) {
            if !scan.reported_done {
                scan.reported_done = true;
                tracing::debug!("texloader: pass done after {} loads", scan.load_count);
            }
            shared.idle.store(true, Ordering::Release);
            if uploads_stalled || shared.uploads.is_empty() {
                shared.has_work.wait();
            } else {
                shared.has_work.wait_either(&shared.may_upload);
            }
            shared.idle.store(false, Ordering::Release);
            uploads_stalled = false;
            continue;
        }

        let may_upload = !uploads_stalled && shared.may_upload.poll();
        scan_step(&shared, &mut scan, &mut priority, &config, count, may_upload);
    }

    tracing::info!("texloader: worker stopped");
}

fn scan_step(
    shared: &Shared,
    scan: &mut Scan,
    priority: &mut PrioritySwitch,
    config: &LoaderConfig,
    count: usize,
    do_upload: bool,
) {
    let _step = lock(&shared.step);
    // clear_cache or a center move landed while we waited for the lock
    if shared.center_moved.load(Ordering::Acquire) {
        return;
    }
    let Some(pick) = scan.spiral.as_mut().and_then(|s| s.next_pick(count)) else {
        return;
    };
    scan.load_count += 1;

    let on_screen = shared.is_on_screen(pick.offset);
    let near_center = scan.load_count < NEAR_CENTER_LOADS;
    priority.apply(if near_center {
        config.priority
    } else {
        ThreadPriority::Idle
    });

    let mut evicted = Vec::new();
    let loaded = shared.load_position(pick.rank, do_upload, &mut evicted);
    shared.queue_deletes(evicted);

    if loaded
        && scan
            .throttle
            .should_notify(near_center, on_screen, scan.load_count, config.cache_capacity)
    {
        tracing::trace!("texloader: redraw after {} loads", scan.load_count);
        shared.notify_redraw();
    }
}

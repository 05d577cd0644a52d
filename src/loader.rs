//! `TexLoader`: the render thread's handle on the background cover loader.
//!
//! The render thread owns the loader. It moves the center, asks for
//! textures every frame, and periodically destroys textures the worker
//! evicted. Everything else happens on the worker thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, MutexGuard, RwLock, TryLockError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::cache::{Evicted, Lookup};
use crate::collection::{CollectionPos, CoverCollection};
use crate::config::LoaderConfig;
use crate::context::GlContext;
use crate::error::{ConfigError, InitError};
use crate::lock;
use crate::texture::{CoverTexture, Gpu, Placeholder, TexInfo};
use crate::worker::{self, Shared};

/// Counters updated by the worker and the delete path.
#[derive(Debug, Default)]
pub struct LoaderStats {
    pub decoded: AtomicU64,
    pub uploaded: AtomicU64,
    pub evicted: AtomicU64,
    pub deleted: AtomicU64,
    pub redraws: AtomicU64,
    /// Scan passes started, one per center move, clear or reconfigure.
    pub restarts: AtomicU64,
}

impl LoaderStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            decoded: self.decoded.load(Ordering::Relaxed),
            uploaded: self.uploaded.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            deleted: self.deleted.load(Ordering::Relaxed),
            redraws: self.redraws.load(Ordering::Relaxed),
            restarts: self.restarts.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub decoded: u64,
    pub uploaded: u64,
    pub evicted: u64,
    pub deleted: u64,
    pub redraws: u64,
    pub restarts: u64,
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "decoded {}, uploaded {}, evicted {}, deleted {}, redraws {}, passes {}",
            self.decoded, self.uploaded, self.evicted, self.deleted, self.redraws, self.restarts
        )
    }
}

struct Placeholders {
    loading: CoverTexture,
    no_cover: CoverTexture,
}

impl Placeholders {
    /// Decode and upload both placeholders. Needs the loader context current.
    fn load(config: &LoaderConfig, gpu: &dyn Gpu) -> Self {
        let mut loading = CoverTexture::from_image(
            Placeholder::Loading.load(&config.loading_image, config.max_texture_size),
        );
        let mut no_cover = CoverTexture::from_image(
            Placeholder::NoCover.load(&config.no_cover_image, config.max_texture_size),
        );
        loading.upload(gpu);
        no_cover.upload(gpu);
        Placeholders { loading, no_cover }
    }

    fn delete(mut self, gpu: &dyn Gpu) {
        self.loading.delete(gpu);
        self.no_cover.delete(gpu);
    }

    fn forget(mut self) {
        self.loading.forget();
        self.no_cover.forget();
    }
}

pub struct TexLoader {
    shared: Arc<Shared>,
    placeholders: RwLock<Option<Placeholders>>,
    worker: Option<JoinHandle<()>>,
}

impl TexLoader {
    /// Start a loader over `collection`.
    ///
    /// `context` must be a context sharing objects with the render context;
    /// it is made current once here to upload the placeholders. `redraw` is
    /// called from the worker thread whenever the view should repaint.
    ///
    /// The loader starts paused; call [`resume_loading`](Self::resume_loading).
    pub fn new(
        config: LoaderConfig,
        collection: Arc<dyn CoverCollection>,
        context: Box<dyn GlContext>,
        gpu: Arc<dyn Gpu>,
        redraw: impl Fn() + Send + Sync + 'static,
    ) -> Result<Self, InitError> {
        config.validate()?;

        context.make_current()?;
        let placeholders = Placeholders::load(&config, &*gpu);
        if let Err(e) = context.release() {
            placeholders.delete(&*gpu);
            return Err(e.into());
        }

        tracing::info!(
            "texloader: capacity {}, delete buffer {}, {} positions",
            config.cache_capacity,
            config.delete_buffer_size,
            collection.count()
        );

        let shared = Arc::new(Shared::new(
            config,
            collection,
            gpu,
            context,
            Box::new(redraw),
        ));

        let worker_shared = shared.clone();
        let spawned = thread::Builder::new()
            .name("texloader".into())
            .spawn(move || worker::run(worker_shared));
        let worker = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                let ctx = shared.reserve_context();
                if ctx.is_current() {
                    placeholders.delete(&*shared.gpu);
                } else {
                    placeholders.forget();
                }
                return Err(InitError::Spawn(e));
            }
        };

        Ok(TexLoader {
            shared,
            placeholders: RwLock::new(Some(placeholders)),
            worker: Some(worker),
        })
    }

    // ── Scan control ────────────────────────────────────────────────────

    /// Move the scan center. A no-op if `pos` already is the center.
    pub fn set_center(&self, pos: CollectionPos) {
        {
            let mut center = lock(&self.shared.center);
            if *center == Some(pos) {
                return;
            }
            *center = Some(pos);
        }
        tracing::debug!("texloader: center -> {}", pos.rank());
        self.shared.center_moved.store(true, Ordering::Release);
        self.shared.has_work.set();
    }

    pub fn center(&self) -> Option<CollectionPos> {
        *lock(&self.shared.center)
    }

    /// Stop loading after the current position. Uploads already queued stay queued.
    pub fn pause_loading(&self) {
        self.shared.may_run.reset();
    }

    pub fn resume_loading(&self) {
        self.shared.has_work.set();
        self.shared.may_run.set();
    }

    /// Positions `first..=last`, relative to the center, are on screen.
    pub fn set_visible_range(&self, first: isize, last: isize) {
        self.shared.set_visible_range(first, last);
    }

    /// Let the worker upload again, draining what queued up meanwhile.
    pub fn allow_upload(&self) {
        self.shared.may_upload.set();
    }

    /// Keep the worker off the GPU, e.g. while the render thread is busy with
    /// an animation. Decoding continues; uploads queue up.
    pub fn block_upload(&self) {
        self.shared.may_upload.reset();
    }

    // ── Render thread ───────────────────────────────────────────────────

    /// Cache state at `pos`. Does not change recency.
    ///
    /// Positions from an older generation of the collection are never cached.
    pub fn lookup(&self, pos: CollectionPos) -> Lookup {
        if pos.generation() != self.shared.collection.generation() {
            return Lookup::Missing;
        }
        lock(&self.shared.cache).lookup(pos.rank())
    }

    /// The texture to draw at `pos`: the cover if it is on the GPU, the
    /// no-cover placeholder if it has none, the loading placeholder otherwise.
    pub fn get_texture(&self, pos: CollectionPos) -> TexInfo {
        match self.lookup(pos) {
            Lookup::Ready(info) => info,
            Lookup::NoCover => self.no_cover_texture(),
            Lookup::Missing | Lookup::Pending => self.loading_texture(),
        }
    }

    pub fn loading_texture(&self) -> TexInfo {
        self.placeholder_info(|p| &p.loading)
    }

    pub fn no_cover_texture(&self) -> TexInfo {
        self.placeholder_info(|p| &p.no_cover)
    }

    fn placeholder_info(&self, pick: impl Fn(&Placeholders) -> &CoverTexture) -> TexInfo {
        let guard = self.placeholders.read().unwrap_or_else(|e| e.into_inner());
        guard
            .as_ref()
            .and_then(|p| pick(p).info())
            .unwrap_or_default()
    }

    /// Destroy textures the worker evicted. Call with the render context
    /// current, e.g. once per frame. Returns how many were released.
    pub fn run_gl_delete(&self) -> usize {
        self.shared.drain_deletes()
    }

    /// Drop every cached cover and restart the scan from the center.
    pub fn clear_cache(&self) {
        let _step = self.lock_step();
        let cleared = lock(&self.shared.cache).clear();
        self.shared.uploads.clear();
        let n = cleared.len();
        self.destroy(cleared);
        self.shared.center_moved.store(true, Ordering::Release);
        self.shared.has_work.set();
        tracing::info!("texloader: cache cleared ({} entries)", n);
    }

    /// Apply a new configuration. Shrinking the capacity evicts right away;
    /// placeholders are reloaded. The delete buffer keeps its original size.
    pub fn reconfigure(&self, config: LoaderConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let _step = self.lock_step();

        let mut evicted = Vec::new();
        lock(&self.shared.cache).set_capacity(config.cache_capacity, &mut evicted);

        {
            let ctx = self.shared.reserve_context();
            if ctx.is_current() {
                let fresh = Placeholders::load(&config, &*self.shared.gpu);
                let mut slot = self.placeholders.write().unwrap_or_else(|e| e.into_inner());
                if let Some(old) = slot.replace(fresh) {
                    old.delete(&*self.shared.gpu);
                }
            } else {
                tracing::warn!("texloader: context unavailable, keeping old placeholders");
            }
        }
        if config.delete_buffer_size != self.shared.deletes.capacity() {
            tracing::debug!(
                "texloader: delete buffer stays at {}",
                self.shared.deletes.capacity()
            );
        }

        let n = evicted.len();
        self.destroy(evicted);
        tracing::info!(
            "texloader: reconfigured, capacity {} ({} evicted)",
            config.cache_capacity,
            n
        );
        self.shared.set_config(config);
        self.shared.center_moved.store(true, Ordering::Release);
        self.shared.has_work.set();
        Ok(())
    }

    // ── Diagnostics ─────────────────────────────────────────────────────

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// True while the worker sleeps with nothing left to load.
    pub fn is_idle(&self) -> bool {
        self.shared.idle.load(Ordering::Acquire)
    }

    pub fn config(&self) -> LoaderConfig {
        (*self.shared.config()).clone()
    }

    pub fn cache_len(&self) -> usize {
        lock(&self.shared.cache).len()
    }

    /// Cached ranks, most recently used first.
    pub fn cached_ranks(&self) -> Vec<usize> {
        lock(&self.shared.cache).ranks()
    }

    pub fn pending_uploads(&self) -> usize {
        self.shared.uploads.len()
    }

    pub fn pending_deletes(&self) -> usize {
        self.shared.deletes.len()
    }

    // ── Internals ───────────────────────────────────────────────────────

    /// Wait for the worker to finish its current step. While waiting, keep
    /// draining deletes: the worker may be blocked on a full delete buffer.
    fn lock_step(&self) -> MutexGuard<'_, ()> {
        loop {
            match self.shared.step.try_lock() {
                Ok(guard) => return guard,
                Err(TryLockError::Poisoned(e)) => return e.into_inner(),
                Err(TryLockError::WouldBlock) => {
                    self.relieve_deletes();
                    thread::sleep(Duration::from_millis(1));
                }
            }
        }
    }

    /// Empty the delete buffer on the loader context, or leak it if that
    /// context is gone.
    fn relieve_deletes(&self) {
        if self.shared.deletes.is_empty() {
            return;
        }
        let ctx = self.shared.reserve_context();
        if ctx.is_current() {
            self.shared.drain_deletes();
        } else {
            let leaked = self.shared.deletes.forget_all();
            tracing::warn!("texloader: context lost, leaking {} textures", leaked);
        }
    }

    /// Destroy textures removed from the cache on this thread.
    fn destroy(&self, evicted: Vec<Evicted>) {
        let ctx = self.shared.reserve_context();
        if ctx.is_current() {
            for e in evicted {
                self.shared.stats.evicted.fetch_add(1, Ordering::Relaxed);
                if let Some(tex) = e.texture {
                    let n = self.shared.deletes.push_or_drain(tex, &*self.shared.gpu);
                    self.shared.stats.deleted.fetch_add(n as u64, Ordering::Relaxed);
                }
            }
            self.shared.drain_deletes();
        } else {
            let mut leaked = self.shared.deletes.forget_all();
            for e in evicted {
                if let Some(mut tex) = e.texture {
                    leaked += usize::from(tex.forget().is_some());
                }
            }
            tracing::warn!("texloader: context lost, leaking {} textures", leaked);
        }
    }

    fn stop_worker(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        self.shared.closing.store(true, Ordering::Release);
        self.shared.may_run.set();
        self.shared.has_work.set();
        while !worker.is_finished() {
            self.relieve_deletes();
            thread::sleep(Duration::from_millis(1));
        }
        if worker.join().is_err() {
            tracing::error!("texloader: worker thread panicked");
        }
    }
}

impl Drop for TexLoader {
    fn drop(&mut self) {
        self.stop_worker();

        let cleared = lock(&self.shared.cache).clear();
        self.shared.uploads.clear();
        self.destroy(cleared);

        let placeholders = self
            .placeholders
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(p) = placeholders {
            let ctx = self.shared.reserve_context();
            if ctx.is_current() {
                p.delete(&*self.shared.gpu);
            } else {
                p.forget();
            }
        }
        tracing::info!("texloader: stopped ({})", self.stats());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{wait_until, FakeCollection, FakeContext, RecordingGpu};
    use std::sync::atomic::AtomicUsize;

    const WAIT: Duration = Duration::from_secs(5);

    struct Rig {
        loader: TexLoader,
        collection: Arc<FakeCollection>,
        gpu: Arc<RecordingGpu>,
        ctx: FakeContext,
        redraws: Arc<AtomicUsize>,
    }

    fn config(capacity: usize) -> LoaderConfig {
        LoaderConfig {
            cache_capacity: capacity,
            delete_buffer_size: 4,
            ..LoaderConfig::default()
        }
    }

    fn rig_with(collection: FakeCollection, config: LoaderConfig) -> Rig {
        let collection = Arc::new(collection);
        let gpu = Arc::new(RecordingGpu::new());
        let ctx = FakeContext::new();
        let redraws = Arc::new(AtomicUsize::new(0));
        let r = redraws.clone();
        let loader = TexLoader::new(
            config,
            collection.clone(),
            Box::new(ctx.clone()),
            gpu.clone(),
            move || {
                r.fetch_add(1, Ordering::SeqCst);
            },
        )
        .unwrap();
        Rig {
            loader,
            collection,
            gpu,
            ctx,
            redraws,
        }
    }

    fn rig(count: usize, capacity: usize) -> Rig {
        rig_with(FakeCollection::new(count), config(capacity))
    }

    fn pos(rank: usize) -> CollectionPos {
        CollectionPos::new(1, rank)
    }

    /// Wait until `n` covers were decoded and the worker went back to sleep.
    fn settle(rig: &Rig, n: usize) {
        assert!(
            wait_until(WAIT, || rig.collection.decode_count() == n && rig.loader.is_idle()),
            "expected {} decodes, got {:?}",
            n,
            rig.collection.decoded()
        );
    }

    #[test]
    fn starts_paused() {
        let rig = rig(20, 11);
        rig.loader.set_center(pos(10));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(rig.collection.decode_count(), 0);
        assert_eq!(rig.gpu.uploads(), 2, "only the placeholders");
        assert!(!rig.ctx.is_current());
    }

    #[test]
    fn loads_in_spiral_order_up_to_budget() {
        let rig = rig(20, 11);
        rig.loader.set_center(pos(10));
        rig.loader.resume_loading();
        settle(&rig, 8);
        assert_eq!(rig.collection.decoded(), vec![10, 11, 9, 12, 8, 13, 7, 14]);
        assert_eq!(rig.loader.cache_len(), 8);
        assert_eq!(rig.gpu.uploads(), 2 + 8);
        assert!(rig.redraws.load(Ordering::SeqCst) > 0);
        assert_eq!(rig.loader.stats().redraws as usize, rig.redraws.load(Ordering::SeqCst));
    }

    #[test]
    fn near_the_edge_the_other_side_continues() {
        let rig = rig(20, 11);
        rig.loader.set_center(pos(1));
        rig.loader.resume_loading();
        settle(&rig, 8);
        assert_eq!(rig.collection.decoded(), vec![1, 2, 0, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn small_collection_loads_everything_once() {
        let rig = rig(3, 150);
        rig.loader.set_center(pos(1));
        rig.loader.resume_loading();
        settle(&rig, 3);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(rig.collection.decoded(), vec![1, 2, 0]);
    }

    #[test]
    fn center_move_restarts_scan() {
        let rig = rig(50, 11);
        rig.loader.set_center(pos(5));
        rig.loader.resume_loading();
        settle(&rig, 8);
        rig.loader.set_center(pos(40));
        settle(&rig, 16);
        assert_eq!(
            rig.collection.decoded()[8..],
            [40, 41, 39, 42, 38, 43, 37, 44]
        );
    }

    #[test]
    fn same_center_is_a_no_op() {
        let rig = rig(50, 11);
        rig.loader.set_center(pos(5));
        rig.loader.resume_loading();
        settle(&rig, 8);
        let before = rig.loader.cached_ranks();
        rig.loader.set_center(pos(5));
        thread::sleep(Duration::from_millis(30));
        assert_eq!(rig.collection.decode_count(), 8);
        assert_eq!(rig.loader.cached_ranks(), before);
        assert_eq!(rig.loader.stats().restarts, 1);
    }

    #[test]
    fn replaced_collection_restarts_scan_at_same_rank() {
        let rig = rig(50, 11);
        rig.loader.set_center(pos(5));
        rig.loader.resume_loading();
        settle(&rig, 8);
        assert_eq!(rig.loader.stats().restarts, 1);

        rig.collection.replace(50);
        let fresh = CollectionPos::new(rig.collection.generation(), 5);
        assert_ne!(fresh, pos(5));
        rig.loader.set_center(fresh);
        assert!(wait_until(WAIT, || {
            rig.loader.stats().restarts == 2 && rig.loader.is_idle()
        }));
        assert_eq!(rig.loader.center(), Some(fresh));
        assert_eq!(rig.loader.lookup(pos(5)), Lookup::Missing, "old generation");
        assert!(matches!(rig.loader.lookup(fresh), Lookup::Ready(_)));
    }

    #[test]
    fn lost_context_does_not_stop_the_scan() {
        let rig = rig(20, 11);
        rig.ctx.set_broken(true);
        rig.loader.set_center(pos(10));
        rig.loader.resume_loading();
        settle(&rig, 8);
        assert_eq!(rig.loader.pending_uploads(), 8);
        assert_eq!(rig.gpu.uploads(), 2);
        assert_eq!(rig.loader.lookup(pos(10)), Lookup::Pending);

        // the next piece of work retries the queued uploads
        rig.ctx.set_broken(false);
        rig.loader.set_center(pos(11));
        settle(&rig, 9);
        assert!(wait_until(WAIT, || rig.gpu.uploads() == 2 + 9));
        assert_eq!(rig.loader.pending_uploads(), 0);
        assert!(matches!(rig.loader.lookup(pos(10)), Lookup::Ready(_)));
    }

    #[test]
    fn cached_positions_are_not_decoded_again() {
        let rig = rig(20, 11);
        rig.loader.set_center(pos(10));
        rig.loader.resume_loading();
        settle(&rig, 8);
        rig.loader.set_center(pos(11));
        settle(&rig, 9);
        assert_eq!(rig.collection.decoded()[8], 15);
        // the second pass touched everything it walked over
        assert_eq!(rig.loader.cached_ranks()[..2], [15, 8]);
    }

    #[test]
    fn pause_stops_after_current_position() {
        let rig = rig_with(
            FakeCollection::new(100).with_decode_delay(Duration::from_millis(10)),
            config(100),
        );
        rig.loader.set_center(pos(50));
        rig.loader.resume_loading();
        assert!(wait_until(WAIT, || rig.collection.decode_count() >= 3));
        rig.loader.pause_loading();
        thread::sleep(Duration::from_millis(50));
        let paused_at = rig.collection.decode_count();
        thread::sleep(Duration::from_millis(80));
        assert_eq!(rig.collection.decode_count(), paused_at);

        rig.loader.resume_loading();
        assert!(wait_until(WAIT, || rig.collection.decode_count() > paused_at));
    }

    #[test]
    fn get_texture_falls_back_to_placeholders() {
        let rig = rig_with(FakeCollection::new(20).with_no_cover_every(3), config(11));
        let loading = rig.loader.loading_texture();
        let no_cover = rig.loader.no_cover_texture();
        assert_ne!(loading.gl_id, 0);
        assert_ne!(no_cover.gl_id, 0);
        assert_ne!(loading, no_cover);
        assert_eq!(rig.loader.get_texture(pos(4)), loading);

        rig.loader.set_center(pos(4));
        rig.loader.resume_loading();
        settle(&rig, 8);
        assert_eq!(rig.loader.get_texture(pos(3)), no_cover);
        assert_eq!(rig.loader.lookup(pos(3)), Lookup::NoCover);
        let cover = rig.loader.get_texture(pos(4));
        assert_eq!((cover.width, cover.height), (2, 2));
        assert_ne!(cover.gl_id, loading.gl_id);
        assert_eq!(rig.loader.get_texture(pos(19)), loading);
        assert_eq!(rig.loader.get_texture(CollectionPos::new(7, 4)), loading, "stale generation");
        // no-cover positions never reach the GPU
        assert_eq!(rig.gpu.uploads(), 2 + 6);
    }

    #[test]
    fn blocked_uploads_queue_until_allowed() {
        let rig = rig(20, 11);
        rig.loader.block_upload();
        rig.loader.set_center(pos(10));
        rig.loader.resume_loading();
        settle(&rig, 8);
        assert_eq!(rig.gpu.uploads(), 2);
        assert_eq!(rig.loader.pending_uploads(), 8);
        assert_eq!(rig.loader.lookup(pos(10)), Lookup::Pending);
        assert_eq!(rig.loader.get_texture(pos(10)), rig.loader.loading_texture());

        rig.loader.allow_upload();
        assert!(wait_until(WAIT, || rig.gpu.uploads() == 2 + 8));
        assert!(wait_until(WAIT, || rig.loader.pending_uploads() == 0));
        assert!(matches!(rig.loader.lookup(pos(10)), Lookup::Ready(_)));
        assert_eq!(rig.collection.decode_count(), 8);
    }

    #[test]
    fn evicted_before_upload_still_released() {
        // capacity 3 loads one position per pass
        let rig = rig(20, 3);
        rig.loader.block_upload();
        rig.loader.resume_loading();
        for (i, c) in [0, 5, 10, 15].into_iter().enumerate() {
            rig.loader.set_center(pos(c));
            settle(&rig, i + 1);
        }
        assert_eq!(rig.loader.cached_ranks(), vec![15, 10, 5]);
        assert_eq!(rig.loader.stats().evicted, 1);
        assert_eq!(rig.loader.run_gl_delete(), 1);
        assert_eq!(rig.gpu.deletes(), 0);

        rig.loader.allow_upload();
        assert!(wait_until(WAIT, || rig.gpu.uploads() == 2 + 3));
        let rig_gpu = rig.gpu.clone();
        drop(rig.loader);
        assert!(rig_gpu.live().is_empty());
    }

    #[test]
    fn full_delete_buffer_blocks_worker() {
        let rig = rig_with(
            FakeCollection::new(30),
            LoaderConfig {
                cache_capacity: 2,
                delete_buffer_size: 2,
                ..LoaderConfig::default()
            },
        );
        rig.loader.resume_loading();
        for (i, c) in [0, 3, 6, 9].into_iter().enumerate() {
            rig.loader.set_center(pos(c));
            settle(&rig, i + 1);
        }
        assert_eq!(rig.loader.pending_deletes(), 2);

        // third eviction has nowhere to go
        rig.loader.set_center(pos(12));
        assert!(wait_until(WAIT, || rig.collection.decode_count() == 5));
        thread::sleep(Duration::from_millis(30));
        assert!(!rig.loader.is_idle());
        assert_eq!(rig.loader.pending_deletes(), 2);

        assert_eq!(rig.loader.run_gl_delete(), 2);
        assert!(wait_until(WAIT, || rig.loader.is_idle()));
        assert_eq!(rig.loader.run_gl_delete(), 1);
        assert_eq!(rig.gpu.deletes(), 3);
        assert_eq!(rig.loader.stats().deleted, 3);
    }

    #[test]
    fn clear_cache_releases_everything_and_reloads() {
        let rig = rig(20, 11);
        rig.loader.set_center(pos(10));
        rig.loader.resume_loading();
        settle(&rig, 8);
        assert_eq!(rig.gpu.live().len(), 2 + 8);

        // keep the worker from reloading before the assertions
        rig.loader.pause_loading();
        rig.loader.clear_cache();
        assert_eq!(rig.gpu.deletes(), 8);
        assert_eq!(rig.loader.stats().deleted, 8);
        assert_eq!(rig.loader.lookup(pos(10)), Lookup::Missing);
        assert!(!rig.ctx.is_current());

        rig.loader.resume_loading();
        settle(&rig, 16);
        assert_eq!(rig.loader.cache_len(), 8);
    }

    #[test]
    fn clear_cache_while_worker_is_blocked_on_deletes() {
        let rig = rig_with(
            FakeCollection::new(30),
            LoaderConfig {
                cache_capacity: 2,
                delete_buffer_size: 1,
                ..LoaderConfig::default()
            },
        );
        rig.loader.resume_loading();
        for (i, c) in [0, 3, 6].into_iter().enumerate() {
            rig.loader.set_center(pos(c));
            settle(&rig, i + 1);
        }
        rig.loader.set_center(pos(9));
        assert!(wait_until(WAIT, || rig.collection.decode_count() == 4));
        thread::sleep(Duration::from_millis(20));

        rig.loader.clear_cache();
        assert_eq!(rig.loader.pending_deletes(), 0);
        // the scan restarts at the same center on an empty cache
        settle(&rig, 5);
        assert_eq!(rig.loader.cached_ranks(), vec![9]);
        assert_eq!(rig.gpu.live().len(), 2 + 1);
    }

    #[test]
    fn drop_releases_all_gpu_objects() {
        let rig = rig(20, 11);
        rig.loader.set_center(pos(3));
        rig.loader.resume_loading();
        settle(&rig, 8);
        let Rig { loader, gpu, ctx, .. } = rig;
        drop(loader);
        assert!(gpu.live().is_empty());
        assert_eq!(gpu.deletes(), 2 + 8);
        assert!(!ctx.is_current());
        assert_eq!(ctx.reservations(), ctx.releases());
    }

    #[test]
    fn drop_while_paused_mid_scan() {
        let rig = rig_with(
            FakeCollection::new(100).with_decode_delay(Duration::from_millis(5)),
            config(50),
        );
        rig.loader.set_center(pos(50));
        rig.loader.resume_loading();
        assert!(wait_until(WAIT, || rig.collection.decode_count() >= 2));
        rig.loader.pause_loading();
        let Rig { loader, gpu, .. } = rig;
        drop(loader);
        assert!(gpu.live().is_empty());
    }

    #[test]
    fn drop_with_lost_context_skips_gl() {
        let rig = rig(20, 11);
        rig.loader.set_center(pos(10));
        rig.loader.resume_loading();
        settle(&rig, 8);
        let Rig { loader, gpu, ctx, .. } = rig;
        ctx.set_broken(true);
        drop(loader);
        assert_eq!(gpu.deletes(), 0);
        assert_eq!(gpu.live().len(), 2 + 8);
    }

    #[test]
    fn broken_context_fails_construction() {
        let ctx = FakeContext::new();
        ctx.set_broken(true);
        let gpu = Arc::new(RecordingGpu::new());
        let res = TexLoader::new(
            LoaderConfig::default(),
            Arc::new(FakeCollection::new(5)),
            Box::new(ctx),
            gpu.clone(),
            || {},
        );
        assert!(matches!(res, Err(InitError::MakeCurrent(_))));
        assert_eq!(gpu.uploads(), 0);
    }

    #[test]
    fn invalid_config_fails_construction() {
        let res = TexLoader::new(
            config(0),
            Arc::new(FakeCollection::new(5)),
            Box::new(FakeContext::new()),
            Arc::new(RecordingGpu::new()),
            || {},
        );
        assert!(matches!(res, Err(InitError::Config(_))));
    }

    #[test]
    fn reconfigure_shrinks_cache() {
        let rig = rig(20, 11);
        rig.loader.set_center(pos(10));
        rig.loader.resume_loading();
        settle(&rig, 8);
        rig.loader.pause_loading();
        let old_loading = rig.loader.loading_texture();

        rig.loader.reconfigure(config(4)).unwrap();
        assert_eq!(rig.loader.cache_len(), 4);
        assert_eq!(rig.loader.stats().evicted, 4);
        assert_eq!(rig.loader.config().cache_capacity, 4);
        assert_ne!(rig.loader.loading_texture(), old_loading);
        // four covers and two fresh placeholders
        assert_eq!(rig.gpu.live().len(), 4 + 2);

        assert!(rig.loader.reconfigure(config(0)).is_err());
        assert_eq!(rig.loader.config().cache_capacity, 4);
    }
}

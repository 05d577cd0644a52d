//! Cross-thread hand-off queues between the worker and the GL-owning threads.
//!
//! - [`UploadQueue`]: unbounded FIFO of ranks whose upload is still owed.
//!   It holds ranks, not textures: the entry is looked up again at drain time
//!   and skipped if it has been evicted since.
//! - [`DeleteQueue`]: bounded FIFO of textures that left the cache. The
//!   producer blocks while it is full, so a worker scanning far ahead cannot
//!   pile up GPU garbage faster than the render thread destroys it.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::lock;
use crate::signal::Signal;
use crate::texture::{CoverTexture, Gpu};

#[derive(Default)]
pub struct UploadQueue {
    ranks: Mutex<VecDeque<usize>>,
}

impl UploadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, rank: usize) {
        lock(&self.ranks).push_back(rank);
    }

    pub fn pop(&self) -> Option<usize> {
        lock(&self.ranks).pop_front()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.ranks).is_empty()
    }

    pub fn len(&self) -> usize {
        lock(&self.ranks).len()
    }

    pub fn clear(&self) {
        lock(&self.ranks).clear();
    }
}

pub struct DeleteQueue {
    ring: Mutex<VecDeque<CoverTexture>>,
    capacity: usize,
    /// Auto-reset; set once per drain.
    freed: Signal,
}

impl DeleteQueue {
    pub fn new(capacity: usize, freed: Signal) -> Self {
        let capacity = capacity.max(1);
        DeleteQueue {
            ring: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            freed,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        lock(&self.ring).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.ring).is_empty()
    }

    /// Queue `tex` for destruction, blocking while the ring is full.
    pub fn push(&self, tex: CoverTexture) {
        let mut tex = tex;
        loop {
            match self.try_push(tex) {
                Ok(()) => return,
                Err(back) => {
                    tex = back;
                    tracing::trace!("texloader: delete buffer full, waiting");
                    self.freed.wait();
                }
            }
        }
    }

    /// Queue `tex` unless the ring is full, in which case it is handed back.
    pub fn try_push(&self, tex: CoverTexture) -> Result<(), CoverTexture> {
        let mut ring = lock(&self.ring);
        if ring.len() >= self.capacity {
            return Err(tex);
        }
        ring.push_back(tex);
        Ok(())
    }

    /// Queue `tex` from the consuming thread itself: when the ring is full it
    /// is drained first instead of waiting for someone else to do it.
    /// Returns how many textures that drain released.
    pub fn push_or_drain(&self, tex: CoverTexture, gpu: &dyn Gpu) -> usize {
        match self.try_push(tex) {
            Ok(()) => 0,
            Err(tex) => {
                let n = self.drain(gpu);
                self.push(tex);
                n
            }
        }
    }

    /// Destroy everything queued, oldest first, then wake one blocked producer.
    ///
    /// Needs a GL context current on the calling thread. Returns how many
    /// textures were released.
    pub fn drain(&self, gpu: &dyn Gpu) -> usize {
        let batch = std::mem::take(&mut *lock(&self.ring));
        let n = batch.len();
        for mut tex in batch {
            tex.delete(gpu);
        }
        self.freed.set();
        n
    }

    /// Release everything without GL calls, for teardown after the context is gone.
    /// Returns how many GL ids were leaked.
    pub fn forget_all(&self) -> usize {
        let batch = std::mem::take(&mut *lock(&self.ring));
        self.freed.set();
        batch
            .into_iter()
            .filter_map(|mut tex| tex.forget())
            .count()
    }
}

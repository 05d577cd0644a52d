//! Bounded texture cache, keyed by collection rank and ordered most-recently-used.
//!
//! Nodes live in a slab (`Vec<Option<Node>>`) linked into a doubly-linked
//! recency list by index; a `HashMap` finds the node for a rank. Relocating an
//! entry to the front is an O(1) unlink/relink.
//!
//! The cache itself is not synchronized. The loader wraps it in a mutex that
//! is held only for this bookkeeping, never across decode or GL calls.

use std::collections::HashMap;

use crate::texture::{CoverTexture, DecodedImage, TexInfo};

/// Result of a read-only lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lookup {
    /// Not looked at yet.
    Missing,
    /// Decoded, but the GPU upload is still owed.
    Pending,
    Ready(TexInfo),
    /// Looked at: the position has no cover.
    NoCover,
}

/// An entry that left the cache. Its texture (if any) still owns GPU state.
pub struct Evicted {
    pub rank: usize,
    pub texture: Option<CoverTexture>,
}

struct Node {
    rank: usize,
    texture: Option<CoverTexture>,
    /// Towards the most recent end.
    prev: Option<usize>,
    /// Towards the least recent end.
    next: Option<usize>,
}

pub struct TextureCache {
    capacity: usize,
    index: HashMap<usize, usize>,
    nodes: Vec<Option<Node>>,
    free: Vec<usize>,
    /// Most recently used.
    head: Option<usize>,
    /// Least recently used.
    tail: Option<usize>,
}

impl TextureCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        TextureCache {
            capacity,
            index: HashMap::with_capacity(capacity + 1),
            nodes: Vec::with_capacity(capacity + 1),
            free: Vec::new(),
            head: None,
            tail: None,
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Read-only lookup; recency is left untouched.
    pub fn lookup(&self, rank: usize) -> Lookup {
        let Some(&slot) = self.index.get(&rank) else {
            return Lookup::Missing;
        };
        match &self.node(slot).texture {
            None => Lookup::NoCover,
            Some(tex) => match tex.info() {
                Some(info) => Lookup::Ready(info),
                None => Lookup::Pending,
            },
        }
    }

    /// Move `rank` to the most recent end. Returns false if it is not cached.
    pub fn touch(&mut self, rank: usize) -> bool {
        match self.index.get(&rank) {
            Some(&slot) => {
                self.unlink(slot);
                self.push_front(slot);
                true
            }
            None => false,
        }
    }

    /// Insert `rank` as most recent, or relocate it if it is already cached.
    ///
    /// Returns true if a new entry was inserted. Everything that leaves the
    /// cache is appended to `evicted`: least-recently-used entries pushed out
    /// by the capacity limit, and `texture` itself when `rank` was already
    /// present, so that no GPU handle is ever dropped on the floor.
    pub fn insert_or_touch(
        &mut self,
        rank: usize,
        texture: Option<CoverTexture>,
        evicted: &mut Vec<Evicted>,
    ) -> bool {
        if self.touch(rank) {
            if texture.is_some() {
                evicted.push(Evicted { rank, texture });
            }
            return false;
        }

        let node = Node {
            rank,
            texture,
            prev: None,
            next: None,
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                slot
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        };
        self.index.insert(rank, slot);
        self.push_front(slot);
        self.shrink_to_capacity(evicted);
        true
    }

    /// Remove the least-recently-used entry.
    pub fn evict_lru(&mut self) -> Option<Evicted> {
        let slot = self.tail?;
        Some(self.remove_slot(slot))
    }

    /// Change the capacity, evicting surplus entries.
    pub fn set_capacity(&mut self, capacity: usize, evicted: &mut Vec<Evicted>) {
        self.capacity = capacity.max(1);
        self.shrink_to_capacity(evicted);
    }

    /// Remove every entry, most recent first.
    pub fn clear(&mut self) -> Vec<Evicted> {
        let mut out = Vec::with_capacity(self.len());
        while let Some(slot) = self.head {
            out.push(self.remove_slot(slot));
        }
        self.nodes.clear();
        self.free.clear();
        out
    }

    /// Ranks from most to least recently used.
    pub fn ranks(&self) -> Vec<usize> {
        let mut out = Vec::with_capacity(self.len());
        let mut cur = self.head;
        while let Some(slot) = cur {
            let node = self.node(slot);
            out.push(node.rank);
            cur = node.next;
        }
        out
    }

    /// Take the pixels of a cached texture that still owes its upload.
    ///
    /// The entry stays `Pending` until [`finish_upload`](Self::finish_upload).
    pub fn begin_upload(&mut self, rank: usize) -> Option<DecodedImage> {
        let slot = *self.index.get(&rank)?;
        self.node_mut(slot).texture.as_mut()?.take_pixels()
    }

    /// Attach the GL id produced from [`begin_upload`](Self::begin_upload)'s pixels.
    ///
    /// Hands the id back if the entry is gone, so the caller can delete it.
    pub fn finish_upload(&mut self, rank: usize, gl_id: u32) -> Result<(), u32> {
        let Some(&slot) = self.index.get(&rank) else {
            return Err(gl_id);
        };
        match self.node_mut(slot).texture.as_mut() {
            Some(tex) if !tex.is_uploaded() => {
                tex.attach(gl_id);
                Ok(())
            }
            _ => Err(gl_id),
        }
    }

    // ── internals ───────────────────────────────────────────────────────

    fn shrink_to_capacity(&mut self, evicted: &mut Vec<Evicted>) {
        while self.len() > self.capacity {
            match self.evict_lru() {
                Some(e) => evicted.push(e),
                None => break,
            }
        }
    }

    fn node(&self, slot: usize) -> &Node {
        self.nodes[slot].as_ref().expect("cache index points at a free slot")
    }

    fn node_mut(&mut self, slot: usize) -> &mut Node {
        self.nodes[slot].as_mut().expect("cache index points at a free slot")
    }

    fn remove_slot(&mut self, slot: usize) -> Evicted {
        self.unlink(slot);
        let node = self.nodes[slot].take().expect("cache list points at a free slot");
        self.free.push(slot);
        self.index.remove(&node.rank);
        Evicted {
            rank: node.rank,
            texture: node.texture,
        }
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = {
            let node = self.node(slot);
            (node.prev, node.next)
        };
        match prev {
            Some(p) => self.node_mut(p).next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.node_mut(n).prev = prev,
            None => self.tail = prev,
        }
        let node = self.node_mut(slot);
        node.prev = None;
        node.next = None;
    }

    fn push_front(&mut self, slot: usize) {
        let old_head = self.head;
        {
            let node = self.node_mut(slot);
            node.prev = None;
            node.next = old_head;
        }
        match old_head {
            Some(h) => self.node_mut(h).prev = Some(slot),
            None => self.tail = Some(slot),
        }
        self.head = Some(slot);
    }
}

//! Page-allocated instance pool with doubly-linked free/active lists
//! (§4.E).
//!
//! Slots are addressed by a flat `u32` index; pages are fixed-size and
//! appended but never freed or moved, which is what lets indices stay
//! stable across growth without the pointer-to-pointer tricks the design
//! notes call out as needing re-architecture.

use crate::instance::Instance;

const NONE: u32 = u32::MAX;

struct Slot {
    instance: Instance,
    prev: u32,
    next: u32,
}

pub struct Pool {
    pages: Vec<Vec<Slot>>,
    page_size: usize,
    free_head: u32,
    active_head: u32,
    len_active: usize,
}

impl Pool {
    pub fn new(page_size: usize) -> Self {
        let mut pool = Self {
            pages: Vec::new(),
            page_size,
            free_head: NONE,
            active_head: NONE,
            len_active: 0,
        };
        pool.grow();
        pool
    }

    pub fn active_len(&self) -> usize {
        self.len_active
    }

    fn grow(&mut self) {
        let page_index = self.pages.len() as u32;
        let base = page_index * self.page_size as u32;
        let mut page = Vec::with_capacity(self.page_size);
        for i in 0..self.page_size as u32 {
            let idx = base + i;
            let next = if i + 1 < self.page_size as u32 {
                idx + 1
            } else {
                self.free_head
            };
            page.push(Slot {
                instance: Instance::free(),
                prev: NONE,
                next,
            });
        }
        self.pages.push(page);
        self.free_head = base;
    }

    fn slot(&self, idx: u32) -> &Slot {
        let page = idx as usize / self.page_size;
        let local = idx as usize % self.page_size;
        &self.pages[page][local]
    }

    fn slot_mut(&mut self, idx: u32) -> &mut Slot {
        let page = idx as usize / self.page_size;
        let local = idx as usize % self.page_size;
        &mut self.pages[page][local]
    }

    pub fn instance(&self, idx: u32) -> &Instance {
        &self.slot(idx).instance
    }

    pub fn instance_mut(&mut self, idx: u32) -> &mut Instance {
        &mut self.slot_mut(idx).instance
    }

    /// Allocate a slot from the free list, growing the pool if it is
    /// empty. Growth never fails.
    pub fn alloc(&mut self) -> u32 {
        if self.free_head == NONE {
            self.grow();
        }
        let idx = self.free_head;
        self.free_head = self.slot(idx).next;
        idx
    }

    /// Return a slot to the free list. The caller must already have
    /// unlinked it from the active list.
    pub fn release(&mut self, idx: u32) {
        let slot = self.slot_mut(idx);
        slot.next = self.free_head;
        slot.prev = NONE;
        self.free_head = idx;
    }

    /// Push `idx` to the front of the active list.
    pub fn link_active(&mut self, idx: u32) {
        let old_head = self.active_head;
        {
            let slot = self.slot_mut(idx);
            slot.prev = NONE;
            slot.next = old_head;
        }
        if old_head != NONE {
            self.slot_mut(old_head).prev = idx;
        }
        self.active_head = idx;
        self.len_active += 1;
    }

    /// Remove `idx` from the active list, wherever it sits.
    pub fn unlink_active(&mut self, idx: u32) {
        let (prev, next) = {
            let slot = self.slot(idx);
            (slot.prev, slot.next)
        };
        if prev != NONE {
            self.slot_mut(prev).next = next;
        } else {
            self.active_head = next;
        }
        if next != NONE {
            self.slot_mut(next).prev = prev;
        }
        self.len_active -= 1;
    }

    pub fn active_head(&self) -> Option<u32> {
        (self.active_head != NONE).then_some(self.active_head)
    }

    pub fn next_active(&self, idx: u32) -> Option<u32> {
        let next = self.slot(idx).next;
        (next != NONE).then_some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_release_round_trip() {
        let mut pool = Pool::new(4);
        let a = pool.alloc();
        let b = pool.alloc();
        assert_ne!(a, b);
        pool.link_active(a);
        pool.link_active(b);
        assert_eq!(pool.active_len(), 2);
        pool.unlink_active(a);
        pool.release(a);
        assert_eq!(pool.active_len(), 1);
    }

    #[test]
    fn grows_past_page_size() {
        let mut pool = Pool::new(4);
        let mut handles = Vec::new();
        for _ in 0..10 {
            let idx = pool.alloc();
            pool.link_active(idx);
            handles.push(idx);
        }
        assert_eq!(pool.active_len(), 10);
        assert_eq!(pool.pages.len(), 3);
    }

    #[test]
    fn active_list_walk_survives_mid_removal() {
        let mut pool = Pool::new(4);
        let a = pool.alloc();
        let b = pool.alloc();
        let c = pool.alloc();
        pool.link_active(a);
        pool.link_active(b);
        pool.link_active(c);

        let mut seen = Vec::new();
        let mut cur = pool.active_head();
        while let Some(idx) = cur {
            let next = pool.next_active(idx);
            seen.push(idx);
            if idx == b {
                pool.unlink_active(b);
                pool.release(b);
            }
            cur = next;
        }
        assert_eq!(seen, vec![c, b, a]);
        assert_eq!(pool.active_len(), 2);
    }
}

//! Top-down weight-balanced tree (Hirai & Yamamoto's BB-alpha rebalance
//! predicate, engineered top-down per Barth & Wagner). Every insert walks
//! root-to-leaf exactly once, fixing up ancestors as it passes instead of
//! unwinding a recursion afterward — the payoff for the extra bookkeeping
//! below is that none of these operations recurse.
//!
//! Three insert entry points, in increasing bookkeeping cost:
//! - [`WbtTopDown::insert_multi`] — no look-ahead state, but must sometimes
//!   walk one extra level to resolve a just-created leaf's grandparent.
//! - [`WbtTopDown::insert_multi_with_queue`] — a 4-entry look-ahead queue
//!   defers rebalancing until it is forced, trading a fixed small buffer for
//!   simpler per-step logic.
//! - [`WbtTopDown::insert`] (unique) — records the full root-to-leaf path on
//!   a stack and rebalances unwinding it, the one entry point that rejects
//!   duplicates.

use std::marker::PhantomData;
use std::ptr::NonNull;

use smallvec::SmallVec;

use crate::array_heap::{Compare, DefaultCompare};
use crate::linkage::SizeLinkAdapter;
use crate::sbt::{
    at_impl, count_multi_impl, find_impl, height_impl, left_of, left_rotate, position_impl, right_of, right_rotate,
    sentinel, set_left, set_right, set_size, size_of,
};

/// A pointer-to-slot: either the tree's root link or one child link of an
/// existing node. Stands in for the source's `np_t*` bookkeeping, which
/// tracks "the link that currently holds this subtree" across a top-down
/// walk without requiring Rust to hand out aliasing `&mut` references.
enum Slot<T> {
    Head,
    Right(NonNull<T>),
    Left(NonNull<T>),
}

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Slot<T> {}

impl<T> PartialEq for Slot<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Slot::Head, Slot::Head) => true,
            (Slot::Right(a), Slot::Right(b)) => a == b,
            (Slot::Left(a), Slot::Left(b)) => a == b,
            _ => false,
        }
    }
}

impl<T> Eq for Slot<T> {}

impl<T> Slot<T> {
    fn get<L: SizeLinkAdapter<T>>(self, root: NonNull<T>) -> NonNull<T> {
        match self {
            Slot::Head => root,
            Slot::Right(p) => right_of::<T, L>(p),
            Slot::Left(p) => left_of::<T, L>(p),
        }
    }

    fn set<L: SizeLinkAdapter<T>>(self, root: &mut NonNull<T>, v: NonNull<T>) {
        match self {
            Slot::Head => *root = v,
            Slot::Right(p) => set_right::<T, L>(p, v),
            Slot::Left(p) => set_left::<T, L>(p, v),
        }
    }
}

fn insert_leaf<T, L: SizeLinkAdapter<T>>(node: NonNull<T>, sentinel: NonNull<T>) {
    set_left::<T, L>(node, sentinel);
    set_right::<T, L>(node, sentinel);
    set_size::<T, L>(node, 1);
}

/// BB[δ=3]-style rebalance when `root`'s right side just grew (or is about
/// to shrink on the delete path) relative to its left: single or double
/// left-rotation, chosen by comparing the right child's own two children.
fn maintain_right_leaning<T, L: SizeLinkAdapter<T>>(root: NonNull<T>) -> NonNull<T> {
    if size_of::<T, L>(left_of::<T, L>(root)) * 3 + 1 < size_of::<T, L>(right_of::<T, L>(root)) {
        let right = right_of::<T, L>(root);
        if size_of::<T, L>(right_of::<T, L>(right)) * 2 < size_of::<T, L>(left_of::<T, L>(right)) + 1 {
            let new_right = right_rotate::<T, L>(right);
            set_right::<T, L>(root, new_right);
        }
        return left_rotate::<T, L>(root);
    }
    root
}

fn maintain_left_leaning<T, L: SizeLinkAdapter<T>>(root: NonNull<T>) -> NonNull<T> {
    if size_of::<T, L>(right_of::<T, L>(root)) * 3 + 1 < size_of::<T, L>(left_of::<T, L>(root)) {
        let left = left_of::<T, L>(root);
        if size_of::<T, L>(left_of::<T, L>(left)) * 2 < size_of::<T, L>(right_of::<T, L>(left)) + 1 {
            let new_left = left_rotate::<T, L>(left);
            set_left::<T, L>(root, new_left);
        }
        return right_rotate::<T, L>(root);
    }
    root
}

/// Walks down the left spine starting at `start`, decrementing sizes and
/// rebalancing as it goes, splices the leftmost node out, and returns it.
/// Shared by the public `remove_leftmost` and the two-child splice case of
/// `remove` — both hand it a slot known to have a populated left child.
fn remove_leftmost_from<T, L: SizeLinkAdapter<T>>(start: Slot<T>, root: &mut NonNull<T>, sentinel: NonNull<T>) -> NonNull<T> {
    let mut cur_slot = start;
    let mut cur = cur_slot.get::<L>(*root);
    set_size::<T, L>(cur, size_of::<T, L>(cur) - 1);
    while left_of::<T, L>(cur) != sentinel {
        let left = left_of::<T, L>(cur);
        set_size::<T, L>(left, size_of::<T, L>(left) - 1);
        let rotated = maintain_right_leaning::<T, L>(cur_slot.get::<L>(*root));
        cur_slot.set::<L>(root, rotated);
        cur_slot = Slot::Left(cur);
        cur = left_of::<T, L>(cur);
    }
    cur_slot.set::<L>(root, right_of::<T, L>(cur));
    cur
}

/// A 4-slot look-ahead ring buffer of pending ancestor slots, mirroring the
/// source's `top_down_queue`: `insert_multi_with_queue` pushes one slot per
/// level descended and only rebalances once the queue backs up past 3
/// entries, batching the bookkeeping instead of doing it every step.
struct TopDownQueue<T> {
    slots: [Slot<T>; 4],
    path: u32,
    read_index: u32,
    size: i32,
}

impl<T> TopDownQueue<T> {
    const MASK: u32 = 3;

    fn new() -> Self {
        TopDownQueue { slots: [Slot::Head; 4], path: 0, read_index: 0, size: 0 }
    }

    fn push_right_path(&mut self, slot: Slot<T>) {
        let idx = (self.read_index + self.size as u32) & Self::MASK;
        self.slots[idx as usize] = slot;
        self.path |= 1u32 << self.size;
        self.size += 1;
    }

    fn push_left_path(&mut self, slot: Slot<T>) {
        let idx = (self.read_index + self.size as u32) & Self::MASK;
        self.slots[idx as usize] = slot;
        self.size += 1;
    }

    fn pop_n(&mut self, step: u32) {
        self.path >>= step;
        self.read_index = self.read_index.wrapping_add(step);
        self.size -= step as i32;
    }

    fn pop(&mut self) {
        self.pop_n(1);
    }

    fn set_front(&mut self, slot: Slot<T>) {
        self.slots[(self.read_index & Self::MASK) as usize] = slot;
    }

    fn front(&self) -> Slot<T> {
        self.slots[(self.read_index & Self::MASK) as usize]
    }

    fn path_queue(&self) -> u32 {
        self.path
    }

    fn len(&self) -> i32 {
        self.size
    }
}

fn top_down_insert_maintain<T, L: SizeLinkAdapter<T>>(q: &mut TopDownQueue<T>, root: &mut NonNull<T>) {
    let cur_slot = q.front();
    let cur = cur_slot.get::<L>(*root);
    if q.path_queue() & 1 != 0 {
        if size_of::<T, L>(left_of::<T, L>(cur)) * 3 + 1 < size_of::<T, L>(right_of::<T, L>(cur)) {
            let right = right_of::<T, L>(cur);
            if size_of::<T, L>(right_of::<T, L>(right)) * 2 < size_of::<T, L>(left_of::<T, L>(right)) + 1 {
                let new_right = right_rotate::<T, L>(right);
                set_right::<T, L>(cur, new_right);
                let new_root = left_rotate::<T, L>(cur_slot.get::<L>(*root));
                cur_slot.set::<L>(root, new_root);

                if q.path_queue() & 2 == 0 {
                    let after = cur_slot.get::<L>(*root);
                    if q.path_queue() & 4 != 0 {
                        q.pop_n(3);
                        q.set_front(Slot::Left(right_of::<T, L>(after)));
                    } else {
                        q.pop_n(3);
                        q.set_front(Slot::Right(left_of::<T, L>(after)));
                    }
                } else {
                    q.pop_n(2);
                }
            } else {
                let new_root = left_rotate::<T, L>(cur_slot.get::<L>(*root));
                cur_slot.set::<L>(root, new_root);
                if q.path_queue() & 2 != 0 {
                    q.pop_n(2);
                } else {
                    q.pop_n(2);
                    let after = cur_slot.get::<L>(*root);
                    q.set_front(Slot::Right(left_of::<T, L>(after)));
                }
            }
        } else {
            q.pop();
        }
    } else if size_of::<T, L>(right_of::<T, L>(cur)) * 3 + 1 < size_of::<T, L>(left_of::<T, L>(cur)) {
        let left = left_of::<T, L>(cur);
        if size_of::<T, L>(left_of::<T, L>(left)) * 2 < size_of::<T, L>(right_of::<T, L>(left)) + 1 {
            let new_left = left_rotate::<T, L>(left);
            set_left::<T, L>(cur, new_left);
            let new_root = right_rotate::<T, L>(cur_slot.get::<L>(*root));
            cur_slot.set::<L>(root, new_root);

            if q.path_queue() & 2 != 0 {
                let after = cur_slot.get::<L>(*root);
                if q.path_queue() & 4 == 0 {
                    q.pop_n(3);
                    q.set_front(Slot::Right(left_of::<T, L>(after)));
                } else {
                    q.pop_n(3);
                    q.set_front(Slot::Left(right_of::<T, L>(after)));
                }
            } else {
                q.pop_n(2);
            }
        } else {
            let new_root = right_rotate::<T, L>(cur_slot.get::<L>(*root));
            cur_slot.set::<L>(root, new_root);
            if q.path_queue() & 2 == 0 {
                q.pop_n(2);
            } else {
                q.pop_n(2);
                let after = cur_slot.get::<L>(*root);
                q.set_front(Slot::Right(left_of::<T, L>(after)));
            }
        }
    } else {
        q.pop();
    }
}

pub struct WbtTopDown<T: 'static, L, C = DefaultCompare>
where
    L: SizeLinkAdapter<T> + 'static,
    C: Compare<T> + Default,
{
    root: NonNull<T>,
    sentinel: NonNull<T>,
    _link: PhantomData<L>,
    _cmp: PhantomData<C>,
}

impl<T: 'static, L, C> WbtTopDown<T, L, C>
where
    L: SizeLinkAdapter<T> + 'static,
    C: Compare<T> + Default,
{
    pub fn new() -> Self {
        let sentinel = sentinel::<T, L>();
        WbtTopDown { root: sentinel, sentinel, _link: PhantomData, _cmp: PhantomData }
    }

    fn sentinel(&self) -> NonNull<T> {
        self.sentinel
    }

    pub fn is_sentinel(&self, node: NonNull<T>) -> bool {
        node == self.sentinel()
    }

    pub fn is_empty(&self) -> bool {
        self.root == self.sentinel()
    }

    pub fn clear(&mut self) {
        self.root = self.sentinel();
    }

    pub fn len(&self) -> usize {
        size_of::<T, L>(self.root)
    }

    /// Validates the sentinel's self-referential invariant (spec §4.8):
    /// `left == right == self`, `size == 0`. True for the lifetime of the
    /// process once any tree of this `(T, L)` pair has been touched.
    pub fn validate_sentinel(&self) -> bool {
        let s = self.sentinel();
        left_of::<T, L>(s) == s && right_of::<T, L>(s) == s && size_of::<T, L>(s) == 0
    }

    #[tracing::instrument(skip(self, node))]
    pub fn insert_multi(&mut self, node: NonNull<T>) {
        let sentinel = self.sentinel();
        let cmp = C::default();
        let mut cur_slot = Slot::Head;
        let mut cur = self.root;
        if cur == sentinel {
            insert_leaf::<T, L>(node, sentinel);
            cur_slot.set::<L>(&mut self.root, node);
            return;
        }
        set_size::<T, L>(cur, size_of::<T, L>(cur) + 1);
        loop {
            if cmp.less(unsafe { node.as_ref() }, unsafe { cur.as_ref() }) {
                let left = left_of::<T, L>(cur);
                if left == sentinel {
                    insert_leaf::<T, L>(node, sentinel);
                    set_left::<T, L>(cur, node);
                    return;
                }
                set_size::<T, L>(left, size_of::<T, L>(left) + 1);
                if size_of::<T, L>(right_of::<T, L>(cur)) * 3 + 1 < size_of::<T, L>(left) {
                    let is_ll = cmp.less(unsafe { node.as_ref() }, unsafe { left.as_ref() });
                    let ll_size = size_of::<T, L>(left_of::<T, L>(left)) + if is_ll { 1 } else { 0 };
                    let ptr = cur_slot;
                    let mut next_slot = None;
                    if ll_size * 2 < size_of::<T, L>(left) - ll_size {
                        if is_ll {
                            let ll = left_of::<T, L>(left);
                            if ll == sentinel {
                                insert_leaf::<T, L>(node, sentinel);
                                set_left::<T, L>(left, node);
                            } else {
                                set_size::<T, L>(ll, size_of::<T, L>(ll) + 1);
                                next_slot = Some(Slot::Left(left));
                            }
                        } else {
                            let lr = right_of::<T, L>(left);
                            if lr == sentinel {
                                insert_leaf::<T, L>(node, sentinel);
                                set_right::<T, L>(left, node);
                            } else {
                                set_size::<T, L>(lr, size_of::<T, L>(lr) + 1);
                                if !cmp.less(unsafe { node.as_ref() }, unsafe { lr.as_ref() }) {
                                    let lrr = right_of::<T, L>(lr);
                                    if lrr == sentinel {
                                        insert_leaf::<T, L>(node, sentinel);
                                        set_right::<T, L>(lr, node);
                                    } else {
                                        set_size::<T, L>(lrr, size_of::<T, L>(lrr) + 1);
                                        next_slot = Some(Slot::Left(cur));
                                    }
                                } else {
                                    let lrl = left_of::<T, L>(lr);
                                    if lrl == sentinel {
                                        insert_leaf::<T, L>(node, sentinel);
                                        set_left::<T, L>(lr, node);
                                    } else {
                                        set_size::<T, L>(lrl, size_of::<T, L>(lrl) + 1);
                                        next_slot = Some(Slot::Right(left));
                                    }
                                }
                            }
                        }
                        let new_left = left_rotate::<T, L>(left_of::<T, L>(cur));
                        set_left::<T, L>(cur, new_left);
                        let new_root = right_rotate::<T, L>(ptr.get::<L>(self.root));
                        ptr.set::<L>(&mut self.root, new_root);
                    } else {
                        if is_ll {
                            let ll = left_of::<T, L>(left);
                            if ll == sentinel {
                                insert_leaf::<T, L>(node, sentinel);
                                set_left::<T, L>(left, node);
                            } else {
                                set_size::<T, L>(ll, size_of::<T, L>(ll) + 1);
                                next_slot = Some(Slot::Left(left));
                            }
                        } else {
                            let lr = right_of::<T, L>(left);
                            if lr == sentinel {
                                insert_leaf::<T, L>(node, sentinel);
                                set_right::<T, L>(left, node);
                            } else {
                                set_size::<T, L>(lr, size_of::<T, L>(lr) + 1);
                                next_slot = Some(Slot::Left(cur));
                            }
                        }
                        let new_root = right_rotate::<T, L>(ptr.get::<L>(self.root));
                        ptr.set::<L>(&mut self.root, new_root);
                    }
                    match next_slot {
                        None => return,
                        Some(s) => {
                            cur_slot = s;
                            cur = cur_slot.get::<L>(self.root);
                        }
                    }
                } else {
                    cur_slot = Slot::Left(cur);
                    cur = left;
                }
            } else {
                let right = right_of::<T, L>(cur);
                if right == sentinel {
                    insert_leaf::<T, L>(node, sentinel);
                    set_right::<T, L>(cur, node);
                    return;
                }
                set_size::<T, L>(right, size_of::<T, L>(right) + 1);
                if size_of::<T, L>(left_of::<T, L>(cur)) * 3 + 1 < size_of::<T, L>(right) {
                    let is_rr = !cmp.less(unsafe { node.as_ref() }, unsafe { right.as_ref() });
                    let rr_size = size_of::<T, L>(right_of::<T, L>(right)) + if is_rr { 1 } else { 0 };
                    let ptr = cur_slot;
                    let mut next_slot = None;
                    if rr_size * 2 < size_of::<T, L>(right) - rr_size {
                        if is_rr {
                            let rr = right_of::<T, L>(right);
                            if rr == sentinel {
                                insert_leaf::<T, L>(node, sentinel);
                                set_right::<T, L>(right, node);
                            } else {
                                set_size::<T, L>(rr, size_of::<T, L>(rr) + 1);
                                next_slot = Some(Slot::Right(right));
                            }
                        } else {
                            let rl = left_of::<T, L>(right);
                            if rl == sentinel {
                                insert_leaf::<T, L>(node, sentinel);
                                set_left::<T, L>(right, node);
                            } else {
                                set_size::<T, L>(rl, size_of::<T, L>(rl) + 1);
                                if cmp.less(unsafe { node.as_ref() }, unsafe { rl.as_ref() }) {
                                    let rll = left_of::<T, L>(rl);
                                    if rll == sentinel {
                                        insert_leaf::<T, L>(node, sentinel);
                                        set_left::<T, L>(rl, node);
                                    } else {
                                        set_size::<T, L>(rll, size_of::<T, L>(rll) + 1);
                                        next_slot = Some(Slot::Right(cur));
                                    }
                                } else {
                                    let rlr = right_of::<T, L>(rl);
                                    if rlr == sentinel {
                                        insert_leaf::<T, L>(node, sentinel);
                                        set_right::<T, L>(rl, node);
                                    } else {
                                        set_size::<T, L>(rlr, size_of::<T, L>(rlr) + 1);
                                        next_slot = Some(Slot::Left(right));
                                    }
                                }
                            }
                        }
                        let new_right = right_rotate::<T, L>(right_of::<T, L>(cur));
                        set_right::<T, L>(cur, new_right);
                        let new_root = left_rotate::<T, L>(ptr.get::<L>(self.root));
                        ptr.set::<L>(&mut self.root, new_root);
                    } else {
                        if is_rr {
                            let rr = right_of::<T, L>(right);
                            if rr == sentinel {
                                insert_leaf::<T, L>(node, sentinel);
                                set_right::<T, L>(right, node);
                            } else {
                                set_size::<T, L>(rr, size_of::<T, L>(rr) + 1);
                                next_slot = Some(Slot::Right(right));
                            }
                        } else {
                            let rl = left_of::<T, L>(right);
                            if rl == sentinel {
                                insert_leaf::<T, L>(node, sentinel);
                                set_left::<T, L>(right, node);
                            } else {
                                set_size::<T, L>(rl, size_of::<T, L>(rl) + 1);
                                next_slot = Some(Slot::Right(cur));
                            }
                        }
                        let new_root = left_rotate::<T, L>(ptr.get::<L>(self.root));
                        ptr.set::<L>(&mut self.root, new_root);
                    }
                    match next_slot {
                        None => return,
                        Some(s) => {
                            cur_slot = s;
                            cur = cur_slot.get::<L>(self.root);
                        }
                    }
                } else {
                    cur_slot = Slot::Right(cur);
                    cur = right;
                }
            }
        }
    }

    #[tracing::instrument(skip(self, node))]
    pub fn insert_multi_with_queue(&mut self, node: NonNull<T>) {
        let sentinel = self.sentinel();
        let cmp = C::default();
        let mut q = TopDownQueue::<T>::new();
        let mut cur_slot = Slot::Head;
        let mut cur = self.root;
        while cur != sentinel {
            set_size::<T, L>(cur, size_of::<T, L>(cur) + 1);
            if cmp.less(unsafe { node.as_ref() }, unsafe { cur.as_ref() }) {
                q.push_left_path(cur_slot);
                cur_slot = Slot::Left(cur);
            } else {
                q.push_right_path(cur_slot);
                cur_slot = Slot::Right(cur);
            }
            if q.len() > 3 {
                top_down_insert_maintain::<T, L>(&mut q, &mut self.root);
            }
            cur = cur_slot.get::<L>(self.root);
        }
        insert_leaf::<T, L>(node, sentinel);
        cur_slot.set::<L>(&mut self.root, node);
        while q.len() > 1 {
            top_down_insert_maintain::<T, L>(&mut q, &mut self.root);
        }
    }

    /// Unique insert: returns `false` without modifying the tree if an equal
    /// element is already present.
    #[tracing::instrument(skip(self, node))]
    pub fn insert(&mut self, node: NonNull<T>) -> bool {
        let sentinel = self.sentinel();
        let cmp = C::default();
        let mut cur_slot = Slot::Head;
        let mut cur = self.root;
        let mut path: u64 = 1;
        let mut stack: SmallVec<[Slot<T>; 64]> = SmallVec::new();

        while cur != sentinel {
            path <<= 1;
            stack.push(cur_slot);
            if cmp.less(unsafe { node.as_ref() }, unsafe { cur.as_ref() }) {
                cur_slot = Slot::Left(cur);
            } else if cmp.less(unsafe { cur.as_ref() }, unsafe { node.as_ref() }) {
                path |= 1;
                cur_slot = Slot::Right(cur);
            } else {
                return false;
            }
            cur = cur_slot.get::<L>(self.root);
        }
        insert_leaf::<T, L>(node, sentinel);
        cur_slot.set::<L>(&mut self.root, node);

        if path > 1 {
            let parent_slot = stack.pop().unwrap();
            let parent = parent_slot.get::<L>(self.root);
            set_size::<T, L>(parent, size_of::<T, L>(parent) + 1);
            path >>= 1;
        }
        while path > 1 {
            let slot = stack.pop().unwrap();
            let n = slot.get::<L>(self.root);
            set_size::<T, L>(n, size_of::<T, L>(n) + 1);
            let new_n = if path & 1 != 0 { maintain_right_leaning::<T, L>(n) } else { maintain_left_leaning::<T, L>(n) };
            slot.set::<L>(&mut self.root, new_n);
            path >>= 1;
        }
        true
    }

    /// UB (a `debug_assert!` in this build) if the tree is empty — check
    /// first, matching the source's own documented precondition.
    #[tracing::instrument(skip(self))]
    pub fn remove_leftmost(&mut self) -> NonNull<T> {
        debug_assert!(!self.is_empty());
        let sentinel = self.sentinel();
        remove_leftmost_from::<T, L>(Slot::Head, &mut self.root, sentinel)
    }

    #[tracing::instrument(skip(self, key))]
    pub fn remove(&mut self, key: &T) -> Option<NonNull<T>> {
        let sentinel = self.sentinel();
        let cmp = C::default();
        let mut cur = self.root;
        let mut path: u64 = 0;
        let mut i: u32 = 0;
        while cur != sentinel {
            if cmp.less(key, unsafe { cur.as_ref() }) {
                cur = left_of::<T, L>(cur);
            } else if cmp.less(unsafe { cur.as_ref() }, key) {
                cur = right_of::<T, L>(cur);
                path |= 1u64 << i;
            } else {
                path |= 1u64 << i;
                let mut cur_slot = Slot::Head;
                let mut anc = cur_slot.get::<L>(self.root);
                set_size::<T, L>(anc, size_of::<T, L>(anc) - 1);
                let mut remaining = path;
                while remaining > 1 {
                    if remaining & 1 != 0 {
                        let right = right_of::<T, L>(anc);
                        set_size::<T, L>(right, size_of::<T, L>(right) - 1);
                        let rotated = maintain_left_leaning::<T, L>(cur_slot.get::<L>(self.root));
                        cur_slot.set::<L>(&mut self.root, rotated);
                        cur_slot = Slot::Right(anc);
                    } else {
                        let left = left_of::<T, L>(anc);
                        set_size::<T, L>(left, size_of::<T, L>(left) - 1);
                        let rotated = maintain_right_leaning::<T, L>(cur_slot.get::<L>(self.root));
                        cur_slot.set::<L>(&mut self.root, rotated);
                        cur_slot = Slot::Left(anc);
                    }
                    anc = cur_slot.get::<L>(self.root);
                    remaining >>= 1;
                }

                let right = right_of::<T, L>(anc);
                if right == sentinel {
                    cur_slot.set::<L>(&mut self.root, left_of::<T, L>(anc));
                } else {
                    if left_of::<T, L>(right) == sentinel {
                        set_left::<T, L>(right, left_of::<T, L>(anc));
                        set_size::<T, L>(right, size_of::<T, L>(anc));
                        cur_slot.set::<L>(&mut self.root, right);
                    } else {
                        let leftmost = remove_leftmost_from::<T, L>(Slot::Right(anc), &mut self.root, sentinel);
                        set_right::<T, L>(leftmost, right_of::<T, L>(anc));
                        set_left::<T, L>(leftmost, left_of::<T, L>(anc));
                        set_size::<T, L>(leftmost, size_of::<T, L>(anc));
                        cur_slot.set::<L>(&mut self.root, leftmost);
                    }
                    let rotated = maintain_left_leaning::<T, L>(cur_slot.get::<L>(self.root));
                    cur_slot.set::<L>(&mut self.root, rotated);
                }
                return Some(anc);
            }
            i += 1;
        }
        None
    }

    pub fn find(&self, key: &T) -> Option<NonNull<T>> {
        find_impl::<T, L, C>(self.root, key, self.sentinel())
    }

    pub fn at(&self, pos: usize) -> Option<NonNull<T>> {
        at_impl::<T, L>(self.root, pos, self.sentinel())
    }

    pub fn position(&self, key: &T) -> usize {
        position_impl::<T, L, C>(self.root, key, self.sentinel())
    }

    pub fn height(&self) -> usize {
        height_impl::<T, L>(self.root, self.sentinel())
    }

    pub fn count_multi(&self, key: &T) -> usize {
        count_multi_impl::<T, L, C>(self.root, key, self.sentinel())
    }
}

impl<T: 'static, L, C> Default for WbtTopDown<T, L, C>
where
    L: SizeLinkAdapter<T> + 'static,
    C: Compare<T> + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linkage::SizeLink;
    use bumpalo::Bump;
    use rand::seq::SliceRandom;
    use rand::Rng;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    struct Elem {
        weight: u32,
        link: SizeLink<Elem>,
    }

    impl Elem {
        fn new(weight: u32) -> Self {
            Elem { weight, link: SizeLink::new() }
        }
    }

    crate::size_link_adapter!(ElemAdapter, Elem, link);

    impl PartialEq for Elem {
        fn eq(&self, other: &Self) -> bool {
            self.weight == other.weight
        }
    }
    impl PartialOrd for Elem {
        fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
            self.weight.partial_cmp(&other.weight)
        }
    }

    fn alloc<'a>(bump: &'a Bump, weight: u32) -> NonNull<Elem> {
        NonNull::from(bump.alloc(Elem::new(weight)))
    }

    fn weight_of(p: NonNull<Elem>) -> u32 {
        unsafe { p.as_ref().weight }
    }

    fn inorder(tree: &WbtTopDown<Elem, ElemAdapter>) -> Vec<u32> {
        (0..tree.len()).map(|i| weight_of(tree.at(i).unwrap())).collect()
    }

    fn check_bb3(n: NonNull<Elem>, sentinel: NonNull<Elem>) {
        if n == sentinel {
            return;
        }
        let l = left_of::<Elem, ElemAdapter>(n);
        let r = right_of::<Elem, ElemAdapter>(n);
        assert!(size_of::<Elem, ElemAdapter>(l) * 3 + 1 >= size_of::<Elem, ElemAdapter>(r));
        assert!(size_of::<Elem, ElemAdapter>(r) * 3 + 1 >= size_of::<Elem, ElemAdapter>(l));
        check_bb3(l, sentinel);
        check_bb3(r, sentinel);
    }

    #[test]
    fn top_down_scenario_6_ten_thousand_random_keys() {
        let bump = Bump::new();
        let mut tree: WbtTopDown<Elem, ElemAdapter> = WbtTopDown::new();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0xC0FFEE);
        let mut keys = Vec::with_capacity(10_000);
        for _ in 0..10_000 {
            let w: u32 = rng.gen_range(0..1_000_000);
            keys.push(w);
            tree.insert_multi(alloc(&bump, w));
        }
        assert_eq!(tree.len(), 10_000);
        check_bb3(tree.root, tree.sentinel());

        let sorted = inorder(&tree);
        let mut expected = keys.clone();
        expected.sort_unstable();
        assert_eq!(sorted, expected);

        keys.shuffle(&mut rng);
        for (i, k) in keys.iter().enumerate() {
            let removed = tree.remove(&Elem::new(*k));
            assert!(removed.is_some());
            assert_eq!(tree.len(), 10_000 - i - 1);
            if tree.len() > 0 {
                check_bb3(tree.root, tree.sentinel());
            }
        }
        assert!(tree.is_empty());
        assert!(tree.validate_sentinel());
    }

    #[test]
    fn insert_multi_with_queue_matches_plain_insert_multi_ordering() {
        let bump = Bump::new();
        let mut tree: WbtTopDown<Elem, ElemAdapter> = WbtTopDown::new();
        let input = [50u32, 10, 90, 30, 70, 20, 80, 40, 60, 0, 100, 15, 95, 5, 55];
        for w in input {
            tree.insert_multi_with_queue(alloc(&bump, w));
        }
        assert_eq!(tree.len(), input.len());
        let mut expected = input.to_vec();
        expected.sort_unstable();
        assert_eq!(inorder(&tree), expected);
        check_bb3(tree.root, tree.sentinel());
    }

    #[test]
    fn unique_insert_rejects_duplicates_and_tracks_size() {
        let bump = Bump::new();
        let mut tree: WbtTopDown<Elem, ElemAdapter> = WbtTopDown::new();
        assert!(tree.insert(alloc(&bump, 10)));
        assert!(tree.insert(alloc(&bump, 20)));
        assert!(tree.insert(alloc(&bump, 5)));
        assert!(!tree.insert(alloc(&bump, 10)));
        assert_eq!(tree.len(), 3);
        assert_eq!(inorder(&tree), vec![5, 10, 20]);
    }

    #[test]
    fn remove_leftmost_drains_in_ascending_order() {
        let bump = Bump::new();
        let mut tree: WbtTopDown<Elem, ElemAdapter> = WbtTopDown::new();
        for w in [30u32, 10, 50, 20, 40] {
            tree.insert_multi(alloc(&bump, w));
        }
        let mut drained = Vec::new();
        while !tree.is_empty() {
            drained.push(weight_of(tree.remove_leftmost()));
        }
        assert_eq!(drained, vec![10, 20, 30, 40, 50]);
    }
}

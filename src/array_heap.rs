//! 4-ary array-backed min-heap with a reverse index field embedded in each
//! payload, supporting arbitrary-element removal and key-change repair.

use std::alloc::{Allocator, Global};
use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::linkage::HeapIndexAdapter;

/// Strict-weak-ordering comparator, constructed fresh per call the way the
/// source's `CMP{}` functor is default-constructed at each comparison site.
pub trait Compare<T: ?Sized> {
    fn less(&self, a: &T, b: &T) -> bool;
}

#[derive(Default)]
pub struct DefaultCompare;

impl<T: PartialOrd> Compare<T> for DefaultCompare {
    fn less(&self, a: &T, b: &T) -> bool {
        a < b
    }
}

const fn parent_index(index: usize) -> usize {
    (index - 1) >> 2
}

const fn child0_index(index: usize) -> usize {
    (index << 2) + 1
}

fn index_of<T, L: HeapIndexAdapter<T>>(n: NonNull<T>) -> usize {
    unsafe { L::link(n).as_ref().index.get() }
}

fn set_index_of<T, L: HeapIndexAdapter<T>>(n: NonNull<T>, idx: usize) {
    unsafe { L::link(n).as_ref().index.set(idx) };
}

fn sift_up<T, L: HeapIndexAdapter<T>, C: Compare<T> + Default>(
    storage: &mut [NonNull<T>],
    cur: NonNull<T>,
    mut cur_idx: usize,
) {
    let cmp = C::default();
    while cur_idx > 0 {
        let parent_idx = parent_index(cur_idx);
        let parent = storage[parent_idx];
        if !cmp.less(unsafe { cur.as_ref() }, unsafe { parent.as_ref() }) {
            break;
        }
        storage[cur_idx] = parent;
        set_index_of::<T, L>(parent, cur_idx);
        cur_idx = parent_idx;
    }
    storage[cur_idx] = cur;
    set_index_of::<T, L>(cur, cur_idx);
}

/// Scans up to 4 children at `child_idx..child_idx+count`, returns the index
/// of the smallest.
fn min_child<T, C: Compare<T> + Default>(storage: &[NonNull<T>], child_idx: usize, count: usize) -> usize {
    let cmp = C::default();
    let mut min_idx = child_idx;
    for off in 1..count {
        if cmp.less(unsafe { storage[child_idx + off].as_ref() }, unsafe { storage[min_idx].as_ref() }) {
            min_idx = child_idx + off;
        }
    }
    min_idx
}

fn sift_down<T, L: HeapIndexAdapter<T>, C: Compare<T> + Default>(
    storage: &mut [NonNull<T>],
    size: usize,
    cur: NonNull<T>,
    mut cur_idx: usize,
) {
    let cmp = C::default();
    let mut child_idx = child0_index(cur_idx);
    while child_idx + 3 < size {
        let min_idx = min_child::<T, C>(storage, child_idx, 4);
        if cmp.less(unsafe { storage[min_idx].as_ref() }, unsafe { cur.as_ref() }) {
            let min = storage[min_idx];
            storage[cur_idx] = min;
            set_index_of::<T, L>(min, cur_idx);
            cur_idx = min_idx;
            child_idx = child0_index(cur_idx);
        } else {
            storage[cur_idx] = cur;
            set_index_of::<T, L>(cur, cur_idx);
            return;
        }
    }
    if child_idx < size {
        let min_idx = min_child::<T, C>(storage, child_idx, size - child_idx);
        if cmp.less(unsafe { storage[min_idx].as_ref() }, unsafe { cur.as_ref() }) {
            let min = storage[min_idx];
            storage[cur_idx] = min;
            set_index_of::<T, L>(min, cur_idx);
            cur_idx = min_idx;
        }
    }
    storage[cur_idx] = cur;
    set_index_of::<T, L>(cur, cur_idx);
}

pub struct ArrayHeap<T, L, C = DefaultCompare, A: Allocator = Global>
where
    L: HeapIndexAdapter<T>,
    C: Compare<T> + Default,
{
    storage: Vec<NonNull<T>, A>,
    /// When set, `push` on a full heap is a precondition violation instead
    /// of triggering geometric growth (Open Question resolution, see
    /// DESIGN.md: the source's fixed-capacity+unequal-allocator overrun is
    /// turned into this checked precondition).
    fixed_capacity: bool,
    _link: PhantomData<L>,
    _cmp: PhantomData<C>,
}

impl<T, L, C> ArrayHeap<T, L, C, Global>
where
    L: HeapIndexAdapter<T>,
    C: Compare<T> + Default,
{
    pub fn new() -> Self {
        Self::with_capacity_in(0, Global)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_in(capacity, Global)
    }

    pub fn with_fixed_capacity(capacity: usize) -> Self {
        let mut h = Self::with_capacity_in(capacity, Global);
        h.fixed_capacity = true;
        h
    }
}

impl<T, L, C, A: Allocator> ArrayHeap<T, L, C, A>
where
    L: HeapIndexAdapter<T>,
    C: Compare<T> + Default,
{
    pub fn with_capacity_in(capacity: usize, alloc: A) -> Self {
        ArrayHeap {
            storage: Vec::with_capacity_in(capacity, alloc),
            fixed_capacity: false,
            _link: PhantomData,
            _cmp: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn capacity(&self) -> usize {
        self.storage.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn clear(&mut self) {
        self.storage.clear();
    }

    pub fn top(&self) -> Option<NonNull<T>> {
        self.storage.first().copied()
    }

    /// Returns `false` without inserting `n` if the heap has a fixed capacity
    /// that is already full; `true` otherwise.
    #[tracing::instrument(skip(self, n))]
    pub fn push(&mut self, n: NonNull<T>) -> bool {
        if self.fixed_capacity && self.storage.len() == self.storage.capacity() {
            return false;
        }
        let idx = self.storage.len();
        self.storage.push(n);
        sift_up::<T, L, C>(&mut self.storage, n, idx);
        true
    }

    #[tracing::instrument(skip(self))]
    pub fn pop(&mut self) -> Option<NonNull<T>> {
        if self.storage.is_empty() {
            return None;
        }
        let top = self.storage[0];
        let last = self.storage.pop().unwrap();
        if !self.storage.is_empty() {
            let size = self.storage.len();
            sift_down::<T, L, C>(&mut self.storage, size, last, 0);
        }
        Some(top)
    }

    #[tracing::instrument(skip(self, node))]
    pub fn remove(&mut self, node: NonNull<T>) -> NonNull<T> {
        let node_idx = index_of::<T, L>(node);
        let last = self.storage.pop().unwrap();
        let new_size = self.storage.len();
        if node_idx < new_size {
            let cmp = C::default();
            let parent_lt = node_idx > 0
                && cmp.less(unsafe { last.as_ref() }, unsafe { self.storage[parent_index(node_idx)].as_ref() });
            if parent_lt {
                sift_up::<T, L, C>(&mut self.storage, last, node_idx);
            } else {
                sift_down::<T, L, C>(&mut self.storage, new_size, last, node_idx);
            }
        }
        node
    }

    /// Repair after the caller decreased `node`'s key in place.
    pub fn sift_up_at(&mut self, node: NonNull<T>) {
        let idx = index_of::<T, L>(node);
        if idx > 0 {
            sift_up::<T, L, C>(&mut self.storage, node, idx);
        }
    }

    /// Repair after the caller increased `node`'s key in place.
    pub fn sift_down_at(&mut self, node: NonNull<T>) {
        let idx = index_of::<T, L>(node);
        let size = self.storage.len();
        sift_down::<T, L, C>(&mut self.storage, size, node, idx);
    }

    /// Repair after an arbitrary in-place key change; picks the direction.
    pub fn sift_at(&mut self, node: NonNull<T>) {
        let idx = index_of::<T, L>(node);
        let cmp = C::default();
        let goes_up = idx > 0 && cmp.less(unsafe { node.as_ref() }, unsafe { self.storage[parent_index(idx)].as_ref() });
        if goes_up {
            sift_up::<T, L, C>(&mut self.storage, node, idx);
        } else {
            let size = self.storage.len();
            sift_down::<T, L, C>(&mut self.storage, size, node, idx);
        }
    }

    /// Move-assignment with explicit allocator-retention semantics: `self`
    /// keeps its own allocator (unlike a bare Rust `=`, which would also
    /// move `other`'s allocator in) and pointers are copied across into it.
    /// Returns `Err(())` for the documented-disallowed case: a fixed-capacity
    /// destination too small to hold `other`'s elements (see DESIGN.md Open
    /// Question resolution).
    pub fn move_assign(&mut self, mut other: Self) -> Result<(), ()> {
        if other.storage.len() > self.storage.capacity() {
            if self.fixed_capacity {
                return Err(());
            }
            self.storage.reserve(other.storage.len() - self.storage.capacity());
        }
        self.storage.clear();
        self.storage.extend(other.storage.drain(..));
        Ok(())
    }
}

impl<T, L, C> Default for ArrayHeap<T, L, C, Global>
where
    L: HeapIndexAdapter<T>,
    C: Compare<T> + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linkage::HeapIndexLink;
    use bumpalo::Bump;

    struct Elem {
        weight: u32,
        link: HeapIndexLink,
    }

    impl Elem {
        fn new(weight: u32) -> Self {
            Elem { weight, link: HeapIndexLink::new() }
        }
    }

    crate::heap_index_adapter!(ElemAdapter, Elem, link);

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

    #[test]
    fn array_heap_scenario_3() {
        let bump = Bump::new();
        let mut heap: ArrayHeap<Elem, ElemAdapter> = ArrayHeap::new();
        for w in [502u32, 503, 501, 500] {
            heap.push(alloc(&bump, w));
        }
        let mut popped = Vec::new();
        while let Some(n) = heap.pop() {
            popped.push(weight_of(n));
            if let Some(root) = heap.top() {
                assert_eq!(index_of::<Elem, ElemAdapter>(root), 0);
            }
        }
        assert_eq!(popped, vec![500, 501, 502, 503]);
    }

    #[test]
    fn array_heap_index_field_matches_position() {
        let bump = Bump::new();
        let mut heap: ArrayHeap<Elem, ElemAdapter> = ArrayHeap::new();
        let mut nodes = Vec::new();
        for w in [9u32, 1, 7, 3, 8, 2, 6, 4, 5, 0] {
            let n = alloc(&bump, w);
            heap.push(n);
            nodes.push(n);
        }
        for (pos, n) in heap.storage.iter().enumerate() {
            assert_eq!(index_of::<Elem, ElemAdapter>(*n), pos);
        }
        for i in 1..heap.len() {
            assert!(weight_of(heap.storage[i]) >= weight_of(heap.storage[parent_index(i)]));
        }
    }

    #[test]
    fn array_heap_remove_arbitrary() {
        let bump = Bump::new();
        let mut heap: ArrayHeap<Elem, ElemAdapter> = ArrayHeap::new();
        let target = alloc(&bump, 5);
        for w in [1u32, 2, 3, 4] {
            heap.push(alloc(&bump, w));
        }
        heap.push(target);
        heap.remove(target);
        assert_eq!(heap.len(), 4);
        for i in 1..heap.len() {
            assert!(weight_of(heap.storage[i]) >= weight_of(heap.storage[parent_index(i)]));
        }
    }

    #[test]
    fn push_past_fixed_capacity_reports_failure() {
        let bump = Bump::new();
        let mut heap: ArrayHeap<Elem, ElemAdapter> = ArrayHeap::with_fixed_capacity(2);
        assert!(heap.push(alloc(&bump, 1)));
        assert!(heap.push(alloc(&bump, 2)));
        assert!(!heap.push(alloc(&bump, 3)));
        assert_eq!(heap.len(), 2);
    }
}

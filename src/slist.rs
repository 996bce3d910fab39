//! Singly-linked intrusive lists: head-only and head+tail variants.
//!
//! Both variants share the same [`SLink`](crate::linkage::SLink) field
//! shape; head+tail additionally tracks a tail pointer for O(1) `push_back`.

use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::linkage::{SLink, SLinkAdapter};

/// Head-only singly-linked list. `push_front`/`pop_front`/`remove` only;
/// no O(1) back access since there is no tail pointer.
pub struct SList<T, A: SLinkAdapter<T>> {
    head: Option<NonNull<T>>,
    _adapter: PhantomData<A>,
}

unsafe fn link<T, A: SLinkAdapter<T>>(node: NonNull<T>) -> NonNull<SLink<T>> {
    unsafe { A::link(node) }
}

unsafe fn next_of<T, A: SLinkAdapter<T>>(node: NonNull<T>) -> Option<NonNull<T>> {
    unsafe { link::<T, A>(node).as_ref().next.get() }
}

unsafe fn set_next_of<T, A: SLinkAdapter<T>>(node: NonNull<T>, next: Option<NonNull<T>>) {
    unsafe { link::<T, A>(node).as_ref().next.set(next) };
}

impl<T, A: SLinkAdapter<T>> SList<T, A> {
    pub const fn new() -> Self {
        SList { head: None, _adapter: PhantomData }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Detaches all elements without touching payload bytes beyond the
    /// linkage field each still carries (left as-is, per spec: removal does
    /// not reset linkage fields of removed elements).
    pub fn clear(&mut self) {
        self.head = None;
    }

    pub fn front(&self) -> Option<NonNull<T>> {
        self.head
    }

    #[tracing::instrument(skip(self, n))]
    pub fn push_front(&mut self, n: NonNull<T>) {
        unsafe { set_next_of::<T, A>(n, self.head) };
        self.head = Some(n);
    }

    #[tracing::instrument(skip(self))]
    pub fn pop_front(&mut self) -> Option<NonNull<T>> {
        let n = self.head?;
        self.head = unsafe { next_of::<T, A>(n) };
        Some(n)
    }

    /// Walks the chain for `target` by pointer identity; unlinks and returns
    /// it on a match. O(n).
    #[tracing::instrument(skip(self, target))]
    pub fn remove(&mut self, target: NonNull<T>) -> Option<NonNull<T>> {
        let mut cursor = self.head?;
        if cursor == target {
            self.head = unsafe { next_of::<T, A>(cursor) };
            return Some(cursor);
        }
        loop {
            let next = unsafe { next_of::<T, A>(cursor) }?;
            if next == target {
                let after = unsafe { next_of::<T, A>(next) };
                unsafe { set_next_of::<T, A>(cursor, after) };
                return Some(next);
            }
            cursor = next;
        }
    }

    pub fn iter(&self) -> SListIter<'_, T, A> {
        SListIter { cursor: self.head, _adapter: PhantomData, _lt: PhantomData }
    }
}

impl<T, A: SLinkAdapter<T>> Default for SList<T, A> {
    fn default() -> Self {
        Self::new()
    }
}

/// Shallow alias copy: both lists observe the same chain. Legal only under
/// the single-mutator discipline the source documents (see Open Questions).
impl<T, A: SLinkAdapter<T>> Clone for SList<T, A> {
    fn clone(&self) -> Self {
        SList { head: self.head, _adapter: PhantomData }
    }
}

pub struct SListIter<'a, T, A: SLinkAdapter<T>> {
    cursor: Option<NonNull<T>>,
    _adapter: PhantomData<A>,
    _lt: PhantomData<&'a T>,
}

impl<'a, T, A: SLinkAdapter<T>> Iterator for SListIter<'a, T, A> {
    type Item = NonNull<T>;

    fn next(&mut self) -> Option<NonNull<T>> {
        let n = self.cursor?;
        self.cursor = unsafe { next_of::<T, A>(n) };
        Some(n)
    }
}

/// Head+tail singly-linked list: adds O(1) `push_back`/`back`.
pub struct SListTail<T, A: SLinkAdapter<T>> {
    head: Option<NonNull<T>>,
    tail: Option<NonNull<T>>,
    _adapter: PhantomData<A>,
}

impl<T, A: SLinkAdapter<T>> SListTail<T, A> {
    pub const fn new() -> Self {
        SListTail { head: None, tail: None, _adapter: PhantomData }
    }

    pub fn is_empty(&self) -> bool {
        debug_assert_eq!(self.head.is_none(), self.tail.is_none());
        self.head.is_none()
    }

    pub fn clear(&mut self) {
        self.head = None;
        self.tail = None;
    }

    pub fn front(&self) -> Option<NonNull<T>> {
        self.head
    }

    pub fn back(&self) -> Option<NonNull<T>> {
        self.tail
    }

    #[tracing::instrument(skip(self, n))]
    pub fn push_front(&mut self, n: NonNull<T>) {
        unsafe { set_next_of::<T, A>(n, self.head) };
        self.head = Some(n);
        if self.tail.is_none() {
            self.tail = Some(n);
        }
    }

    #[tracing::instrument(skip(self, n))]
    pub fn push_back(&mut self, n: NonNull<T>) {
        unsafe { set_next_of::<T, A>(n, None) };
        match self.tail {
            Some(t) => unsafe { set_next_of::<T, A>(t, Some(n)) },
            None => self.head = Some(n),
        }
        self.tail = Some(n);
    }

    #[tracing::instrument(skip(self))]
    pub fn pop_front(&mut self) -> Option<NonNull<T>> {
        let n = self.head?;
        let next = unsafe { next_of::<T, A>(n) };
        self.head = next;
        if next.is_none() {
            self.tail = None;
        }
        Some(n)
    }

    #[tracing::instrument(skip(self, target))]
    pub fn remove(&mut self, target: NonNull<T>) -> Option<NonNull<T>> {
        let mut cursor = self.head?;
        if cursor == target {
            let next = unsafe { next_of::<T, A>(cursor) };
            self.head = next;
            if next.is_none() {
                self.tail = None;
            }
            return Some(cursor);
        }
        loop {
            let next = unsafe { next_of::<T, A>(cursor) }?;
            if next == target {
                let after = unsafe { next_of::<T, A>(next) };
                unsafe { set_next_of::<T, A>(cursor, after) };
                if after.is_none() {
                    self.tail = Some(cursor);
                }
                return Some(next);
            }
            cursor = next;
        }
    }

    pub fn iter(&self) -> SListIter<'_, T, A> {
        SListIter { cursor: self.head, _adapter: PhantomData, _lt: PhantomData }
    }
}

impl<T, A: SLinkAdapter<T>> Default for SListTail<T, A> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bumpalo::Bump;

    struct Elem {
        weight: u32,
        link: SLink<Elem>,
    }

    impl Elem {
        fn new(weight: u32) -> Self {
            Elem { weight, link: SLink::new() }
        }
    }

    crate::slink_adapter!(ElemAdapter, Elem, link);

    fn alloc<'a>(bump: &'a Bump, weight: u32) -> NonNull<Elem> {
        let r = bump.alloc(Elem::new(weight));
        NonNull::from(r)
    }

    fn weight_of(p: NonNull<Elem>) -> u32 {
        unsafe { p.as_ref().weight }
    }

    #[test]
    fn head_only_scenario_1() {
        let bump = Bump::new();
        let mut list: SList<Elem, ElemAdapter> = SList::new();
        let a3 = alloc(&bump, 503);
        let a2 = alloc(&bump, 502);
        let a1 = alloc(&bump, 501);
        let a0 = alloc(&bump, 500);
        list.push_front(a3);
        list.push_front(a2);
        list.push_front(a1);
        list.push_front(a0);

        let collected: Vec<u32> = list.iter().map(weight_of).collect();
        assert_eq!(collected, vec![500, 501, 502, 503]);
        assert_eq!(list.front().map(weight_of), Some(500));

        let popped = list.pop_front().unwrap();
        assert_eq!(weight_of(popped), 500);
        assert_eq!(popped, a0);

        let collected: Vec<u32> = list.iter().map(weight_of).collect();
        assert_eq!(collected, vec![501, 502, 503]);
    }

    #[test]
    fn head_only_remove_middle() {
        let bump = Bump::new();
        let mut list: SList<Elem, ElemAdapter> = SList::new();
        let a = alloc(&bump, 1);
        let b = alloc(&bump, 2);
        let c = alloc(&bump, 3);
        list.push_front(c);
        list.push_front(b);
        list.push_front(a);
        assert_eq!(list.remove(b), Some(b));
        let collected: Vec<u32> = list.iter().map(weight_of).collect();
        assert_eq!(collected, vec![1, 3]);
        assert_eq!(list.remove(b), None);
    }

    #[test]
    fn shallow_clone_aliases_chain() {
        let bump = Bump::new();
        let mut list: SList<Elem, ElemAdapter> = SList::new();
        let a = alloc(&bump, 1);
        list.push_front(a);
        let alias = list.clone();
        assert_eq!(alias.front(), list.front());
    }

    #[test]
    fn head_tail_push_back_and_front() {
        let bump = Bump::new();
        let mut list: SListTail<Elem, ElemAdapter> = SListTail::new();
        assert!(list.is_empty());
        let a = alloc(&bump, 1);
        let b = alloc(&bump, 2);
        list.push_back(a);
        list.push_back(b);
        assert_eq!(list.front(), Some(a));
        assert_eq!(list.back(), Some(b));
        let collected: Vec<u32> = list.iter().map(weight_of).collect();
        assert_eq!(collected, vec![1, 2]);

        let c = alloc(&bump, 0);
        list.push_front(c);
        assert_eq!(list.front(), Some(c));
        assert_eq!(list.back(), Some(b));
    }

    #[test]
    fn head_tail_pop_front_to_empty_resets_tail() {
        let bump = Bump::new();
        let mut list: SListTail<Elem, ElemAdapter> = SListTail::new();
        let a = alloc(&bump, 1);
        list.push_back(a);
        assert_eq!(list.pop_front(), Some(a));
        assert!(list.is_empty());
        assert_eq!(list.back(), None);
    }

    #[test]
    fn head_tail_remove_tail_updates_tail_pointer() {
        let bump = Bump::new();
        let mut list: SListTail<Elem, ElemAdapter> = SListTail::new();
        let a = alloc(&bump, 1);
        let b = alloc(&bump, 2);
        list.push_back(a);
        list.push_back(b);
        assert_eq!(list.remove(b), Some(b));
        assert_eq!(list.back(), Some(a));
    }
}

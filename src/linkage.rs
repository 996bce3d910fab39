//! Binds a container to a specific linkage field embedded inside a payload
//! type, and provides the shared sentinel-singleton helper used by the tree
//! containers.
//!
//! A payload type may carry several disjoint linkage fields (one per
//! container it participates in). Rather than deriving a payload pointer
//! from a linkage-field pointer by offset subtraction (`container_of`, UB
//! when applied to a non-payload anchor, see `uit::container_of` in the
//! original C++ source), every container here is generic over an `Adapter`
//! type that projects straight from a payload pointer to its linkage field
//! with `ptr::addr_of_mut!`. The adapter is normally a zero-sized marker
//! type bound to one field via the `*_adapter!` macros below.

use std::any::TypeId;
use std::cell::Cell;
use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::Mutex;

use once_cell::sync::OnceCell;

/// Forward-link field for the singly-linked list (`slist`).
pub struct SLink<T> {
    pub(crate) next: Cell<Option<NonNull<T>>>,
}

impl<T> SLink<T> {
    pub const fn new() -> Self {
        SLink { next: Cell::new(None) }
    }
}

impl<T> Default for SLink<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Forward+backward link field for the circular doubly-linked list (`dlist`).
pub struct DLink<T> {
    pub(crate) next: Cell<Option<NonNull<T>>>,
    pub(crate) prev: Cell<Option<NonNull<T>>>,
}

impl<T> DLink<T> {
    pub const fn new() -> Self {
        DLink { next: Cell::new(None), prev: Cell::new(None) }
    }
}

impl<T> Default for DLink<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Two children plus a subtree-size count, shared by the size-balanced tree
/// and both weight-balanced tree variants — all three rebalance on the same
/// "child size" bookkeeping (spec calls these out as independent components,
/// but the node shape they need is identical).
pub struct SizeLink<T> {
    pub(crate) left: Cell<NonNull<T>>,
    pub(crate) right: Cell<NonNull<T>>,
    pub(crate) size: Cell<usize>,
}

impl<T> SizeLink<T> {
    /// Safety: the tree that owns this field must overwrite `left`/`right`
    /// with the real sentinel pointer before this field is read; `dangling`
    /// is only ever a transient placeholder during node construction.
    pub fn new() -> Self {
        SizeLink {
            left: Cell::new(NonNull::dangling()),
            right: Cell::new(NonNull::dangling()),
            size: Cell::new(0),
        }
    }
}

impl<T> Default for SizeLink<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Unsigned array index, for the array-backed heap's reverse-index field.
pub struct HeapIndexLink {
    pub(crate) index: Cell<usize>,
}

impl HeapIndexLink {
    pub const fn new() -> Self {
        HeapIndexLink { index: Cell::new(0) }
    }
}

impl Default for HeapIndexLink {
    fn default() -> Self {
        Self::new()
    }
}

/// Two children, no parent, for the pointer-linked heap (`ptr_heap`).
pub struct HeapLink<T> {
    pub(crate) left: Cell<Option<NonNull<T>>>,
    pub(crate) right: Cell<Option<NonNull<T>>>,
}

impl<T> HeapLink<T> {
    pub const fn new() -> Self {
        HeapLink { left: Cell::new(None), right: Cell::new(None) }
    }
}

impl<T> Default for HeapLink<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Projects a payload pointer to its embedded [`SLink`] field.
///
/// # Safety
/// `link` must return a pointer to the same field of `node` for as long as
/// `node` participates in a container using this adapter, and that field
/// must not be touched by anything outside the container.
pub unsafe trait SLinkAdapter<T> {
    unsafe fn link(node: NonNull<T>) -> NonNull<SLink<T>>;
}

/// Projects a payload pointer to its embedded [`DLink`] field. Safety
/// contract matches [`SLinkAdapter`].
pub unsafe trait DLinkAdapter<T> {
    unsafe fn link(node: NonNull<T>) -> NonNull<DLink<T>>;
}

/// Projects a payload pointer to its embedded [`SizeLink`] field. Safety
/// contract matches [`SLinkAdapter`].
pub unsafe trait SizeLinkAdapter<T> {
    unsafe fn link(node: NonNull<T>) -> NonNull<SizeLink<T>>;
}

/// Projects a payload pointer to its embedded [`HeapIndexLink`] field.
/// Safety contract matches [`SLinkAdapter`].
pub unsafe trait HeapIndexAdapter<T> {
    unsafe fn link(node: NonNull<T>) -> NonNull<HeapIndexLink>;
}

/// Projects a payload pointer to its embedded [`HeapLink`] field. Safety
/// contract matches [`SLinkAdapter`].
pub unsafe trait HeapLinkAdapter<T> {
    unsafe fn link(node: NonNull<T>) -> NonNull<HeapLink<T>>;
}

/// Declares a zero-sized adapter type bound to a named [`SLink`] field.
#[macro_export]
macro_rules! slink_adapter {
    ($adapter:ident, $payload:ty, $field:ident) => {
        pub struct $adapter;
        unsafe impl $crate::linkage::SLinkAdapter<$payload> for $adapter {
            unsafe fn link(
                node: ::std::ptr::NonNull<$payload>,
            ) -> ::std::ptr::NonNull<$crate::linkage::SLink<$payload>> {
                ::std::ptr::NonNull::new_unchecked(::std::ptr::addr_of_mut!((*node.as_ptr()).$field))
            }
        }
    };
}

/// Declares a zero-sized adapter type bound to a named [`DLink`] field.
#[macro_export]
macro_rules! dlink_adapter {
    ($adapter:ident, $payload:ty, $field:ident) => {
        pub struct $adapter;
        unsafe impl $crate::linkage::DLinkAdapter<$payload> for $adapter {
            unsafe fn link(
                node: ::std::ptr::NonNull<$payload>,
            ) -> ::std::ptr::NonNull<$crate::linkage::DLink<$payload>> {
                ::std::ptr::NonNull::new_unchecked(::std::ptr::addr_of_mut!((*node.as_ptr()).$field))
            }
        }
    };
}

/// Declares a zero-sized adapter type bound to a named [`SizeLink`] field.
#[macro_export]
macro_rules! size_link_adapter {
    ($adapter:ident, $payload:ty, $field:ident) => {
        pub struct $adapter;
        unsafe impl $crate::linkage::SizeLinkAdapter<$payload> for $adapter {
            unsafe fn link(
                node: ::std::ptr::NonNull<$payload>,
            ) -> ::std::ptr::NonNull<$crate::linkage::SizeLink<$payload>> {
                ::std::ptr::NonNull::new_unchecked(::std::ptr::addr_of_mut!((*node.as_ptr()).$field))
            }
        }
    };
}

/// Declares a zero-sized adapter type bound to a named [`HeapIndexLink`] field.
#[macro_export]
macro_rules! heap_index_adapter {
    ($adapter:ident, $payload:ty, $field:ident) => {
        pub struct $adapter;
        unsafe impl $crate::linkage::HeapIndexAdapter<$payload> for $adapter {
            unsafe fn link(
                node: ::std::ptr::NonNull<$payload>,
            ) -> ::std::ptr::NonNull<$crate::linkage::HeapIndexLink> {
                ::std::ptr::NonNull::new_unchecked(::std::ptr::addr_of_mut!((*node.as_ptr()).$field))
            }
        }
    };
}

/// Declares a zero-sized adapter type bound to a named [`HeapLink`] field.
#[macro_export]
macro_rules! heap_link_adapter {
    ($adapter:ident, $payload:ty, $field:ident) => {
        pub struct $adapter;
        unsafe impl $crate::linkage::HeapLinkAdapter<$payload> for $adapter {
            unsafe fn link(
                node: ::std::ptr::NonNull<$payload>,
            ) -> ::std::ptr::NonNull<$crate::linkage::HeapLink<$payload>> {
                ::std::ptr::NonNull::new_unchecked(::std::ptr::addr_of_mut!((*node.as_ptr()).$field))
            }
        }
    };
}

/// Safety: the sentinel is never dereferenced as a full payload, only through
/// its linkage field, and the pointee is never mutated concurrently
/// (single-mutator discipline, see spec §5), so an erased pointer to it may
/// freely cross threads.
struct ErasedSentinel(NonNull<()>);
unsafe impl Send for ErasedSentinel {}
unsafe impl Sync for ErasedSentinel {}

/// One sentinel node per tree type, created on first use and kept alive for
/// the life of the process. Rust has no per-generic-instantiation `static`
/// (a local `static` cannot mention a function's own type parameter), so the
/// per-type slot is a `TypeId`-keyed table instead of a template static
/// member the way the C++ source's `sentinel_t` union is one-per-instantiation
/// implicitly.
fn sentinel_registry() -> &'static Mutex<HashMap<TypeId, ErasedSentinel>> {
    static REGISTRY: OnceCell<Mutex<HashMap<TypeId, ErasedSentinel>>> = OnceCell::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Returns the process-wide sentinel for tree type `Tag`, allocating it via
/// `init` on first use. `Tag` distinguishes trees that share a payload type
/// `T` but use different adapters (each adapter type is a distinct `Tag`).
pub(crate) fn sentinel_for<T, Tag: 'static>(init: impl FnOnce() -> NonNull<T>) -> NonNull<T> {
    let mut registry = sentinel_registry().lock().unwrap_or_else(|e| e.into_inner());
    let entry = registry
        .entry(TypeId::of::<Tag>())
        .or_insert_with(|| ErasedSentinel(init().cast::<()>()));
    entry.0.cast::<T>()
}

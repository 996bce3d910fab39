#![feature(allocator_api)]

pub mod array_heap;
pub mod dlist;
pub mod linkage;
pub mod ptr_heap;
pub mod sbt;
pub mod slist;
pub mod wbt_recursive;
pub mod wbt_topdown;

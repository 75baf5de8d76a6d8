//! Modification marker stores.
//!
//! A store exposes a cheap "did anything change" probe: a marker that advances
//! on every committed write and never decreases.

mod file;
mod marker_store;
mod memory;

pub use file::FileMarkerStore;
pub use marker_store::{Marker, MarkerStore};
pub use memory::MemoryStore;

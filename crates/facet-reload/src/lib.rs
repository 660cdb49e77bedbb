//! Shader hot-reload primitives for the Facet renderer.
//!
//! This crate provides the two pieces that make live shader iteration work:
//! - [`FileWatcher`]: a background polling task that detects modified files
//!   and invokes a callback
//! - [`SwapSlot`]: a single-slot synchronized handoff between the watcher
//!   thread (producer) and the render loop (consumer)
//!
//! Neither type knows anything about Vulkan; the render loop decides what a
//! "safe point" is by passing a quiesce closure to [`SwapSlot::drain_with`].

pub mod slot;
pub mod watcher;

pub use slot::SwapSlot;
pub use watcher::{FileWatcher, WatchError};

//! Application framework for the Facet renderer.
//!
//! Owns the window, the event loop, and the render loop, and wires the
//! shader watcher to the pipeline swap slot. `run` drives everything: the
//! caller supplies an [`AppConfig`] naming the shader sources and gets a
//! window drawing with them, live-reloading on edit.

pub mod context;
pub mod runner;

pub use context::{AppContext, FRAMES_IN_FLIGHT};
pub use runner::{run, AppConfig};

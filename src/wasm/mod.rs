//! WebAssembly bindings for the emulation core.
//!
//! This module exposes [`Machine`](crate::Machine) to JavaScript so a browser
//! front end can drive frames, feed input and render from video memory.

#[cfg(feature = "wasm")]
pub mod api;

#[cfg(feature = "wasm")]
pub use api::AgbEmulator;

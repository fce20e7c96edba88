//! fprint-watch: turn a noisy stream of filesystem notifications into one
//! "stable" signal per path

pub mod coalescer;
pub mod source;

pub use coalescer::{Coalescer, StableEvents, DEFAULT_DEBOUNCE};
pub use source::{classify, translate, WatchError, WatchSource};

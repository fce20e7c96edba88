pub mod config;
pub mod error;
pub mod types;

pub use error::{FprintError, FprintResult};
pub use types::{
    ChunkDigest, ChunkRange, Classification, FinalDigest, StableEvent, WatchEvent, WatchKind,
};

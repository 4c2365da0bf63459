//! Local filesystem walker
//!
//! Builds a [`Catalog`](crate::catalog::Catalog) for the given roots using a
//! pool of threads that share directories through a work-stealing deque.
//!
//! # Architecture
//!
//! ```text
//!                  Injector (roots)
//!                        │
//!       ┌────────────────┼────────────────┐
//!       │                │                │
//! ┌─────▼─────┐    ┌─────▼─────┐    ┌─────▼─────┐
//! │  Worker 1 │    │  Worker 2 │    │  Worker N │   pop / steal dirs
//! │  readdir  │    │  readdir  │    │  readdir  │   push subdirs locally
//! │  lstat    │    │  lstat    │    │  lstat    │
//! └─────┬─────┘    └─────┬─────┘    └─────┬─────┘
//!       └────────────────┼────────────────┘
//!                        │ Vec<FileEntry> batches (bounded channel)
//!                        ▼
//!                  Collector (caller's thread)
//! ```

pub mod local;

pub use local::{walk, LocalWalker, WalkOptions, WalkOutput, WalkProgress, WalkStats};

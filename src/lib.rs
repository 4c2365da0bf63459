//! dchmod - Parallel Group and Permission Changes for Large Trees
//!
//! Changes the group ownership and permission bits of every entry under a
//! set of directory trees, using a group of worker threads that each own a
//! shard of the entries.
//!
//! # Features
//!
//! - **chmod-style Modes**: octal (`2770`) or symbolic clauses
//!   (`ug+rwX,a-rwx`, `g=u`) compiled once into a [`ModeSpec`].
//!
//! - **Deepest-First Levels**: entries are changed one depth level at a
//!   time, deepest first, with all workers meeting at a barrier between
//!   levels, so a directory is only locked down after its contents.
//!
//! - **Single Group Lookup**: the group name is resolved once and
//!   broadcast to every worker.
//!
//! - **Reusable Walks**: a walk can be saved to SQLite and replayed.
//!
//! # Architecture
//!
//! ```text
//!   PATH...                          -i FILE
//!      │                                │
//!      ▼                                ▼
//! ┌──────────────┐   -o FILE    ┌──────────────┐
//! │ Local walker │ ───────────▶ │ SQLite cache │
//! │ (work steal) │              └──────┬───────┘
//! └──────┬───────┘                     │
//!        └──────────────┬──────────────┘
//!                       ▼
//!                   Catalog ── partition ──┐
//!                                          ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Worker group (N threads)                  │
//! │  ┌─────────┐  ┌─────────┐  ┌─────────┐         ┌─────────┐  │
//! │  │Worker 0 │  │Worker 1 │  │Worker 2 │  ...    │Worker N │  │
//! │  │ lookup  │  │         │  │         │         │         │  │
//! │  └────┬────┘  └────┬────┘  └────┬────┘         └────┬────┘  │
//! │       └──── broadcast gid ──────┴───────────────────┘       │
//! │       filter ─▶ levels by depth ─▶ lchown/chmod, barrier    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Give the project group access, hide it from everyone else
//! dchmod -g research -m ug+rwX,a-rwx /data/project
//!
//! # Save the walk, then reuse it for a second pass
//! dchmod -o tree.db -m g+r /data/big
//! dchmod -i tree.db -n -a '\.h5$' -m a+r
//! ```

pub mod catalog;
pub mod chmod;
pub mod collective;
pub mod config;
pub mod error;
pub mod filter;
pub mod group;
pub mod mode;
pub mod mutator;
pub mod progress;
pub mod walker;

pub use catalog::{Catalog, EntryType, FileEntry};
pub use chmod::{run_chmod, run_chmod_with_levels, RunOptions};
pub use config::{ChmodConfig, CliArgs, Source};
pub use error::{ChmodError, Result};
pub use mode::{compile, ModeBits, ModeSpec};
pub use mutator::{MutationReport, SystemOps};
pub use walker::{walk, WalkOptions, WalkOutput};

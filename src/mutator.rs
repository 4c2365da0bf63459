//! Level-synchronized mutation
//!
//! Applies the group change and the compiled mode to a worker's shard,
//! one depth level at a time, deepest first. Every worker finishes a level
//! and waits at a barrier before anyone starts the next shallower one, so a
//! directory's permissions only change after everything below it is done.
//!
//! ```text
//!   depth 3   [w0: ....] [w1: ..] [w2: ...]   ── barrier
//!   depth 2   [w0: ..]   [w1: ...] [w2: .]    ── barrier
//!   depth 1   [w0: .]    [w1: ]    [w2: ..]   ── barrier
//!   depth 0   [w0: .]    [w1: ]    [w2: ]     ── barrier
//! ```

use crate::catalog::{Catalog, FileEntry};
use crate::collective::{ReduceOp, WorkerGroup};
use crate::mode::{ModeBits, ModeSpec};
use nix::errno::Errno;
use std::fs::{self, Permissions};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// The two syscalls a run performs on each entry
pub trait EntryOps: Sync {
    /// Change the group of `path` without following a symlink; owner unchanged
    fn lchown(&self, path: &Path, gid: u32) -> io::Result<()>;

    /// Set the permission bits of `path`
    fn chmod(&self, path: &Path, mode: ModeBits) -> io::Result<()>;
}

/// Real filesystem operations
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemOps;

impl EntryOps for SystemOps {
    fn lchown(&self, path: &Path, gid: u32) -> io::Result<()> {
        std::os::unix::fs::lchown(path, None, Some(gid))
    }

    fn chmod(&self, path: &Path, mode: ModeBits) -> io::Result<()> {
        fs::set_permissions(path, Permissions::from_mode(mode.bits()))
    }
}

/// Per-level figures, reported by the coordinator in verbose runs
#[derive(Debug, Clone, PartialEq)]
pub struct LevelStats {
    pub depth: u32,
    /// Fewest entries any worker had at this level
    pub min: u64,
    /// Most entries any worker had at this level
    pub max: u64,
    pub sum: u64,
    pub rate: f64,
    pub secs: f64,
}

/// Group-wide result of a run
#[derive(Debug, Clone, Default)]
pub struct MutationReport {
    /// Entries visited across all workers
    pub count: u64,
    /// Successful group changes
    pub chowned: u64,
    /// Successful mode changes
    pub chmodded: u64,
    /// Group changes refused with EPERM
    pub skipped: u64,
    /// Failed syscalls other than the EPERM skips
    pub errors: u64,
    pub elapsed: Duration,
    /// Entries per second
    pub rate: f64,
    /// Filled on the coordinator when level reporting is on
    pub levels: Vec<LevelStats>,
}

fn rate(count: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        count as f64 / secs
    } else {
        0.0
    }
}

#[derive(Debug, Default)]
struct Tally {
    chowned: u64,
    chmodded: u64,
    skipped: u64,
    errors: u64,
}

/// Called on the coordinator as each level completes
pub type LevelHook<'a> = &'a (dyn Fn(&LevelStats) + Sync);

/// Applies one run's changes to a worker's shard
pub struct Mutator<'a, O: EntryOps + ?Sized> {
    spec: Option<&'a ModeSpec>,
    gid: Option<u32>,
    ops: &'a O,
    report_levels: bool,
    on_level: Option<LevelHook<'a>>,
}

impl<'a, O: EntryOps + ?Sized> Mutator<'a, O> {
    pub fn new(ops: &'a O) -> Self {
        Self {
            spec: None,
            gid: None,
            ops,
            report_levels: false,
            on_level: None,
        }
    }

    /// Mode to apply to every non-symlink entry
    pub fn with_spec(mut self, spec: Option<&'a ModeSpec>) -> Self {
        self.spec = spec;
        self
    }

    /// Group id to give every entry
    pub fn with_gid(mut self, gid: Option<u32>) -> Self {
        self.gid = gid;
        self
    }

    /// Gather per-level min/max/sum (adds three all-reduces per level)
    pub fn report_levels(mut self, enabled: bool) -> Self {
        self.report_levels = enabled;
        self
    }

    /// Hand each level's figures to `hook` as soon as the level is done.
    /// Only has an effect with `report_levels(true)`.
    pub fn on_level(mut self, hook: Option<LevelHook<'a>>) -> Self {
        self.on_level = hook;
        self
    }

    /// Mutate `subset` deepest level first (collective)
    pub fn run<G: WorkerGroup>(&self, subset: &Catalog, group: &G) -> MutationReport {
        let depth = subset.array_by_depth(group);

        group.barrier();
        let start = Instant::now();

        let mut tally = Tally::default();
        let mut levels = Vec::new();

        for index in (0..depth.levels.len()).rev() {
            let level = &depth.levels[index];
            let level_start = Instant::now();

            for entry in level {
                self.mutate(entry, &mut tally);
            }

            group.barrier();

            if self.report_levels {
                let local = level.len() as u64;
                let min = group.all_reduce(local, ReduceOp::Min);
                let max = group.all_reduce(local, ReduceOp::Max);
                let sum = group.all_reduce(local, ReduceOp::Sum);
                let elapsed = level_start.elapsed();

                if group.is_coordinator() {
                    let stats = LevelStats {
                        depth: depth.depth_of(index),
                        min,
                        max,
                        sum,
                        rate: rate(sum, elapsed),
                        secs: elapsed.as_secs_f64(),
                    };
                    info!(
                        level = stats.depth,
                        min = stats.min,
                        max = stats.max,
                        sum = stats.sum,
                        rate = stats.rate,
                        secs = stats.secs,
                        "Level done"
                    );
                    if let Some(hook) = self.on_level {
                        hook(&stats);
                    }
                    levels.push(stats);
                }
            }
        }

        group.barrier();
        let elapsed = start.elapsed();

        let count = subset.global_len(group);
        let report = MutationReport {
            count,
            chowned: group.all_reduce(tally.chowned, ReduceOp::Sum),
            chmodded: group.all_reduce(tally.chmodded, ReduceOp::Sum),
            skipped: group.all_reduce(tally.skipped, ReduceOp::Sum),
            errors: group.all_reduce(tally.errors, ReduceOp::Sum),
            elapsed,
            rate: rate(count, elapsed),
            levels,
        };

        debug!(
            rank = group.rank(),
            local = subset.len(),
            errors = tally.errors,
            "Worker finished"
        );
        report
    }

    fn mutate(&self, entry: &FileEntry, tally: &mut Tally) {
        if let Some(gid) = self.gid {
            if entry.gid != gid {
                match self.ops.lchown(&entry.path, gid) {
                    Ok(()) => tally.chowned += 1,
                    // Not the owner; expected when run by an ordinary user
                    Err(e) if e.raw_os_error() == Some(Errno::EPERM as i32) => {
                        tally.skipped += 1;
                        debug!("lchown {} -> {}: {}", entry.path.display(), gid, e);
                    }
                    Err(e) => {
                        tally.errors += 1;
                        error!("Failed to change group on {}: {}", entry.path.display(), e);
                    }
                }
            }
        }

        let Some(spec) = self.spec else {
            return;
        };
        if entry.entry_type.is_symlink() {
            return;
        }

        let mode = spec.apply(entry.mode, entry.entry_type);
        match self.ops.chmod(&entry.path, mode) {
            Ok(()) => tally.chmodded += 1,
            Err(e) => {
                tally.errors += 1;
                error!(
                    "Failed to change permissions on {} to {} ({}): {}",
                    entry.path.display(),
                    mode,
                    mode.symbolic(),
                    e
                );
            }
        }
    }
}

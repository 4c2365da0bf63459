//! Run coordinator
//!
//! Splits a catalog across a [`ThreadGroup`] and runs the same pipeline on
//! every worker:
//!
//! ```text
//!            Catalog
//!               │ partition(n)
//!     ┌─────────┼─────────┐
//!     ▼         ▼         ▼
//!  worker 0  worker 1  worker n-1
//!     │         │         │      resolve group   (rank 0 looks up, broadcast)
//!     │         │         │      filter          (local)
//!     │         │         │      mutate levels   (barrier per depth)
//!     └─────────┼─────────┘
//!               ▼
//!        MutationReport (rank 0)
//! ```

use crate::catalog::Catalog;
use crate::collective::{ThreadGroup, WorkerGroup};
use crate::error::{ChmodError, Result};
use crate::filter::{compile_pattern, filter, FilterMode, MatchOn};
use crate::group::{self, GroupDirectory};
use crate::mode::ModeSpec;
use crate::mutator::{EntryOps, LevelHook, LevelStats, MutationReport, Mutator};
use crossbeam_channel::bounded;
use std::any::Any;
use std::io;
use std::thread;
use tracing::{debug, info};

/// What a run changes, and how
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Worker group size
    pub workers: usize,
    pub spec: Option<ModeSpec>,
    /// Group name, resolved once per run
    pub group: Option<String>,
    pub filter: FilterMode,
    pub match_on: MatchOn,
    /// Collect per-level figures into the report
    pub report_levels: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            spec: None,
            group: None,
            filter: FilterMode::None,
            match_on: MatchOn::FullPath,
            report_levels: false,
        }
    }
}

/// Apply `options` to every entry of `catalog` with a group of worker threads
pub fn run_chmod<D, O>(
    catalog: Catalog,
    options: &RunOptions,
    directory: &D,
    ops: &O,
) -> Result<MutationReport>
where
    D: GroupDirectory + Sync + ?Sized,
    O: EntryOps + ?Sized,
{
    run_group(catalog, options, directory, ops, None, named_builder)
}

/// [`run_chmod`], calling `on_level` from the coordinator as each depth level
/// completes (requires `options.report_levels`)
pub fn run_chmod_with_levels<D, O, F>(
    catalog: Catalog,
    options: &RunOptions,
    directory: &D,
    ops: &O,
    on_level: F,
) -> Result<MutationReport>
where
    D: GroupDirectory + Sync + ?Sized,
    O: EntryOps + ?Sized,
    F: Fn(&LevelStats) + Sync,
{
    run_group(catalog, options, directory, ops, Some(&on_level), named_builder)
}

fn named_builder(rank: usize) -> io::Result<thread::Builder> {
    Ok(thread::Builder::new().name(format!("chmod-{}", rank)))
}

fn run_group<D, O, B>(
    catalog: Catalog,
    options: &RunOptions,
    directory: &D,
    ops: &O,
    on_level: Option<LevelHook<'_>>,
    mut builder: B,
) -> Result<MutationReport>
where
    D: GroupDirectory + Sync + ?Sized,
    O: EntryOps + ?Sized,
    B: FnMut(usize) -> io::Result<thread::Builder>,
{
    // Every worker compiles the same pattern, so checking it here means no
    // worker can fail on it alone and leave the rest waiting at a barrier
    if let Some(pattern) = options.filter.pattern() {
        compile_pattern(pattern)?;
    }

    let workers = options.workers.max(1);
    info!(
        entries = catalog.len(),
        workers,
        group = options.group.as_deref().unwrap_or("-"),
        "Starting run"
    );

    let shards = catalog.partition(workers);

    let results: Vec<Result<MutationReport>> = thread::scope(|s| {
        // Workers hold here until the whole group exists. Returning early
        // drops `start`, and the ones already running return `Aborted`.
        let (start, gate) = bounded::<()>(workers);

        let mut handles = Vec::with_capacity(workers);
        for (worker, shard) in ThreadGroup::new(workers).into_iter().zip(shards) {
            let id = worker.rank();
            let gate = gate.clone();
            let handle = builder(id)
                .and_then(|b| {
                    b.spawn_scoped(s, move || {
                        if gate.recv().is_err() {
                            return Err(ChmodError::Aborted);
                        }
                        run_worker(shard, options, directory, ops, on_level, &worker)
                    })
                })
                .map_err(|source| ChmodError::Spawn { id, source })?;
            handles.push((id, handle));
        }

        for _ in 0..workers {
            // Capacity matches the group size and `gate` is still alive
            let _ = start.send(());
        }

        Ok::<_, ChmodError>(
            handles
                .into_iter()
                .map(|(id, handle)| {
                    handle.join().unwrap_or_else(|panic| {
                        Err(ChmodError::Worker {
                            id,
                            message: panic_message(panic.as_ref()),
                        })
                    })
                })
                .collect(),
        )
    })?;

    let mut reports = Vec::with_capacity(results.len());
    for result in results {
        reports.push(result?);
    }

    // Every worker holds the same totals; rank 0 also carries the level figures
    Ok(reports.into_iter().next().unwrap_or_default())
}

fn run_worker<G, D, O>(
    shard: Catalog,
    options: &RunOptions,
    directory: &D,
    ops: &O,
    on_level: Option<LevelHook<'_>>,
    group: &G,
) -> Result<MutationReport>
where
    G: WorkerGroup,
    D: GroupDirectory + ?Sized,
    O: EntryOps + ?Sized,
{
    let gid = match &options.group {
        Some(name) => Some(group::resolve(name, directory, group)?.gid),
        None => None,
    };

    let subset = filter(&shard, &options.filter, options.match_on)?;
    debug!(
        rank = group.rank(),
        shard = shard.len(),
        selected = subset.len(),
        "Worker ready"
    );

    let report = Mutator::new(ops)
        .with_spec(options.spec.as_ref())
        .with_gid(gid)
        .report_levels(options.report_levels)
        .on_level(on_level)
        .run(&subset, group);

    Ok(report)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_support::entry;
    use crate::catalog::EntryType;
    use crate::error::GroupError;
    use crate::group::test_support::FakeGroups;
    use crate::mode::compile;
    use crate::mutator::test_support::{Call, RecordingOps};
    use std::path::PathBuf;

    fn catalog() -> Catalog {
        Catalog::from_entries(vec![
            entry("/r", EntryType::Directory, 0),
            entry("/r/a.tmp", EntryType::Regular, 1),
            entry("/r/a.log", EntryType::Regular, 1),
            entry("/r/sub", EntryType::Directory, 1),
            entry("/r/sub/b.log", EntryType::Regular, 2),
        ])
    }

    #[test]
    fn test_run_applies_group_and_mode() {
        let ops = RecordingOps::default();
        let directory = FakeGroups::with("staff", 20);
        let options = RunOptions {
            workers: 3,
            spec: Some(compile("g+w").unwrap()),
            group: Some("staff".into()),
            ..Default::default()
        };

        let report = run_chmod(catalog(), &options, &directory, &ops).unwrap();
        assert_eq!(report.count, 5);
        assert_eq!(report.chowned, 5);
        assert_eq!(report.chmodded, 5);
        assert_eq!(directory.lookups(), 1);

        let calls = ops.calls();
        assert!(calls.contains(&Call::Chown(PathBuf::from("/r/sub/b.log"), 20)));
        assert!(calls.contains(&Call::Chmod(PathBuf::from("/r/sub/b.log"), 0o664)));
    }

    #[test]
    fn test_unknown_group_mutates_nothing() {
        let ops = RecordingOps::default();
        let directory = FakeGroups::with("staff", 20);
        let options = RunOptions {
            workers: 4,
            spec: Some(compile("700").unwrap()),
            group: Some("ghosts".into()),
            ..Default::default()
        };

        let err = run_chmod(catalog(), &options, &directory, &ops).unwrap_err();
        assert!(matches!(err, ChmodError::Group(GroupError::NotFound { .. })));
        assert!(ops.calls().is_empty());
        assert_eq!(directory.lookups(), 1);
    }

    #[test]
    fn test_filter_applied_per_shard() {
        let ops = RecordingOps::default();
        let options = RunOptions {
            workers: 2,
            spec: Some(compile("600").unwrap()),
            filter: FilterMode::Match(r"\.log$".into()),
            match_on: MatchOn::BaseName,
            ..Default::default()
        };

        let report = run_chmod(catalog(), &options, &FakeGroups::default(), &ops).unwrap();
        assert_eq!(report.count, 2);

        let mut paths: Vec<_> = ops
            .calls()
            .into_iter()
            .map(|c| match c {
                Call::Chmod(p, _) | Call::Chown(p, _) => p,
            })
            .collect();
        paths.sort();
        assert_eq!(
            paths,
            vec![PathBuf::from("/r/a.log"), PathBuf::from("/r/sub/b.log")]
        );
    }

    #[test]
    fn test_bad_pattern_fails_before_spawning() {
        let options = RunOptions {
            workers: 2,
            filter: FilterMode::Exclude("(".into()),
            ..Default::default()
        };
        let err = run_chmod(catalog(), &options, &FakeGroups::default(), &RecordingOps::default())
            .unwrap_err();
        assert!(matches!(err, ChmodError::Config(_)));
    }

    #[test]
    fn test_more_workers_than_entries() {
        let ops = RecordingOps::default();
        let options = RunOptions {
            workers: 8,
            spec: Some(compile("755").unwrap()),
            report_levels: true,
            ..Default::default()
        };

        let report = run_chmod(catalog(), &options, &FakeGroups::default(), &ops).unwrap();
        assert_eq!(report.count, 5);
        assert_eq!(report.levels.len(), 3);
        assert_eq!(ops.calls().len(), 5);
    }

    #[test]
    fn test_failed_spawn_releases_started_workers() {
        let ops = RecordingOps::default();
        let directory = FakeGroups::with("staff", 20);
        let options = RunOptions {
            workers: 4,
            spec: Some(compile("700").unwrap()),
            group: Some("staff".into()),
            ..Default::default()
        };

        // Ranks 0 and 1 start, rank 2 cannot; the run must return, not hang
        let err = run_group(catalog(), &options, &directory, &ops, None, |rank| {
            if rank == 2 {
                Err(io::Error::other("thread limit reached"))
            } else {
                Ok(thread::Builder::new())
            }
        })
        .unwrap_err();

        assert!(matches!(err, ChmodError::Spawn { id: 2, .. }));
        assert!(ops.calls().is_empty());
        assert_eq!(directory.lookups(), 0);
    }

    #[test]
    fn test_levels_reported_during_run() {
        let ops = RecordingOps::default();
        let options = RunOptions {
            workers: 3,
            spec: Some(compile("750").unwrap()),
            report_levels: true,
            ..Default::default()
        };
        let seen = std::sync::Mutex::new(Vec::new());

        let directory = FakeGroups::default();
        let report = run_chmod_with_levels(catalog(), &options, &directory, &ops, |l| {
            seen.lock().unwrap().push(l.depth)
        })
        .unwrap();

        assert_eq!(seen.into_inner().unwrap(), vec![2, 1, 0]);
        assert_eq!(report.levels.len(), 3);
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
    }
}

//! Parallel local directory walk

use crate::catalog::{Catalog, EntryType, FileEntry};
use crate::error::{CatalogError, CatalogResult};
use crate::mode::ModeBits;
use crossbeam_channel::{bounded, Sender};
use crossbeam_deque::{Injector, Steal, Stealer, Worker as DequeWorker};
use std::fs::{self, Metadata, Permissions};
use std::io::ErrorKind;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Entries per batch sent from a worker to the collector
const BATCH_SIZE: usize = 1000;

/// Options for a walk
#[derive(Debug, Clone, Copy)]
pub struct WalkOptions {
    /// lstat every entry for mode/uid/gid; when off only the entry type is
    /// recorded, taken from the directory entry itself
    pub collect_stat: bool,

    /// Grant `u+rx` on directories that lack it so the walk can descend
    pub requires_owner_rx: bool,

    /// Number of walker threads
    pub workers: usize,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            collect_stat: true,
            requires_owner_rx: false,
            workers: num_cpus::get(),
        }
    }
}

/// Directory work item
#[derive(Debug, Clone)]
struct DirWork {
    path: PathBuf,
    depth: u32,
    /// Mode at walk time, when stat was collected
    mode: Option<ModeBits>,
}

/// Result counters from a walk
#[derive(Debug, Clone, Default)]
pub struct WalkStats {
    pub dirs: u64,
    pub files: u64,
    pub errors: u64,
    pub duration: Duration,
}

/// Progress information for display
#[derive(Debug, Clone, Default)]
pub struct WalkProgress {
    pub dirs: u64,
    pub files: u64,
    pub errors: u64,
    pub elapsed: Duration,
}

impl WalkProgress {
    pub fn entries_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            (self.files + self.dirs) as f64 / secs
        } else {
            0.0
        }
    }
}

/// A finished walk
#[derive(Debug, Default)]
pub struct WalkOutput {
    pub catalog: Catalog,
    pub stats: WalkStats,
}

#[derive(Default)]
struct Counters {
    dirs: AtomicU64,
    files: AtomicU64,
    errors: AtomicU64,
}

impl Counters {
    fn record(&self, entry_type: EntryType) {
        if entry_type.is_dir() {
            self.dirs.fetch_add(1, Ordering::Relaxed);
        } else {
            self.files.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }
}

/// Walk `roots` with default thread count
pub fn walk(roots: &[PathBuf], options: WalkOptions) -> CatalogResult<WalkOutput> {
    LocalWalker::new(options).run(roots)
}

/// Parallel walker over the local filesystem
pub struct LocalWalker {
    options: WalkOptions,
    counters: Arc<Counters>,
    done: Arc<AtomicBool>,
}

impl LocalWalker {
    pub fn new(options: WalkOptions) -> Self {
        Self {
            options,
            counters: Arc::new(Counters::default()),
            done: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn progress(&self, elapsed: Duration) -> WalkProgress {
        WalkProgress {
            dirs: self.counters.dirs.load(Ordering::Relaxed),
            files: self.counters.files.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
            elapsed,
        }
    }

    /// Walk `roots`, calling `progress_callback` every 100ms until done
    pub fn run_with_progress<F>(
        &self,
        roots: &[PathBuf],
        progress_callback: F,
    ) -> CatalogResult<WalkOutput>
    where
        F: Fn(WalkProgress) + Send + 'static,
    {
        let start = Instant::now();
        let done = Arc::clone(&self.done);
        let counters = Arc::clone(&self.counters);

        let progress_handle = thread::spawn(move || {
            while !done.load(Ordering::Relaxed) {
                progress_callback(WalkProgress {
                    dirs: counters.dirs.load(Ordering::Relaxed),
                    files: counters.files.load(Ordering::Relaxed),
                    errors: counters.errors.load(Ordering::Relaxed),
                    elapsed: start.elapsed(),
                });
                thread::sleep(Duration::from_millis(100));
            }
        });

        let result = self.run(roots);

        self.done.store(true, Ordering::SeqCst);
        let _ = progress_handle.join();

        result
    }

    pub fn run(&self, roots: &[PathBuf]) -> CatalogResult<WalkOutput> {
        let start = Instant::now();
        let worker_count = self.options.workers.max(1);

        info!(
            roots = roots.len(),
            workers = worker_count,
            collect_stat = self.options.collect_stat,
            "Starting walk"
        );

        let mut catalog = Catalog::new();
        let injector: Arc<Injector<DirWork>> = Arc::new(Injector::new());
        let pending_work = Arc::new(AtomicU64::new(0));

        // Roots are always stat'ed: we need their type to know whether to descend
        for root in roots {
            let meta = fs::symlink_metadata(root).map_err(|e| CatalogError::RootNotFound {
                path: root.clone(),
                reason: e.to_string(),
            })?;

            let entry = entry_from_metadata(root.clone(), &meta, 0);
            self.counters.record(entry.entry_type);
            if entry.entry_type.is_dir() {
                pending_work.fetch_add(1, Ordering::SeqCst);
                injector.push(DirWork {
                    path: root.clone(),
                    depth: 0,
                    mode: Some(entry.mode),
                });
            }
            catalog.push(entry);
        }

        let (entry_tx, entry_rx) = bounded::<Vec<FileEntry>>(100);

        let mut workers_local: Vec<DequeWorker<DirWork>> = Vec::new();
        let mut stealers: Vec<Stealer<DirWork>> = Vec::new();
        for _ in 0..worker_count {
            let w = DequeWorker::new_fifo();
            stealers.push(w.stealer());
            workers_local.push(w);
        }
        let stealers = Arc::new(stealers);

        let mut handles: Vec<JoinHandle<()>> = Vec::new();
        for (id, local) in workers_local.into_iter().enumerate() {
            let ctx = WorkerContext {
                id,
                options: self.options,
                injector: Arc::clone(&injector),
                stealers: Arc::clone(&stealers),
                entry_tx: entry_tx.clone(),
                pending_work: Arc::clone(&pending_work),
                counters: Arc::clone(&self.counters),
            };

            let handle = thread::Builder::new()
                .name(format!("walker-{}", id))
                .spawn(move || worker_loop(ctx, local))?;
            handles.push(handle);
        }

        // Drop our sender so the channel closes when the workers finish
        drop(entry_tx);

        for batch in entry_rx {
            for entry in batch {
                catalog.push(entry);
            }
        }

        let mut panicked = false;
        for handle in handles {
            panicked |= handle.join().is_err();
        }
        if panicked {
            return Err(CatalogError::WalkerPanicked);
        }

        let stats = WalkStats {
            dirs: self.counters.dirs.load(Ordering::Relaxed),
            files: self.counters.files.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
            duration: start.elapsed(),
        };

        info!(
            dirs = stats.dirs,
            files = stats.files,
            errors = stats.errors,
            duration_ms = stats.duration.as_millis() as u64,
            "Walk completed"
        );

        Ok(WalkOutput { catalog, stats })
    }
}

fn entry_from_metadata(path: PathBuf, meta: &Metadata, depth: u32) -> FileEntry {
    FileEntry {
        path,
        uid: meta.uid(),
        gid: meta.gid(),
        mode: ModeBits::from_mode(meta.mode()),
        entry_type: EntryType::from(meta.file_type()),
        depth,
    }
}

struct WorkerContext {
    id: usize,
    options: WalkOptions,
    injector: Arc<Injector<DirWork>>,
    stealers: Arc<Vec<Stealer<DirWork>>>,
    entry_tx: Sender<Vec<FileEntry>>,
    pending_work: Arc<AtomicU64>,
    counters: Arc<Counters>,
}

impl WorkerContext {
    /// Local queue first, then the injector, then other workers
    fn find_work(&self, local: &DequeWorker<DirWork>) -> Option<DirWork> {
        local.pop().or_else(|| {
            loop {
                match self.injector.steal_batch_and_pop(local) {
                    Steal::Success(w) => return Some(w),
                    Steal::Empty => break,
                    Steal::Retry => continue,
                }
            }
            for (i, stealer) in self.stealers.iter().enumerate() {
                if i == self.id {
                    continue;
                }
                loop {
                    match stealer.steal() {
                        Steal::Success(w) => return Some(w),
                        Steal::Empty => break,
                        Steal::Retry => continue,
                    }
                }
            }
            None
        })
    }
}

/// Worker thread - reads directories until no work is pending anywhere
fn worker_loop(ctx: WorkerContext, local: DequeWorker<DirWork>) {
    debug!("Walker {} started", ctx.id);

    let mut batch: Vec<FileEntry> = Vec::with_capacity(BATCH_SIZE);
    let mut idle_spins = 0;
    const MAX_IDLE_SPINS: u32 = 1000;

    loop {
        let work = match ctx.find_work(&local) {
            Some(w) => {
                idle_spins = 0;
                w
            }
            None => {
                if ctx.pending_work.load(Ordering::SeqCst) == 0 {
                    break;
                }
                idle_spins += 1;
                if idle_spins > MAX_IDLE_SPINS {
                    thread::sleep(Duration::from_micros(100));
                    idle_spins = 0;
                }
                continue;
            }
        };

        if ctx.options.requires_owner_rx {
            grant_owner_rx(&work);
        }

        match fs::read_dir(&work.path) {
            Ok(dir) => {
                for dirent in dir {
                    let dirent = match dirent {
                        Ok(d) => d,
                        Err(e) => {
                            ctx.counters.record_error();
                            warn!(
                                "Walker {} readdir entry failed: {} -> {}",
                                ctx.id,
                                work.path.display(),
                                e
                            );
                            continue;
                        }
                    };

                    let path = dirent.path();
                    let depth = work.depth + 1;

                    let entry = if ctx.options.collect_stat {
                        match fs::symlink_metadata(&path) {
                            Ok(meta) => entry_from_metadata(path, &meta, depth),
                            Err(e) => {
                                ctx.counters.record_error();
                                // Entries vanish on active filesystems
                                if e.kind() == ErrorKind::NotFound {
                                    debug!("Walker {} lstat not found: {}", ctx.id, path.display());
                                } else {
                                    warn!(
                                        "Walker {} lstat failed: {} -> {}",
                                        ctx.id,
                                        path.display(),
                                        e
                                    );
                                }
                                continue;
                            }
                        }
                    } else {
                        let entry_type = match dirent.file_type() {
                            Ok(t) => EntryType::from(t),
                            Err(e) => {
                                ctx.counters.record_error();
                                warn!(
                                    "Walker {} file type failed: {} -> {}",
                                    ctx.id,
                                    path.display(),
                                    e
                                );
                                continue;
                            }
                        };
                        FileEntry {
                            path,
                            uid: 0,
                            gid: 0,
                            mode: ModeBits::empty(),
                            entry_type,
                            depth,
                        }
                    };

                    ctx.counters.record(entry.entry_type);

                    if entry.entry_type.is_dir() {
                        ctx.pending_work.fetch_add(1, Ordering::SeqCst);
                        local.push(DirWork {
                            path: entry.path.clone(),
                            depth,
                            mode: ctx.options.collect_stat.then_some(entry.mode),
                        });
                    }

                    batch.push(entry);
                    if batch.len() >= BATCH_SIZE {
                        let full = std::mem::replace(&mut batch, Vec::with_capacity(BATCH_SIZE));
                        if ctx.entry_tx.send(full).is_err() {
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                ctx.counters.record_error();
                if e.kind() == ErrorKind::NotFound {
                    debug!("Walker {} readdir not found: {}", ctx.id, work.path.display());
                } else {
                    warn!("Walker {} readdir failed: {} -> {}", ctx.id, work.path.display(), e);
                }
            }
        }

        // Mark this work item as done
        ctx.pending_work.fetch_sub(1, Ordering::SeqCst);
    }

    if !batch.is_empty() {
        let _ = ctx.entry_tx.send(batch);
    }

    debug!("Walker {} finished", ctx.id);
}

/// Add owner read+execute to a directory missing either, so it can be read.
/// Only used when the final mode is known to carry both bits.
fn grant_owner_rx(work: &DirWork) {
    let needed = ModeBits::USER_READ | ModeBits::USER_EXEC;

    let mode = match work.mode {
        Some(mode) => mode,
        None => match fs::symlink_metadata(&work.path) {
            Ok(meta) => ModeBits::from_mode(meta.mode()),
            Err(e) => {
                debug!("Cannot stat {} to check owner access: {}", work.path.display(), e);
                return;
            }
        },
    };

    if mode.contains(needed) {
        return;
    }

    let granted = mode | needed;
    match fs::set_permissions(&work.path, Permissions::from_mode(granted.bits())) {
        Ok(()) => debug!("Granted u+rx on {} ({} -> {})", work.path.display(), mode, granted),
        Err(e) => debug!("Cannot grant u+rx on {}: {}", work.path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use std::path::Path;
    use tempfile::tempdir;

    fn build_tree(root: &Path) {
        fs::create_dir_all(root.join("a/b/c")).unwrap();
        fs::write(root.join("top.txt"), b"x").unwrap();
        fs::write(root.join("a/one.txt"), b"x").unwrap();
        fs::write(root.join("a/b/c/deep.txt"), b"x").unwrap();
        symlink("a/one.txt", root.join("link")).unwrap();
    }

    fn depth_of(catalog: &Catalog, path: &Path) -> u32 {
        catalog
            .iter()
            .find(|e| e.path == path)
            .map(|e| e.depth)
            .unwrap()
    }

    #[test]
    fn test_walk_records_all_entries() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("tree");
        build_tree(&root);

        let options = WalkOptions {
            workers: 3,
            ..Default::default()
        };
        let output = walk(&[root.clone()], options).unwrap();

        // root, top.txt, a, link, one.txt, b, c, deep.txt
        assert_eq!(output.catalog.len(), 8);
        assert_eq!(output.stats.dirs, 4);
        assert_eq!(output.stats.files, 4);
        assert_eq!(output.stats.errors, 0);

        assert_eq!(depth_of(&output.catalog, &root), 0);
        assert_eq!(depth_of(&output.catalog, &root.join("a/b/c/deep.txt")), 4);

        let link = output
            .catalog
            .iter()
            .find(|e| e.path == root.join("link"))
            .unwrap();
        assert_eq!(link.entry_type, EntryType::Symlink);
    }

    #[test]
    fn test_walk_without_stat() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("tree");
        build_tree(&root);

        let options = WalkOptions {
            collect_stat: false,
            workers: 2,
            ..Default::default()
        };
        let output = walk(&[root.clone()], options).unwrap();
        assert_eq!(output.catalog.len(), 8);

        let deep = output
            .catalog
            .iter()
            .find(|e| e.path == root.join("a/b/c/deep.txt"))
            .unwrap();
        assert_eq!(deep.entry_type, EntryType::Regular);
        assert_eq!(deep.mode, ModeBits::empty());
    }

    #[test]
    fn test_missing_root() {
        let dir = tempdir().unwrap();
        let err = walk(&[dir.path().join("missing")], WalkOptions::default()).unwrap_err();
        assert!(matches!(err, CatalogError::RootNotFound { .. }));
    }

    #[test]
    fn test_file_root() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("lonely.txt");
        fs::write(&file, b"x").unwrap();

        let output = walk(&[file.clone()], WalkOptions::default()).unwrap();
        assert_eq!(output.catalog.len(), 1);
        assert_eq!(output.catalog.entries()[0].depth, 0);
    }

    #[test]
    fn test_grants_owner_rx_when_required() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("tree");
        fs::create_dir_all(root.join("locked")).unwrap();
        fs::write(root.join("locked/inner.txt"), b"x").unwrap();
        fs::set_permissions(root.join("locked"), Permissions::from_mode(0o000)).unwrap();

        let options = WalkOptions {
            requires_owner_rx: true,
            workers: 2,
            ..Default::default()
        };
        let output = walk(&[root.clone()], options).unwrap();

        assert!(output
            .catalog
            .iter()
            .any(|e| e.path == root.join("locked/inner.txt")));

        let locked = output
            .catalog
            .iter()
            .find(|e| e.path == root.join("locked"))
            .unwrap();
        assert_eq!(locked.mode.bits(), 0o000);

        fs::set_permissions(root.join("locked"), Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_progress_rate() {
        let progress = WalkProgress {
            dirs: 100,
            files: 1000,
            errors: 0,
            elapsed: Duration::from_secs(10),
        };
        assert!((progress.entries_per_second() - 110.0).abs() < 0.1);
        assert_eq!(WalkProgress::default().entries_per_second(), 0.0);
    }
}

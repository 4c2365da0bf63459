//! Group name resolution
//!
//! The group database is queried once per run, by the coordinator only; the
//! answer is broadcast so every worker agrees on the gid, or on aborting.

use crate::collective::WorkerGroup;
use crate::error::GroupError;
use nix::unistd::Group;
use tracing::{info, warn};

/// Outcome of a group lookup, shared by value across workers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolvedGroup {
    pub found: bool,
    pub gid: u32,
}

/// Something that can map group names to ids
pub trait GroupDirectory {
    /// `Ok(None)` when the name is not in the directory
    fn lookup_group(&self, name: &str) -> Result<Option<u32>, GroupError>;
}

/// The system group database (`getgrnam_r`)
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemGroups;

impl GroupDirectory for SystemGroups {
    fn lookup_group(&self, name: &str) -> Result<Option<u32>, GroupError> {
        Group::from_name(name)
            .map(|group| group.map(|g| g.gid.as_raw()))
            .map_err(|e| GroupError::LookupFailed {
                name: name.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Resolve `name` to a gid on the coordinator and share it (collective).
///
/// Every worker returns [`GroupError::NotFound`] when the group is unknown,
/// and a lookup failure is treated the same way so no worker goes on alone.
pub fn resolve<D, G>(name: &str, directory: &D, group: &G) -> Result<ResolvedGroup, GroupError>
where
    D: GroupDirectory + ?Sized,
    G: WorkerGroup,
{
    let resolved = group.broadcast(0, || match directory.lookup_group(name) {
        Ok(Some(gid)) => ResolvedGroup { found: true, gid },
        Ok(None) => ResolvedGroup::default(),
        Err(e) => {
            warn!("Group lookup failed: {}", e);
            ResolvedGroup::default()
        }
    });

    if !resolved.found {
        return Err(GroupError::NotFound {
            name: name.to_string(),
        });
    }

    if group.is_coordinator() {
        info!(group = name, gid = resolved.gid, "Resolved group");
    }
    Ok(resolved)
}


#[cfg(test)]
mod tests {
    use super::test_support::FakeGroups;
    use super::*;
    use crate::collective::{SoloGroup, ThreadGroup};
    use std::sync::Arc;
    use std::thread;

    fn resolve_on_group(
        size: usize,
        name: &'static str,
        directory: Arc<FakeGroups>,
    ) -> Vec<Result<ResolvedGroup, GroupError>> {
        let handles: Vec<_> = ThreadGroup::new(size)
            .into_iter()
            .map(|worker| {
                let directory = Arc::clone(&directory);
                thread::spawn(move || resolve(name, directory.as_ref(), &worker))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    }

    #[test]
    fn test_single_lookup_shared() {
        let directory = Arc::new(FakeGroups::with("research", 5001));
        let results = resolve_on_group(4, "research", Arc::clone(&directory));

        assert_eq!(directory.lookups(), 1);
        for result in results {
            assert_eq!(result.unwrap(), ResolvedGroup { found: true, gid: 5001 });
        }
    }

    #[test]
    fn test_unknown_group_aborts_everyone() {
        let directory = Arc::new(FakeGroups::with("research", 5001));
        let results = resolve_on_group(3, "nope", Arc::clone(&directory));

        assert_eq!(directory.lookups(), 1);
        for result in results {
            assert_eq!(
                result.unwrap_err(),
                GroupError::NotFound {
                    name: "nope".into()
                }
            );
        }
    }

    #[test]
    fn test_solo() {
        let directory = FakeGroups::with("staff", 50);
        assert_eq!(resolve("staff", &directory, &SoloGroup).unwrap().gid, 50);
    }

    #[test]
    fn test_system_root_group() {
        // gid 0 is named "root" on Linux and "wheel" on the BSDs
        let found = ["root", "wheel"]
            .iter()
            .filter_map(|name| SystemGroups.lookup_group(name).ok().flatten())
            .next();
        assert_eq!(found, Some(0));
    }
}

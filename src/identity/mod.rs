//! User and group identity resolution
//!
//! Thin wrappers over the system user/group databases (`getpwuid_r`,
//! `getgrgid_r` and friends, through `nix`), plus a batch group lookup
//! that resolves many GIDs concurrently.
//!
//! The batch lookup is lossy on purpose: a GID with no group entry is
//! skipped, and results come back in completion order, not input order.

use std::fs;
use std::io;
use std::path::PathBuf;

use nix::unistd::{self, Gid, Uid};
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Upper bound on lookups running at once in [`resolve_groups_batch`]
const MAX_IN_FLIGHT: usize = 16;

/// "<inside> <outside> <count>" per line
const UID_MAP: &str = "/proc/self/uid_map";

/// A Unix user account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub gecos: String,
    pub dir: PathBuf,
    pub shell: PathBuf,
}

/// A Unix group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub name: String,
    pub gid: u32,
}

/// Error type for identity lookups
#[derive(Debug)]
pub enum IdentityError {
    /// The database has no entry for this name or id
    NotFound(String),
    /// The lookup itself failed
    Lookup(nix::Error),
    /// The user namespace mapping could not be read
    UidMap(io::Error),
}

impl std::fmt::Display for IdentityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentityError::NotFound(what) => write!(f, "no entry for {}", what),
            IdentityError::Lookup(e) => write!(f, "identity lookup failed: {}", e),
            IdentityError::UidMap(e) => write!(f, "cannot read {}: {}", UID_MAP, e),
        }
    }
}

impl std::error::Error for IdentityError {}

impl From<nix::Error> for IdentityError {
    fn from(e: nix::Error) -> Self {
        IdentityError::Lookup(e)
    }
}

impl From<unistd::User> for User {
    fn from(user: unistd::User) -> Self {
        Self {
            name: user.name,
            uid: user.uid.as_raw(),
            gid: user.gid.as_raw(),
            gecos: user.gecos.to_string_lossy().into_owned(),
            dir: user.dir,
            shell: user.shell,
        }
    }
}

impl From<unistd::Group> for Group {
    fn from(group: unistd::Group) -> Self {
        Self {
            name: group.name,
            gid: group.gid.as_raw(),
        }
    }
}

/// Resolve a user by name, or by numeric uid if `name_or_id` parses as one
pub fn resolve_user(name_or_id: &str) -> Result<User, IdentityError> {
    let found = match name_or_id.parse::<u32>() {
        Ok(uid) => unistd::User::from_uid(Uid::from_raw(uid))?,
        Err(_) => unistd::User::from_name(name_or_id)?,
    };
    found
        .map(User::from)
        .ok_or_else(|| IdentityError::NotFound(format!("user {}", name_or_id)))
}

/// Resolve a group by name, or by numeric gid if `name_or_id` parses as one
pub fn resolve_group(name_or_id: &str) -> Result<Group, IdentityError> {
    let found = match name_or_id.parse::<u32>() {
        Ok(gid) => unistd::Group::from_gid(Gid::from_raw(gid))?,
        Err(_) => unistd::Group::from_name(name_or_id)?,
    };
    found
        .map(Group::from)
        .ok_or_else(|| IdentityError::NotFound(format!("group {}", name_or_id)))
}

/// Look up one group by gid
pub fn lookup_group(gid: u32) -> Result<Group, IdentityError> {
    unistd::Group::from_gid(Gid::from_raw(gid))?
        .map(Group::from)
        .ok_or_else(|| IdentityError::NotFound(format!("gid {}", gid)))
}

/// The account of the calling process's real uid
pub fn current_user() -> Result<User, IdentityError> {
    let uid = unistd::getuid();
    unistd::User::from_uid(uid)?
        .map(User::from)
        .ok_or_else(|| IdentityError::NotFound(format!("uid {}", uid)))
}

/// The account of the calling process as seen from the host
///
/// Inside a user namespace `getuid` reports the namespaced id. This follows
/// `/proc/self/uid_map` back to the host uid; outside a namespace the map is
/// the identity and the result matches [`current_user`].
pub fn current_original_user() -> Result<User, IdentityError> {
    let uid = unistd::getuid().as_raw();
    let map = fs::read_to_string(UID_MAP).map_err(IdentityError::UidMap)?;
    let host = host_uid(&map, uid)
        .ok_or_else(|| IdentityError::NotFound(format!("unmapped uid {}", uid)))?;
    unistd::User::from_uid(Uid::from_raw(host))?
        .map(User::from)
        .ok_or_else(|| IdentityError::NotFound(format!("uid {}", host)))
}

/// Translate a namespaced uid through the contents of a `uid_map`
fn host_uid(map: &str, uid: u32) -> Option<u32> {
    let uid = u64::from(uid);
    map.lines().find_map(|line| {
        let mut fields = line.split_whitespace().map(|f| f.parse::<u64>().ok());
        let inside = fields.next()??;
        let outside = fields.next()??;
        let count = fields.next()??;
        if uid < inside || uid - inside >= count {
            return None;
        }
        u32::try_from(outside + (uid - inside)).ok()
    })
}

/// Resolve many gids concurrently
///
/// Each gid is looked up on the blocking pool, at most [`MAX_IN_FLIGHT`] at
/// a time. GIDs that cannot be resolved are left out. The order of the
/// returned groups is unspecified.
pub async fn resolve_groups_batch(gids: &[u32]) -> Vec<Group> {
    let mut pending = gids.iter().copied();
    let mut tasks = JoinSet::new();
    let mut groups = Vec::with_capacity(gids.len());

    debug!(count = gids.len(), "resolving groups");
    loop {
        while tasks.len() < MAX_IN_FLIGHT {
            let Some(gid) = pending.next() else { break };
            tasks.spawn_blocking(move || match lookup_group(gid) {
                Ok(group) => Some(group),
                Err(e) => {
                    debug!(gid, error = %e, "ignoring unresolvable group");
                    None
                }
            });
        }

        match tasks.join_next().await {
            Some(Ok(Some(group))) => groups.push(group),
            Some(Ok(None)) => {}
            Some(Err(e)) => warn!(error = %e, "group lookup task failed"),
            None => break,
        }
    }
    debug!(resolved = groups.len(), "groups resolved");
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_root_by_id_and_name() {
        let by_id = resolve_user("0").unwrap();
        assert_eq!(by_id.uid, 0);
        let by_name = resolve_user(&by_id.name).unwrap();
        assert_eq!(by_name, by_id);

        let group = resolve_group("0").unwrap();
        assert_eq!(group.gid, 0);
        assert_eq!(resolve_group(&group.name).unwrap(), group);
    }

    #[test]
    fn test_unknown_user_is_not_found() {
        assert!(matches!(
            resolve_user("cgvisor-no-such-user"),
            Err(IdentityError::NotFound(_))
        ));
        assert!(matches!(
            lookup_group(4_000_000_000),
            Err(IdentityError::NotFound(_))
        ));
    }

    #[test]
    fn test_host_uid_follows_map() {
        let identity = "         0          0 4294967295\n";
        assert_eq!(host_uid(identity, 1000), Some(1000));

        let rootless = "0 1000 1\n1 100000 65536\n";
        assert_eq!(host_uid(rootless, 0), Some(1000));
        assert_eq!(host_uid(rootless, 5), Some(100_004));
        assert_eq!(host_uid(rootless, 70_000), None);
        assert_eq!(host_uid("", 0), None);
    }

    #[test]
    fn test_current_original_user_matches_map() {
        let map = fs::read_to_string(UID_MAP).unwrap();
        let expected = host_uid(&map, unistd::getuid().as_raw()).unwrap();
        match current_original_user() {
            Ok(user) => assert_eq!(user.uid, expected),
            // The host account need not exist in this namespace's passwd
            Err(IdentityError::NotFound(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    #[tokio::test]
    async fn test_batch_skips_missing_groups() {
        let groups = resolve_groups_batch(&[0, 4_000_000_000, 4_000_000_001]).await;
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].gid, 0);
    }

    #[tokio::test]
    async fn test_batch_larger_than_in_flight_limit() {
        let gids = vec![0u32; MAX_IN_FLIGHT * 2 + 3];
        let groups = resolve_groups_batch(&gids).await;
        assert_eq!(groups.len(), gids.len());
        assert!(groups.iter().all(|g| g.gid == 0));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        assert!(resolve_groups_batch(&[]).await.is_empty());
    }
}

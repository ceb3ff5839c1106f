//! User and group name enrichment.
//!
//! Name lookups are best-effort: an unknown or deleted user/group, a
//! non-numeric id or a database error all resolve to `None`.

use nix::unistd::{Gid, Group, Uid, User};
use std::sync::Arc;
use tracing::debug;

/// Access to the OS identity database.
pub trait IdentityDatabase: Send + Sync {
    fn user_name(&self, uid: &str) -> Option<String>;
    fn group_name(&self, gid: &str) -> Option<String>;
}

/// Identity database backed by the system passwd/group sources.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemIdentityDatabase;

impl IdentityDatabase for SystemIdentityDatabase {
    fn user_name(&self, uid: &str) -> Option<String> {
        let raw = uid.parse::<u32>().ok()?;
        match User::from_uid(Uid::from_raw(raw)) {
            Ok(user) => user.map(|u| u.name),
            Err(e) => {
                debug!(uid, error = %e, "user lookup failed");
                None
            }
        }
    }

    fn group_name(&self, gid: &str) -> Option<String> {
        let raw = gid.parse::<u32>().ok()?;
        match Group::from_gid(Gid::from_raw(raw)) {
            Ok(group) => group.map(|g| g.name),
            Err(e) => {
                debug!(gid, error = %e, "group lookup failed");
                None
            }
        }
    }
}

/// Maps numeric ids to names over an [`IdentityDatabase`].
#[derive(Clone)]
pub struct NameResolver {
    database: Arc<dyn IdentityDatabase>,
}

impl NameResolver {
    pub fn new(database: Arc<dyn IdentityDatabase>) -> Self {
        Self { database }
    }

    pub fn user_name_for(&self, uid: &str) -> Option<String> {
        let name = self.database.user_name(uid);
        if name.is_none() {
            debug!(uid, "no user name for uid");
        }
        name
    }

    pub fn group_name_for(&self, gid: &str) -> Option<String> {
        let name = self.database.group_name(gid);
        if name.is_none() {
            debug!(gid, "no group name for gid");
        }
        name
    }
}

impl Default for NameResolver {
    fn default() -> Self {
        Self::new(Arc::new(SystemIdentityDatabase))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct StaticDatabase {
        users: HashMap<&'static str, &'static str>,
        groups: HashMap<&'static str, &'static str>,
    }

    impl IdentityDatabase for StaticDatabase {
        fn user_name(&self, uid: &str) -> Option<String> {
            self.users.get(uid).map(|n| n.to_string())
        }
        fn group_name(&self, gid: &str) -> Option<String> {
            self.groups.get(gid).map(|n| n.to_string())
        }
    }

    #[test]
    fn test_resolver_delegates_to_database() {
        let resolver = NameResolver::new(Arc::new(StaticDatabase {
            users: HashMap::from([("1000", "alice")]),
            groups: HashMap::from([("27", "sudo")]),
        }));

        assert_eq!(resolver.user_name_for("1000").as_deref(), Some("alice"));
        assert_eq!(resolver.group_name_for("27").as_deref(), Some("sudo"));
        assert_eq!(resolver.user_name_for("1001"), None);
        assert_eq!(resolver.group_name_for("28"), None);
    }

    #[test]
    fn test_system_database_rejects_non_numeric_ids() {
        let db = SystemIdentityDatabase;

        assert_eq!(db.user_name("alice"), None);
        assert_eq!(db.group_name(""), None);
        assert_eq!(db.group_name("-1"), None);
    }
}

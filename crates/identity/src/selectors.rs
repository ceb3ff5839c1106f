//! Deterministic selector construction.
//!
//! Selectors are `kind:value` strings matched by the policy engine. Order is
//! fixed so that identical identities always produce byte-identical lists.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::identity::{AttestedIdentity, ProcessIdentity};

/// A single `kind:value` fact about a process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Selector {
    pub kind: String,
    pub value: String,
}

impl Selector {
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}

/// Render selectors to their wire form.
pub fn selector_values(selectors: &[Selector]) -> Vec<String> {
    selectors.iter().map(Selector::to_string).collect()
}

/// Selector kinds emitted by the local strategy.
mod kind {
    pub const UID: &str = "uid";
    pub const USER: &str = "user";
    pub const GID: &str = "gid";
    pub const GROUP: &str = "group";
    pub const SUPPLEMENTARY_GID: &str = "supplementary_gid";
    pub const SUPPLEMENTARY_GROUP: &str = "supplementary_group";
    pub const PATH: &str = "path";
    pub const SHA256: &str = "sha256";
}

/// Selector kinds emitted by the external strategy, as spoken by the attestation module.
mod external_kind {
    pub const NAME: &str = "name";
    pub const SECRET: &str = "secret";
    pub const USER_ID: &str = "system:user_id";
    pub const USERNAME: &str = "system:username";
    pub const GROUP_ID: &str = "system:group_id";
    pub const GROUP_NAME: &str = "system:groupName";
    pub const SUPPLEMENTARY_GROUP_ID: &str = "system:supplementary_group_id";
    pub const SUPPLEMENTARY_GROUP_NAME: &str = "system:supplementary_group_name";
}

struct Kinds {
    uid: &'static str,
    user: &'static str,
    gid: &'static str,
    group: &'static str,
    supplementary_gid: &'static str,
    supplementary_group: &'static str,
}

const LOCAL: Kinds = Kinds {
    uid: kind::UID,
    user: kind::USER,
    gid: kind::GID,
    group: kind::GROUP,
    supplementary_gid: kind::SUPPLEMENTARY_GID,
    supplementary_group: kind::SUPPLEMENTARY_GROUP,
};

const EXTERNAL: Kinds = Kinds {
    uid: external_kind::USER_ID,
    user: external_kind::USERNAME,
    gid: external_kind::GROUP_ID,
    group: external_kind::GROUP_NAME,
    supplementary_gid: external_kind::SUPPLEMENTARY_GROUP_ID,
    supplementary_group: external_kind::SUPPLEMENTARY_GROUP_NAME,
};

/// Builds ordered selector lists from resolved identities.
#[derive(Debug, Default, Clone, Copy)]
pub struct SelectorBuilder;

impl SelectorBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Selectors for a locally resolved process.
    ///
    /// Order: uid, user, gid, group, each supplementary gid followed by its
    /// name, path, sha256. Absent optional facts are skipped.
    pub fn build(&self, identity: &ProcessIdentity) -> Vec<Selector> {
        let mut selectors = Vec::new();
        push_unix_facts(&mut selectors, identity, &LOCAL);

        if let Some(path) = &identity.executable_path {
            selectors.push(Selector::new(kind::PATH, path.as_str()));
        }
        if let Some(digest) = &identity.content_digest {
            selectors.push(Selector::new(kind::SHA256, digest.as_str()));
        }

        selectors
    }

    /// Selectors for an identity validated by the authorization service.
    pub fn build_external(&self, identity: &AttestedIdentity) -> Vec<Selector> {
        let mut selectors = vec![
            Selector::new(external_kind::NAME, identity.subject_name.as_str()),
            Selector::new(external_kind::SECRET, identity.secret.as_str()),
        ];
        push_unix_facts(&mut selectors, &identity.system, &EXTERNAL);
        selectors
    }
}

fn push_unix_facts(selectors: &mut Vec<Selector>, identity: &ProcessIdentity, kinds: &Kinds) {
    selectors.push(Selector::new(kinds.uid, identity.uid.as_str()));
    if let Some(user) = &identity.user_name {
        selectors.push(Selector::new(kinds.user, user.as_str()));
    }

    selectors.push(Selector::new(kinds.gid, identity.gid.as_str()));
    if let Some(group) = &identity.group_name {
        selectors.push(Selector::new(kinds.group, group.as_str()));
    }

    for gid in &identity.supplementary_gids {
        selectors.push(Selector::new(kinds.supplementary_gid, gid.as_str()));
        if let Some(Some(name)) = identity.supplementary_group_names.get(gid) {
            selectors.push(Selector::new(kinds.supplementary_group, name.as_str()));
        }
    }
}

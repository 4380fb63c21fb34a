//! Fact snapshots and the store that publishes them.
//!
//! A [`FactSnapshot`] is an immutable copy of the directory's user/group
//! graph. The [`FactStore`] swaps whole snapshots behind an [`ArcSwap`], so
//! readers never block and never observe a half-installed snapshot.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::AuthzResult;

/// Treat an explicit `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// A user's membership in one group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMembership {
    /// Group id.
    pub id: String,
    /// Member's role inside the group.
    #[serde(default, deserialize_with = "null_as_default")]
    pub role: String,
}

/// Facts about one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserFacts {
    /// Platform roles (`patient`, `clinic`, ...).
    #[serde(default, deserialize_with = "null_as_default")]
    pub roles: BTreeSet<String>,
    /// Group memberships.
    #[serde(default, deserialize_with = "null_as_default")]
    pub groups: Vec<GroupMembership>,
}

impl UserFacts {
    /// Ids of every group the user belongs to.
    pub fn group_ids(&self) -> BTreeSet<&str> {
        self.groups.iter().map(|g| g.id.as_str()).collect()
    }
}

/// Facts about one group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupFacts {
    /// Team type: clinic, trials, personal.
    #[serde(default, deserialize_with = "null_as_default")]
    pub group: String,
}

/// The raw document served by the directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryDocument {
    /// Users by id.
    #[serde(default, deserialize_with = "null_as_default")]
    pub users: BTreeMap<String, UserFacts>,
    /// Groups by id.
    #[serde(default, deserialize_with = "null_as_default")]
    pub groups: BTreeMap<String, GroupFacts>,
}

/// Immutable, versioned copy of the directory facts.
#[derive(Debug, Clone)]
pub struct FactSnapshot {
    version: u64,
    document: DirectoryDocument,
    policy_data: regorus::Value,
}

impl FactSnapshot {
    /// The empty bootstrap snapshot (version 0).
    pub fn empty() -> Self {
        Self {
            version: 0,
            document: DirectoryDocument::default(),
            policy_data: regorus::Value::from(serde_json::json!({ "users": {}, "groups": {} })),
        }
    }

    /// Build an unversioned snapshot from a directory document.
    ///
    /// The store assigns the version on install.
    pub fn from_document(document: DirectoryDocument) -> AuthzResult<Self> {
        let policy_data = regorus::Value::from(serde_json::to_value(&document)?);
        Ok(Self {
            version: 0,
            document,
            policy_data,
        })
    }

    /// Snapshot version; 0 for the bootstrap snapshot.
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// All users.
    pub const fn users(&self) -> &BTreeMap<String, UserFacts> {
        &self.document.users
    }

    /// All groups.
    pub const fn groups(&self) -> &BTreeMap<String, GroupFacts> {
        &self.document.groups
    }

    /// Look up one user.
    pub fn user(&self, id: &str) -> Option<&UserFacts> {
        self.document.users.get(id)
    }

    /// The facts as a rule engine data document (`{users, groups}`).
    pub const fn policy_data(&self) -> &regorus::Value {
        &self.policy_data
    }

    fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }
}

/// Publishes the current fact snapshot.
#[derive(Debug)]
pub struct FactStore {
    current: ArcSwap<FactSnapshot>,
    last_version: AtomicU64,
}

impl FactStore {
    /// Create a store holding the empty bootstrap snapshot.
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(FactSnapshot::empty()),
            last_version: AtomicU64::new(0),
        }
    }

    /// The current snapshot. Never blocks.
    pub fn current(&self) -> Arc<FactSnapshot> {
        self.current.load_full()
    }

    /// Install a snapshot and return the version it was assigned.
    ///
    /// Versions are handed out in call order; a slower install never
    /// replaces a snapshot carrying a newer version.
    pub fn install(&self, snapshot: FactSnapshot) -> u64 {
        let version = self.last_version.fetch_add(1, Ordering::SeqCst) + 1;
        let fresh = Arc::new(snapshot.with_version(version));
        self.current.rcu(|current| {
            if current.version() > version {
                Arc::clone(current)
            } else {
                Arc::clone(&fresh)
            }
        });
        version
    }
}

impl Default for FactStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document(n: usize) -> DirectoryDocument {
        let mut doc = DirectoryDocument::default();
        for i in 0..n {
            doc.users.insert(format!("user-{i}"), UserFacts::default());
            doc.groups.insert(format!("group-{i}"), GroupFacts::default());
        }
        doc
    }

    #[test]
    fn test_bootstrap_is_empty_version_zero() {
        let store = FactStore::new();
        let snapshot = store.current();
        assert_eq!(snapshot.version(), 0);
        assert!(snapshot.users().is_empty());
        assert!(snapshot.groups().is_empty());
    }

    #[test]
    fn test_install_assigns_increasing_versions() {
        let store = FactStore::new();
        let v1 = store.install(FactSnapshot::from_document(document(1)).unwrap());
        let v2 = store.install(FactSnapshot::from_document(document(2)).unwrap());
        assert_eq!((v1, v2), (1, 2));
        assert_eq!(store.current().version(), 2);
        assert_eq!(store.current().users().len(), 2);
    }

    #[test]
    fn test_directory_wire_shape() {
        let raw = json!({
            "users": {
                "u1": {"roles": ["patient"], "groups": [{"id": "g1", "role": "member"}]},
                "u2": {"roles": null, "groups": null}
            },
            "groups": {"g1": {"group": "clinic"}}
        });
        let doc: DirectoryDocument = serde_json::from_value(raw).unwrap();
        let u1 = &doc.users["u1"];
        assert!(u1.roles.contains("patient"));
        assert_eq!(u1.group_ids(), BTreeSet::from(["g1"]));
        assert!(doc.users["u2"].groups.is_empty());
        assert_eq!(doc.groups["g1"].group, "clinic");
    }

    #[test]
    fn test_concurrent_readers_see_whole_snapshots() {
        let store = Arc::new(FactStore::new());
        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for n in 1..50 {
                    store.install(FactSnapshot::from_document(document(n)).unwrap());
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        let snapshot = store.current();
                        assert_eq!(snapshot.users().len(), snapshot.groups().len());
                        assert_eq!(snapshot.users().len() as u64, snapshot.version());
                    }
                })
            })
            .collect();
        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(store.current().version(), 49);
    }
}

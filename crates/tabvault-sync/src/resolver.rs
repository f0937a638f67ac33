//! Record merge

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEntry {
    pub version: u64,
    /// Tombstones carry no data
    #[serde(default)]
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl SyncEntry {
    pub fn live(version: u64, data: Value) -> Self {
        Self {
            version,
            deleted: false,
            data: Some(data),
        }
    }

    pub fn tombstone(version: u64) -> Self {
        Self {
            version,
            deleted: true,
            data: None,
        }
    }
}

pub type SyncSet = BTreeMap<String, SyncEntry>;

/// Merge two record sets key by key.
///
/// A key on one side only is taken as is. A tombstone wins over a live
/// record, the remote tombstone first. Otherwise the higher version wins and
/// equal versions keep the local entry.
pub fn merge(local: &SyncSet, remote: &SyncSet) -> SyncSet {
    let mut merged = SyncSet::new();

    for key in local.keys().chain(remote.keys()) {
        if merged.contains_key(key) {
            continue;
        }
        let entry = match (local.get(key), remote.get(key)) {
            (Some(l), None) => l,
            (None, Some(r)) => r,
            (Some(_), Some(r)) if r.deleted => r,
            (Some(l), Some(_)) if l.deleted => l,
            (Some(l), Some(r)) if r.version > l.version => r,
            (Some(l), Some(_)) => l,
            (None, None) => continue,
        };
        merged.insert(key.clone(), entry.clone());
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn set(entries: &[(&str, SyncEntry)]) -> SyncSet {
        entries
            .iter()
            .map(|(k, e)| (k.to_string(), e.clone()))
            .collect()
    }

    #[test]
    fn test_one_sided_keys_kept() {
        let local = set(&[("a", SyncEntry::live(1, json!("la")))]);
        let remote = set(&[("b", SyncEntry::live(1, json!("rb")))]);

        let merged = merge(&local, &remote);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged["a"].data, Some(json!("la")));
        assert_eq!(merged["b"].data, Some(json!("rb")));
    }

    #[test]
    fn test_tombstones_win() {
        let local = set(&[
            ("a", SyncEntry::live(5, json!("la"))),
            ("b", SyncEntry::tombstone(1)),
        ]);
        let remote = set(&[
            ("a", SyncEntry::tombstone(2)),
            ("b", SyncEntry::live(9, json!("rb"))),
        ]);

        let merged = merge(&local, &remote);
        assert!(merged["a"].deleted);
        assert!(merged["b"].deleted);
    }

    #[test]
    fn test_higher_version_wins_and_ties_prefer_local() {
        let local = set(&[
            ("a", SyncEntry::live(1, json!("la"))),
            ("b", SyncEntry::live(3, json!("lb"))),
            ("c", SyncEntry::live(2, json!("lc"))),
        ]);
        let remote = set(&[
            ("a", SyncEntry::live(2, json!("ra"))),
            ("b", SyncEntry::live(1, json!("rb"))),
            ("c", SyncEntry::live(2, json!("rc"))),
        ]);

        let merged = merge(&local, &remote);
        assert_eq!(merged["a"].data, Some(json!("ra")));
        assert_eq!(merged["b"].data, Some(json!("lb")));
        assert_eq!(merged["c"].data, Some(json!("lc")));
    }

    #[test]
    fn test_commutative_without_ties() {
        let a = set(&[
            ("x", SyncEntry::live(1, json!(1))),
            ("y", SyncEntry::live(4, json!(2))),
            ("z", SyncEntry::tombstone(3)),
        ]);
        let b = set(&[
            ("x", SyncEntry::live(2, json!(3))),
            ("y", SyncEntry::live(3, json!(4))),
            ("w", SyncEntry::live(1, json!(5))),
        ]);

        assert_eq!(merge(&a, &b), merge(&b, &a));
    }

    #[test]
    fn test_idempotent() {
        let local = set(&[
            ("x", SyncEntry::live(1, json!(1))),
            ("y", SyncEntry::tombstone(2)),
        ]);
        let remote = set(&[
            ("x", SyncEntry::live(2, json!(2))),
            ("z", SyncEntry::live(1, json!(3))),
        ]);

        let once = merge(&local, &remote);
        assert_eq!(merge(&once, &remote), once);
        assert_eq!(merge(&once, &once), once);
    }
}

use std::hash::Hasher;

use fnv::FnvHasher;
use kube::ResourceExt;

use crate::Object;

/// One of `total` horizontal shards.
///
/// Objects are assigned by their UID: FNV-1a 64 followed by a jump consistent hash, so every
/// replica agrees on the owner of an object without coordinating.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Shard {
    index: u32,
    total: u32,
}

impl Default for Shard {
    /// A single shard that keeps everything.
    fn default() -> Self {
        Self { index: 0, total: 1 }
    }
}

impl Shard {
    /// Returns `None` unless `index < total`.
    pub fn new(index: u32, total: u32) -> Option<Self> {
        (index < total).then_some(Self { index, total })
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn is_sharded(&self) -> bool {
        self.total > 1
    }

    /// Reports whether `obj` belongs to this shard.
    pub fn keep<K: Object>(&self, obj: &K) -> bool {
        if !self.is_sharded() {
            return true;
        }
        self.owns(&obj.uid().unwrap_or_default())
    }

    fn owns(&self, uid: &str) -> bool {
        let mut h = FnvHasher::default();
        h.write(uid.as_bytes());
        jump_hash(h.finish(), self.total) == self.index
    }
}

/// Lamping and Veach's jump consistent hash: maps `key` onto `[0, buckets)`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn jump_hash(mut key: u64, buckets: u32) -> u32 {
    let mut b = 0;
    let mut j = 0.0;
    while j < f64::from(buckets) {
        b = j as u32;
        key = key.wrapping_mul(2_862_933_555_777_941_757).wrapping_add(1);
        let r = u32::try_from(key >> 33).unwrap_or(u32::MAX);
        j = (f64::from(b) + 1.0) * (2_147_483_648.0 / (f64::from(r) + 1.0));
    }
    b
}

#[cfg(test)]
mod tests {
    use super::*;

    use k8s_openapi::api::core::v1::ConfigMap;
    use serde_json::{from_value, json};

    fn cm(uid: &str) -> ConfigMap {
        from_value(json!({"metadata": {"name": "configmap1", "namespace": "ns1", "uid": uid}}))
            .unwrap()
    }

    #[test]
    fn exactly_one_shard_keeps() {
        let obj = cm("test_uid");
        let first = Shard::new(0, 2).unwrap();
        let second = Shard::new(1, 2).unwrap();
        assert!(first.keep(&obj));
        assert!(!second.keep(&obj));
    }

    #[test]
    fn assignments() {
        // uid, then the owning shard for 1, 2, 3, 5 and 10 shards.
        let table: &[(&str, [u32; 5])] = &[
            ("test_uid", [0, 0, 0, 0, 0]),
            ("a", [0, 1, 2, 2, 2]),
            ("b", [0, 0, 0, 3, 3]),
            ("uid-1", [0, 0, 0, 0, 9]),
            ("uid-3", [0, 1, 1, 4, 4]),
        ];
        for (uid, want) in table {
            for (total, want) in [1, 2, 3, 5, 10].into_iter().zip(want) {
                let owners: Vec<u32> = (0..total)
                    .filter(|i| Shard::new(*i, total).unwrap().keep(&cm(uid)))
                    .collect();
                assert_eq!(owners, vec![*want], "{uid} over {total} shards");
            }
        }
    }

    #[test]
    fn unsharded_keeps_everything() {
        assert!(Shard::default().keep(&cm("")));
        assert!(!Shard::default().is_sharded());
    }

    #[test]
    fn invalid() {
        assert_eq!(Shard::new(0, 0), None);
        assert_eq!(Shard::new(2, 2), None);
        assert_eq!(Shard::new(1, 2).map(|s| (s.index(), s.total())), Some((1, 2)));
    }
}

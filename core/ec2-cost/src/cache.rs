//! Tag labels of the running instances, shared between the instance and spot fetchers.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use tokio::sync::RwLock;

use crate::labels::LabelSet;

/// The state of the running instances, as seen by one run of the instance fetcher.
///
/// A snapshot is built completely before being published to the [`LabelCache`],
/// and never modified afterwards.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CacheSnapshot {
    tag_labels: FxHashMap<String, LabelSet>,
    vpc_members: FxHashSet<String>,
}

impl CacheSnapshot {
    /// Records the tag-derived labels of an instance and whether it runs in a VPC.
    pub fn insert(&mut self, instance_id: impl Into<String>, tag_labels: LabelSet, in_vpc: bool) {
        let instance_id = instance_id.into();
        if in_vpc {
            self.vpc_members.insert(instance_id.clone());
        } else {
            self.vpc_members.remove(&instance_id);
        }
        self.tag_labels.insert(instance_id, tag_labels);
    }

    pub fn tag_labels(&self, instance_id: &str) -> Option<&LabelSet> {
        self.tag_labels.get(instance_id)
    }

    pub fn is_vpc_member(&self, instance_id: &str) -> bool {
        self.vpc_members.contains(instance_id)
    }

    /// Number of instances in the snapshot.
    pub fn len(&self) -> usize {
        self.tag_labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tag_labels.is_empty()
    }
}

/// Reader/writer lock around the latest [`CacheSnapshot`].
///
/// The instance fetcher is the only writer: it replaces the whole snapshot at once,
/// under a single write guard. Readers take the current snapshot and keep it for as long
/// as they need it, without holding the lock. A reader therefore observes either the old
/// or the new snapshot, never a partially rebuilt one, and a slow reader does not delay
/// the next rebuild.
#[derive(Debug, Default)]
pub struct LabelCache {
    current: RwLock<Arc<CacheSnapshot>>,
}

impl LabelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a new snapshot, dropping the previous one (it stays alive
    /// until its last reader is done).
    pub async fn replace(&self, snapshot: CacheSnapshot) {
        let mut current = self.current.write().await;
        *current = Arc::new(snapshot);
    }

    /// Returns the latest published snapshot.
    pub async fn snapshot(&self) -> Arc<CacheSnapshot> {
        self.current.read().await.clone()
    }
}

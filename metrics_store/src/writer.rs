use std::sync::Arc;

use kube::runtime::watcher;
use metrics::counter;
use tracing::debug;

use crate::{MetricsStore, Object, Shard};

/// Applies watcher events to a [`MetricsStore`].
///
/// A relist (`Init` .. `InitDone`) is buffered and committed as one
/// [`replace`](MetricsStore::replace), so the store keeps serving the previous contents while the
/// list is in flight. Objects owned by another [`Shard`] are dropped before they reach the store.
pub struct Writer<K: Object> {
    store: Arc<MetricsStore<K>>,
    buffer: Option<Vec<K>>,
    shard: Shard,
}

impl<K: Object> Writer<K> {
    pub fn new(store: Arc<MetricsStore<K>>) -> Self {
        Self {
            store,
            buffer: None,
            shard: Shard::default(),
        }
    }

    #[must_use]
    pub fn sharded(mut self, shard: Shard) -> Self {
        self.shard = shard;
        self
    }

    pub fn store(&self) -> &Arc<MetricsStore<K>> {
        &self.store
    }

    pub fn apply_watcher_event(&mut self, event: &watcher::Event<K>) {
        let kind = match event {
            watcher::Event::Apply(obj) if !self.shard.keep(obj) => "skip",
            watcher::Event::Apply(obj) => {
                self.store.add(obj);
                "apply"
            }
            watcher::Event::Delete(obj) => {
                self.store.delete(obj);
                "delete"
            }
            watcher::Event::Init => {
                debug!(resource = self.store.resource(), "relist started");
                self.buffer = Some(Vec::new());
                "init"
            }
            watcher::Event::InitApply(obj) if !self.shard.keep(obj) => "skip",
            watcher::Event::InitApply(obj) => {
                self.buffer.get_or_insert_with(Vec::new).push(obj.clone());
                "init_apply"
            }
            watcher::Event::InitDone => {
                let objs = self.buffer.take().unwrap_or_default();
                debug!(
                    resource = self.store.resource(),
                    objects = objs.len(),
                    "relist done"
                );
                self.store.replace(&objs, None);
                "init_done"
            }
        };
        counter!(
            "kube_state_exporter_watch_events_total",
            "resource" => self.store.resource().to_string(),
            "event" => kind
        )
        .increment(1);
    }
}

use std::{fmt, sync::Arc};

use crate::{MetricsStore, Object};

/// Writes the full exposition text of one resource.
pub trait MetricsWriter: Send + Sync {
    /// The plural resource name, e.g. `pods`.
    fn resource(&self) -> &str;

    /// Appends every family, header first, to `out`.
    fn write_all(&self, out: &mut String);
}

impl<K: Object> MetricsWriter for MetricsStore<K> {
    fn resource(&self) -> &str {
        MetricsStore::resource(self)
    }

    fn write_all(&self, out: &mut String) {
        for family in self.get_all() {
            out.push_str(&family);
        }
    }
}

/// Merges several stores of the same resource, one per watched
/// namespace, so that every family header is written exactly once.
///
/// All stores must share the same generators. Each store is read from its own snapshot.
pub struct MultiStoreMetricsWriter<K: Object> {
    resource: String,
    stores: Vec<Arc<MetricsStore<K>>>,
}

impl<K: Object> MultiStoreMetricsWriter<K> {
    pub fn new(stores: Vec<Arc<MetricsStore<K>>>) -> Self {
        let resource = stores
            .first()
            .map(|s| s.resource().to_string())
            .unwrap_or_default();
        Self { resource, stores }
    }

    pub fn stores(&self) -> &[Arc<MetricsStore<K>>] {
        &self.stores
    }
}

impl<K: Object> MetricsWriter for MultiStoreMetricsWriter<K> {
    fn resource(&self) -> &str {
        &self.resource
    }

    fn write_all(&self, out: &mut String) {
        let Some(first) = self.stores.first() else {
            return;
        };
        let snaps: Vec<_> = self.stores.iter().map(|s| s.snapshot()).collect();
        for (i, header) in first.headers().iter().enumerate() {
            out.push_str(header);
            out.push('\n');
            for entry in snaps.iter().flatten() {
                if let Some(s) = entry.get(i) {
                    out.push_str(s);
                }
            }
        }
    }
}

impl<K: Object> fmt::Debug for MultiStoreMetricsWriter<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiStoreMetricsWriter")
            .field("resource", &self.resource)
            .field("stores", &self.stores.len())
            .finish()
    }
}

/// The set of writers served on a single scrape endpoint.
#[derive(Clone, Default)]
pub struct Collector {
    writers: Vec<Arc<dyn MetricsWriter>>,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, w: Arc<dyn MetricsWriter>) {
        self.writers.push(w);
    }

    #[must_use]
    pub fn with(mut self, w: Arc<dyn MetricsWriter>) -> Self {
        self.register(w);
        self
    }

    pub fn resources(&self) -> impl Iterator<Item = &str> {
        self.writers.iter().map(|w| w.resource())
    }

    pub fn write_all(&self, out: &mut String) {
        for w in &self.writers {
            w.write_all(out);
        }
    }

    /// Renders every registered resource, in registration order.
    pub fn get_all(&self) -> String {
        let mut out = String::new();
        self.write_all(&mut out);
        out
    }
}

impl fmt::Debug for Collector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.resources()).finish()
    }
}

use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use kube::ResourceExt;
use metric::Generators;
use metrics::{counter, gauge};
use tracing::{debug, error, trace};

use crate::Object;

/// Identifies an object: namespace and name, or just name for cluster-scoped kinds.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Key {
    namespace: Option<String>,
    name: String,
}

impl Key {
    fn of<K: Object>(obj: &K) -> Self {
        Self {
            namespace: obj.namespace(),
            name: obj.name_any(),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{ns}/{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

type Entries = BTreeMap<Key, Arc<[String]>>;

/// Caches the rendered families of every object of one kind in one namespace (or
/// cluster-wide).
///
/// Every entry holds one rendered string per family, in the same order as the headers. Entries
/// are only ever swapped whole, so readers never see a partial update.
pub struct MetricsStore<K: Object> {
    resource: String,
    namespace: String,
    generators: Arc<Generators<K>>,
    headers: Vec<String>,
    entries: RwLock<Entries>,
}

impl<K: Object> MetricsStore<K> {
    /// Creates an empty store for `resource`.
    ///
    /// `namespace` is only used to label logs and telemetry; pass `None` for stores covering
    /// every namespace or a cluster-scoped kind.
    pub fn new(
        resource: impl Into<String>,
        namespace: Option<&str>,
        generators: Arc<Generators<K>>,
    ) -> Self {
        let headers = generators.headers();
        Self {
            resource: resource.into(),
            namespace: namespace.unwrap_or_default().to_string(),
            generators,
            headers,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Renders `obj` and stores the result, replacing any previous entry.
    ///
    /// If rendering fails the previous entry, if any, is kept.
    pub fn add(&self, obj: &K) {
        let key = Key::of(obj);
        let rendered = match self.generators.render(obj) {
            Ok(r) => r,
            Err(err) => return self.generate_failed(&key, &err),
        };
        trace!(resource = self.resource, object = %key, "add");
        let n = {
            let mut entries = self.write();
            entries.insert(key, rendered.into());
            entries.len()
        };
        self.record_size(n);
    }

    /// Same as [`MetricsStore::add`]: entries are regenerated in full.
    pub fn update(&self, obj: &K) {
        self.add(obj)
    }

    /// Removes the entry for `obj`. Deleting an absent object is a no-op.
    pub fn delete(&self, obj: &K) {
        let key = Key::of(obj);
        trace!(resource = self.resource, object = %key, "delete");
        let n = {
            let mut entries = self.write();
            entries.remove(&key);
            entries.len()
        };
        self.record_size(n);
    }

    /// Swaps the whole store for `objects`.
    ///
    /// Everything is rendered before the lock is taken; readers see either the old contents or
    /// the new ones. An object that fails to render keeps its previous entry if it had one.
    pub fn replace<'a, I>(&self, objects: I, resource_version: Option<&str>)
    where
        I: IntoIterator<Item = &'a K>,
    {
        let mut next = Entries::new();
        let mut failed = Vec::new();
        for obj in objects {
            let key = Key::of(obj);
            match self.generators.render(obj) {
                Ok(r) => {
                    next.insert(key, r.into());
                }
                Err(err) => {
                    self.generate_failed(&key, &err);
                    failed.push(key);
                }
            }
        }
        let n = {
            let mut entries = self.write();
            for key in failed {
                if let Some(prev) = entries.remove(&key) {
                    next.insert(key, prev);
                }
            }
            *entries = next;
            entries.len()
        };
        debug!(
            resource = self.resource,
            namespace = self.namespace,
            resource_version,
            objects = n,
            "replaced store contents"
        );
        self.record_size(n);
    }

    /// Returns, for every family, its header followed by every object's lines.
    pub fn get_all(&self) -> Vec<String> {
        let snap = self.snapshot();
        self.headers
            .iter()
            .enumerate()
            .map(|(i, h)| {
                let mut out = String::with_capacity(h.len().saturating_add(1));
                out.push_str(h);
                out.push('\n');
                for e in &snap {
                    if let Some(s) = e.get(i) {
                        out.push_str(s);
                    }
                }
                out
            })
            .collect()
    }

    /// Returns the current entries; the lock is held only while cloning the pointers.
    pub(crate) fn snapshot(&self) -> Vec<Arc<[String]>> {
        self.read().values().cloned().collect()
    }

    fn read(&self) -> RwLockReadGuard<'_, Entries> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Entries> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn generate_failed(&self, key: &Key, err: &metric::Error) {
        error!(
            resource = self.resource,
            object = %key,
            error = %err,
            "unable to generate metrics, keeping previous entry"
        );
        counter!("kube_state_exporter_generate_errors_total", "resource" => self.resource.clone())
            .increment(1);
    }

    fn record_size(&self, n: usize) {
        gauge!(
            "kube_state_exporter_store_objects",
            "resource" => self.resource.clone(),
            "namespace" => self.namespace.clone()
        )
        .set(u32::try_from(n).map(f64::from).unwrap_or(f64::from(u32::MAX)));
    }
}

impl<K: Object> fmt::Debug for MetricsStore<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsStore")
            .field("resource", &self.resource)
            .field("namespace", &self.namespace)
            .field("families", &self.headers.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use k8s_openapi::api::core::v1::ConfigMap;
    use metric::{DefaultLabels, Error, FamilyGenerator, Metric};
    use serde_json::{from_value, json};

    fn generators() -> Arc<Generators<ConfigMap>> {
        Arc::new(Generators::new(
            DefaultLabels::new(&["namespace", "configmap"], |c: &ConfigMap| {
                vec![c.namespace().unwrap_or_default(), c.name_any()]
            }),
            vec![
                FamilyGenerator::gauge("kube_configmap_info", "Information about configmap.", |_| {
                    Ok(Metric::from_value(1.0).into())
                }),
                FamilyGenerator::gauge(
                    "kube_configmap_keys",
                    "Number of keys in the configmap.",
                    |c: &ConfigMap| {
                        if c.annotations().contains_key("broken") {
                            return Err(Error::InvalidValue("broken".into()));
                        }
                        let n = c.data.as_ref().map(|d| d.len()).unwrap_or_default();
                        Ok(Metric::from_value(f64::from(u32::try_from(n).unwrap())).into())
                    },
                ),
            ],
        ))
    }

    fn cm(name: &str, keys: &[&str]) -> ConfigMap {
        let data: BTreeMap<&str, &str> = keys.iter().map(|k| (*k, "v")).collect();
        from_value(json!({
            "metadata": {"name": name, "namespace": "default"},
            "data": data,
        }))
        .unwrap()
    }

    fn store() -> MetricsStore<ConfigMap> {
        MetricsStore::new("configmaps", Some("default"), generators())
    }

    #[test]
    fn empty_has_headers() {
        let s = store();
        assert!(s.is_empty());
        assert_eq!(
            s.get_all(),
            vec![
                "# HELP kube_configmap_info Information about configmap.\n# TYPE kube_configmap_info gauge\n",
                "# HELP kube_configmap_keys Number of keys in the configmap.\n# TYPE kube_configmap_keys gauge\n",
            ]
        );
    }

    #[test]
    fn add_is_idempotent() {
        let s = store();
        let c = cm("a", &["x"]);
        s.add(&c);
        let once = s.get_all();
        s.add(&c);
        assert_eq!(s.len(), 1);
        assert_eq!(s.get_all(), once);
        assert!(once[1].ends_with("kube_configmap_keys{namespace=\"default\",configmap=\"a\"} 1\n"));
    }

    #[test]
    fn update_replaces() {
        let s = store();
        s.add(&cm("a", &["x"]));
        s.update(&cm("a", &["x", "y"]));
        let all = s.get_all();
        assert!(all[1].contains("configmap=\"a\"} 2\n"));
        assert!(!all[1].contains("configmap=\"a\"} 1\n"));
    }

    #[test]
    fn delete() {
        let s = store();
        s.add(&cm("a", &[]));
        s.delete(&cm("a", &[]));
        assert!(s.is_empty());
        s.delete(&cm("a", &[]));
        assert!(s.is_empty());
    }

    #[test]
    fn replace_drops_missing() {
        let s = store();
        s.add(&cm("a", &[]));
        s.add(&cm("b", &[]));
        s.replace(&[cm("b", &["x"]), cm("c", &[])], Some("42"));
        let all = s.get_all().concat();
        assert!(!all.contains("configmap=\"a\""));
        assert!(all.contains("kube_configmap_keys{namespace=\"default\",configmap=\"b\"} 1\n"));
        assert!(all.contains("configmap=\"c\""));
        assert_eq!(s.len(), 2);
    }

    #[test_log::test]
    fn failure_keeps_previous() {
        let s = store();
        s.add(&cm("a", &["x"]));
        let before = s.get_all();

        let mut bad = cm("a", &["x", "y"]);
        bad.metadata.annotations = Some([("broken".to_string(), "yes".to_string())].into());
        s.add(&bad);
        assert_eq!(s.get_all(), before);

        s.replace([&bad, &cm("b", &[])], None);
        let all = s.get_all().concat();
        assert!(all.contains("configmap=\"a\"} 1\n"));
        assert!(all.contains("configmap=\"b\""));
    }

    #[test_log::test]
    fn failure_without_previous_is_absent() {
        let s = store();
        let mut bad = cm("a", &[]);
        bad.metadata.annotations = Some([("broken".to_string(), "yes".to_string())].into());
        s.add(&bad);
        assert!(s.is_empty());
    }
}

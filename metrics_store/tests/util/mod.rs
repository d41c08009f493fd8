#![allow(dead_code)]
use std::sync::Arc;

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use metric::{DefaultLabels, FamilyGenerator, Generators, Metric};
use metrics_store::MetricsStore;

pub fn pod_generators() -> Arc<Generators<Pod>> {
    Arc::new(Generators::new(
        DefaultLabels::new(&["namespace", "pod"], |p: &Pod| {
            vec![p.namespace().unwrap_or_default(), p.name_any()]
        }),
        vec![
            FamilyGenerator::gauge("kube_pod_info", "Information about pod.", |p: &Pod| {
                let node = p
                    .spec
                    .as_ref()
                    .and_then(|s| s.node_name.clone())
                    .unwrap_or_default();
                Ok(Metric::labeled(["node"], [node], 1.0).into())
            }),
            FamilyGenerator::gauge(
                "kube_pod_generation",
                "Sequence number representing a specific generation of the desired state.",
                |p: &Pod| {
                    let g = p.metadata.generation.unwrap_or_default();
                    let g = u32::try_from(g).unwrap_or_default();
                    Ok(Metric::from_value(f64::from(g)).into())
                },
            ),
        ],
    ))
}

pub fn pod(namespace: &str, name: &str, generation: i64) -> Pod {
    serde_json::from_value(serde_json::json!({
        "metadata": {"namespace": namespace, "name": name, "generation": generation},
        "spec": {"nodeName": "node-1", "containers": []},
    }))
    .expect("invalid pod")
}

pub fn pod_store(namespace: &str) -> Arc<MetricsStore<Pod>> {
    Arc::new(MetricsStore::new("pods", Some(namespace), pod_generators()))
}

pub mod prelude {
    pub use std::{sync::Arc, thread};

    pub use kube::runtime::watcher::Event;
    pub use metrics_store::*;
}

#![allow(dead_code)]
use std::sync::Arc;

use k8s_openapi::api::core::v1::Pod;
use metrics_store::{Collector, MetricsStore};
use resources::{Allowed, pod};
use serde_json::{from_value, json};

pub const RESPONSE_LIMIT: usize = 1024 * 1024 * 10;

pub fn new_pod(namespace: &str, name: &str) -> Pod {
    from_value(json!({
        "metadata": {
            "namespace": namespace,
            "name": name,
            "uid": format!("{namespace}-{name}"),
            "labels": {"app": name},
        },
        "spec": {
            "nodeName": "node-1",
            "containers": [{"name": "main"}],
        },
        "status": {"phase": "Running"},
    }))
    .expect("bad pod")
}

/// Returns a collector over one pod store per namespace, with `per_namespace`
/// pods already added to each.
pub fn pod_collector(namespaces: &[&str], per_namespace: usize) -> Arc<Collector> {
    let generators = Arc::new(pod::families(&Allowed {
        labels: vec!["app".into()],
        annotations: vec![],
    }));
    let stores: Vec<_> = namespaces
        .iter()
        .map(|ns| {
            let store = Arc::new(MetricsStore::new("pods", Some(*ns), generators.clone()));
            for i in 0..per_namespace {
                store.add(&new_pod(ns, &format!("pod-{i}")));
            }
            store
        })
        .collect();
    Arc::new(Collector::new().with(Arc::new(metrics_store::MultiStoreMetricsWriter::new(stores))))
}

pub mod prelude {
    pub use std::sync::Arc;

    pub use axum::{
        body::Body,
        http::{StatusCode, header, request::Request},
    };
    pub use tower::util::ServiceExt;

    pub use super::*;
}

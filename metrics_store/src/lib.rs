//! Keeps one pre-rendered blob of metrics text per watched object and serves
//! scrape snapshots from it.
//!
//! Rendering happens when an object changes, not when it's scraped: a scrape is string
//! concatenation over the cached entries. The cache is fed by [`Writer`] from a
//! `kube::runtime::watcher` stream, and read through a [`Collector`].

use kube::Resource;

mod collector;
mod sharding;
mod store;
mod writer;

pub use collector::{Collector, MetricsWriter, MultiStoreMetricsWriter};
pub use sharding::Shard;
pub use store::MetricsStore;
pub use writer::Writer;

/// Any statically-typed Kubernetes object the store can hold.
pub trait Object: Resource<DynamicType = ()> + Clone + Send + Sync + 'static {}

impl<K> Object for K where K: Resource<DynamicType = ()> + Clone + Send + Sync + 'static {}

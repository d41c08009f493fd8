//! Builder turns the configured resources into watch tasks and a [`Collector`] over their stores.

use std::fmt::Debug;

use k8s_openapi::{
    api::{
        apps::v1::Deployment,
        core::v1::{
            ConfigMap, Namespace, Node, PersistentVolume, PersistentVolumeClaim, Pod, Secret,
            Service,
        },
    },
    apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition,
};
use kube::runtime::WatchStreamExt;
use metric::{CompositeFilter, Generators};
use metrics::counter;
use metrics_store::{MultiStoreMetricsWriter, Object, Shard};
use resources::Resource;
use serde::de::DeserializeOwned;
use tokio::task::JoinSet;

use crate::{
    WATCH_ERRORS,
    config::{Options, field_selector},
    prelude::*,
};

/// Holds what's needed to start watching.
pub struct Builder<'a> {
    client: kube::Client,
    opts: &'a Options,
    token: CancellationToken,
}

impl<'a> Builder<'a> {
    pub fn new(client: kube::Client, opts: &'a Options, token: CancellationToken) -> Self {
        Self {
            client,
            opts,
            token,
        }
    }

    /// Spawns one watch task per store onto `tasks` and returns the collector reading from
    /// those stores, one writer per resource in exposition order.
    pub fn build(&self, tasks: &mut JoinSet<Result<()>>) -> Result<Collector> {
        use resources::{
            configmap, customresourcedefinition, deployment, namespace, node, persistentvolume,
            persistentvolumeclaim, pod, secret, service,
        };

        let filter = self.opts.filter()?;
        let shard = self.opts.shard()?;
        let mut collector = Collector::new();
        for r in self.opts.enabled_resources()? {
            let allowed = self.opts.allowed(r);
            let writer: Arc<dyn MetricsWriter> = match r {
                Resource::ConfigMaps => self.watch::<ConfigMap>(
                    r,
                    configmap::families(&allowed),
                    &filter,
                    shard,
                    tasks,
                ),
                Resource::CustomResourceDefinitions => self.watch::<CustomResourceDefinition>(
                    r,
                    customresourcedefinition::families(&allowed),
                    &filter,
                    shard,
                    tasks,
                ),
                Resource::Deployments => self.watch::<Deployment>(
                    r,
                    deployment::families(&allowed),
                    &filter,
                    shard,
                    tasks,
                ),
                Resource::Namespaces => self.watch::<Namespace>(
                    r,
                    namespace::families(&allowed),
                    &filter,
                    shard,
                    tasks,
                ),
                Resource::Nodes => self.watch::<Node>(
                    r,
                    node::families(&allowed),
                    &filter,
                    shard,
                    tasks,
                ),
                Resource::PersistentVolumeClaims => self.watch::<PersistentVolumeClaim>(
                    r,
                    persistentvolumeclaim::families(&allowed),
                    &filter,
                    shard,
                    tasks,
                ),
                Resource::PersistentVolumes => self.watch::<PersistentVolume>(
                    r,
                    persistentvolume::families(&allowed),
                    &filter,
                    shard,
                    tasks,
                ),
                Resource::Pods => self.watch::<Pod>(
                    r,
                    pod::families(&allowed),
                    &filter,
                    shard,
                    tasks,
                ),
                Resource::Secrets => self.watch::<Secret>(
                    r,
                    secret::families(&allowed),
                    &filter,
                    shard,
                    tasks,
                ),
                Resource::Services => self.watch::<Service>(
                    r,
                    service::families(&allowed),
                    &filter,
                    shard,
                    tasks,
                ),
            };
            collector.register(writer);
        }
        Ok(collector)
    }

    fn watch<K>(
        &self,
        r: Resource,
        generators: Generators<K>,
        filter: &CompositeFilter,
        shard: Shard,
        tasks: &mut JoinSet<Result<()>>,
    ) -> Arc<dyn MetricsWriter>
    where
        K: Object + DeserializeOwned + Debug,
    {
        let generators = Arc::new(generators.filter(filter));
        let namespaces: Vec<Option<&str>> = if r.namespaced() && !self.opts.namespaces.is_empty()
        {
            self.opts.namespaces.iter().map(|ns| Some(ns.as_str())).collect()
        } else {
            vec![None]
        };
        let denylist: &[String] = if r.namespaced() {
            &self.opts.namespaces_denylist
        } else {
            &[]
        };
        info!(
            resource = %r,
            families = generators.len(),
            stores = namespaces.len(),
            shard = shard.index(),
            total_shards = shard.total(),
            "watching resource"
        );

        let stores = namespaces
            .into_iter()
            .map(|ns| {
                let store = Arc::new(MetricsStore::new(r.to_string(), ns, generators.clone()));
                let mut config = watcher::Config::default();
                if let Some(sel) = field_selector(ns, denylist) {
                    config = config.fields(&sel);
                }
                tasks.spawn(watch(
                    Api::<K>::all(self.client.clone()),
                    config,
                    Writer::new(store.clone()).sharded(shard),
                    self.token.clone(),
                ));
                store
            })
            .collect();
        Arc::new(MultiStoreMetricsWriter::new(stores))
    }
}

/// Feeds one store until the token is cancelled.
///
/// Stream errors are counted and logged; the watcher backs off and relists on its own.
#[instrument(skip_all, fields(resource = writer.store().resource(), selector = config.field_selector.as_deref()))]
async fn watch<K>(
    api: Api<K>,
    config: watcher::Config,
    mut writer: Writer<K>,
    token: CancellationToken,
) -> Result<()>
where
    K: Object + DeserializeOwned + Debug,
{
    let resource = writer.store().resource().to_string();
    let stream = watcher(api, config).default_backoff();
    let mut stream = std::pin::pin!(stream);
    debug!("watch started");
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            ev = stream.next() => match ev {
                Some(Ok(ev)) => writer.apply_watcher_event(&ev),
                Some(Err(err)) => {
                    counter!(WATCH_ERRORS, "resource" => resource.clone()).increment(1);
                    warn!(error = %err, "watch error");
                }
                None => break,
            },
        }
    }
    debug!("watch stopped");
    Ok(())
}

use k8s_openapi::api::core::v1::ConfigMap;
use kube::ResourceExt;
use metric::{DefaultLabels, FamilyGenerator, Generators, Metric};

use crate::{Allowed, utils};

const PREFIX: &str = "kube_configmap";

pub fn families(allowed: &Allowed) -> Generators<ConfigMap> {
    Generators::new(
        DefaultLabels::new(&["namespace", "configmap"], |c: &ConfigMap| {
            vec![c.namespace().unwrap_or_default(), c.name_any()]
        }),
        vec![
            utils::annotations(PREFIX, &allowed.annotations),
            utils::labels(PREFIX, &allowed.labels).stable(),
            FamilyGenerator::gauge("kube_configmap_info", "Information about configmap.", |_| {
                Ok(Metric::from_value(1.0).into())
            })
            .stable(),
            utils::created(PREFIX).stable(),
            utils::metadata_resource_version(
                PREFIX,
                "Resource version representing a specific version of the configmap.",
            ),
        ],
    )
}

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Pod, ResourceRequirements};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::ResourceExt;
use metric::{DefaultLabels, Family, FamilyGenerator, Generators, Metric, Result};

use crate::{Allowed, Unit, utils};

const PREFIX: &str = "kube_pod";
const PHASES: [&str; 5] = ["Pending", "Succeeded", "Failed", "Unknown", "Running"];
const READY: &str = "Ready";

fn info(p: &Pod) -> Metric {
    let spec = p.spec.as_ref();
    let status = p.status.as_ref();
    let controller = p
        .owner_references()
        .iter()
        .find(|o| o.controller.unwrap_or_default());
    let host_network = spec.and_then(|s| s.host_network).unwrap_or_default();
    Metric::labeled(
        [
            "host_ip",
            "pod_ip",
            "node",
            "created_by_kind",
            "created_by_name",
            "priority_class",
            "host_network",
        ],
        [
            utils::or_empty(status.and_then(|s| s.host_ip.as_ref())),
            utils::or_empty(status.and_then(|s| s.pod_ip.as_ref())),
            utils::or_empty(spec.and_then(|s| s.node_name.as_ref())),
            controller.map(|o| o.kind.clone()).unwrap_or_default(),
            controller.map(|o| o.name.clone()).unwrap_or_default(),
            utils::or_empty(spec.and_then(|s| s.priority_class_name.as_ref())),
            host_network.to_string(),
        ],
        1.0,
    )
}

fn owners(p: &Pod) -> Family {
    const KEYS: [&str; 3] = ["owner_kind", "owner_name", "owner_is_controller"];
    let refs = p.owner_references();
    if refs.is_empty() {
        return Metric::labeled(KEYS, Default::default(), 1.0).into();
    }
    refs.iter()
        .map(|o| {
            Metric::labeled(
                KEYS,
                [
                    o.kind.clone(),
                    o.name.clone(),
                    o.controller.unwrap_or_default().to_string(),
                ],
                1.0,
            )
        })
        .collect()
}

/// Reports one series per container and reported resource of either the
/// requests or the limits. Cores keep their millesimal precision; everything else is a whole
/// number.
fn container_resources(
    p: &Pod,
    list: fn(&ResourceRequirements) -> Option<&BTreeMap<String, Quantity>>,
) -> Result<Family> {
    let Some(spec) = p.spec.as_ref() else {
        return Ok(Family::empty());
    };
    let node = utils::or_empty(spec.node_name.as_ref());
    let mut family = Family::empty();
    for c in &spec.containers {
        let resources = c.resources.as_ref().and_then(list);
        for r in utils::resource_list(resources) {
            let (resource, unit, amount) = r?;
            let value = match unit {
                Unit::Core => amount.as_float(),
                Unit::Byte | Unit::Integer => utils::int_float(amount.value()),
            };
            family.push(Metric::labeled(
                ["container", "node", "resource", "unit"],
                [c.name.clone(), node.clone(), resource, unit.to_string()],
                value,
            ));
        }
    }
    Ok(family)
}

pub fn families(allowed: &Allowed) -> Generators<Pod> {
    Generators::new(
        DefaultLabels::new(&["namespace", "pod"], |p: &Pod| {
            vec![p.namespace().unwrap_or_default(), p.name_any()]
        }),
        vec![
            FamilyGenerator::gauge("kube_pod_info", "Information about pod.", |p: &Pod| {
                Ok(info(p).into())
            })
            .stable(),
            utils::created(PREFIX).stable(),
            FamilyGenerator::gauge(
                "kube_pod_start_time",
                "Start time in unix timestamp for a pod.",
                |p: &Pod| {
                    let start = p.status.as_ref().and_then(|s| s.start_time.as_ref());
                    Ok(utils::timestamp_family(start))
                },
            )
            .stable(),
            FamilyGenerator::gauge(
                "kube_pod_owner",
                "Information about the Pod's owner.",
                |p: &Pod| Ok(owners(p)),
            )
            .stable(),
            utils::labels(PREFIX, &allowed.labels).stable(),
            utils::annotations(PREFIX, &allowed.annotations),
            FamilyGenerator::gauge("kube_pod_status_phase", "The pods current phase.", |p: &Pod| {
                let phase = p.status.as_ref().and_then(|s| s.phase.as_deref());
                Ok(utils::phase_family(phase, &PHASES))
            })
            .stable(),
            FamilyGenerator::gauge(
                "kube_pod_status_ready",
                "Describes whether the pod is ready to serve requests.",
                |p: &Pod| {
                    let conditions = p.status.as_ref().and_then(|s| s.conditions.as_ref());
                    Ok(conditions
                        .into_iter()
                        .flatten()
                        .filter(|c| c.type_ == READY)
                        .flat_map(|c| utils::status_metrics(&c.status))
                        .collect())
                },
            )
            .stable(),
            FamilyGenerator::counter(
                "kube_pod_container_status_restarts_total",
                "The number of container restarts per container.",
                |p: &Pod| {
                    let statuses = p.status.as_ref().and_then(|s| s.container_statuses.as_ref());
                    Ok(statuses
                        .into_iter()
                        .flatten()
                        .map(|cs| {
                            Metric::labeled(
                                ["container"],
                                [cs.name.clone()],
                                f64::from(cs.restart_count),
                            )
                        })
                        .collect())
                },
            )
            .stable(),
            FamilyGenerator::gauge(
                "kube_pod_container_resource_requests",
                "The number of requested request resource by a container. It is recommended to use the kube_pod_resource_requests metric exposed by kube-scheduler instead, as it is more precise.",
                |p: &Pod| container_resources(p, |r| r.requests.as_ref()),
            ),
            FamilyGenerator::gauge(
                "kube_pod_container_resource_limits",
                "The number of requested limit resource by a container. It is recommended to use the kube_pod_resource_limits metric exposed by kube-scheduler instead, as it is more precise.",
                |p: &Pod| container_resources(p, |r| r.limits.as_ref()),
            ),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::fixture_tests;

    fixture_tests!(
        Pod,
        families(&Allowed::default()),
        controlled,
        no_owners,
        ready_and_restarts,
        resources,
    );
}

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Node, NodeSystemInfo};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::ResourceExt;
use metric::{DefaultLabels, Family, FamilyGenerator, Generators, Metric, Result};

use crate::{Allowed, utils};

const PREFIX: &str = "kube_node";
const ROLE_LABEL_PREFIX: &str = "node-role.kubernetes.io/";
const INTERNAL_IP: &str = "InternalIP";

/// Reports every resource of a node resource list with its unit.
fn resource_family(list: Option<&BTreeMap<String, Quantity>>) -> Result<Family> {
    utils::resource_list(list)
        .map(|r| {
            r.map(|(name, unit, amount)| {
                Metric::labeled(["resource", "unit"], [name, unit.to_string()], amount.as_float())
            })
        })
        .collect()
}

fn info(n: &Node) -> Metric {
    let spec = n.spec.as_ref();
    let status = n.status.as_ref();
    let node_info = status.and_then(|s| s.node_info.as_ref());
    let field = |f: fn(&NodeSystemInfo) -> &String| {
        node_info.map(f).cloned().unwrap_or_default()
    };
    // The last internal address wins.
    let internal_ip = status
        .and_then(|s| s.addresses.as_ref())
        .into_iter()
        .flatten()
        .rev()
        .find(|a| a.type_ == INTERNAL_IP)
        .map(|a| a.address.clone())
        .unwrap_or_default();
    Metric::labeled(
        [
            "kernel_version",
            "os_image",
            "container_runtime_version",
            "kubelet_version",
            "kubeproxy_version",
            "provider_id",
            "pod_cidr",
            "system_uuid",
            "internal_ip",
        ],
        [
            field(|i| &i.kernel_version),
            field(|i| &i.os_image),
            field(|i| &i.container_runtime_version),
            field(|i| &i.kubelet_version),
            "deprecated".to_string(),
            utils::or_empty(spec.and_then(|s| s.provider_id.as_ref())),
            utils::or_empty(spec.and_then(|s| s.pod_cidr.as_ref())),
            field(|i| &i.system_uuid),
            internal_ip,
        ],
        1.0,
    )
}

pub fn families(allowed: &Allowed) -> Generators<Node> {
    Generators::new(
        DefaultLabels::new(&["node"], |n: &Node| vec![n.name_any()]),
        vec![
            utils::created(PREFIX).stable(),
            FamilyGenerator::gauge(
                "kube_node_info",
                "Information about a cluster node.",
                |n: &Node| Ok(info(n).into()),
            )
            .stable(),
            utils::annotations(PREFIX, &allowed.annotations),
            utils::labels(PREFIX, &allowed.labels).stable(),
            FamilyGenerator::gauge("kube_node_role", "The role of a cluster node.", |n: &Node| {
                Ok(n.labels()
                    .keys()
                    .filter_map(|k| k.strip_prefix(ROLE_LABEL_PREFIX))
                    .map(|role| Metric::labeled(["role"], [role.to_string()], 1.0))
                    .collect())
            }),
            FamilyGenerator::gauge(
                "kube_node_spec_taint",
                "The taint of a cluster node.",
                |n: &Node| {
                    let taints = n.spec.as_ref().and_then(|s| s.taints.as_ref());
                    Ok(taints
                        .into_iter()
                        .flatten()
                        .map(|t| {
                            Metric::labeled(
                                ["key", "value", "effect"],
                                [t.key.clone(), utils::or_empty(t.value.as_ref()), t.effect.clone()],
                                1.0,
                            )
                        })
                        .collect())
                },
            )
            .stable(),
            FamilyGenerator::gauge(
                "kube_node_spec_unschedulable",
                "Whether a node can schedule new pods.",
                |n: &Node| {
                    let u = n
                        .spec
                        .as_ref()
                        .and_then(|s| s.unschedulable)
                        .unwrap_or_default();
                    Ok(Metric::from_value(utils::bool_float(u)).into())
                },
            )
            .stable(),
            FamilyGenerator::gauge(
                "kube_node_status_allocatable",
                "The allocatable for different resources of a node that are available for scheduling.",
                |n: &Node| resource_family(n.status.as_ref().and_then(|s| s.allocatable.as_ref())),
            )
            .stable(),
            FamilyGenerator::gauge(
                "kube_node_status_capacity",
                "The capacity for different resources of a node.",
                |n: &Node| resource_family(n.status.as_ref().and_then(|s| s.capacity.as_ref())),
            )
            .stable(),
            FamilyGenerator::gauge(
                "kube_node_status_condition",
                "The condition of a cluster node.",
                |n: &Node| {
                    let conditions = n.status.as_ref().and_then(|s| s.conditions.as_ref());
                    Ok(conditions
                        .into_iter()
                        .flatten()
                        .flat_map(|c| utils::condition_metrics(&c.type_, &c.status))
                        .collect())
                },
            )
            .stable(),
            FamilyGenerator::gauge(
                "kube_node_status_addresses",
                "Node address information.",
                |n: &Node| {
                    let addresses = n.status.as_ref().and_then(|s| s.addresses.as_ref());
                    Ok(addresses
                        .into_iter()
                        .flatten()
                        .map(|a| {
                            Metric::labeled(
                                ["type", "address"],
                                [a.type_.clone(), a.address.clone()],
                                1.0,
                            )
                        })
                        .collect())
                },
            ),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::fixture_tests;
    use serde_json::{from_value, json};

    fixture_tests!(
        Node,
        families(&Allowed::default()),
        node_info,
        roles_and_taints,
        resources,
        conditions,
    );

    #[test]
    fn bad_quantity() {
        let n: Node = from_value(json!({
            "metadata": {"name": "n1"},
            "status": {"capacity": {"cpu": "lots"}},
        }))
        .unwrap();
        let err = families(&Allowed::default()).render(&n).unwrap_err();
        assert!(err.to_string().contains("kube_node_status_capacity"), "{err}");
    }
}

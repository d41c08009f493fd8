use k8s_openapi::api::core::v1::Service;
use kube::ResourceExt;
use metric::{DefaultLabels, FamilyGenerator, Generators, Metric};

use crate::{Allowed, utils};

const PREFIX: &str = "kube_service";

pub fn families(allowed: &Allowed) -> Generators<Service> {
    Generators::new(
        DefaultLabels::new(&["namespace", "service"], |s: &Service| {
            vec![s.namespace().unwrap_or_default(), s.name_any()]
        }),
        vec![
            FamilyGenerator::gauge("kube_service_info", "Information about service.", |s: &Service| {
                let spec = s.spec.as_ref();
                Ok(Metric::labeled(
                    ["cluster_ip", "external_name", "load_balancer_ip"],
                    [
                        utils::or_empty(spec.and_then(|s| s.cluster_ip.as_ref())),
                        utils::or_empty(spec.and_then(|s| s.external_name.as_ref())),
                        utils::or_empty(spec.and_then(|s| s.load_balancer_ip.as_ref())),
                    ],
                    1.0,
                )
                .into())
            }),
            utils::created(PREFIX),
            FamilyGenerator::gauge("kube_service_spec_type", "Type about service.", |s: &Service| {
                let type_ = s.spec.as_ref().and_then(|s| s.type_.as_ref());
                Ok(Metric::labeled(["type"], [utils::or_empty(type_)], 1.0).into())
            }),
            utils::annotations(PREFIX, &allowed.annotations),
            utils::labels(PREFIX, &allowed.labels),
            FamilyGenerator::gauge(
                "kube_service_spec_external_ip",
                "Service external ips. One series for each ip",
                |s: &Service| {
                    let ips = s.spec.as_ref().and_then(|s| s.external_ips.as_ref());
                    Ok(ips
                        .into_iter()
                        .flatten()
                        .map(|ip| Metric::labeled(["external_ip"], [ip.clone()], 1.0))
                        .collect())
                },
            ),
            FamilyGenerator::gauge(
                "kube_service_status_load_balancer_ingress",
                "Service load balancer ingress status",
                |s: &Service| {
                    let ingress = s
                        .status
                        .as_ref()
                        .and_then(|s| s.load_balancer.as_ref())
                        .and_then(|lb| lb.ingress.as_ref());
                    Ok(ingress
                        .into_iter()
                        .flatten()
                        .map(|i| {
                            Metric::labeled(
                                ["ip", "hostname"],
                                [utils::or_empty(i.ip.as_ref()), utils::or_empty(i.hostname.as_ref())],
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

    fixture_tests!(
        Service,
        families(&Allowed::everything()),
        cluster_ip,
        load_balancer,
        external_name,
    );
}

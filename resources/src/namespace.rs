use k8s_openapi::api::core::v1::Namespace;
use kube::ResourceExt;
use metric::{DefaultLabels, FamilyGenerator, Generators};

use crate::{Allowed, utils};

const PREFIX: &str = "kube_namespace";
const PHASES: [&str; 2] = ["Active", "Terminating"];

pub fn families(allowed: &Allowed) -> Generators<Namespace> {
    Generators::new(
        DefaultLabels::new(&["namespace"], |n: &Namespace| vec![n.name_any()]),
        vec![
            utils::created(PREFIX),
            utils::annotations(PREFIX, &allowed.annotations),
            utils::labels(PREFIX, &allowed.labels),
            FamilyGenerator::gauge(
                "kube_namespace_status_phase",
                "kubernetes namespace status phase.",
                |n: &Namespace| {
                    let phase = n.status.as_ref().and_then(|s| s.phase.as_deref());
                    Ok(utils::phase_family(phase, &PHASES))
                },
            ),
            FamilyGenerator::gauge(
                "kube_namespace_status_condition",
                "The condition of a namespace.",
                |n: &Namespace| {
                    let conditions = n.status.as_ref().and_then(|s| s.conditions.as_ref());
                    Ok(conditions
                        .into_iter()
                        .flatten()
                        .flat_map(|c| utils::condition_metrics(&c.type_, &c.status))
                        .collect())
                },
            ),
        ],
    )
}

use k8s_openapi::api::apps::v1::{Deployment, DeploymentStatus, RollingUpdateDeployment};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use metric::{DefaultLabels, Family, FamilyGenerator, Generators, Metric, Result};

use crate::{Allowed, intstr, utils};

const PREFIX: &str = "kube_deployment";

fn status_count(
    name: &str,
    help: &str,
    f: fn(&DeploymentStatus) -> Option<i32>,
) -> FamilyGenerator<Deployment> {
    FamilyGenerator::gauge(name, help, move |d: &Deployment| {
        let n = d.status.as_ref().and_then(f).unwrap_or_default();
        Ok(Metric::from_value(f64::from(n)).into())
    })
}

/// Resolves one of the rolling update bounds against the desired replicas.
///
/// Nothing is reported without a rolling update strategy, an explicit bound, or desired
/// replicas to scale a percentage against.
fn rolling_update(
    d: &Deployment,
    field: fn(&RollingUpdateDeployment) -> Option<&IntOrString>,
    round_up: bool,
) -> Result<Family> {
    let Some(spec) = d.spec.as_ref() else {
        return Ok(Family::empty());
    };
    let bound = spec
        .strategy
        .as_ref()
        .and_then(|s| s.rolling_update.as_ref())
        .and_then(field);
    match (bound, spec.replicas) {
        (Some(v), Some(replicas)) => {
            let v = intstr::scaled_value(v, replicas, round_up)?;
            Ok(Metric::from_value(v).into())
        }
        _ => Ok(Family::empty()),
    }
}

pub fn families(allowed: &Allowed) -> Generators<Deployment> {
    Generators::new(
        DefaultLabels::new(&["namespace", "deployment"], |d: &Deployment| {
            vec![d.namespace().unwrap_or_default(), d.name_any()]
        }),
        vec![
            utils::created(PREFIX),
            status_count(
                "kube_deployment_status_replicas",
                "The number of replicas per deployment.",
                |s| s.replicas,
            ),
            status_count(
                "kube_deployment_status_replicas_ready",
                "The number of ready replicas per deployment.",
                |s| s.ready_replicas,
            ),
            status_count(
                "kube_deployment_status_replicas_available",
                "The number of available replicas per deployment.",
                |s| s.available_replicas,
            ),
            status_count(
                "kube_deployment_status_replicas_unavailable",
                "The number of unavailable replicas per deployment.",
                |s| s.unavailable_replicas,
            ),
            status_count(
                "kube_deployment_status_replicas_updated",
                "The number of updated replicas per deployment.",
                |s| s.updated_replicas,
            ),
            FamilyGenerator::gauge(
                "kube_deployment_status_observed_generation",
                "The generation observed by the deployment controller.",
                |d: &Deployment| {
                    let g = d
                        .status
                        .as_ref()
                        .and_then(|s| s.observed_generation)
                        .unwrap_or_default();
                    Ok(Metric::from_value(utils::int_float(g)).into())
                },
            ),
            FamilyGenerator::gauge(
                "kube_deployment_status_condition",
                "The current status conditions of a deployment.",
                |d: &Deployment| {
                    let conditions = d.status.as_ref().and_then(|s| s.conditions.as_ref());
                    Ok(conditions
                        .into_iter()
                        .flatten()
                        .flat_map(|c| utils::condition_metrics(&c.type_, &c.status))
                        .collect())
                },
            ),
            FamilyGenerator::gauge(
                "kube_deployment_spec_replicas",
                "Number of desired pods for a deployment.",
                |d: &Deployment| {
                    Ok(d.spec
                        .as_ref()
                        .and_then(|s| s.replicas)
                        .map(|n| Metric::from_value(f64::from(n)).into())
                        .unwrap_or_default())
                },
            ),
            FamilyGenerator::gauge(
                "kube_deployment_spec_paused",
                "Whether the deployment is paused and will not be processed by the deployment controller.",
                |d: &Deployment| {
                    let paused = d.spec.as_ref().and_then(|s| s.paused).unwrap_or_default();
                    Ok(Metric::from_value(utils::bool_float(paused)).into())
                },
            ),
            FamilyGenerator::gauge(
                "kube_deployment_spec_strategy_rollingupdate_max_unavailable",
                "Maximum number of unavailable replicas during a rolling update of a deployment.",
                |d: &Deployment| rolling_update(d, |r| r.max_unavailable.as_ref(), false),
            ),
            FamilyGenerator::gauge(
                "kube_deployment_spec_strategy_rollingupdate_max_surge",
                "Maximum number of replicas that can be scheduled above the desired number of replicas during a rolling update of a deployment.",
                |d: &Deployment| rolling_update(d, |r| r.max_surge.as_ref(), true),
            ),
            FamilyGenerator::gauge(
                "kube_deployment_metadata_generation",
                "Sequence number representing a specific generation of the desired state.",
                |d: &Deployment| {
                    let g = d.metadata.generation.unwrap_or_default();
                    Ok(Metric::from_value(utils::int_float(g)).into())
                },
            ),
            utils::annotations(PREFIX, &allowed.annotations),
            utils::labels(PREFIX, &allowed.labels),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::fixture_tests;
    use serde_json::{from_value, json};

    fixture_tests!(
        Deployment,
        families(&Allowed::default()),
        rolling_update_percent,
        status,
        no_rolling_update,
    );

    #[test]
    fn rolling_update_not_a_percentage() {
        let d: Deployment = from_value(json!({
            "metadata": {"name": "bad", "namespace": "default"},
            "spec": {
                "replicas": 5,
                "selector": {},
                "template": {},
                "strategy": {"rollingUpdate": {"maxUnavailable": "20"}},
            },
        }))
        .unwrap();
        let err = families(&Allowed::default()).render(&d).unwrap_err();
        assert!(
            err.to_string()
                .contains("kube_deployment_spec_strategy_rollingupdate_max_unavailable"),
            "{err}"
        );
    }
}

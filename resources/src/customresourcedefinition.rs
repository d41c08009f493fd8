use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::ResourceExt;
use metric::{DefaultLabels, Family, FamilyGenerator, Generators, Metric};

use crate::{Allowed, utils};

const PREFIX: &str = "kube_customresourcedefinition";
const SCOPES: [&str; 2] = ["Cluster", "Namespaced"];

pub fn families(allowed: &Allowed) -> Generators<CustomResourceDefinition> {
    Generators::new(
        DefaultLabels::new(&["customresourcedefinition"], |c: &CustomResourceDefinition| {
            vec![c.name_any()]
        }),
        vec![
            FamilyGenerator::gauge(
                "kube_customresourcedefinition_created",
                "Unix creation timestamp.",
                |c: &CustomResourceDefinition| {
                    Ok(utils::timestamp_family(c.metadata.creation_timestamp.as_ref()))
                },
            ),
            utils::labels(PREFIX, &allowed.labels),
            utils::annotations(PREFIX, &allowed.annotations),
            FamilyGenerator::gauge(
                "kube_customresourcedefinition_spec_groupversion",
                "Information about the customresourcedefinition group and version.",
                |c: &CustomResourceDefinition| {
                    Ok(c.spec
                        .versions
                        .iter()
                        .filter(|v| v.served)
                        .map(|v| {
                            Metric::labeled(
                                ["group", "version"],
                                [c.spec.group.clone(), v.name.clone()],
                                1.0,
                            )
                        })
                        .collect())
                },
            ),
            FamilyGenerator::gauge(
                "kube_customresourcedefinition_spec_scope",
                "kubernetes customresourcedefinition spec scope.",
                |c: &CustomResourceDefinition| {
                    Ok(SCOPES
                        .iter()
                        .map(|s| {
                            Metric::labeled(
                                ["scope"],
                                [s.to_string()],
                                utils::bool_float(c.spec.scope == *s),
                            )
                        })
                        .collect())
                },
            ),
            FamilyGenerator::gauge(
                "kube_customresourcedefinition_status_condition",
                "The condition of a customresourcedefinition.",
                |c: &CustomResourceDefinition| {
                    let conditions = c.status.as_ref().and_then(|s| s.conditions.as_ref());
                    Ok(conditions
                        .into_iter()
                        .flatten()
                        .flat_map(|c| utils::condition_metrics(&c.type_, &c.status))
                        .collect::<Family>())
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
        CustomResourceDefinition,
        families(&Allowed::everything()),
        labels_without_created,
        group_version_and_scope,
        conditions,
    );
}

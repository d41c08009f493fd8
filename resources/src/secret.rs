use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use metric::{DefaultLabels, FamilyGenerator, Generators, Metric};

use crate::{Allowed, utils};

const PREFIX: &str = "kube_secret";

pub fn families(allowed: &Allowed) -> Generators<Secret> {
    Generators::new(
        DefaultLabels::new(&["namespace", "secret"], |s: &Secret| {
            vec![s.namespace().unwrap_or_default(), s.name_any()]
        }),
        vec![
            FamilyGenerator::gauge("kube_secret_info", "Information about secret.", |_| {
                Ok(Metric::from_value(1.0).into())
            })
            .stable(),
            FamilyGenerator::gauge("kube_secret_type", "Type about secret.", |s: &Secret| {
                Ok(Metric::labeled(["type"], [utils::or_empty(s.type_.as_ref())], 1.0).into())
            })
            .stable(),
            utils::annotations(PREFIX, &allowed.annotations),
            utils::labels(PREFIX, &allowed.labels).stable(),
            utils::created(PREFIX).stable(),
            utils::metadata_resource_version(
                PREFIX,
                "Resource version representing a specific version of secret.",
            ),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::fixture_tests;

    fixture_tests!(
        Secret,
        families(&Allowed {
            labels: vec!["app".into()],
            annotations: vec!["*".into()],
        }),
        opaque,
        service_account_token,
    );
}

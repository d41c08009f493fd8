use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use kube::ResourceExt;
use metric::{DefaultLabels, Family, FamilyGenerator, Generators, Metric};

use crate::{Allowed, Amount, utils};

const PREFIX: &str = "kube_persistentvolumeclaim";
const PHASES: [&str; 3] = ["Lost", "Bound", "Pending"];
const BETA_STORAGE_CLASS_ANNOTATION: &str = "volume.beta.kubernetes.io/storage-class";
/// Reported when a claim names no storage class at all.
const NO_STORAGE_CLASS: &str = "<none>";

/// Returns the storage class, preferring the beta annotation over the spec field.
fn storage_class(p: &PersistentVolumeClaim) -> String {
    p.annotations()
        .get(BETA_STORAGE_CLASS_ANNOTATION)
        .or_else(|| p.spec.as_ref().and_then(|s| s.storage_class_name.as_ref()))
        .cloned()
        .unwrap_or_else(|| NO_STORAGE_CLASS.to_string())
}

pub fn families(allowed: &Allowed) -> Generators<PersistentVolumeClaim> {
    Generators::new(
        DefaultLabels::new(
            &["namespace", "persistentvolumeclaim"],
            |p: &PersistentVolumeClaim| vec![p.namespace().unwrap_or_default(), p.name_any()],
        ),
        vec![
            utils::labels(PREFIX, &allowed.labels).stable(),
            utils::annotations(PREFIX, &allowed.annotations),
            FamilyGenerator::gauge(
                "kube_persistentvolumeclaim_info",
                "Information about persistent volume claim.",
                |p: &PersistentVolumeClaim| {
                    let volume = p.spec.as_ref().and_then(|s| s.volume_name.as_ref());
                    Ok(Metric::labeled(
                        ["storageclass", "volumename"],
                        [storage_class(p), utils::or_empty(volume)],
                        1.0,
                    )
                    .into())
                },
            )
            .stable(),
            FamilyGenerator::gauge(
                "kube_persistentvolumeclaim_status_phase",
                "The phase the persistent volume claim is currently in.",
                |p: &PersistentVolumeClaim| {
                    let phase = p.status.as_ref().and_then(|s| s.phase.as_deref());
                    Ok(utils::phase_family(phase, &PHASES))
                },
            )
            .stable(),
            FamilyGenerator::gauge(
                "kube_persistentvolumeclaim_resource_requests_storage_bytes",
                "The capacity of storage requested by the persistent volume claim.",
                |p: &PersistentVolumeClaim| {
                    let storage = p
                        .spec
                        .as_ref()
                        .and_then(|s| s.resources.as_ref())
                        .and_then(|r| r.requests.as_ref())
                        .and_then(|r| r.get("storage"));
                    let Some(storage) = storage else {
                        return Ok(Family::empty());
                    };
                    let amount: Amount = storage.0.parse()?;
                    Ok(Metric::from_value(utils::int_float(amount.value())).into())
                },
            )
            .stable(),
            FamilyGenerator::gauge(
                "kube_persistentvolumeclaim_access_mode",
                "The access mode(s) specified by the persistent volume claim.",
                |p: &PersistentVolumeClaim| {
                    let modes = p.spec.as_ref().and_then(|s| s.access_modes.as_ref());
                    Ok(modes
                        .into_iter()
                        .flatten()
                        .map(|m| Metric::labeled(["access_mode"], [m.clone()], 1.0))
                        .collect())
                },
            )
            .stable(),
            FamilyGenerator::gauge(
                "kube_persistentvolumeclaim_status_condition",
                "Information about status of different conditions of persistent volume claim.",
                |p: &PersistentVolumeClaim| {
                    let conditions = p.status.as_ref().and_then(|s| s.conditions.as_ref());
                    Ok(conditions
                        .into_iter()
                        .flatten()
                        .flat_map(|c| utils::condition_metrics(&c.type_, &c.status))
                        .collect())
                },
            ),
            utils::created(PREFIX),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::fixture_tests;

    fixture_tests!(
        PersistentVolumeClaim,
        families(&Allowed {
            labels: vec!["app".into()],
            annotations: Vec::new(),
        }),
        bound,
        beta_storage_class,
        no_storage_class,
        pending,
    );
}

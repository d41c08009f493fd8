use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeSpec};
use kube::ResourceExt;
use metric::{DefaultLabels, Family, FamilyGenerator, Generators, Metric};

use crate::{Allowed, Amount, utils};

const PREFIX: &str = "kube_persistentvolume";
const PHASES: [&str; 5] = ["Pending", "Available", "Bound", "Released", "Failed"];

const INFO_KEYS: [&str; 13] = [
    "storageclass",
    "gce_persistent_disk_name",
    "ebs_volume_id",
    "azure_disk_name",
    "fc_wwids",
    "fc_lun",
    "fc_target_wwns",
    "iscsi_target_portal",
    "iscsi_iqn",
    "iscsi_lun",
    "iscsi_initiator_name",
    "nfs_server",
    "nfs_path",
];

/// Holds the identifying fields of the one backing volume source that is set.
#[derive(Default)]
struct VolumeSource {
    gce_persistent_disk_name: String,
    ebs_volume_id: String,
    azure_disk_name: String,
    fc_wwids: String,
    fc_lun: String,
    fc_target_wwns: String,
    iscsi_target_portal: String,
    iscsi_iqn: String,
    iscsi_lun: String,
    iscsi_initiator_name: String,
    nfs_server: String,
    nfs_path: String,
}

impl VolumeSource {
    /// Checks the sources in a fixed order and takes the first one present.
    fn from_spec(spec: &PersistentVolumeSpec) -> Self {
        let mut v = Self::default();
        if let Some(gce) = &spec.gce_persistent_disk {
            v.gce_persistent_disk_name = gce.pd_name.clone();
        } else if let Some(ebs) = &spec.aws_elastic_block_store {
            v.ebs_volume_id = ebs.volume_id.clone();
        } else if let Some(azure) = &spec.azure_disk {
            v.azure_disk_name = azure.disk_name.clone();
        } else if let Some(fc) = &spec.fc {
            v.fc_lun = fc.lun.map(|l| l.to_string()).unwrap_or_default();
            v.fc_target_wwns = fc.target_wwns.as_deref().unwrap_or_default().join(",");
            v.fc_wwids = fc.wwids.as_deref().unwrap_or_default().join(",");
        } else if let Some(iscsi) = &spec.iscsi {
            v.iscsi_target_portal = iscsi.target_portal.clone();
            v.iscsi_iqn = iscsi.iqn.clone();
            v.iscsi_lun = iscsi.lun.to_string();
            v.iscsi_initiator_name = utils::or_empty(iscsi.initiator_name.as_ref());
        } else if let Some(nfs) = &spec.nfs {
            v.nfs_server = nfs.server.clone();
            v.nfs_path = nfs.path.clone();
        }
        v
    }
}

fn info(p: &PersistentVolume) -> Metric {
    let spec = p.spec.as_ref();
    let storage_class = utils::or_empty(spec.and_then(|s| s.storage_class_name.as_ref()));
    let v = spec.map(VolumeSource::from_spec).unwrap_or_default();
    Metric::labeled(
        INFO_KEYS,
        [
            storage_class,
            v.gce_persistent_disk_name,
            v.ebs_volume_id,
            v.azure_disk_name,
            v.fc_wwids,
            v.fc_lun,
            v.fc_target_wwns,
            v.iscsi_target_portal,
            v.iscsi_iqn,
            v.iscsi_lun,
            v.iscsi_initiator_name,
            v.nfs_server,
            v.nfs_path,
        ],
        1.0,
    )
}

pub fn families(allowed: &Allowed) -> Generators<PersistentVolume> {
    Generators::new(
        DefaultLabels::new(&["persistentvolume"], |p: &PersistentVolume| {
            vec![p.name_any()]
        }),
        vec![
            FamilyGenerator::gauge(
                "kube_persistentvolume_claim_ref",
                "Information about the Persitant Volume Claim Reference.",
                |p: &PersistentVolume| {
                    let Some(claim) = p.spec.as_ref().and_then(|s| s.claim_ref.as_ref()) else {
                        return Ok(Family::empty());
                    };
                    Ok(Metric::labeled(
                        ["name", "claim_namespace"],
                        [
                            utils::or_empty(claim.name.as_ref()),
                            utils::or_empty(claim.namespace.as_ref()),
                        ],
                        1.0,
                    )
                    .into())
                },
            ),
            utils::annotations(PREFIX, &allowed.annotations),
            utils::labels(PREFIX, &allowed.labels),
            FamilyGenerator::gauge(
                "kube_persistentvolume_status_phase",
                "The phase indicates if a volume is available, bound to a claim, or released by a claim.",
                |p: &PersistentVolume| {
                    let phase = p.status.as_ref().and_then(|s| s.phase.as_deref());
                    Ok(utils::phase_family(phase, &PHASES))
                },
            ),
            FamilyGenerator::gauge(
                "kube_persistentvolume_info",
                "Information about persistentvolume.",
                |p: &PersistentVolume| Ok(info(p).into()),
            ),
            FamilyGenerator::gauge(
                "kube_persistentvolume_capacity_bytes",
                "Persistentvolume capacity in bytes.",
                |p: &PersistentVolume| {
                    let storage = p
                        .spec
                        .as_ref()
                        .and_then(|s| s.capacity.as_ref())
                        .and_then(|c| c.get("storage"));
                    let Some(storage) = storage else {
                        return Ok(Family::empty());
                    };
                    let amount: Amount = storage.0.parse()?;
                    Ok(Metric::from_value(utils::int_float(amount.value())).into())
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
        PersistentVolume,
        families(&Allowed::everything()),
        claimed_gce,
        fibre_channel,
        iscsi,
        nfs_without_capacity,
    );
}

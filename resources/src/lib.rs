//! Resources holds the metric family generators for every supported Kubernetes kind.
//!
//! Each kind lives in its own module exposing `families`, which builds the kind's
//! [`Generators`](metric::Generators) from the label and annotation allowlists. The
//! [`Resource`] enum names the kinds the way they're selected on the command line.

use strum::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};

pub mod configmap;
pub mod customresourcedefinition;
pub mod deployment;
pub mod namespace;
pub mod node;
pub mod persistentvolume;
pub mod persistentvolumeclaim;
pub mod pod;
pub mod secret;
pub mod service;

mod intstr;
mod quantity;
mod utils;

#[cfg(test)]
mod testutil;

pub use quantity::Amount;
pub use utils::{Unit, sanitize_label_name};

/// Wildcard allowlist entry: every key is allowed.
pub const WILDCARD: &str = "*";

/// One supported kind, named by its plural resource name.
#[derive(
    AsRefStr,
    Clone,
    Copy,
    Debug,
    Display,
    EnumIter,
    EnumString,
    Eq,
    Hash,
    IntoStaticStr,
    Ord,
    PartialEq,
    PartialOrd,
)]
#[strum(serialize_all = "lowercase")]
pub enum Resource {
    ConfigMaps,
    CustomResourceDefinitions,
    Deployments,
    Namespaces,
    Nodes,
    PersistentVolumeClaims,
    PersistentVolumes,
    Pods,
    Secrets,
    Services,
}

impl Resource {
    /// Reports whether objects of this kind live in a namespace.
    pub fn namespaced(self) -> bool {
        !matches!(
            self,
            Self::CustomResourceDefinitions
                | Self::Namespaces
                | Self::Nodes
                | Self::PersistentVolumes
        )
    }
}

/// Lists the Kubernetes label and annotation keys a kind turns into metric labels.
///
/// An empty list disables the corresponding `_labels`/`_annotations` family's series, a list
/// starting with [`WILDCARD`] allows every key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Allowed {
    pub labels: Vec<String>,
    pub annotations: Vec<String>,
}

impl Allowed {
    /// Allows every label and every annotation.
    pub fn everything() -> Self {
        Self {
            labels: vec![WILDCARD.into()],
            annotations: vec![WILDCARD.into()],
        }
    }
}

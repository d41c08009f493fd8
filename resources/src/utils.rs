use std::{collections::BTreeMap, sync::LazyLock};

use k8s_openapi::apimachinery::pkg::{api::resource::Quantity, apis::meta::v1::Time};
use kube::ResourceExt;
use metric::{Family, FamilyGenerator, Metric, Result};
use regex::Regex;
use strum::{AsRefStr, Display};

use crate::{WILDCARD, quantity::Amount};

static INVALID_LABEL_CHAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9_]").expect("static regex"));
static MATCH_ALL_CAP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z0-9])([A-Z])").expect("static regex"));
static DNS1123_SUBDOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
        .expect("static regex")
});
static QUALIFIED_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9]$").expect("static regex")
});

const CONDITION_STATUSES: [&str; 3] = ["True", "False", "Unknown"];

pub(crate) const LABELS_HELP: &str = "Kubernetes labels converted to Prometheus labels.";
pub(crate) const ANNOTATIONS_HELP: &str = "Kubernetes annotations converted to Prometheus labels.";
pub(crate) const CREATED_HELP: &str = "Unix creation timestamp";

/// Replaces every character that isn't valid in a Prometheus label name
/// with an underscore.
pub fn sanitize_label_name(s: &str) -> String {
    INVALID_LABEL_CHAR.replace_all(s, "_").into_owned()
}

fn to_snake_case(s: &str) -> String {
    MATCH_ALL_CAP.replace_all(s, "${1}_${2}").to_lowercase()
}

fn label_name(prefix: &str, name: &str) -> String {
    format!("{prefix}_{}", to_snake_case(&sanitize_label_name(name)))
}

/// Converts Kubernetes labels or annotations into metric label pairs.
///
/// Keys are processed in sorted order. Keys that collide after sanitizing are all suffixed
/// `_conflictN`, numbered in that order.
pub(crate) fn prometheus_labels<'a, I>(prefix: &str, kube: I) -> (Vec<String>, Vec<String>)
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    let mut sorted: Vec<_> = kube.into_iter().collect();
    sorted.sort_unstable_by_key(|(k, _)| *k);

    let mut keys: Vec<String> = Vec::with_capacity(sorted.len());
    let mut values = Vec::with_capacity(sorted.len());
    // Sanitized name to (times seen, index of the first occurrence).
    let mut seen: BTreeMap<String, (usize, usize)> = BTreeMap::new();
    for (k, v) in sorted {
        let mut name = label_name(prefix, k);
        if let Some((count, first)) = seen.get_mut(&name) {
            if *count == 1 {
                if let Some(initial) = keys.get_mut(*first) {
                    *initial = format!("{initial}_conflict1");
                }
            }
            *count = count.saturating_add(1);
            name = format!("{name}_conflict{count}");
        } else {
            seen.insert(name.clone(), (1, keys.len()));
        }
        keys.push(name);
        values.push(v.clone());
    }
    (keys, values)
}

/// Selects the entries of `kube` named by `allow` and converts them.
pub(crate) fn allowed_labels(
    prefix: &str,
    kube: &BTreeMap<String, String>,
    allow: &[String],
) -> (Vec<String>, Vec<String>) {
    match allow.first() {
        Some(w) if w == WILDCARD => prometheus_labels(prefix, kube),
        _ => {
            let picked: BTreeMap<_, _> = allow
                .iter()
                .filter_map(|k| kube.get_key_value(k))
                .collect();
            prometheus_labels(prefix, picked)
        }
    }
}

fn allowed_family(
    prefix: &str,
    kube: &BTreeMap<String, String>,
    allow: &[String],
) -> Result<Family> {
    if allow.is_empty() {
        return Ok(Family::empty());
    }
    let (keys, values) = allowed_labels(prefix, kube, allow);
    Ok(Metric::new(keys, values, 1.0)?.into())
}

/// Builds the `<prefix>_labels` family.
pub(crate) fn labels<K>(prefix: &str, allow: &[String]) -> FamilyGenerator<K>
where
    K: kube::Resource + 'static,
{
    let allow = allow.to_vec();
    FamilyGenerator::gauge(format!("{prefix}_labels"), LABELS_HELP, move |o: &K| {
        allowed_family("label", o.labels(), &allow)
    })
}

/// Builds the `<prefix>_annotations` family.
pub(crate) fn annotations<K>(prefix: &str, allow: &[String]) -> FamilyGenerator<K>
where
    K: kube::Resource + 'static,
{
    let allow = allow.to_vec();
    FamilyGenerator::gauge(
        format!("{prefix}_annotations"),
        ANNOTATIONS_HELP,
        move |o: &K| allowed_family("annotation", o.annotations(), &allow),
    )
}

/// Builds the `<prefix>_created` family, empty when the object has no creation
/// timestamp.
pub(crate) fn created<K>(prefix: &str) -> FamilyGenerator<K>
where
    K: kube::Resource + 'static,
{
    FamilyGenerator::gauge(format!("{prefix}_created"), CREATED_HELP, |o: &K| {
        Ok(timestamp_family(o.meta().creation_timestamp.as_ref()))
    })
}

/// Builds the `<prefix>_metadata_resource_version` family.
pub(crate) fn metadata_resource_version<K>(prefix: &str, help: &str) -> FamilyGenerator<K>
where
    K: kube::Resource + 'static,
{
    FamilyGenerator::gauge(
        format!("{prefix}_metadata_resource_version"),
        help.to_string(),
        |o: &K| Ok(resource_version(o.meta().resource_version.as_deref())),
    )
}

/// Reports a resource version that parses as a number; anything else is
/// left out.
pub(crate) fn resource_version(rv: Option<&str>) -> Family {
    rv.and_then(|rv| rv.parse::<f64>().ok())
        .map(|v| Metric::from_value(v).into())
        .unwrap_or_default()
}

pub(crate) fn timestamp_family(t: Option<&Time>) -> Family {
    t.map(|t| Metric::from_value(unix(t)).into())
        .unwrap_or_default()
}

pub(crate) fn unix(t: &Time) -> f64 {
    int_float(t.0.as_second())
}

pub(crate) fn bool_float(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

/// Converts counts and timestamps, which stay well inside the exactly representable
/// range.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn int_float(v: i64) -> f64 {
    v as f64
}

/// Emits one series per possible condition status, set to 1 for `status`.
///
/// Status values are the API's `True`, `False` and `Unknown`; labels are lowercase.
pub(crate) fn condition_metrics<'a>(
    condition: &'a str,
    status: &'a str,
) -> impl Iterator<Item = Metric> + 'a {
    CONDITION_STATUSES.iter().map(move |s| {
        Metric::labeled(
            ["condition", "status"],
            [condition.to_string(), s.to_lowercase()],
            bool_float(status == *s),
        )
    })
}

/// Like [`condition_metrics`], for a single known condition: the status lands in
/// a `condition` label.
pub(crate) fn status_metrics(status: &str) -> impl Iterator<Item = Metric> + '_ {
    CONDITION_STATUSES.iter().map(move |s| {
        Metric::labeled(["condition"], [s.to_lowercase()], bool_float(status == *s))
    })
}

/// Enumerates `phases`, setting the one matching `phase`.
///
/// Nothing is emitted while the phase is unset.
pub(crate) fn phase_family(phase: Option<&str>, phases: &[&str]) -> Family {
    let Some(phase) = phase.filter(|p| !p.is_empty()) else {
        return Family::empty();
    };
    phases
        .iter()
        .map(|p| Metric::labeled(["phase"], [p.to_string()], bool_float(phase == *p)))
        .collect()
}

/// Unit of a resource quantity.
#[derive(AsRefStr, Clone, Copy, Debug, Display, PartialEq, Eq)]
#[strum(serialize_all = "lowercase")]
pub enum Unit {
    Core,
    Byte,
    Integer,
}

const HUGE_PAGES_PREFIX: &str = "hugepages-";
const ATTACHABLE_VOLUMES_PREFIX: &str = "attachable-volumes-";
const DEFAULT_NAMESPACE_PREFIX: &str = "kubernetes.io/";
const REQUESTS_PREFIX: &str = "requests.";

/// Returns the unit a resource is reported in, or `None` if it isn't reported.
pub(crate) fn resource_unit(name: &str) -> Option<Unit> {
    match name {
        "cpu" => Some(Unit::Core),
        "memory" | "storage" | "ephemeral-storage" => Some(Unit::Byte),
        "pods" => Some(Unit::Integer),
        n if n.starts_with(HUGE_PAGES_PREFIX) || n.starts_with(ATTACHABLE_VOLUMES_PREFIX) => {
            Some(Unit::Byte)
        }
        n if is_extended_resource_name(n) => Some(Unit::Integer),
        _ => None,
    }
}

fn is_native_resource(name: &str) -> bool {
    !name.contains('/') || name.contains(DEFAULT_NAMESPACE_PREFIX)
}

/// Reports whether `name` is a vendor-provided resource such as
/// `example.com/gpu`.
pub(crate) fn is_extended_resource_name(name: &str) -> bool {
    if is_native_resource(name) || name.starts_with(REQUESTS_PREFIX) {
        return false;
    }
    is_qualified_name(&format!("{REQUESTS_PREFIX}{name}"))
}

fn is_qualified_name(s: &str) -> bool {
    let (prefix, name) = match s.split_once('/') {
        None => (None, s),
        Some((p, n)) => (Some(p), n),
    };
    if let Some(p) = prefix {
        if p.is_empty() || p.len() > 253 || !DNS1123_SUBDOMAIN.is_match(p) {
            return false;
        }
    }
    !name.is_empty() && name.len() <= 63 && QUALIFIED_NAME.is_match(name)
}

/// Yields the reported entries of a resource list as sanitized name, unit and
/// parsed amount. Resources without a unit are skipped.
pub(crate) fn resource_list(
    list: Option<&BTreeMap<String, Quantity>>,
) -> impl Iterator<Item = Result<(String, Unit, Amount)>> + '_ {
    list.into_iter().flatten().filter_map(|(name, q)| {
        let unit = resource_unit(name)?;
        Some(q.0.parse().map(|a| (sanitize_label_name(name), unit, a)))
    })
}

/// Clones an optional string, defaulting to the empty string.
pub(crate) fn or_empty(s: Option<&String>) -> String {
    s.cloned().unwrap_or_default()
}

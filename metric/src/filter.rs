//! Filters decide which family generators run.

use regex::Regex;

use crate::{Descriptor, Error, Result};

/// Reports whether a family should be generated.
pub trait Filter {
    fn include(&self, desc: &Descriptor) -> bool;
}

/// Includes families by name, either by allowing only the listed ones or by
/// denying the listed ones. An empty list denies nothing.
///
/// Entries are regular expressions matched against the whole family name.
#[derive(Clone, Debug, Default)]
pub struct AllowDenyList {
    patterns: Vec<String>,
    list: Vec<Regex>,
    is_allow: bool,
}

impl AllowDenyList {
    /// Constructs an AllowDenyList. Setting both lists is an error.
    pub fn new<A, D>(allow: A, deny: D) -> Result<Self>
    where
        A: IntoIterator,
        A::Item: Into<String>,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        let allow = normalize(allow);
        let deny = normalize(deny);
        if !allow.is_empty() && !deny.is_empty() {
            return Err(Error::ExclusiveLists);
        }
        let is_allow = !allow.is_empty();
        let patterns = if is_allow { allow } else { deny };
        let list = compile(&patterns)?;
        Ok(Self {
            patterns,
            list,
            is_allow,
        })
    }

    pub fn is_allow_list(&self) -> bool {
        self.is_allow
    }

    pub fn is_included(&self, name: &str) -> bool {
        let matched = self.list.iter().any(|r| r.is_match(name));
        if self.is_allow { matched } else { !matched }
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        !self.is_included(name)
    }

    /// Describes the list for logging.
    pub fn status(&self) -> String {
        if self.is_allow {
            format!(
                "including the following lists that were on allowlist: {}",
                self.patterns.join(", ")
            )
        } else {
            format!(
                "excluding the following lists that were on denylist: {}",
                self.patterns.join(", ")
            )
        }
    }
}

impl Filter for AllowDenyList {
    fn include(&self, desc: &Descriptor) -> bool {
        self.is_included(&desc.name)
    }
}

/// Passes every family that isn't opt-in, and opt-in families only if listed.
#[derive(Clone, Debug, Default)]
pub struct OptInFilter {
    patterns: Vec<String>,
    list: Vec<Regex>,
}

impl OptInFilter {
    pub fn new<I>(names: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let patterns = normalize(names);
        let list = compile(&patterns)?;
        Ok(Self { patterns, list })
    }

    pub fn count(&self) -> usize {
        self.list.len()
    }

    pub fn status(&self) -> String {
        self.patterns.join(", ")
    }
}

impl Filter for OptInFilter {
    fn include(&self, desc: &Descriptor) -> bool {
        !desc.opt_in || self.list.iter().any(|r| r.is_match(&desc.name))
    }
}

/// Includes a family only if every member does.
#[derive(Default)]
pub struct CompositeFilter(Vec<Box<dyn Filter + Send + Sync>>);

impl CompositeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<F: Filter + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.0.push(Box::new(f));
        self
    }
}

impl Filter for CompositeFilter {
    fn include(&self, desc: &Descriptor) -> bool {
        self.0.iter().all(|f| f.include(desc))
    }
}

fn normalize<I>(items: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    let mut out: Vec<String> = items
        .into_iter()
        .map(Into::into)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

fn compile(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| Regex::new(&format!("^(?:{p})$")).map_err(Error::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Stability, Type};

    fn desc(name: &str, opt_in: bool) -> Descriptor {
        Descriptor {
            name: name.into(),
            help: String::new(),
            kind: Type::Gauge,
            stability: Stability::Alpha,
            deprecated_version: None,
            opt_in,
        }
    }

    const NONE: [&str; 0] = [];

    #[test]
    fn exclusive() {
        let err = AllowDenyList::new(["kube_pod_info"], ["kube_node_info"]).unwrap_err();
        assert!(matches!(err, Error::ExclusiveLists));
    }

    #[test]
    fn empty_allows_all() -> Result<()> {
        let l = AllowDenyList::new(NONE, NONE)?;
        assert!(!l.is_allow_list());
        assert!(l.is_included("kube_pod_info"));
        assert!(AllowDenyList::default().is_included("anything"));
        Ok(())
    }

    #[test]
    fn allow() -> Result<()> {
        let l = AllowDenyList::new(["kube_pod_info", "kube_node_.*"], NONE)?;
        assert!(l.is_included("kube_pod_info"));
        assert!(l.is_included("kube_node_labels"));
        assert!(!l.is_included("kube_pod_info_extra"));
        assert!(!l.is_included("kube_pod"));
        assert!(l.is_excluded("kube_service_info"));
        Ok(())
    }

    #[test]
    fn deny() -> Result<()> {
        let l = AllowDenyList::new(NONE, ["kube_pod_.*"])?;
        assert!(!l.is_included("kube_pod_info"));
        assert!(l.is_included("kube_node_info"));
        assert!(l.status().starts_with("excluding"));
        Ok(())
    }

    #[test]
    fn bad_regex() {
        assert!(matches!(
            AllowDenyList::new(["kube_("], NONE),
            Err(Error::Regex(_))
        ));
    }

    #[test]
    fn opt_in() -> Result<()> {
        let f = OptInFilter::new(["kube_pod_extra"])?;
        assert_eq!(f.count(), 1);
        assert!(f.include(&desc("kube_pod_info", false)));
        assert!(f.include(&desc("kube_pod_extra", true)));
        assert!(!f.include(&desc("kube_pod_other", true)));
        Ok(())
    }

    #[test]
    fn composite() -> Result<()> {
        let f = CompositeFilter::new()
            .with(AllowDenyList::new(NONE, ["kube_pod_info"])?)
            .with(OptInFilter::new(NONE)?);
        assert!(!f.include(&desc("kube_pod_info", false)));
        assert!(!f.include(&desc("kube_pod_extra", true)));
        assert!(f.include(&desc("kube_pod_labels", false)));
        Ok(())
    }
}

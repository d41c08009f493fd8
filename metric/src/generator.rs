//! Family generators and their composition.

use std::{
    any::Any,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use tracing::debug;

use crate::{Error, Family, Filter, Result, Type};

/// Stability is the maturity level advertised in a family's help text.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Stability {
    #[default]
    Alpha,
    Beta,
    Stable,
}

/// The static metadata of a family.
#[derive(Clone, Debug, PartialEq)]
pub struct Descriptor {
    pub name: String,
    pub help: String,
    pub kind: Type,
    pub stability: Stability,
    pub deprecated_version: Option<String>,
    pub opt_in: bool,
}

impl Descriptor {
    /// Returns the `# HELP` and `# TYPE` lines, without a trailing newline.
    pub fn header(&self) -> String {
        let mut out = String::from("# HELP ");
        out.push_str(&self.name);
        out.push(' ');
        if self.stability == Stability::Stable {
            out.push('[');
            out.push_str(self.stability.as_ref());
            out.push_str("] ");
        }
        if let Some(v) = &self.deprecated_version {
            out.push_str("(Deprecated since ");
            out.push_str(v);
            out.push_str(") ");
        }
        out.push_str(&self.help);
        out.push_str("\n# TYPE ");
        out.push_str(&self.name);
        out.push(' ');
        out.push_str(self.kind.as_ref());
        out
    }
}

type GenerateFn<K> = dyn Fn(&K) -> Result<Family> + Send + Sync;

/// Pairs a [`Descriptor`] with the function producing the family for one `K`.
///
/// The function must be pure: same object in, same family out.
pub struct FamilyGenerator<K> {
    desc: Descriptor,
    generate: Arc<GenerateFn<K>>,
}

impl<K> FamilyGenerator<K> {
    pub fn new<F>(name: impl Into<String>, help: impl Into<String>, kind: Type, f: F) -> Self
    where
        F: Fn(&K) -> Result<Family> + Send + Sync + 'static,
    {
        Self {
            desc: Descriptor {
                name: name.into(),
                help: help.into(),
                kind,
                stability: Stability::default(),
                deprecated_version: None,
                opt_in: false,
            },
            generate: Arc::new(f),
        }
    }

    pub fn gauge<F>(name: impl Into<String>, help: impl Into<String>, f: F) -> Self
    where
        F: Fn(&K) -> Result<Family> + Send + Sync + 'static,
    {
        Self::new(name, help, Type::Gauge, f)
    }

    pub fn counter<F>(name: impl Into<String>, help: impl Into<String>, f: F) -> Self
    where
        F: Fn(&K) -> Result<Family> + Send + Sync + 'static,
    {
        Self::new(name, help, Type::Counter, f)
    }

    pub fn stability(mut self, s: Stability) -> Self {
        self.desc.stability = s;
        self
    }

    pub fn stable(self) -> Self {
        self.stability(Stability::Stable)
    }

    pub fn deprecated_since(mut self, version: impl Into<String>) -> Self {
        self.desc.deprecated_version = Some(version.into());
        self
    }

    /// Marks the family as disabled unless explicitly requested.
    pub fn opt_in(mut self) -> Self {
        self.desc.opt_in = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.desc.name
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.desc
    }

    pub fn header(&self) -> String {
        self.desc.header()
    }

    /// Runs the generator function, without default labels.
    pub fn generate(&self, obj: &K) -> Result<Family> {
        (self.generate)(obj)
    }
}

impl<K> Clone for FamilyGenerator<K> {
    fn clone(&self) -> Self {
        Self {
            desc: self.desc.clone(),
            generate: Arc::clone(&self.generate),
        }
    }
}

impl<K> fmt::Debug for FamilyGenerator<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FamilyGenerator")
            .field("desc", &self.desc)
            .finish_non_exhaustive()
    }
}

/// The label set every metric of a resource kind starts with.
pub struct DefaultLabels<K> {
    keys: &'static [&'static str],
    values: fn(&K) -> Vec<String>,
}

impl<K> DefaultLabels<K> {
    pub const fn new(keys: &'static [&'static str], values: fn(&K) -> Vec<String>) -> Self {
        Self { keys, values }
    }

    pub fn keys(&self) -> &'static [&'static str] {
        self.keys
    }
}

impl<K> Clone for DefaultLabels<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for DefaultLabels<K> {}

/// The ordered set of family generators for one resource kind.
///
/// Composition runs every generator in registration order and puts the default labels in front
/// of whatever each generator produced.
pub struct Generators<K> {
    defaults: DefaultLabels<K>,
    families: Vec<FamilyGenerator<K>>,
}

impl<K> Generators<K> {
    pub fn new(defaults: DefaultLabels<K>, families: Vec<FamilyGenerator<K>>) -> Self {
        Self { defaults, families }
    }

    /// Drops every generator `f` doesn't include.
    pub fn filter<F: Filter + ?Sized>(mut self, f: &F) -> Self {
        self.families.retain(|g| {
            let ok = f.include(g.descriptor());
            if !ok {
                debug!(family = g.name(), "family filtered out");
            }
            ok
        });
        self
    }

    pub fn len(&self) -> usize {
        self.families.len()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FamilyGenerator<K>> {
        self.families.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.families.iter().map(FamilyGenerator::name)
    }

    /// Returns one header per family, in registration order.
    pub fn headers(&self) -> Vec<String> {
        self.families.iter().map(FamilyGenerator::header).collect()
    }

    /// Produces every family for `obj`.
    ///
    /// A generator that returns an error or panics fails the whole object; the error names the
    /// family.
    pub fn compose(&self, obj: &K) -> Result<Vec<Family>> {
        let values = catch(|| Ok((self.defaults.values)(obj)))?;
        self.families
            .iter()
            .map(|g| {
                catch(|| g.generate(obj))
                    .and_then(|f| f.prefix(self.defaults.keys, &values))
                    .map_err(|err| Error::Family {
                        family: g.name().to_string(),
                        source: Box::new(err),
                    })
            })
            .collect()
    }

    /// Produces the exposition text of every family for `obj`, one entry per family.
    pub fn render(&self, obj: &K) -> Result<Vec<String>> {
        let families = self.compose(obj)?;
        Ok(self
            .families
            .iter()
            .zip(families)
            .map(|(g, f)| f.render(g.name()))
            .collect())
    }
}

impl<K> Clone for Generators<K> {
    fn clone(&self) -> Self {
        Self {
            defaults: self.defaults,
            families: self.families.clone(),
        }
    }
}

impl<K> fmt::Debug for Generators<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Generators")
            .field("defaults", &self.defaults.keys)
            .field("families", &self.families)
            .finish()
    }
}

fn catch<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|p| Err(Error::Panic(describe(p))))
}

fn describe(p: Box<dyn Any + Send>) -> String {
    if let Some(s) = p.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = p.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AllowDenyList, Metric};

    struct Thing {
        namespace: String,
        name: String,
        replicas: Option<i32>,
    }

    fn defaults() -> DefaultLabels<Thing> {
        DefaultLabels::new(&["namespace", "thing"], |t| {
            vec![t.namespace.clone(), t.name.clone()]
        })
    }

    fn generators() -> Generators<Thing> {
        Generators::new(
            defaults(),
            vec![
                FamilyGenerator::gauge("kube_thing_info", "Information about thing.", |_| {
                    Ok(Metric::labeled(["kind"], ["widget".into()], 1.0).into())
                })
                .stable(),
                FamilyGenerator::gauge("kube_thing_replicas", "Replicas of thing.", |t: &Thing| {
                    Ok(t.replicas
                        .map(|r| Metric::from_value(f64::from(r)))
                        .into_iter()
                        .collect())
                }),
            ],
        )
    }

    fn thing(replicas: Option<i32>) -> Thing {
        Thing {
            namespace: "ns".into(),
            name: "a".into(),
            replicas,
        }
    }

    #[test]
    fn header() {
        let g = FamilyGenerator::<Thing>::counter("kube_thing_total", "Things.", |_| {
            Ok(Family::empty())
        });
        assert_eq!(
            g.header(),
            "# HELP kube_thing_total Things.\n# TYPE kube_thing_total counter"
        );
        let g = g.stable();
        assert_eq!(
            g.header(),
            "# HELP kube_thing_total [STABLE] Things.\n# TYPE kube_thing_total counter"
        );
        let g = g.stability(Stability::Beta).deprecated_since("2.4.0");
        assert_eq!(
            g.header(),
            "# HELP kube_thing_total (Deprecated since 2.4.0) Things.\n# TYPE kube_thing_total counter"
        );
    }

    #[test]
    fn default_labels_first() -> Result<()> {
        let got = generators().compose(&thing(Some(2)))?;
        assert_eq!(got.len(), 2);
        for f in &got {
            for m in f {
                assert_eq!(&m.label_keys()[..2], ["namespace", "thing"]);
            }
        }
        assert_eq!(got[0].metrics()[0].label("kind"), Some("widget"));
        Ok(())
    }

    #[test]
    fn absent_field_is_empty() -> Result<()> {
        let got = generators().render(&thing(None))?;
        assert_eq!(
            got,
            vec![
                "kube_thing_info{namespace=\"ns\",thing=\"a\",kind=\"widget\"} 1\n".to_string(),
                String::new(),
            ]
        );
        Ok(())
    }

    #[test]
    fn deterministic() -> Result<()> {
        let g = generators();
        let t = thing(Some(5));
        assert_eq!(g.render(&t)?, g.render(&t)?);
        Ok(())
    }

    #[test_log::test]
    fn filtered() -> Result<()> {
        let list = AllowDenyList::new(Vec::<String>::new(), vec!["kube_thing_info".to_string()])?;
        let g = generators().filter(&list);
        assert_eq!(g.names().collect::<Vec<_>>(), vec!["kube_thing_replicas"]);
        assert_eq!(g.headers().len(), 1);
        Ok(())
    }

    #[test]
    fn errors_name_the_family() {
        let g = Generators::new(
            defaults(),
            vec![FamilyGenerator::gauge("kube_thing_broken", "Broken.", |_: &Thing| {
                Err(Error::InvalidValue("nope".into()))
            })],
        );
        let err = g.compose(&thing(None)).unwrap_err();
        assert!(matches!(err, Error::Family { ref family, .. } if family == "kube_thing_broken"));
    }

    #[test]
    fn panics_are_caught() {
        let g = Generators::new(
            defaults(),
            vec![FamilyGenerator::gauge("kube_thing_panics", "Panics.", |t: &Thing| {
                let r = t.replicas.expect("replicas required");
                Ok(Metric::from_value(f64::from(r)).into())
            })],
        );
        let err = g.compose(&thing(None)).unwrap_err();
        match err {
            Error::Family { source, .. } => {
                assert!(matches!(*source, Error::Panic(ref msg) if msg.contains("replicas required")))
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

//! Metric holds the data model the exporter renders: single observations, the families they
//! belong to, the generators that produce families from typed objects, and the filters that
//! decide which generators run.
//!
//! Everything here is pure. Nothing does I/O, and a [`Generators`] set is built once at startup
//! and then shared.
//!
//! ```
//! use metric::{DefaultLabels, FamilyGenerator, Generators, Metric};
//!
//! struct Widget {
//!     name: String,
//!     size: Option<i32>,
//! }
//!
//! let gens = Generators::new(
//!     DefaultLabels::new(&["widget"], |w: &Widget| vec![w.name.clone()]),
//!     vec![FamilyGenerator::gauge(
//!         "widget_size",
//!         "Size of the widget.",
//!         |w: &Widget| Ok(w.size.map(|s| Metric::from_value(f64::from(s))).into_iter().collect()),
//!     )],
//! );
//!
//! let w = Widget { name: "a".into(), size: Some(3) };
//! let out = gens.render(&w).unwrap();
//! assert_eq!(out, vec!["widget_size{widget=\"a\"} 3\n".to_string()]);
//! ```

mod filter;
mod generator;
mod render;

pub use filter::{AllowDenyList, CompositeFilter, Filter, OptInFilter};
pub use generator::{DefaultLabels, Descriptor, FamilyGenerator, Generators, Stability};

/// The error domain for building and generating metrics.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("expected label keys to be of same length as label values: {keys} != {values}")]
    LabelMismatch { keys: usize, values: usize },
    #[error("duplicate label key: {0}")]
    DuplicateLabel(String),
    #[error("allowlist and denylist are both set, they are mutually exclusive")]
    ExclusiveLists,
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
    #[error("invalid value: {0}")]
    InvalidValue(String),
    #[error("generator panicked: {0}")]
    Panic(String),
    #[error("family {family}: {source}")]
    Family {
        family: String,
        #[source]
        source: Box<Error>,
    },
}

/// Result typedef for the metric crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Type is the exposition type of a metric family.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::AsRefStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum Type {
    Gauge,
    Counter,
}

/// A single observation: ordered label pairs and a value.
///
/// The family name is not part of a Metric; it's supplied when rendering.
#[derive(Clone, Debug, PartialEq)]
pub struct Metric {
    label_keys: Vec<String>,
    label_values: Vec<String>,
    value: f64,
}

impl Metric {
    /// Constructs a Metric from positionally-paired keys and values.
    ///
    /// Mismatched lengths or a repeated key are reported as errors: they mean the calling
    /// generator is wrong, not that the input object is.
    pub fn new<K, V>(keys: K, values: V, value: f64) -> Result<Self>
    where
        K: IntoIterator,
        K::Item: Into<String>,
        V: IntoIterator,
        V::Item: Into<String>,
    {
        let label_keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        let label_values: Vec<String> = values.into_iter().map(Into::into).collect();
        if label_keys.len() != label_values.len() {
            return Err(Error::LabelMismatch {
                keys: label_keys.len(),
                values: label_values.len(),
            });
        }
        check_unique(&label_keys)?;
        Ok(Self {
            label_keys,
            label_values,
            value,
        })
    }

    /// Constructs a Metric with no labels.
    pub fn from_value(value: f64) -> Self {
        Self {
            label_keys: Vec::new(),
            label_values: Vec::new(),
            value,
        }
    }

    /// Constructs a Metric from fixed-size key and value arrays.
    ///
    /// The arrays can't disagree in length, so this can't fail. Keys must still be distinct.
    pub fn labeled<const N: usize>(keys: [&str; N], values: [String; N], value: f64) -> Self {
        debug_assert!(check_unique(&keys).is_ok(), "duplicate key in {keys:?}");
        Self {
            label_keys: keys.iter().map(|k| k.to_string()).collect(),
            label_values: values.into(),
            value,
        }
    }

    pub fn label_keys(&self) -> &[String] {
        &self.label_keys
    }

    pub fn label_values(&self) -> &[String] {
        &self.label_values
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Returns the value for the label `key`, if present.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.label_keys
            .iter()
            .position(|k| k == key)
            .and_then(|i| self.label_values.get(i))
            .map(String::as_str)
    }

    /// Puts `keys`/`values` in front of the existing labels.
    pub(crate) fn prefix(mut self, keys: &[&str], values: &[String]) -> Result<Self> {
        if keys.len() != values.len() {
            return Err(Error::LabelMismatch {
                keys: keys.len(),
                values: values.len(),
            });
        }
        if keys.is_empty() {
            return Ok(self);
        }
        let mut label_keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        label_keys.append(&mut self.label_keys);
        let mut label_values = values.to_vec();
        label_values.append(&mut self.label_values);
        check_unique(&label_keys)?;
        Ok(Self {
            label_keys,
            label_values,
            value: self.value,
        })
    }

    /// Appends the exposition line for this metric, including the newline.
    pub fn write_to(&self, name: &str, out: &mut String) {
        out.push_str(name);
        if !self.label_keys.is_empty() {
            out.push('{');
            for (i, (k, v)) in self.label_keys.iter().zip(&self.label_values).enumerate() {
                if i != 0 {
                    out.push(',');
                }
                out.push_str(k);
                out.push_str("=\"");
                render::escape_into(v, out);
                out.push('"');
            }
            out.push('}');
        }
        out.push(' ');
        render::format_value(self.value, out);
        out.push('\n');
    }
}

fn check_unique<S: AsRef<str>>(keys: &[S]) -> Result<()> {
    for (i, k) in keys.iter().enumerate() {
        if keys.iter().take(i).any(|p| p.as_ref() == k.as_ref()) {
            return Err(Error::DuplicateLabel(k.as_ref().to_string()));
        }
    }
    Ok(())
}

/// The ordered set of metrics one generator produced for one object.
///
/// An empty Family is normal: it's how a generator says "nothing to report".
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Family {
    metrics: Vec<Metric>,
}

impl Family {
    pub fn new(metrics: Vec<Metric>) -> Self {
        Self { metrics }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    pub fn push(&mut self, m: Metric) {
        self.metrics.push(m);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Metric> {
        self.metrics.iter()
    }

    /// Returns the exposition lines for every metric under `name`.
    pub fn render(&self, name: &str) -> String {
        let mut out = String::new();
        for m in &self.metrics {
            m.write_to(name, &mut out);
        }
        out
    }

    pub(crate) fn prefix(self, keys: &[&str], values: &[String]) -> Result<Self> {
        self.metrics
            .into_iter()
            .map(|m| m.prefix(keys, values))
            .collect::<Result<Vec<_>>>()
            .map(Self::new)
    }
}

impl From<Vec<Metric>> for Family {
    fn from(metrics: Vec<Metric>) -> Self {
        Self::new(metrics)
    }
}

impl From<Metric> for Family {
    fn from(m: Metric) -> Self {
        Self::new(vec![m])
    }
}

impl FromIterator<Metric> for Family {
    fn from_iter<I: IntoIterator<Item = Metric>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl IntoIterator for Family {
    type Item = Metric;
    type IntoIter = std::vec::IntoIter<Metric>;

    fn into_iter(self) -> Self::IntoIter {
        self.metrics.into_iter()
    }
}

impl<'a> IntoIterator for &'a Family {
    type Item = &'a Metric;
    type IntoIter = std::slice::Iter<'a, Metric>;

    fn into_iter(self) -> Self::IntoIter {
        self.metrics.iter()
    }
}

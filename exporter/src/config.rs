//! Command line and file configuration.
//!
//! Options come from an optional YAML file named by `--config`; flags given on the command line
//! (or through their environment variables) take precedence over the file.

use std::{
    collections::{BTreeMap, BTreeSet},
    net::{IpAddr, SocketAddr},
    path::{Path, PathBuf},
    str::FromStr,
};

use clap::{
    Arg, ArgAction, ArgMatches, Command, ValueHint, crate_authors, crate_description, crate_name,
    crate_version, parser::ValueSource, value_parser,
};
use metric::{AllowDenyList, CompositeFilter, OptInFilter};
use metrics_store::Shard;
use resources::{Allowed, Resource, WILDCARD};
use serde::Deserialize;
use strum::IntoEnumIterator;

use crate::{Error, Result};

/// Returns the CLI definition.
pub fn command() -> Command {
    Command::new(crate_name!())
        .version(crate_version!())
        .author(crate_authors!())
        .about(crate_description!())
        .subcommand_required(true)
        .subcommands([Command::new("run")
            .about("watch the cluster and serve metrics")
            .args([
                Arg::new("config")
                    .long("config")
                    .env("KSE_CONFIG")
                    .help("YAML file with options; flags override its values")
                    .value_hint(ValueHint::FilePath)
                    .value_parser(value_parser!(PathBuf)),
                Arg::new("host")
                    .long("host")
                    .env("KSE_HOST")
                    .help("address to bind for the metrics endpoint")
                    .default_value("::"),
                Arg::new("port")
                    .long("port")
                    .env("KSE_PORT")
                    .help("port for the metrics endpoint")
                    .value_parser(value_parser!(u16))
                    .default_value("8080"),
                Arg::new("telemetry_host")
                    .long("telemetry-host")
                    .env("KSE_TELEMETRY_HOST")
                    .help("address to bind for the exporter's own metrics")
                    .default_value("::"),
                Arg::new("telemetry_port")
                    .long("telemetry-port")
                    .env("KSE_TELEMETRY_PORT")
                    .help("port for the exporter's own metrics")
                    .value_parser(value_parser!(u16))
                    .default_value("8081"),
                Arg::new("resources")
                    .long("resources")
                    .env("KSE_RESOURCES")
                    .help("comma-separated list of resources to export, default all")
                    .value_delimiter(','),
                Arg::new("namespaces")
                    .long("namespaces")
                    .env("KSE_NAMESPACES")
                    .help("comma-separated list of namespaces to watch, default all")
                    .value_delimiter(','),
                Arg::new("namespaces_denylist")
                    .long("namespaces-denylist")
                    .help("comma-separated list of namespaces to skip when watching all of them")
                    .value_delimiter(','),
                Arg::new("metric_allowlist")
                    .long("metric-allowlist")
                    .help("comma-separated list of metric name patterns to export")
                    .long_help(concat!(
                        "Comma-separated list of regular expressions matched against whole ",
                        "metric family names. Mutually exclusive with `metric-denylist`."
                    ))
                    .value_delimiter(','),
                Arg::new("metric_denylist")
                    .long("metric-denylist")
                    .help("comma-separated list of metric name patterns to skip")
                    .value_delimiter(','),
                Arg::new("metric_opt_in_list")
                    .long("metric-opt-in-list")
                    .help("comma-separated list of opt-in metric families to enable")
                    .value_delimiter(','),
                Arg::new("metric_labels_allowlist")
                    .long("metric-labels-allowlist")
                    .help("Kubernetes labels to export per resource, e.g. pods=[app,team],nodes=[*]")
                    .long_help(concat!(
                        "Kubernetes labels to export per resource, in the form ",
                        "kind=[key,key],kind=[*]. By default no labels are exported. ",
                        "A `*` kind applies to every enabled resource. ",
                        "Allowing every key with `*` is expensive on large clusters."
                    )),
                Arg::new("metric_annotations_allowlist")
                    .long("metric-annotations-allowlist")
                    .help("Kubernetes annotations to export per resource, e.g. pods=[owner]"),
                Arg::new("shard")
                    .long("shard")
                    .env("KSE_SHARD")
                    .help("index of the shard this replica exports, starting at 0")
                    .value_parser(value_parser!(u32))
                    .default_value("0"),
                Arg::new("total_shards")
                    .long("total-shards")
                    .env("KSE_TOTAL_SHARDS")
                    .help("number of replicas splitting the objects between them")
                    .value_parser(value_parser!(u32))
                    .default_value("1"),
                Arg::new("enable_gzip_encoding")
                    .long("enable-gzip-encoding")
                    .help("gzip the metrics response when the client accepts it")
                    .action(ArgAction::SetTrue),
            ])])
}

/// The validated exporter configuration.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Options {
    pub host: String,
    pub port: u16,
    pub telemetry_host: String,
    pub telemetry_port: u16,
    pub resources: Vec<String>,
    pub namespaces: Vec<String>,
    pub namespaces_denylist: Vec<String>,
    pub metric_allowlist: Vec<String>,
    pub metric_denylist: Vec<String>,
    pub metric_opt_in_list: Vec<String>,
    pub metric_labels_allowlist: BTreeMap<String, Vec<String>>,
    pub metric_annotations_allowlist: BTreeMap<String, Vec<String>>,
    pub shard: u32,
    pub total_shards: u32,
    pub enable_gzip_encoding: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            host: "::".into(),
            port: 8080,
            telemetry_host: "::".into(),
            telemetry_port: 8081,
            resources: Resource::iter().map(|r| r.to_string()).collect(),
            namespaces: Vec::new(),
            namespaces_denylist: Vec::new(),
            metric_allowlist: Vec::new(),
            metric_denylist: Vec::new(),
            metric_opt_in_list: Vec::new(),
            metric_labels_allowlist: BTreeMap::new(),
            metric_annotations_allowlist: BTreeMap::new(),
            shard: 0,
            total_shards: 1,
            enable_gzip_encoding: false,
        }
    }
}

impl TryFrom<&ArgMatches> for Options {
    type Error = Error;

    fn try_from(m: &ArgMatches) -> Result<Self> {
        let mut opts = match m.get_one::<PathBuf>("config") {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        if let Some(v) = explicit::<String>(m, "host") {
            opts.host = v.clone();
        }
        if let Some(v) = explicit::<u16>(m, "port") {
            opts.port = *v;
        }
        if let Some(v) = explicit::<String>(m, "telemetry_host") {
            opts.telemetry_host = v.clone();
        }
        if let Some(v) = explicit::<u16>(m, "telemetry_port") {
            opts.telemetry_port = *v;
        }
        if let Some(v) = explicit::<u32>(m, "shard") {
            opts.shard = *v;
        }
        if let Some(v) = explicit::<u32>(m, "total_shards") {
            opts.total_shards = *v;
        }
        if let Some(v) = explicit::<bool>(m, "enable_gzip_encoding") {
            opts.enable_gzip_encoding = *v;
        }
        for (id, field) in [
            ("resources", &mut opts.resources),
            ("namespaces", &mut opts.namespaces),
            ("namespaces_denylist", &mut opts.namespaces_denylist),
            ("metric_allowlist", &mut opts.metric_allowlist),
            ("metric_denylist", &mut opts.metric_denylist),
            ("metric_opt_in_list", &mut opts.metric_opt_in_list),
        ] {
            if let Some(vs) = explicit_many(m, id) {
                *field = vs;
            }
        }
        if let Some(v) = explicit::<String>(m, "metric_labels_allowlist") {
            opts.metric_labels_allowlist = parse_allowlist(v)?;
        }
        if let Some(v) = explicit::<String>(m, "metric_annotations_allowlist") {
            opts.metric_annotations_allowlist = parse_allowlist(v)?;
        }
        opts.validate()?;
        Ok(opts)
    }
}

/// Returns the value of `id` only if the user supplied it.
fn explicit<'a, T>(m: &'a ArgMatches, id: &str) -> Option<&'a T>
where
    T: Clone + Send + Sync + 'static,
{
    match m.value_source(id) {
        None | Some(ValueSource::DefaultValue) => None,
        Some(_) => m.get_one::<T>(id),
    }
}

fn explicit_many(m: &ArgMatches, id: &str) -> Option<Vec<String>> {
    match m.value_source(id) {
        None | Some(ValueSource::DefaultValue) => None,
        Some(_) => m.get_many::<String>(id).map(|vs| {
            vs.map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect()
        }),
    }
}

impl Options {
    /// Reads options from a YAML file. Missing fields keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let f = std::fs::File::open(path)?;
        let opts: Self = serde_yaml::from_reader(f)?;
        Ok(opts)
    }

    /// Checks everything that can be checked without a cluster.
    pub fn validate(&self) -> Result<()> {
        self.enabled_resources()?;
        self.shard()?;
        for (what, list) in [
            ("labels", &self.metric_labels_allowlist),
            ("annotations", &self.metric_annotations_allowlist),
        ] {
            for kind in list.keys().filter(|k| *k != WILDCARD) {
                Resource::from_str(kind).map_err(|_| {
                    Error::Config(format!("{what} allowlist: unknown resource {kind:?}"))
                })?;
            }
        }
        self.filter()?;
        Ok(())
    }

    pub fn address(&self) -> Result<SocketAddr> {
        Ok(SocketAddr::new(self.host.parse::<IpAddr>()?, self.port))
    }

    pub fn telemetry_address(&self) -> Result<SocketAddr> {
        Ok(SocketAddr::new(
            self.telemetry_host.parse::<IpAddr>()?,
            self.telemetry_port,
        ))
    }

    /// Returns the configured resources, deduplicated, in exposition order.
    pub fn enabled_resources(&self) -> Result<Vec<Resource>> {
        let set = self
            .resources
            .iter()
            .map(|r| {
                Resource::from_str(r)
                    .map_err(|_| Error::Config(format!("unknown resource {r:?}")))
            })
            .collect::<Result<BTreeSet<_>>>()?;
        if set.is_empty() {
            return Err(Error::Config("no resources enabled".into()));
        }
        Ok(set.into_iter().collect())
    }

    /// Builds the family filter from the allow, deny and opt-in lists.
    pub fn filter(&self) -> Result<CompositeFilter> {
        let list = AllowDenyList::new(&self.metric_allowlist, &self.metric_denylist)?;
        let opt_in = OptInFilter::new(&self.metric_opt_in_list)?;
        Ok(CompositeFilter::new().with(list).with(opt_in))
    }

    /// Returns the label and annotation allowlists for `r`.
    ///
    /// A `*` kind applies to every resource and takes precedence over the resource's own entry.
    /// Kinds not named export no labels or annotations.
    pub fn allowed(&self, r: Resource) -> Allowed {
        let lookup = |list: &BTreeMap<String, Vec<String>>| {
            list.get(WILDCARD)
                .or_else(|| list.get(<&str>::from(r)))
                .cloned()
                .unwrap_or_default()
        };
        Allowed {
            labels: lookup(&self.metric_labels_allowlist),
            annotations: lookup(&self.metric_annotations_allowlist),
        }
    }

    /// Returns the shard this replica exports.
    pub fn shard(&self) -> Result<Shard> {
        Shard::new(self.shard, self.total_shards).ok_or_else(|| {
            Error::Config(format!(
                "shard {} out of range for {} total shards",
                self.shard, self.total_shards
            ))
        })
    }
}

/// Parses `kind=[key,key],kind=[*]`.
///
/// Brackets may be empty. Repeating a kind replaces its earlier list.
pub fn parse_allowlist(s: &str) -> Result<BTreeMap<String, Vec<String>>> {
    let bad = || {
        Error::Config(format!(
            "invalid allowlist {s:?}: want the form kind=[key,key],kind=[*]"
        ))
    };
    let mut out = BTreeMap::new();
    let mut rest = s.trim();
    while !rest.is_empty() {
        let (kind, after) = rest.split_once("=[").ok_or_else(bad)?;
        let (keys, after) = after.split_once(']').ok_or_else(bad)?;
        let kind = kind.trim();
        if kind.is_empty() || kind.contains([',', '[', ']', '=']) || keys.contains(['[', '=']) {
            return Err(bad());
        }
        let keys: Vec<String> = keys
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(String::from)
            .collect();
        out.insert(kind.to_string(), keys);
        rest = match after.trim_start().strip_prefix(',') {
            Some(r) if r.trim().is_empty() => return Err(bad()),
            Some(r) => r.trim_start(),
            None if after.trim().is_empty() => "",
            None => return Err(bad()),
        };
    }
    Ok(out)
}

/// Returns the watch field selector for a store.
///
/// A store bound to one namespace selects it. The denylist is excluded either way, so a
/// namespace that is both listed and denied yields nothing.
pub fn field_selector(namespace: Option<&str>, denylist: &[String]) -> Option<String> {
    let terms: Vec<String> = namespace
        .map(|ns| format!("metadata.namespace={ns}"))
        .into_iter()
        .chain(denylist.iter().map(|ns| format!("metadata.namespace!={ns}")))
        .collect();
    (!terms.is_empty()).then(|| terms.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_matches(args: &[&str]) -> ArgMatches {
        let m = command()
            .try_get_matches_from(["exporter", "run"].iter().chain(args))
            .expect("bad args");
        m.subcommand_matches("run").expect("no run").clone()
    }

    #[test]
    fn defaults() {
        let opts = Options::try_from(&run_matches(&[])).unwrap();
        assert_eq!(opts, Options::default());
        assert_eq!(opts.address().unwrap().to_string(), "[::]:8080");
        assert_eq!(opts.telemetry_address().unwrap().to_string(), "[::]:8081");
        assert_eq!(opts.enabled_resources().unwrap().len(), 10);
        assert_eq!(opts.shard().unwrap(), Shard::default());
        assert!(!opts.enable_gzip_encoding);
        for r in Resource::iter() {
            assert_eq!(opts.allowed(r), Allowed::default(), "{r}");
        }
    }

    #[test]
    fn flags() {
        let opts = Options::try_from(&run_matches(&[
            "--host",
            "127.0.0.1",
            "--port",
            "9000",
            "--resources",
            "pods,nodes,pods",
            "--namespaces",
            "a,b",
            "--metric-denylist",
            "kube_pod_.*",
            "--metric-labels-allowlist",
            "pods=[app,team],nodes=[*]",
        ]))
        .unwrap();
        assert_eq!(opts.address().unwrap().to_string(), "127.0.0.1:9000");
        assert_eq!(
            opts.enabled_resources().unwrap(),
            vec![Resource::Nodes, Resource::Pods]
        );
        assert_eq!(opts.namespaces, vec!["a", "b"]);
        assert_eq!(opts.allowed(Resource::Pods).labels, vec!["app", "team"]);
        assert_eq!(opts.allowed(Resource::Nodes).labels, vec!["*"]);
        assert!(opts.allowed(Resource::Secrets).labels.is_empty());
        assert!(opts.allowed(Resource::Pods).annotations.is_empty());
    }

    #[test]
    fn wildcard_kind() {
        let opts = Options::try_from(&run_matches(&[
            "--resources",
            "pods,secrets",
            "--metric-labels-allowlist",
            "*=[team],pods=[app]",
            "--metric-annotations-allowlist",
            "*=[*]",
        ]))
        .unwrap();
        // The wildcard kind wins over the resource's own entry.
        assert_eq!(opts.allowed(Resource::Pods).labels, vec!["team"]);
        assert_eq!(opts.allowed(Resource::Secrets).labels, vec!["team"]);
        assert_eq!(opts.allowed(Resource::Secrets).annotations, vec!["*"]);
    }

    #[test]
    fn namespaces_with_denylist() {
        let opts = Options::try_from(&run_matches(&[
            "--namespaces",
            "a,b",
            "--namespaces-denylist",
            "b",
        ]))
        .unwrap();
        assert_eq!(opts.namespaces, vec!["a", "b"]);
        assert_eq!(opts.namespaces_denylist, vec!["b"]);
    }

    #[test]
    fn sharding_and_gzip() {
        let opts = Options::try_from(&run_matches(&[
            "--shard",
            "2",
            "--total-shards",
            "3",
            "--enable-gzip-encoding",
        ]))
        .unwrap();
        assert_eq!(opts.shard().unwrap(), Shard::new(2, 3).unwrap());
        assert!(opts.enable_gzip_encoding);
    }

    #[test]
    fn invalid() {
        let cases: &[&[&str]] = &[
            &["--resources", "pods,widgets"],
            &["--shard", "3", "--total-shards", "3"],
            &["--total-shards", "0"],
            &["--metric-allowlist", "a", "--metric-denylist", "b"],
            &["--metric-denylist", "kube_(pod"],
            &["--metric-labels-allowlist", "widgets=[app]"],
            &["--metric-annotations-allowlist", "pods=app"],
            &["--host", "not an address"],
        ];
        for args in cases {
            let res = Options::try_from(&run_matches(args)).and_then(|o| o.address());
            assert!(res.is_err(), "{args:?} should fail");
        }
    }

    #[test]
    fn yaml() {
        let opts: Options = serde_yaml::from_str(
            r#"
port: 9100
resources: [deployments]
metric_labels_allowlist:
  deployments: ["app"]
"#,
        )
        .unwrap();
        assert_eq!(opts.port, 9100);
        assert_eq!(opts.host, "::");
        assert_eq!(opts.allowed(Resource::Deployments).labels, vec!["app"]);
        opts.validate().unwrap();

        let err = serde_yaml::from_str::<Options>("prot: 9100").unwrap_err();
        assert!(err.to_string().contains("prot"), "{err}");
    }

    #[test]
    fn allowlists() {
        let got = parse_allowlist("pods=[app,team],nodes=[*], secrets=[]").unwrap();
        assert_eq!(got["pods"], vec!["app", "team"]);
        assert_eq!(got["nodes"], vec!["*"]);
        assert!(got["secrets"].is_empty());
        assert!(parse_allowlist("").unwrap().is_empty());
        assert_eq!(
            parse_allowlist("pods=[app.kubernetes.io/name]").unwrap()["pods"],
            vec!["app.kubernetes.io/name"]
        );

        for bad in [
            "pods",
            "pods=app",
            "pods=[app",
            "pods=[app],",
            ",pods=[app]",
            "pods=[app]nodes=[*]",
            "=[app]",
            "pods=[a=[b]]",
        ] {
            assert!(parse_allowlist(bad).is_err(), "{bad:?} should fail");
        }
    }

    #[test]
    fn selectors() {
        assert_eq!(
            field_selector(Some("kube-system"), &[]).as_deref(),
            Some("metadata.namespace=kube-system")
        );
        assert_eq!(field_selector(None, &[]), None);
        assert_eq!(
            field_selector(None, &["a".into(), "b".into()]).as_deref(),
            Some("metadata.namespace!=a,metadata.namespace!=b")
        );
        assert_eq!(
            field_selector(Some("a"), &["b".into()]).as_deref(),
            Some("metadata.namespace=a,metadata.namespace!=b")
        );
    }
}

use std::path::PathBuf;

use metric::Generators;
use serde::de::DeserializeOwned;
use serde_json::from_str;
use simple_txtar::Archive;

pub type Result = std::result::Result<(), Box<dyn std::error::Error>>;

/// Reads `fixtures/<module>/<name>.txtar` and returns the object from `input.json`
/// and the text of `want.txt`.
pub fn load_fixure<K>(modpath: &str, name: &str) -> (K, String)
where
    K: DeserializeOwned,
{
    let prefix = modpath
        .rsplit_once("::")
        .map(|(pre, suf)| if suf == "tests" { pre } else { suf })
        .and_then(|m| m.rsplit("::").next())
        .unwrap();
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("fixtures")
        .join(prefix)
        .join(format!("{name}.txtar"));
    let path = path.as_path().to_str().expect("programmer error");
    eprintln!("looking for: {path}");
    let ar = Archive::from_file(path).expect("unable to load txtar");

    let v: K = {
        let f = ar.get("input.json").expect("malformed txtar");
        from_str(&f.content).expect("bad json")
    };
    let want = ar.get("want.txt").expect("malformed txtar").content.clone();
    (v, want)
}

/// Renders every family named by a `# TYPE` line in the fixture's `want.txt` and
/// compares the sorted lines.
pub fn check<K>(gens: &Generators<K>, modpath: &str, name: &str) -> Result
where
    K: DeserializeOwned,
{
    let (obj, want) = load_fixure::<K>(modpath, name);
    let names: Vec<&str> = want
        .lines()
        .filter_map(|l| l.trim().strip_prefix("# TYPE "))
        .filter_map(|l| l.split_whitespace().next())
        .collect();
    assert!(!names.is_empty(), "fixture {name} names no families");

    let rendered = gens.render(&obj)?;
    let mut got: Vec<String> = gens
        .iter()
        .zip(rendered)
        .filter(|(g, _)| names.contains(&g.name()))
        .flat_map(|(g, body)| {
            let mut lines: Vec<String> = g.header().lines().map(String::from).collect();
            lines.extend(body.lines().map(String::from));
            lines
        })
        .collect();
    let mut want: Vec<String> = want
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect();
    got.sort();
    want.sort();
    assert_eq!(got, want, "fixture {name}");
    Ok(())
}

/// Generates one test per fixture name, each checking `$families` against
/// `fixtures/<module>/<name>.txtar`.
macro_rules! fixture_tests {
    ($kind:ty, $families:expr, $($name:ident),+ $(,)?) => {
        $(
        #[test_log::test]
        fn $name() -> $crate::testutil::Result {
            let gens: metric::Generators<$kind> = $families;
            $crate::testutil::check(&gens, module_path!(), stringify!($name))
        }
        )+
    };
}
pub(crate) use fixture_tests;

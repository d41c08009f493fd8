use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use metric::{Error, Result};

/// Resolves an int-or-percent against `total`.
///
/// Percentages are rounded up when `round_up` is set and down otherwise. A string that isn't
/// a percentage is an error.
pub(crate) fn scaled_value(v: &IntOrString, total: i32, round_up: bool) -> Result<f64> {
    match v {
        IntOrString::Int(i) => Ok(f64::from(*i)),
        IntOrString::String(s) => {
            let pct: i32 = s
                .strip_suffix('%')
                .ok_or_else(|| Error::InvalidValue(format!("{s:?} is not a percentage")))?
                .parse()
                .map_err(|err| Error::InvalidValue(format!("invalid value {s:?}: {err}")))?;
            let v = f64::from(pct) * f64::from(total) / 100.0;
            Ok(if round_up { v.ceil() } else { v.floor() })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pct(s: &str) -> IntOrString {
        IntOrString::String(s.into())
    }

    #[test]
    fn scaled() {
        for (v, total, up, want) in [
            (IntOrString::Int(3), 10, false, 3.0),
            (pct("20%"), 5, false, 1.0),
            (pct("20%"), 5, true, 1.0),
            (pct("25%"), 10, false, 2.0),
            (pct("25%"), 10, true, 3.0),
            (pct("0%"), 10, true, 0.0),
            (pct("100%"), 7, false, 7.0),
        ] {
            assert_eq!(scaled_value(&v, total, up).unwrap(), want, "{v:?} of {total}");
        }
    }

    #[test]
    fn not_a_percentage() {
        assert!(scaled_value(&pct("20"), 5, false).is_err());
        assert!(scaled_value(&pct("x%"), 5, false).is_err());
    }
}

use std::str::FromStr;

use metric::Error;

/// A parsed resource quantity: `mantissa × 10^exp10 × 2^exp2`.
///
/// Quantities arrive in their canonical string form, e.g. `100m`, `1Gi`, `1.5`, `12e6`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Amount {
    mantissa: i128,
    exp10: i32,
    exp2: u32,
}

/// Largest value that still fits in an i64 after scaling to milli-units.
const MAX_MILLI_VALUE: i64 = 9_223_372_036_854_775;

impl Amount {
    /// The amount rounded up to a whole number.
    pub fn value(&self) -> i64 {
        self.scaled(0)
    }

    /// The amount in thousandths, rounded up.
    pub fn milli_value(&self) -> i64 {
        self.scaled(3)
    }

    /// The amount with millesimal precision, or the whole value if it is too
    /// large to be expressed in thousandths.
    pub fn as_float(&self) -> f64 {
        let v = self.value();
        if v > MAX_MILLI_VALUE {
            return crate::utils::int_float(v);
        }
        crate::utils::int_float(self.milli_value()) / 1000.0
    }

    fn scaled(&self, shift: i32) -> i64 {
        let Some(v) = 1i128
            .checked_shl(self.exp2)
            .and_then(|m| self.mantissa.checked_mul(m))
        else {
            return overflow(self.mantissa);
        };
        let exp = self.exp10.saturating_add(shift);
        let v = if exp >= 0 {
            match pow10(exp).and_then(|p| v.checked_mul(p)) {
                Some(v) => v,
                None => return overflow(v),
            }
        } else {
            match pow10(exp.saturating_neg()) {
                Some(d) => div_ceil(v, d),
                // Any non-zero remainder rounds up to one.
                None => i128::from(v > 0),
            }
        };
        saturate(v)
    }
}

fn pow10(exp: i32) -> Option<i128> {
    10i128.checked_pow(u32::try_from(exp).ok()?)
}

fn div_ceil(v: i128, d: i128) -> i128 {
    let q = v.checked_div(d).unwrap_or_default();
    match v.checked_rem(d) {
        Some(r) if r > 0 => q.saturating_add(1),
        _ => q,
    }
}

fn saturate(v: i128) -> i64 {
    i64::try_from(v).unwrap_or_else(|_| overflow(v))
}

/// The saturated result of scaling `v` past the i128 range.
fn overflow(v: i128) -> i64 {
    match v.signum() {
        1 => i64::MAX,
        -1 => i64::MIN,
        _ => 0,
    }
}

impl FromStr for Amount {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidValue(format!("invalid quantity {s:?}"));
        let (negative, rest) = match s.trim().strip_prefix('-') {
            Some(r) => (true, r),
            None => (false, s.trim().strip_prefix('+').unwrap_or(s.trim())),
        };
        let end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, suffix) = rest.split_at(end);
        let (whole, frac) = number.split_once('.').unwrap_or((number, ""));
        if (whole.is_empty() && frac.is_empty()) || frac.contains('.') {
            return Err(invalid());
        }

        let mut mantissa: i128 = 0;
        for d in whole.bytes().chain(frac.bytes()) {
            mantissa = mantissa
                .checked_mul(10)
                .and_then(|m| m.checked_add(i128::from(d.wrapping_sub(b'0'))))
                .ok_or_else(invalid)?;
        }
        if negative {
            mantissa = mantissa.checked_neg().ok_or_else(invalid)?;
        }
        let frac_digits = i32::try_from(frac.len()).map_err(|_| invalid())?;

        let (exp10, exp2) = match suffix {
            "" => (0, 0),
            "n" => (-9, 0),
            "u" => (-6, 0),
            "m" => (-3, 0),
            "k" => (3, 0),
            "M" => (6, 0),
            "G" => (9, 0),
            "T" => (12, 0),
            "P" => (15, 0),
            "E" => (18, 0),
            "Ki" => (0, 10),
            "Mi" => (0, 20),
            "Gi" => (0, 30),
            "Ti" => (0, 40),
            "Pi" => (0, 50),
            "Ei" => (0, 60),
            s => {
                let exp = s
                    .strip_prefix(['e', 'E'])
                    .filter(|e| !e.is_empty())
                    .ok_or_else(invalid)?;
                (exp.parse::<i32>().map_err(|_| invalid())?, 0)
            }
        };
        Ok(Self {
            mantissa,
            exp10: exp10.checked_sub(frac_digits).ok_or_else(invalid)?,
            exp2,
        })
    }
}

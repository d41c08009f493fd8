//! Exposition text helpers.

/// Appends `v` with backslash, double quote, and newline escaped.
pub(crate) fn escape_into(v: &str, out: &mut String) {
    for c in v.chars() {
        match c {
            '\\' => out.push_str(r"\\"),
            '"' => out.push_str(r#"\""#),
            '\n' => out.push_str(r"\n"),
            c => out.push(c),
        }
    }
}

/// Appends `v` using the shortest representation that round-trips.
///
/// Decimal exponents below -4 or at or above 6 use exponent notation with a signed, two digit
/// minimum exponent (`1.5e+09`), which is what scrapers expect for `%g`-style output.
pub(crate) fn format_value(v: f64, out: &mut String) {
    if v.is_nan() {
        out.push_str("NaN");
        return;
    }
    if v.is_infinite() {
        out.push_str(if v.is_sign_positive() { "+Inf" } else { "-Inf" });
        return;
    }
    let sci = format!("{v:e}");
    let Some((mantissa, exp)) = sci.split_once('e') else {
        out.push_str(&sci);
        return;
    };
    let exp: i32 = exp.parse().unwrap_or_default();
    if (-4..6).contains(&exp) {
        out.push_str(&v.to_string());
        return;
    }
    out.push_str(mantissa);
    out.push('e');
    out.push(if exp < 0 { '-' } else { '+' });
    let exp = exp.unsigned_abs();
    if exp < 10 {
        out.push('0');
    }
    out.push_str(&exp.to_string());
}

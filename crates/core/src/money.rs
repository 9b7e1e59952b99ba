//! Integer-cent money helpers.

/// Amounts are always integer cents. Floating point never touches a total.
pub type Cents = i64;

/// Render cents as a dollar string, e.g. `2550` -> `$25.50`.
pub fn format_cents(cents: Cents) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}${}.{:02}", sign, abs / 100, abs % 100)
}

/// Convert a dollar amount supplied by the model into cents, rounding to the
/// nearest cent. Returns `None` for negative or non-finite input.
pub fn dollars_to_cents(dollars: f64) -> Option<Cents> {
    if !dollars.is_finite() || dollars < 0.0 {
        return None;
    }
    Some((dollars * 100.0).round() as Cents)
}

//! Semantic comparison of Kubernetes resource quantities
//!
//! The API server may echo a storage request back in a different but
//! equivalent form (`1Gi` vs `1024Mi`), so claims are compared by value.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

const SUFFIXES: &[(&str, f64)] = &[
    ("Ki", 1024.0),
    ("Mi", 1024.0 * 1024.0),
    ("Gi", 1024.0 * 1024.0 * 1024.0),
    ("Ti", 1024.0 * 1024.0 * 1024.0 * 1024.0),
    ("Pi", 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0),
    ("Ei", 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0),
    ("n", 1e-9),
    ("u", 1e-6),
    ("m", 1e-3),
    ("k", 1e3),
    ("M", 1e6),
    ("G", 1e9),
    ("T", 1e12),
    ("P", 1e15),
    ("E", 1e18),
];

/// Parse a quantity into its numeric value in base units
///
/// Returns `None` for strings that are not valid quantities.
pub fn quantity_value(quantity: &Quantity) -> Option<f64> {
    let s = quantity.0.trim();
    if s.is_empty() {
        return None;
    }

    for (suffix, multiplier) in SUFFIXES {
        if let Some(number) = s.strip_suffix(suffix) {
            return parse_number(number).map(|n| n * multiplier);
        }
    }

    // Decimal exponent form, e.g. "1e9" or "12E6"
    if let Some((mantissa, exponent)) = s.split_once(['e', 'E']) {
        let exponent: i32 = exponent.parse().ok()?;
        return parse_number(mantissa).map(|n| n * 10f64.powi(exponent));
    }

    parse_number(s)
}

fn parse_number(s: &str) -> Option<f64> {
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | '+' | '-')) {
        return None;
    }
    s.parse::<f64>().ok()
}

/// Compare two quantities by value, falling back to string equality when
/// either side cannot be parsed
pub fn quantities_equal(a: &Quantity, b: &Quantity) -> bool {
    match (quantity_value(a), quantity_value(b)) {
        (Some(x), Some(y)) => (x - y).abs() <= f64::EPSILON * x.abs().max(y.abs()).max(1.0),
        _ => a.0.trim() == b.0.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(s: &str) -> Quantity {
        Quantity(s.to_string())
    }

    #[test]
    fn binary_suffixes_are_equivalent() {
        assert!(quantities_equal(&q("1Gi"), &q("1024Mi")));
        assert!(quantities_equal(&q("2Ti"), &q("2048Gi")));
        assert!(!quantities_equal(&q("1Gi"), &q("1G")));
    }

    #[test]
    fn decimal_and_exponent_forms() {
        assert_eq!(quantity_value(&q("10G")), Some(1e10));
        assert!(quantities_equal(&q("1e9"), &q("1G")));
        assert!(quantities_equal(&q("500m"), &q("0.5")));
        assert!(quantities_equal(&q("1.5Gi"), &q("1536Mi")));
    }

    #[test]
    fn unparseable_quantities_compare_as_strings() {
        assert_eq!(quantity_value(&q("lots")), None);
        assert_eq!(quantity_value(&q("")), None);
        assert!(quantities_equal(&q("lots"), &q("lots")));
        assert!(!quantities_equal(&q("lots"), &q("10Gi")));
    }
}

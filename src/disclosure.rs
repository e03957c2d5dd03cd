use serde_json::Value;

/// Zeroes counts at or below `threshold`.
pub fn low_number_suppression(count: i64, threshold: i64) -> i64 {
    if count <= threshold {
        0
    } else {
        count
    }
}

/// Rounds `count` to the nearest multiple of `nearest`, half away from zero.
/// `nearest <= 0` leaves the count untouched.
pub fn rounding(count: i64, nearest: i64) -> i64 {
    if nearest <= 0 {
        return count;
    }
    let ratio = count as f64 / nearest as f64;
    let rounded = if ratio >= 0.0 {
        (ratio + 0.5).floor()
    } else {
        (ratio - 0.5).ceil()
    };
    (rounded as i64) * nearest
}

/// A single disclosure-control modifier as received from the coordinator,
/// e.g. `{"id": "Rounding", "nearest": 100}` or
/// `{"id": "Low Number Suppression", "threshold": 10}`.
#[derive(Debug, Clone)]
pub struct ResultModifier {
    pub id: String,
    pub threshold: Option<i64>,
    pub nearest: Option<i64>,
}

impl ResultModifier {
    pub fn from_value(v: &Value) -> Option<Self> {
        let id = v.get("id")?.as_str()?.to_string();
        Some(Self {
            id,
            threshold: v.get("threshold").and_then(Value::as_i64),
            nearest: v.get("nearest").and_then(Value::as_i64),
        })
    }
}

/// Applies `filters` to `count` **in the order given** — no normalization,
/// no canonical ordering. A rounding filter placed before a suppression
/// filter can push a small count above the suppression threshold before it
/// is ever checked; this is a documented, intentional property of the
/// upstream pipeline, not a bug to fix here.
pub fn apply_filters(count: i64, filters: &[ResultModifier]) -> i64 {
    let mut value = count;
    for filter in filters {
        value = match filter.id.as_str() {
            "Low Number Suppression" => {
                low_number_suppression(value, filter.threshold.unwrap_or(10))
            }
            "Rounding" => rounding(value, filter.nearest.unwrap_or(10)),
            _ => value,
        };
    }
    value
}

/// Parses the coordinator's `modifiers` JSON array into `ResultModifier`s,
/// skipping anything malformed rather than failing the whole query.
pub fn parse_modifiers(modifiers: &Value) -> Vec<ResultModifier> {
    modifiers
        .as_array()
        .map(|arr| arr.iter().filter_map(ResultModifier::from_value).collect())
        .unwrap_or_default()
}

/// Builds the daemon's fixed modifier pair from `ObfuscationSettings`,
/// matching the source's `results_modifiers()` — the daemon applies the same
/// suppression/rounding policy to every task, unlike the CLI, where
/// modifiers arrive per invocation via `--modifiers`.
pub fn from_obfuscation_settings(settings: &crate::config::ObfuscationSettings) -> Vec<ResultModifier> {
    vec![
        ResultModifier {
            id: "Low Number Suppression".to_string(),
            threshold: Some(settings.low_number_suppression_threshold),
            nearest: None,
        },
        ResultModifier {
            id: "Rounding".to_string(),
            threshold: None,
            nearest: Some(settings.rounding_target),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_number_suppression_boundary() {
        assert_eq!(low_number_suppression(99, 100), 0);
        assert_eq!(low_number_suppression(100, 100), 0);
        assert_eq!(low_number_suppression(101, 100), 101);
    }

    #[test]
    fn rounding_targets() {
        assert_eq!(rounding(123, 100), 100);
        assert_eq!(rounding(123, 10), 120);
        assert_eq!(rounding(123, 1), 123);
    }

    fn modifier(id: &str, key: &str, value: i64) -> ResultModifier {
        ResultModifier::from_value(&serde_json::json!({ "id": id, key: value })).unwrap()
    }

    #[test]
    fn apply_filters_rounding_only() {
        let filters = vec![modifier("Rounding", "nearest", 100)];
        assert_eq!(apply_filters(123, &filters), 100);
    }

    #[test]
    fn apply_filters_suppression_only() {
        let filters = vec![modifier("Low Number Suppression", "threshold", 100)];
        assert_eq!(apply_filters(123, &filters), 123);
    }

    #[test]
    fn apply_filters_both_suppress_then_round() {
        let filters = vec![
            modifier("Low Number Suppression", "threshold", 100),
            modifier("Rounding", "nearest", 100),
        ];
        assert_eq!(apply_filters(123, &filters), 100);
    }

    /// Rounding before suppression can leak a count that should have been
    /// zeroed: 60 rounds up to 100, which then clears the 70 threshold.
    #[test]
    fn apply_filters_order_can_leak() {
        let filters = vec![
            modifier("Rounding", "nearest", 100),
            modifier("Low Number Suppression", "threshold", 70),
        ];
        assert_eq!(apply_filters(60, &filters), 100);
    }
}

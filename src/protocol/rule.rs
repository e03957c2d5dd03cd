use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

fn numeric_range_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(-?\d*\.\d+|\d+|null)\.\.(-?\d*\.\d+|null)").expect("valid regex")
    })
}

/// A single clinical-criterion rule. `type_` of `"NUM"` carries an encoded
/// numeric range in `value` (`"<min>..<max>"`) and a concept id tucked into
/// `varname` as `"OMOP=<id>"`; `normalize()` moves that id into `value`, so
/// every rule — NUM or not — ends up addressing its concept via `value`
/// (`varname` is the fixed literal `"OMOP"` for non-NUM rules on the wire).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default)]
    pub varname: String,
    #[serde(rename = "type", default)]
    pub type_: String,
    #[serde(rename = "oper", default)]
    pub operator: String,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub varcat: Option<String>,
    #[serde(default)]
    pub secondary_modifier: Option<Vec<String>>,

    #[serde(skip)]
    pub min_value: Option<f64>,
    #[serde(skip)]
    pub max_value: Option<f64>,

    #[serde(skip)]
    pub left_value_time: Option<i64>,
    #[serde(skip)]
    pub right_value_time: Option<i64>,
    #[serde(skip)]
    pub time_category: Option<String>,
    #[serde(skip)]
    pub time_unit: Option<String>,
}

impl Rule {
    /// Normalizes a freshly deserialized rule: for `NUM` rules, pulls the
    /// min/max bounds out of `value` and moves the concept id encoded in
    /// `varname` into `varname` itself, matching the source's constructor
    /// side effects. Also decodes the `time` window, when present, into its
    /// `L|R:AGE|TIME:Y|M` components.
    pub fn normalize(mut self) -> Self {
        if self.type_ == "NUM" {
            let raw = self.value.as_str().unwrap_or("").to_string();
            let (min_value, max_value) = Self::parse_numeric(&raw);
            self.min_value = min_value;
            self.max_value = max_value;
            self.value = serde_json::Value::String(
                self.varname
                    .split_once('=')
                    .map(|(_, concept)| concept.to_string())
                    .unwrap_or_default(),
            );
        }
        if let Some(time) = self.time.clone() {
            let (left, right, category, unit) = Self::parse_time_window(&time);
            self.left_value_time = left;
            self.right_value_time = right;
            self.time_category = category;
            self.time_unit = unit;
        }
        self
    }

    /// Decodes `"L|R:AGE|TIME:Y|M"`: an `L|R` range (exactly one side
    /// empty), a category (`AGE` or `TIME`), and a unit (`Y` years or `M`
    /// months). Malformed encodings parse to all-`None` rather than erroring
    /// — an unparseable time window degrades to "no time constraint".
    fn parse_time_window(
        time: &str,
    ) -> (Option<i64>, Option<i64>, Option<String>, Option<String>) {
        let mut parts = time.splitn(3, ':');
        let Some(range_part) = parts.next() else {
            return (None, None, None, None);
        };
        let category = parts.next().map(str::to_string);
        let unit = parts.next().map(str::to_string);

        let mut range = range_part.splitn(2, '|');
        let left = range.next().and_then(|s| s.parse::<i64>().ok());
        let right = range.next().and_then(|s| s.parse::<i64>().ok());
        (left, right, category, unit)
    }

    /// `left_value_time`/`right_value_time` converted to months, the unit
    /// the temporal-constraint builder works in. `TIME` windows may be
    /// expressed in years (`Y`) and need scaling; `AGE` windows are always
    /// whole years and are left as-is by the age-constraint builder.
    pub fn time_window_in_months(&self) -> (Option<i64>, Option<i64>) {
        let scale = match self.time_unit.as_deref() {
            Some("Y") => 12,
            _ => 1,
        };
        (
            self.left_value_time.map(|v| v * scale),
            self.right_value_time.map(|v| v * scale),
        )
    }

    fn parse_numeric(value: &str) -> (Option<f64>, Option<f64>) {
        match numeric_range_pattern().captures(value) {
            Some(caps) => {
                let min_value = caps.get(1).and_then(|m| m.as_str().parse::<f64>().ok());
                let max_value = caps.get(2).and_then(|m| m.as_str().parse::<f64>().ok());
                (min_value, max_value)
            }
            None => (None, None),
        }
    }

    /// The concept id this rule addresses. On the wire this always lives in
    /// `value` — `"OMOP"` + `value="8507"` for a plain rule, or (after
    /// `normalize()` moves the `OMOP=<id>` suffix out of `varname`) the same
    /// for a `NUM` rule.
    pub fn concept_id(&self) -> Option<i64> {
        self.value.as_str()?.parse().ok()
    }

    /// Re-encodes the rule the way `Rule.to_dict()` does, restoring the
    /// `OMOP=<id>` / `<min>..<max>` wire shape for NUM rules.
    pub fn to_wire_value(&self) -> serde_json::Value {
        let (varname, value) = if self.type_ == "NUM" {
            (
                format!("OMOP={}", self.value.as_str().unwrap_or("")),
                serde_json::Value::String(format!(
                    "{}..{}",
                    self.min_value
                        .map(python_float_str)
                        .unwrap_or_else(|| "None".to_string()),
                    self.max_value
                        .map(python_float_str)
                        .unwrap_or_else(|| "None".to_string()),
                )),
            )
        } else {
            (self.varname.clone(), self.value.clone())
        };
        serde_json::json!({
            "varname": varname,
            "type": self.type_,
            "oper": self.operator,
            "value": value,
        })
    }
}

/// Renders an `f64` the way Python's `str(float)` does — whole numbers keep
/// a trailing `.0` (`150.0`, not `150`), matching `Rule.to_dict()`'s
/// `f"{self.min_value}..{self.max_value}"` f-string interpolation.
fn python_float_str(v: f64) -> String {
    if v.fract() == 0.0 && v.is_finite() {
        format!("{v:.1}")
    } else {
        v.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn num_rule_parses_range_and_concept() {
        let rule = Rule {
            varname: "OMOP=3036277".to_string(),
            type_: "NUM".to_string(),
            operator: "=".to_string(),
            value: serde_json::Value::String("150..200".to_string()),
            time: None,
            varcat: None,
            secondary_modifier: None,
            min_value: None,
            max_value: None,
            left_value_time: None,
            right_value_time: None,
            time_category: None,
            time_unit: None,
        }
        .normalize();

        assert_eq!(rule.min_value, Some(150.0));
        assert_eq!(rule.max_value, Some(200.0));
        assert_eq!(rule.concept_id(), Some(3036277));
    }

    #[test]
    fn non_num_rule_reads_concept_from_value() {
        let rule = Rule {
            varname: "OMOP".to_string(),
            type_: "".to_string(),
            operator: "=".to_string(),
            value: serde_json::Value::String("4329847".to_string()),
            time: None,
            varcat: None,
            secondary_modifier: None,
            min_value: None,
            max_value: None,
            left_value_time: None,
            right_value_time: None,
            time_category: None,
            time_unit: None,
        }
        .normalize();
        assert_eq!(rule.concept_id(), Some(4329847));
    }

    #[test]
    fn num_rule_round_trips_to_wire_value() {
        let rule = Rule {
            varname: "OMOP=3036277".to_string(),
            type_: "NUM".to_string(),
            operator: "=".to_string(),
            value: serde_json::Value::String("150..200".to_string()),
            time: None,
            varcat: None,
            secondary_modifier: None,
            min_value: None,
            max_value: None,
            left_value_time: None,
            right_value_time: None,
            time_category: None,
            time_unit: None,
        }
        .normalize();
        let wire = rule.to_wire_value();
        assert_eq!(wire["varname"], "OMOP=3036277");
        assert_eq!(wire["value"], "150.0..200.0");
    }

    #[test]
    fn num_rule_without_equals_blanks_value() {
        let rule = Rule {
            varname: "age".to_string(),
            type_: "NUM".to_string(),
            operator: "=".to_string(),
            value: serde_json::Value::String("18..65".to_string()),
            time: None,
            varcat: None,
            secondary_modifier: None,
            min_value: None,
            max_value: None,
            left_value_time: None,
            right_value_time: None,
            time_category: None,
            time_unit: None,
        }
        .normalize();
        assert_eq!(rule.value, serde_json::Value::String(String::new()));
    }
}

use super::rule::Rule;
use serde::{Deserialize, Serialize};

/// A collection of `Rule`s combined by `rules_operator` (`"AND"`/`"OR"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    #[serde(deserialize_with = "deserialize_rules")]
    pub rules: Vec<Rule>,
    #[serde(rename = "rules_oper")]
    pub rules_operator: String,
}

fn deserialize_rules<'de, D>(deserializer: D) -> Result<Vec<Rule>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Vec<Rule> = Vec::deserialize(deserializer)?;
    Ok(raw.into_iter().map(Rule::normalize).collect())
}

impl Group {
    /// `true` when rules in this group are combined conjunctively.
    pub fn is_conjunctive(&self) -> bool {
        self.rules_operator.eq_ignore_ascii_case("AND")
    }
}

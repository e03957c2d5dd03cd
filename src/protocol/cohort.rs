use super::group::Group;
use serde::{Deserialize, Serialize};

/// A collection of `Group`s combined by `groups_operator` (`"AND"`/`"OR"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cohort {
    pub groups: Vec<Group>,
    #[serde(rename = "groups_oper")]
    pub groups_operator: String,
}

impl Cohort {
    pub fn is_conjunctive(&self) -> bool {
        self.groups_operator.eq_ignore_ascii_case("AND")
    }
}

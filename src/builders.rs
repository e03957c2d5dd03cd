use crate::dialect::SqlDialect;
use crate::error::{BunnyError, BunnyResult};
use crate::protocol::Rule;
use chrono::{Months, Utc};

/// Per-table accumulator used while assembling a rule's SQL. Each of the
/// four OMOP event tables carries its own concept column and event-date
/// column, but otherwise takes the same constraints.
struct TableQuery {
    table: &'static str,
    concept_column: &'static str,
    date_column: &'static str,
    conditions: Vec<String>,
    join_person: bool,
}

impl TableQuery {
    fn new(table: &'static str, concept_column: &'static str, date_column: &'static str) -> Self {
        Self {
            table,
            concept_column,
            date_column,
            conditions: Vec::new(),
            join_person: false,
        }
    }

    fn select_sql(&self) -> String {
        let alias = self.table;
        let join = if self.join_person {
            format!(" JOIN person ON person.person_id = {alias}.person_id")
        } else {
            String::new()
        };
        if self.conditions.is_empty() {
            format!("SELECT {alias}.person_id FROM {alias}{join}")
        } else {
            format!(
                "SELECT {alias}.person_id FROM {alias}{join} WHERE {}",
                self.conditions.join(" AND ")
            )
        }
    }
}

/// Builds the UNION-across-tables SQL for a single rule, the way
/// `OMOPRuleQueryBuilder` composes SQLAlchemy selects: one accumulator per
/// event table, each independently constrained, finally unioned together.
pub struct RuleQueryBuilder<'d> {
    dialect: &'d dyn SqlDialect,
    condition: TableQuery,
    drug: TableQuery,
    measurement: TableQuery,
    observation: TableQuery,
}

impl<'d> RuleQueryBuilder<'d> {
    pub fn new(dialect: &'d dyn SqlDialect) -> Self {
        Self {
            dialect,
            condition: TableQuery::new(
                "condition_occurrence",
                "condition_concept_id",
                "condition_start_date",
            ),
            drug: TableQuery::new(
                "drug_exposure",
                "drug_concept_id",
                "drug_exposure_start_date",
            ),
            measurement: TableQuery::new(
                "measurement",
                "measurement_concept_id",
                "measurement_date",
            ),
            observation: TableQuery::new(
                "observation",
                "observation_concept_id",
                "observation_date",
            ),
        }
    }

    fn tables_mut(&mut self) -> [&mut TableQuery; 4] {
        [
            &mut self.condition,
            &mut self.drug,
            &mut self.measurement,
            &mut self.observation,
        ]
    }

    pub fn add_concept_constraint(&mut self, concept_id: i64) -> &mut Self {
        for table in self.tables_mut() {
            table.conditions.push(format!(
                "{}.{} = {concept_id}",
                table.table, table.concept_column
            ));
        }
        self
    }

    /// Exactly one of `left`/`right` (months, as the "before"/"after"
    /// bound) may be set; both missing is a no-op, both present is an
    /// error — ranges aren't supported, each bound is applied
    /// independently, matching the source.
    pub fn add_age_constraint(
        &mut self,
        left: Option<i64>,
        right: Option<i64>,
    ) -> BunnyResult<&mut Self> {
        let (comparator, age_value) = match (left, right) {
            (None, None) => return Ok(self),
            (None, Some(r)) => ("<", r),
            (Some(l), None) => (">", l),
            (Some(l), Some(r)) => {
                return Err(BunnyError::SchemaValidation(format!(
                    "age constraint with both boundaries not implemented: {l}|{r}"
                )));
            }
        };

        let dialect = self.dialect;
        for table in self.tables_mut() {
            let age_expr = dialect
                .year_difference(&format!("{}.{}", table.table, table.date_column), "person.year_of_birth");
            table.conditions.push(format!("{age_expr} {comparator} {age_value}"));
            table.join_person = true;
        }
        Ok(self)
    }

    /// Exactly one of `left`/`right` (months before today) must be set.
    pub fn add_temporal_constraint(
        &mut self,
        left: Option<i64>,
        right: Option<i64>,
    ) -> BunnyResult<&mut Self> {
        let (months, comparator) = match (left, right) {
            (None, None) => {
                return Err(BunnyError::SchemaValidation(
                    "temporal constraint requires exactly one time value".into(),
                ));
            }
            (Some(_), Some(_)) => {
                return Err(BunnyError::SchemaValidation(
                    "temporal constraint requires exactly one time value, both were provided"
                        .into(),
                ));
            }
            (Some(l), None) => (l, "<="),
            (None, Some(r)) => (r, ">="),
        };

        let relative_date = Utc::now()
            .date_naive()
            .checked_sub_months(Months::new(months as u32))
            .ok_or_else(|| BunnyError::SchemaValidation("invalid temporal offset".into()))?;

        for table in self.tables_mut() {
            table.conditions.push(format!(
                "{}.{} {comparator} '{relative_date}'",
                table.table, table.date_column
            ));
        }
        Ok(self)
    }

    pub fn add_numeric_range(
        &mut self,
        min_value: Option<f64>,
        max_value: Option<f64>,
    ) -> BunnyResult<&mut Self> {
        let (min_value, max_value) = match (min_value, max_value) {
            (None, None) => return Ok(self),
            (Some(min_value), Some(max_value)) => (min_value, max_value),
            _ => {
                return Err(BunnyError::SchemaValidation(
                    "both min_value and max_value must be provided for a numeric range".into(),
                ));
            }
        };
        if min_value > max_value {
            return Err(BunnyError::SchemaValidation(format!(
                "min_value must be <= max_value, got min_value={min_value}, max_value={max_value}"
            )));
        }
        self.measurement.conditions.push(format!(
            "measurement.value_as_number BETWEEN {min_value} AND {max_value}"
        ));
        self.observation.conditions.push(format!(
            "observation.value_as_number BETWEEN {min_value} AND {max_value}"
        ));
        Ok(self)
    }

    /// OR-combined filter on `condition_type_concept_id`. Only affects the
    /// condition_occurrence leg; the other tables have no such column.
    pub fn add_secondary_modifiers(&mut self, modifiers: &[i64]) -> &mut Self {
        let modifiers: Vec<i64> = modifiers.iter().copied().filter(|m| *m != 0).collect();
        if modifiers.is_empty() {
            return self;
        }
        let clause = modifiers
            .iter()
            .map(|m| format!("condition_occurrence.condition_type_concept_id = {m}"))
            .collect::<Vec<_>>()
            .join(" OR ");
        self.condition.conditions.push(format!("({clause})"));
        self
    }

    pub fn build(&self) -> String {
        [
            self.measurement.select_sql(),
            self.observation.select_sql(),
            self.condition.select_sql(),
            self.drug.select_sql(),
        ]
        .join(" UNION ")
    }
}

/// Builds boolean SQL fragments for person-level rules (age, gender, race,
/// ethnicity), mirroring `PersonConstraintBuilder`.
pub struct PersonConstraintBuilder<'d> {
    dialect: &'d dyn SqlDialect,
}

impl<'d> PersonConstraintBuilder<'d> {
    pub fn new(dialect: &'d dyn SqlDialect) -> Self {
        Self { dialect }
    }

    pub fn build_constraints(
        &self,
        rule: &Rule,
        concept_domain: Option<&str>,
    ) -> BunnyResult<Vec<String>> {
        if rule.varname == "AGE" {
            return Ok(self.build_age_constraints(rule));
        }

        match concept_domain {
            Some("Gender") => Ok(self.build_concept_constraint(rule, "gender_concept_id")),
            Some("Race") => Ok(self.build_concept_constraint(rule, "race_concept_id")),
            Some("Ethnicity") => Ok(self.build_concept_constraint(rule, "ethnicity_concept_id")),
            _ => Ok(Vec::new()),
        }
    }

    fn build_age_constraints(&self, rule: &Rule) -> Vec<String> {
        let (Some(min_value), Some(max_value)) = (rule.min_value, rule.max_value) else {
            return Vec::new();
        };
        let age = self
            .dialect
            .year_difference("CURRENT_TIMESTAMP", "person.year_of_birth");
        vec![
            format!("{age} >= {min_value}"),
            format!("{age} <= {max_value}"),
        ]
    }

    fn build_concept_constraint(&self, rule: &Rule, column: &str) -> Vec<String> {
        let value = rule.value.as_str().unwrap_or_default();
        let constraint = format!("person.{column} = {value}");
        if rule.operator == "=" {
            vec![constraint]
        } else {
            vec![format!("NOT ({constraint})")]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Postgres;

    #[test]
    fn concept_constraint_applies_to_all_four_tables() {
        let dialect = Postgres;
        let mut builder = RuleQueryBuilder::new(&dialect);
        builder.add_concept_constraint(3_036_277);
        let sql = builder.build();
        assert!(sql.contains("measurement.measurement_concept_id = 3036277"));
        assert!(sql.contains("observation.observation_concept_id = 3036277"));
        assert!(sql.contains("condition_occurrence.condition_concept_id = 3036277"));
        assert!(sql.contains("drug_exposure.drug_concept_id = 3036277"));
    }

    #[test]
    fn age_constraint_joins_person_and_uses_dialect() {
        let dialect = Postgres;
        let mut builder = RuleQueryBuilder::new(&dialect);
        builder.add_age_constraint(Some(18), None).unwrap();
        let sql = builder.build();
        assert!(sql.contains("JOIN person ON person.person_id"));
        assert!(sql.contains("date_part('year'"));
        assert!(sql.contains("> 18"));
    }

    #[test]
    fn age_constraint_rejects_both_bounds() {
        let dialect = Postgres;
        let mut builder = RuleQueryBuilder::new(&dialect);
        assert!(builder.add_age_constraint(Some(18), Some(65)).is_err());
    }

    #[test]
    fn numeric_range_rejects_inverted_bounds() {
        let dialect = Postgres;
        let mut builder = RuleQueryBuilder::new(&dialect);
        assert!(builder.add_numeric_range(Some(10.0), Some(5.0)).is_err());
    }

    #[test]
    fn secondary_modifiers_only_touch_condition_leg() {
        let dialect = Postgres;
        let mut builder = RuleQueryBuilder::new(&dialect);
        builder.add_secondary_modifiers(&[44786627]);
        let sql = builder.build();
        assert!(sql.contains("condition_occurrence.condition_type_concept_id = 44786627"));
    }

    #[test]
    fn gender_constraint_negates_on_not_equal() {
        let dialect = Postgres;
        let builder = PersonConstraintBuilder::new(&dialect);
        let rule = Rule {
            varname: "OMOP".into(),
            type_: "".into(),
            operator: "!=".into(),
            value: serde_json::Value::String("8507".into()),
            time: None,
            varcat: None,
            secondary_modifier: None,
            min_value: None,
            max_value: None,
            left_value_time: None,
            right_value_time: None,
            time_category: None,
            time_unit: None,
        };
        let constraints = builder.build_constraints(&rule, Some("Gender")).unwrap();
        assert_eq!(constraints, vec!["NOT (person.gender_concept_id = 8507)"]);
    }
}

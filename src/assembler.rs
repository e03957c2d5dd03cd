use crate::builders::{PersonConstraintBuilder, RuleQueryBuilder};
use crate::concept::ConceptDomainMap;
use crate::dialect::SqlDialect;
use crate::error::BunnyResult;
use crate::protocol::{Cohort, Group, Rule};

struct RuleExpression {
    sql: String,
    inclusion: bool,
}

fn build_rule_expression(
    dialect: &dyn SqlDialect,
    rule: &Rule,
) -> BunnyResult<RuleExpression> {
    let mut builder = RuleQueryBuilder::new(dialect);

    if let Some(concept_id) = rule.concept_id() {
        builder.add_concept_constraint(concept_id);
    }

    let (left_months, right_months) = rule.time_window_in_months();
    if rule.time_category.as_deref() == Some("AGE")
        && (rule.left_value_time.is_some() || rule.right_value_time.is_some())
    {
        builder.add_age_constraint(rule.left_value_time, rule.right_value_time)?;
    } else if rule.time_category.as_deref() == Some("TIME")
        && (left_months.is_some() || right_months.is_some())
    {
        builder.add_temporal_constraint(left_months, right_months)?;
    }

    if rule.min_value.is_some() && rule.max_value.is_some() {
        builder.add_numeric_range(rule.min_value, rule.max_value)?;
    }

    if let Some(modifiers) = &rule.secondary_modifier {
        let modifiers: Vec<i64> = modifiers.iter().filter_map(|m| m.parse().ok()).collect();
        builder.add_secondary_modifiers(&modifiers);
    }

    Ok(RuleExpression {
        sql: builder.build(),
        inclusion: rule.operator == "=",
    })
}

/// Builds the SQL producing the `person_id` set matched by one group,
/// following §4.4: Person predicates seed an inclusion query, non-Person
/// rules split into inclusion/exclusion, combined by the group's operator,
/// exclusions subtracted last.
pub fn build_group_sql(
    dialect: &dyn SqlDialect,
    group: &Group,
    concepts: &ConceptDomainMap,
) -> BunnyResult<String> {
    let person_builder = PersonConstraintBuilder::new(dialect);
    let mut person_constraints = Vec::new();
    let mut rule_expressions = Vec::new();

    for rule in &group.rules {
        if rule.varcat.as_deref() == Some("Person") {
            let domain = rule.concept_id().and_then(|id| concepts.get(&id.to_string()));
            let domain = domain.map(String::as_str).or_else(|| {
                rule.value
                    .as_str()
                    .and_then(|v| concepts.get(v))
                    .map(String::as_str)
            });
            person_constraints.extend(person_builder.build_constraints(rule, domain)?);
        } else {
            rule_expressions.push(build_rule_expression(dialect, rule)?);
        }
    }

    let mut inclusion_queries = Vec::new();
    if !person_constraints.is_empty() {
        inclusion_queries.push(format!(
            "SELECT person.person_id FROM person WHERE {}",
            person_constraints.join(" AND ")
        ));
    }

    let mut exclusion_queries = Vec::new();
    for expr in &rule_expressions {
        if expr.inclusion {
            inclusion_queries.push(expr.sql.clone());
        } else {
            exclusion_queries.push(expr.sql.clone());
        }
    }

    let mut group_query = if inclusion_queries.is_empty() {
        "SELECT person.person_id FROM person".to_string()
    } else if group.is_conjunctive() {
        inclusion_queries
            .into_iter()
            .reduce(|acc, q| format!("({acc}) INTERSECT ({q})"))
            .expect("non-empty")
    } else {
        inclusion_queries.join(" UNION ")
    };

    if !exclusion_queries.is_empty() {
        let exclusion_union = exclusion_queries.join(" UNION ");
        group_query = format!(
            "({group_query}) INTERSECT (SELECT person.person_id FROM person WHERE person.person_id NOT IN ({exclusion_union}))"
        );
    }

    Ok(group_query)
}

/// Builds the SQL combining every group in a cohort (§4.5), wrapping each
/// group as a named CTE so the planner can optimise each independently.
pub fn build_cohort_sql(
    dialect: &dyn SqlDialect,
    cohort: &Cohort,
    concepts: &ConceptDomainMap,
) -> BunnyResult<String> {
    let mut ctes = Vec::new();
    let mut selects = Vec::new();
    for (i, group) in cohort.groups.iter().enumerate() {
        let name = format!("final_group_{i}");
        let sql = build_group_sql(dialect, group, concepts)?;
        ctes.push(format!("{name} AS ({sql})"));
        selects.push(format!("SELECT person_id FROM {name}"));
    }

    let combined = if cohort.is_conjunctive() {
        selects
            .into_iter()
            .reduce(|acc, q| format!("({acc}) INTERSECT ({q})"))
            .unwrap_or_else(|| "SELECT person_id FROM person WHERE 1 = 0".to_string())
    } else {
        selects.join(" UNION ")
    };

    Ok(format!("WITH {} {combined}", ctes.join(", ")))
}

/// Wraps a cohort's combined `person_id` set with the final count,
/// rounding, and low-number-suppression `HAVING` clause (§4.6).
pub fn build_final_count_sql(cohort_sql: &str, rounding: i64, low_number: i64) -> String {
    let select = if rounding > 0 {
        format!("SELECT ROUND(CAST(COUNT(*) AS FLOAT) / {rounding}) * {rounding} AS n")
    } else {
        "SELECT COUNT(*) AS n".to_string()
    };
    let mut sql = format!("{select} FROM ({cohort_sql}) AS combined_cohort");
    if low_number > 0 {
        sql = format!("{sql} HAVING COUNT(*) >= {low_number}");
    }
    sql
}

use crate::db::DbClient;
use crate::disclosure::{apply_filters, ResultModifier};
use crate::error::BunnyResult;
use crate::protocol::DistributionQuery;
use crate::retry::with_retry;
use std::collections::HashMap;
use std::time::Duration;

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(60);

const GENDER_CONCEPT_IDS: &[i64] = &[8507, 8532];

pub const OUTPUT_COLUMNS: &[&str] = &[
    "BIOBANK",
    "CODE",
    "DESCRIPTION",
    "COUNT",
    "MIN",
    "Q1",
    "MEDIAN",
    "MEAN",
    "Q3",
    "MAX",
    "ALTERNATIVES",
    "DATASET",
    "OMOP",
    "OMOP_DESCR",
    "CATEGORY",
];

#[derive(Debug, Clone)]
struct DemographicsRow {
    code: &'static str,
    description: &'static str,
    count: i64,
    alternatives: String,
    biobank: String,
}

impl DemographicsRow {
    fn to_tsv_fields(&self) -> Vec<String> {
        OUTPUT_COLUMNS
            .iter()
            .map(|col| match *col {
                "BIOBANK" => self.biobank.clone(),
                "CODE" => self.code.to_string(),
                "DESCRIPTION" => self.description.to_string(),
                "COUNT" => self.count.to_string(),
                "ALTERNATIVES" => self.alternatives.clone(),
                "DATASET" => "person".to_string(),
                "CATEGORY" => "DEMOGRAPHICS".to_string(),
                _ => String::new(),
            })
            .collect()
    }
}

fn rows_to_tsv(rows: &[DemographicsRow]) -> String {
    let mut lines = vec![OUTPUT_COLUMNS.join("\t")];
    for row in rows {
        lines.push(row.to_tsv_fields().join("\t"));
    }
    lines.join("\n")
}

fn build_gender_sql(rounding: i64, low_number: i64) -> String {
    let count_expr = if rounding > 0 {
        format!("ROUND(CAST(COUNT(DISTINCT person.person_id) AS FLOAT) / {rounding}) * {rounding}")
    } else {
        "COUNT(DISTINCT person.person_id)".to_string()
    };
    let having = if low_number > 0 {
        format!(" HAVING COUNT(DISTINCT person.person_id) > {low_number}")
    } else {
        String::new()
    };
    format!(
        "SELECT {count_expr} AS count_agg, person.gender_concept_id AS gender_concept_id \
         FROM person GROUP BY person.gender_concept_id{having}"
    )
}

fn build_concept_name_sql(concept_ids: &[i64]) -> String {
    let ids = concept_ids
        .iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!("SELECT concept_id, concept_name FROM concept WHERE concept_id IN ({ids})")
}

/// Builds the `^Name|count^Name|count^` alternatives string, applying the
/// in-process disclosure pipeline to each gender's count independently
/// before formatting (§4.8).
fn build_alternatives_string(
    counts_by_gender: &HashMap<i64, i64>,
    concept_names: &HashMap<i64, String>,
    modifiers: &[ResultModifier],
) -> String {
    let mut alternatives = String::from("^");
    for concept_id in GENDER_CONCEPT_IDS {
        if let Some(count) = counts_by_gender.get(concept_id) {
            let count = apply_filters(*count, modifiers);
            let name = concept_names
                .get(concept_id)
                .cloned()
                .unwrap_or_else(|| "Unknown".to_string());
            alternatives.push_str(&format!("{name}|{count}^"));
        }
    }
    alternatives
}

/// Solves a demographics-distribution query: per-gender counts with SQL-level
/// rounding and suppression, then a total count computed by summing the
/// already-rounded per-gender counts and re-applying the disclosure pipeline
/// once more (§4.8) — the total is not re-derived from a fresh `COUNT(*)`.
pub async fn solve_demographics_distribution(
    db: &dyn DbClient,
    query: &DistributionQuery,
    modifiers: &[ResultModifier],
) -> BunnyResult<String> {
    let low_number = modifiers
        .iter()
        .find(|m| m.id == "Low Number Suppression")
        .and_then(|m| m.threshold)
        .unwrap_or(10);
    let rounding = modifiers
        .iter()
        .find(|m| m.id == "Rounding")
        .and_then(|m| m.nearest)
        .unwrap_or(10);

    let gender_sql = build_gender_sql(rounding, low_number);
    let gender_rows = with_retry(RETRY_ATTEMPTS, RETRY_DELAY, || async {
        db.execute_and_fetch(&gender_sql).await
    })
    .await?;

    let counts_by_gender: HashMap<i64, i64> = gender_rows
        .iter()
        .filter_map(|row| {
            let count = row.get("count_agg").and_then(|v| v.as_i64())?;
            let gender_id = row.get("gender_concept_id").and_then(|v| v.as_i64())?;
            Some((gender_id, count))
        })
        .collect();

    let concept_sql = build_concept_name_sql(GENDER_CONCEPT_IDS);
    let concept_rows = db.execute_and_fetch(&concept_sql).await?;
    let concept_names: HashMap<i64, String> = concept_rows
        .iter()
        .filter_map(|row| {
            let id = row.get("concept_id").and_then(|v| v.as_i64())?;
            let name = row.get("concept_name").and_then(|v| v.as_str())?.to_string();
            Some((id, name))
        })
        .collect();

    let total_count = apply_filters(counts_by_gender.values().sum(), modifiers);
    let alternatives = build_alternatives_string(&counts_by_gender, &concept_names, modifiers);

    let rows = vec![
        DemographicsRow {
            code: "SEX",
            description: "Sex",
            count: total_count,
            alternatives,
            biobank: query.collection.clone(),
        },
        DemographicsRow {
            code: "GENOMICS",
            description: "Genomics",
            count: total_count,
            alternatives: format!("^No|{total_count}^"),
            biobank: query.collection.clone(),
        },
    ];

    Ok(rows_to_tsv(&rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Row;
    use async_trait::async_trait;

    struct FakeClient;

    #[async_trait]
    impl DbClient for FakeClient {
        fn engine(&self) -> &str {
            "postgresql"
        }

        async fn list_tables(&self) -> BunnyResult<Vec<String>> {
            Ok(Vec::new())
        }

        async fn execute_and_fetch(&self, statement: &str) -> BunnyResult<Vec<Row>> {
            if statement.contains("FROM concept") {
                return Ok(vec![
                    Row {
                        columns: vec![
                            ("concept_id".into(), serde_json::json!(8507)),
                            ("concept_name".into(), serde_json::json!("MALE")),
                        ],
                    },
                    Row {
                        columns: vec![
                            ("concept_id".into(), serde_json::json!(8532)),
                            ("concept_name".into(), serde_json::json!("FEMALE")),
                        ],
                    },
                ]);
            }
            Ok(vec![
                Row {
                    columns: vec![
                        ("count_agg".into(), serde_json::json!(40)),
                        ("gender_concept_id".into(), serde_json::json!(8507)),
                    ],
                },
                Row {
                    columns: vec![
                        ("count_agg".into(), serde_json::json!(60)),
                        ("gender_concept_id".into(), serde_json::json!(8532)),
                    ],
                },
            ])
        }

        async fn execute(&self, _statement: &str) -> BunnyResult<()> {
            Ok(())
        }
    }

    fn query() -> DistributionQuery {
        serde_json::from_value(serde_json::json!({
            "owner": "o",
            "code": "DEMOGRAPHICS",
            "analysis": "DEMOGRAPHICS",
            "uuid": "u1",
            "collection": "biobank-a",
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn no_modifiers_reports_raw_sum_and_alternatives() {
        let client = FakeClient;
        let tsv = solve_demographics_distribution(&client, &query(), &[])
            .await
            .unwrap();
        let sex_line = tsv.lines().find(|l| l.starts_with("biobank-a\tSEX")).unwrap();
        assert!(sex_line.contains("\t100\t"));
        assert!(sex_line.contains("^MALE|40^FEMALE|60^"));
    }

    #[tokio::test]
    async fn rounding_nearest_hundred_zeroes_the_total() {
        let client = FakeClient;
        let modifiers = vec![ResultModifier {
            id: "Rounding".into(),
            threshold: None,
            nearest: Some(100),
        }];
        let tsv = solve_demographics_distribution(&client, &query(), &modifiers)
            .await
            .unwrap();
        let sex_line = tsv.lines().find(|l| l.starts_with("biobank-a\tSEX")).unwrap();
        assert!(sex_line.contains("\t100\t"));
        assert!(sex_line.contains("^MALE|0^FEMALE|100^"));
    }
}

use crate::db::DbClient;
use crate::disclosure::{apply_filters, ResultModifier};
use crate::error::BunnyResult;
use crate::protocol::DistributionQuery;
use crate::retry::with_retry;
use std::time::Duration;

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(60);

pub const OUTPUT_COLUMNS: &[&str] = &[
    "BIOBANK",
    "CODE",
    "COUNT",
    "DESCRIPTION",
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

struct Domain {
    name: &'static str,
    table: &'static str,
    concept_column: &'static str,
}

const DOMAINS: &[Domain] = &[
    Domain { name: "Condition", table: "condition_occurrence", concept_column: "condition_concept_id" },
    Domain { name: "Ethnicity", table: "person", concept_column: "ethnicity_concept_id" },
    Domain { name: "Drug", table: "drug_exposure", concept_column: "drug_concept_id" },
    Domain { name: "Gender", table: "person", concept_column: "gender_concept_id" },
    Domain { name: "Race", table: "person", concept_column: "race_concept_id" },
    Domain { name: "Measurement", table: "measurement", concept_column: "measurement_concept_id" },
    Domain { name: "Observation", table: "observation", concept_column: "observation_concept_id" },
    Domain { name: "Procedure", table: "procedure_occurrence", concept_column: "procedure_concept_id" },
];

#[derive(Debug, Clone)]
pub struct CodeDistributionRow {
    pub biobank: String,
    pub code: String,
    pub count: i64,
    pub omop: String,
    pub omop_descr: String,
    pub category: String,
}

impl CodeDistributionRow {
    fn to_tsv_fields(&self) -> Vec<String> {
        OUTPUT_COLUMNS
            .iter()
            .map(|col| match *col {
                "BIOBANK" => self.biobank.clone(),
                "CODE" => self.code.clone(),
                "COUNT" => self.count.to_string(),
                "OMOP" => self.omop.clone(),
                "OMOP_DESCR" => self.omop_descr.clone(),
                "CATEGORY" => self.category.clone(),
                _ => String::new(),
            })
            .collect()
    }
}

pub fn rows_to_tsv(rows: &[CodeDistributionRow]) -> String {
    let mut lines = vec![OUTPUT_COLUMNS.join("\t")];
    for row in rows {
        lines.push(row.to_tsv_fields().join("\t"));
    }
    lines.join("\n")
}

fn build_domain_sql(domain: &Domain, rounding: i64, low_number: i64) -> String {
    let rounded_count = if rounding > 0 {
        format!("ROUND(CAST(sub.count_agg AS FLOAT) / {rounding}) * {rounding}")
    } else {
        "sub.count_agg".to_string()
    };
    let having = if low_number > 0 {
        format!(" WHERE sub.count_agg > {low_number}")
    } else {
        String::new()
    };
    format!(
        "SELECT {rounded_count} AS count_agg_rounded, concept.concept_id, concept.concept_name \
         FROM (SELECT {concept_col} AS concept_id, COUNT(DISTINCT person_id) AS count_agg \
         FROM {table} GROUP BY {concept_col}) AS sub \
         JOIN concept ON sub.concept_id = concept.concept_id{having}",
        rounded_count = rounded_count,
        concept_col = domain.concept_column,
        table = domain.table,
        having = having,
    )
}

/// Solves a generic code-distribution query: one count-per-concept scan per
/// domain, SQL-level rounding and suppression, then the in-process
/// disclosure pipeline applied to every row's count (§4.7).
pub async fn solve_code_distribution(
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

    let mut rows = Vec::new();
    for domain in DOMAINS {
        let sql = build_domain_sql(domain, rounding, low_number);
        let fetched = with_retry(RETRY_ATTEMPTS, RETRY_DELAY, || async {
            db.execute_and_fetch(&sql).await
        })
        .await?;

        for row in fetched {
            let count = row
                .get("count_agg_rounded")
                .and_then(|v| v.as_i64())
                .unwrap_or(0);
            let concept_id = row.get("concept_id").and_then(|v| v.as_i64()).unwrap_or(0);
            let concept_name = row
                .get("concept_name")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();

            rows.push(CodeDistributionRow {
                biobank: query.collection.clone(),
                code: format!("OMOP:{concept_id}"),
                count: apply_filters(count, modifiers),
                omop: concept_id.to_string(),
                omop_descr: concept_name,
                category: domain.name.to_string(),
            });
        }
    }

    Ok(rows_to_tsv(&rows))
}

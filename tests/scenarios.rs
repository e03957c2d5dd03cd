//! End-to-end scenario fixtures, one test per documented scenario.

use async_trait::async_trait;
use bunny_worker::db::{DbClient, Row};
use bunny_worker::dialect::Postgres;
use bunny_worker::disclosure::ResultModifier;
use bunny_worker::error::BunnyResult;
use bunny_worker::protocol::{AvailabilityQuery, DistributionQuery, DistributionQueryType};
use bunny_worker::solvers::{availability, distribution};

struct FixedCountClient {
    count: i64,
}

#[async_trait]
impl DbClient for FixedCountClient {
    fn engine(&self) -> &str {
        "postgresql"
    }

    async fn list_tables(&self) -> BunnyResult<Vec<String>> {
        Ok(Vec::new())
    }

    async fn execute_and_fetch(&self, _statement: &str) -> BunnyResult<Vec<Row>> {
        Ok(vec![Row {
            columns: vec![("n".into(), serde_json::json!(self.count))],
        }])
    }

    async fn execute(&self, _statement: &str) -> BunnyResult<()> {
        Ok(())
    }
}

fn gender_or_query() -> AvailabilityQuery {
    serde_json::from_value(serde_json::json!({
        "cohort": {
            "groups": [{
                "rules": [
                    {"varname": "OMOP", "type": "", "oper": "=", "value": "8507"},
                    {"varname": "OMOP", "type": "", "oper": "=", "value": "8532"}
                ],
                "rules_oper": "OR"
            }],
            "groups_oper": "AND"
        },
        "uuid": "u1",
        "owner": "o",
        "collection": "c",
        "protocol_version": "v2",
        "char_salt": "s"
    }))
    .unwrap()
}

fn rounding_modifier(nearest: i64) -> ResultModifier {
    ResultModifier {
        id: "Rounding".to_string(),
        threshold: None,
        nearest: Some(nearest),
    }
}

/// S1: gender-OR availability query, count rounds to 100 at nearest=10 and
/// stays 99 with no modifiers applied.
#[tokio::test]
async fn s1_gender_or_query_rounds_to_nearest_ten() {
    let db = FixedCountClient { count: 99 };
    let dialect = Postgres;
    let query = gender_or_query();

    let rounded = availability::solve_availability(&db, &dialect, &query, &[rounding_modifier(10)])
        .await
        .unwrap();
    assert_eq!(rounded, 100);

    let unrounded = availability::solve_availability(&db, &dialect, &query, &[])
        .await
        .unwrap();
    assert_eq!(unrounded, 99);
}

/// S2: availability query with no modifiers returns the raw count.
#[tokio::test]
async fn s2_availability_no_modifiers_returns_raw_count() {
    let db = FixedCountClient { count: 40 };
    let dialect = Postgres;
    let count = availability::solve_availability(&db, &dialect, &gender_or_query(), &[])
        .await
        .unwrap();
    assert_eq!(count, 40);
}

/// S6: aggressive rounding (nearest=100) zeroes a count of 44.
#[tokio::test]
async fn s6_aggressive_rounding_zeroes_true_count() {
    let db = FixedCountClient { count: 44 };
    let dialect = Postgres;
    let count =
        availability::solve_availability(&db, &dialect, &gender_or_query(), &[rounding_modifier(100)])
            .await
            .unwrap();
    assert_eq!(count, 0);
}

struct DomainAwareClient;

#[async_trait]
impl DbClient for DomainAwareClient {
    fn engine(&self) -> &str {
        "postgresql"
    }

    async fn list_tables(&self) -> BunnyResult<Vec<String>> {
        Ok(Vec::new())
    }

    async fn execute_and_fetch(&self, statement: &str) -> BunnyResult<Vec<Row>> {
        let rows = if statement.contains("gender_concept_id") {
            vec![
                row(8507, 44, "MALE"),
                row(8532, 55, "FEMALE"),
            ]
        } else if statement.contains("ethnicity_concept_id") {
            vec![
                row(38003564, 41, "Not Hispanic or Latino"),
                row(38003563, 58, "Hispanic or Latino"),
            ]
        } else {
            Vec::new()
        };
        Ok(rows)
    }

    async fn execute(&self, _statement: &str) -> BunnyResult<()> {
        Ok(())
    }
}

fn row(concept_id: i64, count: i64, name: &str) -> Row {
    Row {
        columns: vec![
            ("count_agg_rounded".into(), serde_json::json!(count)),
            ("concept_id".into(), serde_json::json!(concept_id)),
            ("concept_name".into(), serde_json::json!(name)),
        ],
    }
}

fn distribution_query(code: DistributionQueryType) -> DistributionQuery {
    DistributionQuery {
        owner: "o".to_string(),
        code,
        analysis: "code.distribution".to_string(),
        uuid: "u1".to_string(),
        collection: "biobank-a".to_string(),
    }
}

/// S5: code distribution with rounding disabled reports the raw per-concept
/// counts for gender and ethnicity domains unchanged.
#[tokio::test]
async fn s5_code_distribution_with_rounding_disabled() {
    let db = DomainAwareClient;
    let modifiers = vec![rounding_modifier(0)];
    let tsv =
        distribution::solve_code_distribution(&db, &distribution_query(DistributionQueryType::Generic), &modifiers)
            .await
            .unwrap();

    assert!(tsv.contains("8507\tMALE\tGender") && tsv.lines().any(|l| l.starts_with("biobank-a\tOMOP:8507\t44")));
    assert!(tsv.lines().any(|l| l.starts_with("biobank-a\tOMOP:8532\t55")));
    assert!(tsv.lines().any(|l| l.starts_with("biobank-a\tOMOP:38003564\t41")));
    assert!(tsv.lines().any(|l| l.starts_with("biobank-a\tOMOP:38003563\t58")));
}

/// S7: ICD-MAIN distribution is rejected by the dispatcher before any
/// solver runs, and never reaches a TSV-producing code path.
#[tokio::test]
async fn s7_icd_main_distribution_is_unsupported() {
    use bunny_worker::dispatch::execute_query;

    let db = FixedCountClient { count: 0 };
    let dialect = Postgres;
    let payload = serde_json::json!({
        "owner": "o",
        "code": "ICD-MAIN",
        "analysis": "ICD-MAIN",
        "uuid": "u1",
        "collection": "c1",
    });

    let result = execute_query(&db, &dialect, &payload, &[]).await;
    assert_eq!(result.status, "error");
    assert!(result.files.is_empty());
    assert!(result.message.to_lowercase().contains("unsupported"));
}

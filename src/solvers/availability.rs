use crate::assembler::{build_cohort_sql, build_final_count_sql};
use crate::concept::map_concepts_to_domains;
use crate::db::DbClient;
use crate::dialect::SqlDialect;
use crate::disclosure::{apply_filters, ResultModifier};
use crate::error::BunnyResult;
use crate::protocol::AvailabilityQuery;
use crate::retry::with_retry;
use std::time::Duration;

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(60);

fn extract_i64(modifiers: &[ResultModifier], id: &str, field: impl Fn(&ResultModifier) -> Option<i64>, default: i64) -> i64 {
    modifiers
        .iter()
        .find(|m| m.id == id)
        .and_then(field)
        .unwrap_or(default)
}

/// Solves an availability query: cohort assembly, count, rounding, and
/// low-number suppression at the SQL level, with the in-process disclosure
/// pipeline re-applied as defence in depth (§4.6, §4.9).
pub async fn solve_availability(
    db: &dyn DbClient,
    dialect: &dyn SqlDialect,
    query: &AvailabilityQuery,
    modifiers: &[ResultModifier],
) -> BunnyResult<i64> {
    let concepts = map_concepts_to_domains(db, &query.cohort.groups).await?;

    let low_number = extract_i64(modifiers, "Low Number Suppression", |m| m.threshold, 10);
    let rounding = extract_i64(modifiers, "Rounding", |m| m.nearest, 10);

    let cohort_sql = build_cohort_sql(dialect, &query.cohort, &concepts)?;
    let final_sql = build_final_count_sql(&cohort_sql, rounding, low_number);

    let count = with_retry(RETRY_ATTEMPTS, RETRY_DELAY, || async {
        let rows = db.execute_and_fetch(&final_sql).await?;
        let count = rows
            .first()
            .and_then(|row| row.get("n"))
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        Ok(count)
    })
    .await?;

    Ok(apply_filters(count, modifiers))
}

use crate::db::DbClient;
use crate::dialect::SqlDialect;
use crate::disclosure::ResultModifier;
use crate::error::BunnyError;
use crate::protocol::{DistributionQueryType, File, RquestResult};
use crate::solvers::{availability, demographics, distribution};

/// Dispatches a raw query payload to the matching solver and assembles the
/// `RquestResult` the coordinator expects. Mirrors `execute_query`: the
/// presence of an `"analysis"` key routes to distribution, its absence to
/// availability; ICD-MAIN is rejected before any solver runs so a result
/// is never returned for an unsupported analysis.
pub async fn execute_query(
    db: &dyn DbClient,
    dialect: &dyn SqlDialect,
    query_payload: &serde_json::Value,
    modifiers: &[ResultModifier],
) -> RquestResult {
    execute_query_with_encoding(db, dialect, query_payload, modifiers, true).await
}

/// Same as `execute_query`, but lets the caller skip base64-encoding file
/// payloads — the CLI's `--no-encode` escape hatch. The daemon path always
/// encodes, since the coordinator expects base64 over the wire.
pub async fn execute_query_with_encoding(
    db: &dyn DbClient,
    dialect: &dyn SqlDialect,
    query_payload: &serde_json::Value,
    modifiers: &[ResultModifier],
    encode: bool,
) -> RquestResult {
    tracing::info!("processing query...");
    tracing::debug!(?query_payload);

    if query_payload.get("analysis").is_some() {
        solve_distribution(db, query_payload, modifiers, encode).await
    } else {
        solve_availability(db, dialect, query_payload, modifiers).await
    }
}

async fn solve_availability(
    db: &dyn DbClient,
    dialect: &dyn SqlDialect,
    query_payload: &serde_json::Value,
    modifiers: &[ResultModifier],
) -> RquestResult {
    let query: crate::protocol::AvailabilityQuery = match serde_json::from_value(query_payload.clone()) {
        Ok(q) => q,
        Err(e) => {
            tracing::error!(error = %e, "invalid availability query payload");
            return RquestResult::error("unknown", "unknown", e.to_string());
        }
    };

    match availability::solve_availability(db, dialect, &query, modifiers).await {
        Ok(count) => {
            tracing::info!("solved availability query");
            let mut result = RquestResult::ok(query.uuid, query.collection);
            result.count = count;
            result
        }
        Err(e) => {
            tracing::error!(error = %e, "availability query failed");
            RquestResult::error(query.uuid, query.collection, e.to_string())
        }
    }
}

async fn solve_distribution(
    db: &dyn DbClient,
    query_payload: &serde_json::Value,
    modifiers: &[ResultModifier],
    encode: bool,
) -> RquestResult {
    let query: crate::protocol::DistributionQuery = match serde_json::from_value(query_payload.clone()) {
        Ok(q) => q,
        Err(e) => {
            tracing::error!(error = %e, "invalid distribution query payload");
            return RquestResult::error("unknown", "unknown", e.to_string());
        }
    };

    if query.code == DistributionQueryType::IcdMain {
        let err = BunnyError::UnsupportedOperation(
            "ICD-MAIN queries are not yet supported".to_string(),
        );
        tracing::error!(error = %err, "rejecting unsupported analysis before solving");
        return RquestResult::error(query.uuid, query.collection, err.to_string());
    }

    let solved = match query.code {
        DistributionQueryType::Generic => {
            distribution::solve_code_distribution(db, &query, modifiers).await
        }
        DistributionQueryType::Demographics => {
            demographics::solve_demographics_distribution(db, &query, modifiers).await
        }
        DistributionQueryType::IcdMain => unreachable!("rejected above"),
    };

    match solved {
        Ok(tsv) => {
            let mut file = if encode {
                File::from_tsv(query.code.file_name().unwrap_or(""), &tsv)
            } else {
                File::from_tsv_unencoded(query.code.file_name().unwrap_or(""), &tsv)
            };
            file.description = "Result of code.distribution analysis".to_string();
            file.sensitive = true;
            let mut result = RquestResult::ok(query.uuid, query.collection);
            result.count = tsv.lines().count().saturating_sub(1) as i64;
            result.datasets_count = 1;
            result.files = vec![file];
            result
        }
        Err(e) => {
            tracing::error!(error = %e, "distribution query failed");
            RquestResult::error(query.uuid, query.collection, e.to_string())
        }
    }
}

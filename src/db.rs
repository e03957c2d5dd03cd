use crate::error::{BunnyError, BunnyResult};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// The OMOP tables every solver depends on. Checked once at startup so a
/// misconfigured warehouse fails loudly before any query runs.
pub const REQUIRED_TABLES: &[&str] = &[
    "concept",
    "person",
    "measurement",
    "condition_occurrence",
    "observation",
    "drug_exposure",
];

/// Indexes the solvers lean on for acceptable performance. Missing ones are
/// logged as a warning, not a hard failure — queries still work, just slower.
pub const RECOMMENDED_INDEXES: &[(&str, &str)] = &[
    ("condition_occurrence", "condition_concept_id"),
    ("drug_exposure", "drug_concept_id"),
    ("measurement", "measurement_concept_id"),
    ("observation", "observation_concept_id"),
    ("person", "gender_concept_id"),
];

/// A fetched row, addressable by column name. Concrete drivers are out of
/// scope; this is the narrow surface solvers actually read from.
#[derive(Debug, Clone, Default)]
pub struct Row {
    pub columns: Vec<(String, serde_json::Value)>,
}

impl Row {
    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.columns.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }
}

/// Abstract capability surface a concrete database driver must provide.
/// Mirrors the source's `BaseDBClient`: an engine/dialect tag, a table
/// inspector, and statement execution with or without a fetch.
#[async_trait]
pub trait DbClient: Send + Sync {
    fn engine(&self) -> &str;

    async fn list_tables(&self) -> BunnyResult<Vec<String>>;

    async fn execute_and_fetch(&self, statement: &str) -> BunnyResult<Vec<Row>>;

    async fn execute(&self, statement: &str) -> BunnyResult<()>;
}

/// Confirms every table the solvers require is present, raising a
/// `SchemaValidation` error naming every table missing at once rather than
/// failing on the first.
pub async fn check_required_tables(client: &dyn DbClient) -> BunnyResult<()> {
    let tables = client.list_tables().await?;
    let missing: Vec<&str> = REQUIRED_TABLES
        .iter()
        .filter(|t| !tables.iter().any(|existing| existing == *t))
        .copied()
        .collect();
    if !missing.is_empty() {
        return Err(BunnyError::SchemaValidation(format!(
            "missing required OMOP tables: {}",
            missing.join(", ")
        )));
    }
    Ok(())
}

/// Tracks connection checkouts so tests can assert the pool returns to its
/// resting state around every solve. Concrete pooling is a driver concern;
/// this counter is the seam the spec's invariant actually needs.
#[derive(Clone, Default)]
pub struct ConnectionTracker {
    checked_out: Arc<AtomicUsize>,
}

impl ConnectionTracker {
    pub fn checked_out(&self) -> usize {
        self.checked_out.load(Ordering::SeqCst)
    }

    pub fn checkout(&self) -> ConnectionGuard {
        self.checked_out.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            checked_out: self.checked_out.clone(),
        }
    }
}

/// RAII guard releasing its checkout on drop, even on early return or panic
/// unwind — the Rust idiom for the source's `engine.dispose()`-after-use
/// discipline.
pub struct ConnectionGuard {
    checked_out: Arc<AtomicUsize>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.checked_out.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Placeholder `DbClient` returned when no concrete driver has been wired
/// in. Every method fails with a `Configuration` error naming the missing
/// adapter rather than panicking, so a misconfigured deployment gets a
/// clear message instead of a crash on first query.
pub struct UnconfiguredDbClient;

#[async_trait]
impl DbClient for UnconfiguredDbClient {
    fn engine(&self) -> &str {
        "unconfigured"
    }

    async fn list_tables(&self) -> BunnyResult<Vec<String>> {
        Err(unconfigured_error())
    }

    async fn execute_and_fetch(&self, _statement: &str) -> BunnyResult<Vec<Row>> {
        Err(unconfigured_error())
    }

    async fn execute(&self, _statement: &str) -> BunnyResult<()> {
        Err(unconfigured_error())
    }
}

fn unconfigured_error() -> BunnyError {
    BunnyError::Configuration(
        "no database driver configured; construct a concrete DbClient for your \
         warehouse (postgresql/mssql/duckdb) and wire it in place of UnconfiguredDbClient"
            .to_string(),
    )
}

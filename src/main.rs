use bunny_worker::cli::Cli;
use bunny_worker::config::Settings;
use bunny_worker::db::UnconfiguredDbClient;
use bunny_worker::dialect;
use bunny_worker::dispatch::execute_query_with_encoding;
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// One-shot entry point: solves a single RQuest query against an OMOP
/// database and writes the coordinator's wire-format result to disk. Mirrors
/// `__main__.py`'s flow (parse args, load settings, solve, write output) in
/// the teacher's async/`anyhow`-at-the-edges style.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli.validate_output_path()?;
    let query = cli.load_query()?;
    let modifiers = cli.parse_modifiers()?;

    let settings = Settings::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(settings.logging.tracing_filter())),
        )
        .init();

    tracing::info!(database = %settings.database.redacted(), "settings loaded");

    let sql_dialect = dialect::for_engine(&settings.database.drivername)?;

    // Concrete database drivers are a pluggable credential/driver adapter
    // behind `DbClient`, not part of this crate — plug a real one in here.
    let db = UnconfiguredDbClient;

    let result = execute_query_with_encoding(
        &db,
        sql_dialect.as_ref(),
        &query,
        &modifiers,
        !cli.no_encode,
    )
    .await;

    let wire = result.to_wire();
    std::fs::write(&cli.output, serde_json::to_string_pretty(&wire)?)?;
    tracing::info!(output = %cli.output, status = %result.status, "wrote result");

    Ok(())
}

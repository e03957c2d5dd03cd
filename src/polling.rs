use std::time::Duration;

use crate::config::PollingSettings;
use crate::task_api::TaskApiClient;

/// Polls the task API for work and dispatches each job to `task_handler`.
/// Mirrors the source's status-code dispatch and exponential backoff:
/// backoff doubles (capped at `max_backoff`) on network failure and resets
/// to `initial_backoff` after a task is successfully received; the polling
/// interval is slept after every iteration regardless of outcome.
pub async fn poll_for_tasks<F, Fut>(
    client: &TaskApiClient,
    settings: &PollingSettings,
    polling_endpoint: &str,
    max_iterations: Option<u64>,
    mut task_handler: F,
) where
    F: FnMut(serde_json::Value) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let mut backoff = Duration::from_secs(settings.initial_backoff);
    let max_backoff = Duration::from_secs(settings.max_backoff);
    let polling_interval = Duration::from_secs(settings.polling_interval);
    let mut iteration = 0u64;

    tracing::info!("polling for tasks...");
    loop {
        if let Some(max) = max_iterations {
            if iteration >= max {
                break;
            }
        }

        match client.next_job(polling_endpoint).await {
            Ok(response) => match response.status().as_u16() {
                200 => {
                    tracing::info!("task received, resolving...");
                    match response.json::<serde_json::Value>().await {
                        Ok(task_data) => {
                            task_handler(task_data).await;
                            backoff = Duration::from_secs(settings.initial_backoff);
                        }
                        Err(e) => tracing::error!(error = %e, "failed to parse task body"),
                    }
                }
                204 => tracing::debug!("no task found, looking for job..."),
                401 => tracing::info!("failed to authenticate with task server"),
                other => tracing::info!(status = other, "got unexpected http status code"),
            },
            Err(e) => {
                tracing::error!(error = %e, "network error occurred");
                tokio::time::sleep(backoff).await;
                backoff = std::cmp::min(backoff * 2, max_backoff);
            }
        }

        tokio::time::sleep(polling_interval).await;
        iteration += 1;
    }
}

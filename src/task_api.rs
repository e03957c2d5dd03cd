use std::time::Duration;

use crate::config::TaskApiSettings;
use crate::protocol::RquestResult;

const SEND_RESULT_ATTEMPTS: u32 = 4;
const SEND_RESULT_DELAY: Duration = Duration::from_secs(5);

/// HTTP client for the coordinator's task API: fetching the next job and
/// posting results back, both under HTTP Basic Auth.
pub struct TaskApiClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl TaskApiClient {
    pub fn new(settings: &TaskApiSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: settings.base_url.clone(),
            username: settings.username.clone(),
            password: settings.password.clone(),
        }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{endpoint}", self.base_url.trim_end_matches('/'))
    }

    /// GETs `task/nextjob/<collection>[.<type>]`. Returns the raw response
    /// so the polling loop can dispatch on status code without this client
    /// interpreting 204/401 as errors.
    pub async fn next_job(&self, polling_endpoint: &str) -> reqwest::Result<reqwest::Response> {
        tracing::debug!(endpoint = polling_endpoint, "polling for next job");
        self.http
            .get(self.url(polling_endpoint))
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
    }

    /// POSTs a result to `task/result/<uuid>/<collection>`, retrying up to
    /// four times on network errors or 5xx responses with a fixed 5-second
    /// delay. 2xx and 4xx responses are treated as terminal — the
    /// coordinator has made its decision, retrying it wouldn't help.
    pub async fn send_result(&self, result: &RquestResult) {
        let endpoint = format!("task/result/{}/{}", result.uuid, result.collection_id);
        let url = self.url(&endpoint);
        let body = result.to_wire();

        for attempt in 1..=SEND_RESULT_ATTEMPTS {
            let response = self
                .http
                .post(&url)
                .basic_auth(&self.username, Some(&self.password))
                .json(&body)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if (200..300).contains(&status) || (400..500).contains(&status) {
                        tracing::info!(status, "task resolved");
                        return;
                    }
                    tracing::warn!(status, attempt, "failed to post result, retrying");
                }
                Err(e) => {
                    tracing::error!(error = %e, attempt, "network error occurred while posting results");
                }
            }

            if attempt < SEND_RESULT_ATTEMPTS {
                tokio::time::sleep(SEND_RESULT_DELAY).await;
            }
        }
    }
}

/// Builds `task/nextjob/<collection>[.<type>]`, matching the upstream's
/// `_construct_polling_endpoint`.
pub fn polling_endpoint(collection_id: &str, task_type: Option<&str>) -> String {
    match task_type {
        Some(t) => format!("task/nextjob/{collection_id}.{t}"),
        None => format!("task/nextjob/{collection_id}"),
    }
}

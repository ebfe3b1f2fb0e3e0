use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, RequestBuilder, Url};
use tokio::time::{Instant, sleep};

use crate::auth::user_agent;
use crate::types::SnowflakeResponse;
use crate::{Error, Result};

pub(super) const SESSION_EXPIRED: &str = "390112";
pub(super) const QUERY_IN_PROGRESS_ASYNC_CODE: &str = "333334";

const ASYNC_POLL_INTERVAL: Duration = Duration::from_secs(10);

pub(crate) fn authorized(request: RequestBuilder, session_token: &str) -> RequestBuilder {
    request
        .header(ACCEPT, "application/snowflake")
        .header(USER_AGENT, user_agent())
        .header(
            AUTHORIZATION,
            format!(r#"Snowflake Token="{session_token}""#),
        )
}

/// Sends a statement and returns the response envelope once the statement
/// has finished, polling while Snowflake reports it as still running.
pub(crate) async fn execute(
    http: &Client,
    base_url: &Url,
    request: QueryRequest,
    session_token: &str,
    timeout: Duration,
) -> Result<SnowflakeResponse> {
    let request_id = uuid::Uuid::new_v4().to_string();
    let url = base_url.join("queries/v1/query-request")?;

    tracing::debug!(%request_id, sql = %request.sql_text, "executing statement");
    let response = authorized(http.post(url), session_token)
        .query(&[("requestId", request_id.as_str())])
        .json(&request)
        .send()
        .await?;

    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(Error::Communication(body));
    }

    let mut response: SnowflakeResponse =
        serde_json::from_str(&body).map_err(|e| Error::Json(e, body))?;

    if response.code.as_deref() == Some(QUERY_IN_PROGRESS_ASYNC_CODE) {
        match response.data.get("getResultUrl").and_then(|v| v.as_str()) {
            Some(result_url) => {
                let result_url = result_url.to_string();
                response =
                    poll_for_async_results(http, base_url, &result_url, session_token, timeout)
                        .await?
            }
            None => {
                return Err(Error::NoPollingUrlAsyncQuery);
            }
        }
    }

    if let Some(SESSION_EXPIRED) = response.code.as_deref() {
        return Err(Error::SessionExpired);
    }

    if !response.success {
        return Err(Error::Communication(response.message.unwrap_or_default()));
    }

    Ok(response)
}

async fn poll_for_async_results(
    http: &Client,
    base_url: &Url,
    result_url: &str,
    session_token: &str,
    timeout: Duration,
) -> Result<SnowflakeResponse> {
    let start = Instant::now();
    let url = base_url.join(result_url)?;
    while start.elapsed() < timeout {
        sleep(ASYNC_POLL_INTERVAL).await;
        tracing::debug!(%url, "polling for statement result");

        let resp = authorized(http.get(url.clone()), session_token)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(Error::Communication(body));
        }

        let response: SnowflakeResponse =
            serde_json::from_str(&body).map_err(|e| Error::Json(e, body))?;
        if response.code.as_deref() != Some(QUERY_IN_PROGRESS_ASYNC_CODE) {
            return Ok(response);
        }
    }

    Err(Error::TimedOut)
}

/// Body of `queries/v1/query-request`.
#[derive(Debug, serde::Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QueryRequest {
    pub(crate) sql_text: String,
}

impl From<String> for QueryRequest {
    fn from(sql_text: String) -> Self {
        Self { sql_text }
    }
}

use std::time::Duration;

use reqwest::Url;

use crate::put::{PutCommand, PutResponse, PutResult, run_put};
use crate::query::{QueryRequest, authorized, execute};
use crate::types::SnowflakeResponse;
use crate::{Error, Result};

const DEFAULT_TIMEOUT_SECONDS: u64 = 300;

pub struct SnowflakeSession {
    pub(super) http: reqwest::Client,
    pub(super) base_url: Url,
    pub(super) session_token: String,
    pub(super) timeout: Option<Duration>,
}

impl SnowflakeSession {
    fn timeout(&self) -> Duration {
        self.timeout
            .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS))
    }

    /// Runs a `PUT` statement and uploads the matching local files to the stage.
    pub async fn put(&self, command: &PutCommand) -> Result<Vec<PutResult>> {
        let response = execute(
            &self.http,
            &self.base_url,
            QueryRequest::from(command.to_string()),
            &self.session_token,
            self.timeout(),
        )
        .await?;
        let response: PutResponse = response.decode_data()?;
        run_put(&self.http, response).await
    }

    /// Ends the session on the server side.
    pub async fn close(self) -> Result<()> {
        let url = self.base_url.join("session")?;
        let response = authorized(self.http.post(url), &self.session_token)
            .query(&[("delete", "true")])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::Communication(body));
        }
        let response: SnowflakeResponse =
            serde_json::from_str(&body).map_err(|e| Error::Json(e, body))?;
        if !response.success {
            return Err(Error::Communication(response.message.unwrap_or_default()));
        }

        tracing::info!("Snowflake session closed");
        Ok(())
    }
}

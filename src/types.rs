use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::{Error, Result};

/// Envelope shared by every Snowflake REST response.
#[derive(Deserialize, Debug)]
pub(crate) struct SnowflakeResponse {
    #[serde(default)]
    pub(crate) data: serde_json::Value,
    pub(crate) message: Option<String>,
    pub(crate) success: bool,
    pub(crate) code: Option<String>,
}

impl SnowflakeResponse {
    /// Decodes `data` into the shape the caller expects.
    pub(crate) fn decode_data<T: DeserializeOwned>(self) -> Result<T> {
        let body = self.data.to_string();
        serde_json::from_value(self.data).map_err(|e| Error::Json(e, body))
    }
}

//! # Snowflake stage PUT
//!
//! Uploads local files to a Snowflake stage, the way `PUT file://... @stage`
//! does in the official connectors: the statement is sent to Snowflake, and
//! the client compresses, encrypts and uploads the file to the storage that
//! backs the stage.
//!
//! ```rust,no_run
//! # use snowflake_stage_put::{PutCommand, Result, SnowflakeAuthMethod, SnowflakeClient, SnowflakeClientConfig};
//! # async fn run() -> Result<()> {
//! let client = SnowflakeClient::new(
//!     "USERNAME",
//!     SnowflakeAuthMethod::KeyPair {
//!         encrypted_pem: std::fs::read_to_string("rsa_key.p8")?,
//!         password: Vec::new(),
//!     },
//!     SnowflakeClientConfig {
//!         account: "ACCOUNT".to_string(),
//!         role: Some("ROLE".to_string()),
//!         warehouse: Some("WAREHOUSE".to_string()),
//!         database: Some("DATABASE".to_string()),
//!         schema: Some("SCHEMA".to_string()),
//!         timeout: Some(std::time::Duration::from_secs(30)),
//!     },
//! )?;
//! let session = client.create_session().await?;
//!
//! let results = session.put(&PutCommand::new("data/videos.csv", "STG_VIDEO")).await?;
//! assert_eq!(results[0].target, "videos.csv.gz");
//!
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

mod auth;
pub mod cli;
mod error;
mod put;
mod query;
mod session;
mod types;
mod upload;

use std::time::Duration;

pub use auth::wrap_private_key_pem;
pub use error::{Error, Result};
pub use put::{
    CompressionType, EncryptionMaterial, PutCommand, PutResult, PutStatus, StageCredentials,
    StageInfo, StageLocationType,
};
pub use session::SnowflakeSession;
pub use upload::{UploadOutcome, upload_and_close};

use auth::login;

use reqwest::{Client, ClientBuilder};

#[derive(Clone)]
pub struct SnowflakeClient {
    http: Client,

    username: String,
    auth: SnowflakeAuthMethod,
    config: SnowflakeClientConfig,
    connection_config: Option<SnowflakeConnectionConfig>,
}

#[derive(Default, Clone)]
pub struct SnowflakeClientConfig {
    pub account: String,

    pub warehouse: Option<String>,
    pub database: Option<String>,
    pub schema: Option<String>,
    pub role: Option<String>,
    pub timeout: Option<Duration>,
}

#[derive(Default, Clone)]
pub(crate) struct SnowflakeConnectionConfig {
    pub(crate) host: String,
    pub(crate) port: Option<u16>,
    pub(crate) protocol: Option<String>,
}

#[derive(Clone)]
pub enum SnowflakeAuthMethod {
    /// RSA key-pair authentication.
    ///
    /// `encrypted_pem` may be a PKCS#8 (encrypted or not) or PKCS#1 PEM
    /// document; an empty `password` means the key is not encrypted. Use
    /// [`wrap_private_key_pem`] for key material stored without its PEM
    /// header and footer.
    KeyPair {
        encrypted_pem: String,
        password: Vec<u8>,
    },
}

impl SnowflakeClient {
    pub fn new(
        username: &str,
        auth: SnowflakeAuthMethod,
        config: SnowflakeClientConfig,
    ) -> Result<Self> {
        let client = ClientBuilder::new().gzip(true).build()?;
        Ok(Self {
            http: client,
            username: username.to_string(),
            auth,
            config,
            connection_config: None,
        })
    }

    /// Points the client at an explicit host instead of
    /// `{account}.snowflakecomputing.com`.
    pub fn with_address(
        self,
        host: &str,
        port: Option<u16>,
        protocol: Option<String>,
    ) -> Result<Self> {
        Ok(Self {
            connection_config: Some(SnowflakeConnectionConfig {
                host: host.to_string(),
                port,
                protocol,
            }),
            ..self
        })
    }

    pub async fn create_session(&self) -> Result<SnowflakeSession> {
        let session_token = login(
            &self.http,
            &self.username,
            &self.auth,
            &self.config,
            &self.connection_config,
        )
        .await?;
        let base_url = auth::get_base_url(&self.config, &self.connection_config)?;
        tracing::info!(account = %self.config.account, "Snowflake session opened");
        Ok(SnowflakeSession {
            http: self.http.clone(),
            base_url,
            session_token,
            timeout: self.config.timeout,
        })
    }
}

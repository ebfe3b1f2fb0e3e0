//! Command line of the `snowflake-stage-put` binary.

use std::time::Duration;

use clap::Parser;

use crate::{
    PutCommand, Result, SnowflakeAuthMethod, SnowflakeClient, SnowflakeClientConfig,
    UploadOutcome, upload_and_close, wrap_private_key_pem,
};

/// Upload a local file to a Snowflake stage.
///
/// Every option can also be given through the environment variable shown
/// next to it; a `.env` file in the working directory is loaded first.
#[derive(Parser, Debug, Clone)]
#[command(name = "snowflake-stage-put")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Local file to upload (wildcards in the file name are expanded)
    #[arg(value_name = "FILE")]
    pub file_path: String,

    /// Private key, PEM armored or just the base64 body, encrypted or not
    #[arg(long, env = "PRIVATE_KEY", hide_env_values = true)]
    pub private_key: String,

    /// Passphrase of an encrypted private key
    #[arg(long, env = "PRIVATE_KEY_PASSPHRASE", hide_env_values = true)]
    pub private_key_passphrase: Option<String>,

    /// Account identifier, e.g. myorg-myaccount or xy12345.ap-northeast-1.aws
    #[arg(long, env = "SNOWFLAKE_ACCOUNT")]
    pub account: String,

    #[arg(long, env = "SNOWFLAKE_USER")]
    pub user: String,

    #[arg(long, env = "ROLE")]
    pub role: String,

    #[arg(long, env = "WAREHOUSE")]
    pub warehouse: String,

    #[arg(long, env = "SNOWFLAKE_DATABASE", default_value = "VIDEO")]
    pub database: String,

    #[arg(long, env = "SNOWFLAKE_SCHEMA", default_value = "VIDEO")]
    pub schema: String,

    /// Stage to upload into
    #[arg(long, env = "SNOWFLAKE_STAGE", default_value = "STG_VIDEO")]
    pub stage: String,

    /// Replace files already in the stage even when their content is unchanged
    #[arg(long)]
    pub overwrite: bool,

    /// Connect to this host instead of <account>.snowflakecomputing.com
    #[arg(long, env = "SNOWFLAKE_HOST")]
    pub host: Option<String>,

    #[arg(long, env = "SNOWFLAKE_PORT", requires = "host")]
    pub port: Option<u16>,

    /// http or https
    #[arg(long, env = "SNOWFLAKE_PROTOCOL", requires = "host")]
    pub protocol: Option<String>,

    /// Login request timeout, also the total wait for a long-running PUT (default 300)
    #[arg(long = "timeout", env = "SNOWFLAKE_TIMEOUT_SECS", value_name = "SECONDS")]
    pub timeout_secs: Option<u64>,
}

impl Cli {
    pub fn client(&self) -> Result<SnowflakeClient> {
        let auth = SnowflakeAuthMethod::KeyPair {
            encrypted_pem: wrap_private_key_pem(&self.private_key),
            password: self
                .private_key_passphrase
                .as_deref()
                .unwrap_or_default()
                .as_bytes()
                .to_vec(),
        };
        let config = SnowflakeClientConfig {
            account: self.account.clone(),
            warehouse: Some(self.warehouse.clone()),
            database: Some(self.database.clone()),
            schema: Some(self.schema.clone()),
            role: Some(self.role.clone()),
            timeout: self.timeout_secs.map(Duration::from_secs),
        };
        let client = SnowflakeClient::new(&self.user, auth, config)?;
        match &self.host {
            Some(host) => client.with_address(host, self.port, self.protocol.clone()),
            None => Ok(client),
        }
    }

    pub fn put_command(&self) -> PutCommand {
        PutCommand::new(&self.file_path, &self.stage).overwrite(self.overwrite)
    }
}

/// Logs in and uploads the file. Errors are returned only for failures
/// before the upload starts; the upload itself always yields an outcome.
pub async fn run(cli: &Cli) -> Result<UploadOutcome> {
    let client = cli.client()?;
    let session = client.create_session().await?;
    Ok(upload_and_close(session, &cli.put_command()).await)
}

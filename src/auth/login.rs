use chrono::Utc;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, Url};
use serde_json::{Value, json};

use crate::{Error, Result, SnowflakeAuthMethod, SnowflakeClientConfig, SnowflakeConnectionConfig};

use super::client::user_agent;
use super::key_pair::generate_jwt_from_key_pair;

pub(crate) fn get_base_url(
    config: &SnowflakeClientConfig,
    connection_config: &Option<SnowflakeConnectionConfig>,
) -> Result<Url> {
    if let Some(connection_config) = connection_config {
        let host = &connection_config.host;
        let protocol = connection_config
            .protocol
            .clone()
            .unwrap_or_else(|| "https".to_string());
        let mut url = Url::parse(&format!("{protocol}://{host}"))?;
        if let Some(port) = connection_config.port {
            url.set_port(Some(port))
                .map_err(|_| Error::Url("invalid base url port".to_string()))?;
        }
        Ok(url)
    } else {
        Ok(Url::parse(&format!(
            "https://{}.snowflakecomputing.com",
            config.account
        ))?)
    }
}

fn base_login_request_data(username: &str, config: &SnowflakeClientConfig) -> Value {
    json!({
        "ACCOUNT_NAME": config.account,
        "LOGIN_NAME": username,
        "CLIENT_APP_ID": super::client::client_app_id(),
        "CLIENT_APP_VERSION": super::client::client_app_version(),
    })
}

/// Login to Snowflake and return a session token.
pub(crate) async fn login(
    http: &Client,
    username: &str,
    auth: &SnowflakeAuthMethod,
    config: &SnowflakeClientConfig,
    connection_config: &Option<SnowflakeConnectionConfig>,
) -> Result<String> {
    let base_url = get_base_url(config, connection_config)?;
    let url = base_url.join("session/v1/login-request")?;

    let mut queries: Vec<(&str, &str)> = vec![];
    if let Some(warehouse) = &config.warehouse {
        queries.push(("warehouse", warehouse));
    }
    if let Some(database) = &config.database {
        queries.push(("databaseName", database));
    }
    if let Some(schema) = &config.schema {
        queries.push(("schemaName", schema));
    }
    if let Some(role) = &config.role {
        queries.push(("roleName", role));
    }

    let login_data = login_request_data(username, auth, config)?;
    tracing::debug!(%url, username, "logging in to Snowflake");

    let mut request = http
        .post(url)
        .query(&queries)
        .header(ACCEPT, "application/json")
        .header(USER_AGENT, user_agent())
        .json(&json!({
            "data": login_data
        }));
    if let Some(timeout) = config.timeout {
        request = request.timeout(timeout);
    }

    let resp = request.send().await?;

    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        return Err(Error::Communication(body));
    }

    let parsed: Response = serde_json::from_str(&body).map_err(|e| Error::Json(e, body))?;
    if !parsed.success {
        return Err(Error::Communication(parsed.message.unwrap_or_default()));
    }

    let data = parsed
        .data
        .ok_or_else(|| Error::Communication("missing login-response data".to_string()))?;

    Ok(data.token)
}

fn login_request_data(
    username: &str,
    auth: &SnowflakeAuthMethod,
    config: &SnowflakeClientConfig,
) -> Result<Value> {
    let mut data = base_login_request_data(username, config);
    let Some(obj) = data.as_object_mut() else {
        return Ok(data);
    };
    let SnowflakeAuthMethod::KeyPair {
        encrypted_pem,
        password,
    } = auth;
    let password = (!password.is_empty()).then_some(password.as_slice());
    let jwt = generate_jwt_from_key_pair(
        encrypted_pem,
        password,
        username,
        &config.account,
        Utc::now().timestamp(),
    )?;
    obj.insert("TOKEN".to_string(), json!(jwt));
    obj.insert("AUTHENTICATOR".to_string(), json!("SNOWFLAKE_JWT"));
    Ok(data)
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponseData {
    token: String,
}

#[derive(serde::Deserialize)]
struct Response {
    data: Option<LoginResponseData>,
    message: Option<String>,
    success: bool,
}

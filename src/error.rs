use reqwest::header::InvalidHeaderValue;
use tokio::task::JoinError;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("communication error: {0}")]
    Communication(String),

    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] InvalidHeaderValue),

    #[error("session expired")]
    SessionExpired,

    #[error("io error: {0}")]
    IO(#[from] std::io::Error),

    #[error("json error: {0}, body: {1}")]
    Json(serde_json::Error, String),

    #[error("base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    #[error("url parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("invalid url: {0}")]
    Url(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("pkcs8 error: {0}")]
    Pkcs8(#[from] pkcs8::Error),

    #[error("spki error: {0}")]
    Spki(#[from] pkcs8::spki::Error),

    #[error("jwt error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("query timed out")]
    TimedOut,

    #[error("async query response has no polling url")]
    NoPollingUrlAsyncQuery,

    #[error("file does not exist: {0}")]
    FileNotFound(String),

    #[error("encryption error: {0}")]
    Encryption(String),

    #[error("stage error: {0}")]
    Stage(String),

    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("future join error: {0}")]
    FutureJoin(#[from] JoinError),
}

pub type Result<T> = std::result::Result<T, Error>;

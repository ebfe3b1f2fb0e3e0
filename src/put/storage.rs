use std::path::PathBuf;
use std::sync::Arc;

use object_store::aws::AmazonS3Builder;
use object_store::azure::{AzureConfigKey, MicrosoftAzureBuilder};
use object_store::gcp::{GcpCredential, GoogleCloudStorageBuilder};
use object_store::local::LocalFileSystem;
use object_store::path::Path;
use object_store::{
    Attribute, Attributes, GetOptions, ObjectStore, PutOptions, PutPayload,
    StaticCredentialProvider,
};
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use serde_json::json;

use super::encryption::EncryptionMetadata;
use super::source::expand_home;
use crate::{Error, Result};

/// Storage backing a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageLocationType {
    S3,
    Azure,
    Gcs,
    LocalFs,
}

/// Where and how to upload, as returned for a `PUT` statement.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageInfo {
    pub location_type: StageLocationType,
    /// `bucket/prefix/` for cloud stages, a directory for `LOCAL_FS`.
    pub location: String,
    pub region: Option<String>,
    pub storage_account: Option<String>,
    pub end_point: Option<String>,
    pub presigned_url: Option<String>,
    #[serde(default)]
    pub creds: StageCredentials,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StageCredentials {
    #[serde(rename = "AWS_KEY_ID")]
    pub aws_key_id: Option<String>,
    #[serde(rename = "AWS_SECRET_KEY")]
    pub aws_secret_key: Option<String>,
    #[serde(rename = "AWS_TOKEN")]
    pub aws_token: Option<String>,
    #[serde(rename = "AZURE_SAS_TOKEN")]
    pub azure_sas_token: Option<String>,
    #[serde(rename = "GCS_ACCESS_TOKEN")]
    pub gcs_access_token: Option<String>,
}

/// Splits `bucket/some/prefix/` into the bucket (or container) and the prefix.
pub(crate) fn split_location(location: &str) -> (&str, &str) {
    let location = location.trim_start_matches('/');
    location.split_once('/').unwrap_or((location, ""))
}

fn digest_key(location_type: StageLocationType) -> &'static str {
    match location_type {
        StageLocationType::Azure => "sfcdigest",
        _ => "sfc-digest",
    }
}

/// Azure and GCS expect the wrapped key in the Azure SDK's envelope format.
fn encryption_data(encryption: &EncryptionMetadata) -> String {
    json!({
        "EncryptionMode": "FullBlob",
        "WrappedContentKey": {
            "KeyId": "symmKey1",
            "EncryptedKey": encryption.key,
            "Algorithm": "AES_CBC_256"
        },
        "EncryptionAgent": {
            "Protocol": "1.0",
            "EncryptionAlgorithm": "AES_CBC_256"
        },
        "ContentEncryptionIV": encryption.iv,
        "KeyWrappingMetadata": {
            "EncryptionLibrary": "Java 5.3.0"
        }
    })
    .to_string()
}

/// User metadata stored next to an uploaded file. Keys are sent with the
/// provider's metadata prefix (`x-amz-meta-`, `x-ms-meta-`, `x-goog-meta-`).
pub(crate) fn upload_metadata(
    location_type: StageLocationType,
    digest: &str,
    encryption: Option<&EncryptionMetadata>,
) -> Vec<(&'static str, String)> {
    let mut metadata = match location_type {
        StageLocationType::LocalFs => return Vec::new(),
        _ => vec![(digest_key(location_type), digest.to_string())],
    };
    let Some(encryption) = encryption else {
        return metadata;
    };
    match location_type {
        StageLocationType::S3 => {
            metadata.push(("x-amz-key", encryption.key.clone()));
            metadata.push(("x-amz-iv", encryption.iv.clone()));
            metadata.push(("x-amz-matdesc", encryption.matdesc.clone()));
        }
        StageLocationType::Azure | StageLocationType::Gcs => {
            metadata.push(("encryptiondata", encryption_data(encryption)));
            metadata.push(("matdesc", encryption.matdesc.clone()));
        }
        StageLocationType::LocalFs => {}
    }
    metadata
}

/// One file ready to be written to the stage.
#[derive(Debug)]
pub(crate) struct StagedFile<'a> {
    pub(crate) name: &'a str,
    pub(crate) body: Vec<u8>,
    pub(crate) digest: &'a str,
    pub(crate) encryption: Option<&'a EncryptionMetadata>,
}

/// Destination of a `PUT`.
pub(crate) enum StageTarget {
    Store(StageStore),
    /// GCS stages without a downscoped token hand out one signed URL per file.
    PresignedUrl { http: Client, url: String },
}

impl StageTarget {
    pub(crate) async fn from_stage_info(
        http: &Client,
        info: &StageInfo,
        file_count: usize,
    ) -> Result<Self> {
        if info.location_type == StageLocationType::Gcs && info.creds.gcs_access_token.is_none() {
            let url = info.presigned_url.clone().ok_or_else(|| {
                Error::Stage("GCS stage returned neither an access token nor a presigned URL".into())
            })?;
            if file_count > 1 {
                return Err(Error::Stage(
                    "a presigned GCS URL can only receive a single file".into(),
                ));
            }
            return Ok(Self::PresignedUrl {
                http: http.clone(),
                url,
            });
        }
        StageStore::from_stage_info(info).await.map(Self::Store)
    }

    /// Digest recorded for `name` in the stage, if the file exists and has one.
    pub(crate) async fn existing_digest(&self, name: &str) -> Result<Option<String>> {
        match self {
            Self::Store(store) => store.existing_digest(name).await,
            Self::PresignedUrl { .. } => Ok(None),
        }
    }

    pub(crate) async fn upload(&self, file: StagedFile<'_>) -> Result<()> {
        match self {
            Self::Store(store) => store.upload(file).await,
            Self::PresignedUrl { http, url } => {
                upload_presigned(http, url, StageLocationType::Gcs, file).await
            }
        }
    }
}

/// A stage reached through `object_store`.
pub(crate) struct StageStore {
    store: Arc<dyn ObjectStore>,
    prefix: Path,
    location_type: StageLocationType,
}

impl StageStore {
    pub(crate) fn new(
        store: Arc<dyn ObjectStore>,
        prefix: &str,
        location_type: StageLocationType,
    ) -> Self {
        Self {
            store,
            prefix: Path::from(prefix),
            location_type,
        }
    }

    async fn from_stage_info(info: &StageInfo) -> Result<Self> {
        let creds = &info.creds;
        let (store, prefix): (Arc<dyn ObjectStore>, &str) = match info.location_type {
            StageLocationType::S3 => {
                let (bucket, prefix) = split_location(&info.location);
                let mut builder = AmazonS3Builder::new()
                    .with_bucket_name(bucket)
                    .with_region(info.region.as_deref().unwrap_or("us-east-1"));
                if let Some(key_id) = &creds.aws_key_id {
                    builder = builder.with_access_key_id(key_id);
                }
                if let Some(secret) = &creds.aws_secret_key {
                    builder = builder.with_secret_access_key(secret);
                }
                if let Some(token) = &creds.aws_token {
                    builder = builder.with_token(token);
                }
                if let Some(end_point) = &info.end_point {
                    builder = builder.with_endpoint(format!("https://{end_point}"));
                }
                let store: Arc<dyn ObjectStore> = Arc::new(builder.build()?);
                (store, prefix)
            }
            StageLocationType::Azure => {
                let (container, prefix) = split_location(&info.location);
                let account = info.storage_account.as_deref().ok_or_else(|| {
                    Error::Stage("Azure stage has no storage account".to_string())
                })?;
                let sas_token = creds.azure_sas_token.as_deref().ok_or_else(|| {
                    Error::Stage("Azure stage has no SAS token".to_string())
                })?;
                let mut builder = MicrosoftAzureBuilder::new()
                    .with_account(account)
                    .with_container_name(container)
                    .with_config(AzureConfigKey::SasKey, sas_token.trim_start_matches('?'));
                if let Some(end_point) = &info.end_point {
                    builder = builder.with_endpoint(format!("https://{account}.{end_point}"));
                }
                let store: Arc<dyn ObjectStore> = Arc::new(builder.build()?);
                (store, prefix)
            }
            StageLocationType::Gcs => {
                let (bucket, prefix) = split_location(&info.location);
                let token = creds.gcs_access_token.clone().ok_or_else(|| {
                    Error::Stage("GCS stage has no access token".to_string())
                })?;
                let credentials =
                    StaticCredentialProvider::new(GcpCredential { bearer: token });
                let store = GoogleCloudStorageBuilder::new()
                    .with_bucket_name(bucket)
                    .with_credentials(Arc::new(credentials))
                    .build()?;
                let store: Arc<dyn ObjectStore> = Arc::new(store);
                (store, prefix)
            }
            StageLocationType::LocalFs => {
                let directory: PathBuf = expand_home(&info.location);
                tokio::fs::create_dir_all(&directory).await?;
                let store: Arc<dyn ObjectStore> =
                    Arc::new(LocalFileSystem::new_with_prefix(&directory)?);
                (store, "")
            }
        };
        tracing::debug!(location_type = ?info.location_type, location = %info.location, "stage storage resolved");
        Ok(Self::new(store, prefix, info.location_type))
    }

    fn path(&self, name: &str) -> Path {
        self.prefix.child(name)
    }

    async fn existing_digest(&self, name: &str) -> Result<Option<String>> {
        let options = GetOptions {
            head: true,
            ..Default::default()
        };
        match self.store.get_opts(&self.path(name), options).await {
            Ok(result) => {
                let key = Attribute::Metadata(digest_key(self.location_type).into());
                Ok(result
                    .attributes
                    .get(&key)
                    .map(|value| AsRef::<str>::as_ref(value).to_string()))
            }
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn upload(&self, file: StagedFile<'_>) -> Result<()> {
        let mut attributes = Attributes::new();
        for (key, value) in upload_metadata(self.location_type, file.digest, file.encryption) {
            attributes.insert(Attribute::Metadata(key.into()), value.into());
        }
        let options = PutOptions {
            attributes,
            ..Default::default()
        };
        self.store
            .put_opts(&self.path(file.name), PutPayload::from(file.body), options)
            .await?;
        Ok(())
    }
}

async fn upload_presigned(
    http: &Client,
    url: &str,
    location_type: StageLocationType,
    file: StagedFile<'_>,
) -> Result<()> {
    let mut headers = HeaderMap::new();
    for (key, value) in upload_metadata(location_type, file.digest, file.encryption) {
        let name = HeaderName::try_from(format!("x-goog-meta-{key}"))
            .map_err(|e| Error::Stage(format!("invalid metadata key {key}: {e}")))?;
        headers.insert(name, HeaderValue::from_str(&value)?);
    }
    let response = http.put(url).headers(headers).body(file.body).send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await?;
        return Err(Error::Stage(format!("upload failed with {status}: {body}")));
    }
    Ok(())
}

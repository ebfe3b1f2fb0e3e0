//! Client side of the `PUT` statement.
//!
//! Snowflake answers a `PUT` with upload instructions instead of rows: the
//! files to read, the storage behind the stage, short-lived credentials and,
//! for client-side encrypted stages, a master key. Everything after that
//! happens here.

mod command;
mod compression;
mod encryption;
mod source;
mod storage;

use std::fmt;
use std::path::PathBuf;

use base64::{Engine, engine::general_purpose::STANDARD};
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};

pub use command::PutCommand;
pub use compression::CompressionType;
pub use encryption::EncryptionMaterial;
pub use storage::{StageCredentials, StageInfo, StageLocationType};

use compression::{SourceCompression, gzip};
use encryption::{EncryptionMetadata, encrypt};
use source::expand_sources;
use storage::{StageTarget, StagedFile};

use crate::{Error, Result};

const UPLOAD_COMMAND: &str = "UPLOAD";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutStatus {
    Uploaded,
    Skipped,
}

impl fmt::Display for PutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uploaded => f.write_str("UPLOADED"),
            Self::Skipped => f.write_str("SKIPPED"),
        }
    }
}

/// Outcome for one source file, mirroring the rows a `PUT` returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutResult {
    pub source: String,
    pub target: String,
    pub source_size: u64,
    pub target_size: u64,
    pub source_compression: CompressionType,
    pub target_compression: CompressionType,
    pub status: PutStatus,
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MaterialField {
    One(EncryptionMaterial),
    Many(Vec<Option<EncryptionMaterial>>),
}

impl MaterialField {
    fn into_first(self) -> Option<EncryptionMaterial> {
        match self {
            Self::One(material) => Some(material),
            Self::Many(materials) => materials.into_iter().flatten().next(),
        }
    }
}

fn default_auto_compress() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PutResponse {
    command: Option<String>,
    #[serde(rename = "src_locations", default)]
    src_locations: Vec<String>,
    #[serde(default = "default_auto_compress")]
    auto_compress: bool,
    #[serde(default)]
    overwrite: bool,
    source_compression: Option<String>,
    stage_info: Option<StageInfo>,
    encryption_material: Option<MaterialField>,
}

#[derive(Debug, Clone)]
pub(crate) struct TransferOptions {
    auto_compress: bool,
    overwrite: bool,
    source_compression: SourceCompression,
    encryption: Option<EncryptionMaterial>,
}

/// A source file turned into the bytes that go to the stage.
#[derive(Debug)]
struct PreparedFile {
    source: String,
    target: String,
    source_size: u64,
    target_size: u64,
    source_compression: CompressionType,
    target_compression: CompressionType,
    digest: String,
    body: Vec<u8>,
    encryption: Option<EncryptionMetadata>,
}

impl PreparedFile {
    fn into_result(self, status: PutStatus, message: &str) -> PutResult {
        PutResult {
            source: self.source,
            target: self.target,
            source_size: self.source_size,
            target_size: self.target_size,
            source_compression: self.source_compression,
            target_compression: self.target_compression,
            status,
            message: message.to_string(),
        }
    }
}

fn sha256_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    STANDARD.encode(hasher.finalize())
}

fn prepare_file(name: String, data: Vec<u8>, options: &TransferOptions) -> Result<PreparedFile> {
    let source_size = data.len() as u64;
    let source_compression = options.source_compression.resolve(&name, &data)?;

    let (target, target_compression, body) =
        if !source_compression.is_compressed() && options.auto_compress {
            (format!("{name}.gz"), CompressionType::Gzip, gzip(&data)?)
        } else {
            (name.clone(), source_compression, data)
        };

    let digest = sha256_digest(&body);
    let target_size = body.len() as u64;
    let (body, encryption) = match &options.encryption {
        Some(material) => {
            let (encrypted, metadata) = encrypt(material, &body)?;
            (encrypted, Some(metadata))
        }
        None => (body, None),
    };

    Ok(PreparedFile {
        source: name,
        target,
        source_size,
        target_size,
        source_compression,
        target_compression,
        digest,
        body,
        encryption,
    })
}

/// Uploads `sources` one after another.
async fn transfer(
    target: &StageTarget,
    sources: &[PathBuf],
    options: &TransferOptions,
) -> Result<Vec<PutResult>> {
    let mut results = Vec::with_capacity(sources.len());
    for source in sources {
        let name = source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| Error::FileNotFound(source.display().to_string()))?;
        let data = tokio::fs::read(source).await?;
        let file_options = options.clone();
        let mut prepared =
            tokio::task::spawn_blocking(move || prepare_file(name, data, &file_options)).await??;

        if !options.overwrite {
            let existing = target.existing_digest(&prepared.target).await?;
            if existing.as_deref() == Some(prepared.digest.as_str()) {
                tracing::info!(source = %prepared.source, target = %prepared.target, "file already staged, skipping");
                results.push(prepared.into_result(
                    PutStatus::Skipped,
                    "File with the same destination name and checksum already exists",
                ));
                continue;
            }
        }

        let body = std::mem::take(&mut prepared.body);
        target
            .upload(StagedFile {
                name: &prepared.target,
                body,
                digest: &prepared.digest,
                encryption: prepared.encryption.as_ref(),
            })
            .await?;
        tracing::info!(
            source = %prepared.source,
            target = %prepared.target,
            target_size = prepared.target_size,
            "file uploaded"
        );
        results.push(prepared.into_result(PutStatus::Uploaded, ""));
    }
    Ok(results)
}

pub(crate) async fn run_put(http: &Client, response: PutResponse) -> Result<Vec<PutResult>> {
    if response.command.as_deref() != Some(UPLOAD_COMMAND) {
        return Err(Error::UnsupportedFormat(format!(
            "expected an {UPLOAD_COMMAND} command, got {}",
            response.command.as_deref().unwrap_or("none")
        )));
    }
    if response.src_locations.is_empty() {
        return Err(Error::Stage(
            "upload response lists no source files".to_string(),
        ));
    }
    let stage_info = response
        .stage_info
        .ok_or_else(|| Error::Stage("response has no stage information".to_string()))?;
    let options = TransferOptions {
        auto_compress: response.auto_compress,
        overwrite: response.overwrite,
        source_compression: SourceCompression::parse(response.source_compression.as_deref())?,
        encryption: response
            .encryption_material
            .and_then(MaterialField::into_first),
    };

    let sources = expand_sources(&response.src_locations).await?;
    tracing::debug!(files = sources.len(), location_type = ?stage_info.location_type, "starting upload");
    let target = StageTarget::from_stage_info(http, &stage_info, sources.len()).await?;
    transfer(&target, &sources, &options).await
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::sync::Arc;

    use flate2::read::GzDecoder;
    use object_store::memory::InMemory;
    use object_store::path::Path;
    use object_store::{Attribute, ObjectStore};
    use serde_json::json;

    use super::storage::StageStore;
    use super::*;

    fn options() -> TransferOptions {
        TransferOptions {
            auto_compress: true,
            overwrite: false,
            source_compression: SourceCompression::AutoDetect,
            encryption: None,
        }
    }

    fn in_memory_target(location_type: StageLocationType) -> (Arc<InMemory>, StageTarget) {
        let memory = Arc::new(InMemory::new());
        let store = StageStore::new(memory.clone(), "stages/abc/", location_type);
        (memory, StageTarget::Store(store))
    }

    async fn stored(memory: &InMemory, name: &str) -> object_store::GetResult {
        memory
            .get(&Path::from(format!("stages/abc/{name}")))
            .await
            .unwrap()
    }

    #[test]
    fn test_uncompressed_file_is_gzipped_and_renamed() -> Result<()> {
        let data = b"id,title\n1,first\n".to_vec();
        let prepared = prepare_file("videos.csv".to_string(), data.clone(), &options())?;
        assert_eq!(prepared.target, "videos.csv.gz");
        assert_eq!(prepared.source_compression, CompressionType::None);
        assert_eq!(prepared.target_compression, CompressionType::Gzip);
        assert_eq!(prepared.source_size, data.len() as u64);
        assert_eq!(prepared.target_size, prepared.body.len() as u64);
        assert_eq!(prepared.digest, sha256_digest(&prepared.body));
        Ok(())
    }

    #[test]
    fn test_compressed_file_is_uploaded_as_is() -> Result<()> {
        let data = gzip(b"already compressed")?;
        let prepared = prepare_file("videos.csv.gz".to_string(), data.clone(), &options())?;
        assert_eq!(prepared.target, "videos.csv.gz");
        assert_eq!(prepared.target_compression, CompressionType::Gzip);
        assert_eq!(prepared.body, data);
        Ok(())
    }

    #[test]
    fn test_auto_compress_off_keeps_name() -> Result<()> {
        let options = TransferOptions {
            auto_compress: false,
            ..options()
        };
        let prepared = prepare_file("videos.csv".to_string(), b"a,b".to_vec(), &options)?;
        assert_eq!(prepared.target, "videos.csv");
        assert_eq!(prepared.target_compression, CompressionType::None);
        assert_eq!(prepared.body, b"a,b");
        Ok(())
    }

    #[test]
    fn test_digest_is_taken_before_encryption() -> Result<()> {
        let encrypted_options = TransferOptions {
            encryption: Some(EncryptionMaterial {
                query_stage_master_key: "AAECAwQFBgcICQoLDA0ODw==".to_string(),
                query_id: "q".to_string(),
                smk_id: 1,
            }),
            ..options()
        };
        let plain = prepare_file("a.csv".to_string(), b"a,b\n".to_vec(), &options())?;
        let encrypted = prepare_file("a.csv".to_string(), b"a,b\n".to_vec(), &encrypted_options)?;
        assert_eq!(plain.digest, encrypted.digest);
        assert_eq!(plain.target_size, encrypted.target_size);
        assert_ne!(plain.body, encrypted.body);
        assert!(encrypted.encryption.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_transfer_uploads_then_skips_identical_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("videos.csv");
        std::fs::write(&source, "id,title\n1,first\n")?;
        let (memory, target) = in_memory_target(StageLocationType::S3);

        let results = transfer(&target, &[source.clone()], &options()).await?;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source, "videos.csv");
        assert_eq!(results[0].target, "videos.csv.gz");
        assert_eq!(results[0].status, PutStatus::Uploaded);

        let object = stored(&memory, "videos.csv.gz").await;
        let digest = object
            .attributes
            .get(&Attribute::Metadata("sfc-digest".into()))
            .map(|value| AsRef::<str>::as_ref(value).to_string());
        let body = object.bytes().await?;
        let mut decompressed = String::new();
        GzDecoder::new(body.as_ref()).read_to_string(&mut decompressed)?;
        assert_eq!(decompressed, "id,title\n1,first\n");
        assert_eq!(digest, Some(sha256_digest(&body)));

        let again = transfer(&target, &[source.clone()], &options()).await?;
        assert_eq!(again[0].status, PutStatus::Skipped);

        let overwrite = TransferOptions {
            overwrite: true,
            ..options()
        };
        let forced = transfer(&target, &[source], &overwrite).await?;
        assert_eq!(forced[0].status, PutStatus::Uploaded);
        Ok(())
    }

    #[tokio::test]
    async fn test_changed_file_is_uploaded_again() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("videos.csv");
        let (_, target) = in_memory_target(StageLocationType::S3);

        std::fs::write(&source, "v1")?;
        transfer(&target, &[source.clone()], &options()).await?;
        std::fs::write(&source, "v2")?;
        let results = transfer(&target, &[source], &options()).await?;
        assert_eq!(results[0].status, PutStatus::Uploaded);
        Ok(())
    }

    #[tokio::test]
    async fn test_encrypted_upload_carries_key_metadata() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("videos.csv");
        std::fs::write(&source, "id,title\n")?;
        let (memory, target) = in_memory_target(StageLocationType::S3);
        let options = TransferOptions {
            encryption: Some(EncryptionMaterial {
                query_stage_master_key: "AAECAwQFBgcICQoLDA0ODw==".to_string(),
                query_id: "01b2".to_string(),
                smk_id: 42,
            }),
            ..options()
        };

        transfer(&target, &[source], &options).await?;

        let object = stored(&memory, "videos.csv.gz").await;
        for key in ["sfc-digest", "x-amz-key", "x-amz-iv", "x-amz-matdesc"] {
            assert!(
                object
                    .attributes
                    .get(&Attribute::Metadata(key.into()))
                    .is_some(),
                "missing {key}"
            );
        }
        Ok(())
    }

    #[test]
    fn test_put_response_deserializes() {
        let response: PutResponse = serde_json::from_value(json!({
            "command": "UPLOAD",
            "src_locations": ["/tmp/videos.csv"],
            "parallel": 4,
            "autoCompress": true,
            "overwrite": false,
            "sourceCompression": "auto_detect",
            "stageInfo": {
                "locationType": "S3",
                "location": "sfc-stage/tmp/abc/",
                "region": "us-west-2",
                "creds": {"AWS_KEY_ID": "AKIA", "AWS_SECRET_KEY": "s", "AWS_TOKEN": "t"}
            },
            "encryptionMaterial": {
                "queryStageMasterKey": "AAECAwQFBgcICQoLDA0ODw==",
                "queryId": "01b2",
                "smkId": 42
            },
            "rowtype": [],
            "rowset": []
        }))
        .unwrap();
        assert_eq!(response.command.as_deref(), Some("UPLOAD"));
        assert_eq!(response.src_locations, vec!["/tmp/videos.csv"]);
        assert!(response.auto_compress);
        assert_eq!(
            response
                .encryption_material
                .and_then(MaterialField::into_first)
                .map(|m| m.smk_id),
            Some(42)
        );
    }

    #[tokio::test]
    async fn test_non_upload_response_is_rejected() {
        let response: PutResponse =
            serde_json::from_value(json!({"rowtype": [], "rowset": []})).unwrap();
        let err = run_put(&Client::new(), response).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }

    #[tokio::test]
    async fn test_upload_without_sources_is_rejected() -> Result<()> {
        let stage = tempfile::tempdir()?;
        let response: PutResponse = serde_json::from_value(json!({
            "command": "UPLOAD",
            "autoCompress": true,
            "stageInfo": {"locationType": "LOCAL_FS", "location": stage.path().to_string_lossy()}
        }))
        .unwrap();
        let err = run_put(&Client::new(), response).await.unwrap_err();
        assert!(matches!(err, Error::Stage(_)), "{err}");
        assert_eq!(std::fs::read_dir(stage.path())?.count(), 0);
        Ok(())
    }
}

use std::fmt;

use crate::put::{PutCommand, PutResult};
use crate::{Result, SnowflakeSession};

/// What a one-shot upload reports back to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded {
        file_path: String,
        stage: String,
        results: Vec<PutResult>,
    },
    Failed {
        message: String,
    },
}

impl UploadOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Uploaded { .. })
    }

    fn from_put(command: &PutCommand, put: Result<Vec<PutResult>>) -> Self {
        match put {
            Ok(results) if results.is_empty() => Self::Failed {
                message: format!("no files matched {}", command.file_path),
            },
            Ok(results) => Self::Uploaded {
                file_path: command.file_path.clone(),
                stage: command.stage_name().to_string(),
                results,
            },
            Err(e) => Self::Failed {
                message: e.to_string(),
            },
        }
    }
}

impl fmt::Display for UploadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uploaded {
                file_path, stage, ..
            } => write!(f, "File {file_path} successfully uploaded to stage {stage}."),
            Self::Failed { message } => write!(f, "Error uploading file: {message}"),
        }
    }
}

/// The two session calls an upload needs.
pub(crate) trait StageSession {
    async fn put(&self, command: &PutCommand) -> Result<Vec<PutResult>>;
    async fn close(self) -> Result<()>;
}

impl StageSession for SnowflakeSession {
    async fn put(&self, command: &PutCommand) -> Result<Vec<PutResult>> {
        SnowflakeSession::put(self, command).await
    }

    async fn close(self) -> Result<()> {
        SnowflakeSession::close(self).await
    }
}

/// Runs `command` and closes the session afterwards, whatever the upload
/// did. A failure to close is logged and does not change the outcome.
pub async fn upload_and_close(session: SnowflakeSession, command: &PutCommand) -> UploadOutcome {
    upload_with(session, command).await
}

async fn upload_with<S: StageSession>(session: S, command: &PutCommand) -> UploadOutcome {
    let put = session.put(command).await;
    if let Err(e) = &put {
        tracing::error!(error = %e, file_path = %command.file_path, "upload failed");
    }
    let outcome = UploadOutcome::from_put(command, put);

    if let Err(e) = session.close().await {
        tracing::warn!(error = %e, "failed to close Snowflake session");
    }
    outcome
}

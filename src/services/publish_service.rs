use crate::chat::{Attachment, Channel, ChatError, ChatPlatform, ChatSession};
use crate::config::AppConfig;
use crate::services::file_service::{FileError, FileService};
use crate::services::validation_service::{GuardError, GuardSequence};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info};

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Could not find channel {channel_id}")]
    ChannelUnavailable { channel_id: u64 },
    #[error("Could not scan {directory}: {source}")]
    Discovery {
        directory: String,
        #[source]
        source: FileError,
    },
    #[error(transparent)]
    Guard(#[from] GuardError),
    #[error("Failed to upload {file_name}: {reason}")]
    UploadFailed { file_name: String, reason: String },
    #[error("Chat error: {0}")]
    Chat(#[from] ChatError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Published { path: PathBuf },
    NothingToPublish,
}

/// One discovery-and-publish attempt against an open chat session.
#[derive(Clone)]
pub struct PublishService {
    video_directory: PathBuf,
    channel_id: u64,
    guard: GuardSequence,
    files: FileService,
}

impl PublishService {
    pub fn new(video_directory: impl Into<PathBuf>, channel_id: u64, guard: GuardSequence) -> Self {
        Self {
            video_directory: video_directory.into(),
            channel_id,
            guard,
            files: FileService::new(),
        }
    }

    /// `config` is expected to have passed [`AppConfig::validate`].
    pub fn from_config(config: &AppConfig) -> Option<Self> {
        Some(Self::new(
            config.video_directory.clone(),
            config.channel_id?,
            GuardSequence::from_config(config),
        ))
    }

    pub async fn run_once<P: ChatPlatform>(
        &self,
        session: &ChatSession<P>,
    ) -> Result<RunOutcome, PublishError> {
        let channel = session
            .resolve_channel(self.channel_id)
            .await?
            .ok_or(PublishError::ChannelUnavailable {
                channel_id: self.channel_id,
            })?;
        if let Some(name) = &channel.name {
            info!("Posting to #{}", name);
        }

        let latest = self
            .files
            .find_latest_video(&self.video_directory)
            .await
            .map_err(|source| PublishError::Discovery {
                directory: self.video_directory.display().to_string(),
                source,
            })?;
        let Some(latest) = latest else {
            info!("No video found in {}", self.video_directory.display());
            return Ok(RunOutcome::NothingToPublish);
        };
        info!(
            "Found latest video: {} ({})",
            latest.path.display(),
            latest.size_human_readable()
        );

        let guarded = self.guard.run(&latest.path).await?;
        if let Some(original) = &guarded.renamed_from {
            info!("Renamed {} before upload", original.display());
        }
        if let Some(source) = &guarded.compressed_from {
            info!("Uploading compressed copy of {}", source.display());
        }
        self.publish(session, &channel, &guarded.path).await?;

        Ok(RunOutcome::Published { path: guarded.path })
    }

    async fn publish<P: ChatPlatform>(
        &self,
        session: &ChatSession<P>,
        channel: &Channel,
        path: &Path,
    ) -> Result<(), PublishError> {
        // The file may have vanished while compressing; that is a local failure.
        let info = self
            .files
            .get_file_info(path)
            .await
            .map_err(GuardError::from)?;
        if !info.is_file {
            return Err(GuardError::NotFound {
                path: path.display().to_string(),
            }
            .into());
        }
        let file_name = info.file_name();

        let result = match tokio::fs::read(path).await {
            Ok(bytes) => {
                let attachment = Attachment {
                    file_name: file_name.clone(),
                    bytes,
                };
                session
                    .send(channel, &upload_caption(&file_name), Some(attachment))
                    .await
                    .map_err(|e| e.to_string())
            }
            Err(e) => Err(e.to_string()),
        };

        match result {
            Ok(()) => {
                info!("Uploaded successfully: {}", path.display());
                Ok(())
            }
            Err(reason) => {
                error!("Failed to upload {}: {}", path.display(), reason);
                if let Err(e) = session
                    .send(channel, &failure_notice(&file_name), None)
                    .await
                {
                    error!("Could not report the failed upload to the channel: {}", e);
                }
                Err(PublishError::UploadFailed { file_name, reason })
            }
        }
    }
}

pub fn upload_caption(file_name: &str) -> String {
    format!("🎥 New video uploaded: `{}`", file_name)
}

pub fn failure_notice(file_name: &str) -> String {
    format!("❌ Failed to upload `{}`.", file_name)
}

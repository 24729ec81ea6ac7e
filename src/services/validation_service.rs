use crate::compression::Compressor;
use crate::config::AppConfig;
use crate::constants::{
    COMPRESSED_PREFIX, SETTLE_INTERVAL_SECS, TARGET_SIZE_KB, UPLOAD_SIZE_LIMIT_BYTES,
};
use crate::security::sanitized_name_or_fallback;
use crate::services::file_service::{FileError, FileInfo, FileService};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum GuardError {
    #[error("File not found: {path}")]
    NotFound { path: String },
    #[error("File is empty: {path}")]
    EmptyFile { path: String },
    #[error("File is still being written: {path}")]
    StillWriting { path: String },
    #[error("Compression failed for {path}: {reason}")]
    CompressionFailed { path: String, reason: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<FileError> for GuardError {
    fn from(error: FileError) -> Self {
        match error {
            FileError::NotFound { path } => GuardError::NotFound { path },
            FileError::NotADirectory { path } => GuardError::NotFound { path },
            FileError::NoFreeName { path } => GuardError::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("no free name left for {}", path),
            )),
            FileError::Io(e) => GuardError::Io(e),
        }
    }
}

/// A candidate that passed every guard and may be published as is.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardedFile {
    pub path: PathBuf,
    pub renamed_from: Option<PathBuf>,
    pub compressed_from: Option<PathBuf>,
}

/// Decides whether a candidate video is safe to publish.
///
/// Checks run in order and stop at the first failure: existence, emptiness,
/// stability across the settle interval, name sanitization (which may rename
/// the file) and finally the size gate (which may compress it).
#[derive(Clone)]
pub struct GuardSequence {
    settle_interval: Duration,
    size_limit_bytes: u64,
    target_size_kb: u64,
    compressor: Compressor,
    files: FileService,
}

impl GuardSequence {
    pub fn new(compressor: Compressor) -> Self {
        Self {
            settle_interval: Duration::from_secs(SETTLE_INTERVAL_SECS),
            size_limit_bytes: UPLOAD_SIZE_LIMIT_BYTES,
            target_size_kb: TARGET_SIZE_KB,
            compressor,
            files: FileService::new(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(Compressor::new(&config.ffmpeg_path, &config.ffprobe_path))
            .with_settle_interval(config.settle_interval())
            .with_size_limit(config.size_limit_bytes)
            .with_target_size_kb(config.target_size_kb)
    }

    pub fn with_settle_interval(mut self, interval: Duration) -> Self {
        self.settle_interval = interval;
        self
    }

    pub fn with_size_limit(mut self, bytes: u64) -> Self {
        self.size_limit_bytes = bytes;
        self
    }

    pub fn with_target_size_kb(mut self, kb: u64) -> Self {
        self.target_size_kb = kb;
        self
    }

    pub async fn run(&self, path: &Path) -> Result<GuardedFile, GuardError> {
        let info = self.check_exists(path).await?;
        check_not_empty(&info)?;
        self.check_stable(&info).await?;

        let (path, renamed_from) = self.sanitize_name(&info.path).await?;

        let size = self.files.get_file_info(&path).await?.size;
        if size <= self.size_limit_bytes {
            return Ok(GuardedFile {
                path,
                renamed_from,
                compressed_from: None,
            });
        }

        let compressed = self.compress(&path, size).await?;
        Ok(GuardedFile {
            path: compressed,
            renamed_from,
            compressed_from: Some(path),
        })
    }

    async fn check_exists(&self, path: &Path) -> Result<FileInfo, GuardError> {
        let info = self.files.get_file_info(path).await?;
        if !info.is_file {
            return Err(GuardError::NotFound {
                path: path.display().to_string(),
            });
        }
        Ok(info)
    }

    /// Heuristic only: a writer that pauses longer than the interval slips through.
    async fn check_stable(&self, info: &FileInfo) -> Result<(), GuardError> {
        debug!(
            "Waiting {:?} for {} to settle",
            self.settle_interval,
            info.path.display()
        );
        tokio::time::sleep(self.settle_interval).await;

        let after = self.files.get_file_info(&info.path).await?;
        if after.modified != info.modified {
            return Err(GuardError::StillWriting {
                path: info.path.display().to_string(),
            });
        }
        Ok(())
    }

    async fn sanitize_name(&self, path: &Path) -> Result<(PathBuf, Option<PathBuf>), GuardError> {
        let original = match path.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => {
                return Err(GuardError::NotFound {
                    path: path.display().to_string(),
                })
            }
        };

        let sanitized = sanitized_name_or_fallback(&original);
        if sanitized == original {
            return Ok((path.to_path_buf(), None));
        }

        let renamed = self.files.rename_in_place(path, &sanitized).await?;
        Ok((renamed, Some(path.to_path_buf())))
    }

    async fn compress(&self, path: &Path, size: u64) -> Result<PathBuf, GuardError> {
        warn!(
            "File too large ({} bytes > {}), compressing: {}",
            size,
            self.size_limit_bytes,
            path.display()
        );

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        // An earlier run's compressed copy keeps its name; this one gets `_N`.
        let destination = self
            .files
            .ensure_unique_path(path.with_file_name(format!("{}{}", COMPRESSED_PREFIX, file_name)))
            .map_err(|e| GuardError::CompressionFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        let compressed = self
            .compressor
            .compress(path, &destination, self.target_size_kb)
            .await
            .map_err(|e| GuardError::CompressionFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        info!("Using compressed file {}", compressed.display());
        Ok(compressed)
    }
}

fn check_not_empty(info: &FileInfo) -> Result<(), GuardError> {
    if info.size == 0 {
        return Err(GuardError::EmptyFile {
            path: info.path.display().to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    const SHORT_SETTLE: Duration = Duration::from_millis(20);

    fn guard() -> GuardSequence {
        GuardSequence::new(Compressor::new("ffmpeg", "ffprobe"))
            .with_settle_interval(SHORT_SETTLE)
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = guard().run(&dir.path().join("gone.mp4")).await;
        assert!(matches!(result, Err(GuardError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_directory_is_not_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = guard().run(dir.path()).await;
        assert!(matches!(result, Err(GuardError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_empty_file_skips_stability_wait() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.mp4");
        std::fs::write(&path, b"").unwrap();

        // Would hang for an hour if the stability check were reached
        let sequence = guard().with_settle_interval(Duration::from_secs(3600));
        let result = tokio::time::timeout(Duration::from_secs(5), sequence.run(&path))
            .await
            .expect("empty file must short-circuit before the settle wait");

        assert!(matches!(result, Err(GuardError::EmptyFile { .. })));
    }

    #[tokio::test]
    async fn test_changing_file_is_rejected_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip#1!.mp4");
        std::fs::write(&path, b"still recording").unwrap();

        let writer_path = path.clone();
        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let file = std::fs::File::options()
                .write(true)
                .open(&writer_path)
                .unwrap();
            file.set_modified(SystemTime::now() - Duration::from_secs(3600))
                .unwrap();
        });

        let result = guard()
            .with_settle_interval(Duration::from_millis(500))
            .run(&path)
            .await;
        writer.await.unwrap();

        assert!(matches!(result, Err(GuardError::StillWriting { .. })));
        // Neither renamed nor compressed
        assert!(path.exists());
        assert!(!dir.path().join("clip1.mp4").exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_small_stable_file_passes_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip2.mov");
        std::fs::write(&path, vec![1u8; 5 * 1024]).unwrap();

        let guarded = guard().run(&path).await.unwrap();

        assert_eq!(
            guarded,
            GuardedFile {
                path: path.clone(),
                renamed_from: None,
                compressed_from: None,
            }
        );
    }

    #[tokio::test]
    async fn test_special_characters_trigger_rename() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip#1!.mp4");
        std::fs::write(&path, b"frames").unwrap();

        let guarded = guard().run(&path).await.unwrap();

        assert_eq!(guarded.path, dir.path().join("clip1.mp4"));
        assert_eq!(guarded.renamed_from, Some(path.clone()));
        assert!(!path.exists());
        assert_eq!(std::fs::read(&guarded.path).unwrap(), b"frames");
    }

    #[cfg(unix)]
    mod with_fake_ffmpeg {
        use super::*;
        use crate::test_support::{fake_ffmpeg, fake_ffprobe, EncoderBehavior};

        #[tokio::test]
        async fn test_oversized_file_is_compressed() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("big clip.mp4");
            std::fs::write(&path, vec![7u8; 4096]).unwrap();

            let ffprobe = fake_ffprobe(dir.path(), 120.0, Some(128_000));
            let (ffmpeg, _) = fake_ffmpeg(dir.path(), EncoderBehavior::WriteMp4);

            let guarded = GuardSequence::new(Compressor::new(ffmpeg, ffprobe))
                .with_settle_interval(SHORT_SETTLE)
                .with_size_limit(1024)
                .run(&path)
                .await
                .unwrap();

            assert_eq!(guarded.path, dir.path().join("compressed_big clip.mp4"));
            assert_eq!(guarded.compressed_from, Some(path.clone()));
            assert!(guarded.path.exists());
            assert!(path.exists());
        }

        #[tokio::test]
        async fn test_empty_encoder_output_aborts() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("big.mp4");
            std::fs::write(&path, vec![7u8; 4096]).unwrap();

            let ffprobe = fake_ffprobe(dir.path(), 120.0, Some(128_000));
            let (ffmpeg, _) = fake_ffmpeg(dir.path(), EncoderBehavior::WriteEmpty);

            let result = GuardSequence::new(Compressor::new(ffmpeg, ffprobe))
                .with_settle_interval(SHORT_SETTLE)
                .with_size_limit(1024)
                .run(&path)
                .await;

            match result {
                Err(GuardError::CompressionFailed { reason, .. }) => {
                    assert!(reason.contains("empty"), "reason: {}", reason);
                }
                other => panic!("unexpected result: {:?}", other),
            }
            assert_eq!(std::fs::read(&path).unwrap(), vec![7u8; 4096]);
            assert!(!dir.path().join("compressed_big.mp4").exists());
        }

        #[tokio::test]
        async fn test_earlier_compressed_copy_survives_failed_run() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("big.mp4");
            std::fs::write(&path, vec![7u8; 4096]).unwrap();
            let earlier = dir.path().join("compressed_big.mp4");
            std::fs::write(&earlier, b"yesterday").unwrap();

            let ffprobe = fake_ffprobe(dir.path(), 120.0, Some(128_000));
            let (ffmpeg, _) = fake_ffmpeg(dir.path(), EncoderBehavior::WriteEmpty);

            let result = GuardSequence::new(Compressor::new(ffmpeg, ffprobe))
                .with_settle_interval(SHORT_SETTLE)
                .with_size_limit(1024)
                .run(&path)
                .await;

            assert!(matches!(result, Err(GuardError::CompressionFailed { .. })));
            assert_eq!(std::fs::read(&earlier).unwrap(), b"yesterday");
            assert!(!dir.path().join("compressed_big_1.mp4").exists());
            assert_eq!(std::fs::read(&path).unwrap(), vec![7u8; 4096]);
        }

        #[tokio::test]
        async fn test_earlier_compressed_copy_is_not_overwritten() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("big.mp4");
            std::fs::write(&path, vec![7u8; 4096]).unwrap();
            let earlier = dir.path().join("compressed_big.mp4");
            std::fs::write(&earlier, b"yesterday").unwrap();

            let ffprobe = fake_ffprobe(dir.path(), 120.0, Some(128_000));
            let (ffmpeg, _) = fake_ffmpeg(dir.path(), EncoderBehavior::WriteMp4);

            let guarded = GuardSequence::new(Compressor::new(ffmpeg, ffprobe))
                .with_settle_interval(SHORT_SETTLE)
                .with_size_limit(1024)
                .run(&path)
                .await
                .unwrap();

            assert_eq!(guarded.path, dir.path().join("compressed_big_1.mp4"));
            assert!(std::fs::metadata(&guarded.path).unwrap().len() > 0);
            assert_eq!(std::fs::read(&earlier).unwrap(), b"yesterday");
        }
    }
}

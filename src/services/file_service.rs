use crate::constants::{MAX_UNIQUE_NAME_ATTEMPTS, VIDEO_EXTENSIONS};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FileError {
    #[error("File not found: {path}")]
    NotFound { path: String },
    #[error("Not a directory: {path}")]
    NotADirectory { path: String },
    #[error("No free name left for {path}")]
    NoFreeName { path: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Default)]
pub struct FileService;

impl FileService {
    pub fn new() -> Self {
        Self
    }

    /// Most recently modified video in `directory` (not recursive).
    pub async fn find_latest_video(&self, directory: &Path) -> Result<Option<FileInfo>, FileError> {
        let metadata = match tokio::fs::metadata(directory).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FileError::NotFound {
                    path: directory.display().to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        if !metadata.is_dir() {
            return Err(FileError::NotADirectory {
                path: directory.display().to_string(),
            });
        }

        let mut entries = tokio::fs::read_dir(directory).await?;
        let mut latest: Option<FileInfo> = None;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !is_video_file(&path) {
                continue;
            }

            let info = match self.get_file_info(&path).await {
                Ok(info) if info.is_file => info,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!("Skipping {:?}: {}", path, e);
                    continue;
                }
            };

            let newer = match (&latest, info.modified) {
                (None, _) => true,
                (Some(current), Some(modified)) => {
                    current.modified.map_or(true, |current| modified > current)
                }
                (Some(_), None) => false,
            };
            if newer {
                latest = Some(info);
            }
        }

        Ok(latest)
    }

    pub async fn get_file_info(&self, path: &Path) -> Result<FileInfo, FileError> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FileError::NotFound {
                    path: path.display().to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        Ok(FileInfo {
            path: path.to_path_buf(),
            size: metadata.len(),
            modified: metadata.modified().ok(),
            is_file: metadata.is_file(),
        })
    }

    /// Renames `path` to `new_name` in the same directory. An existing file
    /// with that name is never overwritten; a numbered variant is used instead.
    pub async fn rename_in_place(&self, path: &Path, new_name: &str) -> Result<PathBuf, FileError> {
        let parent = path.parent().unwrap_or(Path::new("."));
        let target = self.ensure_unique_path(parent.join(new_name))?;

        tokio::fs::rename(path, &target).await?;
        tracing::info!("Renamed {:?} -> {:?}", path, target);
        Ok(target)
    }

    /// `path` itself when it is free, otherwise the first free `stem_N.ext`.
    pub fn ensure_unique_path(&self, path: PathBuf) -> Result<PathBuf, FileError> {
        if !path.exists() {
            return Ok(path);
        }

        let parent = path.parent().unwrap_or(Path::new(".")).to_path_buf();
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("video");
        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");

        for counter in 1..=MAX_UNIQUE_NAME_ATTEMPTS {
            let new_name = if extension.is_empty() {
                format!("{}_{}", stem, counter)
            } else {
                format!("{}_{}.{}", stem, counter, extension)
            };

            let new_path = parent.join(new_name);

            if !new_path.exists() {
                return Ok(new_path);
            }
        }

        Err(FileError::NoFreeName {
            path: path.display().to_string(),
        })
    }
}

pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[derive(Debug, Clone)]
pub struct FileInfo {
    pub path: PathBuf,
    pub size: u64,
    pub modified: Option<SystemTime>,
    pub is_file: bool,
}

impl FileInfo {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn size_human_readable(&self) -> String {
        let size = self.size as f64;
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

        let mut size = size;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.1} {}", size, UNITS[unit_index])
        }
    }
}

use crate::constants::{
    AUDIO_CODEC, CONTAINER_OVERHEAD_FACTOR, MAX_AUDIO_BITRATE, MIN_AUDIO_BITRATE,
    MIN_VIDEO_BITRATE, NULL_SINK, PASS_LOG_PREFIX, PASS_ONE_FORMAT, VIDEO_CODEC,
};
use crate::probe::{probe_media, MediaProbe, ProbeError};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{info, instrument, warn};

#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("could not probe source: {0}")]
    Probe(#[from] ProbeError),
    #[error("invalid duration: {duration} seconds")]
    InvalidDuration { duration: f64 },
    #[error("size budget too small: video bitrate would be {video_bitrate:.0} bit/s")]
    BudgetTooSmall { video_bitrate: f64 },
    #[error("could not start ffmpeg for pass {pass}: {source}")]
    EncoderSpawn {
        pass: u8,
        #[source]
        source: std::io::Error,
    },
    #[error("ffmpeg pass {pass} failed ({status}): {stderr}")]
    EncoderFailed {
        pass: u8,
        status: String,
        stderr: String,
    },
    #[error("output file already exists: {path}")]
    OutputExists { path: String },
    #[error("encoder produced no output file: {path}")]
    MissingOutput { path: String },
    #[error("encoder produced an empty file: {path}")]
    EmptyOutput { path: String },
    #[error("encoder output is not a video ({mime}): {path}")]
    NotVideo { path: String, mime: String },
    #[error("{tool} not found or not accessible")]
    ToolUnavailable { tool: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// What the probe said about the source's audio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourceAudio {
    /// No audio stream at all; the output is encoded without audio.
    Absent,
    /// An audio stream whose bitrate the container does not report.
    Unknown,
    Bitrate(f64),
}

impl From<&MediaProbe> for SourceAudio {
    fn from(probe: &MediaProbe) -> Self {
        match &probe.audio {
            None => SourceAudio::Absent,
            Some(audio) => audio
                .bitrate
                .map(SourceAudio::Bitrate)
                .unwrap_or(SourceAudio::Unknown),
        }
    }
}

/// Per-stream bitrates, in bits per second, for a size-targeted encode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BitratePlan {
    pub total_bitrate: f64,
    pub audio_bitrate: f64,
    pub video_bitrate: f64,
    pub include_audio: bool,
}

impl BitratePlan {
    pub fn compute(
        target_size_kb: u64,
        duration_secs: f64,
        source_audio: SourceAudio,
    ) -> Result<Self, CompressionError> {
        if !duration_secs.is_finite() || duration_secs <= 0.0 {
            return Err(CompressionError::InvalidDuration {
                duration: duration_secs,
            });
        }

        let total_bitrate = target_total_bitrate(target_size_kb, duration_secs);

        let (audio_bitrate, include_audio) = match source_audio {
            SourceAudio::Absent => (0.0, false),
            SourceAudio::Unknown => (clamp_audio_bitrate(total_bitrate / 10.0), true),
            // Source audio that already fits the budget is kept as is, even
            // outside the clamp bounds.
            SourceAudio::Bitrate(source) if 10.0 * source > total_bitrate => {
                (clamp_audio_bitrate(total_bitrate / 10.0), true)
            }
            SourceAudio::Bitrate(source) => (source, true),
        };

        let video_bitrate = total_bitrate - audio_bitrate;
        if video_bitrate < MIN_VIDEO_BITRATE {
            return Err(CompressionError::BudgetTooSmall { video_bitrate });
        }

        Ok(Self {
            total_bitrate,
            audio_bitrate,
            video_bitrate,
            include_audio,
        })
    }

    pub fn video_bitrate_arg(&self) -> String {
        format!("{}", self.video_bitrate.round() as u64)
    }

    pub fn audio_bitrate_arg(&self) -> String {
        format!("{}", self.audio_bitrate.round() as u64)
    }
}

/// Bits per second that fit `target_size_kb` into `duration_secs`, leaving
/// headroom for container overhead.
pub fn target_total_bitrate(target_size_kb: u64, duration_secs: f64) -> f64 {
    (target_size_kb as f64 * 1024.0 * 8.0) / (CONTAINER_OVERHEAD_FACTOR * duration_secs)
}

pub fn clamp_audio_bitrate(bitrate: f64) -> f64 {
    bitrate.clamp(MIN_AUDIO_BITRATE, MAX_AUDIO_BITRATE)
}

/// Two-pass, size-targeted H.264/AAC encoder driven through the ffmpeg CLI.
#[derive(Debug, Clone)]
pub struct Compressor {
    ffmpeg: String,
    ffprobe: String,
}

impl Compressor {
    pub fn new(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    pub async fn check_available(&self) -> Result<(), CompressionError> {
        for tool in [&self.ffmpeg, &self.ffprobe] {
            let available = match Command::new(tool)
                .arg("-version")
                .stdin(Stdio::null())
                .output()
                .await
            {
                Ok(output) => output.status.success(),
                Err(_) => false,
            };

            if !available {
                return Err(CompressionError::ToolUnavailable { tool: tool.clone() });
            }
        }

        Ok(())
    }

    /// Encodes `source` into `destination` aiming for `target_size_kb`.
    ///
    /// `destination` must not exist yet. It only survives if both passes exit
    /// cleanly and the result looks like a non-empty video; otherwise it is
    /// removed and the source is left untouched.
    pub async fn compress(
        &self,
        source: &Path,
        destination: &Path,
        target_size_kb: u64,
    ) -> Result<PathBuf, CompressionError> {
        // ffmpeg runs with -y and failures remove the destination, so it must
        // not name anything that already exists.
        if tokio::fs::try_exists(destination).await? {
            return Err(CompressionError::OutputExists {
                path: destination.display().to_string(),
            });
        }

        let probe = probe_media(&self.ffprobe, source).await?;
        let plan = BitratePlan::compute(
            target_size_kb,
            probe.duration_secs,
            SourceAudio::from(&probe),
        )?;

        info!(
            "Compressing {} ({:.1}s) to ~{} KB: video {:.0} bit/s, audio {}",
            source.display(),
            probe.duration_secs,
            target_size_kb,
            plan.video_bitrate,
            if plan.include_audio {
                format!("{:.0} bit/s", plan.audio_bitrate)
            } else {
                "none".to_string()
            }
        );

        // Pass-1 stats live here and go away with the directory.
        let pass_dir = tempfile::tempdir()?;
        let log_prefix = pass_dir.path().join(PASS_LOG_PREFIX);

        let result = self
            .run_two_pass(source, destination, &plan, &log_prefix)
            .await;
        let result = match result {
            Ok(()) => verify_output(destination).await,
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            if destination.exists() {
                if let Err(remove_err) = tokio::fs::remove_file(destination).await {
                    warn!(
                        "Failed to remove partial output {:?}: {}",
                        destination, remove_err
                    );
                }
            }
            warn!("Compression of {} failed: {}", source.display(), e);
        } else {
            info!("Video compressed successfully: {}", destination.display());
        }

        result.map(|()| destination.to_path_buf())
    }

    async fn run_two_pass(
        &self,
        source: &Path,
        destination: &Path,
        plan: &BitratePlan,
        log_prefix: &Path,
    ) -> Result<(), CompressionError> {
        self.run_pass(1, pass_one_args(source, plan, log_prefix))
            .await?;
        self.run_pass(2, pass_two_args(source, destination, plan, log_prefix))
            .await
    }

    #[instrument(skip(self, args))]
    async fn run_pass(&self, pass: u8, args: Vec<OsString>) -> Result<(), CompressionError> {
        let output = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| CompressionError::EncoderSpawn { pass, source })?;

        if output.status.success() {
            return Ok(());
        }

        Err(CompressionError::EncoderFailed {
            pass,
            status: output.status.to_string(),
            stderr: stderr_tail(&String::from_utf8_lossy(&output.stderr), 5),
        })
    }
}

/// Last `count` non-empty lines of ffmpeg's stderr.
fn stderr_tail(stderr: &str, count: usize) -> String {
    // Progress updates are separated by \r, not \n
    let lines: Vec<&str> = stderr
        .split(['\r', '\n'])
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .collect();
    lines[lines.len().saturating_sub(count)..].join("\n")
}

fn common_args(source: &Path, plan: &BitratePlan, pass: u8, log_prefix: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-nostdin", "-y", "-hide_banner", "-i"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(source.as_os_str().to_owned());
    for arg in ["-c:v", VIDEO_CODEC, "-b:v"] {
        args.push(arg.into());
    }
    args.push(plan.video_bitrate_arg().into());
    args.push("-pass".into());
    args.push(pass.to_string().into());
    args.push("-passlogfile".into());
    args.push(log_prefix.as_os_str().to_owned());
    args
}

/// Analysis pass: video only, output thrown away.
fn pass_one_args(source: &Path, plan: &BitratePlan, log_prefix: &Path) -> Vec<OsString> {
    let mut args = common_args(source, plan, 1, log_prefix);
    for arg in ["-an", "-f", PASS_ONE_FORMAT, NULL_SINK] {
        args.push(arg.into());
    }
    args
}

fn pass_two_args(
    source: &Path,
    destination: &Path,
    plan: &BitratePlan,
    log_prefix: &Path,
) -> Vec<OsString> {
    let mut args = common_args(source, plan, 2, log_prefix);
    if plan.include_audio {
        args.push("-c:a".into());
        args.push(AUDIO_CODEC.into());
        args.push("-b:a".into());
        args.push(plan.audio_bitrate_arg().into());
    } else {
        args.push("-an".into());
    }
    args.push(destination.as_os_str().to_owned());
    args
}

async fn verify_output(path: &Path) -> Result<(), CompressionError> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(CompressionError::MissingOutput {
                path: path.display().to_string(),
            })
        }
        Err(e) => return Err(e.into()),
    };

    if metadata.len() == 0 {
        return Err(CompressionError::EmptyOutput {
            path: path.display().to_string(),
        });
    }

    let mut header = Vec::with_capacity(8192);
    tokio::fs::File::open(path)
        .await?
        .take(8192)
        .read_to_end(&mut header)
        .await?;

    // Unknown signatures are trusted; only a positive non-video match fails.
    if let Some(kind) = infer::get(&header) {
        if !kind.mime_type().starts_with("video/") {
            return Err(CompressionError::NotVideo {
                path: path.display().to_string(),
                mime: kind.mime_type().to_string(),
            });
        }
    }

    Ok(())
}

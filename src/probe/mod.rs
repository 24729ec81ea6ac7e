use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("ffprobe could not be started: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("ffprobe failed: {stderr}")]
    Failed { stderr: String },
    #[error("could not parse ffprobe output: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("media has no usable duration")]
    MissingDuration,
}

/// The bits of ffprobe output the compressor needs.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaProbe {
    pub duration_secs: f64,
    pub audio: Option<AudioInfo>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioInfo {
    pub codec_name: Option<String>,
    /// Not every container reports a per-stream bitrate (Matroska usually doesn't).
    pub bitrate: Option<f64>,
}

impl MediaProbe {
    pub fn audio_bitrate(&self) -> Option<f64> {
        self.audio.as_ref().and_then(|audio| audio.bitrate)
    }
}

#[derive(Debug, Deserialize)]
struct FFProbeOutput {
    #[serde(default)]
    format: Option<FFProbeFormat>,
    #[serde(default)]
    streams: Vec<FFProbeStream>,
}

#[derive(Debug, Deserialize)]
struct FFProbeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FFProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    bit_rate: Option<String>,
}

#[instrument(skip(ffprobe))]
pub async fn probe_media(ffprobe: &str, path: &Path) -> Result<MediaProbe, ProbeError> {
    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(ProbeError::Spawn)?;

    if !output.status.success() {
        return Err(ProbeError::Failed {
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let probe = parse_probe_output(&output.stdout)?;
    debug!(
        duration_secs = probe.duration_secs,
        audio_codec = ?probe.audio.as_ref().and_then(|audio| audio.codec_name.as_deref()),
        audio_bitrate = ?probe.audio_bitrate(),
        "Probed media"
    );
    Ok(probe)
}

fn parse_probe_output(json: &[u8]) -> Result<MediaProbe, ProbeError> {
    let parsed: FFProbeOutput = serde_json::from_slice(json)?;

    let duration_secs = parsed
        .format
        .and_then(|format| format.duration)
        .and_then(|duration| duration.trim().parse::<f64>().ok())
        .filter(|duration| duration.is_finite() && *duration > 0.0)
        .ok_or(ProbeError::MissingDuration)?;

    let audio = parsed
        .streams
        .into_iter()
        .find(|stream| stream.codec_type.as_deref() == Some("audio"))
        .map(|stream| {
            let bitrate = stream
                .bit_rate
                .as_deref()
                .and_then(|rate| rate.trim().parse::<f64>().ok());
            if bitrate.is_none() {
                warn!("Audio stream does not report a bitrate");
            }
            AudioInfo {
                codec_name: stream.codec_name,
                bitrate,
            }
        });

    Ok(MediaProbe {
        duration_secs,
        audio,
    })
}

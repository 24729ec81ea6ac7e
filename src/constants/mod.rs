// App Constants
pub const APP_NAME: &str = "vidrelay";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// File handling
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv"];
pub const COMPRESSED_PREFIX: &str = "compressed_";
pub const MAX_UNIQUE_NAME_ATTEMPTS: u32 = 1000;
pub const FALLBACK_NAME_PREFIX: &str = "video_";

// Guard sequence
pub const SETTLE_INTERVAL_SECS: u64 = 5;
pub const UPLOAD_SIZE_LIMIT_BYTES: u64 = 10 * 1024 * 1024; // 10 MiB
pub const TARGET_SIZE_KB: u64 = 10_000;

// Bitrate budgeting (bits per second)
pub const MIN_AUDIO_BITRATE: f64 = 32_000.0;
pub const MAX_AUDIO_BITRATE: f64 = 256_000.0;
pub const MIN_VIDEO_BITRATE: f64 = 16_000.0;
pub const CONTAINER_OVERHEAD_FACTOR: f64 = 1.073741824;

// FFmpeg
pub const VIDEO_CODEC: &str = "libx264";
pub const AUDIO_CODEC: &str = "aac";
pub const PASS_ONE_FORMAT: &str = "mp4";
pub const PASS_LOG_PREFIX: &str = "ffmpeg2pass";

#[cfg(windows)]
pub const NULL_SINK: &str = "NUL";
#[cfg(not(windows))]
pub const NULL_SINK: &str = "/dev/null";

// Chat
pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";
pub const DEFAULT_READY_TIMEOUT_SECS: u64 = 30;
pub const READY_POLL_INTERVAL_MS: u64 = 1000;
pub const HTTP_TIMEOUT_SECONDS: u64 = 300;

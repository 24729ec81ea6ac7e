//! Fixtures shared by the unit tests.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy)]
pub enum EncoderBehavior {
    WriteMp4,
    WriteEmpty,
    WriteMp4ThenFail,
}

// ftyp box with an isom brand; enough for `infer` to call it video/mp4
const MP4_HEADER_PRINTF: &str =
    r"\000\000\000\040ftypisom\000\000\002\000isomiso2avc1mp41\000\000\000\010free";

#[cfg(unix)]
fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    {
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(format!("#!/bin/sh\n{}\n", body).as_bytes())
            .unwrap();
        file.sync_all().unwrap();
    }
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// An ffprobe stand-in that always reports the given duration and audio bitrate.
#[cfg(unix)]
pub fn fake_ffprobe(dir: &Path, duration_secs: f64, audio_bitrate: Option<u64>) -> String {
    let mut streams = vec![r#"{"codec_type": "video", "codec_name": "h264"}"#.to_string()];
    if let Some(bitrate) = audio_bitrate {
        streams.push(format!(
            r#"{{"codec_type": "audio", "codec_name": "aac", "bit_rate": "{}"}}"#,
            bitrate
        ));
    }
    let json = format!(
        r#"{{"streams": [{}], "format": {{"duration": "{}"}}}}"#,
        streams.join(", "),
        duration_secs
    );
    let body = format!("cat <<'JSON'\n{}\nJSON", json);
    write_script(dir, "fake-ffprobe", &body)
        .to_string_lossy()
        .into_owned()
}

/// An ffmpeg stand-in that writes to its last argument and logs every call,
/// one line per invocation, to the returned file.
#[cfg(unix)]
pub fn fake_ffmpeg(dir: &Path, behavior: EncoderBehavior) -> (String, PathBuf) {
    let calls = dir.join("ffmpeg-calls.log");
    let write = match behavior {
        EncoderBehavior::WriteMp4 | EncoderBehavior::WriteMp4ThenFail => {
            format!("printf '{}' > \"$last\"", MP4_HEADER_PRINTF)
        }
        EncoderBehavior::WriteEmpty => ": > \"$last\"".to_string(),
    };
    let fail = match behavior {
        EncoderBehavior::WriteMp4ThenFail => {
            "case \"$*\" in *\"-pass 2\"*) echo 'encoder exploded' >&2; exit 1;; esac"
        }
        _ => "",
    };
    let body = format!(
        "echo \"$*\" >> '{}'\nfor last; do :; done\n{}\n{}\nexit 0",
        calls.display(),
        write,
        fail
    );
    let path = write_script(dir, "fake-ffmpeg", &body);
    (path.to_string_lossy().into_owned(), calls)
}

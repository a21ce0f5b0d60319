//! FFprobe container information.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::process::Command;

use vgen_models::artifact::EXPIRY_TAG_KEY;
use vgen_models::parse_expiry_tag;

use crate::error::{MediaError, MediaResult};

/// Container-level information from `-show_format`.
#[derive(Debug, Clone, Default)]
pub struct FormatInfo {
    /// Demuxer name(s), e.g. "mov,mp4,m4a,3gp,3g2,mj2"
    pub format_name: Option<String>,
    /// Duration in seconds
    pub duration: Option<f64>,
    /// File size in bytes
    pub size: Option<u64>,
    pub nb_streams: u32,
    /// Container tags, keys as reported by the demuxer
    pub tags: HashMap<String, String>,
}

impl FormatInfo {
    /// Look up a tag ignoring key case (Matroska reports `COMMENT`).
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Expiry recovered from the comment tag.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.tag(EXPIRY_TAG_KEY).and_then(parse_expiry_tag)
    }
}

/// Per-stream summary from `-show_streams`.
#[derive(Debug, Clone, Default)]
pub struct StreamSummary {
    pub video_streams: usize,
    pub audio_streams: usize,
    /// Container duration in seconds
    pub duration: f64,
    pub width: u32,
    pub height: u32,
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
    size: Option<String>,
    nb_streams: Option<u32>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

/// Upper bound on a single ffprobe invocation.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// FFprobe wrapper.
#[derive(Debug, Clone)]
pub struct Ffprobe {
    binary: String,
    /// The child is killed once this elapses
    timeout: Duration,
}

impl Default for Ffprobe {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

impl Ffprobe {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Read container information and tags.
    pub async fn probe_format(&self, path: impl AsRef<Path>) -> MediaResult<FormatInfo> {
        let probe = self.run(path.as_ref(), &["-show_format"]).await?;
        let format = probe
            .format
            .ok_or_else(|| MediaError::ffprobe_failed("no format section in output", None))?;
        Ok(parse_format(format))
    }

    /// Count streams and read basic geometry.
    pub async fn probe_streams(&self, path: impl AsRef<Path>) -> MediaResult<StreamSummary> {
        let probe = self.run(path.as_ref(), &["-show_format", "-show_streams"]).await?;

        let count = |kind: &str| {
            probe
                .streams
                .iter()
                .filter(|s| s.codec_type.as_deref() == Some(kind))
                .count()
        };
        let video = probe
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"));

        Ok(StreamSummary {
            video_streams: count("video"),
            audio_streams: count("audio"),
            duration: probe
                .format
                .as_ref()
                .and_then(|f| f.duration.as_ref())
                .and_then(|d| d.parse().ok())
                .unwrap_or(0.0),
            width: video.and_then(|v| v.width).unwrap_or(0),
            height: video.and_then(|v| v.height).unwrap_or(0),
        })
    }

    async fn run(&self, path: &Path, sections: &[&str]) -> MediaResult<FfprobeOutput> {
        if !tokio::fs::try_exists(path).await? {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }

        let run = Command::new(&self.binary)
            .args(["-v", "quiet", "-print_format", "json"])
            .args(sections)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| MediaError::ffprobe_failed(format!("timed out after {:?}", self.timeout), None))?
            .map_err(|source| MediaError::SpawnFailed {
                binary: self.binary.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(MediaError::ffprobe_failed(
                format!("exited with {}", output.status),
                Some(String::from_utf8_lossy(&output.stderr).to_string()),
            ));
        }

        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

fn parse_format(format: FfprobeFormat) -> FormatInfo {
    FormatInfo {
        format_name: format.format_name,
        duration: format.duration.as_ref().and_then(|d| d.parse().ok()),
        size: format.size.as_ref().and_then(|s| s.parse().ok()),
        nb_streams: format.nb_streams.unwrap_or(0),
        tags: format.tags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const MP4_OUTPUT: &str = r#"{
        "format": {
            "filename": "/tmp/vgen/video_640x360_d5s_1760616000000000_deadbeef.mp4",
            "nb_streams": 2,
            "format_name": "mov,mp4,m4a,3gp,3g2,mj2",
            "duration": "5.000000",
            "size": "48213",
            "tags": {
                "major_brand": "isom",
                "encoder": "Lavf60.16.100",
                "comment": "expires=2026-10-16T13:00:00Z"
            }
        }
    }"#;

    #[test]
    fn test_parse_format_output() {
        let probe: FfprobeOutput = serde_json::from_str(MP4_OUTPUT).unwrap();
        let info = parse_format(probe.format.unwrap());

        assert_eq!(info.nb_streams, 2);
        assert_eq!(info.size, Some(48213));
        assert!((info.duration.unwrap() - 5.0).abs() < 0.001);
        assert_eq!(
            info.expires_at(),
            Some(Utc.with_ymd_and_hms(2026, 10, 16, 13, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_tag_lookup_ignores_case() {
        let mut info = FormatInfo::default();
        info.tags
            .insert("COMMENT".to_string(), "expires=2026-10-16T13:00:00Z".to_string());
        assert!(info.expires_at().is_some());
        assert_eq!(info.tag("Comment"), Some("expires=2026-10-16T13:00:00Z"));
    }

    #[test]
    fn test_missing_tags() {
        let probe: FfprobeOutput =
            serde_json::from_str(r#"{"format": {"format_name": "matroska,webm"}}"#).unwrap();
        let info = parse_format(probe.format.unwrap());
        assert!(info.tags.is_empty());
        assert_eq!(info.expires_at(), None);
    }

    #[tokio::test]
    async fn test_probe_missing_file() {
        let err = Ffprobe::default()
            .probe_format("/nonexistent/video.mp4")
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hung_metadata_read_times_out() {
        let tmp = tempfile::TempDir::new().unwrap();
        let video = tmp.path().join("video.mp4");
        std::fs::write(&video, b"fake video").unwrap();
        let binary = crate::test_support::fake_encoder(tmp.path(), "exec sleep 30");

        let ffprobe = Ffprobe::new(binary.to_string_lossy()).with_timeout(Duration::from_millis(200));
        let started = std::time::Instant::now();
        let err = ffprobe.probe_format(&video).await.unwrap_err();

        assert!(matches!(err, MediaError::FfprobeFailed { .. }), "got {:?}", err);
        assert!(err.to_string().contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}

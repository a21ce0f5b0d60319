//! Artifact naming and expiry tagging.
//!
//! Artifact file names follow `video_{W}x{H}_d{D}s_{MICROS}_{NONCE}.{EXT}`.
//! The expiry lives inside the container as a `comment` tag so it can be
//! recovered without any side index.

use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Duration, SecondsFormat, TimeZone, Utc};
use regex::Regex;
use uuid::Uuid;

use crate::encoding::OutputFormat;
use crate::request::ValidatedRequest;

/// Prefix shared by every artifact file name.
pub const ARTIFACT_PREFIX: &str = "video_";
/// Container tag holding the expiry.
pub const EXPIRY_TAG_KEY: &str = "comment";
/// Marker in front of the timestamp inside the tag value.
pub const EXPIRY_TAG_MARKER: &str = "expires=";
/// Default validity window (1 hour).
pub const DEFAULT_VALIDITY_WINDOW_SECS: u64 = 3600;

static ARTIFACT_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^video_(\d+)x(\d+)_d(\d+)s_(\d+)_([0-9a-f]{8})\.([a-z0-9]+)$")
        .expect("artifact name pattern is valid")
});

/// Parsed or freshly allocated artifact file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactName {
    pub width: u32,
    pub height: u32,
    pub duration_secs: u32,
    pub created_at: DateTime<Utc>,
    pub nonce: String,
    pub format: OutputFormat,
}

impl ArtifactName {
    /// Allocate a new unique name for `request` created at `created_at`.
    pub fn allocate(request: &ValidatedRequest, created_at: DateTime<Utc>) -> Self {
        let nonce = Uuid::new_v4().simple().to_string()[..8].to_string();
        Self {
            width: request.width(),
            height: request.height(),
            duration_secs: request.duration_secs(),
            created_at: truncate_to_micros(created_at),
            nonce,
            format: request.format(),
        }
    }

    /// Parse a file name; `None` for anything that is not an artifact.
    pub fn parse(file_name: &str) -> Option<Self> {
        let caps = ARTIFACT_NAME.captures(file_name)?;
        let micros: i64 = caps[4].parse().ok()?;
        let created_at = Utc.timestamp_micros(micros).single()?;

        Some(Self {
            width: caps[1].parse().ok()?,
            height: caps[2].parse().ok()?,
            duration_secs: caps[3].parse().ok()?,
            created_at,
            nonce: caps[5].to_string(),
            format: caps[6].parse().ok()?,
        })
    }

    /// File name on disk.
    pub fn file_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}x{}_d{}s_{}_{}.{}",
            ARTIFACT_PREFIX,
            self.width,
            self.height,
            self.duration_secs,
            self.created_at.timestamp_micros(),
            self.nonce,
            self.format.extension()
        )
    }
}

fn truncate_to_micros(t: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_micros(t.timestamp_micros()).single().unwrap_or(t)
}

/// Expiry = creation + validity window, at the second precision the tag keeps.
pub fn expiry_for(created_at: DateTime<Utc>, validity_window: Duration) -> DateTime<Utc> {
    let expires = created_at + validity_window;
    Utc.timestamp_opt(expires.timestamp(), 0).single().unwrap_or(expires)
}

/// Encode an expiry into the tag value written by the encoder.
pub fn format_expiry_tag(expires_at: DateTime<Utc>) -> String {
    format!(
        "{}{}",
        EXPIRY_TAG_MARKER,
        expires_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

/// Decode a tag value. Accepts `expires=<rfc3339>` or a bare RFC 3339 value.
pub fn parse_expiry_tag(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    let raw = value.strip_prefix(EXPIRY_TAG_MARKER).unwrap_or(value);
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Lifecycle state of an artifact as seen by the sweeper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactState {
    /// Expiry is in the future.
    Fresh,
    /// Expiry is in the past; eligible for deletion.
    Expired,
    /// Expiry could not be recovered.
    Unknown,
}

impl ArtifactState {
    /// Pure expiry decision. Equal timestamps are still fresh.
    pub fn classify(now: DateTime<Utc>, expires_at: Option<DateTime<Utc>>) -> Self {
        match expires_at {
            Some(expires_at) if expires_at < now => ArtifactState::Expired,
            Some(_) => ArtifactState::Fresh,
            None => ArtifactState::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{GenerationRequest, RequestLimits};

    fn request() -> ValidatedRequest {
        GenerationRequest::new(640, 360, 5, OutputFormat::Mp4, true)
            .validate_with(&RequestLimits::default())
            .unwrap()
    }

    #[test]
    fn test_name_roundtrip() {
        let created = Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap();
        let name = ArtifactName::allocate(&request(), created);
        let file_name = name.file_name();

        assert!(file_name.starts_with("video_640x360_d5s_"));
        assert!(file_name.ends_with(".mp4"));
        assert_eq!(ArtifactName::parse(&file_name), Some(name));
    }

    #[test]
    fn test_identical_requests_do_not_collide() {
        let created = Utc::now();
        let a = ArtifactName::allocate(&request(), created);
        let b = ArtifactName::allocate(&request(), created);
        assert_ne!(a.file_name(), b.file_name());

        let later = ArtifactName::allocate(&request(), created + Duration::microseconds(1));
        assert_ne!(a.created_at, later.created_at);
    }

    #[test]
    fn test_parse_rejects_foreign_files() {
        assert!(ArtifactName::parse("notes.txt").is_none());
        assert!(ArtifactName::parse("video_640x360.mp4").is_none());
        assert!(ArtifactName::parse(".vgen-write-probe-1234").is_none());
        assert!(ArtifactName::parse("video_640x360_d5s_1700000000000000_deadbeef.gif").is_none());
        assert!(ArtifactName::parse("video_640x360_d5s_1700000000000000_deadbeef.mp4.part").is_none());
        assert!(ArtifactName::parse("video_640x360_d5s_1700000000000000_deadbeef.mp4").is_some());
    }

    #[test]
    fn test_expiry_tag_roundtrip() {
        let created = Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap()
            + Duration::milliseconds(750);
        let expires = expiry_for(created, Duration::seconds(3600));

        assert_eq!(expires, Utc.with_ymd_and_hms(2026, 10, 16, 13, 0, 0).unwrap());

        let tag = format_expiry_tag(expires);
        assert_eq!(tag, "expires=2026-10-16T13:00:00Z");
        assert_eq!(parse_expiry_tag(&tag), Some(expires));
        assert_eq!(parse_expiry_tag("2026-10-16T13:00:00+00:00"), Some(expires));
        assert_eq!(parse_expiry_tag("expires=soon"), None);
        assert_eq!(parse_expiry_tag(""), None);
    }

    #[test]
    fn test_classify() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap();
        let window = Duration::minutes(60);

        let old = expiry_for(now - Duration::minutes(61), window);
        let recent = expiry_for(now - Duration::minutes(59), window);

        assert_eq!(ArtifactState::classify(now, Some(old)), ArtifactState::Expired);
        assert_eq!(ArtifactState::classify(now, Some(recent)), ArtifactState::Fresh);
        assert_eq!(ArtifactState::classify(now, Some(now)), ArtifactState::Fresh);
        assert_eq!(ArtifactState::classify(now, None), ArtifactState::Unknown);
    }
}

//! Generation request and its validation.
//!
//! [`GenerationRequest`] is the wire form posted by clients. It only becomes
//! usable once [`GenerationRequest::validate_with`] has turned it into a
//! [`ValidatedRequest`]; the renderer accepts nothing else.

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use validator::Validate;

use crate::encoding::OutputFormat;

/// Default maximum clip duration (seconds).
pub const DEFAULT_MAX_DURATION_SECS: u32 = 300;
/// Default maximum width or height (pixels).
pub const DEFAULT_MAX_DIMENSION: u32 = 3840;

/// Request for one placeholder video.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    /// Width in pixels
    #[serde(deserialize_with = "lenient_integer")]
    #[validate(range(min = 1, message = "width must be a positive integer"))]
    pub width: i64,

    /// Height in pixels
    #[serde(deserialize_with = "lenient_integer")]
    #[validate(range(min = 1, message = "height must be a positive integer"))]
    pub height: i64,

    /// Duration in seconds
    #[serde(deserialize_with = "lenient_integer")]
    #[validate(range(min = 1, message = "duration must be a positive integer"))]
    pub duration: i64,

    /// Container extension (mp4, webm, ...)
    #[serde(default = "default_format")]
    #[validate(length(min = 1, message = "format must not be empty"))]
    pub format: String,

    /// Add a sine tone audio track
    #[serde(default, deserialize_with = "lenient_bool")]
    pub audio_enabled: bool,
}

fn default_format() -> String {
    OutputFormat::Mp4.extension().to_string()
}

/// Limits applied during validation.
#[derive(Debug, Clone)]
pub struct RequestLimits {
    pub max_duration_secs: u32,
    pub max_dimension: u32,
    pub allowed_formats: Vec<OutputFormat>,
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            max_duration_secs: DEFAULT_MAX_DURATION_SECS,
            max_dimension: DEFAULT_MAX_DIMENSION,
            allowed_formats: OutputFormat::ALL.to_vec(),
        }
    }
}

/// Request validation error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("Invalid request: {0}")]
    Invalid(String),

    #[error("{axis} {value} exceeds the maximum of {max} pixels")]
    DimensionTooLarge {
        axis: &'static str,
        value: i64,
        max: u32,
    },

    #[error("{axis} must be even, got {value}")]
    OddDimension { axis: &'static str, value: i64 },

    #[error("Duration {requested}s exceeds the maximum of {max}s")]
    DurationTooLong { requested: i64, max: u32 },

    #[error("Unsupported format '{0}'")]
    UnsupportedFormat(String),

    #[error("Format '{0}' is not enabled on this server")]
    FormatNotAllowed(OutputFormat),
}

impl GenerationRequest {
    /// Build a request from typed values.
    pub fn new(width: u32, height: u32, duration: u32, format: OutputFormat, audio_enabled: bool) -> Self {
        Self {
            width: width.into(),
            height: height.into(),
            duration: duration.into(),
            format: format.extension().to_string(),
            audio_enabled,
        }
    }

    /// Check every field against `limits`.
    pub fn validate_with(&self, limits: &RequestLimits) -> Result<ValidatedRequest, RequestError> {
        self.validate()
            .map_err(|e| RequestError::Invalid(e.to_string()))?;

        let width = check_dimension("width", self.width, limits.max_dimension)?;
        let height = check_dimension("height", self.height, limits.max_dimension)?;

        if self.duration > i64::from(limits.max_duration_secs) {
            return Err(RequestError::DurationTooLong {
                requested: self.duration,
                max: limits.max_duration_secs,
            });
        }

        let format: OutputFormat = self
            .format
            .parse()
            .map_err(|_| RequestError::UnsupportedFormat(self.format.clone()))?;

        if !limits.allowed_formats.contains(&format) {
            return Err(RequestError::FormatNotAllowed(format));
        }

        Ok(ValidatedRequest {
            width,
            height,
            // Bounded by max_duration_secs above
            duration_secs: self.duration as u32,
            format,
            audio_enabled: self.audio_enabled,
        })
    }
}

fn check_dimension(axis: &'static str, value: i64, max: u32) -> Result<u32, RequestError> {
    if value > i64::from(max) {
        return Err(RequestError::DimensionTooLarge { axis, value, max });
    }
    // yuv420p subsamples chroma 2x2
    if value % 2 != 0 {
        return Err(RequestError::OddDimension { axis, value });
    }
    Ok(value as u32)
}

/// A request whose fields have been checked against [`RequestLimits`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedRequest {
    width: u32,
    height: u32,
    duration_secs: u32,
    format: OutputFormat,
    audio_enabled: bool,
}

impl ValidatedRequest {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn duration_secs(&self) -> u32 {
        self.duration_secs
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn audio_enabled(&self) -> bool {
        self.audio_enabled
    }

    /// Overlay label, e.g. `1280x720`.
    pub fn dimensions_label(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

/// Accepts `1280` as well as `"1280"`; HTML forms post numbers as strings.
fn lenient_integer<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Float(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(v) => Ok(v),
        Raw::Float(v) if v.fract() == 0.0 && v.abs() < i64::MAX as f64 => Ok(v as i64),
        Raw::Float(v) => Err(serde::de::Error::custom(format!("expected an integer, got {}", v))),
        Raw::Text(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| serde::de::Error::custom(format!("expected an integer, got '{}'", s))),
    }
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Bool(b) => Ok(b),
        Raw::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "on" | "yes" => Ok(true),
            "false" | "0" | "off" | "no" | "" => Ok(false),
            _ => Err(serde::de::Error::custom(format!("expected a boolean, got '{}'", s))),
        },
    }
}

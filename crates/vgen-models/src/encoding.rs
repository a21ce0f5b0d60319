//! Output formats and encoder presets.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pixel format used for every output (widest player support).
pub const PIXEL_FORMAT: &str = "yuv420p";
/// Default encoding preset
pub const DEFAULT_PRESET: EncodePreset = EncodePreset::Ultrafast;
/// Tone frequency of the synthetic audio track (Hz)
pub const TONE_FREQUENCY_HZ: u32 = 1000;
/// Background colour of the synthetic video source
pub const BACKGROUND_COLOR: &str = "blue";
/// Overlay text colour
pub const OVERLAY_COLOR: &str = "white";
/// Quantizer used by codecs without a preset concept (mpeg4, wmv2)
pub const FIXED_QUALITY: u8 = 5;
/// Default font for the dimension overlay
pub const DEFAULT_FONT_FILE: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf";

/// Container formats the service can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Mp4,
    Webm,
    Mov,
    Mkv,
    Avi,
    Wmv,
}

impl OutputFormat {
    /// Every recognised format, in display order.
    pub const ALL: [OutputFormat; 6] = [
        OutputFormat::Mp4,
        OutputFormat::Webm,
        OutputFormat::Mov,
        OutputFormat::Mkv,
        OutputFormat::Avi,
        OutputFormat::Wmv,
    ];

    /// File extension (without the dot).
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "mp4",
            OutputFormat::Webm => "webm",
            OutputFormat::Mov => "mov",
            OutputFormat::Mkv => "mkv",
            OutputFormat::Avi => "avi",
            OutputFormat::Wmv => "wmv",
        }
    }

    /// Video codec used for this container.
    pub fn video_codec(&self) -> VideoCodec {
        match self {
            OutputFormat::Mp4 | OutputFormat::Mov | OutputFormat::Mkv => VideoCodec::H264,
            OutputFormat::Webm => VideoCodec::Vp9,
            OutputFormat::Avi => VideoCodec::Mpeg4,
            OutputFormat::Wmv => VideoCodec::Wmv2,
        }
    }

    /// Audio codec used for this container.
    pub fn audio_codec(&self) -> AudioCodec {
        match self {
            OutputFormat::Mp4 | OutputFormat::Mov | OutputFormat::Mkv => AudioCodec::Aac,
            OutputFormat::Webm => AudioCodec::Opus,
            OutputFormat::Avi => AudioCodec::Mp3,
            OutputFormat::Wmv => AudioCodec::Wma,
        }
    }

    /// Whether the ISO-BMFF `+faststart` flag applies.
    pub fn supports_faststart(&self) -> bool {
        matches!(self, OutputFormat::Mp4 | OutputFormat::Mov)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unsupported format '{0}'")]
pub struct UnknownFormat(pub String);

impl FromStr for OutputFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().trim_start_matches('.').to_ascii_lowercase();
        OutputFormat::ALL
            .into_iter()
            .find(|f| f.extension() == normalized)
            .ok_or_else(|| UnknownFormat(s.to_string()))
    }
}

/// Video encoders the command builder knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    H264,
    Vp9,
    Mpeg4,
    Wmv2,
}

impl VideoCodec {
    /// FFmpeg encoder name.
    pub fn encoder(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "libx264",
            VideoCodec::Vp9 => "libvpx-vp9",
            VideoCodec::Mpeg4 => "mpeg4",
            VideoCodec::Wmv2 => "wmv2",
        }
    }
}

/// Audio encoders the command builder knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCodec {
    Aac,
    Opus,
    Mp3,
    Wma,
}

impl AudioCodec {
    /// FFmpeg encoder name.
    pub fn encoder(&self) -> &'static str {
        match self {
            AudioCodec::Aac => "aac",
            AudioCodec::Opus => "libopus",
            AudioCodec::Mp3 => "libmp3lame",
            AudioCodec::Wma => "wmav2",
        }
    }

    /// Target bitrate.
    pub fn bitrate(&self) -> &'static str {
        match self {
            AudioCodec::Opus => "128k",
            _ => "192k",
        }
    }
}

/// Speed/efficiency trade-off for the encoder. Only the fast end of the
/// x264 scale is offered; this is a placeholder generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum EncodePreset {
    Ultrafast,
    Superfast,
    Veryfast,
    Faster,
    Fast,
}

impl EncodePreset {
    /// x264 preset name.
    pub fn x264_name(&self) -> &'static str {
        match self {
            EncodePreset::Ultrafast => "ultrafast",
            EncodePreset::Superfast => "superfast",
            EncodePreset::Veryfast => "veryfast",
            EncodePreset::Faster => "faster",
            EncodePreset::Fast => "fast",
        }
    }

    /// libvpx `-cpu-used` equivalent (higher is faster).
    pub fn vpx_cpu_used(&self) -> u8 {
        match self {
            EncodePreset::Ultrafast => 8,
            EncodePreset::Superfast => 7,
            EncodePreset::Veryfast => 6,
            EncodePreset::Faster => 5,
            EncodePreset::Fast => 4,
        }
    }
}

impl Default for EncodePreset {
    fn default() -> Self {
        DEFAULT_PRESET
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown encode preset '{0}'")]
pub struct UnknownPreset(pub String);

impl FromStr for EncodePreset {
    type Err = UnknownPreset;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ultrafast" => Ok(EncodePreset::Ultrafast),
            "superfast" => Ok(EncodePreset::Superfast),
            "veryfast" => Ok(EncodePreset::Veryfast),
            "faster" => Ok(EncodePreset::Faster),
            "fast" => Ok(EncodePreset::Fast),
            _ => Err(UnknownPreset(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parsing() {
        assert_eq!("mp4".parse::<OutputFormat>().unwrap(), OutputFormat::Mp4);
        assert_eq!("WEBM".parse::<OutputFormat>().unwrap(), OutputFormat::Webm);
        assert_eq!(".mkv".parse::<OutputFormat>().unwrap(), OutputFormat::Mkv);
        assert!("gif".parse::<OutputFormat>().is_err());
        assert!("".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_codec_table() {
        assert_eq!(OutputFormat::Mp4.video_codec().encoder(), "libx264");
        assert_eq!(OutputFormat::Webm.audio_codec().encoder(), "libopus");
        assert_eq!(OutputFormat::Avi.audio_codec().bitrate(), "192k");
        assert!(OutputFormat::Mov.supports_faststart());
        assert!(!OutputFormat::Mkv.supports_faststart());
    }

    #[test]
    fn test_preset_parsing() {
        assert_eq!("VeryFast".parse::<EncodePreset>().unwrap(), EncodePreset::Veryfast);
        assert!("placebo".parse::<EncodePreset>().is_err());
        assert_eq!(EncodePreset::default().x264_name(), "ultrafast");
    }
}

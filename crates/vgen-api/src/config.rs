//! API configuration.

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use vgen_media::{OutputDir, RenderConfig, SweepConfig};
use vgen_models::encoding::DEFAULT_FONT_FILE;
use vgen_models::request::{DEFAULT_MAX_DIMENSION, DEFAULT_MAX_DURATION_SECS};
use vgen_models::{EncodePreset, OutputFormat, RequestLimits, DEFAULT_VALIDITY_WINDOW_SECS};

const DEFAULT_PORT: u16 = 10000;
const DEFAULT_OUTPUT_DIR: &str = "/tmp/vgen";
const DEFAULT_PUBLIC_PATH: &str = "/videos";

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Max request body size
    pub max_body_size: usize,
    /// Environment (development/production)
    pub environment: String,
    /// Expose Prometheus metrics at /metrics
    pub metrics_enabled: bool,

    /// Directory holding generated videos
    pub output_dir: PathBuf,
    /// URL prefix the output directory is served under
    pub public_path: String,
    /// Artifact lifetime
    pub validity_window: Duration,
    /// Time between sweeps; `None` disables the sweeper
    pub sweep_interval: Option<Duration>,
    /// Absolute-age fallback for artifacts with unreadable expiry
    pub sweep_orphan_max_age: Option<Duration>,

    pub max_duration_secs: u32,
    pub max_dimension: u32,
    pub allowed_formats: Vec<OutputFormat>,
    pub encode_preset: EncodePreset,
    /// Encoder timeout; `None` waits indefinitely
    pub render_timeout: Option<Duration>,
    pub ffmpeg_bin: String,
    pub ffprobe_bin: String,
    /// Overlay font; `None` uses FFmpeg's built-in default
    pub font_file: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            cors_origins: vec!["*".to_string()],
            max_body_size: 64 * 1024,
            environment: "development".to_string(),
            metrics_enabled: true,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            public_path: DEFAULT_PUBLIC_PATH.to_string(),
            validity_window: Duration::from_secs(DEFAULT_VALIDITY_WINDOW_SECS),
            sweep_interval: Some(vgen_media::DEFAULT_SWEEP_INTERVAL),
            sweep_orphan_max_age: Some(vgen_media::DEFAULT_ORPHAN_MAX_AGE),
            max_duration_secs: DEFAULT_MAX_DURATION_SECS,
            max_dimension: DEFAULT_MAX_DIMENSION,
            allowed_formats: OutputFormat::ALL.to_vec(),
            encode_preset: EncodePreset::default(),
            render_timeout: Some(vgen_media::DEFAULT_RENDER_TIMEOUT),
            ffmpeg_bin: "ffmpeg".to_string(),
            ffprobe_bin: "ffprobe".to_string(),
            font_file: Some(PathBuf::from(DEFAULT_FONT_FILE)),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|s| s.trim().parse::<u64>().ok());
        // 0 disables
        let optional_secs = |key: &str, default: Option<Duration>| match parsed(key) {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => default,
        };

        Self {
            host: lookup("API_HOST").unwrap_or(defaults.host),
            port: lookup("API_PORT")
                .or_else(|| lookup("PORT"))
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.port),
            cors_origins: lookup("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            max_body_size: lookup("MAX_BODY_SIZE")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.max_body_size),
            environment: lookup("ENVIRONMENT").unwrap_or(defaults.environment),
            metrics_enabled: lookup("METRICS_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.metrics_enabled),
            output_dir: lookup("OUTPUT_DIR")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            public_path: lookup("PUBLIC_PATH")
                .map(|s| parse_public_path(&s))
                .unwrap_or(defaults.public_path),
            validity_window: parsed("VALIDITY_WINDOW_SECS")
                .filter(|&secs| secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.validity_window),
            sweep_interval: optional_secs("SWEEP_INTERVAL_SECS", defaults.sweep_interval),
            sweep_orphan_max_age: optional_secs("SWEEP_ORPHAN_MAX_AGE_SECS", defaults.sweep_orphan_max_age),
            max_duration_secs: lookup("MAX_DURATION_SECS")
                .and_then(|s| s.trim().parse().ok())
                .filter(|&v| v > 0)
                .unwrap_or(defaults.max_duration_secs),
            max_dimension: lookup("MAX_DIMENSION")
                .and_then(|s| s.trim().parse().ok())
                .filter(|&v| v > 0)
                .unwrap_or(defaults.max_dimension),
            allowed_formats: lookup("ALLOWED_FORMATS")
                .map(|s| parse_formats(&s))
                .filter(|formats| !formats.is_empty())
                .unwrap_or(defaults.allowed_formats),
            encode_preset: lookup("ENCODE_PRESET")
                .and_then(|s| match s.parse() {
                    Ok(preset) => Some(preset),
                    Err(e) => {
                        warn!("Ignoring ENCODE_PRESET: {}", e);
                        None
                    }
                })
                .unwrap_or(defaults.encode_preset),
            render_timeout: optional_secs("RENDER_TIMEOUT_SECS", defaults.render_timeout),
            ffmpeg_bin: lookup("FFMPEG_BIN").unwrap_or(defaults.ffmpeg_bin),
            ffprobe_bin: lookup("FFPROBE_BIN").unwrap_or(defaults.ffprobe_bin),
            font_file: match lookup("FONT_FILE") {
                Some(s) if s.trim().is_empty() => None,
                Some(s) => Some(PathBuf::from(s)),
                None => defaults.font_file,
            },
        }
    }

    pub fn output(&self) -> OutputDir {
        OutputDir::new(&self.output_dir, &self.public_path)
    }

    pub fn render_config(&self) -> RenderConfig {
        RenderConfig {
            ffmpeg_bin: self.ffmpeg_bin.clone(),
            preset: self.encode_preset,
            font_file: self.font_file.clone(),
            validity_window: self.validity_window,
            timeout: self.render_timeout,
        }
    }

    /// Sweeper settings, or `None` when sweeping is disabled.
    pub fn sweep_config(&self) -> Option<SweepConfig> {
        self.sweep_interval.map(|interval| SweepConfig {
            interval,
            orphan_max_age: self.sweep_orphan_max_age,
        })
    }

    pub fn request_limits(&self) -> RequestLimits {
        RequestLimits {
            max_duration_secs: self.max_duration_secs,
            max_dimension: self.max_dimension,
            allowed_formats: self.allowed_formats.clone(),
        }
    }
}

/// The root path is taken by the liveness route, so it cannot host files.
fn parse_public_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        warn!("Ignoring PUBLIC_PATH '{}', using {}", raw, DEFAULT_PUBLIC_PATH);
        return DEFAULT_PUBLIC_PATH.to_string();
    }
    format!("/{}", trimmed)
}

fn parse_formats(raw: &str) -> Vec<OutputFormat> {
    let mut formats = Vec::new();
    for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match item.parse::<OutputFormat>() {
            Ok(format) if !formats.contains(&format) => formats.push(format),
            Ok(_) => {}
            Err(e) => warn!("Ignoring entry in ALLOWED_FORMATS: {}", e),
        }
    }
    formats
}

//! Placeholder video rendering.
//!
//! [`Renderer::generate`] turns a [`ValidatedRequest`] into exactly one
//! [`GenerationResult`]. The call awaits the encoder to completion; other
//! requests keep being served by the runtime meanwhile.
//!
//! There is no admission control: concurrent requests spawn concurrent
//! encoders. Callers that need a cap must add one in front of `generate`.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::fs;
use tracing::{debug, error, info, warn};

use vgen_models::encoding::DEFAULT_FONT_FILE;
use vgen_models::{
    expiry_for, ArtifactName, EncodePreset, GeneratedArtifact, GenerationFailure,
    GenerationResult, ValidatedRequest, DEFAULT_VALIDITY_WINDOW_SECS,
};

use crate::command::{resolve_binary, ExitState, FfmpegRunner, RenderCommand};
use crate::error::MediaError;
use crate::metrics::record_generation;
use crate::output_dir::{ArtifactWriter, OutputDir};

/// Default encoder timeout.
pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(600);

/// Renderer configuration.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Encoder binary name or path
    pub ffmpeg_bin: String,
    pub preset: EncodePreset,
    /// Overlay font; `None` uses FFmpeg's default
    pub font_file: Option<PathBuf>,
    /// Lifetime of an artifact after creation
    pub validity_window: Duration,
    /// Kill the encoder after this long; `None` waits indefinitely
    pub timeout: Option<Duration>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_bin: "ffmpeg".to_string(),
            preset: EncodePreset::default(),
            font_file: Some(PathBuf::from(DEFAULT_FONT_FILE)),
            validity_window: Duration::from_secs(DEFAULT_VALIDITY_WINDOW_SECS),
            timeout: Some(DEFAULT_RENDER_TIMEOUT),
        }
    }
}

/// Drives one encoder process per request.
#[derive(Debug, Clone)]
pub struct Renderer {
    config: RenderConfig,
    writer: ArtifactWriter,
    runner: FfmpegRunner,
}

impl Renderer {
    pub fn new(config: RenderConfig, output: &OutputDir) -> Self {
        let runner = FfmpegRunner::new(config.ffmpeg_bin.clone()).with_timeout(config.timeout);
        Self {
            config,
            writer: output.writer(),
            runner,
        }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Generate one placeholder video.
    pub async fn generate(&self, request: &ValidatedRequest) -> GenerationResult {
        let start = Instant::now();
        let result = self.render(request).await;
        let elapsed = start.elapsed().as_secs_f64();

        match &result {
            GenerationResult::Success(artifact) => info!(
                file = %artifact.file_name,
                size_bytes = artifact.size_bytes,
                expires_at = %artifact.expires_at,
                elapsed_secs = elapsed,
                "Video generated"
            ),
            GenerationResult::Failure(failure) => error!(
                kind = %failure.kind,
                exit_code = ?failure.exit_code,
                elapsed_secs = elapsed,
                "Video generation failed: {}", failure.reason
            ),
        }
        record_generation(result.outcome(), elapsed);

        result
    }

    async fn render(&self, request: &ValidatedRequest) -> GenerationResult {
        if let Err(e) = self.writer.check_writable().await {
            return GenerationResult::Failure(GenerationFailure::environment(format!(
                "Server configuration error: {}",
                e
            )));
        }

        if let Err(e) = resolve_binary(&self.config.ffmpeg_bin) {
            return GenerationResult::Failure(GenerationFailure::environment(e.to_string()));
        }

        let created_at = Utc::now();
        let window = chrono::Duration::from_std(self.config.validity_window)
            .unwrap_or_else(|_| chrono::Duration::seconds(DEFAULT_VALIDITY_WINDOW_SECS as i64));
        let expires_at = expiry_for(created_at, window);

        let name = ArtifactName::allocate(request, created_at);
        let output_path = self.writer.path_for(&name);

        info!(
            file = %name,
            width = request.width(),
            height = request.height(),
            duration_secs = request.duration_secs(),
            format = %request.format(),
            audio = request.audio_enabled(),
            "Generating video"
        );

        let cmd = match RenderCommand::new(request, &output_path, expires_at) {
            Ok(cmd) => cmd
                .preset(self.config.preset)
                .font_file(self.config.font_file.clone()),
            Err(e) => {
                return GenerationResult::Failure(GenerationFailure::encode(e.to_string(), None, String::new()))
            }
        };

        let output = match self.runner.run(&cmd.to_ffmpeg()).await {
            Ok(output) => output,
            Err(e @ MediaError::SpawnFailed { .. }) => {
                return GenerationResult::Failure(GenerationFailure::environment(e.to_string()));
            }
            Err(e) => {
                self.writer.discard(&output_path).await;
                return GenerationResult::Failure(GenerationFailure::encode(e.to_string(), None, String::new()));
            }
        };

        debug!(file = %name, elapsed = ?output.elapsed, "FFmpeg finished");

        let status = match output.exit {
            ExitState::TimedOut(limit) => {
                self.writer.discard(&output_path).await;
                return GenerationResult::Failure(GenerationFailure::timeout(limit.as_secs(), output.log));
            }
            ExitState::Exited(status) => status,
        };

        if !status.success() {
            self.writer.discard(&output_path).await;
            let reason = match status.code() {
                Some(code) => format!("FFmpeg process exited with code {}", code),
                None => "FFmpeg process was terminated by a signal".to_string(),
            };
            return GenerationResult::Failure(GenerationFailure::encode(reason, status.code(), output.log));
        }

        match fs::metadata(&output_path).await {
            Ok(meta) if meta.is_file() && meta.len() > 0 => GenerationResult::Success(GeneratedArtifact {
                public_url: self.writer.public_url(&name),
                file_name: name.file_name(),
                output_path,
                size_bytes: meta.len(),
                expires_at,
            }),
            Ok(_) => {
                warn!(file = %name, "FFmpeg exited successfully but the output is empty");
                self.writer.discard(&output_path).await;
                GenerationResult::Failure(GenerationFailure::encode(
                    "Error verifying video file: output is empty",
                    Some(0),
                    output.log,
                ))
            }
            Err(e) => GenerationResult::Failure(GenerationFailure::encode(
                format!("Error verifying video file: {}", e),
                Some(0),
                output.log,
            )),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::test_support::fake_encoder;
    use tempfile::TempDir;
    use vgen_models::{FailureKind, GenerationRequest, OutputFormat, RequestLimits};

    fn request(audio: bool) -> ValidatedRequest {
        GenerationRequest::new(640, 360, 5, OutputFormat::Mp4, audio)
            .validate_with(&RequestLimits::default())
            .unwrap()
    }

    /// Renderer writing into `<tmp>/out` with a fake encoder living in `<tmp>`.
    fn renderer(tmp: &TempDir, body: &str) -> (Renderer, PathBuf) {
        let out = tmp.path().join("out");
        std::fs::create_dir_all(&out).unwrap();
        let encoder = fake_encoder(tmp.path(), body);
        let config = RenderConfig {
            ffmpeg_bin: encoder.to_string_lossy().to_string(),
            font_file: None,
            timeout: Some(Duration::from_secs(30)),
            ..RenderConfig::default()
        };
        (Renderer::new(config, &OutputDir::new(&out, "/videos")), out)
    }

    fn artifacts_in(dir: &std::path::Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|n| ArtifactName::parse(n).is_some())
            .collect()
    }

    const WRITES_OUTPUT: &str = "printf '%s\\n' \"$@\" > \"$(dirname \"$last\")/../args.txt\"\necho 'encoding' 1>&2\nprintf 'data' > \"$last\"";

    #[tokio::test]
    async fn test_success_reports_artifact() {
        let tmp = TempDir::new().unwrap();
        let (renderer, out) = renderer(&tmp, WRITES_OUTPUT);

        let before = Utc::now();
        let result = renderer.generate(&request(true)).await;

        let GenerationResult::Success(artifact) = result else {
            panic!("expected success, got {:?}", result);
        };
        assert!(artifact.output_path.starts_with(&out));
        assert!(artifact.output_path.exists());
        assert_eq!(artifact.size_bytes, 4);
        assert!(artifact.file_name.ends_with(".mp4"));
        assert_eq!(artifact.public_url, format!("/videos/{}", artifact.file_name));

        let window = (artifact.expires_at - before).num_seconds();
        assert!((3598..=3602).contains(&window), "window was {}", window);

        let args = std::fs::read_to_string(tmp.path().join("args.txt")).unwrap();
        assert!(args.contains("1:a:0"));
        assert!(args.contains(&format!(
            "comment={}",
            vgen_models::format_expiry_tag(artifact.expires_at)
        )));
    }

    #[tokio::test]
    async fn test_identical_requests_get_distinct_files() {
        let tmp = TempDir::new().unwrap();
        let (renderer, out) = renderer(&tmp, WRITES_OUTPUT);

        let a = renderer.generate(&request(false)).await;
        let b = renderer.generate(&request(false)).await;

        match (a, b) {
            (GenerationResult::Success(a), GenerationResult::Success(b)) => {
                assert_ne!(a.output_path, b.output_path)
            }
            other => panic!("expected two successes, got {:?}", other),
        }
        assert_eq!(artifacts_in(&out).len(), 2);
    }

    #[tokio::test]
    async fn test_nonzero_exit_reports_log_and_cleans_up() {
        let tmp = TempDir::new().unwrap();
        let (renderer, out) = renderer(
            &tmp,
            "printf 'partial' > \"$last\"\necho 'Unknown encoder libx264' 1>&2\nexit 1",
        );

        let result = renderer.generate(&request(false)).await;

        let GenerationResult::Failure(failure) = result else {
            panic!("expected failure");
        };
        assert_eq!(failure.kind, FailureKind::Encode);
        assert_eq!(failure.exit_code, Some(1));
        assert!(failure.reason.contains("code 1"));
        assert!(failure.log.contains("Unknown encoder libx264"));
        assert!(artifacts_in(&out).is_empty());
    }

    #[tokio::test]
    async fn test_zero_exit_with_empty_output_is_failure() {
        let tmp = TempDir::new().unwrap();
        let (renderer, out) = renderer(&tmp, ": > \"$last\"\nexit 0");

        let result = renderer.generate(&request(false)).await;

        let GenerationResult::Failure(failure) = result else {
            panic!("expected failure");
        };
        assert_eq!(failure.kind, FailureKind::Encode);
        assert!(artifacts_in(&out).is_empty());
    }

    #[tokio::test]
    async fn test_zero_exit_without_output_is_failure() {
        let tmp = TempDir::new().unwrap();
        let (renderer, _out) = renderer(&tmp, "exit 0");

        let result = renderer.generate(&request(false)).await;
        assert!(matches!(
            result,
            GenerationResult::Failure(GenerationFailure { kind: FailureKind::Encode, .. })
        ));
    }

    #[tokio::test]
    async fn test_unwritable_dir_spawns_nothing() {
        let tmp = TempDir::new().unwrap();
        let marker = tmp.path().join("spawned");
        let encoder = fake_encoder(tmp.path(), &format!("touch '{}'", marker.display()));
        let config = RenderConfig {
            ffmpeg_bin: encoder.to_string_lossy().to_string(),
            ..RenderConfig::default()
        };
        let renderer = Renderer::new(config, &OutputDir::new(tmp.path().join("missing"), "/videos"));

        let result = renderer.generate(&request(false)).await;

        let GenerationResult::Failure(failure) = result else {
            panic!("expected failure");
        };
        assert_eq!(failure.kind, FailureKind::Environment);
        assert!(failure.log.is_empty());
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_read_only_dir_spawns_nothing() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let marker = tmp.path().join("spawned");
        let (renderer, out) = renderer(&tmp, &format!("touch '{}'", marker.display()));
        std::fs::set_permissions(&out, std::fs::Permissions::from_mode(0o555)).unwrap();

        // Permission bits do not bind root
        let writable = std::fs::write(out.join("check"), b"x").is_ok();
        let result = if writable { None } else { Some(renderer.generate(&request(false)).await) };
        std::fs::set_permissions(&out, std::fs::Permissions::from_mode(0o755)).unwrap();
        let Some(result) = result else {
            return;
        };

        let GenerationResult::Failure(failure) = result else {
            panic!("expected failure, got {:?}", result);
        };
        assert_eq!(failure.kind, FailureKind::Environment);
        assert!(!marker.exists());
        assert!(artifacts_in(&out).is_empty());
    }

    #[tokio::test]
    async fn test_missing_encoder_is_environment_failure() {
        let tmp = TempDir::new().unwrap();
        let config = RenderConfig {
            ffmpeg_bin: "definitely-not-a-real-encoder-binary".to_string(),
            ..RenderConfig::default()
        };
        let renderer = Renderer::new(config, &OutputDir::new(tmp.path(), "/videos"));

        let result = renderer.generate(&request(false)).await;
        assert!(matches!(
            result,
            GenerationResult::Failure(GenerationFailure { kind: FailureKind::Environment, .. })
        ));
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("out");
        std::fs::create_dir_all(&out).unwrap();
        let encoder = fake_encoder(tmp.path(), "printf 'partial' > \"$last\"\nexec sleep 30");
        let config = RenderConfig {
            ffmpeg_bin: encoder.to_string_lossy().to_string(),
            timeout: Some(Duration::from_millis(300)),
            ..RenderConfig::default()
        };
        let renderer = Renderer::new(config, &OutputDir::new(&out, "/videos"));

        let result = renderer.generate(&request(false)).await;

        let GenerationResult::Failure(failure) = result else {
            panic!("expected failure");
        };
        assert_eq!(failure.kind, FailureKind::Timeout);
        assert!(artifacts_in(&out).is_empty());
    }
}

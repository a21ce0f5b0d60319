//! FFmpeg command builder and runner.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use vgen_models::encoding::{
    VideoCodec, BACKGROUND_COLOR, FIXED_QUALITY, OVERLAY_COLOR, PIXEL_FORMAT, TONE_FREQUENCY_HZ,
};
use vgen_models::{format_expiry_tag, EncodePreset, ValidatedRequest};

use crate::error::{MediaError, MediaResult};

/// How long to keep draining pipes after the process is gone.
const DRAIN_GRACE: Duration = Duration::from_secs(5);

/// One `-i` input and the arguments that precede it.
#[derive(Debug, Clone)]
struct FfmpegInput {
    args: Vec<String>,
    source: String,
}

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Inputs, in `-i` order
    inputs: Vec<FfmpegInput>,
    /// Output file path
    output: PathBuf,
    /// Output arguments (after all inputs)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command writing to `output`.
    pub fn new(output: impl AsRef<Path>) -> Self {
        Self {
            inputs: Vec::new(),
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
            overwrite: true,
        }
    }

    /// Add a synthetic libavfilter source (`-f lavfi -i <source>`).
    pub fn lavfi_input(mut self, source: impl Into<String>) -> Self {
        self.inputs.push(FfmpegInput {
            args: vec!["-f".to_string(), "lavfi".to_string()],
            source: source.into(),
        });
        self
    }

    /// Add output arguments.
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Map an input stream into the output.
    pub fn map(self, spec: impl Into<String>) -> Self {
        self.output_arg("-map").output_arg(spec)
    }

    /// Trim the output to a duration.
    pub fn duration(self, seconds: f64) -> Self {
        self.output_arg("-t").output_arg(format!("{:.3}", seconds))
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    /// Set audio codec.
    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    /// Set preset.
    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.output_arg("-preset").output_arg(preset)
    }

    /// Set audio bitrate.
    pub fn audio_bitrate(self, bitrate: impl Into<String>) -> Self {
        self.output_arg("-b:a").output_arg(bitrate)
    }

    /// Set pixel format.
    pub fn pixel_format(self, pix_fmt: impl Into<String>) -> Self {
        self.output_arg("-pix_fmt").output_arg(pix_fmt)
    }

    /// Set a container metadata tag.
    pub fn metadata(self, key: &str, value: &str) -> Self {
        self.output_arg("-metadata").output_arg(format!("{}={}", key, value))
    }

    /// Output path.
    pub fn output_path(&self) -> &Path {
        &self.output
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec!["-hide_banner".to_string(), "-nostdin".to_string()];

        // Overwrite flag
        if self.overwrite {
            args.push("-y".to_string());
        }

        // Log level, no carriage-return progress lines
        args.push("-v".to_string());
        args.push("info".to_string());
        args.push("-nostats".to_string());

        for input in &self.inputs {
            args.extend(input.args.iter().cloned());
            args.push("-i".to_string());
            args.push(input.source.clone());
        }

        args.extend(self.output_args.iter().cloned());

        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Typed description of one placeholder render.
///
/// Every option the service recognises is a field here; the FFmpeg argument
/// list is derived from it and never assembled from caller strings.
#[derive(Debug, Clone)]
pub struct RenderCommand {
    request: ValidatedRequest,
    output: PathBuf,
    expires_at: DateTime<Utc>,
    preset: EncodePreset,
    font_file: Option<PathBuf>,
}

impl RenderCommand {
    /// Describe a render of `request` into `output`, tagged to expire at `expires_at`.
    ///
    /// Fails when the output extension does not match the requested format
    /// or the geometry cannot be encoded as `yuv420p`.
    pub fn new(
        request: &ValidatedRequest,
        output: impl Into<PathBuf>,
        expires_at: DateTime<Utc>,
    ) -> MediaResult<Self> {
        let output = output.into();

        let ext = output
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        if ext != request.format().extension() {
            return Err(MediaError::invalid_render(format!(
                "output {} does not match format {}",
                output.display(),
                request.format()
            )));
        }

        if request.width() == 0 || request.height() == 0 || request.duration_secs() == 0 {
            return Err(MediaError::invalid_render("width, height and duration must be positive"));
        }
        if request.width() % 2 != 0 || request.height() % 2 != 0 {
            return Err(MediaError::invalid_render(format!(
                "{} cannot be encoded as {}",
                request.dimensions_label(),
                PIXEL_FORMAT
            )));
        }

        Ok(Self {
            request: *request,
            output,
            expires_at,
            preset: EncodePreset::default(),
            font_file: None,
        })
    }

    /// Set the encoder speed preset.
    pub fn preset(mut self, preset: EncodePreset) -> Self {
        self.preset = preset;
        self
    }

    /// Set the overlay font. `None` lets FFmpeg pick its default font.
    pub fn font_file(mut self, font_file: Option<PathBuf>) -> Self {
        self.font_file = font_file;
        self
    }

    pub fn output_path(&self) -> &Path {
        &self.output
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Overlay filter burning `WxH` into the centre of the frame.
    pub fn overlay_filter(&self) -> String {
        let shorter = self.request.width().min(self.request.height());
        let font_size = (shorter / 6).clamp(12, 200);

        let mut filter = String::from("drawtext=");
        if let Some(font) = &self.font_file {
            filter.push_str(&format!(
                "fontfile='{}':",
                escape_quoted(&font.to_string_lossy())
            ));
        }
        filter.push_str(&format!(
            "text='{}':fontsize={}:fontcolor={}:x=(w-text_w)/2:y=(h-text_h)/2",
            self.request.dimensions_label(),
            font_size,
            OVERLAY_COLOR
        ));
        filter
    }

    /// Lower to an [`FfmpegCommand`].
    pub fn to_ffmpeg(&self) -> FfmpegCommand {
        let req = &self.request;
        let format = req.format();
        let duration = req.duration_secs();

        let mut cmd = FfmpegCommand::new(&self.output).lavfi_input(format!(
            "color=c={}:s={}x{}:d={}",
            BACKGROUND_COLOR,
            req.width(),
            req.height(),
            duration
        ));

        if req.audio_enabled() {
            cmd = cmd.lavfi_input(format!(
                "sine=frequency={}:duration={}",
                TONE_FREQUENCY_HZ, duration
            ));
        }

        cmd = cmd.video_filter(self.overlay_filter()).map("0:v:0");
        if req.audio_enabled() {
            cmd = cmd.map("1:a:0");
        }

        cmd = cmd.duration(f64::from(duration));

        let video = format.video_codec();
        cmd = cmd.video_codec(video.encoder());
        cmd = match video {
            VideoCodec::H264 => cmd.preset(self.preset.x264_name()),
            VideoCodec::Vp9 => cmd
                .output_args(["-deadline", "realtime", "-cpu-used"])
                .output_arg(self.preset.vpx_cpu_used().to_string())
                .output_args(["-b:v", "0", "-crf", "40"]),
            VideoCodec::Mpeg4 | VideoCodec::Wmv2 => {
                cmd.output_arg("-q:v").output_arg(FIXED_QUALITY.to_string())
            }
        };
        cmd = cmd.pixel_format(PIXEL_FORMAT);

        if req.audio_enabled() {
            let audio = format.audio_codec();
            cmd = cmd.audio_codec(audio.encoder()).audio_bitrate(audio.bitrate());
        }

        if format.supports_faststart() {
            cmd = cmd.output_args(["-movflags", "+faststart"]);
        }

        cmd.metadata(
            vgen_models::artifact::EXPIRY_TAG_KEY,
            &format_expiry_tag(self.expires_at),
        )
    }

    /// Build the full argument list.
    pub fn build_args(&self) -> Vec<String> {
        self.to_ffmpeg().build_args()
    }
}

/// Escape a value placed inside single quotes in a filter description.
fn escape_quoted(value: &str) -> String {
    value.replace('\'', r"'\''")
}

/// How the child process ended.
#[derive(Debug, Clone, Copy)]
pub enum ExitState {
    Exited(ExitStatus),
    TimedOut(Duration),
}

/// Captured result of one FFmpeg run.
#[derive(Debug)]
pub struct RunOutput {
    pub exit: ExitState,
    /// Combined stdout and stderr, in arrival order
    pub log: String,
    pub elapsed: Duration,
}

/// Runner for FFmpeg commands that captures the combined log.
#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    /// Encoder binary name or path
    binary: String,
    /// Timeout; `None` waits forever
    timeout: Option<Duration>,
}

impl Default for FfmpegRunner {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegRunner {
    /// Create a new runner.
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            timeout: None,
        }
    }

    /// Set timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Run an FFmpeg command to completion.
    ///
    /// stdout and stderr are drained by their own tasks while the exit wait is
    /// in progress, so a chatty encoder can never block on a full pipe.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<RunOutput> {
        let args = cmd.build_args();
        debug!("Running FFmpeg: {} {}", self.binary, args.join(" "));

        let start = Instant::now();
        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| MediaError::SpawnFailed {
                binary: self.binary.clone(),
                source,
            })?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut drains = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            drains.push(tokio::spawn(drain_lines(stdout, tx.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            drains.push(tokio::spawn(drain_lines(stderr, tx.clone())));
        }
        drop(tx);

        let exit = self.wait_for_exit(&mut child).await;

        for mut drain in drains {
            if tokio::time::timeout(DRAIN_GRACE, &mut drain).await.is_err() {
                warn!("Output pipe still open {:?} after exit, abandoning drain", DRAIN_GRACE);
                drain.abort();
            }
        }

        let mut log = String::new();
        while let Ok(chunk) = rx.try_recv() {
            log.push_str(&chunk);
        }

        Ok(RunOutput {
            exit: exit?,
            log,
            elapsed: start.elapsed(),
        })
    }

    /// Wait for child process with optional timeout.
    async fn wait_for_exit(&self, child: &mut Child) -> MediaResult<ExitState> {
        let Some(limit) = self.timeout else {
            return Ok(ExitState::Exited(child.wait().await?));
        };

        match tokio::time::timeout(limit, child.wait()).await {
            Ok(status) => Ok(ExitState::Exited(status?)),
            Err(_) => {
                // Timeout - kill the process
                warn!("FFmpeg timed out after {:?}, killing process", limit);
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill timed out FFmpeg: {}", e);
                }
                Ok(ExitState::TimedOut(limit))
            }
        }
    }
}

/// Forward every line of `reader` to `tx` until EOF. Invalid UTF-8 is
/// replaced rather than ending the drain.
async fn drain_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(256);

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let mut line = String::from_utf8_lossy(&buf).into_owned();
                if !line.ends_with('\n') {
                    line.push('\n');
                }
                trace!(target: "vgen_media::ffmpeg", "{}", line.trim_end());
                if tx.send(line).is_err() {
                    break;
                }
            }
            Err(e) => {
                let _ = tx.send(format!("[log capture error: {}]\n", e));
                break;
            }
        }
    }
}

/// Resolve a binary on PATH (or accept an explicit path).
pub fn resolve_binary(binary: &str) -> MediaResult<PathBuf> {
    which::which(binary).map_err(|_| MediaError::BinaryNotFound(binary.to_string()))
}

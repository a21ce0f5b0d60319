#![deny(unreachable_patterns)]
//! FFmpeg CLI wrapper for placeholder video rendering.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building for synthetic placeholder videos
//! - A runner that drains both output streams and enforces a timeout
//! - The render orchestrator turning a validated request into an artifact
//! - The expiry sweeper reclaiming artifacts whose embedded expiry has passed
//!
//! There is no admission control: every accepted request spawns one encoder
//! process immediately. Callers that need a cap must add it in front.

pub mod command;
pub mod error;
pub mod metrics;
pub mod output_dir;
pub mod probe;
pub mod render;
pub mod sweep;

#[cfg(test)]
mod test_support;

pub use command::{resolve_binary, ExitState, FfmpegCommand, FfmpegRunner, RenderCommand, RunOutput};
pub use error::{MediaError, MediaResult};
pub use output_dir::{ArtifactEntry, ArtifactReader, ArtifactWriter, OutputDir, RemoveOutcome};
pub use probe::{Ffprobe, FormatInfo, StreamSummary, DEFAULT_PROBE_TIMEOUT};
pub use render::{RenderConfig, Renderer, DEFAULT_RENDER_TIMEOUT};
pub use sweep::{
    decide, ExpiryProbe, ExpirySweeper, SweepConfig, SweepDecision, SweepReport, DEFAULT_ORPHAN_MAX_AGE,
    DEFAULT_SWEEP_INTERVAL,
};

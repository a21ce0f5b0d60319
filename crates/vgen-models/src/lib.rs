//! Shared data models for the vgen backend.
//!
//! This crate provides Serde-serializable types for:
//! - Generation requests and their validation
//! - Output formats, codecs and encode presets
//! - Artifact naming and the embedded expiry tag
//! - Generation results

pub mod artifact;
pub mod encoding;
pub mod request;
pub mod result;

// Re-export common types
pub use artifact::{
    expiry_for, format_expiry_tag, parse_expiry_tag, ArtifactName, ArtifactState,
    DEFAULT_VALIDITY_WINDOW_SECS,
};
pub use encoding::{AudioCodec, EncodePreset, OutputFormat, VideoCodec};
pub use request::{GenerationRequest, RequestError, RequestLimits, ValidatedRequest};
pub use result::{FailureKind, GeneratedArtifact, GenerationFailure, GenerationResult};

//! Outcome of a generation call.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of one generation. Built once, never partially populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GenerationResult {
    Success(GeneratedArtifact),
    Failure(GenerationFailure),
}

impl GenerationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, GenerationResult::Success(_))
    }

    /// Outcome label used for logs and metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            GenerationResult::Success(_) => "success",
            GenerationResult::Failure(f) => f.kind.as_str(),
        }
    }
}

/// A successfully written artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedArtifact {
    /// Absolute path on disk
    pub output_path: PathBuf,
    /// URL path relative to the server root
    pub public_url: String,
    pub file_name: String,
    pub size_bytes: u64,
    pub expires_at: DateTime<Utc>,
}

/// Why a generation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Output directory or encoder binary unusable.
    Environment,
    /// Encoder exited nonzero, or produced no output.
    Encode,
    /// Encoder exceeded the render timeout and was killed.
    Timeout,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Environment => "environment",
            FailureKind::Encode => "encode",
            FailureKind::Timeout => "timeout",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failed generation with diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationFailure {
    pub kind: FailureKind,
    /// Human-readable reason
    pub reason: String,
    /// Process exit code, when the encoder ran and exited
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Combined stdout/stderr of the encoder
    pub log: String,
}

impl GenerationFailure {
    pub fn environment(reason: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Environment,
            reason: reason.into(),
            exit_code: None,
            log: String::new(),
        }
    }

    pub fn encode(reason: impl Into<String>, exit_code: Option<i32>, log: String) -> Self {
        Self {
            kind: FailureKind::Encode,
            reason: reason.into(),
            exit_code,
            log,
        }
    }

    pub fn timeout(secs: u64, log: String) -> Self {
        Self {
            kind: FailureKind::Timeout,
            reason: format!("Encoder timed out after {} seconds", secs),
            exit_code: None,
            log,
        }
    }
}

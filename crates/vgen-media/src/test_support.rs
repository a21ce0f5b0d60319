//! Shared fixtures for unit tests.

use std::path::{Path, PathBuf};

/// Write an executable `sh` script standing in for ffmpeg/ffprobe.
///
/// The script receives the real argument list; `$last` holds the final
/// argument (the output path for ffmpeg, the input path for ffprobe).
#[cfg(unix)]
pub(crate) fn fake_encoder(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(format!("fake-tool-{}", uuid::Uuid::new_v4().simple()));
    let script = format!("#!/bin/sh\nfor last; do :; done\n{}\n", body);
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

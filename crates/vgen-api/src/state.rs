//! Application state.

use std::sync::Arc;

use vgen_media::{Ffprobe, OutputDir, Renderer};
use vgen_models::RequestLimits;

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub renderer: Arc<Renderer>,
    pub output_dir: OutputDir,
    pub limits: Arc<RequestLimits>,
    pub ffprobe: Ffprobe,
}

impl AppState {
    /// Create new application state, creating the output directory if missing.
    pub async fn new(config: ApiConfig) -> anyhow::Result<Self> {
        let output_dir = config.output();
        output_dir.ensure_exists().await?;

        let renderer = Renderer::new(config.render_config(), &output_dir);

        Ok(Self {
            limits: Arc::new(config.request_limits()),
            ffprobe: Ffprobe::new(config.ffprobe_bin.clone()),
            renderer: Arc::new(renderer),
            output_dir,
            config: Arc::new(config),
        })
    }
}

use std::path::PathBuf;

use async_trait::async_trait;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Where replies are shown.
///
/// The `obs_*` settings are accepted so existing config files keep loading, but no
/// OBS websocket transport exists. Replies go to `text_output` when it is set and
/// to the log otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositorConfig {
    /// Reserved, not read.
    pub obs_host: String,
    /// Reserved, not read.
    pub obs_port: u16,
    /// Reserved, not read.
    pub obs_password: Option<String>,
    /// When set, replies are written to this file for a text source to pick up.
    pub text_output: Option<PathBuf>,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            obs_host: "localhost".to_string(),
            obs_port: 4455,
            obs_password: None,
            text_output: None,
        }
    }
}

impl CompositorConfig {
    pub fn build(&self) -> Box<dyn Compositor> {
        if self.obs_password.is_some() {
            warn!("OBS websocket output is not supported, obs_password is ignored");
        }

        match &self.text_output {
            Some(path) => Box::new(TextFileCompositor::new(path.clone())),
            None => Box::new(LogCompositor),
        }
    }
}

/// Whatever puts text on the stream.
#[async_trait]
pub trait Compositor: Send + Sync {
    async fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    async fn send(&mut self, text: &str) -> Result<()>;

    async fn disconnect(&mut self) {}
}

/// Writes replies to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogCompositor;

#[async_trait]
impl Compositor for LogCompositor {
    async fn send(&mut self, text: &str) -> Result<()> {
        info!("On stream: {text}");

        Ok(())
    }
}

/// Overwrites a file with the latest reply.
#[derive(Debug, Clone)]
pub struct TextFileCompositor {
    path: PathBuf,
}

impl TextFileCompositor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Compositor for TextFileCompositor {
    async fn connect(&mut self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|v| !v.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, "").await?;

        Ok(())
    }

    async fn send(&mut self, text: &str) -> Result<()> {
        tokio::fs::write(&self.path, text).await?;

        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Err(e) = tokio::fs::write(&self.path, "").await {
            warn!("Unable to clear {}: {e}", self.path.display());
        }
    }
}

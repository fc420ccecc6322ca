use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    lip_sync::LipSyncConfig,
    llm::LlmConfig,
    model::{Expression, VoiceConfig},
    stream::CompositorConfig,
    tts::TtsConfig,
    Error, Result,
};

pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Upper bound for any service timeout.
pub const MAX_TIMEOUT_SECS: f64 = 3600.0;

/// Everything needed to run a stream. Every field may be omitted from the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamerConfig {
    pub vrm_path: PathBuf,
    pub platform: String,
    pub video_id: Option<String>,
    pub compositor: CompositorConfig,
    pub voice_config: VoiceConfig,
    pub expression_config: Expression,
    pub llm: LlmConfig,
    pub tts: TtsConfig,
    pub lip_sync: LipSyncConfig,
    /// Minimum seconds between two replies.
    pub response_interval_secs: f64,
    /// Where replies are recorded. Disabled when unset.
    pub history_path: Option<PathBuf>,
    /// How many chat messages may queue up before the chat reader waits.
    pub chat_buffer: usize,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            vrm_path: PathBuf::from("assets/avatar.vrm"),
            platform: "youtube".to_string(),
            video_id: None,
            compositor: CompositorConfig::default(),
            voice_config: VoiceConfig::default(),
            expression_config: Expression::default(),
            llm: LlmConfig::default(),
            tts: TtsConfig::default(),
            lip_sync: LipSyncConfig::default(),
            response_interval_secs: 5.0,
            history_path: None,
            chat_buffer: 64,
        }
    }
}

impl StreamerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config_error = |reason: String| Error::Config {
            path: Some(path.to_path_buf()),
            reason,
        };

        let data = std::fs::read_to_string(path).map_err(|e| config_error(e.to_string()))?;
        let config = serde_json::from_str::<Self>(&data)
            .map_err(|e| config_error(e.to_string()))?
            .validated()
            .map_err(|e| match e {
                Error::Config { reason, .. } => config_error(reason),
                e => e,
            })?;

        debug!("Loaded config from {}", path.display());

        Ok(config)
    }

    /// Clamp tunables into range and reject values nothing can work with.
    pub fn validated(mut self) -> Result<Self> {
        self.voice_config = self.voice_config.clamped();
        self.expression_config = self.expression_config.clamped();
        self.llm = self.llm.clamped();

        let reason = if !(self.response_interval_secs.is_finite()
            && self.response_interval_secs >= 0.0)
        {
            Some("response_interval_secs must be a non-negative number")
        } else if self.chat_buffer == 0 {
            Some("chat_buffer must be greater than 0")
        } else if ![self.llm.timeout_secs, self.tts.timeout_secs]
            .iter()
            .all(|v| *v > 0.0 && *v <= MAX_TIMEOUT_SECS)
        {
            Some("timeouts must be greater than 0 and at most 3600 seconds")
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(Error::Config {
                path: None,
                reason: reason.to_string(),
            });
        }

        self.lip_sync.validate()?;

        Ok(self)
    }
}

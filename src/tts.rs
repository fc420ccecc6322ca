/*!
Speech synthesis through a VOICEVOX compatible engine.

Synthesis is a two step exchange: the engine first turns text into an audio
query, the voice parameters are patched into that query, and the patched query
is then rendered to WAV bytes.
*/

use std::path::Path;

use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{http, model::VoiceConfig, Error, Result};

const SERVICE: &str = "TTS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    pub host: String,
    pub port: u16,
    pub timeout_secs: f64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 50021,
            timeout_secs: 30.0,
        }
    }
}

impl TtsConfig {
    pub fn base_url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            format!("{host}:{}", self.port)
        } else {
            format!("http://{host}:{}", self.port)
        }
    }
}

/// Anything that can speak text. Returns WAV bytes, empty when there is nothing to say.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

#[derive(Debug)]
pub struct VoicevoxClient {
    base_url: String,
    timeout_secs: f64,
    voice: VoiceConfig,
    client: reqwest::Client,
}

impl VoicevoxClient {
    pub fn new(config: &TtsConfig, voice: VoiceConfig) -> Result<Self> {
        Ok(Self {
            base_url: config.base_url(),
            timeout_secs: config.timeout_secs,
            voice: voice.clamped(),
            client: http::client(SERVICE, config.timeout_secs)?,
        })
    }

    pub fn voice(&self) -> &VoiceConfig {
        &self.voice
    }

    pub fn set_voice(&mut self, voice: VoiceConfig) {
        self.voice = voice.clamped();
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub async fn audio_query(&self, text: &str) -> Result<Value> {
        let speaker = self.voice.speaker_id.to_string();
        let response = self
            .client
            .post(self.url("/audio_query"))
            .query(&[("text", text), ("speaker", speaker.as_str())])
            .send()
            .await
            .map_err(http::map_err(SERVICE, self.timeout_secs))?;

        http::check(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(http::map_err(SERVICE, self.timeout_secs))
    }

    /// Render a (patched) audio query to WAV bytes.
    pub async fn synthesis(&self, query: &Value) -> Result<Vec<u8>> {
        let speaker = self.voice.speaker_id.to_string();
        let response = self
            .client
            .post(self.url("/synthesis"))
            .query(&[("speaker", speaker.as_str())])
            .json(query)
            .send()
            .await
            .map_err(http::map_err(SERVICE, self.timeout_secs))?;

        let bytes = http::check(SERVICE, response)
            .await?
            .bytes()
            .await
            .map_err(http::map_err(SERVICE, self.timeout_secs))?;

        Ok(bytes.to_vec())
    }

    pub async fn text_to_speech(&self, text: &str) -> Result<Vec<u8>> {
        if text.trim().is_empty() {
            debug!("Nothing to synthesize");
            return Ok(vec![]);
        }

        let mut query = self.audio_query(text).await?;
        apply_voice(&mut query, &self.voice);

        let audio = self.synthesis(&query).await?;
        debug!("Synthesized {} bytes of audio", audio.len());

        Ok(audio)
    }

    pub async fn synthesize_to_file(&self, text: &str, path: impl AsRef<Path>) -> Result<()> {
        let audio = self.text_to_speech(text).await?;
        tokio::fs::write(path, audio).await?;

        Ok(())
    }

    /// The speakers and styles the engine offers, as returned by the engine.
    pub async fn speakers(&self) -> Result<Value> {
        let response = self
            .client
            .get(self.url("/speakers"))
            .send()
            .await
            .map_err(http::map_err(SERVICE, self.timeout_secs))?;

        http::check(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(http::map_err(SERVICE, self.timeout_secs))
    }

    /// The engine version, or `unknown` when it cannot be reached.
    pub async fn version(&self) -> String {
        let result = async {
            let response = self
                .client
                .get(self.url("/version"))
                .send()
                .await
                .map_err(http::map_err(SERVICE, self.timeout_secs))?;

            let body = http::check(SERVICE, response)
                .await?
                .json::<Value>()
                .await
                .map_err(http::map_err(SERVICE, self.timeout_secs))?;

            version_of(&body).ok_or_else(|| Error::Service {
                service: SERVICE,
                reason: format!("unexpected version response: {body}"),
            })
        }
        .await;

        result.unwrap_or_else(|e| {
            warn!("Unable to get engine version: {e}");
            "unknown".to_string()
        })
    }
}

/// Engines answer either with a bare string or with `{"version": "..."}`.
fn version_of(body: &Value) -> Option<String> {
    match body {
        Value::String(v) => Some(v.clone()),
        Value::Object(v) => v.get("version")?.as_str().map(str::to_string),
        _ => None,
    }
}

#[async_trait]
impl SpeechSynthesizer for VoicevoxClient {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        self.text_to_speech(text).await
    }
}

/// Overwrite the scale parameters of an audio query.
pub fn apply_voice(query: &mut Value, voice: &VoiceConfig) {
    let Some(query) = query.as_object_mut() else {
        warn!("Audio query is not an object, leaving it untouched");
        return;
    };

    for (key, value) in [
        ("speedScale", voice.speed_scale),
        ("volumeScale", voice.volume_scale),
        ("pitchScale", voice.pitch_scale),
        ("intonationScale", voice.intonation_scale),
    ] {
        query.insert(key.to_string(), Value::from(value));
    }
}

use serde::{Deserialize, Serialize};

/// Synthesis parameters sent along with every text-to-speech request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub speaker_id: u32,
    pub speed_scale: f32,
    pub volume_scale: f32,
    pub pitch_scale: f32,
    pub intonation_scale: f32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            speaker_id: 1,
            speed_scale: 1.0,
            volume_scale: 1.0,
            pitch_scale: 0.0,
            intonation_scale: 1.0,
        }
    }
}

impl VoiceConfig {
    /// Force every scale into the range the synthesis engine accepts.
    pub fn clamped(self) -> Self {
        Self {
            speaker_id: self.speaker_id,
            speed_scale: self.speed_scale.clamp(0.5, 2.0),
            volume_scale: self.volume_scale.clamp(0.0, 2.0),
            pitch_scale: self.pitch_scale.clamp(-0.15, 0.15),
            intonation_scale: self.intonation_scale.clamp(0.0, 2.0),
        }
    }
}

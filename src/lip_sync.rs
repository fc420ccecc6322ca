/*!
Lip syncing from synthesized speech.

Audio is turned into cepstral frames, each frame is matched against a viseme
template, and the matches are laid out on a timeline that can drive the avatar's
mouth blend shapes.
*/

pub mod classifier;
pub mod features;
pub mod timeline;
pub mod wav;

use std::collections::HashMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    model::{Phoneme, VisemeEvent},
    Error, Result,
};

pub use classifier::{classify, Classification, VisemeTemplates, DEFAULT_TEMPLATES};
pub use features::FeatureExtractor;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LipSyncConfig {
    pub sample_rate: u32,
    pub hop_length: usize,
    pub window_length: usize,
    /// Replacement template vectors, keyed by phoneme.
    pub templates: Option<HashMap<Phoneme, Vec<f32>>>,
}

impl Default for LipSyncConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            hop_length: 512,
            window_length: 2048,
            templates: None,
        }
    }
}

impl LipSyncConfig {
    pub fn validate(&self) -> Result<()> {
        let reason = if self.sample_rate == 0 {
            "lip_sync.sample_rate must be greater than 0"
        } else if self.hop_length == 0 {
            "lip_sync.hop_length must be greater than 0"
        } else if self.window_length < 2 {
            "lip_sync.window_length must be at least 2"
        } else if self.hop_length > self.window_length {
            "lip_sync.hop_length must not exceed lip_sync.window_length"
        } else {
            return Ok(());
        };

        Err(Error::Config {
            path: None,
            reason: reason.to_string(),
        })
    }
}

/// The full audio to viseme pipeline.
#[derive(Debug)]
pub struct LipSync {
    extractor: FeatureExtractor,
    templates: VisemeTemplates,
}

impl LipSync {
    pub fn new(config: &LipSyncConfig) -> Result<Self> {
        config.validate()?;

        let templates = match &config.templates {
            Some(v) => VisemeTemplates::with_overrides(v)?,
            None => VisemeTemplates::default(),
        };

        Ok(Self {
            extractor: FeatureExtractor::new(
                config.sample_rate,
                config.hop_length,
                config.window_length,
            )?,
            templates,
        })
    }

    pub fn templates(&self) -> &VisemeTemplates {
        &self.templates
    }

    /// Analyze a mono waveform recorded at the configured sample rate.
    pub fn analyze(&self, waveform: &[f32]) -> Vec<VisemeEvent> {
        Self::run(&self.extractor, &self.templates, waveform)
    }

    /// Decode WAV bytes and analyze them using the sample rate from the WAV header.
    pub fn analyze_wav(&self, bytes: &[u8]) -> Result<Vec<VisemeEvent>> {
        let wav = wav::decode(bytes)?;
        if wav.sample_rate == 0 {
            return Err(Error::Waveform("WAV header declares a 0 Hz sample rate".to_string()));
        }

        if wav.sample_rate == self.extractor.sample_rate() {
            return Ok(self.analyze(&wav.samples));
        }

        debug!(
            "Audio is {}Hz, building a matching extractor instead of the configured {}Hz",
            wav.sample_rate,
            self.extractor.sample_rate()
        );
        let extractor = FeatureExtractor::new(
            wav.sample_rate,
            self.extractor.hop_length(),
            self.extractor.window_length(),
        )?;

        Ok(Self::run(&extractor, &self.templates, &wav.samples))
    }

    fn run(
        extractor: &FeatureExtractor,
        templates: &VisemeTemplates,
        waveform: &[f32],
    ) -> Vec<VisemeEvent> {
        let frames = extractor.extract(waveform);

        timeline::build(
            &frames,
            extractor.hop_length(),
            extractor.sample_rate(),
            |frame| classify(frame, templates),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::PI;

    use super::*;
    use crate::model::COEFFICIENTS;

    #[test]
    fn silent_window() {
        let lip_sync = LipSync::new(&LipSyncConfig::default()).unwrap();
        let events = lip_sync.analyze(&[0.0; 2048]);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].phoneme, Phoneme::N);
        assert_eq!(events[0].intensity, 1.0);
        assert_eq!(events[0].start_time, 0.0);
        assert_eq!(events[0].end_time, 512.0 / 44100.0);

        let frames = FeatureExtractor::new(44100, 512, 2048)
            .unwrap()
            .extract(&[0.0; 2048]);
        assert_eq!(classify(&frames[0], lip_sync.templates()).distance, 0.0);
    }

    #[test]
    fn empty_waveform() {
        let lip_sync = LipSync::new(&LipSyncConfig::default()).unwrap();

        assert!(lip_sync.analyze(&[]).is_empty());
    }

    #[test]
    fn speech_like_input() {
        let lip_sync = LipSync::new(&LipSyncConfig::default()).unwrap();
        let waveform = (0..44100)
            .map(|i| {
                let t = i as f32 / 44100.0;
                0.3 * (2.0 * PI * 220.0 * t).sin() + 0.1 * (2.0 * PI * 1200.0 * t).sin()
            })
            .collect::<Vec<_>>();

        let events = lip_sync.analyze(&waveform);
        assert_eq!(events.len(), 1 + (44100 - 2048_usize).div_ceil(512));
        assert!(events
            .iter()
            .all(|e| (0.0..=1.0).contains(&e.intensity) && Phoneme::ALL.contains(&e.phoneme)));
        assert!(events.windows(2).all(|w| w[0].end_time == w[1].start_time));
    }

    #[test]
    fn wav_uses_header_rate() {
        let lip_sync = LipSync::new(&LipSyncConfig::default()).unwrap();
        let bytes = wav::tests::encode_i16(&[0; 4096], 1, 24000);

        let events = lip_sync.analyze_wav(&bytes).unwrap();
        assert_eq!(events.len(), 1 + (4096 - 2048) / 512);
        assert_eq!(events[1].start_time, 512.0 / 24000.0);
        assert!(events.iter().all(|e| e.phoneme == Phoneme::N));
    }

    #[test]
    fn unparseable_audio() {
        let lip_sync = LipSync::new(&LipSyncConfig::default()).unwrap();

        assert!(lip_sync.analyze_wav(b"test").is_err());
    }

    #[test]
    fn invalid_configs() {
        for config in [
            LipSyncConfig {
                hop_length: 0,
                ..Default::default()
            },
            LipSyncConfig {
                sample_rate: 0,
                ..Default::default()
            },
            LipSyncConfig {
                hop_length: 4096,
                ..Default::default()
            },
        ] {
            assert!(matches!(LipSync::new(&config), Err(Error::Config { .. })));
        }
    }

    #[test]
    fn template_overrides_from_json() {
        let config = serde_json::from_str::<LipSyncConfig>(&format!(
            r#"{{"templates": {{"a": {:?}}}}}"#,
            vec![2.0_f32; COEFFICIENTS]
        ))
        .unwrap();

        let lip_sync = LipSync::new(&config).unwrap();
        assert_eq!(config.hop_length, 512);
        assert_eq!(
            lip_sync.templates().get(Phoneme::A).map(|v| v[0]),
            Some(2.0)
        );
    }
}

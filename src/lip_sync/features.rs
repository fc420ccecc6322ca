/*!
Short-time cepstral analysis.

Each window is Hann-weighted, transformed with a forward FFT, reduced to a
mel-spaced filterbank, log-compressed and decorrelated with a DCT-II. Only the
first [COEFFICIENTS] terms are kept.
*/

use std::{f32::consts::PI, sync::Arc};

use rayon::prelude::*;
use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::{
    model::{AcousticFrame, COEFFICIENTS},
    Error, Result,
};

/// Number of triangular mel filters.
const MEL_BANDS: usize = 40;

pub struct FeatureExtractor {
    sample_rate: u32,
    hop_length: usize,
    window_length: usize,

    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    /// One row per mel band, one column per positive-frequency bin.
    mel_filters: Vec<Vec<f32>>,
    /// One row per kept coefficient, one column per mel band.
    dct: Vec<[f32; MEL_BANDS]>,
}

impl std::fmt::Debug for FeatureExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureExtractor")
            .field("sample_rate", &self.sample_rate)
            .field("hop_length", &self.hop_length)
            .field("window_length", &self.window_length)
            .finish_non_exhaustive()
    }
}

impl FeatureExtractor {
    /// Fails with [Error::Config] when any argument is zero.
    pub fn new(sample_rate: u32, hop_length: usize, window_length: usize) -> Result<Self> {
        if sample_rate == 0 || hop_length == 0 || window_length == 0 {
            return Err(Error::Config {
                path: None,
                reason: format!(
                    "sample rate {sample_rate}, hop {hop_length} and window {window_length} \
                     must all be greater than 0"
                ),
            });
        }

        let fft = FftPlanner::new().plan_fft_forward(window_length);

        // Periodic hann window
        let window = (0..window_length)
            .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / window_length as f32).cos())
            .collect();

        Ok(Self {
            sample_rate,
            hop_length,
            window_length,

            fft,
            window,
            mel_filters: mel_filterbank(sample_rate, window_length),
            dct: dct_matrix(),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn hop_length(&self) -> usize {
        self.hop_length
    }

    pub fn window_length(&self) -> usize {
        self.window_length
    }

    /// How many frames [FeatureExtractor::extract] produces for `samples` samples.
    ///
    /// Windows are not centered. A trailing partial window is zero-padded, so any
    /// non-empty input yields at least one frame.
    pub fn frame_count(&self, samples: usize) -> usize {
        if samples == 0 {
            0
        } else if samples <= self.window_length {
            1
        } else {
            1 + (samples - self.window_length).div_ceil(self.hop_length)
        }
    }

    /// Convert a mono waveform into cepstral frames, one per hop.
    pub fn extract(&self, waveform: &[f32]) -> Vec<AcousticFrame> {
        (0..self.frame_count(waveform.len()))
            .into_par_iter()
            .map(|idx| self.frame_at(waveform, idx * self.hop_length))
            .collect()
    }

    fn frame_at(&self, waveform: &[f32], start: usize) -> AcousticFrame {
        let mut buffer = self
            .window
            .iter()
            .enumerate()
            .map(|(i, w)| {
                let sample = waveform.get(start + i).copied().unwrap_or_default();
                Complex::new(sample * w, 0.0)
            })
            .collect::<Vec<_>>();

        self.fft.process(&mut buffer);

        let scale = 1.0 / self.window_length as f32;
        let power = buffer[..=self.window_length / 2]
            .iter()
            .map(|c| c.norm_sqr() * scale)
            .collect::<Vec<_>>();

        // ln(1 + x) keeps digital silence at the origin
        let mut mel = [0.0_f32; MEL_BANDS];
        for (band, filter) in mel.iter_mut().zip(self.mel_filters.iter()) {
            let energy = filter
                .iter()
                .zip(power.iter())
                .map(|(w, p)| w * p)
                .sum::<f32>();
            *band = energy.ln_1p();
        }

        let mut coefficients = [0.0_f32; COEFFICIENTS];
        for (c, basis) in coefficients.iter_mut().zip(self.dct.iter()) {
            *c = basis.iter().zip(mel.iter()).map(|(b, m)| b * m).sum();
        }

        AcousticFrame(coefficients)
    }
}

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0_f32.powf(mel / 2595.0) - 1.0)
}

/// Triangular filters evenly spaced on the mel scale between 0 Hz and Nyquist.
fn mel_filterbank(sample_rate: u32, fft_size: usize) -> Vec<Vec<f32>> {
    let bins = fft_size / 2 + 1;
    let nyquist = sample_rate as f32 / 2.0;
    let max_mel = hz_to_mel(nyquist);

    let edges = (0..MEL_BANDS + 2)
        .map(|i| mel_to_hz(max_mel * i as f32 / (MEL_BANDS + 1) as f32))
        .collect::<Vec<_>>();
    let bin_hz = sample_rate as f32 / fft_size as f32;

    (0..MEL_BANDS)
        .map(|m| {
            let (lower, center, upper) = (edges[m], edges[m + 1], edges[m + 2]);

            (0..bins)
                .map(|k| {
                    let hz = k as f32 * bin_hz;
                    let rising = (hz - lower) / (center - lower);
                    let falling = (upper - hz) / (upper - center);

                    rising.min(falling).max(0.0)
                })
                .collect()
        })
        .collect()
}

/// Orthonormal DCT-II basis, truncated to the kept coefficients.
fn dct_matrix() -> Vec<[f32; MEL_BANDS]> {
    let n = MEL_BANDS as f32;

    (0..COEFFICIENTS)
        .map(|k| {
            let scale = if k == 0 {
                (1.0 / n).sqrt()
            } else {
                (2.0 / n).sqrt()
            };

            let mut row = [0.0; MEL_BANDS];
            for (m, v) in row.iter_mut().enumerate() {
                *v = scale * (PI * k as f32 * (2.0 * m as f32 + 1.0) / (2.0 * n)).cos();
            }

            row
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> FeatureExtractor {
        FeatureExtractor::new(44100, 512, 2048).unwrap()
    }

    fn sine(freq: f32, samples: usize) -> Vec<f32> {
        (0..samples)
            .map(|i| (2.0 * PI * freq * i as f32 / 44100.0).sin() * 0.5)
            .collect()
    }

    #[test]
    fn frame_counts() {
        let e = extractor();

        assert_eq!(e.frame_count(0), 0);
        assert_eq!(e.frame_count(1), 1);
        assert_eq!(e.frame_count(2048), 1);
        assert_eq!(e.frame_count(2049), 2);
        assert_eq!(e.frame_count(2048 + 512), 2);
        assert_eq!(e.frame_count(2048 + 513), 3);
    }

    #[test]
    fn zero_sizes_are_rejected() {
        assert!(matches!(
            FeatureExtractor::new(44100, 0, 2048),
            Err(Error::Config { .. })
        ));
        assert!(FeatureExtractor::new(44100, 512, 0).is_err());
        assert!(FeatureExtractor::new(0, 512, 2048).is_err());
    }

    #[test]
    fn empty_waveform() {
        assert!(extractor().extract(&[]).is_empty());
    }

    #[test]
    fn silence_is_the_origin() {
        let frames = extractor().extract(&[0.0; 2048]);

        assert_eq!(frames.len(), 1);
        assert!(frames[0].iter().all(|c| *c == 0.0));
    }

    #[test]
    fn tone_has_energy() {
        let frames = extractor().extract(&sine(440.0, 44100 / 4));

        assert_eq!(frames.len(), extractor().frame_count(44100 / 4));
        assert!(frames.iter().all(|f| f.len() == COEFFICIENTS));
        assert!(frames.iter().all(|f| f[0] > 0.0));
        assert!(frames.iter().flat_map(|f| f.iter()).all(|c| c.is_finite()));
    }

    #[test]
    fn deterministic() {
        let waveform = sine(880.0, 10_000);
        let e = extractor();

        assert_eq!(e.extract(&waveform), e.extract(&waveform));
    }

    #[test]
    fn short_input_is_padded() {
        let frames = extractor().extract(&sine(440.0, 100));

        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn filterbank_shape() {
        let filters = mel_filterbank(44100, 2048);

        assert_eq!(filters.len(), MEL_BANDS);
        assert!(filters.iter().all(|f| f.len() == 1025));
        assert!(filters.iter().all(|f| f.iter().any(|w| *w > 0.0)));
    }

    #[test]
    fn dct_rows_are_orthonormal() {
        let dct = dct_matrix();

        for (i, a) in dct.iter().enumerate() {
            for (j, b) in dct.iter().enumerate() {
                let dot = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum::<f32>();
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((dot - expected).abs() < 1e-4, "{i} {j} {dot}");
            }
        }
    }
}

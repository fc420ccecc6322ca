use std::io::Cursor;

use hound::{SampleFormat, WavReader};

use crate::{Error, Result};

/// A mono waveform with samples in `-1.0-1.0`.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Decode RIFF/WAV bytes. Multi-channel audio is averaged down to mono.
pub fn decode(bytes: &[u8]) -> Result<Waveform> {
    let mut reader = WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    if spec.channels == 0 {
        return Err(Error::Waveform("WAV header declares zero channels".to_string()));
    }

    let interleaved = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()?,
        SampleFormat::Int => {
            let scale = 1.0 / (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|v| v.map(|v| v as f32 * scale))
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
    };

    let channels = spec.channels as usize;
    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|chunk| chunk.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    Ok(Waveform {
        samples,
        sample_rate: spec.sample_rate,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use hound::{WavSpec, WavWriter};

    use super::*;

    /// Encode 16-bit PCM for tests elsewhere in the crate.
    pub(crate) fn encode_i16(samples: &[i16], channels: u16, sample_rate: u32) -> Vec<u8> {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            for s in samples {
                writer.write_sample(*s).unwrap();
            }
            writer.finalize().unwrap();
        }

        cursor.into_inner()
    }

    #[test]
    fn mono_i16() {
        let bytes = encode_i16(&[0, 16384, -32768], 1, 24000);
        let wav = decode(&bytes).unwrap();

        assert_eq!(wav.sample_rate, 24000);
        assert_eq!(wav.samples, vec![0.0, 0.5, -1.0]);
    }

    #[test]
    fn stereo_is_downmixed() {
        let bytes = encode_i16(&[16384, 0, -16384, -16384], 2, 44100);
        let wav = decode(&bytes).unwrap();

        assert_eq!(wav.samples, vec![0.25, -0.5]);
    }

    #[test]
    fn float_samples() {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 44100,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            writer.write_sample(0.75_f32).unwrap();
            writer.finalize().unwrap();
        }

        let wav = decode(&cursor.into_inner()).unwrap();
        assert_eq!(wav.samples, vec![0.75]);
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(matches!(
            decode(b"fake audio data"),
            Err(Error::Waveform(_))
        ));
    }
}

use log::debug;

use super::classifier::Classification;
use crate::model::{AcousticFrame, VisemeEvent};

/// Distance at which a match is considered to have no intensity at all.
const DISTANCE_SCALE: f32 = 10.0;

/// The unbounded intensity for a template distance. Negative once `distance` passes 10.
pub fn raw_intensity(distance: f32) -> f32 {
    1.0 - distance / DISTANCE_SCALE
}

/// Turn per-frame classifications into contiguous, one-hop-long viseme events.
///
/// Consecutive frames with the same phoneme are intentionally not merged. Intensities
/// are clamped to `0.0-1.0`.
pub fn build<F>(
    frames: &[AcousticFrame],
    hop_length: usize,
    sample_rate: u32,
    classify: F,
) -> Vec<VisemeEvent>
where
    F: Fn(&AcousticFrame) -> Classification,
{
    let frame_duration = hop_length as f64 / sample_rate as f64;
    let mut clamped = 0;

    let events = frames
        .iter()
        .enumerate()
        .map(|(idx, frame)| {
            let Classification { phoneme, distance } = classify(frame);

            let raw = raw_intensity(distance);
            let intensity = if raw.is_nan() { 0.0 } else { raw.clamp(0.0, 1.0) };
            if intensity != raw {
                clamped += 1;
            }

            VisemeEvent {
                phoneme,
                start_time: idx as f64 * frame_duration,
                end_time: (idx + 1) as f64 * frame_duration,
                intensity,
            }
        })
        .collect::<Vec<_>>();

    if clamped > 0 {
        debug!("Clamped {clamped} of {} viseme intensities", events.len());
    }

    events
}

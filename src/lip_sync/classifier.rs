use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::{
    model::{AcousticFrame, Phoneme, COEFFICIENTS},
    Result,
};

/// Hand-specified templates: one unit axis per vowel, the origin for neutral.
pub static DEFAULT_TEMPLATES: Lazy<VisemeTemplates> = Lazy::new(VisemeTemplates::unit_vectors);

/// Reference vectors for each [Phoneme], iterated in [Phoneme::ALL] order.
#[derive(Debug, Clone, PartialEq)]
pub struct VisemeTemplates {
    entries: Vec<(Phoneme, AcousticFrame)>,
}

impl Default for VisemeTemplates {
    fn default() -> Self {
        DEFAULT_TEMPLATES.clone()
    }
}

impl VisemeTemplates {
    fn unit_vectors() -> Self {
        let entries = Phoneme::ALL
            .iter()
            .enumerate()
            .map(|(axis, phoneme)| {
                let mut v = [0.0; COEFFICIENTS];
                if phoneme.is_vowel() {
                    v[axis] = 1.0;
                }

                (*phoneme, AcousticFrame(v))
            })
            .collect();

        Self { entries }
    }

    /// Build templates from user-supplied vectors.
    ///
    /// Phonemes missing from `overrides` keep their default vector. Every supplied
    /// vector must have exactly [COEFFICIENTS] values.
    pub fn with_overrides(overrides: &HashMap<Phoneme, Vec<f32>>) -> Result<Self> {
        let mut templates = Self::default();

        for (phoneme, frame) in templates.entries.iter_mut() {
            if let Some(v) = overrides.get(phoneme) {
                *frame = AcousticFrame::from_slice(v)?;
            }
        }

        Ok(templates)
    }

    pub fn get(&self, phoneme: Phoneme) -> Option<&AcousticFrame> {
        self.entries
            .iter()
            .find(|(p, _)| *p == phoneme)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Phoneme, AcousticFrame)> {
        self.entries.iter()
    }
}

/// The closest template for a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub phoneme: Phoneme,
    /// Euclidean distance to the matched template. Unbounded.
    pub distance: f32,
}

/// Find the nearest template by Euclidean distance. Ties keep the earlier template.
pub fn classify(frame: &AcousticFrame, templates: &VisemeTemplates) -> Classification {
    let mut best = Classification {
        phoneme: Phoneme::N,
        distance: f32::INFINITY,
    };

    for (phoneme, template) in templates.iter() {
        let distance = frame.distance(template);
        if distance < best.distance {
            best = Classification {
                phoneme: *phoneme,
                distance,
            };
        }
    }

    best
}

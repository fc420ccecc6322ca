use std::{fmt::Display, ops::Deref, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Number of cepstral coefficients in an [AcousticFrame].
pub const COEFFICIENTS: usize = 13;

/// A mouth shape class. The five Japanese vowels plus neutral/silence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phoneme {
    A,
    I,
    U,
    E,
    O,
    N,
}

impl Phoneme {
    /// Template iteration order. Classification ties resolve to the earliest entry.
    pub const ALL: [Phoneme; 6] = [
        Phoneme::A,
        Phoneme::I,
        Phoneme::U,
        Phoneme::E,
        Phoneme::O,
        Phoneme::N,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phoneme::A => "a",
            Phoneme::I => "i",
            Phoneme::U => "u",
            Phoneme::E => "e",
            Phoneme::O => "o",
            Phoneme::N => "n",
        }
    }

    pub fn is_vowel(&self) -> bool {
        *self != Phoneme::N
    }
}

impl Display for Phoneme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phoneme {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "a" => Ok(Self::A),
            "i" => Ok(Self::I),
            "u" => Ok(Self::U),
            "e" => Ok(Self::E),
            "o" => Ok(Self::O),
            "n" | "sil" | "neutral" => Ok(Self::N),
            _ => Err(format!("Unknown phoneme: {s}")),
        }
    }
}

/// The cepstral coefficients for one analysis window.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct AcousticFrame(pub [f32; COEFFICIENTS]);

impl AcousticFrame {
    pub fn from_slice(values: &[f32]) -> Result<Self> {
        let values: [f32; COEFFICIENTS] =
            values.try_into().map_err(|_| Error::DimensionMismatch {
                expected: COEFFICIENTS,
                actual: values.len(),
            })?;

        Ok(Self(values))
    }

    pub fn distance(&self, other: &AcousticFrame) -> f32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f32>()
            .sqrt()
    }
}

impl Deref for AcousticFrame {
    type Target = [f32; COEFFICIENTS];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// One timed mouth shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VisemeEvent {
    pub phoneme: Phoneme,
    /// Seconds from the start of the audio.
    pub start_time: f64,
    pub end_time: f64,
    /// `0.0-1.0`, higher means a closer template match.
    pub intensity: f32,
}

impl VisemeEvent {
    pub fn contains(&self, time: f64) -> bool {
        time >= self.start_time && time < self.end_time
    }
}

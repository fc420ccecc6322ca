use serde::{Deserialize, Serialize};

/// Every expression an avatar can be driven with, in export order.
pub const AVAILABLE_EXPRESSIONS: [&str; 5] = ["happy", "angry", "sad", "relaxed", "surprised"];

/// Blend shape weights for the VRM preset expressions.
///
/// Weights are expected to be in `0.0-1.0`. Nothing stops a caller from storing
/// other values, use [Expression::clamped] when the source is untrusted.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Expression {
    pub happy: f32,
    pub angry: f32,
    pub sad: f32,
    pub relaxed: f32,
    pub surprised: f32,
}

impl Expression {
    /// The expression applied after the streamer finishes speaking a reply.
    pub fn reply() -> Self {
        Self {
            happy: 0.3,
            relaxed: 0.7,
            ..Default::default()
        }
    }

    pub fn clamped(self) -> Self {
        Self {
            happy: clamp_weight(self.happy),
            angry: clamp_weight(self.angry),
            sad: clamp_weight(self.sad),
            relaxed: clamp_weight(self.relaxed),
            surprised: clamp_weight(self.surprised),
        }
    }

    pub fn get(&self, name: &str) -> Option<f32> {
        match name {
            "happy" => Some(self.happy),
            "angry" => Some(self.angry),
            "sad" => Some(self.sad),
            "relaxed" => Some(self.relaxed),
            "surprised" => Some(self.surprised),
            _ => None,
        }
    }

    /// Pairs of expression name and weight, in [AVAILABLE_EXPRESSIONS] order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f32)> {
        [
            self.happy,
            self.angry,
            self.sad,
            self.relaxed,
            self.surprised,
        ]
        .into_iter()
        .enumerate()
        .map(|(idx, v)| (AVAILABLE_EXPRESSIONS[idx], v))
    }
}

fn clamp_weight(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

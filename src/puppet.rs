/*!
The avatar being driven.

An [Avatar] owns its loaded [AvatarModel] along with the current expression,
pose and lip sync track. It is not synchronized internally, exactly one owner
should mutate it at a time.
*/

pub mod gltf;

use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    model::{Expression, Phoneme, PoseState, Vector3, VisemeEvent, AVAILABLE_EXPRESSIONS},
    Result,
};

pub use gltf::{AssetLoadError, AvatarModel};

/// The persisted animation state.
///
/// `rotation` holds the euler angles passed to [Avatar::update_pose], not the
/// derived quaternion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnimationSnapshot {
    pub blend_shapes: Expression,
    pub position: Vector3,
    pub rotation: Vector3,
}

/// Mouth blend shape weights for the vowel visemes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MouthShape {
    pub a: f32,
    pub i: f32,
    pub u: f32,
    pub e: f32,
    pub o: f32,
}

impl MouthShape {
    fn from_event(event: &VisemeEvent) -> Self {
        let mut shape = Self::default();
        let weight = match event.phoneme {
            Phoneme::A => &mut shape.a,
            Phoneme::I => &mut shape.i,
            Phoneme::U => &mut shape.u,
            Phoneme::E => &mut shape.e,
            Phoneme::O => &mut shape.o,
            Phoneme::N => return shape,
        };
        *weight = event.intensity;

        shape
    }
}

#[derive(Debug)]
pub struct Avatar {
    model_path: PathBuf,
    model: AvatarModel,
    is_placeholder: bool,

    expression: Expression,
    /// `None` until the first [Avatar::update_pose].
    pose: Option<PoseState>,
    lip_sync: Vec<VisemeEvent>,
}

impl Avatar {
    /// Load the model at `path`. Any failure is logged and a placeholder model is used instead.
    pub fn load_or_default(path: impl AsRef<Path>, expression: Expression) -> Self {
        let path = path.as_ref();

        let (model, is_placeholder) = match AvatarModel::load(path) {
            Ok(v) => {
                info!(
                    "Loaded avatar {} with {} nodes",
                    path.display(),
                    v.node_count()
                );
                (v, false)
            }
            Err(e) => {
                warn!("{e} ({}), using a placeholder model", path.display());
                (AvatarModel::placeholder(), true)
            }
        };

        Self::with_model(path, model, is_placeholder, expression)
    }

    pub fn with_model(
        path: impl Into<PathBuf>,
        model: AvatarModel,
        is_placeholder: bool,
        expression: Expression,
    ) -> Self {
        Self {
            model_path: path.into(),
            model,
            is_placeholder,

            expression: expression.clamped(),
            pose: None,
            lip_sync: vec![],
        }
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    pub fn model(&self) -> &AvatarModel {
        &self.model
    }

    pub fn is_placeholder(&self) -> bool {
        self.is_placeholder
    }

    /// The expressions that can be set, in a stable order.
    pub fn available_expressions() -> &'static [&'static str] {
        &AVAILABLE_EXPRESSIONS
    }

    pub fn expression(&self) -> Expression {
        self.expression
    }

    /// Replace every expression weight. Weights outside `0.0-1.0` are clamped.
    pub fn set_expression(&mut self, expression: Expression) {
        let clamped = expression.clamped();
        if clamped != expression {
            debug!("Clamped expression {expression:?}");
        }

        self.expression = clamped;
    }

    pub fn pose(&self) -> Option<&PoseState> {
        self.pose.as_ref()
    }

    /// Move the avatar root. `rotation` is XYZ euler angles in radians.
    pub fn update_pose(&mut self, position: impl Into<Vector3>, rotation: impl Into<Vector3>) {
        let pose = PoseState::new(position.into(), rotation.into());
        self.model
            .set_root_transform(pose.position, pose.orientation);

        self.pose = Some(pose);
    }

    pub fn lip_sync(&self) -> &[VisemeEvent] {
        &self.lip_sync
    }

    /// Replace the lip sync track. `events` must be ordered by time.
    pub fn set_lip_sync(&mut self, events: Vec<VisemeEvent>) {
        self.lip_sync = events;
    }

    /// Length of the current lip sync track in seconds.
    pub fn lip_sync_duration(&self) -> f64 {
        self.lip_sync.last().map(|v| v.end_time).unwrap_or_default()
    }

    /// Mouth weights at `time` seconds into the lip sync track. Closed outside the track.
    pub fn mouth_at(&self, time: f64) -> MouthShape {
        let idx = self.lip_sync.partition_point(|v| v.end_time <= time);

        match self.lip_sync.get(idx) {
            Some(event) if event.contains(time) => MouthShape::from_event(event),
            _ => MouthShape::default(),
        }
    }

    pub fn snapshot(&self) -> AnimationSnapshot {
        let pose = self.pose.unwrap_or_default();

        AnimationSnapshot {
            blend_shapes: self.expression,
            position: pose.position,
            rotation: pose.rotation,
        }
    }

    /// The snapshot as indented JSON.
    pub fn export_snapshot(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.snapshot())?)
    }

    /// The whole node graph, including the current root transform.
    pub fn to_gltf_json(&self) -> Result<String> {
        Ok(self.model.to_json_string()?)
    }

    pub fn export_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.export_snapshot()?)?;
        debug!("Exported animation to {}", path.display());

        Ok(())
    }
}

/*!
Just enough glTF to move a model around.

Both `.gltf` (plain JSON) and binary `.glb`/`.vrm` containers are accepted. Only
the JSON document is kept, and only the translation/rotation of the first node
is ever modified.
*/

use std::{fmt::Display, path::Path};

use serde_json::{json, Value};

use crate::model::{Quaternion, Vector3};

/// `glTF` in little endian.
const GLB_MAGIC: u32 = 0x4654_6C67;
/// `JSON` in little endian.
const CHUNK_JSON: u32 = 0x4E4F_534A;
const GLB_HEADER_LEN: usize = 12;
const CHUNK_HEADER_LEN: usize = 8;

/// Reasons a model could not be used. These never escape the puppet module.
#[derive(Debug)]
pub enum AssetLoadError {
    Io(std::io::Error),
    InvalidContainer(String),
    Json(serde_json::Error),
    NoNodes,
}

impl Display for AssetLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "Unable to read model: {e}"),
            Self::InvalidContainer(reason) => write!(f, "Invalid glb container: {reason}"),
            Self::Json(e) => write!(f, "Invalid glTF json: {e}"),
            Self::NoNodes => write!(f, "Model has no scene nodes"),
        }
    }
}

impl std::error::Error for AssetLoadError {}

/// The scene description of a loaded avatar.
#[derive(Debug, Clone, PartialEq)]
pub struct AvatarModel {
    document: Value,
}

impl AvatarModel {
    /// A single node at the origin with no rotation.
    pub fn placeholder() -> Self {
        Self {
            document: json!({
                "asset": { "version": "2.0", "generator": env!("CARGO_PKG_NAME") },
                "scene": 0,
                "scenes": [{ "nodes": [0] }],
                "nodes": [{
                    "name": "placeholder",
                    "translation": [0.0, 0.0, 0.0],
                    "rotation": [0.0, 0.0, 0.0, 1.0]
                }]
            }),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, AssetLoadError> {
        let bytes = std::fs::read(path).map_err(AssetLoadError::Io)?;

        Self::parse(&bytes)
    }

    /// Parse either a binary container or a plain JSON document.
    pub fn parse(bytes: &[u8]) -> Result<Self, AssetLoadError> {
        let json = if read_u32(bytes, 0) == Some(GLB_MAGIC) {
            glb_json_chunk(bytes)?
        } else {
            bytes
        };

        let document = serde_json::from_slice::<Value>(json).map_err(AssetLoadError::Json)?;
        match document.get("nodes").and_then(Value::as_array) {
            Some(nodes) if nodes.first().map(Value::is_object).unwrap_or(false) => {}
            _ => return Err(AssetLoadError::NoNodes),
        }

        Ok(Self { document })
    }

    pub fn node_count(&self) -> usize {
        self.document
            .get("nodes")
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or_default()
    }

    fn root(&self) -> Option<&serde_json::Map<String, Value>> {
        self.document.get("nodes")?.get(0)?.as_object()
    }

    pub fn root_name(&self) -> Option<&str> {
        self.root()?.get("name")?.as_str()
    }

    /// Translation of the first node, the origin when unset.
    pub fn root_translation(&self) -> Vector3 {
        self.root()
            .and_then(|v| v.get("translation"))
            .and_then(|v| serde_json::from_value::<Vector3>(v.clone()).ok())
            .unwrap_or_default()
    }

    /// Rotation of the first node, identity when unset.
    pub fn root_rotation(&self) -> Quaternion {
        self.root()
            .and_then(|v| v.get("rotation"))
            .and_then(|v| serde_json::from_value::<Quaternion>(v.clone()).ok())
            .unwrap_or_default()
    }

    pub fn set_root_transform(&mut self, translation: Vector3, rotation: Quaternion) {
        let Some(root) = self
            .document
            .get_mut("nodes")
            .and_then(|v| v.get_mut(0))
            .and_then(Value::as_object_mut)
        else {
            // Checked on load
            return;
        };

        // A matrix and TRS properties are mutually exclusive
        root.remove("matrix");
        root.insert(
            "translation".into(),
            json!([translation.x, translation.y, translation.z]),
        );
        root.insert(
            "rotation".into(),
            json!([rotation.x, rotation.y, rotation.z, rotation.w]),
        );
    }

    /// Serialize the whole scene description.
    pub fn to_json_string(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.document)
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    let v = bytes.get(offset..offset + 4)?;

    Some(u32::from_le_bytes([v[0], v[1], v[2], v[3]]))
}

fn glb_json_chunk(bytes: &[u8]) -> Result<&[u8], AssetLoadError> {
    let invalid = |reason: &str| AssetLoadError::InvalidContainer(reason.to_string());

    let version = read_u32(bytes, 4).ok_or_else(|| invalid("truncated header"))?;
    if version != 2 {
        return Err(AssetLoadError::InvalidContainer(format!(
            "unsupported version {version}"
        )));
    }

    let chunk_len = read_u32(bytes, GLB_HEADER_LEN).ok_or_else(|| invalid("missing json chunk"))?;
    let chunk_type =
        read_u32(bytes, GLB_HEADER_LEN + 4).ok_or_else(|| invalid("missing json chunk"))?;
    if chunk_type != CHUNK_JSON {
        return Err(invalid("first chunk is not json"));
    }

    let start = GLB_HEADER_LEN + CHUNK_HEADER_LEN;
    bytes
        .get(start..start + chunk_len as usize)
        .ok_or_else(|| invalid("json chunk is truncated"))
}

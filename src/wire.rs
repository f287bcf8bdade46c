use crate::error::{LinkError, Result};
use nalgebra as na;
use serde::{Deserialize, Serialize};

/// Transform of a tag in the tracking camera's reference frame.
///
/// Either part may be `null`, absent or an empty list, in which case that axis is
/// left untouched by the receiver.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Transform {
    /// Translation `[x, y, z]`
    #[serde(default)]
    pub t: Option<Vec<f64>>,
    /// Rotation quaternion `[x, y, z, w]`
    #[serde(default)]
    pub rq: Option<Vec<f64>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PosePacket {
    /// Milliseconds since the unix epoch at which the tag was located
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<u64>,
    pub name: String,
    pub transform: Transform,
}

impl PosePacket {
    pub fn deserialize(line: &str) -> Result<PosePacket> {
        Ok(serde_json::from_str::<PosePacket>(line.trim())?)
    }

    /// One line of the wire format, newline included.
    pub fn to_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

impl Transform {
    pub fn new(translation: na::Vector3<f64>, rotation: na::UnitQuaternion<f64>) -> Self {
        let q = rotation.quaternion();
        Self {
            t: Some(vec![translation.x, translation.y, translation.z]),
            rq: Some(vec![q.i, q.j, q.k, q.w]),
        }
    }

    /// `None` when the packet carries no usable translation.
    pub fn translation(&self) -> Result<Option<na::Vector3<f64>>> {
        match &self.t {
            Some(t) if !t.is_empty() => t.as_slice().to_translation().map(Some),
            _ => Ok(None),
        }
    }

    /// `None` when the packet carries no usable rotation.
    pub fn rotation(&self) -> Result<Option<na::UnitQuaternion<f64>>> {
        match &self.rq {
            Some(rq) if !rq.is_empty() => rq.as_slice().to_rotation().map(Some),
            _ => Ok(None),
        }
    }
}

/// Reorders a wire quaternion `[x, y, z, w]` into nalgebra's `(w, i, j, k)` form.
pub fn wire_to_quaternion(xyzw: [f64; 4]) -> na::Quaternion<f64> {
    na::Quaternion::new(xyzw[3], xyzw[0], xyzw[1], xyzw[2])
}

pub trait WirePose {
    fn to_translation(&self) -> Result<na::Vector3<f64>>;
    fn to_rotation(&self) -> Result<na::UnitQuaternion<f64>>;
}

impl WirePose for [f64] {
    fn to_translation(&self) -> Result<na::Vector3<f64>> {
        match *self {
            [x, y, z] => Ok(na::Vector3::new(x, y, z)),
            _ => Err(LinkError::MalformedTransform(format!(
                "translation needs 3 components, got {}",
                self.len()
            ))),
        }
    }

    fn to_rotation(&self) -> Result<na::UnitQuaternion<f64>> {
        let quaternion = match *self {
            [x, y, z, w] => wire_to_quaternion([x, y, z, w]),
            _ => {
                return Err(LinkError::MalformedTransform(format!(
                    "rotation needs 4 components, got {}",
                    self.len()
                )))
            }
        };
        let norm = quaternion.norm();
        if !norm.is_normal() {
            return Err(LinkError::MalformedTransform(format!(
                "rotation quaternion {:?} can not be normalized",
                self
            )));
        }
        Ok(na::UnitQuaternion::from_quaternion(quaternion))
    }
}

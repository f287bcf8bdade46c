use crate::error::{LinkError, Result};
use crate::scene::{Host, ViewState};
use crate::wire::PosePacket;
use log::*;
use nalgebra as na;

/// Poses of the tag and the bound object when the first packet arrived.
///
/// The object pose is stored in the viewport's frame, relative to the eye.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationSnapshot {
    pub object_id: String,
    pub tag_translation: na::Vector3<f64>,
    pub tag_rotation_inv: na::UnitQuaternion<f64>,
    pub object_translation: na::Vector3<f64>,
    pub object_rotation: na::UnitQuaternion<f64>,
}

impl CalibrationSnapshot {
    pub fn capture(
        object_id: String,
        tag_translation: na::Vector3<f64>,
        tag_rotation: na::UnitQuaternion<f64>,
        object_position: na::Point3<f64>,
        object_orientation: na::UnitQuaternion<f64>,
        view: &ViewState,
    ) -> Self {
        let view_rotation_inv = view.rotation.inverse();
        Self {
            object_id,
            tag_translation,
            tag_rotation_inv: tag_rotation.inverse(),
            object_translation: view_rotation_inv * (object_position - view.eye_position()),
            object_rotation: view_rotation_inv * object_orientation,
        }
    }

    pub fn object_position(
        &self,
        tag_translation: &na::Vector3<f64>,
        view: &ViewState,
        scale: f64,
    ) -> na::Point3<f64> {
        let delta = tag_translation - self.tag_translation;
        view.eye_position() + view.rotation * (self.object_translation + scale * delta)
    }

    pub fn object_orientation(
        &self,
        tag_rotation: &na::UnitQuaternion<f64>,
        view: &ViewState,
    ) -> na::UnitQuaternion<f64> {
        let delta = self.tag_rotation_inv * tag_rotation;
        view.rotation * self.object_rotation * delta
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketOutcome {
    /// Packet belongs to another tag.
    Ignored,
    Calibrated,
    Applied { translated: bool, rotated: bool },
}

pub struct PoseIntegrator {
    bound_tag: String,
    snapshot: Option<CalibrationSnapshot>,
}

impl PoseIntegrator {
    pub fn new(bound_tag: impl Into<String>) -> Self {
        Self {
            bound_tag: bound_tag.into(),
            snapshot: None,
        }
    }

    pub fn bound_tag(&self) -> &str {
        &self.bound_tag
    }

    pub fn snapshot(&self) -> Option<&CalibrationSnapshot> {
        self.snapshot.as_ref()
    }

    /// Applies one packet to the bound object.
    ///
    /// The target object is only written once the whole packet has been validated.
    pub fn handle(
        &mut self,
        packet: &PosePacket,
        host: &mut dyn Host,
        scale: f64,
    ) -> Result<PacketOutcome> {
        if packet.name != self.bound_tag {
            return Ok(PacketOutcome::Ignored);
        }
        let view = host.view_state().ok_or(LinkError::MissingViewport)?;
        let translation = packet.transform.translation()?;
        let rotation = packet.transform.rotation()?;

        let snapshot = match &self.snapshot {
            Some(snapshot) => snapshot,
            None => {
                let tag_translation = translation.ok_or_else(|| {
                    LinkError::MalformedTransform("first packet has no translation".to_owned())
                })?;
                let tag_rotation = rotation.ok_or_else(|| {
                    LinkError::MalformedTransform("first packet has no rotation".to_owned())
                })?;
                let object_id = host.active_object().ok_or(LinkError::MissingObject)?;
                let object = host
                    .object_mut(&object_id)
                    .ok_or(LinkError::MissingObject)?;
                let snapshot = CalibrationSnapshot::capture(
                    object_id,
                    tag_translation,
                    tag_rotation,
                    object.position(),
                    object.orientation(),
                    &view,
                );
                info!(
                    "Bound tag \"{}\" to object \"{}\"",
                    self.bound_tag, snapshot.object_id
                );
                self.snapshot = Some(snapshot);
                return Ok(PacketOutcome::Calibrated);
            }
        };

        let position = translation.map(|t| snapshot.object_position(&t, &view, scale));
        let orientation = rotation.map(|rq| snapshot.object_orientation(&rq, &view));
        let object = host
            .object_mut(&snapshot.object_id)
            .ok_or(LinkError::MissingObject)?;
        if let Some(position) = position {
            object.set_position(position);
        }
        if let Some(orientation) = orientation {
            object.set_orientation(orientation);
        }
        trace!("Applied packet for \"{}\"", self.bound_tag);
        Ok(PacketOutcome::Applied {
            translated: position.is_some(),
            rotated: orientation.is_some(),
        })
    }
}

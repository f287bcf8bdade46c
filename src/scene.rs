//! Collaborators supplied by the application hosting a session.
//!
//! The host owns the viewport and the scene objects. A session only borrows them for
//! the duration of one callback.

use nalgebra as na;

/// Viewport camera as seen by the pose integrator.
///
/// The camera looks at `location` from `distance` away, along the local +Z axis rotated by
/// `rotation`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewState {
    pub location: na::Point3<f64>,
    pub rotation: na::UnitQuaternion<f64>,
    pub distance: f64,
}

impl ViewState {
    pub fn new(
        location: na::Point3<f64>,
        rotation: na::UnitQuaternion<f64>,
        distance: f64,
    ) -> Self {
        Self {
            location,
            rotation,
            distance,
        }
    }

    /// Builds a view from an orbit camera's eye and target.
    pub fn look_at(eye: na::Point3<f64>, at: na::Point3<f64>, up: na::Vector3<f64>) -> Self {
        let offset = eye - at;
        let distance = offset.norm();
        let rotation = if distance > 0.0 {
            na::UnitQuaternion::face_towards(&offset, &up)
        } else {
            na::UnitQuaternion::identity()
        };
        Self::new(at, rotation, distance)
    }

    pub fn eye_position(&self) -> na::Point3<f64> {
        self.location + self.rotation * na::Vector3::new(0.0, 0.0, self.distance)
    }
}

pub trait SceneObject {
    fn position(&self) -> na::Point3<f64>;
    fn orientation(&self) -> na::UnitQuaternion<f64>;
    fn set_position(&mut self, position: na::Point3<f64>);
    fn set_orientation(&mut self, orientation: na::UnitQuaternion<f64>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportLevel {
    Info,
    Error,
}

pub trait Host {
    /// Current state of the 3D viewport, if there is one.
    fn view_state(&self) -> Option<ViewState>;

    /// Identifier of the object the user currently has selected.
    fn active_object(&self) -> Option<String>;

    fn object_mut(&mut self, id: &str) -> Option<&mut dyn SceneObject>;

    /// User facing status line.
    fn report(&mut self, level: ReportLevel, message: &str);
}

/// Plain in-memory object, used by headless hosts.
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleObject {
    pub position: na::Point3<f64>,
    pub orientation: na::UnitQuaternion<f64>,
}

impl Default for SimpleObject {
    fn default() -> Self {
        Self {
            position: na::Point3::origin(),
            orientation: na::UnitQuaternion::identity(),
        }
    }
}

impl SceneObject for SimpleObject {
    fn position(&self) -> na::Point3<f64> {
        self.position
    }

    fn orientation(&self) -> na::UnitQuaternion<f64> {
        self.orientation
    }

    fn set_position(&mut self, position: na::Point3<f64>) {
        self.position = position;
    }

    fn set_orientation(&mut self, orientation: na::UnitQuaternion<f64>) {
        self.orientation = orientation;
    }
}

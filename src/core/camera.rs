//! Viewing camera for identifier rendering and LOD sampling

use crate::core::types::{Mat4, Quat, Vec3};
use crate::math::Aabb;

/// Perspective camera in model space (millimetres)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    /// Orientation; the camera looks down its local -Z
    pub rotation: Quat,
    /// Vertical field of view in radians
    pub fov_y: f32,
    /// Width / height
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera {
    pub fn new(position: Vec3, fov_y_degrees: f32, aspect: f32) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
            fov_y: fov_y_degrees.to_radians(),
            aspect,
            near: 0.01,
            far: 100_000.0,
        }
    }

    /// Camera at `position` aimed at `target`
    pub fn look_at(position: Vec3, target: Vec3, up: Vec3) -> Self {
        let mut camera = Self::new(position, 60.0, 4.0 / 3.0);
        camera.aim(target, up);
        camera
    }

    /// Camera looking along `direction` from far enough back that the
    /// bounding sphere of `bounds` just fits the vertical field of view.
    pub fn framing(bounds: &Aabb, direction: Vec3) -> Self {
        let center = bounds.center().as_vec3();
        let radius = (bounds.size().length() * 0.5) as f32;
        let mut camera = Self::new(center, 60.0, 4.0 / 3.0);
        let distance = radius / (camera.fov_y * 0.5).sin();
        camera.position = center - direction.normalize() * distance.max(camera.near * 2.0);
        let up = if direction.normalize().dot(Vec3::Y).abs() > 0.99 { Vec3::Z } else { Vec3::Y };
        camera.aim(center, up);
        camera
    }

    fn aim(&mut self, target: Vec3, up: Vec3) {
        let forward = (target - self.position).normalize();
        let right = forward.cross(up).normalize();
        let up = right.cross(forward);
        self.rotation = Quat::from_mat3(&glam::Mat3::from_cols(right, up, -forward));
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_quat(self.rotation.conjugate()) * Mat4::from_translation(-self.position)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * -Vec3::Z
    }

    /// Match the aspect ratio to a viewport in pixels
    pub fn set_aspect(&mut self, width: f32, height: f32) {
        self.aspect = width / height;
    }

    /// Map a point through `view_proj` to viewport pixels (y down) plus NDC
    /// depth. `None` for points at or behind the near plane.
    pub fn project_to_viewport(&self, view_proj: &Mat4, point: Vec3, width: u32, height: u32) -> Option<Vec3> {
        let clip = *view_proj * point.extend(1.0);
        if clip.w <= self.near {
            return None;
        }
        let ndc = clip.truncate() / clip.w;
        Some(Vec3::new(
            (ndc.x * 0.5 + 0.5) * width as f32,
            (0.5 - ndc.y * 0.5) * height as f32,
            ndc.z,
        ))
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 0.0, 5.0), 60.0, 4.0 / 3.0)
    }
}

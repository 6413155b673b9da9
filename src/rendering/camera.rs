use crate::rendering::scene::GRID_SIZE;
use glam::{Mat4, Vec3};

/// Supplies the view for each frame. The renderer only reads from it.
pub trait CameraSource {
    fn view_matrix(&mut self, frame: u64) -> Mat4;
}

/// Looks at `target` from `distance` away, optionally turning around the y axis a little every
/// frame so consecutive headless frames don't render the exact same image.
#[derive(Debug, Clone)]
pub struct OrbitCamera {
    pub target: Vec3,
    pub distance: f32,
    pub yaw: f32,
    pub pitch: f32,
    pub yaw_per_frame: f32,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        let scene_dimension = GRID_SIZE as f32 * 0.25;
        Self {
            target: Vec3::ZERO,
            distance: scene_dimension * 5.0 * 0.6,
            yaw: 0.0,
            pitch: 0.0,
            yaw_per_frame: 0.0,
        }
    }
}

impl OrbitCamera {
    pub fn eye(&self, frame: u64) -> Vec3 {
        let yaw = self.yaw + self.yaw_per_frame * frame as f32;
        let direction = Vec3::new(
            yaw.sin() * self.pitch.cos(),
            self.pitch.sin(),
            yaw.cos() * self.pitch.cos(),
        );
        self.target + direction * self.distance
    }
}

impl CameraSource for OrbitCamera {
    fn view_matrix(&mut self, frame: u64) -> Mat4 {
        Mat4::look_at_rh(self.eye(frame), self.target, Vec3::Y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4Swizzles;

    #[test]
    pub fn default_camera_looks_down_negative_z() {
        let mut camera = OrbitCamera::default();
        assert!(camera.eye(0).abs_diff_eq(Vec3::new(0.0, 0.0, 12.0), 1e-5));

        let view = camera.view_matrix(0);
        let target_in_view = view * camera.target.extend(1.0);
        assert!(target_in_view.xyz().abs_diff_eq(Vec3::new(0.0, 0.0, -12.0), 1e-4));
    }

    #[test]
    pub fn orbit_advances_per_frame() {
        let camera = OrbitCamera {
            yaw_per_frame: 0.1,
            ..OrbitCamera::default()
        };
        assert!(!camera.eye(0).abs_diff_eq(camera.eye(1), 1e-5));
        assert!((camera.eye(7).length() - camera.distance).abs() < 1e-4);
    }
}

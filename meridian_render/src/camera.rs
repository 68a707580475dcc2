use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

// Keep pitch away from ±π/2; cos(pitch) reaching 0 degenerates the look
// direction.
const PITCH_LIMIT_MARGIN: f32 = 0.01;
const MAX_PITCH: f32 = std::f32::consts::FRAC_PI_2 - PITCH_LIMIT_MARGIN;
const MIN_PITCH: f32 = -MAX_PITCH;

/// Abstract camera inputs; the windowing layer maps its own key codes onto
/// these.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CameraKey {
    MoveForward,
    MoveBackward,
    StrafeLeft,
    StrafeRight,
    TurnLeft,
    TurnRight,
    TurnUp,
    TurnDown,
    Reset,
}

#[derive(Clone, Copy, Default)]
struct KeysPressed {
    forward: bool,
    backward: bool,
    left: bool,
    right: bool,
    turn_left: bool,
    turn_right: bool,
    turn_up: bool,
    turn_down: bool,
}

/// Free-fly camera: yaw/pitch orientation, WASD-style planar movement,
/// right-button mouse look.
pub struct FreeCamera {
    initial_position: Vec3,
    position: Vec3,
    yaw: f32,
    pitch: f32,
    look_direction: Vec3,
    up_direction: Vec3,

    move_speed: f32,
    turn_speed: f32,
    mouse_sensitivity: f32,

    look_button_down: bool,
    last_mouse: (i32, i32),
    keys: KeysPressed,
}

impl Default for FreeCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl FreeCamera {
    pub fn new() -> Self {
        Self {
            initial_position: Vec3::ZERO,
            position: Vec3::ZERO,
            yaw: std::f32::consts::PI,
            pitch: 0.0,
            look_direction: Vec3::new(0.0, 0.0, -1.0),
            up_direction: Vec3::Y,
            move_speed: 20.0,
            turn_speed: std::f32::consts::FRAC_PI_2,
            mouse_sensitivity: 0.003,
            look_button_down: false,
            last_mouse: (0, 0),
            keys: KeysPressed::default(),
        }
    }

    pub fn init(&mut self, position: Vec3) {
        self.initial_position = position;
        self.reset();
    }

    pub fn reset(&mut self) {
        self.position = self.initial_position;
        self.yaw = std::f32::consts::PI;
        self.pitch = 0.0;
        self.look_direction = Vec3::new(0.0, 0.0, -1.0);
    }

    /// Units per second.
    pub fn set_move_speed(&mut self, units_per_second: f32) {
        self.move_speed = units_per_second;
    }

    /// Radians per second, for keyboard turning.
    pub fn set_turn_speed(&mut self, radians_per_second: f32) {
        self.turn_speed = radians_per_second;
    }

    /// Radians per pixel of mouse travel.
    pub fn set_mouse_sensitivity(&mut self, radians_per_pixel: f32) {
        self.mouse_sensitivity = radians_per_pixel;
    }

    pub fn on_look_button_down(&mut self, x: i32, y: i32) {
        self.look_button_down = true;
        self.last_mouse = (x, y);
    }

    pub fn on_look_button_up(&mut self) {
        self.look_button_down = false;
    }

    pub fn on_mouse_move(&mut self, x: i32, y: i32) {
        if !self.look_button_down {
            return;
        }

        let dx = (x - self.last_mouse.0) as f32;
        let dy = (y - self.last_mouse.1) as f32;

        // Screen y grows downward; match the keyboard scheme (left => yaw+).
        self.yaw -= dx * self.mouse_sensitivity;
        self.pitch -= dy * self.mouse_sensitivity;
        self.pitch = self.pitch.clamp(MIN_PITCH, MAX_PITCH);

        self.last_mouse = (x, y);
    }

    pub fn on_key_down(&mut self, key: CameraKey) {
        match key {
            CameraKey::MoveForward => self.keys.forward = true,
            CameraKey::MoveBackward => self.keys.backward = true,
            CameraKey::StrafeLeft => self.keys.left = true,
            CameraKey::StrafeRight => self.keys.right = true,
            CameraKey::TurnLeft => self.keys.turn_left = true,
            CameraKey::TurnRight => self.keys.turn_right = true,
            CameraKey::TurnUp => self.keys.turn_up = true,
            CameraKey::TurnDown => self.keys.turn_down = true,
            CameraKey::Reset => self.reset(),
        }
    }

    pub fn on_key_up(&mut self, key: CameraKey) {
        match key {
            CameraKey::MoveForward => self.keys.forward = false,
            CameraKey::MoveBackward => self.keys.backward = false,
            CameraKey::StrafeLeft => self.keys.left = false,
            CameraKey::StrafeRight => self.keys.right = false,
            CameraKey::TurnLeft => self.keys.turn_left = false,
            CameraKey::TurnRight => self.keys.turn_right = false,
            CameraKey::TurnUp => self.keys.turn_up = false,
            CameraKey::TurnDown => self.keys.turn_down = false,
            CameraKey::Reset => {}
        }
    }

    /// Integrates movement and turning over `elapsed_seconds` and
    /// recomputes the look direction from yaw and pitch.
    pub fn update(&mut self, elapsed_seconds: f32) {
        // Movement vector in camera space.
        let mut movement = Vec3::ZERO;
        if self.keys.left {
            movement.x -= 1.0;
        }
        if self.keys.right {
            movement.x += 1.0;
        }
        if self.keys.forward {
            movement.z -= 1.0;
        }
        if self.keys.backward {
            movement.z += 1.0;
        }

        if movement.x.abs() > 0.1 && movement.z.abs() > 0.1 {
            movement = movement.normalize();
        }

        let move_interval = self.move_speed * elapsed_seconds;
        let rotate_interval = self.turn_speed * elapsed_seconds;

        if self.keys.turn_left {
            self.yaw += rotate_interval;
        }
        if self.keys.turn_right {
            self.yaw -= rotate_interval;
        }
        if self.keys.turn_up {
            self.pitch += rotate_interval;
        }
        if self.keys.turn_down {
            self.pitch -= rotate_interval;
        }
        self.pitch = self.pitch.clamp(MIN_PITCH, MAX_PITCH);

        // Rotate the movement vector into model space and advance on the
        // XZ plane.
        let x = movement.x * -self.yaw.cos() - movement.z * self.yaw.sin();
        let z = movement.x * self.yaw.sin() - movement.z * self.yaw.cos();
        self.position.x += x * move_interval;
        self.position.z += z * move_interval;

        let r = self.pitch.cos();
        self.look_direction = Vec3::new(
            r * self.yaw.sin(),
            self.pitch.sin(),
            r * self.yaw.cos(),
        );
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn look_direction(&self) -> Vec3 {
        self.look_direction
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.look_direction, self.up_direction)
    }

    pub fn projection_matrix(&self, fov_y: f32, aspect_ratio: f32, near: f32, far: f32) -> Mat4 {
        Mat4::perspective_rh(fov_y, aspect_ratio, near, far)
    }

    pub fn view_uniform(&self, projection: Mat4) -> ViewUniform {
        ViewUniform {
            projection,
            view: self.view_matrix(),
            position: self.position.extend(1.0),
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ViewUniform {
    pub projection: Mat4,
    pub view: Mat4,
    pub position: Vec4,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: Vec3, b: Vec3) {
        assert!((a - b).length() < 1e-4, "{a} != {b}");
    }

    #[test]
    fn initial_look_is_negative_z() {
        let camera = FreeCamera::new();
        assert_close(camera.look_direction(), Vec3::new(0.0, 0.0, -1.0));
    }

    #[test]
    fn forward_key_moves_along_look_direction() {
        let mut camera = FreeCamera::new();
        camera.on_key_down(CameraKey::MoveForward);
        camera.update(1.0);
        assert_close(camera.position(), Vec3::new(0.0, 0.0, -20.0));
    }

    #[test]
    fn pitch_is_clamped() {
        let mut camera = FreeCamera::new();
        camera.on_key_down(CameraKey::TurnUp);
        for _ in 0..100 {
            camera.update(0.1);
        }
        let up_component = camera.look_direction().y;
        assert!(up_component < 1.0);
        assert!(up_component > MAX_PITCH.sin() - 1e-4);
    }

    #[test]
    fn mouse_look_requires_button() {
        let mut camera = FreeCamera::new();
        camera.on_mouse_move(100, 100);
        assert_close(camera.look_direction(), Vec3::new(0.0, 0.0, -1.0));

        camera.on_look_button_down(0, 0);
        camera.on_mouse_move(100, 0);
        camera.update(0.0);
        assert!(camera.look_direction().x.abs() > 1e-3);
    }

    #[test]
    fn reset_restores_initial_state() {
        let mut camera = FreeCamera::new();
        camera.init(Vec3::new(1.0, 2.0, 3.0));
        camera.on_key_down(CameraKey::MoveForward);
        camera.update(1.0);
        camera.on_key_down(CameraKey::Reset);
        assert_close(camera.position(), Vec3::new(1.0, 2.0, 3.0));
        assert_close(camera.look_direction(), Vec3::new(0.0, 0.0, -1.0));
    }

    #[test]
    fn view_uniform_is_densely_packed() {
        let camera = FreeCamera::new();
        let uniform = camera.view_uniform(Mat4::IDENTITY);
        assert_eq!(bytemuck::bytes_of(&uniform).len(), 144);
    }
}

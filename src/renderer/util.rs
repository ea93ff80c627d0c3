use glam::{Mat3, Mat4, Quat, Vec3};

/// A direction in 3D space, independent of any coordinate system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordAxis {
    Forward,
    Back,
    Left,
    Right,
    Up,
    Down,
}

impl CoordAxis {
    pub const NORTH: CoordAxis = CoordAxis::Forward;
    pub const EAST: CoordAxis = CoordAxis::Right;
    pub const SOUTH: CoordAxis = CoordAxis::Back;
    pub const WEST: CoordAxis = CoordAxis::Left;

    pub fn opposite(self) -> Self {
        match self {
            CoordAxis::Forward => CoordAxis::Back,
            CoordAxis::Back => CoordAxis::Forward,
            CoordAxis::Left => CoordAxis::Right,
            CoordAxis::Right => CoordAxis::Left,
            CoordAxis::Up => CoordAxis::Down,
            CoordAxis::Down => CoordAxis::Up,
        }
    }

    /// +1 for the same direction, -1 for the opposite one, 0 when perpendicular
    pub fn dot(self, other: Self) -> f32 {
        if self == other {
            1.0
        } else if self == other.opposite() {
            -1.0
        } else {
            0.0
        }
    }
}

/// A concrete coordinate system, given by the direction each of its axes points in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordSystem {
    pub x: CoordAxis,
    pub y: CoordAxis,
    pub z: CoordAxis,
}

impl CoordSystem {
    pub const fn new(x: CoordAxis, y: CoordAxis, z: CoordAxis) -> Self {
        Self { x, y, z }
    }

    /// Components of direction `axis` expressed in this system
    pub fn axis(&self, axis: CoordAxis) -> Vec3 {
        Vec3::new(self.x.dot(axis), self.y.dot(axis), self.z.dot(axis))
    }

    pub fn forward(&self) -> Vec3 {
        self.axis(CoordAxis::Forward)
    }

    pub fn right(&self) -> Vec3 {
        self.axis(CoordAxis::Right)
    }

    pub fn up(&self) -> Vec3 {
        self.axis(CoordAxis::Up)
    }
}

/// Change of basis taking coordinates in `from` to coordinates in `to`
pub fn make_transform(from: &CoordSystem, to: &CoordSystem) -> Mat3 {
    Mat3::from_cols(to.axis(from.x), to.axis(from.y), to.axis(from.z))
}

pub fn make_transform_4x4(from: &CoordSystem, to: &CoordSystem) -> Mat4 {
    Mat4::from_mat3(make_transform(from, to))
}

fn handedness(m: &Mat4) -> f32 {
    if m.determinant() < 0.0 { -1.0 } else { 1.0 }
}

pub fn transform_vector(m: &Mat4, vector: Vec3) -> Vec3 {
    m.transform_vector3(vector)
}

pub fn transform_point(m: &Mat4, point: Vec3) -> Vec3 {
    m.project_point3(point)
}

pub fn transform_tangent(m: &Mat4, tangent: Vec3) -> Vec3 {
    transform_vector(m, tangent).normalize_or_zero()
}

// Normals are bivectors; mirroring flips them
pub fn transform_normal(m: &Mat4, normal: Vec3) -> Vec3 {
    let normal_matrix = m.transpose().inverse();
    transform_vector(&normal_matrix, normal).normalize_or_zero() * handedness(m)
}

pub fn transform_quat(m: &Mat4, quat: Quat) -> Quat {
    let axis = transform_vector(m, Vec3::new(quat.x, quat.y, quat.z)) * handedness(m);
    Quat::from_xyzw(axis.x, axis.y, axis.z, quat.w)
}

pub fn transform_matrix(m: &Mat4, matrix: &Mat4) -> Mat4 {
    *m * *matrix * m.inverse()
}

pub fn transform_scaling(m: &Mat4, scaling: Vec3) -> Vec3 {
    let scaled = transform_matrix(m, &Mat4::from_scale(scaling));
    Vec3::new(scaled.x_axis.x, scaled.y_axis.y, scaled.z_axis.z)
}

#[cfg(test)]
mod tests {
    use super::*;

    const Y_UP: CoordSystem = CoordSystem::new(CoordAxis::Right, CoordAxis::Up, CoordAxis::Back);
    const Z_UP: CoordSystem = CoordSystem::new(CoordAxis::Right, CoordAxis::Forward, CoordAxis::Up);
    const LEFT_HANDED: CoordSystem = CoordSystem::new(CoordAxis::Right, CoordAxis::Up, CoordAxis::Forward);

    fn assert_close(a: Vec3, b: Vec3) {
        assert!(a.abs_diff_eq(b, 1e-5), "{a} != {b}");
    }

    #[test]
    fn axis_dot_products() {
        assert_eq!(CoordAxis::Up.dot(CoordAxis::Up), 1.0);
        assert_eq!(CoordAxis::Up.dot(CoordAxis::Down), -1.0);
        assert_eq!(CoordAxis::Up.dot(CoordAxis::Left), 0.0);
        assert_eq!(CoordAxis::NORTH, CoordAxis::Forward);
        assert_eq!(CoordAxis::WEST.opposite(), CoordAxis::EAST);
    }

    #[test]
    fn system_axes() {
        assert_eq!(Y_UP.up(), Vec3::Y);
        assert_eq!(Y_UP.forward(), Vec3::NEG_Z);
        assert_eq!(Z_UP.up(), Vec3::Z);
        assert_eq!(Z_UP.axis(CoordAxis::SOUTH), Vec3::NEG_Y);
    }

    #[test]
    fn y_up_to_z_up() {
        let m = make_transform(&Y_UP, &Z_UP);
        assert_eq!(m * Vec3::Y, Vec3::Z);
        assert_eq!(m * Vec3::Z, Vec3::NEG_Y);
        assert_eq!(m * Vec3::X, Vec3::X);
        assert_eq!(m.determinant(), 1.0);

        let m4 = make_transform_4x4(&Y_UP, &Z_UP);
        assert_close(transform_point(&m4, Vec3::new(1.0, 2.0, 3.0)), Vec3::new(1.0, -3.0, 2.0));
    }

    #[test]
    fn identity_between_equal_systems() {
        assert_eq!(make_transform(&Z_UP, &Z_UP), Mat3::IDENTITY);
    }

    #[test]
    fn mirroring_flips_normals_and_quaternion_axes() {
        let m = make_transform_4x4(&Y_UP, &LEFT_HANDED);
        assert!(m.determinant() < 0.0);

        assert_close(transform_vector(&m, Vec3::Z), Vec3::NEG_Z);
        // Cross product of transformed tangents matches the transformed normal
        let (t, b) = (transform_tangent(&m, Vec3::X), transform_tangent(&m, Vec3::Y));
        assert_close(transform_normal(&m, Vec3::Z), t.cross(b));

        let quat = Quat::from_rotation_y(0.5);
        let mirrored = transform_quat(&m, quat);
        assert_close(Vec3::new(mirrored.x, mirrored.y, mirrored.z), Vec3::new(quat.x, -quat.y, quat.z));
        assert_eq!(mirrored.w, quat.w);
    }

    #[test]
    fn scaling_follows_the_axes() {
        let m = make_transform_4x4(&Y_UP, &Z_UP);
        assert_close(transform_scaling(&m, Vec3::new(1.0, 2.0, 3.0)), Vec3::new(1.0, 3.0, 2.0));
    }
}

//! Types, aliases and helper operations for doing 2D math with `ultraviolet`.
use std::f64::consts::PI;
pub use ultraviolet as uv;

/// A Pose has a rotation and a translation, no scaling.
///
/// Bodies and shapes are positioned with Poses; the physics engine has no notion of scale.
pub type Pose = uv::DIsometry2;
pub type Vec2 = uv::DVec2;
pub type Rotor2 = uv::DRotor2;

/// An angle in either degrees or radians.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Deserialize, serde::Serialize))]
pub enum Angle {
    Rad(f64),
    Deg(f64),
}
impl Angle {
    /// Get the angle as degrees.
    #[inline]
    pub fn deg(&self) -> f64 {
        match self {
            Angle::Rad(rad) => rad * 180.0 / PI,
            Angle::Deg(deg) => *deg,
        }
    }

    /// Get the angle as radians.
    #[inline]
    pub fn rad(&self) -> f64 {
        match self {
            Angle::Rad(rad) => *rad,
            Angle::Deg(deg) => deg * PI / 180.0,
        }
    }
}
impl Default for Angle {
    fn default() -> Self {
        Angle::Rad(0.0)
    }
}
impl From<Angle> for Rotor2 {
    #[inline]
    fn from(ang: Angle) -> Rotor2 {
        Rotor2::from_angle(ang.rad())
    }
}
impl From<Rotor2> for Angle {
    #[inline]
    fn from(rotor: Rotor2) -> Self {
        Angle::Rad(-rotor.bv.xy.atan2(rotor.s) * 2.0)
    }
}

/// A wrapper type to indicate a vector should always be normalized.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Unit<T>(T);

impl Unit<Vec2> {
    pub fn new_normalize(v: Vec2) -> Self {
        Unit(v.normalized())
    }

    pub const fn new_unchecked(v: Vec2) -> Self {
        Unit(v)
    }

    pub fn unit_x() -> Self {
        Unit(Vec2::unit_x())
    }

    pub fn unit_y() -> Self {
        Unit(Vec2::unit_y())
    }

    /// Flip the direction if it points against `reference`.
    #[inline]
    pub fn facing(self, reference: Vec2) -> Self {
        if self.0.dot(reference) < 0.0 {
            Unit(-self.0)
        } else {
            self
        }
    }
}

impl std::ops::Mul<Unit<Vec2>> for Rotor2 {
    type Output = Unit<Vec2>;

    fn mul(self, rhs: Unit<Vec2>) -> Self::Output {
        Unit(self * rhs.0)
    }
}

impl<T> std::ops::Deref for Unit<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> std::ops::Neg for Unit<T>
where
    T: std::ops::Neg,
{
    type Output = Unit<<T as std::ops::Neg>::Output>;

    fn neg(self) -> Self::Output {
        Unit(-self.0)
    }
}

// Vec2 utils

#[inline]
pub fn left_normal(v: Vec2) -> Vec2 {
    Vec2::new(-v.y, v.x)
}
#[inline]
pub fn unit_left_normal(u: Unit<Vec2>) -> Unit<Vec2> {
    Unit::new_unchecked(left_normal(*u))
}

/// The z component of the 3D cross product of two planar vectors.
#[inline]
pub fn cross(a: Vec2, b: Vec2) -> f64 {
    a.x * b.y - a.y * b.x
}

/// Component-wise signum, treating zero as positive
/// so that contact normals always have a direction.
#[inline]
pub fn signum_nonzero(v: Vec2) -> Vec2 {
    Vec2::new(
        if v.x < 0.0 { -1.0 } else { 1.0 },
        if v.y < 0.0 { -1.0 } else { 1.0 },
    )
}

#[inline]
pub fn vec_is_finite(v: Vec2) -> bool {
    v.x.is_finite() && v.y.is_finite()
}

// pose utils

#[inline]
pub fn pose_from_parts(position: Vec2, angle: Angle) -> Pose {
    Pose::new(position, angle.into())
}

#[inline]
pub fn pose_angle(pose: &Pose) -> f64 {
    Angle::from(pose.rotation).rad()
}

#[inline]
pub fn pose_is_finite(pose: &Pose) -> bool {
    vec_is_finite(pose.translation)
        && pose.rotation.s.is_finite()
        && pose.rotation.bv.xy.is_finite()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn angle_roundtrips_through_rotor() {
        for deg in [-170.0, -45.0, 0.0, 30.0, 90.0, 179.0] {
            let rotor: Rotor2 = Angle::Deg(deg).into();
            let back = Angle::from(rotor).deg();
            assert!((back - deg).abs() < 1e-9, "{deg} came back as {back}");
        }
    }

    #[test]
    fn rotor_rotates_counterclockwise() {
        let rotor: Rotor2 = Angle::Deg(90.0).into();
        let v = rotor * Vec2::unit_x();
        assert!((v - Vec2::unit_y()).mag() < 1e-9);
    }

    #[test]
    fn cross_of_axes() {
        assert_eq!(cross(Vec2::unit_x(), Vec2::unit_y()), 1.0);
        assert_eq!(cross(Vec2::unit_y(), Vec2::unit_x()), -1.0);
    }
}

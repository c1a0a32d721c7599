use crate::{
    math as m,
    physics::{BodyKey, PhysicsError},
};
use std::f64::consts::PI;

/// The geometry of a shape, in the local space of the body it's attached to.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Deserialize, serde::Serialize))]
pub enum Geometry {
    Circle {
        radius: f64,
        offset: [f64; 2],
    },
    Rect {
        width: f64,
        height: f64,
        offset: [f64; 2],
    },
    /// A line segment between two points, optionally thickened by a radius.
    /// Typically used for static level geometry.
    Segment {
        a: [f64; 2],
        b: [f64; 2],
        radius: f64,
    },
}

impl Geometry {
    /// Create a circle centered on the body.
    pub fn circle(radius: f64) -> Self {
        Geometry::Circle {
            radius,
            offset: [0.0, 0.0],
        }
    }

    /// Create a rectangle centered on the body.
    pub fn rect(width: f64, height: f64) -> Self {
        Geometry::Rect {
            width,
            height,
            offset: [0.0, 0.0],
        }
    }

    /// Create a rectangle with both sides set to the same length.
    pub fn square(side_length: f64) -> Self {
        Geometry::rect(side_length, side_length)
    }

    pub fn segment(a: impl Into<[f64; 2]>, b: impl Into<[f64; 2]>, radius: f64) -> Self {
        Geometry::Segment {
            a: a.into(),
            b: b.into(),
            radius,
        }
    }

    /// Move a circle or rectangle away from the body's origin.
    /// Segments are already positioned by their endpoints and are returned unchanged.
    pub fn with_offset(self, new_offset: impl Into<[f64; 2]>) -> Self {
        match self {
            Geometry::Circle { radius, .. } => Geometry::Circle {
                radius,
                offset: new_offset.into(),
            },
            Geometry::Rect { width, height, .. } => Geometry::Rect {
                width,
                height,
                offset: new_offset.into(),
            },
            seg @ Geometry::Segment { .. } => seg,
        }
    }

    pub fn area(&self) -> f64 {
        match *self {
            Geometry::Circle { radius, .. } => PI * radius * radius,
            Geometry::Rect { width, height, .. } => width * height,
            Geometry::Segment { a, b, radius } => {
                let length = (m::Vec2::from(b) - m::Vec2::from(a)).mag();
                2.0 * radius * length + PI * radius * radius
            }
        }
    }

    /// Polar second moment of area about the body's origin.
    pub fn second_moment_of_area(&self) -> f64 {
        // from https://en.wikipedia.org/wiki/List_of_moments_of_inertia,
        // moved to the body origin with the parallel axis theorem
        match *self {
            Geometry::Circle { radius, offset } => {
                let area = self.area();
                area * (radius * radius / 2.0 + m::Vec2::from(offset).mag_sq())
            }
            Geometry::Rect {
                width,
                height,
                offset,
            } => {
                let area = self.area();
                area * ((width * width + height * height) / 12.0 + m::Vec2::from(offset).mag_sq())
            }
            Geometry::Segment { a, b, radius } => {
                let (a, b) = (m::Vec2::from(a), m::Vec2::from(b));
                let length = (b - a).mag();
                let center_sq = ((a + b) * 0.5).mag_sq();
                let rect_area = 2.0 * radius * length;
                let caps_area = PI * radius * radius;
                // caps approximated as one disc at the segment's middle,
                // pushed out by half the length
                rect_area * ((length * length + 4.0 * radius * radius) / 12.0 + center_sq)
                    + caps_area * (radius * radius / 2.0 + length * length / 4.0 + center_sq)
            }
        }
    }

    /// Convert into the canonical centered form used by collision detection,
    /// plus the pose of that form relative to the body.
    pub(crate) fn resolve(&self) -> Result<(ShapeKind, m::Pose), PhysicsError> {
        let invalid = |msg: String| Err(PhysicsError::InvalidConfig(msg));
        match *self {
            Geometry::Circle { radius, offset } => {
                if !(radius > 0.0 && radius.is_finite()) {
                    return invalid(format!("circle radius must be positive, got {radius}"));
                }
                if !offset.iter().all(|c| c.is_finite()) {
                    return invalid("shape offset must be finite".to_string());
                }
                let pose = m::Pose::new(m::Vec2::from(offset), m::Rotor2::identity());
                Ok((ShapeKind::Circle { r: radius }, pose))
            }
            Geometry::Rect {
                width,
                height,
                offset,
            } => {
                let valid = |v: f64| v > 0.0 && v.is_finite();
                if !(valid(width) && valid(height)) {
                    return invalid(format!(
                        "rect dimensions must be positive, got {width}x{height}"
                    ));
                }
                if !offset.iter().all(|c| c.is_finite()) {
                    return invalid("shape offset must be finite".to_string());
                }
                let pose = m::Pose::new(m::Vec2::from(offset), m::Rotor2::identity());
                Ok((
                    ShapeKind::Rect {
                        hw: width / 2.0,
                        hh: height / 2.0,
                    },
                    pose,
                ))
            }
            Geometry::Segment { a, b, radius } => {
                let (a, b) = (m::Vec2::from(a), m::Vec2::from(b));
                if !(m::vec_is_finite(a) && m::vec_is_finite(b)) {
                    return invalid("segment endpoints must be finite".to_string());
                }
                if !(radius >= 0.0 && radius.is_finite()) {
                    return invalid(format!("segment radius must be non-negative, got {radius}"));
                }
                let dir = b - a;
                let length = dir.mag();
                if length == 0.0 && radius == 0.0 {
                    return invalid("segment has neither length nor radius".to_string());
                }
                let rotation = if length > 0.0 {
                    m::Rotor2::from_angle(dir.y.atan2(dir.x))
                } else {
                    m::Rotor2::identity()
                };
                let pose = m::Pose::new((a + b) * 0.5, rotation);
                Ok((
                    ShapeKind::Capsule {
                        hl: length / 2.0,
                        r: radius,
                    },
                    pose,
                ))
            }
        }
    }
}

/// The physical shape used in collision detection, centered at its own origin.
///
/// Rects store their side lengths halved because this makes intersection tests easier.
/// Segments become capsules lying along the local x axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum ShapeKind {
    Circle { r: f64 },
    Rect { hw: f64, hh: f64 },
    Capsule { hl: f64, r: f64 },
}

impl ShapeKind {
    /// Axis-aligned bounding box of this shape at the given world pose.
    pub(crate) fn aabb(&self, pose: &m::Pose) -> AABB {
        let x_axis = pose.rotation * m::Vec2::unit_x();
        let y_axis = m::left_normal(x_axis);
        let half_extents = match *self {
            ShapeKind::Circle { r } => m::Vec2::new(r, r),
            ShapeKind::Rect { hw, hh } => m::Vec2::new(
                x_axis.x.abs() * hw + y_axis.x.abs() * hh,
                x_axis.y.abs() * hw + y_axis.y.abs() * hh,
            ),
            ShapeKind::Capsule { hl, r } => {
                m::Vec2::new(x_axis.x.abs() * hl + r, x_axis.y.abs() * hl + r)
            }
        };
        AABB {
            min: pose.translation - half_extents,
            max: pose.translation + half_extents,
        }
    }
}

/// Surface and behavior properties of a shape, plus its geometry.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde-types", serde(default))]
pub struct ShapeConfig {
    pub geometry: Geometry,
    /// Friction coefficient in [0, 1]. Zero is frictionless.
    /// The coefficient between two shapes is the product of theirs.
    pub friction: f64,
    /// Bounciness. The coefficient between two shapes is the product of theirs.
    pub elasticity: f64,
    /// Sensors report contacts to collision handlers but never push anything.
    pub sensor: bool,
}

impl Default for ShapeConfig {
    fn default() -> Self {
        Self::new(Geometry::square(1.0))
    }
}

impl ShapeConfig {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            friction: 0.2,
            elasticity: 0.0,
            sensor: false,
        }
    }

    #[inline]
    pub fn with_friction(mut self, friction: f64) -> Self {
        self.friction = friction;
        self
    }

    #[inline]
    pub fn with_elasticity(mut self, elasticity: f64) -> Self {
        self.elasticity = elasticity;
        self
    }

    #[inline]
    pub fn as_sensor(mut self) -> Self {
        self.sensor = true;
        self
    }
}

/// A piece of collision geometry attached to a body.
#[derive(Clone, Copy, Debug)]
pub struct Shape {
    pub(crate) body: BodyKey,
    config: ShapeConfig,
    pub(crate) kind: ShapeKind,
    /// Pose of `kind` relative to the body.
    pub(crate) local_pose: m::Pose,
}

impl Shape {
    pub(crate) fn from_config(body: BodyKey, config: &ShapeConfig) -> Result<Self, PhysicsError> {
        if !(0.0..=1.0).contains(&config.friction) {
            return Err(PhysicsError::InvalidConfig(format!(
                "friction must be in [0, 1], got {}",
                config.friction
            )));
        }
        if !(config.elasticity >= 0.0 && config.elasticity.is_finite()) {
            return Err(PhysicsError::InvalidConfig(format!(
                "elasticity must be non-negative, got {}",
                config.elasticity
            )));
        }
        let (kind, local_pose) = config.geometry.resolve()?;
        Ok(Self {
            body,
            config: *config,
            kind,
            local_pose,
        })
    }

    #[inline]
    pub fn body(&self) -> BodyKey {
        self.body
    }

    #[inline]
    pub fn geometry(&self) -> &Geometry {
        &self.config.geometry
    }

    #[inline]
    pub fn friction(&self) -> f64 {
        self.config.friction
    }

    #[inline]
    pub fn elasticity(&self) -> f64 {
        self.config.elasticity
    }

    #[inline]
    pub fn is_sensor(&self) -> bool {
        self.config.sensor
    }

    /// World-space pose of the shape given the pose of its body.
    #[inline]
    pub(crate) fn world_pose(&self, body_pose: &m::Pose) -> m::Pose {
        *body_pose * self.local_pose
    }
}

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AABB {
    pub min: m::Vec2,
    pub max: m::Vec2,
}

impl AABB {
    #[inline]
    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    /// Check whether two boxes overlap or touch.
    #[inline]
    pub fn overlaps(&self, other: &AABB) -> bool {
        self.min.x <= other.max.x
            && other.min.x <= self.max.x
            && self.min.y <= other.max.y
            && other.min.y <= self.max.y
    }

    #[inline]
    pub fn contains_point(&self, point: m::Vec2) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Angle;

    #[test]
    fn invalid_geometry_is_rejected() {
        let bad = [
            Geometry::circle(0.0),
            Geometry::circle(-1.0),
            Geometry::rect(0.0, 1.0),
            Geometry::rect(1.0, f64::NAN),
            Geometry::segment([1.0, 1.0], [1.0, 1.0], 0.0),
            Geometry::segment([0.0, 0.0], [1.0, 0.0], -0.5),
        ];
        for g in bad {
            assert!(
                matches!(g.resolve(), Err(PhysicsError::InvalidConfig(_))),
                "{g:?} was accepted"
            );
        }
        // a segment of zero length but some radius is just a circle
        assert!(Geometry::segment([1.0, 1.0], [1.0, 1.0], 0.5).resolve().is_ok());
    }

    #[test]
    fn segment_becomes_centered_capsule() {
        let (kind, pose) = Geometry::segment([0.0, 0.0], [0.0, 4.0], 0.5)
            .resolve()
            .unwrap();
        assert_eq!(kind, ShapeKind::Capsule { hl: 2.0, r: 0.5 });
        assert!((pose.translation - m::Vec2::new(0.0, 2.0)).mag() < 1e-12);
        let along = pose.rotation * m::Vec2::unit_x();
        assert!((along - m::Vec2::unit_y()).mag() < 1e-9);
    }

    #[test]
    fn rotated_rect_aabb() {
        let kind = ShapeKind::Rect { hw: 2.0, hh: 1.0 };
        let pose = m::pose_from_parts(m::Vec2::new(10.0, 0.0), Angle::Deg(90.0));
        let aabb = kind.aabb(&pose);
        assert!((aabb.width() - 2.0).abs() < 1e-9);
        assert!((aabb.height() - 4.0).abs() < 1e-9);
        assert!(aabb.contains_point(m::Vec2::new(10.0, 1.9)));
    }

    #[test]
    fn shape_config_validation() {
        let body = BodyKey(thunderdome::Arena::<()>::new().insert(()));
        let config = ShapeConfig::new(Geometry::circle(1.0)).with_friction(1.5);
        assert!(Shape::from_config(body, &config).is_err());
        let config = ShapeConfig::new(Geometry::circle(1.0)).with_elasticity(-0.1);
        assert!(Shape::from_config(body, &config).is_err());
        let config = ShapeConfig::new(Geometry::circle(1.0))
            .with_friction(1.0)
            .as_sensor();
        let shape = Shape::from_config(body, &config).unwrap();
        assert!(shape.is_sensor());
        assert_eq!(shape.friction(), 1.0);
    }
}
